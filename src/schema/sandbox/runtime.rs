//! QuickJS 胶水层：建运行时、挂宿主回调、跑 prelude 里的模块加载器

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rquickjs::{Context, Ctx, Function, Object, Runtime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::host::PackageHost;
use super::{Executed, SandboxLimits, SandboxSeed, ThrownRecord};
use crate::models::ValidatorDescriptor;
use crate::schema::compiler::Bundle;
use crate::schema::extract::{Exported, ExportsSnapshot};
use crate::schema::intercept::{InterceptionTable, Interceptor};
use crate::schema::validator::{parse_js_number, Input};

const PRELUDE: &str = include_str!("../../../assets/sandbox/prelude.js");
const ZOD_SHIM: &str = include_str!("../../../assets/sandbox/zod.js");

#[derive(Debug)]
pub(super) enum Failure {
    Thrown(ThrownRecord),
    TimedOut,
    Engine(String),
}

/// 中断回调按截止时间打断脚本；`deadline_ms` 为 `u64::MAX` 时不生效
struct Watchdog {
    started: Instant,
    deadline_ms: AtomicU64,
    fired: AtomicBool,
}

impl Watchdog {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            deadline_ms: AtomicU64::new(u64::MAX),
            fired: AtomicBool::new(false),
        }
    }

    fn arm(&self, timeout: Duration) {
        let at = (self.started.elapsed() + timeout).as_millis() as u64;
        self.deadline_ms.store(at, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.deadline_ms.store(u64::MAX, Ordering::SeqCst);
    }

    fn expired(&self) -> bool {
        let now = self.started.elapsed().as_millis() as u64;
        if now >= self.deadline_ms.load(Ordering::SeqCst) {
            self.fired.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    entry: usize,
    modules: Vec<ManifestModule<'a>>,
}

#[derive(Serialize)]
struct ManifestModule<'a> {
    filename: String,
    dirname: String,
    links: &'a BTreeMap<String, usize>,
}

impl<'a> Manifest<'a> {
    fn of(bundle: &'a Bundle) -> Self {
        Self {
            entry: bundle.entry,
            modules: bundle
                .modules
                .iter()
                .map(|module| ManifestModule {
                    filename: module.path.display().to_string(),
                    dirname: module
                        .path
                        .parent()
                        .map(|dir| dir.display().to_string())
                        .unwrap_or_default(),
                    links: &module.links,
                })
                .collect(),
        }
    }
}

/// `run` 的返回值
#[derive(Deserialize)]
struct Payload {
    root: Exported,
    #[serde(default)]
    named: Vec<(String, Exported)>,
    #[serde(default)]
    warnings: Vec<String>,
}

struct HostState {
    table: InterceptionTable,
    packages: PackageHost,
}

pub(super) fn run(
    bundle: &Bundle,
    seed: &SandboxSeed,
    table: &InterceptionTable,
    limits: &SandboxLimits,
) -> Result<Executed, Failure> {
    let runtime = Runtime::new().map_err(|e| Failure::Engine(e.to_string()))?;
    runtime.set_memory_limit(limits.memory_bytes);
    runtime.set_max_stack_size(limits.stack_bytes);
    let watchdog = Arc::new(Watchdog::new());
    let handler = Arc::clone(&watchdog);
    runtime.set_interrupt_handler(Some(Box::new(move || handler.expired())));
    let context = Context::full(&runtime).map_err(|e| Failure::Engine(e.to_string()))?;

    let manifest = serde_json::to_string(&Manifest::of(bundle))
        .map_err(|e| Failure::Engine(e.to_string()))?;
    let codes: Vec<String> = bundle.modules.iter().map(|m| m.code.clone()).collect();
    let process_env =
        serde_json::to_string(&seed.process_env).map_err(|e| Failure::Engine(e.to_string()))?;
    let state = Rc::new(HostState {
        table: table.clone(),
        packages: PackageHost::default(),
    });

    context.with(|ctx| {
        let api = install(&ctx, state, process_env, seed.cwd.display().to_string())
            .map_err(|err| engine_failure(&ctx, err))?;
        let run: Function = api.get("run").map_err(|err| engine_failure(&ctx, err))?;
        let describe_thrown: Function = api
            .get("describeThrown")
            .map_err(|err| engine_failure(&ctx, err))?;

        watchdog.arm(limits.timeout);
        let outcome = run.call::<_, String>((manifest, codes));
        watchdog.disarm();

        match outcome {
            Ok(payload) => {
                let payload: Payload = serde_json::from_str(&payload)
                    .map_err(|e| Failure::Engine(format!("invalid exports snapshot: {}", e)))?;
                Ok(Executed {
                    exports: ExportsSnapshot {
                        root: payload.root,
                        named: payload.named,
                    },
                    warnings: payload.warnings,
                })
            }
            Err(_) if watchdog.fired() => {
                let _ = ctx.catch();
                Err(Failure::TimedOut)
            }
            Err(rquickjs::Error::Exception) => {
                let thrown = ctx.catch();
                watchdog.arm(limits.timeout);
                let described = describe_thrown.call::<_, String>((thrown,));
                watchdog.disarm();
                match described {
                    Ok(record) => match serde_json::from_str::<ThrownRecord>(&record) {
                        Ok(thrown) => Err(Failure::Thrown(thrown)),
                        Err(e) => Err(Failure::Engine(format!("invalid thrown record: {}", e))),
                    },
                    Err(err) => Err(engine_failure(&ctx, err)),
                }
            }
            Err(err) => Err(Failure::Engine(err.to_string())),
        }
    })
}

fn install<'js>(
    ctx: &Ctx<'js>,
    state: Rc<HostState>,
    process_env: String,
    cwd: String,
) -> rquickjs::Result<Object<'js>> {
    let host = Object::new(ctx.clone())?;
    host.set("processEnv", process_env)?;
    host.set("cwd", cwd)?;
    host.set("platform", platform())?;
    let zod: Function = ctx.eval(ZOD_SHIM)?;
    host.set("zodFactory", zod)?;

    let s = Rc::clone(&state);
    host.set(
        "intercept",
        Function::new(ctx.clone(), move |specifier: String| -> String {
            s.table
                .resolve(&specifier)
                .map(Interceptor::route)
                .unwrap_or("")
                .to_string()
        })?,
    )?;
    host.set(
        "placeholder",
        Function::new(ctx.clone(), |specifier: String| -> String {
            InterceptionTable::placeholder_warning(&specifier)
        })?,
    )?;
    let s = Rc::clone(&state);
    host.set(
        "resolve",
        Function::new(
            ctx.clone(),
            move |specifier: String, importer: String| -> Option<String> {
                s.packages
                    .resolve(&specifier, Path::new(&importer))
                    .map(|path| path.display().to_string())
            },
        )?,
    )?;
    let s = Rc::clone(&state);
    host.set(
        "source",
        Function::new(ctx.clone(), move |path: String| -> String {
            let loaded = match s.packages.source(Path::new(&path)) {
                Ok(source) => serde_json::json!({
                    "code": source.code,
                    "dirname": source.dirname.display().to_string(),
                }),
                Err(error) => serde_json::json!({ "error": error }),
            };
            loaded.to_string()
        })?,
    )?;
    host.set(
        "validate",
        Function::new(ctx.clone(), |descriptor: String, candidate: String| -> String {
            validate_candidate(&descriptor, &candidate)
        })?,
    )?;
    host.set(
        "log",
        Function::new(ctx.clone(), |level: String, text: String| {
            debug!(level = %level, "脚本输出: {}", text);
        })?,
    )?;

    let factory: Function = ctx.eval(PRELUDE)?;
    factory.call((host,))
}

/// 取出挂起的异常消息，没有异常时用错误本身的描述
fn engine_failure(ctx: &Ctx<'_>, err: rquickjs::Error) -> Failure {
    if !err.is_exception() {
        return Failure::Engine(err.to_string());
    }
    let thrown = ctx.catch();
    let message = thrown
        .as_exception()
        .and_then(|exception| exception.message())
        .unwrap_or_else(|| err.to_string());
    Failure::Engine(message)
}

fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// 沙箱里待校验的值
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Candidate {
    Missing,
    Null,
    String { value: String },
    /// 字符串形式，保留 NaN 和 Infinity
    Number { repr: String },
    Boolean { value: bool },
    Other { name: String },
}

impl Candidate {
    fn input(&self) -> Input<'_> {
        match self {
            Candidate::Missing => Input::Missing,
            Candidate::Null => Input::Null,
            Candidate::String { value } => Input::Str(value),
            Candidate::Number { repr } => Input::Number(parse_js_number(repr)),
            Candidate::Boolean { value } => Input::Bool(*value),
            Candidate::Other { name } => Input::Other(match name.as_str() {
                "array" => "array",
                "date" => "date",
                "function" => "function",
                "bigint" => "bigint",
                "symbol" => "symbol",
                _ => "object",
            }),
        }
    }
}

/// 描述符是 opaque 或解析失败时不报问题
fn validate_candidate(descriptor: &str, candidate: &str) -> String {
    let descriptor = serde_json::from_str::<ValidatorDescriptor>(descriptor);
    let candidate = serde_json::from_str::<Candidate>(candidate);
    let issues = match (descriptor, candidate) {
        (Ok(ValidatorDescriptor::Validator(validator)), Ok(candidate)) => {
            validator.validate(candidate.input())
        }
        _ => Vec::new(),
    };
    serde_json::to_string(&issues).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validator::ValidatorIssue;

    fn issues(descriptor: serde_json::Value, candidate: serde_json::Value) -> Vec<ValidatorIssue> {
        serde_json::from_str(&validate_candidate(&descriptor.to_string(), &candidate.to_string()))
            .unwrap()
    }

    #[test]
    fn test_validate_candidate() {
        let min = serde_json::json!({
            "descriptor": "validator",
            "kind": { "type": "string" },
            "checks": [{ "check": "min", "value": 3, "message": null }]
        });
        assert!(issues(min.clone(), serde_json::json!({ "type": "string", "value": "abcd" })).is_empty());
        assert_eq!(
            issues(min, serde_json::json!({ "type": "string", "value": "ab" }))[0].code,
            "too_small"
        );

        let finite = serde_json::json!({
            "descriptor": "validator",
            "kind": { "type": "number" },
            "checks": [{ "check": "finite", "message": null }]
        });
        assert_eq!(
            issues(finite, serde_json::json!({ "type": "number", "repr": "Infinity" }))[0].code,
            "not_finite"
        );
    }

    #[test]
    fn test_opaque_and_malformed_descriptors_pass() {
        assert!(issues(
            serde_json::json!({ "descriptor": "opaque", "kind": "object" }),
            serde_json::json!({ "type": "missing" })
        )
        .is_empty());
        assert_eq!(validate_candidate("not json", "{}"), "[]");
    }

    #[test]
    fn test_watchdog() {
        let watchdog = Watchdog::new();
        assert!(!watchdog.expired());
        watchdog.arm(Duration::ZERO);
        assert!(watchdog.expired());
        assert!(watchdog.fired());
        watchdog.disarm();
        assert!(!watchdog.expired());
    }
}
