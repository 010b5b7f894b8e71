//! 沙箱执行器：每次调用都建立全新的 QuickJS 运行时运行 bundle。
//!
//! 运行时没有文件、网络和宿主环境访问；`process.env` 是调用方给的快照，
//! 裸模块只能经由拦截表或项目的 node_modules 加载。内存、栈和执行时间都有上限。

pub mod host;
mod runtime;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::compiler::Bundle;
use super::extract::ExportsSnapshot;
use super::intercept::InterceptionTable;
use crate::models::{ExtractionIssue, ExtractionResult, PathSegment};

pub const VALIDATION_FAILURE_MESSAGE: &str = "Zod validation failed for environment variables";

/// 注入沙箱的宿主信息
#[derive(Debug, Clone, Default)]
pub struct SandboxSeed {
    /// `process.env` 的快照（已过滤）
    pub process_env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub memory_bytes: usize,
    pub stack_bytes: usize,
    pub timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 64 * 1024 * 1024,
            stack_bytes: 512 * 1024,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub exports: ExportsSnapshot,
    pub warnings: Vec<String>,
}

/// 执行阶段的接口，测试里可以替换
pub trait Execute {
    fn execute(&self, bundle: &Bundle, seed: &SandboxSeed) -> Result<Executed, ExtractionResult>;
}

#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    table: InterceptionTable,
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(table: InterceptionTable) -> Self {
        Self {
            table,
            limits: SandboxLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl Execute for Sandbox {
    fn execute(&self, bundle: &Bundle, seed: &SandboxSeed) -> Result<Executed, ExtractionResult> {
        match runtime::run(bundle, seed, &self.table, &self.limits) {
            Ok(executed) => Ok(executed),
            Err(runtime::Failure::Thrown(thrown)) => {
                let result = classify_thrown(&thrown);
                debug!("沙箱执行抛出异常: {:?}", result.failure_message());
                Err(result)
            }
            Err(runtime::Failure::TimedOut) => Err(ExtractionResult::RuntimeFailure {
                message: format!(
                    "Script execution timed out after {}ms",
                    self.limits.timeout.as_millis()
                ),
            }),
            Err(runtime::Failure::Engine(message)) => {
                debug!("沙箱引擎错误: {}", message);
                Err(ExtractionResult::RuntimeFailure { message })
            }
        }
    }
}

/// 脚本抛出值的摘要，由沙箱里的 `describeThrown` 生成
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThrownRecord {
    /// 只有 `issues` 是数组时才有值
    #[serde(default)]
    pub issues: Option<Vec<RawIssue>>,
    /// `message` 属性，没有时是值的字符串形式
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawIssue {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 把脚本抛出的值归类：带 issues 数组的是校验失败，其余都是运行时错误
pub fn classify_thrown(thrown: &ThrownRecord) -> ExtractionResult {
    match &thrown.issues {
        Some(issues) => ExtractionResult::ValidationFailure {
            message: VALIDATION_FAILURE_MESSAGE.to_string(),
            issues: issues.iter().map(to_issue).collect(),
        },
        None => ExtractionResult::RuntimeFailure {
            message: thrown.message.clone(),
        },
    }
}

fn to_issue(raw: &RawIssue) -> ExtractionIssue {
    ExtractionIssue {
        code: raw
            .code
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        path: raw.path.iter().map(to_segment).collect(),
        message: raw
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Validation error".to_string()),
    }
}

fn to_segment(segment: &serde_json::Value) -> PathSegment {
    match segment {
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(index) => PathSegment::Index(index),
            None => PathSegment::Key(n.to_string()),
        },
        serde_json::Value::String(s) => PathSegment::Key(s.clone()),
        other => PathSegment::Key(other.to_string()),
    }
}
