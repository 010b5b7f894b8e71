//! schema 提取管线：解析路径 → 打包 → 沙箱执行 → 提取
//!
//! 每一步失败都直接落到对应的 [`ExtractionResult`] 分支，不重试。

pub mod compiler;
pub mod extract;
pub mod intercept;
pub mod resolver;
pub mod sandbox;
pub mod validator;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, debug_span};
use uuid::Uuid;

use self::compiler::{BuildError, BundleOptions, Bundler, Compile};
use self::intercept::InterceptionTable;
use self::sandbox::{Execute, Sandbox, SandboxSeed};
use crate::models::{ExtractionResult, ProjectConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Bundling,
    Executing,
    Extracting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Bundling => "bundling",
            Stage::Executing => "executing",
            Stage::Extracting => "extracting",
        };
        f.write_str(name)
    }
}

pub struct SchemaPipeline<C, E> {
    compiler: C,
    executor: E,
    process_env: BTreeMap<String, String>,
}

impl SchemaPipeline<Bundler, Sandbox> {
    /// 标准管线：拦截表里的模块保持外部引用，由沙箱提供
    pub fn standard(process_env: BTreeMap<String, String>) -> Result<Self, BuildError> {
        let table = InterceptionTable::standard();
        let compiler = Bundler::new(BundleOptions::node(table.external_specifiers()))?;
        Ok(Self::with_stages(compiler, Sandbox::new(table), process_env))
    }
}

impl<C: Compile, E: Execute> SchemaPipeline<C, E> {
    pub fn with_stages(compiler: C, executor: E, process_env: BTreeMap<String, String>) -> Self {
        Self {
            compiler,
            executor,
            process_env,
        }
    }

    pub fn run(&self, config: &ProjectConfig) -> ExtractionResult {
        let span = debug_span!("extract_schema", invocation = %Uuid::new_v4());
        let _guard = span.enter();

        debug!(stage = %Stage::Resolving, "开始解析 schema 路径");
        let path = match resolver::resolve_schema_path(
            &config.project_root,
            config.schema_file.as_deref(),
        ) {
            Ok(path) => path,
            Err(result) => {
                debug!(status = result.status(), "schema 路径解析失败");
                return result;
            }
        };
        self.run_path(&config.project_root, &path)
    }

    /// 跳过路径解析，直接处理已知的源文件
    pub fn run_path(&self, project_root: &Path, path: &Path) -> ExtractionResult {
        debug!(stage = %Stage::Bundling, path = %path.display(), "开始打包");
        let bundle = match self.compiler.bundle(path) {
            Ok(bundle) => bundle,
            Err(err) => {
                debug!(error = %err, "打包失败");
                return ExtractionResult::BuildFailure {
                    message: err.to_string(),
                };
            }
        };

        debug!(
            stage = %Stage::Executing,
            entry = %bundle.entry_path().display(),
            modules = bundle.modules.len(),
            "开始沙箱执行"
        );
        let seed = SandboxSeed {
            process_env: self.process_env.clone(),
            cwd: project_root.to_path_buf(),
        };
        let executed = match self.executor.execute(&bundle, &seed) {
            Ok(executed) => executed,
            Err(result) => {
                debug!(status = result.status(), "沙箱执行失败");
                return result;
            }
        };

        debug!(stage = %Stage::Extracting, "开始提取 schema");
        let result = extract::extract_schema(&executed.exports, executed.warnings);
        debug!(status = result.status(), "提取结束");
        result
    }
}

/// 在阻塞线程池上运行一次完整提取，每次调用都是全新的沙箱
pub async fn extract_schema(
    config: ProjectConfig,
    process_env: BTreeMap<String, String>,
) -> ExtractionResult {
    let joined = tokio::task::spawn_blocking(move || match SchemaPipeline::standard(process_env) {
        Ok(pipeline) => pipeline.run(&config),
        Err(err) => ExtractionResult::BuildFailure {
            message: err.to_string(),
        },
    })
    .await;
    joined.unwrap_or_else(|err| ExtractionResult::RuntimeFailure {
        message: format!("extraction task failed: {}", err),
    })
}
