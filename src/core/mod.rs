pub mod config;
pub mod env;
pub mod validate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{EnvClientError, Result};
use crate::models::{
    EnvConfigData, EnvVariablesData, Environment, ExtractionResult, Issue, ProjectConfig, Variables,
};
use crate::storage::{self, dotenv};

/// 一次加载的结果：合并后的变量 + 本次提取的状态
#[derive(Debug, Clone, Serialize)]
pub struct LoadedVariables {
    pub variables: Variables,
    pub extraction: ExtractionResult,
}

/// 项目目录上的操作入口。不缓存任何项目状态，每次调用都重新读取磁盘
#[derive(Debug, Clone)]
pub struct EnvCenter {
    project_dir: PathBuf,
    /// 启动时的宿主环境快照，注入沙箱的 process.env
    process_env: BTreeMap<String, String>,
}

impl EnvCenter {
    pub fn new(project_dir: &Path) -> Result<Self> {
        if !project_dir.is_dir() {
            return Err(EnvClientError::ProjectDirNotFound(
                project_dir.display().to_string(),
            ));
        }
        let project_dir = std::path::absolute(project_dir)?;
        Ok(Self {
            project_dir,
            process_env: storage::process_env(),
        })
    }

    pub fn with_process_env(mut self, process_env: BTreeMap<String, String>) -> Self {
        self.process_env = process_env;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn config_data(&self) -> EnvConfigData {
        config::load_config(&self.project_dir)
    }

    /// 读取一次配置，供整个请求使用
    pub fn project_config(&self) -> ProjectConfig {
        config::project_config(&self.project_dir, &self.config_data())
    }

    pub fn variables_data(&self, environment: Environment) -> EnvVariablesData {
        storage::scan_env_files(&self.project_dir, environment)
    }

    pub async fn extract_schema(&self, config: &ProjectConfig) -> ExtractionResult {
        crate::schema::extract_schema(config.clone(), self.process_env.clone()).await
    }

    pub async fn load_variables(
        &self,
        config: &ProjectConfig,
        environment: Environment,
    ) -> LoadedVariables {
        let data = self.variables_data(environment);
        let extraction = self.extract_schema(config).await;
        if let Some(message) = extraction.failure_message() {
            tracing::warn!("schema 提取失败: {}", message);
        }
        let variables = env::merge_variables(extraction.schema(), &data.variables);
        LoadedVariables {
            variables,
            extraction,
        }
    }

    /// 没有 schema 时不产生任何问题
    pub async fn validate(
        &self,
        config: &ProjectConfig,
        values: &BTreeMap<String, String>,
    ) -> Vec<Issue> {
        let extraction = self.extract_schema(config).await;
        validate::validate_variables(extraction.schema(), values)
    }

    /// 写入配置指定的目标文件，未开启写权限时拒绝
    pub fn write_env_file(&self, config: &ProjectConfig, content: &str) -> Result<PathBuf> {
        if !config.write_permission {
            return Err(EnvClientError::WritePermissionDenied);
        }
        let target = config.target_env_path();
        storage::write_atomic(&target, content)?;
        tracing::info!("已写入 env 文件 {:?}", target);
        Ok(target)
    }

    pub fn write_variables(
        &self,
        config: &ProjectConfig,
        values: &BTreeMap<String, String>,
    ) -> Result<PathBuf> {
        self.write_env_file(config, &dotenv::render(values))
    }
}
