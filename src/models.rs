use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::schema::validator::Validator;

/// 单次请求内使用的项目配置（每个请求加载一次，之后不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub project_root: PathBuf,
    /// env-client.config.ts 中声明的 envsPath（原样，可能是相对路径）
    pub schema_file: Option<String>,
    pub write_permission: bool,
    /// 写回目标文件，默认 .env.local
    pub target_env_file: String,
}

impl ProjectConfig {
    pub const DEFAULT_TARGET_ENV_FILE: &'static str = ".env.local";

    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            schema_file: None,
            write_permission: false,
            target_env_file: Self::DEFAULT_TARGET_ENV_FILE.to_string(),
        }
    }

    pub fn target_env_path(&self) -> PathBuf {
        self.project_root.join(&self.target_env_file)
    }
}

/// env-client.config.ts 的读取报告
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvClientConfig {
    pub exists: bool,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envs_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_permission: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvConfigData {
    pub project_path: String,
    pub env_client_config: EnvClientConfig,
}

/// 扫描到的单个 .env* 文件
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvFile {
    pub exists: bool,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVariablesData {
    pub project_path: String,
    pub files: BTreeMap<String, EnvFile>,
    /// 按加载顺序合并后的变量，后加载的文件覆盖先加载的
    pub variables: BTreeMap<String, String>,
    pub process_env: BTreeMap<String, String>,
}

/// 变量分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Client,
    Server,
    Shared,
}

impl Group {
    pub const ALL: [Group; 3] = [Group::Client, Group::Server, Group::Shared];

    pub fn as_str(self) -> &'static str {
        match self {
            Group::Client => "client",
            Group::Server => "server",
            Group::Shared => "shared",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvVariable {
    pub key: String,
    pub value: String,
    pub group: Group,
    pub description: String,
    pub required: bool,
}

pub type Variables = BTreeMap<String, EnvVariable>;

/// 环境：决定合并哪些 .env.<environment> 文件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Environment::Development => Environment::Production,
            Environment::Production => Environment::Development,
        }
    }
}

/// 列表过滤状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    All,
    Valid,
    Invalid,
}

impl Status {
    pub fn next(self) -> Self {
        match self {
            Status::All => Status::Valid,
            Status::Valid => Status::Invalid,
            Status::Invalid => Status::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::All => "all",
            Status::Valid => "valid",
            Status::Invalid => "invalid",
        }
    }
}

/// 校验路径片段：字符串键或数组下标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(i64),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => f.write_str(k),
        }
    }
}

/// 面向 UI 的校验问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub message: String,
    pub path: Vec<PathSegment>,
}

/// 分组中记录到的校验器描述，管线本身不解释其内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "descriptor", rename_all = "snake_case")]
pub enum ValidatorDescriptor {
    Validator(Validator),
    Opaque { kind: String },
}

impl ValidatorDescriptor {
    pub fn validator(&self) -> Option<&Validator> {
        match self {
            ValidatorDescriptor::Validator(v) => Some(v),
            ValidatorDescriptor::Opaque { .. } => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.validator().and_then(|v| v.description.as_deref())
    }
}

/// createEnv 调用时附带的选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_prefix: Option<String>,
    pub empty_string_as_undefined: bool,
}

/// 从 schema 源文件恢复出的分组声明
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDeclaration {
    pub client: BTreeMap<String, ValidatorDescriptor>,
    pub server: BTreeMap<String, ValidatorDescriptor>,
    pub shared: BTreeMap<String, ValidatorDescriptor>,
    #[serde(default)]
    pub options: SchemaOptions,
}

impl SchemaDeclaration {
    pub fn group(&self, group: Group) -> &BTreeMap<String, ValidatorDescriptor> {
        match group {
            Group::Client => &self.client,
            Group::Server => &self.server,
            Group::Shared => &self.shared,
        }
    }

    pub fn group_mut(&mut self, group: Group) -> &mut BTreeMap<String, ValidatorDescriptor> {
        match group {
            Group::Client => &mut self.client,
            Group::Server => &mut self.server,
            Group::Shared => &mut self.shared,
        }
    }

    /// 按 client → server → shared 顺序查找，第一个匹配的分组胜出
    pub fn lookup(&self, key: &str) -> Option<(Group, &ValidatorDescriptor)> {
        Group::ALL
            .iter()
            .find_map(|g| self.group(*g).get(key).map(|d| (*g, d)))
    }

    pub fn is_empty(&self) -> bool {
        self.client.is_empty() && self.server.is_empty() && self.shared.is_empty()
    }
}

/// 沙箱抛出的校验聚合错误中的单条 issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionIssue {
    pub code: String,
    pub path: Vec<PathSegment>,
    pub message: String,
}

/// schema 提取结果：每次提取只会落在一个分支上
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionResult {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        schema: Option<SchemaDeclaration>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    BuildFailure {
        message: String,
    },
    RuntimeFailure {
        message: String,
    },
    ValidationFailure {
        message: String,
        issues: Vec<ExtractionIssue>,
    },
    NotFound {
        message: String,
    },
}

impl ExtractionResult {
    pub fn not_found(message: impl Into<String>) -> Self {
        ExtractionResult::NotFound {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success { .. })
    }

    pub fn schema(&self) -> Option<&SchemaDeclaration> {
        match self {
            ExtractionResult::Success { schema, .. } => schema.as_ref(),
            _ => None,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            ExtractionResult::Success { warnings, .. } => warnings,
            _ => &[],
        }
    }

    /// 失败时给用户展示的消息，成功返回 None
    pub fn failure_message(&self) -> Option<String> {
        match self {
            ExtractionResult::Success { .. } => None,
            ExtractionResult::BuildFailure { message } => {
                Some(format!("Build failure: {}", message))
            }
            ExtractionResult::RuntimeFailure { message } => {
                Some(format!("Runtime error: {}", message))
            }
            ExtractionResult::ValidationFailure { message, .. } => Some(message.clone()),
            ExtractionResult::NotFound { message } => Some(message.clone()),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ExtractionResult::Success { .. } => "success",
            ExtractionResult::BuildFailure { .. } => "build_failure",
            ExtractionResult::RuntimeFailure { .. } => "runtime_failure",
            ExtractionResult::ValidationFailure { .. } => "validation_failure",
            ExtractionResult::NotFound { .. } => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_result_tagging() {
        let result = ExtractionResult::BuildFailure {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "build_failure");
        assert_eq!(json["message"], "boom");
        assert!(json.get("schema").is_none());
    }

    #[test]
    fn test_success_without_schema_serializes_warnings() {
        let result = ExtractionResult::Success {
            schema: None,
            warnings: vec!["untagged".to_string()],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");
        assert!(json.get("schema").is_none());
        assert_eq!(json["warnings"][0], "untagged");
    }

    #[test]
    fn test_lookup_first_group_wins() {
        let mut schema = SchemaDeclaration::default();
        let opaque = ValidatorDescriptor::Opaque {
            kind: "object".to_string(),
        };
        schema.server.insert("DUP".to_string(), opaque.clone());
        schema.client.insert("DUP".to_string(), opaque.clone());
        schema.shared.insert("ONLY_SHARED".to_string(), opaque);

        assert_eq!(schema.lookup("DUP").unwrap().0, Group::Client);
        assert_eq!(schema.lookup("ONLY_SHARED").unwrap().0, Group::Shared);
        assert!(schema.lookup("MISSING").is_none());
    }

    #[test]
    fn test_path_segment_untagged() {
        let path: Vec<PathSegment> = serde_json::from_str(r#"["FOO", 2]"#).unwrap();
        assert_eq!(
            path,
            vec![PathSegment::Key("FOO".to_string()), PathSegment::Index(2)]
        );
    }

    #[test]
    fn test_failure_message_prefixes() {
        let runtime = ExtractionResult::RuntimeFailure {
            message: "x is not defined".to_string(),
        };
        assert_eq!(
            runtime.failure_message().unwrap(),
            "Runtime error: x is not defined"
        );
        let ok = ExtractionResult::Success {
            schema: None,
            warnings: vec![],
        };
        assert!(ok.failure_message().is_none());
    }
}
