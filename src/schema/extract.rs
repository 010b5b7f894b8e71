//! 从沙箱导出快照中取出 createEnv 的捕获结果

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::models::{
    ExtractionResult, Group, SchemaDeclaration, SchemaOptions, ValidatorDescriptor,
};

pub const SCHEMA_NOT_CAPTURED: &str =
    "Schema structure not captured - envs object available but schema not extracted";
pub const NO_ENVS_EXPORT: &str = "No envs export found in module";

/// createEnv 捕获到的参数，分组里已经是描述符
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CapturedEnv {
    #[serde(default)]
    pub client: BTreeMap<String, ValidatorDescriptor>,
    #[serde(default)]
    pub server: BTreeMap<String, ValidatorDescriptor>,
    #[serde(default)]
    pub shared: BTreeMap<String, ValidatorDescriptor>,
    #[serde(default)]
    pub options: SchemaOptions,
}

/// 沙箱里一个导出值的形状
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exported {
    Capture(CapturedEnv),
    /// 对象或函数，但不是 createEnv 的捕获结果
    Object,
    Value { truthy: bool },
}

impl Exported {
    fn truthy(&self) -> bool {
        match self {
            Exported::Capture(_) | Exported::Object => true,
            Exported::Value { truthy } => *truthy,
        }
    }
}

/// 入口模块 `module.exports` 的快照
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExportsSnapshot {
    pub root: Exported,
    /// 按枚举顺序排列的具名导出
    #[serde(default)]
    pub named: Vec<(String, Exported)>,
}

impl ExportsSnapshot {
    fn named(&self, name: &str) -> Option<&Exported> {
        self.named
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// 依次尝试 `envs`、`env`、`default`，都不存在时使用导出对象本身
pub fn extract_schema(exports: &ExportsSnapshot, mut warnings: Vec<String>) -> ExtractionResult {
    let candidate = ["envs", "env", "default"]
        .iter()
        .find_map(|name| exports.named(name).filter(|value| value.truthy()))
        .unwrap_or(&exports.root);

    if let Exported::Capture(capture) = candidate {
        return ExtractionResult::Success {
            schema: Some(to_schema(capture)),
            warnings,
        };
    }

    // 捕获对象可能挂在别的导出名下
    if let Some(capture) = exports.named.iter().find_map(|(_, value)| match value {
        Exported::Capture(capture) => Some(capture),
        _ => None,
    }) {
        return ExtractionResult::Success {
            schema: Some(to_schema(capture)),
            warnings,
        };
    }

    match candidate {
        Exported::Object => {
            warnings.push(SCHEMA_NOT_CAPTURED.to_string());
            ExtractionResult::Success {
                schema: None,
                warnings,
            }
        }
        _ => ExtractionResult::not_found(NO_ENVS_EXPORT),
    }
}

fn to_schema(capture: &CapturedEnv) -> SchemaDeclaration {
    let mut schema = SchemaDeclaration::default();
    for group in Group::ALL {
        let source = match group {
            Group::Client => &capture.client,
            Group::Server => &capture.server,
            Group::Shared => &capture.shared,
        };
        *schema.group_mut(group) = source.clone();
    }
    schema.options = capture.options.clone();
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: serde_json::Value) -> ExportsSnapshot {
        serde_json::from_value(value).unwrap()
    }

    fn capture() -> serde_json::Value {
        json!({
            "kind": "capture",
            "client": {
                "NEXT_PUBLIC_API": { "descriptor": "validator", "kind": { "type": "string" } },
                "LIMIT": { "descriptor": "opaque", "kind": "number" }
            },
            "server": {},
            "shared": {},
            "options": { "clientPrefix": "NEXT_PUBLIC_", "emptyStringAsUndefined": true }
        })
    }

    #[test]
    fn test_named_envs_export() {
        let exports = snapshot(json!({
            "root": { "kind": "object" },
            "named": [["envs", capture()]]
        }));
        let result = extract_schema(&exports, vec!["w".to_string()]);
        let schema = result.schema().unwrap();
        assert!(schema.client["NEXT_PUBLIC_API"].validator().is_some());
        assert_eq!(
            schema.client["LIMIT"],
            ValidatorDescriptor::Opaque {
                kind: "number".to_string()
            }
        );
        assert!(schema.server.is_empty());
        assert_eq!(schema.options.client_prefix.as_deref(), Some("NEXT_PUBLIC_"));
        assert!(schema.options.empty_string_as_undefined);
        assert_eq!(result.warnings(), ["w".to_string()]);
    }

    #[test]
    fn test_env_and_default_fallbacks() {
        let env = snapshot(json!({ "root": { "kind": "object" }, "named": [["env", capture()]] }));
        assert!(extract_schema(&env, vec![]).schema().is_some());
        let default = snapshot(json!({ "root": { "kind": "object" }, "named": [["default", capture()]] }));
        assert!(extract_schema(&default, vec![]).schema().is_some());
        let root = snapshot(json!({ "root": capture() }));
        assert!(extract_schema(&root, vec![]).schema().is_some());
    }

    #[test]
    fn test_falsy_envs_falls_through() {
        let exports = snapshot(json!({
            "root": { "kind": "object" },
            "named": [["envs", { "kind": "value", "truthy": false }], ["default", capture()]]
        }));
        assert!(extract_schema(&exports, vec![]).schema().is_some());
    }

    #[test]
    fn test_capture_under_other_name() {
        let exports = snapshot(json!({
            "root": { "kind": "object" },
            "named": [["config", capture()]]
        }));
        assert!(extract_schema(&exports, vec![]).schema().is_some());
    }

    #[test]
    fn test_uncaptured_object_has_no_schema() {
        let exports = snapshot(json!({
            "root": { "kind": "object" },
            "named": [["envs", { "kind": "object" }]]
        }));
        let result = extract_schema(&exports, vec![]);
        assert!(result.is_success());
        assert!(result.schema().is_none());
        assert_eq!(result.warnings(), [SCHEMA_NOT_CAPTURED.to_string()]);
    }

    #[test]
    fn test_non_object_exports_not_found() {
        let exports = snapshot(json!({ "root": { "kind": "value", "truthy": true } }));
        assert_eq!(
            extract_schema(&exports, vec![]),
            ExtractionResult::not_found(NO_ENVS_EXPORT)
        );
    }
}
