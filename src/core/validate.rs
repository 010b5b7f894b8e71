use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Group, Issue, PathSegment, SchemaDeclaration};

/// 用恢复出的校验器检查提交的变量值，每个问题的路径是 `[key]`
pub fn validate_variables(
    schema: Option<&SchemaDeclaration>,
    values: &BTreeMap<String, String>,
) -> Vec<Issue> {
    let Some(schema) = schema else {
        return Vec::new();
    };

    let mut seen = BTreeSet::new();
    let mut issues = Vec::new();
    for group in Group::ALL {
        for (key, descriptor) in schema.group(group) {
            if !seen.insert(key.as_str()) {
                continue;
            }
            // 无法识别的描述符不参与校验
            let Some(validator) = descriptor.validator() else {
                continue;
            };
            let value = values
                .get(key)
                .map(String::as_str)
                .filter(|v| !(v.is_empty() && schema.options.empty_string_as_undefined));

            issues.extend(validator.validate_env(value).into_iter().map(|issue| Issue {
                message: if issue.message.is_empty() {
                    format!("Invalid value for {}", key)
                } else {
                    issue.message
                },
                path: vec![PathSegment::Key(key.clone())],
            }));
        }
    }
    issues
}
