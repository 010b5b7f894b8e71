use std::collections::BTreeMap;

use crate::models::{EnvVariable, Group, SchemaDeclaration, Variables};

/// schema 与 env 文件值合并为页面使用的变量表。
/// schema 里的 key 按 client → server → shared 顺序归组，先出现的分组胜出；
/// 只存在于 env 文件的 key 归入 server，且不是必填。
pub fn merge_variables(
    schema: Option<&SchemaDeclaration>,
    values: &BTreeMap<String, String>,
) -> Variables {
    let mut variables = Variables::new();

    if let Some(schema) = schema {
        for group in Group::ALL {
            for (key, descriptor) in schema.group(group) {
                if variables.contains_key(key) {
                    continue;
                }
                variables.insert(
                    key.clone(),
                    EnvVariable {
                        key: key.clone(),
                        value: values.get(key).cloned().unwrap_or_default(),
                        group,
                        description: descriptor.description().unwrap_or_default().to_string(),
                        required: true,
                    },
                );
            }
        }
    }

    for (key, value) in values {
        variables.entry(key.clone()).or_insert_with(|| EnvVariable {
            key: key.clone(),
            value: value.clone(),
            group: Group::Server,
            description: String::new(),
            required: false,
        });
    }

    variables
}

/// 变量表 → 写回 env 文件用的 key/value
pub fn variable_values(variables: &Variables) -> BTreeMap<String, String> {
    variables
        .values()
        .map(|v| (v.key.clone(), v.value.clone()))
        .collect()
}
