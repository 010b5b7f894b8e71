//! `.env` 文本的解析与生成

use std::collections::BTreeMap;

/// 解析 `KEY=VALUE` 行，后出现的同名 key 覆盖先出现的
pub fn parse(content: &str) -> BTreeMap<String, String> {
    entries(content).into_iter().collect()
}

/// 按出现顺序返回去重后的 key
pub fn keys(content: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for (key, _) in entries(content) {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn entries(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

/// 开头和结尾的引号各自独立去掉一个
fn unquote(value: &str) -> &str {
    let value = value
        .strip_prefix(['"', '\''])
        .unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value)
}

const HEADER: &str = "# Environment Variables";
/// 前缀是这些词时不分组
const COMMON_SUFFIXES: [&str; 6] = ["KEY", "SECRET", "TOKEN", "URL", "API", "ID"];
const NODE_ENV_KEY: &str = "NODE_ENV";
const MIN_GROUP_SIZE: usize = 2;

/// 生成 `.env` 文本。共享同一前缀的 key（至少两个）归到 `# Prefix` 注释下，
/// 其余的放在最前面；NODE_ENV 不写出
pub fn render(variables: &BTreeMap<String, String>) -> String {
    let mut ungrouped: Vec<(&str, &str)> = Vec::new();
    let mut by_prefix: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for (key, value) in variables {
        if key == NODE_ENV_KEY {
            continue;
        }
        let prefix = key_prefix(key);
        if COMMON_SUFFIXES.contains(&prefix) {
            ungrouped.push((key.as_str(), value.as_str()));
        } else {
            by_prefix.entry(prefix).or_default().push((key.as_str(), value.as_str()));
        }
    }

    let mut groups = Vec::new();
    for (prefix, entries) in by_prefix {
        if entries.len() >= MIN_GROUP_SIZE {
            groups.push((prefix, entries));
        } else {
            ungrouped.extend(entries);
        }
    }
    ungrouped.sort_by(|a, b| a.0.cmp(b.0));

    let mut lines = vec![HEADER.to_string()];
    if !ungrouped.is_empty() {
        lines.push(String::new());
        lines.extend(ungrouped.iter().map(|(k, v)| format_line(k, v)));
    }
    for (prefix, entries) in groups {
        lines.push(String::new());
        lines.push(group_title(prefix));
        lines.extend(entries.iter().map(|(k, v)| format_line(k, v)));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// `NEXT_PUBLIC_` 之后的第一段才是真正的前缀
fn key_prefix(key: &str) -> &str {
    let parts: Vec<&str> = key.split('_').collect();
    if parts.len() > 2 && parts[0] == "NEXT" && parts[1] == "PUBLIC" {
        return parts[2];
    }
    parts[0]
}

fn group_title(prefix: &str) -> String {
    let mut chars = prefix.chars();
    match chars.next() {
        Some(first) => format!(
            "# {}{}",
            first.to_uppercase(),
            chars.as_str().to_lowercase()
        ),
        None => "# ".to_string(),
    }
}

fn format_line(key: &str, value: &str) -> String {
    let value = value.replace("\r\n", "\\n").replace('\n', "\\n");
    if needs_quoting(&value) {
        // 解析时只去掉两端的引号，所以这里不做转义
        format!("{}=\"{}\"", key, value)
    } else {
        format!("{}={}", key, value)
    }
}

/// 判断值是否需要引号（首尾空白、引号或特殊字符）
fn needs_quoting(value: &str) -> bool {
    value != value.trim()
        || value.starts_with(['"', '\''])
        || value.ends_with(['"', '\''])
        || value.contains(' ')
        || value.contains('#')
        || value.contains('$')
        || value.contains('`')
}
