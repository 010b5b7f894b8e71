//! env-client.config.ts 的读取。文件只按文本匹配，不会被执行。

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{EnvClientConfig, EnvConfigData, ProjectConfig};
use crate::storage::file::read_optional;

pub const CONFIG_FILE_NAME: &str = "env-client.config.ts";
const MISSING_SUGGESTION: &str =
    "Create env-client.config.ts to get detailed environment variable analysis";
const MISSING_ENVS_PATH: &str = "Could not find envsPath in configuration";

fn envs_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| string_field("envsPath"))
}

fn env_file_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| string_field("envFilePath"))
}

fn write_permission_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"['"]?writePermission['"]?\s*:\s*(true|false)\b"#)
            .expect("writePermission pattern is valid")
    })
}

/// `name: '<value>'`，key 本身允许带引号
fn string_field(name: &str) -> Regex {
    Regex::new(&format!(r#"['"]?{}['"]?\s*:\s*['"](.*?)['"]"#, name))
        .expect("config field pattern is valid")
}

/// 读取项目根目录下的配置文件，所有问题都记录在报告里而不是返回错误
pub fn load_config(project_dir: &Path) -> EnvConfigData {
    let path = project_dir.join(CONFIG_FILE_NAME);
    let path_str = path.display().to_string();

    let env_client_config = match read_optional(&path) {
        Ok(Some(content)) => parse_config(path_str, content),
        Ok(None) => EnvClientConfig {
            exists: false,
            path: path_str,
            suggestion: Some(MISSING_SUGGESTION.to_string()),
            ..Default::default()
        },
        Err(e) => {
            tracing::warn!("读取配置文件失败 {:?}: {}", path, e);
            EnvClientConfig {
                exists: true,
                path: path_str,
                error: Some(format!("Failed to read config: {}", e)),
                ..Default::default()
            }
        }
    };

    EnvConfigData {
        project_path: std::path::absolute(project_dir)
            .unwrap_or_else(|_| project_dir.to_path_buf())
            .display()
            .to_string(),
        env_client_config,
    }
}

/// 去掉 `//` 和 `/* */` 注释，字符串里的内容原样保留
fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                out.extend(chars.next());
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            ('"' | '\'' | '`', _) => {
                quote = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

pub fn parse_config(path: String, content: String) -> EnvClientConfig {
    let code = strip_comments(&content);
    let capture = |re: &Regex| {
        re.captures(&code)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    let envs_path = capture(envs_path_regex());
    let env_file_path = capture(env_file_path_regex()).filter(|p| !p.trim().is_empty());
    let write_permission = write_permission_regex()
        .captures(&code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str() == "true");
    let parse_error = envs_path.is_none().then(|| MISSING_ENVS_PATH.to_string());

    EnvClientConfig {
        exists: true,
        path,
        envs_path,
        write_permission,
        env_file_path,
        parse_error,
        content: Some(content),
        ..Default::default()
    }
}

/// 配置报告 → 单次请求使用的 ProjectConfig
pub fn project_config(project_dir: &Path, data: &EnvConfigData) -> ProjectConfig {
    let report = &data.env_client_config;
    let mut config = ProjectConfig::new(project_dir);
    config.schema_file = report.envs_path.clone();
    config.write_permission = report.write_permission.unwrap_or(false);
    if let Some(target) = &report.env_file_path {
        config.target_env_file = target.clone();
    }
    config
}
