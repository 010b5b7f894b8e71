use std::collections::BTreeMap;
use std::path::Path;

use super::dotenv;
use crate::models::{EnvFile, EnvVariablesData, Environment};

/// 宿主环境中不暴露给页面的变量
const HIDDEN_PROCESS_KEYS: [&str; 4] = ["PATH", "HOME", "USER", "SHELL"];

/// 指定环境下参与合并的文件，后面的覆盖前面的
pub fn merge_order(environment: Environment) -> Vec<String> {
    let env = environment.as_str();
    vec![
        ".env".to_string(),
        ".env.local".to_string(),
        format!(".env.{}", env),
        format!(".env.{}.local", env),
    ]
}

/// 扫描项目根目录下的 .env* 文件，并按环境合并变量
pub fn scan_env_files(project_dir: &Path, environment: Environment) -> EnvVariablesData {
    let mut files = BTreeMap::new();
    for name in list_env_file_names(project_dir) {
        let file = load_env_file(&project_dir.join(&name));
        files.insert(name, file);
    }

    let mut variables = BTreeMap::new();
    for name in merge_order(environment) {
        let file = files
            .entry(name.clone())
            .or_insert_with(|| EnvFile {
                exists: false,
                path: project_dir.join(&name).display().to_string(),
                ..Default::default()
            });
        if let Some(content) = &file.content {
            variables.extend(dotenv::parse(content));
        }
    }

    EnvVariablesData {
        project_path: absolute(project_dir),
        files,
        variables,
        process_env: process_env(),
    }
}

fn list_env_file_names(project_dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(project_dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("无法读取项目目录 {:?}: {}", project_dir, e);
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| is_env_file_name(name))
        .collect();
    names.sort();
    names
}

fn is_env_file_name(name: &str) -> bool {
    name == ".env" || name.starts_with(".env.")
}

/// 读取失败时只在报告里记录错误，不中断扫描
fn load_env_file(path: &Path) -> EnvFile {
    match std::fs::read_to_string(path) {
        Ok(content) => EnvFile {
            exists: true,
            path: path.display().to_string(),
            variables: Some(dotenv::keys(&content)),
            content: Some(content),
            error: None,
        },
        Err(e) => {
            tracing::warn!("读取 env 文件失败 {:?}: {}", path, e);
            EnvFile {
                exists: true,
                path: path.display().to_string(),
                error: Some(format!("Failed to read: {}", e)),
                ..Default::default()
            }
        }
    }
}

/// 过滤后的宿主环境变量
pub fn process_env() -> BTreeMap<String, String> {
    filter_process_env(std::env::vars())
}

pub fn filter_process_env(
    vars: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter(|(key, _)| !key.starts_with('_') && !HIDDEN_PROCESS_KEYS.contains(&key.as_str()))
        .collect()
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_merge_order_and_override() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".env"), "A=base\nB=base\nC=base\n").unwrap();
        fs::write(tmp.path().join(".env.local"), "B=local\n").unwrap();
        fs::write(tmp.path().join(".env.development"), "C=dev\nD=dev\n").unwrap();
        fs::write(tmp.path().join(".env.development.local"), "D=dev-local\n").unwrap();
        fs::write(tmp.path().join(".env.production"), "A=prod\n").unwrap();

        let data = scan_env_files(tmp.path(), Environment::Development);
        assert_eq!(data.variables["A"], "base");
        assert_eq!(data.variables["B"], "local");
        assert_eq!(data.variables["C"], "dev");
        assert_eq!(data.variables["D"], "dev-local");

        let prod = scan_env_files(tmp.path(), Environment::Production);
        assert_eq!(prod.variables["A"], "prod");
        assert_eq!(prod.variables["C"], "base");
        assert!(!prod.variables.contains_key("D"));
    }

    #[test]
    fn test_reports_every_env_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".env.example"), "A=\n").unwrap();
        fs::write(tmp.path().join(".env.test"), "T=1\n").unwrap();
        fs::write(tmp.path().join(".envrc"), "export X=1\n").unwrap();
        fs::write(tmp.path().join("README.md"), "").unwrap();

        let data = scan_env_files(tmp.path(), Environment::Development);
        let example = &data.files[".env.example"];
        assert!(example.exists);
        assert_eq!(example.variables.as_deref(), Some(&["A".to_string()][..]));
        assert!(data.files.contains_key(".env.test"));
        assert!(!data.files.contains_key(".envrc"));
        assert!(!data.files.contains_key("README.md"));

        // 合并顺序里的文件即使不存在也会出现在报告里
        assert!(!data.files[".env"].exists);
        assert!(!data.files[".env.development.local"].exists);
        // .env.example 不参与合并
        assert!(data.variables.is_empty());
    }

    #[test]
    fn test_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let data = scan_env_files(&tmp.path().join("nope"), Environment::Development);
        assert!(data.variables.is_empty());
        assert_eq!(data.files.len(), 4);
    }

    #[test]
    fn test_filter_process_env() {
        let vars = vec![
            ("PATH".to_string(), "/bin".to_string()),
            ("HOME".to_string(), "/root".to_string()),
            ("_".to_string(), "/usr/bin/env".to_string()),
            ("_HIDDEN".to_string(), "x".to_string()),
            ("NODE_ENV".to_string(), "development".to_string()),
        ];
        let filtered = filter_process_env(vars);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered["NODE_ENV"], "development");
    }
}
