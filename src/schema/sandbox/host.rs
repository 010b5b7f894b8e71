//! 沙箱里的包加载：按 node 的规则在 node_modules 中查找并读取模块源码。
//!
//! 只读文件，不执行；ESM 源码先经过编译桥转换成 CommonJS。

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::schema::compiler::{self, transform, BundleOptions};

/// package.json `exports` 里按顺序尝试的条件
const CONDITIONS: &[&str] = &["require", "node", "default"];

#[derive(Debug, Clone)]
pub struct PackageHost {
    defines: Vec<(String, String)>,
}

impl Default for PackageHost {
    fn default() -> Self {
        Self {
            defines: BundleOptions::node(Vec::new()).defines,
        }
    }
}

/// 读出并转换好的包模块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    pub code: String,
    pub dirname: PathBuf,
}

impl PackageHost {
    /// `importer` 是发起 require 的文件
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        if compiler::is_relative(specifier) {
            return compiler::resolve_file(importer, specifier);
        }

        let (name, subpath) = split_package(specifier)?;
        let start = importer.parent()?;
        start
            .ancestors()
            .map(|dir| dir.join("node_modules").join(name))
            .filter(|dir| dir.is_dir())
            .find_map(|dir| resolve_in_package(&dir, subpath))
    }

    pub fn source(&self, path: &Path) -> Result<PackageSource, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read module {}: {}", path.display(), e))?;
        let dirname = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let code = match extension(path) {
            "json" => format!("module.exports = {};", raw),
            "mjs" | "mts" | "ts" | "tsx" => self.transpile(path, &raw)?,
            "js" if package_type(path).as_deref() == Some("module") => self.transpile(path, &raw)?,
            _ => raw,
        };
        debug!("加载包模块 {}", path.display());
        Ok(PackageSource { code, dirname })
    }

    fn transpile(&self, path: &Path, raw: &str) -> Result<String, String> {
        transform::transpile(path, raw, &self.defines)
            .map(|out| out.code)
            .map_err(|e| e.to_string())
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

/// `@scope/name/sub` → (`@scope/name`, `sub`)
fn split_package(specifier: &str) -> Option<(&str, &str)> {
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);
    if specifier.is_empty() {
        return None;
    }
    let name_segments = if specifier.starts_with('@') { 2 } else { 1 };
    let split_at = specifier
        .match_indices('/')
        .nth(name_segments - 1)
        .map(|(i, _)| i);
    Some(match split_at {
        Some(i) => (&specifier[..i], &specifier[i + 1..]),
        None => (specifier, ""),
    })
}

fn read_manifest(dir: &Path) -> Option<Value> {
    let raw = fs::read_to_string(dir.join("package.json")).ok()?;
    serde_json::from_str(&raw).ok()
}

fn resolve_in_package(dir: &Path, subpath: &str) -> Option<PathBuf> {
    let manifest = read_manifest(dir).unwrap_or(Value::Null);
    let anchor = dir.join("package.json");

    if let Some(exports) = manifest.get("exports") {
        let key = if subpath.is_empty() {
            ".".to_string()
        } else {
            format!("./{}", subpath)
        };
        let target = export_target(exports, &key)?;
        return compiler::resolve_file(&anchor, &target);
    }

    if !subpath.is_empty() {
        return compiler::resolve_file(&anchor, &format!("./{}", subpath));
    }
    manifest
        .get("main")
        .and_then(Value::as_str)
        .and_then(|main| compiler::resolve_file(&anchor, &format!("./{}", main.trim_start_matches("./"))))
        .or_else(|| compiler::resolve_file(&anchor, "./index"))
}

/// 在 `exports` 字段里找 `key` 对应的目标路径
fn export_target(exports: &Value, key: &str) -> Option<String> {
    let is_subpath_map = exports
        .as_object()
        .is_some_and(|map| map.keys().any(|k| k.starts_with('.')));
    if !is_subpath_map {
        return (key == ".").then(|| pick_condition(exports)).flatten();
    }

    let map = exports.as_object()?;
    if let Some(value) = map.get(key) {
        return pick_condition(value);
    }
    // `./*` 形式的通配导出
    map.iter().find_map(|(pattern, value)| {
        let (prefix, suffix) = pattern.split_once('*')?;
        let matched = key.strip_prefix(prefix)?.strip_suffix(suffix)?;
        pick_condition(value).map(|target| target.replace('*', matched))
    })
}

fn pick_condition(value: &Value) -> Option<String> {
    match value {
        Value::String(target) => Some(target.clone()),
        Value::Array(items) => items.iter().find_map(pick_condition),
        Value::Object(map) => CONDITIONS
            .iter()
            .find_map(|condition| map.get(*condition).and_then(pick_condition)),
        _ => None,
    }
}

/// 最近的 package.json 里的 `type` 字段
fn package_type(path: &Path) -> Option<String> {
    path.ancestors().skip(1).find_map(|dir| {
        let manifest = read_manifest(dir)?;
        Some(
            manifest
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("commonjs")
                .to_string(),
        )
    })
}
