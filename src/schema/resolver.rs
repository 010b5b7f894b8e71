//! 把配置里的 envsPath 解析成磁盘上的绝对路径

use std::path::{Component, Path, PathBuf};

use crate::models::ExtractionResult;

pub const NO_SCHEMA_PATH: &str = "Could not determine envs file path from config data";

pub fn resolve_schema_path(
    project_root: &Path,
    configured: Option<&str>,
) -> Result<PathBuf, ExtractionResult> {
    let configured = configured
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ExtractionResult::not_found(NO_SCHEMA_PATH))?;

    let path = Path::new(configured);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    };
    let resolved = normalize(&joined);

    if !resolved.is_file() {
        return Err(ExtractionResult::not_found(format!(
            "Envs file not found: {}",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// 按字面处理 `.` 和 `..`，不访问文件系统
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
