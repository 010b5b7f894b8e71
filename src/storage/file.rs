use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{EnvClientError, Result};

/// 原子写入：同目录下写临时文件再 rename，读者不会看到写了一半的内容
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    // 确保父目录存在
    if !parent.exists() {
        std::fs::create_dir_all(&parent)?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EnvClientError::StorageError(format!("invalid target path: {:?}", path)))?;
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let written = std::fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(content.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| std::fs::rename(&tmp_path, path)) {
        // 失败时清理临时文件
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// 读取文本文件，不存在时返回 None
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
