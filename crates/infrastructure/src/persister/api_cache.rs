use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::{Compression, GzBuilder};
use serde_json::Value;

use rrrspec_core::{
    models::{sanitize_for_cache, TasksetKey, TasksetSnapshot},
    SchedulerResult,
};

/// `<root>/v1/tasksets/<key中的':'替换为'-'>`
pub fn cache_path(root: &Path, key: &TasksetKey) -> PathBuf {
    root.join("v1")
        .join("tasksets")
        .join(sanitize_for_cache(key.as_str()))
}

pub fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

/// 完整JSON加上 `is_full: true`；对象键有序，相同输入得到相同字节
pub fn render_full_json(snapshot: &TasksetSnapshot) -> SchedulerResult<Vec<u8>> {
    let mut json = snapshot.as_full_json();
    if let Value::Object(object) = &mut json {
        object.insert("is_full".to_string(), Value::Bool(true));
    }
    Ok(serde_json::to_vec(&json)?)
}

/// gzip头中的mtime固定为0
pub fn gzip(bytes: &[u8]) -> SchedulerResult<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::with_capacity(bytes.len() / 4), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// 先写临时文件再重命名
pub async fn write_atomically(path: &Path, bytes: &[u8]) -> SchedulerResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
