use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 以暫存檔加改名的方式原子寫入。 / Writes `data` next to `path` and renames it into place.
///
/// The previous file stays intact if any step fails.
pub fn write_atomic(path: &Path, data: &[u8], temp_suffix: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path(path, temp_suffix);
    fs::write(&tmp_path, data)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

/// `state.xml` becomes `state.xml.<suffix>` so that siblings never share a temporary.
pub fn temp_path(path: &Path, temp_suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".");
    name.push(temp_suffix);
    path.with_file_name(name)
}
