//! Write-then-rename helpers shared by the artifact and status writers.

use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

/// Writes `bytes` to a hidden temporary file in `dir`. The file is made
/// world-readable so the web server can serve it once renamed into place.
/// Dropping the returned path removes the file.
pub(crate) fn stage_bytes(dir: &Path, bytes: &[u8]) -> std::io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(".staging-")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }
    file.as_file().sync_all()?;
    Ok(file.into_temp_path())
}

/// Atomically replaces `path` with `bytes`, creating parent directories.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;
    stage_bytes(dir, bytes)?
        .persist(path)
        .map_err(|e| e.error)
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
