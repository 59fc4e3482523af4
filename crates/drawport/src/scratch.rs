use std::path::Path;

use tempfile::TempDir;

pub(crate) const PREFIX: &str = "drawport-";

/// Creates a uniquely named directory under `root` (or the system temp dir) that is removed
/// when the returned guard drops.
pub(crate) fn scoped_dir(root: Option<&Path>) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(PREFIX);
    match root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
}

/// Removes a scratch directory now, logging instead of failing when that is not possible.
pub(crate) fn remove(scratch: TempDir) {
    let shown = scratch.path().display().to_string();
    if let Err(e) = scratch.close() {
        tracing::warn!(path = %shown, "failed to remove scratch directory: {e}");
    }
}
