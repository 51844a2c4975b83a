//! Local file copies that replace their destination atomically.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use cloudtrack_core::TrackError;

/// Copy `source` over `dest`, replacing any existing file in one step.
///
/// The data is first written to a temporary file next to `dest` and then
/// renamed into place, so readers of `dest` see either the old or the new
/// contents. Returns the number of bytes copied.
pub fn replace_with_copy(source: &Path, dest: &Path) -> io::Result<u64> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut input = File::open(source)?;
    let mut staged = NamedTempFile::new_in(parent)?;
    let bytes = io::copy(&mut input, staged.as_file_mut())?;
    staged.as_file().sync_all()?;

    if let Ok(metadata) = input.metadata() {
        // Permissions are best effort.
        let _ = fs::set_permissions(staged.path(), metadata.permissions());
    }

    staged.persist(dest).map_err(|e| e.error)?;
    Ok(bytes)
}

/// Copy a local file into a container, creating missing parent directories
/// when `create_parents` is set.
pub fn copy_into_container(
    source: &Path,
    dest: &Path,
    create_parents: bool,
) -> Result<u64, TrackError> {
    let copy_error = |source_err: io::Error| TrackError::LocalCopyFailed {
        from: source.to_path_buf(),
        to: dest.to_path_buf(),
        source: source_err,
    };

    if !source.is_file() {
        return Err(copy_error(io::Error::new(
            io::ErrorKind::NotFound,
            "source is not a regular file",
        )));
    }

    if create_parents {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(copy_error)?;
        }
    }

    replace_with_copy(source, dest).map_err(copy_error)
}

/// Copy a resident remote file out to its local destination.
pub fn materialize(remote: &Path, local: &Path) -> Result<u64, TrackError> {
    replace_with_copy(remote, local).map_err(|source| TrackError::LocalCopyFailed {
        from: remote.to_path_buf(),
        to: local.to_path_buf(),
        source,
    })
}

/// Path of `relative` inside `root`, rejecting anything that would escape it.
pub fn resolve_in(root: &Path, relative: &str) -> Result<PathBuf, TrackError> {
    use std::path::Component;

    let relative_path = Path::new(relative);
    let mut has_name = false;
    for component in relative_path.components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            _ => {
                return Err(TrackError::argument(format!(
                    "path must stay inside the container: {relative}"
                )));
            }
        }
    }
    if !has_name {
        return Err(TrackError::argument("path must name a file"));
    }
    Ok(root.join(relative_path))
}
