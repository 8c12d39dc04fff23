use std::io::Read;
use std::path::{Component, Path, PathBuf};

use fs_err as fs;

use crate::UnpackError;

/// Extracts an uncompressed tar stream into `destination`.
///
/// Directories, regular files and symlinks are recreated. On unix the
/// permission bits stored in the archive are applied to regular files. Any
/// other entry type is skipped with a warning.
///
/// Timestamps are not restored: [`crate::pack_directory`] erases them, so
/// there is nothing meaningful to restore.
///
/// # Security
///
/// Paths containing `..` and symlinks pointing outside of `destination` are
/// rejected with [`UnpackError::PathTraversal`]. Symlinks extracted earlier
/// from the same stream are resolved before an entry is created, so a chain
/// of individually harmless links cannot be used to write elsewhere.
pub fn unpack<R: Read>(reader: R, destination: &Path) -> Result<(), UnpackError> {
    fs::create_dir_all(destination)?;
    let root = fs::canonicalize(destination)?;

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.into_owned();
        let Some(normalized_path) = normalize_archive_path(&raw_path)? else {
            continue; // Skip "." entries
        };
        let dest_path = destination.join(&normalized_path);
        let parent = dest_path.parent().unwrap_or(destination);
        let entry_type = entry.header().entry_type();

        // Where the parent really is, relative to the root.
        let real_parent = resolve_within(&root, parent)
            .ok_or_else(|| UnpackError::PathTraversal(raw_path.clone()))?;
        fs::create_dir_all(parent)?;

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            remove_symlink(&dest_path)?;
            let mut file = fs::File::create(&dest_path)?;
            std::io::copy(&mut entry, &mut file)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = entry.header().mode()?;
                fs::set_permissions(&dest_path, std::fs::Permissions::from_mode(mode & 0o7777))?;
            }
        } else if entry_type.is_symlink() {
            let target = entry
                .link_name()?
                .ok_or_else(|| UnpackError::MissingLinkTarget(raw_path.clone()))?
                .into_owned();
            validate_symlink_target(&real_parent, &target)?;

            #[cfg(unix)]
            {
                // Replace whatever is in the way, symlink() never overwrites.
                if fs::symlink_metadata(&dest_path).is_ok() {
                    fs::remove_file(&dest_path)?;
                }
                std::os::unix::fs::symlink(&target, &dest_path)?;
            }

            // Symlinks require special privileges on Windows.
            #[cfg(not(unix))]
            {
                tracing::warn!("skipping symlink in tar archive: {}", raw_path.display());
            }
        } else {
            tracing::warn!(
                "tar: ignoring unsupported entry {} ({:?})",
                raw_path.display(),
                entry_type
            );
        }
    }

    Ok(())
}

/// Strips root and `.` components from an archive path. Returns `None` for
/// paths that normalize to nothing.
fn normalize_archive_path(path: &Path) -> Result<Option<PathBuf>, UnpackError> {
    let mut result = PathBuf::with_capacity(path.as_os_str().len());

    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => return Err(UnpackError::PathTraversal(path.to_path_buf())),
            Component::Normal(part) => result.push(part),
        }
    }

    if result.as_os_str().is_empty() {
        return Ok(None);
    }

    Ok(Some(result))
}

/// Resolves the deepest existing ancestor of `path`, following symlinks, and
/// returns `path` relative to the canonical `root`. Returns `None` if that
/// ancestor lies outside of `root`.
fn resolve_within(root: &Path, path: &Path) -> Option<PathBuf> {
    let (real, existing) = path
        .ancestors()
        .find_map(|ancestor| Some((std::fs::canonicalize(ancestor).ok()?, ancestor)))?;
    let relative = real.strip_prefix(root).ok()?;
    let missing = path.strip_prefix(existing).ok()?;
    Some(relative.join(missing))
}

/// Removes `path` if it is a symlink so that a file entry replaces the link
/// instead of writing to wherever it points.
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => fs::remove_file(path),
        _ => Ok(()),
    }
}

/// Ensures that a symlink in `parent` (relative to the destination) pointing
/// to `target` stays within the destination directory.
fn validate_symlink_target(parent: &Path, target: &Path) -> Result<(), UnpackError> {
    let mut result = parent.to_path_buf();
    for component in target.components() {
        match component {
            Component::Prefix(..) | Component::RootDir => {
                return Err(UnpackError::PathTraversal(target.to_path_buf()));
            }
            Component::Normal(component) => result.push(component),
            Component::ParentDir => {
                if !result.pop() {
                    return Err(UnpackError::PathTraversal(target.to_path_buf()));
                }
            }
            Component::CurDir => {}
        }
    }

    Ok(())
}
