//! Functionality for writing reproducible tar streams.
use std::io::{Read, Seek, Write};
use std::path::Path;

use fs_err as fs;
use walkdir::WalkDir;

use crate::PackError;

/// Permission bits of directories and executable files.
const EXECUTABLE_MODE: u32 = 0o755;

/// Permission bits of all other regular files.
const REGULAR_MODE: u32 = 0o644;

/// Write the contents of the directory `source` as a tar stream to `writer`.
///
/// The output only depends on the relative paths, the contents, the entry
/// types and the owner execute bits found in the tree:
///
/// * entries are visited in lexicographic file name order, the root itself is
///   not part of the archive;
/// * symlinks are stored as symlinks and never followed;
/// * modification times are zeroed, owners are erased and permission bits are
///   normalized to `0o755` (directories, executables) or `0o644`.
///
/// Returns the writer once the end-of-archive marker has been written.
///
/// # Errors
///
/// Fails with [`PackError::SourceNotFound`] before writing anything if
/// `source` cannot be read, and with [`PackError::UnsupportedFileType`] if the
/// tree contains sockets, fifos or device files.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
///
/// let mut stream = Vec::new();
/// blobstore_tar::pack_directory(Path::new("assets"), &mut stream).unwrap();
/// ```
pub fn pack_directory<W: Write>(source: &Path, writer: W) -> Result<W, PackError> {
    // ensure the source actually exists before trying to tar it
    let metadata = fs::metadata(source).map_err(|err| PackError::SourceNotFound {
        path: source.to_path_buf(),
        source: err,
    })?;
    if !metadata.is_dir() {
        return Err(PackError::NotADirectory(source.to_path_buf()));
    }

    let mut archive = tar::Builder::new(writer);
    archive.follow_symlinks(false);

    for entry in WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let relative_path = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| PackError::UnsupportedFileType(entry.path().to_path_buf()))?;
        append_path_to_archive(&mut archive, entry.path(), relative_path)?;
    }

    tracing::debug!("finished packing {}", source.display());

    Ok(archive.into_inner()?)
}

/// Re-encodes the zip archive read from `reader` as a tar stream.
///
/// Entries keep the order of the zip's central directory and receive the same
/// header normalization as [`pack_directory`], so the same zip always yields
/// the same tar stream. Entries whose names would escape the archive root are
/// skipped.
pub fn convert_zip_to_tar<R: Read + Seek, W: Write>(
    reader: R,
    writer: W,
) -> Result<W, PackError> {
    let mut zip_archive = zip::ZipArchive::new(reader)?;
    let mut archive = tar::Builder::new(writer);

    for index in 0..zip_archive.len() {
        let mut file = zip_archive.by_index(index)?;
        let Some(name) = file.enclosed_name() else {
            tracing::warn!("skipping zip entry with unsafe path: {}", file.name());
            continue;
        };

        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if file.is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(EXECUTABLE_MODE);
            header.set_size(0);
            archive.append_data(&mut header, &name, std::io::empty())?;
        } else {
            let executable = file.unix_mode().is_some_and(|mode| mode & 0o100 != 0);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(if executable {
                EXECUTABLE_MODE
            } else {
                REGULAR_MODE
            });
            header.set_size(file.size());
            archive.append_data(&mut header, &name, &mut file)?;
        }
    }

    Ok(archive.into_inner()?)
}

fn prepare_header(path: &Path) -> Result<tar::Header, std::io::Error> {
    let mut header = tar::Header::new_gnu();

    let stat = fs::symlink_metadata(path)?;
    header.set_metadata_in_mode(&stat, tar::HeaderMode::Deterministic);

    // erase some fields
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_device_minor(0)?;
    header.set_device_major(0)?;

    Ok(header)
}

fn trace_file_error(path: &Path, err: std::io::Error) -> std::io::Error {
    tracing::error!("{}: {}", path.display(), err);
    std::io::Error::new(err.kind(), format!("{}: {}", path.display(), err))
}

fn append_path_to_archive(
    archive: &mut tar::Builder<impl Write>,
    path: &Path,
    relative_path: &Path,
) -> Result<(), PackError> {
    let mut header = prepare_header(path).map_err(|err| trace_file_error(path, err))?;
    let entry_type = header.entry_type();

    if entry_type.is_file() {
        let mut file = fs::File::open(path).map_err(|err| trace_file_error(path, err))?;
        archive.append_data(&mut header, relative_path, &mut file)?;
    } else if entry_type.is_symlink() {
        let target = fs::read_link(path).map_err(|err| trace_file_error(path, err))?;
        header.set_size(0);
        archive.append_link(&mut header, relative_path, target)?;
    } else if entry_type.is_dir() {
        header.set_size(0);
        archive.append_data(&mut header, relative_path, std::io::empty())?;
    } else {
        return Err(PackError::UnsupportedFileType(path.to_path_buf()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_header_is_normalized() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "helloworld").unwrap();

        let header = prepare_header(&file).unwrap();
        assert_eq!(header.mtime().unwrap(), 0);
        assert_eq!(header.uid().unwrap(), 0);
        assert_eq!(header.gid().unwrap(), 0);
        assert_eq!(header.size().unwrap(), 10);
        assert_eq!(header.mode().unwrap(), REGULAR_MODE);
    }

    #[test]
    fn test_pack_rejects_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "helloworld").unwrap();

        let result = pack_directory(&file, Vec::new());
        assert!(matches!(result, Err(PackError::NotADirectory(path)) if path == file));
    }
}
