//! Archive extraction utilities for the Harbor installer.
//!
//! Release bundles are `.tar.gz` (linux, macos) or `.zip` (windows); source
//! snapshots are always `.tar.gz`. When every entry of an archive sits under
//! one shared top-level folder (e.g. `harbor-2.0.0/...`), that folder is
//! stripped during extraction.

use std::io::{Read, Seek};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

/// Extracts an archive (ZIP or tar.gz), choosing the format from the file
/// name.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened, is malformed, or an
/// entry would escape `dest_dir`.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let path_str = archive_path.to_string_lossy();
    if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
        extract_tar_gz(archive_path, dest_dir)
    } else {
        extract_zip(archive_path, dest_dir)
    }
}

/// Extracts a tar.gz archive into `dest_dir`.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or an entry would escape
/// `dest_dir`.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    // First pass only collects paths; tar streams cannot be rewound.
    let entry_paths = {
        let mut archive = open_tar_gz(archive_path)?;
        let mut paths = Vec::new();
        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read tar entries: {}", archive_path.display()))?
        {
            let entry = entry
                .with_context(|| format!("Failed to read tar entry: {}", archive_path.display()))?;
            if is_pax_header(&entry) {
                continue;
            }
            paths.push(entry.path().context("Failed to get entry path")?.into_owned());
        }
        paths
    };
    let strip_prefix = common_root(&entry_paths);

    let mut archive = open_tar_gz(archive_path)?;
    for entry in archive
        .entries()
        .with_context(|| format!("Failed to read tar entries: {}", archive_path.display()))?
    {
        let mut entry = entry
            .with_context(|| format!("Failed to read tar entry: {}", archive_path.display()))?;
        if is_pax_header(&entry) {
            continue;
        }
        let entry_path = entry.path().context("Failed to get entry path")?.into_owned();

        let Some(output_path) = output_path(dest_dir, &entry_path, strip_prefix.as_deref())?
        else {
            continue;
        };

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&output_path).with_context(|| {
                format!("Failed to create directory: {}", output_path.display())
            })?;
        } else {
            create_parent(&output_path)?;
            entry
                .unpack(&output_path)
                .with_context(|| format!("Failed to extract: {}", output_path.display()))?;
        }
    }

    Ok(())
}

/// Extracts a ZIP archive into `dest_dir`.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or an entry would escape
/// `dest_dir`.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {}", archive_path.display()))?;

    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    let entry_paths = zip_entry_paths(&mut archive)?;
    let strip_prefix = common_root(&entry_paths);

    for (i, entry_path) in entry_paths.iter().enumerate() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read archive entry {i}"))?;

        let Some(output_path) = output_path(dest_dir, entry_path, strip_prefix.as_deref())? else {
            continue;
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&output_path).with_context(|| {
                format!("Failed to create directory: {}", output_path.display())
            })?;
        } else {
            create_parent(&output_path)?;
            let mut outfile = std::fs::File::create(&output_path)
                .with_context(|| format!("Failed to create file: {}", output_path.display()))?;
            std::io::copy(&mut entry, &mut outfile)
                .with_context(|| format!("Failed to extract: {}", output_path.display()))?;
        }
    }

    Ok(())
}

fn open_tar_gz(archive_path: &Path) -> Result<Archive<GzDecoder<std::fs::File>>> {
    let file = std::fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// `git archive` (and so every GitHub source snapshot) starts with a
/// `pax_global_header` entry. It carries metadata, not a file.
fn is_pax_header<R: Read>(entry: &tar::Entry<'_, R>) -> bool {
    matches!(
        entry.header().entry_type(),
        EntryType::XGlobalHeader | EntryType::XHeader
    )
}

fn zip_entry_paths<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<Vec<PathBuf>> {
    (0..archive.len())
        .map(|i| {
            let entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read archive entry {i}"))?;
            entry
                .enclosed_name()
                .with_context(|| format!("Invalid entry path in archive: entry {i}"))
        })
        .collect()
}

/// Maps an archive entry to its destination, or `None` for the stripped
/// root folder itself.
fn output_path(
    dest_dir: &Path,
    entry_path: &Path,
    strip: Option<&Path>,
) -> Result<Option<PathBuf>> {
    // Reject "../../etc/passwd" and absolute paths.
    if entry_path.is_absolute()
        || entry_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        bail!(
            "Refusing to extract path with parent directory or absolute reference: {}",
            entry_path.display()
        );
    }

    let relative = match strip.map(|prefix| entry_path.strip_prefix(prefix)) {
        Some(Ok(p)) if p.as_os_str().is_empty() => return Ok(None),
        Some(Ok(p)) => p.to_path_buf(),
        Some(Err(_)) | None => entry_path.to_path_buf(),
    };

    Ok(Some(dest_dir.join(relative)))
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Returns the top-level folder shared by every entry, if there is one.
///
/// Only reported when at least one entry is nested below it, so a flat
/// archive holding a single file is never stripped.
fn common_root(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut root: Option<&std::ffi::OsStr> = None;
    let mut has_nested_entries = false;

    for path in paths {
        let mut components = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir));
        let first = components.next()?.as_os_str();
        if components.next().is_some() {
            has_nested_entries = true;
        }

        match root {
            None => root = Some(first),
            Some(existing) if existing != first => return None,
            Some(_) => {}
        }
    }

    if has_nested_entries {
        root.map(PathBuf::from)
    } else {
        None
    }
}

/// Searches `dir` recursively for a regular file named `file_name`.
///
/// Shallower matches win over deeper ones.
#[must_use]
pub fn find_binary(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let mut pending = vec![dir.to_path_buf()];

    while !pending.is_empty() {
        let mut next_level = Vec::new();
        for current in pending {
            let Ok(entries) = std::fs::read_dir(&current) else {
                continue;
            };
            let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
            entries.sort_by_key(std::fs::DirEntry::file_name);

            for entry in entries {
                let path = entry.path();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() {
                    next_level.push(path);
                } else if file_type.is_file() && entry.file_name() == file_name {
                    return Some(path);
                }
            }
        }
        pending = next_level;
    }

    None
}

/// Marks a file as executable (0o755) on Unix.
///
/// # Errors
///
/// Returns an error if the file metadata cannot be read or updated.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .with_context(|| format!("Failed to get metadata: {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set permissions: {}", path.display()))
}

/// Marks a file as executable (no-op on Windows).
#[cfg(windows)]
#[allow(clippy::unnecessary_wraps)]
pub fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::{write_git_archive, write_tar_gz, write_zip};
    use super::*;

    #[test]
    fn tar_gz_strips_common_root_folder() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("bundle.tar.gz");
        let dest = temp.path().join("out");
        write_tar_gz(
            &archive,
            &[
                ("harbor-2.0.0/bin/harbor", b"\x7fELF...."),
                ("harbor-2.0.0/README.md", b"docs"),
            ],
        );

        extract_archive(&archive, &dest).unwrap();

        assert!(dest.join("bin").join("harbor").is_file());
        assert!(dest.join("README.md").is_file());
        assert!(!dest.join("harbor-2.0.0").exists());
    }

    #[test]
    fn git_archive_snapshot_extracts_to_checkout_root() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("source.tar.gz");
        let dest = temp.path().join("src");
        write_git_archive(
            &archive,
            "harbor-2.0.0",
            &[
                ("Cargo.toml", b"[package]\nname = \"harbor\"\n"),
                ("src/main.rs", b"fn main() {}"),
            ],
        );

        extract_archive(&archive, &dest).unwrap();

        assert!(dest.join("Cargo.toml").is_file());
        assert!(dest.join("src").join("main.rs").is_file());
        assert!(!dest.join("pax_global_header").exists());
        assert!(!dest.join("harbor-2.0.0").exists());
    }

    #[test]
    fn tar_gz_flat_single_file_is_not_stripped() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("bundle.tgz");
        let dest = temp.path().join("out");
        write_tar_gz(&archive, &[("harbor", b"binary")]);

        extract_archive(&archive, &dest).unwrap();

        assert!(dest.join("harbor").is_file());
    }

    #[test]
    fn zip_strips_common_root_folder() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("bundle.zip");
        let dest = temp.path().join("out");
        write_zip(
            &archive,
            &[
                ("harbor-2.0.0/harbor.exe", b"MZ......"),
                ("harbor-2.0.0/LICENSE", b"license"),
            ],
        );

        extract_archive(&archive, &dest).unwrap();

        assert!(dest.join("harbor.exe").is_file());
        assert!(dest.join("LICENSE").is_file());
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("bundle.tar.gz");
        std::fs::write(&archive, b"<html>Not Found</html>").unwrap();

        assert!(extract_archive(&archive, &temp.path().join("out")).is_err());

        let zip = temp.path().join("bundle.zip");
        std::fs::write(&zip, b"<html>Not Found</html>").unwrap();
        assert!(extract_archive(&zip, &temp.path().join("out2")).is_err());
    }

    #[test]
    fn parent_directory_entries_are_refused() {
        let dest = Path::new("/tmp/out");
        assert!(output_path(dest, Path::new("../escape"), None).is_err());
        assert!(output_path(dest, Path::new("/etc/passwd"), None).is_err());
    }

    #[test]
    fn common_root_requires_shared_nested_folder() {
        let shared = vec![PathBuf::from("root/a"), PathBuf::from("root/b/c")];
        assert_eq!(common_root(&shared), Some(PathBuf::from("root")));

        let mixed = vec![PathBuf::from("root/a"), PathBuf::from("other/b")];
        assert_eq!(common_root(&mixed), None);

        let flat = vec![PathBuf::from("harbor")];
        assert_eq!(common_root(&flat), None);

        assert_eq!(common_root(&[]), None);
    }

    #[test]
    fn find_binary_searches_recursively() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("harbor"), b"bin").unwrap();
        std::fs::write(temp.path().join("harbor.txt"), b"not it").unwrap();

        assert_eq!(find_binary(temp.path(), "harbor"), Some(nested.join("harbor")));
        assert_eq!(find_binary(temp.path(), "missing"), None);
    }

    #[test]
    fn find_binary_prefers_shallow_match() {
        let temp = tempfile::tempdir().unwrap();
        let deep = temp.path().join("deep");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("harbor"), b"deep").unwrap();
        std::fs::write(temp.path().join("harbor"), b"shallow").unwrap();

        assert_eq!(
            find_binary(temp.path(), "harbor"),
            Some(temp.path().join("harbor"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn set_executable_sets_755() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("harbor");
        std::fs::write(&file, b"bin").unwrap();

        set_executable(&file).unwrap();

        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
