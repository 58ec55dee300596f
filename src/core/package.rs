//! Zip packaging of the build output directory.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::utils::io::format_megabytes;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageReport {
    pub path: String,
    pub file_count: usize,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Compress the contents of `source_dir` into a zip at `archive_path`.
///
/// Entry names are relative to `source_dir`, so the directory itself is not
/// a path component inside the archive. An existing archive is replaced.
pub fn create_archive(source_dir: &Path, archive_path: &Path) -> Result<PackageReport> {
    let source_display = source_dir.to_string_lossy().to_string();

    if !source_dir.is_dir() {
        let problem = if source_dir.exists() {
            "not a directory"
        } else {
            "directory does not exist"
        };
        return Err(Error::package_failed(&source_display, problem)
            .with_hint("Check local.buildDir and that the build command writes there"));
    }

    log_status!("package", "Packaging {} -> {}", source_display, archive_path.display());

    let archive_path_abs = absolute(archive_path);
    let mut entries = Vec::new();
    collect_entries(source_dir, source_dir, &archive_path_abs, &mut entries)
        .map_err(|e| Error::package_failed(&source_display, e.to_string()))?;

    let archive_display = archive_path.to_string_lossy().to_string();
    let file_count = write_archive(&entries, archive_path)
        .map_err(|e| Error::package_failed(&archive_display, e.to_string()))?;

    let size_bytes = fs::metadata(archive_path)
        .map(|m| m.len())
        .map_err(|e| Error::package_failed(&archive_display, e.to_string()))?;
    let sha256 = sha256_file(archive_path)
        .map_err(|e| Error::package_failed(&archive_display, e.to_string()))?;

    log_status!(
        "package",
        "Created {} ({}, {} files)",
        archive_display,
        format_megabytes(size_bytes),
        file_count
    );

    Ok(PackageReport {
        path: archive_display,
        file_count,
        size_bytes,
        sha256,
    })
}

struct Entry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

fn collect_entries(
    root: &Path,
    dir: &Path,
    skip: &Path,
    entries: &mut Vec<Entry>,
) -> io::Result<()> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    children.sort();

    for path in children {
        // The archive may be written inside the directory being packaged.
        if absolute(&path) == skip {
            continue;
        }

        let relative = match path.strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");

        if path.is_dir() {
            entries.push(Entry {
                name: format!("{}/", name),
                path: path.clone(),
                is_dir: true,
            });
            collect_entries(root, &path, skip, entries)?;
        } else {
            entries.push(Entry {
                name,
                path,
                is_dir: false,
            });
        }
    }

    Ok(())
}

fn write_archive(entries: &[Entry], archive_path: &Path) -> zip::result::ZipResult<usize> {
    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let mut file_count = 0;

    for entry in entries {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9))
            .unix_permissions(permissions(&entry.path, entry.is_dir));

        if entry.is_dir {
            zip.add_directory(entry.name.as_str(), options)?;
            continue;
        }

        zip.start_file(entry.name.as_str(), options)?;
        let mut source = File::open(&entry.path)?;
        io::copy(&mut source, &mut zip)?;
        file_count += 1;
    }

    let mut file = zip.finish()?;
    file.flush()?;
    Ok(file_count)
}

#[cfg(unix)]
fn permissions(path: &Path, is_dir: bool) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(if is_dir { 0o755 } else { 0o644 })
}

#[cfg(not(unix))]
fn permissions(_path: &Path, is_dir: bool) -> u32 {
    if is_dir {
        0o755
    } else {
        0o644
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Hex SHA-256 of a file on disk.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use zip::ZipArchive;

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn entries_are_relative_to_build_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(dist.join("assets")).unwrap();
        fs::write(dist.join("index.html"), "<html></html>").unwrap();
        fs::write(dist.join("assets/app.js"), "console.log(1)").unwrap();

        let archive = dir.path().join("dist.zip");
        let report = create_archive(&dist, &archive).unwrap();

        assert_eq!(report.file_count, 2);
        assert_eq!(report.size_bytes, fs::metadata(&archive).unwrap().len());
        assert_eq!(
            entry_names(&archive),
            vec!["assets/", "assets/app.js", "index.html"]
        );
    }

    #[test]
    fn archive_contents_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join("index.html"), "hello").unwrap();

        let archive = dir.path().join("out.zip");
        create_archive(&dist, &archive).unwrap();

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut file = zip.by_name("index.html").unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");
        assert_eq!(file.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn empty_build_dir_produces_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(&dist).unwrap();

        let archive = dir.path().join("dist.zip");
        let report = create_archive(&dist, &archive).unwrap();
        assert_eq!(report.file_count, 0);
        assert!(entry_names(&archive).is_empty());
    }

    #[test]
    fn archive_inside_build_dir_is_not_packed_into_itself() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let archive = dir.path().join("self.zip");
        create_archive(dir.path(), &archive).unwrap();
        assert_eq!(entry_names(&archive), vec!["a.txt"]);
    }

    #[test]
    fn missing_build_dir_is_packaging_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("dist.zip");
        let err = create_archive(&dir.path().join("dist"), &archive).unwrap_err();
        assert_eq!(err.code, ErrorCode::DeployPackageFailed);
        assert!(!archive.exists());
    }

    #[test]
    fn file_as_build_dir_is_packaging_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dist");
        fs::write(&file, "not a dir").unwrap();
        let err = create_archive(&file, &dir.path().join("dist.zip")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DeployPackageFailed);
        assert_eq!(err.details["error"], "not a directory");
    }

    #[test]
    fn sha256_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
