//! Zip and tarball handling for artifacts
//!
//! Zip entries carry unix modes so `.app` executables survive a round trip.
//! Some producers wrap `.app` bundles in a `.tar.gz` before zipping to keep
//! permissions; [`unwrap_tarballs`] undoes that.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::RemoteResult;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Extract a zip archive into `dest`, skipping entries that would escape it
pub fn extract_zip(archive: &Path, dest: &Path) -> RemoteResult<()> {
    let file = fs::File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping zip entry outside the archive root");
            continue;
        };
        if has_symlink_ancestor(dest, &relative) {
            warn!(entry = entry.name(), "skipping zip entry below a symlink");
            continue;
        }
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut link = String::new();
            entry.read_to_string(&mut link)?;
            if !link_stays_inside(&relative, &link) {
                warn!(entry = entry.name(), link = %link, "skipping symlink pointing outside the archive root");
                continue;
            }
            create_symlink(&link, &target)?;
            continue;
        }

        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        drop(out);
        if let Some(mode) = mode {
            set_mode(&target, mode)?;
        }
    }

    debug!(archive = %archive.display(), entries = zip.len(), "zip extracted");
    Ok(())
}

/// Whether any directory between `dest` and `relative` is a symlink on disk
fn has_symlink_ancestor(dest: &Path, relative: &Path) -> bool {
    let mut current = dest.to_path_buf();
    let Some(parent) = relative.parent() else {
        return false;
    };
    for component in parent.components() {
        current.push(component);
        if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return true;
        }
    }
    false
}

/// Whether a link stored at `relative` resolves to a path under the root
fn link_stays_inside(relative: &Path, link: &str) -> bool {
    let link = Path::new(link);
    if link.has_root() {
        return false;
    }
    let mut resolved = PathBuf::new();
    let base = relative.parent().unwrap_or(Path::new(""));
    for component in base.components().chain(link.components()) {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Zip a file or directory. Directory entries are stored under the
/// directory's own name, so `App.app` unpacks as `App.app/...`.
pub fn zip_path(source: &Path) -> RemoteResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let base = source.parent().unwrap_or(Path::new(""));

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(base).map_err(io::Error::other)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(permissions(entry.path()));

        let file_type = entry.file_type();
        if file_type.is_dir() {
            writer.add_directory(name, options)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            writer.add_symlink(name, link.to_string_lossy(), options)?;
        } else {
            writer.start_file(name, options)?;
            let mut file = fs::File::open(entry.path())?;
            io::copy(&mut file, &mut writer)?;
        }
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// Replace every top-level `*.tar.gz` in `dir` with its contents,
/// returning how many were unpacked
pub fn unwrap_tarballs(dir: &Path) -> RemoteResult<usize> {
    let mut tarballs: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.to_string_lossy().ends_with(".tar.gz"))
        .collect();
    tarballs.sort();

    for tarball in &tarballs {
        let file = fs::File::open(tarball)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(true);
        archive.unpack(dir)?;
        fs::remove_file(tarball)?;
        debug!(tarball = %tarball.display(), "unwrapped tarball");
    }
    Ok(tarballs.len())
}

#[cfg(unix)]
fn permissions(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::symlink_metadata(path)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn permissions(path: &Path) -> u32 {
    if path.is_dir() {
        0o755
    } else {
        0o644
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link: &str, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn create_symlink(link: &str, target: &Path) -> io::Result<()> {
    use std::io::Write;
    let mut file = fs::File::create(target)?;
    file.write_all(link.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn app_bundle(root: &Path) -> std::path::PathBuf {
        let app = root.join("HelloWorld.app");
        fs::create_dir_all(app.join("Frameworks")).unwrap();
        fs::write(app.join("Info.plist"), "<plist/>").unwrap();
        fs::write(app.join("HelloWorld"), "binary").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(app.join("HelloWorld"), fs::Permissions::from_mode(0o755)).unwrap();
        }
        app
    }

    #[test]
    fn test_zip_directory_and_extract() {
        let temp = TempDir::new().unwrap();
        let app = app_bundle(temp.path());

        let bytes = zip_path(&app).unwrap();
        let archive = temp.path().join("artifact.zip");
        fs::write(&archive, bytes).unwrap();

        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        extract_zip(&archive, &out).unwrap();

        assert_eq!(
            fs::read_to_string(out.join("HelloWorld.app/HelloWorld")).unwrap(),
            "binary"
        );
        assert!(out.join("HelloWorld.app/Frameworks").is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(out.join("HelloWorld.app/HelloWorld"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_zip_single_file() {
        let temp = TempDir::new().unwrap();
        let apk = temp.path().join("app-release.apk");
        fs::write(&apk, "apk").unwrap();

        let bytes = zip_path(&apk).unwrap();
        let zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 1);
        assert_eq!(zip.file_names().next(), Some("app-release.apk"));
    }

    #[test]
    fn test_extract_skips_escaping_entries() {
        let temp = TempDir::new().unwrap();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("../evil.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"nope").unwrap();
        writer
            .start_file("ok.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"fine").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let archive = temp.path().join("a.zip");
        fs::write(&archive, bytes).unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        extract_zip(&archive, &out).unwrap();

        assert!(out.join("ok.txt").is_file());
        assert!(!temp.path().join("evil.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_refuses_links_leaving_the_destination() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer
            .add_symlink("link", outside.to_string_lossy(), options)
            .unwrap();
        writer.start_file("link/pwned.txt", options).unwrap();
        writer.write_all(b"nope").unwrap();
        writer.add_symlink("up", "../outside", options).unwrap();
        writer.add_directory("App.app/Versions/A", options).unwrap();
        writer.add_symlink("App.app/Versions/Current", "A", options).unwrap();
        writer.add_symlink("alias", "App.app", options).unwrap();
        writer.start_file("alias/Info.plist", options).unwrap();
        writer.write_all(b"<plist/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let archive = temp.path().join("a.zip");
        fs::write(&archive, bytes).unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        extract_zip(&archive, &out).unwrap();

        assert!(!outside.join("pwned.txt").exists());
        assert!(!out.join("link").is_symlink());
        assert!(!out.join("up").is_symlink());
        assert_eq!(
            fs::read_link(out.join("App.app/Versions/Current")).unwrap(),
            Path::new("A")
        );
        assert!(out.join("alias").is_symlink());
        assert!(!out.join("App.app/Info.plist").exists());
    }

    #[test]
    fn test_link_stays_inside() {
        assert!(link_stays_inside(Path::new("App.app/Versions/Current"), "A"));
        assert!(link_stays_inside(Path::new("App.app/Frameworks/X"), "../Info.plist"));
        assert!(!link_stays_inside(Path::new("link"), "/etc"));
        assert!(!link_stays_inside(Path::new("a/link"), "../../outside"));
    }

    #[test]
    fn test_unwrap_tarballs() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let app = app_bundle(&source);

        let dir = temp.path().join("download");
        fs::create_dir_all(&dir).unwrap();
        let tarball = fs::File::create(dir.join("HelloWorld.tar.gz")).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(tarball, Compression::default()));
        builder.append_dir_all("HelloWorld.app", &app).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        assert_eq!(unwrap_tarballs(&dir).unwrap(), 1);
        assert!(!dir.join("HelloWorld.tar.gz").exists());
        assert_eq!(
            fs::read_to_string(dir.join("HelloWorld.app/HelloWorld")).unwrap(),
            "binary"
        );
    }

    #[test]
    fn test_unwrap_without_tarballs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("app.apk"), "apk").unwrap();
        assert_eq!(unwrap_tarballs(temp.path()).unwrap(), 0);
        assert!(temp.path().join("app.apk").exists());
    }
}
