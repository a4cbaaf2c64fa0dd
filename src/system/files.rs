//! Atomic file writes and file-state checks

use converge::{FileWriter, StepError};
use std::fs::{self, File, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Replace `path` with `content` and `mode`.
///
/// Writes a temp file in the target directory, sets permissions and syncs it,
/// renames it over the target, then syncs the directory. The temp file is
/// removed on every error path, so readers only ever see the old file or the
/// new one.
pub fn write_atomic(path: &Path, content: &[u8], mode: u32) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".nodeup-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(content)?;
    tmp.as_file()
        .set_permissions(Permissions::from_mode(mode))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    sync_dir(parent)
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Whether `path` holds exactly `content` with permission bits `mode`.
///
/// A missing file is a mismatch, not an error.
pub fn file_matches(path: &Path, content: &[u8], mode: u32) -> io::Result<bool> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if !metadata.is_file()
        || metadata.permissions().mode() & 0o7777 != mode
        || metadata.len() != content.len() as u64
    {
        return Ok(false);
    }

    let mut current = Vec::with_capacity(content.len());
    File::open(path)?.read_to_end(&mut current)?;
    Ok(current == content)
}

/// Current content of `path`, None when missing
pub fn read_current(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// FileWriter backed by [`write_atomic`]
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicFileWriter;

impl FileWriter for AtomicFileWriter {
    fn write(&self, path: &Path, content: &[u8], mode: u32) -> Result<(), StepError> {
        log::debug!("Writing {} ({} bytes, mode {:o})", path.display(), content.len(), mode);
        write_atomic(path, content, mode)
            .map_err(|e| StepError::permanent(format!("Failed to write {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(".nodeup-"))
            .collect()
    }

    #[test]
    fn test_write_creates_file_with_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/mesos/zk");

        write_atomic(&path, b"zk://10.0.0.1:2181/mesos\n", 0o644).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"zk://10.0.0.1:2181/mesos\n");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o644);
        assert!(leftovers(path.parent().unwrap()).is_empty());
    }

    #[test]
    fn test_write_replaces_content_and_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("work_dir");
        write_atomic(&path, b"/tmp/old\n", 0o600).unwrap();

        write_atomic(&path, b"/var/lib/mesos\n", 0o644).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"/var/lib/mesos\n");
        assert!(file_matches(&path, b"/var/lib/mesos\n", 0o644).unwrap());
    }

    #[test]
    fn test_failed_write_keeps_old_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("advertise_ip");
        write_atomic(&path, b"10.0.0.5\n", 0o644).unwrap();

        // A directory in the way makes the rename fail
        let blocked = dir.path().join("blocked");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("inner"), b"x").unwrap();
        assert!(write_atomic(&blocked, b"new", 0o644).is_err());

        assert_eq!(fs::read(&path).unwrap(), b"10.0.0.5\n");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_file_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hostname");

        assert!(!file_matches(&path, b"agent-01\n", 0o644).unwrap());

        write_atomic(&path, b"agent-01\n", 0o644).unwrap();
        assert!(file_matches(&path, b"agent-01\n", 0o644).unwrap());
        assert!(!file_matches(&path, b"agent-02\n", 0o644).unwrap());
        assert!(!file_matches(&path, b"agent-01", 0o644).unwrap());
        assert!(!file_matches(&path, b"agent-01\n", 0o600).unwrap());
        assert!(!file_matches(dir.path(), b"", 0o755).unwrap());
    }

    #[test]
    fn test_read_current() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zk");
        assert_eq!(read_current(&path).unwrap(), None);
        fs::write(&path, b"zk").unwrap();
        assert_eq!(read_current(&path).unwrap(), Some(b"zk".to_vec()));
    }

    #[test]
    fn test_writer_reports_permanent_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let err = AtomicFileWriter
            .write(&file.join("child"), b"content", 0o644)
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Failed to write"));
    }
}
