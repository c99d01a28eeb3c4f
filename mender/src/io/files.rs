//! Filesystem collaborator for `create`, `edit` and `delete` actions.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Suffix appended to a path to form its backup copy.
pub const BACKUP_SUFFIX: &str = ".backup";

/// File operations on paths relative to the working directory.
pub trait FileStore {
    fn exists(&self, path: &str) -> bool;
    /// Read a file as text; `Ok(None)` when it does not exist.
    fn read(&self, path: &str) -> Result<Option<String>>;
    /// Replace or create a file. With `backup`, an existing file is first
    /// copied to `<path>.backup`.
    fn write(&self, path: &str, content: &str, backup: bool) -> Result<()>;
    fn delete(&self, path: &str, backup: bool) -> Result<()>;
}

/// [`FileStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative action target, refusing absolute paths and `..`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim());
        if relative.as_os_str().is_empty() {
            return Err(anyhow!("empty path"));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(anyhow!("path escapes the working directory: {path}")),
            }
        }
        Ok(self.root.join(relative))
    }

    fn backup(&self, full: &Path) -> Result<()> {
        let mut backup = full.as_os_str().to_owned();
        backup.push(BACKUP_SUFFIX);
        fs::copy(full, &backup)
            .with_context(|| format!("back up {}", full.display()))?;
        debug!(path = %full.display(), "backup written");
        Ok(())
    }
}

impl FileStore for LocalFs {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|full| full.is_file())
    }

    fn read(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        match fs::read_to_string(&full) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", full.display())),
        }
    }

    fn write(&self, path: &str, content: &str, backup: bool) -> Result<()> {
        let full = self.resolve(path)?;
        if backup && full.is_file() {
            self.backup(&full)?;
        }
        write_atomic(&full, content)
    }

    fn delete(&self, path: &str, backup: bool) -> Result<()> {
        let full = self.resolve(path)?;
        if backup {
            self.backup(&full)?;
        }
        fs::remove_file(&full).with_context(|| format!("delete {}", full.display()))
    }
}

/// Write through a uniquely named sibling temp file, then rename into place.
///
/// The temp file is removed if any step fails. An existing target keeps its
/// permissions.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".mender-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Subject to umask, like any newly created file.
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    let mut tmp = builder
        .tempfile_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .with_context(|| format!("copy permissions of {}", path.display()))?;
    }
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_backs_up_existing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = LocalFs::new(temp.path());

        store.write("src/lib.rs", "v1", true).expect("write v1");
        assert!(!temp.path().join("src/lib.rs.backup").exists());

        store.write("src/lib.rs", "v2", true).expect("write v2");
        assert_eq!(store.read("src/lib.rs").expect("read"), Some("v2".to_string()));
        assert_eq!(
            fs::read_to_string(temp.path().join("src/lib.rs.backup")).expect("backup"),
            "v1"
        );
        assert!(!temp.path().join("src/lib.rs.tmp").exists());
    }

    /// Verifies an unrelated `.tmp` project file survives a write next to it.
    #[test]
    fn write_leaves_sibling_tmp_file_alone() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("notes.txt.tmp"), "keep me").expect("seed");
        let store = LocalFs::new(temp.path());

        store.write("notes.txt", "new", false).expect("write");
        assert_eq!(store.read("notes.txt").expect("read"), Some("new".to_string()));
        assert_eq!(
            fs::read_to_string(temp.path().join("notes.txt.tmp")).expect("sibling"),
            "keep me"
        );
    }

    /// Verifies a failed rename leaves no temp file behind.
    #[test]
    fn failed_write_cleans_up_temp_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src/inner")).expect("mkdir");
        let store = LocalFs::new(temp.path());

        assert!(store.write("src", "not a dir", false).is_err());
        let entries: Vec<String> = fs::read_dir(temp.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["src".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn edit_keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n").expect("seed");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        let store = LocalFs::new(temp.path());

        store.write("run.sh", "#!/bin/sh\necho hi\n", false).expect("write");
        let mode = fs::metadata(&script).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn read_missing_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = LocalFs::new(temp.path());
        assert_eq!(store.read("nope.txt").expect("read"), None);
        assert!(!store.exists("nope.txt"));
    }

    #[test]
    fn delete_keeps_backup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = LocalFs::new(temp.path());
        store.write("old.txt", "bye", false).expect("write");
        store.delete("old.txt", true).expect("delete");
        assert!(!store.exists("old.txt"));
        assert!(store.exists("old.txt.backup"));
    }

    #[test]
    fn refuses_paths_outside_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = LocalFs::new(temp.path());
        assert!(store.write("../escape.txt", "x", false).is_err());
        assert!(store.write("/etc/passwd", "x", false).is_err());
        assert!(store.resolve("./ok/fine.txt").is_ok());
    }
}
