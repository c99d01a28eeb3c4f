//! Snapshot of the project files the backend gets to see.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::io::files::BACKUP_SUFFIX;

/// Directories never descended into.
pub const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "__pycache__",
    ".pytest_cache",
    ".venv",
    "venv",
    "env",
    ".mender",
];

/// Hidden files with these extensions are still project files.
const VISIBLE_HIDDEN_EXTENSIONS: &[&str] = &[".design", ".test"];

pub const DESIGN_EXTENSION: &str = "design";

/// Path → content-hash map used to tell whether a repair iteration touched
/// any file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint(BTreeMap<String, String>);

/// Lazily loaded, sorted view of the working directory's text files.
///
/// Mutating actions call [`ProjectContext::invalidate`]; the next read walks
/// the tree again.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    root: PathBuf,
    max_file_bytes: u64,
    files: Option<BTreeMap<String, String>>,
}

impl ProjectContext {
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
            files: None,
        }
    }

    pub fn invalidate(&mut self) {
        self.files = None;
    }

    /// Current snapshot, loading it if invalidated.
    pub fn files(&mut self) -> Result<&BTreeMap<String, String>> {
        if self.files.is_none() {
            self.files = Some(self.load()?);
        }
        self.files
            .as_ref()
            .context("project context missing after load")
    }

    /// Drop the cached snapshot and load a fresh one.
    pub fn refresh(&mut self) -> Result<&BTreeMap<String, String>> {
        self.invalidate();
        self.files()
    }

    /// Fresh content hashes of every file in the snapshot.
    pub fn fingerprint(&mut self) -> Result<Fingerprint> {
        let files = self.refresh()?;
        Ok(Fingerprint(
            files
                .iter()
                .map(|(path, content)| (path.clone(), content_hash(content)))
                .collect(),
        ))
    }

    #[instrument(skip_all, fields(root = %self.root.display()))]
    fn load(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", self.root.display()))?;
            if !entry.file_type().is_file() || !is_project_file(&entry) {
                continue;
            }
            let too_big = entry
                .metadata()
                .map(|m| m.len() > self.max_file_bytes)
                .unwrap_or(true);
            if too_big {
                debug!(path = %entry.path().display(), "skipping oversized file");
                continue;
            }
            // Binary and otherwise undecodable files stay out of the prompt.
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .with_context(|| format!("relativize {}", entry.path().display()))?;
            files.insert(relative.to_string_lossy().replace('\\', "/"), content);
        }
        debug!(files = files.len(), "project context loaded");
        Ok(files)
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn is_project_file(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.ends_with(BACKUP_SUFFIX) {
        return false;
    }
    !name.starts_with('.') || VISIBLE_HIDDEN_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Hex SHA-256 of file content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// `*.design` files directly inside `root`, sorted by name.
pub fn design_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read dir {}", root.display()))? {
        let path = entry.with_context(|| format!("read dir {}", root.display()))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == DESIGN_EXTENSION) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Design document for design mode: `<dirname>.design`, else the first one.
pub fn primary_design_file(root: &Path) -> Result<Option<PathBuf>> {
    if let Some(name) = root.file_name() {
        let mut own = name.to_os_string();
        own.push(".");
        own.push(DESIGN_EXTENSION);
        let own = root.join(own);
        if own.is_file() {
            return Ok(Some(own));
        }
    }
    Ok(design_files(root)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    /// Verifies skipped directories, hidden files, backups and binaries stay out.
    #[test]
    fn load_filters_noise() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write(root, "src/main.py", "print(1)");
        write(root, "node_modules/lib/index.js", "x");
        write(root, ".git/config", "x");
        write(root, ".env", "SECRET=1");
        write(root, ".plan.design", "design");
        write(root, "main.py.backup", "old");
        write(root, "big.txt", &"x".repeat(200));
        fs::write(root.join("blob.bin"), [0xff, 0xfe, 0x00]).expect("write bin");

        let mut ctx = ProjectContext::new(root, 100);
        let files: Vec<String> = ctx.files().expect("files").keys().cloned().collect();
        assert_eq!(files, vec![".plan.design", "src/main.py"]);
    }

    /// Verifies invalidate forces a reload that sees new files.
    #[test]
    fn invalidate_picks_up_changes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = ProjectContext::new(temp.path(), 1024);
        assert!(ctx.files().expect("files").is_empty());

        write(temp.path(), "a.txt", "a");
        assert!(ctx.files().expect("cached").is_empty());
        ctx.invalidate();
        assert_eq!(ctx.files().expect("reloaded").len(), 1);
    }

    #[test]
    fn fingerprint_tracks_content_changes() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "a.txt", "one");
        let mut ctx = ProjectContext::new(temp.path(), 1024);
        let before = ctx.fingerprint().expect("fp");
        assert_eq!(ctx.fingerprint().expect("fp"), before);

        write(temp.path(), "a.txt", "two");
        assert_ne!(ctx.fingerprint().expect("fp"), before);
    }

    #[test]
    fn primary_design_prefers_directory_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("shop");
        write(&root, "aaa.design", "other");
        write(&root, "shop.design", "mine");
        assert_eq!(
            primary_design_file(&root).expect("find"),
            Some(root.join("shop.design"))
        );
        assert_eq!(
            design_files(&root).expect("list"),
            vec![root.join("aaa.design"), root.join("shop.design")]
        );
    }
}
