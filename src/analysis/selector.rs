//! File selection
//!
//! Walks a project root and returns the readable text files that match a
//! task's glob allowlist.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{ButterflyError, Result};

/// Directories pruned from every walk unless configured otherwise
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[".git", "node_modules", "venv", ".venv", "target", "__pycache__"];

/// A file chosen for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path of the file, prefixed by the walk root
    pub path: PathBuf,
    /// UTF-8 content, read once
    pub content: String,
}

/// Bounds on a directory walk
#[derive(Debug, Clone)]
pub struct SelectionLimits {
    /// Maximum directory depth below the root
    pub max_depth: usize,
    /// Follow symbolic links. Link cycles are detected and skipped.
    pub follow_links: bool,
    /// Stop collecting once this many bytes of content were read
    pub max_total_bytes: Option<u64>,
    /// Directory names that are never descended into
    pub ignore_dirs: Vec<String>,
    /// Files never selected even when a pattern matches, e.g. the `.env`,
    /// database and report the tool itself writes into the project
    pub exclude_files: Vec<PathBuf>,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            follow_links: false,
            max_total_bytes: None,
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|d| d.to_string()).collect(),
            exclude_files: Vec::new(),
        }
    }
}

/// Enumerates files under a root that match a set of glob patterns
#[derive(Debug, Clone, Default)]
pub struct FileSelector {
    limits: SelectionLimits,
}

impl FileSelector {
    /// Create a selector with the given walk limits
    pub fn new(limits: SelectionLimits) -> Self {
        Self { limits }
    }

    /// Returns every readable file under `root` matching at least one pattern.
    ///
    /// A missing root is an error; unreadable files are logged and skipped.
    /// Results come back in walk order.
    pub fn select<S: AsRef<str>>(&self, root: &Path, patterns: &[S]) -> Result<Vec<FileRecord>> {
        check_root(root)?;

        let matcher = build_matcher(patterns)?;
        let excluded = self.excluded_files();
        let mut records = Vec::new();
        let mut total_bytes: u64 = 0;

        let walker = WalkDir::new(root)
            .follow_links(self.limits.follow_links)
            .max_depth(self.limits.max_depth);

        for entry in walker.into_iter().filter_entry(|e| !self.is_ignored(e)) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !matches(&matcher, root, entry.path()) {
                continue;
            }
            if is_excluded(&excluded, entry.path()) {
                debug!("Skipping {}", entry.path().display());
                continue;
            }

            let content = match fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Error reading file {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            total_bytes += content.len() as u64;
            records.push(FileRecord {
                path: entry.path().to_path_buf(),
                content,
            });

            if let Some(cap) = self.limits.max_total_bytes {
                if total_bytes >= cap {
                    warn!(
                        "Stopped selecting under {} after {} bytes (cap {})",
                        root.display(),
                        total_bytes,
                        cap
                    );
                    break;
                }
            }
        }

        debug!("Selected {} files under {}", records.len(), root.display());
        Ok(records)
    }

    /// Canonical forms of the excluded files that currently exist
    fn excluded_files(&self) -> Vec<PathBuf> {
        self.limits
            .exclude_files
            .iter()
            .filter_map(|p| fs::canonicalize(p).ok())
            .collect()
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.limits.ignore_dirs.iter().any(|d| d == name))
    }
}

/// Fails with [`ButterflyError::Selection`] unless `root` is an existing directory
pub fn check_root(root: &Path) -> Result<()> {
    let metadata = fs::metadata(root).map_err(|e| {
        ButterflyError::Selection(format!("cannot read root '{}': {}", root.display(), e))
    })?;
    if !metadata.is_dir() {
        return Err(ButterflyError::Selection(format!(
            "root '{}' is not a directory",
            root.display()
        )));
    }
    Ok(())
}

fn is_excluded(excluded: &[PathBuf], path: &Path) -> bool {
    !excluded.is_empty()
        && fs::canonicalize(path).is_ok_and(|canonical| excluded.contains(&canonical))
}

/// Compiles a glob allowlist into one matcher
pub fn build_matcher<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern.as_ref())?);
    }
    Ok(builder.build()?)
}

/// A path qualifies when its root-relative path, its full path, or its bare
/// file name matches any pattern.
fn matches(matcher: &GlobSet, root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    matcher.is_match(relative)
        || matcher.is_match(path)
        || path.file_name().is_some_and(|name| matcher.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(records: &[FileRecord], root: &Path) -> Vec<String> {
        let mut names: Vec<String> = records
            .iter()
            .map(|r| r.path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_missing_root_is_a_selection_error() {
        let temp = TempDir::new().unwrap();
        let result = FileSelector::default().select(&temp.path().join("nope"), &["*.py"]);
        assert!(matches!(result, Err(ButterflyError::Selection(_))));
    }

    #[test]
    fn test_file_root_is_a_selection_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "app.py", "print(1)");
        let result = FileSelector::default().select(&temp.path().join("app.py"), &["*.py"]);
        assert!(matches!(result, Err(ButterflyError::Selection(_))));
    }

    #[test]
    fn test_wildcards_cross_directories_and_literals_match_names() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/app.py", "x = 1");
        write(temp.path(), "deploy/Dockerfile", "FROM alpine");
        write(temp.path(), ".github/workflows/ci.yml", "on: push");
        write(temp.path(), "notes.md", "# notes");

        let records = FileSelector::default()
            .select(temp.path(), &["*.py", "Dockerfile", ".github/workflows/*.yml"])
            .unwrap();

        assert_eq!(
            names(&records, temp.path()),
            vec![".github/workflows/ci.yml", "deploy/Dockerfile", "src/app.py"]
        );
        for record in &records {
            assert!(record.path.starts_with(temp.path()));
        }
    }

    #[test]
    fn test_undecodable_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "good.py", "ok = True");
        fs::write(temp.path().join("bad.py"), [0xff, 0xfe, 0xfd]).unwrap();

        let records = FileSelector::default().select(temp.path(), &["*.py"]).unwrap();
        assert_eq!(names(&records, temp.path()), vec!["good.py"]);
    }

    #[test]
    fn test_ignored_directories_are_pruned() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "node_modules/lib/index.js", "module.exports = 1");
        write(temp.path(), "index.js", "require('lib')");

        let records = FileSelector::default().select(temp.path(), &["*.js"]).unwrap();
        assert_eq!(names(&records, temp.path()), vec!["index.js"]);
    }

    #[test]
    fn test_depth_and_byte_caps() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", "1234567890");
        write(temp.path(), "deep/er/b.py", "1234567890");

        let shallow = FileSelector::new(SelectionLimits {
            max_depth: 1,
            ..SelectionLimits::default()
        });
        assert_eq!(names(&shallow.select(temp.path(), &["*.py"]).unwrap(), temp.path()), vec!["a.py"]);

        let capped = FileSelector::new(SelectionLimits {
            max_total_bytes: Some(5),
            ..SelectionLimits::default()
        });
        assert_eq!(capped.select(temp.path(), &["*.py"]).unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycles_terminate() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pkg/mod.py", "pass");
        std::os::unix::fs::symlink(temp.path(), temp.path().join("pkg/loop")).unwrap();

        let following = FileSelector::new(SelectionLimits {
            follow_links: true,
            ..SelectionLimits::default()
        });
        let records = following.select(temp.path(), &["*.py"]).unwrap();
        assert_eq!(names(&records, temp.path()), vec!["pkg/mod.py"]);
    }

    #[test]
    fn test_excluded_files_are_never_selected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "app.py", "x = 1");
        write(temp.path(), ".env", "BUTTERFLY_API_KEY=secret");
        write(temp.path(), "config.json", "{}");
        write(temp.path(), "butterfly-report.json", "{}");

        let selector = FileSelector::new(SelectionLimits {
            exclude_files: vec![
                temp.path().join(".env"),
                temp.path().join("butterfly-report.json"),
                temp.path().join("not-written-yet.db"),
            ],
            ..SelectionLimits::default()
        });
        let records = selector.select(temp.path(), &["*.py", "*.env", ".env", "*.json"]).unwrap();
        assert_eq!(names(&records, temp.path()), vec!["app.py", "config.json"]);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let temp = TempDir::new().unwrap();
        let result = FileSelector::default().select(temp.path(), &["a[b"]);
        assert!(matches!(result, Err(ButterflyError::Glob(_))));
    }
}
