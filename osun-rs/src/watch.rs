//! Polling watcher behind `-w`: notices when any `.os` file under a
//! directory is added, removed, or modified.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// How often the binary polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const SCRIPT_EXT: &str = "os";

#[derive(Debug)]
pub struct Watcher {
    root: PathBuf,
    seen: HashMap<PathBuf, SystemTime>,
}

impl Watcher {
    /// Record the current state of `root` without reporting a change.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let seen = scan(&root);
        tracing::debug!(root = %root.display(), files = seen.len(), "watching");
        Self { root, seen }
    }

    /// The directory a script's watcher should cover.
    pub fn root_for(script: &Path) -> PathBuf {
        match script.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_owned(),
            _ => PathBuf::from("."),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Rescan; true if anything changed since the last call.
    pub fn poll(&mut self) -> bool {
        let now = scan(&self.root);
        let changed = now != self.seen;
        if changed {
            tracing::debug!(root = %self.root.display(), "change detected");
        }
        self.seen = now;
        changed
    }
}

/// Modification times of every script file under `root`.  Unreadable
/// entries are skipped.
fn scan(root: &Path) -> HashMap<PathBuf, SystemTime> {
    let mut found = HashMap::new();
    let mut dirs = vec![root.to_owned()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let path = entry.path();
            if meta.is_dir() {
                dirs.push(path);
            } else if path.extension().is_some_and(|e| e == SCRIPT_EXT) {
                if let Ok(modified) = meta.modified() {
                    found.insert(path, modified);
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};

    use super::*;

    #[test]
    fn quiet_until_something_changes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.os"), "print(1)").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut w = Watcher::new(dir.path());
        assert_eq!(w.len(), 1);
        assert!(!w.poll());

        fs::write(dir.path().join("notes.txt"), "y").unwrap();
        assert!(!w.poll());
    }

    #[test]
    fn sees_new_nested_and_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = Watcher::new(dir.path());
        assert!(w.is_empty());

        fs::create_dir(dir.path().join("routes")).unwrap();
        fs::write(dir.path().join("routes/users.os"), "").unwrap();
        assert!(w.poll());
        assert_eq!(w.len(), 1);

        fs::remove_file(dir.path().join("routes/users.os")).unwrap();
        assert!(w.poll());
        assert!(!w.poll());
    }

    #[test]
    fn sees_modification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.os");
        fs::write(&path, "print(1)").unwrap();
        let mut w = Watcher::new(dir.path());

        let later = SystemTime::now() + Duration::from_secs(5);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(w.poll());
        assert!(!w.poll());
    }

    #[test]
    fn root_for_bare_file_is_cwd() {
        assert_eq!(Watcher::root_for(Path::new("app.os")), PathBuf::from("."));
        assert_eq!(Watcher::root_for(Path::new("srv/app.os")), PathBuf::from("srv"));
    }
}
