use std::fs::{self, OpenOptions};
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::CacheError;

/// Environment variable that overrides the per-user cache root.
pub const CACHE_DIR_ENV: &str = "HBCXX_CACHE_DIR";

/// Cache path utilities
pub fn cache_root() -> Result<PathBuf, CacheError> {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let mut cache_dir = directories::BaseDirs::new()
        .ok_or(CacheError::NoCacheDir)?
        .cache_dir()
        .to_path_buf();
    cache_dir.push("hbcxx");
    Ok(cache_dir)
}

/// Open `path` for appending, creating it if needed. Returns whether that worked.
///
/// An existing file is left untouched; a missing one is created empty.
pub fn touch(path: &Path) -> bool {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .is_ok()
}

/// Location of `path` mirrored under `root`, keyed by its absolute path.
pub fn mirror_path(root: &Path, path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut parts = Vec::new();
    for component in absolute.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
        }
    }
    parts.iter().fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Where a derived artifact actually ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Writable {
    pub path: PathBuf,
    /// True when the natural location was unusable and the cache mirror was used.
    pub relocated: bool,
}

/// Find somewhere safe to write `path`.
///
/// The natural location wins if the file can be created there. Otherwise the
/// file is mirrored under `root` (assumed writable by the current user).
/// Either way the file exists, possibly empty, on success.
pub fn make_writable(path: &Path, root: &Path) -> Result<Writable, CacheError> {
    if touch(path) {
        return Ok(Writable {
            path: path.to_path_buf(),
            relocated: false,
        });
    }

    let fallback = mirror_path(root, path);
    if let Some(parent) = fallback.parent() {
        let _ = fs::create_dir_all(parent);
    }

    if touch(&fallback) {
        debug!(
            original = %path.display(),
            relocated = %fallback.display(),
            "natural location not writable"
        );
        return Ok(Writable {
            path: fallback,
            relocated: true,
        });
    }

    Err(CacheError::NotWritable {
        path: path.to_path_buf(),
        fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn touch_creates_but_never_truncates() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("empty");
        assert!(!file.exists());
        assert!(touch(&file));
        assert!(file.exists());

        fs::write(&file, "keep me").unwrap();
        assert!(touch(&file));
        assert_eq!(fs::read_to_string(&file).unwrap(), "keep me");
    }

    #[test]
    fn touch_fails_in_missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(!touch(&dir.path().join("missing").join("file")));
    }

    #[test]
    fn mirror_keeps_absolute_path_below_root() {
        let mirrored = mirror_path(Path::new("/cache/hbcxx"), Path::new("/usr/share/demo/a.cpp"));
        assert_eq!(mirrored, PathBuf::from("/cache/hbcxx/usr/share/demo/a.cpp"));
    }

    #[test]
    fn natural_location_preferred() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let target = dir.path().join("a.o");

        let writable = make_writable(&target, &root).unwrap();
        assert!(!writable.relocated);
        assert_eq!(writable.path, target);
        assert!(!root.exists());
    }

    #[test]
    fn falls_back_to_mirror_under_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let target = dir.path().join("no-such-dir").join("a.o");

        let writable = make_writable(&target, &root).unwrap();
        assert!(writable.relocated);
        assert!(writable.path.starts_with(&root));
        assert!(writable.path.ends_with("no-such-dir/a.o"));
        assert!(writable.path.exists());
    }
}
