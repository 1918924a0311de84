use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use cache::{CacheError, make_writable};
use common::{Config, PACKAGE_NAME, SOURCE_EXTENSIONS, push_unique, shlex};
use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::debug;

use crate::resolver::{identity_key, normalize};

static UNIQUE_TOKEN: Lazy<String> =
    Lazy::new(|| format!("-{}-{}", PACKAGE_NAME, std::process::id()));

/// Suffix that keeps this process's derived files apart from other runs.
pub fn unique_token() -> &'static str {
    &UNIQUE_TOKEN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    SourceFile,
    HeaderFile,
}

#[derive(Debug, Error)]
pub enum UnitError {
    #[error("{}: header files cannot be rewritten or compiled", .path.display())]
    HeaderRewrite { path: PathBuf },
    #[error(transparent)]
    Location(#[from] CacheError),
    #[error("failed to open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One discovered file and everything derived from it.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    original: PathBuf,
    identity: PathBuf,
    processed: PathBuf,
    kind: UnitKind,
    flags: Vec<String>,
    private_flags: Vec<String>,
    has_processed_file: bool,
    has_object_file: bool,
    object: Option<PathBuf>,
    executable: Option<PathBuf>,
    scanned: bool,
}

impl CompilationUnit {
    /// Derives the processed name without touching the filesystem.
    pub fn new(path: impl AsRef<Path>, kind: UnitKind) -> Self {
        let original = normalize(path.as_ref());
        let processed = processed_name(&original);
        Self {
            identity: identity_key(&original),
            original,
            processed,
            kind,
            flags: Vec::new(),
            private_flags: Vec::new(),
            has_processed_file: false,
            has_object_file: false,
            object: None,
            executable: None,
            scanned: false,
        }
    }

    pub fn source(path: impl AsRef<Path>) -> Self {
        Self::new(path, UnitKind::SourceFile)
    }

    pub fn header(path: impl AsRef<Path>) -> Self {
        Self::new(path, UnitKind::HeaderFile)
    }

    pub fn input_file_name(&self) -> &Path {
        &self.original
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn is_header(&self) -> bool {
        self.kind == UnitKind::HeaderFile
    }

    /// Whether the directive processor has already been over this unit.
    pub fn is_scanned(&self) -> bool {
        self.scanned
    }

    pub(crate) fn mark_scanned(&mut self) {
        self.scanned = true;
    }

    fn require_source(&self) -> Result<(), UnitError> {
        if self.is_header() {
            return Err(UnitError::HeaderRewrite {
                path: self.original.clone(),
            });
        }
        Ok(())
    }

    /// Create (truncate) the processed copy.
    ///
    /// If the natural location is not writable the copy moves below the cache
    /// root, and `-iquote<original dir>` keeps `#include "..."` working.
    pub fn open_for_write(&mut self, config: &Config) -> Result<File, UnitError> {
        self.require_source()?;

        let writable = make_writable(&self.processed, &config.cache_root)?;
        if writable.relocated {
            let dir = self
                .original
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            self.push_private_flags(&[format!("-iquote{}", dir.display())]);
            self.processed = writable.path;
        }

        self.has_processed_file = true;
        File::create(&self.processed).map_err(|source| UnitError::Io {
            path: self.processed.clone(),
            source,
        })
    }

    /// The file to hand to the compiler: the processed copy if one was
    /// written, otherwise the original.
    pub fn processed_file_name(&self) -> &Path {
        if self.has_processed_file {
            &self.processed
        } else {
            &self.original
        }
    }

    pub fn has_processed_file(&self) -> bool {
        self.has_processed_file
    }

    pub fn object_file_name(&mut self, config: &Config) -> Result<PathBuf, UnitError> {
        self.require_source()?;
        if let Some(object) = &self.object {
            return Ok(object.clone());
        }

        let object = make_writable(&self.processed.with_extension("o"), &config.cache_root)?.path;
        self.has_object_file = true;
        self.object = Some(object.clone());
        Ok(object)
    }

    pub fn has_object_file(&self) -> bool {
        self.has_object_file
    }

    pub fn executable_file_name(&mut self, config: &Config) -> Result<PathBuf, UnitError> {
        self.require_source()?;
        if let Some(executable) = &self.executable {
            return Ok(executable.clone());
        }

        let executable = match &config.executable {
            Some(explicit) => explicit.clone(),
            None => {
                let mut natural = self.processed.with_extension("");
                let suffix = std::env::consts::EXE_EXTENSION;
                if !suffix.is_empty() {
                    natural.set_extension(suffix);
                }
                make_writable(&natural, &config.cache_root)?.path
            }
        };
        self.executable = Some(executable.clone());
        Ok(executable)
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn private_flags(&self) -> &[String] {
        &self.private_flags
    }

    /// Append public flags unless the same run of tokens is already present.
    pub fn push_flags(&mut self, tokens: &[String]) -> bool {
        push_unique(&mut self.flags, tokens)
    }

    /// Append private flags unless the same run of tokens is already present.
    pub fn push_private_flags(&mut self, tokens: &[String]) -> bool {
        push_unique(&mut self.private_flags, tokens)
    }

    /// Flag-split `text` and push it as public flags.
    pub fn push_flag_string(&mut self, text: &str) -> bool {
        self.push_flags(&shlex::split(text))
    }

    /// Flag-split `text` and push it as private flags.
    pub fn push_private_flag_string(&mut self, text: &str) -> bool {
        self.push_private_flags(&shlex::split(text))
    }

    /// Remove the temporaries this unit created, unless they are being kept.
    pub fn cleanup(&mut self, config: &Config) {
        if config.save_temps {
            return;
        }

        if self.has_processed_file {
            remove(&self.processed);
            self.has_processed_file = false;
        }
        if self.has_object_file {
            if let Some(object) = self.object.take() {
                remove(&object);
            }
            self.has_object_file = false;
        }
    }

    /// Remove the linked executable unless it was asked for or is being kept.
    pub fn remove_executable(&mut self, config: &Config) {
        if config.save_temps || config.builds_only() {
            return;
        }
        if let Some(executable) = self.executable.take() {
            remove(&executable);
        }
    }
}

fn remove(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("removed {}", path.display()),
        Err(err) => debug!("could not remove {}: {}", path.display(), err),
    }
}

/// `dir/name<token>.<ext>` for recognised source files, otherwise
/// `dir/name.ext<token>.cpp`.
fn processed_name(original: &Path) -> PathBuf {
    let token = unique_token();
    let extension = original.extension().and_then(|ext| ext.to_str());

    if let (Some(ext), Some(stem)) = (extension, original.file_stem())
        && SOURCE_EXTENSIONS.contains(&ext)
    {
        let mut name = OsString::from(stem);
        name.push(token);
        name.push(".");
        name.push(ext);
        return original.with_file_name(name);
    }

    let mut name = original.as_os_str().to_os_string();
    name.push(token);
    name.push(".cpp");
    PathBuf::from(name)
}

impl PartialEq for CompilationUnit {
    /// Units are the same file when their identity keys match, however the
    /// path was spelled.
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for CompilationUnit {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config::new(dir.path().join("cache"))
    }

    #[test]
    fn processed_name_keeps_source_extension() {
        let unit = CompilationUnit::source("scripts/hello.cc");
        let expected = format!("scripts/hello{}.cc", unique_token());
        assert_eq!(unit.processed, PathBuf::from(expected));
        // nothing written yet
        assert_eq!(unit.processed_file_name(), Path::new("scripts/hello.cc"));
    }

    #[test]
    fn processed_name_for_unknown_extension() {
        let unit = CompilationUnit::source("bin/tool");
        let expected = format!("bin/tool{}.cpp", unique_token());
        assert_eq!(unit.processed, PathBuf::from(expected));

        let unit = CompilationUnit::source("notes.txt");
        let expected = format!("notes.txt{}.cpp", unique_token());
        assert_eq!(unit.processed, PathBuf::from(expected));
    }

    #[test]
    fn identity_ignores_current_dir_components() {
        assert_eq!(
            CompilationUnit::source("./a/./b.cpp"),
            CompilationUnit::source("a/b.cpp")
        );
        assert_ne!(
            CompilationUnit::source("a/b.cpp"),
            CompilationUnit::source("a/c.cpp")
        );
    }

    #[test]
    fn identity_collapses_parent_dirs_but_keeps_display_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/x.cpp"), "").unwrap();

        let roundabout = CompilationUnit::source(dir.path().join("a/../b/../a/x.cpp"));
        assert_eq!(roundabout, CompilationUnit::source(dir.path().join("a/x.cpp")));
        assert_eq!(
            roundabout.input_file_name(),
            dir.path().join("a/../b/../a/x.cpp")
        );
    }

    #[test]
    fn pushing_the_same_flags_twice_is_idempotent() {
        let mut unit = CompilationUnit::source("a.cpp");
        unit.push_flag_string("-lboost_filesystem -lboost_system");
        let once = unit.flags().to_vec();
        unit.push_flag_string("-lboost_filesystem -lboost_system");
        assert_eq!(unit.flags(), once.as_slice());

        unit.push_private_flag_string("-DX=1 'a b'");
        unit.push_private_flag_string("-DX=1 'a b'");
        assert_eq!(unit.private_flags(), &["-DX=1".to_string(), "a b".to_string()]);
    }

    #[test]
    fn headers_never_get_artifacts() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut header = CompilationUnit::header(dir.path().join("a.h"));

        assert!(matches!(
            header.open_for_write(&config),
            Err(UnitError::HeaderRewrite { .. })
        ));
        assert!(matches!(
            header.object_file_name(&config),
            Err(UnitError::HeaderRewrite { .. })
        ));
        assert!(matches!(
            header.executable_file_name(&config),
            Err(UnitError::HeaderRewrite { .. })
        ));
        assert!(!header.has_processed_file());
        assert!(!header.has_object_file());
    }

    #[test]
    fn open_for_write_beside_original() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let original = dir.path().join("a.cpp");
        fs::write(&original, "int main() {}\n").unwrap();

        let mut unit = CompilationUnit::source(&original);
        drop(unit.open_for_write(&config).unwrap());

        assert!(unit.has_processed_file());
        assert_ne!(unit.processed_file_name(), original.as_path());
        assert_eq!(unit.processed_file_name().parent(), original.parent());
        assert!(unit.private_flags().is_empty());
    }

    #[test]
    fn missing_directory_relocates_with_iquote() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let original_dir = dir.path().join("not-created");
        let original = original_dir.join("a.cpp");

        let mut unit = CompilationUnit::source(&original);
        drop(unit.open_for_write(&config).unwrap());

        assert!(unit.processed_file_name().starts_with(&config.cache_root));
        assert!(unit.processed_file_name().exists());
        assert_eq!(
            unit.private_flags(),
            &[format!("-iquote{}", original_dir.display())]
        );
    }

    #[test]
    fn read_only_directory_relocates_with_iquote() {
        use std::os::unix::fs::PermissionsExt;

        // root writes through 0555
        if unsafe { libc::geteuid() } == 0 {
            eprintln!("skipping: running as root");
            return;
        }

        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let original_dir = dir.path().join("locked");
        fs::create_dir(&original_dir).unwrap();
        let original = original_dir.join("a.cpp");
        fs::write(&original, "#!/usr/bin/env hbcxx\nint main() {}\n").unwrap();
        fs::set_permissions(&original_dir, fs::Permissions::from_mode(0o555)).unwrap();

        let mut unit = CompilationUnit::source(&original);
        let opened = unit.open_for_write(&config).map(drop);
        let object = unit.object_file_name(&config);
        fs::set_permissions(&original_dir, fs::Permissions::from_mode(0o755)).unwrap();

        opened.unwrap();
        assert!(unit.processed_file_name().starts_with(&config.cache_root));
        assert!(unit.processed_file_name().exists());
        assert_eq!(
            unit.private_flags(),
            &[format!("-iquote{}", original_dir.display())]
        );
        assert!(object.unwrap().starts_with(&config.cache_root));
        assert_eq!(fs::read_dir(&original_dir).unwrap().count(), 1);
    }

    #[test]
    fn object_and_executable_names_are_memoised() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut unit = CompilationUnit::source(dir.path().join("a.cpp"));

        let object = unit.object_file_name(&config).unwrap();
        assert_eq!(object.extension().unwrap(), "o");
        assert_eq!(unit.object_file_name(&config).unwrap(), object);
        assert!(unit.has_object_file());

        let executable = unit.executable_file_name(&config).unwrap();
        assert_eq!(
            executable.file_stem().unwrap().to_string_lossy(),
            format!("a{}", unique_token())
        );
        assert_eq!(unit.executable_file_name(&config).unwrap(), executable);
    }

    #[test]
    fn explicit_executable_wins() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir).with_executable(dir.path().join("out/prog"));
        let mut unit = CompilationUnit::source(dir.path().join("a.cpp"));
        assert_eq!(
            unit.executable_file_name(&config).unwrap(),
            dir.path().join("out/prog")
        );
    }

    #[test]
    fn cleanup_removes_created_temporaries_only() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let original = dir.path().join("a.cpp");
        fs::write(&original, "int main() {}\n").unwrap();

        let mut unit = CompilationUnit::source(&original);
        drop(unit.open_for_write(&config).unwrap());
        let processed = unit.processed_file_name().to_path_buf();
        let object = unit.object_file_name(&config).unwrap();
        assert!(processed.exists() && object.exists());

        unit.cleanup(&config);
        assert!(!processed.exists());
        assert!(!object.exists());
        assert!(original.exists());
    }

    #[test]
    fn save_temps_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.save_temps = true;
        let mut unit = CompilationUnit::source(dir.path().join("a.cpp"));
        let object = unit.object_file_name(&config).unwrap();
        unit.cleanup(&config);
        assert!(object.exists());
    }
}
