//! Locating the compiler programs on the execution path

use log::{debug, info};
use serde::Serialize;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::config::ProtocConfig;

/// Find an executable called `name`
///
/// A name containing a path separator is checked directly; anything else is
/// looked up in every directory of `PATH`.
pub fn detect(name: &str) -> Option<PathBuf> {
    detect_in(name, env::var_os("PATH").as_deref())
}

/// Like [`detect`], searching the given `PATH`-style value
pub fn detect_in(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        let candidate = Path::new(name);
        return if is_executable(candidate) {
            Some(candidate.to_path_buf())
        } else {
            None
        };
    }

    let path_var = path_var?;
    for dir in env::split_paths(path_var) {
        for candidate in candidates(&dir, name) {
            if is_executable(&candidate) {
                debug!("Found {} at {}", name, candidate.display());
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(windows)]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name), dir.join(format!("{}.exe", name))]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Programs used by a build, resolved once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Programs {
    /// Compiler invoked for every step
    pub protoc: String,

    /// Ruby generator. Resolved for completeness; no step invokes it.
    pub rprotoc: String,

    /// Whether the compiler was actually found
    pub protoc_found: bool,
}

impl Programs {
    /// Detected paths, falling back to the configured names
    pub fn resolve(config: &ProtocConfig) -> Self {
        Self::resolve_with(config, detect)
    }

    fn resolve_with<F>(config: &ProtocConfig, detect: F) -> Self
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        let protoc = detect(&config.protoc);
        let rprotoc = detect(&config.rprotoc);

        if protoc.is_none() {
            info!("{} not found on PATH, using the bare name", config.protoc);
        }

        Programs {
            protoc_found: protoc.is_some(),
            protoc: protoc
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| config.protoc.clone()),
            rprotoc: rprotoc
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| config.rprotoc.clone()),
        }
    }
}

/// Whether the protoc-c builder can be offered at all
pub fn exists(config: &ProtocConfig) -> bool {
    detect(&config.protoc).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[cfg(unix)]
    fn write_program(dir: &Path, name: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_in_path() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        let expected = write_program(second.path(), "protoc-c", 0o755);
        write_program(first.path(), "protoc-c", 0o644);

        let path_var = env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(detect_in("protoc-c", Some(path_var.as_os_str())), Some(expected));
        assert_eq!(detect_in("rprotoc", Some(path_var.as_os_str())), None);
        assert_eq!(detect_in("protoc-c", None), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_explicit_path() {
        let dir = tempdir().unwrap();
        let program = write_program(dir.path(), "my-protoc", 0o755);
        let name = program.to_str().unwrap();

        assert_eq!(detect_in(name, None), Some(program.clone()));
        assert_eq!(detect_in(dir.path().join("nope").to_str().unwrap(), None), None);
    }

    #[test]
    fn test_detect_empty_name() {
        assert_eq!(detect_in("", Some(OsStr::new("/bin"))), None);
    }

    #[test]
    fn test_programs_fall_back_to_names() {
        let config = ProtocConfig::default();
        let programs = Programs::resolve_with(&config, |name| {
            if name == "protoc-c" {
                Some(PathBuf::from("/usr/bin/protoc-c"))
            } else {
                None
            }
        });

        assert!(programs.protoc_found);
        assert_eq!(programs.protoc, "/usr/bin/protoc-c");
        assert_eq!(programs.rprotoc, "rprotoc");

        let programs = Programs::resolve_with(&config, |_| None);
        assert!(!programs.protoc_found);
        assert_eq!(programs.protoc, "protoc-c");
    }
}
