use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::Path;

use crate::resolver::PrefixMode;

/// Environment variable overriding the compiler program
pub const PROTOC_ENV: &str = "PROTOC_C";
/// Environment variable overriding the Ruby generator program
pub const RPROTOC_ENV: &str = "RPROTOC";

/// Configuration of the protoc-c build driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocConfig {
    /// Compiler program name or path
    #[serde(default = "default_protoc")]
    pub protoc: String,

    /// Ruby generator program name or path (resolved, never invoked)
    #[serde(default = "default_rprotoc")]
    pub rprotoc: String,

    /// Extra compiler flags, split like a shell command line
    #[serde(default)]
    pub flags: String,

    /// Text placed between `--c_out=` and the output directory
    #[serde(default)]
    pub c_out_flags: String,

    /// Additional search directories, after every registered root
    #[serde(default)]
    pub include_dirs: Vec<String>,

    /// Output directory; same directory as the source when unset
    #[serde(default)]
    pub out_dir: Option<String>,

    /// Optional file descriptor set output
    #[serde(default)]
    pub descriptor_set_out: Option<String>,

    /// Suffix appended to sources given without an extension
    #[serde(default = "default_source_suffix")]
    pub source_suffix: String,

    /// How the root directory is stripped from sources
    #[serde(default)]
    pub prefix_mode: PrefixMode,

    /// Display template shown instead of the full command line
    #[serde(default)]
    pub comstr: Option<String>,

    /// Working directory for compiler processes
    #[serde(default)]
    pub working_dir: Option<String>,
}

fn default_protoc() -> String {
    "protoc-c".to_string()
}

fn default_rprotoc() -> String {
    "rprotoc".to_string()
}

fn default_source_suffix() -> String {
    ".proto".to_string()
}

impl Default for ProtocConfig {
    fn default() -> Self {
        ProtocConfig {
            protoc: default_protoc(),
            rprotoc: default_rprotoc(),
            flags: String::new(),
            c_out_flags: String::new(),
            include_dirs: Vec::new(),
            out_dir: None,
            descriptor_set_out: None,
            source_suffix: default_source_suffix(),
            prefix_mode: PrefixMode::default(),
            comstr: None,
            working_dir: None,
        }
    }
}

impl ProtocConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;

        Ok(config)
    }

    /// Layer a JSON configuration file over this one
    ///
    /// Only the keys present in the file replace the current values.
    pub fn overlay_file<P: AsRef<Path>>(&self, path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        self.overlay_json(&content)
    }

    fn overlay_json(&self, content: &str) -> Result<Self, ConfigError> {
        let overlay: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;
        let mut merged = match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (key, value) in overlay {
            debug!("Configuration key '{}' overridden", key);
            merged.insert(key, value);
        }

        Ok(serde_json::from_value(serde_json::Value::Object(merged))?)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Apply `PROTOC_C` / `RPROTOC` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(env::var(PROTOC_ENV).ok(), env::var(RPROTOC_ENV).ok());
    }

    fn apply_overrides(&mut self, protoc: Option<String>, rprotoc: Option<String>) {
        if let Some(protoc) = protoc.filter(|p| !p.is_empty()) {
            debug!("Compiler overridden from environment: {}", protoc);
            self.protoc = protoc;
        }
        if let Some(rprotoc) = rprotoc.filter(|p| !p.is_empty()) {
            debug!("Ruby generator overridden from environment: {}", rprotoc);
            self.rprotoc = rprotoc;
        }
    }
}

/// One build step as declared in a build file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDecl {
    /// Directory the sources are relative to
    pub root: String,

    pub sources: Vec<String>,

    #[serde(default)]
    pub out_dir: Option<String>,

    #[serde(default)]
    pub descriptor_set_out: Option<String>,

    /// Flags added after the configured ones
    #[serde(default)]
    pub flags: Option<String>,
}

/// A configuration plus the steps to register with it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildFile {
    #[serde(default)]
    pub config: ProtocConfig,

    #[serde(default)]
    pub steps: Vec<StepDecl>,
}

impl BuildFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let build_file = serde_json::from_str(&content)?;

        Ok(build_file)
    }
}

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ProtocConfig::default();
        assert_eq!(config.protoc, "protoc-c");
        assert_eq!(config.rprotoc, "rprotoc");
        assert_eq!(config.source_suffix, ".proto");
        assert_eq!(config.prefix_mode, PrefixMode::String);
        assert!(config.out_dir.is_none());
        assert!(config.descriptor_set_out.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ProtocConfig =
            serde_json::from_str(r#"{ "out_dir": "gen", "prefix_mode": "component" }"#).unwrap();
        assert_eq!(config.out_dir.as_deref(), Some("gen"));
        assert_eq!(config.prefix_mode, PrefixMode::Component);
        assert_eq!(config.protoc, "protoc-c");
        assert_eq!(config.source_suffix, ".proto");
    }

    #[test]
    fn test_round_trip_through_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("protoc.json");

        let mut config = ProtocConfig::default();
        config.include_dirs = vec!["/usr/include".to_string()];
        config.descriptor_set_out = Some("all.desc".to_string());
        config.to_file(&path).unwrap();

        assert_eq!(ProtocConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_json() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(ProtocConfig::from_file(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            ProtocConfig::from_file(temp_dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_overrides_skip_empty_values() {
        let mut config = ProtocConfig::default();
        config.apply_overrides(Some("/opt/bin/protoc-c".to_string()), Some(String::new()));
        assert_eq!(config.protoc, "/opt/bin/protoc-c");
        assert_eq!(config.rprotoc, "rprotoc");
    }

    #[test]
    fn test_overlay_keeps_unset_keys() {
        let mut base = ProtocConfig::default();
        base.out_dir = Some("gen".to_string());
        base.include_dirs = vec!["/usr/include".to_string()];
        base.comstr = Some("Compiling $SOURCE".to_string());

        let merged = base
            .overlay_json(r#"{ "protoc": "/opt/bin/protoc-c", "comstr": null }"#)
            .unwrap();
        assert_eq!(merged.protoc, "/opt/bin/protoc-c");
        assert_eq!(merged.out_dir.as_deref(), Some("gen"));
        assert_eq!(merged.include_dirs, vec!["/usr/include"]);
        assert!(merged.comstr.is_none());

        assert!(matches!(base.overlay_json("[1, 2]"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_overlay_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("override.json");
        fs::write(&path, r#"{ "prefix_mode": "component" }"#).unwrap();

        let mut base = ProtocConfig::default();
        base.descriptor_set_out = Some("all.desc".to_string());

        let merged = base.overlay_file(&path).unwrap();
        assert_eq!(merged.prefix_mode, PrefixMode::Component);
        assert_eq!(merged.descriptor_set_out.as_deref(), Some("all.desc"));
    }

    #[test]
    fn test_build_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("build.json");
        fs::write(
            &path,
            r#"{
                "config": { "out_dir": "gen" },
                "steps": [
                    { "root": "src", "sources": ["src/a.proto"], "descriptor_set_out": "a.desc" }
                ]
            }"#,
        )
        .unwrap();

        let build_file = BuildFile::from_file(&path).unwrap();
        assert_eq!(build_file.config.out_dir.as_deref(), Some("gen"));
        assert_eq!(build_file.steps.len(), 1);
        assert_eq!(build_file.steps[0].descriptor_set_out.as_deref(), Some("a.desc"));
        assert!(build_file.steps[0].flags.is_none());
    }
}
