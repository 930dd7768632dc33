//! Path/target resolution for protoc-c build steps
//!
//! Given the directory of the build description (the root), the `.proto`
//! sources and an output specification, this module computes the source
//! paths handed to `protoc-c` and the full list of artifacts the compiler is
//! expected to produce. Everything here is pure string manipulation; no file
//! system access takes place.


use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, MAIN_SEPARATOR};

/// Suffix of the generated C source file
pub const C_SOURCE_SUFFIX: &str = ".pb-c.c";
/// Suffix of the generated C header file
pub const C_HEADER_SUFFIX: &str = ".pb-c.h";
/// Suffix of the generated Ruby source file
pub const RUBY_SOURCE_SUFFIX: &str = ".rb";

/// How the root directory is stripped from a source path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMode {
    /// The root must be a plain string prefix of the source path.
    ///
    /// This is not segment aware: `/proj/src` also matches `/proj/srcfoo/a.proto`,
    /// which then rewrites to `oo/a.proto`.
    String,

    /// Longest common string prefix of root and source, stripped whenever it
    /// is non-empty. Two unrelated absolute paths still share `/`.
    Common,

    /// Strip only when the root is an ancestor directory of the source.
    Component,
}

impl Default for PrefixMode {
    fn default() -> Self {
        PrefixMode::String
    }
}

impl std::str::FromStr for PrefixMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(PrefixMode::String),
            "common" => Ok(PrefixMode::Common),
            "component" => Ok(PrefixMode::Component),
            other => Err(format!("unknown prefix mode: {}", other)),
        }
    }
}

/// Output configuration of a single build step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSpec {
    /// Target directory; `None` or empty means "same directory as source"
    pub out_dir: Option<String>,

    /// Optional aggregate descriptor-set output
    pub descriptor_set: Option<String>,
}

impl OutputSpec {
    pub fn new<S: Into<String>>(out_dir: S) -> Self {
        OutputSpec {
            out_dir: Some(out_dir.into()),
            descriptor_set: None,
        }
    }

    pub fn with_descriptor_set<S: Into<String>>(mut self, path: S) -> Self {
        self.descriptor_set = Some(path.into());
        self
    }

    /// The output directory, if one is configured and non-empty
    pub fn out_dir(&self) -> Option<&str> {
        self.out_dir.as_deref().filter(|dir| !dir.is_empty())
    }
}

/// Kind of file an artifact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    CSource,
    CHeader,
    RubySource,
    DescriptorSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub kind: ArtifactKind,
}

/// Ordered outputs of one build step: per-module triplets in input order,
/// then the descriptor set (if any)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    /// All artifact paths in order
    pub fn paths(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.path.as_str()).collect()
    }

    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    pub fn descriptor_set(&self) -> Option<&Artifact> {
        self.of_kind(ArtifactKind::DescriptorSet).next()
    }

    fn push<S: Into<String>>(&mut self, path: S, kind: ArtifactKind) {
        self.artifacts.push(Artifact {
            path: path.into(),
            kind,
        });
    }
}

/// Result of resolving one build step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Source paths relative to the root, as passed to the compiler
    pub inputs: Vec<String>,

    /// Everything the compiler is expected to write
    pub artifacts: ArtifactSet,
}

/// Computes rewritten inputs and artifacts for a build step
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    mode: PrefixMode,
}

impl Resolver {
    pub fn new(mode: PrefixMode) -> Self {
        Resolver { mode }
    }

    pub fn mode(&self) -> PrefixMode {
        self.mode
    }

    pub fn resolve<S: AsRef<str>>(&self, root: &str, inputs: &[S], output: &OutputSpec) -> Resolution {
        let rewritten: Vec<String> = inputs
            .iter()
            .map(|input| strip_root(root, input.as_ref(), self.mode))
            .collect();

        let mut artifacts = ArtifactSet::default();
        match output.out_dir() {
            Some(out_dir) => {
                for input in &rewritten {
                    let base = join_output(out_dir, module_stem(input));
                    artifacts.push(format!("{}{}", base, C_SOURCE_SUFFIX), ArtifactKind::CSource);
                    artifacts.push(format!("{}{}", base, C_HEADER_SUFFIX), ArtifactKind::CHeader);
                    artifacts.push(format!("{}{}", base, RUBY_SOURCE_SUFFIX), ArtifactKind::RubySource);
                }
            }
            None if !rewritten.is_empty() => {
                warn!(
                    "No output directory configured; {} source(s) under '{}' declare no generated files",
                    rewritten.len(),
                    root
                );
            }
            None => {}
        }

        if let Some(descriptor_set) = output.descriptor_set.as_deref().filter(|p| !p.is_empty()) {
            artifacts.push(descriptor_set, ArtifactKind::DescriptorSet);
        }

        debug!("Resolved {:?} -> {:?}", rewritten, artifacts.paths());

        Resolution {
            inputs: rewritten,
            artifacts,
        }
    }
}

/// Resolve with the default (string prefix) rule
pub fn resolve<S: AsRef<str>>(
    root: &str,
    inputs: &[S],
    out_dir: &str,
    descriptor_set: Option<&str>,
) -> Resolution {
    let output = OutputSpec {
        out_dir: Some(out_dir.to_string()),
        descriptor_set: descriptor_set.map(str::to_string),
    };
    Resolver::default().resolve(root, inputs, &output)
}

fn is_separator(c: char) -> bool {
    c == '/' || c == MAIN_SEPARATOR
}

/// Rewrite `path` relative to `root` according to `mode`
pub fn strip_root(root: &str, path: &str, mode: PrefixMode) -> String {
    let root = trim_trailing_separators(root);
    if root.is_empty() {
        return path.to_string();
    }

    match mode {
        PrefixMode::String => match path.strip_prefix(root) {
            // the filesystem root already ends in its separator
            Some(rest) if root.ends_with(is_separator) => rest.to_string(),
            Some(rest) => drop_first_char(rest).to_string(),
            None => path.to_string(),
        },
        PrefixMode::Common => {
            let prefix_len = common_prefix_len(root, path);
            if prefix_len > 0 {
                drop_first_char(&path[prefix_len..]).to_string()
            } else {
                path.to_string()
            }
        }
        PrefixMode::Component => match Path::new(path).strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => path.to_string(),
        },
    }
}

fn trim_trailing_separators(root: &str) -> &str {
    let trimmed = root.trim_end_matches(is_separator);
    if trimmed.is_empty() && !root.is_empty() {
        // the filesystem root itself
        &root[..1]
    } else {
        trimmed
    }
}

fn drop_first_char(s: &str) -> &str {
    let mut chars = s.chars();
    chars.next();
    chars.as_str()
}

/// Byte length of the longest common prefix, on char boundaries
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .take_while(|((_, ca), cb)| ca == cb)
        .last()
        .map(|((i, c), _)| i + c.len_utf8())
        .unwrap_or(0)
}

/// The path with the extension of its last component removed
pub fn module_stem(path: &str) -> &str {
    let name_start = path.rfind(is_separator).map(|i| i + 1).unwrap_or(0);
    let name = &path[name_start..];
    let leading_dots = name.len() - name.trim_start_matches('.').len();

    match name[leading_dots..].rfind('.') {
        Some(dot) => &path[..name_start + leading_dots + dot],
        None => path,
    }
}

fn join_output(out_dir: &str, stem: &str) -> String {
    let stem = stem.trim_start_matches(is_separator);
    if out_dir.ends_with(is_separator) {
        format!("{}{}", out_dir, stem)
    } else {
        format!("{}{}{}", out_dir, MAIN_SEPARATOR, stem)
    }
}
