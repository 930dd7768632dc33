//! protoc-c build driver
//!
//! This library teaches a build pipeline how to run `protoc-c` over `.proto`
//! interface files. It works out which generated files each build step will
//! produce (`.pb-c.c`, `.pb-c.h` and `.rb` per source, plus an optional
//! descriptor set), rewrites the source paths relative to the directory they
//! were registered from, and constructs the compiler command line. Parsing
//! the `.proto` files themselves is left entirely to `protoc-c`.

use std::error::Error;
use std::fmt;
use std::io;

pub mod command;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod detect;
pub mod flags;
pub mod resolver;
pub mod search_path;

pub use command::ProtocCommand;
pub use config::{BuildFile, ConfigError, ProtocConfig, StepDecl};
pub use context::{BuildContext, BuildPlan, BuildStep, CommandRunner, ProcessRunner, StepOverrides};
pub use descriptor::DescriptorError;
pub use detect::{detect, exists, Programs};
pub use flags::FlagsError;
pub use resolver::{resolve, Artifact, ArtifactKind, ArtifactSet, OutputSpec, PrefixMode, Resolution, Resolver};
pub use search_path::SearchPath;

/// Errors that can occur while registering or running build steps
#[derive(Debug)]
pub enum BuildError {
    Config(ConfigError),
    Flags(FlagsError),
    Descriptor(DescriptorError),
    Io(io::Error),
    /// A step was registered without sources
    NoSources(String),
    /// Two steps would write the same file
    DuplicateTarget(String),
    /// The compiler could not be started
    Spawn { program: String, source: io::Error },
    /// The compiler ran and exited unsuccessfully
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Config(err) => write!(f, "Configuration error: {}", err),
            BuildError::Flags(err) => write!(f, "Invalid flags: {}", err),
            BuildError::Descriptor(err) => write!(f, "{}", err),
            BuildError::Io(err) => write!(f, "I/O error: {}", err),
            BuildError::NoSources(root) => write!(f, "No sources given for step under '{}'", root),
            BuildError::DuplicateTarget(path) => {
                write!(f, "Target '{}' is declared by more than one step", path)
            }
            BuildError::Spawn { program, source } => {
                write!(f, "Failed to run {}: {}", program, source)
            }
            BuildError::CommandFailed { program, code, stderr } => {
                match code {
                    Some(code) => write!(f, "{} exited with status {}", program, code)?,
                    None => write!(f, "{} was terminated by a signal", program)?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BuildError::Config(err) => Some(err),
            BuildError::Flags(err) => Some(err),
            BuildError::Descriptor(err) => Some(err),
            BuildError::Io(err) => Some(err),
            BuildError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for BuildError {
    fn from(err: ConfigError) -> Self {
        BuildError::Config(err)
    }
}

impl From<FlagsError> for BuildError {
    fn from(err: FlagsError) -> Self {
        BuildError::Flags(err)
    }
}

impl From<DescriptorError> for BuildError {
    fn from(err: DescriptorError) -> Self {
        BuildError::Descriptor(err)
    }
}

impl From<io::Error> for BuildError {
    fn from(err: io::Error) -> Self {
        BuildError::Io(err)
    }
}

/// Register the steps of a build file and run them with `protoc-c`
///
/// Returns the number of steps executed.
pub fn run_build_file(build_file: BuildFile) -> Result<usize, BuildError> {
    let mut config = build_file.config;
    config.apply_env();
    let programs = Programs::resolve(&config);

    let plan = plan_build_file(config, &build_file.steps)?;
    plan.execute(&programs, &mut ProcessRunner)
}

/// Register every step of a build file and freeze the result
pub fn plan_build_file(config: ProtocConfig, steps: &[StepDecl]) -> Result<BuildPlan, BuildError> {
    let mut context = BuildContext::new(config)?;
    for step in steps {
        context.register_with(
            &step.root,
            &step.sources,
            StepOverrides {
                out_dir: step.out_dir.clone(),
                descriptor_set: step.descriptor_set_out.clone(),
                flags: step.flags.clone(),
            },
        )?;
    }
    Ok(context.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_build_file() {
        let build_file: BuildFile = serde_json::from_str(
            r#"{
                "config": { "out_dir": "gen", "include_dirs": ["/usr/include"] },
                "steps": [
                    { "root": "src/kv", "sources": ["src/kv/riak_kv.proto"] },
                    { "root": "src", "sources": ["src/riak.proto"], "descriptor_set_out": "riak.desc" }
                ]
            }"#,
        )
        .unwrap();

        let plan = plan_build_file(build_file.config, &build_file.steps).unwrap();
        assert_eq!(plan.steps().len(), 2);
        assert_eq!(
            plan.search_path().iter().collect::<Vec<_>>(),
            vec!["src", "src/kv", "/usr/include"]
        );
        assert_eq!(
            plan.steps()[1].resolution.artifacts.paths(),
            vec!["gen/riak.pb-c.c", "gen/riak.pb-c.h", "gen/riak.rb", "riak.desc"]
        );
    }

    #[test]
    fn test_error_display() {
        let err = BuildError::CommandFailed {
            program: "protoc-c".to_string(),
            code: Some(1),
            stderr: "foo.proto: File not found.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "protoc-c exited with status 1: foo.proto: File not found."
        );

        let err = BuildError::from(FlagsError::TrailingEscape);
        assert!(err.source().is_some());
    }
}
