//! Registration of protoc-c build steps and execution of the resulting plan
//!
//! A [`BuildContext`] collects steps. Every registered step runs the resolver
//! and prepends its root to the shared search path, so later compiler
//! invocations can resolve imports against any registered root. Once all steps
//! are known, [`BuildContext::finish`] freezes everything into a read-only
//! [`BuildPlan`] that constructs and runs the commands.

use log::{debug, error, info};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::command::ProtocCommand;
use crate::config::ProtocConfig;
use crate::detect::Programs;
use crate::flags::split_flags;
use crate::resolver::{module_stem, OutputSpec, Resolution, Resolver};
use crate::search_path::SearchPath;
use crate::BuildError;

/// Name the builder registers under
pub const BUILDER_NAME: &str = "Protoc";

/// One registered invocation of the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    /// Directory the step was registered from
    pub root: String,

    /// Sources as registered, relative to the working directory
    pub sources: Vec<String>,

    /// Rewritten sources and declared artifacts
    pub resolution: Resolution,

    pub out_dir: Option<String>,
    pub descriptor_set: Option<String>,

    /// Configured flags followed by the step's own
    pub flags: Vec<String>,
}

/// Per-step replacements for configured values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOverrides {
    pub out_dir: Option<String>,
    pub descriptor_set: Option<String>,
    pub flags: Option<String>,
}

/// Registration phase of a build
#[derive(Debug)]
pub struct BuildContext {
    config: ProtocConfig,
    resolver: Resolver,
    base_flags: Vec<String>,
    search_path: SearchPath,
    steps: Vec<BuildStep>,
    targets: HashSet<String>,
}

impl BuildContext {
    pub fn new(config: ProtocConfig) -> Result<Self, BuildError> {
        let base_flags = split_flags(&config.flags)?;
        let search_path = SearchPath::from_dirs(config.include_dirs.iter().cloned());

        Ok(BuildContext {
            resolver: Resolver::new(config.prefix_mode),
            config,
            base_flags,
            search_path,
            steps: Vec::new(),
            targets: HashSet::new(),
        })
    }

    pub fn config(&self) -> &ProtocConfig {
        &self.config
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// Register `sources` relative to `root` with the configured outputs
    pub fn register<S: AsRef<str>>(&mut self, root: &str, sources: &[S]) -> Result<&BuildStep, BuildError> {
        self.register_with(root, sources, StepOverrides::default())
    }

    pub fn register_with<S: AsRef<str>>(
        &mut self,
        root: &str,
        sources: &[S],
        overrides: StepOverrides,
    ) -> Result<&BuildStep, BuildError> {
        if sources.is_empty() {
            return Err(BuildError::NoSources(root.to_string()));
        }

        let sources: Vec<String> = sources
            .iter()
            .map(|source| self.with_suffix(source.as_ref()))
            .collect();

        let out_dir = overrides.out_dir.or_else(|| self.config.out_dir.clone());
        let descriptor_set = overrides
            .descriptor_set
            .or_else(|| self.config.descriptor_set_out.clone());

        let mut flags = self.base_flags.clone();
        if let Some(step_flags) = overrides.flags.as_deref() {
            flags.extend(split_flags(step_flags)?);
        }

        let output = OutputSpec {
            out_dir: out_dir.clone(),
            descriptor_set: descriptor_set.clone(),
        };
        let resolution = self.resolver.resolve(root, &sources, &output);

        {
            let mut seen = HashSet::new();
            for artifact in resolution.artifacts.iter() {
                if self.targets.contains(&artifact.path) || !seen.insert(artifact.path.as_str()) {
                    error!("{} declared by more than one {} step", artifact.path, BUILDER_NAME);
                    return Err(BuildError::DuplicateTarget(artifact.path.clone()));
                }
            }
        }
        self.targets
            .extend(resolution.artifacts.iter().map(|a| a.path.clone()));

        self.search_path.prepend(if root.is_empty() { "." } else { root });

        info!(
            "Registered {} step under '{}': {} source(s), {} target(s)",
            BUILDER_NAME,
            root,
            resolution.inputs.len(),
            resolution.artifacts.len()
        );

        self.steps.push(BuildStep {
            root: root.to_string(),
            sources,
            resolution,
            out_dir,
            descriptor_set,
            flags,
        });

        Ok(&self.steps[self.steps.len() - 1])
    }

    fn with_suffix(&self, source: &str) -> String {
        if module_stem(source) == source && !self.config.source_suffix.is_empty() {
            format!("{}{}", source, self.config.source_suffix)
        } else {
            source.to_string()
        }
    }

    /// End registration; the search path is fixed from here on
    pub fn finish(self) -> BuildPlan {
        debug!(
            "Freezing build plan: {} step(s), search path {:?}",
            self.steps.len(),
            self.search_path
        );
        BuildPlan {
            config: self.config,
            search_path: self.search_path,
            steps: self.steps,
        }
    }
}

/// Runs a constructed compiler command
pub trait CommandRunner {
    fn run(&mut self, command: &ProtocCommand) -> Result<(), BuildError>;
}

/// Runs commands as child processes
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&mut self, command: &ProtocCommand) -> Result<(), BuildError> {
        let mut process = Command::new(&command.program);
        process.args(&command.args);
        if let Some(dir) = &command.working_dir {
            process.current_dir(dir);
        }

        let output = process.output().map_err(|source| BuildError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{}: {}", command.program, stdout.trim());
        }

        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                program: command.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Frozen set of steps, ready to run
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    config: ProtocConfig,
    search_path: SearchPath,
    steps: Vec<BuildStep>,
}

impl BuildPlan {
    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn command(&self, step: &BuildStep, programs: &Programs) -> ProtocCommand {
        ProtocCommand::for_step(
            step,
            &self.search_path,
            &programs.protoc,
            &self.config.c_out_flags,
            self.config.comstr.as_deref(),
        )
        .in_dir(self.config.working_dir.clone())
    }

    pub fn commands(&self, programs: &Programs) -> Vec<ProtocCommand> {
        self.steps
            .iter()
            .map(|step| self.command(step, programs))
            .collect()
    }

    /// Run every step in registration order, stopping at the first failure
    ///
    /// Parent directories of all declared targets are created before a step
    /// runs. Returns the number of steps executed.
    pub fn execute<R: CommandRunner>(&self, programs: &Programs, runner: &mut R) -> Result<usize, BuildError> {
        for step in &self.steps {
            self.prepare_target_dirs(step)?;

            let command = self.command(step, programs);
            info!("{}", command);
            runner.run(&command).map_err(|e| {
                error!("{} step under '{}' failed: {}", BUILDER_NAME, step.root, e);
                e
            })?;
        }

        Ok(self.steps.len())
    }

    fn prepare_target_dirs(&self, step: &BuildStep) -> Result<(), BuildError> {
        let base = Path::new(self.config.working_dir.as_deref().unwrap_or(""));
        for artifact in step.resolution.artifacts.iter() {
            if let Some(parent) = base.join(&artifact.path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    debug!("Creating output directory {}", parent.display());
                    fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }
}
