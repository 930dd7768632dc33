//! Construction of the protoc-c command line for a build step

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::context::BuildStep;
use crate::search_path::SearchPath;

lazy_static! {
    static ref VAR_RE: Regex = Regex::new(r"\$(?:\{(\w+)\}|(\w+))").unwrap();
}

/// A fully constructed compiler invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocCommand {
    pub program: String,
    pub args: Vec<String>,

    /// Directory the compiler runs in, the current one when unset
    pub working_dir: Option<String>,

    /// Line shown when the command runs
    pub display: String,
}

impl ProtocCommand {
    /// Build the invocation for `step`
    ///
    /// Arguments are, in order: one `-I` per search-path entry, the step's
    /// flags, `--c_out=`, the optional `-o` descriptor set, then the sources.
    pub fn for_step(
        step: &BuildStep,
        search_path: &SearchPath,
        program: &str,
        c_out_flags: &str,
        comstr: Option<&str>,
    ) -> Self {
        let out_dir = c_out_dir(step);

        let mut args = search_path.include_flags();
        args.extend(step.flags.iter().cloned());
        args.push(format!("--c_out={}{}", c_out_flags, out_dir));
        if let Some(descriptor_set) = step.descriptor_set.as_deref().filter(|p| !p.is_empty()) {
            args.push(format!("-o{}", descriptor_set));
        }
        args.extend(step.resolution.inputs.iter().cloned());

        let display = match comstr {
            Some(template) => expand_comstr(template, step, program, &out_dir),
            None => command_line(program, &args),
        };

        ProtocCommand {
            program: program.to_string(),
            args,
            working_dir: None,
            display,
        }
    }

    pub fn in_dir<S: Into<String>>(mut self, dir: Option<S>) -> Self {
        self.working_dir = dir.map(Into::into);
        self
    }

    /// The full shell-quoted command line
    pub fn command_line(&self) -> String {
        command_line(&self.program, &self.args)
    }
}

impl fmt::Display for ProtocCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

/// The directory passed to `--c_out`
///
/// Without a configured output directory this is the directory of the first
/// source as registered (before the root is stripped), or `.` when that
/// source has no directory part.
pub fn c_out_dir(step: &BuildStep) -> String {
    if let Some(out_dir) = step.out_dir.as_deref().filter(|d| !d.is_empty()) {
        return out_dir.to_string();
    }

    step.sources
        .first()
        .and_then(|source| Path::new(source).parent())
        .map(|dir| dir.to_string_lossy().into_owned())
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| ".".to_string())
}

/// Expand `$VAR` and `${VAR}` in a display template
///
/// Known variables are `SOURCES`, `SOURCE`, `TARGETS`, `TARGET`, `PROTOC` and
/// `PROTOCOUTDIR`; anything else expands to nothing.
pub fn expand_comstr(template: &str, step: &BuildStep, program: &str, out_dir: &str) -> String {
    let targets = step.resolution.artifacts.paths();

    VAR_RE
        .replace_all(template, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            match name {
                "SOURCES" => step.resolution.inputs.join(" "),
                "SOURCE" => step.resolution.inputs.first().cloned().unwrap_or_default(),
                "TARGETS" => targets.join(" "),
                "TARGET" => targets.first().map(|t| t.to_string()).unwrap_or_default(),
                "PROTOC" => program.to_string(),
                "PROTOCOUTDIR" => out_dir.to_string(),
                _ => String::new(),
            }
        })
        .into_owned()
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(quote)
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;

    fn step(sources: &[&str], out_dir: Option<&str>, descriptor_set: Option<&str>) -> BuildStep {
        BuildStep {
            root: "src".to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            resolution: resolve("src", sources, out_dir.unwrap_or(""), descriptor_set),
            out_dir: out_dir.map(str::to_string),
            descriptor_set: descriptor_set.map(str::to_string),
            flags: vec!["--verbose".to_string()],
        }
    }

    #[test]
    fn test_argument_order() {
        let step = step(&["src/foo/bar.proto", "src/baz.proto"], Some("gen"), Some("all.desc"));
        let search_path = SearchPath::from_dirs(vec!["src", "/usr/include"]);

        let command = ProtocCommand::for_step(&step, &search_path, "protoc-c", "", None);

        assert_eq!(command.program, "protoc-c");
        assert_eq!(
            command.args,
            vec![
                "-Isrc",
                "-I/usr/include",
                "--verbose",
                "--c_out=gen",
                "-oall.desc",
                "foo/bar.proto",
                "baz.proto",
            ]
        );
        assert_eq!(
            command.to_string(),
            "protoc-c -Isrc -I/usr/include --verbose --c_out=gen -oall.desc foo/bar.proto baz.proto"
        );
    }

    #[test]
    fn test_c_out_flags_and_default_out_dir() {
        let step = step(&["src/foo/bar.proto"], None, None);

        let command = ProtocCommand::for_step(&step, &SearchPath::new(), "protoc-c", "dllexport_decl=API:", None);
        assert!(command.args.contains(&"--c_out=dllexport_decl=API:src/foo".to_string()));
        assert!(!command.args.iter().any(|a| a.starts_with("-o")));
    }

    #[test]
    fn test_default_out_dir_without_directory() {
        assert_eq!(c_out_dir(&step(&["src/bar.proto"], Some(""), None)), "src");
        assert_eq!(c_out_dir(&step(&["bar.proto"], Some(""), None)), ".");
    }

    #[test]
    fn test_default_out_dir_uses_source_directory() {
        // an absolute source outside the root keeps its own directory
        assert_eq!(c_out_dir(&step(&["/other/baz.proto"], None, None)), "/other");
        // partial segment match in string mode does not leak into --c_out
        assert_eq!(c_out_dir(&step(&["srcfoo/a.proto"], None, None)), "srcfoo");
    }

    #[test]
    fn test_comstr_expansion() {
        let step = step(&["src/a.proto", "src/b.proto"], Some("gen"), None);

        let command = ProtocCommand::for_step(
            &step,
            &SearchPath::new(),
            "protoc-c",
            "",
            Some("Generating $TARGET from ${SOURCES} with $PROTOC into $PROTOCOUTDIR$UNKNOWN"),
        );

        assert_eq!(
            command.display,
            "Generating gen/a.pb-c.c from a.proto b.proto with protoc-c into gen"
        );
        assert!(command.command_line().starts_with("protoc-c --verbose --c_out=gen"));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("plain/path.proto"), "plain/path.proto");
        assert_eq!(quote("with space"), "'with space'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
    }
}
