use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::error;
use serde::Serialize;
use std::process;

use protoc_c_build::{
    descriptor, exists, plan_build_file, run_build_file, BuildError, BuildFile, BuildPlan,
    PrefixMode, ProtocConfig, Programs, StepDecl,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn from_matches(matches: &ArgMatches) -> Self {
        match matches.value_of("format").unwrap_or("auto") {
            "text" => OutputFormat::Text,
            "json" => OutputFormat::Json,
            _ if atty::is(atty::Stream::Stdout) => OutputFormat::Text,
            _ => OutputFormat::Json,
        }
    }
}

fn step_args<'a, 'b>(cmd: App<'a, 'b>) -> App<'a, 'b> {
    cmd.arg(
        Arg::with_name("root")
            .long("root")
            .takes_value(true)
            .default_value(".")
            .help("Directory the sources are relative to"),
    )
    .arg(
        Arg::with_name("out-dir")
            .long("out-dir")
            .short("o")
            .takes_value(true)
            .help("Directory for generated files (default: same as source)"),
    )
    .arg(
        Arg::with_name("descriptor-set")
            .long("descriptor-set")
            .takes_value(true)
            .help("Also write a file descriptor set"),
    )
    .arg(
        Arg::with_name("prefix-mode")
            .long("prefix-mode")
            .takes_value(true)
            .possible_values(&["string", "common", "component"])
            .help("How the root is stripped from source paths"),
    )
    .arg(
        Arg::with_name("include")
            .long("include")
            .short("I")
            .takes_value(true)
            .multiple(true)
            .number_of_values(1)
            .help("Additional proto search directory"),
    )
    .arg(
        Arg::with_name("flags")
            .long("flags")
            .takes_value(true)
            .allow_hyphen_values(true)
            .help("Extra compiler flags"),
    )
    .arg(
        Arg::with_name("SOURCES")
            .required(true)
            .multiple(true)
            .help(".proto files to compile"),
    )
}

fn format_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("format")
        .long("format")
        .takes_value(true)
        .possible_values(&["auto", "text", "json"])
        .default_value("auto")
}

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("protoc-c-build")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Resolve generated files and run protoc-c for .proto sources")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .long("config")
                .short("c")
                .takes_value(true)
                .global(true)
                .help("JSON configuration file"),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Increase log verbosity"),
        )
        .subcommand(step_args(
            SubCommand::with_name("resolve")
                .about("Print rewritten sources and the files protoc-c will generate")
                .arg(format_arg()),
        ))
        .subcommand(step_args(
            SubCommand::with_name("command").about("Print the protoc-c command line"),
        ))
        .subcommand(
            SubCommand::with_name("run")
                .about("Register and run every step of a build file")
                .arg(Arg::with_name("BUILD_FILE").required(true))
                .arg(
                    Arg::with_name("dry-run")
                        .long("dry-run")
                        .help("Print the commands instead of running them"),
                ),
        )
        .subcommand(SubCommand::with_name("check").about("Check that protoc-c can be found"))
        .subcommand(
            SubCommand::with_name("describe")
                .about("Summarise a file descriptor set written with -o")
                .arg(Arg::with_name("FILE").required(true))
                .arg(format_arg()),
        )
}

fn init_logging(verbosity: u64) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn load_config(matches: &ArgMatches) -> Result<ProtocConfig, BuildError> {
    let mut config = match matches.value_of("config") {
        Some(path) => ProtocConfig::from_file(path)?,
        None => ProtocConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

/// Single-step plan from command line arguments
fn plan_from_args(matches: &ArgMatches, mut config: ProtocConfig) -> Result<BuildPlan, BuildError> {
    if let Some(mode) = matches.value_of("prefix-mode") {
        config.prefix_mode = mode.parse::<PrefixMode>().unwrap_or_default();
    }
    if let Some(includes) = matches.values_of("include") {
        config.include_dirs.extend(includes.map(str::to_string));
    }

    let step = StepDecl {
        root: matches.value_of("root").unwrap_or(".").to_string(),
        sources: matches
            .values_of("SOURCES")
            .map(|values| values.map(str::to_string).collect())
            .unwrap_or_default(),
        out_dir: matches.value_of("out-dir").map(str::to_string),
        descriptor_set_out: matches.value_of("descriptor-set").map(str::to_string),
        flags: matches.value_of("flags").map(str::to_string),
    };

    plan_build_file(config, &[step])
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BuildError> {
    let json = serde_json::to_string_pretty(value).map_err(protoc_c_build::ConfigError::from)?;
    println!("{}", json);
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<i32, BuildError> {
    match matches.subcommand() {
        ("resolve", Some(sub)) => {
            let plan = plan_from_args(sub, load_config(sub)?)?;
            let step = &plan.steps()[0];
            match OutputFormat::from_matches(sub) {
                OutputFormat::Json => print_json(&step.resolution)?,
                OutputFormat::Text => {
                    for input in &step.resolution.inputs {
                        println!("source  {}", input);
                    }
                    for artifact in step.resolution.artifacts.iter() {
                        println!("target  {}", artifact.path);
                    }
                }
            }
        }
        ("command", Some(sub)) => {
            let config = load_config(sub)?;
            let programs = Programs::resolve(&config);
            let plan = plan_from_args(sub, config)?;
            for command in plan.commands(&programs) {
                println!("{}", command.command_line());
            }
        }
        ("run", Some(sub)) => {
            let mut build_file = BuildFile::from_file(sub.value_of("BUILD_FILE").unwrap_or_default())?;
            if let Some(path) = sub.value_of("config") {
                build_file.config = build_file.config.overlay_file(path)?;
            }

            if sub.is_present("dry-run") {
                build_file.config.apply_env();
                let programs = Programs::resolve(&build_file.config);
                let plan = plan_build_file(build_file.config, &build_file.steps)?;
                for command in plan.commands(&programs) {
                    println!("{}", command.command_line());
                }
            } else {
                let count = run_build_file(build_file)?;
                println!("{} step(s) completed", count);
            }
        }
        ("check", Some(sub)) => {
            let config = load_config(sub)?;
            let programs = Programs::resolve(&config);
            if !exists(&config) {
                eprintln!("{} not found", config.protoc);
                return Ok(1);
            }
            println!("protoc: {}", programs.protoc);
            println!("rprotoc: {}", programs.rprotoc);
        }
        ("describe", Some(sub)) => {
            let set = descriptor::load_descriptor_set(sub.value_of("FILE").unwrap_or_default())?;
            let summary = descriptor::summarize(&set);
            match OutputFormat::from_matches(sub) {
                OutputFormat::Json => print_json(&summary)?,
                OutputFormat::Text => {
                    for file in &summary {
                        println!(
                            "{} (package {}): {} message(s), {} enum(s), {} service(s)",
                            file.name,
                            file.package.as_deref().unwrap_or("-"),
                            file.messages,
                            file.enums,
                            file.services
                        );
                        for dependency in &file.dependencies {
                            println!("  imports {}", dependency);
                        }
                    }
                }
            }
        }
        _ => {}
    }

    Ok(0)
}

fn main() {
    let matches = app().get_matches();
    let verbosity = matches
        .subcommand()
        .1
        .map(|sub| sub.occurrences_of("verbose"))
        .unwrap_or(0)
        .max(matches.occurrences_of("verbose"));
    init_logging(verbosity);

    match run(&matches) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
