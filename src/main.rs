use clap::Parser;
use log::LevelFilter;
use std::io;
use std::process::ExitCode;
use xtables::cli::{Cmd, Opts, determine_cmd};
use xtables::commands::rule::Rule;
use xtables::commands::target_help::TargetHelp;
use xtables::commands::version::Version;
use xtables::error::XtablesResult;
use xtables::log::{init_logging, resolve_log_settings};
use xtables::target::registry::TargetRegistry;

fn run_xtables() -> XtablesResult<ExitCode> {
    let opts = Opts::parse();
    let (level, path) =
        resolve_log_settings(opts.log_level.as_deref(), opts.log_path.clone(), LevelFilter::Warn)?;
    init_logging(level, path)?;

    let cmd = determine_cmd(opts)?;

    // An explicit library replaces the builtin of the same name.
    let mut registry = match cmd.target().and_then(|t| t.path.as_ref()) {
        Some(_) => TargetRegistry::new(),
        None => TargetRegistry::with_builtins()?,
    };

    let mut out = io::stdout().lock();
    let exit_code = match cmd {
        Cmd::Rule(cfg) => Rule::new(cfg).exec(&mut registry, &mut out)?,
        Cmd::TargetHelp(cfg) => TargetHelp::new(cfg).exec(&mut registry, &mut out)?,
        Cmd::Version => Version {}.exec()?,
    };
    Ok(exit_code)
}

fn main() -> ExitCode {
    if let Err(e) = run_xtables() {
        eprintln!("xtables: {}", e.msg);
        return ExitCode::from(e.code);
    }
    ExitCode::SUCCESS
}
