use std::path::PathBuf;

use crate::error::{XtablesError, XtablesResult};

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "xtables",
    override_usage = "xtables -j <TARGET> [--print | --save] [TARGET OPTIONS]...",
    disable_version_flag = true
)]
pub struct Opts {
    /// Target of the rule
    #[arg(long = "jump", short = 'j')]
    pub target: Option<String>,

    /// Show the target the way rule listings do (default)
    #[arg(long = "print", action = ArgAction::SetTrue)]
    pub print: bool,

    /// Show the target as rule options that can be parsed again
    #[arg(long = "save", action = ArgAction::SetTrue)]
    pub save: bool,

    /// Numeric output of addresses and ports
    #[arg(long = "numeric", short = 'n', action = ArgAction::SetTrue)]
    pub numeric: bool,

    /// Show the options of the target and exit
    #[arg(long = "target-help", action = ArgAction::SetTrue)]
    pub target_help: bool,

    /// Load the target from this shared object instead of searching for it
    #[arg(long = "target-path")]
    pub target_path: Option<PathBuf>,

    /// Print debug logs based on log level
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Log file path (default: stderr)
    #[arg(long = "log-path")]
    pub log_path: Option<PathBuf>,

    /// Print the version and exit
    #[arg(long = "version", action = ArgAction::SetTrue)]
    pub version_flag: bool,

    /// Options for the target, e.g. `--ulog-nlgroup 2`. Must come last
    #[arg(
        value_name = "TARGET OPTIONS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub target_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Print,
    Save,
}

#[derive(Debug)]
pub enum Cmd {
    Version,
    TargetHelp(TargetCfg),
    Rule(RuleCfg),
}

impl Cmd {
    pub fn target(&self) -> Option<&TargetCfg> {
        match self {
            Cmd::Version => None,
            Cmd::TargetHelp(cfg) => Some(cfg),
            Cmd::Rule(cfg) => Some(&cfg.target),
        }
    }
}

#[derive(Debug)]
pub struct TargetCfg {
    pub name: String,
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct RuleCfg {
    pub target: TargetCfg,
    pub format: OutputFormat,
    pub numeric: bool,
    pub args: Vec<String>,
}

pub fn determine_cmd(mut opts: Opts) -> XtablesResult<Cmd> {
    if opts.version_flag {
        return Ok(Cmd::Version);
    }

    let name = opts
        .target
        .take()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| XtablesError::parameter_problem("No target given. Use -j <TARGET>"))?;
    let target = TargetCfg {
        name,
        path: opts.target_path.take(),
    };

    if opts.target_help {
        if !opts.target_args.is_empty() {
            return Err(XtablesError::parameter_problem(
                "Cannot use target options with --target-help",
            ));
        }
        return Ok(Cmd::TargetHelp(target));
    }

    if opts.print && opts.save {
        return Err(XtablesError::parameter_problem(
            "Cannot use --print and --save at the same time",
        ));
    }
    let format = if opts.save {
        OutputFormat::Save
    } else {
        OutputFormat::Print
    };

    Ok(Cmd::Rule(RuleCfg {
        target,
        format,
        numeric: opts.numeric,
        args: std::mem::take(&mut opts.target_args),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PARAMETER_PROBLEM;

    fn cmd(argv: &[&str]) -> XtablesResult<Cmd> {
        let opts = Opts::try_parse_from(std::iter::once("xtables").chain(argv.iter().copied()))
            .map_err(|e| XtablesError::parameter_problem(e.to_string()))?;
        determine_cmd(opts)
    }

    #[test]
    fn target_options_are_collected_verbatim() -> XtablesResult<()> {
        let Cmd::Rule(cfg) = cmd(&["-j", "ULOG", "--save", "--ulog-nlgroup", "3", "--ulog-prefix=x"])?
        else {
            panic!("expected a rule command");
        };
        assert_eq!(cfg.target.name, "ULOG");
        assert_eq!(cfg.format, OutputFormat::Save);
        assert_eq!(cfg.args, ["--ulog-nlgroup", "3", "--ulog-prefix=x"]);
        Ok(())
    }

    #[test]
    fn leading_bang_starts_target_options() -> XtablesResult<()> {
        let Cmd::Rule(cfg) = cmd(&["-j", "ULOG", "!", "--ulog-nlgroup", "5"])? else {
            panic!("expected a rule command");
        };
        assert_eq!(cfg.format, OutputFormat::Print);
        assert_eq!(cfg.args, ["!", "--ulog-nlgroup", "5"]);
        Ok(())
    }

    #[test]
    fn version_wins() -> XtablesResult<()> {
        assert!(matches!(cmd(&["--version"])?, Cmd::Version));
        Ok(())
    }

    #[test]
    fn target_help_and_path() -> XtablesResult<()> {
        let c = cmd(&["-j", "ULOG", "--target-help", "--target-path", "/opt/libxt_ULOG.so"])?;
        let cfg = c.target().unwrap();
        assert_eq!(cfg.name, "ULOG");
        assert_eq!(cfg.path.as_deref(), Some(std::path::Path::new("/opt/libxt_ULOG.so")));
        assert!(matches!(c, Cmd::TargetHelp(_)));
        Ok(())
    }

    #[test]
    fn invalid_combinations() {
        let cases: [&[&str]; 3] = [
            &["--save"],
            &["-j", "ULOG", "--print", "--save"],
            &["-j", "ULOG", "--target-help", "--ulog-prefix", "x"],
        ];
        for argv in cases {
            let err = cmd(argv).unwrap_err();
            assert_eq!(err.code, PARAMETER_PROBLEM, "argv {argv:?}");
        }
    }
}
