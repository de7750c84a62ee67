use std::io::Write;
use std::process::ExitCode;

use crate::cli::{OutputFormat, RuleCfg};
use crate::error::XtablesResult;
use crate::target::options::TargetBuilder;
use crate::target::registry::TargetRegistry;

/// Builds the target part of one rule and writes it out.
pub struct Rule {
    cfg: RuleCfg,
}

impl Rule {
    pub fn new(cfg: RuleCfg) -> Self {
        Self { cfg }
    }

    pub fn exec<W: Write>(&self, registry: &mut TargetRegistry, out: &mut W) -> XtablesResult<ExitCode> {
        let target = registry.find_or_load(&self.cfg.target.name, self.cfg.target.path.as_deref())?;
        let data = TargetBuilder::new(target).build(&self.cfg.args)?;
        log::trace!("{} payload ({} bytes): {:?}", target.name(), data.len(), data);

        match self.cfg.format {
            OutputFormat::Print => {
                out.write_all(&target.print(&data, self.cfg.numeric)?)?;
                out.write_all(b"\n")?;
            }
            OutputFormat::Save => {
                let saved = target.save(&data)?;
                write!(out, "-j {} ", target.name())?;
                out.write_all(&saved)?;
                if !saved.ends_with(b"\n") {
                    out.write_all(b"\n")?;
                }
            }
        }
        out.flush()?;
        Ok(ExitCode::SUCCESS)
    }
}
