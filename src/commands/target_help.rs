use std::io::Write;
use std::process::ExitCode;

use crate::cli::TargetCfg;
use crate::error::XtablesResult;
use crate::target::registry::TargetRegistry;

/// Prints the usage text of one target.
pub struct TargetHelp {
    cfg: TargetCfg,
}

impl TargetHelp {
    pub fn new(cfg: TargetCfg) -> Self {
        Self { cfg }
    }

    pub fn exec<W: Write>(&self, registry: &mut TargetRegistry, out: &mut W) -> XtablesResult<ExitCode> {
        let target = registry.find_or_load(&self.cfg.name, self.cfg.path.as_deref())?;
        out.write_all(&target.help())?;
        out.flush()?;
        Ok(ExitCode::SUCCESS)
    }
}
