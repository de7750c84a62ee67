use std::process::ExitCode;

use crate::error::XtablesResult;

pub struct Version {}

impl Version {
    pub fn exec(&self) -> XtablesResult<ExitCode> {
        let version = env!("CARGO_PKG_VERSION");
        let git_commit = option_env!("GIT_COMMIT")
            .filter(|c| !c.is_empty())
            .unwrap_or("unknown");
        let abi = xtables_abi::XTABLES_VERSION.to_string_lossy();
        println!("xtables version {version}\ntarget ABI: {abi}\ncommit: {git_commit}");

        Ok(ExitCode::SUCCESS)
    }
}
