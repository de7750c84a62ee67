use crate::error::{XtablesError, XtablesResult};
use crate::target::{Target, TargetData, TargetOption};

/// Receiver of the options found on a rule's target arguments.
#[cfg_attr(test, mockall::automock)]
pub trait OptionHandler {
    /// Looks up a long option by name, without the leading "--".
    fn lookup(&self, name: &str) -> Option<TargetOption>;

    /// Applies one option. `flags` is the per-rule word of the target.
    fn handle(
        &mut self,
        opt: &TargetOption,
        arg: Option<String>,
        invert: bool,
        flags: &mut u32,
    ) -> XtablesResult<()>;
}

/// Walks target arguments getopt style and hands each option to `handler`.
/// A lone `!` negates the option after it. Returns the final flags word.
pub fn parse_target_args<H: OptionHandler>(handler: &mut H, args: &[String]) -> XtablesResult<u32> {
    let mut flags = 0;
    let mut invert = false;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "!" {
            if invert {
                return Err(XtablesError::parameter_problem("Multiple `!' flags not allowed"));
            }
            invert = true;
            continue;
        }

        let Some(body) = arg.strip_prefix("--") else {
            return Err(XtablesError::parameter_problem(format!("Bad argument `{arg}'")));
        };
        let (name, inline) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (body, None),
        };

        let opt = handler
            .lookup(name)
            .ok_or_else(|| XtablesError::parameter_problem(format!("Unknown arg `{arg}'")))?;

        let value = if opt.has_arg {
            match inline {
                Some(v) => Some(v),
                None => Some(iter.next().cloned().ok_or_else(|| {
                    XtablesError::parameter_problem(format!(
                        "option `--{}' requires an argument",
                        opt.name
                    ))
                })?),
            }
        } else {
            if inline.is_some() {
                return Err(XtablesError::parameter_problem(format!(
                    "option `--{}' doesn't allow an argument",
                    opt.name
                )));
            }
            None
        };

        log::debug!(
            "Option {}--{} {}",
            if invert { "! " } else { "" },
            opt.name,
            value.as_deref().unwrap_or("")
        );
        handler.handle(&opt, value, invert, &mut flags)?;
        invert = false;
    }

    if invert {
        return Err(XtablesError::parameter_problem(
            "Unexpected `!' at end of target options",
        ));
    }
    Ok(flags)
}

/// Feeds options straight into a target's payload.
pub struct TargetBuilder<'a> {
    target: &'a Target,
    data: TargetData,
}

impl<'a> TargetBuilder<'a> {
    pub fn new(target: &'a Target) -> Self {
        Self {
            target,
            data: target.init(),
        }
    }

    /// Parses all `args`, runs the target's final check and returns the
    /// finished payload.
    pub fn build(mut self, args: &[String]) -> XtablesResult<TargetData> {
        let flags = parse_target_args(&mut self, args)?;
        self.target.final_check(flags)?;
        Ok(self.data)
    }
}

impl OptionHandler for TargetBuilder<'_> {
    fn lookup(&self, name: &str) -> Option<TargetOption> {
        self.target.find_option(name).cloned()
    }

    fn handle(
        &mut self,
        opt: &TargetOption,
        arg: Option<String>,
        invert: bool,
        flags: &mut u32,
    ) -> XtablesResult<()> {
        self.target
            .parse(&mut self.data, opt, arg.as_deref(), invert, flags)
    }
}
