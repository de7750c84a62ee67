use std::ffi::c_int;
use std::fmt;
use std::io::{self, Write};

use xtables_abi::{ULOG_DEFAULT_NLGROUP, ULOG_PREFIX_LEN, XTABLES_VERSION, ipt_ulog_info};

/// Option ids, as listed in the option table.
pub const OPT_NLGROUP: c_int = b'!' as c_int;
pub const OPT_PREFIX: c_int = b'#' as c_int;

// Bits in the per-rule flags word.
pub const FLAG_NLGROUP: u32 = 0x01;
pub const FLAG_PREFIX: u32 = 0x02;

pub const MAX_NLGROUP: u32 = 32;

/// Longest prefix that fits next to its terminator.
pub const MAX_PREFIX_LEN: usize = ULOG_PREFIX_LEN - 1;

/// Rejected option. Fatal for the rule being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterProblem {
    pub msg: String,
}

impl ParameterProblem {
    pub fn new<M: Into<String>>(m: M) -> Self {
        Self { msg: m.into() }
    }
}

impl fmt::Display for ParameterProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for ParameterProblem {}

pub type UlogResult<T> = Result<T, ParameterProblem>;

/// Decoded `ipt_ulog_info`: the fields this target configures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub nl_group: u32,
    pub prefix: Vec<u8>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            nl_group: ULOG_DEFAULT_NLGROUP,
            prefix: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Reads the configured fields out of the kernel payload. The prefix
    /// ends at the first NUL or at the end of the buffer.
    pub fn decode(info: &ipt_ulog_info) -> Self {
        let prefix = info
            .prefix
            .iter()
            .map(|&c| c as u8)
            .take_while(|&b| b != 0)
            .collect();
        Self {
            nl_group: info.nl_group,
            prefix,
        }
    }

    /// Writes the configured fields into the kernel payload. `copy_range`
    /// and `qthreshold` are left as they are.
    pub fn encode_into(&self, info: &mut ipt_ulog_info) {
        info.nl_group = self.nl_group;
        info.prefix = [0; ULOG_PREFIX_LEN];
        for (dst, &src) in info.prefix.iter_mut().zip(self.prefix.iter().take(MAX_PREFIX_LEN)) {
            *dst = src as _;
        }
    }

    /// Applies one option. `arg` is the option argument, `invert` is set if
    /// the option was preceded by `!`.
    pub fn parse_option(
        &mut self,
        id: c_int,
        arg: &[u8],
        invert: bool,
        flags: &mut u32,
    ) -> UlogResult<()> {
        match id {
            OPT_NLGROUP => self.set_nlgroup(arg, invert, flags),
            OPT_PREFIX => self.set_prefix(arg, invert, flags),
            _ => Err(ParameterProblem::new(format!("ULOG: unknown option id {id}"))),
        }
    }

    pub fn set_nlgroup(&mut self, arg: &[u8], invert: bool, flags: &mut u32) -> UlogResult<()> {
        if *flags & FLAG_NLGROUP != 0 {
            return Err(ParameterProblem::new("Can't specify --ulog-nlgroup twice"));
        }
        if invert || arg == b"!" {
            return Err(ParameterProblem::new("Unexpected `!' after --ulog-nlgroup"));
        }

        let group = parse_group(arg).ok_or_else(|| {
            ParameterProblem::new(format!(
                "--ulog-nlgroup has to be between 1 and {MAX_NLGROUP}"
            ))
        })?;
        self.nl_group = 1 << (group - 1);

        *flags |= FLAG_NLGROUP;
        Ok(())
    }

    pub fn set_prefix(&mut self, arg: &[u8], invert: bool, flags: &mut u32) -> UlogResult<()> {
        if *flags & FLAG_PREFIX != 0 {
            return Err(ParameterProblem::new("Can't specify --ulog-prefix twice"));
        }
        if invert || arg == b"!" {
            return Err(ParameterProblem::new("Unexpected `!' after --ulog-prefix"));
        }
        if arg.len() > MAX_PREFIX_LEN {
            return Err(ParameterProblem::new(format!(
                "Maximum prefix length {MAX_PREFIX_LEN} for --ulog-prefix"
            )));
        }
        // Would be cut short by the terminator on the way into the kernel.
        if arg.contains(&0) {
            return Err(ParameterProblem::new("--ulog-prefix must not contain NUL bytes"));
        }

        self.prefix = arg.to_vec();
        *flags |= FLAG_PREFIX;
        Ok(())
    }

    /// Human readable form, as shown when listing rules.
    pub fn print<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(b"ULOG ")?;
        out.write_all(b"nlgroup ")?;
        write_groups(out, self.nl_group)?;
        if !self.prefix.is_empty() {
            out.write_all(b"prefix `")?;
            out.write_all(&self.prefix)?;
            out.write_all(b"' ")?;
        }
        Ok(())
    }

    /// Options that rebuild this config, as written by rule saves. The
    /// default group is left out.
    pub fn save<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if !self.prefix.is_empty() {
            out.write_all(b"--ulog-prefix ")?;
            out.write_all(&self.prefix)?;
            out.write_all(b" ")?;
        }

        if self.nl_group != ULOG_DEFAULT_NLGROUP {
            out.write_all(b"--ulog-nlgroup ")?;
            write_groups(out, self.nl_group)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Strict decimal group number in `1..=32`.
fn parse_group(arg: &[u8]) -> Option<u32> {
    std::str::from_utf8(arg)
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|g| (1..=MAX_NLGROUP).contains(g))
}

/// Writes the groups set in `mask`, highest first, each followed by a space.
pub fn write_groups<W: Write>(out: &mut W, mask: u32) -> io::Result<()> {
    for bit in (0..MAX_NLGROUP).rev() {
        if mask & (1 << bit) != 0 {
            write!(out, "{} ", bit + 1)?;
        }
    }
    Ok(())
}

pub fn help<W: Write>(out: &mut W) -> io::Result<()> {
    write!(
        out,
        "ULOG v{} options:\n \
         --ulog-nlgroup nlgroup\t\tNETLINK group used for logging\n \
         --ulog-prefix prefix\t\tPrefix log messages with this prefix.\n\n",
        XTABLES_VERSION.to_string_lossy()
    )
}

/// Both options are optional and independent of each other.
pub fn final_check(_flags: u32) -> UlogResult<()> {
    Ok(())
}
