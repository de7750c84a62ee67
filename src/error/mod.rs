use std::fmt;

use xtables_abi::{XT_OTHER_PROBLEM, XT_PARAMETER_PROBLEM, XT_VERSION_PROBLEM};

pub type XtablesResult<T> = Result<T, XtablesError>;

// Exit codes, one per problem class.
pub const OTHER_PROBLEM: u8 = 1;
pub const PARAMETER_PROBLEM: u8 = 2;
pub const VERSION_PROBLEM: u8 = 3;

#[derive(Debug)]
pub struct XtablesError {
    pub msg: String,
    pub code: u8,
}

impl XtablesError {
    pub fn new<M: Into<String>>(m: M, code: u8) -> Self {
        Self {
            msg: m.into(),
            code,
        }
    }

    pub fn parameter_problem<M: Into<String>>(m: M) -> Self {
        Self::new(m, PARAMETER_PROBLEM)
    }

    pub fn version_problem<M: Into<String>>(m: M) -> Self {
        Self::new(m, VERSION_PROBLEM)
    }

    /// Maps a non-zero status returned by a target to its problem class.
    pub fn from_status<M: Into<String>>(status: i32, m: M) -> Self {
        let code = match status {
            XT_PARAMETER_PROBLEM => PARAMETER_PROBLEM,
            XT_VERSION_PROBLEM => VERSION_PROBLEM,
            XT_OTHER_PROBLEM => OTHER_PROBLEM,
            _ => OTHER_PROBLEM,
        };
        Self::new(m, code)
    }
}

impl fmt::Display for XtablesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.msg, self.code)
    }
}

impl std::error::Error for XtablesError {}

impl From<std::io::Error> for XtablesError {
    fn from(err: std::io::Error) -> Self {
        XtablesError::new(format!("IO error: {}", err), OTHER_PROBLEM)
    }
}
