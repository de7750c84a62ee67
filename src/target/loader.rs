use libloading::{Library, Symbol};
use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use xtables_abi::TargetGetter;

use crate::error::{OTHER_PROBLEM, XtablesError, XtablesResult};
use crate::target::Target;

const DYLIB_EXT: &str = "so";

pub const LIBDIR_ENV: &str = "XTABLES_LIBDIR";

// Default target directories
const DEFAULT_TARGET_DIRS: &[&str] = &["/usr/lib/xtables", "/usr/local/lib/xtables"];

/// Convert libloading::Error to XtablesError.
impl From<libloading::Error> for XtablesError {
    fn from(e: libloading::Error) -> Self {
        XtablesError::new(e.to_string(), OTHER_PROBLEM)
    }
}

/// Resolve target file:
/// 1) If `name_or_path` contains directories or ends with the dylib extension -> treat as path.
/// 2) Else search in: <exe-dir>, $XTABLES_LIBDIR (':'-sep), DEFAULT_TARGET_DIRS.
///    Try filename `libxt_<name>.<ext>`
pub fn resolve_target_path(name_or_path: &str) -> Option<PathBuf> {
    // If the name_or_path is a path, return it if it exists.
    let p = Path::new(name_or_path);
    if matches!(p.parent(), Some(par) if !par.as_os_str().is_empty())
        || p.extension()
            .is_some_and(|ext| ext == OsStr::new(DYLIB_EXT))
    {
        return p.exists().then_some(p.to_path_buf());
    }

    let mut search_dirs: Vec<PathBuf> = Vec::new();

    // Targets shipped next to the xtables executable.
    if let Some(d) = env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
    {
        search_dirs.push(d);
    }

    if let Ok(paths) = env::var(LIBDIR_ENV) {
        for p in paths.split(':').filter(|s| !s.is_empty()) {
            search_dirs.push(PathBuf::from(p));
        }
    }

    for d in DEFAULT_TARGET_DIRS {
        search_dirs.push(PathBuf::from(d));
    }

    let candidate = format!("libxt_{}.{}", name_or_path, DYLIB_EXT);

    for dir in search_dirs {
        let path = dir.join(&candidate);
        log::trace!("Looking for target {} in {}", name_or_path, path.display());
        if path.is_file() {
            return Some(path);
        }
    }
    None
}

/// Loads a target library and validates the vtable it registers.
pub fn load_target(name_or_path: &str) -> XtablesResult<Target> {
    let path = resolve_target_path(name_or_path).ok_or_else(|| {
        XtablesError::new(
            format!("Couldn't load target `{}': not found", name_or_path),
            OTHER_PROBLEM,
        )
    })?;
    log::debug!("Loading target {} from {}", name_or_path, path.display());

    unsafe {
        let lib = Library::new(&path)?;
        let v1 = {
            let sym: Symbol<TargetGetter> = lib.get(b"xtables_target_v1_get")?;
            let v1 = sym();
            if v1.is_null() {
                return Err(XtablesError::new(
                    format!("Couldn't load target `{}': no vtable", name_or_path),
                    OTHER_PROBLEM,
                ));
            }
            &*v1
        };

        // The vtable lives in the library, which the Target keeps loaded.
        Target::from_vtable(v1, Some(lib))
    }
}
