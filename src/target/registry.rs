use std::path::Path;

use crate::error::{OTHER_PROBLEM, XtablesError, XtablesResult};
use crate::target::{Target, loader};

/// Targets known to this process, in registration order. Owned by `main`;
/// dropping it unloads every library it loaded.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the targets linked into this binary.
    pub fn with_builtins() -> XtablesResult<Self> {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "builtin-ulog")]
        registry.register(unsafe { Target::from_vtable(ulog_target::ulog_target(), None) }?)?;

        Ok(registry)
    }

    /// Adds a target. Names are unique.
    pub fn register(&mut self, target: Target) -> XtablesResult<usize> {
        if self.position(target.name()).is_some() {
            return Err(XtablesError::new(
                format!("Target `{}' already registered", target.name()),
                OTHER_PROBLEM,
            ));
        }
        log::debug!("Registered target {}", target.name());
        self.targets.push(target);
        Ok(self.targets.len() - 1)
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.position(name).map(|i| &self.targets[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.name())
    }

    /// Returns the registered target `name`, loading it first if needed.
    /// `path` overrides the library search.
    pub fn find_or_load(&mut self, name: &str, path: Option<&Path>) -> XtablesResult<&Target> {
        let idx = match self.position(name) {
            Some(idx) => idx,
            None => {
                let source = match path {
                    Some(p) => p.to_string_lossy().into_owned(),
                    None => name.to_string(),
                };
                let target = loader::load_target(&source)?;
                if target.name() != name {
                    return Err(XtablesError::new(
                        format!(
                            "Couldn't load target `{}': library provides `{}'",
                            name,
                            target.name()
                        ),
                        OTHER_PROBLEM,
                    ));
                }
                self.register(target)?
            }
        };
        Ok(&self.targets[idx])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::tests::fake_vtable;
    use serial_test::serial;
    use xtables_abi::{XTABLES_TARGET_ABI_VERSION, XTABLES_VERSION};

    fn fake(name: &'static std::ffi::CStr) -> Target {
        unsafe { Target::from_vtable(fake_vtable(name, XTABLES_VERSION, XTABLES_TARGET_ABI_VERSION), None) }
            .unwrap()
    }

    #[test]
    fn register_and_get() -> XtablesResult<()> {
        let mut registry = TargetRegistry::new();
        assert_eq!(registry.register(fake(c"ONE"))?, 0);
        assert_eq!(registry.register(fake(c"TWO"))?, 1);

        assert_eq!(registry.get("TWO").map(|t| t.name()), Some("TWO"));
        assert!(registry.get("two").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), ["ONE", "TWO"]);
        Ok(())
    }

    #[test]
    fn duplicate_names_are_refused() -> XtablesResult<()> {
        let mut registry = TargetRegistry::new();
        registry.register(fake(c"DUP"))?;
        let err = registry.register(fake(c"DUP")).unwrap_err();
        assert_eq!(err.msg, "Target `DUP' already registered");
        assert_eq!(registry.names().count(), 1);
        Ok(())
    }

    #[test]
    #[serial]
    fn registered_targets_are_not_reloaded() -> XtablesResult<()> {
        let mut registry = TargetRegistry::new();
        registry.register(fake(c"LOCAL"))?;
        // A bogus path would fail if the loader were consulted.
        let t = registry.find_or_load("LOCAL", Some(Path::new("/nonexistent/libxt_LOCAL.so")))?;
        assert_eq!(t.name(), "LOCAL");
        Ok(())
    }

    #[test]
    #[serial]
    fn unknown_targets_fail_to_load() {
        unsafe {
            std::env::remove_var(crate::target::loader::LIBDIR_ENV);
        }
        let mut registry = TargetRegistry::new();
        let err = registry.find_or_load("NOPE", None).unwrap_err();
        assert!(err.msg.contains("not found"));
    }

    #[cfg(feature = "builtin-ulog")]
    #[test]
    fn builtins_include_ulog() -> XtablesResult<()> {
        let registry = TargetRegistry::with_builtins()?;
        assert!(registry.get("ULOG").is_some());
        Ok(())
    }
}
