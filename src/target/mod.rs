pub mod loader;
pub mod options;
pub mod registry;

use libloading::Library;
use std::{
    ffi::{CStr, CString, c_int, c_uint, c_void},
    fmt, ptr,
};

use xtables_abi::{XT_OK, XTABLES_TARGET_ABI_VERSION, XTABLES_VERSION, xt_option_t, xt_sink_t, xt_target_v1};

use crate::error::{OTHER_PROBLEM, XtablesError, XtablesResult};

/// One entry of a target's option table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOption {
    pub name: String,
    pub has_arg: bool,
    pub id: c_int,
}

/// Per-rule target payload. Zeroed, 8-byte aligned, exactly `size` bytes as
/// announced by the target.
pub struct TargetData {
    words: Vec<u64>,
    len: usize,
    pub nfcache: c_uint,
}

impl TargetData {
    fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(size_of::<u64>())],
            len,
            nfcache: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        // words holds at least len bytes
        unsafe { std::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }

    fn as_ptr(&self) -> *const c_void {
        self.words.as_ptr() as *const c_void
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr() as *mut c_void
    }
}

impl fmt::Debug for TargetData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.as_bytes() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A validated target vtable, either linked in or loaded from a library.
pub struct Target {
    name: String,
    options: Vec<TargetOption>,
    v1: &'static xt_target_v1,
    // Declared last so the library outlives every use of v1.
    _lib: Option<Library>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("size", &self.v1.size)
            .field("options", &self.options)
            .field("loaded", &self._lib.is_some())
            .finish()
    }
}

unsafe extern "C" fn sink_write(ctx: *mut c_void, data: *const u8, len: usize) {
    if ctx.is_null() || data.is_null() || len == 0 {
        return;
    }
    let buf = unsafe { &mut *(ctx as *mut Vec<u8>) };
    buf.extend_from_slice(unsafe { std::slice::from_raw_parts(data, len) });
}

/// Runs `f` with a sink collecting everything written to it.
fn collect<R>(f: impl FnOnce(*const xt_sink_t) -> R) -> (R, Vec<u8>) {
    let mut buf = Vec::new();
    let sink = xt_sink_t {
        ctx: &mut buf as *mut Vec<u8> as *mut c_void,
        write: sink_write,
    };
    let r = f(&sink);
    (r, buf)
}

/// Reads a null-name terminated option table.
unsafe fn read_options(mut opt: *const xt_option_t) -> XtablesResult<Vec<TargetOption>> {
    let mut options = Vec::new();
    if opt.is_null() {
        return Ok(options);
    }
    loop {
        let entry = unsafe { &*opt };
        if entry.name.is_null() {
            return Ok(options);
        }
        let name = unsafe { CStr::from_ptr(entry.name) }
            .to_str()
            .map_err(|_| XtablesError::new("Target option name is not valid UTF-8", OTHER_PROBLEM))?;
        options.push(TargetOption {
            name: name.to_string(),
            has_arg: entry.has_arg != 0,
            id: entry.val,
        });
        opt = unsafe { opt.add(1) };
    }
}

impl Target {
    /// Checks the vtable against this host and reads its metadata.
    ///
    /// # Safety
    /// `v1` and every pointer in it must stay valid for as long as `lib` is
    /// loaded, or forever when `lib` is `None`.
    pub unsafe fn from_vtable(v1: &'static xt_target_v1, lib: Option<Library>) -> XtablesResult<Self> {
        if v1.abi_version != XTABLES_TARGET_ABI_VERSION {
            return Err(XtablesError::version_problem(format!(
                "Target ABI version {} not supported (expected {})",
                v1.abi_version, XTABLES_TARGET_ABI_VERSION
            )));
        }
        if (v1.struct_size as usize) < size_of::<xt_target_v1>() {
            return Err(XtablesError::version_problem("Target vtable struct too small"));
        }
        if v1.name.is_null() {
            return Err(XtablesError::new("Target has no name", OTHER_PROBLEM));
        }

        let name = unsafe { CStr::from_ptr(v1.name) }
            .to_str()
            .map_err(|_| XtablesError::new("Target name is not valid UTF-8", OTHER_PROBLEM))?
            .to_string();

        let version = if v1.version.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(v1.version) }.to_string_lossy().into_owned()
        };
        let ours = XTABLES_VERSION.to_string_lossy();
        if version != ours {
            return Err(XtablesError::version_problem(format!(
                "Extension {name} was compiled for xtables {version} (I'm {ours})"
            )));
        }

        if v1.userspacesize > v1.size {
            return Err(XtablesError::new(
                format!("Target {name}: userspacesize {} exceeds size {}", v1.userspacesize, v1.size),
                OTHER_PROBLEM,
            ));
        }

        let options = unsafe { read_options(v1.opts) }?;

        Ok(Self {
            name,
            options,
            v1,
            _lib: lib,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &[TargetOption] {
        &self.options
    }

    pub fn find_option(&self, name: &str) -> Option<&TargetOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn help(&self) -> Vec<u8> {
        let ((), out) = collect(|sink| unsafe { (self.v1.help)(sink) });
        out
    }

    /// Fresh payload with the target's defaults filled in.
    pub fn init(&self) -> TargetData {
        let mut data = TargetData::zeroed(self.v1.size);
        let mut nfcache: c_uint = 0;
        unsafe { (self.v1.init)(data.as_mut_ptr(), &mut nfcache) };
        data.nfcache = nfcache;
        data
    }

    pub fn parse(
        &self,
        data: &mut TargetData,
        opt: &TargetOption,
        arg: Option<&str>,
        invert: bool,
        flags: &mut u32,
    ) -> XtablesResult<()> {
        self.check_data(data)?;
        let arg = arg
            .map(CString::new)
            .transpose()
            .map_err(|_| {
                XtablesError::parameter_problem(format!(
                    "Argument of --{} contains a NUL byte",
                    opt.name
                ))
            })?;

        let mut seen: c_uint = *flags;
        let (rc, err) = collect(|sink| unsafe {
            (self.v1.parse)(
                opt.id,
                arg.as_ref().map_or(ptr::null(), |a| a.as_ptr()),
                c_int::from(invert),
                &mut seen,
                data.as_mut_ptr(),
                sink,
            )
        });
        *flags = seen;
        self.status(rc, err)
    }

    pub fn final_check(&self, flags: u32) -> XtablesResult<()> {
        let (rc, err) = collect(|sink| unsafe { (self.v1.final_check)(flags, sink) });
        self.status(rc, err)
    }

    pub fn print(&self, data: &TargetData, numeric: bool) -> XtablesResult<Vec<u8>> {
        self.check_data(data)?;
        let ((), out) =
            collect(|sink| unsafe { (self.v1.print)(data.as_ptr(), c_int::from(numeric), sink) });
        Ok(out)
    }

    pub fn save(&self, data: &TargetData) -> XtablesResult<Vec<u8>> {
        self.check_data(data)?;
        let ((), out) = collect(|sink| unsafe { (self.v1.save)(data.as_ptr(), sink) });
        Ok(out)
    }

    fn check_data(&self, data: &TargetData) -> XtablesResult<()> {
        if data.len() != self.v1.size {
            return Err(XtablesError::new(
                format!(
                    "Target {}: payload of {} bytes, expected {}",
                    self.name,
                    data.len(),
                    self.v1.size
                ),
                OTHER_PROBLEM,
            ));
        }
        Ok(())
    }

    fn status(&self, rc: i32, err: Vec<u8>) -> XtablesResult<()> {
        if rc == XT_OK {
            return Ok(());
        }
        let msg = String::from_utf8_lossy(&err).into_owned();
        let msg = if msg.is_empty() {
            format!("Target {} failed with status {rc}", self.name)
        } else {
            msg
        };
        Err(XtablesError::from_status(rc, msg))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{PARAMETER_PROBLEM, VERSION_PROBLEM};
    use std::ffi::c_char;

    unsafe extern "C" fn noop_help(_out: *const xt_sink_t) {}
    unsafe extern "C" fn noop_init(_data: *mut c_void, _nfcache: *mut c_uint) {}
    unsafe extern "C" fn failing_parse(
        _id: c_int,
        _optarg: *const c_char,
        _invert: c_int,
        _flags: *mut c_uint,
        _data: *mut c_void,
        _err: *const xt_sink_t,
    ) -> i32 {
        xtables_abi::XT_PARAMETER_PROBLEM
    }
    unsafe extern "C" fn ok_final_check(_flags: c_uint, _err: *const xt_sink_t) -> i32 {
        XT_OK
    }
    unsafe extern "C" fn noop_print(_data: *const c_void, _numeric: c_int, _out: *const xt_sink_t) {}
    unsafe extern "C" fn noop_save(_data: *const c_void, _out: *const xt_sink_t) {}

    /// A do-nothing vtable with the given identity, leaked for 'static.
    pub(crate) fn fake_vtable(
        name: &'static CStr,
        version: &'static CStr,
        abi_version: u32,
    ) -> &'static xt_target_v1 {
        Box::leak(Box::new(xt_target_v1 {
            abi_version,
            struct_size: size_of::<xt_target_v1>() as u32,
            name: name.as_ptr(),
            version: version.as_ptr(),
            size: 8,
            userspacesize: 8,
            opts: ptr::null(),
            help: noop_help,
            init: noop_init,
            parse: failing_parse,
            final_check: ok_final_check,
            print: noop_print,
            save: noop_save,
        }))
    }

    #[test]
    fn rejects_foreign_abi_and_version() {
        let v1 = fake_vtable(c"FAKE", XTABLES_VERSION, XTABLES_TARGET_ABI_VERSION + 1);
        let err = unsafe { Target::from_vtable(v1, None) }.unwrap_err();
        assert_eq!(err.code, VERSION_PROBLEM);

        let v1 = fake_vtable(c"FAKE", c"0.0.1", XTABLES_TARGET_ABI_VERSION);
        let err = unsafe { Target::from_vtable(v1, None) }.unwrap_err();
        assert_eq!(err.code, VERSION_PROBLEM);
        assert!(err.msg.starts_with("Extension FAKE was compiled for xtables 0.0.1"));
    }

    #[test]
    fn silent_failure_gets_a_message() -> XtablesResult<()> {
        let v1 = fake_vtable(c"FAKE", XTABLES_VERSION, XTABLES_TARGET_ABI_VERSION);
        let target = unsafe { Target::from_vtable(v1, None) }?;
        assert!(target.options().is_empty());

        let mut data = target.init();
        assert_eq!(data.as_bytes(), &[0u8; 8]);
        let opt = TargetOption {
            name: "x".into(),
            has_arg: false,
            id: 1,
        };
        let mut flags = 0;
        let err = target.parse(&mut data, &opt, None, false, &mut flags).unwrap_err();
        assert_eq!(err.code, PARAMETER_PROBLEM);
        assert_eq!(err.msg, "Target FAKE failed with status 2");
        target.final_check(flags)?;
        Ok(())
    }

    #[test]
    fn foreign_payload_is_refused() -> XtablesResult<()> {
        let v1 = fake_vtable(c"FAKE", XTABLES_VERSION, XTABLES_TARGET_ABI_VERSION);
        let target = unsafe { Target::from_vtable(v1, None) }?;
        let data = TargetData::zeroed(3);
        assert!(target.save(&data).is_err());
        Ok(())
    }

    #[cfg(feature = "builtin-ulog")]
    mod ulog {
        use super::*;
        use xtables_abi::{ipt_ulog_info, xt_align};

        fn ulog() -> Target {
            unsafe { Target::from_vtable(ulog_target::ulog_target(), None) }.unwrap()
        }

        fn opt<'a>(t: &'a Target, name: &str) -> &'a TargetOption {
            t.find_option(name).unwrap()
        }

        #[test]
        fn metadata_and_options() {
            let t = ulog();
            assert_eq!(t.name(), "ULOG");
            let names: Vec<_> = t.options().iter().map(|o| o.name.as_str()).collect();
            assert_eq!(names, ["ulog-nlgroup", "ulog-prefix"]);
            assert!(t.options().iter().all(|o| o.has_arg));
        }

        #[test]
        fn payload_matches_kernel_layout() -> XtablesResult<()> {
            let t = ulog();
            let mut data = t.init();
            assert_eq!(data.len(), xt_align(size_of::<ipt_ulog_info>()));
            assert_ne!(data.nfcache, 0);

            let mut flags = 0;
            t.parse(&mut data, opt(&t, "ulog-nlgroup"), Some("2"), false, &mut flags)?;
            t.parse(&mut data, opt(&t, "ulog-prefix"), Some("fw"), false, &mut flags)?;
            assert_eq!(flags, 0x03);

            let bytes = data.as_bytes();
            assert_eq!(&bytes[0..4], &2u32.to_ne_bytes());
            let prefix_at = std::mem::offset_of!(ipt_ulog_info, prefix);
            assert_eq!(&bytes[prefix_at..prefix_at + 3], b"fw\0");
            Ok(())
        }

        #[test]
        fn renders_through_host_sinks() -> XtablesResult<()> {
            let t = ulog();
            let data = t.init();
            assert_eq!(t.print(&data, false)?, b"ULOG nlgroup 1 ");
            assert!(t.save(&data)?.is_empty());
            assert!(String::from_utf8_lossy(&t.help()).contains("--ulog-nlgroup"));
            Ok(())
        }

        #[test]
        fn plugin_message_becomes_parameter_problem() {
            let t = ulog();
            let mut data = t.init();
            let mut flags = 0;
            let err = t
                .parse(&mut data, opt(&t, "ulog-nlgroup"), Some("5"), true, &mut flags)
                .unwrap_err();
            assert_eq!(err.code, PARAMETER_PROBLEM);
            assert_eq!(err.msg, "Unexpected `!' after --ulog-nlgroup");

            let err = t
                .parse(&mut data, opt(&t, "ulog-prefix"), Some("a\0b"), false, &mut flags)
                .unwrap_err();
            assert_eq!(err.code, PARAMETER_PROBLEM);
        }
    }
}
