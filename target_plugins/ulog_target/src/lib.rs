#![deny(unsafe_op_in_unsafe_fn)]

pub mod ulog;

use std::ffi::{CStr, c_int, c_uint, c_void};
use std::io::{self, Write};

use xtables_abi::{
    NFC_UNKNOWN, XT_OK, XT_OTHER_PROBLEM, XT_PARAMETER_PROBLEM, XTABLES_TARGET_ABI_VERSION,
    XTABLES_VERSION, ipt_ulog_info, xt_align, xt_option_t, xt_sink_t, xt_target_v1,
};

use crate::ulog::{LogConfig, OPT_NLGROUP, OPT_PREFIX, ParameterProblem};

const ULOG_INFO_SIZE: usize = xt_align(std::mem::size_of::<ipt_ulog_info>());

static OPTS: [xt_option_t; 3] = [
    xt_option_t {
        name: c"ulog-nlgroup".as_ptr(),
        has_arg: 1,
        val: OPT_NLGROUP,
    },
    xt_option_t {
        name: c"ulog-prefix".as_ptr(),
        has_arg: 1,
        val: OPT_PREFIX,
    },
    xt_option_t::END,
];

/// `io::Write` over a host sink. A null sink swallows everything.
struct SinkWriter(*const xt_sink_t);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(sink) = unsafe { self.0.as_ref() } {
            unsafe { (sink.write)(sink.ctx, buf.as_ptr(), buf.len()) };
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn report(err: *const xt_sink_t, status: i32, problem: &ParameterProblem) -> i32 {
    let _ = SinkWriter(err).write_all(problem.msg.as_bytes());
    status
}

/// C ABI: help(out)
unsafe extern "C" fn v1_help(out: *const xt_sink_t) {
    let _ = ulog::help(&mut SinkWriter(out));
}

/// Sets the default group. The rest of the payload stays zeroed.
/// C ABI: init(data, &nfcache)
unsafe extern "C" fn v1_init(data: *mut c_void, nfcache: *mut c_uint) {
    if let Some(info) = unsafe { (data as *mut ipt_ulog_info).as_mut() } {
        LogConfig::default().encode_into(info);
    }
    // Can't cache this
    if let Some(nfcache) = unsafe { nfcache.as_mut() } {
        *nfcache |= NFC_UNKNOWN;
    }
}

/// C ABI: parse(id, optarg, invert, &flags, data, err) -> status
unsafe extern "C" fn v1_parse(
    id: c_int,
    optarg: *const std::ffi::c_char,
    invert: c_int,
    flags: *mut c_uint,
    data: *mut c_void,
    err: *const xt_sink_t,
) -> i32 {
    let (Some(info), Some(flags)) = (
        unsafe { (data as *mut ipt_ulog_info).as_mut() },
        unsafe { flags.as_mut() },
    ) else {
        return report(
            err,
            XT_OTHER_PROBLEM,
            &ParameterProblem::new("ULOG: parse called without target data"),
        );
    };
    if optarg.is_null() {
        return report(
            err,
            XT_PARAMETER_PROBLEM,
            &ParameterProblem::new("ULOG: option requires an argument"),
        );
    }
    let arg = unsafe { CStr::from_ptr(optarg) }.to_bytes();

    let mut cfg = LogConfig::decode(info);
    let mut seen = *flags;
    match cfg.parse_option(id, arg, invert != 0, &mut seen) {
        Ok(()) => {
            cfg.encode_into(info);
            *flags = seen;
            XT_OK
        }
        Err(problem) => report(err, XT_PARAMETER_PROBLEM, &problem),
    }
}

/// C ABI: final_check(flags, err) -> status
unsafe extern "C" fn v1_final_check(flags: c_uint, err: *const xt_sink_t) -> i32 {
    match ulog::final_check(flags) {
        Ok(()) => XT_OK,
        Err(problem) => report(err, XT_PARAMETER_PROBLEM, &problem),
    }
}

/// C ABI: print(data, numeric, out)
unsafe extern "C" fn v1_print(data: *const c_void, _numeric: c_int, out: *const xt_sink_t) {
    if let Some(info) = unsafe { (data as *const ipt_ulog_info).as_ref() } {
        let _ = LogConfig::decode(info).print(&mut SinkWriter(out));
    }
}

/// C ABI: save(data, out)
unsafe extern "C" fn v1_save(data: *const c_void, out: *const xt_sink_t) {
    if let Some(info) = unsafe { (data as *const ipt_ulog_info).as_ref() } {
        let _ = LogConfig::decode(info).save(&mut SinkWriter(out));
    }
}

static VTABLE: xt_target_v1 = xt_target_v1 {
    abi_version: XTABLES_TARGET_ABI_VERSION,
    struct_size: std::mem::size_of::<xt_target_v1>() as u32,
    name: c"ULOG".as_ptr(),
    version: XTABLES_VERSION.as_ptr(),
    size: ULOG_INFO_SIZE,
    userspacesize: ULOG_INFO_SIZE,
    opts: &OPTS as *const [xt_option_t; 3] as *const xt_option_t,
    help: v1_help,
    init: v1_init,
    parse: v1_parse,
    final_check: v1_final_check,
    print: v1_print,
    save: v1_save,
};

/// The ULOG vtable, for hosts that link this crate in statically.
pub fn ulog_target() -> &'static xt_target_v1 {
    &VTABLE
}

/// The exported registration symbol.
#[unsafe(no_mangle)]
pub extern "C" fn xtables_target_v1_get() -> *const xt_target_v1 {
    &VTABLE
}
