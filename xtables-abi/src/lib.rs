#![no_std]
#![allow(non_camel_case_types)]

use core::ffi::{CStr, c_char, c_int, c_uint, c_void};
use core::mem::{align_of, offset_of, size_of};

pub const XTABLES_TARGET_ABI_VERSION: u32 = 1;

/// Version tag a target was built against. The host refuses targets whose
/// tag differs from its own.
pub const XTABLES_VERSION: &CStr =
    match CStr::from_bytes_with_nul(concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes()) {
        Ok(v) => v,
        Err(_) => panic!("version tag must not contain NUL"),
    };

// Status codes, numbered like the host's exit classes.
pub const XT_OK: i32 = 0;
pub const XT_OTHER_PROBLEM: i32 = 1;
pub const XT_PARAMETER_PROBLEM: i32 = 2;
pub const XT_VERSION_PROBLEM: i32 = 3;

/// nfcache bit: the target's verdict cannot be cached.
pub const NFC_UNKNOWN: c_uint = 0x4000;

/// Alignment of target payloads inside a rule blob.
pub const XT_ALIGNMENT: usize = align_of::<u64>();

/// Round `len` up to the rule blob alignment.
pub const fn xt_align(len: usize) -> usize {
    (len + XT_ALIGNMENT - 1) & !(XT_ALIGNMENT - 1)
}

/// One entry of a target's option table. The table ends with an entry
/// whose `name` is null.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct xt_option_t {
    pub name: *const c_char, // long option name without the leading "--"
    pub has_arg: c_int,      // 0 = no argument, 1 = required argument
    pub val: c_int,          // id handed back to parse()
}

impl xt_option_t {
    pub const END: xt_option_t = xt_option_t {
        name: core::ptr::null(),
        has_arg: 0,
        val: 0,
    };
}

// Option tables are immutable statics of pointers to string literals.
unsafe impl Sync for xt_option_t {}

/// Byte sink owned by the host. Targets write text output and error
/// messages through it.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct xt_sink_t {
    pub ctx: *mut c_void,
    pub write: unsafe extern "C" fn(ctx: *mut c_void, data: *const u8, len: usize),
}

#[repr(C)]
#[derive(Debug)]
pub struct xt_target_v1 {
    pub abi_version: u32,
    pub struct_size: u32,

    /// Target name as used after `-j`. Null-terminated.
    pub name: *const c_char,
    /// Version tag the target was built against. Null-terminated.
    pub version: *const c_char,
    /// Size of the kernel payload, already aligned.
    pub size: usize,
    /// Leading part of the payload that is compared between rules.
    pub userspacesize: usize,
    /// Option table, terminated by `xt_option_t::END`.
    pub opts: *const xt_option_t,

    /// Writes usage text to `out`.
    pub help: unsafe extern "C" fn(out: *const xt_sink_t),

    /// Fills the zeroed payload `data` with defaults.
    /// `nfcache` - cache flags of the rule, may be updated.
    pub init: unsafe extern "C" fn(data: *mut c_void, nfcache: *mut c_uint),

    /// Consumes one option from the table.
    /// `id` - the `val` of the matched option.
    /// `optarg` - the option argument, null if the option takes none.
    /// `invert` - non-zero if the option was preceded by `!`.
    /// `flags` - per-rule bits owned by the host, free for the target's use.
    /// `err` - receives the message when a non-zero status is returned.
    /// Returns the XT_* status code.
    pub parse: unsafe extern "C" fn(
        id: c_int,
        optarg: *const c_char,
        invert: c_int,
        flags: *mut c_uint,
        data: *mut c_void,
        err: *const xt_sink_t,
    ) -> i32,

    /// Validates the payload after all options were parsed.
    /// Returns the XT_* status code.
    pub final_check: unsafe extern "C" fn(flags: c_uint, err: *const xt_sink_t) -> i32,

    /// Writes the human readable form of `data` to `out`.
    pub print: unsafe extern "C" fn(data: *const c_void, numeric: c_int, out: *const xt_sink_t),

    /// Writes `data` to `out` as options this target can parse again.
    pub save: unsafe extern "C" fn(data: *const c_void, out: *const xt_sink_t),
}

// Vtables are immutable statics; the raw pointers reference string
// literals and option tables with static lifetime.
unsafe impl Sync for xt_target_v1 {}

pub type TargetGetter = unsafe extern "C" fn() -> *const xt_target_v1;

// This is the ONLY required exported symbol from target plugins.
// Declared here so cbindgen puts it into the header with the right signature.
unsafe extern "C" {
    pub fn xtables_target_v1_get() -> *const xt_target_v1;
}

/// Capacity of the ULOG prefix buffer, terminator included.
pub const ULOG_PREFIX_LEN: usize = 32;
pub const ULOG_DEFAULT_NLGROUP: c_uint = 1;
pub const ULOG_MAX_QLEN: usize = 50;

/// Payload of the kernel ULOG target, as in `linux/netfilter_ipv4/ipt_ULOG.h`.
///
/// Layout on LP64:
///
/// | field        | offset | size |
/// |--------------|--------|------|
/// | `nl_group`   | 0      | 4    |
/// | `copy_range` | 8      | 8    |
/// | `qthreshold` | 16     | 8    |
/// | `prefix`     | 24     | 32   |
///
/// 56 bytes in total, 8-byte aligned.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ipt_ulog_info {
    pub nl_group: c_uint,
    pub copy_range: usize,
    pub qthreshold: usize,
    pub prefix: [c_char; ULOG_PREFIX_LEN],
}

const _: () = {
    assert!(offset_of!(ipt_ulog_info, nl_group) == 0);
    assert!(offset_of!(ipt_ulog_info, copy_range) == size_of::<usize>());
    assert!(offset_of!(ipt_ulog_info, qthreshold) == 2 * size_of::<usize>());
    assert!(offset_of!(ipt_ulog_info, prefix) == 3 * size_of::<usize>());
    assert!(size_of::<ipt_ulog_info>() == 3 * size_of::<usize>() + ULOG_PREFIX_LEN);
    assert!(align_of::<ipt_ulog_info>() <= XT_ALIGNMENT);
};

#[cfg(target_pointer_width = "64")]
const _: () = assert!(size_of::<ipt_ulog_info>() == 56);
