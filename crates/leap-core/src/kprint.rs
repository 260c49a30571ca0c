//! Kernel-style print macros for the LEAP runtime
//!
//! Thread-safe, optionally-flushing diagnostic output on stderr. Every
//! subsystem (matcher, schedulers, RRR monitor, channel I/O) reports through
//! these macros so one env var controls the whole process.
//!
//! # Environment Variables
//!
//! - `LEAP_FLUSH_EPRINT=1` - Flush stderr after each print (useful when a module aborts)
//! - `LEAP_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `LEAP_LOG_THREAD=1` - Prefix each leveled line with the OS thread id
//! - `LEAP_LOG_TARGET=1` - Prefix each leveled line with the emitting module path
//!
//! # Usage
//!
//! ```ignore
//! use leap_core::{kinfo, kwarn};
//!
//! kinfo!("route: {} channels bound", n);
//! kwarn!("dangling SEND '{}'", name);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or digit, as accepted by `LEAP_LOG_LEVEL`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static THREAD_TAG: AtomicBool = AtomicBool::new(false);
static TARGET_TAG: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static ERRORS_LOGGED: AtomicU64 = AtomicU64::new(0);

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    FLUSH_ENABLED.store(
        crate::env::env_get_bool("LEAP_FLUSH_EPRINT", false),
        Ordering::Relaxed,
    );
    THREAD_TAG.store(
        crate::env::env_get_bool("LEAP_LOG_THREAD", false),
        Ordering::Relaxed,
    );
    TARGET_TAG.store(
        crate::env::env_get_bool("LEAP_LOG_TARGET", false),
        Ordering::Relaxed,
    );

    if let Ok(val) = std::env::var("LEAP_LOG_LEVEL") {
        let level = LogLevel::parse(&val).unwrap_or(LogLevel::Info);
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically (overrides `LEAP_LOG_LEVEL`)
pub fn set_log_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    init();
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn set_thread_tag_enabled(enabled: bool) {
    init();
    THREAD_TAG.store(enabled, Ordering::Relaxed);
}

pub fn set_target_tag_enabled(enabled: bool) {
    init();
    TARGET_TAG.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= log_level() as u8
}

/// OS-level id of the calling thread, used for the `[T<tid>]` tag.
pub fn current_thread_tag() -> u64 {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            // Safety: SYS_gettid takes no arguments and cannot fail
            unsafe { libc::syscall(libc::SYS_gettid) as u64 }
        } else if #[cfg(unix)] {
            unsafe { libc::pthread_self() as u64 }
        } else {
            0
        }
    }
}

#[doc(hidden)]
pub fn _kprint_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    if flush_enabled() {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// `kerror!` calls so far, whether or not the level let them print
pub fn errors_logged() -> u64 {
    ERRORS_LOGGED.load(Ordering::Relaxed)
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, target: &str, args: std::fmt::Arguments<'_>) {
    if level == LogLevel::Error {
        ERRORS_LOGGED.fetch_add(1, Ordering::Relaxed);
    }
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    if THREAD_TAG.load(Ordering::Relaxed) {
        let _ = write!(handle, "[T{}] ", current_thread_tag());
    }
    if TARGET_TAG.load(Ordering::Relaxed) {
        let _ = write!(handle, "{}: ", target);
    }
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr (no newline)
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        $crate::kprint::_kprint_impl(format_args!($($arg)*));
    }};
}

/// Print to stderr with newline
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::$level,
            module_path!(),
            format_args!($($arg)*),
        );
    }};
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::__klog!(Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::__klog!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::__klog!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::__klog!(Debug, $($arg)*) };
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::__klog!(Trace, $($arg)*) };
}
