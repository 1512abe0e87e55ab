//! C Foreign Function Interface for rewind.
//!
//! This module exposes the flat command surface as a **stable C ABI** so the
//! record/playback flows can be driven from C and any language with C FFI
//! support. Three entry points cover the whole surface:
//!
//! ```c
//! int rewind_verbosity(int level);
//! int rewind_record_topics(const char *file, const char *pattern);
//! int rewind_playback_topics(const char *file, const char *pattern);
//! ```
//!
//! All functions return a [`CommandCode`] value: `0` success, `1` failed to
//! open, `2` bad regex, `3` invalid version.
//!
//! # Safety contract
//!
//! * All pointer parameters are checked for null before dereference.
//! * Panics are caught with [`std::panic::catch_unwind`] so they never
//!   cross the FFI boundary.
//!
//! The safe `*_topics` functions are also exported for Rust callers (the
//! CLI uses them); they publish and subscribe on the process default
//! transport, so embedders should call
//! [`fabric::set_default_transport`](crate::fabric::set_default_transport)
//! first.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error};

use crate::diagnostics;
use crate::error::CommandCode;
use crate::playback::Playback;
use crate::record::Recorder;

/// Set the process-wide verbosity level.
///
/// Accepts `[0, 4]`; anything else returns `InvalidVersion`, matching the
/// historical behavior of this surface.
pub fn verbosity(level: i32) -> CommandCode {
    let level_u8 = match u8::try_from(level) {
        Ok(v) => v,
        Err(_) => {
            error!(level, "invalid verbosity level");
            return CommandCode::InvalidVersion;
        }
    };
    match diagnostics::set_verbosity(level_u8) {
        Ok(()) => CommandCode::Success,
        Err(_) => {
            error!(level, "invalid verbosity level");
            CommandCode::InvalidVersion
        }
    }
}

/// Record topics whose whole name matches `pattern` into `file` until the
/// process receives SIGINT or SIGTERM.
pub fn record_topics(file: &Path, pattern: &str) -> CommandCode {
    let pattern = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            error!(error = %e, "regex pattern is invalid");
            return CommandCode::BadRegex;
        }
    };

    let mut recorder = match Recorder::new() {
        Ok(recorder) => recorder,
        Err(e) => {
            error!(error = %e, "could not create recorder");
            return CommandCode::FailedToOpen;
        }
    };
    recorder.add_topics_matching(&pattern);
    if let Err(e) = recorder.start(file) {
        error!(error = %e, "could not start recording");
        return CommandCode::from_error(&e);
    }

    wait_for_shutdown();
    debug!("shutting down");
    recorder.stop();
    CommandCode::Success
}

/// Play back topics whose whole name matches `pattern` from `file`,
/// blocking until the replay finishes.
pub fn playback_topics(file: &Path, pattern: &str) -> CommandCode {
    let pattern = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            error!(error = %e, "regex pattern is invalid");
            return CommandCode::BadRegex;
        }
    };

    let mut player = Playback::open(file);
    player.add_topics_matching(&pattern);
    let session = match player.start(Duration::ZERO) {
        Ok(session) => session,
        Err(e) => return CommandCode::from_error(&e),
    };

    session.wait_until_finished();
    debug!("shutting down");
    CommandCode::Success
}

/// Block the calling thread until SIGINT or SIGTERM arrives.
fn wait_for_shutdown() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let registered = signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())
        .and(signal_hook::flag::register(
            signal_hook::consts::SIGINT,
            shutdown.clone(),
        ));
    if registered.is_err() {
        error!("could not install signal handlers; recording for one hour");
        std::thread::sleep(Duration::from_secs(3600));
        return;
    }
    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Convert a C string to `&str`, treating null and non-UTF-8 as absent.
unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// C entry point for [`verbosity`].
#[no_mangle]
pub extern "C" fn rewind_verbosity(level: c_int) -> c_int {
    std::panic::catch_unwind(|| verbosity(level).into())
        .unwrap_or(CommandCode::InvalidVersion as i32)
}

/// C entry point for [`record_topics`].
///
/// # Safety
///
/// `file` and `pattern` must be null-terminated strings or null.
#[no_mangle]
pub unsafe extern "C" fn rewind_record_topics(
    file: *const c_char,
    pattern: *const c_char,
) -> c_int {
    std::panic::catch_unwind(AssertUnwindSafe(|| {
        let (Some(file), Some(pattern)) =
            (unsafe { cstr_to_str(file) }, unsafe { cstr_to_str(pattern) })
        else {
            return CommandCode::FailedToOpen as i32;
        };
        record_topics(Path::new(file), pattern).into()
    }))
    .unwrap_or(CommandCode::FailedToOpen as i32)
}

/// C entry point for [`playback_topics`].
///
/// # Safety
///
/// `file` and `pattern` must be null-terminated strings or null.
#[no_mangle]
pub unsafe extern "C" fn rewind_playback_topics(
    file: *const c_char,
    pattern: *const c_char,
) -> c_int {
    std::panic::catch_unwind(AssertUnwindSafe(|| {
        let (Some(file), Some(pattern)) =
            (unsafe { cstr_to_str(file) }, unsafe { cstr_to_str(pattern) })
        else {
            return CommandCode::FailedToOpen as i32;
        };
        playback_topics(Path::new(file), pattern).into()
    }))
    .unwrap_or(CommandCode::FailedToOpen as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_verbosity_range() {
        assert_eq!(verbosity(4), CommandCode::Success);
        assert_eq!(verbosity(-1), CommandCode::InvalidVersion);
        assert_eq!(verbosity(5), CommandCode::InvalidVersion);
        assert_eq!(verbosity(1), CommandCode::Success);
    }

    #[test]
    fn test_playback_bad_regex() {
        let dir = tempdir().unwrap();
        assert_eq!(
            playback_topics(&dir.path().join("x.log"), "("),
            CommandCode::BadRegex
        );
    }

    #[test]
    fn test_playback_missing_file() {
        let dir = tempdir().unwrap();
        assert_eq!(
            playback_topics(&dir.path().join("missing.log"), ".*"),
            CommandCode::FailedToOpen
        );
    }

    #[test]
    fn test_c_entry_points_reject_null() {
        assert_eq!(
            unsafe { rewind_playback_topics(std::ptr::null(), std::ptr::null()) },
            CommandCode::FailedToOpen as i32
        );
        assert_eq!(
            unsafe { rewind_record_topics(std::ptr::null(), std::ptr::null()) },
            CommandCode::FailedToOpen as i32
        );
    }
}
