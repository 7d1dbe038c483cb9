// Per-thread message slots read back by C callers.

use std::cell::RefCell;
use std::ffi::{CString, c_char};

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
    static LAST_TIMING: RefCell<CString> = RefCell::new(CString::default());
}

fn to_cstring(msg: &str) -> CString {
    CString::new(msg.replace('\0', " ")).unwrap_or_default()
}

pub fn set_last_error(msg: &str) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = to_cstring(msg));
}

pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = CString::default());
}

/// Pointer to this thread's last error; valid until the next call that
/// updates it on the same thread.
pub fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ptr())
}

pub fn last_error_message() -> String {
    LAST_ERROR.with(|slot| slot.borrow().to_string_lossy().into_owned())
}

pub fn set_last_timing(msg: &str) {
    LAST_TIMING.with(|slot| *slot.borrow_mut() = to_cstring(msg));
}

pub fn last_timing_ptr() -> *const c_char {
    LAST_TIMING.with(|slot| slot.borrow().as_ptr())
}

pub fn last_timing_message() -> String {
    LAST_TIMING.with(|slot| slot.borrow().to_string_lossy().into_owned())
}
