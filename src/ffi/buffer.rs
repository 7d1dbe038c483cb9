// Owning wrapper around malloc'd memory handed to foreign callers.

use std::ffi::c_char;
use std::ptr::NonNull;

use crate::error::{DocSegError, Result};

/// A `malloc`-allocated array of `T`.
///
/// Dropping the wrapper frees the memory. [`into_raw`](Self::into_raw)
/// transfers ownership to the caller, who must release it exactly once with
/// `free_buffer`. Even an empty buffer owns a one-element allocation, so a
/// successful call always hands out a non-null pointer.
pub struct ModuleBuffer<T: Copy> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T: Copy> ModuleBuffer<T> {
    /// Allocate and copy `items` into module-owned memory.
    pub fn from_slice(items: &[T]) -> Result<Self> {
        let bytes = size_of::<T>()
            .checked_mul(items.len().max(1))
            .ok_or_else(|| {
                DocSegError::allocation(format!("buffer of {} elements overflows", items.len()))
            })?;

        let raw = unsafe { libc::malloc(bytes) }.cast::<T>();
        let ptr = NonNull::new(raw)
            .ok_or_else(|| DocSegError::allocation(format!("malloc({bytes}) failed")))?;

        unsafe {
            std::ptr::copy_nonoverlapping(items.as_ptr(), ptr.as_ptr(), items.len());
        }
        Ok(ModuleBuffer {
            ptr,
            len: items.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Give up ownership; the pointer must later go to `free_buffer`.
    pub fn into_raw(self) -> *mut T {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }
}

impl ModuleBuffer<c_char> {
    /// NUL-terminated copy of `s`. Interior NULs become spaces.
    pub fn c_string(s: &str) -> Result<Self> {
        let mut bytes: Vec<c_char> = s
            .bytes()
            .map(|b| (if b == 0 { b' ' } else { b }) as c_char)
            .collect();
        bytes.push(0);
        Self::from_slice(&bytes)
    }
}

impl<T: Copy> Drop for ModuleBuffer<T> {
    fn drop(&mut self) {
        unsafe { libc::free(self.ptr.as_ptr().cast()) }
    }
}
