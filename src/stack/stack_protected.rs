// The MIT License (MIT)

// Copyright (c) 2026 The resumable developers

//  Permission is hereby granted, free of charge, to any person obtaining a
//  copy of this software and associated documentation files (the "Software"),
//  to deal in the Software without restriction, including without limitation
//  the rights to use, copy, modify, merge, publish, distribute, sublicense,
//  and/or sell copies of the Software, and to permit persons to whom the
//  Software is furnished to do so, subject to the following conditions:
//
//  The above copyright notice and this permission notice shall be included in
//  all copies or substantial portions of the Software.
//
//  THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
//  OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//  FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//  AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//  LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
//  FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
//  DEALINGS IN THE SOFTWARE.

//! mmap-backed stacks with a guard page.

use std::fmt;
use std::io;
use std::ptr;

use libc;

// Use MAP_STACK where the platform has it (it is what we are doing anyway);
// elsewhere a plain anonymous mapping serves the same purpose.
#[cfg(any(target_os = "linux", target_os = "android"))]
const STACK_FLAGS: libc::c_int = libc::MAP_STACK | libc::MAP_PRIVATE | libc::MAP_ANON;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const STACK_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;

/// A coroutine's stack.
///
/// The lowest page of the mapping is made inaccessible so that an overflow
/// hits the guard instead of silently corrupting the adjacent mapping. The
/// stack grows from `top()` down toward `base()`.
pub struct Stack {
    map_base: *mut libc::c_void,
    map_len: usize,
    min_size: usize,
}

unsafe impl Send for Stack {}

impl Stack {
    /// Allocate a stack with at least `size` usable bytes.
    ///
    /// Panics when the mapping cannot be established; there is nothing
    /// sensible to do on stack OOM.
    pub fn new(size: usize) -> Stack {
        let page = page_size();
        let len = round_up(size.max(page), page);
        let map_len = len + page;

        let map_base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                STACK_FLAGS,
                -1,
                0,
            )
        };
        if map_base == libc::MAP_FAILED {
            panic!(
                "mmap for stack of size {} failed: {}",
                map_len,
                io::Error::last_os_error()
            );
        }

        // This may seem backwards: the guard is the *first* page. The stack
        // grows from high addresses toward low ones.
        if unsafe { libc::mprotect(map_base, page, libc::PROT_NONE) } != 0 {
            panic!(
                "could not protect guard page at {:p}: {}",
                map_base,
                io::Error::last_os_error()
            );
        }

        debug!("allocated {} byte stack at {:p}", map_len, map_base);
        Stack {
            map_base,
            map_len,
            min_size: size,
        }
    }

    /// Lowest usable address, just above the guard page.
    pub fn base(&self) -> *mut u8 {
        unsafe { (self.map_base as *mut u8).add(page_size()) }
    }

    /// Usable length in bytes.
    pub fn len(&self) -> usize {
        self.map_len - page_size()
    }

    /// One byte past the highest usable address.
    pub fn top(&self) -> *mut u8 {
        unsafe { (self.map_base as *mut u8).add(self.map_len) }
    }

    /// The size this stack was requested with.
    #[inline]
    pub fn min_size(&self) -> usize {
        self.min_size
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.map_base, self.map_len) } != 0 {
            error!(
                "munmap of stack at {:p} failed: {}",
                self.map_base,
                io::Error::last_os_error()
            );
        }
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("base", &self.map_base)
            .field("len", &self.map_len)
            .field("min_size", &self.min_size)
            .finish()
    }
}

pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn round_up(value: usize, to: usize) -> usize {
    (value + to - 1) / to * to
}

#[cfg(test)]
mod tests {
    use super::Stack;

    #[test]
    fn usable_range_is_writable() {
        let stack = Stack::new(16 * 1024);
        assert!(stack.len() >= 16 * 1024);
        unsafe {
            // Touch both ends of the usable range.
            stack.base().write(0xAA);
            stack.top().sub(1).write(0xBB);
        }
    }
}
