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

//! The stack switching primitive.
//!
//! A `StackContext` owns two saved stack tops: the caller's, filled in each
//! time `switch_into` leaves the caller, and its own, pre-populated by
//! [`prepare`](StackContext::prepare) with a synthetic frame that makes the
//! first switch-in land in a trampoline which calls the supplied entry
//! function. The actual register save/restore lives in `src/asm/` and is
//! assembled by the build script; the layout written here has to match the
//! pop order in those files word for word.

use std::cell::Cell;
use std::mem;
use std::ptr;

use libc::c_void;

/// Entry point invoked on the alternate stack with the user pointer.
pub type EntryFn = extern "C" fn(*mut c_void);

extern "C" {
    fn swap_stack_context(save_slot: *mut *mut c_void, load_top: *mut c_void);
    #[cfg(all(feature = "unwind-frames", not(windows)))]
    fn swap_stack_context_tracked(
        save_slot: *mut *mut c_void,
        load_top: *mut c_void,
        rbp_slot: *mut *mut c_void,
    );
    fn stack_context_entry();
    #[cfg(all(feature = "unwind-frames", not(windows)))]
    fn stack_switch_point();
}

const PTR: usize = mem::size_of::<*mut c_void>();
const STACK_ALIGNMENT: usize = 16;

/// A callable alternate execution context.
///
/// The prepared stack stores the address of the `caller_stack_top` field, so
/// a context must not be moved between `prepare` and the completion of its
/// entry function. The coroutine layer keeps contexts behind a `Box` for
/// exactly this reason.
pub struct StackContext {
    caller_stack_top: Cell<*mut c_void>,
    own_stack_top: Cell<*mut c_void>,
    #[cfg(all(feature = "unwind-frames", not(windows)))]
    rbp_on_stack: Cell<*mut *mut c_void>,
}

impl StackContext {
    pub fn new() -> StackContext {
        StackContext {
            caller_stack_top: Cell::new(ptr::null_mut()),
            own_stack_top: Cell::new(ptr::null_mut()),
            #[cfg(all(feature = "unwind-frames", not(windows)))]
            rbp_on_stack: Cell::new(ptr::null_mut()),
        }
    }

    /// Rewind the alternate stack so the next `switch_into` runs `entry`
    /// with `arg` as its sole argument.
    ///
    /// # Safety
    ///
    /// `stack_low..stack_low + stack_size` must be writable memory not in
    /// use by any live frame, and `self` must stay at its current address
    /// until `entry` has returned (or the context is prepared again).
    pub unsafe fn prepare(
        &self,
        stack_low: *mut u8,
        stack_size: usize,
        entry: EntryFn,
        arg: *mut c_void,
    ) {
        // A caller handing us an unaligned region just loses a few bytes at
        // the top.
        let top = (stack_low as usize + stack_size) & !(STACK_ALIGNMENT - 1);
        self.write_initial_frame(stack_low, top, entry, arg);
        self.caller_stack_top.set(ptr::null_mut());
        trace!(
            "prepared stack context, top {:#x}, entry {:#x}",
            top,
            entry as usize
        );
    }

    #[cfg(all(not(windows), not(feature = "unwind-frames")))]
    unsafe fn write_initial_frame(
        &self,
        _stack_low: *mut u8,
        top: usize,
        entry: EntryFn,
        arg: *mut c_void,
    ) {
        let frame = (top - 7 * PTR) as *mut *mut c_void;
        frame.add(6).write(stack_context_entry as usize as *mut c_void);
        frame.add(5).write(frame.add(7) as *mut c_void); // rbp
        frame.add(4).write(self.caller_stack_top.as_ptr() as *mut c_void); // rbx
        frame.add(3).write(entry as usize as *mut c_void); // r12
        frame.add(2).write(arg); // r13
        frame.add(1).write(ptr::null_mut()); // r14
        frame.add(0).write(ptr::null_mut()); // r15
        self.own_stack_top.set(frame as *mut c_void);
    }

    #[cfg(all(not(windows), feature = "unwind-frames"))]
    unsafe fn write_initial_frame(
        &self,
        _stack_low: *mut u8,
        top: usize,
        entry: EntryFn,
        arg: *mut c_void,
    ) {
        // Two extra slots: a fake return address into the switch routine and
        // storage for the caller's frame pointer, filled in by the tracked
        // switch. The trampoline rebuilds them into a frame the unwinder can
        // walk.
        let frame = (top - 9 * PTR) as *mut *mut c_void;
        frame.add(8).write(stack_switch_point as usize as *mut c_void);
        frame.add(7).write(ptr::null_mut());
        self.rbp_on_stack.set(frame.add(7));
        frame.add(6).write(stack_context_entry as usize as *mut c_void);
        frame.add(5).write(frame.add(7) as *mut c_void); // rbp
        frame.add(4).write(self.caller_stack_top.as_ptr() as *mut c_void); // rbx
        frame.add(3).write(entry as usize as *mut c_void); // r12
        frame.add(2).write(arg); // r13
        frame.add(1).write(ptr::null_mut()); // r14
        frame.add(0).write(ptr::null_mut()); // r15
        self.own_stack_top.set(frame as *mut c_void);
    }

    #[cfg(windows)]
    unsafe fn write_initial_frame(
        &self,
        stack_low: *mut u8,
        top: usize,
        entry: EntryFn,
        arg: *mut c_void,
    ) {
        // Pop order in x86_64_win.S: xmm6-15 (ten 16-byte slots), the TIB
        // stack limit and base, r15, r14, r13, r12, rsi, rdi, rbx, rbp,
        // return address.
        let frame = (top - 31 * PTR) as *mut *mut c_void;
        for i in 0..20 {
            frame.add(i).write(ptr::null_mut()); // xmm6-xmm15
        }
        frame.add(20).write(stack_low as *mut c_void); // gs:0x10, stack limit
        frame.add(21).write(top as *mut c_void); // gs:0x08, stack base
        frame.add(22).write(ptr::null_mut()); // r15
        frame.add(23).write(ptr::null_mut()); // r14
        frame.add(24).write(arg); // r13
        frame.add(25).write(entry as usize as *mut c_void); // r12
        frame.add(26).write(ptr::null_mut()); // rsi
        frame.add(27).write(ptr::null_mut()); // rdi
        frame.add(28).write(self.caller_stack_top.as_ptr() as *mut c_void); // rbx
        frame.add(29).write(ptr::null_mut()); // rbp
        frame.add(30).write(stack_context_entry as usize as *mut c_void);
        self.own_stack_top.set(frame as *mut c_void);
    }

    /// Suspend the current context and resume the alternate one.
    ///
    /// # Safety
    ///
    /// The alternate stack must hold either the prepared initial frame or a
    /// context saved by `switch_out_of`, and must not be executing on any
    /// other thread.
    pub unsafe fn switch_into(&self) {
        #[cfg(all(feature = "unwind-frames", not(windows)))]
        swap_stack_context_tracked(
            self.caller_stack_top.as_ptr(),
            self.own_stack_top.get(),
            self.rbp_on_stack.get(),
        );
        #[cfg(not(all(feature = "unwind-frames", not(windows))))]
        swap_stack_context(self.caller_stack_top.as_ptr(), self.own_stack_top.get());
    }

    /// Suspend the alternate context and resume the caller. The inverse of
    /// `switch_into`; must run on the alternate stack.
    ///
    /// # Safety
    ///
    /// Only callable from code reached through `switch_into` on this
    /// context.
    pub unsafe fn switch_out_of(&self) {
        swap_stack_context(self.own_stack_top.as_ptr(), self.caller_stack_top.get());
    }
}
