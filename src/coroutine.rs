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

//! One-shot resumable functions running on their own stacks.
//!
//! ```rust
//! use resumable::Coroutine;
//!
//! let coro = Coroutine::spawn(|s| {
//!     println!("before yield");
//!
//!     // Give control back to whoever resumed us.
//!     s.yield_now();
//!
//!     println!("back again");
//! });
//!
//! coro.resume();
//! println!("back in the caller");
//! coro.resume();
//! assert!(!coro.is_resumable());
//! ```

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use libc::c_void;

use crate::context::StackContext;
use crate::stack::{stack_pool, Stack, DEFAULT_STACK_SIZE};

type Body = Box<dyn FnOnce(&CoroSelf<'_>) + Send + 'static>;
type Payload = Box<dyn Any + Send + 'static>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum RunState {
    NotStarted,
    Running,
    Finished,
    Uninitialized,
}

/// Coroutine spawn options.
#[derive(Debug)]
pub struct Options {
    /// The size of the stack
    pub stack_size: usize,

    /// The name of the coroutine, used in diagnostics
    pub name: Option<String>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            stack_size: DEFAULT_STACK_SIZE,
            name: None,
        }
    }
}

/// Handle given to a coroutine body; its only capability is suspending.
pub struct CoroSelf<'a> {
    inner: &'a CoroInner,
}

impl CoroSelf<'_> {
    /// Suspend the coroutine and return control to the resumer. The next
    /// `resume` continues right after this call.
    pub fn yield_now(&self) {
        self.inner.suspend();
    }
}

/// A one-shot resumable function.
///
/// The body runs on its own heap-allocated stack and may suspend through
/// the [`CoroSelf`] handle it receives; each [`resume`](Coroutine::resume)
/// continues it where it left off. Panics from the body never unwind across
/// the stack switch: they are parked and re-raised in the resumer's frame.
pub struct Coroutine {
    // Boxed because the prepared stack points back into the CoroInner; the
    // handle may move freely, the inner may not.
    inner: Box<CoroInner>,
}

// A coroutine is resumed by at most one thread at a time and its stack is
// ordinary heap memory, so handing the whole thing to another thread is
// fine. Thread-locals captured on that stack go stale, as documented on
// `resumable`.
unsafe impl Send for Coroutine {}

struct CoroInner {
    stack: Option<Stack>,
    ctx: StackContext,
    body: Cell<Option<Body>>,
    parked_panic: Cell<Option<Payload>>,
    state: Cell<RunState>,
    name: Option<String>,
}

impl CoroInner {
    fn suspend(&self) {
        debug_assert_eq!(self.state.get(), RunState::Running);
        unsafe { self.ctx.switch_out_of() };
    }
}

impl Drop for CoroInner {
    fn drop(&mut self) {
        if self.state.get() == RunState::Running {
            error!(
                "coroutine {:?} dropped while suspended mid-run; its stack will not unwind",
                self.name
            );
            debug_assert!(false, "coroutine dropped while suspended mid-run");
        }
        if let Some(stack) = self.stack.take() {
            stack_pool::give_stack(stack);
        }
    }
}

/// First function on every coroutine stack. Catches anything the body
/// raises so that unwinding never crosses the context switch while the
/// coroutine is still resumable.
extern "C" fn coroutine_entry(arg: *mut c_void) {
    let inner = unsafe { &*(arg as *const CoroInner) };
    inner.state.set(RunState::Running);
    let body = inner.body.take();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        if let Some(body) = body {
            body(&CoroSelf { inner });
        }
    }));
    if let Err(payload) = result {
        inner.parked_panic.set(Some(payload));
    }
    inner.state.set(RunState::Finished);
    // Falling off the end lands back in the assembly trampoline, which
    // performs the final switch to the resumer.
}

impl Coroutine {
    /// Create a coroutine with no body. It cannot be resumed until
    /// [`reset`](Coroutine::reset) installs one.
    pub fn empty() -> Coroutine {
        Coroutine::empty_opts(Default::default())
    }

    pub fn empty_opts(opts: Options) -> Coroutine {
        let stack = stack_pool::take_stack(opts.stack_size);
        Coroutine {
            inner: Box::new(CoroInner {
                stack: Some(stack),
                ctx: StackContext::new(),
                body: Cell::new(None),
                parked_panic: Cell::new(None),
                state: Cell::new(RunState::Uninitialized),
                name: opts.name,
            }),
        }
    }

    /// Spawn a coroutine with default options. Does not run it.
    pub fn spawn<F>(body: F) -> Coroutine
    where
        F: FnOnce(&CoroSelf<'_>) + Send + 'static,
    {
        Coroutine::spawn_opts(body, Default::default())
    }

    /// Spawn a coroutine with options. Does not run it.
    pub fn spawn_opts<F>(body: F, opts: Options) -> Coroutine
    where
        F: FnOnce(&CoroSelf<'_>) + Send + 'static,
    {
        let coro = Coroutine::empty_opts(opts);
        coro.reset(body);
        coro
    }

    /// Install a new body and rewind the stack so the coroutine can run
    /// again from the top.
    ///
    /// Panics if the coroutine is suspended mid-run.
    pub fn reset<F>(&self, body: F)
    where
        F: FnOnce(&CoroSelf<'_>) + Send + 'static,
    {
        assert!(
            self.inner.state.get() != RunState::Running,
            "cannot reset a running coroutine"
        );
        let stack = self.inner.stack.as_ref().expect("coroutine stack missing");
        unsafe {
            self.inner.ctx.prepare(
                stack.base(),
                stack.len(),
                coroutine_entry,
                &*self.inner as *const CoroInner as *mut c_void,
            );
        }
        self.inner.body.set(Some(Box::new(body)));
        self.inner.parked_panic.set(None);
        self.inner.state.set(RunState::NotStarted);
    }

    /// Run the coroutine until it suspends or finishes. If the body raised
    /// a panic since the last resume, it is re-raised here.
    ///
    /// Panics if the coroutine is finished or has no body.
    pub fn resume(&self) {
        match self.inner.state.get() {
            RunState::NotStarted | RunState::Running => {}
            RunState::Finished => panic!(
                "cannot resume finished coroutine {:?}",
                self.inner.name.as_deref().unwrap_or("<unnamed>")
            ),
            RunState::Uninitialized => panic!("cannot resume a coroutine without a body"),
        }
        unsafe { self.inner.ctx.switch_into() };
        if let Some(payload) = self.inner.parked_panic.take() {
            panic::resume_unwind(payload);
        }
    }

    /// True while the coroutine can be resumed again.
    #[inline]
    pub fn is_resumable(&self) -> bool {
        matches!(
            self.inner.state.get(),
            RunState::NotStarted | RunState::Running
        )
    }

    /// Suspend from within; used by the await machinery, which knows the
    /// coroutine is the one currently executing.
    pub(crate) fn suspend(&self) {
        self.inner.suspend();
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("state", &self.inner.state.get())
            .field("name", &self.inner.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::{Coroutine, Options};

    #[test]
    fn runs_across_yields() {
        let called = Arc::new(AtomicUsize::new(0));
        let c = called.clone();
        let coro = Coroutine::spawn(move |s| {
            c.fetch_add(1, Ordering::SeqCst);
            s.yield_now();
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(coro.is_resumable());
        coro.resume();
        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert!(coro.is_resumable());
        coro.resume();
        assert_eq!(called.load(Ordering::SeqCst), 2);
        assert!(!coro.is_resumable());
    }

    // A coroutine drives another coroutine from its own stack; the caller
    // only sees the outer one. The interleaving below is the fingerprint of
    // correctly nested switches.
    #[test]
    fn nested_coroutines() {
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let p = pushed.clone();
        let outer = Coroutine::spawn(move |s| {
            let inner_p = p.clone();
            let inner = Coroutine::spawn(move |s| {
                for _ in 0..3 {
                    inner_p.lock().unwrap().push(1);
                    s.yield_now();
                }
            });
            for _ in 0..3 {
                p.lock().unwrap().push(2);
                while inner.is_resumable() {
                    inner.resume();
                    s.yield_now();
                }
            }
        });

        while outer.is_resumable() {
            outer.resume();
        }
        assert_eq!(*pushed.lock().unwrap(), [2, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn reset_reruns_the_body() {
        let count = Arc::new(AtomicUsize::new(0));
        let body = {
            let count = count.clone();
            move |s: &super::CoroSelf<'_>| {
                count.fetch_add(1, Ordering::SeqCst);
                s.yield_now();
                count.fetch_add(1, Ordering::SeqCst);
                s.yield_now();
                count.fetch_add(1, Ordering::SeqCst);
            }
        };

        let coro = Coroutine::spawn(body.clone());
        coro.resume();
        coro.resume();
        coro.resume();
        assert!(!coro.is_resumable());

        coro.reset(body);
        while coro.is_resumable() {
            coro.resume();
        }
        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn never_resumed_is_fine() {
        let _ = Coroutine::spawn(|_| {});
    }

    #[test]
    fn empty_is_not_resumable() {
        let coro = Coroutine::empty();
        assert!(!coro.is_resumable());
    }

    #[test]
    fn panic_is_rethrown_in_the_resumer() {
        let coro = Coroutine::spawn(|_| panic::panic_any(10i32));
        let err = panic::catch_unwind(AssertUnwindSafe(|| coro.resume())).unwrap_err();
        assert_eq!(err.downcast_ref::<i32>(), Some(&10));
        assert!(!coro.is_resumable());
    }

    #[test]
    #[should_panic(expected = "finished")]
    fn resume_after_finished_is_an_error() {
        let coro = Coroutine::spawn(|_| {});
        coro.resume();
        coro.resume();
    }

    #[test]
    #[should_panic(expected = "without a body")]
    fn resume_uninitialized_is_an_error() {
        Coroutine::empty().resume();
    }

    #[test]
    fn named_with_custom_stack() {
        let coro = Coroutine::spawn_opts(
            |_| {},
            Options {
                stack_size: 128 * 1024,
                name: Some("worker".to_string()),
            },
        );
        assert_eq!(coro.name(), Some("worker"));
        coro.resume();
    }
}
