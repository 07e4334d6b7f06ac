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

//! Stackful coroutines with awaitable, chainable futures.
//!
//! A function started through [`resumable`] looks synchronous from the
//! inside: wherever it needs a value that is not ready yet it calls
//! [`await_on`], which suspends the whole call stack instead of forcing the
//! code into callbacks. The suspended coroutine keeps its stack; when the
//! awaited [`ThenFuture`] is fulfilled, the coroutine is pushed onto the
//! process-wide [`ready_tasks`] queue, and whichever thread drains the queue
//! resumes it right after the await.
//!
//! ```rust
//! use resumable::{await_on, custom_async, ready_tasks, resumable};
//!
//! let future = resumable(|| await_on(custom_async(|| 2 + 3)));
//!
//! // The host program decides where and when ready coroutines run.
//! ready_tasks().run_one_blocking();
//!
//! assert_eq!(future.get(), 5);
//! ```
//!
//! The lower layers are usable on their own: [`Coroutine`] is a plain
//! one-shot resumable function on its own stack, and
//! [`ThenPromise`]/[`ThenFuture`] are a blocking one-shot channel with a
//! single attachable continuation.

#[macro_use]
extern crate log;

pub use awaiter::{await_on, await_or_block, can_await, resumable};
pub use builder::Builder;
pub use coroutine::{CoroSelf, Coroutine, Options};
pub use future::{custom_async, BrokenPromise, FutureStatus, ThenFuture, ThenPromise};
pub use stack::DEFAULT_STACK_SIZE;
pub use task_queue::{ready_tasks, TaskQueue};

mod awaiter;
mod builder;
mod context;
mod coroutine;
mod future;
mod gate;
mod stack;
mod task_queue;

#[cfg(test)]
mod tests;
