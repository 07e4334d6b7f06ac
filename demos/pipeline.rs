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

//! A small pipeline: resumable bodies await background work, and the main
//! thread doubles as the executor by draining the ready queue.
//!
//! Run with `cargo run --example pipeline`.

use resumable::{await_on, custom_async, ready_tasks, resumable};

fn fetch(id: usize) -> resumable::ThenFuture<String> {
    custom_async(move || format!("payload-{}", id))
}

fn main() {
    let futures: Vec<_> = (0..4)
        .map(|id| {
            resumable(move || {
                let body = await_on(fetch(id));
                let checksum = await_on(custom_async({
                    let body = body.clone();
                    move || body.len() * 7
                }));
                format!("{} (checksum {})", body, checksum)
            })
        })
        .collect();

    // Every resumable above is suspended on its first await; run their
    // continuations until all of them have delivered.
    for (id, future) in futures.into_iter().enumerate() {
        while future.wait_for(std::time::Duration::from_millis(1))
            == resumable::FutureStatus::Timeout
        {
            ready_tasks().run_one_blocking();
        }
        println!("task {}: {}", id, future.get());
    }
}
