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

//! The ready queue.
//!
//! Coroutines that have awaited add themselves here when their value
//! arrives; the hosting program is responsible for draining the queue from
//! whatever threads it likes, which is what lets the runtime slot into an
//! existing threading setup. Just call [`TaskQueue::run_one`] (or its
//! blocking sibling) regularly on [`ready_tasks`].

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A thread-safe FIFO of opaque callables with a blocking drain primitive.
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    waiter: Condvar,
}

impl TaskQueue {
    pub const fn new() -> TaskQueue {
        TaskQueue {
            tasks: Mutex::new(VecDeque::new()),
            waiter: Condvar::new(),
        }
    }

    /// Push a task and wake one waiter.
    pub fn enqueue(&self, task: Task) {
        {
            let mut tasks = self.tasks.lock().unwrap();
            tasks.push_back(task);
        }
        self.waiter.notify_one();
        trace!("task enqueued on ready queue");
    }

    /// Pop and run one task; false when the queue was empty.
    pub fn run_one(&self) -> bool {
        let task = self.tasks.lock().unwrap().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Block until a task is available, then run it.
    pub fn run_one_blocking(&self) {
        while !self.run_one() {
            self.wait_for_task();
        }
    }

    /// Run tasks until the queue is empty.
    pub fn drain(&self) {
        while self.run_one() {}
    }

    fn wait_for_task(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        while tasks.is_empty() {
            tasks = self.waiter.wait(tasks).unwrap();
        }
    }
}

/// The process-wide ready queue the await machinery enqueues onto.
pub fn ready_tasks() -> &'static TaskQueue {
    static QUEUE: TaskQueue = TaskQueue::new();
    &QUEUE
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::TaskQueue;

    #[test]
    fn run_one_on_empty_queue() {
        let queue = TaskQueue::new();
        assert!(!queue.run_one());
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            queue.enqueue(Box::new(move || order.lock().unwrap().push(i)));
        }
        queue.drain();
        assert_eq!(*order.lock().unwrap(), [0, 1, 2]);
        assert!(!queue.run_one());
    }

    #[test]
    fn blocking_run_waits_for_a_producer() {
        let queue = Arc::new(TaskQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let producer = {
            let queue = queue.clone();
            let ran = ran.clone();
            thread::spawn(move || {
                queue.enqueue(Box::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }));
            })
        };

        queue.run_one_blocking();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        producer.join().unwrap();
    }
}
