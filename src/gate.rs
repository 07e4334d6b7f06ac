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

use std::sync::atomic::{AtomicUsize, Ordering};

/// A rendezvous for exactly two arrivals.
///
/// Both parties call [`signal`](RendezvousGate::signal); whichever arrives
/// second sees `true` and performs the joint work. The `AcqRel` increment
/// orders the first arrival's writes before the second arrival's read of
/// them, so the winner observes everything the loser did beforehand.
pub struct RendezvousGate {
    count: AtomicUsize,
}

impl RendezvousGate {
    pub fn new() -> RendezvousGate {
        RendezvousGate {
            count: AtomicUsize::new(0),
        }
    }

    /// Make the gate reusable for another pair of arrivals. Only sound once
    /// both previous arrivals have happened (or none).
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    /// Record an arrival; true exactly for the second of the two.
    pub fn signal(&self) -> bool {
        self.count.fetch_add(1, Ordering::AcqRel) + 1 == 2
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::RendezvousGate;

    #[test]
    fn exactly_one_second_arrival() {
        for _ in 0..100 {
            let gate = Arc::new(RendezvousGate::new());
            let g = gate.clone();
            let other = thread::spawn(move || g.signal());
            let here = gate.signal();
            let there = other.join().unwrap();
            assert!(here != there, "exactly one arrival must be second");
        }
    }

    #[test]
    fn reset_rearms() {
        let gate = RendezvousGate::new();
        assert!(!gate.signal());
        assert!(gate.signal());
        gate.reset();
        assert!(!gate.signal());
        assert!(gate.signal());
    }
}
