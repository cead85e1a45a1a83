//! The store's single cancellable debounce timer.
//!
//! ```text
//! schedule() ──► deadline = now + delay   (re-arming pushes it out)
//!                      │
//!   timer thread ──────┴─► wait_until(deadline) ──► fire()
//!
//! shutdown() ──► cancel deadline, stop and join the thread
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

pub(crate) struct Debouncer {
    delay: Duration,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: Option<ThreadId>,
}

impl Debouncer {
    /// Start the timer thread. `fire` runs on that thread each time a
    /// window elapses.
    pub(crate) fn spawn(delay: Duration, fire: impl Fn() + Send + 'static) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = shared.clone();
        let spawned = thread::Builder::new()
            .name("vmc-debounce".into())
            .spawn(move || run(&worker, fire));

        let (thread, thread_id) = match spawned {
            Ok(handle) => {
                let id = handle.thread().id();
                (Some(handle), Some(id))
            }
            Err(err) => {
                tracing::error!(%err, "failed to start debounce timer; staleness will only propagate on flush");
                (None, None)
            }
        };

        Self {
            delay,
            shared,
            thread: Mutex::new(thread),
            thread_id,
        }
    }

    /// Arm (or re-arm) the timer.
    pub(crate) fn schedule(&self) {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return;
        }
        state.deadline = Some(Instant::now() + self.delay);
        self.shared.wake.notify_one();
    }

    /// Disarm without stopping the thread.
    pub(crate) fn cancel(&self) {
        self.shared.state.lock().deadline = None;
    }

    /// Whether a window is pending.
    pub(crate) fn is_armed(&self) -> bool {
        self.shared.state.lock().deadline.is_some()
    }

    /// Cancel any pending window and stop the thread. Idempotent.
    pub(crate) fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.deadline = None;
            self.shared.wake.notify_all();
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle
            && Some(thread::current().id()) != self.thread_id
            && handle.join().is_err()
        {
            tracing::error!("debounce timer thread panicked");
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: &Shared, fire: impl Fn()) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        match state.deadline {
            None => shared.wake.wait(&mut state),
            Some(deadline) if Instant::now() >= deadline => {
                state.deadline = None;
                drop(state);
                // The timer outlives a panicking callback.
                if catch_unwind(AssertUnwindSafe(&fire)).is_err() {
                    tracing::error!("debounce callback panicked");
                }
                state = shared.state.lock();
            }
            Some(deadline) => {
                shared.wake.wait_until(&mut state, deadline);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn wait_for(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_burst_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = Debouncer::spawn(Duration::from_millis(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..5 {
            timer.schedule();
        }
        assert!(wait_for(&fired, 1));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_shutdown_cancels_pending_window() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = Debouncer::spawn(Duration::from_millis(40), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        timer.schedule();
        timer.shutdown();
        timer.shutdown();
        timer.schedule();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_callback_keeps_timer_alive() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = Debouncer::spawn(Duration::from_millis(10), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first window");
            }
        });

        timer.schedule();
        assert!(wait_for(&fired, 1));
        timer.schedule();
        assert!(wait_for(&fired, 2));
    }
}
