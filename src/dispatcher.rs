//! Executes work on the UI-owning thread
//!
//! [`UiLoop`] is the single consumer of a task queue and lives on the thread
//! that created it. [`UiDispatcher`] handles post work to it from anywhere;
//! work posted from the loop's own thread runs immediately instead.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Task),
    Quit,
}

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Live loops created on the current thread; the last one owns it
    static LIVE_LOOPS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

fn run_task<F: FnOnce()>(action: F) {
    if catch_unwind(AssertUnwindSafe(action)).is_err() {
        error!("UI action panicked");
    }
}

/// Task queue bound to the thread that created it
///
/// Not `Send`: it must be drained on the thread that owns the UI.
pub struct UiLoop {
    id: u64,
    receiver: Receiver<Message>,
    _not_send: PhantomData<*const ()>,
}

impl UiLoop {
    /// Create a loop owned by the current thread and a dispatcher for it
    pub fn new() -> (Self, UiDispatcher) {
        let id = NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel();
        LIVE_LOOPS.with(|live| live.borrow_mut().push(id));
        debug!(loop_id = id, "UI loop bound to current thread");

        let ui_loop = Self {
            id,
            receiver,
            _not_send: PhantomData,
        };
        (ui_loop, UiDispatcher { id, sender })
    }

    /// Run everything already queued without blocking
    ///
    /// Returns the number of actions executed.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(Message::Run(task)) => {
                    run_task(task);
                    count += 1;
                }
                Ok(Message::Quit) | Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return count;
                }
            }
        }
    }

    /// Run queued actions as they arrive, for at most `timeout`
    ///
    /// Returns early on quit or once every dispatcher is gone.
    pub fn run_for(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut count = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(Message::Run(task)) => {
                    run_task(task);
                    count += 1;
                }
                Ok(Message::Quit)
                | Err(RecvTimeoutError::Timeout)
                | Err(RecvTimeoutError::Disconnected) => return count,
            }
        }
    }

    /// Run until [`UiDispatcher::quit`] is posted or every dispatcher is dropped
    pub fn run(self) {
        debug!(loop_id = self.id, "UI loop running");
        while let Ok(message) = self.receiver.recv() {
            match message {
                Message::Run(task) => run_task(task),
                Message::Quit => break,
            }
        }
        debug!(loop_id = self.id, "UI loop finished");
    }
}

impl Drop for UiLoop {
    fn drop(&mut self) {
        // Loops may be dropped in any order
        let _ = LIVE_LOOPS.try_with(|live| live.borrow_mut().retain(|id| *id != self.id));
    }
}

/// Handle for running work on a [`UiLoop`]'s thread
#[derive(Clone)]
pub struct UiDispatcher {
    id: u64,
    sender: Sender<Message>,
}

impl std::fmt::Debug for UiDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDispatcher").field("loop_id", &self.id).finish()
    }
}

impl UiDispatcher {
    /// Whether the calling thread owns this dispatcher's loop
    pub fn is_ui_thread(&self) -> bool {
        LIVE_LOOPS.with(|live| live.borrow().last() == Some(&self.id))
    }

    /// Run `action` on the UI thread
    ///
    /// On the UI thread it runs before this returns. Elsewhere it is queued
    /// and runs later, in the order it was queued. Panics in `action` are
    /// logged and never reach the caller.
    pub fn run_on_ui_thread<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_ui_thread() {
            run_task(action);
        } else if self.sender.send(Message::Run(Box::new(action))).is_err() {
            warn!(loop_id = self.id, "UI loop is gone, dropping action");
        }
    }

    /// Ask the loop to stop after the actions queued before this call
    pub fn quit(&self) {
        let _ = self.sender.send(Message::Quit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_runs_inline_on_ui_thread() {
        let (ui_loop, dispatcher) = UiLoop::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        dispatcher.run_on_ui_thread(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(ui_loop.run_pending(), 0);
    }

    #[test]
    fn test_background_dispatch_is_deferred() {
        let (ui_loop, dispatcher) = UiLoop::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        let background = thread::spawn(move || {
            assert!(!dispatcher.is_ui_thread());
            let inner = Arc::clone(&counter);
            dispatcher.run_on_ui_thread(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            });
            counter.load(Ordering::SeqCst)
        });

        assert_eq!(background.join().unwrap(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        assert_eq!(ui_loop.run_pending(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(ui_loop.run_pending(), 0);
    }

    #[test]
    fn test_queued_actions_run_in_order() {
        let (ui_loop, dispatcher) = UiLoop::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sender = dispatcher.clone();
        let log = Arc::clone(&order);
        thread::spawn(move || {
            for i in 0..5 {
                let log = Arc::clone(&log);
                sender.run_on_ui_thread(move || log.lock().unwrap().push(i));
            }
        })
        .join()
        .unwrap();

        ui_loop.run_pending();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_ui_thread_dispatch_skips_queue() {
        let (ui_loop, dispatcher) = UiLoop::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sender = dispatcher.clone();
        let log = Arc::clone(&order);
        thread::spawn(move || sender.run_on_ui_thread(move || log.lock().unwrap().push("queued")))
            .join()
            .unwrap();

        let log = Arc::clone(&order);
        dispatcher.run_on_ui_thread(move || log.lock().unwrap().push("inline"));

        ui_loop.run_pending();
        assert_eq!(*order.lock().unwrap(), vec!["inline", "queued"]);
    }

    #[test]
    fn test_panicking_action_is_contained() {
        let (ui_loop, dispatcher) = UiLoop::new();
        dispatcher.run_on_ui_thread(|| panic!("inline boom"));

        let sender = dispatcher.clone();
        thread::spawn(move || sender.run_on_ui_thread(|| panic!("queued boom")))
            .join()
            .unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let sender = dispatcher.clone();
        thread::spawn(move || {
            sender.run_on_ui_thread(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .join()
        .unwrap();

        assert_eq!(ui_loop.run_pending(), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_exits_on_quit() {
        let (ui_loop, dispatcher) = UiLoop::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let sender = dispatcher.clone();
        let counter = Arc::clone(&ran);
        thread::spawn(move || {
            sender.run_on_ui_thread(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            sender.quit();
        })
        .join()
        .unwrap();

        // dispatcher still alive, so only the quit message ends the loop
        ui_loop.run();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        drop(dispatcher);
    }

    #[test]
    fn test_run_exits_when_dispatchers_dropped() {
        let (ui_loop, dispatcher) = UiLoop::new();
        drop(dispatcher);
        ui_loop.run();
    }

    #[test]
    fn test_run_for_times_out() {
        let (ui_loop, _dispatcher) = UiLoop::new();
        assert_eq!(ui_loop.run_for(Duration::from_millis(10)), 0);
    }

    #[test]
    fn test_dispatch_after_loop_dropped() {
        let (ui_loop, dispatcher) = UiLoop::new();
        drop(ui_loop);

        let sender = dispatcher.clone();
        thread::spawn(move || sender.run_on_ui_thread(|| unreachable!()))
            .join()
            .unwrap();
        // The thread no longer owns a loop either
        assert!(!dispatcher.is_ui_thread());
    }

    #[test]
    fn test_run_for_runs_queued_actions() {
        let (ui_loop, dispatcher) = UiLoop::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let sender = dispatcher.clone();
        let counter = Arc::clone(&ran);
        thread::spawn(move || {
            for _ in 0..3 {
                let counter = Arc::clone(&counter);
                sender.run_on_ui_thread(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        })
        .join()
        .unwrap();

        assert_eq!(ui_loop.run_for(Duration::from_millis(20)), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_run_for_returns_early_on_quit() {
        let (ui_loop, dispatcher) = UiLoop::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let sender = dispatcher.clone();
        let counter = Arc::clone(&ran);
        thread::spawn(move || {
            sender.run_on_ui_thread(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            sender.quit();
        })
        .join()
        .unwrap();

        let started = Instant::now();
        assert_eq!(ui_loop.run_for(Duration::from_secs(30)), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        drop(dispatcher);
    }

    #[test]
    fn test_out_of_order_drop_releases_both_loops() {
        let (outer, outer_dispatcher) = UiLoop::new();
        let (inner, inner_dispatcher) = UiLoop::new();
        drop(outer);
        assert!(!outer_dispatcher.is_ui_thread());
        assert!(inner_dispatcher.is_ui_thread());
        drop(inner);

        assert!(!outer_dispatcher.is_ui_thread());
        assert!(!inner_dispatcher.is_ui_thread());

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        outer_dispatcher.run_on_ui_thread(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_nested_loops_restore_binding() {
        let (outer, outer_dispatcher) = UiLoop::new();
        {
            let (_inner, inner_dispatcher) = UiLoop::new();
            assert!(inner_dispatcher.is_ui_thread());
            assert!(!outer_dispatcher.is_ui_thread());
        }
        assert!(outer_dispatcher.is_ui_thread());
        drop(outer);
    }
}
