//! Single cooperative thread that drains queued work and runs periodic
//! timers (spec.md §4.3, C3). Every component whose correctness depends on
//! monotonic state ordering posts its work here instead of mutating shared
//! state from whatever thread it runs on.

use flux::logging;
use flux::time::timestamp_millis;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

type WorkItem = Box<dyn FnOnce() + Send + 'static>;
type TimerFn = Box<dyn FnMut() + Send + 'static>;

/// Work-item queue depth at which the mainloop is considered backed up.
/// `queue_main_work` blocks the caller past this point rather than growing
/// without bound.
const WORK_QUEUE_CAPACITY: usize = 4096;

/// Identifies a registered timer so it can be cleared later. Equality is
/// by key only: clearing a timer mid-invocation (from inside its own
/// callback) still prevents the next tick from firing it again, because
/// clearance removes it from the timer table before the next scan.
pub type TimerKey = u64;

struct Timer {
    key: TimerKey,
    callback: TimerFn,
    interval_ms: u64,
    next_fire_ms: u64,
}

/// Handle shared with other threads: lets them enqueue work and wait for
/// the queue to drain, without giving them access to the mainloop itself.
#[derive(Clone)]
pub struct MainHandle {
    sender: SyncSender<WorkItem>,
    drain: Arc<(Mutex<u64>, Condvar)>,
}

impl MainHandle {
    /// Appends `work` to the queue; it runs on the mainloop's next tick,
    /// FIFO with everything else queued before it.
    pub fn queue_main_work<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (lock, _) = &*self.drain;
        *lock.lock().unwrap() += 1;
        // Ignore send errors: a shutdown mainloop simply drops queued work.
        let _ = self.sender.send(Box::new(work));
    }

    /// Blocks the calling thread (never the mainloop itself) until every
    /// work item queued up to this point has run.
    pub fn wait_for_main_work_drain(&self) {
        let (lock, cvar) = &*self.drain;
        let guard = lock.lock().unwrap();
        let _unused = cvar.wait_while(guard, |pending| *pending > 0).unwrap();
    }
}

/// The mainloop itself. Not `Send`/`Sync` — it only ever runs on the one
/// thread that owns it; other threads interact through a [`MainHandle`].
pub struct MainLoop {
    receiver: Receiver<WorkItem>,
    handle: MainHandle,
    timers: Vec<Timer>,
    next_timer_key: TimerKey,
    tick_interval: Duration,
    log: logging::Logger,
}

impl MainLoop {
    pub fn new(tick_interval: Duration, log: &logging::Logger) -> Self {
        let (sender, receiver) = mpsc::sync_channel(WORK_QUEUE_CAPACITY);
        MainLoop {
            receiver,
            handle: MainHandle {
                sender,
                drain: Arc::new((Mutex::new(0), Condvar::new())),
            },
            timers: Vec::new(),
            next_timer_key: 0,
            tick_interval,
            log: log.new(logging::o!("component" => "mainloop")),
        }
    }

    pub fn handle(&self) -> MainHandle {
        self.handle.clone()
    }

    /// Registers a periodic callback. `initial_ms` is the delay before the
    /// first fire; `interval_ms` governs every fire after that. Returns the
    /// key needed to clear it.
    pub fn set_timer<F>(&mut self, initial_ms: u64, interval_ms: u64, mut callback: F) -> TimerKey
    where
        F: FnMut() + Send + 'static,
    {
        let key = self.next_timer_key;
        self.next_timer_key += 1;

        let next_fire_ms = timestamp_millis() + initial_ms;
        self.timers.push(Timer {
            key,
            callback: Box::new(move || callback()),
            interval_ms,
            next_fire_ms,
        });
        key
    }

    /// Removes a timer; it will not fire again, even if clearance happens
    /// from inside that timer's own callback (the scan that would fire it
    /// again has not yet started).
    pub fn clear_timer(&mut self, key: TimerKey) {
        self.timers.retain(|t| t.key != key);
    }

    fn drain_work(&self) {
        loop {
            match self.receiver.try_recv() {
                Ok(work) => {
                    work();
                    let (lock, cvar) = &*self.handle.drain;
                    let mut pending = lock.lock().unwrap();
                    *pending = pending.saturating_sub(1);
                    if *pending == 0 {
                        cvar.notify_all();
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn fire_due_timers(&mut self) {
        let now = timestamp_millis();
        // Indices fired this pass; a timer cleared by its own callback has
        // already been filtered out of `self.timers` by the time we'd
        // consider it again, so no separate guard is needed here.
        let mut i = 0;
        while i < self.timers.len() {
            if self.timers[i].next_fire_ms <= now {
                let key = self.timers[i].key;
                (self.timers[i].callback)();
                // The callback may have called clear_timer(key), removing
                // this entry (or any other) out from under us.
                if let Some(pos) = self.timers.iter().position(|t| t.key == key) {
                    self.timers[pos].next_fire_ms = now + self.timers[pos].interval_ms;
                    i = pos + 1;
                } else {
                    i = 0;
                }
            } else {
                i += 1;
            }
        }
    }

    /// Drains the queue and fires due timers once. Returns after one pass,
    /// regardless of tick timing; `run` is what does the rate limiting.
    pub fn run_once(&mut self) {
        self.drain_work();
        self.fire_due_timers();
    }

    /// Runs forever, ticking at `tick_interval`. Intended to be called from
    /// the thread that is to become "the mainloop".
    pub fn run(&mut self) {
        loop {
            let started = std::time::Instant::now();
            self.run_once();
            let elapsed = started.elapsed();
            if elapsed < self.tick_interval {
                thread::sleep(self.tick_interval - elapsed);
            } else {
                logging::trace!(self.log, "tick overran interval";
                    "context" => "run", "elapsed_ms" => elapsed.as_millis() as u64);
            }
        }
    }
}
