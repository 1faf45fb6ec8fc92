use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, warn};

/// Shortest period the clock thread will tick at.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Fixed-period tick source for an active recording.
///
/// Ticks go through a single-slot channel, so at most one tick is pending. A tick
/// that fires while a sampling step runs is kept and handled right after it;
/// any further tick that finds the slot occupied is dropped, so sampling steps
/// never pile up.
pub struct SessionClock {
    ticks: Receiver<Instant>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    manual: bool,
}

impl SessionClock {
    /// Starts the clock thread. Periods below [`MIN_TICK_PERIOD`] are raised to it.
    pub fn start(period: Duration) -> Self {
        let period = period.max(MIN_TICK_PERIOD);
        let (tick_tx, tick_rx) = mpsc::sync_channel::<Instant>(1);
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));

        let thread_running = running.clone();
        let thread_dropped = dropped.clone();
        let handle = thread::spawn(move || run_clock(period, tick_tx, thread_running, thread_dropped));

        Self {
            ticks: tick_rx,
            running,
            dropped,
            handle: Some(handle),
            manual: false,
        }
    }

    /// A clock that never fires; the owner drives sampling by hand.
    pub fn manual() -> Self {
        let (_, tick_rx) = mpsc::sync_channel::<Instant>(1);
        Self {
            ticks: tick_rx,
            running: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
            handle: None,
            manual: true,
        }
    }

    /// Waits up to `timeout` for the next tick.
    pub fn next_tick(&self, timeout: Duration) -> Option<Instant> {
        if self.manual {
            thread::sleep(timeout);
            return None;
        }
        match self.ticks.recv_timeout(timeout) {
            Ok(tick) => Some(tick),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stops the clock thread and waits for it to exit.
    pub fn halt(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Session clock thread panicked");
            }
        }
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.halt();
    }
}

fn run_clock(
    period: Duration,
    tick_tx: SyncSender<Instant>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) {
    // sleep in short slices so halt() does not wait a full period
    let slice = period.min(Duration::from_millis(50));
    let mut next = Instant::now() + period;

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            thread::sleep(slice.min(next - now));
            continue;
        }
        next += period;

        match tick_tx.try_send(now) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Previous tick still pending, dropping tick");
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
}
