//! Scripted collaborators for unit tests.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::Level;

use crate::error::{Result, TileCacheError};
use crate::source::{Reachability, TileSource};
use crate::tile::TileId;

/// Tile source returning `payload` for every tile except the failing ones.
pub struct MockSource {
    payload: Vec<u8>,
    fail_all: AtomicBool,
    failing: Mutex<HashSet<TileId>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            fail_all: AtomicBool::new(false),
            failing: Mutex::new(HashSet::new()),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Source on which every request fails.
    pub fn failing() -> Self {
        let source = Self::new(b"");
        source.fail_all.store(true, Ordering::SeqCst);
        source
    }

    /// Hold every request for `delay` so overlapping calls can be observed.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_tile(&self, tile: TileId) {
        self.failing.lock().unwrap().insert(tile);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl TileSource for MockSource {
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&tile) {
            return Err(TileCacheError::FetchFailed {
                tile,
                reason: "HTTP 503 Service Unavailable".to_string(),
            });
        }
        Ok(self.payload.clone())
    }
}

/// Reachability with a switchable answer that counts its checks.
pub struct MockReachability {
    connected: AtomicBool,
    checks: AtomicUsize,
}

impl MockReachability {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl Reachability for MockReachability {
    fn is_connected(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.connected.load(Ordering::SeqCst)
    }
}

/// Log output written while running `f` on the current thread.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_writer(move || LogWriter(writer.clone()))
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned();
    (result, logs)
}

struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
