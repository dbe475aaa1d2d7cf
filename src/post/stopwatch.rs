use std::collections::BTreeMap;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Stopwatch
// ---------------------------------------------------------------------------

/// Accumulates wall-clock time over repeated start/stop cycles.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    last: Duration,
    total: Duration,
    laps: u32,
}

impl Stopwatch {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stop the watch. Stopping a watch that was never started is a no-op.
    pub fn stop(&mut self) {
        if let Some(t0) = self.started.take() {
            self.last = t0.elapsed();
            self.total += self.last;
            self.laps += 1;
        }
    }

    pub fn last(&self) -> Duration {
        self.last
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn laps(&self) -> u32 {
        self.laps
    }
}

// ---------------------------------------------------------------------------
// StopwatchManager
// ---------------------------------------------------------------------------

/// One named stopwatch per profiled module.
#[derive(Debug, Clone, Default)]
pub struct StopwatchManager {
    watches: BTreeMap<String, Stopwatch>,
}

impl StopwatchManager {
    pub fn initialize(&mut self, key: &str) {
        self.watches.insert(key.to_string(), Stopwatch::default());
    }

    pub fn start(&mut self, key: &str) {
        self.watches.entry(key.to_string()).or_default().start();
    }

    pub fn stop(&mut self, key: &str) {
        if let Some(w) = self.watches.get_mut(key) {
            w.stop();
        }
    }

    /// Time `f` under `key`. The watch is stopped whatever `f` returns.
    pub fn time<T>(&mut self, key: &str, f: impl FnOnce() -> T) -> T {
        self.start(key);
        let out = f();
        self.stop(key);
        out
    }

    pub fn get(&self, key: &str) -> Option<&Stopwatch> {
        self.watches.get(key)
    }

    /// `(name, last lap, total)` for every watch.
    pub fn report(&self) -> Vec<(String, Duration, Duration)> {
        self.watches
            .iter()
            .map(|(k, w)| (k.clone(), w.last(), w.total()))
            .collect()
    }
}
