//! Periodic reporting actor and the consumers it feeds.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::marina::{Marina, MarinaSnapshot};

/// Read-only consumer of periodic snapshots.
pub trait SnapshotSink: Send {
    fn consume(&mut self, snapshot: &MarinaSnapshot);
}

/// Logs a one-line status summary per snapshot.
pub struct LogSink;

impl SnapshotSink for LogSink {
    fn consume(&mut self, snapshot: &MarinaSnapshot) {
        let busy = snapshot
            .workers
            .iter()
            .filter(|w| w.task.is_some())
            .count();
        info!(
            queued = snapshot.queue.len(),
            active = snapshot.registry.len(),
            occupied_cells = snapshot.occupied_cells(),
            busy_workers = busy,
            completed = snapshot.stats.completed,
            "marina status"
        );
    }
}

/// Writes every snapshot as one JSON line.
pub struct JsonLinesSink<W> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, snapshot: &MarinaSnapshot) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, snapshot)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl<W: Write + Send> SnapshotSink for JsonLinesSink<W> {
    fn consume(&mut self, snapshot: &MarinaSnapshot) {
        if let Err(err) = self.write(snapshot) {
            warn!(%err, "failed to write snapshot");
        }
    }
}

/// Totals gathered by a reporter over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReporterSummary {
    pub snapshots: u64,
    pub violations: u64,
}

pub struct Reporter {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<ReporterSummary>,
}

impl Reporter {
    /// Take a final snapshot, stop the actor and return its totals.
    pub fn stop(self) -> ReporterSummary {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.join().expect("reporter thread panicked")
    }
}

/// Spawn the reporting actor. With `validate`, every snapshot is also
/// checked against the data-model invariants.
pub fn spawn_reporter(
    marina: Arc<Marina>,
    mut sink: Box<dyn SnapshotSink>,
    interval: Duration,
    validate: bool,
) -> io::Result<Reporter> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let handle = thread::Builder::new()
        .name("reporter".to_string())
        .spawn(move || {
            let mut summary = ReporterSummary::default();
            loop {
                let stopping = stop_flag.load(Ordering::SeqCst);
                let snapshot = marina.snapshot();
                if validate {
                    for violation in snapshot.violations(marina.config()) {
                        error!(%violation, "invariant violated");
                        summary.violations += 1;
                    }
                }
                sink.consume(&snapshot);
                summary.snapshots += 1;
                if stopping {
                    return summary;
                }
                thread::sleep(interval);
            }
        })?;
    Ok(Reporter { stop, handle })
}
