use crate::size;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

const BAR_WIDTH: usize = 30;

/// Point-in-time view of a run's progress.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    pub units_done: u64,
    pub units_total: u64,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub elapsed: Duration,
    pub eta: Duration,
}

impl Snapshot {
    pub fn unit_pct(&self) -> f64 {
        pct(self.units_done, self.units_total)
    }

    pub fn byte_pct(&self) -> f64 {
        pct(self.bytes_done, self.bytes_total)
    }
}

fn pct(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64) * 100.0
    }
}

/// Counts completed units and bytes across workers and renders a single
/// status line on stderr. Counters only ever move forward.
pub struct ProgressReporter {
    enabled: bool,
    units_total: u64,
    bytes_total: u64,
    units_done: AtomicU64,
    bytes_done: AtomicU64,
    finished: AtomicBool,
    started: Instant,
    render: Mutex<()>,
}

impl ProgressReporter {
    pub fn new(units_total: usize, bytes_total: u64) -> Self {
        Self::with_output(units_total, bytes_total, true)
    }

    /// Same bookkeeping, nothing printed.
    pub fn hidden(units_total: usize, bytes_total: u64) -> Self {
        Self::with_output(units_total, bytes_total, false)
    }

    pub fn with_output(units_total: usize, bytes_total: u64, enabled: bool) -> Self {
        Self {
            enabled,
            units_total: units_total as u64,
            bytes_total,
            units_done: AtomicU64::new(0),
            bytes_done: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            started: Instant::now(),
            render: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let units_done = self.units_done.load(Ordering::SeqCst);
        let bytes_done = self.bytes_done.load(Ordering::SeqCst);
        let elapsed = self.started.elapsed();
        let eta = if units_done > 0 {
            let remaining = self.units_total.saturating_sub(units_done);
            elapsed.div_f64(units_done as f64).mul_f64(remaining as f64)
        } else {
            Duration::ZERO
        };
        Snapshot {
            units_done,
            units_total: self.units_total,
            bytes_done,
            bytes_total: self.bytes_total,
            elapsed,
            eta,
        }
    }

    /// Record one finished unit and redraw the status line.
    pub fn update(&self, index: usize, unit_bytes: u64, unit_elapsed: Duration) -> Snapshot {
        self.units_done.fetch_add(1, Ordering::SeqCst);
        self.bytes_done.fetch_add(unit_bytes, Ordering::SeqCst);

        // Snapshot under the lock so successive lines never go backwards.
        let _guard = self.render.lock().unwrap_or_else(|e| e.into_inner());
        let snap = self.snapshot();
        if self.enabled {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "\r{}", render_line(&snap, index, unit_elapsed));
            let _ = err.flush();
        }
        snap
    }

    /// Print the total wall time. Only the first call does anything.
    pub fn finish(&self) -> Option<Duration> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return None;
        }
        let elapsed = self.started.elapsed();
        if self.enabled {
            eprintln!("\nAll {} units completed in {}", self.units_total, fmt_duration(elapsed));
        }
        info!(
            units = self.units_done.load(Ordering::SeqCst),
            bytes = self.bytes_done.load(Ordering::SeqCst),
            elapsed_ms = elapsed.as_millis() as u64,
            "generation finished"
        );
        Some(elapsed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

pub fn render_line(snap: &Snapshot, index: usize, unit_elapsed: Duration) -> String {
    let unit_pct = snap.unit_pct();
    let filled = ((BAR_WIDTH as f64 * unit_pct / 100.0) as usize).min(BAR_WIDTH);
    let bar = "█".repeat(filled) + &"░".repeat(BAR_WIDTH - filled);
    format!(
        "[{}] {}/{} units ({:.1}%) | {}/{} ({:.1}%) | Unit {}: {} | ETA: {}",
        bar,
        snap.units_done,
        snap.units_total,
        unit_pct,
        size::format(snap.bytes_done),
        size::format(snap.bytes_total),
        snap.byte_pct(),
        index,
        fmt_duration(unit_elapsed),
        fmt_duration(Duration::from_secs(snap.eta.as_secs_f64().round() as u64)),
    )
}

pub fn fmt_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let secs = d.as_secs();
    if secs < 60 {
        return format!("{:.3}s", d.as_secs_f64());
    }
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else {
        format!("{}m{:02}s", m, s)
    }
}
