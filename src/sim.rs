//! Simulation and benchmark runners: randomized arrivals feeding a marina.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::actor::TaskReport;
use crate::config::{MarinaConfig, TimingConfig};
use crate::error::MarinaError;
use crate::marina::Marina;
use crate::report::{JsonLinesSink, LogSink, SnapshotSink, spawn_reporter};
use crate::stats::StatsSnapshot;
use crate::types::{Task, TaskId};

// Probability that an arriving vessel needs each service.
const SERVICE_PROBABILITY: f64 = 0.3;

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let usage = unsafe { usage.assume_init() };
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Random vessels: 10-40 m long, 5-10 m wide, any fuel level.
pub fn generate_tasks(count: usize, seed: u64) -> Vec<Task> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (1..=count as TaskId)
        .map(|id| {
            Task::new(
                id,
                rng.gen_range(10..=40),
                rng.gen_range(5..=10),
                rng.gen_range(0..=100),
                rng.gen_bool(SERVICE_PROBABILITY),
                rng.gen_bool(SERVICE_PROBABILITY),
            )
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub vessels: usize,
    pub validate: bool,
    pub json: bool,
}

/// Outcome of one simulation run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub vessels: usize,
    pub rejected: usize,
    pub requeues: u64,
    pub stats: StatsSnapshot,
    pub violations: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn print(&self) {
        println!("SIMULATION SUMMARY");
        println!("vessels={} rejected={}", self.vessels, self.rejected);
        println!("completed={}", self.stats.completed);
        println!("cleanings={}", self.stats.cleanings);
        println!("repairs={}", self.stats.repairs);
        println!("refuels={}", self.stats.refuels);
        println!("requeues={}", self.requeues);
        println!("avg_wait={:.2}", self.stats.average_wait());
        println!("max_wait={}", self.stats.max_wait);
        println!("elapsed_ms={}", self.elapsed.as_millis());
        println!("invariant_violations={}", self.violations);
    }
}

/// Spawn every generated vessel, staggered, and wait for all to leave.
fn drive(marina: &Marina, tasks: Vec<Task>, stagger: Duration) -> (Vec<TaskReport>, usize) {
    let mut handles = Vec::with_capacity(tasks.len());
    let mut rejected = 0usize;
    for task in tasks {
        let id = task.id;
        match marina.spawn_task(task) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                warn!(task = id, %err, "task rejected");
                rejected += 1;
            }
        }
        thread::sleep(stagger);
    }
    let reports = handles
        .into_iter()
        .map(|handle| handle.join().expect("task thread panicked"))
        .collect();
    (reports, rejected)
}

/// Run one simulation with a reporter attached.
pub fn run(config: MarinaConfig, options: &RunOptions) -> Result<RunSummary, MarinaError> {
    let stagger = config.timing.spawn_interval();
    let report_interval = config.timing.report_interval();
    let tasks = generate_tasks(options.vessels, config.seed);
    let marina = Arc::new(Marina::new(config)?);

    let sink: Box<dyn SnapshotSink> = if options.json {
        Box::new(JsonLinesSink::new(io::stdout()))
    } else {
        Box::new(LogSink)
    };
    let reporter = spawn_reporter(Arc::clone(&marina), sink, report_interval, options.validate)?;

    info!(vessels = options.vessels, "simulation started");
    let start = Instant::now();
    let (reports, rejected) = drive(&marina, tasks, stagger);
    let elapsed = start.elapsed();
    let reported = reporter.stop();

    let mut violations = reported.violations;
    for violation in marina.check_invariants() {
        warn!(%violation, "invariant violated at end of run");
        violations += 1;
    }
    marina.shutdown();

    Ok(RunSummary {
        vessels: options.vessels,
        rejected,
        requeues: reports.iter().map(|r| u64::from(r.requeues)).sum(),
        stats: marina.stats(),
        violations,
        elapsed,
    })
}

/// Aggregated metrics from a single benchmark run.
#[derive(Clone, Debug)]
pub struct BenchResult {
    pub vessels: usize,
    pub workers: usize,
    pub elapsed_ms: f64,
    pub throughput: f64,
    pub avg_wait: f64,
    pub max_wait: u64,
    pub cpu_user_s: Option<f64>,
    pub cpu_sys_s: Option<f64>,
    pub rejected: usize,
    pub violations: usize,
}

impl BenchResult {
    pub const CSV_HEADER: &'static str = "vessels,workers,elapsed_ms,throughput_vessels_per_s,avg_wait,max_wait,cpu_user_s,cpu_sys_s,rejected,violations";

    pub fn csv_row(&self) -> String {
        let cpu = |v: Option<f64>| v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "NA".to_string());
        format!(
            "{},{},{:.2},{:.2},{:.2},{},{},{},{},{}",
            self.vessels,
            self.workers,
            self.elapsed_ms,
            self.throughput,
            self.avg_wait,
            self.max_wait,
            cpu(self.cpu_user_s),
            cpu(self.cpu_sys_s),
            self.rejected,
            self.violations
        )
    }
}

/// Run `vessels` arrivals on the fast timing profile and measure throughput.
pub fn bench(mut config: MarinaConfig, vessels: usize) -> Result<BenchResult, MarinaError> {
    config.timing = TimingConfig::fast();
    let workers = config.worker_count;
    let tasks = generate_tasks(vessels, config.seed);
    let marina = Marina::new(config)?;

    let cpu_start = cpu_times_seconds();
    let start = Instant::now();
    let (_, rejected) = drive(&marina, tasks, Duration::ZERO);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let violations = marina.check_invariants().len();
    marina.shutdown();

    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };
    let stats = marina.stats();
    let throughput = if elapsed_ms > 0.0 {
        stats.completed as f64 / (elapsed_ms / 1000.0)
    } else {
        0.0
    };

    Ok(BenchResult {
        vessels,
        workers,
        elapsed_ms,
        throughput,
        avg_wait: stats.average_wait(),
        max_wait: stats.max_wait,
        cpu_user_s,
        cpu_sys_s,
        rejected,
        violations,
    })
}
