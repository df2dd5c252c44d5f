//! Process-wide engine lifecycle.
//!
//! The runtime is a mutex-protected singleton holding the configuration, the
//! engine thread pool and a started flag. [`startup`] is idempotent (a second
//! call logs a warning), [`startup_if_needed`] starts lazily with defaults,
//! and [`shutdown`] drains the cache and resets the state so that a fresh
//! startup is possible. Operations on existing images fail with
//! [`Error::NotStarted`] while the runtime is down.

use crate::config::Config;
use crate::engine::{self, cache};
use crate::error::{Error, Result};
use crate::logging::{log_debug, log_info, log_warn};
use crate::registry;
use rayon::ThreadPool;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

/// Version of the built-in imaging engine as `(major, minor, micro)`.
pub const ENGINE_VERSION: (u32, u32, u32) = (1, 3, 0);

/// Oldest engine `(major, minor)` this crate works with.
pub const MIN_ENGINE_VERSION: (u32, u32) = (1, 2);

struct RuntimeState {
    running: bool,
    config: Config,
    pool: Option<Arc<ThreadPool>>,
}

static STATE: LazyLock<Mutex<RuntimeState>> = LazyLock::new(|| {
    Mutex::new(RuntimeState {
        running: false,
        config: Config::default(),
        pool: None,
    })
});

static RUNNING: AtomicBool = AtomicBool::new(false);
static COLLECT_STATS: AtomicBool = AtomicBool::new(false);

static OPERATION_COUNTS: LazyLock<Mutex<BTreeMap<String, u64>>> =
    LazyLock::new(|| Mutex::new(BTreeMap::new()));

thread_local! {
    static LOCAL_COUNTS: RefCell<HashMap<&'static str, u64>> = RefCell::new(HashMap::new());
}

/// Memory and resource counters, see [`read_memory_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    /// Bytes of pixel data currently allocated.
    pub mem: u64,
    /// High-water mark of `mem`.
    pub mem_high: u64,
    /// Open file-backed stream sources and targets.
    pub files: u64,
    /// Live native images.
    pub allocs: u64,
}

fn lock_state() -> std::sync::MutexGuard<'static, RuntimeState> {
    STATE.lock().unwrap_or_else(|e| e.into_inner())
}

/// Start the runtime. `None` uses [`Config::default`].
///
/// A second call while running logs a warning and does nothing.
///
/// # Panics
///
/// Panics when the engine is older than [`MIN_ENGINE_VERSION`] or cannot be
/// initialised.
pub fn startup(config: Option<Config>) {
    match try_startup(config) {
        Ok(()) | Err(Error::AlreadyStarted) => {}
        Err(err) => panic!("pixform: startup failed: {err}"),
    }
}

/// Start the runtime, reporting failure instead of panicking.
pub fn try_startup(config: Option<Config>) -> Result<()> {
    let mut state = lock_state();
    if state.running {
        log_warn!("runtime already started");
        return Err(Error::AlreadyStarted);
    }

    check_version(ENGINE_VERSION, MIN_ENGINE_VERSION)?;

    let config = config.unwrap_or_default();
    config
        .validate()
        .map_err(|e| Error::invalid(e.to_string()))?;

    let threads = config.effective_threads();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("pixform-{i}"))
        .build()
        .map_err(|e| Error::engine(format!("thread pool: {e}")))?;

    registry::init();
    cache::configure(cache::Limits::from(&config));
    COLLECT_STATS.store(config.collect_stats, Ordering::Relaxed);

    log_info!(
        "engine {}.{}.{} started with {threads} thread(s)",
        ENGINE_VERSION.0,
        ENGINE_VERSION.1,
        ENGINE_VERSION.2
    );
    log_debug!("loaders: {}", registry::summary());

    state.config = config;
    state.pool = Some(Arc::new(pool));
    state.running = true;
    RUNNING.store(true, Ordering::Release);
    Ok(())
}

/// Start with defaults unless already running.
pub fn startup_if_needed() {
    if !RUNNING.load(Ordering::Acquire) {
        startup(None);
    }
}

/// Whether the runtime is started.
pub fn is_running() -> bool {
    RUNNING.load(Ordering::Acquire)
}

/// Stop the runtime: drop the cache, report leaks if configured, and release
/// the thread pool. Logs a warning when not running.
pub fn shutdown() {
    let mut state = lock_state();
    if !state.running {
        log_warn!("runtime not started");
        return;
    }

    RUNNING.store(false, Ordering::Release);
    shutdown_thread();
    cache::clear();

    if state.config.report_leaks {
        let live = engine::live_images();
        if live.is_empty() {
            log_info!("no leaked images");
        } else {
            log_warn!("{} image(s) still alive at shutdown", live.len());
            for description in live {
                log_warn!("  {description}");
            }
        }
        let (sources, targets) = crate::stream::open_streams();
        if sources + targets > 0 {
            log_warn!("{sources} source(s) and {targets} target(s) still open at shutdown");
        }
    }

    state.pool = None;
    state.running = false;
    state.config = Config::default();
    COLLECT_STATS.store(false, Ordering::Relaxed);
    log_info!("engine stopped");
}

/// Release this thread's engine state.
///
/// Per-thread operation counters are merged into the process totals. The
/// transform facade calls this after every apply.
pub fn shutdown_thread() {
    let local = LOCAL_COUNTS.with(|counts| std::mem::take(&mut *counts.borrow_mut()));
    if local.is_empty() {
        return;
    }
    let mut totals = OPERATION_COUNTS.lock().unwrap_or_else(|e| e.into_inner());
    for (name, count) in local {
        *totals.entry(name.to_string()).or_default() += count;
    }
}

/// Per-operation call counts, including the calling thread's pending ones.
///
/// Empty unless the runtime was started with `collect_stats`.
pub fn operation_counts() -> BTreeMap<String, u64> {
    let mut totals = OPERATION_COUNTS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    LOCAL_COUNTS.with(|counts| {
        for (name, count) in counts.borrow().iter() {
            *totals.entry(name.to_string()).or_default() += count;
        }
    });
    totals
}

/// Drop every operation cache entry.
pub fn clear_cache() {
    cache::clear();
}

/// Log every operation cache entry at info level.
pub fn print_cache() {
    cache::print();
}

/// Log a summary of live images and memory use, tagged with `label`.
pub fn print_object_report(label: &str) {
    let stats = read_memory_stats();
    log_info!(
        "memory: {label}: {} image(s), {} bytes in use, {} bytes high water, {} file(s)",
        stats.allocs,
        stats.mem,
        stats.mem_high,
        stats.files
    );
    for description in engine::live_images() {
        log_info!("  {description}");
    }
}

/// Snapshot of the memory counters.
pub fn read_memory_stats() -> MemoryStats {
    engine::memory_stats()
}

/// Run `op` on the engine pool, or inline when the runtime has no pool.
pub(crate) fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    let pool = lock_state().pool.clone();
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Count one call of `name` on this thread when stats are enabled.
pub(crate) fn record_operation(name: &'static str) {
    if COLLECT_STATS.load(Ordering::Relaxed) {
        LOCAL_COUNTS.with(|counts| *counts.borrow_mut().entry(name).or_default() += 1);
    }
}

pub(crate) fn ensure_running() -> Result<()> {
    if is_running() {
        Ok(())
    } else {
        Err(Error::NotStarted)
    }
}

fn check_version(found: (u32, u32, u32), required: (u32, u32)) -> Result<()> {
    if (found.0, found.1) < required {
        return Err(Error::VersionMismatch {
            found: format!("{}.{}.{}", found.0, found.1, found.2),
            required: format!("{}.{}", required.0, required.1),
        });
    }
    Ok(())
}
