//! Process-wide async logger: singleton init/shutdown plus the
//! background drain thread.
//!
//! [`initialize`] creates the singleton at most once, behind a
//! [`std::sync::OnceLock`], and starts a worker thread that busy-pops the
//! queue and yields when it finds nothing to drain. [`shutdown`] signals the
//! worker to stop, then joins it only after every record already queued has
//! been drained and written.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::log::queue::Queue;
use crate::log::record::Record;
use crate::log::segment;
use crate::log::writer::FileWriter;

/// Tunables for [`initialize`].
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub roll_size_mb: u64,
}

struct Logger {
    queue: Queue,
    stop: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Creates the log directory, opens the first roll file, and spawns the
/// background drain thread. Returns [`Error::DoubleInitialization`] if
/// called more than once per process.
pub fn initialize(config: LoggerConfig) -> Result<()> {
    if LOGGER.get().is_some() {
        return Err(Error::DoubleInitialization("log system already initialized"));
    }

    let writer = FileWriter::new(&config)?;
    let logger = Logger {
        queue: Queue::new(segment::segment_len()),
        stop: AtomicBool::new(false),
        worker: Mutex::new(None),
    };

    if LOGGER.set(logger).is_err() {
        return Err(Error::DoubleInitialization("log system already initialized"));
    }

    let handle = std::thread::Builder::new()
        .name("vortex-log".into())
        .spawn(move || worker_loop(writer))
        .expect("failed to spawn log worker thread");
    *LOGGER
        .get()
        .expect("just initialized")
        .worker
        .lock()
        .expect("worker mutex poisoned") = Some(handle);
    Ok(())
}

/// Whether [`initialize`] has run. Used by the `log_*!` macros to make
/// logging a silent no-op before the logger starts; not normally called
/// directly.
#[doc(hidden)]
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

/// Enqueues `record`. A no-op, by design, if the logger hasn't been
/// initialized — callsites shouldn't have to guard every log statement.
pub fn push(record: Record) {
    if let Some(logger) = LOGGER.get() {
        logger.queue.push(record);
    }
}

/// Signals the drain thread to stop and waits for it to flush every
/// record already queued. Safe to call more than once.
pub fn shutdown() {
    let Some(logger) = LOGGER.get() else {
        return;
    };
    logger.stop.store(true, Ordering::Release);
    if let Some(handle) = logger
        .worker
        .lock()
        .expect("worker mutex poisoned")
        .take()
    {
        let _ = handle.join();
    }
}

fn worker_loop(mut writer: FileWriter) {
    let logger = LOGGER.get().expect("logger initialized before worker starts");
    let mut line = String::new();

    loop {
        match logger.queue.try_pop() {
            Some(record) => {
                line.clear();
                let level = record.level();
                record.format_into(&mut line);
                if let Err(e) = writer.write(&line, level) {
                    log::warn!("vortex logger: write failed: {e}");
                }
            }
            None if logger.stop.load(Ordering::Acquire) => break,
            None => std::thread::yield_now(),
        }
    }

    while let Some(record) = logger.queue.try_pop() {
        line.clear();
        let level = record.level();
        record.format_into(&mut line);
        let _ = writer.write(&line, level);
    }
}
