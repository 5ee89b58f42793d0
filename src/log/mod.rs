//! Asynchronous, multi-producer-single-consumer structured logger. Call
//! sites encode a self-describing [`record::Record`] and hand it to a
//! segmented queue (`queue`/`segment`) without blocking; a single
//! background thread drains the queue in FIFO order and writes through a
//! size-rolling file (`writer`). [`logger::initialize`] starts it,
//! [`logger::shutdown`] drains and stops it. Use the call site via
//! [`crate::log_info!`]/[`crate::log_warn!`]/[`crate::log_crit!`] rather
//! than building a [`record::Record`] by hand.

#[macro_use]
pub mod macros;

pub mod level;
pub mod logger;
pub mod record;
mod queue;
mod segment;
mod writer;
