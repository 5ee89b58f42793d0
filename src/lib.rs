//! A single-threaded epoll reactor, a multi-reactor dispatcher that hands
//! accepted connections to a pool of worker reactors, and an asynchronous
//! structured logger, for building non-blocking Linux network servers.
//!
//! A raw-fd-oriented selector lives behind `sys::unix`, components take a
//! config struct by value, and `log`-crate tracing covers the library's
//! own internals (separate from [`log_info!`] et al., which are this
//! crate's own structured record logger).

pub mod dispatch;
pub mod error;
pub mod fd;
pub mod interest;
#[cfg(feature = "async-logger")]
#[macro_use]
pub mod log;
pub mod mem;
pub mod net;
pub mod reactor;
mod sys;
pub mod timer;

pub use dispatch::{ConcurrentReactors, DispatchConfig};
pub use error::{Error, Result};
pub use interest::{Interest, Mode};
pub use reactor::{Reactor, ReactorConfig, ReactorHandle};
