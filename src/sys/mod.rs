#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::selector::Selector;
#[cfg(unix)]
pub use unix::{self_pipe, sockopt};
