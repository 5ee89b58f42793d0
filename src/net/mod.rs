//! Raw-socket constructors for the reactor and dispatcher to register.
//!
//! Deliberately thin: these hand back an owned [`crate::fd::Fd`] rather than
//! a `std::net` type, because every caller in this crate immediately feeds
//! the raw fd into a `Selector`/`Reactor` registration rather than using
//! `std::net`'s blocking read/write API.

pub mod tcp;
