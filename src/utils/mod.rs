//! Shared helpers for binaries and adapters.

pub mod bootstrap;
pub mod retry;
