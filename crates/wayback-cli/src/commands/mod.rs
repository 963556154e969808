//! Command implementations for the wayback CLI.

pub mod cdx;
pub mod near;
pub mod save;
