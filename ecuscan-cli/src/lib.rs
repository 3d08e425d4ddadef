//! ecuscan command-line interface
//!
//! Runs firmware analyses against the local scan database and inspects
//! stored scans and reports without a running daemon.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
