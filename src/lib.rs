//! In-memory two-table store served over a newline-delimited TCP protocol.
//!
//! Clients connect with any line-oriented tool (netcat works) and issue
//! whitespace-separated commands against two shared ordered tables, `A`
//! and `B`. Each module covers one responsibility:
//!
//! - [`cli`] parses the command-line interface for the server binary.
//! - [`server`] accepts TCP connections and spawns one session per client.
//! - [`session`] drives the read → frame → dispatch → respond loop for a
//!   single connection.
//! - [`protocol`] frames raw bytes into lines and parses lines into
//!   validated commands.
//! - [`store`] holds the two shared tables and the cursor
//!   re-synchronization primitive long-running scans rely on.
//! - [`join`] streams INTERSECTION and SYMMETRIC_DIFFERENCE rows by a
//!   sorted merge of both tables.
//! - [`metrics`] counts what sessions do, under hierarchical dotted names.
//!
//! Integration tests use this crate directly to exercise sessions over
//! in-process transports as well as real TCP sockets.

pub mod cli;
pub mod join;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;
