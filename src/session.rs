//! Per-connection protocol engine.
//!
//! A session owns one connection's framer and drives the
//! read → frame → parse → execute → respond loop until the peer closes
//! the connection or the transport fails. Commands run strictly one at a
//! time; the next line is not parsed until the previous command's
//! response has been fully written. The session holds the shared tables
//! and metrics only by `Arc` - it has no state visible to other sessions.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::yield_now;
use tracing::debug;

use crate::join::{stream_join, JoinKind};
use crate::metrics::Metrics;
use crate::protocol::{write_line, Command, FrameError, LineFramer};
use crate::store::{TableId, TableStore};

/// Read-chunk size, matching the default line-length cap.
const READ_CHUNK_BYTES: usize = 8192;

/// Usage text streamed by HELP, one line per command.
pub const HELP_LINES: [&str; 7] = [
    "INSERT table id desc - insert record {id, desc} to table, where table may be 'A' or 'B', id must be positive number and desc is a string",
    "TRUNCATE table - remove all records from table, where table may be 'A' or 'B'",
    "INTERSECTION - print records which id present in both tables 'A' and 'B'",
    "SYMMETRIC_DIFFERENCE - print records which id present only in one table - 'A' or 'B'",
    "DUMP table - print content of table, where table may be 'A' or 'B'",
    "REMOVE table id - remove existing record with id from table, where table may be 'A' or 'B' and id must be positive number",
    "HELP print this text",
];

pub struct Session {
    store: Arc<TableStore>,
    metrics: Arc<Metrics>,
    framer: LineFramer,
}

impl Session {
    pub fn new(store: Arc<TableStore>, metrics: Arc<Metrics>, max_line_bytes: usize) -> Self {
        metrics.increment("session.count", 1);
        Self {
            store,
            metrics,
            framer: LineFramer::new(max_line_bytes),
        }
    }

    /// Runs the session until EOF or a transport error.
    ///
    /// Generic over the transport so tests can drive a session over an
    /// in-process duplex pipe instead of a socket.
    pub async fn run<R, W>(mut self, mut reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            self.metrics.increment("session.reads", 1);
            self.framer.extend(&chunk[..read]);

            loop {
                match self.framer.next_line() {
                    Ok(Some(line)) => self.handle_line(&line, &mut writer).await?,
                    Ok(None) => break,
                    Err(FrameError::LineTooLong) => {
                        self.metrics.increment("session.errors.oversize", 1);
                        write_line(&mut writer, "ERR line too long").await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Parses and executes one framed line, then writes its status line.
    async fn handle_line<W>(&self, line: &str, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.metrics.increment("session.lines", 1);
        debug!(command = line, "dispatching line");

        let status = match Command::parse(line) {
            Err(err) => {
                self.metrics.increment(&err.counter(), 1);
                err.response()
            }
            Ok(command) => match self.execute(command, writer).await {
                Ok(status) => status,
                Err(err) => {
                    // Transport failed mid-stream. A response is still
                    // owed, so try once, then let the session die.
                    let _ = write_line(writer, "session error").await;
                    return Err(err);
                }
            },
        };

        write_line(writer, &status).await
    }

    /// Executes a validated command and returns its final status line.
    /// Streaming commands write their data rows before returning.
    /// Metric names come from the command itself, so dispatch and
    /// counters cannot drift apart.
    async fn execute<W>(&self, command: Command, writer: &mut W) -> io::Result<String>
    where
        W: AsyncWrite + Unpin,
    {
        let name = command.name();
        let scope = command.table();

        match command {
            Command::Insert { table, id, desc } => {
                if self.store.insert(table, id, desc).await {
                    self.record_success(name, scope);
                    Ok("OK".to_string())
                } else {
                    self.record_runtime_error(name);
                    Ok(format!("ERR duplicate {id}"))
                }
            }
            Command::Remove { table, id } => {
                if self.store.remove(table, id).await {
                    self.record_success(name, scope);
                    Ok("OK".to_string())
                } else {
                    self.record_runtime_error(name);
                    Ok(format!("ERR absent {id}"))
                }
            }
            Command::Truncate { table } => {
                self.truncate(table).await;
                self.record_success(name, scope);
                Ok("OK".to_string())
            }
            Command::Dump { table } => {
                self.dump(table, writer).await?;
                self.record_success(name, scope);
                Ok("OK".to_string())
            }
            Command::Intersection => {
                stream_join(&self.store, JoinKind::Intersection, writer).await?;
                self.record_success(name, scope);
                Ok("OK".to_string())
            }
            Command::SymmetricDifference => {
                stream_join(&self.store, JoinKind::SymmetricDifference, writer).await?;
                self.record_success(name, scope);
                Ok("OK".to_string())
            }
            Command::Help => {
                for line in HELP_LINES {
                    write_line(writer, line).await?;
                }
                self.record_success(name, scope);
                Ok("OK".to_string())
            }
        }
    }

    /// Removes records one at a time, yielding between deletions so a
    /// large truncate cannot starve the other sessions sharing the table.
    ///
    /// The yields are fairness points, not I/O: a dead peer goes
    /// unnoticed until the status write that follows. The loop is finite
    /// and already-applied deletions persist either way.
    async fn truncate(&self, table: TableId) {
        while self.store.pop_first(table).await.is_some() {
            yield_now().await;
        }
    }

    /// Streams every record ascending by id. Each write is a suspension
    /// point, so the scan resumes by key lookup rather than a held cursor.
    async fn dump<W>(&self, table: TableId, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut cursor = self.store.first_entry(table).await;
        while let Some((id, desc)) = cursor {
            write_line(writer, &format!("{id}\t{desc}")).await?;
            cursor = self.store.entry_after(table, id).await;
        }
        Ok(())
    }

    fn record_success(&self, name: &str, table: Option<TableId>) {
        self.metrics
            .increment(&format!("session.successes.{name}"), 1);
        if let Some(table) = table {
            self.metrics
                .increment(&format!("session.successes.{table}.{name}"), 1);
        }
    }

    fn record_runtime_error(&self, name: &str) {
        self.metrics.increment(&format!("session.errors.{name}"), 1);
    }
}
