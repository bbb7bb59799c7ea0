//! Line framing and command parsing for the wire protocol.
//!
//! The protocol is newline-delimited ASCII: one command per line, tokens
//! separated by runs of whitespace, command verb and table selector
//! matched case-insensitively. [`LineFramer`] turns raw read chunks into
//! complete lines; [`Command::parse`] validates a line before anything
//! touches the tables, so a malformed command has zero side effects.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::store::TableId;

/// Accumulates raw bytes and extracts complete `\n`-terminated lines.
///
/// Bytes after the last newline stay buffered for the next chunk; a
/// command may arrive split across any number of reads. Lines longer than
/// `max_line_bytes` are a protocol error: the framer reports it once and
/// silently discards input through the next newline so the session can
/// keep going.
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
}

/// Framing failures; recoverable at the session level.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    LineTooLong,
}

impl LineFramer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes,
            discarding: false,
        }
    }

    /// Appends a freshly received chunk.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extracts the next complete line, without its terminator.
    ///
    /// `Ok(None)` means no full line is buffered yet. `Err(LineTooLong)`
    /// is reported once per oversized line; the offending bytes are
    /// dropped up to and including the next newline.
    pub fn next_line(&mut self) -> Result<Option<String>, FrameError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                if pos > self.max_line_bytes {
                    // Complete but over the cap; the line is dropped.
                    return Err(FrameError::LineTooLong);
                }
                return Ok(Some(String::from_utf8_lossy(&line[..pos]).into_owned()));
            }

            if self.discarding {
                // Still inside the oversized line; already reported.
                self.buffer.clear();
                return Ok(None);
            }

            if self.buffer.len() > self.max_line_bytes {
                self.buffer.clear();
                self.discarding = true;
                return Err(FrameError::LineTooLong);
            }

            return Ok(None);
        }
    }
}

/// A fully validated command, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert { table: TableId, id: u64, desc: String },
    Remove { table: TableId, id: u64 },
    Truncate { table: TableId },
    Dump { table: TableId },
    Intersection,
    SymmetricDifference,
    Help,
}

impl Command {
    /// Parses and validates one protocol line.
    ///
    /// Validation order matches the wire contract: arity first, then the
    /// table selector, then the id. The INSERT description is exactly the
    /// fourth token; trailing tokens are accepted and discarded.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(verb) = tokens.first() else {
            return Err(ParseError::Empty);
        };

        match verb.to_ascii_uppercase().as_str() {
            "INSERT" => {
                require_tokens(&tokens, 4, "INSERT")?;
                let table = parse_table(tokens[1], "INSERT")?;
                let id = parse_id(tokens[2], "INSERT")?;
                Ok(Command::Insert {
                    table,
                    id,
                    desc: tokens[3].to_string(),
                })
            }
            "REMOVE" => {
                require_tokens(&tokens, 3, "REMOVE")?;
                let table = parse_table(tokens[1], "REMOVE")?;
                let id = parse_id(tokens[2], "REMOVE")?;
                Ok(Command::Remove { table, id })
            }
            "TRUNCATE" => {
                require_tokens(&tokens, 2, "TRUNCATE")?;
                let table = parse_table(tokens[1], "TRUNCATE")?;
                Ok(Command::Truncate { table })
            }
            "DUMP" => {
                require_tokens(&tokens, 2, "DUMP")?;
                let table = parse_table(tokens[1], "DUMP")?;
                Ok(Command::Dump { table })
            }
            "INTERSECTION" => Ok(Command::Intersection),
            "SYMMETRIC_DIFFERENCE" => Ok(Command::SymmetricDifference),
            "HELP" => Ok(Command::Help),
            _ => Err(ParseError::Unknown),
        }
    }

    /// Command name as used in metric counters.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Insert { .. } => "INSERT",
            Command::Remove { .. } => "REMOVE",
            Command::Truncate { .. } => "TRUNCATE",
            Command::Dump { .. } => "DUMP",
            Command::Intersection => "INTERSECTION",
            Command::SymmetricDifference => "SYMMETRIC_DIFFERENCE",
            Command::Help => "HELP",
        }
    }

    /// Table selector, for commands that have one.
    pub fn table(&self) -> Option<TableId> {
        match self {
            Command::Insert { table, .. }
            | Command::Remove { table, .. }
            | Command::Truncate { table }
            | Command::Dump { table } => Some(*table),
            _ => None,
        }
    }
}

/// Validation failures; the rendered text is wire contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    Unknown,
    NotEnoughArguments { command: &'static str },
    BadTable { command: &'static str },
    BadId { command: &'static str },
}

impl ParseError {
    /// Exact response line sent to the client.
    pub fn response(&self) -> String {
        match self {
            ParseError::Empty => "ERR no command".to_string(),
            ParseError::Unknown => "ERR unknown command".to_string(),
            ParseError::NotEnoughArguments { command } => {
                format!("ERR not enough arguments for {}", command.to_lowercase())
            }
            ParseError::BadTable { .. } => "ERR table may be 'A' or 'B' only".to_string(),
            ParseError::BadId { .. } => "ERR id must be number".to_string(),
        }
    }

    /// Counter charged for this failure. Validation failures are counted
    /// apart from runtime failures like a duplicate id.
    pub fn counter(&self) -> String {
        match self {
            ParseError::Empty => "session.errors.empty".to_string(),
            ParseError::Unknown => "session.errors.unknown".to_string(),
            ParseError::NotEnoughArguments { command }
            | ParseError::BadTable { command }
            | ParseError::BadId { command } => {
                format!("session.errors.validation.{command}")
            }
        }
    }
}

fn require_tokens(
    tokens: &[&str],
    min: usize,
    command: &'static str,
) -> Result<(), ParseError> {
    if tokens.len() < min {
        return Err(ParseError::NotEnoughArguments { command });
    }
    Ok(())
}

fn parse_table(token: &str, command: &'static str) -> Result<TableId, ParseError> {
    TableId::parse(token).ok_or(ParseError::BadTable { command })
}

fn parse_id(token: &str, command: &'static str) -> Result<u64, ParseError> {
    // One or more ASCII digits, no sign. An all-digit token too large for
    // u64 is rejected the same way as a non-numeric one.
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::BadId { command });
    }
    token.parse::<u64>().map_err(|_| ParseError::BadId { command })
}

/// Writes one response or data line, newline-terminated, and flushes so
/// line-oriented clients see it immediately.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framer_keeps_partial_line_for_next_chunk() {
        let mut framer = LineFramer::new(8192);
        framer.extend(b"INSERT A 1 ");
        assert_eq!(framer.next_line(), Ok(None));

        framer.extend(b"foo\nDUMP");
        assert_eq!(framer.next_line(), Ok(Some("INSERT A 1 foo".to_string())));
        assert_eq!(framer.next_line(), Ok(None));

        framer.extend(b" A\n");
        assert_eq!(framer.next_line(), Ok(Some("DUMP A".to_string())));
    }

    #[test]
    fn framer_extracts_multiple_lines_from_one_chunk() {
        let mut framer = LineFramer::new(8192);
        framer.extend(b"HELP\n\nDUMP B\n");
        assert_eq!(framer.next_line(), Ok(Some("HELP".to_string())));
        assert_eq!(framer.next_line(), Ok(Some("".to_string())));
        assert_eq!(framer.next_line(), Ok(Some("DUMP B".to_string())));
        assert_eq!(framer.next_line(), Ok(None));
    }

    #[test]
    fn framer_reports_oversized_line_once_and_recovers() {
        let mut framer = LineFramer::new(8);
        framer.extend(b"0123456789");
        assert_eq!(framer.next_line(), Err(FrameError::LineTooLong));
        // More of the same oversized line; no second report.
        framer.extend(b"abcdef");
        assert_eq!(framer.next_line(), Ok(None));
        framer.extend(b"ghi\nHELP\n");
        assert_eq!(framer.next_line(), Ok(Some("HELP".to_string())));
    }

    #[test]
    fn framer_rejects_complete_oversized_line() {
        let mut framer = LineFramer::new(8);
        framer.extend(b"0123456789ABC\nHELP\n");
        assert_eq!(framer.next_line(), Err(FrameError::LineTooLong));
        assert_eq!(framer.next_line(), Ok(Some("HELP".to_string())));
    }

    #[test]
    fn parses_commands_case_insensitively() {
        assert_eq!(
            Command::parse("insert a 1 foo"),
            Ok(Command::Insert {
                table: TableId::A,
                id: 1,
                desc: "foo".to_string()
            })
        );
        assert_eq!(
            Command::parse("Remove B 2"),
            Ok(Command::Remove {
                table: TableId::B,
                id: 2
            })
        );
        assert_eq!(
            Command::parse("truncate b"),
            Ok(Command::Truncate { table: TableId::B })
        );
        assert_eq!(Command::parse("intersection"), Ok(Command::Intersection));
        assert_eq!(
            Command::parse("symmetric_difference"),
            Ok(Command::SymmetricDifference)
        );
        assert_eq!(Command::parse("help"), Ok(Command::Help));
    }

    #[test]
    fn insert_description_is_exactly_the_fourth_token() {
        // Trailing tokens are accepted and discarded.
        assert_eq!(
            Command::parse("INSERT A 1 two words here"),
            Ok(Command::Insert {
                table: TableId::A,
                id: 1,
                desc: "two".to_string()
            })
        );
    }

    #[test]
    fn tokenization_collapses_whitespace_runs() {
        assert_eq!(
            Command::parse("  DUMP\t  A \r"),
            Ok(Command::Dump { table: TableId::A })
        );
    }

    #[test]
    fn blank_line_is_no_command() {
        assert_eq!(Command::parse(""), Err(ParseError::Empty));
        assert_eq!(Command::parse("   "), Err(ParseError::Empty));
        assert_eq!(ParseError::Empty.response(), "ERR no command");
    }

    #[test]
    fn unrecognized_verb_is_unknown_command() {
        assert_eq!(Command::parse("UPSERT A 1 x"), Err(ParseError::Unknown));
        assert_eq!(ParseError::Unknown.response(), "ERR unknown command");
    }

    #[test]
    fn arity_is_checked_before_anything_else() {
        assert_eq!(
            Command::parse("INSERT"),
            Err(ParseError::NotEnoughArguments { command: "INSERT" })
        );
        assert_eq!(
            Command::parse("INSERT C"),
            Err(ParseError::NotEnoughArguments { command: "INSERT" })
        );
        assert_eq!(
            Command::parse("REMOVE A"),
            Err(ParseError::NotEnoughArguments { command: "REMOVE" })
        );
        assert_eq!(
            Command::parse("TRUNCATE"),
            Err(ParseError::NotEnoughArguments { command: "TRUNCATE" })
        );
        assert_eq!(
            Command::parse("DUMP"),
            Err(ParseError::NotEnoughArguments { command: "DUMP" })
        );
        assert_eq!(
            ParseError::NotEnoughArguments { command: "INSERT" }.response(),
            "ERR not enough arguments for insert"
        );
    }

    #[test]
    fn table_selector_must_be_a_or_b() {
        assert_eq!(
            Command::parse("INSERT C 1 x"),
            Err(ParseError::BadTable { command: "INSERT" })
        );
        assert_eq!(
            Command::parse("DUMP AB"),
            Err(ParseError::BadTable { command: "DUMP" })
        );
        assert_eq!(
            ParseError::BadTable { command: "DUMP" }.response(),
            "ERR table may be 'A' or 'B' only"
        );
    }

    #[test]
    fn id_must_be_unsigned_digits() {
        assert_eq!(
            Command::parse("REMOVE A abc"),
            Err(ParseError::BadId { command: "REMOVE" })
        );
        assert_eq!(
            Command::parse("INSERT A -1 x"),
            Err(ParseError::BadId { command: "INSERT" })
        );
        assert_eq!(
            Command::parse("INSERT A 1.5 x"),
            Err(ParseError::BadId { command: "INSERT" })
        );
        // All digits but beyond u64::MAX.
        assert_eq!(
            Command::parse("INSERT A 99999999999999999999 x"),
            Err(ParseError::BadId { command: "INSERT" })
        );
        assert_eq!(
            ParseError::BadId { command: "INSERT" }.response(),
            "ERR id must be number"
        );
    }

    #[test]
    fn leading_zeros_are_accepted() {
        assert_eq!(
            Command::parse("REMOVE A 007"),
            Ok(Command::Remove {
                table: TableId::A,
                id: 7
            })
        );
    }

    #[test]
    fn commands_expose_metric_name_and_table_scope() {
        let insert = Command::parse("insert a 1 x").expect("parse insert");
        assert_eq!(insert.name(), "INSERT");
        assert_eq!(insert.table(), Some(TableId::A));

        let truncate = Command::parse("TRUNCATE b").expect("parse truncate");
        assert_eq!(truncate.name(), "TRUNCATE");
        assert_eq!(truncate.table(), Some(TableId::B));

        let join = Command::parse("SYMMETRIC_DIFFERENCE").expect("parse join");
        assert_eq!(join.name(), "SYMMETRIC_DIFFERENCE");
        assert_eq!(join.table(), None);

        assert_eq!(Command::Help.table(), None);
    }

    #[test]
    fn validation_failures_map_to_distinct_counters() {
        assert_eq!(ParseError::Empty.counter(), "session.errors.empty");
        assert_eq!(ParseError::Unknown.counter(), "session.errors.unknown");
        assert_eq!(
            ParseError::BadId { command: "REMOVE" }.counter(),
            "session.errors.validation.REMOVE"
        );
    }
}
