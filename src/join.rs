//! Merge-join streaming of INTERSECTION and SYMMETRIC_DIFFERENCE rows.
//!
//! Both tables are walked by ascending id with one logical cursor each.
//! Every output row (or fairness yield, on steps that emit nothing) is a
//! suspension point during which other sessions may mutate either table,
//! so the cursors are never raw iterators: after each step both sides are
//! re-located by key through [`TableStore::resync`]. A candidate deleted
//! mid-join simply re-lands the cursor on the next surviving key. Rows
//! come out strictly ascending by id; entries inserted behind a cursor or
//! removed ahead of it may or may not appear, which is the accepted
//! weak-consistency behavior of a join over live tables.

use std::io;

use tokio::io::AsyncWrite;
use tokio::task::yield_now;

use crate::protocol::write_line;
use crate::store::{TableId, TableStore};

/// Which cross-table view to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Intersection,
    SymmetricDifference,
}

impl JoinKind {
    /// Renders the row for one merge step, if this step emits one.
    ///
    /// Intersection: both candidates present and equal. Symmetric
    /// difference: the lesser or only side, padded with two empty
    /// columns; ids present on both sides are excluded.
    fn render(
        self,
        a: Option<&(u64, String)>,
        b: Option<&(u64, String)>,
    ) -> Option<String> {
        match self {
            JoinKind::Intersection => match (a, b) {
                (Some((id_a, desc_a)), Some((id_b, desc_b))) if id_a == id_b => {
                    Some(format!("{id_a}\t{desc_a}\t{id_b}\t{desc_b}"))
                }
                _ => None,
            },
            JoinKind::SymmetricDifference => match (a, b) {
                (Some((id_a, _)), Some((id_b, _))) if id_a == id_b => None,
                (Some((id_a, desc_a)), Some((id_b, _))) if id_a < id_b => {
                    Some(format!("{id_a}\t{desc_a}\t\t"))
                }
                (Some(_), Some((id_b, desc_b))) => Some(format!("\t\t{id_b}\t{desc_b}")),
                (Some((id_a, desc_a)), None) => Some(format!("{id_a}\t{desc_a}\t\t")),
                (None, Some((id_b, desc_b))) => Some(format!("\t\t{id_b}\t{desc_b}")),
                (None, None) => None,
            },
        }
    }
}

/// Streams the join rows to `writer`, one line at a time.
///
/// The caller owes the client a final `OK` after this returns; a write
/// error aborts the remaining steps and propagates.
pub async fn stream_join<W>(
    store: &TableStore,
    kind: JoinKind,
    writer: &mut W,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut cursor_a = store.first_entry(TableId::A).await;
    let mut cursor_b = store.first_entry(TableId::B).await;

    while cursor_a.is_some() || cursor_b.is_some() {
        match kind.render(cursor_a.as_ref(), cursor_b.as_ref()) {
            Some(row) => write_line(writer, &row).await?,
            // Nothing to emit this step; yield anyway so long stretches
            // of non-matching keys cannot starve other sessions.
            None => yield_now().await,
        }

        // Standard merge rule: equal candidates advance both sides, the
        // lesser candidate advances alone, a lone survivor advances.
        let (advance_a, advance_b) = match (&cursor_a, &cursor_b) {
            (Some((id_a, _)), Some((id_b, _))) if id_a == id_b => (true, true),
            (Some((id_a, _)), Some((id_b, _))) if id_a < id_b => (true, false),
            (Some(_), Some(_)) => (false, true),
            (Some(_), None) => (true, false),
            (None, Some(_)) => (false, true),
            (None, None) => unreachable!("loop guard requires a live cursor"),
        };

        if let Some((id, _)) = cursor_a {
            cursor_a = store.resync(TableId::A, id, advance_a).await;
        }
        if let Some((id, _)) = cursor_b {
            cursor_b = store.resync(TableId::B, id, advance_b).await;
        }
    }

    Ok(())
}
