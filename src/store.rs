//! The two shared tables and the cursor re-synchronization primitive.
//!
//! Exactly two tables exist for the lifetime of the process, `A` and `B`.
//! Every session shares them by reference; nothing is replicated per
//! connection. Each table is an ordered `id → description` map behind its
//! own async mutex, so sessions running in parallel on the multi-threaded
//! executor get per-table exclusion. Locks are taken per call and never
//! held across a socket write.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use tokio::sync::Mutex;

/// Which of the two tables a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableId {
    A,
    B,
}

impl TableId {
    /// Case-insensitive table selector, `ERR table may be 'A' or 'B' only`
    /// territory for anything else.
    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("a") {
            Some(TableId::A)
        } else if token.eq_ignore_ascii_case("b") {
            Some(TableId::B)
        } else {
            None
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableId::A => write!(f, "A"),
            TableId::B => write!(f, "B"),
        }
    }
}

type Table = Mutex<BTreeMap<u64, String>>;

/// The process-wide pair of tables.
#[derive(Default)]
pub struct TableStore {
    a: Table,
    b: Table,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, id: TableId) -> &Table {
        match id {
            TableId::A => &self.a,
            TableId::B => &self.b,
        }
    }

    /// Stores `(id → desc)` unless the id is already present. Existing
    /// records are never overwritten.
    pub async fn insert(&self, table: TableId, id: u64, desc: String) -> bool {
        use std::collections::btree_map::Entry;

        match self.table(table).lock().await.entry(id) {
            Entry::Vacant(entry) => {
                entry.insert(desc);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Erases `id`, reporting whether it was present.
    pub async fn remove(&self, table: TableId, id: u64) -> bool {
        self.table(table).lock().await.remove(&id).is_some()
    }

    /// Removes and returns the smallest-id record, TRUNCATE's unit of work.
    pub async fn pop_first(&self, table: TableId) -> Option<(u64, String)> {
        self.table(table).lock().await.pop_first()
    }

    /// First record in ascending id order.
    pub async fn first_entry(&self, table: TableId) -> Option<(u64, String)> {
        self.table(table)
            .lock()
            .await
            .iter()
            .next()
            .map(|(id, desc)| (*id, desc.clone()))
    }

    /// First record with an id strictly greater than `id`. DUMP resumes
    /// here after every write instead of holding a cursor across the
    /// suspension point.
    pub async fn entry_after(&self, table: TableId, id: u64) -> Option<(u64, String)> {
        self.table(table)
            .lock()
            .await
            .range((Bound::Excluded(id), Bound::Unbounded))
            .next()
            .map(|(id, desc)| (*id, desc.clone()))
    }

    /// Re-synchronizes a merge-join cursor after a suspension point.
    ///
    /// Searches for the previously captured candidate `id`. If it
    /// survived, the cursor either stays on it or steps to its successor
    /// depending on `advance` (the merge rule decides which side moves).
    /// If it was deleted while the session was suspended, the search lands
    /// on the next surviving key in ascending order, which becomes the new
    /// candidate regardless of `advance` - the deletion already moved the
    /// cursor past the captured position.
    pub async fn resync(&self, table: TableId, id: u64, advance: bool) -> Option<(u64, String)> {
        let guard = self.table(table).lock().await;
        let mut range = guard.range(id..);
        match range.next() {
            Some((&found, desc)) if found == id => {
                if advance {
                    range.next().map(|(id, desc)| (*id, desc.clone()))
                } else {
                    Some((found, desc.clone()))
                }
            }
            next => next.map(|(id, desc)| (*id, desc.clone())),
        }
    }

    pub async fn len(&self, table: TableId) -> usize {
        self.table(table).lock().await.len()
    }
}
