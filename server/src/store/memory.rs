//! In-memory store with optimistic serializable isolation.
//!
//! Each unit of work records the version of every row it reads and buffers its writes. Commit
//! re-checks those versions under the table lock and fails with a serialization conflict if any
//! row moved, which is the behaviour a serializable database gives the processor. The lock is
//! only ever held inside a synchronous section, never across an await.
//!
//! Intended for tests, development nodes and as the reference for the repository contracts.

use super::{
    CommitmentRepository, Isolation, NullifierRepository, RootHistoryRepository, StoreError,
    TallyRepository, TransactionRepository, UnitOfWork, UnitOfWorkProvider,
};
use crate::types::{
    MemberCommitment, MerkleRootHistory, MessageReactionTally, ReactionNullifier,
    ReactionTransaction,
};
use common::{Commitment, FeedId, MessageId, Nullifier};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum RowKey {
    Commitments(FeedId),
    Roots(FeedId),
    Tally(MessageId),
    Nullifier(Nullifier),
}

#[derive(Debug, Default)]
struct Tables {
    commitments: HashMap<FeedId, Vec<MemberCommitment>>,
    roots: HashMap<FeedId, Vec<MerkleRootHistory>>,
    tallies: HashMap<MessageId, MessageReactionTally>,
    nullifiers: HashMap<Nullifier, ReactionNullifier>,
    transactions: Vec<ReactionTransaction>,
    /// Commit clock value of the last write to each row. Absent rows are version 0.
    versions: HashMap<RowKey, u64>,
    clock: u64,
    next_transaction_id: u64,
    injected_failures: VecDeque<StoreError>,
}

impl Tables {
    fn version(&self, key: &RowKey) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Pending {
    commitments: Vec<MemberCommitment>,
    roots: Vec<MerkleRootHistory>,
    tallies: HashMap<MessageId, MessageReactionTally>,
    nullifiers: HashMap<Nullifier, ReactionNullifier>,
    transactions: Vec<ReactionTransaction>,
}

/// Shared handle; clones see the same tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

fn lock(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, StoreError> {
    tables
        .lock()
        .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commits fail with the given errors, in order.
    ///
    /// Used to drive conflict-retry and failure paths deterministically.
    pub fn fail_next_commits(&self, errors: impl IntoIterator<Item = StoreError>) {
        if let Ok(mut tables) = lock(&self.tables) {
            tables.injected_failures.extend(errors);
        }
    }

    /// Number of audit rows committed so far.
    pub fn transaction_count(&self) -> usize {
        lock(&self.tables)
            .map(|t| t.transactions.len())
            .unwrap_or(0)
    }
}

impl UnitOfWorkProvider for MemoryStore {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self, isolation: Isolation) -> Result<MemoryUnitOfWork, StoreError> {
        Ok(MemoryUnitOfWork {
            tables: Arc::clone(&self.tables),
            isolation,
            reads: HashMap::new(),
            pending: Pending::default(),
        })
    }
}

pub struct MemoryUnitOfWork {
    tables: Arc<Mutex<Tables>>,
    isolation: Isolation,
    reads: HashMap<RowKey, u64>,
    pending: Pending,
}

impl MemoryUnitOfWork {
    /// Reads under the lock and records the row version on first touch.
    fn read<T>(&mut self, key: RowKey, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = lock(&self.tables)?;
        let version = tables.version(&key);
        self.reads.entry(key).or_insert(version);
        Ok(f(&tables))
    }

    fn writable(&self) -> Result<(), StoreError> {
        match self.isolation {
            Isolation::ReadOnly => Err(StoreError::ReadOnly),
            Isolation::Serializable => Ok(()),
        }
    }
}

impl CommitmentRepository for MemoryUnitOfWork {
    async fn commitments(&mut self, feed_id: &FeedId) -> Result<Vec<MemberCommitment>, StoreError> {
        let mut rows = self.read(RowKey::Commitments(*feed_id), |t| {
            t.commitments.get(feed_id).cloned().unwrap_or_default()
        })?;
        rows.extend(
            self.pending
                .commitments
                .iter()
                .filter(|c| &c.feed_id == feed_id)
                .cloned(),
        );
        Ok(rows)
    }

    async fn contains_commitment(
        &mut self,
        feed_id: &FeedId,
        commitment: &Commitment,
    ) -> Result<bool, StoreError> {
        let pending = self
            .pending
            .commitments
            .iter()
            .any(|c| &c.feed_id == feed_id && &c.commitment == commitment);
        let committed = self.read(RowKey::Commitments(*feed_id), |t| {
            t.commitments
                .get(feed_id)
                .is_some_and(|rows| rows.iter().any(|c| &c.commitment == commitment))
        })?;
        Ok(pending || committed)
    }

    async fn insert_commitment(&mut self, row: MemberCommitment) -> Result<(), StoreError> {
        self.writable()?;
        self.pending.commitments.push(row);
        Ok(())
    }
}

impl RootHistoryRepository for MemoryUnitOfWork {
    async fn append_root(&mut self, row: MerkleRootHistory) -> Result<(), StoreError> {
        self.writable()?;
        self.pending.roots.push(row);
        Ok(())
    }

    async fn recent_roots(
        &mut self,
        feed_id: &FeedId,
        count: usize,
    ) -> Result<Vec<MerkleRootHistory>, StoreError> {
        let mut rows = self.read(RowKey::Roots(*feed_id), |t| {
            t.roots.get(feed_id).cloned().unwrap_or_default()
        })?;
        rows.extend(
            self.pending
                .roots
                .iter()
                .filter(|r| &r.feed_id == feed_id)
                .cloned(),
        );
        Ok(rows.into_iter().rev().take(count).collect())
    }
}

impl TallyRepository for MemoryUnitOfWork {
    async fn tally_for_update(
        &mut self,
        message_id: &MessageId,
    ) -> Result<Option<MessageReactionTally>, StoreError> {
        if let Some(row) = self.pending.tallies.get(message_id) {
            return Ok(Some(row.clone()));
        }
        self.read(RowKey::Tally(*message_id), |t| t.tallies.get(message_id).cloned())
    }

    async fn save_tally(&mut self, row: MessageReactionTally) -> Result<(), StoreError> {
        self.writable()?;
        self.pending.tallies.insert(row.message_id, row);
        Ok(())
    }

    async fn tallies(
        &mut self,
        feed_id: &FeedId,
        message_ids: &[MessageId],
    ) -> Result<Vec<MessageReactionTally>, StoreError> {
        let mut out = Vec::with_capacity(message_ids.len());
        for id in message_ids {
            let row = match self.pending.tallies.get(id) {
                Some(row) => Some(row.clone()),
                None => self.read(RowKey::Tally(*id), |t| t.tallies.get(id).cloned())?,
            };
            out.extend(row.filter(|r| &r.feed_id == feed_id));
        }
        Ok(out)
    }
}

impl NullifierRepository for MemoryUnitOfWork {
    async fn nullifier(
        &mut self,
        nullifier: &Nullifier,
    ) -> Result<Option<ReactionNullifier>, StoreError> {
        if let Some(row) = self.pending.nullifiers.get(nullifier) {
            return Ok(Some(row.clone()));
        }
        self.read(RowKey::Nullifier(*nullifier), |t| {
            t.nullifiers.get(nullifier).cloned()
        })
    }

    async fn save_nullifier(&mut self, row: ReactionNullifier) -> Result<(), StoreError> {
        self.writable()?;
        self.pending.nullifiers.insert(row.nullifier, row);
        Ok(())
    }
}

impl TransactionRepository for MemoryUnitOfWork {
    async fn append_transaction(
        &mut self,
        mut row: ReactionTransaction,
    ) -> Result<ReactionTransaction, StoreError> {
        self.writable()?;
        let mut tables = lock(&self.tables)?;
        tables.next_transaction_id += 1;
        row.id = tables.next_transaction_id;
        drop(tables);
        self.pending.transactions.push(row.clone());
        Ok(row)
    }

    async fn transactions_for_message(
        &mut self,
        message_id: &MessageId,
    ) -> Result<Vec<ReactionTransaction>, StoreError> {
        let tables = lock(&self.tables)?;
        let mut rows: Vec<_> = tables
            .transactions
            .iter()
            .filter(|t| &t.message_id == message_id)
            .cloned()
            .collect();
        drop(tables);
        rows.extend(
            self.pending
                .transactions
                .iter()
                .filter(|t| &t.message_id == message_id)
                .cloned(),
        );
        Ok(rows)
    }
}

impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self) -> Result<(), StoreError> {
        if self.isolation == Isolation::ReadOnly {
            return Ok(());
        }
        let mut tables = lock(&self.tables)?;
        if let Some(err) = tables.injected_failures.pop_front() {
            return Err(err);
        }
        for (key, seen) in &self.reads {
            if tables.version(key) != *seen {
                debug!(?key, seen, current = tables.version(key), "row moved since read");
                return Err(StoreError::SerializationConflict);
            }
        }

        tables.clock += 1;
        let stamp = tables.clock;
        let Pending {
            commitments,
            roots,
            tallies,
            nullifiers,
            transactions,
        } = self.pending;

        for row in commitments {
            tables.versions.insert(RowKey::Commitments(row.feed_id), stamp);
            tables.commitments.entry(row.feed_id).or_default().push(row);
        }
        for row in roots {
            tables.versions.insert(RowKey::Roots(row.feed_id), stamp);
            tables.roots.entry(row.feed_id).or_default().push(row);
        }
        for (id, row) in tallies {
            tables.versions.insert(RowKey::Tally(id), stamp);
            tables.tallies.insert(id, row);
        }
        for (n, row) in nullifiers {
            tables.versions.insert(RowKey::Nullifier(n), stamp);
            tables.nullifiers.insert(n, row);
        }
        tables.transactions.extend(transactions);
        Ok(())
    }
}
