//! Repository contracts behind a unit of work.
//!
//! A unit of work is opened in read-only or serializable mode, exposes one repository per
//! aggregate, and either commits as a whole or is dropped, which discards every pending write.
//! Contention is resolved here: a serializable commit that raced another writer fails with
//! [`StoreError::SerializationConflict`] and the caller decides whether to retry.

use crate::types::{
    MemberCommitment, MerkleRootHistory, MessageReactionTally, ReactionNullifier,
    ReactionTransaction,
};
use common::{Commitment, FeedId, MessageId, Nullifier};
use std::future::Future;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    ReadOnly,
    Serializable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("serialization conflict with a concurrent writer")]
    SerializationConflict,
    #[error("write attempted in a read-only unit of work")]
    ReadOnly,
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::SerializationConflict)
    }
}

pub trait CommitmentRepository {
    /// All commitments of a feed, in registration order.
    fn commitments(
        &mut self,
        feed_id: &FeedId,
    ) -> impl Future<Output = Result<Vec<MemberCommitment>, StoreError>> + Send;

    fn contains_commitment(
        &mut self,
        feed_id: &FeedId,
        commitment: &Commitment,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn insert_commitment(
        &mut self,
        row: MemberCommitment,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub trait RootHistoryRepository {
    fn append_root(
        &mut self,
        row: MerkleRootHistory,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Up to `count` rows, newest first.
    fn recent_roots(
        &mut self,
        feed_id: &FeedId,
        count: usize,
    ) -> impl Future<Output = Result<Vec<MerkleRootHistory>, StoreError>> + Send;
}

pub trait TallyRepository {
    /// Reads a tally and locks the row until the unit of work ends.
    fn tally_for_update(
        &mut self,
        message_id: &MessageId,
    ) -> impl Future<Output = Result<Option<MessageReactionTally>, StoreError>> + Send;

    fn save_tally(
        &mut self,
        row: MessageReactionTally,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Tallies of the given messages that belong to `feed_id`. Missing messages are skipped.
    fn tallies(
        &mut self,
        feed_id: &FeedId,
        message_ids: &[MessageId],
    ) -> impl Future<Output = Result<Vec<MessageReactionTally>, StoreError>> + Send;
}

pub trait NullifierRepository {
    fn nullifier(
        &mut self,
        nullifier: &Nullifier,
    ) -> impl Future<Output = Result<Option<ReactionNullifier>, StoreError>> + Send;

    /// Inserts or replaces the row keyed by `row.nullifier`.
    fn save_nullifier(
        &mut self,
        row: ReactionNullifier,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub trait TransactionRepository {
    /// Appends an audit row; the store assigns `id` and returns the stored row.
    fn append_transaction(
        &mut self,
        row: ReactionTransaction,
    ) -> impl Future<Output = Result<ReactionTransaction, StoreError>> + Send;

    fn transactions_for_message(
        &mut self,
        message_id: &MessageId,
    ) -> impl Future<Output = Result<Vec<ReactionTransaction>, StoreError>> + Send;
}

pub trait UnitOfWork:
    CommitmentRepository
    + RootHistoryRepository
    + TallyRepository
    + NullifierRepository
    + TransactionRepository
    + Send
{
    /// Publishes every pending write atomically.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub trait UnitOfWorkProvider: Send + Sync {
    type Uow: UnitOfWork;

    fn begin(
        &self,
        isolation: Isolation,
    ) -> impl Future<Output = Result<Self::Uow, StoreError>> + Send;
}
