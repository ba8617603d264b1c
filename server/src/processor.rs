//! Reaction transaction processor.
//!
//! Turns one validated reaction into a single atomic change of the message's tally, the
//! member's nullifier row and the audit log. Proofs were checked at admission; here only the
//! ciphertext bookkeeping and fresh-or-update routing happen.

use crate::{
    nullifier::VoteRoute,
    retry::{retry_on_conflict, Attempts, Conflict, RetryPolicy},
    store::{
        Isolation, NullifierRepository, StoreError, TallyRepository, TransactionRepository,
        UnitOfWork, UnitOfWorkProvider,
    },
    types::{MessageReactionTally, ReactionNullifier, ReactionTransaction, ValidatedReaction},
};
use chrono::Utc;
use common::{FeedId, MessageId, Nullifier};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("gave up after {attempts} conflicting attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("nullifier {nullifier} was recorded for message {recorded}, not {claimed}")]
    NullifierMessageMismatch {
        nullifier: Nullifier,
        recorded: MessageId,
        claimed: MessageId,
    },
    #[error("message {message_id} belongs to feed {recorded}, not {claimed}")]
    FeedMismatch {
        message_id: MessageId,
        recorded: FeedId,
        claimed: FeedId,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Conflict for ProcessorError {
    fn is_conflict(&self) -> bool {
        matches!(self, ProcessorError::Store(e) if e.is_conflict())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactionKind {
    NewVote,
    Updated,
}

#[derive(Clone, Debug)]
pub struct ProcessedReaction {
    pub kind: ReactionKind,
    /// The tally as committed.
    pub tally: MessageReactionTally,
    pub transaction_id: u64,
    pub attempts: u32,
}

pub struct ReactionProcessor<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: UnitOfWorkProvider> ReactionProcessor<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Applies one indexed reaction transaction.
    ///
    /// Serialization conflicts are retried with linear backoff; once the attempts are spent the
    /// conflict is returned as [`ProcessorError::RetriesExhausted`]. Any other failure is
    /// returned immediately.
    pub async fn handle_reaction_transaction(
        &self,
        tx: &ValidatedReaction,
        block_height: u64,
    ) -> Result<ProcessedReaction, ProcessorError> {
        let outcome = retry_on_conflict(&self.retry, "reaction", |attempt| {
            self.apply(tx, block_height, attempt)
        })
        .await;

        match outcome {
            Ok(done) => {
                info!(
                    message_id = %tx.message_id,
                    nullifier = %tx.nullifier,
                    kind = ?done.kind,
                    total = done.tally.total_count,
                    version = done.tally.version,
                    "reaction applied"
                );
                Ok(done)
            }
            Err(Attempts {
                attempts,
                error: ProcessorError::Store(source),
            }) if source.is_conflict() => {
                error!(
                    message_id = %tx.message_id,
                    nullifier = %tx.nullifier,
                    attempts,
                    "reaction abandoned after repeated conflicts"
                );
                Err(ProcessorError::RetriesExhausted { attempts, source })
            }
            Err(Attempts { error, .. }) => {
                error!(
                    message_id = %tx.message_id,
                    nullifier = %tx.nullifier,
                    block_height,
                    %error,
                    "reaction failed"
                );
                Err(error)
            }
        }
    }

    async fn apply(
        &self,
        tx: &ValidatedReaction,
        block_height: u64,
        attempt: u32,
    ) -> Result<ProcessedReaction, ProcessorError> {
        let mut uow = self.store.begin(Isolation::Serializable).await?;
        let now = Utc::now();

        let current = uow
            .tally_for_update(&tx.message_id)
            .await?
            .unwrap_or_else(|| MessageReactionTally::empty(tx.message_id, tx.feed_id, now));
        if current.feed_id != tx.feed_id {
            return Err(ProcessorError::FeedMismatch {
                message_id: tx.message_id,
                recorded: current.feed_id,
                claimed: tx.feed_id,
            });
        }

        let vote = tx.vote();
        let route = VoteRoute::from_existing(uow.nullifier(&tx.nullifier).await?);
        let kind = if route.is_update() {
            ReactionKind::Updated
        } else {
            ReactionKind::NewVote
        };
        let (tally, ledger_row) = match route {
            VoteRoute::Fresh => (
                current.with_new_vote(&vote, now),
                ReactionNullifier::first_vote(
                    tx.nullifier,
                    tx.message_id,
                    vote,
                    tx.encrypted_emoji_backup.clone(),
                    now,
                ),
            ),
            VoteRoute::Update(existing) => {
                if existing.message_id != tx.message_id {
                    warn!(nullifier = %tx.nullifier, "nullifier replayed against another message");
                    return Err(ProcessorError::NullifierMessageMismatch {
                        nullifier: tx.nullifier,
                        recorded: existing.message_id,
                        claimed: tx.message_id,
                    });
                }
                (
                    current.with_replaced_vote(&existing.vote, &vote, now),
                    existing.with_vote(vote, tx.encrypted_emoji_backup.clone(), now),
                )
            }
        };

        uow.save_nullifier(ledger_row).await?;
        uow.save_tally(tally.clone()).await?;
        let audit = uow
            .append_transaction(ReactionTransaction {
                id: 0,
                block_height,
                feed_id: tx.feed_id,
                message_id: tx.message_id,
                nullifier: tx.nullifier,
                vote,
                zk_proof: tx.zk_proof.clone(),
                circuit_version: tx.circuit_version.clone(),
                created_at: now,
            })
            .await?;
        uow.commit().await?;

        Ok(ProcessedReaction {
            kind,
            tally,
            transaction_id: audit.id,
            attempts: attempt,
        })
    }
}
