//! Channel wiring between the chain indexer and the reaction core.
//!
//! Membership notifications and indexed reactions arrive on typed `mpsc` channels and are
//! consumed by long-running loops, one per channel. A loop ends when every sender is dropped
//! and reports what it did.

use crate::{
    membership::{MembershipError, MembershipService, RegistrationOutcome},
    processor::{ProcessorError, ReactionKind, ReactionProcessor},
    store::UnitOfWorkProvider,
    types::ValidatedReaction,
};
use common::{ids::derive_address_commitment, FeedId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, Instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipEventKind {
    Joined,
    Left,
    Banned,
    Unbanned,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub kind: MembershipEventKind,
    pub feed_id: FeedId,
    pub member_address: String,
    pub key_generation: u64,
    pub block_height: u64,
}

/// A reaction as delivered by the indexer, with the height of its block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedReaction {
    pub transaction: ValidatedReaction,
    pub block_height: u64,
}

/// Applies one membership event.
///
/// Joins and unbans register the member's address commitment; a member seen before keeps their
/// leaf. Leaves and bans keep the leaf and log the feed's root again at the event's height.
pub async fn handle_membership_event<S: UnitOfWorkProvider>(
    membership: &MembershipService<S>,
    event: &MembershipEvent,
) -> Result<(), MembershipError> {
    match event.kind {
        MembershipEventKind::Joined | MembershipEventKind::Unbanned => {
            let commitment = derive_address_commitment(&event.member_address);
            match membership
                .register_commitment(event.feed_id, commitment, event.block_height)
                .await?
            {
                RegistrationOutcome::Registered { leaf_index, .. } => {
                    info!(kind = ?event.kind, leaf_index, "member added to tree")
                }
                RegistrationOutcome::AlreadyRegistered => {
                    info!(kind = ?event.kind, "member already in tree")
                }
            }
        }
        MembershipEventKind::Left | MembershipEventKind::Banned => {
            membership
                .update_merkle_root(event.feed_id, event.block_height)
                .await?;
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MembershipStats {
    pub handled: u64,
    pub failed: u64,
}

pub async fn run_membership_events<S: UnitOfWorkProvider>(
    membership: Arc<MembershipService<S>>,
    mut events: mpsc::Receiver<MembershipEvent>,
) -> MembershipStats {
    let mut stats = MembershipStats::default();
    while let Some(event) = events.recv().await {
        let span = info_span!(
            "membership_event",
            feed_id = %event.feed_id,
            block_height = event.block_height,
            key_generation = event.key_generation
        );
        match handle_membership_event(&membership, &event)
            .instrument(span)
            .await
        {
            Ok(()) => stats.handled += 1,
            Err(e) => {
                stats.failed += 1;
                error!(
                    feed_id = %event.feed_id,
                    kind = ?event.kind,
                    retryable = e.is_retryable(),
                    error = %e,
                    "membership event failed"
                );
            }
        }
    }
    info!(?stats, "membership event channel closed");
    stats
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndexerStats {
    pub new_votes: u64,
    pub updates: u64,
    pub failed: u64,
}

pub async fn run_reaction_indexer<S: UnitOfWorkProvider>(
    processor: Arc<ReactionProcessor<S>>,
    mut reactions: mpsc::Receiver<IndexedReaction>,
) -> IndexerStats {
    let mut stats = IndexerStats::default();
    while let Some(IndexedReaction {
        transaction,
        block_height,
    }) = reactions.recv().await
    {
        let result: Result<_, ProcessorError> = processor
            .handle_reaction_transaction(&transaction, block_height)
            .await;
        match result {
            Ok(done) => match done.kind {
                ReactionKind::NewVote => stats.new_votes += 1,
                ReactionKind::Updated => stats.updates += 1,
            },
            // Already logged with full context by the processor.
            Err(_) => stats.failed += 1,
        }
    }
    info!(?stats, "reaction channel closed");
    stats
}
