//! Nullifier ledger.
//!
//! One row per (member, message). The row's presence decides whether a reaction is a fresh vote
//! or an update, and its stored ciphertext is what gets subtracted when the member changes
//! their mind. The nullifier and message of a row never change.

use crate::types::ReactionNullifier;
use chrono::{DateTime, Utc};
use common::{EncryptedVote, MessageId, Nullifier};

/// Which path a reaction takes through the tally engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteRoute {
    Fresh,
    Update(ReactionNullifier),
}

impl VoteRoute {
    pub fn from_existing(existing: Option<ReactionNullifier>) -> Self {
        match existing {
            Some(row) => VoteRoute::Update(row),
            None => VoteRoute::Fresh,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, VoteRoute::Update(_))
    }
}

impl ReactionNullifier {
    pub fn first_vote(
        nullifier: Nullifier,
        message_id: MessageId,
        vote: EncryptedVote,
        encrypted_emoji_backup: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            nullifier,
            message_id,
            vote,
            encrypted_emoji_backup,
            created_at: now,
            updated_at: now,
        }
    }

    /// Same nullifier, same message, new vote.
    pub fn with_vote(
        &self,
        vote: EncryptedVote,
        encrypted_emoji_backup: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            vote,
            encrypted_emoji_backup,
            updated_at: now,
            ..self.clone()
        }
    }
}
