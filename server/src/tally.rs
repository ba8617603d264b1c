//! Homomorphic tally engine.
//!
//! A tally is the curve sum of every live individual vote on a message. Fresh votes are added;
//! a changed vote subtracts the recorded one before adding its replacement, which keeps
//! `tally = Σ votes` exact because the group law is invertible. No vote is ever decrypted.

use crate::types::MessageReactionTally;
use chrono::{DateTime, Utc};
use common::{EncryptedVote, FeedId, MessageId};

impl MessageReactionTally {
    /// A tally with every slot at the identity, before any vote.
    pub fn empty(message_id: MessageId, feed_id: FeedId, now: DateTime<Utc>) -> Self {
        Self {
            message_id,
            feed_id,
            tally: EncryptedVote::identity(),
            total_count: 0,
            version: 0,
            last_updated: now,
        }
    }

    /// Adds a first-time vote.
    pub fn with_new_vote(&self, vote: &EncryptedVote, now: DateTime<Utc>) -> Self {
        Self {
            tally: self.tally + *vote,
            total_count: self.total_count + 1,
            version: self.version + 1,
            last_updated: now,
            ..self.clone()
        }
    }

    /// Swaps a member's recorded vote for a new one. The count is unchanged.
    pub fn with_replaced_vote(
        &self,
        old: &EncryptedVote,
        new: &EncryptedVote,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tally: self.tally - *old + *new,
            version: self.version + 1,
            last_updated: now,
            ..self.clone()
        }
    }
}
