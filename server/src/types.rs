//! Persistent rows and the transaction payloads that produce them.
//!
//! Rows are plain values. Updates build a new value from the old one; nothing is mutated in
//! place outside a unit of work.

use chrono::{DateTime, Utc};
use common::{
    encoding::{hex32, hex_bytes},
    Commitment, CurvePoint, EncryptedVote, FeedId, MessageId, Nullifier, EMOJI_SLOTS, F,
};
use serde::{Deserialize, Serialize};

/// A member's leaf in a feed's membership tree. Never mutated once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCommitment {
    pub feed_id: FeedId,
    pub commitment: Commitment,
    pub registered_at: DateTime<Utc>,
}

/// One append-only entry of a feed's root log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleRootHistory {
    pub feed_id: FeedId,
    #[serde(with = "hex32")]
    pub root: [u8; 32],
    pub block_height: u64,
    pub created_at: DateTime<Utc>,
}

impl MerkleRootHistory {
    pub fn root_field(&self) -> Option<F> {
        common::encoding::field_from_be_bytes(&self.root)
    }
}

/// Running encrypted tally for one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReactionTally {
    pub message_id: MessageId,
    pub feed_id: FeedId,
    pub tally: EncryptedVote,
    pub total_count: u64,
    /// Optimistic-concurrency counter, bumped on every write.
    pub version: u64,
    pub last_updated: DateTime<Utc>,
}

/// The recorded individual vote behind a nullifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionNullifier {
    pub nullifier: Nullifier,
    pub message_id: MessageId,
    pub vote: EncryptedVote,
    #[serde(with = "hex_bytes")]
    pub encrypted_emoji_backup: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit row, one per accepted reaction transaction, updates included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTransaction {
    pub id: u64,
    pub block_height: u64,
    pub feed_id: FeedId,
    pub message_id: MessageId,
    pub nullifier: Nullifier,
    pub vote: EncryptedVote,
    #[serde(with = "hex_bytes")]
    pub zk_proof: Vec<u8>,
    pub circuit_version: String,
    pub created_at: DateTime<Utc>,
}

/// A reaction payload whose signature the chain has already checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedReaction {
    pub feed_id: FeedId,
    pub message_id: MessageId,
    pub nullifier: Nullifier,
    pub ciphertext_c1: [CurvePoint; EMOJI_SLOTS],
    pub ciphertext_c2: [CurvePoint; EMOJI_SLOTS],
    #[serde(with = "hex_bytes")]
    pub zk_proof: Vec<u8>,
    pub circuit_version: String,
    #[serde(with = "hex_bytes")]
    pub encrypted_emoji_backup: Vec<u8>,
    pub sender_address: String,
}

impl ValidatedReaction {
    pub fn vote(&self) -> EncryptedVote {
        EncryptedVote::from_parts(self.ciphertext_c1, self.ciphertext_c2)
    }
}
