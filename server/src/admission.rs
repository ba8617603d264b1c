//! Mempool admission of reaction transactions.
//!
//! Assembles a reaction's public statement from the feed's secrets and recent membership roots
//! and hands it to the verifier. A proof is admitted if it verifies against any root inside the
//! configured window, newest first.

use crate::{
    membership::{MembershipError, MembershipService},
    store::UnitOfWorkProvider,
    types::ValidatedReaction,
    verifier::{ProofVerifier, ReactionPublicInputs, RejectCode, Rejection, Verdict},
};
use common::{Commitment, CurvePoint, FeedId, MessageId};
use std::{collections::HashMap, future::Future, sync::Arc, sync::RwLock};
use thiserror::Error;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};

/// Per-feed secrets the statement needs and the chain does not carry.
pub trait FeedSecretProvider: Send + Sync {
    /// The feed's current ElGamal public key.
    fn feed_public_key(&self, feed_id: &FeedId)
        -> impl Future<Output = Option<CurvePoint>> + Send;

    fn author_commitment(
        &self,
        feed_id: &FeedId,
        message_id: &MessageId,
    ) -> impl Future<Output = Option<Commitment>> + Send;
}

/// Feed secrets held in process.
#[derive(Debug, Default)]
pub struct MemoryFeedSecrets {
    keys: RwLock<HashMap<FeedId, CurvePoint>>,
    authors: RwLock<HashMap<(FeedId, MessageId), Commitment>>,
}

impl MemoryFeedSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feed_key(&self, feed_id: FeedId, key: CurvePoint) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(feed_id, key);
        }
    }

    pub fn set_author(&self, feed_id: FeedId, message_id: MessageId, author: Commitment) {
        if let Ok(mut authors) = self.authors.write() {
            authors.insert((feed_id, message_id), author);
        }
    }
}

impl FeedSecretProvider for MemoryFeedSecrets {
    async fn feed_public_key(&self, feed_id: &FeedId) -> Option<CurvePoint> {
        self.keys.read().ok()?.get(feed_id).copied()
    }

    async fn author_commitment(
        &self,
        feed_id: &FeedId,
        message_id: &MessageId,
    ) -> Option<Commitment> {
        self.authors
            .read()
            .ok()?
            .get(&(*feed_id, *message_id))
            .copied()
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("no public key known for feed {0}")]
    UnknownFeed(FeedId),
    #[error("no author known for message {0}")]
    UnknownMessage(MessageId),
    #[error("feed {0} has no membership root yet")]
    NoMembershipRoot(FeedId),
    #[error("verifier task failed: {0}")]
    Verifier(String),
    #[error(transparent)]
    Membership(#[from] MembershipError),
}

pub struct ReactionAdmission<S, P> {
    membership: Arc<MembershipService<S>>,
    verifier: Arc<dyn ProofVerifier>,
    secrets: Arc<P>,
    root_window: usize,
}

impl<S: UnitOfWorkProvider, P: FeedSecretProvider> ReactionAdmission<S, P> {
    pub fn new(
        membership: Arc<MembershipService<S>>,
        verifier: Arc<dyn ProofVerifier>,
        secrets: Arc<P>,
        root_window: usize,
    ) -> Self {
        Self {
            membership,
            verifier,
            secrets,
            root_window: root_window.max(1),
        }
    }

    pub fn verifier(&self) -> &dyn ProofVerifier {
        self.verifier.as_ref()
    }

    /// Pairing checks are CPU-bound, so they run on the blocking pool.
    async fn verify_off_thread(
        &self,
        tx: &ValidatedReaction,
        inputs: ReactionPublicInputs,
    ) -> Result<Verdict, AdmissionError> {
        let verifier = Arc::clone(&self.verifier);
        let proof = tx.zk_proof.clone();
        let version = tx.circuit_version.clone();
        spawn_blocking(move || verifier.verify(&proof, &inputs, &version))
            .await
            .map_err(|e| {
                error!(message_id = %tx.message_id, error = %e, "verifier task failed");
                AdmissionError::Verifier(e.to_string())
            })
    }

    /// Decides whether `tx` may enter the mempool.
    ///
    /// Rejections are verdicts; errors mean the statement could not be assembled at all.
    pub async fn admit(&self, tx: &ValidatedReaction) -> Result<Verdict, AdmissionError> {
        if let Some(rejection) = self.verifier.policy_rejection(&tx.circuit_version) {
            return Ok(rejection);
        }
        let (Some(nullifier), Some(message_id)) =
            (tx.nullifier.to_field(), tx.message_id.to_field())
        else {
            debug!(message_id = %tx.message_id, nullifier = %tx.nullifier, "non-canonical id");
            return Ok(Verdict::Reject(Rejection {
                code: RejectCode::InvalidProofFormat,
                message: "nullifier and message id must be canonical field elements".into(),
            }));
        };

        let feed_public_key = self
            .secrets
            .feed_public_key(&tx.feed_id)
            .await
            .ok_or(AdmissionError::UnknownFeed(tx.feed_id))?;
        let author = self
            .secrets
            .author_commitment(&tx.feed_id, &tx.message_id)
            .await
            .ok_or(AdmissionError::UnknownMessage(tx.message_id))?;
        let roots = self
            .membership
            .get_recent_roots(&tx.feed_id, self.root_window)
            .await?;

        let mut inputs = ReactionPublicInputs {
            nullifier,
            message_id,
            members_root: Default::default(),
            author_commitment: author.0,
            feed_public_key,
            c1: tx.ciphertext_c1,
            c2: tx.ciphertext_c2,
        };

        let mut last = None;
        for (age, root) in roots.iter().filter_map(|r| r.root_field()).enumerate() {
            inputs.members_root = root;
            let verdict = self.verify_off_thread(tx, inputs.clone()).await?;
            if verdict.is_accepted() {
                info!(
                    feed_id = %tx.feed_id,
                    message_id = %tx.message_id,
                    root_age = age,
                    "reaction admitted"
                );
                return Ok(verdict);
            }
            // Only a failed pairing can depend on which root was used.
            if verdict.reject_code() != Some(RejectCode::InvalidProof) {
                return Ok(verdict);
            }
            last = Some(verdict);
        }

        let verdict = last.ok_or(AdmissionError::NoMembershipRoot(tx.feed_id))?;
        debug!(feed_id = %tx.feed_id, message_id = %tx.message_id, ?verdict, "reaction refused");
        Ok(verdict)
    }
}
