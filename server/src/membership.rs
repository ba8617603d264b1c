//! Membership Merkle service: one sparse depth-20 tree per feed.
//!
//! Leaves are commitments in registration order. A commitment keeps its leaf index forever;
//! leaving or being banned never removes it, it only appends a root-history row.

use crate::{
    merkle::{self, MerklePath, TREE_CAPACITY, TREE_DEPTH},
    retry::{retry_on_conflict, Conflict, RetryPolicy},
    store::{
        CommitmentRepository, Isolation, RootHistoryRepository, StoreError, UnitOfWork,
        UnitOfWorkProvider,
    },
    types::{MemberCommitment, MerkleRootHistory},
};
use chrono::Utc;
use common::{encoding::field_to_be_bytes, Commitment, FeedId, F};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The commitment was already a leaf of the feed. Not an error.
    AlreadyRegistered,
    Registered { root: F, leaf_index: u64 },
}

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("membership tree of feed {0} is full")]
    TreeFull(FeedId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MembershipError {
    /// Whether the caller may try the same call again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            MembershipError::TreeFull(_) => false,
            MembershipError::Store(StoreError::ReadOnly) => false,
            MembershipError::Store(_) => true,
        }
    }
}

impl Conflict for MembershipError {
    fn is_conflict(&self) -> bool {
        matches!(self, MembershipError::Store(e) if e.is_conflict())
    }
}

/// Inclusion witness for a membership circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipProof {
    pub root: F,
    pub leaf_index: u64,
    pub path_elements: [F; TREE_DEPTH],
    pub path_indices: [u8; TREE_DEPTH],
    pub depth: usize,
    /// Height of the newest root-history row, 0 if none was persisted yet.
    pub block_height: u64,
}

impl MembershipProof {
    pub fn path(&self) -> MerklePath {
        MerklePath {
            elements: self.path_elements,
            indices: self.path_indices,
        }
    }

    /// Whether walking the path from `leaf` lands on `root`.
    pub fn verifies(&self, leaf: &Commitment) -> bool {
        self.path().compute_root(leaf.0) == self.root
    }
}

pub struct MembershipService<S> {
    store: S,
    retry: RetryPolicy,
}

fn leaves_of(rows: &[MemberCommitment]) -> Vec<F> {
    rows.iter().map(|r| r.commitment.0).collect()
}

impl<S: UnitOfWorkProvider> MembershipService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Appends `commitment` as the feed's next leaf and logs the new root.
    ///
    /// Runs serializably, so two concurrent registrations on one feed never share an index.
    pub async fn register_commitment(
        &self,
        feed_id: FeedId,
        commitment: Commitment,
        block_height: u64,
    ) -> Result<RegistrationOutcome, MembershipError> {
        retry_on_conflict(&self.retry, "register_commitment", |_| {
            self.try_register(feed_id, commitment, block_height)
        })
        .await
        .map_err(|failed| failed.error)
    }

    async fn try_register(
        &self,
        feed_id: FeedId,
        commitment: Commitment,
        block_height: u64,
    ) -> Result<RegistrationOutcome, MembershipError> {
        let mut uow = self.store.begin(Isolation::Serializable).await?;
        if uow.contains_commitment(&feed_id, &commitment).await? {
            debug!(%feed_id, %commitment, "commitment already registered");
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        let mut leaves = leaves_of(&uow.commitments(&feed_id).await?);
        if leaves.len() >= TREE_CAPACITY {
            return Err(MembershipError::TreeFull(feed_id));
        }
        let leaf_index = leaves.len() as u64;
        leaves.push(commitment.0);
        let root = merkle::compute_root(&leaves);

        let now = Utc::now();
        uow.insert_commitment(MemberCommitment {
            feed_id,
            commitment,
            registered_at: now,
        })
        .await?;
        uow.append_root(MerkleRootHistory {
            feed_id,
            root: field_to_be_bytes(&root),
            block_height,
            created_at: now,
        })
        .await?;
        uow.commit().await?;

        info!(%feed_id, leaf_index, block_height, "registered member commitment");
        Ok(RegistrationOutcome::Registered { root, leaf_index })
    }

    pub async fn is_commitment_registered(
        &self,
        feed_id: &FeedId,
        commitment: &Commitment,
    ) -> Result<bool, MembershipError> {
        let mut uow = self.store.begin(Isolation::ReadOnly).await?;
        Ok(uow.contains_commitment(feed_id, commitment).await?)
    }

    /// Inclusion proof for `commitment`, or `None` if it is not a member of the feed.
    pub async fn get_membership_proof(
        &self,
        feed_id: &FeedId,
        commitment: &Commitment,
    ) -> Result<Option<MembershipProof>, MembershipError> {
        let mut uow = self.store.begin(Isolation::ReadOnly).await?;
        if !uow.contains_commitment(feed_id, commitment).await? {
            return Ok(None);
        }
        let rows = uow.commitments(feed_id).await?;
        let Some(index) = rows.iter().position(|r| &r.commitment == commitment) else {
            return Ok(None);
        };
        let leaves = leaves_of(&rows);
        let Some(path) = merkle::build_path(&leaves, index) else {
            return Ok(None);
        };
        let block_height = uow
            .recent_roots(feed_id, 1)
            .await?
            .first()
            .map_or(0, |r| r.block_height);

        Ok(Some(MembershipProof {
            root: merkle::compute_root(&leaves),
            leaf_index: index as u64,
            path_elements: path.elements,
            path_indices: path.indices,
            depth: TREE_DEPTH,
            block_height,
        }))
    }

    /// Recomputes the feed's root from its current leaves and logs it at `block_height`.
    pub async fn update_merkle_root(
        &self,
        feed_id: FeedId,
        block_height: u64,
    ) -> Result<F, MembershipError> {
        retry_on_conflict(&self.retry, "update_merkle_root", |_| async move {
            let mut uow = self.store.begin(Isolation::Serializable).await?;
            let root = merkle::compute_root(&leaves_of(&uow.commitments(&feed_id).await?));
            uow.append_root(MerkleRootHistory {
                feed_id,
                root: field_to_be_bytes(&root),
                block_height,
                created_at: Utc::now(),
            })
            .await?;
            uow.commit().await?;
            Ok::<_, MembershipError>(root)
        })
        .await
        .map_err(|failed| failed.error)
        .inspect(|_| info!(%feed_id, block_height, "merkle root updated"))
    }

    /// The newest `count` roots, newest first.
    ///
    /// A feed that has members but no persisted root yet gets one computed and stored first.
    pub async fn get_recent_roots(
        &self,
        feed_id: &FeedId,
        count: usize,
    ) -> Result<Vec<MerkleRootHistory>, MembershipError> {
        let mut uow = self.store.begin(Isolation::ReadOnly).await?;
        let rows = uow.recent_roots(feed_id, count).await?;
        if !rows.is_empty() || uow.commitments(feed_id).await?.is_empty() {
            return Ok(rows);
        }
        drop(uow);

        debug!(%feed_id, "no persisted root, computing one");
        self.update_merkle_root(*feed_id, 0).await?;
        let mut uow = self.store.begin(Isolation::ReadOnly).await?;
        Ok(uow.recent_roots(feed_id, count).await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{merkle::zero_values, store::MemoryStore};
    use common::{ids::derive_address_commitment, poseidon2};

    fn service() -> MembershipService<MemoryStore> {
        MembershipService::new(MemoryStore::new(), RetryPolicy::default())
    }

    const FEED: FeedId = FeedId([0x0f; 32]);

    #[tokio::test]
    async fn first_registration_is_leaf_zero() {
        let svc = service();
        let c1 = derive_address_commitment("alice");
        let outcome = svc.register_commitment(FEED, c1, 10).await.unwrap();

        let mut expected = c1.0;
        for zero in zero_values().iter().take(TREE_DEPTH) {
            expected = poseidon2(expected, *zero);
        }
        assert_eq!(
            outcome,
            RegistrationOutcome::Registered {
                root: expected,
                leaf_index: 0
            }
        );
    }

    #[tokio::test]
    async fn duplicate_registration_is_benign_and_keeps_root() {
        let svc = service();
        let c1 = derive_address_commitment("alice");
        svc.register_commitment(FEED, c1, 10).await.unwrap();
        let before = svc.get_recent_roots(&FEED, 10).await.unwrap();

        let again = svc.register_commitment(FEED, c1, 11).await.unwrap();
        assert_eq!(again, RegistrationOutcome::AlreadyRegistered);
        assert_eq!(svc.get_recent_roots(&FEED, 10).await.unwrap(), before);
    }

    #[tokio::test]
    async fn leaf_indices_follow_registration_order() {
        let svc = service();
        for (i, who) in ["a", "b", "c", "d"].iter().enumerate() {
            match svc
                .register_commitment(FEED, derive_address_commitment(who), i as u64)
                .await
                .unwrap()
            {
                RegistrationOutcome::Registered { leaf_index, .. } => {
                    assert_eq!(leaf_index, i as u64)
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn feeds_have_independent_trees() {
        let svc = service();
        let other = FeedId([0xee; 32]);
        svc.register_commitment(FEED, derive_address_commitment("a"), 1)
            .await
            .unwrap();
        let outcome = svc
            .register_commitment(other, derive_address_commitment("b"), 1)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RegistrationOutcome::Registered { leaf_index: 0, .. }
        ));
    }

    #[tokio::test]
    async fn proofs_reconstruct_the_returned_root() {
        let svc = service();
        let members: Vec<_> = (0..7)
            .map(|i| derive_address_commitment(&format!("member-{i}")))
            .collect();
        for (h, c) in members.iter().enumerate() {
            svc.register_commitment(FEED, *c, 100 + h as u64)
                .await
                .unwrap();
        }
        for (i, c) in members.iter().enumerate() {
            let proof = svc.get_membership_proof(&FEED, c).await.unwrap().unwrap();
            assert_eq!(proof.leaf_index, i as u64);
            assert_eq!(proof.depth, TREE_DEPTH);
            assert_eq!(proof.block_height, 106);
            assert!(proof.verifies(c));
        }
    }

    #[tokio::test]
    async fn non_members_get_no_proof() {
        let svc = service();
        svc.register_commitment(FEED, derive_address_commitment("a"), 1)
            .await
            .unwrap();
        let outsider = derive_address_commitment("mallory");
        assert!(svc
            .get_membership_proof(&FEED, &outsider)
            .await
            .unwrap()
            .is_none());
        assert!(!svc.is_commitment_registered(&FEED, &outsider).await.unwrap());
    }

    #[tokio::test]
    async fn update_appends_history_at_height() {
        let svc = service();
        svc.register_commitment(FEED, derive_address_commitment("a"), 5)
            .await
            .unwrap();
        let root = svc.update_merkle_root(FEED, 9).await.unwrap();
        let roots = svc.get_recent_roots(&FEED, 5).await.unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].block_height, 9);
        assert_eq!(roots[0].root_field(), Some(root));
        // Revocation does not change the leaf set, so the root is unchanged.
        assert_eq!(roots[0].root, roots[1].root);
    }

    #[tokio::test]
    async fn empty_feed_has_no_roots() {
        let svc = service();
        assert!(svc.get_recent_roots(&FEED, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_registration_conflict_is_retried() {
        let store = MemoryStore::new();
        let svc = MembershipService::new(
            store.clone(),
            RetryPolicy {
                max_attempts: 3,
                backoff_ms: 1,
            },
        );
        svc.register_commitment(FEED, derive_address_commitment("a"), 1)
            .await
            .unwrap();
        store.fail_next_commits([StoreError::SerializationConflict]);
        let outcome = svc
            .register_commitment(FEED, derive_address_commitment("b"), 2)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RegistrationOutcome::Registered { leaf_index: 1, .. }
        ));
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_retryable_error() {
        let store = MemoryStore::new();
        let svc = MembershipService::new(store.clone(), RetryPolicy::default());
        store.fail_next_commits([StoreError::Backend("connection reset".into())]);
        let err = svc
            .register_commitment(FEED, derive_address_commitment("a"), 1)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!svc
            .is_commitment_registered(&FEED, &derive_address_commitment("a"))
            .await
            .unwrap());
    }
}
