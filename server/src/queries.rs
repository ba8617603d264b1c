//! Read-side query surface for clients. Every call runs in a read-only unit of work.

use crate::{
    store::{
        Isolation, NullifierRepository, StoreError, TallyRepository, TransactionRepository,
        UnitOfWorkProvider,
    },
    types::{MessageReactionTally, ReactionTransaction},
};
use common::{FeedId, MessageId, Nullifier};

pub struct ReactionQueries<S> {
    store: S,
}

impl<S: UnitOfWorkProvider> ReactionQueries<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Tallies for the messages of `feed_id` that have any reaction. Unknown ids, and ids of
    /// other feeds, are left out.
    pub async fn get_tallies(
        &self,
        feed_id: &FeedId,
        message_ids: &[MessageId],
    ) -> Result<Vec<MessageReactionTally>, StoreError> {
        let mut uow = self.store.begin(Isolation::ReadOnly).await?;
        uow.tallies(feed_id, message_ids).await
    }

    pub async fn nullifier_exists(&self, nullifier: &Nullifier) -> Result<bool, StoreError> {
        let mut uow = self.store.begin(Isolation::ReadOnly).await?;
        Ok(uow.nullifier(nullifier).await?.is_some())
    }

    /// The member's own encrypted copy of their latest emoji choice.
    pub async fn get_reaction_backup(
        &self,
        nullifier: &Nullifier,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let mut uow = self.store.begin(Isolation::ReadOnly).await?;
        Ok(uow
            .nullifier(nullifier)
            .await?
            .map(|row| row.encrypted_emoji_backup))
    }

    /// Audit trail of a message, in commit order.
    pub async fn get_transactions(
        &self,
        message_id: &MessageId,
    ) -> Result<Vec<ReactionTransaction>, StoreError> {
        let mut uow = self.store.begin(Isolation::ReadOnly).await?;
        uow.transactions_for_message(message_id).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        processor::ReactionProcessor, retry::RetryPolicy, store::MemoryStore,
        types::ValidatedReaction,
    };
    use common::elgamal::{encrypt_vote, SecretKey};
    use rand::thread_rng;

    const FEED: FeedId = FeedId([1; 32]);

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let processor = ReactionProcessor::new(store.clone(), RetryPolicy::default());
        let mut rng = thread_rng();
        let sk = SecretKey::generate(&mut rng);
        for (message, nullifier, emoji) in [(1u8, 1u8, 0usize), (1, 2, 1), (2, 1, 5)] {
            let vote = encrypt_vote(&sk.public_key(), emoji, &mut rng).unwrap();
            let tx = ValidatedReaction {
                feed_id: FEED,
                message_id: MessageId([message; 32]),
                nullifier: Nullifier([message * 16 + nullifier; 32]),
                ciphertext_c1: vote.c1(),
                ciphertext_c2: vote.c2(),
                zk_proof: vec![1; 256],
                circuit_version: "omega-v2".into(),
                encrypted_emoji_backup: vec![emoji as u8],
                sender_address: "omega1relay".into(),
            };
            processor.handle_reaction_transaction(&tx, 3).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn tallies_skip_unknown_and_foreign_messages() {
        let store = seeded().await;
        let queries = ReactionQueries::new(store);
        let ids = [MessageId([1; 32]), MessageId([9; 32]), MessageId([2; 32])];

        let tallies = queries.get_tallies(&FEED, &ids).await.unwrap();
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].total_count, 2);
        assert_eq!(tallies[1].total_count, 1);

        let foreign = queries.get_tallies(&FeedId([2; 32]), &ids).await.unwrap();
        assert!(foreign.is_empty());
    }

    #[tokio::test]
    async fn nullifiers_and_backups_are_visible() {
        let store = seeded().await;
        let queries = ReactionQueries::new(store);
        let known = Nullifier([2 * 16 + 1; 32]);

        assert!(queries.nullifier_exists(&known).await.unwrap());
        assert!(!queries.nullifier_exists(&Nullifier([0; 32])).await.unwrap());
        assert_eq!(
            queries.get_reaction_backup(&known).await.unwrap(),
            Some(vec![5])
        );
        assert_eq!(
            queries
                .get_reaction_backup(&Nullifier([0; 32]))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn audit_trail_is_per_message() {
        let store = seeded().await;
        let queries = ReactionQueries::new(store);
        let rows = queries.get_transactions(&MessageId([1; 32])).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
        assert!(rows.iter().all(|r| r.block_height == 3));
    }
}
