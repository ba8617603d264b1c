//! Offline replay of an indexer log.

use anyhow::{Context, Result};
use common::{ids::derive_address_commitment, CurvePoint, FeedId, MessageId};
use omega_server::{
    config::Config,
    events::{
        handle_membership_event, run_reaction_indexer, IndexedReaction, IndexerStats,
        MembershipEvent,
    },
    store::MemoryStore,
    types::MessageReactionTally,
    MembershipService, MemoryFeedSecrets, ReactionAdmission, ReactionProcessor, ReactionQueries,
    Verdict,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::Arc,
};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, info_span, warn};

const REACTION_QUEUE: usize = 256;

/// One line of the log.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    FeedKey {
        feed_id: FeedId,
        public_key: CurvePoint,
    },
    Message {
        feed_id: FeedId,
        message_id: MessageId,
        author_address: String,
    },
    Membership(MembershipEvent),
    Reaction(IndexedReaction),
}

#[derive(Debug, Serialize)]
pub struct Refusal {
    pub line: usize,
    pub message_id: MessageId,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub admitted: u64,
    pub refused: Vec<Refusal>,
    pub membership_failures: u64,
    pub indexer: IndexerStats,
    pub tallies: Vec<MessageReactionTally>,
}

pub async fn replay(config: &Config, log: &Path) -> Result<ReplayReport> {
    let verifier = info_span!("verifier_setup").in_scope(|| config.verifier.build())?;

    let store = MemoryStore::new();
    let membership = Arc::new(MembershipService::new(store.clone(), config.processor));
    let processor = Arc::new(ReactionProcessor::new(store.clone(), config.processor));
    let secrets = Arc::new(MemoryFeedSecrets::new());
    let admission = ReactionAdmission::new(
        membership.clone(),
        verifier,
        secrets.clone(),
        config.membership.accepted_root_window,
    );
    info!(
        current = admission.verifier().current_version(),
        root_window = config.membership.accepted_root_window,
        "admission ready"
    );

    let (reactions, queue) = mpsc::channel(REACTION_QUEUE);
    let indexer = tokio::spawn(run_reaction_indexer(processor, queue));

    let file = File::open(log)
        .await
        .with_context(|| format!("opening {}", log.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut seen: BTreeMap<FeedId, BTreeSet<MessageId>> = BTreeMap::new();
    let mut admitted = 0;
    let mut refused = Vec::new();
    let mut membership_failures = 0;
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{line_no}", log.display()))?;

        match record {
            Record::FeedKey {
                feed_id,
                public_key,
            } => secrets.set_feed_key(feed_id, public_key),
            Record::Message {
                feed_id,
                message_id,
                author_address,
            } => secrets.set_author(
                feed_id,
                message_id,
                derive_address_commitment(&author_address),
            ),
            // Handled inline so that later reactions see the roots this event produces.
            Record::Membership(event) => {
                if let Err(e) = handle_membership_event(&membership, &event).await {
                    warn!(line = line_no, error = %e, "membership event failed");
                    membership_failures += 1;
                }
            }
            Record::Reaction(indexed) => {
                let (feed_id, message_id) =
                    (indexed.transaction.feed_id, indexed.transaction.message_id);
                let verdict = admission.admit(&indexed.transaction).await;
                let (code, reason) = match verdict {
                    Ok(Verdict::Reject(r)) => (r.code.as_str().to_string(), r.message),
                    Ok(_) => {
                        seen.entry(feed_id).or_default().insert(message_id);
                        reactions.send(indexed).await?;
                        admitted += 1;
                        continue;
                    }
                    Err(e) => ("ADMISSION_FAILED".to_string(), e.to_string()),
                };
                warn!(line = line_no, %message_id, %code, "reaction refused");
                refused.push(Refusal {
                    line: line_no,
                    message_id,
                    code,
                    reason,
                });
            }
        }
    }

    drop(reactions);
    let indexer = indexer.await?;

    let queries = ReactionQueries::new(store);
    let mut tallies = Vec::new();
    for (feed_id, messages) in seen {
        let ids: Vec<_> = messages.into_iter().collect();
        tallies.extend(queries.get_tallies(&feed_id, &ids).await?);
    }

    Ok(ReplayReport {
        admitted,
        refused,
        membership_failures,
        indexer,
        tallies,
    })
}
