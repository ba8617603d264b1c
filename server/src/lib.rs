//! Anonymous reaction core: membership trees, proof admission, encrypted tallies and the
//! nullifier ledger that lets a member change their vote without ever voting twice.

pub mod admission;
pub mod config;
pub mod events;
pub mod membership;
pub mod merkle;
pub mod nullifier;
pub mod processor;
pub mod queries;
pub mod retry;
pub mod store;
pub mod tally;
pub mod types;
pub mod verifier;

pub use admission::{FeedSecretProvider, MemoryFeedSecrets, ReactionAdmission};
pub use membership::{MembershipProof, MembershipService, RegistrationOutcome};
pub use processor::{ProcessedReaction, ReactionProcessor};
pub use queries::ReactionQueries;
pub use verifier::{ProofVerifier, ReactionPublicInputs, RejectCode, Verdict};
