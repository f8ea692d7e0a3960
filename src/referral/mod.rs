//! The referral graph core: sponsor→referral adjacency, team-size
//! aggregation, downline enumeration, and the read cache in front of it.

pub mod cache;
pub mod graph;
pub mod retry;

pub use cache::DownlineCache;
pub use graph::{AdjacencyIndex, ReferralGraphService, TeamCounts};
