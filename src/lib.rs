//! Incremental item-based collaborative filtering over a hash/sorted-set
//! key-value store.
//!
//! Components:
//!   - store: typed facade over the host store's hash/counter/zset
//!     commands, plus a concurrent in-memory implementation (DashMap)
//!   - interner: atomic bidirectional token ↔ dense-id map with a kind
//!     tag per id, shared by every engine
//!   - engine: the four-operation engine contract, interaction events,
//!     and the null content-based engine
//!   - corating: streaming item-item similarity maintenance
//!     (TencentRec-style co-rating counts + unnormalized cosine) and the
//!     weighted-average recommendation query
//!   - rerank: epsilon-noise dithering and impression discounting over a
//!     scored list
//!   - rng: seedable xoshiro256** with Box-Muller gaussian draws
//!   - orchestrator: composition root and the seed+token demo entry
//!
//! All persistent state lives in the store; every component is stateless
//! between calls, so any number of processes can share one keyspace as
//! long as they route users consistently.

pub mod corating;
pub mod engine;
pub mod error;
pub mod interner;
pub mod orchestrator;
pub mod rerank;
pub mod rng;
pub mod store;

pub use corating::{CoRatingConfig, CoRatingEngine};
pub use engine::{ContentEngine, Engine, EventType, Interaction, Scored, DEFAULT_LIMIT};
pub use error::{Error, Result};
pub use interner::{Interner, InternerConfig, TokenKind};
pub use orchestrator::{run_argv, Recommender, RecommenderConfig};
pub use rerank::{EpsilonDithering, ImpressionDiscount, Reranker};
pub use rng::FastRng;
pub use store::{MemoryStore, Store};
