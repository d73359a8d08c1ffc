//! Engine contract and the shared interaction/recommendation types.
//!
//! An engine is anything that can absorb interactions and answer
//! recommendation queries. Ids crossing this boundary are always the dense
//! integer ids issued by the interner, stringified; engines neither intern
//! nor resolve tokens themselves.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Default recommendation list length.
pub const DEFAULT_LIMIT: usize = 10;

/// Interaction event classes, ordered by engagement strength.
///
/// The default weights are monotone in engagement, which the incremental
/// update algebra relies on: a weaker event never overrides a stronger one
/// for the same (user, item).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    AddToCart,
    Buy,
}

impl EventType {
    pub fn default_weight(self) -> f64 {
        match self {
            EventType::Impression => 0.0,
            EventType::Click => 2.0,
            EventType::AddToCart => 3.0,
            EventType::Buy => 5.0,
        }
    }
}

/// One user/item interaction event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: String,
    pub item_id: String,
    pub event: EventType,
    pub weight: f64,
}

impl Interaction {
    /// Event with its default weight.
    pub fn new(user_id: impl Into<String>, item_id: impl Into<String>, event: EventType) -> Self {
        Interaction {
            user_id: user_id.into(),
            item_id: item_id.into(),
            event,
            weight: event.default_weight(),
        }
    }

    /// Override the weight, for callers with their own scale.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A recommended id with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub id: String,
    pub score: f64,
}

impl Scored {
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Scored {
            id: id.into(),
            score,
        }
    }
}

/// The four operations every engine exposes.
///
/// `add_user` and `add_item` are optional hooks and default to no-ops;
/// `record_interaction` is the side-effecting write path and
/// `get_recommendations` the pure query path.
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn add_user(&self, _user_id: &str) -> Result<()> {
        Ok(())
    }

    fn add_item(&self, _item_id: &str) -> Result<()> {
        Ok(())
    }

    fn record_interaction(&self, ev: &Interaction) -> Result<()>;

    fn get_recommendations(&self, user_id: &str, limit: usize) -> Result<Vec<Scored>>;
}

/// Null content-based engine.
///
/// Placeholder slot in the engine set: accepts every interaction without
/// recording anything and recommends nothing.
#[derive(Debug, Default)]
pub struct ContentEngine;

impl ContentEngine {
    pub fn new() -> Self {
        ContentEngine
    }
}

impl Engine for ContentEngine {
    fn name(&self) -> &str {
        "content"
    }

    fn record_interaction(&self, ev: &Interaction) -> Result<()> {
        debug!(user = %ev.user_id, item = %ev.item_id, "content engine ignoring interaction");
        Ok(())
    }

    fn get_recommendations(&self, _user_id: &str, _limit: usize) -> Result<Vec<Scored>> {
        Ok(Vec::new())
    }
}
