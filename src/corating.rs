//! Incremental item-based collaborative filtering.
//!
//! Implements the streaming item-similarity scheme from TencentRec
//! (Huang et al., KDD '15): per-item counts (sums of interaction weights),
//! per-pair co-rating counts (shared weight mass), and an unnormalized
//! cosine similarity derived from the two, all maintained in place as
//! interactions arrive. Recommendation is a weighted average over the
//! neighbors of everything the user has touched.
//!
//! Store layout under the configured prefix:
//!
//!   - `<p>:z:i:c` — zset, item id → accumulated weight
//!   - `<p>:z:i:pc` — zset, canonical pair key → co-rating count
//!   - `<p>:h:i:s` — hash, canonical pair key → similarity (the record of
//!     truth; also denormalized into two per-item zsets for top-k reads)
//!   - `<p>:z:i:<item>:s` — zset, neighbor id → similarity
//!   - `<p>:h:u:<user>:i` — hash, item id → the user's weight on it
//!
//! Pair keys are `min:max` under lexicographic comparison of the
//! stringified ids, so each unordered pair is stored exactly once.

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::engine::{Engine, EventType, Interaction, Scored};
use crate::error::{Error, Result};
use crate::store::Store;

/// Canonical pair key: lexicographic min/max over the stringified ids.
fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoRatingConfig {
    /// Key prefix; concatenated verbatim with the suffixes above.
    pub prefix: String,
    /// Weight that marks an item as already owned. Neighbors the user holds
    /// at exactly this weight are pruned from recommendations.
    pub bought_weight: f64,
    /// How many neighbors to fetch per touched item when recommending.
    pub neighbor_limit: usize,
}

impl Default for CoRatingConfig {
    fn default() -> Self {
        CoRatingConfig {
            prefix: "cf".to_string(),
            bought_weight: 5.0,
            neighbor_limit: 100,
        }
    }
}

/// The item-similarity engine. Stateless in process; every read and write
/// goes straight to the store.
pub struct CoRatingEngine {
    store: Arc<dyn Store>,
    prefix: String,
    bought_weight: f64,
    neighbor_limit: usize,
    item_counts_key: String,
    pair_counts_key: String,
    sims_key: String,
}

impl CoRatingEngine {
    pub fn new(store: Arc<dyn Store>, config: CoRatingConfig) -> Result<Self> {
        if config.prefix.is_empty() {
            return Err(Error::InvalidConfig("co-rating prefix must not be empty".into()));
        }
        if !config.bought_weight.is_finite() || config.bought_weight <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "bought_weight must be a positive finite number, got {}",
                config.bought_weight
            )));
        }
        if config.neighbor_limit == 0 {
            return Err(Error::InvalidConfig("neighbor_limit must be at least 1".into()));
        }
        let p = &config.prefix;
        Ok(CoRatingEngine {
            item_counts_key: format!("{p}:z:i:c"),
            pair_counts_key: format!("{p}:z:i:pc"),
            sims_key: format!("{p}:h:i:s"),
            prefix: config.prefix,
            bought_weight: config.bought_weight,
            neighbor_limit: config.neighbor_limit,
            store,
        })
    }

    fn item_sims_key(&self, item: &str) -> String {
        format!("{}:z:i:{}:s", self.prefix, item)
    }

    fn user_items_key(&self, user: &str) -> String {
        format!("{}:h:u:{}:i", self.prefix, user)
    }

    /// Accumulated weight for an item, 0 if never seen.
    pub fn item_count(&self, item: &str) -> f64 {
        self.store
            .zscore(&self.item_counts_key, item)
            .unwrap_or(0.0)
    }

    /// Co-rating count for an unordered item pair, 0 if never co-rated.
    pub fn pair_count(&self, a: &str, b: &str) -> f64 {
        self.store
            .zscore(&self.pair_counts_key, &pair_key(a, b))
            .unwrap_or(0.0)
    }

    /// Similarity for an unordered item pair, from the canonical hash.
    pub fn similarity(&self, a: &str, b: &str) -> Option<f64> {
        self.store
            .hget(&self.sims_key, &pair_key(a, b))
            .and_then(|s| s.parse().ok())
    }

    /// Top `n` neighbors of an item by similarity, descending.
    pub fn neighbors(&self, item: &str, n: usize) -> Vec<(String, f64)> {
        self.store.zrevrangebyscore(&self.item_sims_key(item), n)
    }

    /// The user's item → weight map, unordered.
    pub fn user_items(&self, user: &str) -> Vec<(String, f64)> {
        self.store
            .hgetall(&self.user_items_key(user))
            .into_iter()
            .map(|(item, w)| (item, w.parse().unwrap_or(0.0)))
            .collect()
    }

    /// Record a sequence of interactions in order. Returns how many were
    /// applied; stops at the first failing update.
    pub fn record_batch(&self, events: &[Interaction]) -> Result<usize> {
        for ev in events {
            self.record(ev)?;
        }
        Ok(events.len())
    }

    /// The incremental update.
    ///
    /// Impressions are inert here; they only feed the discounting reranker.
    /// Weights are monotone per (user, item): an event that does not raise
    /// the stored weight is a complete no-op. When the weight does rise,
    /// the item count absorbs the difference and every pair with another
    /// item the user has touched gets its co-rating count and similarity
    /// refreshed.
    fn record(&self, ev: &Interaction) -> Result<()> {
        if ev.event == EventType::Impression {
            debug!(user = %ev.user_id, item = %ev.item_id, "impression, similarity untouched");
            return Ok(());
        }

        let user_key = self.user_items_key(&ev.user_id);
        let entries = self.store.hgetall(&user_key);

        if entries.is_empty() {
            // First interaction for this user: no pairs to maintain yet.
            self.store.hset(&user_key, &ev.item_id, &ev.weight.to_string());
            self.store
                .zincrby(&self.item_counts_key, &ev.item_id, ev.weight);
            debug!(user = %ev.user_id, item = %ev.item_id, weight = ev.weight, "first interaction");
            return Ok(());
        }

        let current: f64 = entries
            .iter()
            .find(|(item, _)| item == &ev.item_id)
            .and_then(|(_, w)| w.parse().ok())
            .unwrap_or(0.0);
        let new_weight = ev.weight;

        if new_weight <= current {
            debug!(
                user = %ev.user_id,
                item = %ev.item_id,
                current,
                new_weight,
                "weight not raised, no-op"
            );
            return Ok(());
        }

        self.store
            .hset(&user_key, &ev.item_id, &new_weight.to_string());
        let item_count = self
            .store
            .zincrby(&self.item_counts_key, &ev.item_id, new_weight - current);

        for (other, w_raw) in &entries {
            if other == &ev.item_id {
                continue;
            }
            let w_other: f64 = w_raw.parse().unwrap_or(0.0);

            // How much the shared mass min(weight_here, weight_there) grew:
            // rising from `current` either tracks the raise while still the
            // smaller side, or clamps at the other item's weight.
            let delta = if current == 0.0 {
                new_weight.min(w_other)
            } else if current < w_other {
                if new_weight < w_other {
                    new_weight - current
                } else {
                    w_other - current
                }
            } else {
                0.0
            };

            let pair = pair_key(&ev.item_id, other);
            if delta != 0.0 {
                self.store.zincrby(&self.pair_counts_key, &pair, delta);
            }

            let pair_count = self
                .store
                .zscore(&self.pair_counts_key, &pair)
                .unwrap_or(0.0);
            let other_count = match self.store.zscore(&self.item_counts_key, other) {
                Some(c) if c.is_finite() && c > 0.0 => c,
                _ => {
                    error!(item = %other, "item count missing during similarity update");
                    return Err(Error::MissingItemCount { item: other.clone() });
                }
            };

            // Even a zero delta needs the rewrite: the item count moved, so
            // the cosine denominator did too.
            let similarity = pair_count / (item_count.sqrt() * other_count.sqrt());
            self.store.hset(&self.sims_key, &pair, &similarity.to_string());
            self.store
                .zadd(&self.item_sims_key(&ev.item_id), other, similarity);
            self.store
                .zadd(&self.item_sims_key(other), &ev.item_id, similarity);
            debug!(pair = %pair, pair_count, similarity, "similarity updated");
        }

        Ok(())
    }

    /// The recommendation query.
    ///
    /// For every item the user has touched, walk its top neighbors, drop
    /// the ones the user already owns (weight exactly `bought_weight`),
    /// cap the survivors per source item, and predict each candidate's
    /// score as the similarity-weighted average of the user's weights.
    /// The final list is score-descending, truncated to `limit`, and
    /// normalized to sum to 1.
    fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<Scored>> {
        let mut entries = self.store.hgetall(&self.user_items_key(user_id));
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        // Hash iteration order is arbitrary; fix the accumulation order so
        // a given store state always yields bit-identical scores.
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let weights: AHashMap<&str, f64> = entries
            .iter()
            .map(|(item, w)| (item.as_str(), w.parse().unwrap_or(0.0)))
            .collect();

        let mut numer: AHashMap<String, f64> = AHashMap::new();
        let mut denom: AHashMap<String, f64> = AHashMap::new();

        for (item, w_raw) in &entries {
            let w_item: f64 = w_raw.parse().unwrap_or(0.0);
            let neighbors = self
                .store
                .zrevrangebyscore(&self.item_sims_key(item), self.neighbor_limit);

            let mut kept = 0usize;
            for (neighbor, sim) in neighbors {
                if kept >= limit {
                    break;
                }
                let owned = weights
                    .get(neighbor.as_str())
                    .is_some_and(|w| *w == self.bought_weight);
                if owned {
                    continue;
                }
                kept += 1;
                *numer.entry(neighbor.clone()).or_insert(0.0) += sim * w_item;
                *denom.entry(neighbor).or_insert(0.0) += sim;
            }
        }

        let mut recs: Vec<Scored> = numer
            .into_iter()
            .filter_map(|(candidate, num)| {
                let den = denom.get(&candidate).copied().unwrap_or(0.0);
                (den > 0.0).then(|| Scored::new(candidate, num / den))
            })
            .collect();

        recs.sort_unstable_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        recs.truncate(limit);

        let total: f64 = recs.iter().map(|r| r.score).sum();
        if total <= 0.0 {
            return Ok(Vec::new());
        }
        for rec in &mut recs {
            rec.score /= total;
        }

        debug!(user = %user_id, candidates = recs.len(), "recommendations computed");
        Ok(recs)
    }
}

impl Engine for CoRatingEngine {
    fn name(&self) -> &str {
        "corating"
    }

    fn record_interaction(&self, ev: &Interaction) -> Result<()> {
        self.record(ev)
    }

    fn get_recommendations(&self, user_id: &str, limit: usize) -> Result<Vec<Scored>> {
        self.recommend(user_id, limit)
    }
}
