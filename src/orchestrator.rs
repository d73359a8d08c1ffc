//! Composition root: interners, engine set, reranker.
//!
//! The [`Recommender`] owns one interner per token space (users, items),
//! every registered engine, and the reranker applied to the served list.
//! Writes fan out to all engines; reads fan out in parallel and the
//! primary engine's list is the one reranked, translated back to tokens,
//! and returned.
//!
//! Engines speak stringified item-interner ids end to end; all token
//! translation happens here.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::corating::{CoRatingConfig, CoRatingEngine};
use crate::engine::{ContentEngine, Engine, EventType, Interaction, Scored, DEFAULT_LIMIT};
use crate::error::{Error, Result};
use crate::interner::{Interner, InternerConfig};
use crate::rerank::{EpsilonDithering, Reranker};
use crate::rng::FastRng;
use crate::store::{MemoryStore, Store};

/// Epsilon used by the demo entry point's dithering reranker.
const DEMO_EPSILON: f64 = 1.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderConfig {
    pub user_prefix: String,
    pub item_prefix: String,
    pub engine: CoRatingConfig,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        RecommenderConfig {
            user_prefix: "u".to_string(),
            item_prefix: "i".to_string(),
            engine: CoRatingConfig::default(),
        }
    }
}

pub struct Recommender {
    users: Interner,
    items: Interner,
    engines: Vec<Box<dyn Engine>>,
    reranker: Box<dyn Reranker>,
    /// Index of the engine whose list is served.
    primary: usize,
}

impl Recommender {
    /// Build the standard engine set (content stub plus the co-rating
    /// engine, which is the one served) over a shared store.
    pub fn new(
        store: Arc<dyn Store>,
        config: RecommenderConfig,
        reranker: Box<dyn Reranker>,
    ) -> Result<Self> {
        let users = Interner::new(
            Arc::clone(&store),
            InternerConfig {
                prefix: config.user_prefix,
            },
        )?;
        let items = Interner::new(
            Arc::clone(&store),
            InternerConfig {
                prefix: config.item_prefix,
            },
        )?;
        let engines: Vec<Box<dyn Engine>> = vec![
            Box::new(ContentEngine::new()),
            Box::new(CoRatingEngine::new(store, config.engine)?),
        ];
        let primary = engines.len() - 1;
        Ok(Recommender {
            users,
            items,
            engines,
            reranker,
            primary,
        })
    }

    /// Interner for user tokens.
    pub fn users(&self) -> &Interner {
        &self.users
    }

    /// Interner for item tokens.
    pub fn items(&self) -> &Interner {
        &self.items
    }

    /// Record one interaction with the event's default weight.
    pub fn record(&self, user_token: &str, item_token: &str, event: EventType) -> Result<()> {
        let weight = event.default_weight();
        self.record_weighted(user_token, item_token, event, weight)
    }

    /// Record one interaction with an explicit weight.
    ///
    /// Tokens are interned on this path (a write implies the token should
    /// exist), and the event fans out to every registered engine.
    pub fn record_weighted(
        &self,
        user_token: &str,
        item_token: &str,
        event: EventType,
        weight: f64,
    ) -> Result<()> {
        let ev = Interaction {
            user_id: self.users.intern(user_token).to_string(),
            item_id: self.items.intern(item_token).to_string(),
            event,
            weight,
        };
        for engine in &self.engines {
            engine.record_interaction(&ev)?;
        }
        Ok(())
    }

    /// Produce reranked recommendations as (item token, score) pairs.
    ///
    /// The user translation is lookup-only: a token that was never recorded
    /// yields the empty list rather than a fresh id.
    pub fn recommend(
        &self,
        rng: &mut FastRng,
        user_token: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let Some(user_id) = self.users.id_of(user_token) else {
            debug!(user = %user_token, "unknown user, nothing to recommend");
            return Ok(Vec::new());
        };
        let user_id = user_id.to_string();

        // Queries are pure, so the engine fan-out can run in parallel.
        let fanned: Vec<Result<Vec<Scored>>> = self
            .engines
            .par_iter()
            .map(|engine| engine.get_recommendations(&user_id, limit))
            .collect();
        let mut lists = Vec::with_capacity(fanned.len());
        for outcome in fanned {
            lists.push(outcome?);
        }
        debug!(
            user = %user_token,
            engines = self.engines.len(),
            served = self.engines[self.primary].name(),
            "engine fan-out complete"
        );

        let served = lists
            .into_iter()
            .nth(self.primary)
            .unwrap_or_default();
        let reranked = self.reranker.rerank(rng, user_token, served);

        // Batch-translate ids back to tokens; an id with no mapping left
        // (deleted token) is silently dropped.
        let numeric: Vec<Option<u64>> = reranked.iter().map(|r| r.id.parse().ok()).collect();
        let present: Vec<u64> = numeric.iter().flatten().copied().collect();
        let mut resolved = self.items.values_of(&present).into_iter();

        let mut out = Vec::with_capacity(reranked.len());
        for (rec, id) in reranked.iter().zip(numeric) {
            let token = match id {
                Some(_) => resolved.next().flatten(),
                None => None,
            };
            match token {
                Some(token) => out.push((token, rec.score)),
                None => debug!(id = %rec.id, "dropping recommendation with no token mapping"),
            }
        }
        Ok(out)
    }
}

/// The raw invocation surface: `argv = [seed, user_token]`.
///
/// Seeds the RNG from `argv[0]`, replays the built-in demo interaction set
/// against a fresh in-memory store, recommends for the given token, and
/// returns the flat alternating `[token, score, token, score, ...]`
/// sequence.
pub fn run_argv(argv: &[String]) -> Result<Vec<String>> {
    if argv.len() != 2 {
        return Err(Error::InvalidArguments);
    }
    let seed: u64 = argv[0]
        .parse()
        .map_err(|_| Error::InvalidSeed(argv[0].clone()))?;
    let user_token = &argv[1];

    let mut rng = FastRng::new(seed);
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let reranker = Box::new(EpsilonDithering::new(DEMO_EPSILON)?);
    let recommender = Recommender::new(store, RecommenderConfig::default(), reranker)?;

    seed_demo_interactions(&recommender, user_token)?;

    let recs = recommender.recommend(&mut rng, user_token, DEFAULT_LIMIT)?;
    let mut flat = Vec::with_capacity(recs.len() * 2);
    for (token, score) in recs {
        flat.push(token);
        flat.push(score.to_string());
    }
    Ok(flat)
}

/// A small storefront's worth of traffic, enough to give the requesting
/// user a neighborhood to draw recommendations from.
fn seed_demo_interactions(recommender: &Recommender, user_token: &str) -> Result<()> {
    use EventType::*;

    recommender.record(user_token, "espresso-machine", Click)?;
    recommender.record(user_token, "burr-grinder", Click)?;
    recommender.record(user_token, "descaler-kit", Impression)?;

    recommender.record("shopper-a", "espresso-machine", Buy)?;
    recommender.record("shopper-a", "burr-grinder", Buy)?;
    recommender.record("shopper-a", "milk-frother", Buy)?;

    recommender.record("shopper-b", "espresso-machine", Click)?;
    recommender.record("shopper-b", "descaler-kit", Buy)?;
    recommender.record("shopper-b", "milk-frother", Click)?;

    recommender.record("shopper-c", "burr-grinder", Click)?;
    recommender.record("shopper-c", "milk-frother", AddToCart)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let err = run_argv(&argv(&["42"])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid number of arguments.");
        assert!(run_argv(&argv(&["42", "user", "extra"])).is_err());
    }

    #[test]
    fn seed_must_be_numeric() {
        let err = run_argv(&argv(&["not-a-number", "user"])).unwrap_err();
        assert!(matches!(err, Error::InvalidSeed(_)));
    }

    #[test]
    fn demo_run_returns_flat_token_score_pairs() {
        let flat = run_argv(&argv(&["42", "visitor-7"])).unwrap();
        assert!(!flat.is_empty());
        assert_eq!(flat.len() % 2, 0);

        let mut total = 0.0;
        for pair in flat.chunks(2) {
            // tokens are the demo catalog's, never raw ids
            assert!(pair[0].parse::<u64>().is_err(), "expected token, got {}", pair[0]);
            let score: f64 = pair[1].parse().unwrap();
            assert!(score >= 0.0);
            total += score;
        }
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn demo_run_is_reproducible_per_seed() {
        let a = run_argv(&argv(&["7", "visitor-7"])).unwrap();
        let b = run_argv(&argv(&["7", "visitor-7"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_user_gets_nothing() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let recommender = Recommender::new(
            store,
            RecommenderConfig::default(),
            Box::new(EpsilonDithering::new(1.0).unwrap()),
        )
        .unwrap();
        let mut rng = FastRng::new(1);
        assert!(recommender.recommend(&mut rng, "ghost", DEFAULT_LIMIT).unwrap().is_empty());
    }

    #[test]
    fn record_then_recommend_speaks_tokens() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let recommender = Recommender::new(
            store,
            RecommenderConfig::default(),
            Box::new(EpsilonDithering::new(1.0).unwrap()),
        )
        .unwrap();

        recommender.record("ana", "kettle", EventType::Click).unwrap();
        recommender.record("ana", "teapot", EventType::Click).unwrap();
        recommender.record("bo", "kettle", EventType::Click).unwrap();
        recommender.record("bo", "infuser", EventType::Click).unwrap();

        let mut rng = FastRng::new(5);
        let recs = recommender.recommend(&mut rng, "ana", DEFAULT_LIMIT).unwrap();
        assert!(!recs.is_empty());
        let tokens: Vec<&str> = recs.iter().map(|(t, _)| t.as_str()).collect();
        assert!(tokens.contains(&"infuser") || tokens.contains(&"teapot"));
        for (token, _) in &recs {
            assert!(token.parse::<u64>().is_err());
        }
    }
}
