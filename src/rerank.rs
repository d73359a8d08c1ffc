//! Rerankers: pluggable post-processing of a scored recommendation list.
//!
//! A reranker permutes the list it is given (ids are preserved, scores are
//! not rewritten); an empty list passes through untouched. All randomness
//! comes from the [`FastRng`] handle the caller passes in, so a run is
//! reproducible from its seed.

use std::cmp::Ordering;

use tracing::debug;

use crate::engine::Scored;
use crate::error::{Error, Result};
use crate::rng::FastRng;

/// One operation: given a user and a scored list, return a permuted list.
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;
    fn rerank(&self, rng: &mut FastRng, user_token: &str, recs: Vec<Scored>) -> Vec<Scored>;
}

fn sort_by_score_desc(recs: &mut [Scored]) {
    recs.sort_unstable_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn sort_by_key_asc(keyed: &mut [(f64, Scored)]) {
    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
}

/// Randomized rank perturbation, after Dunning & Friedman.
///
/// Each entry's sort key is `ln(rank) + N(0, sigma)` with
/// `sigma = sqrt(ln epsilon)`. At `epsilon = 1` the noise collapses and the
/// output keeps the score-descending order; larger epsilon widens the
/// permutation distribution, trading precision for exploration.
pub struct EpsilonDithering {
    epsilon: f64,
    sigma: f64,
}

impl EpsilonDithering {
    pub fn new(epsilon: f64) -> Result<Self> {
        if !epsilon.is_finite() || epsilon < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "epsilon must be a finite number >= 1.0, got {epsilon}"
            )));
        }
        let sigma = if epsilon > 1.0 { epsilon.ln().sqrt() } else { 1e-10 };
        Ok(EpsilonDithering { epsilon, sigma })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl Reranker for EpsilonDithering {
    fn name(&self) -> &str {
        "epsilon-dithering"
    }

    fn rerank(&self, rng: &mut FastRng, user_token: &str, mut recs: Vec<Scored>) -> Vec<Scored> {
        if recs.is_empty() {
            return recs;
        }
        sort_by_score_desc(&mut recs);
        let mut keyed: Vec<(f64, Scored)> = recs
            .into_iter()
            .enumerate()
            .map(|(i, rec)| {
                let rank = (i + 1) as f64;
                (rank.ln() + rng.next_gaussian(0.0, self.sigma), rec)
            })
            .collect();
        sort_by_key_asc(&mut keyed);
        debug!(user = %user_token, sigma = self.sigma, "dithered recommendation order");
        keyed.into_iter().map(|(_, rec)| rec).collect()
    }
}

/// Rank-driven impression discounting.
///
/// Attenuates each entry by `w1/(rank+1)^a + w2/(rank+1)^b` and orders by
/// the attenuated value ascending. Rank stands in for the impression count
/// and the time since last impression; wiring those to a real impression
/// store is left to the host system.
pub struct ImpressionDiscount {
    w1: f64,
    w2: f64,
    impression_exponent: f64,
    last_seen_exponent: f64,
}

impl Default for ImpressionDiscount {
    fn default() -> Self {
        ImpressionDiscount {
            w1: 0.5,
            w2: 0.5,
            impression_exponent: 0.5,
            last_seen_exponent: 0.5,
        }
    }
}

impl ImpressionDiscount {
    pub fn new(w1: f64, w2: f64, impression_exponent: f64, last_seen_exponent: f64) -> Result<Self> {
        for (name, w) in [("w1", w1), ("w2", w2)] {
            if !w.is_finite() || w <= 0.0 || w > 1.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {w}"
                )));
            }
        }
        for (name, e) in [
            ("impression_exponent", impression_exponent),
            ("last_seen_exponent", last_seen_exponent),
        ] {
            if !e.is_finite() || e < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {e}"
                )));
            }
        }
        Ok(ImpressionDiscount {
            w1,
            w2,
            impression_exponent,
            last_seen_exponent,
        })
    }
}

impl Reranker for ImpressionDiscount {
    fn name(&self) -> &str {
        "impression-discount"
    }

    fn rerank(&self, _rng: &mut FastRng, user_token: &str, mut recs: Vec<Scored>) -> Vec<Scored> {
        if recs.is_empty() {
            return recs;
        }
        sort_by_score_desc(&mut recs);
        let mut keyed: Vec<(f64, Scored)> = recs
            .into_iter()
            .enumerate()
            .map(|(i, rec)| {
                let rank = (i + 1) as f64;
                let discount = self.w1 / (rank + 1.0).powf(self.impression_exponent)
                    + self.w2 / (rank + 1.0).powf(self.last_seen_exponent);
                (rec.score * discount, rec)
            })
            .collect();
        sort_by_key_asc(&mut keyed);
        debug!(user = %user_token, "impression-discounted recommendation order");
        keyed.into_iter().map(|(_, rec)| rec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recs(scores: &[(&str, f64)]) -> Vec<Scored> {
        scores.iter().map(|(id, s)| Scored::new(*id, *s)).collect()
    }

    #[test]
    fn epsilon_must_be_at_least_one() {
        assert!(EpsilonDithering::new(0.9).is_err());
        assert!(EpsilonDithering::new(f64::NAN).is_err());
        assert!(EpsilonDithering::new(1.0).is_ok());
        assert_eq!(EpsilonDithering::new(3.0).unwrap().epsilon(), 3.0);
    }

    #[test]
    fn epsilon_one_preserves_score_order() {
        let reranker = EpsilonDithering::new(1.0).unwrap();
        let mut rng = FastRng::new(7);
        let shuffled = recs(&[("b", 0.2), ("a", 0.5), ("c", 0.3)]);
        let out = reranker.rerank(&mut rng, "user", shuffled);
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        // scores travel with their ids, unmodified
        assert_eq!(out[0].score, 0.5);
        assert_eq!(out[2].score, 0.2);
    }

    #[test]
    fn dithering_is_deterministic_per_seed() {
        let reranker = EpsilonDithering::new(2.5).unwrap();
        let input = recs(&[("a", 0.4), ("b", 0.3), ("c", 0.2), ("d", 0.1)]);

        let mut rng1 = FastRng::new(11);
        let mut rng2 = FastRng::new(11);
        let out1 = reranker.rerank(&mut rng1, "user", input.clone());
        let out2 = reranker.rerank(&mut rng2, "user", input.clone());
        assert_eq!(out1, out2);

        // a permutation: same id set either way
        let mut ids: Vec<&str> = out1.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn empty_list_passes_through() {
        let mut rng = FastRng::new(1);
        let dither = EpsilonDithering::new(1.5).unwrap();
        assert!(dither.rerank(&mut rng, "user", Vec::new()).is_empty());
        let discount = ImpressionDiscount::default();
        assert!(discount.rerank(&mut rng, "user", Vec::new()).is_empty());
    }

    #[test]
    fn discount_config_bounds() {
        assert!(ImpressionDiscount::new(0.0, 0.5, 0.5, 0.5).is_err());
        assert!(ImpressionDiscount::new(0.5, 1.5, 0.5, 0.5).is_err());
        assert!(ImpressionDiscount::new(0.5, 0.5, -1.0, 0.5).is_err());
        assert!(ImpressionDiscount::new(1.0, 1.0, 0.0, 2.0).is_ok());
    }

    #[test]
    fn discount_orders_by_attenuated_score_ascending() {
        let reranker = ImpressionDiscount::default();
        let mut rng = FastRng::new(1);
        let out = reranker.rerank(&mut rng, "user", recs(&[("a", 4.0), ("b", 2.0), ("c", 1.0)]));
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        // discounted keys: a = 4*2*0.5/sqrt(2), b = 2*2*0.5/sqrt(3), c = 1*2*0.5/2
        // ascending puts the smallest attenuated value first
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(out[2].score, 4.0);
    }
}
