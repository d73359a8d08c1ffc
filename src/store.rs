//! Typed store facade and the concurrent in-memory implementation.
//!
//! The engines only ever touch the external key/value store through the
//! [`Store`] trait, which exposes exactly the hash, counter, and sorted-set
//! commands the core uses. Absent values come back as `None`; there is no
//! error channel on reads, so the dual nil/false sentinel of the host store
//! collapses into one place.
//!
//! [`MemoryStore`] backs the trait with a `DashMap` for lock-free concurrent
//! access. Every trait call is atomic per key, which is the same guarantee
//! the host store gives for a single command.

use ahash::AHashMap;
use dashmap::DashMap;

/// The store commands the engines are written against.
///
/// `hgetall` returns field/value pairs; `zrevrangebyscore` returns the
/// top `limit` members by score, descending, with scores.
pub trait Store: Send + Sync {
    fn hget(&self, key: &str, field: &str) -> Option<String>;
    fn hset(&self, key: &str, field: &str, value: &str);
    fn hdel(&self, key: &str, field: &str) -> bool;
    fn hlen(&self, key: &str) -> usize;
    fn hgetall(&self, key: &str) -> Vec<(String, String)>;
    fn hmget(&self, key: &str, fields: &[&str]) -> Vec<Option<String>>;
    fn del(&self, key: &str) -> bool;
    fn incrby(&self, key: &str, delta: i64) -> i64;
    fn zadd(&self, key: &str, member: &str, score: f64);
    fn zincrby(&self, key: &str, member: &str, delta: f64) -> f64;
    fn zscore(&self, key: &str, member: &str) -> Option<f64>;
    fn zrevrangebyscore(&self, key: &str, limit: usize) -> Vec<(String, f64)>;
    fn zunionstore(&self, dest: &str, keys: &[&str], weights: &[f64]) -> usize;
}

/// One keyspace entry. A key is born as whichever shape first touches it.
#[derive(Debug, Clone)]
enum Value {
    Hash(AHashMap<String, String>),
    ZSet(AHashMap<String, f64>),
    Counter(i64),
}

/// Thread-safe in-memory store.
///
/// Used as the test double for the engines and as the backing store of the
/// demo binary. A wrong-typed read (say `hget` on a sorted set) comes back
/// absent; a wrong-typed write replaces the key with the new shape. The
/// engines never share a key between shapes, so both branches only matter
/// for misuse.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            entries: DashMap::new(),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Store for MemoryStore {
    fn hget(&self, key: &str, field: &str) -> Option<String> {
        match self.entries.get(key).as_deref() {
            Some(Value::Hash(h)) => h.get(field).cloned(),
            _ => None,
        }
    }

    fn hset(&self, key: &str, field: &str, value: &str) {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(AHashMap::new()));
        match entry.value_mut() {
            Value::Hash(h) => {
                h.insert(field.to_string(), value.to_string());
            }
            // Overwrite a wrong-typed key rather than silently drop the write.
            other => {
                let mut h = AHashMap::new();
                h.insert(field.to_string(), value.to_string());
                *other = Value::Hash(h);
            }
        }
    }

    fn hdel(&self, key: &str, field: &str) -> bool {
        match self.entries.get_mut(key).as_deref_mut() {
            Some(Value::Hash(h)) => h.remove(field).is_some(),
            _ => false,
        }
    }

    fn hlen(&self, key: &str) -> usize {
        match self.entries.get(key).as_deref() {
            Some(Value::Hash(h)) => h.len(),
            _ => 0,
        }
    }

    fn hgetall(&self, key: &str) -> Vec<(String, String)> {
        match self.entries.get(key).as_deref() {
            Some(Value::Hash(h)) => h.iter().map(|(f, v)| (f.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }

    fn hmget(&self, key: &str, fields: &[&str]) -> Vec<Option<String>> {
        match self.entries.get(key).as_deref() {
            Some(Value::Hash(h)) => fields.iter().map(|f| h.get(*f).cloned()).collect(),
            _ => vec![None; fields.len()],
        }
    }

    fn del(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn incrby(&self, key: &str, delta: i64) -> i64 {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(Value::Counter(0));
        match entry.value_mut() {
            Value::Counter(c) => {
                *c += delta;
                *c
            }
            // Overwrite a wrong-typed key rather than silently extend it.
            other => {
                *other = Value::Counter(delta);
                delta
            }
        }
    }

    fn zadd(&self, key: &str, member: &str, score: f64) {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::ZSet(AHashMap::new()));
        match entry.value_mut() {
            Value::ZSet(z) => {
                z.insert(member.to_string(), score);
            }
            other => {
                let mut z = AHashMap::new();
                z.insert(member.to_string(), score);
                *other = Value::ZSet(z);
            }
        }
    }

    fn zincrby(&self, key: &str, member: &str, delta: f64) -> f64 {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::ZSet(AHashMap::new()));
        match entry.value_mut() {
            Value::ZSet(z) => {
                let score = z.entry(member.to_string()).or_insert(0.0);
                *score += delta;
                *score
            }
            other => {
                let mut z = AHashMap::new();
                z.insert(member.to_string(), delta);
                *other = Value::ZSet(z);
                delta
            }
        }
    }

    fn zscore(&self, key: &str, member: &str) -> Option<f64> {
        match self.entries.get(key).as_deref() {
            Some(Value::ZSet(z)) => z.get(member).copied(),
            _ => None,
        }
    }

    fn zrevrangebyscore(&self, key: &str, limit: usize) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = match self.entries.get(key).as_deref() {
            Some(Value::ZSet(z)) => z.iter().map(|(m, s)| (m.clone(), *s)).collect(),
            _ => return Vec::new(),
        };
        // Score descending, ties broken by member descending (reverse-lex,
        // matching the host store's ZREVRANGEBYSCORE ordering).
        members.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });
        members.truncate(limit);
        members
    }

    fn zunionstore(&self, dest: &str, keys: &[&str], weights: &[f64]) -> usize {
        let mut acc: AHashMap<String, f64> = AHashMap::new();
        for (i, key) in keys.iter().enumerate() {
            let weight = weights.get(i).copied().unwrap_or(1.0);
            // Clone out before touching dest so no two shard guards overlap.
            let snapshot: Vec<(String, f64)> = match self.entries.get(*key).as_deref() {
                Some(Value::ZSet(z)) => z.iter().map(|(m, s)| (m.clone(), *s)).collect(),
                _ => Vec::new(),
            };
            for (member, score) in snapshot {
                *acc.entry(member).or_insert(0.0) += weight * score;
            }
        }
        let len = acc.len();
        self.entries.insert(dest.to_string(), Value::ZSet(acc));
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn hash_ops_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.hget("h", "a"), None);
        store.hset("h", "a", "1");
        store.hset("h", "b", "2");
        assert_eq!(store.hget("h", "a").as_deref(), Some("1"));
        assert_eq!(store.hlen("h"), 2);

        let mut all = store.hgetall("h");
        all.sort();
        assert_eq!(
            all,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );

        assert_eq!(
            store.hmget("h", &["a", "missing", "b"]),
            vec![Some("1".to_string()), None, Some("2".to_string())]
        );

        assert!(store.hdel("h", "a"));
        assert!(!store.hdel("h", "a"));
        assert_eq!(store.hlen("h"), 1);
    }

    #[test]
    fn del_reports_existence() {
        let store = MemoryStore::new();
        assert!(!store.del("k"));
        store.hset("k", "f", "v");
        assert!(store.del("k"));
        assert_eq!(store.hget("k", "f"), None);
    }

    #[test]
    fn incrby_accumulates() {
        let store = MemoryStore::new();
        assert_eq!(store.incrby("c", 1), 1);
        assert_eq!(store.incrby("c", 4), 5);
        assert_eq!(store.incrby("c", -2), 3);
    }

    #[test]
    fn incrby_is_atomic_across_threads() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.incrby("c", 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.incrby("c", 0), 8000);
    }

    #[test]
    fn zset_ops_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.zscore("z", "a"), None);
        store.zadd("z", "a", 1.0);
        assert_eq!(store.zincrby("z", "a", 2.0), 3.0);
        assert_eq!(store.zincrby("z", "b", 1.5), 1.5);
        assert_eq!(store.zscore("z", "a"), Some(3.0));
        assert_eq!(store.zscore("z", "b"), Some(1.5));
    }

    #[test]
    fn zrevrangebyscore_orders_and_limits() {
        let store = MemoryStore::new();
        store.zadd("z", "low", 1.0);
        store.zadd("z", "mid", 2.0);
        store.zadd("z", "high", 3.0);
        store.zadd("z", "tie_a", 2.0);

        let top = store.zrevrangebyscore("z", 10);
        assert_eq!(top[0], ("high".to_string(), 3.0));
        // tie at 2.0 resolves member-descending
        assert_eq!(top[1], ("tie_a".to_string(), 2.0));
        assert_eq!(top[2], ("mid".to_string(), 2.0));
        assert_eq!(top[3], ("low".to_string(), 1.0));

        assert_eq!(store.zrevrangebyscore("z", 2).len(), 2);
        assert!(store.zrevrangebyscore("nope", 5).is_empty());
    }

    #[test]
    fn zunionstore_sums_with_weights() {
        let store = MemoryStore::new();
        store.zadd("a", "x", 1.0);
        store.zadd("a", "y", 2.0);
        store.zadd("b", "y", 3.0);
        store.zadd("b", "z", 4.0);

        let len = store.zunionstore("dest", &["a", "b"], &[1.0, 0.5]);
        assert_eq!(len, 3);
        assert_eq!(store.zscore("dest", "x"), Some(1.0));
        assert_eq!(store.zscore("dest", "y"), Some(3.5));
        assert_eq!(store.zscore("dest", "z"), Some(2.0));
    }

    #[test]
    fn wrong_typed_access_reads_as_absent() {
        let store = MemoryStore::new();
        store.zadd("z", "m", 1.0);
        assert_eq!(store.hget("z", "m"), None);
        assert_eq!(store.hlen("z"), 0);
        store.hset("h", "f", "v");
        assert_eq!(store.zscore("h", "f"), None);
    }

    #[test]
    fn wrong_typed_write_replaces_the_key() {
        let store = MemoryStore::new();

        store.zadd("k", "m", 1.0);
        store.hset("k", "f", "v");
        assert_eq!(store.hget("k", "f").as_deref(), Some("v"));
        assert_eq!(store.zscore("k", "m"), None);

        assert_eq!(store.zincrby("k", "m", 2.0), 2.0);
        assert_eq!(store.zscore("k", "m"), Some(2.0));
        assert_eq!(store.hget("k", "f"), None);

        assert_eq!(store.incrby("k", 3), 3);
        assert_eq!(store.zscore("k", "m"), None);

        store.zadd("k", "x", 1.5);
        assert_eq!(store.zscore("k", "x"), Some(1.5));
        assert_eq!(store.incrby("k", 1), 1);
    }

    #[test]
    fn clear_empties_the_keyspace() {
        let store = MemoryStore::new();
        store.hset("h", "f", "v");
        store.zadd("z", "m", 1.0);
        assert_eq!(store.len(), 2);
        store.clear();
        assert!(store.is_empty());
    }
}
