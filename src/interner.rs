//! Token interning: dense integer ids for opaque external identifiers.
//!
//! All engines share the convention that users and items are addressed by
//! small integer ids, while callers speak arbitrary token strings. The
//! interner owns the bidirectional mapping and a kind tag per id, all of it
//! living in the store under four keys:
//!
//!   - `<prefix>:id` — counter, equal to the highest id ever issued
//!   - `<prefix>:fh` — token → id
//!   - `<prefix>:rh` — id → token
//!   - `<prefix>:th` — id → kind code
//!
//! The counter only moves forward: deleting a token frees its hash entries
//! but the id is never reissued. Two writers interning the same fresh token
//! concurrently can each allocate an id (the counter bump and the three hash
//! writes are separate store calls); one id is then wasted, but a reader
//! always sees a coherent fh/rh/th triple for whichever write landed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::Store;

/// Category tag recorded for every interned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TokenKind {
    Nil = 1,
    Bool = 2,
    Number = 3,
    Text = 4,
    Bytes = 5,
    List = 6,
    Map = 7,
    Other = 8,
}

impl TokenKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(TokenKind::Nil),
            2 => Some(TokenKind::Bool),
            3 => Some(TokenKind::Number),
            4 => Some(TokenKind::Text),
            5 => Some(TokenKind::Bytes),
            6 => Some(TokenKind::List),
            7 => Some(TokenKind::Map),
            8 => Some(TokenKind::Other),
            _ => None,
        }
    }

    /// Kind inferred from the token text itself; callers with richer type
    /// information use [`Interner::intern_as`] instead.
    pub fn infer(token: &str) -> Self {
        if token.is_empty() {
            TokenKind::Nil
        } else if token == "true" || token == "false" {
            TokenKind::Bool
        } else if token.parse::<f64>().is_ok() {
            TokenKind::Number
        } else {
            TokenKind::Text
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternerConfig {
    /// Key prefix; concatenated verbatim, so callers pick non-colliding ones.
    pub prefix: String,
}

/// Atomic bidirectional token ↔ id map backed by the store.
pub struct Interner {
    store: Arc<dyn Store>,
    id_key: String,
    fh_key: String,
    rh_key: String,
    th_key: String,
}

impl Interner {
    pub fn new(store: Arc<dyn Store>, config: InternerConfig) -> Result<Self> {
        if config.prefix.is_empty() {
            return Err(Error::InvalidConfig("interner prefix must not be empty".into()));
        }
        let p = &config.prefix;
        Ok(Interner {
            store,
            id_key: format!("{p}:id"),
            fh_key: format!("{p}:fh"),
            rh_key: format!("{p}:rh"),
            th_key: format!("{p}:th"),
        })
    }

    /// Number of live tokens.
    pub fn count(&self) -> usize {
        self.store.hlen(&self.fh_key)
    }

    /// Drop all four keys, counter included. Ids issued afterwards restart
    /// from 1, so this is only safe when every holder of old ids is gone.
    pub fn clear(&self) {
        self.store.del(&self.id_key);
        self.store.del(&self.fh_key);
        self.store.del(&self.rh_key);
        self.store.del(&self.th_key);
    }

    /// Lookup-only translation; `None` for tokens never interned.
    pub fn id_of(&self, token: &str) -> Option<u64> {
        self.store
            .hget(&self.fh_key, token)
            .and_then(|s| s.parse().ok())
    }

    /// Lookup-or-allocate with the kind inferred from the token text.
    pub fn intern(&self, token: &str) -> u64 {
        self.intern_as(token, TokenKind::infer(token))
    }

    /// Lookup-or-allocate with an explicit kind tag.
    pub fn intern_as(&self, token: &str, kind: TokenKind) -> u64 {
        if let Some(id) = self.id_of(token) {
            return id;
        }
        let id = self.store.incrby(&self.id_key, 1) as u64;
        let id_str = id.to_string();
        self.store.hset(&self.fh_key, token, &id_str);
        self.store.hset(&self.rh_key, &id_str, token);
        self.store.hset(&self.th_key, &id_str, &kind.code().to_string());
        debug!(token, id, kind = ?kind, "interned token");
        id
    }

    /// Reverse translation; `None` for ids never issued or since deleted.
    pub fn value_of(&self, id: u64) -> Option<String> {
        self.store.hget(&self.rh_key, &id.to_string())
    }

    /// Batch reverse translation, one store call for the whole list.
    pub fn values_of(&self, ids: &[u64]) -> Vec<Option<String>> {
        let fields: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        self.store.hmget(&self.rh_key, &refs)
    }

    /// Kind tag recorded at intern time.
    pub fn kind_of(&self, id: u64) -> Option<TokenKind> {
        self.store
            .hget(&self.th_key, &id.to_string())
            .and_then(|s| s.parse().ok())
            .and_then(TokenKind::from_code)
    }

    /// Remove a token's three hash entries. The id counter is untouched, so
    /// the freed id is never reused. Returns false for unknown tokens.
    pub fn delete(&self, token: &str) -> bool {
        let Some(id) = self.store.hget(&self.fh_key, token) else {
            return false;
        };
        self.store.hdel(&self.fh_key, token);
        self.store.hdel(&self.rh_key, &id);
        self.store.hdel(&self.th_key, &id);
        debug!(token, id = %id, "deleted token");
        true
    }
}
