//! Shared session-token pool.
//!
//! Clients may supply several session tokens in one Authorization header,
//! comma-separated. The pool is split once per request into an immutable
//! list; selection is random and nothing is mutated, so the pool can be
//! shared freely.

use rand::seq::SliceRandom;

use super::region::SessionToken;
use crate::error::{GatewayError, GatewayResult};

/// Immutable per-request token pool.
#[derive(Debug, Clone)]
pub struct TokenPool {
    tokens: Vec<SessionToken>,
}

impl TokenPool {
    /// Build a pool from the raw Authorization value (with or without the
    /// `Bearer ` prefix). An empty pool is its own failure mode, distinct
    /// from a malformed token.
    pub fn from_header(value: &str) -> GatewayResult<Self> {
        let raw = value.strip_prefix("Bearer ").unwrap_or(value);
        let tokens = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SessionToken::parse)
            .collect::<GatewayResult<Vec<_>>>()?;

        if tokens.is_empty() {
            return Err(GatewayError::Auth("session token pool is empty".to_string()));
        }
        Ok(Self { tokens })
    }

    /// Pick one token at random.
    pub fn pick(&self) -> &SessionToken {
        self.tokens
            .choose(&mut rand::thread_rng())
            .expect("pool is never constructed empty")
    }

    pub fn tokens(&self) -> &[SessionToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
