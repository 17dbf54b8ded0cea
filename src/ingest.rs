//! # Ingress Validation
//!
//! Turns a raw request body such as `"cat,Dog,,cat"` into a [`Batch`].
//!
//! ## Policy
//!
//! - The body must be non-empty and contain only ASCII letters and commas
//! - Tokens are comma-delimited; empty tokens (`",,"`) are dropped
//! - Tokens are lower-cased and duplicates are summed
//!
//! A body that passes the character check but yields no tokens (`",,,"`) is
//! also rejected: the engine never sees an empty batch from here.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::types::Batch;

/// Allowed characters for a whole request body.
const BODY_PATTERN: &str = r"^[a-zA-Z,]+$";

/// Message returned for bodies that violate the policy.
pub const POLICY_MESSAGE: &str =
    "please make sure all words contain only [A-Za-z] and are separated by commas (,)";

fn body_policy() -> &'static Regex {
    static POLICY: OnceLock<Regex> = OnceLock::new();
    POLICY.get_or_init(|| Regex::new(BODY_PATTERN).expect("body pattern is a valid regex"))
}

/// The raw tokens of one submitted request.
///
/// Created at ingress, consumed by [`BatchRequest::into_batch`], and then
/// discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    tokens: Vec<String>,
}

impl BatchRequest {
    /// Validates and tokenizes a request body.
    pub fn parse(body: &str) -> Result<Self> {
        if body.is_empty() || !body_policy().is_match(body) {
            return Err(Error::Validation(POLICY_MESSAGE.to_string()));
        }

        let tokens: Vec<String> = body
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        if tokens.is_empty() {
            return Err(Error::Validation("request contains no words".to_string()));
        }

        Ok(Self { tokens })
    }

    /// The raw tokens, in submission order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Normalizes and aggregates the tokens into per-word increments.
    pub fn into_batch(self) -> Batch {
        Batch::from_tokens(self.tokens)
    }
}
