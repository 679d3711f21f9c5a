//! Short, speakable error identifiers such as `GEN-7KQ2M`

use super::FailureOrigin;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Crockford-style alphabet: no I, L, O or U
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub const SUFFIX_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorId(String);

impl ErrorId {
    /// Fresh random id in the bucket of `origin`
    pub fn generate(origin: FailureOrigin, rng: &mut impl Rng) -> Self {
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!("{}-{suffix}", origin.prefix()))
    }

    /// Parse a user-supplied id; case-insensitive, surrounding whitespace ignored
    pub fn parse(input: &str) -> Option<Self> {
        let upper = input.trim().to_ascii_uppercase();
        let (prefix, suffix) = upper.split_once('-')?;
        FailureOrigin::from_prefix(prefix)?;
        let well_formed =
            suffix.len() == SUFFIX_LEN && suffix.bytes().all(|b| ALPHABET.contains(&b));
        well_formed.then_some(Self(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn origin(&self) -> Option<FailureOrigin> {
        self.0
            .split_once('-')
            .and_then(|(prefix, _)| FailureOrigin::from_prefix(prefix))
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
