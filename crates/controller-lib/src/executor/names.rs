//! Unique cluster name generation

use crate::error::ExecutionError;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Number of random characters appended to the archetype prefix
pub const SUFFIX_LEN: usize = 4;

/// Re-rolls allowed before giving up on a unique name
pub const DEFAULT_MAX_ATTEMPTS: usize = 64;

/// Source of random name suffixes
pub trait SuffixSource: Send + Sync {
    fn suffix(&self) -> String;
}

/// Alphanumeric suffixes from the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn suffix(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect()
    }
}

/// Generates `lowercase(prefix-suffix)` names that avoid every taken name
pub struct NameGenerator {
    source: Box<dyn SuffixSource>,
    max_attempts: usize,
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new(Box::new(RandomSuffix))
    }
}

impl NameGenerator {
    pub fn new(source: Box<dyn SuffixSource>) -> Self {
        Self {
            source,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Produce a name for which `is_taken` returns false
    pub fn generate(
        &self,
        prefix: &str,
        is_taken: impl Fn(&str) -> bool,
    ) -> Result<String, ExecutionError> {
        for _ in 0..self.max_attempts {
            let name = format!("{}-{}", prefix, self.source.suffix()).to_lowercase();
            if !is_taken(&name) {
                return Ok(name);
            }
        }

        Err(ExecutionError::NameCollision {
            prefix: prefix.to_string(),
            attempts: self.max_attempts,
        })
    }
}
