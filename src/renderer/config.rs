//! Configuration for template execution

use serde::Deserialize;

/// Default limit on nested control structures and template calls
///
/// Low enough that a render on a 2 MiB thread stack fails with an error
/// before the stack runs out.
pub const DEFAULT_MAX_DEPTH: usize = 200;

/// What a field lookup on a map does when the key is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKey {
    /// Yield `nil`, which prints as nothing
    #[default]
    Empty,
    /// Abort execution with an error
    Error,
}

/// Configuration options for template execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    /// Maximum nesting of `if`, `with`, `range`, `template` and `block`
    pub max_depth: usize,

    /// Behaviour of lookups of absent map keys
    pub missing_key: MissingKey,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            missing_key: MissingKey::Empty,
        }
    }
}

impl ExecConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum nesting depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the behaviour for absent map keys
    pub fn with_missing_key(mut self, missing_key: MissingKey) -> Self {
        self.missing_key = missing_key;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExecConfig::default();
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.missing_key, MissingKey::Empty);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ExecConfig::new()
            .with_max_depth(10)
            .with_missing_key(MissingKey::Error);

        assert_eq!(config.max_depth, 10);
        assert_eq!(config.missing_key, MissingKey::Error);
    }
}
