//! Environment lookups shared by the per-crate `from_env()` constructors.

use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// A set, non-blank environment variable.
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse an environment variable, falling back to `default` when unset.
pub fn env_parse<T: FromStr>(
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match env_string(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // Each test uses its own variable name; the process environment is shared.

    #[test]
    fn unset_variable_uses_default() {
        assert_eq!(env_parse("NETWATCH_TEST_UNSET_VAR", 30_u64, "an integer"), Ok(30));
    }

    #[test]
    fn invalid_value_is_reported() {
        std::env::set_var("NETWATCH_TEST_BAD_INT", "soon");
        assert_matches!(
            env_parse("NETWATCH_TEST_BAD_INT", 30_u64, "an integer"),
            Err(ConfigError::Invalid { name: "NETWATCH_TEST_BAD_INT", .. })
        );
    }

    #[test]
    fn blank_value_counts_as_unset() {
        std::env::set_var("NETWATCH_TEST_BLANK", "   ");
        assert_eq!(env_string("NETWATCH_TEST_BLANK"), None);
    }
}
