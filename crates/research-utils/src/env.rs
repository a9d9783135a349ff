//! Environment variable lookups for client credentials

use std::str::FromStr;
use thiserror::Error;

/// Errors reading configuration from the environment
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    #[error("{0} environment variable not set")]
    Missing(String),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: String, value: String },
}

/// Read a variable that must be present and non-empty
pub fn required_env(name: &str) -> Result<String, EnvError> {
    optional_env(name).ok_or_else(|| EnvError::Missing(name.to_string()))
}

/// Read a variable, treating empty values as unset
pub fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an optional variable
pub fn parsed_env<T: FromStr>(name: &str) -> Result<Option<T>, EnvError> {
    optional_env(name)
        .map(|value| {
            value.parse().map_err(|_| EnvError::Invalid {
                name: name.to_string(),
                value,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable() {
        let err = required_env("RESEARCH_UTILS_TEST_UNSET_VAR").unwrap_err();
        assert_eq!(
            err.to_string(),
            "RESEARCH_UTILS_TEST_UNSET_VAR environment variable not set"
        );
    }

    #[test]
    fn test_parsed_env() {
        unsafe {
            std::env::set_var("RESEARCH_UTILS_TEST_NUM", " 42 ");
            std::env::set_var("RESEARCH_UTILS_TEST_BAD", "forty");
            std::env::set_var("RESEARCH_UTILS_TEST_EMPTY", "  ");
        }

        assert_eq!(parsed_env::<u64>("RESEARCH_UTILS_TEST_NUM"), Ok(Some(42)));
        assert!(matches!(
            parsed_env::<u64>("RESEARCH_UTILS_TEST_BAD"),
            Err(EnvError::Invalid { .. })
        ));
        assert_eq!(optional_env("RESEARCH_UTILS_TEST_EMPTY"), None);

        unsafe {
            std::env::remove_var("RESEARCH_UTILS_TEST_NUM");
            std::env::remove_var("RESEARCH_UTILS_TEST_BAD");
            std::env::remove_var("RESEARCH_UTILS_TEST_EMPTY");
        }
    }
}
