//! Environment variable access.
//!
//! Config loading never reads `std::env` directly; it goes through [`Env`],
//! which tests construct from a fixed map instead of mutating the process
//! environment.

use std::collections::HashMap;
use std::str::FromStr;

/// Environment variable reader.
#[derive(Clone, Debug, Default)]
pub struct Env {
    overrides: Option<HashMap<String, String>>,
}

impl Env {
    /// Read from the process environment.
    pub fn real() -> Self {
        Self { overrides: None }
    }

    /// Read only from the given pairs.
    #[cfg(test)]
    pub fn mock(vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        Self {
            overrides: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn var(&self, name: &str) -> Result<String, std::env::VarError> {
        match &self.overrides {
            Some(map) => map.get(name).cloned().ok_or(std::env::VarError::NotPresent),
            None => std::env::var(name),
        }
    }

    /// Parse a variable. `None` when unset, `Some(Err(raw))` when it does
    /// not parse.
    pub fn parsed<T: FromStr>(&self, name: &str) -> Option<Result<T, String>> {
        let raw = self.var(name).ok()?;
        Some(raw.trim().parse::<T>().map_err(|_| raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_env_reads_cargo_manifest_dir() {
        assert!(Env::real().var("CARGO_MANIFEST_DIR").is_ok());
    }

    #[test]
    fn mock_env_only_sees_given_values() {
        let env = Env::mock([("FOO", "bar")]);
        assert_eq!(env.var("FOO").unwrap(), "bar");
        assert!(env.var("CARGO_MANIFEST_DIR").is_err());
    }

    #[test]
    fn parsed_distinguishes_unset_and_invalid() {
        let env = Env::mock([("N", " 42 "), ("BAD", "x")]);
        assert_eq!(env.parsed::<usize>("N"), Some(Ok(42)));
        assert_eq!(env.parsed::<usize>("BAD"), Some(Err("x".to_string())));
        assert_eq!(env.parsed::<usize>("MISSING"), None);
    }
}
