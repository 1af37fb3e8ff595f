//! Finding the OCR server API key.

use std::{convert::Infallible, env, fmt, str::FromStr};

use crate::prelude::*;

/// Provider-specific environment variable for the API key.
pub const TYPHOON_API_KEY_VAR: &str = "TYPHOON_OCR_API_KEY";

/// Generic fallback environment variable for the API key.
pub const FALLBACK_API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Placeholder values that mean "no key given on the command line".
const PLACEHOLDER_KEYS: &[&str] = &["", "none", "dummy"];

/// An API key. Never printed in full.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    pub fn new(key: String) -> Self {
        Self(key)
    }

    /// The actual key, for sending to the server.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The key with everything but the last four characters hidden.
    pub fn masked(&self) -> String {
        let chars = self.0.chars().collect::<Vec<_>>();
        if chars.len() > 4 {
            let tail = chars[chars.len() - 4..].iter().collect::<String>();
            format!("{}{}", "*".repeat(chars.len() - 4), tail)
        } else {
            "****".to_owned()
        }
    }
}

impl FromStr for ApiKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.to_owned()))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.masked())
    }
}

/// Pick an API key, preferring the command line, then
/// [`TYPHOON_API_KEY_VAR`], then [`FALLBACK_API_KEY_VAR`].
pub fn resolve_api_key(provided: Option<&str>) -> Result<ApiKey> {
    resolve_api_key_with(provided, |name| env::var(name).ok())
}

/// Like [`resolve_api_key`], but with a custom environment lookup.
fn resolve_api_key_with(
    provided: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ApiKey> {
    if let Some(key) = provided {
        let lower = key.trim().to_lowercase();
        if !PLACEHOLDER_KEYS.contains(&lower.as_str()) {
            return Ok(ApiKey::new(key.to_owned()));
        }
    }
    for var in [TYPHOON_API_KEY_VAR, FALLBACK_API_KEY_VAR] {
        if let Some(key) = lookup(var).filter(|key| !key.is_empty()) {
            debug!(var, "Using API key from environment");
            return Ok(ApiKey::new(key));
        }
    }
    Err(anyhow!(
        "No API key found. Provide one with --api-key, or set {} or {}",
        TYPHOON_API_KEY_VAR,
        FALLBACK_API_KEY_VAR,
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn command_line_key_wins() {
        let key = resolve_api_key_with(
            Some("sk-cli"),
            lookup(&[(TYPHOON_API_KEY_VAR, "sk-typhoon")]),
        )
        .unwrap();
        assert_eq!(key.expose(), "sk-cli");
    }

    #[test]
    fn placeholder_keys_are_ignored() {
        for placeholder in ["", "None", "DUMMY"] {
            let key = resolve_api_key_with(
                Some(placeholder),
                lookup(&[(TYPHOON_API_KEY_VAR, "sk-typhoon")]),
            )
            .unwrap();
            assert_eq!(key.expose(), "sk-typhoon");
        }
    }

    #[test]
    fn provider_variable_beats_fallback() {
        let key = resolve_api_key_with(
            None,
            lookup(&[
                (TYPHOON_API_KEY_VAR, "sk-typhoon"),
                (FALLBACK_API_KEY_VAR, "sk-openai"),
            ]),
        )
        .unwrap();
        assert_eq!(key.expose(), "sk-typhoon");

        let key =
            resolve_api_key_with(None, lookup(&[(FALLBACK_API_KEY_VAR, "sk-openai")]))
                .unwrap();
        assert_eq!(key.expose(), "sk-openai");
    }

    #[test]
    fn missing_key_is_an_error() {
        assert!(resolve_api_key_with(Some("none"), lookup(&[])).is_err());
        assert!(
            resolve_api_key_with(None, lookup(&[(TYPHOON_API_KEY_VAR, "")])).is_err()
        );
    }

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(ApiKey::new("sk-12345678".to_owned()).masked(), "*******5678");
        assert_eq!(ApiKey::new("abcd".to_owned()).masked(), "****");
        assert_eq!(
            format!("{:?}", ApiKey::new("secret-key".to_owned())),
            "ApiKey(******-key)"
        );
    }
}
