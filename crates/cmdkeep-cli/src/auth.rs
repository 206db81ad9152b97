//! GitHub token resolution with secure keychain persistence.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "cmdkeep-cli";

/// Environment variables checked, in order, before the keychain.
pub const TOKEN_ENV_VARS: [&str; 2] = ["CMDKEEP_GITHUB_TOKEN", "GITHUB_TOKEN"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment(&'static str),
    Keychain,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment(name) => write!(f, "environment ({name})"),
            Self::Keychain => f.write_str("keychain"),
        }
    }
}

#[derive(Clone)]
struct TokenStore {
    username: String,
}

impl TokenStore {
    fn new(profile_name: &str) -> Self {
        Self {
            username: format!("github_token:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, CliError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| CliError::Auth(error.to_string()))
    }

    #[cfg(not(test))]
    fn load(&self) -> Result<Option<String>, CliError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(CliError::Auth(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load(&self) -> Result<Option<String>, CliError> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    fn save(&self, token: &str) -> Result<(), CliError> {
        self.entry()?
            .set_password(token)
            .map_err(|error| CliError::Auth(error.to_string()))
    }

    #[cfg(test)]
    fn save(&self, token: &str) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn clear(&self) -> Result<bool, CliError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(error) => Err(CliError::Auth(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear(&self) -> Result<bool, CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        Ok(guard.remove(&self.username).is_some())
    }
}

fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Find the token to sync with: environment first, then the profile's keychain entry.
pub fn resolve_token(profile_name: &str) -> Result<Option<(String, TokenSource)>, CliError> {
    for name in TOKEN_ENV_VARS {
        if let Some(token) = std::env::var(name).ok().as_deref().and_then(normalize_token) {
            return Ok(Some((token, TokenSource::Environment(name))));
        }
    }

    Ok(load_stored_token(profile_name)?.map(|token| (token, TokenSource::Keychain)))
}

pub fn load_stored_token(profile_name: &str) -> Result<Option<String>, CliError> {
    Ok(TokenStore::new(profile_name)
        .load()?
        .as_deref()
        .and_then(normalize_token))
}

pub fn store_token(profile_name: &str, token: &str) -> Result<(), CliError> {
    let token = normalize_token(token)
        .ok_or_else(|| CliError::Auth("GitHub token cannot be empty".to_string()))?;
    TokenStore::new(profile_name).save(&token)?;
    tracing::debug!(profile = profile_name, "Stored GitHub token in keychain");
    Ok(())
}

/// Returns whether a stored token existed.
pub fn clear_stored_token(profile_name: &str) -> Result<bool, CliError> {
    TokenStore::new(profile_name).clear()
}

/// Show only enough of a token to recognise it.
pub fn mask_token(token: &str) -> String {
    let visible = token.chars().take(4).collect::<String>();
    if token.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_token_roundtrip_is_per_profile() {
        store_token("auth-test-a", "  ghp_abcdefghijkl  ").unwrap();

        assert_eq!(
            load_stored_token("auth-test-a").unwrap().as_deref(),
            Some("ghp_abcdefghijkl")
        );
        assert_eq!(load_stored_token("auth-test-b").unwrap(), None);

        assert!(clear_stored_token("auth-test-a").unwrap());
        assert!(!clear_stored_token("auth-test-a").unwrap());
        assert_eq!(load_stored_token("auth-test-a").unwrap(), None);
    }

    #[test]
    fn store_token_rejects_blank_tokens() {
        let error = store_token("auth-test-blank", "   ").unwrap_err();
        assert!(matches!(error, CliError::Auth(_)));
    }

    #[test]
    fn mask_token_hides_most_characters() {
        assert_eq!(mask_token("ghp_abcdefghijkl"), "ghp_****");
        assert_eq!(mask_token("short"), "****");
    }

    #[test]
    fn token_source_display() {
        assert_eq!(
            TokenSource::Environment("GITHUB_TOKEN").to_string(),
            "environment (GITHUB_TOKEN)"
        );
        assert_eq!(TokenSource::Keychain.to_string(), "keychain");
    }
}
