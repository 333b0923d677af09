//! Bearer tokens for inference servers that require authentication.
//!
//! Tokens are wrapped in [`SecretString`] as soon as they are read, cannot
//! appear in `Debug`/`Display` output, and are exposed only when the
//! `Authorization` header is built.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::BackendError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from an environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely stored backend token.
pub struct BackendCredential {
    value: SecretString,
    source: CredentialSource,
    name: String,
}

impl BackendCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name: name.into(),
        }
    }

    /// Load a token from an environment variable. The value is not logged.
    pub fn from_env(env_var: &str) -> Result<Self, BackendError> {
        std::env::var(env_var)
            .map(|v| Self::new(v, CredentialSource::Environment, env_var))
            .map_err(|_| {
                BackendError::NotConfigured(format!(
                    "backend token not set: configure '{}' environment variable",
                    env_var
                ))
            })
    }

    /// Expose the token. Call only where the header is built.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for BackendCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for BackendCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted_in_debug() {
        let secret = "tok-super-secret-12345";
        let cred = BackendCredential::new(secret, CredentialSource::Programmatic, "TEST_TOKEN");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_credential_redacted_in_display() {
        let secret = "tok-super-secret-12345";
        let cred = BackendCredential::new(secret, CredentialSource::Environment, "TEST_TOKEN");

        let display = cred.to_string();
        assert!(!display.contains(secret));
        assert!(display.contains("TEST_TOKEN"));
        assert!(display.contains("environment"));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("TRIAGE_TEST_BACKEND_TOKEN", "env-token");
        let cred = BackendCredential::from_env("TRIAGE_TEST_BACKEND_TOKEN").unwrap();
        assert_eq!(cred.expose(), "env-token");
        assert_eq!(cred.source(), CredentialSource::Environment);
        std::env::remove_var("TRIAGE_TEST_BACKEND_TOKEN");
    }

    #[test]
    fn test_from_env_missing() {
        let err = BackendCredential::from_env("TRIAGE_NONEXISTENT_TOKEN_12345").unwrap_err();
        assert!(err.to_string().contains("TRIAGE_NONEXISTENT_TOKEN_12345"));
    }
}
