//! Bearer credential sources.
//!
//! The pipeline never refreshes credentials itself; it asks the provider for a token on every
//! call and surfaces a rejected token as [`Error::Auth`].

use crate::{Error, ErrorContext, Result};
use keyring::Entry;
use std::env;

pub trait CredentialProvider: Send + Sync {
    /// Current bearer token.
    fn bearer(&self) -> Result<String>;
}

/// A fixed token, mostly for tests and short-lived tools.
#[derive(Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticCredential(***)")
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Looks up the OS keyring first, then `<SERVICE>_API_KEY`.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    service: String,
}

impl EnvCredential {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn env_var_name(&self) -> String {
        format!("{}_API_KEY", self.service.to_uppercase().replace('-', "_"))
    }
}

impl CredentialProvider for EnvCredential {
    fn bearer(&self) -> Result<String> {
        // 1. Try Keyring
        if let Ok(entry) = Entry::new("ai-edit", &self.service) {
            if let Ok(key) = entry.get_password() {
                return Ok(key);
            }
        }

        // 2. Try Environment Variable
        let name = self.env_var_name();
        env::var(&name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                Error::auth_with_context(
                    "no credential available",
                    ErrorContext::new()
                        .with_details(format!("set {} or store a keyring entry", name))
                        .with_source("credentials"),
                )
            })
    }
}
