//! Back-office configuration sourced from environment variables.

use std::net::SocketAddr;

use anyhow::{Context, Result};

use invoicer_parties::business::LOGO_MAX_BYTES;

use crate::numbering::DEFAULT_MAX_ATTEMPTS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackOfficeConfig {
    pub bind_addr: SocketAddr,
    /// Bounded attempts when allocating an invoice number.
    pub number_max_attempts: u32,
    /// Base URL for verification and invitation links in emails.
    pub frontend_url: String,
    pub min_password_len: usize,
    pub logo_max_bytes: u64,
    /// Platform admin provisioned at startup when both are set.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    /// PostgreSQL connection string; the in-memory store is used when unset.
    pub database_url: Option<String>,
}

impl Default for BackOfficeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            number_max_attempts: DEFAULT_MAX_ATTEMPTS,
            frontend_url: "http://localhost:3000".to_string(),
            min_password_len: 8,
            logo_max_bytes: LOGO_MAX_BYTES,
            admin_email: None,
            admin_password: None,
            database_url: None,
        }
    }
}

impl BackOfficeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Missing keys
    /// keep their defaults; present but unparsable values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = match lookup("INVOICER_BIND") {
            Some(raw) => raw.parse().with_context(|| "parse INVOICER_BIND")?,
            None => defaults.bind_addr,
        };
        let number_max_attempts = match lookup("INVOICER_NUMBER_MAX_ATTEMPTS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| "parse INVOICER_NUMBER_MAX_ATTEMPTS")?,
            None => defaults.number_max_attempts,
        };
        let min_password_len = match lookup("INVOICER_MIN_PASSWORD_LEN") {
            Some(raw) => raw.trim().parse().with_context(|| "parse INVOICER_MIN_PASSWORD_LEN")?,
            None => defaults.min_password_len,
        };
        let logo_max_bytes = match lookup("INVOICER_LOGO_MAX_BYTES") {
            Some(raw) => raw.trim().parse().with_context(|| "parse INVOICER_LOGO_MAX_BYTES")?,
            None => defaults.logo_max_bytes,
        };
        let frontend_url = lookup("INVOICER_FRONTEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.frontend_url);

        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if number_max_attempts == 0 {
            anyhow::bail!("INVOICER_NUMBER_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            bind_addr,
            number_max_attempts,
            frontend_url,
            min_password_len,
            logo_max_bytes,
            admin_email: non_blank("INVOICER_ADMIN_EMAIL"),
            admin_password: non_blank("INVOICER_ADMIN_PASSWORD"),
            database_url: non_blank("DATABASE_URL"),
        })
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/verify-email?token={token}", self.frontend_url)
    }

    pub fn invitation_link(&self, token: &str) -> String {
        format!("{}/accept-invitation?token={token}", self.frontend_url)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = BackOfficeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BackOfficeConfig::default());
        assert_eq!(config.number_max_attempts, 5);
        assert_eq!(config.logo_max_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = BackOfficeConfig::from_lookup(lookup(&[
            ("INVOICER_BIND", "127.0.0.1:9000"),
            ("INVOICER_NUMBER_MAX_ATTEMPTS", "3"),
            ("INVOICER_FRONTEND_URL", "https://app.example.com/"),
            ("INVOICER_ADMIN_EMAIL", "root@example.com"),
            ("INVOICER_ADMIN_PASSWORD", "  "),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.number_max_attempts, 3);
        assert_eq!(
            config.verification_link("abc"),
            "https://app.example.com/verify-email?token=abc"
        );
        assert_eq!(config.admin_email.as_deref(), Some("root@example.com"));
        assert_eq!(config.admin_password, None);
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn database_url_selects_postgres() {
        let config =
            BackOfficeConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://invoicer@localhost/invoicer")]))
                .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://invoicer@localhost/invoicer"));
    }

    #[test]
    fn bad_values_are_reported() {
        let err = BackOfficeConfig::from_lookup(lookup(&[("INVOICER_MIN_PASSWORD_LEN", "eight")]))
            .unwrap_err();
        assert!(err.to_string().contains("INVOICER_MIN_PASSWORD_LEN"));
        assert!(BackOfficeConfig::from_lookup(lookup(&[("INVOICER_NUMBER_MAX_ATTEMPTS", "0")])).is_err());
    }
}
