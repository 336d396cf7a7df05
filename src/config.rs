use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::plugin::LOCAL_PLUGIN_ID;

/// Service settings. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_plugin: String,
    pub max_body_bytes: usize,
    pub required_signed_headers: Vec<String>,
    /// `None` or `Some(0)` disables the age check.
    pub max_signature_age_secs: Option<u64>,
    pub max_clock_skew_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_plugin: LOCAL_PLUGIN_ID.to_owned(),
            max_body_bytes: 64 * 1024,
            required_signed_headers: vec!["(request-target)".to_owned()],
            max_signature_age_secs: Some(300),
            max_clock_skew_secs: 30,
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {name}: {value:?}"))
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Defaults (or `KMS_CONFIG`), overridden by `KMS_*` variables. The
    /// signature settings reach the authenticator through
    /// `KmsBuilder::signature_verifier` or `HttpSignatureAuthenticator::from_config`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = match var("KMS_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(plugin) = var("KMS_DEFAULT_PLUGIN") {
            config.default_plugin = plugin;
        }
        if let Some(v) = var("KMS_MAX_BODY_BYTES") {
            config.max_body_bytes = parse_var("KMS_MAX_BODY_BYTES", &v)?;
        }
        if let Some(v) = var("KMS_SIGNED_HEADERS") {
            config.required_signed_headers = v
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_ascii_lowercase)
                .collect();
        }
        if let Some(v) = var("KMS_SIGNATURE_MAX_AGE_SECS") {
            let secs: u64 = parse_var("KMS_SIGNATURE_MAX_AGE_SECS", &v)?;
            config.max_signature_age_secs = (secs > 0).then_some(secs);
        }
        if let Some(v) = var("KMS_CLOCK_SKEW_SECS") {
            config.max_clock_skew_secs = parse_var("KMS_CLOCK_SKEW_SECS", &v)?;
        }
        Ok(config)
    }

    pub fn max_signature_age(&self) -> Option<Duration> {
        self.max_signature_age_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_plugin, "local");
        assert_eq!(config.max_signature_age(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn env_overrides() {
        let config = from_map(&[
            ("KMS_DEFAULT_PLUGIN", "hsm"),
            ("KMS_MAX_BODY_BYTES", "1024"),
            ("KMS_SIGNED_HEADERS", "(request-target), Digest ,"),
            ("KMS_SIGNATURE_MAX_AGE_SECS", "0"),
            ("KMS_CLOCK_SKEW_SECS", " 5 "),
        ])
        .unwrap();
        assert_eq!(config.default_plugin, "hsm");
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.required_signed_headers, ["(request-target)", "digest"]);
        assert_eq!(config.max_signature_age(), None);
        assert_eq!(config.clock_skew(), Duration::from_secs(5));
    }

    #[test]
    fn bad_number_is_reported() {
        let err = from_map(&[("KMS_MAX_BODY_BYTES", "lots")]).unwrap_err();
        assert!(err.to_string().contains("KMS_MAX_BODY_BYTES"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"max_body_bytes": 10}"#).unwrap();
        assert_eq!(config.max_body_bytes, 10);
        assert_eq!(config.default_plugin, "local");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::from_file("/nonexistent/kms.json").is_err());
        assert!(from_map(&[("KMS_CONFIG", "/nonexistent/kms.json")]).is_err());
    }
}
