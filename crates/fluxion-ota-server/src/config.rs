// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz


use anyhow::{Context, Result, bail};
use axum::http::HeaderName;
use fluxion_firmware_repo::ComparatorKind;
use fluxion_firmware_repo::release::DEFAULT_BINARY_SUFFIX;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub endpoints: EndpointSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_auth_header")]
    pub header: String,
    pub shared_secret: String,
}

/// Which endpoints demand the shared secret
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EndpointSettings {
    #[serde(default = "default_true")]
    pub upload_requires_auth: bool,
    #[serde(default = "default_true")]
    pub check_update_requires_auth: bool,
    /// Devices fetch binaries without credentials unless turned on
    #[serde(default)]
    pub download_requires_auth: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySettings {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_binary_suffix")]
    pub binary_suffix: String,
    #[serde(default)]
    pub comparator: ComparatorKind,
    #[serde(default)]
    pub reject_older_versions: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    3003
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_auth_header() -> String {
    "X-API-KEY".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_root() -> PathBuf {
    PathBuf::from("./firmware")
}

fn default_binary_suffix() -> String {
    DEFAULT_BINARY_SUFFIX.to_owned()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            upload_requires_auth: true,
            check_update_requires_auth: true,
            download_requires_auth: false,
        }
    }
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            binary_suffix: default_binary_suffix(),
            comparator: ComparatorKind::default(),
            reject_older_versions: false,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.auth.shared_secret.is_empty()
            || self.auth.shared_secret == "change-me-to-a-strong-random-secret"
        {
            bail!("auth.shared_secret must be set to a strong random value");
        }
        HeaderName::try_from(self.auth.header.as_str())
            .with_context(|| format!("auth.header is not a valid header name: {}", self.auth.header))?;
        if self.repository.binary_suffix.is_empty() {
            bail!("repository.binary_suffix must not be empty");
        }
        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            [auth]
            shared_secret = "ABCD1234"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 3003);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.auth.header, "X-API-KEY");
        assert!(config.endpoints.upload_requires_auth);
        assert!(config.endpoints.check_update_requires_auth);
        assert!(!config.endpoints.download_requires_auth);
        assert_eq!(config.repository.root, PathBuf::from("./firmware"));
        assert_eq!(config.repository.binary_suffix, ".bin");
        assert_eq!(config.repository.comparator, ComparatorKind::Lexicographic);
        assert!(!config.repository.reject_older_versions);
    }

    #[test]
    fn test_full_config() {
        let config = ServerConfig::from_toml(
            r#"
            [server]
            bind_address = "127.0.0.1"
            port = 8200
            max_upload_bytes = 1024

            [auth]
            header = "X-Fleet-Token"
            shared_secret = "s3cret"

            [endpoints]
            download_requires_auth = true

            [repository]
            root = "/data/firmware"
            binary_suffix = ".img"
            comparator = "numeric"
            reject_older_versions = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8200);
        assert_eq!(config.server.max_upload_bytes, 1024);
        assert_eq!(config.auth.header, "X-Fleet-Token");
        assert!(config.endpoints.download_requires_auth);
        assert!(config.endpoints.upload_requires_auth);
        assert_eq!(config.repository.root, PathBuf::from("/data/firmware"));
        assert_eq!(config.repository.comparator, ComparatorKind::Numeric);
        assert!(config.repository.reject_older_versions);
    }

    #[test]
    fn test_rejects_missing_or_placeholder_secret() {
        assert!(ServerConfig::from_toml("[auth]\nshared_secret = \"\"").is_err());
        assert!(
            ServerConfig::from_toml(
                "[auth]\nshared_secret = \"change-me-to-a-strong-random-secret\""
            )
            .is_err()
        );
        assert!(ServerConfig::from_toml("[server]\nport = 1").is_err());
    }

    #[test]
    fn test_rejects_bad_header_and_suffix() {
        assert!(
            ServerConfig::from_toml("[auth]\nheader = \"bad header\"\nshared_secret = \"x\"")
                .is_err()
        );
        assert!(
            ServerConfig::from_toml(
                "[auth]\nshared_secret = \"x\"\n[repository]\nbinary_suffix = \"\""
            )
            .is_err()
        );
    }
}
