use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::session::{FileCandidate, Rejection};

const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024; // 5MB

/// What the upload slot accepts: single image file, bounded size.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcceptPolicy {
    /// Maximum file size in bytes.
    pub max_file_size: u64,
    /// Content-type prefixes the slot accepts.
    pub accepted_type_prefixes: Vec<String>,
    /// Maximum number of files per selection.
    pub max_files: usize,
}

impl Default for AcceptPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            accepted_type_prefixes: vec!["image/".to_string()],
            max_files: 1,
        }
    }
}

impl AcceptPolicy {
    /// Validate a batch of candidates. Count is checked first, then each
    /// candidate's type and size.
    pub fn check(&self, candidates: &[FileCandidate]) -> Result<(), Rejection> {
        if candidates.len() > self.max_files {
            return Err(Rejection::TooManyFiles {
                count: candidates.len(),
            });
        }

        for candidate in candidates {
            self.check_one(candidate)?;
        }

        Ok(())
    }

    pub fn check_one(&self, candidate: &FileCandidate) -> Result<(), Rejection> {
        let accepted = self
            .accepted_type_prefixes
            .iter()
            .any(|prefix| candidate.content_type.starts_with(prefix.as_str()));
        if !accepted {
            return Err(Rejection::UnsupportedType {
                content_type: candidate.content_type.clone(),
            });
        }

        if candidate.size() > self.max_file_size {
            return Err(Rejection::SizeExceeded {
                size: candidate.size(),
                limit: self.max_file_size,
            });
        }

        Ok(())
    }
}

/// Server-side gateway knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Credential validity window in seconds.
    pub credential_expiry_secs: u64,
    /// Fixed-window rate limit: max requests per window per identity.
    pub rate_limit_max_requests: u32,
    /// Fixed-window length in seconds.
    pub rate_limit_window_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            credential_expiry_secs: 360, // 6 minutes
            rate_limit_max_requests: 5,
            rate_limit_window_secs: 60,
        }
    }
}

/// Endpoints the HTTP gateway client talks to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub upload_endpoint: String,
    pub delete_endpoint: String,
    pub auth_token: Option<String>,
}

/// Full configuration, loadable from a toml file and passed in explicitly.
/// There is no process-global config.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub accept: AcceptPolicy,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}
