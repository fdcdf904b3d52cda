use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::job::JobIdScheme;

/// Global configuration loaded from `~/.config/bdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BdmConfig {
    /// Maximum number of downloads running at once.
    pub max_concurrency: usize,
    /// Read/write buffer size per worker, in bytes.
    pub chunk_size_bytes: usize,
    /// Connection timeout for the HTTP transport, in seconds.
    pub connect_timeout_secs: u64,
    /// Where downloaded files go (None = current directory).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// How job ids are derived: "positional" (default) or "url_digest".
    #[serde(default)]
    pub job_ids: JobIdScheme,
}

impl Default for BdmConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            chunk_size_bytes: crate::worker::DEFAULT_CHUNK_SIZE,
            connect_timeout_secs: 30,
            download_dir: None,
            job_ids: JobIdScheme::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = BdmConfig::default();
        assert_eq!(cfg.max_concurrency, 4);
        assert_eq!(cfg.chunk_size_bytes, 256 * 1024);
        assert_eq!(cfg.connect_timeout_secs, 30);
        assert!(cfg.download_dir.is_none());
        assert_eq!(cfg.job_ids, JobIdScheme::Positional);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = BdmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: BdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrency, cfg.max_concurrency);
        assert_eq!(parsed.chunk_size_bytes, cfg.chunk_size_bytes);
        assert_eq!(parsed.job_ids, cfg.job_ids);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            max_concurrency = 2
            chunk_size_bytes = 65536
            connect_timeout_secs = 10
            download_dir = "/srv/mirror"
            job_ids = "url_digest"
        "#;
        let cfg: BdmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrency, 2);
        assert_eq!(cfg.chunk_size_bytes, 65536);
        assert_eq!(cfg.connect_timeout_secs, 10);
        assert_eq!(cfg.download_dir, Some(PathBuf::from("/srv/mirror")));
        assert_eq!(cfg.job_ids, JobIdScheme::UrlDigest);
    }

    #[test]
    fn config_toml_optional_sections_default() {
        let toml = r#"
            max_concurrency = 8
            chunk_size_bytes = 1024
            connect_timeout_secs = 5
        "#;
        let cfg: BdmConfig = toml::from_str(toml).unwrap();
        assert!(cfg.download_dir.is_none());
        assert_eq!(cfg.job_ids, JobIdScheme::Positional);
    }
}
