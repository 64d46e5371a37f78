use crate::action::DEFAULT_RETRY_CAP;
use crate::error::{Result, WaybillError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable that overrides `backend.api_key`.
pub const API_KEY_ENV: &str = "WAYBILL_API_KEY";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// How blobs reach object storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Upload straight to the storage API with upsert enabled.
    #[default]
    Direct,
    /// Ask the API for a pre-authorized upload URL, then PUT to it.
    SignedUrl,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub upload_mode: UploadMode,
}

impl BackendConfig {
    /// API key from the environment, falling back to the config file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_retry_cap")]
    pub retry_cap: u32,
}

fn default_retry_cap() -> u32 {
    DEFAULT_RETRY_CAP
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_cap: default_retry_cap(),
        }
    }
}

// ---------------------------------------------------------------------------
// TargetsConfig
// ---------------------------------------------------------------------------

/// Backend collection and bucket names the executor writes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default = "default_deliveries")]
    pub deliveries: String,
    #[serde(default = "default_signature_bucket")]
    pub signature_bucket: String,
    #[serde(default = "default_photo_bucket")]
    pub photo_bucket: String,
}

fn default_deliveries() -> String {
    "deliveries".to_string()
}

fn default_signature_bucket() -> String {
    "signatures".to_string()
}

fn default_photo_bucket() -> String {
    "damages".to_string()
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            deliveries: default_deliveries(),
            signature_bucket: default_signature_bucket(),
            photo_bucket: default_photo_bucket(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            backend: BackendConfig::default(),
            sync: SyncConfig::default(),
            targets: TargetsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(WaybillError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// The backend URL, or a `Config` error when it is missing.
    pub fn backend_url(&self) -> Result<&str> {
        self.backend
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| WaybillError::Config("backend.url is not set".into()))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.sync.retry_cap == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "sync.retry_cap is 0: queued actions would never be attempted".into(),
            });
        }

        match self.backend.url.as_deref().map(str::trim) {
            None | Some("") => warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "backend.url is not set: queued actions cannot be synced".into(),
            }),
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("backend.url '{url}' must start with http:// or https://"),
                })
            }
            Some(_) => {}
        }

        if self.backend.api_key().is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "no backend api key: set backend.api_key or {API_KEY_ENV}"
                ),
            });
        }

        for (name, value) in [
            ("targets.deliveries", &self.targets.deliveries),
            ("targets.signature_bucket", &self.targets.signature_bucket),
            ("targets.photo_bucket", &self.targets.photo_bucket),
        ] {
            if value.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name} is empty"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.sync.retry_cap, 3);
        assert_eq!(parsed.targets, TargetsConfig::default());
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let parsed: Config = serde_yaml::from_str("backend:\n  url: https://x.supabase.co\n").unwrap();
        assert_eq!(parsed.backend.upload_mode, UploadMode::Direct);
        assert_eq!(parsed.sync.retry_cap, DEFAULT_RETRY_CAP);
        assert_eq!(parsed.targets.signature_bucket, "signatures");
        assert_eq!(parsed.targets.photo_bucket, "damages");
    }

    #[test]
    fn upload_mode_is_snake_case() {
        let parsed: Config =
            serde_yaml::from_str("backend:\n  upload_mode: signed_url\n").unwrap();
        assert_eq!(parsed.backend.upload_mode, UploadMode::SignedUrl);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(Config::load(dir.path()), Err(WaybillError::NotInitialized)));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.backend.url = Some("https://example.supabase.co".into());
        cfg.sync.retry_cap = 5;
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.backend_url().unwrap(), "https://example.supabase.co");
        assert_eq!(loaded.sync.retry_cap, 5);
    }

    #[test]
    fn validate_flags_zero_retry_cap_and_missing_url() {
        let mut cfg = Config::default();
        cfg.sync.retry_cap = 0;
        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect();
        assert!(errors.iter().any(|m| m.contains("retry_cap")), "{errors:?}");
        assert!(errors.iter().any(|m| m.contains("backend.url")), "{errors:?}");
    }

    #[test]
    fn validate_rejects_non_http_url() {
        let mut cfg = Config::default();
        cfg.backend.url = Some("ftp://nope".into());
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("http://")));
    }

    #[test]
    fn backend_url_missing_is_config_error() {
        let cfg = Config::default();
        assert!(matches!(cfg.backend_url(), Err(WaybillError::Config(_))));
    }
}
