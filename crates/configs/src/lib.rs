//! # configs
//!
//! Layered settings for the wayfarer binaries.
//!
//! Sources, later ones winning:
//! 1. compiled defaults,
//! 2. `config/default.toml`, then `config/{WAYFARER_ENV}.toml` (both optional),
//! 3. `WAYFARER__SECTION__KEY` environment variables, after loading `.env`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "WAYFARER";
pub const PROFILE_VAR: &str = "WAYFARER_ENV";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub blobs: BlobSettings,
    pub map: MapSettings,
    pub points: PointSettings,
    pub routes: RouteSettings,
    pub log: LogSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// JSON snapshot the in-memory store is loaded from and saved to.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BlobSettings {
    pub root: PathBuf,
    pub url_prefix: String,
}

impl Default for BlobSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/blobs"),
            url_prefix: "/blobs".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Key for the map SDK and the geocoder. Without it the map is unavailable.
    #[serde(deserialize_with = "optional_secret")]
    pub api_key: Option<SecretString>,
    /// Where a route without points opens when its city cannot be geocoded.
    pub default_center: CenterSettings,
    pub default_zoom: u8,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            default_center: CenterSettings::default(),
            default_zoom: 13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CenterSettings {
    pub lat: f64,
    pub lng: f64,
}

impl Default for CenterSettings {
    fn default() -> Self {
        Self {
            lat: 55.751244,
            lng: 37.618423,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapMode {
    #[default]
    Atomic,
    Sequential,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PointSettings {
    pub swap_strategy: SwapMode,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub default_page_size: usize,
    pub favorites_overfetch_min: usize,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            favorites_overfetch_min: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info,services=debug`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

/// Where [`Settings::load_from`] looks.
#[derive(Debug, Clone)]
pub struct Sources<'a> {
    pub dir: &'a Path,
    pub profile: Option<&'a str>,
    pub env_prefix: &'a str,
}

impl Settings {
    /// Reads `.env`, then `config/` relative to the working directory and `WAYFARER__*`.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal outside development.
        let _ = dotenvy::dotenv();
        let profile = std::env::var(PROFILE_VAR).ok();
        Self::load_from(Sources {
            dir: Path::new("config"),
            profile: profile.as_deref(),
            env_prefix: ENV_PREFIX,
        })
    }

    pub fn load_from(sources: Sources<'_>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::from(sources.dir.join("default")).required(false));
        if let Some(profile) = sources.profile.filter(|p| !p.is_empty()) {
            builder = builder.add_source(File::from(sources.dir.join(profile)).required(false));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(sources.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        debug!(profile = ?sources.profile, "configuration loaded");
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let CenterSettings { lat, lng } = self.map.default_center;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ConfigError::Invalid(format!(
                "map.default_center ({lat}, {lng}) is not a valid coordinate"
            )));
        }
        if self.routes.default_page_size == 0 {
            return Err(ConfigError::Invalid("routes.default_page_size must be positive".into()));
        }
        Ok(())
    }
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wayfarer-configs-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn defaults_apply_without_any_source() {
        let dir = scratch_dir("empty");
        let settings = Settings::load_from(Sources {
            dir: &dir,
            profile: None,
            env_prefix: "WAYFARER_TEST_EMPTY",
        })
        .unwrap();

        assert!(settings.map.api_key.is_none());
        assert_eq!(settings.map.default_zoom, 13);
        assert_eq!(settings.map.default_center, CenterSettings::default());
        assert_eq!(settings.blobs.url_prefix, "/blobs");
        assert_eq!(settings.points.swap_strategy, SwapMode::Atomic);
        assert_eq!(settings.routes.default_page_size, 20);
        assert_eq!(settings.routes.favorites_overfetch_min, 60);
        assert_eq!(settings.log.filter, "info");
    }

    #[test]
    fn profile_file_and_environment_override_defaults() {
        let dir = scratch_dir("layered");
        fs::write(
            dir.join("default.toml"),
            "[points]\nswap_strategy = \"sequential\"\n[routes]\ndefault_page_size = 12\n",
        )
        .unwrap();
        fs::write(dir.join("staging.toml"), "[routes]\ndefault_page_size = 30\n").unwrap();
        std::env::set_var("WAYFARER_TEST_LAYERED__MAP__API_KEY", "map-key-123");
        std::env::set_var("WAYFARER_TEST_LAYERED__MAP__DEFAULT_ZOOM", "11");
        std::env::set_var("WAYFARER_TEST_LAYERED__BLOBS__URL_PREFIX", "/media");

        let settings = Settings::load_from(Sources {
            dir: &dir,
            profile: Some("staging"),
            env_prefix: "WAYFARER_TEST_LAYERED",
        })
        .unwrap();

        assert_eq!(settings.points.swap_strategy, SwapMode::Sequential);
        assert_eq!(settings.routes.default_page_size, 30);
        assert_eq!(settings.map.default_zoom, 11);
        assert_eq!(settings.blobs.url_prefix, "/media");
        assert_eq!(
            settings.map.api_key.as_ref().map(|k| k.expose_secret().to_owned()).as_deref(),
            Some("map-key-123")
        );
    }

    #[test]
    fn out_of_range_center_is_rejected() {
        let dir = scratch_dir("invalid");
        fs::write(dir.join("default.toml"), "[map.default_center]\nlat = 120.0\nlng = 30.0\n").unwrap();
        let err = Settings::load_from(Sources {
            dir: &dir,
            profile: None,
            env_prefix: "WAYFARER_TEST_INVALID",
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
