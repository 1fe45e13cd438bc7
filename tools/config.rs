use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use collection::{Selection, TrackSort};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
const CONFIG_ENV: &str = "COLLECTION_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "collection.yaml";
const DEFAULT_CATALOG_FILE: &str = "catalog.redb";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub version: u32,
    /// redb catalog file, relative paths are taken from the config's directory.
    pub catalog_path: String,
    /// JSON catalog dump loaded into the catalog before indexing. Empty to skip.
    pub import_path: String,
    pub track_sort: TrackSort,
    pub include_non_music: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            catalog_path: DEFAULT_CATALOG_FILE.to_string(),
            import_path: String::new(),
            track_sort: TrackSort::Alphabetical,
            include_non_music: false,
        }
    }
}

impl CollectionConfig {
    pub fn catalog_file(&self, config_path: &Path) -> PathBuf {
        relative_to_config(config_path, &self.catalog_path)
    }

    pub fn import_file(&self, config_path: &Path) -> Option<PathBuf> {
        if self.import_path.is_empty() {
            None
        } else {
            Some(relative_to_config(config_path, &self.import_path))
        }
    }

    pub fn selection(&self) -> Selection {
        if self.include_non_music {
            Selection::All
        } else {
            Selection::PlayableAudio
        }
    }
}

/// Failure to read, parse, or write the config file at `path`.
#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, err: std::io::Error },
    Yaml { path: PathBuf, err: serde_yaml::Error },
    Write { path: PathBuf, err: std::io::Error },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, err } => write!(f, "cannot read {:?}: {}", path, err),
            ConfigError::Yaml { path, err } => write!(f, "yaml error in {:?}: {}", path, err),
            ConfigError::Write { path, err } => write!(f, "cannot write {:?}: {}", path, err),
        }
    }
}

impl std::error::Error for ConfigError {}

/// `--config` wins, then `COLLECTION_CONFIG`, then `collection.yaml` in the
/// working directory.
pub fn locate_config(explicit: Option<String>) -> PathBuf {
    let from_env = env::var(CONFIG_ENV).ok();
    explicit
        .into_iter()
        .chain(from_env)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Loads the config at `path`, writing a default one there first if the file
/// does not exist. The flag reports whether it was created.
pub fn load_or_create_config(path: &Path) -> Result<(CollectionConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            err,
        })?;
        let config: CollectionConfig =
            serde_yaml::from_str(&contents).map_err(|err| ConfigError::Yaml {
                path: path.to_path_buf(),
                err,
            })?;
        return Ok((normalize(config), false));
    }

    let config = CollectionConfig::default();
    let contents = serde_yaml::to_string(&config).map_err(|err| ConfigError::Yaml {
        path: path.to_path_buf(),
        err,
    })?;
    let write_err = |err: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        err,
    };
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)?;
    Ok((config, true))
}

fn relative_to_config(config_path: &Path, value: &str) -> PathBuf {
    let raw = Path::new(value);
    match config_path.parent() {
        Some(dir) if raw.is_relative() => dir.join(raw),
        _ => raw.to_path_buf(),
    }
}

fn normalize(mut config: CollectionConfig) -> CollectionConfig {
    if config.version < CONFIG_VERSION {
        config.version = CONFIG_VERSION;
    }
    config.catalog_path = config.catalog_path.trim().to_string();
    if config.catalog_path.is_empty() {
        config.catalog_path = DEFAULT_CATALOG_FILE.to_string();
    }
    config.import_path = config.import_path.trim().to_string();
    config
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{load_or_create_config, locate_config, normalize, CollectionConfig, CONFIG_VERSION};
    use collection::{Selection, TrackSort};

    #[test]
    fn missing_keys_take_defaults() {
        let config: CollectionConfig = serde_yaml::from_str("track_sort: duration\n").unwrap();
        let config = normalize(config);
        assert_eq!(config.catalog_path, "catalog.redb");
        assert_eq!(config.track_sort, TrackSort::Duration);
        assert_eq!(config.selection(), Selection::PlayableAudio);
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn blank_paths_are_normalized() {
        let config = CollectionConfig {
            version: 0,
            catalog_path: "  ".to_string(),
            import_path: " dump.json ".to_string(),
            ..CollectionConfig::default()
        };
        let config = normalize(config);
        assert_eq!(config.catalog_path, "catalog.redb");
        assert_eq!(config.import_path, "dump.json");
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn files_resolve_against_config_dir() {
        let config_path = Path::new("/etc/collection/collection.yaml");
        let mut config = CollectionConfig::default();
        assert_eq!(
            config.catalog_file(config_path),
            PathBuf::from("/etc/collection/catalog.redb")
        );
        assert_eq!(config.import_file(config_path), None);

        config.catalog_path = "/var/lib/catalog.redb".to_string();
        config.import_path = "dump.json".to_string();
        assert_eq!(
            config.catalog_file(config_path),
            PathBuf::from("/var/lib/catalog.redb")
        );
        assert_eq!(
            config.import_file(config_path),
            Some(PathBuf::from("/etc/collection/dump.json"))
        );
        assert_eq!(
            config.catalog_file(Path::new("collection.yaml")),
            PathBuf::from("/var/lib/catalog.redb")
        );
    }

    #[test]
    fn explicit_config_path_wins() {
        assert_eq!(
            locate_config(Some("/tmp/other.yaml".to_string())),
            PathBuf::from("/tmp/other.yaml")
        );
    }

    #[test]
    fn missing_config_is_created_then_loaded() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("collection-config-{}", nanos));
        let path = dir.join("collection.yaml");

        let (created, was_created) = load_or_create_config(&path).unwrap();
        assert!(was_created);
        assert_eq!(created, CollectionConfig::default());

        let (loaded, was_created) = load_or_create_config(&path).unwrap();
        assert!(!was_created);
        assert_eq!(loaded, created);
        let _ = std::fs::remove_dir_all(dir);
    }
}
