//! # Relaycast Configuration Module
//!
//! This module provides configuration management for Relaycast, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use relayconfig::get_config;
//!
//! // Get the global configuration
//! let config = get_config();
//!
//! // Access configuration values
//! let port = config.get_http_port();
//! let playlist = config.get_playlist();
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("relaycast.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Relaycast configuration"));
}

const ENV_CONFIG_DIR: &str = "RELAYCAST_CONFIG";
const ENV_PREFIX: &str = "RELAYCAST_CONFIG__";

// Default values for configuration
const DEFAULT_HTTP_PORT: u16 = 3000;
const DEFAULT_PAUSE_SECS: u64 = 2;
const DEFAULT_AUTOSTART: bool = true;
const DEFAULT_AUTOSTART_DELAY_SECS: u64 = 5;
const DEFAULT_DURATION_SECS: u64 = 600;
const DEFAULT_SAFETY_MARGIN_SECS: u64 = 90;
const DEFAULT_RESET_STATS_ON_START: bool = false;
const DEFAULT_RESOLVER_BASE_URL: &str = "https://api.vreden.my.id";
const DEFAULT_RESOLVER_MAX_RETRIES: u32 = 2;
const DEFAULT_RESOLVER_RETRY_BASE_DELAY_MS: u64 = 500;

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap(),
                Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap().max(0) as u64,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            let n = Number::from(value);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for Relaycast
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(".relaycast").exists() {
            return ".relaycast".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".relaycast");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        ".relaycast".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("Config path is not a directory"));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `RELAYCAST_CONFIG` environment variable
    /// 3. `.relaycast` in the current directory
    /// 4. `.relaycast` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for
    /// read/write permissions.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created or validated
    pub fn config_dir(directory: &str) -> String {
        let dir_path = Self::find_config_dir(directory);
        let path = Path::new(&dir_path);

        Self::validate_config_dir(path).expect("Failed to validate configuration directory");

        dir_path
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory);
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file=%path, "Loaded config file");
            data
        } else {
            info!(config_file=%path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["server", "http_port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()?;
        Ok(())
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key.clone());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["relay", "pause_secs"]`)
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                let key_path = key
                    .trim_start_matches(ENV_PREFIX)
                    .split("__")
                    .collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        let new_key = Value::String(s.to_lowercase());
                        let new_val = Self::lower_keys_value(v);
                        new_map.insert(new_key, new_val);
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a relative or absolute path and creates the directory if needed
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);

        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            // Relative paths resolve against the config directory
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory=%absolute_path.display(), "Created directory");
        }

        Ok(absolute_path.to_string_lossy().to_string())
    }

    /// Gets the staging directory for downloaded content
    ///
    /// The directory may be absolute or relative to the configuration
    /// directory. It is created if it does not exist.
    pub fn get_download_dir(&self) -> Result<String> {
        let dir_path = match self.get_value(&["relay", "download_dir"]) {
            Ok(Value::String(s)) => s,
            _ => {
                self.set_value(
                    &["relay", "download_dir"],
                    Value::String("downloads".to_string()),
                )?;
                "downloads".to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    /// Gets the HTTP port for the control surface
    ///
    /// Returns the configured HTTP port, or the default port (3000) if not
    /// configured or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["server", "http_port"]) {
            Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap() as u16,
            Ok(Value::String(s)) => match s.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(
                        "Invalid HTTP port '{}', using default {}",
                        s,
                        DEFAULT_HTTP_PORT
                    );
                    DEFAULT_HTTP_PORT
                }
            },
            _ => DEFAULT_HTTP_PORT,
        }
    }

    /// Sets the HTTP port in configuration
    pub fn set_http_port(&self, port: u16) -> Result<()> {
        let n = Number::from(port);
        self.set_value(&["server", "http_port"], Value::Number(n))
    }

    /// Gets the ordered playlist of media URLs
    ///
    /// Returns the configured playlist, or an empty list if the key is
    /// missing or malformed. The relay refuses to start on an empty playlist,
    /// so the embedded default always ships a non-empty one.
    pub fn get_playlist(&self) -> Vec<String> {
        match self.get_value(&["relay", "playlist"]) {
            Ok(Value::Sequence(seq)) => seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Replaces the playlist in configuration
    pub fn set_playlist(&self, urls: Vec<String>) -> Result<()> {
        let seq = urls.into_iter().map(Value::String).collect();
        self.set_value(&["relay", "playlist"], Value::Sequence(seq))
    }

    /// Gets the transport sink endpoint as (host, port, stream_id)
    pub fn get_sink(&self) -> Result<(String, u16, String)> {
        let host = match self.get_value(&["sink", "host"])? {
            Value::String(s) if !s.is_empty() => s,
            _ => return Err(anyhow!("sink.host is not configured")),
        };
        let port = match self.get_value(&["sink", "port"])? {
            Value::Number(n) if n.is_i64() => n.as_i64().unwrap() as u16,
            _ => return Err(anyhow!("sink.port is not configured")),
        };
        let stream_id = match self.get_value(&["sink", "stream_id"])? {
            Value::String(s) if !s.is_empty() => s,
            _ => return Err(anyhow!("sink.stream_id is not configured")),
        };
        Ok((host, port, stream_id))
    }

    /// Gets the resolver API base URL
    pub fn get_resolver_base_url(&self) -> String {
        match self.get_value(&["resolver", "base_url"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => DEFAULT_RESOLVER_BASE_URL.to_string(),
        }
    }

    /// Gets the per-strategy retry count for the resolver
    pub fn get_resolver_max_retries(&self) -> u32 {
        match self.get_value(&["resolver", "max_retries"]) {
            Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap() as u32,
            _ => DEFAULT_RESOLVER_MAX_RETRIES,
        }
    }

    impl_u64_config!(
        get_pause_secs,
        set_pause_secs,
        &["relay", "pause_secs"],
        DEFAULT_PAUSE_SECS
    );

    impl_u64_config!(
        get_autostart_delay_secs,
        set_autostart_delay_secs,
        &["relay", "autostart_delay_secs"],
        DEFAULT_AUTOSTART_DELAY_SECS
    );

    impl_u64_config!(
        get_default_duration_secs,
        set_default_duration_secs,
        &["relay", "default_duration_secs"],
        DEFAULT_DURATION_SECS
    );

    impl_u64_config!(
        get_safety_margin_secs,
        set_safety_margin_secs,
        &["relay", "safety_margin_secs"],
        DEFAULT_SAFETY_MARGIN_SECS
    );

    impl_u64_config!(
        get_resolver_retry_base_delay_ms,
        set_resolver_retry_base_delay_ms,
        &["resolver", "retry_base_delay_ms"],
        DEFAULT_RESOLVER_RETRY_BASE_DELAY_MS
    );

    impl_bool_config!(
        get_autostart,
        set_autostart,
        &["relay", "autostart"],
        DEFAULT_AUTOSTART
    );

    impl_bool_config!(
        get_reset_stats_on_start,
        set_reset_stats_on_start,
        &["relay", "reset_stats_on_start"],
        DEFAULT_RESET_STATS_ON_START
    );
}

/// Returns the global configuration instance
///
/// This function provides access to the singleton configuration instance,
/// which is lazily loaded on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// This function recursively merges two YAML value trees:
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
