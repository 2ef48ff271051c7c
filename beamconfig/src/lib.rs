//! Configuration layer for the Beamer cast helper.
//!
//! Configuration is a YAML document merged from, in order: the embedded
//! defaults, an optional on-disk file, and `BEAMER_CONFIG__*` environment
//! overrides. The merged document lives behind a process-wide singleton.

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{info, warn};

use beamutils::guess_local_ip;

const DEFAULT_CONFIG: &str = include_str!("beamer.yaml");

/// Compiled-in fallback for the control/media port.
pub const DEFAULT_PORT: u16 = 9876;

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Beamer configuration"));
}

const ENV_CONFIG_FILE: &str = "BEAMER_CONFIG";
const ENV_PREFIX: &str = "BEAMER_CONFIG__";

#[derive(Debug)]
pub struct Config {
    data: Mutex<Value>,
}

impl Config {
    pub fn load_config(filename: &str) -> Result<Self> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let mut data: Option<Vec<u8>> = None;

        if !filename.is_empty() {
            info!(config_file = %filename, "Trying to load config");
            data = fs::read(filename).ok();
            if data.is_none() {
                warn!(config_file = %filename, "Cannot read config file");
            }
        }

        if data.is_none() {
            if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
                info!(env_var = ENV_CONFIG_FILE, path = %env_path, "Trying to load config from env");
                data = fs::read(&env_path).ok();
                if data.is_none() {
                    warn!(config_file = %env_path, "Cannot read config file from env var");
                }
            }
        }

        if data.is_none() {
            let path = env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".beamer.yml");
            data = fs::read(&path).ok();
        }

        if data.is_none() {
            let path = home_dir()
                .map(|p| p.join(".beamer.yml"))
                .unwrap_or_else(|| PathBuf::from(".beamer.yml"));
            data = fs::read(&path).ok();
        }

        if let Some(bytes) = data {
            let external_value: Value = serde_yaml::from_slice(&bytes)?;
            merge_yaml(&mut default_value, &external_value);
        } else {
            info!("Using default embedded config");
        }

        let mut config_value = Self::lower_keys_value(default_value);
        Self::apply_env_overrides(&mut config_value);

        Ok(Config {
            data: Mutex::new(config_value),
        })
    }

    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
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
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
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

    /// Base URL handed to cast endpoints. Falls back to the guessed LAN
    /// address because devices cannot reach us through 127.0.0.1.
    pub fn get_base_url(&self) -> String {
        match self.get_value(&["server", "base_url"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => guess_local_ip(),
        }
    }

    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["server", "port"]) {
            Ok(Value::Number(n)) if n.is_u64() => {
                let port = n.as_u64().unwrap();
                if port == 0 || port > u16::MAX as u64 {
                    DEFAULT_PORT
                } else {
                    port as u16
                }
            }
            Ok(Value::String(s)) => s.parse::<u16>().unwrap_or_else(|_| {
                warn!("Invalid HTTP port '{}', using default {}", s, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            _ => DEFAULT_PORT,
        }
    }

    pub fn get_media_root(&self) -> Option<PathBuf> {
        match self.get_value(&["media", "root"]) {
            Ok(Value::String(s)) if !s.is_empty() => Some(PathBuf::from(s)),
            _ => None,
        }
    }

    pub fn get_subtitles_root(&self) -> Option<PathBuf> {
        match self.get_value(&["media", "subtitles"]) {
            Ok(Value::String(s)) if !s.is_empty() => Some(PathBuf::from(s)),
            _ => None,
        }
    }
}

/// Returns the process-wide configuration instance.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_expose_port() {
        let config = Config::load_config("/nonexistent/beamer.yml").unwrap();
        assert_eq!(config.get_http_port(), DEFAULT_PORT);
    }

    #[test]
    fn set_then_get_roundtrip() {
        let config = Config::load_config("").unwrap();
        config
            .set_value(&["media", "root"], Value::String("/tmp/movies".into()))
            .unwrap();
        assert_eq!(
            config.get_media_root(),
            Some(PathBuf::from("/tmp/movies"))
        );
    }

    #[test]
    fn merge_prefers_external_scalars() {
        let mut base: Value = serde_yaml::from_str("server:\n  port: 9876\n").unwrap();
        let ext: Value = serde_yaml::from_str("server:\n  port: 9999\n").unwrap();
        merge_yaml(&mut base, &ext);
        assert_eq!(
            Config::get_value_internal(&base, &["server", "port"]).unwrap(),
            Value::Number(9999.into())
        );
    }
}
