//! Worker configuration and its on-disk form.
//!
//! The configuration lives at `<user config dir>/olivetum-miner-gui/config.json`
//! with camelCase keys. Loading is forgiving: a missing file, an unparsable
//! file, or a field of the wrong type falls back to the defaults instead of
//! failing, so a hand-edited file never prevents startup.
//!
//! [`ConfigForm`] holds raw user input. [`ConfigForm::apply`] is the strict
//! save used before starting the miner; [`ConfigForm::apply_draft`] keeps
//! whatever is valid and the previous values for the rest.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::error::{Error, Result};
use crate::pool_url::{
    is_hex_address, normalize_rpc_url, validate_worker_name, ValidationError,
    MAX_DISPLAY_INTERVAL,
};
use crate::tracing::prelude::*;

pub const CONFIG_DIR_NAME: &str = "olivetum-miner-gui";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_STRATUM_HOST: &str = "89.117.2.230";
pub const DEFAULT_STRATUM_PORT: u32 = 8008;
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:18545";
pub const DEFAULT_DISPLAY_INTERVAL: u32 = 10;

/// How the miner gets its work.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Pool over stratum.
    #[default]
    Stratum,
    /// Solo mining against a local node.
    RpcLocal,
    /// Solo mining through a node's HTTP gateway.
    RpcGateway,
}

/// GPU compute backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// CUDA when the miner lists CUDA devices, OpenCL otherwise.
    #[default]
    Auto,
    Cuda,
    OpenCl,
}

impl Backend {
    /// Miner flag selecting the backend. `Auto` maps to the miner's
    /// OpenCL default and should be resolved before launching.
    pub fn flag(self) -> &'static str {
        match self {
            Backend::Cuda => "-U",
            Backend::OpenCl | Backend::Auto => "-G",
        }
    }

    /// Miner flag preceding the selected device indices.
    pub fn devices_flag(self) -> &'static str {
        match self {
            Backend::Cuda => "--cu-devices",
            Backend::OpenCl | Backend::Auto => "--cl-devices",
        }
    }
}

/// Everything needed to launch the miner.
///
/// Fields that do not apply to the active [`Mode`] are kept so switching
/// modes back and forth does not lose input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    pub mode: Mode,
    pub backend: Backend,
    pub stratum_host: String,
    pub stratum_port: u32,
    pub rpc_url: String,
    pub wallet_address: String,
    pub worker_name: String,
    pub selected_devices: Vec<u32>,
    pub report_hashrate: bool,
    /// Seconds between the miner's own status lines.
    pub display_interval: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Stratum,
            backend: Backend::Auto,
            stratum_host: DEFAULT_STRATUM_HOST.to_string(),
            stratum_port: DEFAULT_STRATUM_PORT,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            wallet_address: String::new(),
            worker_name: String::new(),
            selected_devices: Vec::new(),
            report_hashrate: true,
            display_interval: DEFAULT_DISPLAY_INTERVAL,
        }
    }
}

impl WorkerConfig {
    /// Decode a stored configuration, field by field.
    ///
    /// Unknown enum values and mistyped fields keep their defaults; empty
    /// host, URL, and zero port or interval are replaced by the defaults.
    pub fn from_json(value: &Value) -> Self {
        let mut config = WorkerConfig::default();
        let Some(obj) = value.as_object() else {
            return config;
        };

        if let Some(mode) = enum_field(obj, "mode") {
            config.mode = mode;
        }
        if let Some(backend) = enum_field(obj, "backend") {
            config.backend = backend;
        }
        if let Some(host) = str_field(obj, "stratumHost") {
            config.stratum_host = host;
        }
        if let Some(port) = u32_field(obj, "stratumPort") {
            config.stratum_port = port;
        }
        if let Some(url) = str_field(obj, "rpcUrl") {
            config.rpc_url = url;
        }
        if let Some(wallet) = str_field(obj, "walletAddress") {
            config.wallet_address = wallet;
        }
        if let Some(worker) = str_field(obj, "workerName") {
            config.worker_name = worker;
        }
        if let Some(devices) = obj.get("selectedDevices").and_then(Value::as_array) {
            config.selected_devices = devices
                .iter()
                .filter_map(|d| d.as_u64().and_then(|d| u32::try_from(d).ok()))
                .collect();
        }
        if let Some(report) = obj.get("reportHashrate").and_then(Value::as_bool) {
            config.report_hashrate = report;
        }
        if let Some(interval) = u32_field(obj, "displayInterval") {
            config.display_interval = interval;
        }

        if config.stratum_host.is_empty() {
            config.stratum_host = DEFAULT_STRATUM_HOST.to_string();
        }
        if config.stratum_port == 0 {
            config.stratum_port = DEFAULT_STRATUM_PORT;
        }
        if config.rpc_url.is_empty() {
            config.rpc_url = DEFAULT_RPC_URL.to_string();
        }
        if config.display_interval == 0 {
            config.display_interval = DEFAULT_DISPLAY_INTERVAL;
        }
        config
    }
}

impl<'de> Deserialize<'de> for WorkerConfig {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(WorkerConfig::from_json(&value))
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u32_field(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    obj.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn enum_field<T: std::str::FromStr>(obj: &Map<String, Value>, key: &str) -> Option<T> {
    obj.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

/// Location of the persisted configuration.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform's default location.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or(Error::NoConfigDir)?;
        Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, falling back to defaults when the file is
    /// missing or unparsable. Only a file that exists but cannot be read is
    /// an error.
    pub fn load(&self) -> Result<WorkerConfig> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file, using defaults");
                return Ok(WorkerConfig::default());
            }
            Err(source) => {
                return Err(Error::ConfigIo {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Ok(WorkerConfig::from_json(&value)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed config file");
                Ok(WorkerConfig::default())
            }
        }
    }

    /// Write `config` as indented JSON, creating the directory if needed.
    pub fn save(&self, config: &WorkerConfig) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| Error::ConfigIo {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, json).map_err(|source| Error::ConfigIo {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "Config saved");
        Ok(())
    }
}

/// Raw, unvalidated user input for a [`WorkerConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigForm {
    pub mode: Mode,
    pub backend: Backend,
    pub stratum_host: String,
    pub stratum_port: String,
    pub rpc_url: String,
    pub wallet_address: String,
    pub worker_name: String,
    pub selected_devices: Vec<u32>,
    pub report_hashrate: bool,
    pub display_interval: String,
}

impl From<&WorkerConfig> for ConfigForm {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            mode: config.mode,
            backend: config.backend,
            stratum_host: config.stratum_host.clone(),
            stratum_port: config.stratum_port.to_string(),
            rpc_url: config.rpc_url.clone(),
            wallet_address: config.wallet_address.clone(),
            worker_name: config.worker_name.clone(),
            selected_devices: config.selected_devices.clone(),
            report_hashrate: config.report_hashrate,
            display_interval: config.display_interval.to_string(),
        }
    }
}

impl ConfigForm {
    /// Validate the form for the selected mode and produce the config to
    /// save and launch with.
    ///
    /// Fields of inactive modes are carried over leniently from `current`
    /// when the input is unusable. The wallet is stored lower-case.
    pub fn apply(&self, current: &WorkerConfig) -> std::result::Result<WorkerConfig, ValidationError> {
        let mode = self.mode;

        let host = match self.stratum_host.trim() {
            "" => DEFAULT_STRATUM_HOST.to_string(),
            host => host.to_string(),
        };

        let port_text = self.stratum_port.trim();
        let port = if port_text.is_empty() {
            DEFAULT_STRATUM_PORT
        } else {
            match parse_port(port_text) {
                Some(port) => port,
                None if mode == Mode::Stratum => {
                    return Err(ValidationError::InvalidStratumPort(port_text.to_string()))
                }
                None => current.stratum_port,
            }
        };

        let rpc_text = self.rpc_url.trim();
        let mut rpc_url = if mode != Mode::Stratum {
            normalize_rpc_url(rpc_text)?
        } else if rpc_text.is_empty() {
            current.rpc_url.clone()
        } else {
            normalize_rpc_url(rpc_text).unwrap_or_else(|_| current.rpc_url.clone())
        };
        if rpc_url.is_empty() {
            rpc_url = DEFAULT_RPC_URL.to_string();
        }

        let wallet = self.wallet_address.trim();
        let wallet_ok = is_hex_address(wallet) || (mode == Mode::RpcLocal && wallet.is_empty());
        if !wallet_ok {
            return Err(ValidationError::InvalidWalletAddress);
        }

        let worker = self.worker_name.trim();
        if mode == Mode::Stratum {
            validate_worker_name(worker)?;
        }

        let interval_text = self.display_interval.trim();
        let display_interval = if interval_text.is_empty() {
            DEFAULT_DISPLAY_INTERVAL
        } else {
            parse_display_interval(interval_text).ok_or_else(|| {
                ValidationError::InvalidDisplayInterval(interval_text.to_string())
            })?
        };

        Ok(WorkerConfig {
            mode,
            backend: self.backend,
            stratum_host: host,
            stratum_port: port,
            rpc_url,
            wallet_address: wallet.to_lowercase(),
            worker_name: worker.to_string(),
            selected_devices: self.selected_devices.clone(),
            report_hashrate: self.report_hashrate,
            display_interval,
        })
    }

    /// Merge the form into `current` without validation errors.
    ///
    /// Unusable numeric input keeps the previous value; text fields are
    /// taken as typed (trimmed), so a half-entered wallet survives.
    pub fn apply_draft(&self, current: &WorkerConfig) -> WorkerConfig {
        let mut config = current.clone();
        config.mode = self.mode;
        config.backend = self.backend;

        match self.stratum_host.trim() {
            "" if config.stratum_host.is_empty() => {
                config.stratum_host = DEFAULT_STRATUM_HOST.to_string()
            }
            "" => {}
            host => config.stratum_host = host.to_string(),
        }

        match self.stratum_port.trim() {
            "" if config.stratum_port == 0 => config.stratum_port = DEFAULT_STRATUM_PORT,
            "" => {}
            text => {
                if let Some(port) = parse_port(text) {
                    config.stratum_port = port;
                }
            }
        }

        match self.rpc_url.trim() {
            "" if config.rpc_url.is_empty() => config.rpc_url = DEFAULT_RPC_URL.to_string(),
            "" => {}
            url => config.rpc_url = url.to_string(),
        }

        config.wallet_address = self.wallet_address.trim().to_string();
        config.worker_name = self.worker_name.trim().to_string();
        config.report_hashrate = self.report_hashrate;

        match self.display_interval.trim() {
            "" if config.display_interval == 0 => {
                config.display_interval = DEFAULT_DISPLAY_INTERVAL
            }
            "" => {}
            text => {
                if let Some(interval) = parse_display_interval(text) {
                    config.display_interval = interval;
                }
            }
        }

        config.selected_devices = self.selected_devices.clone();
        config
    }
}

fn parse_port(text: &str) -> Option<u32> {
    text.parse::<u32>()
        .ok()
        .filter(|port| (1..=65535).contains(port))
}

fn parse_display_interval(text: &str) -> Option<u32> {
    text.parse::<u32>()
        .ok()
        .filter(|secs| (1..=MAX_DISPLAY_INTERVAL).contains(secs))
}
