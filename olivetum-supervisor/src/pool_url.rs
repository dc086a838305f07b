//! Composition and validation of the miner's `-P` connection target.
//!
//! | mode | target |
//! |---|---|
//! | stratum | `stratum1+tcp://<wallet>[.<worker>]@<host>:<port>` |
//! | rpc-local | normalized node RPC URL (`http://` or `getwork://`) |
//! | rpc-gateway | `solo+http://<host[:port]>/<wallet>` |

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::{Position, Url};

use crate::config::{Mode, WorkerConfig};

/// Longest accepted worker label.
pub const MAX_WORKER_NAME_LEN: usize = 16;

/// Highest display interval the miner accepts, in seconds.
pub const MAX_DISPLAY_INTERVAL: u32 = 1800;

static WORKER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Za-z_-]{1,16}$").expect("worker name pattern is valid")
});

/// A configuration field that cannot be used as given.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing stratum host")]
    MissingStratumHost,

    #[error("invalid stratum port: {0:?} (expected 1..65535)")]
    InvalidStratumPort(String),

    #[error("invalid wallet address (expected 0x + 40 hex chars)")]
    InvalidWalletAddress,

    #[error("invalid worker name {0:?} (allowed: 0-9 A-Z a-z _ -; max 16)")]
    InvalidWorkerName(String),

    #[error("RPC URL is required")]
    MissingRpcUrl,

    #[error("invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("unsupported RPC URL scheme: {0:?} (use http://)")]
    UnsupportedRpcScheme(String),

    #[error("invalid RPC URL: missing host")]
    MissingRpcHost,

    #[error("RPC gateway requires an http:// RPC URL")]
    GatewayRequiresHttp,

    #[error("RPC gateway requires an RPC URL without a path")]
    GatewayUrlHasPath,

    #[error("invalid display interval: {0:?} (1..1800)")]
    InvalidDisplayInterval(String),
}

/// True for `0x` followed by exactly 40 hex digits, ignoring surrounding
/// whitespace.
pub fn is_hex_address(s: &str) -> bool {
    let s = s.trim();
    match s.strip_prefix("0x") {
        Some(digits) => digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Check a worker label. Empty means "no label" and is accepted.
pub fn validate_worker_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || WORKER_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidWorkerName(name.to_string()))
    }
}

/// Normalize a node RPC URL.
///
/// Surrounding whitespace is trimmed and `http://` is assumed when no scheme
/// is given. Only `http` and `getwork` are accepted, a host is required, and
/// an empty path becomes `/`.
pub fn normalize_rpc_url(raw: &str) -> Result<String, ValidationError> {
    parse_rpc_url(raw).map(String::from)
}

fn parse_rpc_url(raw: &str) -> Result<Url, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingRpcUrl);
    }
    let with_scheme;
    let raw = if raw.contains("://") {
        raw
    } else {
        with_scheme = format!("http://{}", raw);
        &with_scheme
    };

    let mut url = Url::parse(raw).map_err(|e| match e {
        url::ParseError::EmptyHost => ValidationError::MissingRpcHost,
        other => ValidationError::InvalidRpcUrl(other.to_string()),
    })?;
    if url.scheme() != "http" && url.scheme() != "getwork" {
        return Err(ValidationError::UnsupportedRpcScheme(url.scheme().to_string()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::MissingRpcHost);
    }
    if url.path().is_empty() {
        url.set_path("/");
    }
    Ok(url)
}

/// Build the `-P` argument for `config`'s active mode.
///
/// Fields belonging to the other modes are ignored.
pub fn build_pool_url(config: &WorkerConfig) -> Result<String, ValidationError> {
    match config.mode {
        Mode::Stratum => {
            let host = config.stratum_host.trim();
            if host.is_empty() {
                return Err(ValidationError::MissingStratumHost);
            }
            if !(1..=65535).contains(&config.stratum_port) {
                return Err(ValidationError::InvalidStratumPort(
                    config.stratum_port.to_string(),
                ));
            }
            let wallet = valid_wallet(&config.wallet_address)?;
            let worker = config.worker_name.trim();
            validate_worker_name(worker)?;

            let user = if worker.is_empty() {
                wallet.to_string()
            } else {
                format!("{}.{}", wallet, worker)
            };
            Ok(format!(
                "stratum1+tcp://{}@{}:{}",
                user, host, config.stratum_port
            ))
        }

        Mode::RpcLocal => normalize_rpc_url(&config.rpc_url),

        Mode::RpcGateway => {
            let wallet = valid_wallet(&config.wallet_address)?;
            let url = parse_rpc_url(&config.rpc_url)?;
            if url.scheme() != "http" {
                return Err(ValidationError::GatewayRequiresHttp);
            }
            if !url.path().is_empty() && url.path() != "/" {
                return Err(ValidationError::GatewayUrlHasPath);
            }
            let host_port = &url[Position::BeforeHost..Position::AfterPort];
            Ok(format!("solo+http://{}/{}", host_port, wallet))
        }
    }
}

fn valid_wallet(wallet: &str) -> Result<&str, ValidationError> {
    if is_hex_address(wallet) {
        Ok(wallet.trim())
    } else {
        Err(ValidationError::InvalidWalletAddress)
    }
}
