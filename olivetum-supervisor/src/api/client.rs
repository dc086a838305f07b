//! One-shot client for the miner's status API.
//!
//! Every request uses a fresh TCP connection. The miner closes idle API
//! connections and restarts its listener with the process, so there is
//! nothing worth keeping open between polls.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::error::{TelemetryError, TelemetryResult};
use super::messages::{ApiResponse, TelemetrySample, GETSTAT1_REQUEST};
use super::poller::StatSource;

/// Limit on establishing the connection.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Limit on the request write plus response read.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Status client bound to one miner API address.
#[derive(Debug, Clone)]
pub struct StatusClient {
    addr: SocketAddr,
    dial_timeout: Duration,
    exchange_timeout: Duration,
}

impl StatusClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            dial_timeout: DIAL_TIMEOUT,
            exchange_timeout: EXCHANGE_TIMEOUT,
        }
    }

    /// Override both timeouts.
    pub fn with_timeouts(mut self, dial: Duration, exchange: Duration) -> Self {
        self.dial_timeout = dial;
        self.exchange_timeout = exchange;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Issue `miner_getstat1` and decode the answer.
    pub async fn get_stat1(&self) -> TelemetryResult<TelemetrySample> {
        let stream = timeout(self.dial_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| TelemetryError::Timeout("connect"))?
            .map_err(|source| TelemetryError::Connect {
                addr: self.addr,
                source,
            })?;

        let line = timeout(self.exchange_timeout, exchange(stream))
            .await
            .map_err(|_| TelemetryError::Timeout("status request"))??;

        ApiResponse::parse_line(&line)
    }
}

async fn exchange(mut stream: TcpStream) -> TelemetryResult<String> {
    let mut request = String::with_capacity(GETSTAT1_REQUEST.len() + 1);
    request.push_str(GETSTAT1_REQUEST);
    request.push('\n');
    stream.write_all(request.as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 || !line.ends_with('\n') {
        return Err(TelemetryError::Closed);
    }
    Ok(line)
}

#[async_trait]
impl StatSource for StatusClient {
    async fn fetch(&self) -> TelemetryResult<TelemetrySample> {
        self.get_stat1().await
    }
}
