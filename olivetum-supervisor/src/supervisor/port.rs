//! Local port for the miner's status API.

use std::net::IpAddr;

use tokio::net::TcpListener;

use crate::error::{Error, Result};

/// Ask the OS for a free TCP port on `host`.
///
/// The listener is closed before returning, so the port is only very likely,
/// not guaranteed, to still be free when the miner binds it.
pub async fn allocate_api_port(host: IpAddr) -> Result<u16> {
    let listener = TcpListener::bind((host, 0))
        .await
        .map_err(Error::PortAllocation)?;
    let addr = listener.local_addr().map_err(Error::PortAllocation)?;
    Ok(addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_port_is_bindable() {
        let host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let port = allocate_api_port(host).await.unwrap();
        assert_ne!(port, 0);
        TcpListener::bind((host, port)).await.unwrap();
    }
}
