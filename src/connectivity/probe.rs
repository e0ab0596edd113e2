use std::time::Duration;
use tokio::net::TcpStream;

/// Raw TCP reachability probe against a stable endpoint
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns true when a connection is established within the timeout
    ///
    /// The connection is dropped immediately; nothing is sent.
    pub async fn probe(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.address.as_str())).await
        {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::debug!("Probe to {} failed: {}", self.address, e);
                false
            }
            Err(_) => {
                tracing::debug!("Probe to {} timed out after {:?}", self.address, self.timeout);
                false
            }
        }
    }
}
