use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::models::{ManifestContent, ManifestDescriptor};
use crate::transport::HttpTransport;

/// Retrieves the raw bytes of a manifest.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, descriptor: &ManifestDescriptor) -> Result<ManifestContent, ErrorKind>;
}

/// [`ManifestFetcher`] that GETs the descriptor's raw-content URL.
pub struct RawContentFetcher {
    transport: HttpTransport,
}

impl RawContentFetcher {
    pub fn new(transport: HttpTransport) -> Self {
        RawContentFetcher { transport }
    }
}

#[async_trait]
impl ManifestFetcher for RawContentFetcher {
    async fn fetch(&self, descriptor: &ManifestDescriptor) -> Result<ManifestContent, ErrorKind> {
        let url = descriptor.download_url.as_str();
        let response = self
            .transport
            .send(|client| client.get(url))
            .await
            .map_err(|e| {
                warn!(url, error = %e, "manifest download failed");
                ErrorKind::TransportError
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "manifest download returned non-success");
            return Err(ErrorKind::UpstreamUnavailable(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| {
            warn!(url, error = %e, "manifest body could not be read");
            ErrorKind::TransportError
        })?;
        debug!(url, size = bytes.len(), "fetched manifest");

        Ok(ManifestContent {
            descriptor: descriptor.clone(),
            bytes: bytes.to_vec(),
        })
    }
}
