//! Network access used by the probe runner.

use std::time::Duration;

use async_trait::async_trait;

use super::ProbeError;

/// Incremental reader over a download body.
#[async_trait]
pub trait ChunkSource: Send {
    /// Size of the next chunk, or `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<usize>, ProbeError>;
}

/// A started download, in whichever form the transport can offer.
pub enum Download {
    /// Bytes are counted chunk by chunk without holding the body.
    Streamed(Box<dyn ChunkSource>),
    /// The transport already read the whole body.
    Buffered(Vec<u8>),
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Streamed(_) => f.write_str("Download::Streamed"),
            Self::Buffered(body) => write!(f, "Download::Buffered({} bytes)", body.len()),
        }
    }
}

impl Download {
    /// Total body size in bytes.
    pub async fn count_bytes(self) -> Result<u64, ProbeError> {
        match self {
            Self::Buffered(body) => Ok(body.len() as u64),
            Self::Streamed(mut source) => {
                let mut total = 0_u64;
                while let Some(len) = source.next_chunk().await? {
                    total += len as u64;
                }
                Ok(total)
            }
        }
    }
}

/// HTTP operations a probe needs. Implementations map 4xx/5xx responses to
/// [`ProbeError::HttpStatus`].
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn head(&self, url: &str) -> Result<(), ProbeError>;

    async fn get(&self, url: &str) -> Result<Download, ProbeError>;
}

// ---------------------------------------------------------------------------
// ReqwestTransport
// ---------------------------------------------------------------------------

/// Production transport over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn check_status(status: reqwest::StatusCode) -> Result<(), ProbeError> {
    if status.is_client_error() || status.is_server_error() {
        return Err(ProbeError::HttpStatus(status.as_u16()));
    }
    Ok(())
}

#[async_trait]
impl ProbeTransport for ReqwestTransport {
    async fn head(&self, url: &str) -> Result<(), ProbeError> {
        let response = self.client.head(url).send().await?;
        check_status(response.status())
    }

    async fn get(&self, url: &str) -> Result<Download, ProbeError> {
        let response = self.client.get(url).send().await?;
        check_status(response.status())?;
        Ok(Download::Streamed(Box::new(ResponseChunks(response))))
    }
}

struct ResponseChunks(reqwest::Response);

#[async_trait]
impl ChunkSource for ResponseChunks {
    async fn next_chunk(&mut self) -> Result<Option<usize>, ProbeError> {
        Ok(self.0.chunk().await?.map(|chunk| chunk.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chunks(Vec<usize>);

    #[async_trait]
    impl ChunkSource for Chunks {
        async fn next_chunk(&mut self) -> Result<Option<usize>, ProbeError> {
            Ok(if self.0.is_empty() { None } else { Some(self.0.remove(0)) })
        }
    }

    #[test]
    fn error_statuses_are_rejected() {
        assert!(check_status(reqwest::StatusCode::OK).is_ok());
        assert!(check_status(reqwest::StatusCode::MOVED_PERMANENTLY).is_ok());
        assert_eq!(
            check_status(reqwest::StatusCode::NOT_FOUND).unwrap_err().to_string(),
            "HTTP 404"
        );
        assert_eq!(
            check_status(reqwest::StatusCode::SERVICE_UNAVAILABLE).unwrap_err().to_string(),
            "HTTP 503"
        );
    }

    #[tokio::test]
    async fn streamed_and_buffered_count_the_same() {
        let streamed = Download::Streamed(Box::new(Chunks(vec![3, 4, 5])));
        let buffered = Download::Buffered(vec![0; 12]);
        assert_eq!(streamed.count_bytes().await.unwrap(), 12);
        assert_eq!(buffered.count_bytes().await.unwrap(), 12);
    }

    #[test]
    fn transport_builds() {
        assert!(ReqwestTransport::new(Duration::from_secs(5)).is_ok());
    }
}
