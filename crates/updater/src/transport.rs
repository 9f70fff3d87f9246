//! HTTP transport boundary: the capability trait the orchestrator consumes,
//! the peekable payload stream, and the production reqwest implementation.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use reqwest::Client;

use crate::error::TransportResult;
use crate::request::UpdateRequest;
use crate::response::ResponseMetadata;

/// Fixed user agent advertised on every update request.
pub const USER_AGENT: &str = "ota-updater";

/// Per-request I/O timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

pub(crate) const HEADER_DEVICE_ID: &str = "X-Mac-Address";
pub(crate) const HEADER_FIRMWARE_VERSION: &str = "X-Firmware-Version";
pub(crate) const HEADER_DATASET_VERSION: &str = "X-Dataset-Version";
pub(crate) const HEADER_CHIP_SIZE: &str = "X-Chip-Size";
pub(crate) const HEADER_FREE_SPACE: &str = "X-Free-Space";
pub(crate) const HEADER_UPDATE_TYPE: &str = "X-Update-Type";
pub(crate) const HEADER_MD5: &str = "X-Md5";

/// Byte stream of an update payload.
///
/// `peek` must be non-destructive: bytes surfaced by lookahead are returned
/// again by subsequent `read` calls.
#[async_trait]
pub trait PayloadSource: Send {
    /// Fill `buf` with upcoming bytes without consuming them. Returns how
    /// many bytes were available, which may be fewer than requested near the
    /// end of the stream.
    async fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Consume up to `buf.len()` bytes. Returns 0 only at end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// One issued request: extracted metadata plus the body stream.
pub struct UpdateExchange {
    pub metadata: ResponseMetadata,
    pub body: Box<dyn PayloadSource>,
}

/// Abstraction over issuing the update request.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    /// Issue the request described by `request` and expose the response.
    async fn fetch(&self, request: &UpdateRequest) -> TransportResult<UpdateExchange>;
}

/// Hook for halting network activity that would compete with the flash write.
pub trait NetworkStack: Send {
    /// Stop sockets unrelated to the update exchange.
    fn suspend_background_traffic(&mut self);
}

/// No-op stack for hosts where nothing competes with the flash writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveNetworkStack;

impl NetworkStack for PassiveNetworkStack {
    fn suspend_background_traffic(&mut self) {}
}

/// Builder for [`HttpTransport`].
#[derive(Default)]
pub struct HttpTransportBuilder {
    client: Option<Client>,
}

impl HttpTransportBuilder {
    /// Provide a custom reqwest client instance, e.g. one configured with a
    /// pinned server certificate for locators carrying a fingerprint.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the transport.
    pub fn build(self) -> HttpTransport {
        HttpTransport {
            client: self.client.unwrap_or_else(Client::new),
        }
    }
}

/// Production [`UpdateTransport`] speaking HTTP via reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new builder.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }
}

#[async_trait]
impl UpdateTransport for HttpTransport {
    async fn fetch(&self, request: &UpdateRequest) -> TransportResult<UpdateExchange> {
        let url = request.locator.resolve();
        let device = &request.device;

        let response = self
            .client
            .get(&url)
            // HTTP/1.0 keeps the server from chunk-encoding the body, so the
            // declared Content-Length stays authoritative.
            .version(reqwest::Version::HTTP_10)
            .timeout(REQUEST_TIMEOUT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(HEADER_DEVICE_ID, device.device_id.as_str())
            .header(HEADER_FIRMWARE_VERSION, device.firmware_version.as_str())
            .header(HEADER_DATASET_VERSION, device.dataset_version.as_str())
            .header(HEADER_CHIP_SIZE, device.flash_capacity.to_string())
            .header(HEADER_FREE_SPACE, device.free_update_space.to_string())
            .send()
            .await?;

        let metadata = ResponseMetadata {
            status: response.status().as_u16(),
            content_length: declared_length(&response),
            update_type: header_value(&response, HEADER_UPDATE_TYPE),
            content_checksum: header_value(&response, HEADER_MD5),
        };

        Ok(UpdateExchange {
            metadata,
            body: Box::new(HttpPayload::new(response)),
        })
    }
}

fn declared_length(response: &reqwest::Response) -> i64 {
    response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(-1)
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Peekable adapter over a streaming response body.
struct HttpPayload {
    response: reqwest::Response,
    buffered: BytesMut,
    exhausted: bool,
}

impl HttpPayload {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffered: BytesMut::new(),
            exhausted: false,
        }
    }

    async fn fill(&mut self, want: usize) -> io::Result<()> {
        while self.buffered.len() < want && !self.exhausted {
            match self.response.chunk().await {
                Ok(Some(chunk)) => self.buffered.extend_from_slice(&chunk),
                Ok(None) => self.exhausted = true,
                Err(err) => return Err(io::Error::new(io::ErrorKind::Other, err)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PayloadSource for HttpPayload {
    async fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf.len()).await?;
        let n = buf.len().min(self.buffered.len());
        buf[..n].copy_from_slice(&self.buffered[..n]);
        Ok(n)
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buffered.is_empty() {
            self.fill(1).await?;
        }
        let n = buf.len().min(self.buffered.len());
        buf[..n].copy_from_slice(&self.buffered[..n]);
        self.buffered.advance(n);
        Ok(n)
    }
}

/// In-memory [`PayloadSource`] for images that are already fully downloaded,
/// and for deterministic tests.
#[derive(Debug, Clone)]
pub struct BufferedPayload {
    bytes: Vec<u8>,
    cursor: usize,
}

impl BufferedPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            cursor: 0,
        }
    }
}

#[async_trait]
impl PayloadSource for BufferedPayload {
    async fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = &self.bytes[self.cursor..];
        let n = buf.len().min(rest.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Ok(n)
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = &self.bytes[self.cursor..];
        let n = buf.len().min(rest.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.cursor += n;
        Ok(n)
    }
}
