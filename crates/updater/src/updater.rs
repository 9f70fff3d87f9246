use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::classifier;
use crate::error::UpdateError;
use crate::flash::FlashWriter;
use crate::request::UpdateRequest;
use crate::response::{status, FlashRegion, UpdateKind};
use crate::transport::{NetworkStack, PayloadSource, UpdateTransport};

/// Pause between quiescing the network and consuming the body. The flash
/// write that follows is timing sensitive; the stack gets a moment to wind
/// down before it starts.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Terminal result of one update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The attempt failed; the previously active image remains active.
    Failure(UpdateError),
    /// A firmware image was validated and committed.
    SuccessFirmware,
    /// A dataset image was committed.
    SuccessDataset,
    /// The server reports the declared versions are already current.
    UpToDate,
}

/// State machine driving one OTA attempt end to end: issue the request,
/// validate the response, classify the payload, and drive the flash writer.
///
/// One attempt at a time per instance; `&mut self` on
/// [`attempt_update`](Self::attempt_update) enforces that at compile time.
pub struct UpdateOrchestrator<T, F, N> {
    transport: T,
    flash: F,
    network: N,
    last_error: Option<UpdateError>,
}

impl<T, F, N> UpdateOrchestrator<T, F, N>
where
    T: UpdateTransport,
    F: FlashWriter,
    N: NetworkStack,
{
    pub fn new(transport: T, flash: F, network: N) -> Self {
        Self {
            transport,
            flash,
            network,
            last_error: None,
        }
    }

    /// Run one update attempt against the server described by `request`.
    ///
    /// Never retries internally. On [`Outcome::Failure`] the cause is carried
    /// in the outcome and retained for [`last_error`](Self::last_error);
    /// successful and up-to-date attempts leave the retained error untouched.
    pub async fn attempt_update(&mut self, request: &UpdateRequest) -> Outcome {
        match self.run_attempt(request).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.last_error = Some(error);
                Outcome::Failure(error)
            }
        }
    }

    /// Most specific error from the most recent failed attempt.
    pub fn last_error(&self) -> Option<UpdateError> {
        self.last_error
    }

    /// Human-readable form of [`last_error`](Self::last_error); "None" before
    /// any failure.
    pub fn last_error_string(&self) -> String {
        match self.last_error {
            Some(error) => error.to_string(),
            None => "None".to_owned(),
        }
    }

    async fn run_attempt(&mut self, request: &UpdateRequest) -> Result<Outcome, UpdateError> {
        let exchange = match self.transport.fetch(request).await {
            Ok(exchange) => exchange,
            Err(err) => {
                debug!("update request failed: {err}");
                return Err(UpdateError::HttpRequest);
            }
        };
        let metadata = exchange.metadata;
        debug!(status = metadata.status, "server answered");

        match metadata.status {
            status::PRECONDITION_FAILED => return Ok(Outcome::UpToDate),
            status::OK => {}
            other => {
                debug!("unexpected server status {other}");
                return Err(UpdateError::HttpStatusCode);
            }
        }

        if metadata.content_length <= 0 {
            debug!("missing [Content-Length] header");
            return Err(UpdateError::MissingHeaderLength);
        }
        let size = metadata.content_length as u64;

        let update_type = match metadata.update_type.as_deref() {
            Some(value) if !value.is_empty() => value,
            _ => {
                debug!("missing [X-Update-Type] header");
                return Err(UpdateError::MissingHeaderType);
            }
        };

        let checksum = match metadata.content_checksum.as_deref() {
            Some(value) if !value.is_empty() => value,
            _ => {
                debug!("missing [X-Md5] header");
                return Err(UpdateError::MissingHeaderMd5);
            }
        };

        debug!(
            length = size,
            update_type, checksum, "server offers an update payload"
        );

        let kind = match UpdateKind::from_header(update_type) {
            Some(kind) => kind,
            None => {
                debug!("invalid [X-Update-Type] header value [{update_type}]");
                return Err(UpdateError::InvalidHeaderType);
            }
        };

        // Background sockets must not starve the flash write.
        self.network.suspend_background_traffic();
        sleep(SETTLE_DELAY).await;

        let mut body = exchange.body;

        if kind == UpdateKind::Firmware {
            if let Err(err) =
                classifier::classify_firmware(body.as_mut(), request.device.flash_capacity).await
            {
                debug!("firmware payload rejected: {err}");
                return Err(err.into());
            }
        }

        self.commit(kind.region(), body.as_mut(), size, checksum)
            .await?;

        Ok(match kind {
            UpdateKind::Firmware => Outcome::SuccessFirmware,
            UpdateKind::Dataset => Outcome::SuccessDataset,
        })
    }

    /// Drive the staged flash transaction, mapping each stage to its error.
    async fn commit(
        &mut self,
        region: FlashRegion,
        source: &mut dyn PayloadSource,
        size: u64,
        checksum: &str,
    ) -> Result<(), UpdateError> {
        if !self.flash.begin(size, region).await {
            warn!("flash begin failed ({})", self.flash.last_diagnostic());
            return Err(UpdateError::UpdateBegin);
        }
        if !self.flash.set_checksum(checksum) {
            warn!(
                "flash checksum setup failed ({})",
                self.flash.last_diagnostic()
            );
            return Err(UpdateError::UpdateSetMd5);
        }
        let written = self.flash.write_stream(source, size).await;
        if written != size {
            warn!(
                "flash stream write stopped at {written} of {size} bytes ({})",
                self.flash.last_diagnostic()
            );
            return Err(UpdateError::UpdateWriteStream);
        }
        if !self.flash.end().await {
            warn!("flash finalize failed ({})", self.flash.last_diagnostic());
            return Err(UpdateError::UpdateEnd);
        }
        Ok(())
    }
}
