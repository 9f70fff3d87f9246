/// Convenient result alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Closed taxonomy of update-attempt failures.
///
/// The variant names are the stable contract; discriminant values and the
/// display strings may evolve. Exactly one entry is assigned per failed
/// attempt, chosen at the step that rejected the attempt.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateError {
    /// The HTTP exchange failed below the protocol level.
    #[error("HTTP request failed")]
    HttpRequest,
    /// The server answered with a status code the protocol gives no meaning.
    #[error("Invalid server HTTP status code")]
    HttpStatusCode,
    /// The response declared no positive body length.
    #[error("Missing [Content-Length] header")]
    MissingHeaderLength,
    #[error("Missing [X-Update-Type] header")]
    MissingHeaderType,
    #[error("Missing [X-Md5] header")]
    MissingHeaderMd5,
    /// The update type was present but not a recognized kind.
    #[error("Invalid [X-Update-Type] header value")]
    InvalidHeaderType,
    /// The firmware body did not yield a full header of lookahead bytes.
    #[error("Magic bytes peek failed")]
    MagicPeekFailed,
    #[error("Invalid magic bytes")]
    InvalidMagicBytes,
    /// The image was built for a larger flash chip than the device carries.
    #[error("Magic size mismatch")]
    MagicSizeMismatch,
    /// The flash writer refused to open a transaction.
    #[error("Flash transaction begin failed")]
    UpdateBegin,
    /// The flash writer refused the expected content checksum.
    #[error("Flash transaction checksum setup failed")]
    UpdateSetMd5,
    /// Fewer bytes reached flash than the response declared, or the writer
    /// aborted mid-stream.
    #[error("Flash transaction stream write failed")]
    UpdateWriteStream,
    /// The finalize stage rejected the written image.
    #[error("Flash transaction finalize failed")]
    UpdateEnd,
}

/// Errors a transport implementation can surface before the update protocol
/// itself gets a say. The orchestrator folds all of these into
/// [`UpdateError::HttpRequest`]; the variants exist for logging.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The request could not be issued or completed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Reading the response failed at the byte-stream level.
    #[error("body read failed: {0}")]
    Io(#[from] std::io::Error),
    /// The locator could not be resolved into a request URL.
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
}
