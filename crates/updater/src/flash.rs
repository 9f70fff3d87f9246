//! Flash writer boundary and the file-backed reference implementation.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use md5::{Digest, Md5};
use tempfile::NamedTempFile;

use crate::response::FlashRegion;
use crate::transport::PayloadSource;

/// Staged flash transaction consumed by the orchestrator.
///
/// Call order is `begin`, `set_checksum`, `write_stream`, `end`. `end` makes
/// the new image active only if every prior stage succeeded; any earlier
/// failure must leave the previously active image bootable.
#[async_trait]
pub trait FlashWriter: Send {
    /// Open a transaction for `size` bytes against `region`.
    async fn begin(&mut self, size: u64, region: FlashRegion) -> bool;

    /// Arm the content checksum (hex MD5) the transaction must match.
    fn set_checksum(&mut self, checksum: &str) -> bool;

    /// Stream `size` bytes from `source` into the transaction. Returns the
    /// number of bytes actually written; anything short of `size` means the
    /// transaction was abandoned.
    async fn write_stream(&mut self, source: &mut dyn PayloadSource, size: u64) -> u64;

    /// Finalize the transaction and activate the image.
    async fn end(&mut self) -> bool;

    /// Diagnostic text for the most recent stage failure.
    fn last_diagnostic(&self) -> &str;
}

/// [`FlashWriter`] that maps flash regions onto files under a base directory.
///
/// Bytes stream into a staging file while an MD5 digest runs alongside;
/// `end` verifies byte count and digest, then atomically persists the image
/// over the region file. A failed or abandoned transaction drops the staging
/// file and leaves the region file untouched.
pub struct FileFlashWriter {
    base: PathBuf,
    transaction: Option<Transaction>,
    diagnostic: String,
}

struct Transaction {
    file: NamedTempFile,
    region: FlashRegion,
    expected_size: u64,
    written: u64,
    digest: Md5,
    checksum: Option<String>,
}

impl FileFlashWriter {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            transaction: None,
            diagnostic: String::new(),
        }
    }

    /// File holding the given region's active image.
    pub fn region_path(&self, region: FlashRegion) -> PathBuf {
        let name = match region {
            FlashRegion::Firmware => "firmware.bin",
            FlashRegion::Dataset => "dataset.bin",
        };
        self.base.join(name)
    }

    fn fail(&mut self, message: impl Into<String>) -> bool {
        self.diagnostic = message.into();
        false
    }
}

#[async_trait]
impl FlashWriter for FileFlashWriter {
    async fn begin(&mut self, size: u64, region: FlashRegion) -> bool {
        if self.transaction.is_some() {
            return self.fail("transaction already open");
        }
        if size == 0 {
            return self.fail("zero-length image");
        }
        if let Err(err) = std::fs::create_dir_all(&self.base) {
            return self.fail(format!("create base directory: {err}"));
        }
        let file = match NamedTempFile::new_in(&self.base) {
            Ok(file) => file,
            Err(err) => return self.fail(format!("open staging file: {err}")),
        };

        self.diagnostic.clear();
        self.transaction = Some(Transaction {
            file,
            region,
            expected_size: size,
            written: 0,
            digest: Md5::new(),
            checksum: None,
        });
        true
    }

    fn set_checksum(&mut self, checksum: &str) -> bool {
        if self.transaction.is_none() {
            return self.fail("no open transaction");
        }
        let normalized = checksum.trim().to_ascii_lowercase();
        if normalized.len() != 32 || hex::decode(&normalized).is_err() {
            self.transaction = None;
            return self.fail(format!("malformed md5 checksum [{checksum}]"));
        }
        if let Some(transaction) = self.transaction.as_mut() {
            transaction.checksum = Some(normalized);
        }
        true
    }

    async fn write_stream(&mut self, source: &mut dyn PayloadSource, size: u64) -> u64 {
        let mut transaction = match self.transaction.take() {
            Some(transaction) => transaction,
            None => {
                self.diagnostic = "no open transaction".into();
                return 0;
            }
        };
        if size != transaction.expected_size {
            self.diagnostic = format!(
                "declared {size} bytes, transaction opened for {}",
                transaction.expected_size
            );
            return 0;
        }

        let mut chunk = [0u8; 4096];
        while transaction.written < size {
            let want = chunk.len().min((size - transaction.written) as usize);
            let n = match source.read(&mut chunk[..want]).await {
                Ok(0) => {
                    self.diagnostic = format!(
                        "source ended at {} of {size} bytes",
                        transaction.written
                    );
                    break;
                }
                Ok(n) => n,
                Err(err) => {
                    self.diagnostic = format!("source read: {err}");
                    break;
                }
            };
            if let Err(err) = transaction.file.write_all(&chunk[..n]) {
                self.diagnostic = format!("staging write: {err}");
                break;
            }
            transaction.digest.update(&chunk[..n]);
            transaction.written += n as u64;
        }

        let written = transaction.written;
        if written == size {
            self.transaction = Some(transaction);
        }
        // A short transaction is dropped here, deleting the staging file.
        written
    }

    async fn end(&mut self) -> bool {
        let transaction = match self.transaction.take() {
            Some(transaction) => transaction,
            None => return self.fail("no open transaction"),
        };
        if transaction.written != transaction.expected_size {
            return self.fail(format!(
                "wrote {} of {} bytes",
                transaction.written, transaction.expected_size
            ));
        }
        let expected = match transaction.checksum {
            Some(expected) => expected,
            None => return self.fail("no checksum armed"),
        };
        let actual = hex::encode(transaction.digest.finalize());
        if actual != expected {
            return self.fail(format!("md5 mismatch (expected {expected}, got {actual})"));
        }
        if let Err(err) = transaction.file.as_file().sync_all() {
            return self.fail(format!("sync staging file: {err}"));
        }
        let target = self.region_path(transaction.region);
        if let Err(err) = transaction.file.persist(&target) {
            return self.fail(format!("activate image: {err}"));
        }
        true
    }

    fn last_diagnostic(&self) -> &str {
        &self.diagnostic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BufferedPayload;
    use std::fs;

    fn md5_hex(bytes: &[u8]) -> String {
        hex::encode(Md5::digest(bytes))
    }

    #[tokio::test]
    async fn full_transaction_activates_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileFlashWriter::new(dir.path());
        let image = vec![0x5A; 1024];
        let mut source = BufferedPayload::new(image.clone());

        assert!(writer.begin(1024, FlashRegion::Dataset).await);
        assert!(writer.set_checksum(&md5_hex(&image)));
        assert_eq!(writer.write_stream(&mut source, 1024).await, 1024);
        assert!(writer.end().await);

        let committed = fs::read(writer.region_path(FlashRegion::Dataset)).unwrap();
        assert_eq!(committed, image);
    }

    #[tokio::test]
    async fn checksum_mismatch_keeps_previous_image_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileFlashWriter::new(dir.path());
        let previous = b"previous firmware".to_vec();
        fs::write(writer.region_path(FlashRegion::Firmware), &previous).unwrap();

        let image = vec![0x11; 256];
        let mut source = BufferedPayload::new(image.clone());
        assert!(writer.begin(256, FlashRegion::Firmware).await);
        assert!(writer.set_checksum(&md5_hex(b"something else")));
        assert_eq!(writer.write_stream(&mut source, 256).await, 256);
        assert!(!writer.end().await);
        assert!(writer.last_diagnostic().contains("md5 mismatch"));

        let active = fs::read(writer.region_path(FlashRegion::Firmware)).unwrap();
        assert_eq!(active, previous);
    }

    #[tokio::test]
    async fn short_source_abandons_the_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileFlashWriter::new(dir.path());
        let mut source = BufferedPayload::new(vec![0x22; 100]);

        assert!(writer.begin(512, FlashRegion::Firmware).await);
        assert!(writer.set_checksum(&md5_hex(&[0x22; 100])));
        assert_eq!(writer.write_stream(&mut source, 512).await, 100);

        // The transaction is gone; end() has nothing to finalize.
        assert!(!writer.end().await);
        assert!(!writer.region_path(FlashRegion::Firmware).exists());
    }

    #[tokio::test]
    async fn malformed_checksum_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileFlashWriter::new(dir.path());

        assert!(writer.begin(16, FlashRegion::Dataset).await);
        assert!(!writer.set_checksum("abc123"));
        assert!(writer.last_diagnostic().contains("malformed"));
    }

    #[tokio::test]
    async fn second_begin_while_open_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileFlashWriter::new(dir.path());

        assert!(writer.begin(16, FlashRegion::Firmware).await);
        assert!(!writer.begin(16, FlashRegion::Firmware).await);
        assert_eq!(writer.last_diagnostic(), "transaction already open");
    }
}
