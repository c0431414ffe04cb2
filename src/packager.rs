use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::session::{Snapshot, TransformedArtifact};

/// MIME type of every transformed artifact.
pub const XLSX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// File name suggested for every download.
pub const OUTPUT_FILE_NAME: &str = "processed_file.xlsx";

/// Wraps engine output for delivery and hands out transient download files.
///
/// Clones share the same live-download counter.
#[derive(Debug, Clone, Default)]
pub struct ResultPackager {
    live: Arc<AtomicUsize>,
}

impl ResultPackager {
    /// Create a packager with no live downloads.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag `bytes` with the fixed MIME type and file name. The bytes are not
    /// touched.
    ///
    /// # Arguments
    /// * `bytes` - Engine output
    /// * `snapshot` - The `(generation, configuration)` the output was made for
    ///
    /// # Returns
    /// * `TransformedArtifact` - Output named `processed_file.xlsx`
    pub fn package(&self, bytes: Vec<u8>, snapshot: Snapshot) -> TransformedArtifact {
        TransformedArtifact {
            bytes,
            mime_type: XLSX_MIME_TYPE,
            file_name: OUTPUT_FILE_NAME,
            snapshot,
        }
    }

    /// Write `artifact` to a temporary file that lives as long as the
    /// returned handle. Dropping the handle removes the file.
    ///
    /// # Arguments
    /// * `artifact` - The artifact to offer
    ///
    /// # Returns
    /// * `Result<Downloadable>` - The download handle, or an `Io` error if the
    ///   temporary file could not be written
    ///
    /// # Examples
    /// ```
    /// use prettysheet::{Configuration, ResultPackager, Snapshot};
    ///
    /// let packager = ResultPackager::new();
    /// let snapshot = Snapshot { generation: 1, configuration: Configuration::default() };
    /// let artifact = packager.package(b"PK\x03\x04".to_vec(), snapshot);
    ///
    /// let download = packager.to_downloadable(&artifact).unwrap();
    /// assert_eq!(download.file_name(), "processed_file.xlsx");
    /// assert!(download.path().exists());
    /// assert_eq!(packager.live_downloads(), 1);
    ///
    /// drop(download);
    /// assert_eq!(packager.live_downloads(), 0);
    /// ```
    pub fn to_downloadable(&self, artifact: &TransformedArtifact) -> Result<Downloadable> {
        let mut file = tempfile::Builder::new()
            .prefix("prettysheet-")
            .suffix(".xlsx")
            .tempfile()?;
        file.write_all(&artifact.bytes)?;
        file.flush()?;

        self.live.fetch_add(1, Ordering::SeqCst);
        debug!("download issued at {}", file.path().display());

        Ok(Downloadable {
            file,
            file_name: artifact.file_name,
            mime_type: artifact.mime_type,
            len: artifact.bytes.len(),
            live: Arc::clone(&self.live),
        })
    }

    /// Run `use_download` with a transient download of `artifact`, releasing
    /// it afterwards whether `use_download` succeeds, fails or panics.
    pub fn with_downloadable<T, F>(&self, artifact: &TransformedArtifact, use_download: F) -> Result<T>
    where
        F: FnOnce(&Downloadable) -> Result<T>,
    {
        let download = self.to_downloadable(artifact)?;
        use_download(&download)
    }

    /// Downloads issued by this packager (or any clone of it) that have not
    /// been released yet.
    ///
    /// # Returns
    /// * `usize` - Number of `Downloadable` handles still alive
    pub fn live_downloads(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// A transient file holding one artifact.
#[derive(Debug)]
pub struct Downloadable {
    file: NamedTempFile,
    file_name: &'static str,
    mime_type: &'static str,
    len: usize,
    live: Arc<AtomicUsize>,
}

impl Downloadable {
    /// Location of the temporary file; valid until the handle is dropped.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the download to `destination`, returning the number of bytes
    /// written.
    pub fn save_as(&self, destination: impl AsRef<Path>) -> Result<u64> {
        Ok(fs::copy(self.file.path(), destination)?)
    }
}

impl Drop for Downloadable {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!("download released at {}", self.file.path().display());
    }
}
