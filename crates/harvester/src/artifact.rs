//! Download, validation and upload of open-access PDFs.
//!
//! An artifact moves through a fixed sequence: the body is streamed into a temporary file in the
//! scratch directory, the file is rewound and its first four bytes are checked against the PDF
//! signature, and only then is it handed to the object store. The temporary file is removed on
//! every path, including failures and cancellation.
//!
//! Uploading is best effort with respect to the metadata: when any step fails the record is still
//! stored, with an empty file name, and the failure is reported as an [`ArtifactOutcome::Failed`].

use std::io::SeekFrom;

use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::*;

/// Leading bytes of every PDF document.
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// What happened to the artifact of one record.
#[derive(Debug)]
pub enum ArtifactOutcome {
  /// The record is not open access, or uploading is disabled.
  Skipped,
  /// The artifact was uploaded under `key`.
  Uploaded {
    /// Object key in the bucket
    key: String,
  },
  /// Some step failed; the record is stored without an artifact.
  Failed(HarvestError),
}

impl ArtifactOutcome {
  /// The file name to store with the metadata, empty unless uploaded.
  pub fn file_name(&self) -> &str {
    match self {
      ArtifactOutcome::Uploaded { key } => key,
      _ => "",
    }
  }
}

/// Moves artifacts from the content host into the object store.
#[derive(Clone)]
pub struct ArtifactUploader {
  /// Shared HTTP client
  http:        reqwest::Client,
  /// Destination store
  store:       Arc<dyn ObjectStore>,
  /// Destination bucket
  bucket:      String,
  /// Where temporary files are written
  scratch_dir: PathBuf,
}

impl std::fmt::Debug for ArtifactUploader {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ArtifactUploader")
      .field("bucket", &self.bucket)
      .field("scratch_dir", &self.scratch_dir)
      .finish_non_exhaustive()
  }
}

impl ArtifactUploader {
  /// Creates an uploader targeting `bucket`.
  pub fn new(
    http: reqwest::Client,
    store: Arc<dyn ObjectStore>,
    bucket: impl Into<String>,
    scratch_dir: impl AsRef<Path>,
  ) -> Self {
    Self { http, store, bucket: bucket.into(), scratch_dir: scratch_dir.as_ref().to_path_buf() }
  }

  /// Downloads the artifact at `url`, validates it and uploads it under a name derived from
  /// `title`.
  ///
  /// Returns the object key.
  pub async fn transfer(&self, url: &str, title: &str) -> Result<String> {
    let key = artifact_file_name(title);
    let temp_path = self.download(url).await?;

    let uploaded = self.store.upload_file(&self.bucket, &key, &temp_path).await;
    if let Err(e) = temp_path.close() {
      warn!("Failed to remove temporary artifact file: {e}");
    }
    uploaded?;

    info!("Uploaded {key} to bucket {}", self.bucket);
    Ok(key)
  }

  /// Streams the artifact into a temporary file and checks its signature.
  ///
  /// The file is deleted when the returned path is dropped.
  async fn download(&self, url: &str) -> Result<TempPath> {
    debug!("Downloading artifact from {url}");
    let mut response = check_status(self.http.get(url).send().await?)?;

    let (file, temp_path) = tempfile::Builder::new()
      .prefix("harvest-")
      .suffix(".pdf")
      .tempfile_in(&self.scratch_dir)?
      .into_parts();
    let mut file = tokio::fs::File::from_std(file);
    while let Some(chunk) = response.chunk().await? {
      file.write_all(&chunk).await?;
    }
    file.flush().await?;

    file.seek(SeekFrom::Start(0)).await?;
    let mut signature = [0u8; 4];
    let valid = match file.read_exact(&mut signature).await {
      Ok(_) => &signature == PDF_SIGNATURE,
      Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
      Err(e) => return Err(e.into()),
    };
    drop(file);

    if !valid {
      return Err(HarvestError::NotAnArtifact { url: url.to_string() });
    }
    Ok(temp_path)
  }
}
