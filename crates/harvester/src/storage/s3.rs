//! S3-backed [`ObjectStore`].

use aws_sdk_s3::{
  error::DisplayErrorContext,
  primitives::ByteStream,
  types::{BucketLocationConstraint, CreateBucketConfiguration},
  Client,
};

use super::*;

/// Region in which buckets must be created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Maps any SDK error to an object store error, keeping the full cause chain.
fn store_error(context: &str, err: impl std::error::Error) -> HarvestError {
  HarvestError::ObjectStore(format!("{context}: {}", DisplayErrorContext(err)))
}

/// An [`ObjectStore`] on S3.
#[derive(Debug, Clone)]
pub struct S3Store {
  /// SDK client
  client: Client,
  /// Region buckets are created in
  region: Option<String>,
  /// Deadline for buckets and objects to appear or disappear
  wait:   Duration,
}

impl S3Store {
  /// Creates a store from a loaded AWS configuration.
  pub fn new(sdk_config: &aws_config::SdkConfig, wait: Duration) -> Self {
    Self {
      client: Client::new(sdk_config),
      region: sdk_config.region().map(ToString::to_string),
      wait,
    }
  }

  /// Whether a bucket exists.
  async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
    match self.client.head_bucket().bucket(bucket).send().await {
      Ok(_) => Ok(true),
      Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
      Err(err) => Err(store_error("head bucket failed", err)),
    }
  }

  /// Whether an object exists.
  async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
    match self.client.head_object().bucket(bucket).key(key).send().await {
      Ok(_) => Ok(true),
      Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
      Err(err) => Err(store_error("head object failed", err)),
    }
  }
}

#[async_trait]
impl ObjectStore for S3Store {
  async fn list_buckets(&self) -> Result<Vec<String>> {
    let output =
      self.client.list_buckets().send().await.map_err(|e| store_error("list buckets failed", e))?;
    Ok(output.buckets().iter().filter_map(|b| b.name().map(str::to_string)).collect())
  }

  async fn create_bucket(&self, bucket: &str) -> Result<()> {
    let mut request = self.client.create_bucket().bucket(bucket);
    if let Some(region) = self.region.as_deref().filter(|r| *r != DEFAULT_REGION) {
      request = request.create_bucket_configuration(
        CreateBucketConfiguration::builder()
          .location_constraint(BucketLocationConstraint::from(region))
          .build(),
      );
    }
    request.send().await.map_err(|e| store_error("create bucket failed", e))?;

    info!("Waiting for bucket {bucket} to be created");
    poll_until(&format!("bucket {bucket} to exist"), self.wait, || self.bucket_exists(bucket)).await
  }

  async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
    let body =
      ByteStream::from_path(path).await.map_err(|e| store_error("failed to open artifact", e))?;
    self
      .client
      .put_object()
      .bucket(bucket)
      .key(key)
      .content_type("application/pdf")
      .body(body)
      .send()
      .await
      .map_err(|e| store_error("upload failed", e))?;

    debug!("Waiting for s3://{bucket}/{key} to become visible");
    poll_until(&format!("object {key} to exist"), self.wait, || self.object_exists(bucket, key))
      .await
  }

  async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut continuation = None;
    loop {
      let output = self
        .client
        .list_objects_v2()
        .bucket(bucket)
        .set_continuation_token(continuation.take())
        .send()
        .await
        .map_err(|e| store_error("list objects failed", e))?;
      keys.extend(output.contents().iter().filter_map(|o| o.key().map(str::to_string)));
      match output.next_continuation_token() {
        Some(token) => continuation = Some(token.to_string()),
        None => break,
      }
    }
    Ok(keys)
  }

  async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
    self
      .client
      .delete_object()
      .bucket(bucket)
      .key(key)
      .send()
      .await
      .map_err(|e| store_error("delete object failed", e))?;

    poll_until(&format!("object {key} to be deleted"), self.wait, || async {
      self.object_exists(bucket, key).await.map(|exists| !exists)
    })
    .await
  }

  async fn delete_bucket(&self, bucket: &str) -> Result<()> {
    self
      .client
      .delete_bucket()
      .bucket(bucket)
      .send()
      .await
      .map_err(|e| store_error("delete bucket failed", e))?;

    poll_until(&format!("bucket {bucket} to be deleted"), self.wait, || async {
      self.bucket_exists(bucket).await.map(|exists| !exists)
    })
    .await
  }
}
