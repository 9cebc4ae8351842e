//! Object-store bucket access: listing, CSV reads, and batch writes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, info};

use crate::core::types::FileFormat;
use crate::io::frame::{CsvTable, decode_csv, encode_batch};

/// Handle to one bucket on one endpoint.
#[derive(Clone)]
pub struct BucketConnector {
    store: Arc<dyn ObjectStore>,
    endpoint_url: String,
    bucket: String,
}

impl std::fmt::Debug for BucketConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketConnector")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl BucketConnector {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        endpoint_url: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            endpoint_url: endpoint_url.into(),
            bucket: bucket.into(),
        }
    }

    /// Connector backed by a fresh in-memory store.
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemory::new()), "memory://", bucket)
    }

    /// Connect to `bucket` behind `endpoint_url`.
    ///
    /// `file://<dir>` maps the bucket to `<dir>/<bucket>` (which must exist),
    /// `memory://` creates an empty in-memory store, anything else is an S3
    /// endpoint with credentials taken from the AWS environment variables.
    pub fn connect(endpoint_url: &str, bucket: &str, region: Option<&str>) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = if let Some(dir) = endpoint_url.strip_prefix("file://") {
            let root = PathBuf::from(dir).join(bucket);
            Arc::new(
                LocalFileSystem::new_with_prefix(&root)
                    .with_context(|| format!("open local bucket {}", root.display()))?,
            )
        } else if endpoint_url.starts_with("memory://") {
            Arc::new(InMemory::new())
        } else {
            let mut builder = AmazonS3Builder::from_env()
                .with_endpoint(endpoint_url)
                .with_bucket_name(bucket);
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            Arc::new(
                builder
                    .build()
                    .with_context(|| format!("configure s3 bucket {endpoint_url}/{bucket}"))?,
            )
        };
        debug!(endpoint = endpoint_url, bucket, "bucket connected");
        Ok(Self::new(store, endpoint_url, bucket))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// All keys starting with `prefix` (plain string match), sorted.
    pub async fn list_files_in_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.list_files_in_prefixes(&[prefix]).await
    }

    /// All keys starting with any of `prefixes`, sorted and deduplicated.
    ///
    /// Each parent "directory" is listed once however many prefixes share it,
    /// so per-date prefixes at the bucket root cost one root listing in total.
    pub async fn list_files_in_prefixes<S: AsRef<str>>(
        &self,
        prefixes: &[S],
    ) -> Result<Vec<String>> {
        // Object stores list by path segment; list the parent "directory" and
        // filter so `2024-03-12` matches `2024-03-12/x.csv` and `2024-03-12.csv`.
        let mut by_parent: BTreeMap<Option<&str>, Vec<&str>> = BTreeMap::new();
        for prefix in prefixes {
            let prefix = prefix.as_ref();
            let parent = prefix.rsplit_once('/').map(|(dir, _)| dir);
            by_parent.entry(parent).or_default().push(prefix);
        }

        let mut keys = BTreeSet::new();
        for (parent, group) in by_parent {
            let parent = parent.map(ObjectPath::from);
            let listing = self
                .store
                .list_with_delimiter(parent.as_ref())
                .await
                .with_context(|| {
                    let dir = parent.as_ref().map(ToString::to_string).unwrap_or_default();
                    format!("list {}/{}/{dir}", self.endpoint_url, self.bucket)
                })?;

            keys.extend(
                listing
                    .objects
                    .iter()
                    .map(|meta| meta.location.to_string())
                    .filter(|key| starts_with_any(key, &group)),
            );
            for dir in listing
                .common_prefixes
                .iter()
                .filter(|dir| starts_with_any(&dir.to_string(), &group))
            {
                let nested: Vec<String> = self
                    .store
                    .list(Some(dir))
                    .map_ok(|meta| meta.location.to_string())
                    .try_collect()
                    .await
                    .with_context(|| format!("list {}/{}/{dir}", self.endpoint_url, self.bucket))?;
                keys.extend(nested);
            }
        }
        let keys: Vec<String> = keys.into_iter().collect();
        debug!(prefixes = prefixes.len(), count = keys.len(), "listed keys");
        Ok(keys)
    }

    /// Fetch an object; `None` when the key does not exist.
    pub async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        let location = ObjectPath::from(key);
        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("get {}/{}/{key}", self.endpoint_url, self.bucket)
                });
            }
        };
        let body = result
            .bytes()
            .await
            .with_context(|| format!("read body {}/{}/{key}", self.endpoint_url, self.bucket))?;
        Ok(Some(body))
    }

    /// Read a CSV object; a missing key is an error.
    pub async fn read_csv(&self, key: &str, separator: u8) -> Result<CsvTable> {
        self.read_csv_if_exists(key, separator)
            .await?
            .with_context(|| format!("no such key {}/{}/{key}", self.endpoint_url, self.bucket))
    }

    /// Read a CSV object; `None` when the key does not exist.
    pub async fn read_csv_if_exists(&self, key: &str, separator: u8) -> Result<Option<CsvTable>> {
        info!(endpoint = %self.endpoint_url, bucket = %self.bucket, key, "reading file");
        let Some(body) = self.get_object(key).await? else {
            return Ok(None);
        };
        let table = decode_csv(&body, separator).with_context(|| format!("parse csv {key}"))?;
        Ok(Some(table))
    }

    /// Write `batch` to `key` in `format`.
    ///
    /// Returns `false` without writing when the batch has no rows.
    pub async fn write_batch(
        &self,
        batch: &RecordBatch,
        key: &str,
        format: FileFormat,
    ) -> Result<bool> {
        if batch.num_rows() == 0 {
            info!(key, "the dataframe is empty, no file will be written");
            return Ok(false);
        }
        let body = encode_batch(batch, format).with_context(|| format!("encode {format} {key}"))?;
        self.put_object(body, key).await?;
        Ok(true)
    }

    async fn put_object(&self, body: Vec<u8>, key: &str) -> Result<()> {
        info!(
            endpoint = %self.endpoint_url,
            bucket = %self.bucket,
            key,
            bytes = body.len(),
            "writing file"
        );
        self.store
            .put(&ObjectPath::from(key), PutPayload::from(body))
            .await
            .with_context(|| format!("put {}/{}/{key}", self.endpoint_url, self.bucket))?;
        Ok(())
    }

    /// Store raw bytes, bypassing encoding. Used to seed fixtures.
    pub async fn put_bytes(&self, key: &str, body: impl Into<Vec<u8>>) -> Result<()> {
        self.put_object(body.into(), key).await
    }
}

fn starts_with_any(key: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| key.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(keys: &[&str]) -> BucketConnector {
        let bucket = BucketConnector::in_memory("test-bucket");
        for key in keys {
            bucket
                .put_bytes(key, "col1,col2\nvalA,valB")
                .await
                .expect("put");
        }
        bucket
    }

    #[tokio::test]
    async fn list_files_in_prefix_matches_string_prefix() {
        let bucket = seeded(&[
            "prefix/test1.csv",
            "prefix/test2.csv",
            "prefix_other.csv",
            "other/test3.csv",
        ])
        .await;

        let keys = bucket.list_files_in_prefix("prefix/").await.expect("list");
        assert_eq!(keys, vec!["prefix/test1.csv", "prefix/test2.csv"]);

        let keys = bucket.list_files_in_prefix("prefix").await.expect("list");
        assert_eq!(
            keys,
            vec!["prefix/test1.csv", "prefix/test2.csv", "prefix_other.csv"]
        );
    }

    #[tokio::test]
    async fn list_files_in_prefix_matches_partial_file_name() {
        let bucket = seeded(&[
            "report1/xetra_daily_report1_20240315_120000.parquet",
            "report1/other.parquet",
        ])
        .await;
        let keys = bucket
            .list_files_in_prefix("report1/xetra_daily_report1_")
            .await
            .expect("list");
        assert_eq!(keys, vec!["report1/xetra_daily_report1_20240315_120000.parquet"]);
    }

    #[tokio::test]
    async fn list_files_in_prefixes_merges_dates_in_order() {
        let bucket = seeded(&[
            "2024-03-13/2024-03-13_BINS_XETR09.csv",
            "2024-03-12/2024-03-12_BINS_XETR13.csv",
            "2024-03-12/2024-03-12_BINS_XETR08.csv",
            "2024-03-11/2024-03-11_BINS_XETR12.csv",
            "2024-03-12.csv",
            "meta_file.csv",
        ])
        .await;

        let keys = bucket
            .list_files_in_prefixes(&["2024-03-13", "2024-03-12", "2024-03-12"])
            .await
            .expect("list");
        assert_eq!(
            keys,
            vec![
                "2024-03-12.csv",
                "2024-03-12/2024-03-12_BINS_XETR08.csv",
                "2024-03-12/2024-03-12_BINS_XETR13.csv",
                "2024-03-13/2024-03-13_BINS_XETR09.csv",
            ]
        );
    }

    #[tokio::test]
    async fn list_files_in_prefixes_groups_by_parent() {
        let bucket = seeded(&["a/x1.csv", "a/y1.csv", "b/x2.csv", "x3.csv"]).await;
        let keys = bucket
            .list_files_in_prefixes(&["a/x", "b/", "x"])
            .await
            .expect("list");
        assert_eq!(keys, vec!["a/x1.csv", "b/x2.csv", "x3.csv"]);

        let none: [&str; 0] = [];
        assert!(bucket.list_files_in_prefixes(&none).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn list_files_in_unknown_prefix_is_empty() {
        let bucket = seeded(&["prefix/test1.csv"]).await;
        let keys = bucket.list_files_in_prefix("no-prefix/").await.expect("list");
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn read_csv_decodes_object() {
        let bucket = seeded(&["test.csv"]).await;
        let table = bucket.read_csv("test.csv", b',').await.expect("read");
        assert_eq!(table.columns, vec!["col1", "col2"]);
        assert_eq!(table.column("col2"), Some(vec![Some("valB")]));
    }

    #[tokio::test]
    async fn read_csv_missing_key_fails_but_if_exists_is_none() {
        let bucket = BucketConnector::in_memory("test-bucket");
        assert!(bucket.read_csv("missing.csv", b',').await.is_err());
        let missing = bucket
            .read_csv_if_exists("missing.csv", b',')
            .await
            .expect("read");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn write_batch_skips_empty_batch() {
        let bucket = BucketConnector::in_memory("test-bucket");
        let table = CsvTable::new(vec!["col1".to_string()]);
        let written = bucket
            .write_batch(&table.to_batch().expect("batch"), "empty.csv", FileFormat::Csv)
            .await
            .expect("write");
        assert!(!written);
        assert!(bucket.get_object("empty.csv").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn write_batch_then_read_csv() {
        let bucket = BucketConnector::in_memory("test-bucket");
        let mut table = CsvTable::new(vec!["col1".to_string(), "col2".to_string()]);
        table
            .rows
            .push(vec![Some("A".to_string()), Some("B".to_string())]);
        let written = bucket
            .write_batch(&table.to_batch().expect("batch"), "out/test.csv", FileFormat::Csv)
            .await
            .expect("write");
        assert!(written);
        let read = bucket.read_csv("out/test.csv", b',').await.expect("read");
        assert_eq!(read, table);
    }

    #[tokio::test]
    async fn local_endpoint_requires_existing_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let endpoint = format!("file://{}", temp.path().display());
        assert!(BucketConnector::connect(&endpoint, "absent", None).is_err());

        std::fs::create_dir(temp.path().join("present")).expect("mkdir");
        let bucket = BucketConnector::connect(&endpoint, "present", None).expect("connect");
        bucket.put_bytes("2024-03-12/a.csv", "x\n1\n").await.expect("put");
        let keys = bucket.list_files_in_prefix("2024-03-12").await.expect("list");
        assert_eq!(keys, vec!["2024-03-12/a.csv"]);
    }
}
