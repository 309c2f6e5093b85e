//! Sequential on-disk store of encrypted vectors.
//!
//! Every record is a postcard encoded value inside a length prefixed frame,
//! so the store can be written and read back one record at a time whatever
//! the size of the database.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use feature_vectors::FeatureVector;
use futures::{SinkExt, StreamExt};
use he::encode;
use he::traits::HomomorphicEngine;
use log::{debug, info, warn};
use rand::CryptoRng;
use serde::{Serialize, de::DeserializeOwned};
use tokio::fs::File;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Largest accepted record (64 MiB)
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

fn record_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_RECORD_LEN)
        .new_codec()
}

pub struct StoreWriter {
    path: PathBuf,
    writer: FramedWrite<File, LengthDelimitedCodec>,
    written: u64,
}

impl StoreWriter {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .with_context(|| format!("Failed to create store {}", path.display()))?;

        Ok(Self {
            path,
            writer: FramedWrite::new(file, record_codec()),
            written: 0,
        })
    }

    /// Serialize `record` and write it as one frame.
    pub async fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let serialized = postcard::to_stdvec(record)
            .with_context(|| format!("Serialization failed for record {}", self.written))?;
        self.writer
            .send(Bytes::from(serialized))
            .await
            .with_context(|| format!("Failed to write record {}", self.written))?;
        self.written += 1;
        Ok(())
    }

    /// Flush everything to disk and return the number of records written.
    pub async fn finish(mut self) -> Result<u64> {
        SinkExt::<Bytes>::flush(&mut self.writer)
            .await
            .with_context(|| format!("Failed to flush store {}", self.path.display()))?;
        self.writer
            .into_inner()
            .sync_all()
            .await
            .with_context(|| format!("Failed to sync store {}", self.path.display()))?;
        Ok(self.written)
    }
}

/// Forward-only reader. Only the record being decoded is held in memory.
pub struct StoreReader {
    reader: FramedRead<File, LengthDelimitedCodec>,
    records_read: u64,
    truncated: bool,
    done: bool,
}

impl StoreReader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .with_context(|| format!("Cannot open store {}", path.display()))?;

        Ok(Self {
            reader: FramedRead::new(file, record_codec()),
            records_read: 0,
            truncated: false,
            done: false,
        })
    }

    /// Next record, or `None` at the end of the store.
    ///
    /// A truncated or undecodable record ends the stream: the records read
    /// so far are kept and [`StoreReader::truncated`] reports the cut.
    pub async fn next_record<T: DeserializeOwned>(&mut self) -> Option<T> {
        if self.done {
            return None;
        }

        let frame = match self.reader.next().await {
            None => {
                self.done = true;
                return None;
            }
            Some(Ok(frame)) => frame,
            Some(Err(error)) => {
                warn!(
                    "Store is truncated after {} records : {}",
                    self.records_read, error
                );
                self.truncated = true;
                self.done = true;
                return None;
            }
        };

        match postcard::from_bytes::<T>(&frame) {
            Ok(record) => {
                self.records_read += 1;
                Some(record)
            }
            Err(error) => {
                warn!(
                    "Malformed record {} in store, stop reading : {}",
                    self.records_read, error
                );
                self.truncated = true;
                self.done = true;
                None
            }
        }
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// Encode, encrypt and store every vector of `vectors`, in order.
///
/// A store that could not be written entirely is deleted before the error
/// is returned.
pub async fn write_encrypted<E, R>(
    engine: &E,
    rng: &mut R,
    pk: &E::PublicKey,
    vectors: &[FeatureVector],
    path: impl AsRef<Path>,
) -> Result<u64>
where
    E: HomomorphicEngine,
    R: CryptoRng + ?Sized,
{
    let path = path.as_ref().to_path_buf();
    info!(
        "Encrypting {} vectors to {}",
        vectors.len(),
        path.display()
    );
    let mut writer = StoreWriter::create(&path).await?;

    let written = async {
        for (i, vector) in vectors.iter().enumerate() {
            let ct = engine
                .encrypt(&mut *rng, pk, &encode(vector.as_slice()))
                .with_context(|| format!("Failed to encrypt vector {}", i))?;
            writer.append(&ct).await?;
            debug!("Stored vector {}", i);
        }
        writer.finish().await
    }
    .await;

    match written {
        Ok(count) => {
            info!("Database encrypted to {}", path.display());
            Ok(count)
        }
        Err(error) => {
            // Partial stores are never valid
            remove_store(&path).await;
            Err(error)
        }
    }
}

/// Delete a store. Failing to do so is not fatal.
pub async fn remove_store(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed store {}", path.display()),
        Err(error) => warn!(
            "Could not delete temporary store {} : {}",
            path.display(),
            error
        ),
    }
}
