use crate::models::TripFileDescriptor;
use crate::utils::arrow::encode_row;
use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use common::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const FILE_NAME_COLUMN: &str = "_file_name";
pub const LOAD_TIMESTAMP_COLUMN: &str = "_load_timestamp";
pub const RECORD_HASH_COLUMN: &str = "_record_hash";

/// Attaches provenance metadata to every row of a batch: source filename,
/// batch-level load timestamp, and a per-record content hash.
pub struct LineageTagger;

impl LineageTagger {
    pub fn new() -> Self {
        Self
    }

    /// Append the three lineage columns and return the tagged batch together
    /// with the batch's content hash. The hash covers only the source data,
    /// never the load timestamp, so identical input always hashes identically.
    pub fn tag(
        &self,
        batch: &RecordBatch,
        descriptor: &TripFileDescriptor,
        load_timestamp: DateTime<Utc>,
    ) -> Result<(RecordBatch, String)> {
        let num_rows = batch.num_rows();

        let mut batch_hasher = Sha256::new();
        let mut record_hashes = Vec::with_capacity(num_rows);
        let mut row_buf = Vec::new();

        for row_idx in 0..num_rows {
            row_buf.clear();
            encode_row(batch, row_idx, &mut row_buf)?;
            batch_hasher.update(&row_buf);
            record_hashes.push(format!("{:x}", Sha256::digest(&row_buf)));
        }

        let content_hash = format!("{:x}", batch_hasher.finalize());

        let mut fields: Vec<FieldRef> = batch.schema().fields().iter().cloned().collect();
        fields.push(Arc::new(Field::new(FILE_NAME_COLUMN, DataType::Utf8, false)));
        fields.push(Arc::new(Field::new(
            LOAD_TIMESTAMP_COLUMN,
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        )));
        fields.push(Arc::new(Field::new(RECORD_HASH_COLUMN, DataType::Utf8, false)));

        let load_micros = load_timestamp.timestamp_micros();
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        columns.push(Arc::new(StringArray::from_iter_values(
            std::iter::repeat(descriptor.filename.as_str()).take(num_rows),
        )));
        columns.push(Arc::new(TimestampMicrosecondArray::from(vec![
            load_micros;
            num_rows
        ])));
        columns.push(Arc::new(StringArray::from_iter_values(
            record_hashes.iter().map(String::as_str),
        )));

        let tagged = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;

        Ok((tagged, content_hash))
    }
}

impl Default for LineageTagger {
    fn default() -> Self {
        Self::new()
    }
}

/// Running digest over a whole file's canonical row bytes, fed batch by batch
/// in source order. The final hash depends only on file content, not on the
/// batch size the loader happened to use.
pub struct FileHasher {
    hasher: Sha256,
}

impl FileHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let mut row_buf = Vec::new();
        for row_idx in 0..batch.num_rows() {
            row_buf.clear();
            encode_row(batch, row_idx, &mut row_buf)?;
            self.hasher.update(&row_buf);
        }
        Ok(())
    }

    pub fn finalize(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl Default for FileHasher {
    fn default() -> Self {
        Self::new()
    }
}
