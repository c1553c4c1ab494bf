//! Shared feedback dataset
//!
//! The dataset is one comma-delimited object. Appending reads the whole
//! object, adds a line and writes it back conditionally on the version
//! that was read, so a concurrent writer can never silently drop a line.

use crate::error::{EstimatorError, Result};
use crate::models::FeedbackRecord;
use crate::schema::{self, RawFeatures, FEATURE_COUNT};
use crate::storage::ObjectStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header written when the dataset is created
pub const FEEDBACK_HEADER: &str =
    "price,living_area,room_count,bedroom_count,bathroom_count,elevator,balcony,heritage,parking,energy_class";

/// Read-modify-write cycles attempted before giving up on contention
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// Outcome of an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Non-positive price; nothing was written
    Discarded,
}

/// Encode a record as one dataset line
pub fn encode_line(record: &FeedbackRecord) -> String {
    let f = &record.features;
    format!(
        "{},{},{},{},{},{},{},{},{},{}",
        record.price,
        f.living_area_m2,
        f.room_count,
        f.bedroom_count,
        f.bathroom_count,
        u8::from(f.has_elevator),
        u8::from(f.has_balcony),
        u8::from(f.is_heritage_listed),
        u8::from(f.has_parking),
        f.energy_class
    )
}

/// Parse one dataset line
pub fn parse_line(line: &str) -> Result<FeedbackRecord> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != FEATURE_COUNT + 1 {
        return Err(EstimatorError::Validation(format!(
            "expected {} fields, got {}",
            FEATURE_COUNT + 1,
            fields.len()
        )));
    }

    let price: f64 = fields[0]
        .parse()
        .map_err(|_| EstimatorError::Validation(format!("invalid price '{}'", fields[0])))?;

    let mut values = Vec::with_capacity(FEATURE_COUNT);
    for raw in &fields[1..] {
        let value: f64 = raw
            .parse()
            .map_err(|_| EstimatorError::Validation(format!("invalid value '{}'", raw)))?;
        values.push(value);
    }
    let features = schema::validate(&RawFeatures::positional(values))?;
    Ok(FeedbackRecord::new(features, price.round() as i64))
}

fn is_header(line: &str) -> bool {
    line.trim_start().starts_with("price")
}

/// Append-only dataset of user corrections
#[derive(Clone)]
pub struct FeedbackStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    conflict_retries: u32,
}

impl FeedbackStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries.max(1);
        self
    }

    pub fn location(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }

    /// Current dataset text and version; a missing object is empty
    async fn fetch(&self) -> Result<(String, Option<String>)> {
        match self.store.get(&self.bucket, &self.key).await {
            Ok(object) => {
                let text = String::from_utf8(object.data).map_err(|e| {
                    EstimatorError::Storage(format!(
                        "feedback dataset {} is not UTF-8: {}",
                        self.location(),
                        e
                    ))
                })?;
                Ok((text, Some(object.version)))
            }
            Err(EstimatorError::NotFound(_)) => {
                debug!(location = %self.location(), "Feedback dataset absent, starting empty");
                Ok((String::new(), None))
            }
            Err(e) => Err(e),
        }
    }

    /// Append one correction; `price <= 0` is discarded without a write
    pub async fn append(&self, record: &FeedbackRecord) -> Result<AppendOutcome> {
        if record.price <= 0 {
            debug!(price = record.price, "Discarding feedback without a positive price");
            return Ok(AppendOutcome::Discarded);
        }
        schema::validate_features(&record.features)?;
        let line = encode_line(record);

        for attempt in 1..=self.conflict_retries {
            let (existing, version) = self.fetch().await?;

            let mut lines: Vec<&str> = existing.lines().filter(|l| !l.trim().is_empty()).collect();
            if lines.is_empty() {
                lines.push(FEEDBACK_HEADER);
            }
            lines.push(&line);
            let mut body = lines.join("\n");
            body.push('\n');

            match self
                .store
                .put_if(&self.bucket, &self.key, body.into_bytes(), version.as_deref())
                .await
            {
                Ok(()) => {
                    debug!(location = %self.location(), attempt, "Feedback line appended");
                    return Ok(AppendOutcome::Appended);
                }
                Err(EstimatorError::Conflict(_)) => {
                    debug!(
                        location = %self.location(),
                        attempt,
                        "Feedback dataset changed concurrently, re-reading"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(EstimatorError::Conflict(self.location()))
    }

    /// All records; blank lines and the header are skipped, malformed lines dropped
    pub async fn read_all(&self) -> Result<Vec<FeedbackRecord>> {
        let (text, _) = self.fetch().await?;
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() || (records.is_empty() && is_header(line)) {
                continue;
            }
            match parse_line(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = idx + 1, error = %e, "Dropping malformed feedback line"),
            }
        }
        Ok(records)
    }
}
