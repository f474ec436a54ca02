use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use hdrhistogram::Histogram;
use hdrhistogram::serialization::{Deserializer, Serializer, V2Serializer};
use std::io::Cursor;

use crate::error::{AppError, AppResult, ComponentError};

fn statistic_error(message: String) -> AppError {
    AppError::component(ComponentError::Statistic { message })
}

#[derive(Debug, Clone)]
pub struct ValueHistogram {
    hist: Histogram<u64>,
}

impl ValueHistogram {
    /// Create an empty histogram with three significant digits.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> AppResult<Self> {
        let hist = Histogram::<u64>::new(3)
            .map_err(|err| statistic_error(format!("Failed to create histogram: {}", err)))?;
        Ok(Self { hist })
    }

    /// Record a sample. Negative samples are clamped to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be recorded.
    pub fn record(&mut self, value: i64) -> AppResult<()> {
        let value = u64::try_from(value).unwrap_or(0);
        self.hist
            .record(value)
            .map_err(|err| statistic_error(format!("Failed to record value: {}", err)))
    }

    /// Merge another histogram into this one.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge fails.
    pub fn merge(&mut self, other: &Self) -> AppResult<()> {
        self.hist
            .add(&other.hist)
            .map_err(|err| statistic_error(format!("Failed to merge histogram: {}", err)))
    }

    /// Median and 90th percentile.
    #[must_use]
    pub fn percentiles(&self) -> (u64, u64) {
        if self.count() == 0 {
            return (0, 0);
        }
        (
            self.hist.value_at_quantile(0.5),
            self.hist.value_at_quantile(0.9),
        )
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    pub fn reset(&mut self) {
        self.hist.reset();
    }

    /// Encode the histogram as base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be serialized.
    pub fn encode_base64(&self) -> AppResult<String> {
        let mut buffer = Vec::new();
        V2Serializer::new()
            .serialize(&self.hist, &mut buffer)
            .map_err(|err| statistic_error(format!("Failed to serialize histogram: {}", err)))?;
        Ok(B64.encode(buffer))
    }

    /// Decode a base64 histogram payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be decoded or deserialized.
    pub fn decode_base64(encoded: &str) -> AppResult<Self> {
        let bytes = B64
            .decode(encoded.as_bytes())
            .map_err(|err| statistic_error(format!("Failed to decode histogram: {}", err)))?;
        let mut cursor = Cursor::new(bytes);
        let hist: Histogram<u64> = Deserializer::new()
            .deserialize(&mut cursor)
            .map_err(|err| statistic_error(format!("Failed to deserialize histogram: {}", err)))?;
        Ok(Self { hist })
    }
}
