use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::{Value, json};

use crate::error::{AppError, AppResult, ComponentError};
use crate::sync::lock;

use super::StatisticsWriter;
use super::histogram::ValueHistogram;

/// Tracks the latest value of a monotonically growing counter.
#[derive(Debug, Default)]
pub struct CounterStatisticsWriter {
    total: AtomicI64,
}

impl CounterStatisticsWriter {
    pub const TYPE: &'static str = "COUNTER";
}

impl StatisticsWriter for CounterStatisticsWriter {
    fn writer_type(&self) -> &'static str {
        Self::TYPE
    }

    fn update(&self, value: i64) -> AppResult<()> {
        self.total.store(value, Ordering::SeqCst);
        Ok(())
    }

    fn snapshot(&self) -> AppResult<Value> {
        Ok(json!({ "total": self.total.load(Ordering::SeqCst) }))
    }

    fn merge(&self, remote: &Value) -> AppResult<()> {
        let Some(remote_total) = remote.get("total").and_then(Value::as_i64) else {
            return Err(AppError::component(ComponentError::Statistic {
                message: "Counter snapshot is missing 'total'".to_owned(),
            }));
        };
        let mut current = self.total.load(Ordering::SeqCst);
        loop {
            match self.total.compare_exchange(
                current,
                current.saturating_add(remote_total),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn reset(&self) {
        self.total.store(0, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct AverageState {
    count: i64,
    sum: i64,
    min: Option<i64>,
    max: Option<i64>,
    histogram: ValueHistogram,
}

/// Average of every sample plus median and 90th percentile.
#[derive(Debug)]
pub struct AverageStatisticWriter {
    state: Mutex<AverageState>,
}

impl AverageStatisticWriter {
    pub const TYPE: &'static str = "AVERAGE";

    /// # Errors
    ///
    /// Returns an error if the backing histogram cannot be created.
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            state: Mutex::new(AverageState {
                count: 0,
                sum: 0,
                min: None,
                max: None,
                histogram: ValueHistogram::new()?,
            }),
        })
    }
}

impl StatisticsWriter for AverageStatisticWriter {
    fn writer_type(&self) -> &'static str {
        Self::TYPE
    }

    fn update(&self, value: i64) -> AppResult<()> {
        let mut state = lock(&self.state);
        state.count = state.count.saturating_add(1);
        state.sum = state.sum.saturating_add(value);
        state.min = Some(state.min.map_or(value, |min| min.min(value)));
        state.max = Some(state.max.map_or(value, |max| max.max(value)));
        state.histogram.record(value)
    }

    fn snapshot(&self) -> AppResult<Value> {
        let state = lock(&self.state);
        let (median, p90) = state.histogram.percentiles();
        Ok(json!({
            "count": state.count,
            "sum": state.sum,
            "average": state.sum.checked_div(state.count).unwrap_or(0),
            "min": state.min,
            "max": state.max,
            "median": median,
            "p90": p90,
            "histogram": state.histogram.encode_base64()?,
        }))
    }

    fn merge(&self, remote: &Value) -> AppResult<()> {
        let encoded = remote
            .get("histogram")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::component(ComponentError::Statistic {
                    message: "Average snapshot is missing 'histogram'".to_owned(),
                })
            })?;
        let remote_histogram = ValueHistogram::decode_base64(encoded)?;
        let count = remote.get("count").and_then(Value::as_i64).unwrap_or(0);
        let sum = remote.get("sum").and_then(Value::as_i64).unwrap_or(0);

        let mut state = lock(&self.state);
        state.histogram.merge(&remote_histogram)?;
        state.count = state.count.saturating_add(count);
        state.sum = state.sum.saturating_add(sum);
        if let Some(remote_min) = remote.get("min").and_then(Value::as_i64) {
            state.min = Some(state.min.map_or(remote_min, |min| min.min(remote_min)));
        }
        if let Some(remote_max) = remote.get("max").and_then(Value::as_i64) {
            state.max = Some(state.max.map_or(remote_max, |max| max.max(remote_max)));
        }
        Ok(())
    }

    fn reset(&self) {
        let mut state = lock(&self.state);
        state.count = 0;
        state.sum = 0;
        state.min = None;
        state.max = None;
        state.histogram.reset();
    }
}
