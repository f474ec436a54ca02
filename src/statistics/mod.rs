//! Statistic variables and the writers that aggregate their samples.

mod histogram;
mod writers;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{AppError, AppResult, ComponentError};
use crate::sync::lock;

pub use histogram::ValueHistogram;
pub use writers::{AverageStatisticWriter, CounterStatisticsWriter};

/// Aggregates samples of one statistic variable.
pub trait StatisticsWriter: Send + Sync {
    fn writer_type(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns an error if the sample cannot be recorded.
    fn update(&self, value: i64) -> AppResult<()>;

    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized.
    fn snapshot(&self) -> AppResult<Value>;

    /// Fold a snapshot taken on another node into this writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is malformed.
    fn merge(&self, remote: &Value) -> AppResult<()>;

    fn reset(&self);
}

fn malformed_snapshot(message: &str) -> AppError {
    AppError::component(ComponentError::Statistic {
        message: format!("Malformed statistics snapshot: {}", message),
    })
}

/// Build a writer by its registered type name.
///
/// # Errors
///
/// Returns an error for unknown writer types.
pub fn create_writer(writer_type: &str) -> AppResult<Arc<dyn StatisticsWriter>> {
    match writer_type {
        CounterStatisticsWriter::TYPE => Ok(Arc::new(CounterStatisticsWriter::default())),
        AverageStatisticWriter::TYPE => Ok(Arc::new(AverageStatisticWriter::new()?)),
        other => Err(AppError::component(ComponentError::UnknownWriterType {
            writer_type: other.to_owned(),
        })),
    }
}

pub struct StatisticVariable {
    name: String,
    writers: Mutex<Vec<Arc<dyn StatisticsWriter>>>,
}

impl std::fmt::Debug for StatisticVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticVariable")
            .field("name", &self.name)
            .finish()
    }
}

impl StatisticVariable {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            writers: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a writer of the given type, reusing an existing one.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown writer types.
    pub fn add_writer(&self, writer_type: &str) -> AppResult<Arc<dyn StatisticsWriter>> {
        if let Some(existing) = self.writer(writer_type) {
            return Ok(existing);
        }
        let writer = create_writer(writer_type)?;
        lock(&self.writers).push(Arc::clone(&writer));
        Ok(writer)
    }

    #[must_use]
    pub fn writer(&self, writer_type: &str) -> Option<Arc<dyn StatisticsWriter>> {
        lock(&self.writers)
            .iter()
            .find(|writer| writer.writer_type() == writer_type)
            .cloned()
    }

    #[must_use]
    pub fn writer_types(&self) -> Vec<&'static str> {
        lock(&self.writers)
            .iter()
            .map(|writer| writer.writer_type())
            .collect()
    }

    pub fn update(&self, value: i64) {
        let writers = lock(&self.writers).clone();
        for writer in writers {
            if let Err(err) = writer.update(value) {
                warn!("Statistic '{}' dropped a sample: {}", self.name, err);
            }
        }
    }

    /// Snapshot of every writer keyed by writer type.
    ///
    /// # Errors
    ///
    /// Returns an error if a writer cannot be serialized.
    pub fn snapshot(&self) -> AppResult<BTreeMap<String, Value>> {
        let writers = lock(&self.writers).clone();
        let mut snapshot = BTreeMap::new();
        for writer in writers {
            snapshot.insert(writer.writer_type().to_owned(), writer.snapshot()?);
        }
        Ok(snapshot)
    }

    pub fn reset(&self) {
        for writer in lock(&self.writers).iter() {
            writer.reset();
        }
    }

    /// Fold a snapshot of a remote writer into the local writer of the same
    /// type, attaching one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown writer types or malformed snapshots.
    pub fn merge(&self, writer_type: &str, remote: &Value) -> AppResult<()> {
        self.add_writer(writer_type)?.merge(remote)
    }

    fn release(&self) {
        lock(&self.writers).clear();
    }
}

/// Statistic variables owned by a component or canvas.
#[derive(Debug, Default)]
pub struct StatisticHolder {
    variables: Mutex<BTreeMap<String, Arc<StatisticVariable>>>,
}

impl StatisticHolder {
    /// Get or create a variable.
    pub fn add_variable(&self, name: &str) -> Arc<StatisticVariable> {
        Arc::clone(
            lock(&self.variables)
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(StatisticVariable::new(name))),
        )
    }

    /// Create a variable with a single writer attached.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown writer types.
    pub fn add_variable_with_writer(
        &self,
        name: &str,
        writer_type: &str,
    ) -> AppResult<Arc<StatisticVariable>> {
        let variable = self.add_variable(name);
        variable.add_writer(writer_type)?;
        Ok(variable)
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<Arc<StatisticVariable>> {
        lock(&self.variables).get(name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        lock(&self.variables).keys().cloned().collect()
    }

    pub fn reset(&self) {
        for variable in lock(&self.variables).values() {
            variable.reset();
        }
    }

    /// Every variable's writer snapshots, as `{ variable: { writer type: snapshot } }`.
    ///
    /// # Errors
    ///
    /// Returns an error if a writer cannot be serialized.
    pub fn snapshot(&self) -> AppResult<Value> {
        let variables: Vec<Arc<StatisticVariable>> =
            lock(&self.variables).values().cloned().collect();
        let mut snapshot = Map::new();
        for variable in variables {
            let writers: Map<String, Value> = variable.snapshot()?.into_iter().collect();
            snapshot.insert(variable.name().to_owned(), Value::Object(writers));
        }
        Ok(Value::Object(snapshot))
    }

    /// Merge a [`StatisticHolder::snapshot`] taken on another node.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is not shaped like a holder snapshot
    /// or a writer rejects its part.
    pub fn merge(&self, remote: &Value) -> AppResult<()> {
        let Some(variables) = remote.as_object() else {
            return Err(malformed_snapshot("holder snapshot is not an object"));
        };
        for (name, writers) in variables {
            let Some(writers) = writers.as_object() else {
                return Err(malformed_snapshot(&format!(
                    "variable '{}' is not an object",
                    name
                )));
            };
            let variable = self.add_variable(name);
            for (writer_type, snapshot) in writers {
                variable.merge(writer_type, snapshot)?;
            }
        }
        Ok(())
    }

    /// Detach every writer and forget all variables.
    pub fn release(&self) {
        let variables: Vec<Arc<StatisticVariable>> =
            lock(&self.variables).values().cloned().collect();
        for variable in &variables {
            variable.release();
        }
        lock(&self.variables).clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.variables).is_empty()
    }
}
