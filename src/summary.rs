//! Execution summaries and the sinks they are published to.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::sync::lock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_entry(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.add_entry(key, value);
        self
    }

    pub fn add_entry(&mut self, key: &str, value: impl fmt::Display) {
        self.entries.push((key.to_owned(), value.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub title: String,
    pub description: Option<String>,
    pub sections: Vec<Section>,
}

impl Chapter {
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            description: None,
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub chapters: Vec<Chapter>,
}

impl Summary {
    #[must_use]
    pub fn new(title: &str, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            title: title.to_owned(),
            start_time,
            end_time,
            chapters: Vec::new(),
        }
    }

    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        self.end_time
            .signed_duration_since(self.start_time)
            .num_milliseconds()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(
            f,
            "  {} .. {} ({} ms)",
            self.start_time.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.end_time.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.duration_ms()
        )?;
        for chapter in &self.chapters {
            writeln!(f, "{}", chapter.title)?;
            if let Some(description) = &chapter.description {
                writeln!(f, "  {}", description)?;
            }
            for section in &chapter.sections {
                writeln!(f, "  {}", section.title)?;
                for (key, value) in &section.entries {
                    writeln!(f, "    {}: {}", key, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Receives summaries once a canvas finishes generating them.
pub trait SummarySink: Send + Sync {
    fn publish(&self, canvas_id: &str, summary: &Summary);
}

#[derive(Debug, Default)]
pub struct LogSummarySink;

impl SummarySink for LogSummarySink {
    fn publish(&self, canvas_id: &str, summary: &Summary) {
        info!("Summary for {}:\n{}", canvas_id, summary);
    }
}

/// Keeps every published summary in memory.
#[derive(Debug, Default)]
pub struct CollectingSummarySink {
    summaries: Mutex<Vec<(String, Summary)>>,
}

impl CollectingSummarySink {
    #[must_use]
    pub fn summaries(&self) -> Vec<(String, Summary)> {
        lock(&self.summaries).clone()
    }

    #[must_use]
    pub fn for_canvas(&self, canvas_id: &str) -> Option<Summary> {
        lock(&self.summaries)
            .iter()
            .rev()
            .find(|(id, _)| id == canvas_id)
            .map(|(_, summary)| summary.clone())
    }
}

impl SummarySink for CollectingSummarySink {
    fn publish(&self, canvas_id: &str, summary: &Summary) {
        lock(&self.summaries).push((canvas_id.to_owned(), summary.clone()));
    }
}
