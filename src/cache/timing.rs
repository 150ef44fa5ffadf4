//! Per-request timing collection rendered as a `Server-Timing` header.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub name: String,
    pub desc: String,
    pub duration: Duration,
}

/// Shared collector; clones record into the same list.
#[derive(Debug, Clone, Default)]
pub struct Timings {
    records: Arc<Mutex<Vec<TimingRecord>>>,
}

impl Timings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: impl Into<String>, desc: impl Into<String>, duration: Duration) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TimingRecord {
                name: name.into(),
                desc: desc.into(),
                duration,
            });
    }

    /// Await `future` and record how long it took.
    pub async fn time<F, T>(&self, name: impl Into<String>, desc: impl Into<String>, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = future.await;
        self.record(name, desc, started.elapsed());
        output
    }

    pub fn records(&self) -> Vec<TimingRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `Server-Timing` header value, or `None` when nothing was recorded.
    pub fn header_value(&self) -> Option<String> {
        let records = self.records();
        if records.is_empty() {
            return None;
        }
        let parts: Vec<String> = records
            .iter()
            .map(|record| {
                format!(
                    "{};desc=\"{}\";dur={:.1}",
                    metric_token(&record.name),
                    record.desc.replace('"', "'"),
                    record.duration.as_secs_f64() * 1000.0
                )
            })
            .collect();
        Some(parts.join(","))
    }
}

/// Server-Timing names are HTTP tokens; cache keys contain separators.
fn metric_token(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            ':' | ' ' | '@' | '=' | ';' | ',' | '"' => '_',
            other => other,
        })
        .collect()
}
