//! Per-operation timing and outcome records for one client run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::session::state::Operation;

/// How a dispatched request ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Response applied to the session
    Applied,
    /// Response arrived after a reset and was dropped
    Stale,
    /// Transport failure or unusable response
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetric {
    pub sequence: u64,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub outcome: Outcome,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub total_requests: usize,
    pub applied_requests: usize,
    pub stale_responses: usize,
    pub failed_requests: usize,
    pub failure_rate: f64,

    // Latency statistics over applied requests (milliseconds)
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub latency_avg_ms: f64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,

    pub operation_distribution: HashMap<String, usize>,
    pub failure_reasons: HashMap<String, usize>,
}

#[derive(Debug)]
pub struct SessionMetrics {
    client_label: String,
    start_time: Instant,
    requests: Vec<OperationMetric>,
}

impl SessionMetrics {
    pub fn new(client_label: String) -> Self {
        Self {
            client_label,
            start_time: Instant::now(),
            requests: Vec::new(),
        }
    }

    pub fn record_request(
        &mut self,
        operation: Operation,
        latency: Duration,
        outcome: Outcome,
        failure_reason: Option<String>,
    ) {
        let latency_ms = latency.as_millis() as u64;
        let started_at = Utc::now()
            - chrono::Duration::from_std(latency).unwrap_or_else(|_| chrono::Duration::zero());

        self.requests.push(OperationMetric {
            sequence: self.requests.len() as u64 + 1,
            operation: operation.to_string(),
            started_at,
            latency_ms,
            outcome,
            failure_reason,
        });
    }

    pub fn requests(&self) -> &[OperationMetric] {
        &self.requests
    }

    pub fn aggregate(&self) -> AggregatedStats {
        let mut stats = AggregatedStats::default();

        if self.requests.is_empty() {
            return stats;
        }

        let count = |outcome: Outcome| self.requests.iter().filter(|r| r.outcome == outcome).count();
        stats.total_requests = self.requests.len();
        stats.applied_requests = count(Outcome::Applied);
        stats.stale_responses = count(Outcome::Stale);
        stats.failed_requests = count(Outcome::Failed);
        stats.failure_rate = (stats.failed_requests as f64 / stats.total_requests as f64) * 100.0;

        let mut latencies: Vec<u64> = self
            .requests
            .iter()
            .filter(|r| r.outcome == Outcome::Applied)
            .map(|r| r.latency_ms)
            .collect();
        latencies.sort_unstable();

        if let (Some(&min), Some(&max)) = (latencies.first(), latencies.last()) {
            stats.latency_min_ms = min;
            stats.latency_max_ms = max;
            stats.latency_avg_ms = latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;
            stats.latency_p50_ms = percentile(&latencies, 50.0);
            stats.latency_p95_ms = percentile(&latencies, 95.0);
            stats.latency_p99_ms = percentile(&latencies, 99.0);
        }

        for request in &self.requests {
            *stats
                .operation_distribution
                .entry(request.operation.clone())
                .or_insert(0) += 1;
        }

        for request in self.requests.iter().filter(|r| r.outcome == Outcome::Failed) {
            if let Some(reason) = &request.failure_reason {
                *stats.failure_reasons.entry(reason.clone()).or_insert(0) += 1;
            }
        }

        stats
    }

    pub fn export_to_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let output = serde_json::json!({
            "client_label": self.client_label,
            "run_duration_secs": self.start_time.elapsed().as_secs(),
            "aggregated_stats": self.aggregate(),
            "requests": self.requests,
        });

        let json_string = serde_json::to_string_pretty(&output)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;

        Ok(())
    }
}

fn percentile(sorted_data: &[u64], percentile: f64) -> u64 {
    if sorted_data.is_empty() {
        return 0;
    }

    let index = (percentile / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[index.min(sorted_data.len() - 1)]
}
