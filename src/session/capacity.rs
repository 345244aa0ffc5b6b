//! # Capacity Ledger
//!
//! Admission control for payload files against the byte budget declared by
//! the remote service for the current carrier image.
//!
//! ## Accounting
//!
//! Every file costs its own size plus a fixed per-file overhead. One file's
//! overhead is reserved up front as a buffer, so a fresh ledger starts at
//! `starting - overhead` bytes remaining.
//!
//! Batches are admitted in one of two ways:
//! 1. **Whole batch**: the summed cost of the batch fits the remaining budget,
//!    so every file is admitted.
//! 2. **Per-file fallback**: the batch does not fit. Files are then admitted
//!    one by one according to the configured [`AdmissionPolicy`].
//!
//! Under the default [`AdmissionPolicy::PreBatch`] every file whose own size
//! fits the *pre-batch* balance is admitted, which can overdraw the ledger.
//! The remaining balance is therefore signed.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Remaining capacity below this share of the starting capacity is "high" urgency.
const HIGH_USAGE_RATIO: f64 = 0.5;
/// Remaining capacity below this share of the starting capacity is "medium" urgency.
const MEDIUM_USAGE_RATIO: f64 = 0.65;

/// A file the user selected for embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// File name as shown to the user and sent to the service
    pub name: String,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Where the content is read from at embed time
    pub path: PathBuf,
}

impl CandidateFile {
    /// Creates a candidate whose content lives at a path equal to its name.
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
            size_bytes,
        }
    }

    /// Builds a candidate from a file on disk, using its current size.
    ///
    /// # Errors
    ///
    /// Fails if the file metadata cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self {
            name,
            size_bytes: metadata.len(),
            path: path.to_path_buf(),
        })
    }
}

/// How files are admitted when a batch as a whole exceeds the remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionPolicy {
    /// Admit every file whose size fits the balance as it stood before the batch.
    /// Two such files may together overdraw the ledger.
    #[default]
    PreBatch,
    /// Admit files in order while their cost (size + overhead) fits the running balance.
    RunningBalance,
}

/// How close the carrier is to running out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Classifies a remaining balance against the starting capacity.
    ///
    /// High is checked before medium. The marks are not rounded, so on an
    /// odd capacity a remaining balance equal to the truncated mark is still
    /// below it.
    pub fn classify(remaining: i64, starting_capacity: u64) -> Self {
        let remaining = remaining as f64;
        let high_mark = starting_capacity as f64 * HIGH_USAGE_RATIO;
        let medium_mark = starting_capacity as f64 * MEDIUM_USAGE_RATIO;

        if remaining < high_mark {
            Urgency::High
        } else if remaining < medium_mark {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the ledger for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapacitySummary {
    pub remaining: i64,
    pub usage_percent: f64,
    pub urgency: Urgency,
}

impl fmt::Display for CapacitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Embedding capacity: {} bytes ({:.1} %)",
            self.remaining, self.usage_percent
        )
    }
}

/// Result of admitting one batch of candidate files.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionReport {
    /// Files from this batch that joined the admitted set, in selection order
    pub admitted: Vec<CandidateFile>,
    /// Files from this batch that were turned away
    pub rejected: Vec<CandidateFile>,
    /// Whether the batch as a whole exceeded the remaining budget
    pub exceeded: bool,
    /// Ledger state after the batch
    pub summary: CapacitySummary,
}

/// Tracks the remaining embeddable budget and the ordered set of admitted files.
#[derive(Debug, Clone)]
pub struct CapacityLedger {
    starting_capacity: u64,
    overhead_per_file: u64,
    remaining: i64,
    admitted: Vec<CandidateFile>,
    policy: AdmissionPolicy,
}

impl CapacityLedger {
    /// Creates a ledger with one file's overhead already reserved.
    pub fn new(starting_capacity: u64, overhead_per_file: u64, policy: AdmissionPolicy) -> Self {
        Self {
            starting_capacity,
            overhead_per_file,
            remaining: signed(starting_capacity) - signed(overhead_per_file),
            admitted: Vec::new(),
            policy,
        }
    }

    pub fn starting_capacity(&self) -> u64 {
        self.starting_capacity
    }

    pub fn overhead_per_file(&self) -> u64 {
        self.overhead_per_file
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Bytes still available. Negative only after a [`AdmissionPolicy::PreBatch`] overdraw.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Admitted files in the order they were selected.
    pub fn admitted(&self) -> &[CandidateFile] {
        &self.admitted
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }

    /// Summed cost (size + overhead) of every admitted file.
    pub fn admitted_cost(&self) -> u64 {
        self.admitted
            .iter()
            .map(|file| self.cost_of(file))
            .fold(0, u64::saturating_add)
    }

    /// Share of the starting capacity in use, in percent.
    pub fn usage_percent(&self) -> f64 {
        if self.starting_capacity == 0 {
            return 100.0;
        }
        let used = signed(self.starting_capacity).saturating_sub(self.remaining);
        used as f64 * 100.0 / self.starting_capacity as f64
    }

    pub fn urgency(&self) -> Urgency {
        Urgency::classify(self.remaining, self.starting_capacity)
    }

    pub fn summary(&self) -> CapacitySummary {
        CapacitySummary {
            remaining: self.remaining,
            usage_percent: self.usage_percent(),
            urgency: self.urgency(),
        }
    }

    /// Admits a batch of candidate files and recomputes the usage summary.
    pub fn admit(&mut self, batch: Vec<CandidateFile>) -> AdmissionReport {
        let batch_cost = batch
            .iter()
            .map(|file| self.cost_of(file))
            .fold(0, u64::saturating_add);
        let exceeded = signed(batch_cost) > self.remaining;

        let (admitted, rejected) = if !exceeded {
            (batch, Vec::new())
        } else {
            warn!(
                "⚠️  Batch of {} file(s) costs {} bytes, only {} remaining",
                batch.len(),
                batch_cost,
                self.remaining
            );
            self.fallback(batch)
        };

        for file in &admitted {
            self.remaining = self.remaining.saturating_sub(signed(self.cost_of(file)));
        }
        self.admitted.extend(admitted.iter().cloned());

        let summary = self.summary();
        info!(
            "Admitted {} file(s), rejected {}: {} [{}]",
            admitted.len(),
            rejected.len(),
            summary,
            summary.urgency
        );

        AdmissionReport {
            admitted,
            rejected,
            exceeded,
            summary,
        }
    }

    /// Empties the admitted set and restores the initial balance.
    pub fn clear(&mut self) {
        self.admitted.clear();
        self.remaining = signed(self.starting_capacity) - signed(self.overhead_per_file);
    }

    fn fallback(&self, batch: Vec<CandidateFile>) -> (Vec<CandidateFile>, Vec<CandidateFile>) {
        match self.policy {
            AdmissionPolicy::PreBatch => {
                let balance = self.remaining;
                batch
                    .into_iter()
                    .partition(|file| signed(file.size_bytes) <= balance)
            }
            AdmissionPolicy::RunningBalance => {
                let mut balance = self.remaining;
                let mut admitted = Vec::new();
                let mut rejected = Vec::new();
                for file in batch {
                    let cost = signed(self.cost_of(&file));
                    if cost <= balance {
                        balance -= cost;
                        admitted.push(file);
                    } else {
                        rejected.push(file);
                    }
                }
                (admitted, rejected)
            }
        }
    }

    fn cost_of(&self, file: &CandidateFile) -> u64 {
        file.size_bytes.saturating_add(self.overhead_per_file)
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
