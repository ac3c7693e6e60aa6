//! Output types: extracted tables, skip notices, per-job outcomes and run
//! statistics.

use crate::error::JobError;
use crate::job::{DedupKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine output for one cell, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCell {
    /// Data-row index (0 = first row below the column header).
    pub row_index: usize,
    /// Column index into the detected [`crate::pipeline::schema::ColumnSchema`].
    pub col_index: usize,
    pub text: String,
}

/// One typed measurement row.
///
/// `max_speed` stays `0.0` and `udp_nat_type` stays empty when the detected
/// table does not carry those columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub group: String,
    pub remarks: String,
    /// Packet loss, percent.
    pub loss: f64,
    /// Milliseconds.
    pub ping: f64,
    /// Milliseconds.
    pub google_ping: f64,
    /// Bytes per second.
    pub avg_speed: f64,
    /// Bytes per second.
    pub max_speed: f64,
    pub udp_nat_type: String,
}

/// Every row extracted from one image. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub net_provider: String,
    pub provider: String,
    /// Generation time read from the image footer.
    pub timestamp: Timestamp,
    /// Version of the tool that rendered the image, when the title names one.
    pub generator_version: Option<String>,
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn key(&self) -> DedupKey {
        DedupKey::new(&self.net_provider, &self.provider)
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "# {} / {} @ {}",
            self.net_provider,
            self.provider,
            self.timestamp.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(
            f,
            "group,remarks,loss,ping,google_ping,avg_speed,max_speed,udp_nat_type"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{},{},{:.2},{:.2},{:.2},{:.0},{:.0},{}",
                r.group,
                r.remarks,
                r.loss,
                r.ping,
                r.google_ping,
                r.avg_speed,
                r.max_speed,
                r.udp_nat_type
            )?;
        }
        Ok(())
    }
}

/// A job dropped by the dedup gate because its image is not newer than
/// what the store already holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipNotice {
    pub key: DedupKey,
    /// Timestamp read from the image.
    pub timestamp: Timestamp,
    /// Latest timestamp on record for the same provider pair.
    pub latest: Timestamp,
}

/// What happened to one job.
#[derive(Debug)]
pub enum JobOutcome {
    Extracted(ResultTable),
    Skipped(SkipNotice),
    Failed(JobError),
}

impl JobOutcome {
    pub fn key(&self) -> DedupKey {
        match self {
            JobOutcome::Extracted(t) => t.key(),
            JobOutcome::Skipped(s) => s.key.clone(),
            JobOutcome::Failed(e) => e.key().clone(),
        }
    }
}

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Jobs pulled from the intake stream, including fetch failures.
    pub received: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Tables the store accepted.
    pub persisted: usize,
    /// Tables the store rejected.
    pub store_errors: usize,
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Fold one outcome into the counters.
    pub fn record(&mut self, outcome: &JobOutcome) {
        self.received += 1;
        match outcome {
            JobOutcome::Extracted(_) => self.extracted += 1,
            JobOutcome::Skipped(_) => self.skipped += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::zero_timestamp;
    use chrono::NaiveDate;

    fn table() -> ResultTable {
        ResultTable {
            net_provider: "telecom".into(),
            provider: "FastProxy".into(),
            timestamp: NaiveDate::from_ymd_opt(2020, 12, 11)
                .unwrap()
                .and_hms_opt(20, 30, 3)
                .unwrap(),
            generator_version: Some("2.7.1".into()),
            rows: vec![ResultRow {
                group: "HK".into(),
                remarks: "node-1".into(),
                loss: 0.5,
                ping: 71.45,
                google_ping: 120.0,
                avg_speed: 21_480_000.0,
                max_speed: 0.0,
                udp_nat_type: "Full Cone".into(),
            }],
        }
    }

    #[test]
    fn display_renders_header_and_rows() {
        let text = table().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "# telecom / FastProxy @ 2020-12-11 20:30:03");
        assert_eq!(
            lines[2],
            "HK,node-1,0.50,71.45,120.00,21480000,0,Full Cone"
        );
    }

    #[test]
    fn report_counts_outcomes() {
        let mut report = PipelineReport::default();
        report.record(&JobOutcome::Extracted(table()));
        report.record(&JobOutcome::Skipped(SkipNotice {
            key: DedupKey::new("a", "b"),
            timestamp: zero_timestamp(),
            latest: zero_timestamp(),
        }));
        report.record(&JobOutcome::Failed(JobError::Timeout {
            key: DedupKey::new("a", "c"),
            secs: 5,
        }));
        assert_eq!(
            (report.received, report.extracted, report.skipped, report.failed),
            (3, 1, 1, 1)
        );
    }

    #[test]
    fn table_serializes_to_json() {
        let json = serde_json::to_value(table()).unwrap();
        assert_eq!(json["provider"], "FastProxy");
        assert_eq!(json["rows"][0]["udp_nat_type"], "Full Cone");
        assert_eq!(json["timestamp"], "2020-12-11T20:30:03");
    }
}
