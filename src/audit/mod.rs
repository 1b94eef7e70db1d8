use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// One line of the evaluation audit log.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub rule_ids: Vec<String>,
    pub query_data: serde_json::Value,
    pub combined_expression: String,
    pub result: bool,
    pub recorded_at: String,
}

impl EvaluationRecord {
    pub fn new(
        rule_ids: &[String],
        query_data: serde_json::Value,
        combined_expression: &str,
        result: bool,
    ) -> Result<Self> {
        Ok(Self {
            rule_ids: rule_ids.to_vec(),
            query_data,
            combined_expression: combined_expression.to_string(),
            result,
            recorded_at: format_timestamp(OffsetDateTime::now_utc())?,
        })
    }
}

fn format_timestamp(at: OffsetDateTime) -> Result<String> {
    at.format(&Rfc3339)
        .context("Audit: Failed to format timestamp")
}

pub trait AuditSink {
    fn record(&mut self, entry: &EvaluationRecord) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Appends one JSON object per line.
pub struct JsonlAuditSink {
    writer: BufWriter<File>,
}

impl JsonlAuditSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Audit: Failed to open log {:?}", path))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&mut self, entry: &EvaluationRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Discards everything; used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&mut self, _entry: &EvaluationRecord) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    pub records: Vec<EvaluationRecord>,
}

#[cfg(test)]
impl AuditSink for MemoryAuditSink {
    fn record(&mut self, entry: &EvaluationRecord) -> Result<()> {
        self.records.push(entry.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: AuditSink + ?Sized> AuditSink for Box<T> {
    fn record(&mut self, entry: &EvaluationRecord) -> Result<()> {
        (**self).record(entry)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Open the sink described by the audit settings.
pub fn init_sink(enabled: bool, path: &Path) -> Result<Box<dyn AuditSink>> {
    if !enabled {
        tracing::info!("Audit: disabled");
        return Ok(Box::new(NullAuditSink));
    }
    tracing::info!("Audit: appending to {:?}", path);
    Ok(Box::new(JsonlAuditSink::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        for result in [true, false] {
            let mut sink = JsonlAuditSink::open(&path).unwrap();
            let entry = EvaluationRecord::new(
                &["r1".to_string()],
                serde_json::json!({"age": 25}),
                "age > 18",
                result,
            )
            .unwrap();
            sink.record(&entry).unwrap();
            sink.finish().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["rule_ids"][0], "r1");
        assert_eq!(first["query_data"]["age"], 25);
        assert_eq!(first["result"], true);
        assert!(first["recorded_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_timestamp_formatting() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(format_timestamp(at).unwrap(), "2023-11-14T22:13:20Z");

        // RFC 3339 offsets carry no seconds
        let offset = time::UtcOffset::from_hms(0, 0, 30).unwrap();
        let err = format_timestamp(at.to_offset(offset)).unwrap_err();
        assert!(err.to_string().starts_with("Audit:"));
    }
}
