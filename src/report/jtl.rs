use std::path::Path;

use crate::error::AppResult;

use super::{Sample, SampleSource};

/// CSV JTL reader. Columns are located through the header row, so partial
/// or reordered JTL layouts parse as long as the core fields are present.
pub struct JtlSource;

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    timestamp: usize,
    elapsed: usize,
    label: usize,
    success: usize,
    bytes: Option<usize>,
    all_threads: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &str) -> Option<Self> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let find = |name: &str| names.iter().position(|column| *column == name);
        Some(ColumnMap {
            timestamp: find("timeStamp")?,
            elapsed: find("elapsed")?,
            label: find("label")?,
            success: find("success")?,
            bytes: find("bytes"),
            all_threads: find("allThreads"),
        })
    }
}

impl SampleSource for JtlSource {
    fn samples(&self, path: &Path) -> AppResult<Vec<Sample>> {
        let content = std::fs::read_to_string(path)?;
        let mut lines = content.lines();
        let Some(header) = lines.next() else {
            return Ok(Vec::new());
        };
        let Some(columns) = ColumnMap::from_header(header) else {
            return Ok(Vec::new());
        };

        let mut samples = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            let Some(sample) = parse_row(&columns, &fields) else {
                // Malformed rows (embedded commas in messages, truncated
                // writes) are skipped rather than failing the import.
                continue;
            };
            samples.push(sample);
        }
        Ok(samples)
    }
}

fn parse_row(columns: &ColumnMap, fields: &[&str]) -> Option<Sample> {
    Some(Sample {
        timestamp_ms: fields.get(columns.timestamp)?.trim().parse().ok()?,
        elapsed_ms: fields.get(columns.elapsed)?.trim().parse().ok()?,
        label: fields.get(columns.label)?.trim().to_owned(),
        success: fields.get(columns.success)?.trim().eq_ignore_ascii_case("true"),
        bytes: columns
            .bytes
            .and_then(|idx| fields.get(idx))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0),
        threads: columns
            .all_threads
            .and_then(|idx| fields.get(idx))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0),
    })
}

/// Writes samples back out in the canonical column order. Export bundles
/// and tests round-trip through this.
pub fn write_jtl(path: &Path, samples: &[Sample]) -> AppResult<()> {
    use std::fmt::Write as _;

    let mut out = String::from("timeStamp,elapsed,label,success,bytes,allThreads\n");
    for sample in samples {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            sample.timestamp_ms,
            sample.elapsed_ms,
            sample.label,
            sample.success,
            sample.bytes,
            sample.threads
        );
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_the_standard_jmeter_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.jtl");
        std::fs::write(
            &path,
            "timeStamp,elapsed,label,responseCode,threadName,success,bytes,grpThreads,allThreads\n\
             1700000000000,120,home,200,tg 1-1,true,2048,10,20\n\
             1700000001000,340,checkout,500,tg 1-2,false,512,10,20\n",
        )
        .expect("write");

        let samples = JtlSource.samples(&path).expect("samples");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, "home");
        assert_eq!(samples[0].elapsed_ms, 120);
        assert!(samples[0].success);
        assert_eq!(samples[0].bytes, 2048);
        assert_eq!(samples[0].threads, 20);
        assert!(!samples[1].success);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.jtl");
        std::fs::write(
            &path,
            "timeStamp,elapsed,label,success\n\
             1700000000000,120,home,true\n\
             not-a-timestamp,x,y,z\n",
        )
        .expect("write");
        let samples = JtlSource.samples(&path).expect("samples");
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("round.jtl");
        let samples = vec![
            Sample {
                timestamp_ms: 1_700_000_000_000,
                label: "home".to_owned(),
                elapsed_ms: 210,
                success: true,
                bytes: 4096,
                threads: 50,
            },
            Sample {
                timestamp_ms: 1_700_000_000_500,
                label: "cart".to_owned(),
                elapsed_ms: 90,
                success: false,
                bytes: 128,
                threads: 50,
            },
        ];
        write_jtl(&path, &samples).expect("write");
        let read_back = JtlSource.samples(&path).expect("read");
        assert_eq!(read_back, samples);
    }
}
