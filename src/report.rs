//! CSV output: the per-trigger profit statistics and the coalition
//! structure trace.

use std::fs::File;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use csv::{QuoteStyle, Writer, WriterBuilder};

use crate::error::Result;

/// Seconds since the Unix epoch, for the wall-clock column of both sinks.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn open(path: &Path) -> Result<Writer<File>> {
    let writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_path(path)?;
    Ok(writer)
}

/// Per-trigger profit statistics: for each provider the profit earned in
/// the selected coalition structure, the profit it would have earned alone,
/// and the relative increment of the former over the latter.
pub struct StatsWriter {
    writer: Writer<File>,
    num_fps: usize,
}

impl StatsWriter {
    pub fn create(path: &Path, num_fps: usize) -> Result<Self> {
        let mut writer = open(path)?;
        let mut header = vec![
            "Timestamp".to_string(),
            "Coalition Formation Start Time".to_string(),
            "Coalition Formation Duration".to_string(),
        ];
        for fp in 0..num_fps {
            header.push(format!("FP {} - Coalition Profit", fp));
            header.push(format!("FP {} - Alone Profit", fp));
            header.push(format!("FP {} - Coalition Profit vs. Alone Profit", fp));
        }
        writer.write_record(&header)?;
        writer.flush()?;
        Ok(Self { writer, num_fps })
    }

    pub fn write_row(
        &mut self,
        timestamp: u64,
        start_time: f64,
        duration: f64,
        coalition_profits: &[f64],
        alone_profits: &[f64],
    ) -> Result<()> {
        let mut row = vec![
            timestamp.to_string(),
            start_time.to_string(),
            duration.to_string(),
        ];
        for fp in 0..self.num_fps {
            let coal = coalition_profits[fp];
            let alone = alone_profits[fp];
            row.push(coal.to_string());
            row.push(alone.to_string());
            row.push((coal / alone - 1.0).to_string());
        }
        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Trace of the selected coalition structures, one row per structure and
/// trigger.
pub struct TraceWriter {
    writer: Writer<File>,
    num_fps: usize,
}

impl TraceWriter {
    pub fn create(path: &Path, num_fps: usize) -> Result<Self> {
        let mut writer = open(path)?;
        let mut header = vec![
            "Timestamp".to_string(),
            "Coalition Formation Start Time".to_string(),
            "Coalition Formation Duration".to_string(),
            "Coalition Structure".to_string(),
        ];
        for fp in 0..num_fps {
            header.push(format!("FP {} - Alone Profit", fp));
            header.push(format!("FP {} - Coalition Profit", fp));
        }
        writer.write_record(&header)?;
        writer.flush()?;
        Ok(Self { writer, num_fps })
    }

    pub fn write_row(
        &mut self,
        timestamp: u64,
        start_time: f64,
        duration: f64,
        structure: &str,
        alone_profits: &[f64],
        coalition_profits: &[f64],
    ) -> Result<()> {
        let mut row = vec![
            timestamp.to_string(),
            start_time.to_string(),
            duration.to_string(),
            structure.to_string(),
        ];
        for fp in 0..self.num_fps {
            row.push(alone_profits[fp].to_string());
            row.push(coalition_profits[fp].to_string());
        }
        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fog-coalsim-{}-{}", std::process::id(), name))
    }

    #[test]
    fn stats_file_has_one_block_per_provider() {
        let path = temp_path("stats.csv");
        let mut w = StatsWriter::create(&path, 2).unwrap();
        w.write_row(1000, 300.0, 300.0, &[12.0, 6.0], &[10.0, 6.0])
            .unwrap();
        drop(w);

        let text = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("\"Timestamp\""));
        assert!(header.contains("\"FP 0 - Coalition Profit vs. Alone Profit\""));
        assert!(header.contains("\"FP 1 - Alone Profit\""));
        let row = lines.next().unwrap();
        assert!(row.contains("\"12\""));
        // 12 / 10 - 1
        assert!(row.contains("\"0.19999999999999996\"") || row.contains("\"0.2\""));
    }

    #[test]
    fn trace_file_quotes_the_structure() {
        let path = temp_path("trace.csv");
        let mut w = TraceWriter::create(&path, 2).unwrap();
        w.write_row(1000, 300.0, 300.0, "{{0,1}}", &[10.0, 6.0], &[12.0, 6.0])
            .unwrap();
        drop(w);

        let text = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().contains("\"Coalition Structure\""));
        assert!(lines.next().unwrap().contains("\"{{0,1}}\""));
    }
}
