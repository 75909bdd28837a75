//! Row-oriented sample writers for control-loop traces.

use std::io::Write;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry write failed")]
    Io(#[from] std::io::Error),
    #[error("telemetry serialization failed")]
    Json(#[from] serde_json::Error),
}

/// One controller sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SampleRow {
    pub t_ms: u64,
    pub set_point: f64,
    pub feedback: f64,
    pub output: f64,
    /// Output was held because the controller reported a numeric fault.
    pub fault: bool,
}

impl SampleRow {
    pub const FIELDS: [&'static str; 5] = ["t_ms", "set_point", "feedback", "output", "fault"];
}

pub trait RowWriter {
    fn write_row(&mut self, row: &SampleRow) -> Result<(), TelemetryError>;
    fn flush(&mut self) -> Result<(), TelemetryError>;
}

/// Delimited text, header first.
pub struct CsvWriter<W: Write> {
    out: W,
    delimiter: char,
    wrote_header: bool,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self::with_delimiter(out, ',')
    }

    pub fn with_delimiter(out: W, delimiter: char) -> Self {
        Self {
            out,
            delimiter,
            wrote_header: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RowWriter for CsvWriter<W> {
    fn write_row(&mut self, row: &SampleRow) -> Result<(), TelemetryError> {
        let d = self.delimiter;
        if !self.wrote_header {
            let header = SampleRow::FIELDS.join(&d.to_string());
            writeln!(self.out, "{header}")?;
            self.wrote_header = true;
        }
        writeln!(
            self.out,
            "{}{d}{}{d}{}{d}{}{d}{}",
            row.t_ms, row.set_point, row.feedback, row.output, row.fault
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonLinesWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RowWriter for JsonLinesWriter<W> {
    fn write_row(&mut self, row: &SampleRow) -> Result<(), TelemetryError> {
        serde_json::to_writer(&mut self.out, row)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.out.flush()?;
        Ok(())
    }
}

impl<T: RowWriter + ?Sized> RowWriter for Box<T> {
    fn write_row(&mut self, row: &SampleRow) -> Result<(), TelemetryError> {
        (**self).write_row(row)
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        (**self).flush()
    }
}
