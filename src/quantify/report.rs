//! Result rows and the TSV sink they are appended to.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::QuantError;

/// Column titles of the results file, in order.
pub const RESULT_HEADER: [&str; 5] = [
    "Image name",
    "ROI name",
    "Roi area (µm2)",
    "Nb nuclei",
    "Nb c-Fos cells",
];

/// One row of the results file: the counts for one (image, ROI) pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultRecord {
    pub image: String,
    pub roi: String,
    /// Calibrated ROI area.
    pub roi_area: f64,
    pub nuclei: u64,
    pub marker_cells: u64,
}

/// Tab-separated results file. Every row is flushed as soon as it is
/// written, so a crash never loses finished rows.
pub struct ResultSink<W: Write = BufWriter<File>> {
    writer: csv::Writer<W>,
    path: PathBuf,
    rows: usize,
}

impl ResultSink<BufWriter<File>> {
    /// Creates (or truncates) the results file and writes the header.
    pub fn create(path: &Path) -> Result<Self, QuantError> {
        let file = File::create(path).map_err(|e| QuantError::ResultSink {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        Self::from_writer(BufWriter::new(file), path)
    }
}

impl<W: Write> ResultSink<W> {
    /// Wraps any writer; `path` is only used in error messages.
    pub fn from_writer(writer: W, path: &Path) -> Result<Self, QuantError> {
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(writer);
        let mut sink = Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        };
        sink.write_row(|w| w.write_record(RESULT_HEADER))?;
        Ok(sink)
    }

    /// Appends one record and flushes it.
    pub fn append(&mut self, record: &ResultRecord) -> Result<(), QuantError> {
        self.write_row(|w| w.serialize(record))?;
        self.rows += 1;
        Ok(())
    }

    /// Number of records written (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, QuantError> {
        let path = self.path;
        self.writer.into_inner().map_err(|e| QuantError::ResultSink {
            path,
            source: e.into_error().into(),
        })
    }

    fn write_row(
        &mut self,
        write: impl FnOnce(&mut csv::Writer<W>) -> csv::Result<()>,
    ) -> Result<(), QuantError> {
        write(&mut self.writer)
            .and_then(|()| self.writer.flush().map_err(csv::Error::from))
            .map_err(|source| QuantError::ResultSink {
                path: self.path.clone(),
                source,
            })
    }
}
