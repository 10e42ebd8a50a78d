//! Gzip-compressed CSV artifact streams.

use crate::io::row::{self, ExportRow};
use crate::io::validation::RowError;
use crate::{Error, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// Writes rows into a compressed artifact.
pub struct ArtifactWriter<W: Write> {
    writer: csv::Writer<GzEncoder<W>>,
}

impl<W: Write> ArtifactWriter<W> {
    /// Wraps `inner` in a gzip encoder and a CSV writer.
    pub fn new(inner: W) -> Self {
        let encoder = GzEncoder::new(inner, Compression::default());
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(encoder);
        Self { writer }
    }

    /// Writes the versioned header row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    pub fn write_header(&mut self) -> Result<()> {
        self.writer
            .write_record(row::header())
            .map_err(|e| Error::operation("write_export_header", e))
    }

    /// Writes one encoded row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    pub fn write_row(&mut self, row: &ExportRow) -> Result<()> {
        self.writer
            .write_record(row.fields())
            .map_err(|e| Error::operation("write_export_row", e))
    }

    /// Flushes buffered rows into the compressor.
    ///
    /// # Errors
    ///
    /// Returns an error if any buffered row could not be written.
    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::operation("flush_export", e))
    }

    /// Flushes, writes the gzip trailer and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be completed.
    pub fn finish(self) -> Result<W> {
        let encoder = self
            .writer
            .into_inner()
            .map_err(|e| Error::operation("flush_export", e.error()))?;
        encoder
            .finish()
            .map_err(|e| Error::operation("finish_export", e))
    }
}

/// One row read from an artifact.
#[derive(Debug)]
pub struct RowRead {
    /// Line number of the row in the decompressed stream.
    pub line: u64,
    /// The row, or why it cannot be used.
    pub row: std::result::Result<ExportRow, RowError>,
}

/// Reads rows from a compressed artifact.
pub struct ArtifactReader<R: Read> {
    reader: csv::Reader<GzDecoder<R>>,
    record: csv::StringRecord,
}

impl<R: Read> ArtifactReader<R> {
    /// Wraps `inner` in a gzip decoder and a CSV reader.
    pub fn new(inner: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(GzDecoder::new(inner));
        Self {
            reader,
            record: csv::StringRecord::new(),
        }
    }

    /// Reads the header row and checks its schema version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedVersion`] on a version mismatch, or an
    /// error if the stream is empty or cannot be read.
    pub fn read_header(&mut self) -> Result<()> {
        let found = self
            .reader
            .read_record(&mut self.record)
            .map_err(|e| Error::operation("read_import_header", e))?;
        if !found {
            return Err(Error::operation("read_import_header", "empty artifact"));
        }
        row::check_header(&self.record)
    }

    /// Reads the next row.
    ///
    /// Malformed CSV is reported as a row fault; failures of the underlying
    /// stream (including corrupt compression) end the import.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be read.
    pub fn next_row(&mut self) -> Result<Option<RowRead>> {
        match self.reader.read_record(&mut self.record) {
            Ok(false) => Ok(None),
            Ok(true) => {
                let line = self.record.position().map_or(0, csv::Position::line);
                Ok(Some(RowRead {
                    line,
                    row: ExportRow::from_record(&self.record),
                }))
            },
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                Err(Error::operation("read_import_row", e))
            },
            Err(e) => {
                let line = e.position().map_or(0, csv::Position::line);
                Ok(Some(RowRead {
                    line,
                    row: Err(RowError::Csv(e.to_string())),
                }))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Hit;
    use chrono::Utc;
    use flate2::write::GzEncoder;

    fn gzip(text: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let mut writer = ArtifactWriter::new(Vec::new());
        writer.write_header().unwrap();
        let hit = Hit::new(1, "/x", Utc::now()).with_title("quote \" and, comma");
        writer.write_row(&ExportRow::from_hit(&hit)).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ArtifactReader::new(bytes.as_slice());
        reader.read_header().unwrap();
        let read = reader.next_row().unwrap().unwrap();
        assert_eq!(read.line, 2);
        let row = read.row.unwrap();
        assert_eq!(row.fields()[1], "quote \" and, comma");
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn test_read_header_version_mismatch() {
        let bytes = gzip("2Path,Title\n");
        let mut reader = ArtifactReader::new(bytes.as_slice());
        assert!(matches!(
            reader.read_header(),
            Err(Error::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_read_empty_artifact() {
        let bytes = gzip("");
        let mut reader = ArtifactReader::new(bytes.as_slice());
        assert!(reader.read_header().is_err());
    }

    #[test]
    fn test_short_row_is_fault() {
        let bytes = gzip("1Path\n/a,b\n");
        let mut reader = ArtifactReader::new(bytes.as_slice());
        reader.read_header().unwrap();
        let read = reader.next_row().unwrap().unwrap();
        assert!(matches!(read.row, Err(RowError::Arity { got: 2, .. })));
    }

    #[test]
    fn test_not_gzip_is_fatal() {
        let bytes = b"1Path,Title\n".to_vec();
        let mut reader = ArtifactReader::new(bytes.as_slice());
        assert!(reader.read_header().is_err());
    }
}
