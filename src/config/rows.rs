//! CSV row source for broadcasts.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{StringRecord, StringRecordsIntoIter};
use thiserror::Error;

/// Name of the column holding the message text.
pub const MESSAGE_COLUMN: &str = "message";

/// Name of the column holding the optional image path.
pub const IMAGE_COLUMN: &str = "image";

/// Errors that can occur while reading the row file.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("CSV header has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("Malformed CSV record: {0}")]
    Csv(#[from] csv::Error),
}

/// One broadcast unit: a message with an optional image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Line in the source file where the record starts.
    pub line: u64,

    /// Trimmed message text, never empty.
    pub message: String,

    /// Image path as written in the file, if the field was non-empty.
    pub image: Option<PathBuf>,
}

impl Row {
    /// Creates a row. `image` is ignored when empty.
    #[must_use]
    pub fn new(line: u64, message: impl Into<String>, image: Option<&str>) -> Self {
        Self {
            line,
            message: message.into(),
            image: image
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Returns the image path if it exists on disk right now.
    #[must_use]
    pub fn attachment(&self) -> Option<&Path> {
        self.image.as_deref().filter(|p| p.exists())
    }
}

/// Lazy, forward-only reader of [`Row`]s.
///
/// Rows whose message is empty after trimming are skipped without being
/// yielded; [`RowReader::skipped`] counts them.
pub struct RowReader {
    records: StringRecordsIntoIter<File>,
    message_idx: usize,
    image_idx: Option<usize>,
    skipped: usize,
    read: u64,
}

impl RowReader {
    /// Opens a CSV file and locates the `message` and `image` columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, the header cannot be
    /// read, or there is no `message` column.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RowError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let message_idx =
            column_index(&headers, MESSAGE_COLUMN).ok_or(RowError::MissingColumn(MESSAGE_COLUMN))?;
        let image_idx = column_index(&headers, IMAGE_COLUMN);

        Ok(Self {
            records: reader.into_records(),
            message_idx,
            image_idx,
            skipped: 0,
            read: 0,
        })
    }

    /// Returns true if the file has an `image` column.
    #[must_use]
    pub fn has_image_column(&self) -> bool {
        self.image_idx.is_some()
    }

    /// Number of blank-message rows skipped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn to_row(&self, record: &StringRecord) -> Option<Row> {
        let message = record.get(self.message_idx).unwrap_or_default().trim();
        if message.is_empty() {
            return None;
        }

        // Header occupies line 1.
        let line = record
            .position()
            .map_or(self.read + 1, csv::Position::line);
        let image = self.image_idx.and_then(|idx| record.get(idx));

        Some(Row::new(line, message, image))
    }
}

impl Iterator for RowReader {
    type Item = Result<Row, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e.into())),
            };
            self.read += 1;

            if let Some(row) = self.to_row(&record) {
                return Some(Ok(row));
            }
            self.skipped += 1;
        }
    }
}

impl std::fmt::Debug for RowReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowReader")
            .field("message_idx", &self.message_idx)
            .field("image_idx", &self.image_idx)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn csv_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_rows_in_file_order() {
        let file = csv_file("message,image\nfirst,\nsecond,pic.png\n");
        let rows: Vec<Row> = RowReader::open(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message, "first");
        assert_eq!(rows[0].image, None);
        assert_eq!(rows[1].image, Some(PathBuf::from("pic.png")));
        assert_eq!(rows[1].line, 3);
    }

    #[test]
    fn test_blank_messages_skipped() {
        let file = csv_file("message,image\n  ,\nhello,\n\"\",x.png\n");
        let mut reader = RowReader::open(file.path()).unwrap();
        let rows: Vec<Row> = reader.by_ref().collect::<Result<_, _>>().unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "hello");
        assert_eq!(reader.skipped(), 2);
    }

    #[test]
    fn test_column_order_and_extra_columns() {
        let file = csv_file("id,Image,notes,Message\n1,a.jpg,x,  *bold*  \n");
        let rows: Vec<Row> = RowReader::open(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows[0].message, "*bold*");
        assert_eq!(rows[0].image, Some(PathBuf::from("a.jpg")));
    }

    #[test]
    fn test_quoted_message_with_commas_and_newlines() {
        let file = csv_file("message,image\n\"Hello, **world**\nsecond line\",\n");
        let rows: Vec<Row> = RowReader::open(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows[0].message, "Hello, **world**\nsecond line");
    }

    #[test]
    fn test_missing_message_column() {
        let file = csv_file("text,image\nhello,\n");
        assert!(matches!(
            RowReader::open(file.path()),
            Err(RowError::MissingColumn("message"))
        ));
    }

    #[test]
    fn test_missing_image_column_means_text_only() {
        let file = csv_file("message\nhello\n");
        let mut reader = RowReader::open(file.path()).unwrap();
        assert!(!reader.has_image_column());
        let row = reader.next().unwrap().unwrap();
        assert_eq!(row.image, None);
    }

    #[test]
    fn test_attachment_requires_existing_file() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let present = Row::new(2, "hi", image.path().to_str());
        assert_eq!(present.attachment(), Some(image.path()));

        let missing = Row::new(3, "hi", Some("definitely/missing.png"));
        assert!(missing.image.is_some());
        assert_eq!(missing.attachment(), None);

        let blank = Row::new(4, "hi", Some("   "));
        assert_eq!(blank.image, None);
    }
}
