//! Turns uploads and JSON batches into an ordered list of review strings.

use std::io::Cursor;

use calamine::{Reader, Xlsx};

use crate::error::InputError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileKind {
    Csv,
    Xlsx,
}

impl FileKind {
    pub fn from_file_name(name: &str) -> Result<Self, InputError> {
        let lower = name.trim().to_lowercase();
        if lower.ends_with(".csv") {
            Ok(FileKind::Csv)
        } else if lower.ends_with(".xlsx") {
            Ok(FileKind::Xlsx)
        } else {
            Err(InputError::UnsupportedFormat)
        }
    }
}

/// Reviews from an uploaded CSV/XLSX file: first column, optional `review` header.
pub fn reviews_from_upload(file_name: &str, bytes: &[u8]) -> Result<Vec<String>, InputError> {
    let kind = FileKind::from_file_name(file_name)?;
    let column = match kind {
        FileKind::Csv => first_column_csv(bytes)?,
        FileKind::Xlsx => first_column_xlsx(bytes)?,
    };

    let reviews = clean(drop_header(column));
    if reviews.is_empty() {
        return Err(InputError::EmptyFile);
    }
    Ok(reviews)
}

/// Reviews from a JSON batch. Blank entries are dropped.
pub fn reviews_from_batch(reviews: Vec<String>) -> Result<Vec<String>, InputError> {
    let reviews = clean(reviews);
    if reviews.is_empty() {
        return Err(InputError::EmptyBatch);
    }
    Ok(reviews)
}

fn first_column_csv(bytes: &[u8]) -> Result<Vec<String>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut column = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| InputError::Unreadable(e.to_string()))?;
        column.push(record.get(0).unwrap_or_default().to_string());
    }
    Ok(column)
}

fn first_column_xlsx(bytes: &[u8]) -> Result<Vec<String>, InputError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| InputError::Unreadable(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(InputError::EmptyFile)?
        .map_err(|e| InputError::Unreadable(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.first().map(|cell| cell.to_string()).unwrap_or_default())
        .collect())
}

fn drop_header(mut column: Vec<String>) -> Vec<String> {
    if column
        .first()
        .map(|first| first.trim().eq_ignore_ascii_case("review"))
        .unwrap_or(false)
    {
        column.remove(0);
    }
    column
}

fn clean(column: Vec<String>) -> Vec<String> {
    column
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind() {
        assert_eq!(FileKind::from_file_name("reviews.CSV"), Ok(FileKind::Csv));
        assert_eq!(FileKind::from_file_name("q3.xlsx"), Ok(FileKind::Xlsx));
        assert_eq!(
            FileKind::from_file_name("notes.txt"),
            Err(InputError::UnsupportedFormat)
        );
        assert_eq!(
            FileKind::from_file_name("legacy.xls"),
            Err(InputError::UnsupportedFormat)
        );
    }

    #[test]
    fn test_csv_with_header() {
        let data = b"Review,stars\nGreat product!,5\n\"Poor quality, would not buy\",1\nAverage experience,3\n";
        let reviews = reviews_from_upload("reviews.csv", data).unwrap();
        assert_eq!(
            reviews,
            vec!["Great product!", "Poor quality, would not buy", "Average experience"]
        );
    }

    #[test]
    fn test_csv_without_header_and_blank_rows() {
        let data = b"Loved it\n\n   \nHated it\nshort,extra,columns\n";
        let reviews = reviews_from_upload("r.csv", data).unwrap();
        assert_eq!(reviews, vec!["Loved it", "Hated it", "short"]);
    }

    #[test]
    fn test_csv_header_only_is_empty() {
        assert_eq!(
            reviews_from_upload("r.csv", b"review\n"),
            Err(InputError::EmptyFile)
        );
        assert_eq!(reviews_from_upload("r.csv", b""), Err(InputError::EmptyFile));
    }

    #[test]
    fn test_unsupported_upload_rejected_before_parsing() {
        assert_eq!(
            reviews_from_upload("r.pdf", b"%PDF-1.4"),
            Err(InputError::UnsupportedFormat)
        );
    }

    #[test]
    fn test_corrupt_xlsx_is_unreadable() {
        assert!(matches!(
            reviews_from_upload("r.xlsx", b"not a zip archive"),
            Err(InputError::Unreadable(_))
        ));
    }

    const REVIEWS_XLSX: &[u8] = include_bytes!("../fixtures/reviews.xlsx");

    #[test]
    fn test_xlsx_first_column() {
        // header row, a row with only column B filled, a padded string, a number and a bool
        let reviews = reviews_from_upload("Q3 Reviews.XLSX", REVIEWS_XLSX).unwrap();
        assert_eq!(
            reviews,
            vec!["Great product!", "Poor quality", "42", "true", "Average experience"]
        );
    }

    #[test]
    fn test_batch() {
        assert_eq!(reviews_from_batch(Vec::new()), Err(InputError::EmptyBatch));
        assert_eq!(
            reviews_from_batch(vec!["  ".to_string(), "".to_string()]),
            Err(InputError::EmptyBatch)
        );
        assert_eq!(
            reviews_from_batch(vec![" ok ".to_string(), "".to_string(), "meh".to_string()]),
            Ok(vec!["ok".to_string(), "meh".to_string()])
        );
    }
}
