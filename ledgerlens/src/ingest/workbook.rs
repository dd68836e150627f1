//! Raw buffer to a grid of cells
//!
//! Spreadsheet containers (xlsx, xls, ods) are read with calamine. Plain-text
//! buffers are read as delimited text with the delimiter guessed from the
//! first lines.

use crate::ingest::error::IngestError;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use tracing::debug;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

/// A single cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Spreadsheet serial date (days since 1899-12-30)
    Date(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display text of the cell, trimmed
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) | Cell::Date(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Cell::Bool(b) => b.to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::Date(dt.as_f64()),
        }
    }
}

/// First worksheet of a workbook
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

/// Validate and read a buffer into its first worksheet
pub fn load_sheet(buffer: &[u8], max_bytes: usize) -> Result<Sheet, IngestError> {
    if buffer.is_empty() {
        return Err(IngestError::Empty);
    }
    if buffer.len() > max_bytes {
        return Err(IngestError::TooLarge {
            size: buffer.len(),
            limit: max_bytes,
        });
    }
    if is_encrypted_container(buffer) {
        return Err(IngestError::Encrypted);
    }

    if buffer.starts_with(&OLE_MAGIC) || buffer.starts_with(&ZIP_MAGIC) {
        return read_spreadsheet(buffer);
    }

    match std::str::from_utf8(strip_bom(buffer)) {
        Ok(text) if !text.contains('\0') => read_delimited(text),
        _ => Err(IngestError::Corrupt("unrecognized file format".to_string())),
    }
}

/// Password-protected OOXML files are OLE containers holding these streams
fn is_encrypted_container(buffer: &[u8]) -> bool {
    buffer.starts_with(&OLE_MAGIC)
        && (contains_utf16le(buffer, "EncryptedPackage") || contains_utf16le(buffer, "EncryptionInfo"))
}

fn contains_utf16le(haystack: &[u8], needle: &str) -> bool {
    let pattern: Vec<u8> = needle.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
    haystack.windows(pattern.len()).any(|window| window == pattern.as_slice())
}

fn strip_bom(buffer: &[u8]) -> &[u8] {
    buffer.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(buffer)
}

fn read_spreadsheet(buffer: &[u8]) -> Result<Sheet, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(buffer)).map_err(classify_calamine_error)?;

    let Some(name) = workbook.sheet_names().first().cloned() else {
        return Err(IngestError::MissingWorksheet);
    };
    let range = workbook.worksheet_range(&name).map_err(classify_calamine_error)?;
    debug!("Reading worksheet {} ({:?})", name, range.get_size());

    let rows = range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect();
    Ok(Sheet { name, rows })
}

fn classify_calamine_error(err: calamine::Error) -> IngestError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        IngestError::Encrypted
    } else {
        IngestError::Corrupt(message)
    }
}

fn read_delimited(text: &str) -> Result<Sheet, IngestError> {
    let delimiter = guess_delimiter(text);
    let rows: Vec<Vec<Cell>> = split_records(text, delimiter)
        .into_iter()
        .map(|fields| {
            fields
                .into_iter()
                .map(|field| if field.trim().is_empty() { Cell::Empty } else { Cell::Text(field) })
                .collect()
        })
        .collect();

    if rows.is_empty() {
        return Err(IngestError::MissingWorksheet);
    }
    Ok(Sheet {
        name: "Sheet1".to_string(),
        rows,
    })
}

fn guess_delimiter(text: &str) -> char {
    let sample: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).take(20).collect();
    [',', ';', '\t']
        .into_iter()
        .max_by_key(|d| sample.iter().map(|line| line.matches(*d).count()).sum::<usize>())
        .unwrap_or(',')
}

/// Split delimited text into records, honoring double-quoted fields
fn split_records(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert_eq!(load_sheet(&[], 10), Err(IngestError::Empty));
        assert!(matches!(
            load_sheet(b"0123456789ab", 10),
            Err(IngestError::TooLarge { size: 12, limit: 10 })
        ));
    }

    #[test]
    fn test_detects_encrypted_ole_container() {
        let mut buffer = OLE_MAGIC.to_vec();
        buffer.extend(vec![0u8; 64]);
        buffer.extend("EncryptedPackage".encode_utf16().flat_map(|u| u.to_le_bytes()));
        assert_eq!(load_sheet(&buffer, 1024), Err(IngestError::Encrypted));
    }

    #[test]
    fn test_binary_garbage_is_corrupt() {
        let garbage = [0u8, 159, 146, 150, 0, 1, 2];
        assert!(matches!(load_sheet(&garbage, 1024), Err(IngestError::Corrupt(_))));
    }

    #[test]
    fn test_truncated_zip_is_corrupt() {
        let mut buffer = ZIP_MAGIC.to_vec();
        buffer.extend_from_slice(b"not really a zip archive");
        assert!(matches!(load_sheet(&buffer, 1024), Err(IngestError::Corrupt(_))));
    }

    #[test]
    fn test_reads_quoted_csv() {
        let text = "Date,Narration,Debit\n01/02/2024,\"POS, LEKKI \"\"MALL\"\"\",\"1,500.00\"\r\n";
        let sheet = load_sheet(text.as_bytes(), 1024).unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1][1], Cell::Text("POS, LEKKI \"MALL\"".to_string()));
        assert_eq!(sheet.rows[1][2].text(), "1,500.00");
    }

    #[test]
    fn test_guesses_semicolon_delimiter() {
        let sheet = load_sheet(b"Date;Debit;Credit\n2024-01-01;;5\n", 1024).unwrap();
        assert_eq!(sheet.rows[0].len(), 3);
        assert_eq!(sheet.rows[1][1], Cell::Empty);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(Cell::Number(1234.0).text(), "1234");
        assert_eq!(Cell::Number(12.5).text(), "12.5");
        assert_eq!(Cell::Text("  x ".to_string()).text(), "x");
        assert!(Cell::Text("   ".to_string()).is_empty());
    }

    #[test]
    fn test_calamine_values_map_to_cells() {
        assert_eq!(Cell::from(&Data::Int(7)), Cell::Number(7.0));
        assert_eq!(Cell::from(&Data::Float(44197.0)), Cell::Number(44197.0));
        assert_eq!(Cell::from(&Data::String("POS".to_string())), Cell::Text("POS".to_string()));
        assert_eq!(Cell::from(&Data::Bool(true)), Cell::Bool(true));
        assert_eq!(Cell::from(&Data::Error(calamine::CellErrorType::Div0)), Cell::Empty);
        assert_eq!(Cell::from(&Data::Empty), Cell::Empty);
    }
}
