/// Minimal CSV reader for the benchmark artifacts this tool consumes:
/// a header row plus data rows, RFC 4180 quoting (quoted fields may
/// contain commas, newlines, and doubled quotes).
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug)]
pub enum CsvError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File had no header row.
    Empty { path: PathBuf },
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsvError::Read { path, source } => {
                write!(f, "failed to read CSV {}: {}", path.display(), source)
            }
            CsvError::Empty { path } => {
                write!(f, "CSV {} has no header row", path.display())
            }
        }
    }
}

impl std::error::Error for CsvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CsvError::Read { source, .. } => Some(source),
            CsvError::Empty { .. } => None,
        }
    }
}

/// Read and parse a CSV file. The first record becomes the header row;
/// fully empty trailing records are dropped.
pub fn read_csv(path: &Path) -> Result<CsvTable, CsvError> {
    let text = std::fs::read_to_string(path).map_err(|e| CsvError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut records = parse(&text);

    // A trailing newline produces one empty record; drop such records.
    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));

    if records.is_empty() {
        return Err(CsvError::Empty {
            path: path.to_path_buf(),
        });
    }
    let headers = records.remove(0);
    Ok(CsvTable {
        headers,
        rows: records,
    })
}

/// Parse CSV text into records of fields.
fn parse(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                // Swallow the CR of a CRLF pair; a bare CR ends the record.
                if chars.peek() == Some(&'\n') {
                    continue;
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}
