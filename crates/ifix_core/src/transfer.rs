//! JSON and CSV export/import of records.
//!
//! JSON export is a pretty-printed array of records. CSV export writes one
//! header row (`id`, `created_at`, `updated_at`, `_version`, then every other
//! field name sorted) and one row per record:
//!
//! - numbers and booleans are written as-is
//! - arrays and objects are written as JSON text
//! - null and missing fields are written as empty cells
//! - strings are written as-is, unless they are empty or would themselves
//!   parse as JSON, in which case they are written JSON-encoded
//!
//! Cells containing a comma, quote or line break are quoted with doubled
//! quotes. Importing reverses this: a cell that parses as JSON takes that
//! value, any other cell is a string, and empty cells are omitted.

use crate::error::{CoreError, CoreResult};
use crate::record::{Fields, Record, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD, VERSION_FIELD};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Export and import formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// A JSON array of records.
    #[default]
    Json,
    /// Comma-separated values with a header row.
    Csv,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

impl FromStr for Format {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(CoreError::format(format!("unknown format: {other}"))),
        }
    }
}

/// Options for `import`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Input format.
    pub format: Format,
    /// Empty the table before importing.
    pub clear_before_import: bool,
}

impl ImportOptions {
    /// Creates options for `format`.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self {
            format,
            clear_before_import: false,
        }
    }

    /// Sets whether the table is cleared first.
    #[must_use]
    pub const fn clear_before_import(mut self, clear: bool) -> Self {
        self.clear_before_import = clear;
        self
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Rows appended as new records.
    pub imported: usize,
    /// Rows merged onto an existing record with the same id.
    pub merged: usize,
    /// Rows rejected.
    pub skipped: usize,
    /// One message per rejected row.
    pub errors: Vec<String>,
}

const SYSTEM_COLUMNS: [&str; 4] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD, VERSION_FIELD];

/// Serializes records as a pretty JSON array.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(records: &[Record]) -> CoreResult<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Serializes records as CSV. The header row is always written, so an
/// empty slice yields the system columns alone.
#[must_use]
pub fn to_csv(records: &[Record]) -> String {
    let domain: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .filter(|k| !SYSTEM_COLUMNS.contains(k))
        .collect();
    let columns: Vec<&str> = SYSTEM_COLUMNS.iter().copied().chain(domain).collect();

    let mut out = String::new();
    write_row(&mut out, columns.iter().map(|c| quote((*c).to_string())));
    for record in records {
        write_row(
            &mut out,
            columns
                .iter()
                .map(|c| quote(cell(record.value(c).as_deref()))),
        );
    }
    out
}

fn write_row(out: &mut String, cells: impl Iterator<Item = String>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&cell);
    }
    out.push('\n');
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => {
            if s.is_empty() || serde_json::from_str::<Value>(s).is_ok() {
                Value::String(s.clone()).to_string()
            } else {
                s.clone()
            }
        }
        Some(other) => other.to_string(),
    }
}

fn quote(cell: String) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell
    }
}

/// Parses a JSON import payload: an array of objects, or an object with a
/// `data` array (an exported table or snapshot).
///
/// # Errors
///
/// Returns a format error if the text is not JSON of either shape.
pub fn parse_json(text: &str) -> CoreResult<Vec<Value>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CoreError::format(format!("invalid JSON: {e}")))?;
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(CoreError::format("expected an array of records")),
        },
        _ => Err(CoreError::format("expected an array of records")),
    }
}

/// Parses a CSV import payload into one JSON object per data row.
///
/// Rows whose cell count differs from the header are returned as errors in
/// place, so callers can count them per row.
///
/// # Errors
///
/// Returns a format error if the text has no header row or an unterminated
/// quoted cell.
pub fn parse_csv(text: &str) -> CoreResult<Vec<Result<Value, String>>> {
    let mut rows = split_rows(text)?.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| CoreError::format("CSV has no header row"))?;

    Ok(rows
        .enumerate()
        .map(|(i, cells)| {
            if cells.len() != header.len() {
                return Err(format!(
                    "row {}: expected {} cells, found {}",
                    i + 2,
                    header.len(),
                    cells.len()
                ));
            }
            let mut object = Fields::new();
            for (name, cell) in header.iter().zip(cells) {
                if cell.is_empty() {
                    continue;
                }
                let value = serde_json::from_str(&cell).unwrap_or(Value::String(cell));
                object.insert(name.clone(), value);
            }
            Ok(Value::Object(object))
        })
        .collect())
}

/// Splits CSV text into rows of unquoted cells, skipping blank lines.
fn split_rows(text: &str) -> CoreResult<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut cell)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut cell));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                }
                row.clear();
            }
            _ => cell.push(c),
        }
    }
    if in_quotes {
        return Err(CoreError::format("unterminated quoted cell"));
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;
    use crate::types::Timestamp;
    use serde_json::json;

    fn records() -> Vec<Record> {
        let now = Timestamp::from_millis(1_700_000_000_000);
        vec![
            Record::new(
                "cust_1",
                fields(json!({
                    "name": "Silva, Ana",
                    "phone": "(11) 99999-0000",
                    "tags": ["vip", "frequent"],
                    "totalSpent": 5200.5,
                })),
                now,
            ),
            Record::new(
                "cust_2",
                fields(json!({
                    "name": "Bruno \"Bê\"",
                    "notes": "line one\nline two",
                    "zip": "01310",
                    "email": "",
                    "active": true,
                })),
                now,
            ),
        ]
    }

    #[test]
    fn format_parsing() {
        assert_eq!("CSV".parse::<Format>().unwrap(), Format::Csv);
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert!("xml".parse::<Format>().is_err());
        assert_eq!(Format::Csv.to_string(), "csv");
    }

    #[test]
    fn csv_header_puts_system_fields_first() {
        let csv = to_csv(&records());
        let header = csv.lines().next().unwrap();
        assert_eq!(
            header,
            "id,created_at,updated_at,_version,active,email,name,notes,phone,tags,totalSpent,zip"
        );
    }

    #[test]
    fn csv_of_no_records_is_a_header() {
        let csv = to_csv(&[]);
        assert_eq!(csv, "id,created_at,updated_at,_version\n");
        assert!(parse_csv(&csv).unwrap().is_empty());
    }

    #[test]
    fn csv_quotes_special_cells() {
        let csv = to_csv(&records());
        assert!(csv.contains("\"Silva, Ana\""));
        assert!(csv.contains("\"Bruno \"\"Bê\"\"\""));
        assert!(csv.contains("\"line one\nline two\""));
        assert!(csv.contains("\"[\"\"vip\"\",\"\"frequent\"\"]\""));
    }

    #[test]
    fn csv_round_trip_preserves_values() {
        let original = records();
        let rows = parse_csv(&to_csv(&original)).unwrap();
        assert_eq!(rows.len(), 2);

        for (row, record) in rows.into_iter().zip(&original) {
            let row = row.unwrap();
            assert_eq!(row["id"], json!(record.id));
            assert_eq!(row["_version"], json!(1));
            for (key, value) in &record.fields {
                assert_eq!(&row[key.as_str()], value, "field {key}");
            }
        }
    }

    #[test]
    fn csv_numeric_looking_strings_stay_strings() {
        let rows = parse_csv(&to_csv(&records())).unwrap();
        let second = rows[1].as_ref().unwrap();
        assert_eq!(second["zip"], json!("01310"));
        assert_eq!(second["email"], json!(""));
        assert_eq!(second["active"], json!(true));
    }

    #[test]
    fn csv_rows_with_wrong_width_are_reported() {
        let rows = parse_csv("id,name\r\n1,Ana\r\n2\r\n\r\n3,Carla,extra\n4,Dani").unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[0].is_ok());
        assert!(rows[1].as_ref().unwrap_err().contains("row 3"));
        assert!(rows[2].is_err());
        assert_eq!(rows[3].as_ref().unwrap()["name"], json!("Dani"));
    }

    #[test]
    fn csv_errors() {
        assert!(parse_csv("").is_err());
        assert!(parse_csv("id,name\n1,\"open").is_err());
    }

    #[test]
    fn json_payload_shapes() {
        assert_eq!(parse_json(r#"[{"id": "a"}]"#).unwrap().len(), 1);
        assert_eq!(parse_json(r#"{"data": [{"id": "a"}, {"id": "b"}]}"#).unwrap().len(), 2);
        assert!(parse_json(r#"{"rows": []}"#).is_err());
        assert!(parse_json("\"text\"").is_err());
        assert!(parse_json("[1,").is_err());

        let exported = to_json(&records()).unwrap();
        assert_eq!(parse_json(&exported).unwrap().len(), 2);
    }
}
