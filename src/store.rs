/// KPI metrics store: an embedded SQLite database holding benchmark
/// result rows as JSON documents with run metadata attached.
///
/// Three operations back the `db` subcommands: `insert` loads a CSV's
/// rows, `dump` prints everything as one aligned table with timestamps
/// converted to the fixed display timezone, and `plot` is a diagnostic
/// per-design aggregation.
use crate::csvfile::{read_csv, CsvError};
use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::path::Path;

/// Display timezone for dumped timestamps (UTC-7).
const DISPLAY_UTC_OFFSET_SECS: i32 = -7 * 3600;
const DISPLAY_TZ_LABEL: &str = "PDT";

#[derive(Debug)]
pub enum StoreError {
    Csv(CsvError),
    Db(rusqlite::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Csv(e) => write!(f, "{e}"),
            StoreError::Db(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Csv(e) => Some(e),
            StoreError::Db(e) => Some(e),
        }
    }
}

impl From<CsvError> for StoreError {
    fn from(e: CsvError) -> Self {
        StoreError::Csv(e)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Db(e)
    }
}

/// Open (or create) the metrics database at the given path.
pub fn open_or_create(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;

    // WAL for better concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kpi_metrics (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            branch      TEXT NOT NULL,
            run_type    TEXT NOT NULL,
            commit_id   TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            data        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_kpi_metrics_branch ON kpi_metrics(branch);",
    )?;

    Ok(conn)
}

/// A stored metrics document.
#[derive(Debug)]
pub struct MetricsRow {
    pub id: i64,
    pub branch: String,
    pub run_type: String,
    pub commit_id: String,
    pub recorded_at: DateTime<Utc>,
    pub data: Map<String, Value>,
}

fn cell_value(raw: &str) -> Value {
    // Numbers stay numbers so `plot` can aggregate them later.
    if let Ok(n) = raw.trim().parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = raw.trim().parse::<f64>() {
        return Value::from(n);
    }
    Value::from(raw)
}

/// Load a CSV's rows as documents, attaching branch, run type, commit
/// id, and the insertion timestamp. Returns the number of documents
/// inserted.
pub fn insert_csv(
    conn: &Connection,
    csv_path: &Path,
    branch: &str,
    run_type: &str,
    commit_id: &str,
) -> Result<usize, StoreError> {
    let table = read_csv(csv_path)?;
    let now = Utc::now().to_rfc3339();

    let mut inserted = 0;
    for row in &table.rows {
        let mut doc = Map::new();
        for (header, cell) in table.headers.iter().zip(row.iter()) {
            doc.insert(header.clone(), cell_value(cell));
        }
        let data = Value::Object(doc).to_string();
        conn.execute(
            "INSERT INTO kpi_metrics (branch, run_type, commit_id, recorded_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![branch, run_type, commit_id, now, data],
        )?;
        inserted += 1;
    }
    Ok(inserted)
}

/// All stored documents, oldest first.
pub fn all_rows(conn: &Connection) -> Result<Vec<MetricsRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, branch, run_type, commit_id, recorded_at, data
         FROM kpi_metrics ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, branch, run_type, commit_id, recorded_at, data) = row?;
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let data = match serde_json::from_str::<Value>(&data) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        out.push(MetricsRow {
            id,
            branch,
            run_type,
            commit_id,
            recorded_at,
            data,
        });
    }
    Ok(out)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_timestamp(timestamp: &DateTime<Utc>) -> String {
    // FixedOffset::west_opt only fails for out-of-range offsets.
    let offset = FixedOffset::east_opt(DISPLAY_UTC_OFFSET_SECS)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    format!(
        "{} {DISPLAY_TZ_LABEL}",
        timestamp
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S")
    )
}

/// Render rows as one aligned text table. Columns are the fixed
/// metadata fields followed by the union of document keys in
/// first-seen order.
fn format_table(rows: &[MetricsRow]) -> String {
    let mut columns: Vec<String> = vec![
        "id".to_string(),
        "branch".to_string(),
        "run_type".to_string(),
        "commit_id".to_string(),
        format!("timestamp_{}", DISPLAY_TZ_LABEL.to_lowercase()),
    ];
    for row in rows {
        for key in row.data.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut cells: Vec<Vec<String>> = Vec::with_capacity(rows.len());
    for row in rows {
        let mut line = vec![
            row.id.to_string(),
            row.branch.clone(),
            row.run_type.clone(),
            row.commit_id.clone(),
            display_timestamp(&row.recorded_at),
        ];
        for key in &columns[5..] {
            line.push(row.data.get(key).map(display_value).unwrap_or_default());
        }
        cells.push(line);
    }

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            cells
                .iter()
                .map(|row| row[i].len())
                .chain(std::iter::once(col.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render_line = |values: &[String]| -> String {
        let padded: Vec<String> = values
            .iter()
            .zip(widths.iter().copied())
            .map(|(v, w)| format!("{v:<w$}"))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let separator = format!(
        "+-{}-+",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );

    let mut out = String::new();
    out.push_str(&separator);
    out.push('\n');
    out.push_str(&render_line(&columns));
    out.push('\n');
    out.push_str(&separator);
    out.push('\n');
    for row in &cells {
        out.push_str(&render_line(row));
        out.push('\n');
    }
    out.push_str(&separator);
    out
}

/// Dump the whole store as a formatted table, or a notice when empty.
pub fn dump(conn: &Connection) -> Result<String, StoreError> {
    let rows = all_rows(conn)?;
    if rows.is_empty() {
        return Ok("No documents found in the database.".to_string());
    }
    Ok(format_table(&rows))
}

/// Diagnostic aggregation: per-design document counts and means of
/// numeric metric columns.
pub fn plot(conn: &Connection) -> Result<String, StoreError> {
    let rows = all_rows(conn)?;
    if rows.is_empty() {
        return Ok("No documents found in the database.".to_string());
    }

    // design name -> (count, metric -> (sum, n))
    let mut designs: Vec<(String, usize, Vec<(String, f64, usize)>)> = Vec::new();
    for row in &rows {
        let design = row
            .data
            .get("design")
            .map(display_value)
            .unwrap_or_else(|| "(unnamed)".to_string());
        let idx = match designs.iter().position(|(name, _, _)| *name == design) {
            Some(idx) => idx,
            None => {
                designs.push((design, 0, Vec::new()));
                designs.len() - 1
            }
        };
        let entry = &mut designs[idx];
        entry.1 += 1;
        for (key, value) in &row.data {
            if let Some(n) = value.as_f64() {
                match entry.2.iter_mut().find(|(name, _, _)| name == key) {
                    Some(metric) => {
                        metric.1 += n;
                        metric.2 += 1;
                    }
                    None => entry.2.push((key.clone(), n, 1)),
                }
            }
        }
    }

    let mut out = String::new();
    for (design, count, metrics) in &designs {
        out.push_str(&format!("{design}: {count} run(s)"));
        for (metric, sum, n) in metrics {
            out.push_str(&format!(", mean {metric} = {:.2}", sum / *n as f64));
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db(dir: &TempDir) -> Connection {
        open_or_create(&dir.path().join("metrics.db")).unwrap()
    }

    fn sample_csv(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("kpi.csv");
        std::fs::write(
            &path,
            "design,tests,coverage\nalu,10,95.5\nfifo,4,80\nalu,12,90\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn creates_database_and_table() {
        let dir = TempDir::new().unwrap();
        let conn = test_db(&dir);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM kpi_metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn idempotent_creation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.db");
        drop(open_or_create(&path).unwrap());
        let conn = open_or_create(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM kpi_metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn insert_attaches_metadata_to_every_row() {
        let dir = TempDir::new().unwrap();
        let conn = test_db(&dir);
        let csv = sample_csv(&dir);

        let inserted = insert_csv(&conn, &csv, "main", "Simulation", "abc123").unwrap();
        assert_eq!(inserted, 3);

        let rows = all_rows(&conn).unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.branch, "main");
            assert_eq!(row.run_type, "Simulation");
            assert_eq!(row.commit_id, "abc123");
        }
        assert_eq!(rows[0].data["design"], Value::from("alu"));
        assert_eq!(rows[0].data["tests"], Value::from(10));
        assert_eq!(rows[0].data["coverage"], Value::from(95.5));
    }

    #[test]
    fn dump_unions_columns_and_converts_timezone() {
        let dir = TempDir::new().unwrap();
        let conn = test_db(&dir);
        insert_csv(&conn, &sample_csv(&dir), "main", "Simulation", "abc123").unwrap();

        let table = dump(&conn).unwrap();
        assert!(table.contains("| id "));
        assert!(table.contains("branch"));
        assert!(table.contains("timestamp_pdt"));
        assert!(table.contains("PDT"));
        assert!(table.contains("alu"));
        assert!(table.contains("fifo"));
    }

    #[test]
    fn dump_of_empty_store_prints_notice() {
        let dir = TempDir::new().unwrap();
        let conn = test_db(&dir);
        assert_eq!(dump(&conn).unwrap(), "No documents found in the database.");
    }

    #[test]
    fn display_timestamp_is_seven_hours_behind_utc() {
        let utc = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(display_timestamp(&utc), "2025-06-01 05:00:00 PDT");
    }

    #[test]
    fn plot_groups_by_design() {
        let dir = TempDir::new().unwrap();
        let conn = test_db(&dir);
        insert_csv(&conn, &sample_csv(&dir), "main", "Simulation", "abc123").unwrap();

        let summary = plot(&conn).unwrap();
        assert!(summary.contains("alu: 2 run(s)"));
        assert!(summary.contains("fifo: 1 run(s)"));
        assert!(summary.contains("mean tests = 11.00"));
    }

    #[test]
    fn missing_csv_is_a_csv_error() {
        let dir = TempDir::new().unwrap();
        let conn = test_db(&dir);
        let err = insert_csv(
            &conn,
            &dir.path().join("absent.csv"),
            "main",
            "Simulation",
            "x",
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Csv(_)));
    }
}
