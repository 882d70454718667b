/// CSV to styled HTML table with a computed summary row: percentage-like
/// columns are averaged, other numeric columns summed.
use super::{html_escape, title_from_path, ReportError};
use crate::csvfile::{read_csv, CsvTable};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const NOT_AVAILABLE: &[&str] = &["n/a", "na", "not available", ""];

/// Whether a cell holds a plain number (n/a-style markers excluded).
fn is_numeric(value: &str) -> bool {
    let trimmed = value.trim().to_lowercase();
    if NOT_AVAILABLE.contains(&trimmed.as_str()) {
        return false;
    }
    trimmed.parse::<f64>().is_ok()
}

/// Pull the leading numeric part out of a string like `"95.5%"`.
fn extract_percentage(value: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());
    number
        .find(value)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn is_percentage_column(header: &str) -> bool {
    let header = header.to_lowercase();
    ["percent", "percentage", "coverage", "%"]
        .iter()
        .any(|kw| header.contains(kw))
}

/// Per-column sums or averages for the table footer. Column 0 carries
/// the label.
fn summary_row(headers: &[String], rows: &[Vec<String>]) -> Vec<String> {
    headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            if col == 0 {
                return "Summary".to_string();
            }
            let values: Vec<&str> = rows
                .iter()
                .map(|row| row.get(col).map(String::as_str).unwrap_or(""))
                .collect();

            if is_percentage_column(header) {
                let numbers: Vec<f64> = values
                    .iter()
                    .filter(|v| !NOT_AVAILABLE.contains(&v.trim().to_lowercase().as_str()))
                    .filter_map(|v| extract_percentage(v))
                    .collect();
                if numbers.is_empty() {
                    return String::new();
                }
                let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
                if header.eq_ignore_ascii_case("total coverage") {
                    format!("{avg:.2}%")
                } else {
                    format!("{avg:.2}")
                }
            } else {
                let numbers: Vec<f64> = values
                    .iter()
                    .filter(|v| is_numeric(v))
                    .filter_map(|v| v.trim().parse::<f64>().ok())
                    .collect();
                if numbers.is_empty() {
                    return String::new();
                }
                let total: f64 = numbers.iter().sum();
                if total.fract() == 0.0 {
                    format!("{}", total as i64)
                } else {
                    format!("{total:.2}")
                }
            }
        })
        .collect()
}

const TABLE_CSS: &str = "\
    .table-container {
        margin: 1.5rem auto;
        max-width: 95%;
        box-shadow: 0 4px 20px rgba(0, 0, 0, 0.1);
        border-radius: 8px;
        overflow: hidden;
        font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
    }
    .elegant-table {
        border-collapse: collapse;
        width: 100%;
        background: white;
    }
    .elegant-table thead {
        background-color: #e0e0e0;
        color: #333;
    }
    .elegant-table th {
        padding: 0.6rem 1rem;
        text-align: left;
        font-weight: 600;
        border-bottom: 1px solid rgba(0, 0, 0, 0.1);
    }
    .elegant-table td {
        padding: 0.5rem 1rem;
        vertical-align: middle;
        border-bottom: 1px solid rgba(0, 0, 0, 0.05);
    }
    .elegant-table tbody tr:nth-child(even) {
        background-color: #f9fafb;
    }
    .elegant-table tbody tr:hover {
        background-color: rgba(0, 0, 0, 0.03);
    }
    .summary-row {
        background-color: #f0f5ff !important;
        border-top: 2px solid #d0d0d0;
        font-weight: 500;
    }
    .summary-row td:first-child {
        font-weight: 700;
    }
    body {
        background-color: #f5f7fa;
        padding: 15px;
        margin: 0;
    }
    h1 {
        text-align: center;
        color: #333;
        font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
    }";

fn render(table: &CsvTable, title: &str) -> String {
    let mut body = String::new();
    body.push_str("<div class=\"table-container\">\n<table class=\"elegant-table\">\n<thead><tr>");
    for header in &table.headers {
        body.push_str(&format!("<th>{}</th>", html_escape(header)));
    }
    body.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        body.push_str("<tr>");
        for cell in row {
            body.push_str(&format!("<td>{}</td>", html_escape(cell)));
        }
        body.push_str("</tr>\n");
    }
    body.push_str("<tr class=\"summary-row\">");
    for cell in summary_row(&table.headers, &table.rows) {
        body.push_str(&format!("<td>{}</td>", html_escape(&cell)));
    }
    body.push_str("</tr>\n</tbody>\n</table>\n</div>");

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>Data Table</title>\n<style>\n{TABLE_CSS}\n</style>\n</head>\n<body>\n\
         <h1>{}</h1>\n{}\n</body>\n</html>",
        html_escape(title),
        body
    )
}

/// Convert a CSV file into a sibling `<stem>_table.html`.
pub fn convert(input: &Path) -> Result<PathBuf, ReportError> {
    let table = read_csv(input)?;
    let title = title_from_path(input);
    let html = render(&table, &title);

    let output = match input.file_stem() {
        Some(stem) => input.with_file_name(format!("{}_table.html", stem.to_string_lossy())),
        None => input.with_extension("html"),
    };
    std::fs::write(&output, html).map_err(|e| ReportError::Io {
        path: output.clone(),
        source: e,
    })?;
    Ok(output)
}
