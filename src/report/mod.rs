/// Artifact-to-HTML converters: styled tables from CSV, highlighted
/// views of JSON and source files. Each converter reads one input file
/// and writes one sibling HTML file.
pub mod code;
pub mod csv;
pub mod json;

use crate::csvfile::CsvError;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ReportError {
    Csv(CsvError),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Highlight { source: syntect::Error },
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Csv(e) => write!(f, "{e}"),
            ReportError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            ReportError::Highlight { source } => write!(f, "highlighting failed: {source}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Csv(e) => Some(e),
            ReportError::Io { source, .. } => Some(source),
            ReportError::Highlight { source } => Some(source),
        }
    }
}

impl From<CsvError> for ReportError {
    fn from(e: CsvError) -> Self {
        ReportError::Csv(e)
    }
}

/// Minimal HTML text escaping for interpolated content.
pub(crate) fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Page heading derived from a file name: stem, underscores to spaces,
/// each word capitalized.
pub(crate) fn title_from_path(path: &std::path::Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            html_escape(r#"<b a="1">&x</b>"#),
            "&lt;b a=&quot;1&quot;&gt;&amp;x&lt;/b&gt;"
        );
    }

    #[test]
    fn title_from_snake_case_stem() {
        assert_eq!(
            title_from_path(Path::new("/tmp/unit_test_results.csv")),
            "Unit Test Results"
        );
        assert_eq!(title_from_path(Path::new("report.json")), "Report");
    }
}
