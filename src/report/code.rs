/// Source file (SystemVerilog and friends) to a standalone highlighted
/// HTML page.
use super::{html_escape, ReportError};
use std::path::{Path, PathBuf};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

pub const DEFAULT_THEME: &str = "InspiredGitHub";

/// Convert a source file into a highlighted HTML page. Output defaults
/// to the input path with an `.html` extension. Unknown extensions fall
/// back to plain text rather than failing.
pub fn convert(
    input: &Path,
    output: Option<&Path>,
    theme: Option<&str>,
) -> Result<PathBuf, ReportError> {
    let code = std::fs::read_to_string(input).map_err(|e| ReportError::Io {
        path: input.to_path_buf(),
        source: e,
    })?;

    let syntax_set = SyntaxSet::load_defaults_newlines();
    let extension = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let syntax = syntax_set
        .find_syntax_by_extension(&extension)
        .unwrap_or_else(|| {
            tracing::debug!(extension = %extension, "no syntax definition, using plain text");
            syntax_set.find_syntax_plain_text()
        });

    let themes = ThemeSet::load_defaults();
    let theme_name = match theme {
        Some(name) if themes.themes.contains_key(name) => name.to_string(),
        Some(name) => {
            tracing::warn!(theme = name, "unknown theme, using {DEFAULT_THEME}");
            DEFAULT_THEME.to_string()
        }
        None => DEFAULT_THEME.to_string(),
    };
    let highlighted =
        highlighted_html_for_string(&code, &syntax_set, syntax, &themes.themes[&theme_name])
            .map_err(|e| ReportError::Highlight { source: e })?;

    let title = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <title>{title}</title>\n<style>\nbody {{ margin: 0; padding: 12px; }}\n\
         pre {{ font-size: 13px; line-height: 1.4; }}\n</style>\n</head>\n<body>\n\
         {highlighted}\n</body>\n</html>",
        title = html_escape(&title),
    );

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension("html"),
    };
    std::fs::write(&output, html).map_err(|e| ReportError::Io {
        path: output.clone(),
        source: e,
    })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_SV: &str = "module counter(input clk, output reg [3:0] q);\n\
        always @(posedge clk) q <= q + 1;\nendmodule\n";

    #[test]
    fn writes_default_output_path() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("counter.sv");
        std::fs::write(&input, SAMPLE_SV).unwrap();

        let output = convert(&input, None, None).unwrap();
        assert_eq!(output, dir.path().join("counter.html"));

        let html = std::fs::read_to_string(&output).unwrap();
        assert!(html.contains("<title>counter.sv</title>"));
        assert!(html.contains("module counter"));
    }

    #[test]
    fn explicit_output_path_wins() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("top.sv");
        std::fs::write(&input, SAMPLE_SV).unwrap();
        let wanted = dir.path().join("custom.html");

        let output = convert(&input, Some(&wanted), None).unwrap();
        assert_eq!(output, wanted);
        assert!(wanted.exists());
    }

    #[test]
    fn markup_in_source_is_escaped_or_highlighted_safely() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("gen.sv");
        std::fs::write(&input, "assign y = a < b;\n").unwrap();

        let output = convert(&input, None, None).unwrap();
        let html = std::fs::read_to_string(&output).unwrap();
        // The raw `<` of the source must not survive as markup
        assert!(!html.contains("a < b;"));
    }

    #[test]
    fn unknown_theme_falls_back() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("x.sv");
        std::fs::write(&input, SAMPLE_SV).unwrap();
        assert!(convert(&input, None, Some("bogus-theme")).is_ok());
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = convert(&dir.path().join("absent.sv"), None, None).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }
}
