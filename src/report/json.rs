/// JSON file to a standalone highlighted HTML page.
use super::{html_escape, ReportError};
use std::path::{Path, PathBuf};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Page palette matched to the highlight theme.
struct Palette {
    page_bg: &'static str,
    container_bg: &'static str,
    heading: &'static str,
}

fn palette_for(theme: &str) -> Palette {
    if theme.to_lowercase().contains("dark") {
        Palette {
            page_bg: "#282828",
            container_bg: "#383838",
            heading: "#f8f8f2",
        }
    } else {
        Palette {
            page_bg: "#f5f5f5",
            container_bg: "#ffffff",
            heading: "#333333",
        }
    }
}

fn wrap_page(title: &str, theme: &str, inner: &str) -> String {
    let palette = palette_for(theme);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{title}</title>\n<style>\n\
         body {{\n    font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;\n\
         \x20   margin: 0;\n    padding: 20px;\n    background-color: {page_bg};\n}}\n\
         .container {{\n    max-width: 900px;\n    margin: 0 auto;\n\
         \x20   background-color: {container_bg};\n    padding: 20px;\n\
         \x20   border-radius: 8px;\n    box-shadow: 0 4px 12px rgba(0, 0, 0, 0.15);\n}}\n\
         h1 {{\n    color: {heading};\n    text-align: center;\n}}\n\
         .json-container {{\n    padding: 15px;\n    border-radius: 8px;\n\
         \x20   overflow-x: auto;\n    font-family: 'Courier New', Courier, monospace;\n\
         \x20   font-size: 14px;\n    line-height: 1.5;\n    white-space: pre-wrap;\n\
         \x20   word-wrap: break-word;\n}}\n\
         </style>\n</head>\n<body>\n<div class=\"container\">\n<h1>{title}</h1>\n\
         <div class=\"json-container\">\n{inner}\n</div>\n</div>\n</body>\n</html>",
        title = html_escape(title),
        page_bg = palette.page_bg,
        container_bg = palette.container_bg,
        heading = palette.heading,
    )
}

/// Resolve a theme by name, quietly falling back to the default for
/// unknown names.
fn resolve_theme(theme: Option<&str>) -> String {
    let themes = ThemeSet::load_defaults();
    match theme {
        Some(name) if themes.themes.contains_key(name) => name.to_string(),
        Some(name) => {
            tracing::warn!(theme = name, "unknown theme, using {DEFAULT_THEME}");
            DEFAULT_THEME.to_string()
        }
        None => DEFAULT_THEME.to_string(),
    }
}

/// Highlighted page body for a JSON document, or an error notice when
/// the document does not parse. Read failures remain hard errors.
fn page_body(json_text: &str, theme: &str) -> Result<String, ReportError> {
    let parsed: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(value) => value,
        Err(e) => {
            return Ok(format!("<p>Error parsing JSON: {}</p>", html_escape(&e.to_string())));
        }
    };
    let formatted = match serde_json::to_string_pretty(&parsed) {
        Ok(text) => text,
        Err(e) => return Ok(format!("<p>Error: {}</p>", html_escape(&e.to_string()))),
    };

    let syntax_set = SyntaxSet::load_defaults_newlines();
    let syntax = syntax_set
        .find_syntax_by_extension("json")
        .unwrap_or_else(|| syntax_set.find_syntax_plain_text());
    let themes = ThemeSet::load_defaults();
    let theme = &themes.themes[theme];
    highlighted_html_for_string(&formatted, &syntax_set, syntax, theme)
        .map_err(|e| ReportError::Highlight { source: e })
}

/// Convert a JSON file into a sibling `<stem>.html` page.
pub fn convert(
    input: &Path,
    title: Option<&str>,
    theme: Option<&str>,
) -> Result<PathBuf, ReportError> {
    let text = std::fs::read_to_string(input).map_err(|e| ReportError::Io {
        path: input.to_path_buf(),
        source: e,
    })?;

    let title = match title {
        Some(title) => title.to_string(),
        None => input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let theme = resolve_theme(theme);
    let inner = page_body(&text, &theme)?;
    let html = wrap_page(&title, &theme, &inner);

    let output = input.with_extension("html");
    std::fs::write(&output, html).map_err(|e| ReportError::Io {
        path: output.clone(),
        source: e,
    })?;
    Ok(output)
}
