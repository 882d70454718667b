/// Run-workspace housekeeping: naming the per-run output directory,
/// clearing stale artifacts from previous runs, and deriving the CI
/// artifact URLs advertised in the console output.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Turn a branch name into an identifier-safe snake_case slug.
pub fn slugify(text: &str) -> String {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    static COLLAPSE: OnceLock<Regex> = OnceLock::new();
    let strip = STRIP.get_or_init(|| Regex::new(r"[^\w\s_-]").unwrap());
    let collapse = COLLAPSE.get_or_init(|| Regex::new(r"[\s-]+").unwrap());

    let text = text.replace('/', "-");
    let text = strip.replace_all(&text, "");
    let text = collapse.replace_all(&text, "_");
    let text = if text.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{text}")
    } else {
        text.into_owned()
    };
    text.to_lowercase()
}

/// Collision-resistant 8-character hex suffix for output directories.
pub fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// `<cwd>/outdir_<branch-slug>_<random>` for a fresh run.
pub fn outdir_name(cwd: &Path, target_branch: &str) -> PathBuf {
    cwd.join(format!(
        "outdir_{}_{}",
        slugify(target_branch),
        random_suffix()
    ))
}

/// Remove artifacts left behind by previous runs: loose `*.log` files
/// and `results*/` / `outdir*/` directories directly under `cwd`.
/// Missing artifacts are not an error.
pub fn delete_stale_artifacts(cwd: &Path) -> std::io::Result<()> {
    for path in matching(cwd, "*.log") {
        if path.is_file() {
            tracing::info!(file = %path.display(), "removing stale log file");
            std::fs::remove_file(&path)?;
        }
    }
    for pattern in ["results*", "outdir*"] {
        for path in matching(cwd, pattern) {
            if path.is_dir() {
                tracing::info!(dir = %path.display(), "removing stale output directory");
                std::fs::remove_dir_all(&path)?;
            }
        }
    }
    Ok(())
}

fn matching(cwd: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = cwd.join(pattern).display().to_string();
    match glob::glob(&full) {
        Ok(paths) => paths.flatten().collect(),
        Err(e) => {
            tracing::warn!(pattern = %full, error = %e, "bad cleanup pattern");
            Vec::new()
        }
    }
}

/// Build/workspace artifact URLs derived from the CI environment
/// (`BUILD_URL` / `JOB_URL`); empty strings when the variables are
/// unset.
pub fn build_urls(outdir: &Path) -> (String, String) {
    let leaf = outdir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let ws_for = |var: &str| -> String {
        match std::env::var(var) {
            Ok(url) if !url.trim().is_empty() => {
                format!("{}/ws/{leaf}/", url.trim().trim_end_matches('/'))
            }
            _ => String::new(),
        }
    };

    (ws_for("BUILD_URL"), ws_for("JOB_URL"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn slugify_branch_names() {
        assert_eq!(slugify("main"), "main");
        assert_eq!(slugify("feature/My Branch"), "feature_my_branch");
        assert_eq!(slugify("fix/issue#42!"), "fix_issue42");
        assert_eq!(slugify("123-hotfix"), "_123_hotfix");
    }

    #[test]
    fn slugify_is_deterministic() {
        assert_eq!(slugify("feature/a-b"), slugify("feature/a-b"));
    }

    #[test]
    fn random_suffix_is_short_hex_and_varies() {
        let a = random_suffix();
        let b = random_suffix();
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn outdir_name_combines_slug_and_suffix() {
        let dir = outdir_name(Path::new("/work"), "feature/x");
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("outdir_feature_x_"));
        assert_eq!(dir.parent(), Some(Path::new("/work")));
    }

    #[test]
    fn stale_artifacts_are_removed_and_others_kept() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.log"), "x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("results_v1")).unwrap();
        std::fs::create_dir(dir.path().join("outdir_main_abc")).unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        delete_stale_artifacts(dir.path()).unwrap();

        assert!(!dir.path().join("old.log").exists());
        assert!(!dir.path().join("results_v1").exists());
        assert!(!dir.path().join("outdir_main_abc").exists());
        assert!(dir.path().join("keep.txt").exists());
        assert!(dir.path().join("src").exists());
    }

    #[test]
    fn empty_directory_is_fine() {
        let dir = TempDir::new().unwrap();
        delete_stale_artifacts(dir.path()).unwrap();
    }
}
