use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

static NYCP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)NYCP(\d+)ch_(\d+)pg").unwrap());
static CHAPTER_PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)chapter_?(\d+)_?(\d+)page").unwrap());
static TWO_NUMBERS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\D+(\d+)").unwrap());

/// Chapter and page from an uploaded file's stem: `NYCP3ch_1pg`,
/// `chapter_2_1page`, or any two separated numbers (`5 Screenshot 3`).
pub fn extract_chapter_page(stem: &str) -> Option<(u32, u32)> {
    [&*NYCP_RE, &*CHAPTER_PAGE_RE, &*TWO_NUMBERS_RE]
        .iter()
        .find_map(|re| {
            let caps = re.captures(stem)?;
            Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
        })
}

/// `ext` includes the leading dot, or is empty.
pub fn nycp_name(chapter: u32, page: u32, ext: &str) -> String {
    format!("NYCP{chapter}ch_{page}pg{ext}")
}

#[derive(Debug, Default)]
pub struct RenameReport {
    pub renamed: Vec<(String, String)>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<(String, String)>,
}

/// Rename every visible file in `dir` to the `NYCP{chapter}ch_{page}pg` form.
pub fn rename_uploads(dir: &Path) -> Result<RenameReport> {
    if !dir.exists() {
        return Err(PipelineError::InputMissing(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(PipelineError::NotADirectory(dir.to_path_buf()));
    }
    let list_err = |source| PipelineError::ListDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && !name.starts_with('.') {
            names.push(name.to_string());
        }
    }
    names.sort();
    info!(dir = ?dir, files = names.len(), "normalizing upload names");

    let mut report = RenameReport::default();
    for name in names {
        let path = dir.join(&name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(&name);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let Some((chapter, page)) = extract_chapter_page(stem) else {
            warn!(file = %name, "no chapter/page in file name");
            report.skipped.push((name, "no chapter/page in name".into()));
            continue;
        };
        let target = nycp_name(chapter, page, &ext);
        if target == name {
            report.unchanged.push(name);
            continue;
        }
        let target_path = dir.join(&target);
        if target_path.exists() {
            warn!(file = %name, target = %target, "target already exists");
            report.skipped.push((name, format!("{target} already exists")));
            continue;
        }
        match fs::rename(&path, &target_path) {
            Ok(()) => {
                info!(from = %name, to = %target, "renamed");
                report.renamed.push((name, target));
            }
            Err(e) => {
                warn!(file = %name, error = %e, "rename failed");
                report.skipped.push((name, e.to_string()));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_patterns() {
        assert_eq!(extract_chapter_page("NYCP3ch_12pg"), Some((3, 12)));
        assert_eq!(extract_chapter_page("nycp3ch_12pg"), Some((3, 12)));
        assert_eq!(extract_chapter_page("chapter1_1page"), Some((1, 1)));
        assert_eq!(extract_chapter_page("chapter_2_3page"), Some((2, 3)));
        assert_eq!(extract_chapter_page("Chapter10_5page"), Some((10, 5)));
        assert_eq!(extract_chapter_page("5Screenshot3"), Some((5, 3)));
        assert_eq!(extract_chapter_page("scan 8 - 12"), Some((8, 12)));
        assert_eq!(extract_chapter_page("Screenshot"), None);
        assert_eq!(extract_chapter_page("page7"), None);
    }

    #[test]
    fn canonical_name() {
        assert_eq!(nycp_name(2, 3, ".jpg"), "NYCP2ch_3pg.jpg");
        assert_eq!(nycp_name(2, 3, ""), "NYCP2ch_3pg");
    }

    #[test]
    fn renames_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["chapter1_1page.png", "NYCP1ch_2pg.jpg", "cover.jpg", ".DS_Store", "2_5.jpg"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        fs::write(dir.path().join("NYCP2ch_5pg.jpg"), "existing").unwrap();

        let report = rename_uploads(dir.path()).unwrap();
        assert_eq!(
            report.renamed,
            vec![("chapter1_1page.png".to_string(), "NYCP1ch_1pg.png".to_string())]
        );
        assert_eq!(report.unchanged, vec!["NYCP1ch_2pg.jpg".to_string(), "NYCP2ch_5pg.jpg".to_string()]);
        let skipped: Vec<&str> = report.skipped.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(skipped, vec!["2_5.jpg", "cover.jpg"]);

        assert!(dir.path().join("NYCP1ch_1pg.png").is_file());
        assert!(dir.path().join(".DS_Store").is_file());
        assert_eq!(fs::read_to_string(dir.path().join("NYCP2ch_5pg.jpg")).unwrap(), "existing");
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            rename_uploads(&dir.path().join("nope")),
            Err(PipelineError::InputMissing(_))
        ));
    }
}
