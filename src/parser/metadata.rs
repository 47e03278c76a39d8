use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::chapters::{chapter_of, chapter_token};
use crate::model::{ChapterMetadata, RawDocument};

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"["“]([^"“”]*)["”]"#).unwrap());

static TEXT_CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bCHAPTER\s+(\d+)").unwrap());
static CITED_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)known and may be cited as the\s+["“]([^"”]*)["”]"#).unwrap());
static CODE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)["“]([^"”]*(?:New York City Plumbing Code|NYC Plumbing Code)[^"”]*)["”]"#).unwrap()
});

pub const DEFAULT_TITLE: &str = "New York City Plumbing Code";

/// First non-empty double-quoted span, without surrounding space or trailing punctuation.
pub fn first_quoted(text: &str) -> Option<String> {
    QUOTED_RE
        .captures_iter(text)
        .map(|caps| clean_title(&caps[1]))
        .find(|t| !t.is_empty())
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', ',', ';', ':'])
        .trim_end()
        .to_string()
}

/// Upper-case line: at least one letter and no lower-case letters once
/// trimmed. `TRAPS, INTERCEPTORS AND SEPARATORS` and `SECTION PC 102` both count.
pub fn is_upper_heading(line: &str) -> bool {
    let line = line.trim();
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

/// Heading candidate for the wash: upper-case, not a `CHAPTER`/`SECTION` label.
fn is_wash_heading(line: &str) -> bool {
    line.len() >= 3 && is_upper_heading(line) && !line.starts_with("CHAPTER") && !line.starts_with("SECTION")
}

/// Chapter numbers named by the documents' file names, ascending.
pub fn chapter_numbers(docs: &[RawDocument]) -> BTreeSet<u32> {
    docs.iter().filter_map(|d| chapter_of(d.file_name())).collect()
}

/// Scan the chapter's defining page for its title and heading.
pub fn extract_chapter_metadata(doc: &RawDocument, chapter: u32) -> ChapterMetadata {
    let title_key = format!("{chapter}01.1");
    let mut title: Option<String> = None;
    let mut chapter_title: Option<String> = None;

    for section in &doc.sections {
        if title.is_some() && chapter_title.is_some() {
            break;
        }
        if title.is_none() && section.section.contains(&title_key) {
            title = first_quoted(&section.content);
        }
        if chapter_title.is_none() {
            chapter_title = section
                .content
                .lines()
                .find(|l| is_upper_heading(l))
                .map(|l| l.trim().to_string());
        }
    }

    ChapterMetadata {
        chapter: Some(chapter),
        title: Some(title.unwrap_or_else(|| format!("{DEFAULT_TITLE} Chapter {chapter}"))),
        chapter_title: Some(chapter_title.unwrap_or_else(|| format!("CHAPTER {chapter}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    Applied {
        chapter: u32,
        documents: usize,
        metadata: ChapterMetadata,
    },
    /// No document carries the chapter's token; nothing was changed.
    Missing { chapter: u32 },
}

/// Attach chapter metadata to every document of each chapter found in `docs`.
pub fn apply_chapter_metadata(docs: &mut [RawDocument]) -> Vec<ChapterOutcome> {
    let mut outcomes = Vec::new();
    for chapter in chapter_numbers(docs) {
        let token = chapter_token(chapter);
        let Some(source) = docs.iter().find(|d| d.file_name().contains(&token)) else {
            warn!(chapter, token = %token, "no page carries the chapter token, metadata skipped");
            outcomes.push(ChapterOutcome::Missing { chapter });
            continue;
        };
        let metadata = extract_chapter_metadata(source, chapter);
        debug!(chapter, source = %source.file_path, ?metadata, "chapter metadata");

        let mut documents = 0;
        for doc in docs.iter_mut().filter(|d| d.file_name().contains(&token)) {
            doc.metadata = Some(metadata.clone());
            documents += 1;
        }
        outcomes.push(ChapterOutcome::Applied {
            chapter,
            documents,
            metadata,
        });
    }
    outcomes
}

// ── Wash: fill metadata from the page text alone ──

/// Best-effort metadata for a page without a chapter group.
pub fn wash_metadata(text: &str) -> ChapterMetadata {
    let chapter = chapter_of(text).or_else(|| {
        TEXT_CHAPTER_RE
            .captures(text)
            .and_then(|c| c[1].parse::<u32>().ok())
    });

    let title = [&*CITED_TITLE_RE, &*CODE_TITLE_RE]
        .iter()
        .filter_map(|re| re.captures(text).map(|c| clean_title(&c[1])))
        .find(|t| t.to_lowercase().contains("plumbing code"))
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let chapter_title = chapter
        .and_then(|n| heading_after_chapter_line(text, n))
        .or_else(|| {
            text.lines()
                .map(str::trim)
                .find(|l| is_wash_heading(l))
                .map(str::to_string)
        });

    ChapterMetadata {
        chapter,
        title: Some(title),
        chapter_title,
    }
}

fn heading_after_chapter_line(text: &str, chapter: u32) -> Option<String> {
    let marker = format!("CHAPTER {chapter}");
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    lines.find(|l| *l == marker)?;
    lines
        .next()
        .filter(|l| is_wash_heading(l))
        .map(str::to_string)
}

/// Fill metadata on documents that have none. Returns how many were filled.
pub fn wash(docs: &mut [RawDocument]) -> usize {
    let mut filled = 0;
    for doc in docs.iter_mut().filter(|d| !d.has_metadata()) {
        let text = format!("{}\n{}", doc.raw_text, doc.file_path);
        let metadata = wash_metadata(&text);
        debug!(file = %doc.file_path, ?metadata, "washed metadata");
        doc.metadata = Some(metadata);
        filled += 1;
    }
    filled
}

// ── Tests ──
