use std::sync::LazyLock;

use regex::Regex;

use crate::model::Section;

/// `101 `, `101.1 `, `101.1.2 `: digits, up to two dotted parts, then whitespace.
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+){0,2}\s").unwrap());

/// What happens to lines that come before the first header line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Preamble {
    #[default]
    Drop,
    /// First pre-header line becomes the header, the rest its content.
    Keep,
}

/// What happens to a header line with no body before the next header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BareHeaders {
    #[default]
    Drop,
    Keep,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentPolicy {
    pub preamble: Preamble,
    pub bare_headers: BareHeaders,
}

pub fn is_header_line(line: &str) -> bool {
    HEADER_RE.is_match(line.trim_start())
}

/// Split page text into sections at numeric header lines.
///
/// Blank lines are discarded. Header lines are trimmed, content lines are kept
/// as written so table indentation survives. With the default policy, text
/// before the first header and headers with no body are lost.
pub fn segment(text: &str, policy: SegmentPolicy) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut header: Option<String> = None;
    let mut content: Vec<&str> = Vec::new();
    let mut preamble: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if is_header_line(line) {
            match header.take() {
                Some(open) => flush(&mut sections, open, &mut content, policy),
                None => flush_preamble(&mut sections, &mut preamble),
            }
            header = Some(trimmed.to_string());
        } else if trimmed.is_empty() {
            continue;
        } else if header.is_some() {
            content.push(line);
        } else if policy.preamble == Preamble::Keep {
            preamble.push(line);
        }
    }

    match header {
        Some(open) => flush(&mut sections, open, &mut content, policy),
        None => flush_preamble(&mut sections, &mut preamble),
    }

    sections
}

fn flush(sections: &mut Vec<Section>, header: String, content: &mut Vec<&str>, policy: SegmentPolicy) {
    if content.is_empty() && policy.bare_headers == BareHeaders::Drop {
        return;
    }
    sections.push(Section {
        section: header,
        content: content.join("\n"),
    });
    content.clear();
}

fn flush_preamble(sections: &mut Vec<Section>, preamble: &mut Vec<&str>) {
    let lines = std::mem::take(preamble);
    let Some((first, rest)) = lines.split_first() else {
        return;
    };
    sections.push(Section {
        section: first.trim().to_string(),
        content: rest.join("\n"),
    });
}

// ── Tests ──
