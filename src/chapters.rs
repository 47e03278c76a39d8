use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::RawDocument;

static CHAPTER_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"NYCP(\d+)ch_").unwrap());

/// Bucket for pages whose names don't follow `NYCP{chapter}ch_{page}pg`.
pub const FALLBACK_BUCKET: &str = "text_data.json";

/// Chapter number embedded in a page file name.
pub fn chapter_of(file_name: &str) -> Option<u32> {
    CHAPTER_TOKEN_RE
        .captures(file_name)
        .and_then(|caps| caps[1].parse().ok())
}

/// The substring that marks a page as belonging to `chapter`.
pub fn chapter_token(chapter: u32) -> String {
    format!("NYCP{chapter}ch_")
}

/// Output file name of the batch a page belongs to.
pub fn bucket_key(file_name: &str) -> String {
    match CHAPTER_TOKEN_RE.captures(file_name) {
        Some(caps) => format!("NYCP{}CH.json", &caps[1]),
        None => FALLBACK_BUCKET.to_string(),
    }
}

/// Documents of one run, grouped by output batch. Keys iterate in sorted
/// order, documents keep insertion order.
#[derive(Debug, Default)]
pub struct ChapterBuckets {
    buckets: BTreeMap<String, Vec<RawDocument>>,
}

impl ChapterBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(docs: impl IntoIterator<Item = RawDocument>) -> Self {
        let mut buckets = Self::new();
        for doc in docs {
            buckets.push(doc);
        }
        buckets
    }

    pub fn push(&mut self, doc: RawDocument) {
        let key = bucket_key(doc.file_name());
        self.buckets.entry(key).or_default().push(doc);
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&[RawDocument]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RawDocument])> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<RawDocument>)> {
        self.buckets.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}
