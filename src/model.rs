use serde::{Deserialize, Serialize};

/// A span of page text under one header line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub section: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterMetadata {
    #[serde(default)]
    pub chapter: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chapter_title: Option<String>,
}

impl ChapterMetadata {
    pub fn is_empty(&self) -> bool {
        self.chapter.is_none() && self.title.is_none() && self.chapter_title.is_none()
    }
}

/// One OCR'd page file and everything derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub file_path: String,
    pub raw_text: String,
    pub sections: Vec<Section>,
    #[serde(default, with = "metadata_field")]
    pub metadata: Option<ChapterMetadata>,
}

impl RawDocument {
    /// File name component of `file_path`, or the whole path when it has none.
    pub fn file_name(&self) -> &str {
        std::path::Path::new(&self.file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.file_path)
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| !m.is_empty())
    }
}

// Unset metadata goes over the wire as `{}`; `{}`, `null` and all-null objects read back as unset.
mod metadata_field {
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::ChapterMetadata;

    pub fn serialize<S: Serializer>(
        value: &Option<ChapterMetadata>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(meta) => meta.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ChapterMetadata>, D::Error> {
        let meta = Option::<ChapterMetadata>::deserialize(deserializer)?;
        Ok(meta.filter(|m| !m.is_empty()))
    }
}
