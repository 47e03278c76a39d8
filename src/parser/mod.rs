pub mod metadata;
pub mod sections;

use crate::model::RawDocument;
use sections::SegmentPolicy;

/// One page: raw text → sections. Metadata is attached later, per chapter.
pub fn process_text(file_path: &str, raw_text: String, policy: SegmentPolicy) -> RawDocument {
    let sections = sections::segment(&raw_text, policy);
    RawDocument {
        file_path: file_path.to_string(),
        raw_text,
        sections,
        metadata: None,
    }
}
