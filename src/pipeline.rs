use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::chapters::ChapterBuckets;
use crate::error::{PipelineError, Result};
use crate::model::RawDocument;
use crate::parser::metadata::{self, ChapterOutcome};
use crate::parser::process_text;
use crate::parser::sections::SegmentPolicy;
use crate::writer::{self, BatchOutcome};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

const TEXT_EXT: &str = "txt";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub policy: SegmentPolicy,
    /// Fill metadata from page text for documents left without a chapter.
    pub wash: bool,
    pub progress: bool,
}

#[derive(Debug)]
pub enum FileOutcome {
    Loaded(RawDocument),
    Skipped { path: PathBuf, reason: String },
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub batches: Vec<BatchOutcome>,
    pub chapters: Vec<ChapterOutcome>,
    pub skipped: Vec<(PathBuf, String)>,
    pub washed: usize,
}

impl RunReport {
    pub fn written(&self) -> impl Iterator<Item = (&str, usize)> {
        self.batches.iter().filter_map(|b| match b {
            BatchOutcome::Written { key, documents, .. } => Some((key.as_str(), *documents)),
            BatchOutcome::Failed { .. } => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &PipelineError)> {
        self.batches.iter().filter_map(|b| match b {
            BatchOutcome::Failed { key, error } => Some((key.as_str(), error)),
            BatchOutcome::Written { .. } => None,
        })
    }

    pub fn print(&self) {
        for chapter in &self.chapters {
            match chapter {
                ChapterOutcome::Applied {
                    chapter,
                    documents,
                    metadata,
                } => println!(
                    "  chapter {chapter}: {} / {} ({documents} documents)",
                    metadata.title.as_deref().unwrap_or("-"),
                    metadata.chapter_title.as_deref().unwrap_or("-"),
                ),
                ChapterOutcome::Missing { chapter } => {
                    println!("  chapter {chapter}: metadata not found")
                }
            }
        }
        for batch in &self.batches {
            match batch {
                BatchOutcome::Written {
                    key,
                    path,
                    documents,
                } => println!("  {key}: {documents} documents -> {}", path.display()),
                BatchOutcome::Failed { key, error } => println!("  {key}: FAILED ({error})"),
            }
        }
        if self.washed > 0 {
            println!("  {} documents washed", self.washed);
        }
        println!(
            "Wrote {} batches, {} failed, {} files skipped.",
            self.written().count(),
            self.failed().count(),
            self.skipped.len()
        );
    }
}

/// `.txt` files directly inside `dir`, sorted by name.
pub fn list_text_files(dir: &Path) -> Result<Vec<PathBuf>> {
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

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == TEXT_EXT) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn load_document(path: &Path, policy: SegmentPolicy) -> FileOutcome {
    let skipped = |reason: String| {
        warn!(file = ?path, %reason, "skipping file");
        FileOutcome::Skipped {
            path: path.to_path_buf(),
            reason,
        }
    };
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => return skipped(e.to_string()),
    };
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => return skipped(format!("not valid UTF-8: {}", e.utf8_error())),
    };
    FileOutcome::Loaded(process_text(&path.to_string_lossy(), text, policy))
}

#[cfg(feature = "rayon")]
fn load_all(paths: &[PathBuf], policy: SegmentPolicy, pb: &ProgressBar) -> Vec<FileOutcome> {
    paths
        .par_iter()
        .map(|p| {
            let outcome = load_document(p, policy);
            pb.inc(1);
            outcome
        })
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn load_all(paths: &[PathBuf], policy: SegmentPolicy, pb: &ProgressBar) -> Vec<FileOutcome> {
    paths
        .iter()
        .map(|p| {
            let outcome = load_document(p, policy);
            pb.inc(1);
            outcome
        })
        .collect()
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Segment every page under `input_dir`, group by chapter, attach metadata
/// and write one batch per chapter.
pub fn run(opts: &PipelineOptions) -> Result<RunReport> {
    let files = list_text_files(&opts.input_dir)?;
    info!(input = ?opts.input_dir, files = files.len(), "loading pages");

    let pb = progress_bar(files.len(), opts.progress);
    let outcomes = load_all(&files, opts.policy, &pb);
    pb.finish_and_clear();

    let mut report = RunReport::default();
    let mut docs = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            FileOutcome::Loaded(doc) => docs.push(doc),
            FileOutcome::Skipped { path, reason } => report.skipped.push((path, reason)),
        }
    }
    let mut buckets = ChapterBuckets::from_documents(docs);

    for (key, docs) in buckets.iter_mut() {
        let chapters = metadata::apply_chapter_metadata(docs);
        if opts.wash {
            report.washed += metadata::wash(docs);
        }
        info!(batch = key, documents = docs.len(), chapters = chapters.len(), "batch ready");
        report.chapters.extend(chapters);
    }

    if buckets.is_empty() {
        warn!(input = ?opts.input_dir, "no pages were loaded");
    } else {
        info!(
            batches = buckets.len(),
            documents = buckets.document_count(),
            skipped = report.skipped.len(),
            "writing batches"
        );
    }
    report.batches = writer::write_batches(&buckets, &opts.output_dir);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_fixture(dir: &Path, name: &str, as_name: &str) {
        fs::copy(format!("tests/fixtures/{name}"), dir.join(as_name)).unwrap();
    }

    fn opts(input: &Path, output: &Path) -> PipelineOptions {
        PipelineOptions {
            input_dir: input.to_path_buf(),
            output_dir: output.to_path_buf(),
            policy: SegmentPolicy::default(),
            wash: false,
            progress: false,
        }
    }

    #[test]
    fn end_to_end() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        copy_fixture(input.path(), "NYCP1ch_1pg.txt", "NYCP1ch_1pg.txt");
        copy_fixture(input.path(), "NYCP3ch_2pg.txt", "NYCP3ch_2pg.txt");
        copy_fixture(input.path(), "NYCP3ch_1pg.txt", "NYCP3ch_1pg.txt");
        copy_fixture(input.path(), "sample.txt", "sample.txt");
        fs::write(input.path().join("notes.md"), "ignored").unwrap();
        fs::create_dir(input.path().join("nested.txt")).unwrap();

        let report = run(&opts(input.path(), output.path())).unwrap();
        let written: Vec<(&str, usize)> = report.written().collect();
        assert_eq!(
            written,
            vec![("NYCP1CH.json", 1), ("NYCP3CH.json", 2), ("text_data.json", 1)]
        );
        assert_eq!(report.failed().count(), 0);
        assert!(report.skipped.is_empty());

        let ch3 = writer::read_batch(&output.path().join("NYCP3CH.json")).unwrap();
        assert!(ch3[0].file_path.ends_with("NYCP3ch_1pg.txt"));
        assert!(ch3[1].file_path.ends_with("NYCP3ch_2pg.txt"));
        assert!(ch3.iter().all(|d| d.metadata.as_ref().unwrap().chapter == Some(3)));

        let ch1 = writer::read_batch(&output.path().join("NYCP1CH.json")).unwrap();
        let meta = ch1[0].metadata.as_ref().unwrap();
        assert_eq!(meta.title.as_deref(), Some("New York City Plumbing Code"));

        let loose = writer::read_batch(&output.path().join("text_data.json")).unwrap();
        assert_eq!(loose[0].metadata, None);
        let raw = fs::read_to_string(output.path().join("text_data.json")).unwrap();
        assert!(raw.contains("\"metadata\": {}"));
    }

    #[test]
    fn wash_fills_loose_pages() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        copy_fixture(input.path(), "NYCP1ch_1pg.txt", "scan_a.txt");

        let mut o = opts(input.path(), output.path());
        o.wash = true;
        let report = run(&o).unwrap();
        assert_eq!(report.washed, 1);

        let loose = writer::read_batch(&output.path().join("text_data.json")).unwrap();
        let meta = loose[0].metadata.as_ref().unwrap();
        assert_eq!(meta.chapter, Some(1));
        assert_eq!(meta.chapter_title.as_deref(), Some("ADMINISTRATION"));
    }

    #[test]
    fn bad_file_is_skipped() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        copy_fixture(input.path(), "NYCP3ch_1pg.txt", "NYCP3ch_1pg.txt");
        fs::write(input.path().join("NYCP3ch_2pg.txt"), [0x33u8, 0x30, 0xff, 0xfe, 0x0a]).unwrap();

        let report = run(&opts(input.path(), output.path())).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("NYCP3ch_2pg.txt"));
        assert_eq!(report.written().collect::<Vec<_>>(), vec![("NYCP3CH.json", 1)]);
    }

    #[test]
    fn missing_input_fails_fast() {
        let output = tempfile::tempdir().unwrap();
        let missing = output.path().join("does-not-exist");
        let err = run(&opts(&missing, output.path())).unwrap_err();
        assert!(matches!(err, PipelineError::InputMissing(_)));
        assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
    }

    #[test]
    fn file_as_input_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("NYCP1ch_1pg.txt");
        fs::write(&file, "101.1 Title.\nBody").unwrap();
        let err = run(&opts(&file, &dir.path().join("out"))).unwrap_err();
        assert!(matches!(err, PipelineError::NotADirectory(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn listing_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.TXT", "d.json"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let names: Vec<String> = list_text_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn rerun_overwrites_batches() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        copy_fixture(input.path(), "NYCP3ch_1pg.txt", "NYCP3ch_1pg.txt");
        copy_fixture(input.path(), "NYCP3ch_2pg.txt", "NYCP3ch_2pg.txt");
        run(&opts(input.path(), output.path())).unwrap();

        fs::remove_file(input.path().join("NYCP3ch_2pg.txt")).unwrap();
        run(&opts(input.path(), output.path())).unwrap();
        let ch3 = writer::read_batch(&output.path().join("NYCP3CH.json")).unwrap();
        assert_eq!(ch3.len(), 1);
    }
}
