mod chapters;
mod db;
mod error;
mod model;
mod parser;
mod pipeline;
mod rename;
mod settings;
mod writer;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::warn;

use pipeline::PipelineOptions;
use settings::Settings;

#[derive(Parser)]
#[command(name = "codebook", about = "Plumbing code page segmentation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename uploaded files to NYCP{chapter}ch_{page}pg form
    Rename {
        /// Uploads directory (default: uploads_dir setting)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Segment OCR text pages and write one JSON batch per chapter
    Process {
        /// Directory of .txt pages (default: input_dir setting)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Directory for JSON batches (default: output_dir setting)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep lines before the first numeric header as a section
        #[arg(long)]
        keep_preamble: bool,
        /// Keep header lines that have no body
        #[arg(long)]
        keep_bare_headers: bool,
        /// Fill metadata from page text where no chapter applies
        #[arg(long)]
        wash: bool,
    },
    /// Fill missing metadata in an existing batch file
    Wash {
        batch: PathBuf,
        /// Write here instead of rewriting the batch in place
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Load JSON batches into the section index
    Import {
        /// Directory of JSON batches (default: output_dir setting)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// List section headers, or the sections matching a number
    Sections {
        /// Section number to look up (e.g. 301.1)
        number: Option<String>,
    },
    /// Search section content for a keyword
    Search {
        keyword: String,
        /// Max results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show index statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Rename { dir } => {
            let dir = dir.unwrap_or(settings.uploads_dir);
            let report = rename::rename_uploads(&dir)?;
            println!(
                "Renamed {} files ({} already named, {} skipped).",
                report.renamed.len(),
                report.unchanged.len(),
                report.skipped.len()
            );
            Ok(())
        }
        Commands::Process {
            input,
            output,
            keep_preamble,
            keep_bare_headers,
            wash,
        } => {
            let mut policy = settings.segment_policy();
            if keep_preamble {
                policy.preamble = parser::sections::Preamble::Keep;
            }
            if keep_bare_headers {
                policy.bare_headers = parser::sections::BareHeaders::Keep;
            }
            let opts = PipelineOptions {
                input_dir: input.unwrap_or(settings.input_dir),
                output_dir: output.unwrap_or(settings.output_dir),
                policy,
                wash: wash || settings.wash,
                progress: true,
            };
            println!("Processing {:?} -> {:?}", opts.input_dir, opts.output_dir);
            let report = pipeline::run(&opts)?;
            report.print();
            let failed = report.failed().count();
            if failed > 0 {
                bail!("{} batches failed to write", failed);
            }
            Ok(())
        }
        Commands::Wash { batch, out } => {
            let mut docs = writer::read_batch(&batch)?;
            let filled = parser::metadata::wash(&mut docs);
            let target = out.unwrap_or_else(|| batch.clone());
            writer::write_json_atomic(&target, &docs)?;
            println!("Filled metadata on {} of {} documents -> {:?}", filled, docs.len(), target);
            Ok(())
        }
        Commands::Import { dir } => {
            let dir = dir.unwrap_or_else(|| settings.output_dir.clone());
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            import_dir(&conn, &dir)
        }
        Commands::Sections { number } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            match number {
                Some(n) => {
                    let hits = db::find_sections_by_number(&conn, &n)?;
                    if hits.is_empty() {
                        println!("No sections match {n}. Run 'import' first?");
                    }
                    for hit in &hits {
                        print_hit(hit);
                    }
                }
                None => {
                    let numbers = db::section_numbers(&conn)?;
                    for header in &numbers {
                        println!("{header}");
                    }
                    println!("\n{} unique sections", numbers.len());
                }
            }
            Ok(())
        }
        Commands::Search { keyword, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let hits = db::search_content(&conn, &keyword, limit)?;
            if hits.is_empty() {
                println!("No sections contain '{keyword}'.");
            }
            for hit in &hits {
                print_hit(hit);
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Batches:   {}", s.batches);
            println!("Documents: {}", s.documents);
            println!("Sections:  {}", s.sections);
            println!("Metadata:  {}", s.with_metadata);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn import_dir(conn: &rusqlite::Connection, dir: &Path) -> anyhow::Result<()> {
    let mut batches: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {:?}", dir))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    batches.sort();

    let mut sections = 0;
    let mut imported = 0;
    for path in &batches {
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let docs = match writer::read_batch(path) {
            Ok(docs) => docs,
            Err(e) => {
                warn!(batch = %key, error = %e, "skipping batch");
                continue;
            }
        };
        sections += db::import_batch(conn, &key, &docs)?;
        imported += 1;
        println!("  {key}: {} documents", docs.len());
    }
    println!("Imported {} batches ({} sections).", imported, sections);
    Ok(())
}

fn print_hit(hit: &db::SectionHit) {
    let name = Path::new(&hit.file_path)
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    println!("{} | {}", name, hit.header);
    println!("    {}\n", snippet(&hit.content, 200));
}

/// One-line preview of section content: runs of whitespace (newlines and
/// table indentation included) become one space, cut at `max` chars.
fn snippet(content: &str, max: usize) -> String {
    let mut out = String::new();
    for (n, word) in content.split_whitespace().enumerate() {
        if n > 0 {
            out.push(' ');
        }
        out.push_str(word);
    }
    match out.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &out[..cut]),
        None => out,
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
