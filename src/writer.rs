use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{info, warn};

use crate::chapters::ChapterBuckets;
use crate::error::{PipelineError, Result};
use crate::model::RawDocument;

const INDENT: &[u8] = b"    ";

/// `NYCP3CH.json` → `NYCP3CH.json.tmp`, next to the final file.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize to a sibling temp file, then rename over `path`.
///
/// Readers see either the previous file or the complete new one. On failure
/// the temp file is removed and the previous file is left untouched.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PipelineError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp = tmp_path(path);
    let result = write_tmp(&tmp, value).and_then(|()| {
        fs::rename(&tmp, path).map_err(|source| PipelineError::Write {
            path: path.to_path_buf(),
            source,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_tmp<T: Serialize + ?Sized>(tmp: &Path, value: &T) -> Result<()> {
    let write_err = |source| PipelineError::Write {
        path: tmp.to_path_buf(),
        source,
    };

    let file = File::create(tmp).map_err(write_err)?;
    let mut out = BufWriter::new(file);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(INDENT));
    value
        .serialize(&mut ser)
        .map_err(|source| PipelineError::Serialize {
            path: tmp.to_path_buf(),
            source,
        })?;
    out.write_all(b"\n").map_err(write_err)?;
    let file = out.into_inner().map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;
    Ok(())
}

pub fn read_batch(path: &Path) -> Result<Vec<RawDocument>> {
    let bytes = fs::read(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| PipelineError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug)]
pub enum BatchOutcome {
    Written {
        key: String,
        path: PathBuf,
        documents: usize,
    },
    Failed {
        key: String,
        error: PipelineError,
    },
}

/// One JSON file per bucket under `out_dir`. A failed bucket doesn't stop the rest.
pub fn write_batches(buckets: &ChapterBuckets, out_dir: &Path) -> Vec<BatchOutcome> {
    buckets
        .iter()
        .map(|(key, docs)| {
            let path = out_dir.join(key);
            match write_json_atomic(&path, docs) {
                Ok(()) => {
                    info!(batch = key, documents = docs.len(), path = ?path, "batch written");
                    BatchOutcome::Written {
                        key: key.to_string(),
                        path,
                        documents: docs.len(),
                    }
                }
                Err(error) => {
                    warn!(batch = key, %error, "batch write failed");
                    BatchOutcome::Failed {
                        key: key.to_string(),
                        error,
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;
    use serde::ser::{Error as _, Serializer};

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot serialize"))
        }
    }

    #[derive(Serialize)]
    #[serde(untagged)]
    enum Entry {
        Doc(RawDocument),
        Bad(Unserializable),
    }

    fn doc(path: &str, text: &str) -> RawDocument {
        RawDocument {
            file_path: path.to_string(),
            raw_text: text.to_string(),
            sections: vec![Section {
                section: "101.1 Title.".into(),
                content: text.to_string(),
            }],
            metadata: None,
        }
    }

    #[test]
    fn writes_pretty_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("NYCP1CH.json");
        write_json_atomic(&path, &vec![doc("NYCP1ch_1pg.txt", "Café § 101 – ½ inch")]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Café § 101 – ½ inch"));
        assert!(text.contains("\n        \"file_path\": \"NYCP1ch_1pg.txt\""));
        assert!(text.contains("\"metadata\": {}"));
        assert!(!tmp_path(&path).exists());
        assert_eq!(read_batch(&path).unwrap()[0].raw_text, "Café § 101 – ½ inch");
    }

    #[test]
    fn overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NYCP1CH.json");
        write_json_atomic(&path, &vec![doc("a.txt", "a"), doc("b.txt", "b")]).unwrap();
        write_json_atomic(&path, &vec![doc("c.txt", "c")]).unwrap();
        let docs = read_batch(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_path, "c.txt");
    }

    #[test]
    fn failed_serialization_leaves_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NYCP1CH.json");
        write_json_atomic(&path, &vec![doc("old.txt", "old")]).unwrap();
        let before = fs::read(&path).unwrap();

        let entries = vec![Entry::Doc(doc("new.txt", "new")), Entry::Bad(Unserializable)];
        let err = write_json_atomic(&path, &entries).unwrap_err();
        assert!(matches!(err, PipelineError::Serialize { .. }));

        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn failed_serialization_without_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NYCP2CH.json");
        assert!(write_json_atomic(&path, &Unserializable).is_err());
        assert!(!path.exists());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn one_failed_bucket_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squatting on the final name makes the rename fail.
        fs::create_dir(dir.path().join("NYCP1CH.json")).unwrap();
        fs::write(dir.path().join("NYCP1CH.json").join("keep"), "x").unwrap();

        let buckets = ChapterBuckets::from_documents([
            doc("NYCP1ch_1pg.txt", "one"),
            doc("NYCP2ch_1pg.txt", "two"),
        ]);
        let outcomes = write_batches(&buckets, dir.path());
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], BatchOutcome::Failed { key, .. } if key == "NYCP1CH.json"));
        assert!(matches!(&outcomes[1], BatchOutcome::Written { documents: 1, .. }));
        assert!(!dir.path().join("NYCP1CH.json.tmp").exists());
        assert!(dir.path().join("NYCP2CH.json").is_file());
    }

    #[test]
    fn tmp_sits_next_to_target() {
        assert_eq!(
            tmp_path(Path::new("out/NYCP3CH.json")),
            PathBuf::from("out/NYCP3CH.json.tmp")
        );
    }
}
