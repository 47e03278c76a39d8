use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::model::RawDocument;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id            INTEGER PRIMARY KEY,
            batch         TEXT NOT NULL,
            file_path     TEXT UNIQUE NOT NULL,
            chapter       INTEGER,
            title         TEXT,
            chapter_title TEXT,
            raw_text      TEXT NOT NULL,
            imported_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_batch ON documents(batch);
        CREATE INDEX IF NOT EXISTS idx_documents_chapter ON documents(chapter);

        CREATE TABLE IF NOT EXISTS sections (
            id          INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            header      TEXT NOT NULL,
            content     TEXT NOT NULL,
            UNIQUE(document_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_sections_header ON sections(header);
        ",
    )?;
    Ok(())
}

// ── Import ──

/// Replace everything stored for `batch` with `docs`. Returns sections inserted.
pub fn import_batch(conn: &Connection, batch: &str, docs: &[RawDocument]) -> Result<usize> {
    let imported_at = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        tx.execute("DELETE FROM documents WHERE batch = ?1", [batch])?;
        let mut clear = tx.prepare("DELETE FROM documents WHERE file_path = ?1")?;
        let mut d_stmt = tx.prepare(
            "INSERT INTO documents
             (batch, file_path, chapter, title, chapter_title, raw_text, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        let mut s_stmt = tx.prepare(
            "INSERT INTO sections (document_id, position, header, content)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for doc in docs {
            let meta = doc.metadata.clone().unwrap_or_default();
            clear.execute([&doc.file_path])?;
            d_stmt.execute(rusqlite::params![
                batch, doc.file_path, meta.chapter, meta.title, meta.chapter_title,
                doc.raw_text, imported_at,
            ])?;
            let document_id = tx.last_insert_rowid();
            for (position, section) in doc.sections.iter().enumerate() {
                count += s_stmt.execute(rusqlite::params![
                    document_id, position as i64, section.section, section.content
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Queries ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHit {
    pub file_path: String,
    pub header: String,
    pub content: String,
}

fn query_hits(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<SectionHit>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(SectionHit {
                file_path: row.get(0)?,
                header: row.get(1)?,
                content: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Sections whose header contains `number` (e.g. `301.1`).
pub fn find_sections_by_number(conn: &Connection, number: &str) -> Result<Vec<SectionHit>> {
    query_hits(
        conn,
        "SELECT d.file_path, s.header, s.content
         FROM sections s JOIN documents d ON d.id = s.document_id
         WHERE instr(s.header, ?1) > 0
         ORDER BY d.file_path, s.position",
        [number],
    )
}

/// Sections whose content contains `keyword`, ignoring ASCII case.
pub fn search_content(conn: &Connection, keyword: &str, limit: usize) -> Result<Vec<SectionHit>> {
    query_hits(
        conn,
        "SELECT d.file_path, s.header, s.content
         FROM sections s JOIN documents d ON d.id = s.document_id
         WHERE instr(lower(s.content), lower(?1)) > 0
         ORDER BY d.file_path, s.position
         LIMIT ?2",
        rusqlite::params![keyword, limit as i64],
    )
}

/// Distinct section headers, sorted.
pub fn section_numbers(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT header FROM sections ORDER BY header")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub batches: usize,
    pub documents: usize,
    pub sections: usize,
    pub with_metadata: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let batches: usize =
        conn.query_row("SELECT COUNT(DISTINCT batch) FROM documents", [], |r| r.get(0))?;
    let documents: usize = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
    let sections: usize = conn.query_row("SELECT COUNT(*) FROM sections", [], |r| r.get(0))?;
    let with_metadata: usize = conn.query_row(
        "SELECT COUNT(*) FROM documents
         WHERE chapter IS NOT NULL OR title IS NOT NULL OR chapter_title IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        batches,
        documents,
        sections,
        with_metadata,
    })
}
