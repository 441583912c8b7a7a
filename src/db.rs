use crate::models::PostRecord;

use anyhow::{anyhow, Result};
use duckdb::{params, Connection};
use std::path::Path;

pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(r#"
    -- No PRIMARY KEY / IDENTITY: ids are allocated by hand, rows replaced by delete+insert
    CREATE TABLE IF NOT EXISTS runs (
        id BIGINT,
        query VARCHAR,
        exported_at BIGINT,
        post_count BIGINT
    );

    CREATE TABLE IF NOT EXISTS posts (
        run_id BIGINT,
        ord BIGINT,
        post_id VARCHAR,
        source_url VARCHAR,
        page_id VARCHAR,
        page_name VARCHAR,
        post_url VARCHAR,
        canonical_url VARCHAR,
        published_at_text VARCHAR,
        published_at_epoch BIGINT,
        like_count BIGINT,
        comment_count BIGINT,
        share_count BIGINT,
        body_text VARCHAR,
        external_link VARCHAR,
        thumbnail_url VARCHAR
    );

    CREATE INDEX IF NOT EXISTS idx_runs_id ON runs(id);
    CREATE INDEX IF NOT EXISTS idx_posts_run_post ON posts(run_id, post_id);
    "#)?;
    Ok(conn)
}

pub fn start_run(conn: &Connection, query: &str, exported_at: i64) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT COALESCE(MAX(id)+1, 1) FROM runs")?;
    let mut rows = stmt.query([])?;
    let id: i64 = rows.next()?.ok_or_else(|| anyhow!("failed to alloc run id"))?.get(0)?;

    conn.execute(
        "INSERT INTO runs(id, query, exported_at, post_count) VALUES (?, ?, ?, 0)",
        params![id, query, exported_at],
    )?;
    Ok(id)
}

fn as_i64(n: Option<u64>) -> Option<i64> {
    n.map(|v| i64::try_from(v).unwrap_or(i64::MAX))
}

pub fn upsert_post(conn: &Connection, run_id: i64, ord: i64, p: &PostRecord) -> Result<()> {
    conn.execute("DELETE FROM posts WHERE run_id = ? AND post_id = ?", params![run_id, p.post_id])?;
    conn.execute(
        r#"INSERT INTO posts
           (run_id, ord, post_id, source_url, page_id, page_name, post_url, canonical_url,
            published_at_text, published_at_epoch, like_count, comment_count, share_count,
            body_text, external_link, thumbnail_url)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        params![
            run_id,
            ord,
            p.post_id,
            p.source_url,
            p.page_id,
            p.page_name,
            p.post_url,
            p.canonical_url,
            p.published_at_text,
            p.published_at_epoch,
            as_i64(p.like_count),
            as_i64(p.comment_count),
            as_i64(p.share_count),
            p.body_text,
            p.external_link,
            p.thumbnail_url,
        ],
    )?;
    Ok(())
}

/// Writes one run and its posts in discovery order. Returns the run id.
pub fn write_run(conn: &Connection, query: &str, exported_at: i64, posts: &[PostRecord]) -> Result<i64> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    let res: Result<i64> = (|| {
        let run_id = start_run(conn, query, exported_at)?;
        for (i, p) in posts.iter().enumerate() {
            upsert_post(conn, run_id, i as i64, p)?;
        }
        conn.execute(
            "UPDATE runs SET post_count = ? WHERE id = ?",
            params![posts.len() as i64, run_id],
        )?;
        Ok(run_id)
    })();
    match res {
        Ok(id) => {
            conn.execute_batch("COMMIT")?;
            Ok(id)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}
