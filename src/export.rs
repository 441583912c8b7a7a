use crate::db::{open_db, write_run};
use crate::extract::now_secs;
use crate::models::PostRecord;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Jsonl,
    Csv,
    Duckdb,
}

impl ExportFormat {
    pub fn ext(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Csv => "csv",
            ExportFormat::Duckdb => "duckdb",
        }
    }
}

/// An explicit `output` is used as given; otherwise `<output_dir>/results.<ext>`.
/// Parent directories are created either way.
pub fn resolve_output_path(output: Option<&Path>, format: ExportFormat, output_dir: &Path) -> Result<PathBuf> {
    let path = match output {
        Some(p) => p.to_path_buf(),
        None => output_dir.join(format!("results.{}", format.ext())),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(path)
}

pub fn export_posts(posts: &[PostRecord], path: &Path, format: ExportFormat, query: &str) -> Result<()> {
    match format {
        ExportFormat::Json => {
            let mut w = create(path)?;
            serde_json::to_writer_pretty(&mut w, posts)?;
            writeln!(w)?;
            w.flush()?;
        }
        ExportFormat::Jsonl => {
            let mut w = create(path)?;
            for p in posts {
                serde_json::to_writer(&mut w, p)?;
                writeln!(w)?;
            }
            w.flush()?;
        }
        ExportFormat::Csv => {
            let mut w = create(path)?;
            let header: Vec<String> = PostRecord::COLUMNS.iter().map(|c| c.to_string()).collect();
            write_row(&mut w, &header)?;
            for p in posts {
                write_row(&mut w, &p.cells())?;
            }
            w.flush()?;
        }
        ExportFormat::Duckdb => {
            let conn = open_db(path).with_context(|| format!("opening {}", path.display()))?;
            write_run(&conn, query, now_secs(), posts)?;
        }
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(f))
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(w: &mut W, row: &[String]) -> std::io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}
