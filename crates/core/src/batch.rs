//! Batch file loading.
//!
//! A batch is a CSV file with one restore request per row:
//!
//! ```text
//! s3_bucket_name,s3_backup_file_path,sql_server_name,sql_instance_name,sql_database_name,file_name,retrieval_tier,last_modified,email
//! backups,sql,srv01,MSSQLSERVER,Sales,Sales_20210721.bak,Expedited,,dba@example.com
//! ```
//!
//! The object key prefix is
//! `{s3_backup_file_path}/{sql_server_name}/{sql_instance_name}/{sql_database_name}`.
//! Blank cells are passed on as missing so that validation can reject the
//! row on its own; only a file that cannot be read as CSV fails the load.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::request::RequestSpec;

/// Columns a batch file must declare.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "s3_bucket_name",
    "s3_backup_file_path",
    "sql_server_name",
    "sql_instance_name",
    "sql_database_name",
    "file_name",
    "retrieval_tier",
    "last_modified",
    "email",
];

/// Errors that can occur while loading a batch file.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("I/O error reading batch: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Batch file is missing column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// One CSV row as written by operators.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BatchRow {
    s3_bucket_name: Option<String>,
    s3_backup_file_path: Option<String>,
    sql_server_name: Option<String>,
    sql_instance_name: Option<String>,
    sql_database_name: Option<String>,
    file_name: Option<String>,
    retrieval_tier: Option<String>,
    last_modified: Option<String>,
    email: Option<String>,
}

impl From<BatchRow> for RequestSpec {
    fn from(row: BatchRow) -> Self {
        let key_prefix = row.s3_backup_file_path.as_deref().map(|path| {
            [
                Some(path),
                row.sql_server_name.as_deref(),
                row.sql_instance_name.as_deref(),
                row.sql_database_name.as_deref(),
            ]
            .into_iter()
            .flatten()
            .map(|part| part.trim_matches('/'))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/")
        });

        RequestSpec {
            bucket: row.s3_bucket_name,
            key_prefix,
            file_name: row.file_name,
            last_modified: row.last_modified,
            retrieval_tier: row.retrieval_tier,
            server_name: row.sql_server_name,
            instance_name: row.sql_instance_name,
            database_name: row.sql_database_name,
            email: row.email,
        }
    }
}

/// Load a batch from a CSV file.
pub fn load_batch(path: &Path) -> Result<Vec<RequestSpec>, BatchError> {
    if !path.exists() {
        return Err(BatchError::FileNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let specs = load_batch_from_reader(file)?;
    tracing::debug!("Loaded {} row(s) from {}", specs.len(), path.display());
    Ok(specs)
}

/// Load a batch from any CSV source.
pub fn load_batch_from_reader<R: Read>(reader: R) -> Result<Vec<RequestSpec>, BatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|h| h == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(BatchError::MissingColumns(missing));
    }

    reader
        .deserialize::<BatchRow>()
        .map(|row| Ok(RequestSpec::from(row?)))
        .collect()
}
