//! Lookup entry point for an existing record store database.
//!
//! Only lookups are issued, but opening the store applies pending schema
//! migrations and index setup to the file, as any store user does. A path
//! with no database file is rejected rather than created.
//!
//! Usage:
//! - `certstore <db-path> account <email|id>`
//! - `certstore <db-path> cert <domain>...`

use certstore_core::{Backend, RecordQuery, ServiceError, StoreOptions};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use uuid::Uuid;

const USAGE: &str = "usage: certstore <db-path> account <email|id> | cert <domain>...";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(found) => {
            if found {
                ExitCode::SUCCESS
            } else {
                println!("not found");
                ExitCode::from(1)
            }
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
    }
}

fn run(args: &[String]) -> Result<bool, String> {
    let [db_path, kind, keys @ ..] = args else {
        return Err(USAGE.to_string());
    };
    if keys.is_empty() {
        return Err(USAGE.to_string());
    }

    if !Path::new(db_path).is_file() {
        return Err(format!("certstore: no database at `{db_path}`"));
    }

    let backend = Backend::create(StoreOptions::file(db_path.as_str())).map_err(describe)?;
    let found = match kind.as_str() {
        "account" => {
            let query = account_query(&keys[0]).map_err(describe)?;
            print_record(backend.accounts().check(&query).map_err(describe)?)?
        }
        "cert" => {
            let query = RecordQuery::by_domains(keys).map_err(|err| err.to_string())?;
            print_record(backend.certificates().check(&query).map_err(describe)?)?
        }
        other => return Err(format!("unknown record kind `{other}`\n{USAGE}")),
    };
    backend.close().map_err(describe)?;
    Ok(found)
}

fn account_query(key: &str) -> Result<RecordQuery, ServiceError> {
    match Uuid::parse_str(key.trim()) {
        Ok(id) => Ok(RecordQuery::by_id(id)),
        Err(_) => Ok(RecordQuery::by_email(key)?),
    }
}

fn print_record<T: Serialize>(record: Option<T>) -> Result<bool, String> {
    let Some(record) = record else {
        return Ok(false);
    };
    let rendered = serde_json::to_string_pretty(&record).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(true)
}

fn describe(err: ServiceError) -> String {
    format!("certstore: {err}")
}
