//! SQLite persistent store.
//!
//! The store is the single source of truth for orchestration state.
//! Handles are cheap clones over one background connection; fan-out tasks
//! clone the store and commit independently.
mod agents;
mod clusters;
mod cycles;
mod plans;
mod projects;
mod schema;
mod stats;
mod targets;

use std::path::Path;

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;

use crate::error::{AppError, AppResult, StoreError};

#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    pub async fn open(path: &Path) -> AppResult<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|err| AppError::store(StoreError::sqlite("open database", err)))?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| AppError::store(StoreError::sqlite("open in-memory database", err)))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> AppResult<Self> {
        let store = Store { conn };
        store
            .call("migrate schema", |conn| {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                conn.execute_batch(schema::SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(store)
    }

    pub(crate) async fn call<T, F>(&self, context: &'static str, job: F) -> AppResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, tokio_rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(job)
            .await
            .map_err(|err| AppError::store(StoreError::sqlite(context, err)))
    }
}

pub(crate) fn parse_timestamp(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}
