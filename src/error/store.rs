use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error during {context}: {source}")]
    Sqlite {
        context: &'static str,
        #[source]
        source: tokio_rusqlite::Error,
    },
    #[error("No {entity} found for '{key}'.")]
    NotFound { entity: &'static str, key: String },
}

impl StoreError {
    pub fn sqlite(context: &'static str, source: tokio_rusqlite::Error) -> Self {
        StoreError::Sqlite { context, source }
    }
}
