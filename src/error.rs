// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error type shared by the client, store, synchronizer and provider layers.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// Fatal misconfiguration, raised when a component is constructed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine answered with a non-success status.
    #[error("Search engine returned {status}: {message}")]
    Engine { status: u16, message: String },

    /// The request never produced an engine reply.
    #[error("Search transport error: {0}")]
    Transport(String),

    /// A bulk submission reported item failures. The raw engine response is
    /// kept so the caller can work out which documents landed.
    #[error("Bulk write to {index}/{doc_type} failed for {failed} of {total} documents")]
    Bulk {
        index: String,
        doc_type: String,
        failed: usize,
        total: usize,
        response: Value,
    },

    #[error("Relational store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model '{0}' is not registered")]
    UnknownModel(String),

    /// A row reached the indexer without a primary key value.
    #[error("Row of '{0}' has no primary key value")]
    MissingKey(String),
}

impl From<sqlx::Error> for SearchError {
    fn from(e: sqlx::Error) -> Self {
        SearchError::Store(e.to_string())
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => SearchError::Engine {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => SearchError::Transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bulk_error_message() {
        let err = SearchError::Bulk {
            index: "shop".into(),
            doc_type: "products".into(),
            failed: 2,
            total: 10,
            response: json!({"errors": true}),
        };
        assert_eq!(
            err.to_string(),
            "Bulk write to shop/products failed for 2 of 10 documents"
        );
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: Result<Value, _> = serde_json::from_str("{not json");
        let err: SearchError = parse.unwrap_err().into();
        assert!(matches!(err, SearchError::Serialization(_)));
    }
}
