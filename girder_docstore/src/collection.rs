use crate::DocstoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Debug;

/// A schema-free document: a JSON object.
pub type Document = Map<String, Value>;

/// A collection of [`Document`]s, each identified by the string value of the
/// collection's [key field](Collection::key_field).
#[async_trait]
pub trait Collection: Debug + Send + Sync {
    /// Name of the field that holds the document key.
    fn key_field(&self) -> &str;

    /// Fetches the document with the given key.
    async fn get(&self, key: &str) -> Result<Option<Document>, DocstoreError>;

    /// Inserts a new document, failing with [`DocstoreError::AlreadyExists`]
    /// when its key is taken.
    async fn create(&self, document: Document) -> Result<(), DocstoreError>;

    /// Inserts or replaces a document.
    async fn put(&self, document: Document) -> Result<(), DocstoreError>;

    /// Deletes the document with the given key. Deleting a missing document is
    /// not an error.
    async fn delete(&self, key: &str) -> Result<(), DocstoreError>;

    /// Returns every document in the collection.
    async fn query_all(&self) -> Result<Vec<Document>, DocstoreError>;
}

/// Extracts the key of `document` from `key_field`.
pub fn document_key<'a>(document: &'a Document, key_field: &str) -> Result<&'a str, DocstoreError> {
    document
        .get(key_field)
        .and_then(Value::as_str)
        .ok_or_else(|| DocstoreError::MissingKey(key_field.to_string()))
}
