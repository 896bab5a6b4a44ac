use crate::{Collection, CollectionUrl, DocstoreError, Document, document_key};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-process [`Collection`] backed by an ordered map.
///
/// Opened from `mem://<collection>/<key field>`. Every opening yields a fresh,
/// empty collection.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    key_field: String,
    documents: RwLock<BTreeMap<String, Document>>,
}

impl MemoryCollection {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: key_field.into(),
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates an empty collection from a `mem://` URL.
    pub fn from_url(url: &CollectionUrl) -> Result<Self, DocstoreError> {
        let segments = url.path_segments();

        match segments.as_slice() {
            [key_field] => Ok(Self::new(url.host(), *key_field)),
            _ => Err(DocstoreError::invalid_url(
                url.to_string(),
                "expected exactly one path element naming the key field",
            )),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn key_field(&self) -> &str {
        &self.key_field
    }

    async fn get(&self, key: &str) -> Result<Option<Document>, DocstoreError> {
        Ok(self.documents.read().get(key).cloned())
    }

    async fn create(&self, document: Document) -> Result<(), DocstoreError> {
        let key = document_key(&document, &self.key_field)?.to_string();
        let mut documents = self.documents.write();

        if documents.contains_key(&key) {
            return Err(DocstoreError::AlreadyExists(key));
        }

        documents.insert(key, document);

        Ok(())
    }

    async fn put(&self, document: Document) -> Result<(), DocstoreError> {
        let key = document_key(&document, &self.key_field)?.to_string();

        self.documents.write().insert(key, document);

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DocstoreError> {
        self.documents.write().remove(key);

        Ok(())
    }

    async fn query_all(&self) -> Result<Vec<Document>, DocstoreError> {
        Ok(self.documents.read().values().cloned().collect())
    }
}
