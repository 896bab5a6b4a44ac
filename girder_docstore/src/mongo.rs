use crate::{Collection, CollectionUrl, DocstoreError, Document, document_key};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, Collection as RawCollection};
use serde_json::Value;
use tracing::debug;

const MONGO_ID_FIELD: &str = "_id";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// A [`Collection`] stored in MongoDB.
///
/// Opened from `mongodb://[user:pass@]host[:port]/<database>/<collection>?id_field=<field>`.
/// The key field is stored as MongoDB's `_id` and renamed back on reads. Query
/// parameters other than `id_field` are passed on to the driver.
#[derive(Debug)]
pub struct MongoCollection {
    key_field: String,
    inner: RawCollection<bson::Document>,
}

impl MongoCollection {
    /// Connects to the server named in `url` and opens the collection.
    pub async fn open(url: &CollectionUrl) -> Result<Self, DocstoreError> {
        let mut url = url.clone();
        let key_field = url
            .remove_query_param("id_field")
            .unwrap_or_else(|| MONGO_ID_FIELD.to_string());

        let segments = url.path_segments();
        let [database, collection] = segments.as_slice() else {
            return Err(DocstoreError::invalid_url(
                url.to_string(),
                format!(
                    "unexpected path in collection url: expected 3 elements, contained {} elements",
                    segments.len() + 1,
                ),
            ));
        };
        let (database, collection) = (database.to_string(), collection.to_string());

        let mut connection = format!("mongodb://{}/", url.authority());
        let options = url.query_string();
        if !options.is_empty() {
            connection.push('?');
            connection.push_str(&options);
        }

        debug!(
            host = url.host(),
            database = database.as_str(),
            collection = collection.as_str(),
            "Opening MongoDB collection",
        );

        let client = Client::with_uri_str(&connection).await?;
        let inner = client.database(&database).collection(&collection);

        Ok(Self { key_field, inner })
    }

    fn to_stored(&self, mut document: Document) -> Result<bson::Document, DocstoreError> {
        let key = document_key(&document, &self.key_field)?.to_string();

        if self.key_field != MONGO_ID_FIELD {
            document.remove(&self.key_field);
        }
        document.insert(MONGO_ID_FIELD.to_string(), Value::String(key));

        bson::to_document(&document).map_err(|error| DocstoreError::Conversion(error.to_string()))
    }

    fn from_stored(&self, stored: bson::Document) -> Result<Document, DocstoreError> {
        let mut document = match Bson::Document(stored).into_relaxed_extjson() {
            Value::Object(document) => document,
            other => {
                return Err(DocstoreError::Conversion(format!(
                    "expected an object, found {other}"
                )));
            }
        };

        if self.key_field != MONGO_ID_FIELD {
            if let Some(key) = document.remove(MONGO_ID_FIELD) {
                document.insert(self.key_field.clone(), key);
            }
        }

        Ok(document)
    }
}

#[async_trait]
impl Collection for MongoCollection {
    fn key_field(&self) -> &str {
        &self.key_field
    }

    async fn get(&self, key: &str) -> Result<Option<Document>, DocstoreError> {
        let found = self.inner.find_one(doc! { MONGO_ID_FIELD: key }).await?;

        found.map(|stored| self.from_stored(stored)).transpose()
    }

    async fn create(&self, document: Document) -> Result<(), DocstoreError> {
        let key = document_key(&document, &self.key_field)?.to_string();
        let stored = self.to_stored(document)?;

        match self.inner.insert_one(stored).await {
            Ok(_) => Ok(()),
            Err(error) if is_duplicate_key(&error) => Err(DocstoreError::AlreadyExists(key)),
            Err(error) => Err(error.into()),
        }
    }

    async fn put(&self, document: Document) -> Result<(), DocstoreError> {
        let key = document_key(&document, &self.key_field)?.to_string();
        let stored = self.to_stored(document)?;

        self.inner
            .replace_one(doc! { MONGO_ID_FIELD: key }, stored)
            .upsert(true)
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DocstoreError> {
        self.inner.delete_one(doc! { MONGO_ID_FIELD: key }).await?;

        Ok(())
    }

    async fn query_all(&self) -> Result<Vec<Document>, DocstoreError> {
        let cursor = self.inner.find(doc! {}).await?;
        let stored = cursor.try_collect::<Vec<_>>().await?;

        stored
            .into_iter()
            .map(|document| self.from_stored(document))
            .collect()
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY_CODE
    )
}
