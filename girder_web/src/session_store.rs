use async_trait::async_trait;
use girder_docstore::{Collection, CollectionUrl, DocstoreError, Document, open_collection};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tower_sessions::SessionStore;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store;
use tracing::{debug, warn};

/// Key field of session documents.
pub const SESSION_KEY_FIELD: &str = "ID";

const ATTRIBUTES_FIELD: &str = "SerializedAttributes";
const TTL_FIELD: &str = "ttl";
const EXPIRES_AT_FIELD: &str = "ExpiresAt";
const EXPIRES_AT_EPOCH_FIELD: &str = "ExpiresAtEpoch";

/// A [`SessionStore`] keeping one document per session in a docstore
/// [`Collection`].
///
/// Documents are keyed by the prefixed session ID. Their expiry is fixed when
/// they are first written; later saves recompute `ttl` from it.
#[derive(Debug, Clone)]
pub struct DocstoreSessionStore {
    collection: Arc<dyn Collection>,
    prefix: String,
}

impl DocstoreSessionStore {
    /// Opens the collection at `url`, setting its key field the way each
    /// backend expects.
    pub async fn open(url: &str, prefix: impl Into<String>) -> Result<Self, DocstoreError> {
        let mut url = CollectionUrl::parse(url)?;

        match url.scheme() {
            "firestore" => url.set_query_param("name_field", SESSION_KEY_FIELD),
            "dynamodb" => url.set_query_param("partition_key", SESSION_KEY_FIELD),
            "mongo" | "mongodb" => url.set_query_param("id_field", SESSION_KEY_FIELD),
            "mem" => url.set_path(SESSION_KEY_FIELD),
            _ => {}
        }

        let collection = open_collection(&url.to_string()).await?;

        Ok(Self::new(collection, prefix))
    }

    /// Wraps an already opened collection.
    pub fn new(collection: Arc<dyn Collection>, prefix: impl Into<String>) -> Self {
        Self {
            collection,
            prefix: prefix.into(),
        }
    }

    /// Counts the stored sessions with a full scan. Returns `-1` when the scan
    /// fails.
    pub async fn count(&self) -> i64 {
        match self.collection.query_all().await {
            Ok(documents) => i64::try_from(documents.len()).unwrap_or(i64::MAX),
            Err(error) => {
                warn!(?error, error_message = %error, "Failed to count sessions");
                -1
            }
        }
    }

    fn key(&self, id: &Id) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn document(&self, record: &Record, expires_at: OffsetDateTime) -> session_store::Result<Document> {
        let attributes = serde_json::to_string(&record.data)
            .map_err(|error| session_store::Error::Encode(error.to_string()))?;
        let formatted = expires_at
            .format(&Rfc3339)
            .map_err(|error| session_store::Error::Encode(error.to_string()))?;
        let ttl = (expires_at - OffsetDateTime::now_utc()).whole_seconds().max(0);

        let mut document = Document::new();
        document.insert(SESSION_KEY_FIELD.to_string(), Value::from(self.key(&record.id)));
        document.insert(ATTRIBUTES_FIELD.to_string(), Value::from(attributes));
        document.insert(TTL_FIELD.to_string(), Value::from(ttl));
        document.insert(EXPIRES_AT_FIELD.to_string(), Value::from(formatted));
        document.insert(
            EXPIRES_AT_EPOCH_FIELD.to_string(),
            Value::from(expires_at.unix_timestamp()),
        );

        Ok(document)
    }
}

fn backend(error: DocstoreError) -> session_store::Error {
    session_store::Error::Backend(error.to_string())
}

fn stored_expiry(document: &Document) -> Option<OffsetDateTime> {
    document
        .get(EXPIRES_AT_FIELD)
        .and_then(Value::as_str)
        .and_then(|value| OffsetDateTime::parse(value, &Rfc3339).ok())
}

#[async_trait]
impl SessionStore for DocstoreSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        loop {
            let document = self.document(record, record.expiry_date)?;

            match self.collection.create(document).await {
                Ok(()) => return Ok(()),
                Err(DocstoreError::AlreadyExists(_)) => {
                    debug!("Session ID collision, generating a new one");
                    record.id = Id::default();
                }
                Err(error) => return Err(backend(error)),
            }
        }
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        if record.data.is_empty() {
            return Ok(());
        }

        let existing = self
            .collection
            .get(&self.key(&record.id))
            .await
            .map_err(backend)?;

        let expires_at = existing
            .as_ref()
            .and_then(stored_expiry)
            .unwrap_or(record.expiry_date);
        let document = self.document(record, expires_at)?;

        self.collection.put(document).await.map_err(backend)
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let Some(document) = self
            .collection
            .get(&self.key(session_id))
            .await
            .map_err(backend)?
        else {
            return Ok(None);
        };

        let expiry_date = stored_expiry(&document).ok_or_else(|| {
            session_store::Error::Decode(format!("session document lacks '{EXPIRES_AT_FIELD}'"))
        })?;

        if expiry_date <= OffsetDateTime::now_utc() {
            return Ok(None);
        }

        let attributes = document
            .get(ATTRIBUTES_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("{}");
        let data: HashMap<String, Value> = serde_json::from_str(attributes)
            .map_err(|error| session_store::Error::Decode(error.to_string()))?;

        Ok(Some(Record {
            id: Id(session_id.0),
            data,
            expiry_date,
        }))
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.collection
            .delete(&self.key(session_id))
            .await
            .map_err(backend)
    }
}
