use crate::{Collection, CollectionUrl, DocstoreError, MemoryCollection};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Opens a [`Collection`] from a parsed URL.
pub type Opener =
    Arc<dyn Fn(CollectionUrl) -> BoxFuture<'static, Result<Arc<dyn Collection>, DocstoreError>> + Send + Sync>;

static CUSTOM_OPENERS: OnceLock<RwLock<HashMap<String, Opener>>> = OnceLock::new();

fn custom_openers() -> &'static RwLock<HashMap<String, Opener>> {
    CUSTOM_OPENERS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers an opener for the given URL scheme, replacing any previous
/// custom opener and taking precedence over the built-in ones.
pub fn register_opener<F>(scheme: impl AsRef<str>, opener: F)
where
    F: Fn(CollectionUrl) -> BoxFuture<'static, Result<Arc<dyn Collection>, DocstoreError>>
        + Send
        + Sync
        + 'static,
{
    let scheme = scheme.as_ref().to_ascii_lowercase();

    debug!(scheme = scheme.as_str(), "Registering document collection opener");

    custom_openers().write().insert(scheme, Arc::new(opener));
}

/// Opens the collection named by `url`, dispatching on its scheme.
///
/// Built-in schemes are `mem` and, with the `mongodb` feature, `mongodb` and
/// `mongo`.
pub async fn open_collection(url: &str) -> Result<Arc<dyn Collection>, DocstoreError> {
    let url = CollectionUrl::parse(url)?;

    let custom = custom_openers().read().get(url.scheme()).cloned();
    if let Some(opener) = custom {
        return opener(url).await;
    }

    match url.scheme() {
        "mem" => Ok(Arc::new(MemoryCollection::from_url(&url)?)),
        #[cfg(feature = "mongodb")]
        "mongodb" | "mongo" => Ok(Arc::new(crate::MongoCollection::open(&url).await?)),
        scheme => Err(DocstoreError::UnsupportedScheme(scheme.to_string())),
    }
}
