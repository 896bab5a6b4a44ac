#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Implements the [`Collection`] trait and [`Document`] alias.
mod collection;
pub use self::collection::{Collection, Document, document_key};

/// Implements [`DocstoreError`].
mod error;
pub use self::error::DocstoreError;

/// Implements [`CollectionUrl`].
mod url;
pub use self::url::CollectionUrl;

/// Implements the in-process [`MemoryCollection`].
mod memory;
pub use self::memory::MemoryCollection;

/// Implements the MongoDB-backed [`MongoCollection`].
#[cfg(feature = "mongodb")]
mod mongo;
#[cfg(feature = "mongodb")]
pub use self::mongo::MongoCollection;

/// Implements the scheme-based opener registry.
mod opener;
pub use self::opener::{Opener, open_collection, register_opener};
