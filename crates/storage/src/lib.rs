//! Storage abstractions for the harvester.
//!
//! Provides unified interfaces for:
//! - Object storage (S3 compatible) for harvested granule files
//! - The metadata/search index holding harvest, lineage, dataset and field documents

pub mod error;
pub mod index;
pub mod object_store;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig, ObjectUploader};
pub use error::{StorageError, StorageResult};
pub use index::{FieldChange, IndexDocument, IndexRow, MetadataIndex, SolrIndex, SolrIndexConfig};
