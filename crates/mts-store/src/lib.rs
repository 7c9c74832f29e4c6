//! Model Test Service — persistence and resolution
//!
//! Test definitions behind a store trait, foreign metadata behind a catalog
//! trait, and the resolver that expands regex targets into concrete splits
//! and protected segments at request time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::redundant_clone))]

pub mod catalog;
pub mod metadata;
pub mod resolver;
pub mod store;

pub use catalog::TestCatalog;
pub use metadata::{
    BiasConfig, DataCollectionMeta, InMemoryCatalog, MetadataCatalog, MetadataCatalogExt,
    ModelMeta, ProjectMeta, SegmentGroupMeta, SegmentMeta, SplitKind, SplitMeta,
};
pub use resolver::{CollectionScope, Resolver, compile_anchored};
pub use store::{InMemoryTestStore, TestQuery, TestStore};
