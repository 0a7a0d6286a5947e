//! Persistent tag databases for source cross-referencing.
//!
//! A source tree gets four databases: `GPATH` maps paths to file ids,
//! `GTAGS` holds definitions, `GRTAGS` references to them and `GSYMS`
//! every other symbol. [`tags::TagStore`] writes and searches one of them.

pub mod config;
pub mod error;
pub mod find;
pub mod index;
pub mod indexer;
pub mod tags;
pub mod token;

pub use error::{Result, TagError};
pub use index::{DbKind, OpenMode};
pub use tags::{Entry, IdSet, SearchFlags, TagRecord, TagStore, WriteFlags};
