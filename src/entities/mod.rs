//! Entity and keyword extraction from user queries

mod extractor;

pub use extractor::{Entity, EntityKind, EntitySet, KeywordExtractor};
