pub mod chunker;
pub mod composer;
pub mod embedding;
pub mod indexing;
pub mod rate_limit;
pub mod retrieval;
pub mod sanitizer;
