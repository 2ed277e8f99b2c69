mod bootstrap;
mod cache;
pub mod error;
mod index;
mod service;

pub use bootstrap::{KnowledgeIndexBootstrap, SourceDocument};
pub use index::{IndexItem, InMemoryVectorIndex, IndexHit, SubsetFilter, VectorIndex};
pub use service::RetrievalService;
