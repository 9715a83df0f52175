// src/memory/mod.rs — Cross-iteration knowledge store

pub mod archive;
pub mod digest;
pub mod store;

pub use archive::Archive;
pub use digest::ContextDigest;
pub use store::{EdaInsights, KnowledgeStore, ModelEntry};
