/// Builtin embedding providers
pub mod embeddings;
