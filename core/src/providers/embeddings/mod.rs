mod hashing;
mod openai;

pub use hashing::{HashingEmbedding, DEFAULT_HASHING_DIMENSIONS};
pub use openai::{OpenAIEmbedding, DEFAULT_OPENAI_EMBEDDING_MODEL, DEFAULT_OPENAI_EMBEDDING_URL};
