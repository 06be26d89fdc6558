use serde::{Deserialize, Serialize};

use crate::document::Document;

/// A document together with its embedding, as kept by a vector store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// The identifier the document was inserted under.
    pub id: String,
    /// The numerical embedding vector of the document's text.
    pub embedded_data: Vec<f64>,
    /// The document the embedding was generated from.
    pub document: Document,
}
