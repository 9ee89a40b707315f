//! Retrieval service used to enrich drafting instructions with context.

pub mod index;

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::Serialize;

pub use index::DocIndex;

/// One retrieved chunk of text with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub text: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_code: Option<String>,
    pub score: f32,
}

/// Similarity search over a document corpus. Implementations must tolerate
/// an empty or missing index by returning an empty sequence.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(
        &self,
        query: &str,
        company_code: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<Snippet>, RetrievalError>;
}
