// Embeddings module
// Text-to-vector capability, the Ollama backend and document chunking

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{Chunk, ChunkingConfig, split, split_with};
pub use ollama::OllamaClient;

/// Produces fixed-dimension vectors from text.
///
/// Failures are reported as [`RagError::EmbeddingUnavailable`](crate::RagError::EmbeddingUnavailable).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in input order.
    ///
    /// The default implementation calls [`embed`](Embedder::embed) once per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
