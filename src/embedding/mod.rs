mod batch;
mod hashing;
/// Embedding generation
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - HashingEmbedProvider for model-free, deterministic vectors
/// - BatchEmbedder for provider-sized batches
mod provider;

pub use batch::{BatchEmbedder, BatchResult};
pub use hashing::{HashingEmbedProvider, HASHING_MODEL_NAME};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// Build the provider named by the configuration
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        "hashing" => Ok(Arc::new(HashingEmbedProvider::new(config.dimension)?)),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Cosine similarity; zero-length vectors are similar to nothing
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_hashing_provider_from_config() {
        let config = EmbeddingConfig {
            provider: "hashing".to_string(),
            model: HASHING_MODEL_NAME.to_string(),
            dimension: 48,
            batch_size: 8,
        };
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.dimension(), 48);
        assert_eq!(provider.model_name(), HASHING_MODEL_NAME);
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            model: "x".to_string(),
            dimension: 8,
            batch_size: 8,
        };
        assert!(provider_from_config(&config).is_err());
    }
}
