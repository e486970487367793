use common::{error::AppError, utils::config::AppConfig};
use rand::Rng;
use tracing::debug;

use super::{DocSelectionType, PromptTuneParams};
use crate::{llm::LanguageModel, scoring::cosine_similarity};

/// Picks the chunks the tuning prompts are generated from.
pub async fn select_chunks(
    model: &dyn LanguageModel,
    config: &AppConfig,
    chunks: Vec<String>,
    params: &PromptTuneParams,
) -> Result<Vec<String>, AppError> {
    match params.selection_method {
        DocSelectionType::All => Ok(chunks),
        DocSelectionType::Top => Ok(chunks.into_iter().take(params.limit).collect()),
        DocSelectionType::Random => Ok(random_subset(chunks, params.limit)),
        DocSelectionType::Auto => nearest_to_centroid(model, config, chunks, params).await,
    }
}

// The thread-local rng is not `Send`, so it never lives inside a future.
fn random_subset(chunks: Vec<String>, amount: usize) -> Vec<String> {
    sample(chunks, amount, &mut rand::thread_rng())
}

/// Up to `amount` chunks drawn without replacement, kept in document order.
pub(crate) fn sample<R: Rng + ?Sized>(chunks: Vec<String>, amount: usize, rng: &mut R) -> Vec<String> {
    if amount >= chunks.len() {
        return chunks;
    }
    let mut picked = rand::seq::index::sample(rng, chunks.len(), amount).into_vec();
    picked.sort_unstable();

    let mut picked = picked.into_iter().peekable();
    chunks
        .into_iter()
        .enumerate()
        .filter_map(|(position, chunk)| {
            (picked.peek() == Some(&position)).then(|| {
                picked.next();
                chunk
            })
        })
        .collect()
}

async fn nearest_to_centroid(
    model: &dyn LanguageModel,
    config: &AppConfig,
    chunks: Vec<String>,
    params: &PromptTuneParams,
) -> Result<Vec<String>, AppError> {
    let subset = random_subset(chunks, params.n_subset_max);
    let embeddings = model.embed(config, subset.clone()).await?;
    if embeddings.len() != subset.len() {
        return Err(AppError::LLMParsing(format!(
            "expected {} embeddings, got {}",
            subset.len(),
            embeddings.len()
        )));
    }

    let Some(center) = centroid(&embeddings) else {
        return Ok(Vec::new());
    };
    let mut ranked: Vec<(f32, String)> = embeddings
        .iter()
        .map(|embedding| cosine_similarity(embedding, &center))
        .zip(subset)
        .collect();
    ranked.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    ranked.truncate(params.k);
    debug!(kept = ranked.len(), "Selected chunks nearest to the centroid");

    Ok(ranked.into_iter().map(|(_, chunk)| chunk).collect())
}

fn centroid(embeddings: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dimensions = embeddings.first()?.len();
    let mut sum = vec![0.0_f32; dimensions];
    for embedding in embeddings {
        for (total, value) in sum.iter_mut().zip(embedding) {
            *total += value;
        }
    }
    let count = embeddings.len() as f32;
    Some(sum.into_iter().map(|total| total / count).collect())
}
