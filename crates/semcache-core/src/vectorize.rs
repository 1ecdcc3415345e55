//! Vectorization engine (C2-C4).
//!
//! Turns a normalized prompt string into a [`MultiLayerVector`]: tokenize,
//! look up and weight-average per layer, L2-normalize, then derive the
//! cross-layer relation matrix from the resulting layer statistics.

use crate::embedding::EmbeddingTable;
use crate::error::{CacheError, CacheResult};
use crate::layer::{l2_normalize, LayerKind, MultiLayerVector, NUM_LAYERS};
use crate::relation::{cooccurrence_score, relation_matrix_from_layers, LayerMoments};

/// Configuration for the vectorization engine.
#[derive(Clone, Debug)]
pub struct VectorizeConfig {
	/// Token-window size for the optional co-occurrence blend (§4.1).
	pub cooccurrence_window: usize,
	/// Whether to blend in the co-occurrence score at all. When `false`,
	/// the relation matrix is purely the statistical-moment similarity.
	pub blend_cooccurrence: bool,
	/// Whether to symmetrize the relation matrix after construction.
	pub symmetrize: bool,
}

impl Default for VectorizeConfig {
	fn default() -> Self {
		Self {
			cooccurrence_window: 5,
			blend_cooccurrence: true,
			symmetrize: true,
		}
	}
}

/// Lowercase, replace non-alphanumerics with spaces, split on whitespace.
/// The only tokenization this crate performs (§1 Non-goals: no
/// cross-language tokenization beyond this).
#[must_use]
pub fn tokenize(prompt: &str) -> Vec<String> {
	let normalized: String = prompt
		.chars()
		.map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
		.collect();
	normalized
		.split_whitespace()
		.map(ToString::to_string)
		.collect()
}

/// Aggregate token embeddings for one layer into a single vector via a
/// keyword-weighted average, then L2-normalize. Returns the all-zero vector
/// (at `layer.dimension()` length) if no token matched.
#[must_use]
pub fn encode_layer(table: &dyn EmbeddingTable, layer: LayerKind, tokens: &[String]) -> Vec<f32> {
	let dim = layer.dimension();
	let mut sum = vec![0.0f32; dim];
	let mut weight_total = 0.0f32;

	for token in tokens {
		if let Some(vector) = table.get(layer, token) {
			let weight = table.keyword_weight(layer, token);
			for (s, v) in sum.iter_mut().zip(vector.iter()) {
				*s += weight * v;
			}
			weight_total += weight;
		}
	}

	if weight_total > 0.0 {
		for s in &mut sum {
			*s /= weight_total;
		}
	}
	l2_normalize(&mut sum);
	sum
}

/// The subset of `tokens` that matched an embedding in `layer`'s vocabulary,
/// i.e. the tokens that actually contributed to `encode_layer`'s result for
/// that layer. This is the per-layer "subset of the same underlying
/// tokenized prompt" that [`crate::relation::cooccurrence_score`] expects as
/// input (§4.1) — distinct layers generally match distinct tokens, since a
/// prompt's subject words and style words rarely share vocabulary.
#[must_use]
fn matched_tokens<'a>(table: &dyn EmbeddingTable, layer: LayerKind, tokens: &'a [String]) -> Vec<&'a str> {
	tokens
		.iter()
		.filter(|token| table.get(layer, token).is_some())
		.map(String::as_str)
		.collect()
}

/// Vectorize a normalized prompt into a complete [`MultiLayerVector`].
///
/// `current_time_ms` stamps the resulting vector's `created_at_ms`.
#[must_use]
pub fn vectorize(
	table: &dyn EmbeddingTable,
	prompt: &str,
	config: &VectorizeConfig,
	current_time_ms: u64,
) -> MultiLayerVector {
	let tokens = tokenize(prompt);

	let subject = encode_layer(table, LayerKind::Subject, &tokens);
	let attribute = encode_layer(table, LayerKind::Attribute, &tokens);
	let style = encode_layer(table, LayerKind::Style, &tokens);
	let composition = encode_layer(table, LayerKind::Composition, &tokens);
	let emotion = encode_layer(table, LayerKind::Emotion, &tokens);

	let layers: [&[f32]; NUM_LAYERS] = [&subject, &attribute, &style, &composition, &emotion];
	let moments: [LayerMoments; NUM_LAYERS] = {
		let mut m = [LayerMoments::default(); NUM_LAYERS];
		for (i, layer) in layers.iter().enumerate() {
			m[i] = LayerMoments::compute(layer);
		}
		m
	};

	let cooccurrence = if config.blend_cooccurrence {
		let per_layer_tokens: [Vec<&str>; NUM_LAYERS] =
			LayerKind::ALL.map(|layer| matched_tokens(table, layer, &tokens));
		let mut grid = [[0.0f32; NUM_LAYERS]; NUM_LAYERS];
		for i in 0..NUM_LAYERS {
			for j in 0..NUM_LAYERS {
				if i != j {
					grid[i][j] = cooccurrence_score(
						&per_layer_tokens[i],
						&per_layer_tokens[j],
						config.cooccurrence_window,
					);
				}
			}
		}
		Some(grid)
	} else {
		None
	};

	let relation = crate::relation::build_relation_matrix(
		&moments,
		cooccurrence.as_ref(),
		config.symmetrize,
	);

	MultiLayerVector::new(
		subject,
		attribute,
		style,
		composition,
		emotion,
		relation,
		current_time_ms,
	)
}

/// Validate `prompt` and vectorize it (§7: "prompt empty after normalization"
/// is an invalid-input error, surfaced to the caller without mutating any
/// state). This is the boundary function a host should call; [`vectorize`]
/// itself stays infallible for callers (tests, benches) that already know
/// their prompt tokenizes to something.
///
/// # Errors
///
/// Returns [`CacheError::InvalidInput`] if `prompt` tokenizes to nothing
/// (empty or made up entirely of whitespace/punctuation).
pub fn vectorize_checked(
	table: &dyn EmbeddingTable,
	prompt: &str,
	config: &VectorizeConfig,
	current_time_ms: u64,
) -> CacheResult<MultiLayerVector> {
	if tokenize(prompt).is_empty() {
		return Err(CacheError::InvalidInput(
			"prompt empty after normalization".to_string(),
		));
	}
	Ok(vectorize(table, prompt, config, current_time_ms))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::embedding::InMemoryEmbeddingTable;

	#[test]
	fn tokenize_lowercases_and_splits_on_punctuation() {
		let tokens = tokenize("A Cat, on a Windowsill!");
		assert_eq!(tokens, vec!["a", "cat", "on", "a", "windowsill"]);
	}

	#[test]
	fn tokenize_empty_prompt_yields_no_tokens() {
		assert!(tokenize("   ").is_empty());
	}

	#[test]
	fn vectorize_checked_rejects_empty_prompt() {
		let table = InMemoryEmbeddingTable::new();
		let config = VectorizeConfig::default();
		let err = vectorize_checked(&table, "   !!!  ", &config, 0).unwrap_err();
		assert!(matches!(err, CacheError::InvalidInput(_)));
	}

	#[test]
	fn vectorize_checked_accepts_non_empty_prompt() {
		let table = InMemoryEmbeddingTable::new();
		let config = VectorizeConfig::default();
		assert!(vectorize_checked(&table, "a cat", &config, 0).is_ok());
	}

	#[test]
	fn encode_layer_with_no_matches_is_zero_vector() {
		let table = InMemoryEmbeddingTable::new();
		let v = encode_layer(&table, LayerKind::Subject, &["cat".to_string()]);
		assert_eq!(v.len(), LayerKind::Subject.dimension());
		assert!(v.iter().all(|&x| x == 0.0));
	}

	#[test]
	fn encode_layer_normalizes_matched_vector() {
		let mut table = InMemoryEmbeddingTable::new();
		table.insert(LayerKind::Subject, "cat", vec![3.0, 4.0]);
		let v = encode_layer(&table, LayerKind::Subject, &["cat".to_string()]);
		let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
		assert!((norm - 1.0).abs() < 1e-5);
	}

	#[test]
	fn vectorize_produces_unit_diagonal_relation_matrix() {
		let table = InMemoryEmbeddingTable::new();
		let config = VectorizeConfig::default();
		let mv = vectorize(&table, "a cat on a windowsill", &config, 0);
		for i in 0..NUM_LAYERS {
			assert_eq!(mv.relation().get(i, i), 1.0);
		}
	}
}
