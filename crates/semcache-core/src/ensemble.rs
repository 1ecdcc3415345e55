//! Ensemble model (C7).
//!
//! A weighted linear combination of the four similarity metrics, squashed
//! through a sigmoid, trained online by minibatch SGD with L2
//! regularization. MSE is used as the training loss against the observed
//! accept/reject label, per spec.md §9's note that cross-entropy would be
//! more standard but MSE is preserved for parity with the source behavior.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::similarity::SimilarityMetrics;

/// Four non-negative weights (summing to 1) plus a bias and an L2
/// regularization coefficient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParameters {
	/// Per-metric weights, in `[cosine, tree, latent, coherence]` order.
	/// Non-negative, summing to `1 ± 1e-6` (invariant 5).
	pub weights: [f32; 4],
	/// Additive bias applied before the sigmoid.
	pub bias: f32,
	/// L2 regularization coefficient added to each weight's gradient.
	pub regularization: f32,
}

impl Default for EnsembleParameters {
	fn default() -> Self {
		Self {
			weights: [0.25, 0.25, 0.25, 0.25],
			bias: 0.0,
			regularization: 0.01,
		}
	}
}

impl EnsembleParameters {
	/// Renormalize `weights` to sum to exactly `1.0`, clamping negatives to
	/// `0.0` first. If all weights are `0.0` after clamping, resets to a
	/// uniform split.
	fn renormalize(&mut self) {
		for w in &mut self.weights {
			*w = w.max(0.0);
		}
		let total: f32 = self.weights.iter().sum();
		if total > 0.0 {
			for w in &mut self.weights {
				*w /= total;
			}
		} else {
			self.weights = [0.25; 4];
		}
	}
}

/// One labelled training sample: the four similarity metrics and the
/// ground-truth label (typically 1.0 for "accepted", 0.0 for "rejected").
#[derive(Clone, Copy, Debug)]
pub struct TrainingSample {
	/// The four similarity metrics observed for this sample.
	pub metrics: SimilarityMetrics,
	/// Ground-truth label in `[0, 1]`.
	pub ground_truth: f32,
}

/// Configuration for online SGD training.
#[derive(Clone, Debug)]
pub struct EnsembleConfig {
	/// Step size applied to each gradient.
	pub learning_rate: f32,
	/// Minibatch size sampled from the training buffer each `train` call.
	pub batch_size: usize,
	/// Most recent samples retained for minibatch sampling.
	pub max_buffer: usize,
}

impl Default for EnsembleConfig {
	fn default() -> Self {
		Self {
			learning_rate: 0.01,
			batch_size: 32,
			max_buffer: 1000,
		}
	}
}

/// Evaluation metrics over a set of samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnsembleEvaluation {
	/// Mean squared error between prediction and ground truth.
	pub mse: f32,
	/// Fraction of samples with `|prediction - ground_truth| < 0.1`.
	pub accuracy: f32,
}

#[inline]
fn sigmoid(x: f32) -> f32 {
	1.0 / (1.0 + (-x).exp())
}

/// Predict a similarity score in `(0, 1)` from the four metrics.
#[must_use]
pub fn predict(params: &EnsembleParameters, metrics: SimilarityMetrics) -> f32 {
	let m = metrics.as_array();
	let linear: f32 = params
		.weights
		.iter()
		.zip(m.iter())
		.map(|(w, v)| w * v)
		.sum::<f32>()
		+ params.bias;
	sigmoid(linear)
}

/// Average per-parameter MSE gradient over `batch`, including L2 on the
/// weights. Returns `(weight_gradients, bias_gradient)`.
fn batch_gradient(
	params: &EnsembleParameters,
	batch: &[TrainingSample],
) -> ([f32; 4], f32) {
	let mut weight_grad = [0.0f32; 4];
	let mut bias_grad = 0.0f32;
	for sample in batch {
		let y_hat = predict(params, sample.metrics);
		let error = y_hat - sample.ground_truth;
		let scale = error * y_hat * (1.0 - y_hat);
		let m = sample.metrics.as_array();
		for (g, v) in weight_grad.iter_mut().zip(m.iter()) {
			*g += scale * v;
		}
		bias_grad += scale;
	}
	let n = batch.len() as f32;
	for g in &mut weight_grad {
		*g /= n;
	}
	bias_grad /= n;
	for (g, w) in weight_grad.iter_mut().zip(params.weights.iter()) {
		*g += params.regularization * w;
	}
	(weight_grad, bias_grad)
}

/// Run one minibatch SGD step, sampling `config.batch_size` samples from
/// `buffer` (using all of it if smaller), and return the updated
/// parameters. Does not mutate `params` in place — the caller is expected
/// to atomically publish the result (§5, §9 "Parameter hot-swap").
///
/// Returns `params` unchanged if `buffer` is empty.
pub fn optimize<R: Rng>(
	params: &EnsembleParameters,
	buffer: &[TrainingSample],
	config: &EnsembleConfig,
	rng: &mut R,
) -> EnsembleParameters {
	if buffer.is_empty() {
		return params.clone();
	}

	let batch: Vec<TrainingSample> = if buffer.len() <= config.batch_size {
		buffer.to_vec()
	} else {
		buffer
			.choose_multiple(rng, config.batch_size)
			.copied()
			.collect()
	};

	let (weight_grad, bias_grad) = batch_gradient(params, &batch);

	let mut updated = params.clone();
	for (w, g) in updated.weights.iter_mut().zip(weight_grad.iter()) {
		*w -= config.learning_rate * g;
	}
	updated.bias -= config.learning_rate * bias_grad;
	updated.renormalize();
	updated
}

/// Evaluate `params` against `samples` (§4.4).
#[must_use]
pub fn evaluate(params: &EnsembleParameters, samples: &[TrainingSample]) -> EnsembleEvaluation {
	if samples.is_empty() {
		return EnsembleEvaluation::default();
	}
	let mut squared_error = 0.0f32;
	let mut correct = 0usize;
	for sample in samples {
		let y_hat = predict(params, sample.metrics);
		let diff = y_hat - sample.ground_truth;
		squared_error += diff * diff;
		if diff.abs() < 0.1 {
			correct += 1;
		}
	}
	EnsembleEvaluation {
		mse: squared_error / samples.len() as f32,
		accuracy: correct as f32 / samples.len() as f32,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;

	fn sample(c: f32, t: f32, l: f32, co: f32, y: f32) -> TrainingSample {
		TrainingSample {
			metrics: SimilarityMetrics {
				cosine: c,
				tree: t,
				latent: l,
				coherence: co,
			},
			ground_truth: y,
		}
	}

	#[test]
	fn default_weights_sum_to_one() {
		let p = EnsembleParameters::default();
		let total: f32 = p.weights.iter().sum();
		assert!((total - 1.0).abs() < 1e-6);
	}

	#[test]
	fn prediction_is_in_open_unit_interval() {
		let p = EnsembleParameters::default();
		let m = SimilarityMetrics {
			cosine: 0.9,
			tree: 0.8,
			latent: 0.7,
			coherence: 0.6,
		};
		let y = predict(&p, m);
		assert!(y > 0.0 && y < 1.0);
	}

	#[test]
	fn optimize_keeps_weights_non_negative_and_normalized() {
		let mut params = EnsembleParameters::default();
		let config = EnsembleConfig::default();
		let mut rng = rand::rngs::StdRng::seed_from_u64(42);
		let buffer: Vec<TrainingSample> = (0..200)
			.map(|i| sample(0.9, 0.9, 0.9, 0.9, f32::from(i % 2)))
			.collect();

		for _ in 0..50 {
			params = optimize(&params, &buffer, &config, &mut rng);
			assert!(params.weights.iter().all(|&w| w >= 0.0));
			let total: f32 = params.weights.iter().sum();
			assert!((total - 1.0).abs() < 1e-5);
		}
	}

	#[test]
	fn optimize_on_empty_buffer_is_identity() {
		let params = EnsembleParameters::default();
		let config = EnsembleConfig::default();
		let mut rng = rand::rngs::StdRng::seed_from_u64(1);
		let next = optimize(&params, &[], &config, &mut rng);
		assert_eq!(params, next);
	}

	#[test]
	fn training_reduces_error_on_a_separable_dataset() {
		let mut params = EnsembleParameters::default();
		let config = EnsembleConfig {
			learning_rate: 0.5,
			batch_size: 32,
			max_buffer: 1000,
		};
		let mut rng = rand::rngs::StdRng::seed_from_u64(7);
		let mut buffer = Vec::new();
		for _ in 0..64 {
			buffer.push(sample(0.95, 0.95, 0.95, 0.95, 1.0));
			buffer.push(sample(0.05, 0.05, 0.05, 0.05, 0.0));
		}
		let before = evaluate(&params, &buffer);
		for _ in 0..200 {
			params = optimize(&params, &buffer, &config, &mut rng);
		}
		let after = evaluate(&params, &buffer);
		assert!(after.mse < before.mse);
	}
}
