//! Uncertainty quantifier (C6).
//!
//! Turns the four [`SimilarityMetrics`] into a single uncertainty scalar plus
//! a breakdown, used by the decision engine to conservatively downgrade a
//! hit/diff call when the metrics disagree with each other.

use crate::similarity::SimilarityMetrics;

/// Number of histogram bins used for the entropy term.
const ENTROPY_BINS: usize = 10;

/// Statistics computed over the four similarity metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricStatistics {
	/// Arithmetic mean of the four metrics.
	pub mean: f32,
	/// Population variance.
	pub variance: f32,
	/// Population standard deviation.
	pub stddev: f32,
	/// `max - min` across the four metrics.
	pub range: f32,
}

/// Uncertainty report for one similarity comparison (§3, §4.3).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UncertaintyReport {
	/// Uncertainty in `[0, 1]`; higher means the four metrics disagree more.
	pub uncertainty: f32,
	/// `1 - uncertainty`.
	pub confidence: f32,
	/// Mean/variance/stddev/range over the four metrics.
	pub statistics: MetricStatistics,
	/// Fractional contribution of each metric (cosine, tree, latent,
	/// coherence, in that order) to the total absolute deviation from the
	/// mean. `0.0` for every entry when all four metrics are equal.
	pub contribution: [f32; 4],
}

/// Shannon entropy (base-2) of a fixed 10-bin histogram over `values`,
/// normalized by `log2(10)` so the result lies in `[0, 1]`.
fn normalized_entropy(values: [f32; 4]) -> f32 {
	let mut counts = [0u32; ENTROPY_BINS];
	for &v in &values {
		let bin = ((v.clamp(0.0, 0.999_999)) * ENTROPY_BINS as f32).floor() as usize;
		counts[bin.min(ENTROPY_BINS - 1)] += 1;
	}
	let n = values.len() as f32;
	let entropy: f32 = counts
		.iter()
		.filter(|&&c| c > 0)
		.map(|&c| {
			let p = c as f32 / n;
			-p * p.log2()
		})
		.sum();
	let max_entropy = (ENTROPY_BINS as f32).log2();
	if max_entropy <= 0.0 {
		0.0
	} else {
		(entropy / max_entropy).clamp(0.0, 1.0)
	}
}

/// Quantify uncertainty over one set of similarity metrics (§4.3).
#[must_use]
pub fn quantify(metrics: SimilarityMetrics) -> UncertaintyReport {
	let values = metrics.as_array();
	let n = values.len() as f32;
	let mean = values.iter().sum::<f32>() / n;
	let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
	let stddev = variance.sqrt();
	let max = values.iter().cloned().fold(f32::MIN, f32::max);
	let min = values.iter().cloned().fold(f32::MAX, f32::min);
	let range = max - min;

	let entropy = normalized_entropy(values);
	let uncertainty = ((variance * 4.0).min(1.0) + range + entropy) / 3.0;
	let uncertainty = uncertainty.clamp(0.0, 1.0);

	let total_deviation: f32 = values.iter().map(|v| (v - mean).abs()).sum();
	let mut contribution = [0.0f32; 4];
	if total_deviation > 0.0 {
		for (c, v) in contribution.iter_mut().zip(values.iter()) {
			*c = (v - mean).abs() / total_deviation;
		}
	}

	UncertaintyReport {
		uncertainty,
		confidence: 1.0 - uncertainty,
		statistics: MetricStatistics {
			mean,
			variance,
			stddev,
			range,
		},
		contribution,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_metrics_have_zero_variance_and_range() {
		let m = SimilarityMetrics {
			cosine: 0.8,
			tree: 0.8,
			latent: 0.8,
			coherence: 0.8,
		};
		let report = quantify(m);
		assert_eq!(report.statistics.variance, 0.0);
		assert_eq!(report.statistics.range, 0.0);
		assert_eq!(report.contribution, [0.0; 4]);
	}

	#[test]
	fn uncertainty_is_bounded() {
		let m = SimilarityMetrics {
			cosine: 1.0,
			tree: 0.0,
			latent: 0.5,
			coherence: 0.9,
		};
		let report = quantify(m);
		assert!((0.0..=1.0).contains(&report.uncertainty));
		assert!((report.confidence - (1.0 - report.uncertainty)).abs() < 1e-6);
	}

	#[test]
	fn contribution_sums_to_one_when_metrics_disagree() {
		let m = SimilarityMetrics {
			cosine: 1.0,
			tree: 0.0,
			latent: 0.5,
			coherence: 0.5,
		};
		let report = quantify(m);
		let total: f32 = report.contribution.iter().sum();
		assert!((total - 1.0).abs() < 1e-5);
	}

	#[test]
	fn disagreeing_metrics_have_higher_uncertainty_than_agreeing() {
		let agree = quantify(SimilarityMetrics {
			cosine: 0.9,
			tree: 0.91,
			latent: 0.89,
			coherence: 0.9,
		});
		let disagree = quantify(SimilarityMetrics {
			cosine: 1.0,
			tree: 0.0,
			latent: 1.0,
			coherence: 0.0,
		});
		assert!(disagree.uncertainty > agree.uncertainty);
	}
}
