//! Error taxonomy.
//!
//! Five categories, matching how failures actually propagate through the
//! cache: bad input is rejected without mutating state, capacity exhaustion
//! is a recoverable failure the caller can retry after `optimize_memory`,
//! degenerate math is absorbed locally (never surfaced as an error),
//! configuration problems are clamped and logged, and producer failures
//! pass through unchanged since they happen outside the core.

use thiserror::Error;

/// Errors raised by the cache core.
///
/// Degenerate-math cases (zero-norm vectors, empty candidate lists) are
/// deliberately not represented here — they are absorbed locally by the
/// similarity/decision code and never reach the caller as an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
	/// The prompt was empty after normalization, or no populated field was
	/// present in a multimodal input.
	#[error("invalid input: {0}")]
	InvalidInput(String),

	/// `add` could not free enough space even after evicting every eligible
	/// victim in the target tier.
	#[error("capacity exhausted: need {needed} bytes, at most {available} available in {tier}")]
	CapacityExhausted {
		/// Tier the insertion targeted.
		tier: String,
		/// Bytes requested by the incoming item.
		needed: u64,
		/// Bytes that could be freed by evicting every eligible victim.
		available: u64,
	},

	/// A requested tier does not exist.
	#[error("unknown storage tier: {0}")]
	UnknownTier(String),

	/// A configuration value was outside its allowed range and had to be
	/// clamped. Non-fatal; logged at construction and surfaced here only to
	/// callers that explicitly validate configuration up front.
	#[error("invalid configuration: {0}")]
	InvalidConfiguration(String),
}

/// Result alias for fallible cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_input_message_includes_reason() {
		let err = CacheError::InvalidInput("prompt empty after normalization".into());
		assert!(err.to_string().contains("prompt empty"));
	}

	#[test]
	fn capacity_exhausted_is_comparable() {
		let a = CacheError::CapacityExhausted {
			tier: "L1".into(),
			needed: 100,
			available: 10,
		};
		let b = a.clone();
		assert_eq!(a, b);
	}
}
