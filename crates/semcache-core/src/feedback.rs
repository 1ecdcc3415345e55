//! Feedback records, access patterns, and the bounded ring buffers shared by
//! `ensemble`, `threshold`, and `prefetch` (§3, §5).
//!
//! All three consumers read from a snapshot taken under a short lock and
//! release it before doing any real computation (§5): [`RingBuffer::snapshot`]
//! clones the buffer's contents for that purpose.

use std::collections::VecDeque;

/// Explicit user feedback on a cache result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExplicitFeedback {
	/// The user accepted the result as-is.
	Accepted,
	/// The user rejected the result.
	Rejected,
	/// No explicit signal was given.
	Null,
}

/// Implicit signals gathered from how the user interacted with a result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImplicitFeedback {
	/// How many times the user asked for a regeneration of this result.
	pub regeneration_count: u32,
	/// How many times the user edited the prompt after seeing this result.
	pub edit_count: u32,
	/// Milliseconds the user spent looking at the result before acting.
	pub dwell_time_ms: u64,
	/// How many alternate variants the user clicked through.
	pub clicked_variants: u32,
}

/// One feedback observation tying a prompt to a served result (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackRecord {
	/// Identifier of the originating prompt/request.
	pub prompt_id: String,
	/// Identifier of the cache item that was served.
	pub result_id: String,
	/// Explicit accept/reject signal, if any.
	pub explicit: ExplicitFeedback,
	/// Implicit behavioral signals.
	pub implicit: ImplicitFeedback,
	/// Milliseconds since epoch.
	pub timestamp_ms: u64,
	/// Identifier of the user, if known.
	pub user_id: Option<String>,
}

/// A lightweight descriptor of the request context, used only for
/// prefetch prediction, never for identity (§3, GLOSSARY).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextFingerprint {
	/// Opaque user identifier, if known.
	pub user_id: Option<String>,
	/// Opaque session identifier, if known.
	pub session_id: Option<String>,
	/// Hour of day (0-23) the request was made.
	pub hour_of_day: u8,
	/// A small window of recent prompts in the same session, used for
	/// Jaccard-similarity context matching.
	pub recent_prompts: Vec<String>,
}

/// One recorded access: which item, under what context, when, and the rest
/// of the session-window sequence that followed it (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct AccessPattern {
	/// The item that was accessed.
	pub item_id: String,
	/// Context at the time of access.
	pub context: ContextFingerprint,
	/// Milliseconds since epoch.
	pub timestamp_ms: u64,
	/// Item ids accessed within the same session window (<= 5 minutes)
	/// following this access, in order.
	pub following_items: Vec<String>,
}

/// A bounded FIFO queue that drops the oldest entry on overflow (§5: the
/// ensemble feedback buffer, threshold feedback buffer, and prefetcher's
/// access log are all this shape).
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
	capacity: usize,
	items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
	/// A new, empty ring buffer holding at most `capacity` items.
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			items: VecDeque::with_capacity(capacity.max(1)),
		}
	}

	/// Push `item`, dropping the oldest entry if the buffer is already at
	/// capacity.
	pub fn push(&mut self, item: T) {
		if self.items.len() >= self.capacity {
			self.items.pop_front();
		}
		self.items.push_back(item);
	}

	/// Number of items currently buffered.
	#[must_use]
	pub fn len(&self) -> usize {
		self.items.len()
	}

	/// Whether the buffer holds no items.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Iterate the buffer oldest-first.
	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.items.iter()
	}
}

impl<T: Clone> RingBuffer<T> {
	/// A cloned snapshot of the buffer's current contents, oldest-first.
	/// Readers take this snapshot under a short lock and release it before
	/// doing any real computation (§5).
	#[must_use]
	pub fn snapshot(&self) -> Vec<T> {
		self.items.iter().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ring_buffer_drops_oldest_on_overflow() {
		let mut buf = RingBuffer::new(3);
		buf.push(1);
		buf.push(2);
		buf.push(3);
		buf.push(4);
		assert_eq!(buf.snapshot(), vec![2, 3, 4]);
	}

	#[test]
	fn ring_buffer_zero_capacity_clamps_to_one() {
		let mut buf = RingBuffer::new(0);
		buf.push(1);
		buf.push(2);
		assert_eq!(buf.snapshot(), vec![2]);
	}

	#[test]
	fn empty_buffer_reports_empty() {
		let buf: RingBuffer<u32> = RingBuffer::new(10);
		assert!(buf.is_empty());
		assert_eq!(buf.len(), 0);
	}
}
