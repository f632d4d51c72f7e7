//! Sparse element store backing a collection cache.

use std::collections::BTreeMap;
use std::ops::Range;

use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use tracing::trace;

use super::error::CacheError;
use super::traits::CollectionPage;

/// Shared completion of one `$skip`/`$top` request.
///
/// Resolves once the response has been merged into the store.
pub(crate) type PendingRange = Shared<BoxFuture<'static, Result<(), CacheError>>>;

/// Contents of known indexes. Absent indexes are empty (never requested).
///
/// A pending request is one entry keyed by its first index and covering up
/// to `end`, so requesting a range costs the same whatever its length.
pub(crate) enum Slot {
  Pending { end: usize, request: PendingRange },
  Resolved(Value),
}

impl Slot {
  /// End of the indexes covered by a slot stored at `index`.
  fn end(&self, index: usize) -> usize {
    match self {
      Slot::Pending { end, .. } => *end,
      Slot::Resolved(_) => index.saturating_add(1),
    }
  }
}

/// Sparse, index-addressed store of collection elements.
///
/// The `epoch` identifies the store's contents: `clear` starts a new epoch,
/// and a response captured under an older epoch must not be applied.
/// Entries never overlap.
pub(crate) struct ElementStore {
  epoch: u64,
  slots: BTreeMap<usize, Slot>,
  /// The `@odata.context` of the latest applied response
  context: Option<String>,
  /// Number of elements in the collection, once a short response revealed it
  max_elements: Option<usize>,
}

impl ElementStore {
  pub fn new() -> Self {
    Self {
      epoch: 0,
      slots: BTreeMap::new(),
      context: None,
      max_elements: None,
    }
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn context(&self) -> Option<&str> {
    self.context.as_deref()
  }

  #[cfg(test)]
  pub fn max_elements(&self) -> Option<usize> {
    self.max_elements
  }

  /// Clip a range end to the known collection length.
  pub fn clip(&self, end: usize) -> usize {
    match self.max_elements {
      Some(max) => end.min(max),
      None => end,
    }
  }

  /// Entries covering any index of `start..end` as `(first, end, slot)`,
  /// left to right.
  fn covering(&self, start: usize, end: usize) -> impl Iterator<Item = (usize, usize, &Slot)> {
    let before = self
      .slots
      .range(..start)
      .next_back()
      .filter(|&(&index, slot)| slot.end(index) > start);

    before
      .into_iter()
      .chain(self.slots.range(start..end.max(start)))
      .map(|(&index, slot)| (index, slot.end(index), slot))
  }

  /// The maximal runs of empty indexes within `start..end`, left to right.
  pub fn gaps(&self, start: usize, end: usize) -> Vec<Range<usize>> {
    let mut gaps = Vec::new();
    let mut cursor = start;

    for (first, last, _) in self.covering(start, end) {
      if first > cursor {
        gaps.push(cursor..first);
      }
      cursor = cursor.max(last);
    }
    if cursor < end {
      gaps.push(cursor..end);
    }

    gaps
  }

  /// Mark the empty `range` as waiting for `request`.
  pub fn fill_pending(&mut self, range: Range<usize>, request: &PendingRange) {
    if !range.is_empty() {
      self.slots.insert(
        range.start,
        Slot::Pending {
          end: range.end,
          request: request.clone(),
        },
      );
    }
  }

  /// Forget every index of `range` so a later read requests it again.
  pub fn reset(&mut self, range: Range<usize>) {
    let known: Vec<usize> = self.slots.range(range).map(|(&index, _)| index).collect();
    for index in known {
      self.slots.remove(&index);
    }
  }

  /// Merge the response for a request of `range`.
  ///
  /// A short response reveals the collection length: the length is lowered
  /// and every index beyond it is dropped. Records beyond the requested range
  /// are ignored.
  pub fn apply(&mut self, range: Range<usize>, page: CollectionPage) {
    let expected = range.len();
    let received = page.value.len();

    self.context = page.context;
    if received < expected {
      let bound = range.start + received;
      let max = self.max_elements.map_or(bound, |max| max.min(bound));
      trace!(start = range.start, expected, received, max, "short response");
      self.max_elements = Some(max);
      self.slots.retain(|&index, _| index < max);
      if let Some((_, Slot::Pending { end, .. })) = self.slots.range_mut(..max).next_back() {
        *end = (*end).min(max);
      }
    }

    if matches!(self.slots.get(&range.start), Some(Slot::Pending { .. })) {
      self.slots.remove(&range.start);
    }
    let end = self.clip(range.end);
    for (index, record) in (range.start..end).zip(page.value) {
      self.slots.insert(index, Slot::Resolved(record));
    }
  }

  /// The distinct requests still pending for indexes in `start..end`.
  pub fn pending_in(&self, start: usize, end: usize) -> Vec<PendingRange> {
    let mut pending: Vec<PendingRange> = Vec::new();
    for (_, _, slot) in self.covering(start, end) {
      if let Slot::Pending { request, .. } = slot {
        if !pending.iter().any(|known| known.ptr_eq(request)) {
          pending.push(request.clone());
        }
      }
    }
    pending
  }

  /// The resolved records in `start..end`, in order.
  pub fn slice(&self, start: usize, end: usize) -> Vec<Value> {
    self
      .slots
      .range(start..end.max(start))
      .filter_map(|(_, slot)| match slot {
        Slot::Resolved(record) => Some(record.clone()),
        Slot::Pending { .. } => None,
      })
      .collect()
  }

  /// Drop all contents and start a new epoch.
  pub fn clear(&mut self) {
    self.epoch += 1;
    self.slots.clear();
    self.context = None;
    self.max_elements = None;
  }
}
