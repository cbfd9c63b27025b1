//! Undoable, coalescing edit history.
//!
//! Interactive editing is modeled as character-level insert/remove
//! operations grouped into [`EditChunk`]s, one chunk per undo unit.
//! Consecutive single-character inserts coalesce into one growing chunk
//! (typing), as do consecutive single-character removals (deleting); bulk
//! edits commit immediately as their own unit. Chunks of different modes
//! never merge: switching mode forces the other mode's pending chunk to
//! commit first.
//!
//! There is no timer in here. The idle-timeout auto-commit is a pure
//! decision over injected timestamps ([`should_flush`]), driven by whatever
//! host event loop owns the clock via [`History::tick`]; re-arming happens
//! on every same-mode operation and a late tick after the chunk was already
//! committed is a no-op.

use std::time::{
  Duration,
  Instant,
};

use smallvec::SmallVec;

use crate::Tendril;

/// Idle window after which a pending coalescing chunk commits.
pub const DEFAULT_COALESCE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
  Insert,
  Remove,
}

/// One character-level operation. `pos` is a char offset into the text view.
///
/// For removals, `text` holds the removed characters so the operation can be
/// inverted without consulting the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
  pub kind: EditKind,
  pub pos:  usize,
  pub text: Tendril,
}

impl EditOperation {
  pub fn insert(pos: usize, text: impl Into<Tendril>) -> Self {
    Self {
      kind: EditKind::Insert,
      pos,
      text: text.into(),
    }
  }

  pub fn remove(pos: usize, text: impl Into<Tendril>) -> Self {
    Self {
      kind: EditKind::Remove,
      pos,
      text: text.into(),
    }
  }

  pub fn len_chars(&self) -> usize {
    self.text.chars().count()
  }
}

/// Ordered list of operations forming one undo unit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EditChunk {
  pub ops: SmallVec<[EditOperation; 1]>,
}

impl EditChunk {
  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }
}

impl FromIterator<EditOperation> for EditChunk {
  fn from_iter<I: IntoIterator<Item = EditOperation>>(ops: I) -> Self {
    Self {
      ops: ops.into_iter().collect(),
    }
  }
}

/// How a recorded batch of operations commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
  /// Flush immediately as its own chunk: paste, bulk-selection deletes.
  Normal,
  /// Consecutive single-character inserts coalesce into one growing chunk.
  Typing,
  /// Consecutive single-character removals coalesce similarly.
  Deleting,
}

/// Pure idle-timeout decision: has `timeout` elapsed since `last_op`?
///
/// Kept free of any real timer so hosts can drive it from their own event
/// loop and tests can drive it from literal instants.
pub fn should_flush(last_op: Instant, now: Instant, timeout: Duration) -> bool {
  now.saturating_duration_since(last_op) >= timeout
}

#[derive(Debug)]
struct Pending {
  mode:    CommitMode,
  chunk:   EditChunk,
  last_op: Instant,
}

/// Undo/redo stacks plus the pending coalescing chunk.
///
/// The history grows and shrinks only through [`record`](History::record),
/// [`undo`](History::undo) and [`redo`](History::redo); committing any new
/// chunk clears the redo stack.
#[derive(Debug)]
pub struct History {
  undo_stack: Vec<EditChunk>,
  redo_stack: Vec<EditChunk>,
  pending:    Option<Pending>,
  timeout:    Duration,
}

impl Default for History {
  fn default() -> Self {
    Self::new(DEFAULT_COALESCE_TIMEOUT)
  }
}

impl History {
  pub fn new(timeout: Duration) -> Self {
    Self {
      undo_stack: Vec::new(),
      redo_stack: Vec::new(),
      pending: None,
      timeout,
    }
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// Committed undo units (the pending chunk not included).
  pub fn undo_depth(&self) -> usize {
    self.undo_stack.len()
  }

  pub fn redo_depth(&self) -> usize {
    self.redo_stack.len()
  }

  pub fn has_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Record one batch of already-applied operations.
  ///
  /// `Normal` flushes every pending chunk first and commits `ops` as its
  /// own unit. `Typing`/`Deleting` flush the *other* mode's pending chunk,
  /// extend their own, and re-arm the idle deadline at `now`.
  pub fn record(
    &mut self,
    ops: impl IntoIterator<Item = EditOperation>,
    mode: CommitMode,
    now: Instant,
  ) {
    let ops: SmallVec<[EditOperation; 1]> = ops.into_iter().collect();
    if ops.is_empty() {
      return;
    }

    match mode {
      CommitMode::Normal => {
        self.flush_all();
        self.commit(EditChunk { ops });
      },
      CommitMode::Typing | CommitMode::Deleting => {
        if self.pending.as_ref().is_some_and(|pending| pending.mode != mode) {
          self.flush_all();
        }
        let pending = self.pending.get_or_insert_with(|| Pending {
          mode,
          chunk: EditChunk::default(),
          last_op: now,
        });
        pending.chunk.ops.extend(ops);
        pending.last_op = now;
      },
    }
  }

  /// Idle-timeout auto-commit, driven by the host clock.
  ///
  /// Idempotent: a tick after the pending chunk was committed by another
  /// path does nothing. Supersedable: every same-mode
  /// [`record`](History::record) re-arms the deadline.
  pub fn tick(&mut self, now: Instant) {
    let expired = self
      .pending
      .as_ref()
      .is_some_and(|pending| should_flush(pending.last_op, now, self.timeout));
    if expired {
      self.flush_all();
    }
  }

  /// Deadline at which the pending chunk will auto-commit, for hosts that
  /// schedule a wakeup instead of polling.
  pub fn deadline(&self) -> Option<Instant> {
    let pending = self.pending.as_ref()?;
    pending.last_op.checked_add(self.timeout)
  }

  /// Commit any pending coalescing chunk to the undo stack.
  pub fn flush_all(&mut self) {
    if let Some(pending) = self.pending.take() {
      self.commit(pending.chunk);
    }
  }

  /// Pop the most recent undo unit.
  ///
  /// The caller must replay the returned chunk's operations in reverse
  /// order, applying the inverse of each: Insert(pos, text) becomes a
  /// removal of `text.chars().count()` at `pos`, Remove(pos, text) becomes
  /// an insertion of `text` at `pos`. The chunk itself (non-inverted) has
  /// already moved to the redo stack.
  pub fn undo(&mut self) -> Option<&EditChunk> {
    self.flush_all();
    let chunk = self.undo_stack.pop()?;
    self.redo_stack.push(chunk);
    self.redo_stack.last()
  }

  /// Pop the most recent redo unit; replay forward in original order. The
  /// chunk has already moved back to the undo stack.
  pub fn redo(&mut self) -> Option<&EditChunk> {
    self.flush_all();
    let chunk = self.redo_stack.pop()?;
    self.undo_stack.push(chunk);
    self.undo_stack.last()
  }

  // A committed chunk is a new edit: it clears the redo stack.
  fn commit(&mut self, chunk: EditChunk) {
    if chunk.is_empty() {
      return;
    }
    self.undo_stack.push(chunk);
    self.redo_stack.clear();
  }
}
