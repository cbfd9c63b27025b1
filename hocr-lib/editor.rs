//! Character-level source view with undoable editing.
//!
//! [`SourceEditor`] is the parallel text view over a [`Document`]: hosts
//! feed it character-level inserts and removals, it keeps the [`History`]
//! coalescing them into undo units, and it re-synchronizes the document
//! (a full decode through the syntax index) after every edit, undo, and
//! redo so word ranges stay consistent with the current text.

use std::time::Instant;

use ropey::Rope;
use thiserror::Error;

use crate::{
  document::Document,
  history::{
    CommitMode,
    EditKind,
    EditOperation,
    History,
  },
};

pub type Result<T> = std::result::Result<T, EditError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
  #[error("edit at char {pos} (len {len}) is out of bounds for text length {text_len}")]
  OutOfBounds {
    pos:      usize,
    len:      usize,
    text_len: usize,
  },
}

/// Editable character-level view over a [`Document`].
///
/// Single-threaded: do not start a second edit while one is in flight. All
/// positions are char offsets into the current text.
#[derive(Debug)]
pub struct SourceEditor {
  text:     Rope,
  history:  History,
  document: Document,
}

impl SourceEditor {
  pub fn new(document: Document) -> Self {
    Self::with_history(document, History::default())
  }

  pub fn with_history(document: Document, history: History) -> Self {
    let text = Rope::from_str(&document.source_string());
    Self {
      text,
      history,
      document,
    }
  }

  pub fn text(&self) -> &Rope {
    &self.text
  }

  pub fn history(&self) -> &History {
    &self.history
  }

  pub fn document(&self) -> &Document {
    &self.document
  }

  pub fn document_mut(&mut self) -> &mut Document {
    &mut self.document
  }

  /// Insert `text` at `pos`.
  ///
  /// Single-character inserts coalesce as typing; anything longer commits
  /// as its own undo unit (paste).
  pub fn apply_insert(&mut self, pos: usize, text: &str, now: Instant) -> Result<()> {
    if text.is_empty() {
      return Ok(());
    }
    let text_len = self.text.len_chars();
    if pos > text_len {
      return Err(EditError::OutOfBounds {
        pos,
        len: 0,
        text_len,
      });
    }

    self.text.insert(pos, text);
    let mode = if text.chars().count() == 1 {
      CommitMode::Typing
    } else {
      CommitMode::Normal
    };
    self.history.record([EditOperation::insert(pos, text)], mode, now);
    Self::sync(&self.text, &mut self.document);
    Ok(())
  }

  /// Remove `len` chars at `pos`.
  ///
  /// Single-character removals coalesce as deleting; longer removals commit
  /// as their own undo unit (bulk-selection delete).
  pub fn apply_remove(&mut self, pos: usize, len: usize, now: Instant) -> Result<()> {
    let text_len = self.text.len_chars();
    if pos.checked_add(len).is_none_or(|end| end > text_len) {
      return Err(EditError::OutOfBounds { pos, len, text_len });
    }
    if len == 0 {
      return Ok(());
    }

    let removed = String::from(self.text.slice(pos..pos + len));
    self.text.remove(pos..pos + len);
    let mode = if len == 1 {
      CommitMode::Deleting
    } else {
      CommitMode::Normal
    };
    self
      .history
      .record([EditOperation::remove(pos, removed)], mode, now);
    Self::sync(&self.text, &mut self.document);
    Ok(())
  }

  /// Undo the most recent chunk: its operations replay in reverse order,
  /// each inverted. Returns `false` when there is nothing to undo.
  pub fn undo(&mut self) -> bool {
    let Some(chunk) = self.history.undo() else {
      return false;
    };
    for op in chunk.ops.iter().rev() {
      match op.kind {
        EditKind::Insert => {
          self.text.remove(op.pos..op.pos + op.len_chars());
        },
        EditKind::Remove => {
          self.text.insert(op.pos, &op.text);
        },
      }
    }
    Self::sync(&self.text, &mut self.document);
    true
  }

  /// Redo the most recently undone chunk: forward replay in original order.
  /// Returns `false` when there is nothing to redo.
  pub fn redo(&mut self) -> bool {
    let Some(chunk) = self.history.redo() else {
      return false;
    };
    for op in chunk.ops.iter() {
      match op.kind {
        EditKind::Insert => {
          self.text.insert(op.pos, &op.text);
        },
        EditKind::Remove => {
          self.text.remove(op.pos..op.pos + op.len_chars());
        },
      }
    }
    Self::sync(&self.text, &mut self.document);
    true
  }

  /// Drive the idle-timeout auto-commit from the host clock.
  pub fn tick(&mut self, now: Instant) {
    self.history.tick(now);
  }

  /// Re-seed the character view from the document buffer after
  /// mutator-side edits.
  ///
  /// Recorded as a single normal chunk (remove-all + insert-all), so the
  /// refresh is undoable like any other bulk edit and the history only ever
  /// changes through edits, undo, and redo.
  pub fn refresh_from_document(&mut self, now: Instant) {
    let new_text = self.document.source_string();
    let old_text = self.text.to_string();
    if old_text == new_text {
      return;
    }

    self.text = Rope::from_str(&new_text);
    let ops = [
      EditOperation::remove(0, old_text),
      EditOperation::insert(0, new_text),
    ];
    self.history.record(ops, CommitMode::Normal, now);
  }

  // The document decodes the full character buffer after every text-side
  // change so word ranges stay consistent with the current text.
  fn sync(text: &Rope, document: &mut Document) {
    document.set_source(text.to_string().into_bytes());
  }
}
