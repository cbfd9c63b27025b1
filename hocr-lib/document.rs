//! Document state: syntax index, minimal-diff mutation, resolution.
//!
//! A [`Document`] owns one hOCR byte buffer and derives [`Word`]/[`Page`]
//! records from it on demand. Mutations go through byte-range splices that
//! leave every byte outside the targeted range untouched, so that
//! version-control diffs stay small.
//!
//! # Staleness
//!
//! Every derived record is stamped with the document revision it came from.
//! The composite [`Document::update`] rejects a [`WordRef`] from an older
//! revision instead of misapplying its offsets; after any mutation, re-query
//! the document for fresh records.
//!
//! # Single-threaded
//!
//! Parsing, mutation, and resolution run on one logical thread. `update` is
//! not reentrant: do not start a second mutation while one is in flight.

use hocr_core::{
  span::Span,
  title::{
    self,
    TitleFields,
  },
};
use thiserror::Error;
use tracing::trace;

use crate::{
  index::{
    self,
    Index,
  },
  reader::{
    Dialect,
    HtmlReader,
    ReadError,
    XmlReader,
  },
  record::{
    Page,
    Word,
    WordPatch,
    WordRef,
  },
};

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Error)]
pub enum DocumentError {
  #[error(transparent)]
  Read(#[from] ReadError),
  #[error("invalid range: start {start} is after end {end}")]
  InvalidRange { start: usize, end: usize },
  #[error("range {start}..{end} is out of bounds for buffer length {len}")]
  RangeOutOfBounds {
    start: usize,
    end:   usize,
    len:   usize,
  },
  #[error("stale word ref: derived from revision {ref_revision}, document is at {doc_revision}")]
  StaleWord {
    ref_revision: u64,
    doc_revision: u64,
  },
}

/// Explicit tracing configuration, passed at construction.
///
/// `trace` enables splice tracing for every word; `trace_word_id` narrows it
/// to one id. There is deliberately no process-wide toggle.
#[derive(Debug, Default, Clone)]
pub struct DocumentConfig {
  pub trace:         bool,
  pub trace_word_id: Option<Vec<u8>>,
}

impl DocumentConfig {
  fn traces(&self, id: &[u8]) -> bool {
    self.trace || self.trace_word_id.as_deref() == Some(id)
  }
}

/// One hOCR document: source bytes, detected dialect, lazily rebuilt index.
#[derive(Debug)]
pub struct Document {
  source:   Vec<u8>,
  dialect:  Dialect,
  config:   DocumentConfig,
  revision: u64,
  cache:    Option<Index>,
}

impl Document {
  /// Parse an hOCR buffer.
  ///
  /// The dialect is detected from a bounded prefix and the buffer is indexed
  /// once up front: a buffer the dialect parser cannot scan at all is a hard
  /// load failure.
  pub fn parse(source: Vec<u8>, config: DocumentConfig) -> Result<Self> {
    let dialect = Dialect::detect(&source);
    let mut doc = Self {
      source,
      dialect,
      config,
      revision: 0,
      cache: None,
    };
    doc.index()?;
    Ok(doc)
  }

  pub fn source(&self) -> &[u8] {
    &self.source
  }

  /// Lossy UTF-8 view of the buffer, for character-level consumers.
  pub fn source_string(&self) -> String {
    String::from_utf8_lossy(&self.source).into_owned()
  }

  pub fn dialect(&self) -> Dialect {
    self.dialect
  }

  pub fn revision(&self) -> u64 {
    self.revision
  }

  /// Replace the whole buffer (the editor sync path).
  ///
  /// Re-detects the dialect and invalidates every derived record. The new
  /// buffer is indexed lazily: a scan failure surfaces from the next read,
  /// not from here, since mid-edit buffers are routinely malformed.
  pub fn set_source(&mut self, source: Vec<u8>) {
    self.source = source;
    self.dialect = Dialect::detect(&self.source);
    self.revision += 1;
    self.cache = None;
  }

  /// All indexed words, in document order.
  pub fn words(&mut self) -> Result<&[Word]> {
    Ok(&self.index()?.words)
  }

  /// All indexed pages, in document order.
  pub fn pages(&mut self) -> Result<&[Page]> {
    Ok(&self.index()?.pages)
  }

  /// Resolve a word by id.
  ///
  /// Ids are not guaranteed unique; among duplicates this returns the last
  /// occurrence in document order. That is deterministic, but possibly not
  /// the occurrence the caller meant. A caller that has observed a word's `span_range` must
  /// use [`Document::word_by_span_start`] (or a [`WordRef`]) instead; id
  /// lookup is the fallback for callers that never captured a span offset.
  pub fn word_by_id(&mut self, id: &[u8]) -> Result<Option<&Word>> {
    let index = self.index()?;
    Ok(
      index
        .by_id
        .get(id)
        .and_then(|hits| hits.last())
        .map(|&at| &index.words[at]),
    )
  }

  /// All words sharing `id`, in document order.
  pub fn words_by_id(&mut self, id: &[u8]) -> Result<Vec<&Word>> {
    let index = self.index()?;
    let hits = index.by_id.get(id).map(Vec::as_slice).unwrap_or(&[]);
    Ok(hits.iter().map(|&at| &index.words[at]).collect())
  }

  /// Resolve a word by its span start offset. Unambiguous: span starts are
  /// unique within a revision.
  pub fn word_by_span_start(&mut self, span_start: usize) -> Result<Option<&Word>> {
    let index = self.index()?;
    Ok(index.by_span_start.get(&span_start).map(|&at| &index.words[at]))
  }

  /// First word whose span contains the byte offset.
  pub fn word_at_offset(&mut self, offset: usize) -> Result<Option<&Word>> {
    Ok(
      self
        .index()?
        .words
        .iter()
        .find(|word| word.span_range.contains(offset)),
    )
  }

  /// Splice `new_bytes` over `span`: `[0, start) + new_bytes + [end, len)`.
  ///
  /// Every byte outside the span is unchanged and keeps its order. The
  /// revision advances and all previously derived records become stale; the
  /// index is rebuilt on the next read.
  pub fn replace(&mut self, span: Span, new_bytes: &[u8]) -> Result<()> {
    if span.start > span.end {
      return Err(DocumentError::InvalidRange {
        start: span.start,
        end:   span.end,
      });
    }
    if span.end > self.source.len() {
      return Err(DocumentError::RangeOutOfBounds {
        start: span.start,
        end:   span.end,
        len:   self.source.len(),
      });
    }

    self
      .source
      .splice(span.start..span.end, new_bytes.iter().copied());
    self.revision += 1;
    self.cache = None;
    Ok(())
  }

  /// Multi-field minimal-diff update through a [`WordRef`].
  ///
  /// Steps run text → title merge → id, each step re-resolving the word
  /// from a fresh index (earlier splices shift later offsets, but never the
  /// word's own span start). A step whose computed value equals the current
  /// bytes performs no splice and no reparse. Returns `Ok(true)` iff at
  /// least one splice happened.
  ///
  /// All-or-nothing: if any step fails (including the reparse validating
  /// the final buffer) the pre-update buffer is restored and the error
  /// returned; no partially-spliced state is observable.
  ///
  /// Payload bytes are spliced verbatim; callers must pre-escape markup
  /// metacharacters (`<`, `&`, the attribute quote) in `text` and `new_id`.
  pub fn update(&mut self, word: &WordRef, patch: &WordPatch) -> Result<bool> {
    if word.revision != self.revision {
      return Err(DocumentError::StaleWord {
        ref_revision: word.revision,
        doc_revision: self.revision,
      });
    }
    self.update_by_span(word.span_start, patch)
  }

  /// [`Document::update`] keyed by span start. `Ok(false)` when no word
  /// starts at `span_start`.
  pub fn update_by_span(&mut self, span_start: usize, patch: &WordPatch) -> Result<bool> {
    let snapshot = self.source.clone();
    let revision = self.revision;

    let outcome = self.apply_patch(span_start, patch).and_then(|changed| {
      if changed {
        // Validate the spliced buffer; surfaces unescaped payloads as a
        // clean error instead of a corrupt document.
        self.index()?;
      }
      Ok(changed)
    });

    if outcome.is_err() {
      self.source = snapshot;
      self.revision = revision;
      self.cache = None;
    }
    outcome
  }

  /// Id-keyed fallback for callers that never captured a span offset; the
  /// same weaker guarantee as [`Document::word_by_id`]. `Ok(false)` when the
  /// id resolves to nothing.
  pub fn update_by_id(&mut self, id: &[u8], patch: &WordPatch) -> Result<bool> {
    let span_start = match self.word_by_id(id)? {
      Some(word) => word.span_range.start,
      None => return Ok(false),
    };
    self.update_by_span(span_start, patch)
  }

  fn apply_patch(&mut self, span_start: usize, patch: &WordPatch) -> Result<bool> {
    let mut changed = false;

    if let Some(text) = &patch.text {
      let step = match self.word_by_span_start(span_start)? {
        Some(word) => Some((word.text_range, word.text == *text, word.id.clone())),
        None => None,
      };
      let Some((range, unchanged, id)) = step else {
        return Ok(changed);
      };
      if !unchanged {
        if self.config.traces(&id) {
          trace!(
            word = %String::from_utf8_lossy(&id),
            new = %String::from_utf8_lossy(text),
            "update text"
          );
        }
        self.replace(range, text)?;
        changed = true;
      }
    }

    if patch.bbox.is_some() || patch.x_wconf.is_some() {
      let step = match self.word_by_span_start(span_start)? {
        Some(word) => Some((word.title_value_range, word.title_value.clone(), word.id.clone())),
        None => None,
      };
      let Some((range, current, id)) = step else {
        return Ok(changed);
      };

      let mut updates = TitleFields::new();
      if let Some(bbox) = patch.bbox {
        updates.set(b"bbox", bbox.to_string().into_bytes());
      }
      if let Some(x_wconf) = patch.x_wconf {
        updates.set(b"x_wconf", x_wconf.to_string().into_bytes());
      }

      let merged = title::merge(&current, &updates);
      if merged != current {
        if self.config.traces(&id) {
          trace!(
            word = %String::from_utf8_lossy(&id),
            old = %String::from_utf8_lossy(&current),
            new = %String::from_utf8_lossy(&merged),
            "update title"
          );
        }
        self.replace(range, &merged)?;
        changed = true;
      }
    }

    if let Some(new_id) = &patch.new_id {
      let step = match self.word_by_span_start(span_start)? {
        Some(word) => Some((word.id_value_range, word.id == *new_id, word.id.clone())),
        None => None,
      };
      let Some((range, unchanged, id)) = step else {
        return Ok(changed);
      };
      if !unchanged {
        if self.config.traces(&id) {
          trace!(
            word = %String::from_utf8_lossy(&id),
            new = %String::from_utf8_lossy(new_id),
            "update id"
          );
        }
        self.replace(range, new_id)?;
        changed = true;
      }
    }

    Ok(changed)
  }

  fn index(&mut self) -> Result<&Index> {
    if self.cache.is_none() {
      let index = match self.dialect {
        Dialect::Html => index::scan(&self.source, &mut HtmlReader::new(&self.source), self.revision)?,
        Dialect::Xml => index::scan(&self.source, &mut XmlReader::new(&self.source), self.revision)?,
      };
      self.cache = Some(index);
    }
    match &self.cache {
      Some(index) => Ok(index),
      // Populated just above.
      None => unreachable!(),
    }
  }
}
