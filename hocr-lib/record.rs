//! Addressable records derived from the syntax index.

use hocr_core::{
  bbox::Bbox,
  span::Span,
};

/// One `ocrx_word` span.
///
/// Every byte range is valid only against the document revision recorded in
/// [`Word::revision`]; any mutation invalidates them all. `span_range.start`
/// is the stable disambiguating key; `id` is not guaranteed unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
  pub id:      Vec<u8>,
  pub text:    Vec<u8>,
  pub bbox:    Bbox,
  pub x_wconf: Option<i32>,
  /// Raw `title` attribute value, quotes excluded.
  pub title_value: Vec<u8>,

  pub text_range:        Span,
  pub title_value_range: Span,
  pub id_value_range:    Span,
  pub element_range:     Span,
  /// Opening-tag start through closing-tag end.
  pub span_range:        Span,

  /// Document revision this record was derived from.
  pub revision: u64,
}

impl Word {
  /// Stable mutation handle. Span starts are unique within a revision,
  /// unlike ids.
  pub fn to_ref(&self) -> WordRef {
    WordRef {
      span_start: self.span_range.start,
      revision:   self.revision,
    }
  }
}

/// Handle for mutating a word later. Rejected by the mutator when the
/// document has moved past `revision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordRef {
  pub span_start: usize,
  pub revision:   u64,
}

/// One `ocr_page` division.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
  pub id: Vec<u8>,
  /// Raw `title` attribute value, quotes excluded.
  pub title_value: Vec<u8>,
  /// Zero when the title carries no parseable bbox.
  pub bbox: Bbox,
  /// Referenced image path from the title's `image "<path>"` field.
  pub image: Option<Vec<u8>>,

  pub element_range: Span,
  pub revision:      u64,
}

/// A multi-field word edit; `None` fields are left untouched.
///
/// Payload bytes (`text`, `new_id`) are spliced into the markup verbatim.
/// Callers must pre-escape markup metacharacters (`<`, `&`, the attribute
/// quote) before submitting them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WordPatch {
  pub text:    Option<Vec<u8>>,
  pub bbox:    Option<Bbox>,
  pub x_wconf: Option<i32>,
  pub new_id:  Option<Vec<u8>>,
}

impl WordPatch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn text(mut self, text: impl Into<Vec<u8>>) -> Self {
    self.text = Some(text.into());
    self
  }

  pub fn bbox(mut self, bbox: Bbox) -> Self {
    self.bbox = Some(bbox);
    self
  }

  pub fn x_wconf(mut self, x_wconf: i32) -> Self {
    self.x_wconf = Some(x_wconf);
    self
  }

  pub fn new_id(mut self, new_id: impl Into<Vec<u8>>) -> Self {
    self.new_id = Some(new_id.into());
    self
  }

  pub fn is_empty(&self) -> bool {
    self.text.is_none() && self.bbox.is_none() && self.x_wconf.is_none() && self.new_id.is_none()
  }
}
