//! Word and page extraction over a dialect reader.
//!
//! One scan serves both dialects: the [`DialectReader`] implementations
//! normalize quick_xml's strict/lenient behavior, and this module only sees
//! open/close/text events with byte ranges. A word is a `span` whose `class`
//! token set contains `ocrx_word`; a page is a `div` with `ocr_page`.
//!
//! Extraction failures recover locally: a qualifying span with an
//! unparseable bbox is skipped with a diagnostic and the rest of the
//! document still indexes. Only reader-level failures abort the scan.

use std::collections::HashMap;

use hocr_core::{
  bbox::Bbox,
  span::Span,
  title::TitleFields,
};
use tracing::warn;

use crate::{
  reader::{
    DialectReader,
    MarkupEvent,
    OpenTag,
    Result,
  },
  record::{
    Page,
    Word,
  },
};

/// Index of one buffer revision. Rebuilt from scratch after every mutation;
/// `by_id` is secondary and non-unique, `by_span_start` is the primary key.
#[derive(Debug, Default)]
pub(crate) struct Index {
  pub words: Vec<Word>,
  pub pages: Vec<Page>,
  pub by_id: HashMap<Vec<u8>, Vec<usize>>,
  pub by_span_start: HashMap<usize, usize>,
}

/// Scan the whole buffer through `reader`, stamping records with `revision`.
pub(crate) fn scan<R: DialectReader>(
  source: &[u8],
  reader: &mut R,
  revision: u64,
) -> Result<Index> {
  let mut frames: Vec<Frame> = Vec::new();
  let mut words = Vec::new();
  let mut pages = Vec::new();

  loop {
    match reader.next()? {
      MarkupEvent::Open(tag) => {
        // A self-closing element has no closing tag and therefore no text
        // slot; it can never qualify as a word or page.
        if tag.self_closing {
          continue;
        }
        frames.push(Frame::classify(tag));
      },
      MarkupEvent::Text(text) => {
        if let Some(Frame {
          kind: FrameKind::Word(word),
          ..
        }) = frames.last_mut()
          && word.text.is_none()
        {
          // First direct text child only; later runs and nested content
          // are not part of the word text.
          word.text = Some(text.range);
        }
      },
      MarkupEvent::Close(close) => {
        let Some(at) = frames.iter().rposition(|frame| frame.name == close.name) else {
          // Stray close tag (HTML recovery); nothing to finalize.
          continue;
        };
        let mut drained = frames.drain(at..);
        let Some(frame) = drained.next() else {
          continue;
        };
        let implicitly_closed: Vec<Frame> = drained.collect();
        for dropped in implicitly_closed {
          dropped.diagnose_unclosed();
        }
        frame.finalize(close.range, source, revision, &mut words, &mut pages);
      },
      MarkupEvent::Eof => break,
    }
  }

  for frame in frames {
    frame.diagnose_unclosed();
  }

  // Document order, independent of nesting and close-tag order.
  words.sort_by_key(|word: &Word| word.span_range.start);
  pages.sort_by_key(|page: &Page| page.element_range.start);

  let mut by_id: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
  let mut by_span_start = HashMap::new();
  for (i, word) in words.iter().enumerate() {
    by_id.entry(word.id.clone()).or_default().push(i);
    by_span_start.insert(word.span_range.start, i);
  }

  Ok(Index {
    words,
    pages,
    by_id,
    by_span_start,
  })
}

struct Frame {
  name: Vec<u8>,
  open: Span,
  kind: FrameKind,
}

enum FrameKind {
  Word(WordFrame),
  Page(PageFrame),
  Other,
}

struct WordFrame {
  id:         Vec<u8>,
  id_span:    Span,
  title:      Vec<u8>,
  title_span: Span,
  text:       Option<Span>,
}

struct PageFrame {
  id:    Vec<u8>,
  title: Vec<u8>,
}

impl Frame {
  fn classify(tag: OpenTag) -> Self {
    let class = tag.attr(b"class").map(|attr| attr.value.as_slice()).unwrap_or(b"");

    let kind = if tag.name == b"span" && class_has(class, b"ocrx_word") {
      let (id, id_span) = attr_with_span(&tag, b"id");
      let (title, title_span) = attr_with_span(&tag, b"title");
      FrameKind::Word(WordFrame {
        id,
        id_span,
        title,
        title_span,
        text: None,
      })
    } else if tag.name == b"div" && class_has(class, b"ocr_page") {
      let (id, _) = attr_with_span(&tag, b"id");
      let (title, _) = attr_with_span(&tag, b"title");
      FrameKind::Page(PageFrame { id, title })
    } else {
      FrameKind::Other
    };

    Self {
      name: tag.name,
      open: tag.range,
      kind,
    }
  }

  fn finalize(
    self,
    close: Span,
    source: &[u8],
    revision: u64,
    words: &mut Vec<Word>,
    pages: &mut Vec<Page>,
  ) {
    let element = Span::new(self.open.start, close.end);
    match self.kind {
      FrameKind::Word(frame) => {
        let fields = TitleFields::decode(&frame.title);
        let bbox = match fields.get(b"bbox") {
          None => {
            warn!(
              id = %String::from_utf8_lossy(&frame.id),
              title = %String::from_utf8_lossy(&frame.title),
              "skipping word: title has no bbox field"
            );
            return;
          },
          Some(value) => match Bbox::parse(value) {
            Ok(bbox) => bbox,
            Err(error) => {
              warn!(
                id = %String::from_utf8_lossy(&frame.id),
                title = %String::from_utf8_lossy(&frame.title),
                %error,
                "skipping word: unparseable bbox"
              );
              return;
            },
          },
        };

        let (text, text_range) = match frame.text {
          Some(range) => (range.get(source).unwrap_or(b"").to_vec(), range),
          // Empty span: a zero-length text slot immediately before the
          // closing tag.
          None => (Vec::new(), Span::empty_at(close.start)),
        };

        words.push(Word {
          id: frame.id,
          text,
          bbox,
          x_wconf: fields.x_wconf(),
          title_value: frame.title,
          text_range,
          title_value_range: frame.title_span,
          id_value_range: frame.id_span,
          element_range: element,
          span_range: element,
          revision,
        });
      },
      FrameKind::Page(frame) => {
        let fields = TitleFields::decode(&frame.title);
        pages.push(Page {
          id: frame.id,
          bbox: fields.bbox().unwrap_or(Bbox::ZERO),
          image: fields.image().map(<[u8]>::to_vec),
          title_value: frame.title,
          element_range: element,
          revision,
        });
      },
      FrameKind::Other => {},
    }
  }

  fn diagnose_unclosed(&self) {
    if let FrameKind::Word(word) = &self.kind {
      warn!(
        id = %String::from_utf8_lossy(&word.id),
        "skipping word: span has no closing tag"
      );
    }
  }
}

fn attr_with_span(tag: &OpenTag, name: &[u8]) -> (Vec<u8>, Span) {
  match tag.attr(name) {
    Some(attr) => (attr.value.clone(), attr.value_span),
    None => (Vec::new(), Span::default()),
  }
}

/// Whether the whitespace-separated token set of a `class` attribute
/// contains `token` (so `class="ocrx_word other"` qualifies).
fn class_has(class: &[u8], token: &[u8]) -> bool {
  class
    .split(|b| b.is_ascii_whitespace())
    .any(|candidate| candidate == token)
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::reader::{
    HtmlReader,
    XmlReader,
  };

  fn scan_html(source: &[u8]) -> Index {
    scan(source, &mut HtmlReader::new(source), 0).unwrap()
  }

  const PAGE: &[u8] = b"<!DOCTYPE html>\n<html><body>\n\
    <div class='ocr_page' id='page_1' title='bbox 0 0 2480 3508; image \"scans/p1.png\"'>\n\
    <span class='ocrx_word' id='w1' title='bbox 10 20 110 60; x_wconf 93'>Hello</span>\n\
    <span class='ocrx_word' id='w2' title='bbox 120 20 200 60'>world</span>\n\
    </div></body></html>\n";

  #[test]
  fn extracts_words_with_geometry_and_provenance() {
    let index = scan_html(PAGE);
    assert_eq!(index.words.len(), 2);

    let w1 = &index.words[0];
    assert_eq!(w1.id, b"w1");
    assert_eq!(w1.text, b"Hello");
    assert_eq!(w1.bbox, Bbox::new(10, 20, 110, 60));
    assert_eq!(w1.x_wconf, Some(93));
    assert_eq!(w1.text_range.get(PAGE), Some(&b"Hello"[..]));
    assert_eq!(w1.title_value_range.get(PAGE), Some(&b"bbox 10 20 110 60; x_wconf 93"[..]));
    assert_eq!(w1.id_value_range.get(PAGE), Some(&b"w1"[..]));
    assert!(PAGE[w1.span_range.start..].starts_with(b"<span class='ocrx_word' id='w1'"));
    assert!(PAGE[..w1.span_range.end].ends_with(b"</span>"));

    let w2 = &index.words[1];
    assert_eq!(w2.text, b"world");
    assert_eq!(w2.x_wconf, None);
  }

  #[test]
  fn extracts_page_with_image_path() {
    let index = scan_html(PAGE);
    assert_eq!(index.pages.len(), 1);

    let page = &index.pages[0];
    assert_eq!(page.id, b"page_1");
    assert_eq!(page.bbox, Bbox::new(0, 0, 2480, 3508));
    assert_eq!(page.image.as_deref(), Some(&b"scans/p1.png"[..]));
    assert!(PAGE[page.element_range.start..].starts_with(b"<div class='ocr_page'"));
  }

  #[test]
  fn word_without_text_gets_empty_slot_before_close_tag() {
    let src = b"<span class='ocrx_word' id='w1' title='bbox 1 2 3 4'></span>";
    let index = scan_html(src);
    assert_eq!(index.words.len(), 1);

    let word = &index.words[0];
    assert_eq!(word.text, b"");
    assert!(word.text_range.is_empty());
    assert!(src[word.text_range.start..].starts_with(b"</span>"));
  }

  #[test]
  fn first_direct_text_child_only() {
    let src = b"<span class='ocrx_word' id='w1' title='bbox 1 2 3 4'>one<b>two</b>three</span>";
    let index = scan_html(src);
    assert_eq!(index.words[0].text, b"one");
  }

  #[test]
  fn unparseable_bbox_skips_word_but_not_document() {
    let src = b"<div>\
      <span class='ocrx_word' id='bad' title='bbox 1 2 three 4'>x</span>\
      <span class='ocrx_word' id='good' title='bbox 1 2 3 4'>y</span>\
      </div>";
    let index = scan_html(src);
    assert_eq!(index.words.len(), 1);
    assert_eq!(index.words[0].id, b"good");
  }

  #[test]
  fn missing_bbox_field_skips_word() {
    let src = b"<span class='ocrx_word' id='w' title='x_wconf 80'>x</span>";
    assert!(scan_html(src).words.is_empty());
  }

  #[test]
  fn class_token_matching_is_exact() {
    let src = b"<div>\
      <span class='ocrx_word other' id='a' title='bbox 1 2 3 4'>x</span>\
      <span class='ocrx_wordish' id='b' title='bbox 1 2 3 4'>y</span>\
      </div>";
    let index = scan_html(src);
    assert_eq!(index.words.len(), 1);
    assert_eq!(index.words[0].id, b"a");
  }

  #[test]
  fn unclosed_meta_does_not_derail_html_indexing() {
    let src = b"<html><head><meta charset=utf-8><title>t</title></head><body>\
      <span class='ocrx_word' id='w1' title='bbox 1 2 3 4'>ok</span>\
      </body></html>";
    let index = scan_html(src);
    assert_eq!(index.words.len(), 1);
    assert_eq!(index.words[0].text, b"ok");
  }

  #[test]
  fn duplicate_ids_index_as_separate_words() {
    let src = b"<div>\
      <span class='ocrx_word' id='w1' title='bbox 1 2 3 4'>first</span>\
      <span class='ocrx_word' id='w1' title='bbox 5 6 7 8'>second</span>\
      </div>";
    let index = scan_html(src);
    assert_eq!(index.words.len(), 2);
    assert_eq!(index.by_id[&b"w1".to_vec()].len(), 2);
    assert_ne!(index.words[0].span_range.start, index.words[1].span_range.start);
    assert_eq!(index.by_span_start.len(), 2);
  }

  #[test]
  fn xml_dialect_indexes_the_same_contract() {
    let src = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
      <html xmlns=\"http://www.w3.org/1999/xhtml\"><body>\
      <div class=\"ocr_page\" id=\"page_1\" title=\"bbox 0 0 100 100\">\
      <span class=\"ocrx_word\" id=\"w1\" title=\"bbox 10 20 30 40\">Hi</span>\
      </div></body></html>";
    let index = scan(src, &mut XmlReader::new(src), 0).unwrap();
    assert_eq!(index.words.len(), 1);
    assert_eq!(index.words[0].text, b"Hi");
    assert_eq!(index.pages.len(), 1);
  }
}
