//! Dialect detection and pull-based markup readers.
//!
//! hOCR arrives as either plain HTML or XHTML. Both dialects are lexed with
//! `quick_xml`, configured strictly for XML and leniently for HTML; the
//! differences are hidden behind the [`DialectReader`] capability trait so
//! the indexing algorithm in [`crate::index`] is written exactly once.
//!
//! Every event carries document provenance: the byte range of the tag or
//! text run, and for attributes the byte range of the value with its quotes
//! excluded. These ranges are what makes minimal-diff editing possible.

use hocr_core::span::Span;
use quick_xml::{
  Reader,
  events::{
    BytesStart,
    Event,
  },
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReadError>;

#[derive(Debug, Error)]
pub enum ReadError {
  #[error("{dialect} parse error at byte {offset}: {source}")]
  Parse {
    dialect: Dialect,
    offset:  usize,
    #[source]
    source:  quick_xml::Error,
  },
}

/// Markup dialect of a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
  Html,
  Xml,
}

/// How far [`Dialect::detect`] looks into the buffer. Detection cost is
/// bounded regardless of document size.
const DETECT_WINDOW: usize = 2048;

impl Dialect {
  /// Detect the dialect from a bounded prefix of the buffer.
  ///
  /// An `<?xml` prolog or an XHTML namespace token within the first 2 KiB
  /// (after leading whitespace) selects XML; everything else is HTML.
  pub fn detect(source: &[u8]) -> Self {
    let head = source.trim_ascii_start();
    let head = &head[..head.len().min(DETECT_WINDOW)];
    if head.starts_with(b"<?xml") {
      return Self::Xml;
    }
    if contains(head, b"http://www.w3.org/1999/xhtml") || contains(head, b"xmlns=") {
      return Self::Xml;
    }
    Self::Html
  }
}

impl std::fmt::Display for Dialect {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Html => f.write_str("html"),
      Self::Xml => f.write_str("xml"),
    }
  }
}

/// One markup event with document provenance.
#[derive(Debug)]
pub enum MarkupEvent {
  /// An opening (or self-closing) tag; `range` covers `<` through `>`.
  Open(OpenTag),
  /// A closing tag. Unmatched close tags in the HTML dialect are still
  /// reported; recovery is the consumer's call.
  Close(CloseTag),
  /// A raw text run directly between tags.
  Text(TextRun),
  Eof,
}

#[derive(Debug)]
pub struct OpenTag {
  /// Tag name, ASCII-lowercased. hOCR class contracts are case-insensitive
  /// on the tag.
  pub name:         Vec<u8>,
  pub range:        Span,
  pub attrs:        Vec<RawAttr>,
  pub self_closing: bool,
}

impl OpenTag {
  /// First attribute with the given (exact) name.
  pub fn attr(&self, name: &[u8]) -> Option<&RawAttr> {
    self.attrs.iter().find(|attr| attr.name == name)
  }
}

#[derive(Debug)]
pub struct CloseTag {
  pub name:  Vec<u8>,
  pub range: Span,
}

#[derive(Debug)]
pub struct TextRun {
  pub range: Span,
}

#[derive(Debug)]
pub struct RawAttr {
  pub name:       Vec<u8>,
  /// Raw value bytes, quotes excluded, entities untouched.
  pub value:      Vec<u8>,
  /// Byte range of `value` in the source buffer. Zero-length at the tag
  /// start when the value is not addressable (bare HTML attributes).
  pub value_span: Span,
}

/// Pull interface the syntax index consumes. One implementation per dialect.
pub trait DialectReader {
  fn dialect(&self) -> Dialect;
  fn next(&mut self) -> Result<MarkupEvent>;
}

/// Lenient HTML reader: mismatched and unmatched end tags are passed
/// through for name-based recovery, attributes may be unquoted or bare.
pub struct HtmlReader<'a> {
  inner: RawReader<'a>,
}

impl<'a> HtmlReader<'a> {
  pub fn new(source: &'a [u8]) -> Self {
    let mut reader = Reader::from_reader(source);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    Self {
      inner: RawReader {
        source,
        reader,
        dialect: Dialect::Html,
      },
    }
  }
}

impl DialectReader for HtmlReader<'_> {
  fn dialect(&self) -> Dialect {
    Dialect::Html
  }

  fn next(&mut self) -> Result<MarkupEvent> {
    self.inner.next()
  }
}

/// Strict XML reader: malformed input is a hard parse failure.
pub struct XmlReader<'a> {
  inner: RawReader<'a>,
}

impl<'a> XmlReader<'a> {
  pub fn new(source: &'a [u8]) -> Self {
    Self {
      inner: RawReader {
        source,
        reader: Reader::from_reader(source),
        dialect: Dialect::Xml,
      },
    }
  }
}

impl DialectReader for XmlReader<'_> {
  fn dialect(&self) -> Dialect {
    Dialect::Xml
  }

  fn next(&mut self) -> Result<MarkupEvent> {
    self.inner.next()
  }
}

struct RawReader<'a> {
  source:  &'a [u8],
  reader:  Reader<&'a [u8]>,
  dialect: Dialect,
}

impl RawReader<'_> {
  fn next(&mut self) -> Result<MarkupEvent> {
    loop {
      let start = self.reader.buffer_position() as usize;
      let event = self.reader.read_event().map_err(|source| ReadError::Parse {
        dialect: self.dialect,
        offset: self.reader.error_position() as usize,
        source,
      })?;
      let end = self.reader.buffer_position() as usize;
      let range = Span::new(start, end);

      match event {
        Event::Start(tag) => return Ok(MarkupEvent::Open(self.open_tag(&tag, range, false)?)),
        Event::Empty(tag) => return Ok(MarkupEvent::Open(self.open_tag(&tag, range, true)?)),
        Event::End(tag) => {
          return Ok(MarkupEvent::Close(CloseTag {
            name: tag.name().as_ref().to_ascii_lowercase(),
            range,
          }));
        },
        Event::Text(_) => return Ok(MarkupEvent::Text(TextRun { range })),
        Event::Eof => return Ok(MarkupEvent::Eof),
        // Declarations, doctypes, comments, CDATA and processing
        // instructions carry no word or page content.
        _ => {},
      }
    }
  }

  fn open_tag(&self, tag: &BytesStart<'_>, range: Span, self_closing: bool) -> Result<OpenTag> {
    let name = tag.name().as_ref().to_ascii_lowercase();
    let mut attrs = Vec::new();

    let iter = match self.dialect {
      Dialect::Html => tag.html_attributes(),
      Dialect::Xml => tag.attributes(),
    };
    for attr in iter {
      let attr = match attr {
        Ok(attr) => attr,
        // html_attributes is already lenient; whatever it still rejects
        // cannot be addressed, so attribute extraction stops here.
        Err(_) if self.dialect == Dialect::Html => break,
        Err(source) => {
          return Err(ReadError::Parse {
            dialect: self.dialect,
            offset:  range.start,
            source:  source.into(),
          });
        },
      };

      let value_span =
        subslice_span(self.source, attr.value.as_ref()).unwrap_or(Span::empty_at(range.start));
      attrs.push(RawAttr {
        name: attr.key.as_ref().to_vec(),
        value: attr.value.into_owned(),
        value_span,
      });
    }

    Ok(OpenTag {
      name,
      range,
      attrs,
      self_closing,
    })
  }
}

/// Byte range of `sub` within `base`, when `sub` is a subslice of `base`.
///
/// The borrowed `quick_xml` events alias the source buffer, so the position
/// of an attribute value is recoverable from the slice itself.
fn subslice_span(base: &[u8], sub: &[u8]) -> Option<Span> {
  let start = (sub.as_ptr() as usize).checked_sub(base.as_ptr() as usize)?;
  let end = start.checked_add(sub.len())?;
  (end <= base.len()).then_some(Span::new(start, end))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
  haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn detect_xml_prolog() {
    assert_eq!(
      Dialect::detect(b"\n  <?xml version=\"1.0\"?><html/>"),
      Dialect::Xml
    );
  }

  #[test]
  fn detect_xhtml_namespace() {
    let src = b"<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\">";
    assert_eq!(Dialect::detect(src), Dialect::Xml);
  }

  #[test]
  fn detect_defaults_to_html() {
    assert_eq!(Dialect::detect(b"<!DOCTYPE html>\n<html lang=\"en\">"), Dialect::Html);
  }

  #[test]
  fn detection_window_is_bounded() {
    // The namespace token beyond the window must not flip the dialect.
    let mut src = Vec::new();
    src.extend_from_slice(b"<!DOCTYPE html><html><head>");
    src.extend_from_slice(&vec![b'x'; DETECT_WINDOW]);
    src.extend_from_slice(b"xmlns=\"http://www.w3.org/1999/xhtml\"");
    assert_eq!(Dialect::detect(&src), Dialect::Html);
  }

  #[test]
  fn open_tag_ranges_and_attribute_spans() {
    let src = b"<span id=\"w1\" title=\"bbox 1 2 3 4\">Hi</span>";
    let mut reader = HtmlReader::new(src);

    let MarkupEvent::Open(tag) = reader.next().unwrap() else {
      panic!("expected open tag");
    };
    assert_eq!(tag.name, b"span");
    assert_eq!(tag.range, Span::new(0, 35));

    let id = tag.attr(b"id").unwrap();
    assert_eq!(id.value, b"w1");
    assert_eq!(id.value_span.get(src), Some(&b"w1"[..]));

    let title = tag.attr(b"title").unwrap();
    assert_eq!(title.value_span.get(src), Some(&b"bbox 1 2 3 4"[..]));

    let MarkupEvent::Text(text) = reader.next().unwrap() else {
      panic!("expected text");
    };
    assert_eq!(text.range.get(src), Some(&b"Hi"[..]));

    let MarkupEvent::Close(close) = reader.next().unwrap() else {
      panic!("expected close tag");
    };
    assert_eq!(close.range.get(src), Some(&b"</span>"[..]));
    assert!(matches!(reader.next().unwrap(), MarkupEvent::Eof));
  }

  #[test]
  fn html_tolerates_unquoted_attributes() {
    let src = b"<meta charset=utf-8><span class=ocrx_word>x</span>";
    let mut reader = HtmlReader::new(src);

    let MarkupEvent::Open(meta) = reader.next().unwrap() else {
      panic!("expected open tag");
    };
    assert_eq!(meta.attr(b"charset").unwrap().value, b"utf-8");

    let MarkupEvent::Open(span) = reader.next().unwrap() else {
      panic!("expected open tag");
    };
    assert_eq!(span.attr(b"class").unwrap().value, b"ocrx_word");
  }

  #[test]
  fn xml_fails_hard_on_unmatched_end() {
    let src = b"<p><span>x</div></p>";
    let mut reader = XmlReader::new(src);
    let err = loop {
      match reader.next() {
        Ok(MarkupEvent::Eof) => panic!("expected a parse failure"),
        Ok(_) => continue,
        Err(err) => break err,
      }
    };
    assert!(matches!(err, ReadError::Parse { dialect: Dialect::Xml, .. }));
  }

  #[test]
  fn html_passes_mismatched_ends_through() {
    let src = b"<p><span>x</div></p>";
    let mut reader = HtmlReader::new(src);
    let mut closes = 0;
    loop {
      match reader.next().unwrap() {
        MarkupEvent::Close(_) => closes += 1,
        MarkupEvent::Eof => break,
        _ => {},
      }
    }
    assert_eq!(closes, 2);
  }
}
