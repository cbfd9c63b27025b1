//! The hOCR `title` attribute microformat.
//!
//! A title value is a semicolon-separated list of fields, each a key
//! followed by a space-separated value running to the next `;` or the end:
//!
//! ```text
//! bbox 10 20 110 60; x_wconf 93
//! bbox 0 0 2480 3508; image "page_001.png"; ppageno 0
//! ```
//!
//! The codec never drops a field it does not recognize: decoding keeps every
//! key/value pair in order, and [`merge`] writes back everything it did not
//! overwrite byte-for-byte. Merging is a pure function, so identical inputs
//! always produce byte-identical output.

use indexmap::IndexMap;

use crate::bbox::Bbox;

/// Ordered key → value view of a decoded `title` value.
///
/// Duplicate keys keep the last occurrence; the earlier ones are lost. This
/// mirrors how consumers of the format read it and is the one place the
/// codec is deliberately lossy.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TitleFields {
  fields: IndexMap<Vec<u8>, Vec<u8>>,
}

impl TitleFields {
  pub fn new() -> Self {
    Self::default()
  }

  /// Decode a raw title value (without surrounding quotes).
  ///
  /// Surrounding whitespace of keys and values is insignificant. Fields
  /// without a value decode to an empty value.
  pub fn decode(raw: &[u8]) -> Self {
    let mut fields = IndexMap::new();
    for part in raw.split(|&b| b == b';') {
      let part = part.trim_ascii();
      if part.is_empty() {
        continue;
      }
      let (key, value) = match part.iter().position(|b| b.is_ascii_whitespace()) {
        Some(at) => (&part[..at], part[at..].trim_ascii_start()),
        None => (part, &b""[..]),
      };
      fields.insert(key.to_vec(), value.to_vec());
    }
    Self { fields }
  }

  /// Encode back to a raw title value.
  ///
  /// Fields are joined with `"; "`; a field with an empty value encodes as
  /// its bare key. Deterministic: the same fields always encode to the same
  /// bytes.
  pub fn encode(&self) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, (key, value)) in self.fields.iter().enumerate() {
      if i > 0 {
        out.extend_from_slice(b"; ");
      }
      out.extend_from_slice(key);
      if !value.is_empty() {
        out.push(b' ');
        out.extend_from_slice(value);
      }
    }
    out
  }

  pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
    self.fields.get(key).map(Vec::as_slice)
  }

  /// Insert or overwrite a field. An existing key keeps its position; a new
  /// key is appended at the end.
  pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
    self.fields.insert(key.to_vec(), value);
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
    self
      .fields
      .iter()
      .map(|(key, value)| (key.as_slice(), value.as_slice()))
  }

  /// The `bbox` field, when present and well-formed.
  pub fn bbox(&self) -> Option<Bbox> {
    self.get(b"bbox").and_then(|value| Bbox::parse(value).ok())
  }

  /// The `x_wconf` field, when present and an integer. The value is not
  /// range-checked.
  pub fn x_wconf(&self) -> Option<i32> {
    let value = self.get(b"x_wconf")?;
    std::str::from_utf8(value).ok()?.trim().parse().ok()
  }

  /// The `image "<path>"` field with the quotes stripped.
  pub fn image(&self) -> Option<&[u8]> {
    let value = self.get(b"image")?;
    Some(strip_quotes(value))
  }
}

/// Merge `updates` into an existing raw title value.
///
/// Keys already present are overwritten in place at their original position;
/// keys not previously present are appended at the end. Every other field
/// passes through byte-for-byte in its original relative order.
pub fn merge(existing: &[u8], updates: &TitleFields) -> Vec<u8> {
  let mut fields = TitleFields::decode(existing);
  for (key, value) in updates.iter() {
    fields.set(key, value.to_vec());
  }
  fields.encode()
}

fn strip_quotes(value: &[u8]) -> &[u8] {
  if value.len() >= 2 {
    let (first, last) = (value[0], value[value.len() - 1]);
    if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
      return &value[1..value.len() - 1];
    }
  }
  value
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn decode_ordered_fields() {
    let fields = TitleFields::decode(b"bbox 1 2 3 4; x_wconf 90");
    let keys: Vec<&[u8]> = fields.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec![&b"bbox"[..], &b"x_wconf"[..]]);
    assert_eq!(fields.get(b"bbox"), Some(&b"1 2 3 4"[..]));
    assert_eq!(fields.x_wconf(), Some(90));
  }

  #[test]
  fn decode_ignores_insignificant_whitespace() {
    let fields = TitleFields::decode(b"  bbox   1 2 3 4 ;x_wconf   90  ");
    assert_eq!(fields.bbox(), Some(Bbox::new(1, 2, 3, 4)));
    assert_eq!(fields.x_wconf(), Some(90));
  }

  #[test]
  fn decode_keeps_last_duplicate() {
    let fields = TitleFields::decode(b"x_wconf 10; x_wconf 20");
    assert_eq!(fields.len(), 1);
    assert_eq!(fields.x_wconf(), Some(20));
  }

  #[test]
  fn decode_bare_key_round_trips() {
    let fields = TitleFields::decode(b"bbox 1 2 3 4; nocr");
    assert_eq!(fields.get(b"nocr"), Some(&b""[..]));
    assert_eq!(fields.encode(), b"bbox 1 2 3 4; nocr");
  }

  #[test]
  fn image_path_quotes_are_stripped() {
    let fields = TitleFields::decode(b"bbox 0 0 100 200; image \"scans/p1.png\"");
    assert_eq!(fields.image(), Some(&b"scans/p1.png"[..]));
  }

  #[test]
  fn merge_preserves_unknown_fields_in_place() {
    let mut updates = TitleFields::new();
    updates.set(b"bbox", b"5 6 7 8".to_vec());

    let merged = merge(b"bbox 1 2 3 4; custom foo; x_wconf 90", &updates);
    assert_eq!(merged, b"bbox 5 6 7 8; custom foo; x_wconf 90");
  }

  #[test]
  fn merge_appends_new_keys_at_the_end() {
    let mut updates = TitleFields::new();
    updates.set(b"x_wconf", b"42".to_vec());

    let merged = merge(b"bbox 1 2 3 4; custom foo", &updates);
    assert_eq!(merged, b"bbox 1 2 3 4; custom foo; x_wconf 42");
  }

  #[test]
  fn merge_is_pure() {
    let mut updates = TitleFields::new();
    updates.set(b"bbox", b"5 6 7 8".to_vec());

    let existing = b"bbox 1 2 3 4; custom foo; x_wconf 90";
    assert_eq!(merge(existing, &updates), merge(existing, &updates));
  }

  #[test]
  fn merge_of_identical_value_is_byte_identical() {
    let mut updates = TitleFields::new();
    updates.set(b"bbox", b"1 2 3 4".to_vec());

    let existing = b"bbox 1 2 3 4; custom foo";
    assert_eq!(merge(existing, &updates), existing);
  }
}
