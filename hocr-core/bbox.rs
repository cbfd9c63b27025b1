//! Word and page bounding boxes.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BboxError {
  #[error("expected 4 integers, got {got}")]
  Arity { got: usize },
  #[error("invalid integer {token:?}")]
  Integer { token: String },
}

/// Bounding box in page pixel coordinates.
///
/// Negative values are tolerated at parse time even though page coordinates
/// are semantically non-negative; hand-edited documents contain them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Bbox {
  pub x0: i32,
  pub y0: i32,
  pub x1: i32,
  pub y1: i32,
}

impl Bbox {
  pub const ZERO: Self = Self::new(0, 0, 0, 0);

  pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
    Self { x0, y0, x1, y1 }
  }

  /// Parse a `title` field value such as `10 20 110 60`.
  ///
  /// Exactly four whitespace-separated integers are required.
  pub fn parse(value: &[u8]) -> Result<Self, BboxError> {
    let tokens: Vec<&[u8]> = value
      .split(|b| b.is_ascii_whitespace())
      .filter(|token| !token.is_empty())
      .collect();

    if tokens.len() != 4 {
      return Err(BboxError::Arity { got: tokens.len() });
    }

    let mut coords = [0i32; 4];
    for (coord, token) in coords.iter_mut().zip(&tokens) {
      *coord = std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BboxError::Integer {
          token: String::from_utf8_lossy(token).into_owned(),
        })?;
    }

    Ok(Self::new(coords[0], coords[1], coords[2], coords[3]))
  }
}

impl fmt::Display for Bbox {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {} {}", self.x0, self.y0, self.x1, self.y1)
  }
}
