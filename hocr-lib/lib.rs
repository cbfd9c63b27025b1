use smartstring::{LazyCompact, SmartString};

pub mod document;
pub mod editor;
pub mod history;
mod index;
pub mod reader;
pub mod record;

pub type Tendril = SmartString<LazyCompact>;
