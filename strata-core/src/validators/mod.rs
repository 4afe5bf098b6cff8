//! Built-in validators registered with the default term registry:
//! enumeration (and its single-value `const` form), regular-expression
//! patterns, and the named-format table.

mod enum_;
mod format;
mod pattern;

pub use enum_::EnumValidator;
pub use format::{known_format, FormatValidator};
pub use pattern::PatternValidator;
