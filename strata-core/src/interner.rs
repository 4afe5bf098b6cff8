//! String interner for term IRIs.
//!
//! Term IRIs are used as property-map keys throughout; interning keeps
//! a single allocation per distinct IRI so equal IRIs are also
//! pointer-equal. The interner is thread-compatible but assumes a
//! single writer, which matches the single-threaded pipeline model.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use ahash::RandomState;

/// Deduplicates strings into shared `Arc<str>` handles.
#[derive(Debug, Default)]
pub struct Interner {
    strings: RefCell<HashSet<Arc<str>, RandomState>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical handle for `s`, allocating it on first
    /// sight.
    pub fn intern(&self, s: &str) -> Arc<str> {
        let mut strings = self.strings.borrow_mut();
        if let Some(existing) = strings.get(s) {
            return existing.clone();
        }
        let handle: Arc<str> = Arc::from(s);
        strings.insert(handle.clone());
        handle
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.strings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let interner = Interner::new();
        let a = interner.intern("https://example.com/a");
        let b = interner.intern("https://example.com/a");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
        let c = interner.intern("https://example.com/b");
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(interner.len(), 2);
    }
}
