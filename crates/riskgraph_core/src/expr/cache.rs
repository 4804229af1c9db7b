//! Parsed-expression cache keyed by source text
//!
//! A plan parses each distinct expression once and shares the tree between
//! every node and edge that uses it.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::ast::Expr;
use super::parser::parse;
use crate::error::ParseError;

/// Memoises parsed expressions by source text.
///
/// Parse failures are not cached; they are reported on every lookup.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: FxHashMap<String, Arc<Expr>>,
}

impl ExpressionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(&mut self, src: &str) -> Result<Arc<Expr>, ParseError> {
        if let Some(expr) = self.entries.get(src) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parse(src)?);
        self.entries.insert(src.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_parsed_tree() {
        let mut cache = ExpressionCache::new();
        let a = cache.get_or_parse("1 + x").unwrap();
        let b = cache.get_or_parse("1 + x").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        assert!(cache.get_or_parse("1 +").is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_forgets_entries() {
        let mut cache = ExpressionCache::new();
        let first = cache.get_or_parse("$params.rate * 2").unwrap();
        cache.get_or_parse("value").unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        let again = cache.get_or_parse("$params.rate * 2").unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(*first, *again);
    }
}
