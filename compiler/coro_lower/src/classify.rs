//! Reference-retention classifier.
//!
//! Answers whether a value of a type might keep heap objects alive. Slots
//! of such types are reset to their default value when their variable goes
//! out of scope, so a suspended machine does not extend the lifetime of
//! objects it will never read again.
//!
//! Uses memoization and cycle detection the same way for every compound
//! type: a struct is reference-retaining if any of its fields is.

use std::cell::RefCell;

use coro_types::{Idx, Layout, Pool, Tag};
use rustc_hash::{FxHashMap, FxHashSet};

/// Classifies types as possibly reference-retaining.
///
/// # Interior Mutability
///
/// Uses `RefCell` for the cache and the in-progress set so queries take
/// `&self` and can be made from anywhere the pool is borrowed.
pub struct RetentionClassifier<'pool> {
    pool: &'pool Pool,
    cache: RefCell<FxHashMap<Idx, bool>>,
    /// Types currently being classified. Meeting one again means a
    /// recursive layout, which is treated as retaining.
    classifying: RefCell<FxHashSet<Idx>>,
}

impl<'pool> RetentionClassifier<'pool> {
    pub fn new(pool: &'pool Pool) -> Self {
        Self {
            pool,
            cache: RefCell::new(FxHashMap::default()),
            classifying: RefCell::new(FxHashSet::default()),
        }
    }

    #[inline]
    pub fn pool(&self) -> &'pool Pool {
        self.pool
    }

    /// Whether a value of type `idx` might hold a reference.
    pub fn might_retain_references(&self, idx: Idx) -> bool {
        let tag = self.pool.tag(idx);
        if tag.is_plain_primitive() {
            return false;
        }

        if let Some(&cached) = self.cache.borrow().get(&idx) {
            return cached;
        }

        if !self.classifying.borrow_mut().insert(idx) {
            return true;
        }

        let result = self.classify_by_tag(idx, tag);

        self.classifying.borrow_mut().remove(&idx);
        self.cache.borrow_mut().insert(idx, result);
        result
    }

    fn classify_by_tag(&self, idx: Idx, tag: Tag) -> bool {
        match tag {
            Tag::Int | Tag::Float | Tag::Bool | Tag::Char | Tag::Byte | Tag::Unit => false,

            Tag::Str | Tag::Object | Tag::Dynamic | Tag::Class | Tag::Array => true,

            // Generic and typed-reference slots can hold anything.
            Tag::TypeParam | Tag::TypedReference => true,

            Tag::Struct if self.pool.layout(idx) == Layout::Opaque => true,
            Tag::Struct | Tag::Tuple => self
                .pool
                .fields(idx)
                .into_iter()
                .any(|field| self.might_retain_references(field)),

            Tag::Invalid => true,
        }
    }
}
