//! [`Interner`] canonicalizes immutable values so that equal values share a single instance.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use super::weak_table::{WeakTable, DEFAULT_CAPACITY};

/// [`Intern`] is implemented by immutable types that can be canonicalized by an [`Interner`].
///
/// A value is built from a borrowed key, and two keys that are equal must yield values that are
/// interchangeable. Construction must be cheap and free of side effects since it happens while the
/// [`Interner`] is locked.
pub trait Intern: Send + Sync + 'static {
    /// The borrowed form from which values are built.
    type Key<'k>: Copy;

    /// Returns the hash value of the key.
    ///
    /// It must be equal to the hash value of any key the value matches.
    fn key_hash(key: Self::Key<'_>) -> u64;

    /// Returns `true` if `self` is the interned form of `key`.
    fn matches(&self, key: Self::Key<'_>) -> bool;

    /// Builds a new value out of `key`.
    fn from_key(key: Self::Key<'_>) -> Self;
}

/// Concurrent interner of immutable values.
///
/// The [`Interner`] only holds weak references to interned values: a value is reclaimed once
/// every [`Arc`] handed out for it is dropped, and the next request builds a new one.
///
/// Looking up a value that is already interned does not acquire any lock.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use weak_cache::{Interner, Signature};
///
/// let interner: Interner<Signature<&'static str>> = Interner::new();
/// let int = Arc::new("int");
/// let long = Arc::new("long");
///
/// let first = interner.signature(&int, &[long.clone(), int.clone()]);
/// let second = interner.signature(&int, &[long.clone(), int.clone()]);
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
pub struct Interner<T: Intern> {
    table: WeakTable<Weak<T>>,
}

impl<T: Intern> Interner<T> {
    /// Creates an empty [`Interner`] with [`DEFAULT_CAPACITY`] buckets.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty [`Interner`] with at least the specified number of buckets.
    ///
    /// # Examples
    ///
    /// ```
    /// use weak_cache::{Interner, Signature};
    ///
    /// let interner: Interner<Signature<u8>> = Interner::with_capacity(100);
    /// assert_eq!(interner.capacity(), 128);
    /// ```
    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: WeakTable::with_capacity(capacity),
        }
    }

    /// Returns the canonical value of the key, building it if it does not exist.
    #[inline]
    pub fn intern(&self, key: T::Key<'_>) -> Arc<T> {
        let hash = T::key_hash(key);
        if let Some(value) = self.table.find(hash, |value| value.matches(key)) {
            return value;
        }
        let locked = self.table.lock();
        self.table.resolve(
            &locked,
            hash,
            |value| value.matches(key),
            || {
                let value = Arc::new(T::from_key(key));
                (Arc::downgrade(&value), value)
            },
        )
    }

    /// Returns the number of live values.
    ///
    /// The result may be outdated when it is returned.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.count_live(|_| true)
    }

    /// Returns `true` if there are no live values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of buckets.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }
}

impl<T: Intern> Debug for Interner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner")
            .field("capacity", &self.capacity())
            .field("size_estimate", &self.table.size_estimate())
            .finish_non_exhaustive()
    }
}

impl<T: Intern> Default for Interner<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
