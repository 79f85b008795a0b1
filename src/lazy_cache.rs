//! [`LazyCache`] associates a lazily computed value with each live key.

use std::fmt::{self, Debug};
use std::ptr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::{Arc, Weak};

use sdd::{AtomicShared, Guard, Shared, Tag};

use super::error::Error;
use super::weak_table::link::Referent;
use super::weak_table::{identity_hash, WeakTable, DEFAULT_CAPACITY};

/// [`ComputeValue`] defines how a [`LazyCache`] derives the value of a key.
///
/// Each implementation is a kind of computation, and a [`LazyCache`] computes the value of a key at
/// most once until the key is removed. The computation is invoked while the cache is locked; it
/// may call [`LazyCache::get`] or [`LazyCache::remove`] on the same cache, including for the key
/// being computed, but it must not wait for another thread that uses the same cache.
///
/// Any `Fn(&Arc<K>) -> Result<V, E>` closure implements [`ComputeValue`].
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
/// use std::sync::Arc;
/// use weak_cache::{ComputeValue, LazyCache};
///
/// struct Len;
///
/// impl ComputeValue<String> for Len {
///     type Value = usize;
///     type Error = Infallible;
///
///     fn compute_value(
///         &self,
///         _cache: &LazyCache<String, Self>,
///         key: &Arc<String>,
///     ) -> Result<usize, Infallible> {
///         Ok(key.len())
///     }
/// }
///
/// let cache: LazyCache<String, Len> = LazyCache::new(Len);
/// let key = Arc::new(String::from("seven"));
/// assert_eq!(cache.get(&key), Ok(5));
/// ```
pub trait ComputeValue<K: Send + Sync + 'static>: Sized {
    /// The type of computed values.
    ///
    /// A value must not hold a strong reference to its own key: the entry keeps the value alive,
    /// so such a key is never cleared and the entry is only dropped by [`LazyCache::remove`].
    type Value: Clone + Send + Sync + 'static;

    /// The type of errors the computation returns.
    type Error;

    /// Computes the value of `key`.
    ///
    /// # Errors
    ///
    /// The error is returned to the caller of [`LazyCache::get`] as it is, and the key is left
    /// without a value.
    fn compute_value(
        &self,
        cache: &LazyCache<K, Self>,
        key: &Arc<K>,
    ) -> Result<Self::Value, Self::Error>;
}

impl<K, V, E, F> ComputeValue<K> for F
where
    K: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn(&Arc<K>) -> Result<V, E>,
{
    type Value = V;
    type Error = E;

    #[inline]
    fn compute_value(&self, _cache: &LazyCache<K, Self>, key: &Arc<K>) -> Result<V, E> {
        self(key)
    }
}

/// Weak-keyed concurrent cache of lazily computed values.
///
/// Keys are identified by the address of their [`Arc`], and the cache only refers to keys weakly,
/// though a value that holds its key keeps it alive (see [`ComputeValue::Value`]).
/// Once every [`Arc`] of a key is dropped, its entry is cleared and it is reclaimed when the
/// bucket chain is pruned or the cache is resized; the timing of this is not deterministic.
///
/// Reading a computed value does not acquire any lock. Creating an entry and computing its value
/// are serialized per cache instance.
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
/// use std::sync::Arc;
/// use weak_cache::LazyCache;
///
/// let cache = LazyCache::new(|key: &Arc<u64>| Ok::<_, Infallible>(**key * 2));
/// let key = Arc::new(21);
///
/// assert_eq!(cache.get(&key), Ok(42));
/// assert!(cache.remove(&key));
/// assert!(cache.peek(&key).is_none());
/// ```
pub struct LazyCache<K, C>
where
    K: Send + Sync + 'static,
    C: ComputeValue<K>,
{
    table: WeakTable<Arc<Entry<K, C::Value>>>,
    compute: C,
}

/// [`Entry`] is the cache slot of a key.
///
/// `generation` is even when there is no value, and it is odd when a value is installed.
pub(crate) struct Entry<K, V> {
    key: Weak<K>,
    value: AtomicShared<V>,
    generation: AtomicU64,
}

impl<K, C> LazyCache<K, C>
where
    K: Send + Sync + 'static,
    C: ComputeValue<K>,
{
    /// Creates an empty [`LazyCache`] with [`DEFAULT_CAPACITY`] buckets.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::LazyCache;
    ///
    /// let cache = LazyCache::new(|key: &Arc<String>| key.parse::<u32>());
    /// assert_eq!(cache.capacity(), 16);
    /// ```
    #[inline]
    pub fn new(compute: C) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, compute)
    }

    /// Creates an empty [`LazyCache`] with at least the specified number of buckets.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::LazyCache;
    ///
    /// let cache = LazyCache::with_capacity(1000, |key: &Arc<String>| key.parse::<u32>());
    /// assert_eq!(cache.capacity(), 1024);
    /// ```
    #[inline]
    pub fn with_capacity(capacity: usize, compute: C) -> Self {
        Self {
            table: WeakTable::with_capacity(capacity),
            compute,
        }
    }

    /// Returns the value of the key, computing it if the key has none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Computation`] if the computation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::{Error, LazyCache};
    ///
    /// let cache = LazyCache::new(|key: &Arc<String>| key.parse::<u32>());
    ///
    /// assert_eq!(cache.get(&Arc::new(String::from("17"))), Ok(17));
    /// assert!(matches!(cache.get(&Arc::new(String::from("x"))), Err(Error::Computation(_))));
    /// ```
    #[inline]
    pub fn get(&self, key: &Arc<K>) -> Result<C::Value, Error<C::Error>> {
        let hash = identity_hash(Arc::as_ptr(key));
        if let Some(value) = self
            .table
            .find(hash, |entry| entry.is_for(key))
            .and_then(|entry| entry.value())
        {
            return Ok(value);
        }
        self.locked_get(key, hash)
    }

    /// Returns the value of the key that the handle refers to, computing it if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullKey`] if the key has been dropped or the handle is dangling, and
    /// [`Error::Computation`] if the computation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::{Arc, Weak};
    /// use weak_cache::{Error, LazyCache};
    ///
    /// let cache = LazyCache::new(|key: &Arc<String>| key.parse::<u32>());
    ///
    /// assert_eq!(cache.get_weak(&Weak::new()), Err(Error::NullKey));
    /// ```
    #[inline]
    pub fn get_weak(&self, key: &Weak<K>) -> Result<C::Value, Error<C::Error>> {
        let key = key.upgrade().ok_or(Error::NullKey)?;
        self.get(&key)
    }

    /// Returns the value of the key if it has already been computed.
    ///
    /// It never computes a value and never acquires the lock.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::LazyCache;
    ///
    /// let cache = LazyCache::new(|key: &Arc<String>| key.parse::<u32>());
    /// let key = Arc::new(String::from("3"));
    ///
    /// assert!(cache.peek(&key).is_none());
    /// assert_eq!(cache.get(&key), Ok(3));
    /// assert_eq!(cache.peek(&key), Some(3));
    /// ```
    #[inline]
    pub fn peek(&self, key: &Arc<K>) -> Option<C::Value> {
        let hash = identity_hash(Arc::as_ptr(key));
        self.table
            .find(hash, |entry| entry.is_for(key))
            .and_then(|entry| entry.value())
    }

    /// Removes the value of the key so that the next [`get`](Self::get) computes it again.
    ///
    /// Returns `true` if a value was removed. A key whose value is being computed is left
    /// untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::LazyCache;
    ///
    /// let cache = LazyCache::new(|key: &Arc<String>| key.parse::<u32>());
    /// let key = Arc::new(String::from("3"));
    ///
    /// assert!(!cache.remove(&key));
    /// assert_eq!(cache.get(&key), Ok(3));
    /// assert!(cache.remove(&key));
    /// ```
    #[inline]
    pub fn remove(&self, key: &Arc<K>) -> bool {
        let hash = identity_hash(Arc::as_ptr(key));
        let locked = self.table.lock();
        let removed = self.table.remove(
            &locked,
            hash,
            |entry| entry.is_for(key),
            |entry| entry.is_initialized(),
        );
        removed.map_or(false, |entry| {
            entry.clear();
            true
        })
    }

    /// Returns the number of keys that have a value.
    ///
    /// The keys are counted without acquiring the lock, and therefore the result may be outdated
    /// when it is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::LazyCache;
    ///
    /// let cache = LazyCache::new(|key: &Arc<String>| key.parse::<u32>());
    /// let key = Arc::new(String::from("3"));
    ///
    /// assert_eq!(cache.get(&key), Ok(3));
    /// assert_eq!(cache.len(), 1);
    /// drop(key);
    /// assert_eq!(cache.len(), 0);
    /// ```
    #[inline]
    pub fn len(&self) -> usize {
        self.table.count_live(|entry| entry.is_initialized())
    }

    /// Returns `true` if no key has a value.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of buckets.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns a reference to the computation.
    #[inline]
    pub fn compute(&self) -> &C {
        &self.compute
    }

    /// Resolves the entry of the key under the lock, and computes its value if needed.
    ///
    /// If the entry is removed by the computation itself, the computed value is discarded and
    /// the whole process is repeated.
    fn locked_get(&self, key: &Arc<K>, hash: u64) -> Result<C::Value, Error<C::Error>> {
        let locked = self.table.lock();
        loop {
            let entry = self.table.resolve(
                &locked,
                hash,
                |entry| entry.is_for(key),
                || {
                    let entry = Arc::new(Entry::new(key));
                    (entry.clone(), entry)
                },
            );
            if let Some(value) = entry.value() {
                return Ok(value);
            }

            let generation = entry.generation.load(Acquire);
            let value = self
                .compute
                .compute_value(self, key)
                .map_err(Error::Computation)?;

            if let Some(value) = entry.value() {
                // The computation installed a value by calling `get` for the same key.
                return Ok(value);
            }
            if entry.generation.load(Acquire) != generation {
                log::trace!("entry removed during computation: generation {generation}");
                continue;
            }
            entry.install(value.clone());
            return Ok(value);
        }
    }
}

impl<K, C> Debug for LazyCache<K, C>
where
    K: Send + Sync + 'static,
    C: ComputeValue<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCache")
            .field("capacity", &self.capacity())
            .field("size_estimate", &self.table.size_estimate())
            .finish_non_exhaustive()
    }
}

impl<K, V> Entry<K, V>
where
    K: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(key: &Arc<K>) -> Self {
        Self {
            key: Arc::downgrade(key),
            value: AtomicShared::null(),
            generation: AtomicU64::new(0),
        }
    }

    #[inline]
    fn is_for(&self, key: &Arc<K>) -> bool {
        ptr::eq(self.key.as_ptr(), Arc::as_ptr(key))
    }

    #[inline]
    fn is_initialized(&self) -> bool {
        self.generation.load(Acquire) % 2 == 1
    }

    #[inline]
    fn value(&self) -> Option<V> {
        let guard = Guard::new();
        self.value.load(Acquire, &guard).as_ref().cloned()
    }

    /// Installs the value; the lock must be held.
    fn install(&self, value: V) {
        debug_assert_eq!(self.generation.load(Relaxed) % 2, 0);
        drop(self.value.swap((Some(Shared::new(value)), Tag::None), Release));
        self.generation.fetch_add(1, Release);
    }

    /// Drops the value; the lock must be held.
    fn clear(&self) {
        debug_assert_eq!(self.generation.load(Relaxed) % 2, 1);
        drop(self.value.swap((None, Tag::None), Release));
        self.generation.fetch_add(1, Release);
    }
}

impl<K, V> Referent for Arc<Entry<K, V>>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Strong = Self;

    #[inline]
    fn upgrade(&self) -> Option<Self> {
        if self.key.strong_count() == 0 {
            None
        } else {
            Some(self.clone())
        }
    }
}
