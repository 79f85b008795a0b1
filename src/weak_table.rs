pub(crate) mod bucket_array;
pub(crate) mod link;

use std::ptr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use sdd::{AtomicShared, Guard, Shared, Tag};

use bucket_array::BucketArray;
use link::{Link, Referent};

/// The default number of buckets.
pub const DEFAULT_CAPACITY: usize = 16;

/// Returns the hash value of the address of an object.
///
/// Addresses are aligned, so the low bits are mixed with the high bits before they are used as
/// a bucket index.
#[inline]
pub(crate) fn identity_hash<T: ?Sized>(ptr: *const T) -> u64 {
    let hash = (ptr.cast::<()>() as usize as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    hash ^ (hash >> 32)
}

/// [`WeakTable`] is a hash table of weakly referenced entries.
///
/// Lookups never block: they load the published [`BucketArray`] once, and walk immutable chains.
/// Creation, pruning, resizing and removal of entries are serialized by a per-table re-entrant
/// lock, and every change is made visible by a release store of a fully built chain or array.
///
/// `size` may overcount live entries since cleared links are only dropped when their chain is
/// pruned or the table is resized.
pub(crate) struct WeakTable<R: Referent> {
    array: AtomicShared<BucketArray<R>>,
    size: AtomicUsize,
    initial_capacity: usize,
    lock: ReentrantMutex<()>,
}

/// [`Locked`] proves that the lock of a [`WeakTable`] is held.
pub(crate) struct Locked<'t, R: Referent> {
    table: &'t WeakTable<R>,
    _guard: ReentrantMutexGuard<'t, ()>,
}

impl<R: Referent> WeakTable<R> {
    /// Creates an empty [`WeakTable`].
    ///
    /// The bucket array is allocated on the first locked operation.
    #[inline]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            array: AtomicShared::null(),
            size: AtomicUsize::new(0),
            initial_capacity: capacity
                .max(DEFAULT_CAPACITY)
                .min(1_usize << (usize::BITS - 2))
                .next_power_of_two(),
            lock: ReentrantMutex::new(()),
        }
    }

    /// Acquires the table lock.
    ///
    /// The same thread may acquire it again while holding it.
    #[inline]
    pub(crate) fn lock(&self) -> Locked<'_, R> {
        Locked {
            table: self,
            _guard: self.lock.lock(),
        }
    }

    /// Returns the number of buckets.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        let guard = Guard::new();
        self.array
            .load(Acquire, &guard)
            .as_ref()
            .map_or(self.initial_capacity, BucketArray::len)
    }

    /// Returns the estimated number of entries, including the ones that have not been pruned.
    #[inline]
    pub(crate) fn size_estimate(&self) -> usize {
        self.size.load(Relaxed)
    }

    /// Counts live entries satisfying `pred` without acquiring the lock.
    pub(crate) fn count_live<P: FnMut(&R::Strong) -> bool>(&self, mut pred: P) -> usize {
        let guard = Guard::new();
        let Some(array) = self.array.load(Acquire, &guard).as_ref() else {
            return 0;
        };
        let mut count = 0;
        for index in 0..array.len() {
            let mut cursor = array.head(index, &guard);
            while let Some(link) = cursor {
                cursor = link.next();
                if link.referent().upgrade().is_some_and(|strong| pred(&strong)) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Finds a live entry without acquiring the lock.
    ///
    /// Returns the first live entry in the chain of `hash` that `matches`; cleared links are
    /// skipped and left for the locked path to prune.
    #[inline]
    pub(crate) fn find<M: FnMut(&R::Strong) -> bool>(
        &self,
        hash: u64,
        mut matches: M,
    ) -> Option<R::Strong> {
        let guard = Guard::new();
        let array = self.array.load(Acquire, &guard).as_ref()?;
        let mut cursor = array.head(array.calculate_bucket_index(hash), &guard);
        while let Some(link) = cursor {
            if let Some(strong) = link.upgrade_if(hash) {
                if matches(&strong) {
                    return Some(strong);
                }
            }
            cursor = link.next();
        }
        None
    }

    /// Returns the live entry that `matches`, or installs the one made by `make`.
    ///
    /// Depending on the load, the table is either resized, or only the chain of `hash` is pruned.
    /// `make` returns the referent to be linked and the strong handle to be returned.
    pub(crate) fn resolve<M, F>(
        &self,
        locked: &Locked<'_, R>,
        hash: u64,
        matches: M,
        make: F,
    ) -> R::Strong
    where
        M: FnMut(&R::Strong) -> bool,
        F: FnOnce() -> (R, R::Strong),
    {
        debug_assert!(ptr::eq(locked.table, self));
        let guard = Guard::new();
        let array = self.current_array(&guard);
        if self.size.load(Relaxed) >= array.len() >> 1 {
            self.resize(array, hash, matches, make, &guard)
        } else {
            self.prune(array, hash, matches, make, &guard)
        }
    }

    /// Unlinks the live entry of `hash` that `matches` if `removable` allows it.
    ///
    /// Cleared links in the chain are dropped along the way. Returns the unlinked entry.
    pub(crate) fn remove<M, P>(
        &self,
        locked: &Locked<'_, R>,
        hash: u64,
        mut matches: M,
        mut removable: P,
    ) -> Option<R::Strong>
    where
        M: FnMut(&R::Strong) -> bool,
        P: FnMut(&R::Strong) -> bool,
    {
        debug_assert!(ptr::eq(locked.table, self));
        let guard = Guard::new();
        let array = self.array.load(Acquire, &guard).as_ref()?;
        let index = array.calculate_bucket_index(hash);

        let mut size = self.size.load(Relaxed);
        let mut dropped = 0;
        let mut removed = None;
        let mut rebuilt = None;
        let mut cursor = array.head(index, &guard);
        while let Some(link) = cursor {
            cursor = link.next();
            let Some(strong) = link.referent().upgrade() else {
                size = size.saturating_sub(1);
                dropped += 1;
                continue;
            };
            if link.hash() == hash && matches(&strong) && removable(&strong) {
                debug_assert!(removed.is_none(), "two live entries for the same key");
                size = size.saturating_sub(1);
                removed = Some(strong);
                continue;
            }
            rebuilt = Link::push_front(link.referent().clone(), link.hash(), rebuilt);
        }

        if dropped != 0 || removed.is_some() {
            log::trace!("chain {index} rebuilt on removal: {dropped} cleared link(s) dropped");
            array.install(index, rebuilt);
            self.size.store(size, Relaxed);
        }
        removed
    }

    /// Returns the current [`BucketArray`], allocating one if there is none yet.
    fn current_array<'g>(&self, guard: &'g Guard) -> &'g BucketArray<R> {
        if let Some(array) = self.array.load(Acquire, guard).as_ref() {
            return array;
        }
        let array = Shared::new(BucketArray::new(self.initial_capacity));
        let array_ref = array.get_guarded_ref(guard);
        drop(self.array.swap((Some(array), Tag::None), Release));
        array_ref
    }

    /// Doubles the number of buckets, dropping every cleared link along the way.
    fn resize<M, F>(
        &self,
        array: &BucketArray<R>,
        hash: u64,
        mut matches: M,
        make: F,
        guard: &Guard,
    ) -> R::Strong
    where
        M: FnMut(&R::Strong) -> bool,
        F: FnOnce() -> (R, R::Strong),
    {
        let new_len = array.len() << 1;
        let mask = (new_len - 1) as u64;
        let mut chains: Vec<Option<Shared<Link<R>>>> = (0..new_len).map(|_| None).collect();

        let mut size = 0;
        let mut found = None;
        for index in 0..array.len() {
            let mut cursor = array.head(index, guard);
            while let Some(link) = cursor {
                cursor = link.next();
                let Some(strong) = link.referent().upgrade() else {
                    continue;
                };
                if link.hash() == hash && matches(&strong) {
                    debug_assert!(found.is_none(), "two live entries for the same key");
                    found = Some(strong);
                }
                #[allow(clippy::cast_possible_truncation)] // Masked.
                let chain = &mut chains[(link.hash() & mask) as usize];
                *chain = Link::push_front(link.referent().clone(), link.hash(), chain.take());
                size += 1;
            }
        }

        let resolved = found.unwrap_or_else(|| {
            let (referent, strong) = make();
            #[allow(clippy::cast_possible_truncation)] // Masked.
            let chain = &mut chains[(hash & mask) as usize];
            *chain = Link::push_front(referent, hash, chain.take());
            size += 1;
            strong
        });

        log::debug!(
            "bucket array resized: {} -> {new_len} buckets, {size} live entries",
            array.len()
        );
        let new_array = Shared::new(BucketArray::from_chains(chains));
        drop(self.array.swap((Some(new_array), Tag::None), Release));
        self.size.store(size, Relaxed);
        resolved
    }

    /// Rebuilds the chain of `hash` without cleared links.
    ///
    /// If a matching entry is found midway, it is returned and the chain is left as it is; a later
    /// operation prunes it.
    fn prune<M, F>(
        &self,
        array: &BucketArray<R>,
        hash: u64,
        mut matches: M,
        make: F,
        guard: &Guard,
    ) -> R::Strong
    where
        M: FnMut(&R::Strong) -> bool,
        F: FnOnce() -> (R, R::Strong),
    {
        let index = array.calculate_bucket_index(hash);
        let mut size = self.size.load(Relaxed);
        let mut rebuilt = None;
        let mut cursor = array.head(index, guard);
        while let Some(link) = cursor {
            cursor = link.next();
            let Some(strong) = link.referent().upgrade() else {
                size = size.saturating_sub(1);
                continue;
            };
            if link.hash() == hash && matches(&strong) {
                return strong;
            }
            rebuilt = Link::push_front(link.referent().clone(), link.hash(), rebuilt);
        }

        let (referent, strong) = make();
        array.install(index, Link::push_front(referent, hash, rebuilt));
        self.size.store(size + 1, Relaxed);
        strong
    }
}

impl<R: Referent> Default for WeakTable<R> {
    #[inline]
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
