use std::sync::atomic::Ordering::{Acquire, Release};

use sdd::{AtomicShared, Guard, Shared, Tag};

use super::link::{Link, Referent};

/// [`BucketArray`] is a fixed-length array of bucket chain heads.
///
/// The length is always a power of two. A [`BucketArray`] that replaces another one is fully
/// built before it is published.
pub(crate) struct BucketArray<R: Referent> {
    heads: Box<[AtomicShared<Link<R>>]>,
}

impl<R: Referent> BucketArray<R> {
    /// Creates an empty [`BucketArray`] of `len` buckets.
    pub(crate) fn new(len: usize) -> Self {
        debug_assert!(len.is_power_of_two());
        Self {
            heads: (0..len).map(|_| AtomicShared::null()).collect(),
        }
    }

    /// Creates a [`BucketArray`] out of chains built in private.
    pub(crate) fn from_chains(chains: Vec<Option<Shared<Link<R>>>>) -> Self {
        debug_assert!(chains.len().is_power_of_two());
        Self {
            heads: chains
                .into_iter()
                .map(|chain| chain.map_or_else(AtomicShared::null, AtomicShared::from))
                .collect(),
        }
    }

    /// Returns the number of buckets.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.heads.len()
    }

    /// Calculates the bucket index for the hash value.
    #[allow(clippy::cast_possible_truncation)] // Intended truncation.
    #[inline]
    pub(crate) fn calculate_bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.heads.len() - 1)
    }

    /// Returns the first link of the chain at `index`.
    #[inline]
    pub(crate) fn head<'g>(&self, index: usize, guard: &'g Guard) -> Option<&'g Link<R>> {
        self.heads[index].load(Acquire, guard).as_ref()
    }

    /// Replaces the chain at `index`.
    ///
    /// The replaced chain is not modified, and it is reclaimed once no readers can reach it.
    #[inline]
    pub(crate) fn install(&self, index: usize, chain: Option<Shared<Link<R>>>) {
        drop(self.heads[index].swap((chain, Tag::None), Release));
    }
}
