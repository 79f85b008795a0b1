use std::sync::{Arc, Weak};

use sdd::Shared;

/// [`Referent`] is what a [`Link`] refers to without keeping it alive.
///
/// A referent is cleared once the object it stands for becomes unreachable from outside the table,
/// after which [`Referent::upgrade`] keeps returning `None`.
pub(crate) trait Referent: Clone + Send + Sync + 'static {
    /// The strong handle handed out for a live referent.
    type Strong: Clone;

    /// Returns a strong handle if the referent has not been cleared.
    fn upgrade(&self) -> Option<Self::Strong>;
}

impl<T: Send + Sync + 'static> Referent for Weak<T> {
    type Strong = Arc<T>;

    #[inline]
    fn upgrade(&self) -> Option<Arc<T>> {
        Weak::upgrade(self)
    }
}

/// [`Link`] is a cell of a bucket chain.
///
/// Links are never modified once constructed; pruning and resizing build new links.
pub(crate) struct Link<R: Referent> {
    referent: R,
    hash: u64,
    next: Option<Shared<Link<R>>>,
}

impl<R: Referent> Link<R> {
    /// Creates a new [`Link`] in front of `next`.
    #[inline]
    pub(crate) fn new(referent: R, hash: u64, next: Option<Shared<Link<R>>>) -> Self {
        Self {
            referent,
            hash,
            next,
        }
    }

    /// Creates a new shared [`Link`] in front of `next`.
    #[inline]
    pub(crate) fn push_front(
        referent: R,
        hash: u64,
        next: Option<Shared<Link<R>>>,
    ) -> Option<Shared<Link<R>>> {
        Some(Shared::new(Self::new(referent, hash, next)))
    }

    /// Returns the weakly held referent.
    #[inline]
    pub(crate) const fn referent(&self) -> &R {
        &self.referent
    }

    /// Returns the hash value cached in the link.
    #[inline]
    pub(crate) const fn hash(&self) -> u64 {
        self.hash
    }

    /// Returns the next link in the chain.
    #[inline]
    pub(crate) fn next(&self) -> Option<&Link<R>> {
        self.next.as_deref()
    }

    /// Upgrades the referent if the cached hash is `hash` and the referent is live.
    #[inline]
    pub(crate) fn upgrade_if(&self, hash: u64) -> Option<R::Strong> {
        if self.hash == hash {
            self.referent.upgrade()
        } else {
            None
        }
    }
}
