#![warn(missing_docs, clippy::all)]

//! Weak-keyed concurrent caches.
//!
//! Both containers are built on a hash table of weakly referenced entries: lookups walk immutable
//! bucket chains without acquiring any lock, whereas creating entries, pruning cleared links and
//! resizing the table are serialized by a per-instance lock. The table only refers to keys weakly;
//! once the objects entries stand for become unreachable, the entries are dropped the next time
//! their chain is pruned or the table is resized. A cached value that holds its own key keeps that
//! key reachable, so such an entry stays until it is removed.
//!
//! # [`LazyCache`]
//! A cache that computes a value for a key on first access, and computes it only once until the
//! key is removed.
//!
//! # [`Interner`]
//! An interner that hands out a single canonical instance for each distinct composite value, e.g.,
//! a [`Signature`].

mod error;
pub use error::{Error, SignatureError};

mod interner;
pub use interner::{Intern, Interner};

mod lazy_cache;
pub use lazy_cache::{ComputeValue, LazyCache};

mod signature;
pub use signature::{Signature, SignatureKey};

mod weak_table;
pub use weak_table::DEFAULT_CAPACITY;
