//! [`Signature`] is a canonical composite of a return component and parameter components.

use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use super::error::SignatureError;
use super::interner::{Intern, Interner};
use super::weak_table::identity_hash;

/// Immutable signature made of a return component and a sequence of parameter components.
///
/// Components are compared by identity, therefore two signatures are equal if and only if they
/// refer to the same component instances in the same order. Signatures are only built by an
/// [`Interner`], so equal signatures obtained from the same [`Interner`] are the same instance.
pub struct Signature<C> {
    ret: Arc<C>,
    params: Box<[Arc<C>]>,
}

/// [`SignatureKey`] is the borrowed form of a [`Signature`].
pub struct SignatureKey<'k, C> {
    /// The return component.
    pub ret: &'k Arc<C>,
    /// The parameter components.
    pub params: &'k [Arc<C>],
}

impl<C> Signature<C> {
    /// Returns the return component.
    #[inline]
    pub fn ret(&self) -> &Arc<C> {
        &self.ret
    }

    /// Returns the parameter component at the index.
    #[inline]
    pub fn param(&self, index: usize) -> Option<&Arc<C>> {
        self.params.get(index)
    }

    /// Returns the number of parameter components.
    #[inline]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Returns the parameter components.
    #[inline]
    pub fn params(&self) -> &[Arc<C>] {
        &self.params
    }

    /// Returns a copy of the parameter components.
    #[inline]
    pub fn to_vec(&self) -> Vec<Arc<C>> {
        self.params.to_vec()
    }

    /// Returns the borrowed form of the signature.
    #[inline]
    pub fn as_key(&self) -> SignatureKey<'_, C> {
        SignatureKey {
            ret: &self.ret,
            params: &self.params,
        }
    }
}

impl<C> Clone for SignatureKey<'_, C> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for SignatureKey<'_, C> {}

impl<C> SignatureKey<'_, C> {
    /// Combines the identity hash values of the components.
    ///
    /// The hash value of the return component is the seed, and each parameter is folded in order.
    fn hash_value(self) -> u64 {
        self.params.iter().fold(identity_hash(Arc::as_ptr(self.ret)), |hash, param| {
            hash.wrapping_mul(31)
                .wrapping_add(identity_hash(Arc::as_ptr(param)))
        })
    }

    fn is_identical_to(self, other: SignatureKey<'_, C>) -> bool {
        Arc::ptr_eq(self.ret, other.ret)
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(other.params.iter())
                .all(|(p, q)| Arc::ptr_eq(p, q))
    }
}

impl<C: Send + Sync + 'static> Intern for Signature<C> {
    type Key<'k> = SignatureKey<'k, C>;

    #[inline]
    fn key_hash(key: SignatureKey<'_, C>) -> u64 {
        key.hash_value()
    }

    #[inline]
    fn matches(&self, key: SignatureKey<'_, C>) -> bool {
        self.as_key().is_identical_to(key)
    }

    fn from_key(key: SignatureKey<'_, C>) -> Self {
        Self {
            ret: key.ret.clone(),
            params: key.params.into(),
        }
    }
}

impl<C> PartialEq for Signature<C> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.as_key().is_identical_to(other.as_key())
    }
}

impl<C> Eq for Signature<C> {}

impl<C> Hash for Signature<C> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.as_key().hash_value());
    }
}

impl<C: Debug> Debug for Signature<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("ret", &self.ret)
            .field("params", &self.params)
            .finish()
    }
}

/// Renders the signature as `(p0,p1,...)r`.
impl<C: Display> Display for Signature<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            Display::fmt(param, f)?;
        }
        f.write_str(")")?;
        Display::fmt(&self.ret, f)
    }
}

impl<C: Send + Sync + 'static> Interner<Signature<C>> {
    /// Returns the canonical [`Signature`] of the components.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::{Interner, Signature};
    ///
    /// let interner: Interner<Signature<&'static str>> = Interner::new();
    /// let void = Arc::new("void");
    /// let int = Arc::new("int");
    ///
    /// let signature = interner.signature(&void, &[int.clone()]);
    /// assert_eq!(signature.to_string(), "(int)void");
    /// ```
    #[inline]
    pub fn signature(&self, ret: &Arc<C>, params: &[Arc<C>]) -> Arc<Signature<C>> {
        self.intern(SignatureKey { ret, params })
    }

    /// Returns the canonical [`Signature`] of the components the handles refer to.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::MissingComponent`] if a handle does not refer to a live
    /// component; the [`Interner`] is not touched in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::{Arc, Weak};
    /// use weak_cache::{Interner, Signature, SignatureError};
    ///
    /// let interner: Interner<Signature<&'static str>> = Interner::new();
    /// let void = Arc::new("void");
    ///
    /// assert!(interner.try_signature(&Arc::downgrade(&void), &[]).is_ok());
    /// assert_eq!(
    ///     interner.try_signature(&Arc::downgrade(&void), &[Weak::new()]),
    ///     Err(SignatureError::MissingComponent { index: 1 })
    /// );
    /// ```
    pub fn try_signature(
        &self,
        ret: &Weak<C>,
        params: &[Weak<C>],
    ) -> Result<Arc<Signature<C>>, SignatureError> {
        let ret = ret
            .upgrade()
            .ok_or(SignatureError::MissingComponent { index: 0 })?;
        let params = params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                param
                    .upgrade()
                    .ok_or(SignatureError::MissingComponent { index: i + 1 })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.signature(&ret, &params))
    }

    /// Returns the canonical [`Signature`] with the return component replaced.
    #[inline]
    pub fn change_ret(&self, signature: &Signature<C>, ret: &Arc<C>) -> Arc<Signature<C>> {
        self.signature(ret, signature.params())
    }

    /// Returns the canonical [`Signature`] with the parameter at the index replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::IndexOutOfBounds`] if there is no parameter at the index.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::{Interner, Signature};
    ///
    /// let interner: Interner<Signature<&'static str>> = Interner::new();
    /// let void = Arc::new("void");
    /// let int = Arc::new("int");
    /// let long = Arc::new("long");
    ///
    /// let signature = interner.signature(&void, &[int.clone(), int.clone()]);
    /// let changed = interner.change_param(&signature, 1, &long).unwrap();
    /// assert_eq!(changed.to_string(), "(int,long)void");
    /// assert!(interner.change_param(&signature, 2, &long).is_err());
    /// ```
    pub fn change_param(
        &self,
        signature: &Signature<C>,
        index: usize,
        param: &Arc<C>,
    ) -> Result<Arc<Signature<C>>, SignatureError> {
        let len = signature.param_count();
        if index >= len {
            return Err(SignatureError::IndexOutOfBounds { index, len });
        }
        let mut params = signature.params().to_vec();
        params[index] = param.clone();
        Ok(self.signature(signature.ret(), &params))
    }

    /// Returns the canonical [`Signature`] with the parameters inserted at the index.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::IndexOutOfBounds`] if the index is greater than the number of
    /// parameters.
    pub fn insert_params(
        &self,
        signature: &Signature<C>,
        index: usize,
        params: &[Arc<C>],
    ) -> Result<Arc<Signature<C>>, SignatureError> {
        let len = signature.param_count();
        if index > len {
            return Err(SignatureError::IndexOutOfBounds { index, len });
        }
        let mut new_params = Vec::with_capacity(len + params.len());
        new_params.extend_from_slice(&signature.params()[..index]);
        new_params.extend_from_slice(params);
        new_params.extend_from_slice(&signature.params()[index..]);
        Ok(self.signature(signature.ret(), &new_params))
    }

    /// Returns the canonical [`Signature`] with the parameters appended.
    #[inline]
    pub fn append_params(&self, signature: &Signature<C>, params: &[Arc<C>]) -> Arc<Signature<C>> {
        let mut new_params = signature.params().to_vec();
        new_params.extend_from_slice(params);
        self.signature(signature.ret(), &new_params)
    }

    /// Returns the canonical [`Signature`] without the parameters in `start..end`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidRange`] if the range is reversed or goes beyond the number
    /// of parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weak_cache::{Interner, Signature};
    ///
    /// let interner: Interner<Signature<&'static str>> = Interner::new();
    /// let void = Arc::new("void");
    /// let int = Arc::new("int");
    /// let long = Arc::new("long");
    ///
    /// let signature = interner.signature(&void, &[int.clone(), long.clone(), int.clone()]);
    /// let dropped = interner.drop_params(&signature, 0, 2).unwrap();
    /// assert!(Arc::ptr_eq(&dropped, &interner.signature(&void, &[int.clone()])));
    /// ```
    pub fn drop_params(
        &self,
        signature: &Signature<C>,
        start: usize,
        end: usize,
    ) -> Result<Arc<Signature<C>>, SignatureError> {
        let len = signature.param_count();
        if start > end || end > len {
            return Err(SignatureError::InvalidRange { start, end, len });
        }
        let mut params = Vec::with_capacity(len - (end - start));
        params.extend_from_slice(&signature.params()[..start]);
        params.extend_from_slice(&signature.params()[end..]);
        Ok(self.signature(signature.ret(), &params))
    }
}
