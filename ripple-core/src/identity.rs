//! Identity Hashing
//!
//! Pure derivations cache their results keyed by the values of the producers
//! they read. Those values can be anything, so this module turns each of
//! them into a [`KeyPart`] and a list of them into a [`HashKey`].
//!
//! # Key Forms
//!
//! - Scalars (numbers, strings, booleans, ...) are keyed by their stable
//!   `Display` form, tagged with a salt drawn once per hasher so a scalar key
//!   can never be mistaken for an object key.
//!
//! - Shared objects (`Rc<T>`, `Arc<T>`) are keyed by identity, not by
//!   content. The first time an object is seen it gets the next sequential
//!   index, and it keeps that index for as long as it is alive.
//!
//! - `Option`s key `None` as [`KeyPart::Null`] and wrap the key of a `Some`,
//!   so `None`, `Some(None)` and `Some(Some(x))` never share a key.
//!
//! - Tuples, arrays, slices and vectors key as the nested list of their
//!   element keys. A [`HashKey`] is the flat list of one key per producer.
//!
//! # Memory
//!
//! The object map is never evicted. Every distinct object ever hashed keeps
//! an entry, even after it has been dropped. Each entry holds a weak
//! reference, which pins the allocation (not the value), so an address can
//! never be handed to a new object and inherit a dead object's index.

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use smallvec::SmallVec;
use uuid::Uuid;

/// One element of a [`HashKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    /// A value keyed by its stable string form.
    Scalar {
        /// Salt shared by every scalar key of one hasher.
        salt: Uuid,
        /// The value's `Display` rendering.
        repr: Box<str>,
    },

    /// An object keyed by identity.
    Object {
        /// Salt shared by every object key of one hasher.
        salt: Uuid,
        /// Sequential index assigned on first encounter.
        index: u64,
    },

    /// `None`.
    Null,

    /// `Some`, around the key of the wrapped value.
    Present(Box<KeyPart>),

    /// A tuple or sequence: its element keys, in order.
    Seq(Box<[KeyPart]>),

    /// A producer that has been dropped.
    Absent,
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Scalar { salt, repr } => write!(f, "{}-{}", salt.simple(), repr),
            KeyPart::Object { salt, index } => write!(f, "{}-{}", salt.simple(), index),
            KeyPart::Null => f.write_str("none"),
            KeyPart::Present(inner) => write!(f, "some({inner})"),
            KeyPart::Seq(parts) => {
                f.write_str("[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str("]")
            }
            KeyPart::Absent => f.write_str("absent"),
        }
    }
}

/// A hashable cache key: the ordered concatenation of element keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HashKey(SmallVec<[KeyPart; 4]>);

impl HashKey {
    /// The element keys, in order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Number of element keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<KeyPart> for HashKey {
    fn from_iter<I: IntoIterator<Item = KeyPart>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

struct ObjectEntry {
    /// Keeps the allocation, and so the address, reserved.
    _pin: Box<dyn Any>,
    index: u64,
}

/// Assigns stable keys to arbitrary values.
pub struct IdentityHasher {
    scalar_salt: Uuid,
    object_salt: Uuid,
    next_index: u64,
    objects: HashMap<usize, ObjectEntry>,
}

impl IdentityHasher {
    /// Create a hasher with fresh salts.
    pub fn new() -> Self {
        Self {
            scalar_salt: Uuid::new_v4(),
            object_salt: Uuid::new_v4(),
            next_index: 0,
            objects: HashMap::new(),
        }
    }

    /// Key a single value.
    pub fn key_of<V: IdentityKey + ?Sized>(&mut self, value: &V) -> KeyPart {
        value.identity_key(self)
    }

    /// Hash a single value into a one-element key.
    pub fn hash_one<V: IdentityKey + ?Sized>(&mut self, value: &V) -> HashKey {
        std::iter::once(self.key_of(value)).collect()
    }

    /// Hash an ordered list of values.
    pub fn hash_all<'a, I>(&mut self, values: I) -> HashKey
    where
        I: IntoIterator<Item = &'a dyn IdentityKey>,
    {
        values.into_iter().map(|v| v.identity_key(self)).collect()
    }

    /// Key a scalar by its string form.
    pub fn scalar(&self, repr: impl fmt::Display) -> KeyPart {
        KeyPart::Scalar {
            salt: self.scalar_salt,
            repr: repr.to_string().into_boxed_str(),
        }
    }

    /// Key an ordered sequence of values as one nested part.
    pub fn sequence<'a, V, I>(&mut self, items: I) -> KeyPart
    where
        V: IdentityKey + 'a,
        I: IntoIterator<Item = &'a V>,
    {
        KeyPart::Seq(items.into_iter().map(|item| item.identity_key(self)).collect())
    }

    /// Key a reference-counted object by identity.
    pub fn object<T: ?Sized + 'static>(&mut self, object: &Rc<T>) -> KeyPart {
        let address = Rc::as_ptr(object) as *const () as usize;
        self.object_at(address, || Box::new(Rc::downgrade(object)) as Box<dyn Any>)
    }

    /// Key an atomically reference-counted object by identity.
    pub fn shared_object<T: ?Sized + 'static>(&mut self, object: &Arc<T>) -> KeyPart {
        let address = Arc::as_ptr(object) as *const () as usize;
        self.object_at(address, || Box::new(Arc::downgrade(object)) as Box<dyn Any>)
    }

    fn object_at(&mut self, address: usize, pin: impl FnOnce() -> Box<dyn Any>) -> KeyPart {
        let index = match self.objects.entry(address) {
            Entry::Occupied(entry) => entry.get().index,
            Entry::Vacant(entry) => {
                let index = self.next_index;
                self.next_index += 1;
                entry.insert(ObjectEntry { _pin: pin(), index });
                index
            }
        };

        KeyPart::Object {
            salt: self.object_salt,
            index,
        }
    }

    /// Number of object identities recorded so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl Default for IdentityHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentityHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityHasher")
            .field("scalar_salt", &self.scalar_salt)
            .field("object_salt", &self.object_salt)
            .field("object_count", &self.object_count())
            .finish()
    }
}

/// Values that can be turned into a cache key.
///
/// Implement this for your own value types to store them in signals.
/// Value-like types usually key by a stable string form through
/// [`IdentityHasher::scalar`]; types with reference semantics should key by
/// identity through [`IdentityHasher::object`].
pub trait IdentityKey {
    /// Produce this value's key.
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart;
}

macro_rules! scalar_identity {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IdentityKey for $ty {
                fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
                    hasher.scalar(self)
                }
            }
        )*
    };
}

scalar_identity!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, str,
    String,
);

impl IdentityKey for () {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        hasher.scalar("()")
    }
}

impl<T: IdentityKey + ?Sized> IdentityKey for &T {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        (**self).identity_key(hasher)
    }
}

impl<T: IdentityKey> IdentityKey for Option<T> {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        match self {
            Some(value) => KeyPart::Present(Box::new(value.identity_key(hasher))),
            None => KeyPart::Null,
        }
    }
}

impl<T: IdentityKey + ?Sized> IdentityKey for Box<T> {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        (**self).identity_key(hasher)
    }
}

impl<T: IdentityKey> IdentityKey for [T] {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        hasher.sequence(self)
    }
}

impl<T: IdentityKey, const N: usize> IdentityKey for [T; N] {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        hasher.sequence(self)
    }
}

impl<T: IdentityKey> IdentityKey for Vec<T> {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        hasher.sequence(self)
    }
}

macro_rules! tuple_identity {
    ($($name:ident)+) => {
        impl<$($name: IdentityKey),+> IdentityKey for ($($name,)+) {
            #[allow(non_snake_case)]
            fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
                let ($($name,)+) = self;
                KeyPart::Seq(Box::new([$($name.identity_key(hasher)),+]))
            }
        }
    };
}

tuple_identity!(A);
tuple_identity!(A B);
tuple_identity!(A B C);
tuple_identity!(A B C D);
tuple_identity!(A B C D E);
tuple_identity!(A B C D E F);

impl<T: ?Sized + 'static> IdentityKey for Rc<T> {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        hasher.object(self)
    }
}

impl<T: ?Sized + 'static> IdentityKey for Arc<T> {
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        hasher.shared_object(self)
    }
}
