//! Typed opaque resource handles.
//!
//! A [`Handle`] stands in for a native GPU resource owned by one of the
//! resource managers. Handles are plain 64-bit values: cheap to copy, usable
//! as map keys, and carrying no capability of their own. The zero value is
//! the "no resource" sentinel. Ids are minted by a per-kind
//! [`HandleGenerator`] and are never reused, so a stale handle compared
//! against a live map always misses cleanly instead of aliasing another
//! resource.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for a resource of kind `T`.
///
/// The kind parameter only tags the handle at the type level; it places no
/// bounds on `T`, so handles stay `Copy`/`Eq`/`Hash` regardless of what they
/// point at.
pub struct Handle<T> {
    raw: u64,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// The "no resource" sentinel.
    pub const NONE: Self = Self {
        raw: 0,
        _kind: PhantomData,
    };

    /// Whether this handle is the null sentinel.
    pub fn is_null(self) -> bool {
        self.raw == 0
    }

    /// The raw 64-bit value.
    pub fn raw(self) -> u64 {
        self.raw
    }

    fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }
}

// Manual impls so `T` needs no bounds.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NONE
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.raw).finish()
    }
}

/// Mints strictly increasing, never-reused handles for resource kind `T`.
///
/// Each resource kind owns one process-wide generator:
///
/// ```
/// use ember_core::HandleGenerator;
///
/// struct Mesh;
/// static MESH_IDS: HandleGenerator<Mesh> = HandleGenerator::new();
///
/// let a = MESH_IDS.generate();
/// let b = MESH_IDS.generate();
/// assert!(!a.is_null());
/// assert!(b > a);
/// ```
pub struct HandleGenerator<T> {
    next: AtomicU64,
    _kind: PhantomData<fn() -> T>,
}

impl<T> HandleGenerator<T> {
    /// Create a generator. `const` so kinds can own a `static` one.
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            _kind: PhantomData,
        }
    }

    /// Mint the next handle. Thread-safe; never returns the null sentinel.
    pub fn generate(&self) -> Handle<T> {
        // fetch_add returns the previous value, so the first handle is 1.
        Handle::from_raw(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl<T> Default for HandleGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct KindA;
    struct KindB;

    #[test]
    fn generated_handles_increase() {
        let gen = HandleGenerator::<KindA>::new();
        let first = gen.generate();
        let second = gen.generate();
        let third = gen.generate();

        assert!(!first.is_null());
        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn null_sentinel() {
        let none = Handle::<KindA>::NONE;
        assert!(none.is_null());
        assert_eq!(none.raw(), 0);
        assert_eq!(none, Handle::default());

        let gen = HandleGenerator::<KindA>::new();
        assert_ne!(gen.generate(), none);
    }

    #[test]
    fn kinds_are_independent() {
        let a = HandleGenerator::<KindA>::new();
        let b = HandleGenerator::<KindB>::new();

        // Both start at 1; the type parameter keeps them from comparing.
        assert_eq!(a.generate().raw(), 1);
        assert_eq!(b.generate().raw(), 1);
        assert_eq!(a.generate().raw(), 2);
    }

    #[test]
    fn usable_as_map_key() {
        let gen = HandleGenerator::<KindA>::new();
        let mut map = HashMap::new();

        let h = gen.generate();
        map.insert(h, "first");
        map.insert(gen.generate(), "second");

        assert_eq!(map.get(&h), Some(&"first"));
        assert_eq!(map.len(), 2);

        // A freshly minted handle never aliases an existing entry.
        assert!(!map.contains_key(&gen.generate()));
    }

    #[test]
    fn concurrent_generation_is_unique() {
        let gen = Arc::new(HandleGenerator::<KindA>::new());
        let mut threads = Vec::new();

        for _ in 0..8 {
            let gen = Arc::clone(&gen);
            threads.push(std::thread::spawn(move || {
                (0..1000).map(|_| gen.generate().raw()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<u64> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();

        assert_eq!(all.len(), 8 * 1000);
        assert!(all.iter().all(|&raw| raw != 0));
    }
}
