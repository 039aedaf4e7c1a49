//! String interner for identifier storage.
//!
//! Provides O(1) interning and lookup with thread-safe concurrent access.
//! Interned strings live for the duration of a compilation run; nothing is
//! ever removed.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::Name;

struct InternerInner {
    /// Map from string content to index.
    map: FxHashMap<Box<str>, u32>,
    /// Storage for string contents, indexed by `Name::raw()`.
    strings: Vec<Box<str>>,
}

/// Thread-safe string interner.
///
/// Provides O(1) lookup and equality comparison for interned strings. Insert
/// only: indices handed out remain valid for the lifetime of the interner.
pub struct StringInterner {
    inner: RwLock<InternerInner>,
}

impl StringInterner {
    /// Create a new interner with the empty string pre-interned at index 0.
    pub fn new() -> Self {
        let mut map = FxHashMap::default();
        map.insert(Box::from(""), 0);

        StringInterner {
            inner: RwLock::new(InternerInner {
                map,
                strings: vec![Box::from("")],
            }),
        }
    }

    /// Intern a string, returning its [`Name`].
    ///
    /// Interning the same content twice returns the same name.
    pub fn intern(&self, s: &str) -> Name {
        {
            let inner = self.inner.read();
            if let Some(&idx) = inner.map.get(s) {
                return Name::from_raw(idx);
            }
        }

        let mut inner = self.inner.write();
        // Another thread may have interned `s` between the read and write
        // lock; the second lookup keeps indices unique.
        if let Some(&idx) = inner.map.get(s) {
            return Name::from_raw(idx);
        }

        let idx = inner.strings.len() as u32;
        let boxed: Box<str> = Box::from(s);
        inner.strings.push(boxed.clone());
        inner.map.insert(boxed, idx);
        Name::from_raw(idx)
    }

    /// Look up the text of an interned name.
    ///
    /// Returns an owned `String` so no lock is held by the caller.
    pub fn lookup(&self, name: Name) -> String {
        let inner = self.inner.read();
        inner
            .strings
            .get(name.raw() as usize)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// Number of interned strings, including the pre-interned empty string.
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    /// Whether only the pre-interned empty string is present.
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a [`StringInterner`].
///
/// Cloning is cheap; all clones observe the same interned set. Used to share
/// one interner between the loader, worker threads and the driver.
#[derive(Clone)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl Default for SharedInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    fn deref(&self) -> &StringInterner {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_intern_dedup() {
        let interner = StringInterner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        let c = interner.intern("bar");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.lookup(a), "foo");
        assert_eq!(interner.lookup(c), "bar");
    }

    #[test]
    fn test_empty_string_pre_interned() {
        let interner = StringInterner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
        assert!(interner.is_empty());
    }

    #[test]
    fn test_shared_interner_clones_observe_inserts() {
        let shared = SharedInterner::new();
        let clone = shared.clone();
        let name = shared.intern("module");
        assert_eq!(clone.lookup(name), "module");
    }

    #[test]
    fn test_concurrent_interning() {
        let shared = SharedInterner::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let interner = shared.clone();
                std::thread::spawn(move || interner.intern("same"))
            })
            .collect();

        let mut names = Vec::new();
        for handle in handles {
            if let Ok(name) = handle.join() {
                names.push(name);
            }
        }
        assert_eq!(names.len(), 4);
        assert!(names.iter().all(|n| *n == names[0]));
    }
}
