// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Keystore backend and the typed object stores built on it.
//!
//! Every cryptographic object a session holds between rounds lives in a
//! [`TypedStore`], keyed by [`KeyOpts`] — the `(session, party)` composite
//! key, optionally extended with a sub-identifier. All stores of a session
//! share one [`Keystore`] backend; the in-memory default serializes
//! concurrent access (exclusive on write, shared on read). Implementations
//! may back to disk; the engine assumes nothing beyond import/get/delete.

use std::{
    collections::HashMap,
    fmt::Debug,
    marker::PhantomData,
    sync::{Arc, RwLock},
};

use crate::{
    errors::{Result, StoreError},
    protocol::{Identifier, PartyId},
};

/// Composite primary key into every key manager: session, party, and an
/// optional sub-identifier for stores holding several objects per party.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyOpts {
    sid: Identifier,
    party: PartyId,
    sub: Option<String>,
}

impl KeyOpts {
    /// Key for `party`'s object within session `sid`.
    pub fn new(sid: Identifier, party: &PartyId) -> Self {
        Self {
            sid,
            party: party.clone(),
            sub: None,
        }
    }

    /// Extend the key with a sub-identifier.
    pub fn with_sub(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// The party component of the key.
    pub fn party(&self) -> &PartyId {
        &self.party
    }
}

/// Fully qualified backend key: store namespace, object kind, and the
/// caller's [`KeyOpts`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    namespace: &'static str,
    kind: &'static str,
    opts: KeyOpts,
}

/// Raw byte-oriented storage. The in-memory implementation is the default;
/// the engine makes no assumptions beyond these operations.
pub trait Keystore: Send + Sync + Debug {
    /// Store `bytes` under `key`. Without `overwrite`, importing different
    /// bytes under an existing key fails; re-importing identical bytes is a
    /// no-op.
    fn import(&self, key: StorageKey, bytes: Vec<u8>, overwrite: bool) -> Result<()>;

    /// Fetch the bytes stored under `key`.
    fn get(&self, key: &StorageKey) -> Result<Vec<u8>>;

    /// Remove the entry under `key`.
    fn delete(&self, key: &StorageKey) -> Result<()>;

    /// True if an entry exists under `key`.
    fn contains(&self, key: &StorageKey) -> bool;
}

/// The default, process-local keystore.
#[derive(Debug, Default)]
pub struct InMemoryKeystore {
    entries: RwLock<HashMap<StorageKey, Vec<u8>>>,
}

impl InMemoryKeystore {
    /// An empty keystore behind an [`Arc`], ready to share across stores.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Keystore for InMemoryKeystore {
    fn import(&self, key: StorageKey, bytes: Vec<u8>, overwrite: bool) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .expect("keystore lock is never poisoned");
        if !overwrite {
            if let Some(existing) = entries.get(&key) {
                if existing == &bytes {
                    return Ok(());
                }
                Err(StoreError::DuplicateEntry)?;
            }
        }
        let _ = entries.insert(key, bytes);
        Ok(())
    }

    fn get(&self, key: &StorageKey) -> Result<Vec<u8>> {
        let entries = self
            .entries
            .read()
            .expect("keystore lock is never poisoned");
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::MissingEntry.into())
    }

    fn delete(&self, key: &StorageKey) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .expect("keystore lock is never poisoned");
        entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::MissingEntry.into())
    }

    fn contains(&self, key: &StorageKey) -> bool {
        let entries = self
            .entries
            .read()
            .expect("keystore lock is never poisoned");
        entries.contains_key(key)
    }
}

/// An object storable in a [`TypedStore`].
pub trait StoreValue: Sized {
    /// Object kind, part of the backend key.
    const KIND: &'static str;

    /// Canonical byte encoding.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Decode the canonical byte encoding.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// A typed key manager: one instance per object type and protocol role, all
/// sharing one keystore backend.
pub struct TypedStore<T: StoreValue> {
    namespace: &'static str,
    backend: Arc<dyn Keystore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: StoreValue> Debug for TypedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedStore")
            .field("namespace", &self.namespace)
            .field("kind", &T::KIND)
            .finish()
    }
}

impl<T: StoreValue> Clone for TypedStore<T> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace,
            backend: self.backend.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: StoreValue> TypedStore<T> {
    /// A store for `T` objects under `namespace`, backed by `backend`.
    pub fn new(backend: Arc<dyn Keystore>, namespace: &'static str) -> Self {
        Self {
            namespace,
            backend,
            _marker: PhantomData,
        }
    }

    fn key(&self, opts: &KeyOpts) -> StorageKey {
        StorageKey {
            namespace: self.namespace,
            kind: T::KIND,
            opts: opts.clone(),
        }
    }

    /// Import an object. Duplicate imports under the same key fail unless the
    /// encoding is byte-identical.
    pub fn import(&self, opts: &KeyOpts, value: &T) -> Result<()> {
        self.backend.import(self.key(opts), value.encode()?, false)
    }

    /// Import an object, replacing any existing entry.
    pub fn import_overwrite(&self, opts: &KeyOpts, value: &T) -> Result<()> {
        self.backend.import(self.key(opts), value.encode()?, true)
    }

    /// Materialize the object stored under `opts`.
    pub fn get(&self, opts: &KeyOpts) -> Result<T> {
        let bytes = self.backend.get(&self.key(opts))?;
        T::decode(&bytes).map_err(|_| StoreError::CorruptEntry.into())
    }

    /// True if an object is stored under `opts`.
    pub fn contains(&self, opts: &KeyOpts) -> bool {
        self.backend.contains(&self.key(opts))
    }

    /// Remove the object stored under `opts`.
    pub fn delete(&self, opts: &KeyOpts) -> Result<()> {
        self.backend.delete(&self.key(opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::Error, utils::testing::init_testing};

    #[derive(Debug, PartialEq)]
    struct Label(String);

    impl StoreValue for Label {
        const KIND: &'static str = "label";

        fn encode(&self) -> Result<Vec<u8>> {
            Ok(self.0.as_bytes().to_vec())
        }

        fn decode(bytes: &[u8]) -> Result<Self> {
            Ok(Label(String::from_utf8_lossy(bytes).into_owned()))
        }
    }

    fn setup() -> (Identifier, KeyOpts, TypedStore<Label>) {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let opts = KeyOpts::new(sid, &PartyId::from("a"));
        let store = TypedStore::new(InMemoryKeystore::new(), "test");
        (sid, opts, store)
    }

    #[test]
    fn import_get_delete_round_trip() {
        let (_, opts, store) = setup();
        assert!(!store.contains(&opts));
        store.import(&opts, &Label("share".into())).unwrap();
        assert!(store.contains(&opts));
        assert_eq!(store.get(&opts).unwrap(), Label("share".into()));
        store.delete(&opts).unwrap();
        assert!(!store.contains(&opts));
        assert!(matches!(
            store.get(&opts),
            Err(Error::Store(StoreError::MissingEntry))
        ));
    }

    #[test]
    fn duplicate_imports_require_identical_bytes() {
        let (_, opts, store) = setup();
        store.import(&opts, &Label("share".into())).unwrap();
        // Identical re-import is a no-op.
        store.import(&opts, &Label("share".into())).unwrap();
        // Different contents under the same key fail without the overwrite
        // flag.
        assert!(matches!(
            store.import(&opts, &Label("other".into())),
            Err(Error::Store(StoreError::DuplicateEntry))
        ));
        store.import_overwrite(&opts, &Label("other".into())).unwrap();
        assert_eq!(store.get(&opts).unwrap(), Label("other".into()));
    }

    #[test]
    fn keys_separate_parties_sessions_and_namespaces() {
        let (sid, opts_a, store) = setup();
        let backend = InMemoryKeystore::new();
        let store_one: TypedStore<Label> = TypedStore::new(backend.clone(), "one");
        let store_two: TypedStore<Label> = TypedStore::new(backend, "two");

        store_one.import(&opts_a, &Label("one".into())).unwrap();
        store_two.import(&opts_a, &Label("two".into())).unwrap();
        assert_eq!(store_one.get(&opts_a).unwrap(), Label("one".into()));
        assert_eq!(store_two.get(&opts_a).unwrap(), Label("two".into()));

        let opts_b = KeyOpts::new(sid, &PartyId::from("b"));
        assert!(!store_one.contains(&opts_b));

        let opts_sub = opts_a.clone().with_sub("nonce-d");
        assert!(!store_one.contains(&opts_sub));
        store_one.import(&opts_sub, &Label("sub".into())).unwrap();
        assert_eq!(store_one.get(&opts_sub).unwrap(), Label("sub".into()));

        drop(store);
    }
}
