//! Storage stack and stored value behavior under random operations
//!
//! 1. **Model equivalence**: the layered stack behaves like a plain map
//! 2. **Isolation**: prefixed namespaces never see each other's items
//! 3. **Chaos**: a stored value never reports data storage did not accept

use std::collections::HashMap;

use parsec_core::{
    CachedStorage, ChaoticStorage, EncryptedStorage, MemoryStorage, PlainText, PrefixedStorage,
    SessionStorage, StorageError, StoredValue,
};
use parsec_crypto::SymmetricKey;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, String),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, "[a-z0-9]{0,12}").prop_map(|(k, v)| Op::Set(k, v)),
        (0u8..6).prop_map(Op::Remove),
    ]
}

fn key(k: u8) -> String {
    format!(".p1.K{k}")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_layered_stack_matches_model(ops in prop::collection::vec(op(), 0..40)) {
        let backing = MemoryStorage::new();
        let encrypted = EncryptedStorage::open(backing.clone(), SymmetricKey::new([7; 32])).unwrap();
        let stack = PrefixedStorage::new(CachedStorage::new(encrypted), "app.");
        let mut model = HashMap::new();

        for op in ops {
            match op {
                Op::Set(k, v) => {
                    stack.set_item(&key(k), &v).unwrap();
                    model.insert(key(k), v);
                },
                Op::Remove(k) => {
                    stack.remove_item(&key(k)).unwrap();
                    model.remove(&key(k));
                },
            }
        }

        for k in 0..6 {
            prop_assert_eq!(stack.get_item(&key(k)).unwrap(), model.get(&key(k)).cloned());
        }

        // A fresh stack over the same backing sees the same data.
        let reopened = EncryptedStorage::open(backing, SymmetricKey::new([7; 32])).unwrap();
        let reopened = PrefixedStorage::new(reopened, "app.");
        for k in 0..6 {
            prop_assert_eq!(reopened.get_item(&key(k)).unwrap(), model.get(&key(k)).cloned());
        }
    }

    #[test]
    fn prop_prefixes_are_isolated(ops in prop::collection::vec(op(), 0..30)) {
        let shared = MemoryStorage::new();
        let left = PrefixedStorage::new(shared.clone(), "left.");
        let right = PrefixedStorage::new(shared, "right.");

        for op in ops {
            match op {
                Op::Set(k, v) => left.set_item(&key(k), &v).unwrap(),
                Op::Remove(k) => left.remove_item(&key(k)).unwrap(),
            }
        }

        for k in 0..6 {
            prop_assert_eq!(right.get_item(&key(k)).unwrap(), None);
        }
    }

    #[test]
    fn prop_stored_value_survives_chaos(
        seed in any::<u64>(),
        writes in prop::collection::vec(prop::option::of("[a-z]{1,8}"), 1..30),
    ) {
        let storage = ChaoticStorage::with_seed(MemoryStorage::new(), 0.3, seed);
        let mut value = StoredValue::new(storage.clone(), ".p1.SID", PlainText);
        let mut accepted: Option<String> = None;

        for write in writes {
            if value.set(write.clone()).is_ok() {
                accepted = write;
            }

            prop_assert_eq!(storage.inner().get_item(".p1.SID").unwrap(), accepted.clone());
            match value.value() {
                Ok(current) => prop_assert_eq!(current, accepted.clone()),
                Err(error) => prop_assert!(matches!(error, StorageError::Io(_))),
            }
        }
    }
}

#[test]
fn encrypted_storage_rejects_wrong_key() {
    let backing = MemoryStorage::new();
    let storage = EncryptedStorage::open(backing.clone(), SymmetricKey::new([1; 32])).unwrap();
    storage.set_item(".p1.TSK", "secret").unwrap();

    assert!(EncryptedStorage::<MemoryStorage>::exists_in(&backing).unwrap());
    assert!(matches!(
        EncryptedStorage::open(backing, SymmetricKey::new([2; 32])),
        Err(StorageError::Crypto(_))
    ));
}
