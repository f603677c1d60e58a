// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;

/// A string-keyed persistence slot. Used to keep a BOSH session around between application
/// launches.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

impl KeyValueStore for Arc<dyn KeyValueStore> {
    fn get(&self, key: &str) -> Option<String> {
        self.deref().get(key)
    }

    fn set(&self, key: &str, value: String) {
        self.deref().set(key, value)
    }

    fn remove(&self, key: &str) {
        self.deref().remove(key)
    }
}
