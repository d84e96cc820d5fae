//! Configuration bindings and invocation context

use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Resolved configuration values handed to one running job
///
/// Values may be secrets, so `Debug` prints keys only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigBinding {
    values: BTreeMap<String, String>,
}

impl ConfigBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for ConfigBinding {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for ConfigBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Explicit per-invocation context passed to the config resolver
///
/// `inputs` are values supplied with the invocation itself (for example the
/// name of the secret holding a profiles file). They take precedence over
/// the secret provider.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation_id: Uuid,
    pub inputs: BTreeMap<String, String>,
}

impl InvocationContext {
    pub fn new(inputs: BTreeMap<String, String>) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            inputs,
        }
    }

    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }
}
