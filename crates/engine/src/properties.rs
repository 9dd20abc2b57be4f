//! Run-scoped property bag
//!
//! A [`PropertyStore`] holds every property visible to templates and hooks. Values
//! live in one mapping; temporary keys are additionally tracked in a stack of
//! scopes, one per node currently being processed. Each scope remembers the value
//! a key had before the scope first set it. Draining the innermost scope puts
//! those values back (or removes the key when there was none), so a hook's local
//! bindings are gone once the node that set them is finished.
//!
//! Scopes nest because a module stays open while its subtree is processed: a
//! temporary property set by a module's pre block is visible to the files below
//! it and to the module's own post block, and is removed when the module closes.

use indexmap::IndexMap;
use regex::Regex;
use settle_core::{Error, PropertyValue, Result};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

static PATH_VARIABLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_.\-]+)@").ok());

/// Scope of a property write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyScope {
    /// Lives until the end of the run
    Permanent,
    /// Lives until the node that set it is finished
    Temporary,
}

impl PropertyScope {
    /// Parse `"temporary"` / `"permanent"` (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns an error for any other word.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "permanent" => Ok(Self::Permanent),
            "temporary" => Ok(Self::Temporary),
            other => Err(Error::Message(format!(
                "Unknown property scope '{other}' (expected 'temporary' or 'permanent')"
            ))),
        }
    }
}

/// Property store shared between the reconciler and hook functions
pub type SharedProperties = Arc<Mutex<PropertyStore>>;

/// Lock a shared store
///
/// # Errors
///
/// Returns an error if a previous holder panicked.
pub fn lock(shared: &SharedProperties) -> Result<MutexGuard<'_, PropertyStore>> {
    shared
        .lock()
        .map_err(|_| Error::Message("property store lock poisoned".to_string()))
}

/// A key set by a scope and the value it shadowed
#[derive(Debug, Clone)]
struct Shadow {
    key: String,
    previous: Option<PropertyValue>,
}

#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    values: IndexMap<String, PropertyValue>,
    scopes: Vec<Vec<Shadow>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with permanent bindings
    pub fn from_bindings<I, K>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, PropertyValue)>,
        K: Into<String>,
    {
        let mut store = Self::new();
        for (key, value) in bindings {
            store.values.insert(key.into(), value);
        }
        store
    }

    pub fn into_shared(self) -> SharedProperties {
        Arc::new(Mutex::new(self))
    }

    /// Set a property for the rest of the run
    ///
    /// A key that was temporary becomes permanent.
    pub fn set_permanent(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        for scope in &mut self.scopes {
            scope.retain(|shadow| shadow.key != key);
        }
        self.values.insert(key, value.into());
    }

    /// Set a property until the innermost open scope is drained
    ///
    /// Opens a scope when none is open. A value set by an outer scope, or a
    /// permanent one, is shadowed and comes back when this scope is drained.
    pub fn set_temporary(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        if self.scopes.is_empty() {
            self.scopes.push(Vec::new());
        }
        let previous = self.values.get(&key).cloned();
        if let Some(scope) = self.scopes.last_mut()
            && !scope.iter().any(|shadow| shadow.key == key)
        {
            scope.push(Shadow {
                key: key.clone(),
                previous,
            });
        }
        self.values.insert(key, value.into());
    }

    pub fn set(&mut self, scope: PropertyScope, key: impl Into<String>, value: impl Into<PropertyValue>) {
        match scope {
            PropertyScope::Permanent => self.set_permanent(key, value),
            PropertyScope::Temporary => self.set_temporary(key, value),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_temporary(&self, key: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.iter().any(|shadow| shadow.key == key))
    }

    /// Open a scope for the node about to be processed
    pub fn begin_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Close the innermost scope, undoing every temporary key it recorded
    ///
    /// Returns the drained keys.
    pub fn drain_temporary(&mut self) -> Vec<String> {
        let Some(shadows) = self.scopes.pop() else {
            return Vec::new();
        };
        let mut keys = Vec::with_capacity(shadows.len());
        for Shadow { key, previous } in shadows.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.values.insert(key.clone(), value);
                }
                None => {
                    self.values.shift_remove(&key);
                }
            }
            keys.push(key);
        }
        keys.reverse();
        if !keys.is_empty() {
            tracing::debug!(keys = ?keys, "Drained temporary properties");
        }
        keys
    }

    /// Number of open scopes
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.values.iter()
    }

    /// Properties as a JSON object for template contexts
    pub fn to_context(&self) -> serde_json::Map<String, serde_json::Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    /// Replace `@name@` tokens with property values
    ///
    /// Tokens naming an unknown property are left as they are.
    pub fn expand(&self, text: &str) -> String {
        let Some(re) = PATH_VARIABLE.as_ref() else {
            return text.to_string();
        };
        re.replace_all(text, |caps: &regex::Captures<'_>| match self.values.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
    }
}
