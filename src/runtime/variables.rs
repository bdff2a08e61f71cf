//! Scoped variable environment
//!
//! Scopes form a tree through `Arc` parent links. Lookups walk towards the
//! root; writes only touch the local map. [`Scope::commit`] is the only way
//! entries move upwards, and it holds the parent's lock while merging so
//! that parallel siblings can commit into a shared parent.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::script::Value;

#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<Arc<Scope>>,
    vars: Mutex<HashMap<String, Value>>,
}

impl Scope {
    /// Create a root scope
    pub fn root() -> Arc<Scope> {
        Arc::new(Scope::default())
    }

    /// Create an empty scope whose lookups fall back to `self`
    pub fn new_child(self: &Arc<Self>) -> Arc<Scope> {
        Arc::new(Scope {
            parent: Some(Arc::clone(self)),
            vars: Mutex::default(),
        })
    }

    fn local(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.vars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look a name up here, then in each ancestor
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.local().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.local().insert(name.into(), value.into());
    }

    pub fn set_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.local().extend(values);
    }

    /// Copy of the entries set directly on this scope
    pub fn locals(&self) -> HashMap<String, Value> {
        self.local().clone()
    }

    /// Flattened view from the root down to this scope; deeper entries win
    pub fn as_map(&self) -> BTreeMap<String, Value> {
        let mut map = match &self.parent {
            Some(parent) => parent.as_map(),
            None => BTreeMap::new(),
        };
        for (k, v) in self.local().iter() {
            map.insert(k.clone(), v.clone());
        }
        map
    }

    /// Move every local entry into the parent and return the parent
    ///
    /// Colliding names are overwritten, so among concurrent siblings the
    /// last one to commit wins. A root scope has nothing to commit into and
    /// returns `None`.
    pub fn commit(self: Arc<Self>) -> Option<Arc<Scope>> {
        let parent = self.parent.clone()?;
        let entries = std::mem::take(&mut *self.local());
        tracing::trace!(count = entries.len(), "commit scope");
        parent.local().extend(entries);
        Some(parent)
    }
}
