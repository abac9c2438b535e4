//! Dependency registry.
//!
//! Simulation code often needs shared objects (a resource handle, a
//! configuration table, a distribution) that are created once when the model
//! is set up. The [`Registry`] stores them keyed by type and an optional
//! qualifier so processes can look them up through the environment instead
//! of threading them through every closure.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use tracing::warn;

use crate::error::{SimError, SimResult};

type Key = (TypeId, Option<String>);

/// Type-keyed store of shared model objects.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<Key, Box<dyn Any>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` as the unqualified instance of `T`, replacing any
    /// previous one.
    pub fn register<T: 'static>(&mut self, value: T) {
        self.entries.insert((TypeId::of::<T>(), None), Box::new(value));
    }

    /// Register `value` under `qualifier`, so several instances of the same
    /// type can coexist.
    pub fn register_qualified<T: 'static>(&mut self, qualifier: impl Into<String>, value: T) {
        self.entries
            .insert((TypeId::of::<T>(), Some(qualifier.into())), Box::new(value));
    }

    pub fn resolve<T: 'static>(&self, qualifier: Option<&str>) -> SimResult<&T> {
        let key = (TypeId::of::<T>(), qualifier.map(str::to_owned));
        match self.entries.get(&key).and_then(|v| v.downcast_ref::<T>()) {
            Some(value) => Ok(value),
            None => Err(unresolved::<T>(key.1)),
        }
    }

    pub fn resolve_mut<T: 'static>(&mut self, qualifier: Option<&str>) -> SimResult<&mut T> {
        let key = (TypeId::of::<T>(), qualifier.map(str::to_owned));
        match self.entries.get_mut(&key).and_then(|v| v.downcast_mut::<T>()) {
            Some(value) => Ok(value),
            None => Err(unresolved::<T>(key.1)),
        }
    }

    pub fn contains<T: 'static>(&self, qualifier: Option<&str>) -> bool {
        self.entries
            .contains_key(&(TypeId::of::<T>(), qualifier.map(str::to_owned)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn unresolved<T: 'static>(qualifier: Option<String>) -> SimError {
    let type_name = std::any::type_name::<T>();
    warn!(type_name, ?qualifier, "unresolved dependency");
    SimError::Unresolved {
        type_name,
        qualifier,
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
