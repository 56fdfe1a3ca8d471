//! Script store
//!
//! Loads named scripts from a [`ScriptResources`] set and memoizes them for the
//! lifetime of the store.
//!
//! - First lookup reads the backing set; later lookups never touch it.
//! - Concurrent first loads are insert-if-absent: the first inserted text wins
//!   and every caller sees that text.
//! - Misses are not cached, so lookups of unknown names cannot grow the cache.
//! - Nothing is ever evicted or reloaded.

use jsembed_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::resources::{is_resource_name, ScriptResources};

/// A loaded script. Cheap to clone; the text is shared with the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    name: Arc<str>,
    text: Arc<str>,
}

impl ScriptSource {
    pub fn new(name: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether two sources share the same cached allocation.
    pub fn ptr_eq(&self, other: &ScriptSource) -> bool {
        Arc::ptr_eq(&self.text, &other.text)
    }

    pub fn view(&self) -> SourceView {
        SourceView {
            script_name: self.name.to_string(),
            content: self.text.to_string(),
            lines: self.text.lines().count(),
            size: self.text.len(),
        }
    }
}

/// A script's text with its line count and byte size, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceView {
    pub script_name: String,
    pub content: String,
    pub lines: usize,
    pub size: usize,
}

#[derive(Debug)]
pub struct ScriptStore {
    resources: Box<dyn ScriptResources>,
    cache: RwLock<HashMap<Arc<str>, Arc<str>>>,
}

impl ScriptStore {
    pub fn new(resources: impl ScriptResources + 'static) -> Self {
        Self {
            resources: Box::new(resources),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Loads the script called `name`.
    ///
    /// Returns `Ok(None)` when the backing set has no such script (or `name`
    /// is not a resource name). Only I/O failures of the backing set are
    /// errors.
    pub fn load(&self, name: &str) -> Result<Option<ScriptSource>> {
        if !is_resource_name(name) {
            tracing::debug!("Rejected script name {:?}", name);
            return Ok(None);
        }

        if let Some(source) = self.cached(name) {
            return Ok(Some(source));
        }

        let Some(text) = self.resources.read(name)? else {
            tracing::debug!("Script '{}' not found", name);
            return Ok(None);
        };

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let (key, text) = match cache.get_key_value(name) {
            Some((key, existing)) => (key.clone(), existing.clone()),
            None => {
                let key: Arc<str> = Arc::from(name);
                let text: Arc<str> = Arc::from(text);
                cache.insert(key.clone(), text.clone());
                tracing::info!("Script '{}' loaded and cached ({} bytes)", name, text.len());
                (key, text)
            }
        };

        Ok(Some(ScriptSource { name: key, text }))
    }

    /// Returns the cached script without touching the backing set.
    pub fn cached(&self, name: &str) -> Option<ScriptSource> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.get_key_value(name).map(|(key, text)| ScriptSource {
            name: key.clone(),
            text: text.clone(),
        })
    }

    /// Names currently held in the cache, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = cache.keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    /// Names available in the backing set.
    pub fn available(&self) -> Result<Vec<String>> {
        Ok(self.resources.names()?)
    }

    pub fn resources(&self) -> &dyn ScriptResources {
        self.resources.as_ref()
    }
}
