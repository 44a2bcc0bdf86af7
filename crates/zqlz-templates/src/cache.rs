//! Compiled template cache
//!
//! Query templates passed by source text are compiled once into the base
//! environment under a generated name. The cache remembers the mapping
//! from source text to that name and evicts the least recently used
//! template once `capacity` is reached.

use indexmap::IndexMap;
use minijinja::Environment;
use tracing::debug;

use crate::rewrite::derive_bind_names;

/// LRU map from template source text to a compiled template name
#[derive(Debug)]
pub struct TemplateCache {
    capacity: usize,
    entries: IndexMap<String, String>,
    next_id: u64,
}

impl TemplateCache {
    /// Create a cache holding up to `capacity` templates
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: IndexMap::new(),
            next_id: 0,
        }
    }

    /// Maximum number of cached templates
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached templates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if `source` is already compiled
    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    /// Name of the compiled template for `source`, compiling it into `env`
    /// on a miss. Returns `None` when caching is disabled.
    pub fn get_or_compile(
        &mut self,
        env: &mut Environment<'static>,
        source: &str,
    ) -> Result<Option<String>, minijinja::Error> {
        if self.capacity == 0 {
            return Ok(None);
        }

        if let Some(index) = self.entries.get_index_of(source) {
            let last = self.entries.len() - 1;
            self.entries.move_index(index, last);
            if let Some((_, name)) = self.entries.get_index(last) {
                debug!(template = %name, "template cache hit");
                return Ok(Some(name.clone()));
            }
        }

        let name = format!("<query#{}>", self.next_id);
        self.next_id += 1;
        env.add_template_owned(name.clone(), derive_bind_names(source))?;

        while self.entries.len() >= self.capacity {
            match self.entries.shift_remove_index(0) {
                Some((_, evicted)) => {
                    debug!(template = %evicted, "evicting cached template");
                    env.remove_template(&evicted);
                }
                None => break,
            }
        }

        debug!(template = %name, cached = self.entries.len() + 1, "template cache miss");
        self.entries.insert(source.to_string(), name.clone());
        Ok(Some(name))
    }
}
