//! Name-hash bindings for variable lookup inside kernels.
//!
//! Agent code addresses variables by name.  At launch time every schema the
//! kernel touches is bound once: each variable's [`namespace_hash`] paired
//! with its schema position, sorted by hash.  A per-thread lookup is then a
//! binary search plus one string compare to rule out collisions.

use ab_core::{VariableSpec, namespace_hash};

#[derive(Clone, Debug, Default)]
pub struct VarBindings {
    entries: Vec<(u32, usize)>,
}

impl VarBindings {
    pub fn new(schema: &[VariableSpec]) -> Self {
        let mut entries: Vec<(u32, usize)> =
            schema.iter().enumerate().map(|(i, v)| (namespace_hash(&v.name), i)).collect();
        entries.sort_unstable();
        Self { entries }
    }

    /// Schema position of `name`.
    pub fn position(&self, schema: &[VariableSpec], name: &str) -> Option<usize> {
        let hash = namespace_hash(name);
        let start = self.entries.partition_point(|&(h, _)| h < hash);
        self.entries[start..]
            .iter()
            .take_while(|&&(h, _)| h == hash)
            .map(|&(_, i)| i)
            .find(|&i| schema[i].name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
