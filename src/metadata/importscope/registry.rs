//! Deduplicating store of import scopes.
//!
//! Every method references the innermost import scope of the source it was declared in.
//! Methods of the same file and namespace therefore share scopes, and a compilation with
//! thousands of methods usually has only a handful of distinct ones. The registry stores
//! each distinct `(parent, imports)` pair once; its id doubles as the `ImportScope` row
//! number of the Portable PDB, so methods that share imports point at one row.
//!
//! Ids are handed out in insertion order. A parent always exists before its children, so
//! the id of a parent is always lower than the ids of its children.

use std::fmt;

use dashmap::DashMap;

use crate::{metadata::importscope::types::ImportsInfo, Result};

/// Identifier of a registered import scope, 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportScopeId(pub(crate) u32);

impl ImportScopeId {
    /// The raw id, equal to the `ImportScope` row.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Creates an id from a raw value.
    #[must_use]
    pub fn from_raw(value: u32) -> Self {
        ImportScopeId(value)
    }
}

impl fmt::Display for ImportScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import scope #{}", self.0)
    }
}

/// A registered scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportScope {
    /// Enclosing scope, `None` for the outermost
    pub parent: Option<ImportScopeId>,
    /// Declarations of this scope only
    pub imports: ImportsInfo,
}

/// Thread-safe, deduplicating import scope store.
pub struct ImportScopeRegistry {
    lookup: DashMap<ImportScope, ImportScopeId>,
    scopes: boxcar::Vec<ImportScope>,
}

impl ImportScopeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        ImportScopeRegistry {
            lookup: DashMap::new(),
            scopes: boxcar::Vec::new(),
        }
    }

    /// Registers a scope and returns its id. Registering identical content again returns
    /// the existing id.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `parent` is not registered.
    pub fn add(&self, parent: Option<ImportScopeId>, imports: ImportsInfo) -> Result<ImportScopeId> {
        if let Some(parent) = parent {
            if self.get(parent).is_none() {
                return Err(malformed_error!("Parent {} is not registered", parent));
            }
        }

        let scope = ImportScope { parent, imports };
        let entry = self.lookup.entry(scope.clone()).or_insert_with(|| {
            let index = self.scopes.push(scope);
            ImportScopeId(index as u32 + 1)
        });
        Ok(*entry.value())
    }

    /// Returns a scope.
    #[must_use]
    pub fn get(&self, id: ImportScopeId) -> Option<&ImportScope> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.scopes.get(index)
    }

    /// Outermost-first chain ending at `id`.
    #[must_use]
    pub fn chain(&self, id: ImportScopeId) -> Vec<(ImportScopeId, &ImportScope)> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let Some(scope) = self.get(id) else { break };
            chain.push((id, scope));
            current = scope.parent;
        }
        chain.reverse();
        chain
    }

    /// Number of scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.count()
    }

    /// Returns `true` if no scope is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scopes with their ids, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ImportScopeId, &ImportScope)> {
        self.scopes
            .iter()
            .map(|(index, scope)| (ImportScopeId(index as u32 + 1), scope))
    }
}

impl Default for ImportScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ImportScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportScopeRegistry")
            .field("scopes", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::metadata::importscope::ImportDeclaration;

    fn imports(namespaces: &[&str]) -> ImportsInfo {
        namespaces
            .iter()
            .map(|ns| ImportDeclaration::namespace(*ns))
            .collect()
    }

    #[test]
    fn identical_content_shares_id() {
        let registry = ImportScopeRegistry::new();
        let root = registry.add(None, imports(&["System"])).unwrap();
        let a = registry.add(Some(root), imports(&["System.Linq"])).unwrap();
        let b = registry.add(Some(root), imports(&["System.Linq"])).unwrap();
        let c = registry.add(None, imports(&["System.Linq"])).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.len(), 3);
        assert_eq!(root.value(), 1);
    }

    #[test]
    fn unknown_parent() {
        let registry = ImportScopeRegistry::new();
        assert!(registry
            .add(Some(ImportScopeId::from_raw(4)), imports(&["System"]))
            .is_err());
    }

    #[test]
    fn chain_is_outermost_first() {
        let registry = ImportScopeRegistry::new();
        let root = registry.add(None, imports(&["System"])).unwrap();
        let inner = registry.add(Some(root), imports(&["N"])).unwrap();
        let ids: Vec<_> = registry.chain(inner).iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, [root, inner]);
    }

    #[test]
    fn concurrent_registration() {
        let registry = Arc::new(ImportScopeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.add(None, imports(&["System"])).unwrap())
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(registry.len(), 1);
    }
}
