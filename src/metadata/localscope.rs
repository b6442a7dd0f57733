//! Lexical scopes, locals and constants of a method body.
//!
//! The code generator reports every local and constant together with the IL range it is
//! live in. [`LocalScopeBuilder`] turns these flat definitions into a [`LocalScopeTree`]:
//!
//! - definitions with identical ranges share one scope
//! - ranges nest by containment, two ranges that partially overlap are rejected with
//!   [`crate::Error::InvalidScope`]
//! - scopes without definitions are never created, zero-length ranges are dropped
//! - the root scope spans the whole method body and carries the method's import scope
//!
//! Ranges are half-open, `[start, end)`. [`LocalScopeTree::flatten`] produces the
//! pre-order (start ascending, length descending) used by the `LocalScope` table and by
//! the native writer's open/close scope callbacks.
//!
//! Locals of state machines that were lifted into fields are not part of the tree. Their
//! live ranges are reported as [`HoistedLocalScope`]s indexed by hoist slot.

use bitflags::bitflags;

use crate::{metadata::importscope::ImportScopeId, Error, Result};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    /// `LocalVariable` attributes
    pub struct LocalVariableAttributes: u16 {
        /// Compiler generated, not shown by debuggers
        const DEBUGGER_HIDDEN = 0x0001;
    }
}

/// A local variable slot visible in `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDefinition {
    /// Name shown in the debugger
    pub name: String,
    /// Slot in the local signature
    pub slot: u16,
    /// Attributes
    pub attributes: LocalVariableAttributes,
    /// First IL offset the local is in scope
    pub start: u32,
    /// IL offset after the scope
    pub end: u32,
}

impl LocalDefinition {
    /// A user visible local.
    #[must_use]
    pub fn new(name: impl Into<String>, slot: u16, start: u32, end: u32) -> Self {
        LocalDefinition {
            name: name.into(),
            slot,
            attributes: LocalVariableAttributes::empty(),
            start,
            end,
        }
    }

    /// Marks the local as compiler generated.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.attributes |= LocalVariableAttributes::DEBUGGER_HIDDEN;
        self
    }
}

/// A named constant visible in `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalConstantDefinition {
    /// Name shown in the debugger
    pub name: String,
    /// Constant signature blob (type and value)
    pub signature: Vec<u8>,
    /// First IL offset the constant is in scope
    pub start: u32,
    /// IL offset after the scope
    pub end: u32,
}

impl LocalConstantDefinition {
    /// Creates a constant.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: Vec<u8>, start: u32, end: u32) -> Self {
        LocalConstantDefinition {
            name: name.into(),
            signature,
            start,
            end,
        }
    }
}

/// One node of a [`LocalScopeTree`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalScope {
    /// First IL offset
    pub start: u32,
    /// IL offset after the scope
    pub end: u32,
    /// Locals declared directly in this scope
    pub locals: Vec<LocalDefinition>,
    /// Constants declared directly in this scope
    pub constants: Vec<LocalConstantDefinition>,
    /// Import scope, only set on the root
    pub imports: Option<ImportScopeId>,
    /// Nested scopes ordered by start offset
    pub children: Vec<LocalScope>,
}

impl LocalScope {
    fn new(start: u32, end: u32) -> Self {
        LocalScope {
            start,
            end,
            locals: Vec::new(),
            constants: Vec::new(),
            imports: None,
            children: Vec::new(),
        }
    }

    /// Length in bytes of IL.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.end - self.start
    }

    /// Returns `true` if the scope declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty() && self.constants.is_empty()
    }

    fn contains(&self, start: u32, end: u32) -> bool {
        self.start <= start && end <= self.end
    }
}

/// A scope in flattened pre-order, as written to the `LocalScope` table.
#[derive(Clone, Copy, Debug)]
pub struct FlatScope<'a> {
    /// The scope
    pub scope: &'a LocalScope,
    /// Nesting depth, 0 for the root
    pub depth: usize,
}

/// Scope tree of one method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalScopeTree {
    root: LocalScope,
}

impl LocalScopeTree {
    /// The root scope covering the whole body.
    #[must_use]
    pub fn root(&self) -> &LocalScope {
        &self.root
    }

    /// Returns `true` if there is nothing to emit: no definitions and no imports.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty() && self.root.children.is_empty() && self.root.imports.is_none()
    }

    /// Pre-order list of all scopes that are emitted. An empty root is kept when it
    /// carries imports or has children, otherwise the tree flattens to nothing.
    #[must_use]
    pub fn flatten(&self) -> Vec<FlatScope<'_>> {
        let mut result = Vec::new();
        if self.is_empty() {
            return result;
        }

        let mut stack = vec![(&self.root, 0usize)];
        while let Some((scope, depth)) = stack.pop() {
            result.push(FlatScope { scope, depth });
            stack.extend(scope.children.iter().rev().map(|child| (child, depth + 1)));
        }
        result
    }

    /// All locals in pre-order.
    pub fn locals(&self) -> impl Iterator<Item = &LocalDefinition> {
        self.flatten()
            .into_iter()
            .flat_map(|flat| flat.scope.locals.iter())
    }

    /// Re-checks that every child lies inside its parent and siblings are ordered and
    /// disjoint.
    ///
    /// # Errors
    /// Returns [`Error::InvalidScope`] on the first violation.
    pub fn validate(&self) -> Result<()> {
        fn check(scope: &LocalScope) -> Result<()> {
            let mut previous_end = scope.start;
            for child in &scope.children {
                if !scope.contains(child.start, child.end) || child.start < previous_end {
                    return Err(Error::InvalidScope {
                        first_start: scope.start,
                        first_end: scope.end,
                        second_start: child.start,
                        second_end: child.end,
                    });
                }
                previous_end = child.end;
                check(child)?;
            }
            Ok(())
        }

        check(&self.root)
    }
}

/// Collects definitions of one method and builds its [`LocalScopeTree`].
#[derive(Debug)]
pub struct LocalScopeBuilder {
    il_length: u32,
    locals: Vec<LocalDefinition>,
    constants: Vec<LocalConstantDefinition>,
    imports: Option<ImportScopeId>,
}

impl LocalScopeBuilder {
    /// Starts a builder for a body of `il_length` bytes.
    #[must_use]
    pub fn new(il_length: u32) -> Self {
        LocalScopeBuilder {
            il_length,
            locals: Vec::new(),
            constants: Vec::new(),
            imports: None,
        }
    }

    /// Adds a local.
    #[must_use]
    pub fn local(mut self, local: LocalDefinition) -> Self {
        self.locals.push(local);
        self
    }

    /// Adds a constant.
    #[must_use]
    pub fn constant(mut self, constant: LocalConstantDefinition) -> Self {
        self.constants.push(constant);
        self
    }

    /// Sets the import scope of the method.
    #[must_use]
    pub fn imports(mut self, imports: ImportScopeId) -> Self {
        self.imports = Some(imports);
        self
    }

    /// Builds the tree.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for ranges outside the body or with
    /// `start > end`, and [`Error::InvalidScope`] for partially overlapping ranges.
    pub fn build(self) -> Result<LocalScopeTree> {
        let mut scopes: Vec<LocalScope> = Vec::new();
        let il_length = self.il_length;

        let mut scope_for = |start: u32, end: u32, name: &str| -> Result<Option<usize>> {
            if start > end || end > il_length {
                return Err(malformed_error!(
                    "Scope of '{}' [{:#x}, {:#x}) is outside of the method body [0, {:#x})",
                    name,
                    start,
                    end,
                    il_length
                ));
            }
            if start == end {
                log::debug!("Dropping '{}' with empty scope at {:#x}", name, start);
                return Ok(None);
            }
            if let Some(index) = scopes.iter().position(|s| s.start == start && s.end == end) {
                return Ok(Some(index));
            }
            scopes.push(LocalScope::new(start, end));
            Ok(Some(scopes.len() - 1))
        };

        let mut placed_locals = Vec::with_capacity(self.locals.len());
        for local in self.locals {
            if let Some(index) = scope_for(local.start, local.end, &local.name)? {
                placed_locals.push((index, local));
            }
        }
        let mut placed_constants = Vec::with_capacity(self.constants.len());
        for constant in self.constants {
            if let Some(index) = scope_for(constant.start, constant.end, &constant.name)? {
                placed_constants.push((index, constant));
            }
        }

        for (index, local) in placed_locals {
            scopes[index].locals.push(local);
        }
        for (index, constant) in placed_constants {
            scopes[index].constants.push(constant);
        }

        let mut root = LocalScope::new(0, self.il_length);
        root.imports = self.imports;
        if let Some(position) = scopes
            .iter()
            .position(|s| s.start == 0 && s.end == self.il_length)
        {
            let whole = scopes.swap_remove(position);
            root.locals = whole.locals;
            root.constants = whole.constants;
        }

        scopes.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

        // Stack of open scopes, innermost last. Each scope is attached to its parent when
        // it is closed.
        let mut open: Vec<LocalScope> = vec![root];
        for scope in scopes {
            while let Some(top) = open.last() {
                if top.contains(scope.start, scope.end) {
                    break;
                }
                if scope.start < top.end {
                    return Err(Error::InvalidScope {
                        first_start: top.start,
                        first_end: top.end,
                        second_start: scope.start,
                        second_end: scope.end,
                    });
                }
                close_top(&mut open);
            }
            open.push(scope);
        }
        while open.len() > 1 {
            close_top(&mut open);
        }

        let root = open
            .pop()
            .ok_or_else(|| malformed_error!("Scope stack lost its root"))?;
        Ok(LocalScopeTree { root })
    }
}

fn close_top(open: &mut Vec<LocalScope>) {
    if open.len() > 1 {
        if let Some(closed) = open.pop() {
            if let Some(parent) = open.last_mut() {
                parent.children.push(closed);
            }
        }
    }
}

/// Live range of a hoisted local. `end` is exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HoistedLocalScope {
    /// First IL offset of `MoveNext`
    pub start: u32,
    /// IL offset after the range
    pub end: u32,
}

impl HoistedLocalScope {
    /// Placeholder for slots whose local is live for the whole state machine.
    pub const EMPTY: HoistedLocalScope = HoistedLocalScope { start: 0, end: 0 };

    /// Creates a range.
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        HoistedLocalScope { start, end }
    }

    /// Returns `true` for the placeholder.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Length in bytes of IL.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_with_single_local() {
        let tree = LocalScopeBuilder::new(8)
            .local(LocalDefinition::new("p", 0, 0, 8))
            .build()
            .unwrap();

        let flat = tree.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!((flat[0].scope.start, flat[0].scope.end), (0, 8));
        assert_eq!(flat[0].scope.locals[0].name, "p");
    }

    #[test]
    fn identical_ranges_share_scope() {
        let tree = LocalScopeBuilder::new(20)
            .local(LocalDefinition::new("a", 0, 2, 10))
            .local(LocalDefinition::new("b", 1, 2, 10))
            .constant(LocalConstantDefinition::new("K", vec![0x08, 1, 0, 0, 0], 2, 10))
            .build()
            .unwrap();

        let flat = tree.flatten();
        assert_eq!(flat.len(), 2);
        assert!(flat[0].scope.is_empty());
        assert_eq!(flat[1].scope.locals.len(), 2);
        assert_eq!(flat[1].scope.constants.len(), 1);
        assert_eq!(flat[1].depth, 1);
    }

    #[test]
    fn nesting_and_preorder() {
        let tree = LocalScopeBuilder::new(40)
            .local(LocalDefinition::new("inner", 1, 12, 18))
            .local(LocalDefinition::new("outer", 0, 10, 30))
            .local(LocalDefinition::new("second", 2, 20, 25))
            .local(LocalDefinition::new("tail", 3, 32, 40))
            .build()
            .unwrap();

        tree.validate().unwrap();
        let names: Vec<_> = tree.locals().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["outer", "inner", "second", "tail"]);

        let ranges: Vec<_> = tree
            .flatten()
            .iter()
            .map(|f| (f.scope.start, f.scope.end, f.depth))
            .collect();
        assert_eq!(
            ranges,
            [(0, 40, 0), (10, 30, 1), (12, 18, 2), (20, 25, 2), (32, 40, 1)]
        );
    }

    #[test]
    fn partial_overlap_is_rejected() {
        let result = LocalScopeBuilder::new(40)
            .local(LocalDefinition::new("a", 0, 0, 20))
            .local(LocalDefinition::new("b", 1, 10, 30))
            .build();
        assert!(matches!(
            result,
            Err(Error::InvalidScope {
                first_start: 0,
                first_end: 20,
                second_start: 10,
                second_end: 30
            })
        ));
    }

    #[test]
    fn out_of_body_is_malformed() {
        let result = LocalScopeBuilder::new(10)
            .local(LocalDefinition::new("a", 0, 0, 11))
            .build();
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn empty_tree_unless_imports() {
        let tree = LocalScopeBuilder::new(10)
            .local(LocalDefinition::new("dead", 0, 4, 4))
            .build()
            .unwrap();
        assert!(tree.flatten().is_empty());

        let tree = LocalScopeBuilder::new(10)
            .imports(ImportScopeId::from_raw(1))
            .build()
            .unwrap();
        let flat = tree.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].scope.imports, Some(ImportScopeId::from_raw(1)));
    }

    #[test]
    fn hidden_local_attributes() {
        let local = LocalDefinition::new("CS$<>8__locals0", 0, 0, 4).hidden();
        assert!(local
            .attributes
            .contains(LocalVariableAttributes::DEBUGGER_HIDDEN));
        assert_eq!(local.attributes.bits(), 1);
    }

    #[test]
    fn validate_detects_broken_tree() {
        let mut tree = LocalScopeBuilder::new(10)
            .local(LocalDefinition::new("a", 0, 2, 6))
            .build()
            .unwrap();
        tree.root.children[0].end = 12;
        assert!(tree.validate().is_err());
    }

    #[test]
    fn hoisted_scope() {
        assert!(HoistedLocalScope::EMPTY.is_empty());
        let scope = HoistedLocalScope::new(0x10, 0x2a);
        assert_eq!(scope.length(), 0x1a);
        assert!(!scope.is_empty());
    }
}
