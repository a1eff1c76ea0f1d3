//! Semantic core of a C11 compiler front-end (`spec.md` §1-§2): a
//! target-parameterized type system, a six-domain constant-folding engine,
//! expression/statement builders with opportunistic constant folding, a
//! hash-consed symbol interner, chained lexical namespaces, and a small
//! basic-block IR sketch.
//!
//! The core is single-threaded and non-blocking (`spec.md` §5): no
//! operation here suspends, awaits, or performs I/O. A driver (lexer,
//! preprocessor, grammar reducer, code generator) sits outside this crate
//! and calls into the constructors re-exported below with already-resolved
//! token payloads.

pub mod constant;
pub mod diag;
pub mod expr;
pub mod ir;
pub mod literal;
pub mod namespace;
pub mod position;
pub mod stmt;
pub mod symbol;
pub mod target;
pub mod types;

use namespace::Namespace;
use symbol::SymbolSpace;
use target::TargetProfile;

/// The single owner of one translation unit's symbol space, global
/// namespace, and target profile (`spec.md` §5: "A compiler unit is
/// expected to be owned by one logical worker"). A driver constructs one
/// `Compiler` per source file; parallelism across translation units is the
/// driver's concern, not this crate's.
pub struct Compiler {
    symbols: SymbolSpace,
    global: Namespace,
    target: TargetProfile,
}

impl Compiler {
    /// Builds a fresh compilation unit for `target`, with a symbol space
    /// and a global namespace already populated with the built-in scalar
    /// and float type handles (`spec.md` §4.8).
    #[must_use]
    pub fn new(target: TargetProfile) -> Self {
        let symbols = SymbolSpace::new();
        let global = Namespace::new_global(&symbols, target);
        Compiler { symbols, global, target }
    }

    /// A unit targeting [`TargetProfile::host`].
    #[must_use]
    pub fn host() -> Self {
        Compiler::new(TargetProfile::host())
    }

    #[must_use]
    pub fn symbols(&self) -> &SymbolSpace {
        &self.symbols
    }

    #[must_use]
    pub fn global_namespace(&self) -> &Namespace {
        &self.global
    }

    #[must_use]
    pub fn target(&self) -> TargetProfile {
        self.target
    }

    /// A fresh child scope of the global namespace, e.g. for a function
    /// body's top-level block (`spec.md` §4.8 "new-scope").
    #[must_use]
    pub fn new_scope(&self) -> Namespace {
        self.global.new_scope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_compiler_exposes_builtin_types() {
        let c = Compiler::host();
        assert_eq!(c.global_namespace().get_int_type().sizeof(), 4);
        assert_eq!(c.target().sizeof_pointer, 8);
    }

    #[test]
    fn symbols_are_shared_across_scopes_of_one_unit() {
        let c = Compiler::host();
        let a = c.symbols().force_str("widget");
        let scope = c.new_scope();
        scope.insert(a, namespace::Entry::Local { ty: c.global_namespace().get_int_type(), name: a });
        assert!(scope.lookup(a).is_some());
        assert!(c.global_namespace().lookup(a).is_none());
    }
}
