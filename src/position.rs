//! Immutable source positions, plus the provenance chains the preprocessor
//! (out of scope here, but upstream of this crate) attaches when a token
//! came from a macro expansion or a `#include`.

use std::rc::Rc;

use crate::symbol::Symbol;

/// One point in the original source, with optional provenance.
///
/// `expanded_from` is a linear chain (one token expands from at most one
/// enclosing macro invocation); `included_from` is a tree (many files can
/// `#include` the same header, but each inclusion site is singular), per
/// `spec.md` §3.
#[derive(Clone, Debug)]
pub struct Pos(Rc<PosInner>);

#[derive(Debug)]
struct PosInner {
    file: Symbol,
    line: u32,
    column: u32,
    byte_offset: u32,
    expanded_from: Option<Pos>,
    included_from: Option<Pos>,
}

impl Pos {
    #[must_use]
    pub fn new(file: Symbol, line: u32, column: u32, byte_offset: u32) -> Self {
        Pos(Rc::new(PosInner {
            file,
            line,
            column,
            byte_offset,
            expanded_from: None,
            included_from: None,
        }))
    }

    #[must_use]
    pub fn with_expansion(file: Symbol, line: u32, column: u32, byte_offset: u32, expanded_from: Pos) -> Self {
        Pos(Rc::new(PosInner {
            file,
            line,
            column,
            byte_offset,
            expanded_from: Some(expanded_from),
            included_from: None,
        }))
    }

    #[must_use]
    pub fn with_inclusion(file: Symbol, line: u32, column: u32, byte_offset: u32, included_from: Pos) -> Self {
        Pos(Rc::new(PosInner {
            file,
            line,
            column,
            byte_offset,
            expanded_from: None,
            included_from: Some(included_from),
        }))
    }

    #[must_use]
    pub fn file(&self) -> Symbol {
        self.0.file
    }
    #[must_use]
    pub fn line(&self) -> u32 {
        self.0.line
    }
    #[must_use]
    pub fn column(&self) -> u32 {
        self.0.column
    }
    #[must_use]
    pub fn byte_offset(&self) -> u32 {
        self.0.byte_offset
    }
    #[must_use]
    pub fn expanded_from(&self) -> Option<&Pos> {
        self.0.expanded_from.as_ref()
    }
    #[must_use]
    pub fn included_from(&self) -> Option<&Pos> {
        self.0.included_from.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolSpace;

    #[test]
    fn expansion_chain_is_linear_and_walkable() {
        let space = SymbolSpace::new();
        let f = space.force_str("main.c");
        let root = Pos::new(f, 1, 1, 0);
        let expanded = Pos::with_expansion(f, 1, 5, 4, root.clone());
        assert_eq!(expanded.expanded_from().unwrap().line(), 1);
        assert!(expanded.included_from().is_none());
    }

    #[test]
    fn inclusion_chain_is_a_tree_many_files_share_a_parent() {
        let space = SymbolSpace::new();
        let main = space.force_str("main.c");
        let header = space.force_str("header.h");
        let at_include = Pos::new(main, 10, 1, 90);
        let in_header_a = Pos::with_inclusion(header, 1, 1, 0, at_include.clone());
        let in_header_b = Pos::with_inclusion(header, 2, 1, 10, at_include.clone());
        assert_eq!(in_header_a.included_from().unwrap().line(), 10);
        assert_eq!(in_header_b.included_from().unwrap().line(), 10);
    }
}
