//! Typed, chainable diagnostics. An error-producing constructor returns
//! `Err(Diag)`; `Diag::attach_cause`/`attach_position` append to an ordered
//! chain rather than replacing anything, so positions and causes aggregate
//! (`spec.md` §7).

use std::fmt;
use std::rc::Rc;

use crate::position::Pos;

/// Closed enumeration of every diagnosable condition across the five error
/// families named in `spec.md` §7: lexing, preprocessing, token-level
/// parsing, type-sanity, and type-checking. The full list (beyond the
/// handful `spec.md` §4.2 names directly) is carried over from
/// `original_source`'s `DBCC_ErrorCode` so every failure path named in the
/// character/number parsers, type constructors, and expression/statement
/// builders has a stable kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagCode {
    // --- lexing / literal parsing ---
    BadCharacterSequence,
    CharacterConstantTooShort,
    BadUtf8,
    BadNumberConstant,
    BadHexadecimalConstant,
    BadDecimalExponent,
    BadBinaryExponent,
    IntegerConstantOutOfBounds,
    UnterminatedCharacterConstant,
    UnterminatedDoublequotedString,
    BadUniversalCharacterSequence,

    // --- token-level parsing ---
    TooManyTypeSpecifiers,
    ConflictingQualifiers,
    ConstantRequired,
    DuplicateTag,
    NotFound,
    ExpectedInt,
    NoComplexVariant,
    NonAtomic,
    MultipleDefinition,
    ExpectedExpression,
    BadOperator,

    // --- type-sanity (shape) ---
    StructEmpty,
    StructDuplicates,
    EnumDuplicates,
    BadAlignofArgument,
    BadRestrictedType,
    BadAtomicType,

    // --- type-checking (semantic) ---
    ExprNotCondition,
    CaseExprNonconstant,
    CaseDuplicate,
    BadOperatorTypes,
    Unserializable,
}

impl DiagCode {
    /// Stable machine-readable name, suitable for JSON rendering by an
    /// external collaborator (`spec.md` §6).
    #[must_use]
    pub fn name(self) -> &'static str {
        use DiagCode::*;
        match self {
            BadCharacterSequence => "BadCharacterSequence",
            CharacterConstantTooShort => "CharacterConstantTooShort",
            BadUtf8 => "BadUtf8",
            BadNumberConstant => "BadNumberConstant",
            BadHexadecimalConstant => "BadHexadecimalConstant",
            BadDecimalExponent => "BadDecimalExponent",
            BadBinaryExponent => "BadBinaryExponent",
            IntegerConstantOutOfBounds => "IntegerConstantOutOfBounds",
            UnterminatedCharacterConstant => "UnterminatedCharacterConstant",
            UnterminatedDoublequotedString => "UnterminatedDoublequotedString",
            BadUniversalCharacterSequence => "BadUniversalCharacterSequence",
            TooManyTypeSpecifiers => "TooManyTypeSpecifiers",
            ConflictingQualifiers => "ConflictingQualifiers",
            ConstantRequired => "ConstantRequired",
            DuplicateTag => "DuplicateTag",
            NotFound => "NotFound",
            ExpectedInt => "ExpectedInt",
            NoComplexVariant => "NoComplexVariant",
            NonAtomic => "NonAtomic",
            MultipleDefinition => "MultipleDefinition",
            ExpectedExpression => "ExpectedExpression",
            BadOperator => "BadOperator",
            StructEmpty => "StructEmpty",
            StructDuplicates => "StructDuplicates",
            EnumDuplicates => "EnumDuplicates",
            BadAlignofArgument => "BadAlignofArgument",
            BadRestrictedType => "BadRestrictedType",
            BadAtomicType => "BadAtomicType",
            ExprNotCondition => "ExprNotCondition",
            CaseExprNonconstant => "CaseExprNonconstant",
            CaseDuplicate => "CaseDuplicate",
            BadOperatorTypes => "BadOperatorTypes",
            Unserializable => "Unserializable",
        }
    }
}

#[derive(Clone)]
struct DiagInner {
    code: DiagCode,
    message: String,
    causes: Vec<Diag>,
    positions: Vec<Pos>,
}

/// A reference-counted diagnostic. Cloning is cheap (bumps the `Rc`); the
/// cause/position chains are additive, matching the "positions aggregate
/// rather than replace" propagation policy of `spec.md` §7.
#[derive(Clone)]
pub struct Diag(Rc<DiagInner>);

impl fmt::Debug for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diag")
            .field("code", &self.0.code)
            .field("message", &self.0.message)
            .field("causes", &self.0.causes.len())
            .field("positions", &self.0.positions.len())
            .finish()
    }
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.code.name(), self.0.message)
    }
}

impl std::error::Error for Diag {}

impl Diag {
    /// `new(kind, fmt, args...)`: since Rust has no `printf`-family
    /// varargs, callers build the message with `format!` and pass it here.
    #[must_use]
    pub fn new(code: DiagCode, message: impl Into<String>) -> Self {
        Diag(Rc::new(DiagInner { code, message: message.into(), causes: Vec::new(), positions: Vec::new() }))
    }

    #[must_use]
    pub fn code(&self) -> DiagCode {
        self.0.code
    }
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0.message
    }
    #[must_use]
    pub fn causes(&self) -> &[Diag] {
        &self.0.causes
    }
    #[must_use]
    pub fn positions(&self) -> &[Pos] {
        &self.0.positions
    }

    /// Append a cause. Takes `self` by value and returns it so construction
    /// reads as a builder chain; internally this clones-into-unique the
    /// `Rc` the way `dbcc_error_add_cause` mutates in place.
    #[must_use]
    pub fn with_cause(mut self, cause: Diag) -> Self {
        Rc::make_mut(&mut self.0).causes.push(cause);
        self
    }

    #[must_use]
    pub fn with_position(mut self, pos: Pos) -> Self {
        Rc::make_mut(&mut self.0).positions.push(pos);
        self
    }

    pub fn attach_cause(&mut self, cause: Diag) {
        Rc::make_mut(&mut self.0).causes.push(cause);
    }

    pub fn attach_position(&mut self, pos: Pos) {
        Rc::make_mut(&mut self.0).positions.push(pos);
    }

    /// Render the structured cause/position chain as an s-expression. This
    /// is the core's half of the "suitable for JSON rendering by an
    /// external collaborator" contract (`spec.md` §6): the core owns a
    /// walkable nested structure, not a JSON encoder.
    #[must_use]
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        use std::fmt::Write;
        let indent = "  ".repeat(depth);
        let _ = writeln!(out, "{indent}({} \"{}\"", self.0.code.name(), self.0.message);
        for pos in &self.0.positions {
            let _ = writeln!(out, "{indent}  @pos line={} col={}", pos.line(), pos.column());
        }
        for cause in &self.0.causes {
            cause.render_into(out, depth + 1);
        }
        let _ = writeln!(out, "{indent})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolSpace;
    use std::io::{Read, Seek, SeekFrom, Write};

    #[test]
    fn causes_and_positions_aggregate_rather_than_replace() {
        let space = SymbolSpace::new();
        let f = space.force_str("a.c");
        let root_cause = Diag::new(DiagCode::BadNumberConstant, "bad digit");
        let mut err = Diag::new(DiagCode::CaseExprNonconstant, "case value is not constant")
            .with_cause(root_cause);
        err.attach_position(Pos::new(f, 3, 1, 10));
        err.attach_position(Pos::new(f, 3, 5, 14));
        assert_eq!(err.causes().len(), 1);
        assert_eq!(err.positions().len(), 2);
    }

    #[test]
    fn render_tree_round_trips_through_a_file() {
        let space = SymbolSpace::new();
        let f = space.force_str("a.c");
        let inner = Diag::new(DiagCode::CaseDuplicate, "duplicate case value 1")
            .with_position(Pos::new(f, 10, 3, 90));
        let outer = Diag::new(DiagCode::Unserializable, "switch body abandoned").with_cause(inner);
        let rendered = outer.render_tree();

        let mut file = tempfile::tempfile().expect("create temp file");
        file.write_all(rendered.as_bytes()).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut back = String::new();
        file.read_to_string(&mut back).unwrap();
        assert_eq!(back, rendered);
        assert!(back.contains("CaseDuplicate"));
        assert!(back.contains("Unserializable"));
    }
}
