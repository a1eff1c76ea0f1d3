//! Lexically scoped lookup tables (`spec.md` §4.8), ported from
//! `dbcc-namespace.h`: four symbol-keyed maps per scope (ordinary names,
//! struct/union/enum tags), parent-chained for nested scopes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::diag::{Diag, DiagCode};
use crate::symbol::{Symbol, SymbolSpace};
use crate::target::TargetProfile;
use crate::types::{EnumValue, FloatDomain, FloatWidth, Type};

/// An ordinary-symbol entry: `spec.md` §3 "Ordinary-symbol entries are
/// themselves tagged: typedef / enum-value / global / local."
#[derive(Clone, Debug)]
pub enum Entry {
    Typedef(Type),
    EnumValue { enum_type: Type, value: EnumValue },
    Global { ty: Type, name: Symbol },
    Local { ty: Type, name: Symbol },
}

impl Entry {
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Entry::Typedef(t) => t.clone(),
            Entry::EnumValue { enum_type, .. } => enum_type.clone(),
            Entry::Global { ty, .. } | Entry::Local { ty, .. } => ty.clone(),
        }
    }
}

/// Canonical handles for every non-aggregate built-in type
/// (`spec.md` §2 item 5), populated once on the root namespace.
struct Builtins {
    void: Type,
    bool_: Type,
    char: Type,
    signed_char: Type,
    unsigned_char: Type,
    short: Type,
    unsigned_short: Type,
    int: Type,
    unsigned_int: Type,
    long: Type,
    unsigned_long: Type,
    long_long: Type,
    unsigned_long_long: Type,
    float: Type,
    double: Type,
    long_double: Type,
    float_complex: Type,
    double_complex: Type,
    long_double_complex: Type,
    float_imaginary: Type,
    double_imaginary: Type,
    long_double_imaginary: Type,
}

impl Builtins {
    fn new(space: &SymbolSpace, target: &TargetProfile) -> Self {
        let named = |name: &str, ty: Type| {
            let _ = space.force_str(name);
            ty
        };
        Builtins {
            void: Type::void(),
            bool_: named("bool", Type::bool_(target)),
            char: named("char", Type::int_with_align(1, target.is_char_signed, target)),
            signed_char: named("signed char", Type::int_with_align(1, true, target)),
            unsigned_char: named("unsigned char", Type::int_with_align(1, false, target)),
            short: named("short", Type::int_with_align(2, true, target)),
            unsigned_short: named("unsigned short", Type::int_with_align(2, false, target)),
            int: named("int", Type::int_with_align(target.sizeof_int, true, target)),
            unsigned_int: named("unsigned int", Type::int_with_align(target.sizeof_int, false, target)),
            long: named("long", Type::int_with_align(target.sizeof_long_int, true, target)),
            unsigned_long: named("unsigned long", Type::int_with_align(target.sizeof_long_int, false, target)),
            long_long: named("long long", Type::int_with_align(target.sizeof_long_long_int, true, target)),
            unsigned_long_long: named("unsigned long long", Type::int_with_align(target.sizeof_long_long_int, false, target)),
            float: named("float", Type::float_(FloatWidth::Float, FloatDomain::Real, target)),
            double: named("double", Type::float_(FloatWidth::Double, FloatDomain::Real, target)),
            long_double: named("long double", Type::float_(FloatWidth::LongDouble, FloatDomain::Real, target)),
            float_complex: Type::float_(FloatWidth::Float, FloatDomain::Complex, target),
            double_complex: Type::float_(FloatWidth::Double, FloatDomain::Complex, target),
            long_double_complex: Type::float_(FloatWidth::LongDouble, FloatDomain::Complex, target),
            float_imaginary: Type::float_(FloatWidth::Float, FloatDomain::Imaginary, target),
            double_imaginary: Type::float_(FloatWidth::Double, FloatDomain::Imaginary, target),
            long_double_imaginary: Type::float_(FloatWidth::LongDouble, FloatDomain::Imaginary, target),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TagKind {
    Struct,
    Union,
    Enum,
}

struct NamespaceInner {
    symbols: RefCell<HashMap<Symbol, Entry>>,
    struct_tags: RefCell<HashMap<Symbol, Type>>,
    union_tags: RefCell<HashMap<Symbol, Type>>,
    enum_tags: RefCell<HashMap<Symbol, Type>>,
    target: TargetProfile,
    chain: Option<Namespace>,
    builtins: Option<Builtins>,
}

/// A lexical scope. Cloning is cheap (bumps the `Rc`); scopes form a
/// read-only parent chain, each scope's own tables are independently
/// mutable via `RefCell` (`spec.md` §3).
#[derive(Clone)]
pub struct Namespace(Rc<NamespaceInner>);

impl Namespace {
    /// `new-global`: builds the root namespace and populates the built-in
    /// type handles (`spec.md` §4.8).
    #[must_use]
    pub fn new_global(space: &SymbolSpace, target: TargetProfile) -> Self {
        Namespace(Rc::new(NamespaceInner {
            symbols: RefCell::new(HashMap::new()),
            struct_tags: RefCell::new(HashMap::new()),
            union_tags: RefCell::new(HashMap::new()),
            enum_tags: RefCell::new(HashMap::new()),
            target,
            chain: None,
            builtins: Some(Builtins::new(space, &target)),
        }))
    }

    /// `new-scope`: a fresh scope linked to `self` as parent.
    #[must_use]
    pub fn new_scope(&self) -> Self {
        Namespace(Rc::new(NamespaceInner {
            symbols: RefCell::new(HashMap::new()),
            struct_tags: RefCell::new(HashMap::new()),
            union_tags: RefCell::new(HashMap::new()),
            enum_tags: RefCell::new(HashMap::new()),
            target: self.0.target,
            chain: Some(self.clone()),
            builtins: None,
        }))
    }

    #[must_use]
    pub fn target(&self) -> TargetProfile {
        self.0.target
    }

    /// Walks chained scopes until `sym` is found in the ordinary-symbol
    /// table.
    #[must_use]
    pub fn lookup(&self, sym: Symbol) -> Option<Entry> {
        let mut ns = self.clone();
        loop {
            if let Some(entry) = ns.0.symbols.borrow().get(&sym) {
                return Some(entry.clone());
            }
            match &ns.0.chain {
                Some(parent) => ns = parent.clone(),
                None => return None,
            }
        }
    }

    fn lookup_tag(&self, sym: Symbol, kind: TagKind) -> Option<Type> {
        let mut ns = self.clone();
        loop {
            let table = match kind {
                TagKind::Struct => &ns.0.struct_tags,
                TagKind::Union => &ns.0.union_tags,
                TagKind::Enum => &ns.0.enum_tags,
            };
            if let Some(ty) = table.borrow().get(&sym) {
                return Some(ty.clone());
            }
            match &ns.0.chain {
                Some(parent) => ns = parent.clone(),
                None => return None,
            }
        }
    }

    #[must_use]
    pub fn lookup_struct_tag(&self, sym: Symbol) -> Option<Type> {
        self.lookup_tag(sym, TagKind::Struct)
    }

    #[must_use]
    pub fn lookup_union_tag(&self, sym: Symbol) -> Option<Type> {
        self.lookup_tag(sym, TagKind::Union)
    }

    #[must_use]
    pub fn lookup_enum_tag(&self, sym: Symbol) -> Option<Type> {
        self.lookup_tag(sym, TagKind::Enum)
    }

    pub fn insert(&self, sym: Symbol, entry: Entry) {
        self.0.symbols.borrow_mut().insert(sym, entry);
    }

    pub fn add_enum_value(&self, enum_type: &Type, value: EnumValue) {
        self.insert(value.name, Entry::EnumValue { enum_type: enum_type.clone(), value });
    }

    /// `add-by-tag`: installs a struct/union/enum into its tag table in
    /// *this* scope. A duplicate tag of a differing aggregate kind is an
    /// error; re-registering the same kind (e.g. completing a forward
    /// declaration) is allowed.
    pub fn add_by_tag(&self, tag: Symbol, kind_table: AggregateKind, ty: Type) -> Result<(), Diag> {
        let table = match kind_table {
            AggregateKind::Struct => &self.0.struct_tags,
            AggregateKind::Union => &self.0.union_tags,
            AggregateKind::Enum => &self.0.enum_tags,
        };
        let mut conflicting = false;
        for (other_kind, other_table) in [
            (AggregateKind::Struct, &self.0.struct_tags),
            (AggregateKind::Union, &self.0.union_tags),
            (AggregateKind::Enum, &self.0.enum_tags),
        ] {
            if other_kind != kind_table && other_table.borrow().contains_key(&tag) {
                conflicting = true;
            }
        }
        if conflicting {
            return Err(Diag::new(DiagCode::DuplicateTag, "tag already declared as a different aggregate kind"));
        }
        table.borrow_mut().insert(tag, ty);
        Ok(())
    }

    fn builtins(&self) -> &Builtins {
        let mut ns = self;
        loop {
            if let Some(b) = &ns.0.builtins {
                return b;
            }
            ns = ns.0.chain.as_ref().expect("every scope chains up to the global namespace's builtins");
        }
    }

    // --- built-in accessors (`spec.md` §4.8) -------------------------------

    #[must_use]
    pub fn get_void_type(&self) -> Type {
        self.builtins().void.clone()
    }
    #[must_use]
    pub fn get_bool_type(&self) -> Type {
        self.builtins().bool_.clone()
    }
    /// Signed or unsigned per `target.is_char_signed`.
    #[must_use]
    pub fn get_char_type(&self) -> Type {
        self.builtins().char.clone()
    }
    #[must_use]
    pub fn get_signed_char_type(&self) -> Type {
        self.builtins().signed_char.clone()
    }
    #[must_use]
    pub fn get_unsigned_char_type(&self) -> Type {
        self.builtins().unsigned_char.clone()
    }
    #[must_use]
    pub fn get_short_type(&self) -> Type {
        self.builtins().short.clone()
    }
    #[must_use]
    pub fn get_unsigned_short_type(&self) -> Type {
        self.builtins().unsigned_short.clone()
    }
    /// Signed variant of `target.sizeof_int`.
    #[must_use]
    pub fn get_int_type(&self) -> Type {
        self.builtins().int.clone()
    }
    #[must_use]
    pub fn get_unsigned_int_type(&self) -> Type {
        self.builtins().unsigned_int.clone()
    }
    #[must_use]
    pub fn get_long_type(&self) -> Type {
        self.builtins().long.clone()
    }
    #[must_use]
    pub fn get_unsigned_long_type(&self) -> Type {
        self.builtins().unsigned_long.clone()
    }
    #[must_use]
    pub fn get_long_long_type(&self) -> Type {
        self.builtins().long_long.clone()
    }
    #[must_use]
    pub fn get_unsigned_long_long_type(&self) -> Type {
        self.builtins().unsigned_long_long.clone()
    }
    #[must_use]
    pub fn get_float_type(&self) -> Type {
        self.builtins().float.clone()
    }
    #[must_use]
    pub fn get_double_type(&self) -> Type {
        self.builtins().double.clone()
    }
    #[must_use]
    pub fn get_long_double_type(&self) -> Type {
        self.builtins().long_double.clone()
    }
    #[must_use]
    pub fn get_complex_float_type(&self) -> Type {
        self.builtins().float_complex.clone()
    }
    #[must_use]
    pub fn get_complex_double_type(&self) -> Type {
        self.builtins().double_complex.clone()
    }
    #[must_use]
    pub fn get_complex_long_double_type(&self) -> Type {
        self.builtins().long_double_complex.clone()
    }
    #[must_use]
    pub fn get_imaginary_float_type(&self) -> Type {
        self.builtins().float_imaginary.clone()
    }
    #[must_use]
    pub fn get_imaginary_double_type(&self) -> Type {
        self.builtins().double_imaginary.clone()
    }
    #[must_use]
    pub fn get_imaginary_long_double_type(&self) -> Type {
        self.builtins().long_double_imaginary.clone()
    }
    /// Unsigned of pointer width (`size_t`).
    #[must_use]
    pub fn get_size_type(&self) -> Type {
        Type::int_with_align(self.0.target.sizeof_pointer, false, &self.0.target)
    }
    /// Signed of pointer width (`ssize_t`).
    #[must_use]
    pub fn get_ssize_type(&self) -> Type {
        Type::int_with_align(self.0.target.sizeof_pointer, true, &self.0.target)
    }
    /// Signed of pointer width (`ptrdiff_t`).
    #[must_use]
    pub fn get_ptrdiff_type(&self) -> Type {
        Type::int_with_align(self.0.target.sizeof_pointer, true, &self.0.target)
    }
    /// Signed or unsigned of `target.sizeof_int`, matching `is_signed`.
    #[must_use]
    pub fn get_integer_type(&self, is_signed: bool, sizeof: u8) -> Type {
        Type::int_with_align(sizeof, is_signed, &self.0.target)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateKind {
    Struct,
    Union,
    Enum,
}
