//! The C11 type system: a reference-counted tagged-variant tree over
//! [`TypeKind`], built from the constructors in `spec.md` §4.4 and ported
//! from `dbcc-type.h`/`dbcc-type.c`.
//!
//! Every [`Type`] is `Rc<TypeNode>`; equality of derived pointer/array types
//! is *structural* (see [`Type::compatible`]), while aggregate (struct /
//! union / enum) identity is the `Rc` pointer itself, matching the
//! namespace's tag table being the sole owner of each declared aggregate.

pub mod layout;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bitflags::bitflags;

use crate::diag::{Diag, DiagCode};
use crate::symbol::Symbol;
use crate::target::TargetProfile;

use layout::{layout_struct, layout_union, BitField, MemberSpec, StructMember, UnionBranch};

bitflags! {
    /// `_Atomic`, `const`, `restrict`, `volatile`, per `dbcc.h`'s
    /// `DBCC_TypeQualifier`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Qualifiers: u8 {
        const CONST    = 1 << 0;
        const RESTRICT = 1 << 1;
        const VOLATILE = 1 << 2;
        const ATOMIC   = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatWidth {
    Float,
    Double,
    LongDouble,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatDomain {
    Real,
    Complex,
    Imaginary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnumValue {
    pub name: Symbol,
    pub value: i64,
}

/// One function parameter; `name` is absent for a prototype-only parameter
/// declaration (`int f(int, char)`).
#[derive(Clone, Debug)]
pub struct FunctionParam {
    pub name: Option<Symbol>,
    pub ty: Type,
}

#[derive(Debug)]
pub enum TypeKind {
    Void,
    Bool,
    Int { sizeof: u8, is_signed: bool },
    Float { width: FloatWidth, domain: FloatDomain },
    Array { element: Type, count: i64 },
    VariableLengthArray { element: Type },
    Struct { tag: Option<Symbol>, members: Vec<StructMember>, incomplete: bool },
    Union { tag: Option<Symbol>, branches: Vec<UnionBranch>, incomplete: bool },
    Enum { tag: Option<Symbol>, is_signed: bool, values: Vec<EnumValue> },
    Pointer { target: Type },
    Typedef { name: Symbol, underlying: Type },
    Qualified { underlying: Type, quals: Qualifiers },
    Function { ret: Type, params: Vec<FunctionParam>, varargs: bool },
}

/// A struct/union's sorted-by-symbol index, shared shape between the two
/// aggregate kinds: `Vec<u32>` of member indices, sorted by
/// `Symbol::into_usize` ("symbol identity order", `spec.md` §5).
fn symbol_index<T>(items: &[T], name_of: impl Fn(&T) -> Option<Symbol>) -> Vec<u32> {
    let mut idx: Vec<u32> = (0..items.len() as u32).filter(|&i| name_of(&items[i as usize]).is_some()).collect();
    idx.sort_by_key(|&i| name_of(&items[i as usize]).expect("filtered to Some above").into_usize());
    idx
}

fn binary_search_by_symbol<T>(items: &[T], index: &[u32], name_of: impl Fn(&T) -> Option<Symbol>, needle: Symbol) -> Option<u32> {
    index
        .binary_search_by_key(&needle.into_usize(), |&i| name_of(&items[i as usize]).expect("index only holds named entries").into_usize())
        .ok()
        .map(|pos| index[pos])
}

#[derive(Debug)]
struct TypeNode {
    kind: RefCell<TypeKind>,
    sizeof: Cell<u64>,
    alignof: Cell<u64>,
    /// Lazily rendered C-ish spelling, invalidated when a struct/union is
    /// completed in place.
    cached_name: RefCell<Option<Rc<str>>>,
    by_symbol: RefCell<Vec<u32>>,
    by_value: RefCell<Vec<u32>>,
}

/// A reference-counted C type. Cloning bumps the `Rc`; built-in scalar and
/// float handles are expected to live for the whole compilation (held by
/// the root [`crate::namespace::Namespace`]), derived types by whatever
/// declaration introduced them (`spec.md` §3 Lifecycle).
#[derive(Clone, Debug)]
pub struct Type(Rc<TypeNode>);

impl Type {
    fn leaf(kind: TypeKind, sizeof: u64, alignof: u64) -> Self {
        Type(Rc::new(TypeNode {
            kind: RefCell::new(kind),
            sizeof: Cell::new(sizeof),
            alignof: Cell::new(alignof),
            cached_name: RefCell::new(None),
            by_symbol: RefCell::new(Vec::new()),
            by_value: RefCell::new(Vec::new()),
        }))
    }

    #[must_use]
    pub fn ptr_eq(a: &Type, b: &Type) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    #[must_use]
    pub fn sizeof(&self) -> u64 {
        self.0.sizeof.get()
    }

    #[must_use]
    pub fn alignof(&self) -> u64 {
        self.0.alignof.get()
    }

    fn with_kind<R>(&self, f: impl FnOnce(&TypeKind) -> R) -> R {
        f(&self.0.kind.borrow())
    }

    // --- construction ---------------------------------------------------

    #[must_use]
    pub fn void() -> Self {
        Type::leaf(TypeKind::Void, 0, 1)
    }

    #[must_use]
    pub fn bool_(target: &TargetProfile) -> Self {
        Type::leaf(TypeKind::Bool, u64::from(target.sizeof_bool), u64::from(target.alignof_bool))
    }

    #[must_use]
    pub fn int_(sizeof: u8, is_signed: bool) -> Self {
        // alignof(int) == sizeof(int) for the widths this crate models
        // (1/2/4/8), which is what every LP64/LLP64 ABI `dbcc` targets uses.
        Type::leaf(TypeKind::Int { sizeof, is_signed }, u64::from(sizeof), u64::from(sizeof))
    }

    #[must_use]
    pub fn int_with_align(sizeof: u8, is_signed: bool, target: &TargetProfile) -> Self {
        Type::leaf(TypeKind::Int { sizeof, is_signed }, u64::from(sizeof), u64::from(target.alignof_int(sizeof)))
    }

    #[must_use]
    pub fn float_(width: FloatWidth, domain: FloatDomain, target: &TargetProfile) -> Self {
        let base_sizeof = match width {
            FloatWidth::Float => 4,
            FloatWidth::Double => 8,
            FloatWidth::LongDouble => u64::from(target.sizeof_long_double),
        };
        let alignof = match width {
            FloatWidth::Float => u64::from(target.alignof_float),
            FloatWidth::Double => u64::from(target.alignof_double),
            FloatWidth::LongDouble => u64::from(target.alignof_long_double),
        };
        let sizeof = match domain {
            FloatDomain::Real | FloatDomain::Imaginary => base_sizeof,
            FloatDomain::Complex => base_sizeof * 2,
        };
        Type::leaf(TypeKind::Float { width, domain }, sizeof, alignof)
    }

    #[must_use]
    pub fn pointer(target_ty: Type, target: &TargetProfile) -> Self {
        Type::leaf(TypeKind::Pointer { target: target_ty }, u64::from(target.sizeof_pointer), u64::from(target.sizeof_pointer))
    }

    /// `count = -1` selects an unspecified-length array (`int a[]`).
    #[must_use]
    pub fn array(element: Type, count: i64) -> Self {
        let alignof = element.alignof();
        let sizeof = if count >= 0 { element.sizeof() * count as u64 } else { 0 };
        Type::leaf(TypeKind::Array { element, count }, sizeof, alignof)
    }

    #[must_use]
    pub fn variable_length_array(element: Type) -> Self {
        let alignof = element.alignof();
        Type::leaf(TypeKind::VariableLengthArray { element }, 0, alignof)
    }

    /// Normalizes the `(void)` single-unnamed-void-parameter special case
    /// to an empty parameter list, per `spec.md` §4.4.
    #[must_use]
    pub fn function(ret: Type, mut params: Vec<FunctionParam>, varargs: bool) -> Self {
        if params.len() == 1 && params[0].name.is_none() && params[0].ty.with_kind(|k| matches!(k, TypeKind::Void)) {
            params.clear();
        }
        Type::leaf(TypeKind::Function { ret, params, varargs }, 0, 1)
    }

    #[must_use]
    pub fn typedef(name: Symbol, underlying: Type) -> Self {
        let (sizeof, alignof) = (underlying.sizeof(), underlying.alignof());
        Type::leaf(TypeKind::Typedef { name, underlying }, sizeof, alignof)
    }

    /// Merges into an already-`Qualified` base rather than nesting, and
    /// enforces `restrict`-only-on-pointer / `atomic`-never-on-array-or-function
    /// (`spec.md` §4.4 invariants).
    pub fn qualified(base: Type, quals: Qualifiers) -> Result<Type, Diag> {
        if quals.is_empty() {
            return Ok(base);
        }
        if quals.contains(Qualifiers::RESTRICT) && !base.with_kind(|k| matches!(k, TypeKind::Pointer { .. })) {
            return Err(Diag::new(DiagCode::BadRestrictedType, "restrict may only qualify a pointer type"));
        }
        if quals.contains(Qualifiers::ATOMIC)
            && base.with_kind(|k| matches!(k, TypeKind::Array { .. } | TypeKind::VariableLengthArray { .. } | TypeKind::Function { .. }))
        {
            return Err(Diag::new(DiagCode::BadAtomicType, "_Atomic may not qualify an array or function type"));
        }

        let (underlying, merged) = match base.with_kind(|k| {
            if let TypeKind::Qualified { underlying, quals: existing } = k {
                Some((underlying.clone(), *existing | quals))
            } else {
                None
            }
        }) {
            Some((u, m)) => (u, m),
            None => (base, quals),
        };
        let (sizeof, alignof) = (underlying.sizeof(), underlying.alignof());
        Ok(Type::leaf(TypeKind::Qualified { underlying, quals: merged }, sizeof, alignof))
    }

    pub fn struct_(tag: Option<Symbol>, members: Vec<MemberSpec>, target: &TargetProfile) -> Result<Type, Diag> {
        let layout = layout_struct(&members, target)?;
        let by_symbol = symbol_index(&layout.members, |m: &StructMember| m.name);
        let node = Type::leaf(
            TypeKind::Struct { tag, members: layout.members, incomplete: false },
            layout.sizeof,
            layout.alignof,
        );
        *node.0.by_symbol.borrow_mut() = by_symbol;
        Ok(node)
    }

    pub fn union_(tag: Option<Symbol>, branches: Vec<MemberSpec>, target: &TargetProfile) -> Result<Type, Diag> {
        let layout = layout_union(&branches, target)?;
        let by_symbol = symbol_index(&layout.branches, |m: &UnionBranch| m.name);
        let node = Type::leaf(
            TypeKind::Union { tag, branches: layout.branches, incomplete: false },
            layout.sizeof,
            layout.alignof,
        );
        *node.0.by_symbol.borrow_mut() = by_symbol;
        Ok(node)
    }

    /// `is_signed` is decided by the caller (typically by inspecting the
    /// enumerator value range before this constructor runs); see
    /// `DESIGN.md` for why this module does not re-derive it.
    pub fn enum_(tag: Option<Symbol>, is_signed: bool, values: Vec<EnumValue>, target: &TargetProfile) -> Result<Type, Diag> {
        let mut names: Vec<Symbol> = values.iter().map(|v| v.name).collect();
        names.sort_by_key(|s| s.into_usize());
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(Diag::new(DiagCode::EnumDuplicates, "duplicate enumerator name"));
        }

        let by_symbol = symbol_index(&values, |v: &EnumValue| Some(v.name));
        let mut by_value: Vec<u32> = (0..values.len() as u32).collect();
        by_value.sort_by_key(|&i| values[i as usize].value);

        let node = Type::leaf(
            TypeKind::Enum { tag, is_signed, values },
            u64::from(target.sizeof_int),
            u64::from(target.alignof_int(target.sizeof_int)),
        );
        *node.0.by_symbol.borrow_mut() = by_symbol;
        *node.0.by_value.borrow_mut() = by_value;
        Ok(node)
    }

    #[must_use]
    pub fn incomplete_struct(tag: Symbol) -> Type {
        Type::leaf(TypeKind::Struct { tag: Some(tag), members: Vec::new(), incomplete: true }, 0, 1)
    }

    #[must_use]
    pub fn incomplete_union(tag: Symbol) -> Type {
        Type::leaf(TypeKind::Union { tag: Some(tag), branches: Vec::new(), incomplete: true }, 0, 1)
    }

    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.with_kind(|k| matches!(k, TypeKind::Struct { incomplete: true, .. } | TypeKind::Union { incomplete: true, .. }))
    }

    /// Fills an incomplete struct's members in place and recomputes layout;
    /// every existing `Type` clone observes the update (`spec.md` §4.4).
    pub fn complete_struct(&self, members: Vec<MemberSpec>, target: &TargetProfile) -> Result<(), Diag> {
        let tag = match &*self.0.kind.borrow() {
            TypeKind::Struct { tag, incomplete: true, .. } => *tag,
            TypeKind::Struct { incomplete: false, .. } => return Err(Diag::new(DiagCode::DuplicateTag, "struct already complete")),
            _ => return Err(Diag::new(DiagCode::DuplicateTag, "not an incomplete struct")),
        };
        let layout = layout_struct(&members, target)?;
        let by_symbol = symbol_index(&layout.members, |m: &StructMember| m.name);
        *self.0.kind.borrow_mut() = TypeKind::Struct { tag, members: layout.members, incomplete: false };
        *self.0.by_symbol.borrow_mut() = by_symbol;
        self.0.sizeof.set(layout.sizeof);
        self.0.alignof.set(layout.alignof);
        *self.0.cached_name.borrow_mut() = None;
        Ok(())
    }

    pub fn complete_union(&self, members: Vec<MemberSpec>, target: &TargetProfile) -> Result<(), Diag> {
        let tag = match &*self.0.kind.borrow() {
            TypeKind::Union { tag, incomplete: true, .. } => *tag,
            TypeKind::Union { incomplete: false, .. } => return Err(Diag::new(DiagCode::DuplicateTag, "union already complete")),
            _ => return Err(Diag::new(DiagCode::DuplicateTag, "not an incomplete union")),
        };
        let layout = layout_union(&members, target)?;
        let by_symbol = symbol_index(&layout.branches, |m: &UnionBranch| m.name);
        *self.0.kind.borrow_mut() = TypeKind::Union { tag, branches: layout.branches, incomplete: false };
        *self.0.by_symbol.borrow_mut() = by_symbol;
        self.0.sizeof.set(layout.sizeof);
        self.0.alignof.set(layout.alignof);
        *self.0.cached_name.borrow_mut() = None;
        Ok(())
    }

    // --- struct/union/enum lookups (supplemented from original_source) --

    /// `dbcc_type_struct_lookup_member` / the union equivalent: binary
    /// search on the by-symbol index.
    #[must_use]
    pub fn member_by_symbol(&self, name: Symbol) -> Option<StructMemberRef> {
        self.with_kind(|k| match k {
            TypeKind::Struct { members, .. } => {
                let idx = binary_search_by_symbol(members, &self.0.by_symbol.borrow(), |m| m.name, name)?;
                Some(StructMemberRef { offset: members[idx as usize].offset, ty: members[idx as usize].ty.clone(), bitfield: members[idx as usize].bitfield })
            }
            TypeKind::Union { branches, .. } => {
                let idx = binary_search_by_symbol(branches, &self.0.by_symbol.borrow(), |m| m.name, name)?;
                Some(StructMemberRef { offset: 0, ty: branches[idx as usize].ty.clone(), bitfield: branches[idx as usize].bitfield })
            }
            _ => None,
        })
    }

    /// `dbcc_type_enum_lookup_value`: binary search on the by-value index.
    #[must_use]
    pub fn enum_lookup_value(&self, value: i64) -> Option<EnumValue> {
        self.with_kind(|k| {
            let TypeKind::Enum { values, .. } = k else { return None };
            let by_value = self.0.by_value.borrow();
            let pos = by_value.binary_search_by_key(&value, |&i| values[i as usize].value).ok()?;
            Some(values[by_value[pos] as usize])
        })
    }

    /// `dbcc_type_enum_lookup_value_by_name` (supplement).
    #[must_use]
    pub fn enum_lookup_value_by_name(&self, name: Symbol) -> Option<EnumValue> {
        self.with_kind(|k| {
            let TypeKind::Enum { values, .. } = k else { return None };
            let idx = binary_search_by_symbol(values, &self.0.by_symbol.borrow(), |v| Some(v.name), name)?;
            Some(values[idx as usize])
        })
    }

    // --- relations --------------------------------------------------------

    /// Repeatedly strips `Qualified` and `Typedef` wrappers.
    #[must_use]
    pub fn dequalify(&self) -> Type {
        let mut cur = self.clone();
        loop {
            let next = cur.with_kind(|k| match k {
                TypeKind::Qualified { underlying, .. } | TypeKind::Typedef { underlying, .. } => Some(underlying.clone()),
                _ => None,
            });
            match next {
                Some(n) => cur = n,
                None => return cur,
            }
        }
    }

    #[must_use]
    pub fn get_qualifiers(&self) -> Qualifiers {
        self.with_kind(|k| if let TypeKind::Qualified { quals, .. } = k { *quals } else { Qualifiers::empty() })
    }

    /// Dequalified identity equality (`spec.md` §4.4). Aggregates
    /// (struct/union/enum) compare by `Rc` identity, since each is owned
    /// singly by the tag table that declared it; scalars, pointers,
    /// arrays, and function types compare structurally.
    #[must_use]
    pub fn compatible(a: &Type, b: &Type) -> bool {
        structurally_equal(&a.dequalify(), &b.dequalify())
    }

    /// When `a` and `b` are compatible, the qualified union of their
    /// qualifier sets applied to the shared dequalified type.
    #[must_use]
    pub fn composite(a: &Type, b: &Type) -> Option<Type> {
        if !Type::compatible(a, b) {
            return None;
        }
        let merged = a.get_qualifiers() | b.get_qualifiers();
        Type::qualified(a.dequalify(), merged).ok()
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        let t = self.dequalify();
        t.with_kind(|k| {
            matches!(
                k,
                TypeKind::Int { .. } | TypeKind::Bool | TypeKind::Float { .. } | TypeKind::Pointer { .. } | TypeKind::Enum { .. }
            )
        })
    }

    #[must_use]
    pub fn is_integer(&self) -> bool {
        let t = self.dequalify();
        t.with_kind(|k| matches!(k, TypeKind::Int { .. } | TypeKind::Bool | TypeKind::Enum { .. }))
    }

    #[must_use]
    pub fn is_real(&self) -> bool {
        let t = self.dequalify();
        t.is_integer() || t.with_kind(|k| matches!(k, TypeKind::Float { domain: FloatDomain::Real, .. }))
    }

    #[must_use]
    pub fn is_complex(&self) -> bool {
        self.dequalify().with_kind(|k| matches!(k, TypeKind::Float { domain: FloatDomain::Complex, .. }))
    }

    #[must_use]
    pub fn is_imaginary(&self) -> bool {
        self.dequalify().with_kind(|k| matches!(k, TypeKind::Float { domain: FloatDomain::Imaginary, .. }))
    }

    #[must_use]
    pub fn is_floating_point(&self) -> bool {
        self.dequalify().with_kind(|k| matches!(k, TypeKind::Float { .. }))
    }

    #[must_use]
    pub fn is_arithmetic(&self) -> bool {
        let t = self.dequalify();
        t.is_integer() || t.is_floating_point()
    }

    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        let t = self.dequalify();
        t.with_kind(|k| match k {
            TypeKind::Int { is_signed, .. } => !is_signed,
            TypeKind::Bool => true,
            TypeKind::Enum { is_signed, .. } => !is_signed,
            _ => false,
        })
    }

    #[must_use]
    pub fn is_pointer(&self) -> bool {
        self.dequalify().with_kind(|k| matches!(k, TypeKind::Pointer { .. }))
    }

    #[must_use]
    pub fn pointer_dereference(&self) -> Option<Type> {
        self.dequalify().with_kind(|k| if let TypeKind::Pointer { target } = k { Some(target.clone()) } else { None })
    }

    /// The element type if `self` dequalifies to an array or VLA, e.g. for
    /// the array-to-pointer decay a subscript target undergoes.
    #[must_use]
    pub fn array_element(&self) -> Option<Type> {
        self.dequalify().with_kind(|k| match k {
            TypeKind::Array { element, .. } | TypeKind::VariableLengthArray { element } => Some(element.clone()),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_function_type(&self) -> bool {
        self.dequalify().with_kind(|k| matches!(k, TypeKind::Function { .. }))
    }

    /// `(return, params, varargs)` if `self` dequalifies to a function type.
    #[must_use]
    pub fn as_function(&self) -> Option<(Type, Vec<FunctionParam>, bool)> {
        self.dequalify().with_kind(|k| {
            if let TypeKind::Function { ret, params, varargs } = k {
                Some((ret.clone(), params.clone(), *varargs))
            } else {
                None
            }
        })
    }

    /// The type of the named member of a struct/union, or `None` if `self`
    /// is not an aggregate or has no such member.
    #[must_use]
    pub fn member_by_symbol_type(&self, name: Symbol) -> Option<Type> {
        self.member_by_symbol(name).map(|m| m.ty)
    }

    /// `dbcc_type_is_const` (supplement): is the top-level type
    /// `const`-qualified (directly, or via a transparent typedef)?
    #[must_use]
    pub fn is_const(&self) -> bool {
        let mut cur = self.clone();
        loop {
            let step = cur.with_kind(|k| match k {
                TypeKind::Qualified { quals, underlying } => {
                    if quals.contains(Qualifiers::CONST) {
                        ConstWalk::Const
                    } else {
                        ConstWalk::Next(underlying.clone())
                    }
                }
                TypeKind::Typedef { underlying, .. } => ConstWalk::Next(underlying.clone()),
                _ => ConstWalk::NotConst,
            });
            match step {
                ConstWalk::Const => return true,
                ConstWalk::NotConst => return false,
                ConstWalk::Next(n) => cur = n,
            }
        }
    }

    /// `dbcc_type_implicitly_convertable` (supplement): may a value of
    /// `self` be used where `target` is expected (call arguments,
    /// initializers, `=`) without an explicit cast?
    #[must_use]
    pub fn implicitly_convertible_to(&self, target: &Type) -> bool {
        let (a, b) = (self.dequalify(), target.dequalify());
        if a.is_arithmetic() && b.is_arithmetic() {
            return true;
        }
        if a.is_pointer() && b.is_pointer() {
            let (pa, pb) = (a.pointer_dereference().expect("is_pointer"), b.pointer_dereference().expect("is_pointer"));
            if pb.dequalify().with_kind(|k| matches!(k, TypeKind::Void)) || pa.dequalify().with_kind(|k| matches!(k, TypeKind::Void)) {
                return true;
            }
            return Type::compatible(&pa, &pb);
        }
        // A null-pointer constant (modeled upstream as an integer constant
        // 0) converting to any pointer type is handled by the expression
        // builder, which knows the operand is a literal zero; this relation
        // only judges the types themselves.
        Type::compatible(&a, &b)
    }

    // --- usual arithmetic conversion ---------------------------------------

    /// `spec.md` §4.4 "Usual Arithmetic Conversion (6.3.1.8)".
    #[must_use]
    pub fn usual_arithmetic_conversion(a: &Type, b: &Type, target: &TargetProfile) -> Type {
        let a = a.dequalify();
        let b = b.dequalify();

        let float_of = |t: &Type| t.with_kind(|k| if let TypeKind::Float { width, domain } = k { Some((*width, *domain)) } else { None });

        let a_float = float_of(&a);
        let b_float = float_of(&b);
        let either_complex = matches!(a_float, Some((_, FloatDomain::Complex))) || matches!(b_float, Some((_, FloatDomain::Complex)));

        let is_width = |f: Option<(FloatWidth, FloatDomain)>, w: FloatWidth| matches!(f, Some((fw, _)) if fw == w);

        if is_width(a_float, FloatWidth::LongDouble) || is_width(b_float, FloatWidth::LongDouble) {
            let domain = if either_complex { FloatDomain::Complex } else { FloatDomain::Real };
            return Type::float_(FloatWidth::LongDouble, domain, target);
        }
        if is_width(a_float, FloatWidth::Double) || is_width(b_float, FloatWidth::Double) {
            let domain = if either_complex { FloatDomain::Complex } else { FloatDomain::Real };
            return Type::float_(FloatWidth::Double, domain, target);
        }
        if is_width(a_float, FloatWidth::Float) || is_width(b_float, FloatWidth::Float) {
            let domain = if either_complex { FloatDomain::Complex } else { FloatDomain::Real };
            return Type::float_(FloatWidth::Float, domain, target);
        }

        let promote = |t: &Type| -> Type {
            t.with_kind(|k| match k {
                TypeKind::Enum { is_signed, .. } => Type::int_with_align(target.sizeof_int, *is_signed, target),
                TypeKind::Bool => Type::int_with_align(target.sizeof_int, true, target),
                TypeKind::Int { sizeof, .. } if u64::from(*sizeof) < u64::from(target.sizeof_int) => {
                    Type::int_with_align(target.sizeof_int, true, target)
                }
                TypeKind::Int { sizeof, is_signed } => Type::int_with_align(*sizeof, *is_signed, target),
                _ => unreachable!("usual_arithmetic_conversion called on a non-arithmetic operand"),
            })
        };
        let pa = promote(&a);
        let pb = promote(&b);

        let (sa, signed_a) = pa.with_kind(|k| if let TypeKind::Int { sizeof, is_signed } = k { (*sizeof, *is_signed) } else { unreachable!() });
        let (sb, signed_b) = pb.with_kind(|k| if let TypeKind::Int { sizeof, is_signed } = k { (*sizeof, *is_signed) } else { unreachable!() });

        if signed_a == signed_b {
            return if sa >= sb { pa } else { pb };
        }
        let (unsigned, unsigned_w, signed, signed_w) = if !signed_a { (pa.clone(), sa, pb.clone(), sb) } else { (pb.clone(), sb, pa.clone(), sa) };
        if unsigned_w >= signed_w {
            unsigned
        } else {
            // signed strictly wider: it represents every unsigned value.
            signed.with_kind(|k| {
                if let TypeKind::Int { sizeof, .. } = k {
                    Type::int_with_align(*sizeof, false, target)
                } else {
                    unreachable!()
                }
            })
        }
    }
}

struct StructMemberRef {
    pub offset: u64,
    pub ty: Type,
    pub bitfield: Option<BitField>,
}

enum ConstWalk {
    Const,
    NotConst,
    Next(Type),
}

fn structurally_equal(a: &Type, b: &Type) -> bool {
    a.with_kind(|ka| {
        b.with_kind(|kb| match (ka, kb) {
            (TypeKind::Void, TypeKind::Void) | (TypeKind::Bool, TypeKind::Bool) => true,
            (TypeKind::Int { sizeof: s1, is_signed: g1 }, TypeKind::Int { sizeof: s2, is_signed: g2 }) => s1 == s2 && g1 == g2,
            (TypeKind::Float { width: w1, domain: d1 }, TypeKind::Float { width: w2, domain: d2 }) => w1 == w2 && d1 == d2,
            (TypeKind::Pointer { target: t1 }, TypeKind::Pointer { target: t2 }) => qualified_equal(t1, t2),
            (TypeKind::Array { element: e1, count: c1 }, TypeKind::Array { element: e2, count: c2 }) => c1 == c2 && qualified_equal(e1, e2),
            (TypeKind::VariableLengthArray { element: e1 }, TypeKind::VariableLengthArray { element: e2 }) => qualified_equal(e1, e2),
            (TypeKind::Function { ret: r1, params: p1, varargs: v1 }, TypeKind::Function { ret: r2, params: p2, varargs: v2 }) => {
                v1 == v2 && qualified_equal(r1, r2) && p1.len() == p2.len() && p1.iter().zip(p2).all(|(x, y)| qualified_equal(&x.ty, &y.ty))
            }
            (TypeKind::Struct { .. }, TypeKind::Struct { .. }) | (TypeKind::Union { .. }, TypeKind::Union { .. }) | (TypeKind::Enum { .. }, TypeKind::Enum { .. }) => {
                Type::ptr_eq(a, b)
            }
            _ => false,
        })
    })
}

/// Like `structurally_equal`, but for nested type positions (pointee,
/// element, return/param types) where qualifiers are significant rather
/// than stripped: two `Qualified` layers must carry the same mask.
fn qualified_equal(a: &Type, b: &Type) -> bool {
    let (ua, qa) = unwrap_one_qualified(a);
    let (ub, qb) = unwrap_one_qualified(b);
    qa == qb && structurally_equal(&ua.dequalify_typedefs_only(), &ub.dequalify_typedefs_only())
}

fn unwrap_one_qualified(t: &Type) -> (Type, Qualifiers) {
    t.with_kind(|k| if let TypeKind::Qualified { underlying, quals } = k { (underlying.clone(), *quals) } else { (t.clone(), Qualifiers::empty()) })
}

impl Type {
    fn dequalify_typedefs_only(&self) -> Type {
        let mut cur = self.clone();
        loop {
            let next = cur.with_kind(|k| if let TypeKind::Typedef { underlying, .. } = k { Some(underlying.clone()) } else { None });
            match next {
                Some(n) => cur = n,
                None => return cur,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> TargetProfile {
        TargetProfile::host()
    }

    #[test]
    fn dequalify_strips_qualified_and_typedef() {
        let target = t();
        let int_ty = Type::int_with_align(target.sizeof_int, true, &target);
        let qualified = Type::qualified(int_ty.clone(), Qualifiers::CONST).unwrap();
        assert!(Type::compatible(&qualified, &int_ty));
        assert_eq!(qualified.dequalify().sizeof(), int_ty.sizeof());
    }

    #[test]
    fn qualified_merges_rather_than_nests() {
        let target = t();
        let int_ty = Type::int_with_align(target.sizeof_int, true, &target);
        let once = Type::qualified(int_ty, Qualifiers::CONST).unwrap();
        let twice = Type::qualified(once, Qualifiers::VOLATILE).unwrap();
        assert_eq!(twice.get_qualifiers(), Qualifiers::CONST | Qualifiers::VOLATILE);
    }

    #[test]
    fn restrict_requires_pointer() {
        let target = t();
        let int_ty = Type::int_with_align(target.sizeof_int, true, &target);
        assert!(Type::qualified(int_ty, Qualifiers::RESTRICT).is_err());
    }

    #[test]
    fn atomic_forbidden_on_array() {
        let target = t();
        let int_ty = Type::int_with_align(target.sizeof_int, true, &target);
        let arr = Type::array(int_ty, 4);
        assert!(Type::qualified(arr, Qualifiers::ATOMIC).is_err());
    }

    #[test]
    fn uac_prefers_long_double_then_double_then_float() {
        let target = t();
        let ld = Type::float_(FloatWidth::LongDouble, FloatDomain::Real, &target);
        let d = Type::float_(FloatWidth::Double, FloatDomain::Real, &target);
        let result = Type::usual_arithmetic_conversion(&ld, &d, &target);
        assert!(matches!(*result.0.kind.borrow(), TypeKind::Float { width: FloatWidth::LongDouble, .. }));
    }

    #[test]
    fn uac_same_signedness_picks_wider() {
        let target = t();
        let i32_ = Type::int_with_align(4, true, &target);
        let i64_ = Type::int_with_align(8, true, &target);
        let result = Type::usual_arithmetic_conversion(&i32_, &i64_, &target);
        assert_eq!(result.sizeof(), 8);
    }

    #[test]
    fn uac_unsigned_wins_when_rank_at_least_as_large() {
        let target = t();
        let u32_ = Type::int_with_align(4, false, &target);
        let i32_ = Type::int_with_align(4, true, &target);
        let result = Type::usual_arithmetic_conversion(&u32_, &i32_, &target);
        assert!(result.is_unsigned());
        assert_eq!(result.sizeof(), 4);
    }

    #[test]
    fn uac_wider_signed_beats_narrower_unsigned() {
        let target = t();
        let u32_ = Type::int_with_align(4, false, &target);
        let i64_ = Type::int_with_align(8, true, &target);
        let result = Type::usual_arithmetic_conversion(&u32_, &i64_, &target);
        assert!(!result.is_unsigned());
        assert_eq!(result.sizeof(), 8);
    }

    #[test]
    fn struct_layout_and_member_lookup() {
        let target = t();
        use crate::symbol::SymbolSpace;
        let space = SymbolSpace::new();
        let x = space.force_str("x");
        let y = space.force_str("y");
        let members = vec![
            MemberSpec { name: Some(x), ty: Type::int_with_align(1, true, &target), bit_length: None },
            MemberSpec { name: Some(y), ty: Type::int_with_align(4, true, &target), bit_length: None },
        ];
        let s = Type::struct_(None, members, &target).unwrap();
        assert_eq!(s.sizeof(), 8);
        let found = s.member_by_symbol(y).unwrap();
        assert_eq!(found.offset, 4);
        assert!(s.member_by_symbol(space.force_str("z")).is_none());
    }

    #[test]
    fn incomplete_struct_completes_in_place_and_existing_handles_see_it() {
        let target = t();
        use crate::symbol::SymbolSpace;
        let space = SymbolSpace::new();
        let tag = space.force_str("Point");
        let incomplete = Type::incomplete_struct(tag);
        let alias = incomplete.clone();
        assert!(alias.is_incomplete());

        let x = space.force_str("x");
        incomplete
            .complete_struct(vec![MemberSpec { name: Some(x), ty: Type::int_with_align(4, true, &target), bit_length: None }], &target)
            .unwrap();
        assert!(!alias.is_incomplete());
        assert_eq!(alias.sizeof(), 4);
    }

    #[test]
    fn enum_lookup_by_value_and_name() {
        let target = t();
        use crate::symbol::SymbolSpace;
        let space = SymbolSpace::new();
        let red = space.force_str("RED");
        let green = space.force_str("GREEN");
        let e = Type::enum_(None, true, vec![EnumValue { name: red, value: 0 }, EnumValue { name: green, value: 1 }], &target).unwrap();
        assert_eq!(e.enum_lookup_value(1).unwrap().name, green);
        assert_eq!(e.enum_lookup_value_by_name(red).unwrap().value, 0);
        assert!(e.enum_lookup_value(99).is_none());
    }

    #[test]
    fn pointer_to_void_is_implicitly_convertible_either_way() {
        let target = t();
        let void_ptr = Type::pointer(Type::void(), &target);
        let int_ptr = Type::pointer(Type::int_with_align(4, true, &target), &target);
        assert!(void_ptr.implicitly_convertible_to(&int_ptr));
        assert!(int_ptr.implicitly_convertible_to(&void_ptr));
    }
}
