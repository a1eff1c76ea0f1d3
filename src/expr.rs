//! The expression tree and its constructors: shape validation, value-type
//! derivation by the usual arithmetic conversion, and constant folding
//! (`spec.md` §4.6), ported from `DBCC_Expr`/`dbcc_expr_new_*`
//! (`dbcc-expr.h`/`dbcc-expr.c`).
//!
//! Every constructor is a free function (or `Expr` associated function)
//! returning `Result<Expr, Diag>`: shape failures surface as a `Diag`
//! immediately rather than building a malformed node. Constant folding is
//! opportunistic — it runs whenever every operand already carries a
//! literal-value [`Constant`], and leaves `constant: None` otherwise so a
//! later pass over the tree can retry once more operands resolve.

use std::rc::Rc;

use crate::constant::{CompareOp, Constant, Tristate};
use crate::diag::{Diag, DiagCode};
use crate::position::Pos;
use crate::symbol::Symbol;
use crate::target::TargetProfile;
use crate::types::Type;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    BitNot,
    LogicalNot,
    AddressOf,
    Deref,
}

/// `++`/`--`, prefix or postfix (`spec.md` §3 "inplace-unary").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncDecOp {
    Increment,
    Decrement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LogicalAnd,
    LogicalOr,
    Comma,
}

/// One designator step in a structured-initializer piece: a named member or
/// an array index (`spec.md` §4.6, `DBCC_Designator`).
#[derive(Clone, Debug)]
pub enum Designator {
    Member(Symbol),
    Index(u64),
}

/// A flattened, offset-ordered initializer piece, the result of walking a
/// structured initializer's designator chains against the target type's
/// shape.
#[derive(Clone, Debug)]
pub struct InitPiece {
    pub offset: u64,
    pub length: u64,
    pub expr: Expr,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    /// A bare literal: the fold value lives in `ExprNode::constant`.
    Literal,
    Variable { name: Symbol },
    Unary { op: UnaryOp, operand: Expr },
    Binary { op: BinaryOp, lhs: Expr, rhs: Expr },
    Ternary { cond: Expr, then_branch: Expr, else_branch: Expr },
    Cast { operand: Expr },
    AlignofType,
    AlignofExpr { operand: Expr },
    SizeofType,
    SizeofExpr { operand: Expr },
    Call { head: Expr, args: Vec<Expr> },
    Member { object: Expr, name: Symbol, arrow: bool },
    Subscript { object: Expr, index: Expr },
    StructuredInitializer { pieces: Vec<InitPiece> },
    /// `++x` / `x++` / `--x` / `x--`; never folds (mutates an lvalue).
    InplaceUnary { op: IncDecOp, operand: Expr, prefix: bool },
    /// `x op= y` (`+=`, `-=`, `*=`, ...); `op` is the underlying arithmetic
    /// operator. Never folds (mutates an lvalue).
    InplaceBinary { op: BinaryOp, lhs: Expr, rhs: Expr },
    /// `_Generic(controlling, T1: e1, T2: e2, ..., default: e)`
    /// (`spec.md` §3 "generic-selection"). `selected` indexes `assocs`.
    GenericSelection { controlling: Expr, assocs: Vec<(Option<Type>, Expr)>, selected: usize },
}

#[derive(Clone, Debug)]
struct ExprNode {
    kind: ExprKind,
    value_type: Type,
    constant: Option<Constant>,
    position: Option<Pos>,
}

/// A reference-counted expression node. Cloning is cheap; sharing one
/// sub-expression across multiple parents (e.g. a compound assignment's
/// left-hand side evaluated once) is intentional, matching the teacher's
/// `Rc`-based tree idiom elsewhere in this crate.
#[derive(Clone, Debug)]
pub struct Expr(Rc<ExprNode>);

impl Expr {
    #[must_use]
    pub fn value_type(&self) -> &Type {
        &self.0.value_type
    }

    #[must_use]
    pub fn constant(&self) -> Option<&Constant> {
        self.0.constant.as_ref()
    }

    #[must_use]
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    #[must_use]
    pub fn position(&self) -> Option<&Pos> {
        self.0.position.as_ref()
    }

    #[must_use]
    pub fn with_position(mut self, pos: Pos) -> Self {
        Rc::make_mut(&mut self.0).position = Some(pos);
        self
    }

    fn new(kind: ExprKind, value_type: Type, constant: Option<Constant>) -> Self {
        Expr(Rc::new(ExprNode { kind, value_type, constant, position: None }))
    }

    fn is_value_constant(&self) -> bool {
        matches!(self.0.constant, Some(Constant::Value(_)))
    }

    // --- literal constructors -------------------------------------------

    #[must_use]
    pub fn int_constant(ty: Type, value: i128) -> Self {
        let c = Constant::from_i128(&ty, value);
        Expr::new(ExprKind::Literal, ty, Some(c))
    }

    #[must_use]
    pub fn float_constant(ty: Type, value: f64) -> Self {
        let c = Constant::from_f64(&ty, value);
        Expr::new(ExprKind::Literal, ty, Some(c))
    }

    #[must_use]
    pub fn enum_constant(enum_ty: Type, value: i64) -> Self {
        let c = Constant::from_i128(&enum_ty, i128::from(value));
        Expr::new(ExprKind::Literal, enum_ty, Some(c))
    }

    /// A name reference; its value is not generally constant (only an
    /// already-folded enum constant is), so callers of `variable` for a
    /// plain object should prefer [`Expr::enum_constant`] when the symbol
    /// resolves to an enumerator.
    #[must_use]
    pub fn variable(name: Symbol, ty: Type) -> Self {
        Expr::new(ExprKind::Variable { name }, ty, None)
    }

    // --- alignof / sizeof -------------------------------------------------

    /// `alignof(type)`: fails on function or incomplete struct/union;
    /// result is `size_t`-width unsigned, value is the type's `alignof`.
    pub fn alignof_type(ty: &Type, size_t: Type, target: &TargetProfile) -> Result<Expr, Diag> {
        let _ = target;
        if ty.is_function_type() {
            return Err(Diag::new(DiagCode::BadAlignofArgument, "alignof may not be applied to a function type"));
        }
        if ty.is_incomplete() {
            return Err(Diag::new(DiagCode::BadAlignofArgument, "alignof may not be applied to an incomplete type"));
        }
        let value = Constant::from_i128(&size_t, i128::from(ty.alignof()));
        Ok(Expr::new(ExprKind::AlignofType, size_t, Some(value)))
    }

    /// `sizeof(type)`: fails on function; zero for an unsized array.
    pub fn sizeof_type(ty: &Type, size_t: Type) -> Result<Expr, Diag> {
        if ty.is_function_type() {
            return Err(Diag::new(DiagCode::BadAlignofArgument, "sizeof may not be applied to a function type"));
        }
        let value = Constant::from_i128(&size_t, i128::from(ty.sizeof()));
        Ok(Expr::new(ExprKind::SizeofType, size_t, Some(value)))
    }

    /// `alignof(expr)`: same shape rules as [`Expr::alignof_type`], applied
    /// to the operand's `value_type` (`spec.md` §3 "alignof(type|expr)").
    pub fn alignof_expr(operand: Expr, size_t: Type) -> Result<Expr, Diag> {
        if operand.value_type().is_function_type() {
            return Err(Diag::new(DiagCode::BadAlignofArgument, "alignof may not be applied to a function type"));
        }
        if operand.value_type().is_incomplete() {
            return Err(Diag::new(DiagCode::BadAlignofArgument, "alignof may not be applied to an incomplete type"));
        }
        let value = Constant::from_i128(&size_t, i128::from(operand.value_type().alignof()));
        Ok(Expr::new(ExprKind::AlignofExpr { operand }, size_t, Some(value)))
    }

    pub fn sizeof_expr(operand: Expr, size_t: Type) -> Result<Expr, Diag> {
        if operand.value_type().is_function_type() {
            return Err(Diag::new(DiagCode::BadAlignofArgument, "sizeof may not be applied to a function type"));
        }
        let value = Constant::from_i128(&size_t, i128::from(operand.value_type().sizeof()));
        Ok(Expr::new(ExprKind::SizeofExpr { operand }, size_t, Some(value)))
    }

    // --- cast --------------------------------------------------------------

    /// `cast(type, expr)`: folds via the constant engine's `cast` when the
    /// operand is constant-valued.
    #[must_use]
    pub fn cast(target_ty: Type, operand: Expr) -> Expr {
        let constant = if operand.is_value_constant() {
            let src = operand.constant().expect("checked is_value_constant");
            Some(src.cast(operand.value_type(), &target_ty))
        } else {
            None
        };
        Expr::new(ExprKind::Cast { operand }, target_ty, constant)
    }

    // --- unary ---------------------------------------------------------------

    /// `!` → `int` 0/1 via scalar-to-tristate; `~` requires integer; unary
    /// `-` requires arithmetic; `&` requires an lvalue shape; `*` requires
    /// pointer.
    pub fn unary(op: UnaryOp, operand: Expr, int_ty: Type, target: &TargetProfile) -> Result<Expr, Diag> {
        match op {
            UnaryOp::LogicalNot => {
                if !operand.value_type().is_scalar() {
                    return Err(Diag::new(DiagCode::BadOperatorTypes, "! requires a scalar operand"));
                }
                let constant = operand.constant().map(|c| match c.scalar_to_tristate() {
                    Tristate::Yes => Constant::from_i128(&int_ty, 0),
                    Tristate::No => Constant::from_i128(&int_ty, 1),
                    Tristate::Maybe => return_none_sentinel(),
                });
                let constant = constant.filter(|_| operand.is_value_constant());
                Ok(Expr::new(ExprKind::Unary { op, operand }, int_ty, constant))
            }
            UnaryOp::BitNot => {
                if !operand.value_type().is_integer() {
                    return Err(Diag::new(DiagCode::BadOperatorTypes, "~ requires an integer operand"));
                }
                let ty = operand.value_type().clone();
                let constant = operand.is_value_constant().then(|| Constant::not(operand.constant().unwrap()));
                Ok(Expr::new(ExprKind::Unary { op, operand }, ty, constant))
            }
            UnaryOp::Negate => {
                if !operand.value_type().is_arithmetic() {
                    return Err(Diag::new(DiagCode::BadOperatorTypes, "unary - requires an arithmetic operand"));
                }
                let ty = operand.value_type().clone();
                let constant = operand.is_value_constant().then(|| Constant::negate(operand.constant().unwrap(), &ty));
                Ok(Expr::new(ExprKind::Unary { op, operand }, ty, constant))
            }
            UnaryOp::AddressOf => {
                if !is_lvalue_shape(&operand) {
                    return Err(Diag::new(DiagCode::BadOperatorTypes, "& requires an lvalue operand"));
                }
                let ptr_ty = Type::pointer(operand.value_type().clone(), target);
                Ok(Expr::new(ExprKind::Unary { op, operand }, ptr_ty, None))
            }
            UnaryOp::Deref => {
                let pointee = operand
                    .value_type()
                    .pointer_dereference()
                    .ok_or_else(|| Diag::new(DiagCode::BadOperatorTypes, "* requires a pointer operand"))?;
                Ok(Expr::new(ExprKind::Unary { op, operand }, pointee, None))
            }
        }
    }

    // --- binary --------------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, target: &TargetProfile, int_ty: Type, ptrdiff_ty: Type) -> Result<Expr, Diag> {
        use BinaryOp::*;
        let (lt, rt) = (lhs.value_type().clone(), rhs.value_type().clone());

        match op {
            Add | Sub => {
                if lt.is_arithmetic() && rt.is_arithmetic() {
                    let result_ty = Type::usual_arithmetic_conversion(&lt, &rt, target);
                    binary_arith_fold(op, lhs, rhs, result_ty)
                } else if lt.is_pointer() && rt.is_integer() {
                    let constant = fold_pointer_arith(op == Sub, &lt, lhs.constant(), &rt, rhs.constant());
                    Ok(Expr::new(ExprKind::Binary { op, lhs, rhs }, lt, constant))
                } else if op == Add && rt.is_pointer() && lt.is_integer() {
                    let constant = fold_pointer_arith(false, &rt, rhs.constant(), &lt, lhs.constant());
                    Ok(Expr::new(ExprKind::Binary { op, lhs, rhs }, rt, constant))
                } else if op == Sub && lt.is_pointer() && rt.is_pointer() {
                    let (pa, pb) = (lt.pointer_dereference().unwrap(), rt.pointer_dereference().unwrap());
                    if !Type::compatible(&pa, &pb) {
                        return Err(Diag::new(DiagCode::BadOperatorTypes, "pointer subtraction requires compatible pointee types"));
                    }
                    Ok(Expr::new(ExprKind::Binary { op, lhs, rhs }, ptrdiff_ty, None))
                } else {
                    Err(Diag::new(DiagCode::BadOperatorTypes, "+/- requires arithmetic operands or pointer arithmetic"))
                }
            }
            Mul | Div => {
                if !(lt.is_arithmetic() && rt.is_arithmetic()) {
                    return Err(Diag::new(DiagCode::BadOperatorTypes, "*//requires arithmetic operands"));
                }
                let result_ty = Type::usual_arithmetic_conversion(&lt, &rt, target);
                binary_arith_fold(op, lhs, rhs, result_ty)
            }
            Rem | Shl | Shr | BitAnd | BitOr | BitXor => {
                if !(lt.is_integer() && rt.is_integer()) {
                    return Err(Diag::new(DiagCode::BadOperatorTypes, "this operator requires integer operands"));
                }
                let result_ty = Type::usual_arithmetic_conversion(&lt, &rt, target);
                binary_arith_fold(op, lhs, rhs, result_ty)
            }
            Lt | Le | Gt | Ge | Eq | Ne => {
                let operand_ty = if lt.is_arithmetic() && rt.is_arithmetic() {
                    Type::usual_arithmetic_conversion(&lt, &rt, target)
                } else if lt.is_pointer() && rt.is_pointer() && Type::compatible(&lt.pointer_dereference().unwrap(), &rt.pointer_dereference().unwrap()) {
                    lt.clone()
                } else {
                    return Err(Diag::new(DiagCode::BadOperatorTypes, "comparison requires arithmetic or compatible-pointer operands"));
                };
                let cmp_op = to_compare_op(op);
                let constant = (lhs.is_value_constant() && rhs.is_value_constant())
                    .then(|| Constant::compare(lhs.constant().unwrap(), rhs.constant().unwrap(), &operand_ty, cmp_op, &int_ty));
                Ok(Expr::new(ExprKind::Binary { op, lhs, rhs }, int_ty, constant))
            }
            LogicalAnd | LogicalOr => {
                if !(lt.is_scalar() && rt.is_scalar()) {
                    return Err(Diag::new(DiagCode::BadOperatorTypes, "&&/|| requires scalar operands"));
                }
                let constant = fold_logical(op, &lhs, &rhs, &int_ty);
                Ok(Expr::new(ExprKind::Binary { op, lhs, rhs }, int_ty, constant))
            }
            Comma => {
                let ty = rt;
                let constant = rhs.0.constant.clone();
                Ok(Expr::new(ExprKind::Binary { op, lhs, rhs }, ty, constant))
            }
        }
    }

    // --- ternary -------------------------------------------------------------

    pub fn ternary(cond: Expr, then_branch: Expr, else_branch: Expr, target: &TargetProfile) -> Result<Expr, Diag> {
        if !cond.value_type().is_scalar() {
            return Err(Diag::new(DiagCode::ExprNotCondition, "ternary condition must have scalar type"));
        }
        let (at, bt) = (then_branch.value_type().clone(), else_branch.value_type().clone());
        let result_ty = if at.is_arithmetic() && bt.is_arithmetic() {
            Type::usual_arithmetic_conversion(&at, &bt, target)
        } else if at.is_pointer() && bt.is_pointer() && Type::compatible(&at.pointer_dereference().unwrap(), &bt.pointer_dereference().unwrap()) {
            at.clone()
        } else {
            return Err(Diag::new(DiagCode::BadOperatorTypes, "ternary arms must be arithmetic or compatible pointers"));
        };

        let constant = cond.constant().map(Constant::scalar_to_tristate).and_then(|tri| match tri {
            Tristate::Yes if then_branch.is_value_constant() => Some(then_branch.constant().unwrap().cast(&at, &result_ty)),
            Tristate::No if else_branch.is_value_constant() => Some(else_branch.constant().unwrap().cast(&bt, &result_ty)),
            _ => None,
        });

        Ok(Expr::new(ExprKind::Ternary { cond, then_branch, else_branch }, result_ty, constant))
    }

    // --- call ------------------------------------------------------------------

    /// `head` must have function or pointer-to-function type; arity must
    /// match (or exceed, for varargs); each argument implicitly converts to
    /// its parameter type.
    pub fn call(head: Expr, args: Vec<Expr>) -> Result<Expr, Diag> {
        let function_ty = head
            .value_type()
            .pointer_dereference()
            .unwrap_or_else(|| head.value_type().clone());
        let (ret, params, varargs) = function_ty
            .as_function()
            .ok_or_else(|| Diag::new(DiagCode::BadOperatorTypes, "call target must have function or pointer-to-function type"))?;

        if args.len() < params.len() || (args.len() > params.len() && !varargs) {
            return Err(Diag::new(DiagCode::BadOperatorTypes, "argument count does not match function arity"));
        }
        for (arg, param) in args.iter().zip(&params) {
            if !arg.value_type().implicitly_convertible_to(&param.ty) {
                return Err(Diag::new(DiagCode::BadOperatorTypes, "argument is not implicitly convertible to its parameter type"));
            }
        }
        Ok(Expr::new(ExprKind::Call { head, args }, ret, None))
    }

    // --- member access -----------------------------------------------------

    /// `.` requires struct/union; `->` additionally requires a pointer
    /// object and auto-dereferences.
    pub fn member_access(object: Expr, name: Symbol, arrow: bool) -> Result<Expr, Diag> {
        let aggregate_ty = if arrow {
            object
                .value_type()
                .pointer_dereference()
                .ok_or_else(|| Diag::new(DiagCode::BadOperatorTypes, "-> requires a pointer operand"))?
        } else {
            object.value_type().clone()
        };
        let member = aggregate_ty
            .member_by_symbol_type(name)
            .ok_or_else(|| Diag::new(DiagCode::NotFound, "no member with this name"))?;
        Ok(Expr::new(ExprKind::Member { object, name, arrow }, member, None))
    }

    // --- subscript ---------------------------------------------------------

    pub fn subscript(object: Expr, index: Expr) -> Result<Expr, Diag> {
        let object_ty = object.value_type();
        let element = object_ty
            .pointer_dereference()
            .or_else(|| object_ty.array_element())
            .ok_or_else(|| Diag::new(DiagCode::BadOperatorTypes, "subscript target must have pointer (or array-decayed) type"))?;
        if !index.value_type().is_integer() {
            return Err(Diag::new(DiagCode::BadOperatorTypes, "subscript index must have integer type"));
        }
        Ok(Expr::new(ExprKind::Subscript { object, index }, element, None))
    }

    // --- structured initializer ----------------------------------------------

    /// Flattens a designator-annotated initializer into offset-ordered
    /// pieces; when every piece is constant, assembles a literal-value
    /// `Constant` of the whole aggregate's size.
    pub fn structured_initializer(ty: Type, mut pieces: Vec<InitPiece>) -> Expr {
        pieces.sort_by_key(|p| p.offset);
        let all_constant = pieces.iter().all(InitPiece::is_value_constant);
        let constant = all_constant.then(|| assemble_literal(&ty, &pieces));
        Expr::new(ExprKind::StructuredInitializer { pieces }, ty, constant)
    }

    // --- inplace unary/binary (++/--/+=/-=/...) -----------------------------

    /// `++x`/`x++`/`--x`/`x--`: the operand must be an lvalue of scalar
    /// type (pointer arithmetic is allowed, same as `+`/`-`); result type is
    /// the operand's type. Never folds — the operand is mutated, so no
    /// `Constant` is ever attached (`spec.md` §3 "inplace-unary").
    pub fn inplace_unary(op: IncDecOp, operand: Expr, prefix: bool) -> Result<Expr, Diag> {
        if !is_lvalue_shape(&operand) {
            return Err(Diag::new(DiagCode::BadOperatorTypes, "++/-- requires an lvalue operand"));
        }
        if !operand.value_type().is_scalar() {
            return Err(Diag::new(DiagCode::BadOperatorTypes, "++/-- requires a scalar operand"));
        }
        let ty = operand.value_type().clone();
        Ok(Expr::new(ExprKind::InplaceUnary { op, operand, prefix }, ty, None))
    }

    /// `x op= y` for `op` in `{+,-,*,/,%,<<,>>,&,|,^}`: `lhs` must be an
    /// lvalue; the operand-shape rule is the same as the corresponding
    /// plain binary operator, checked against `lhs`/`rhs`'s raw types (the
    /// implicit "convert to common type, then back to `lhs`'s type" C
    /// semantics is the driver's lowering concern — this constructor only
    /// validates the operator's applicability and reports `lhs`'s type as
    /// the result, matching C11 §6.5.16.2). Never folds.
    pub fn inplace_binary(op: BinaryOp, lhs: Expr, rhs: Expr, target: &TargetProfile) -> Result<Expr, Diag> {
        let _ = target;
        if !is_lvalue_shape(&lhs) {
            return Err(Diag::new(DiagCode::BadOperatorTypes, "compound assignment requires an lvalue left operand"));
        }
        let (lt, rt) = (lhs.value_type().clone(), rhs.value_type().clone());
        let shape_ok = match op {
            BinaryOp::Add | BinaryOp::Sub => (lt.is_arithmetic() && rt.is_arithmetic()) || (lt.is_pointer() && rt.is_integer()),
            BinaryOp::Mul | BinaryOp::Div => lt.is_arithmetic() && rt.is_arithmetic(),
            BinaryOp::Rem | BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => lt.is_integer() && rt.is_integer(),
            _ => false,
        };
        if !shape_ok {
            return Err(Diag::new(DiagCode::BadOperatorTypes, "operator is not valid for compound assignment with these operand types"));
        }
        let ty = lt;
        Ok(Expr::new(ExprKind::InplaceBinary { op, lhs, rhs }, ty, None))
    }

    // --- generic selection (_Generic) ---------------------------------------

    /// `_Generic(controlling, T1: e1, ..., default: e)` (`spec.md` §3
    /// "generic-selection"): picks the association whose type is
    /// `Type::compatible` with the controlling expression's type, falling
    /// back to the (at most one) `None`-typed default association. Fails
    /// [`DiagCode::NotFound`] if no association matches and there is no
    /// default. Folds when the selected branch is constant.
    pub fn generic_selection(controlling: Expr, assocs: Vec<(Option<Type>, Expr)>) -> Result<Expr, Diag> {
        let controlling_ty = controlling.value_type().clone();
        let selected = assocs
            .iter()
            .position(|(ty, _)| matches!(ty, Some(t) if Type::compatible(t, &controlling_ty)))
            .or_else(|| assocs.iter().position(|(ty, _)| ty.is_none()))
            .ok_or_else(|| Diag::new(DiagCode::NotFound, "no generic association matches the controlling expression's type, and there is no default"))?;

        let (result_ty, constant) = {
            let (_, chosen) = &assocs[selected];
            (chosen.value_type().clone(), chosen.constant().cloned())
        };
        Ok(Expr::new(ExprKind::GenericSelection { controlling, assocs, selected }, result_ty, constant))
    }
}

impl InitPiece {
    fn is_value_constant(&self) -> bool {
        self.expr.is_value_constant()
    }
}

fn assemble_literal(ty: &Type, pieces: &[InitPiece]) -> Constant {
    let mut bytes = vec![0u8; ty.sizeof() as usize];
    for piece in pieces {
        if let Some(Constant::Value(v)) = piece.expr.constant() {
            let start = piece.offset as usize;
            let len = (piece.length as usize).min(v.len());
            if start + len <= bytes.len() {
                bytes[start..start + len].copy_from_slice(&v[..len]);
            }
        }
    }
    Constant::Value(bytes)
}

fn is_lvalue_shape(e: &Expr) -> bool {
    matches!(e.kind(), ExprKind::Variable { .. } | ExprKind::Subscript { .. } | ExprKind::Member { .. })
        || matches!(e.kind(), ExprKind::Unary { op: UnaryOp::Deref, .. })
}

fn to_compare_op(op: BinaryOp) -> CompareOp {
    match op {
        BinaryOp::Lt => CompareOp::Lt,
        BinaryOp::Le => CompareOp::Le,
        BinaryOp::Gt => CompareOp::Gt,
        BinaryOp::Ge => CompareOp::Ge,
        BinaryOp::Eq => CompareOp::Eq,
        BinaryOp::Ne => CompareOp::Ne,
        _ => unreachable!("to_compare_op called on a non-comparison operator"),
    }
}

fn binary_arith_fold(op: BinaryOp, lhs: Expr, rhs: Expr, result_ty: Type) -> Result<Expr, Diag> {
    let constant = if lhs.is_value_constant() && rhs.is_value_constant() {
        let (a, b) = (lhs.constant().unwrap(), rhs.constant().unwrap());
        Some(match op {
            BinaryOp::Add => Constant::add(a, b, &result_ty),
            BinaryOp::Sub => Constant::sub(a, b, &result_ty),
            BinaryOp::Mul => Constant::mul(a, b, &result_ty),
            BinaryOp::Div => Constant::div(a, b, &result_ty),
            BinaryOp::Rem => Constant::rem(a, b, &result_ty),
            BinaryOp::BitAnd => Constant::and(a, b),
            BinaryOp::BitOr => Constant::or(a, b),
            BinaryOp::BitXor => Constant::xor(a, b),
            BinaryOp::Shl => Constant::shl(a, shift_amount(b), &result_ty),
            BinaryOp::Shr => Constant::shr(a, shift_amount(b), &result_ty),
            _ => unreachable!("binary_arith_fold called on a non-arithmetic operator"),
        })
    } else {
        None
    };
    Ok(Expr::new(ExprKind::Binary { op, lhs, rhs }, result_ty, constant))
}

/// `p + n` / `p - n` / `n + p` constant folding (`spec.md` §8 scenario 6):
/// the *pointer* side may carry any constant kind (address, already-offset),
/// only the *index* side must be a literal integer. Returns `None` when
/// either side is not yet foldable.
fn fold_pointer_arith(negate: bool, ptr_ty: &Type, ptr_c: Option<&Constant>, index_ty: &Type, index_c: Option<&Constant>) -> Option<Constant> {
    let base = ptr_c?;
    let index = index_c?.as_i128(!index_ty.is_unsigned())?;
    let pointee_sizeof = ptr_ty.pointer_dereference().expect("ptr_ty is a pointer type").sizeof() as i128;
    let delta = if negate { -(index * pointee_sizeof) } else { index * pointee_sizeof };
    Some(Constant::offset_pointer(base, delta as i64))
}

fn shift_amount(c: &Constant) -> u32 {
    if let Constant::Value(bytes) = c {
        let mut buf = [0u8; 16];
        buf[..bytes.len().min(16)].copy_from_slice(&bytes[..bytes.len().min(16)]);
        u128::from_le_bytes(buf) as u32
    } else {
        0
    }
}

fn fold_logical(op: BinaryOp, lhs: &Expr, rhs: &Expr, int_ty: &Type) -> Option<Constant> {
    let lhs_tri = lhs.constant().map(Constant::scalar_to_tristate);
    match (op, lhs_tri) {
        (BinaryOp::LogicalAnd, Some(Tristate::No)) => Some(Constant::from_i128(int_ty, 0)),
        (BinaryOp::LogicalOr, Some(Tristate::Yes)) => Some(Constant::from_i128(int_ty, 1)),
        (BinaryOp::LogicalAnd, Some(Tristate::Yes)) | (BinaryOp::LogicalOr, Some(Tristate::No)) => {
            rhs.constant().map(Constant::scalar_to_tristate).and_then(|tri| match tri {
                Tristate::Yes => Some(Constant::from_i128(int_ty, 1)),
                Tristate::No => Some(Constant::from_i128(int_ty, 0)),
                Tristate::Maybe => None,
            })
        }
        _ => None,
    }
}

/// `!`'s tristate arm needs a placeholder when the operand's constant is
/// [`Tristate::Maybe`]; the caller filters this back to `None` via
/// `is_value_constant`, since only a `Constant::Value` operand reaches this
/// branch in practice (non-Value constants never classify as `Maybe` through
/// `is_value_constant`'s guard above them).
fn return_none_sentinel() -> Constant {
    Constant::Fail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolSpace;
    use crate::target::TargetProfile;
    use crate::types::layout::MemberSpec;
    use crate::types::FunctionParam;

    fn t() -> TargetProfile {
        TargetProfile::host()
    }

    #[test]
    fn integer_promotion_scenario_from_spec_section_8() {
        // int16(40000 cast) + uint16(30000): UAC picks signed int32 (rank
        // wins because signed can represent every uint16 value); the sum
        // folds to 70000 (`spec.md` §8 scenario 1).
        let target = t();
        let i16_ = Type::int_with_align(2, true, &target);
        let u16_ = Type::int_with_align(2, false, &target);
        let a = Expr::cast(i16_, Expr::int_constant(Type::int_with_align(4, true, &target), 40000));
        let b = Expr::cast(u16_, Expr::int_constant(Type::int_with_align(4, true, &target), 30000));
        let int_ty = Type::int_with_align(4, true, &target);
        let ptrdiff_ty = int_ty.clone();
        let sum = Expr::binary(BinaryOp::Add, a, b, &target, int_ty, ptrdiff_ty).unwrap();
        assert_eq!(sum.value_type().sizeof(), 4);
        assert!(!sum.value_type().is_unsigned());
        let Some(Constant::Value(bytes)) = sum.constant() else { panic!("expected a folded value") };
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        assert_eq!(i32::from_le_bytes(buf), 70000);
    }

    #[test]
    fn division_by_zero_fold_produces_fail_constant() {
        // `5 / 0` (`spec.md` §8 scenario 2): the expression is constructed,
        // not rejected; its constant is the propagated fail sentinel.
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let five = Expr::int_constant(int_ty.clone(), 5);
        let zero = Expr::int_constant(int_ty.clone(), 0);
        let div = Expr::binary(BinaryOp::Div, five, zero, &target, int_ty.clone(), int_ty).unwrap();
        assert!(matches!(div.constant(), Some(Constant::Fail)));
    }

    #[test]
    fn pointer_plus_integer_folds_to_an_offset_constant() {
        // `p + 3` where `p: pointer<int32>` (`spec.md` §8 scenario 6).
        let target = t();
        let space = SymbolSpace::new();
        let sym = space.force_str("p");
        let int_ty = Type::int_with_align(4, true, &target);
        let ptr_ty = Type::pointer(int_ty.clone(), &target);
        let p = Expr::new(ExprKind::Variable { name: sym }, ptr_ty.clone(), Some(Constant::UnitAddress { name: sym, offset: 0 }));
        let three = Expr::int_constant(int_ty.clone(), 3);
        let ptrdiff_ty = int_ty.clone();
        let sum = Expr::binary(BinaryOp::Add, p, three, &target, int_ty, ptrdiff_ty).unwrap();
        assert!(Type::compatible(sum.value_type(), &ptr_ty));
        match sum.constant() {
            Some(Constant::Offset { offset, .. }) => assert_eq!(*offset, 12),
            other => panic!("expected an Offset constant, got {other:?}"),
        }
    }

    #[test]
    fn unary_not_produces_int_zero_or_one_via_tristate() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let nonzero = Expr::int_constant(int_ty.clone(), 7);
        let negated = Expr::unary(UnaryOp::LogicalNot, nonzero, int_ty, &target).unwrap();
        let Some(Constant::Value(bytes)) = negated.constant() else { panic!("expected a folded value") };
        assert_eq!(bytes[0], 0);
    }

    #[test]
    fn address_of_requires_lvalue_shape() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let literal = Expr::int_constant(int_ty, 1);
        assert!(Expr::unary(UnaryOp::AddressOf, literal, Type::void(), &target).is_err());
    }

    #[test]
    fn call_arity_mismatch_without_varargs_fails() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let fn_ty = Type::function(int_ty.clone(), vec![FunctionParam { name: None, ty: int_ty.clone() }], false);
        let space = SymbolSpace::new();
        let head = Expr::variable(space.force_str("f"), fn_ty);
        assert!(Expr::call(head, vec![]).is_err());
    }

    #[test]
    fn member_access_finds_struct_field_by_name() {
        let target = t();
        let space = SymbolSpace::new();
        let x = space.force_str("x");
        let int_ty = Type::int_with_align(4, true, &target);
        let struct_ty = Type::struct_(None, vec![MemberSpec { name: Some(x), ty: int_ty, bit_length: None }], &target).unwrap();
        let obj = Expr::variable(space.force_str("obj"), struct_ty);
        let accessed = Expr::member_access(obj, x, false).unwrap();
        assert_eq!(accessed.value_type().sizeof(), 4);
    }

    #[test]
    fn generic_selection_picks_matching_association_over_default() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let float_ty = Type::float_(crate::types::FloatWidth::Double, crate::types::FloatDomain::Real, &target);
        let controlling = Expr::int_constant(int_ty.clone(), 9);
        let int_branch = Expr::int_constant(int_ty.clone(), 1);
        let default_branch = Expr::int_constant(int_ty.clone(), 2);
        let assocs = vec![(Some(float_ty), Expr::float_constant(Type::float_(crate::types::FloatWidth::Double, crate::types::FloatDomain::Real, &target), 1.0)), (Some(int_ty), int_branch), (None, default_branch)];
        let selected = Expr::generic_selection(controlling, assocs).unwrap();
        let Some(Constant::Value(bytes)) = selected.constant() else { panic!("expected a folded value") };
        assert_eq!(bytes[0], 1);
    }

    #[test]
    fn generic_selection_falls_back_to_default_when_nothing_matches() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let float_ty = Type::float_(crate::types::FloatWidth::Double, crate::types::FloatDomain::Real, &target);
        let controlling = Expr::float_constant(float_ty.clone(), 1.5);
        let default_branch = Expr::int_constant(int_ty.clone(), 42);
        let assocs = vec![(None, default_branch)];
        let selected = Expr::generic_selection(controlling, assocs).unwrap();
        let Some(Constant::Value(bytes)) = selected.constant() else { panic!("expected a folded value") };
        assert_eq!(bytes[0], 42);
    }

    #[test]
    fn generic_selection_fails_without_a_match_or_default() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let controlling = Expr::int_constant(int_ty.clone(), 1);
        let float_ty = Type::float_(crate::types::FloatWidth::Double, crate::types::FloatDomain::Real, &target);
        let assocs = vec![(Some(float_ty.clone()), Expr::float_constant(float_ty, 1.0))];
        assert!(Expr::generic_selection(controlling, assocs).is_err());
    }

    #[test]
    fn inplace_unary_requires_lvalue_and_scalar() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let space = SymbolSpace::new();
        let variable = Expr::variable(space.force_str("i"), int_ty.clone());
        let incremented = Expr::inplace_unary(IncDecOp::Increment, variable, true).unwrap();
        assert_eq!(incremented.value_type().sizeof(), 4);
        assert!(incremented.constant().is_none());

        let literal = Expr::int_constant(int_ty, 1);
        assert!(Expr::inplace_unary(IncDecOp::Increment, literal, true).is_err());
    }

    #[test]
    fn inplace_binary_requires_lvalue_left_operand() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let space = SymbolSpace::new();
        let variable = Expr::variable(space.force_str("i"), int_ty.clone());
        let rhs = Expr::int_constant(int_ty.clone(), 5);
        let result = Expr::inplace_binary(BinaryOp::Add, variable, rhs, &target).unwrap();
        assert_eq!(result.value_type().sizeof(), 4);

        let lit_lhs = Expr::int_constant(int_ty.clone(), 1);
        let rhs2 = Expr::int_constant(int_ty, 5);
        assert!(Expr::inplace_binary(BinaryOp::Add, lit_lhs, rhs2, &target).is_err());
    }

    #[test]
    fn sizeof_and_alignof_of_an_expression() {
        let target = t();
        let int_ty = Type::int_with_align(4, true, &target);
        let size_t = Type::int_with_align(8, false, &target);
        let space = SymbolSpace::new();
        let variable = Expr::variable(space.force_str("i"), int_ty);
        let sizeof = Expr::sizeof_expr(variable.clone(), size_t.clone()).unwrap();
        let alignof = Expr::alignof_expr(variable, size_t).unwrap();
        let Some(Constant::Value(sbytes)) = sizeof.constant() else { panic!() };
        let Some(Constant::Value(abytes)) = alignof.constant() else { panic!() };
        assert_eq!(sbytes[0], 4);
        assert_eq!(abytes[0], 4);
    }

    #[test]
    fn subscript_through_a_pointer() {
        let target = t();
        let space = SymbolSpace::new();
        let int_ty = Type::int_with_align(4, true, &target);
        let ptr_ty = Type::pointer(int_ty.clone(), &target);
        let p = Expr::variable(space.force_str("p"), ptr_ty);
        let index = Expr::int_constant(int_ty, 3);
        let subscripted = Expr::subscript(p, index).unwrap();
        assert_eq!(subscripted.value_type().sizeof(), 4);
    }

    #[test]
    fn subscript_decays_a_declared_array() {
        let target = t();
        let space = SymbolSpace::new();
        let int_ty = Type::int_with_align(4, true, &target);
        let array_ty = Type::array(int_ty.clone(), 10);
        let a = Expr::variable(space.force_str("a"), array_ty);
        let index = Expr::int_constant(int_ty.clone(), 3);
        let subscripted = Expr::subscript(a, index).unwrap();
        assert!(Type::compatible(subscripted.value_type(), &int_ty));
    }
}
