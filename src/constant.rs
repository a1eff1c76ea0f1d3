//! Typed-value compile-time constants (`spec.md` §4.5), ported from the
//! `DBCC_Constant` union in `dbcc-constant.c`/`dbcc.h` and widened from a
//! `malloc`'d byte buffer to an owned `Vec<u8>`.
//!
//! Every arithmetic/bitwise/comparison operation here is a *total* function
//! over the six domains named in `spec.md` §4.5: signed-int, unsigned-int,
//! real-float, complex-float, imaginary-float, pointer. Values are stored as
//! target-width little-endian byte buffers so casts and bitwise ops can work
//! directly on the raw representation.

use crate::symbol::Symbol;
use crate::types::{FloatWidth, Type};

/// A compile-time constant. `Fail` is the propagated result of an
/// integer division or remainder by zero (`spec.md` §4.5); it is not a
/// value and carries no bytes.
#[derive(Clone, Debug)]
pub enum Constant {
    /// A literal byte value, sized to its associated type.
    Value(Vec<u8>),
    /// An as-yet-unresolved external symbol address.
    LinkAddress { name: Symbol },
    /// A defined symbol plus a numeric offset.
    UnitAddress { name: Symbol, offset: i64 },
    /// Host-local data address, for passing host data into a JIT.
    LocalAddress,
    /// Another constant plus a signed displacement.
    Offset { base: Box<Constant>, offset: i64 },
    /// Result of a division or remainder by zero.
    Fail,
}

/// The six domains a type maps onto for the constant engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Domain {
    SignedInt,
    UnsignedInt,
    RealFloat,
    ComplexFloat,
    ImaginaryFloat,
    Pointer,
}

fn domain_of(ty: &Type) -> Domain {
    if ty.is_pointer() {
        Domain::Pointer
    } else if ty.is_complex() {
        Domain::ComplexFloat
    } else if ty.is_imaginary() {
        Domain::ImaginaryFloat
    } else if ty.is_floating_point() {
        Domain::RealFloat
    } else if ty.is_unsigned() {
        Domain::UnsignedInt
    } else {
        Domain::SignedInt
    }
}

fn float_width(ty: &Type) -> FloatWidth {
    // Only meaningful for Domain::{Real,Complex,Imaginary}Float callers.
    let bytes = ty.sizeof();
    let per_component = match domain_of(ty) {
        Domain::ComplexFloat => bytes / 2,
        _ => bytes,
    };
    match per_component {
        4 => FloatWidth::Float,
        _ => FloatWidth::Double, // long double is modeled as f64, see DESIGN.md
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tristate {
    Yes,
    No,
    Maybe,
}

impl Constant {
    #[must_use]
    pub fn zero(ty: &Type) -> Constant {
        Constant::Value(vec![0u8; ty.sizeof() as usize])
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        if let Constant::Value(v) = self {
            Some(v)
        } else {
            None
        }
    }

    #[must_use]
    pub fn from_i128(ty: &Type, v: i128) -> Constant {
        let n = ty.sizeof() as usize;
        let bytes = v.to_le_bytes();
        Constant::Value(bytes[..n.min(16)].to_vec())
    }

    fn to_i128(&self, signed: bool) -> i128 {
        let bytes = self.as_bytes().expect("integer read requires a Value constant");
        let mut buf = [0u8; 16];
        buf[..bytes.len()].copy_from_slice(bytes);
        let unsigned = u128::from_le_bytes(buf);
        if !signed || bytes.is_empty() {
            return unsigned as i128;
        }
        let bit_width = bytes.len() * 8;
        let sign_bit = 1u128 << (bit_width - 1);
        if unsigned & sign_bit != 0 {
            (unsigned as i128) - (1i128 << bit_width)
        } else {
            unsigned as i128
        }
    }

    #[must_use]
    pub fn from_f64(ty: &Type, v: f64) -> Constant {
        match float_width(ty) {
            FloatWidth::Float => Constant::Value((v as f32).to_le_bytes().to_vec()),
            _ => Constant::Value(v.to_le_bytes().to_vec()),
        }
    }

    fn real_to_f64(&self, width: FloatWidth) -> f64 {
        let bytes = self.as_bytes().expect("float read requires a Value constant");
        match width {
            FloatWidth::Float => {
                let mut b = [0u8; 4];
                b.copy_from_slice(&bytes[..4]);
                f32::from_le_bytes(b) as f64
            }
            _ => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&bytes[..8.min(bytes.len())]);
                f64::from_le_bytes(b)
            }
        }
    }

    #[must_use]
    pub fn from_complex(ty: &Type, re: f64, im: f64) -> Constant {
        let width = float_width(ty);
        let mut out = Vec::new();
        match width {
            FloatWidth::Float => {
                out.extend_from_slice(&(re as f32).to_le_bytes());
                out.extend_from_slice(&(im as f32).to_le_bytes());
            }
            _ => {
                out.extend_from_slice(&re.to_le_bytes());
                out.extend_from_slice(&im.to_le_bytes());
            }
        }
        Constant::Value(out)
    }

    fn complex_parts(&self, width: FloatWidth) -> (f64, f64) {
        let bytes = self.as_bytes().expect("complex read requires a Value constant");
        let comp_len = if width == FloatWidth::Float { 4 } else { 8 };
        let re_bytes = &bytes[..comp_len];
        let im_bytes = &bytes[comp_len..comp_len * 2];
        let read = |b: &[u8]| -> f64 {
            if width == FloatWidth::Float {
                let mut a = [0u8; 4];
                a.copy_from_slice(b);
                f32::from_le_bytes(a) as f64
            } else {
                let mut a = [0u8; 8];
                a.copy_from_slice(b);
                f64::from_le_bytes(a)
            }
        };
        (read(re_bytes), read(im_bytes))
    }

    /// `Cast(dst, src-value)`, `spec.md` §4.5.
    #[must_use]
    pub fn cast(&self, src_ty: &Type, dst_ty: &Type) -> Constant {
        let src_domain = domain_of(src_ty);
        let dst_domain = domain_of(dst_ty);
        match (src_domain, dst_domain) {
            (Domain::SignedInt | Domain::UnsignedInt | Domain::Pointer, Domain::SignedInt | Domain::UnsignedInt | Domain::Pointer) => {
                let signed = src_domain == Domain::SignedInt;
                Constant::from_i128(dst_ty, self.to_i128(signed))
            }
            (Domain::SignedInt | Domain::UnsignedInt, Domain::RealFloat) => {
                let signed = src_domain == Domain::SignedInt;
                Constant::from_f64(dst_ty, self.to_i128(signed) as f64)
            }
            (Domain::RealFloat, Domain::SignedInt | Domain::UnsignedInt) => {
                let v = self.real_to_f64(float_width(src_ty));
                Constant::from_i128(dst_ty, v.trunc() as i128)
            }
            (Domain::RealFloat, Domain::RealFloat) => Constant::from_f64(dst_ty, self.real_to_f64(float_width(src_ty))),
            (Domain::RealFloat, Domain::ComplexFloat) => Constant::from_complex(dst_ty, self.real_to_f64(float_width(src_ty)), 0.0),
            (Domain::SignedInt | Domain::UnsignedInt, Domain::ComplexFloat) => {
                let signed = src_domain == Domain::SignedInt;
                Constant::from_complex(dst_ty, self.to_i128(signed) as f64, 0.0)
            }
            (Domain::ComplexFloat, Domain::RealFloat) => {
                let (re, _) = self.complex_parts(float_width(src_ty));
                Constant::from_f64(dst_ty, re)
            }
            (Domain::ComplexFloat, Domain::ComplexFloat) => {
                let (re, im) = self.complex_parts(float_width(src_ty));
                Constant::from_complex(dst_ty, re, im)
            }
            (Domain::ImaginaryFloat, Domain::RealFloat) => Constant::from_f64(dst_ty, 0.0),
            (Domain::RealFloat, Domain::ImaginaryFloat) => Constant::from_f64(dst_ty, 0.0),
            (Domain::ImaginaryFloat, Domain::ImaginaryFloat) => Constant::from_f64(dst_ty, self.real_to_f64(float_width(src_ty))),
            _ => self.clone(),
        }
    }

    fn binary_int(a: &Constant, b: &Constant, dst_ty: &Type, signed: bool, f: impl Fn(i128, i128) -> i128) -> Constant {
        let ia = a.to_i128(signed);
        let ib = b.to_i128(signed);
        Constant::from_i128(dst_ty, f(ia, ib))
    }

    /// `add`/`sub`/`mul`/`div`/`rem`, width-specialized per `dst_ty`.
    /// Integer overflow wraps in both signed and unsigned domains (the
    /// host's two's-complement truncation already does this once the
    /// result is re-narrowed by `from_i128`). `div`/`rem` by zero yield
    /// [`Constant::Fail`].
    #[must_use]
    pub fn add(a: &Constant, b: &Constant, dst_ty: &Type) -> Constant {
        Self::arith(a, b, dst_ty, |x, y| x.wrapping_add(y), |x, y| x + y, |(ar, ai), (br, bi)| (ar + br, ai + bi))
    }

    #[must_use]
    pub fn sub(a: &Constant, b: &Constant, dst_ty: &Type) -> Constant {
        Self::arith(a, b, dst_ty, |x, y| x.wrapping_sub(y), |x, y| x - y, |(ar, ai), (br, bi)| (ar - br, ai - bi))
    }

    #[must_use]
    pub fn mul(a: &Constant, b: &Constant, dst_ty: &Type) -> Constant {
        Self::arith(a, b, dst_ty, |x, y| x.wrapping_mul(y), |x, y| x * y, |(ar, ai), (br, bi)| (ar * br - ai * bi, ar * bi + ai * br))
    }

    fn arith(
        a: &Constant,
        b: &Constant,
        dst_ty: &Type,
        int_op: impl Fn(i128, i128) -> i128,
        real_op: impl Fn(f64, f64) -> f64,
        complex_op: impl Fn((f64, f64), (f64, f64)) -> (f64, f64),
    ) -> Constant {
        match domain_of(dst_ty) {
            Domain::SignedInt => Self::binary_int(a, b, dst_ty, true, int_op),
            Domain::UnsignedInt | Domain::Pointer => Self::binary_int(a, b, dst_ty, false, int_op),
            Domain::RealFloat | Domain::ImaginaryFloat => {
                let width = float_width(dst_ty);
                Constant::from_f64(dst_ty, real_op(a.real_to_f64(width), b.real_to_f64(width)))
            }
            Domain::ComplexFloat => {
                let width = float_width(dst_ty);
                let (re, im) = complex_op(a.complex_parts(width), b.complex_parts(width));
                Constant::from_complex(dst_ty, re, im)
            }
        }
    }

    /// Integer division, or complex division via the numerically-safe
    /// Smith algorithm (`spec.md` §4.5). Returns [`Constant::Fail`] for
    /// division by zero.
    #[must_use]
    pub fn div(a: &Constant, b: &Constant, dst_ty: &Type) -> Constant {
        match domain_of(dst_ty) {
            Domain::SignedInt => {
                let (ia, ib) = (a.to_i128(true), b.to_i128(true));
                if ib == 0 {
                    Constant::Fail
                } else {
                    Constant::from_i128(dst_ty, ia / ib)
                }
            }
            Domain::UnsignedInt | Domain::Pointer => {
                let (ia, ib) = (a.to_i128(false), b.to_i128(false));
                if ib == 0 {
                    Constant::Fail
                } else {
                    Constant::from_i128(dst_ty, ia / ib)
                }
            }
            Domain::RealFloat | Domain::ImaginaryFloat => {
                let width = float_width(dst_ty);
                Constant::from_f64(dst_ty, a.real_to_f64(width) / b.real_to_f64(width))
            }
            Domain::ComplexFloat => {
                let width = float_width(dst_ty);
                let (ar, ai) = a.complex_parts(width);
                let (c, d) = b.complex_parts(width);
                let (re, im) = smith_complex_div(ar, ai, c, d);
                Constant::from_complex(dst_ty, re, im)
            }
        }
    }

    /// `rem` is defined for integer types only.
    #[must_use]
    pub fn rem(a: &Constant, b: &Constant, dst_ty: &Type) -> Constant {
        match domain_of(dst_ty) {
            Domain::SignedInt => {
                let (ia, ib) = (a.to_i128(true), b.to_i128(true));
                if ib == 0 {
                    Constant::Fail
                } else {
                    Constant::from_i128(dst_ty, ia % ib)
                }
            }
            Domain::UnsignedInt | Domain::Pointer => {
                let (ia, ib) = (a.to_i128(false), b.to_i128(false));
                if ib == 0 {
                    Constant::Fail
                } else {
                    Constant::from_i128(dst_ty, ia % ib)
                }
            }
            _ => unreachable!("rem is defined for integer types only"),
        }
    }

    /// Byte-wise on the raw representation.
    #[must_use]
    pub fn and(a: &Constant, b: &Constant) -> Constant {
        byte_op(a, b, |x, y| x & y)
    }
    #[must_use]
    pub fn or(a: &Constant, b: &Constant) -> Constant {
        byte_op(a, b, |x, y| x | y)
    }
    #[must_use]
    pub fn xor(a: &Constant, b: &Constant) -> Constant {
        byte_op(a, b, |x, y| x ^ y)
    }
    #[must_use]
    pub fn not(a: &Constant) -> Constant {
        Constant::Value(a.as_bytes().expect("bitwise not requires a Value constant").iter().map(|b| !b).collect())
    }

    /// `shl`/`shr`: integer-only; right shift is arithmetic on signed
    /// operands, logical on unsigned.
    #[must_use]
    pub fn shl(a: &Constant, shift: u32, ty: &Type) -> Constant {
        let signed = domain_of(ty) == Domain::SignedInt;
        Constant::from_i128(ty, a.to_i128(signed).wrapping_shl(shift))
    }

    #[must_use]
    pub fn shr(a: &Constant, shift: u32, ty: &Type) -> Constant {
        let signed = domain_of(ty) == Domain::SignedInt;
        if signed {
            Constant::from_i128(ty, a.to_i128(true).wrapping_shr(shift))
        } else {
            let bits = (ty.sizeof() * 8) as u32;
            let unsigned = a.to_i128(false) as u128 & ((1u128 << bits.min(127)) - 1);
            Constant::from_i128(ty, (unsigned >> shift.min(bits.saturating_sub(1))) as i128)
        }
    }

    /// Comparisons produce an `int`-typed 0/1. For complex operands, only
    /// `==`/`!=` are defined.
    #[must_use]
    pub fn compare(a: &Constant, b: &Constant, operand_ty: &Type, op: CompareOp, int_ty: &Type) -> Constant {
        let result = match domain_of(operand_ty) {
            Domain::SignedInt => {
                let (ia, ib) = (a.to_i128(true), b.to_i128(true));
                op.eval_ord(ia.cmp(&ib))
            }
            Domain::UnsignedInt | Domain::Pointer => {
                let (ia, ib) = (a.to_i128(false), b.to_i128(false));
                op.eval_ord(ia.cmp(&ib))
            }
            Domain::RealFloat | Domain::ImaginaryFloat => {
                let width = float_width(operand_ty);
                let (fa, fb) = (a.real_to_f64(width), b.real_to_f64(width));
                op.eval_partial(fa.partial_cmp(&fb))
            }
            Domain::ComplexFloat => {
                let width = float_width(operand_ty);
                let eq = a.complex_parts(width) == b.complex_parts(width);
                match op {
                    CompareOp::Eq => eq,
                    CompareOp::Ne => !eq,
                    _ => unreachable!("only == and != are defined for complex operands"),
                }
            }
        };
        Constant::from_i128(int_ty, i128::from(result))
    }

    /// Arithmetic negation on any arithmetic type.
    #[must_use]
    pub fn negate(a: &Constant, ty: &Type) -> Constant {
        match domain_of(ty) {
            Domain::SignedInt | Domain::UnsignedInt => Constant::from_i128(ty, a.to_i128(true).wrapping_neg()),
            Domain::RealFloat | Domain::ImaginaryFloat => Constant::from_f64(ty, -a.real_to_f64(float_width(ty))),
            Domain::ComplexFloat => {
                let (re, im) = a.complex_parts(float_width(ty));
                Constant::from_complex(ty, -re, -im)
            }
            Domain::Pointer => unreachable!("negate is not defined on pointer types"),
        }
    }

    /// Reads an already-folded integer value out of a `Value` constant, or
    /// `None` for any non-literal constant kind (address/offset/fail). Used
    /// by pointer arithmetic folding, where the *index* operand must be a
    /// literal even though the *pointer* operand usually is not.
    #[must_use]
    pub fn as_i128(&self, signed: bool) -> Option<i128> {
        match self {
            Constant::Value(_) => Some(self.to_i128(signed)),
            _ => None,
        }
    }

    /// `p + n` / `p - n` folding (`spec.md` §8 scenario 6): wraps any base
    /// pointer constant (address or already-offset) in an
    /// [`Constant::Offset`], accumulating into an existing offset rather
    /// than nesting one `Offset` inside another.
    #[must_use]
    pub fn offset_pointer(base: &Constant, delta: i64) -> Constant {
        match base {
            Constant::Offset { base: inner, offset } => Constant::Offset { base: inner.clone(), offset: offset.wrapping_add(delta) },
            other => Constant::Offset { base: Box::new(other.clone()), offset: delta },
        }
    }

    /// `Maybe` when the constant is not a literal value (link/unit
    /// address, local address, offset, or a failed fold); `Yes`/`No` by
    /// zero-ness of the literal bytes otherwise (`dbcc_typed_value_scalar_to_tristate`).
    #[must_use]
    pub fn scalar_to_tristate(&self) -> Tristate {
        match self {
            Constant::Value(bytes) => {
                if bytes.iter().all(|&b| b == 0) {
                    Tristate::No
                } else {
                    Tristate::Yes
                }
            }
            _ => Tristate::Maybe,
        }
    }
}

fn byte_op(a: &Constant, b: &Constant, f: impl Fn(u8, u8) -> u8) -> Constant {
    let (ba, bb) = (a.as_bytes().expect("bitwise op requires a Value constant"), b.as_bytes().expect("bitwise op requires a Value constant"));
    Constant::Value(ba.iter().zip(bb).map(|(&x, &y)| f(x, y)).collect())
}

/// `(a+bi)/(c+di)` via the numerically-safe Smith algorithm
/// (`spec.md` §4.5).
fn smith_complex_div(a: f64, b: f64, c: f64, d: f64) -> (f64, f64) {
    if c.abs() >= d.abs() {
        let r = d / c;
        let t = c + d * r;
        ((a + b * r) / t, (b - a * r) / t)
    } else {
        let r = c / d;
        let t = d + c * r;
        ((b + a * r) / t, (b * r - a) / t)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    fn eval_ord(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Lt => ord == Less,
            CompareOp::Le => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::Ge => ord != Less,
            CompareOp::Eq => ord == Equal,
            CompareOp::Ne => ord != Equal,
        }
    }

    fn eval_partial(self, ord: Option<std::cmp::Ordering>) -> bool {
        match ord {
            Some(o) => self.eval_ord(o),
            None => matches!(self, CompareOp::Ne), // NaN: only != is true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetProfile;

    fn target() -> TargetProfile {
        TargetProfile::host()
    }

    #[test]
    fn int_add_wraps_on_overflow() {
        let t = target();
        let ty = Type::int_with_align(1, false, &t); // unsigned char
        let a = Constant::from_i128(&ty, 250);
        let b = Constant::from_i128(&ty, 10);
        let sum = Constant::add(&a, &b, &ty);
        assert_eq!(sum.to_i128(false), 4); // (260 mod 256)
    }

    #[test]
    fn signed_div_by_zero_yields_fail() {
        let t = target();
        let ty = Type::int_with_align(4, true, &t);
        let a = Constant::from_i128(&ty, 10);
        let zero = Constant::zero(&ty);
        assert!(matches!(Constant::div(&a, &zero, &ty), Constant::Fail));
    }

    #[test]
    fn smith_division_matches_textbook_case() {
        // (1 + 2i) / (3 + 4i) = (11/25) + (2/25)i = 0.44 + 0.08i
        let (re, im) = smith_complex_div(1.0, 2.0, 3.0, 4.0);
        assert!((re - 0.44).abs() < 1e-9);
        assert!((im - 0.08).abs() < 1e-9);
    }

    #[test]
    fn tristate_classifies_literal_zero_and_nonzero() {
        let t = target();
        let ty = Type::int_with_align(4, true, &t);
        assert_eq!(Constant::zero(&ty).scalar_to_tristate(), Tristate::No);
        assert_eq!(Constant::from_i128(&ty, 7).scalar_to_tristate(), Tristate::Yes);
    }

    #[test]
    fn tristate_is_maybe_for_addresses() {
        use crate::symbol::SymbolSpace;
        let space = SymbolSpace::new();
        let name = space.force_str("extern_symbol");
        assert_eq!(Constant::LinkAddress { name }.scalar_to_tristate(), Tristate::Maybe);
    }

    #[test]
    fn shr_is_arithmetic_on_signed_and_logical_on_unsigned() {
        let t = target();
        let signed_ty = Type::int_with_align(4, true, &t);
        let unsigned_ty = Type::int_with_align(4, false, &t);
        let neg_one_signed = Constant::from_i128(&signed_ty, -1);
        let neg_one_unsigned = Constant::from_i128(&unsigned_ty, -1);
        assert_eq!(Constant::shr(&neg_one_signed, 1, &signed_ty).to_i128(true), -1);
        assert_eq!(Constant::shr(&neg_one_unsigned, 1, &unsigned_ty).to_i128(false), (u32::MAX >> 1) as i128);
    }

    #[test]
    fn offset_pointer_accumulates_rather_than_nests() {
        use crate::symbol::SymbolSpace;
        let space = SymbolSpace::new();
        let name = space.force_str("p");
        let addr = Constant::UnitAddress { name, offset: 0 };
        let once = Constant::offset_pointer(&addr, 12);
        let twice = Constant::offset_pointer(&once, 4);
        match twice {
            Constant::Offset { offset, base } => {
                assert_eq!(offset, 16);
                assert!(matches!(*base, Constant::UnitAddress { offset: 0, .. }));
            }
            _ => panic!("expected Offset"),
        }
    }

    #[test]
    fn int_to_complex_cast_sets_imaginary_part_to_zero() {
        use crate::types::{FloatDomain, FloatWidth};
        let t = target();
        let int_ty = Type::int_with_align(4, true, &t);
        let complex_ty = Type::float_(FloatWidth::Double, FloatDomain::Complex, &t);
        let five = Constant::from_i128(&int_ty, 5);
        let cast = five.cast(&int_ty, &complex_ty);
        let (re, im) = cast.complex_parts(FloatWidth::Double);
        assert_eq!(re, 5.0);
        assert_eq!(im, 0.0);
    }

    #[test]
    fn comparison_produces_int_typed_zero_or_one() {
        let t = target();
        let ty = Type::int_with_align(4, true, &t);
        let int_ty = ty.clone();
        let a = Constant::from_i128(&ty, 3);
        let b = Constant::from_i128(&ty, 5);
        let lt = Constant::compare(&a, &b, &ty, CompareOp::Lt, &int_ty);
        assert_eq!(lt.to_i128(true), 1);
    }
}
