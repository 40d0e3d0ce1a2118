//! Literal folding.
//!
//! Pure evaluation of arithmetic, relational and conversion ops over raw
//! bit patterns. Integer ops wrap at the type's width; signed ops
//! reinterpret the pattern, they never change it. Division by zero and
//! oversized shifts report `Folded::Bottom`, which the builder turns into
//! a Bottom value of the result type.
//!
//! All payloads entering this module are already masked to their width.

use crate::operators::{ArithOpKind, ConvOpKind, RelOpKind};
use crate::types::{f16_to_f32, f32_to_f16, PrimTypeKind};

/// Outcome of folding an operation whose operands are all literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Folded {
    /// The folded bit pattern, masked to the result width.
    Val(u64),
    /// The operation has no defined value (divisor 0, oversized shift).
    Bottom,
}

/// Sign-extend the low `width(ty)` bits to a full i64.
#[inline]
fn sext(ty: PrimTypeKind, bits: u64) -> i64 {
    let w = ty.width();
    if w == 64 {
        bits as i64
    } else {
        let shift = 64 - w;
        ((bits << shift) as i64) >> shift
    }
}

#[inline]
fn mask(ty: PrimTypeKind, bits: u64) -> u64 {
    bits & ty.bit_mask()
}

/// Decode a float literal of the given kind into f64 for comparison, or
/// into its natural precision for arithmetic via [`float_binop`].
#[inline]
fn float_value(ty: PrimTypeKind, bits: u64) -> f64 {
    match ty {
        PrimTypeKind::F16 => f16_to_f32(bits as u16) as f64,
        PrimTypeKind::F32 => f32::from_bits(bits as u32) as f64,
        PrimTypeKind::F64 => f64::from_bits(bits),
        _ => unreachable!("float_value on non-float kind"),
    }
}

/// Apply a float binary op at the literal's own precision and re-encode.
/// f16 computes in f32 and rounds once, which is correctly rounded for
/// these ops.
fn float_binop(ty: PrimTypeKind, a: u64, b: u64, f: impl Fn(f64, f64) -> f64) -> u64 {
    match ty {
        PrimTypeKind::F16 => {
            let (x, y) = (f16_to_f32(a as u16), f16_to_f32(b as u16));
            f32_to_f16(f(x as f64, y as f64) as f32) as u64
        }
        PrimTypeKind::F32 => {
            let (x, y) = (f32::from_bits(a as u32), f32::from_bits(b as u32));
            (f(x as f64, y as f64) as f32).to_bits() as u64
        }
        PrimTypeKind::F64 => {
            let (x, y) = (f64::from_bits(a), f64::from_bits(b));
            f(x, y).to_bits()
        }
        _ => unreachable!("float_binop on non-float kind"),
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

/// Fold an arithmetic op over two literals of type `ty`.
pub(crate) fn arith(kind: ArithOpKind, ty: PrimTypeKind, a: u64, b: u64) -> Folded {
    use ArithOpKind::*;

    if ty.is_float() {
        let bits = match kind {
            Add | Fadd => float_binop(ty, a, b, |x, y| x + y),
            Sub | Fsub => float_binop(ty, a, b, |x, y| x - y),
            Mul | Fmul => float_binop(ty, a, b, |x, y| x * y),
            Fdiv => float_binop(ty, a, b, |x, y| x / y),
            Frem => float_binop(ty, a, b, |x, y| x % y),
            _ => unreachable!("non-float op on float literals survived type checking"),
        };
        return Folded::Val(bits);
    }

    let m = ty.bit_mask();
    let val = match kind {
        Add => a.wrapping_add(b) & m,
        Sub => a.wrapping_sub(b) & m,
        Mul => a.wrapping_mul(b) & m,
        Udiv => {
            if b == 0 {
                return Folded::Bottom;
            }
            (a / b) & m
        }
        Urem => {
            if b == 0 {
                return Folded::Bottom;
            }
            (a % b) & m
        }
        Sdiv => {
            if b == 0 {
                return Folded::Bottom;
            }
            (sext(ty, a).wrapping_div(sext(ty, b)) as u64) & m
        }
        Srem => {
            if b == 0 {
                return Folded::Bottom;
            }
            (sext(ty, a).wrapping_rem(sext(ty, b)) as u64) & m
        }
        And => a & b,
        Or => a | b,
        Xor => a ^ b,
        Shl => {
            if b >= u64::from(ty.width()) {
                return Folded::Bottom;
            }
            (a << b) & m
        }
        Lshr => {
            if b >= u64::from(ty.width()) {
                return Folded::Bottom;
            }
            a >> b
        }
        Ashr => {
            if b >= u64::from(ty.width()) {
                return Folded::Bottom;
            }
            ((sext(ty, a) >> b) as u64) & m
        }
        Fadd | Fsub | Fmul | Fdiv | Frem => {
            unreachable!("float-only op on int literals survived type checking")
        }
    };
    Folded::Val(val)
}

// =============================================================================
// Relational
// =============================================================================

/// Fold a relational op over two literals of type `ty`. The kind must
/// already be normalized (no gt/ge variants).
pub(crate) fn rel(kind: RelOpKind, ty: PrimTypeKind, a: u64, b: u64) -> bool {
    use RelOpKind::*;

    if kind.is_float() {
        let (x, y) = (float_value(ty, a), float_value(ty, b));
        let unordered = x.is_nan() || y.is_nan();
        return match kind {
            FcmpOeq => !unordered && x == y,
            FcmpOne => !unordered && x != y,
            FcmpOlt => !unordered && x < y,
            FcmpOle => !unordered && x <= y,
            FcmpUeq => unordered || x == y,
            FcmpUne => unordered || x != y,
            FcmpUlt => unordered || x < y,
            FcmpUle => unordered || x <= y,
            _ => unreachable!("unnormalized float comparison"),
        };
    }

    match kind {
        CmpEq => a == b,
        CmpNe => a != b,
        CmpUlt => a < b,
        CmpUle => a <= b,
        CmpSlt => sext(ty, a) < sext(ty, b),
        CmpSle => sext(ty, a) <= sext(ty, b),
        _ => unreachable!("unnormalized or mistyped integer comparison"),
    }
}

// =============================================================================
// Conversion
// =============================================================================

/// Fold a conversion, or return None to keep the node unfolded. Folding
/// is only performed where a single correctly-rounded step exists.
pub(crate) fn conv(
    kind: ConvOpKind,
    from: PrimTypeKind,
    to: PrimTypeKind,
    bits: u64,
) -> Option<u64> {
    use ConvOpKind::*;
    match kind {
        Trunc => Some(mask(to, bits)),
        Zext | Bitcast => Some(bits),
        Sext => Some(mask(to, sext(from, bits) as u64)),
        Fext => {
            let widened = match (from, to) {
                (PrimTypeKind::F16, PrimTypeKind::F32) => {
                    f16_to_f32(bits as u16).to_bits() as u64
                }
                (PrimTypeKind::F16, PrimTypeKind::F64) => {
                    (f16_to_f32(bits as u16) as f64).to_bits()
                }
                (PrimTypeKind::F32, PrimTypeKind::F64) => {
                    (f32::from_bits(bits as u32) as f64).to_bits()
                }
                _ => return None,
            };
            Some(widened)
        }
        Ftrunc => match (from, to) {
            (PrimTypeKind::F64, PrimTypeKind::F32) => {
                Some((f64::from_bits(bits) as f32).to_bits() as u64)
            }
            (PrimTypeKind::F32, PrimTypeKind::F16) => {
                Some(f32_to_f16(f32::from_bits(bits as u32)) as u64)
            }
            // f64 -> f16 through f32 would double-round; keep the node.
            _ => None,
        },
        Stof => {
            let v = sext(from, bits);
            match to {
                PrimTypeKind::F32 => Some((v as f32).to_bits() as u64),
                PrimTypeKind::F64 => Some((v as f64).to_bits()),
                _ => None,
            }
        }
        Utof => match to {
            PrimTypeKind::F32 => Some((bits as f32).to_bits() as u64),
            PrimTypeKind::F64 => Some((bits as f64).to_bits()),
            _ => None,
        },
        Ftos => {
            let v = float_value(from, bits);
            if v.is_nan() {
                return None;
            }
            let t = v.trunc();
            let lo = -(2f64.powi(to.width() as i32 - 1));
            let hi = 2f64.powi(to.width() as i32 - 1);
            if t >= lo && t < hi {
                Some(mask(to, (t as i64) as u64))
            } else {
                None
            }
        }
        Ftou => {
            let v = float_value(from, bits);
            if v.is_nan() {
                return None;
            }
            let t = v.trunc();
            let hi = 2f64.powi(to.width() as i32);
            if t >= 0.0 && t < hi {
                Some(mask(to, t as u64))
            } else {
                None
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wraps_at_width() {
        assert_eq!(
            arith(ArithOpKind::Add, PrimTypeKind::U8, 0xff, 1),
            Folded::Val(0)
        );
        assert_eq!(
            arith(ArithOpKind::Add, PrimTypeKind::U32, 3, 4),
            Folded::Val(7)
        );
        assert_eq!(
            arith(ArithOpKind::Mul, PrimTypeKind::U16, 0x8000, 2),
            Folded::Val(0)
        );
    }

    #[test]
    fn test_division_by_zero_bottoms() {
        assert_eq!(arith(ArithOpKind::Udiv, PrimTypeKind::U32, 10, 0), Folded::Bottom);
        assert_eq!(arith(ArithOpKind::Urem, PrimTypeKind::U32, 10, 0), Folded::Bottom);
        assert_eq!(arith(ArithOpKind::Sdiv, PrimTypeKind::S32, 10, 0), Folded::Bottom);
        assert_eq!(arith(ArithOpKind::Srem, PrimTypeKind::S32, 10, 0), Folded::Bottom);
    }

    #[test]
    fn test_signed_division_reinterprets() {
        // -1 / 1 == -1 at width 32.
        assert_eq!(
            arith(ArithOpKind::Sdiv, PrimTypeKind::U32, 0xffff_ffff, 1),
            Folded::Val(0xffff_ffff)
        );
        // -8 / 2 == -4.
        assert_eq!(
            arith(ArithOpKind::Sdiv, PrimTypeKind::S8, 0xf8, 2),
            Folded::Val(0xfc)
        );
        // MIN / -1 wraps.
        assert_eq!(
            arith(ArithOpKind::Sdiv, PrimTypeKind::S8, 0x80, 0xff),
            Folded::Val(0x80)
        );
    }

    #[test]
    fn test_shift_out_of_range_bottoms() {
        assert_eq!(arith(ArithOpKind::Shl, PrimTypeKind::U8, 1, 8), Folded::Bottom);
        assert_eq!(arith(ArithOpKind::Shl, PrimTypeKind::U8, 1, 7), Folded::Val(0x80));
        assert_eq!(arith(ArithOpKind::Ashr, PrimTypeKind::U8, 0x80, 7), Folded::Val(0xff));
        assert_eq!(arith(ArithOpKind::Lshr, PrimTypeKind::U8, 0x80, 7), Folded::Val(1));
    }

    #[test]
    fn test_float_fold() {
        let a = 1.5f32.to_bits() as u64;
        let b = 2.25f32.to_bits() as u64;
        assert_eq!(
            arith(ArithOpKind::Fadd, PrimTypeKind::F32, a, b),
            Folded::Val(3.75f32.to_bits() as u64)
        );
        // frem keeps the dividend's sign.
        let x = (-7.0f64).to_bits();
        let y = 4.0f64.to_bits();
        assert_eq!(
            arith(ArithOpKind::Frem, PrimTypeKind::F64, x, y),
            Folded::Val((-3.0f64).to_bits())
        );
    }

    #[test]
    fn test_float_div_by_zero_is_ieee_not_bottom() {
        let a = 1.0f32.to_bits() as u64;
        let z = 0.0f32.to_bits() as u64;
        assert_eq!(
            arith(ArithOpKind::Fdiv, PrimTypeKind::F32, a, z),
            Folded::Val(f32::INFINITY.to_bits() as u64)
        );
    }

    #[test]
    fn test_f16_fold_rounds_once() {
        // 1.0 + 2^-11 rounds to 1.0 in f16 (round to nearest even).
        let one = f32_to_f16(1.0) as u64;
        let tiny = f32_to_f16(2f32.powi(-11)) as u64;
        assert_eq!(
            arith(ArithOpKind::Fadd, PrimTypeKind::F16, one, tiny),
            Folded::Val(one)
        );
    }

    #[test]
    fn test_rel_signed_vs_unsigned() {
        // 0xff as u8 is 255, as s8 is -1.
        assert!(rel(RelOpKind::CmpUlt, PrimTypeKind::U8, 1, 0xff));
        assert!(!rel(RelOpKind::CmpSlt, PrimTypeKind::U8, 1, 0xff));
        assert!(rel(RelOpKind::CmpSlt, PrimTypeKind::U8, 0xff, 1));
    }

    #[test]
    fn test_rel_nan_ordered_unordered() {
        let nan = f64::NAN.to_bits();
        let one = 1.0f64.to_bits();
        assert!(!rel(RelOpKind::FcmpOeq, PrimTypeKind::F64, nan, one));
        assert!(!rel(RelOpKind::FcmpOlt, PrimTypeKind::F64, nan, one));
        assert!(rel(RelOpKind::FcmpUne, PrimTypeKind::F64, nan, one));
        assert!(rel(RelOpKind::FcmpUlt, PrimTypeKind::F64, nan, one));
    }

    #[test]
    fn test_conv_folds() {
        assert_eq!(
            conv(ConvOpKind::Trunc, PrimTypeKind::U32, PrimTypeKind::U8, 0x1ff),
            Some(0xff)
        );
        assert_eq!(
            conv(ConvOpKind::Sext, PrimTypeKind::S8, PrimTypeKind::S32, 0x80),
            Some(0xffff_ff80)
        );
        assert_eq!(
            conv(ConvOpKind::Zext, PrimTypeKind::U8, PrimTypeKind::U32, 0x80),
            Some(0x80)
        );
        assert_eq!(
            conv(ConvOpKind::Stof, PrimTypeKind::S32, PrimTypeKind::F64, 0xffff_ffff),
            Some((-1.0f64).to_bits())
        );
        // Out-of-range float-to-int stays unfolded.
        assert_eq!(
            conv(ConvOpKind::Ftou, PrimTypeKind::F32, PrimTypeKind::U8, 300.0f32.to_bits() as u64),
            None
        );
        assert_eq!(
            conv(ConvOpKind::Ftos, PrimTypeKind::F32, PrimTypeKind::S8, (-5.7f32).to_bits() as u64),
            Some(0xfb)
        );
    }
}
