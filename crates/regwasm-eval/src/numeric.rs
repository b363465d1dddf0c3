//! Numeric semantics of the arithmetic, comparison and conversion opcodes.
//!
//! Integer arithmetic wraps. Division traps on zero and on `MIN / -1`;
//! float-to-int truncation traps on NaN and out-of-range inputs. Float
//! `min`/`max` propagate NaN and order `-0 < +0`.

use regwasm_types::OpCode;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

fn flag(b: bool) -> Value {
    Value::I32(i32::from(b))
}

// ══════════════════════════════════════════════════════════════════════════════
// Unary operators and conversions
// ══════════════════════════════════════════════════════════════════════════════

pub fn unary(op: OpCode, v: Value) -> EvalResult<Value> {
    use OpCode::*;
    let result = match op {
        // ── i32 ──
        ClzInt => Value::I32(v.as_i32()?.leading_zeros() as i32),
        CtzInt => Value::I32(v.as_i32()?.trailing_zeros() as i32),
        PopCntInt => Value::I32(v.as_i32()?.count_ones() as i32),
        EqzInt => flag(v.as_i32()? == 0),

        // ── i64 ──
        ClzLong => Value::I64(i64::from(v.as_i64()?.leading_zeros())),
        CtzLong => Value::I64(i64::from(v.as_i64()?.trailing_zeros())),
        PopCntLong => Value::I64(i64::from(v.as_i64()?.count_ones())),
        EqzLong => flag(v.as_i64()? == 0),

        // ── f32 ──
        AbsFlt => Value::F32(v.as_f32()?.abs()),
        NegFlt => Value::F32(-v.as_f32()?),
        CeilFlt => Value::F32(v.as_f32()?.ceil()),
        FloorFlt => Value::F32(v.as_f32()?.floor()),
        TruncFlt => Value::F32(v.as_f32()?.trunc()),
        NearestFlt => Value::F32(v.as_f32()?.round_ties_even()),
        SqrtFlt => Value::F32(v.as_f32()?.sqrt()),

        // ── f64 ──
        AbsDb => Value::F64(v.as_f64()?.abs()),
        NegDb => Value::F64(-v.as_f64()?),
        CeilDb => Value::F64(v.as_f64()?.ceil()),
        FloorDb => Value::F64(v.as_f64()?.floor()),
        TruncDb => Value::F64(v.as_f64()?.trunc()),
        NearestDb => Value::F64(v.as_f64()?.round_ties_even()),
        SqrtDb => Value::F64(v.as_f64()?.sqrt()),

        // ── Conversions ──
        WrapLong => Value::I32(v.as_i64()? as i32),
        ExtendIntToLong => Value::I64(i64::from(v.as_i32()?)),
        ExtendUIntToLong => Value::I64(i64::from(v.as_i32()? as u32)),
        TruncFltToInt => Value::I32(trunc_i32(f64::from(v.as_f32()?))?),
        TruncDbToInt => Value::I32(trunc_i32(v.as_f64()?)?),
        TruncFltToUInt => Value::I32(trunc_u32(f64::from(v.as_f32()?))? as i32),
        TruncDbToUInt => Value::I32(trunc_u32(v.as_f64()?)? as i32),
        TruncFltToLong => Value::I64(trunc_i64(f64::from(v.as_f32()?))?),
        TruncDbToLong => Value::I64(trunc_i64(v.as_f64()?)?),
        TruncFltToULong => Value::I64(trunc_u64(f64::from(v.as_f32()?))? as i64),
        TruncDbToULong => Value::I64(trunc_u64(v.as_f64()?)? as i64),
        ConvIntToFlt => Value::F32(v.as_i32()? as f32),
        ConvUIntToFlt => Value::F32(v.as_i32()? as u32 as f32),
        ConvLongToFlt => Value::F32(v.as_i64()? as f32),
        ConvULongToFlt => Value::F32(v.as_i64()? as u64 as f32),
        DemoteDb => Value::F32(v.as_f64()? as f32),
        ConvIntToDb => Value::F64(f64::from(v.as_i32()?)),
        ConvUIntToDb => Value::F64(f64::from(v.as_i32()? as u32)),
        ConvLongToDb => Value::F64(v.as_i64()? as f64),
        ConvULongToDb => Value::F64(v.as_i64()? as u64 as f64),
        PromoteFlt => Value::F64(f64::from(v.as_f32()?)),
        ReinterpretFltToInt => Value::I32(v.as_f32()?.to_bits() as i32),
        ReinterpretDbToLong => Value::I64(v.as_f64()?.to_bits() as i64),
        ReinterpretIntToFlt => Value::F32(f32::from_bits(v.as_i32()? as u32)),
        ReinterpretLongToDb => Value::F64(f64::from_bits(v.as_i64()? as u64)),

        other => return Err(EvalError::Runtime(format!("{other} is not a unary operator"))),
    };
    Ok(result)
}

/// Truncate toward zero, trapping when the result does not fit in
/// `[min, max_exclusive)`.
fn checked_trunc(x: f64, min: f64, max_exclusive: f64) -> EvalResult<f64> {
    if x.is_nan() {
        return Err(EvalError::InvalidConversion);
    }
    let t = x.trunc();
    if t < min || t >= max_exclusive {
        return Err(EvalError::IntegerOverflow);
    }
    Ok(t)
}

fn trunc_i32(x: f64) -> EvalResult<i32> {
    Ok(checked_trunc(x, -2_147_483_648.0, 2_147_483_648.0)? as i32)
}

fn trunc_u32(x: f64) -> EvalResult<u32> {
    Ok(checked_trunc(x, 0.0, 4_294_967_296.0)? as u32)
}

fn trunc_i64(x: f64) -> EvalResult<i64> {
    Ok(checked_trunc(x, -9_223_372_036_854_775_808.0, 9_223_372_036_854_775_808.0)? as i64)
}

fn trunc_u64(x: f64) -> EvalResult<u64> {
    Ok(checked_trunc(x, 0.0, 18_446_744_073_709_551_616.0)? as u64)
}

// ══════════════════════════════════════════════════════════════════════════════
// Binary operators
// ══════════════════════════════════════════════════════════════════════════════

pub fn binary(op: OpCode, a: Value, b: Value) -> EvalResult<Value> {
    use OpCode::*;
    let result = match op {
        AddInt | SubInt | MulInt | DivInt | DivUInt | RemInt | RemUInt | AndInt | OrInt
        | XorInt | ShlInt | ShrInt | ShrUInt | RolInt | RorInt => {
            Value::I32(int32(op, a.as_i32()?, b.as_i32()?)?)
        }
        CmEqInt | CmNeInt | CmLtInt | CmLtUInt | CmGtInt | CmGtUInt | CmLeInt | CmLeUInt
        | CmGeInt | CmGeUInt => flag(compare_int32(op, a.as_i32()?, b.as_i32()?)),

        AddLong | SubLong | MulLong | DivLong | DivULong | RemLong | RemULong | AndLong
        | OrLong | XorLong | ShlLong | ShrLong | ShrULong | RolLong | RorLong => {
            Value::I64(int64(op, a.as_i64()?, b.as_i64()?)?)
        }
        CmEqLong | CmNeLong | CmLtLong | CmLtULong | CmGtLong | CmGtULong | CmLeLong
        | CmLeULong | CmGeLong | CmGeULong => flag(compare_int64(op, a.as_i64()?, b.as_i64()?)),

        AddFlt | SubFlt | MulFlt | DivFlt | MinFlt | MaxFlt | CopySignFlt => {
            let (x, y) = (a.as_f32()?, b.as_f32()?);
            Value::F32(match op {
                AddFlt => x + y,
                SubFlt => x - y,
                MulFlt => x * y,
                DivFlt => x / y,
                MinFlt => fmin(x.into(), y.into()) as f32,
                MaxFlt => fmax(x.into(), y.into()) as f32,
                _ => x.copysign(y),
            })
        }
        CmEqFlt | CmNeFlt | CmLtFlt | CmGtFlt | CmLeFlt | CmGeFlt => {
            flag(compare_float(op, a.as_f32()?.into(), b.as_f32()?.into()))
        }

        AddDb | SubDb | MulDb | DivDb | MinDb | MaxDb | CopySignDb => {
            let (x, y) = (a.as_f64()?, b.as_f64()?);
            Value::F64(match op {
                AddDb => x + y,
                SubDb => x - y,
                MulDb => x * y,
                DivDb => x / y,
                MinDb => fmin(x, y),
                MaxDb => fmax(x, y),
                _ => x.copysign(y),
            })
        }
        CmEqDb | CmNeDb | CmLtDb | CmGtDb | CmLeDb | CmGeDb => {
            flag(compare_float(op, a.as_f64()?, b.as_f64()?))
        }

        other => return Err(EvalError::Runtime(format!("{other} is not a binary operator"))),
    };
    Ok(result)
}

fn int32(op: OpCode, a: i32, b: i32) -> EvalResult<i32> {
    use OpCode::*;
    let shift = b as u32 % 32;
    Ok(match op {
        AddInt => a.wrapping_add(b),
        SubInt => a.wrapping_sub(b),
        MulInt => a.wrapping_mul(b),
        DivInt => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b).ok_or(EvalError::IntegerOverflow)?
        }
        DivUInt => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            ((a as u32) / (b as u32)) as i32
        }
        RemInt => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        RemUInt => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            ((a as u32) % (b as u32)) as i32
        }
        AndInt => a & b,
        OrInt => a | b,
        XorInt => a ^ b,
        ShlInt => a.wrapping_shl(shift),
        ShrInt => a.wrapping_shr(shift),
        ShrUInt => ((a as u32).wrapping_shr(shift)) as i32,
        RolInt => a.rotate_left(shift),
        _ => a.rotate_right(shift),
    })
}

fn int64(op: OpCode, a: i64, b: i64) -> EvalResult<i64> {
    use OpCode::*;
    let shift = (b as u64 % 64) as u32;
    Ok(match op {
        AddLong => a.wrapping_add(b),
        SubLong => a.wrapping_sub(b),
        MulLong => a.wrapping_mul(b),
        DivLong => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b).ok_or(EvalError::IntegerOverflow)?
        }
        DivULong => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            ((a as u64) / (b as u64)) as i64
        }
        RemLong => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        RemULong => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            ((a as u64) % (b as u64)) as i64
        }
        AndLong => a & b,
        OrLong => a | b,
        XorLong => a ^ b,
        ShlLong => a.wrapping_shl(shift),
        ShrLong => a.wrapping_shr(shift),
        ShrULong => ((a as u64).wrapping_shr(shift)) as i64,
        RolLong => a.rotate_left(shift),
        _ => a.rotate_right(shift),
    })
}

fn compare_int32(op: OpCode, a: i32, b: i32) -> bool {
    use OpCode::*;
    let (ua, ub) = (a as u32, b as u32);
    match op {
        CmEqInt => a == b,
        CmNeInt => a != b,
        CmLtInt => a < b,
        CmLtUInt => ua < ub,
        CmGtInt => a > b,
        CmGtUInt => ua > ub,
        CmLeInt => a <= b,
        CmLeUInt => ua <= ub,
        CmGeInt => a >= b,
        _ => ua >= ub,
    }
}

fn compare_int64(op: OpCode, a: i64, b: i64) -> bool {
    use OpCode::*;
    let (ua, ub) = (a as u64, b as u64);
    match op {
        CmEqLong => a == b,
        CmNeLong => a != b,
        CmLtLong => a < b,
        CmLtULong => ua < ub,
        CmGtLong => a > b,
        CmGtULong => ua > ub,
        CmLeLong => a <= b,
        CmLeULong => ua <= ub,
        CmGeLong => a >= b,
        _ => ua >= ub,
    }
}

/// Float comparisons, shared by both widths. f32 operands are widened
/// exactly.
fn compare_float(op: OpCode, a: f64, b: f64) -> bool {
    use OpCode::*;
    match op {
        CmEqFlt | CmEqDb => a == b,
        CmNeFlt | CmNeDb => a != b,
        CmLtFlt | CmLtDb => a < b,
        CmGtFlt | CmGtDb => a > b,
        CmLeFlt | CmLeDb => a <= b,
        _ => a >= b,
    }
}

fn fmin(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else {
        a.min(b)
    }
}

fn fmax(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else {
        a.max(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_traps() {
        let div = |a, b| binary(OpCode::DivInt, Value::I32(a), Value::I32(b));
        assert_eq!(div(7, 2), Ok(Value::I32(3)));
        assert_eq!(div(-7, 2), Ok(Value::I32(-3)));
        assert_eq!(div(1, 0), Err(EvalError::DivisionByZero));
        assert_eq!(div(i32::MIN, -1), Err(EvalError::IntegerOverflow));
        assert_eq!(
            binary(OpCode::RemInt, Value::I32(i32::MIN), Value::I32(-1)),
            Ok(Value::I32(0))
        );
        assert_eq!(
            binary(OpCode::DivULong, Value::I64(-1), Value::I64(2)),
            Ok(Value::I64(i64::MAX))
        );
    }

    #[test]
    fn shifts_and_rotates_mask_the_count() {
        assert_eq!(binary(OpCode::ShlInt, Value::I32(1), Value::I32(33)), Ok(Value::I32(2)));
        assert_eq!(
            binary(OpCode::ShrUInt, Value::I32(-1), Value::I32(28)),
            Ok(Value::I32(0xf))
        );
        assert_eq!(
            binary(OpCode::RolLong, Value::I64(i64::MIN), Value::I64(65)),
            Ok(Value::I64(1))
        );
    }

    #[test]
    fn unsigned_comparisons() {
        assert_eq!(binary(OpCode::CmLtUInt, Value::I32(-1), Value::I32(1)), Ok(Value::I32(0)));
        assert_eq!(binary(OpCode::CmLtInt, Value::I32(-1), Value::I32(1)), Ok(Value::I32(1)));
        assert_eq!(unary(OpCode::EqzLong, Value::I64(0)), Ok(Value::I32(1)));
    }

    #[test]
    fn float_min_max_rules() {
        let min = binary(OpCode::MinDb, Value::F64(0.0), Value::F64(-0.0)).unwrap();
        assert!(min.bits_eq(Value::F64(-0.0)));
        let max = binary(OpCode::MaxFlt, Value::F32(-0.0), Value::F32(0.0)).unwrap();
        assert!(max.bits_eq(Value::F32(0.0)));
        let nan = binary(OpCode::MinFlt, Value::F32(f32::NAN), Value::F32(1.0)).unwrap();
        assert!(nan.as_f32().unwrap().is_nan());
    }

    #[test]
    fn truncation_traps() {
        assert_eq!(unary(OpCode::TruncDbToInt, Value::F64(-3.9)), Ok(Value::I32(-3)));
        assert_eq!(
            unary(OpCode::TruncDbToInt, Value::F64(f64::NAN)),
            Err(EvalError::InvalidConversion)
        );
        assert_eq!(
            unary(OpCode::TruncFltToInt, Value::F32(2_147_483_648.0)),
            Err(EvalError::IntegerOverflow)
        );
        assert_eq!(unary(OpCode::TruncDbToUInt, Value::F64(-0.5)), Ok(Value::I32(0)));
        assert_eq!(
            unary(OpCode::TruncDbToUInt, Value::F64(4_294_967_295.0)),
            Ok(Value::I32(-1))
        );
        assert_eq!(
            unary(OpCode::TruncDbToULong, Value::F64(-1.0)),
            Err(EvalError::IntegerOverflow)
        );
    }

    #[test]
    fn conversions() {
        assert_eq!(unary(OpCode::ExtendUIntToLong, Value::I32(-1)), Ok(Value::I64(0xffff_ffff)));
        assert_eq!(unary(OpCode::WrapLong, Value::I64(0x1_0000_0005)), Ok(Value::I32(5)));
        assert_eq!(unary(OpCode::ConvUIntToDb, Value::I32(-1)), Ok(Value::F64(4_294_967_295.0)));
        assert_eq!(unary(OpCode::NearestDb, Value::F64(2.5)), Ok(Value::F64(2.0)));
        assert_eq!(
            unary(OpCode::ReinterpretFltToInt, Value::F32(1.0)),
            Ok(Value::I32(0x3f80_0000))
        );
    }
}
