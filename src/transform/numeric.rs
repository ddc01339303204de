//! Conversion of numeric literals to the exact type of the variable they
//! initialize.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::ast::{Constant, Decimal, wrapping_i64};
use crate::span::Span;
use crate::diagnostics::LowerError;
use crate::types::*;

/// Numeric value of a literal, before conversion.
#[derive(Debug, Clone)]
enum Source {
    Integral(BigInt),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
}

impl Source {
    fn of(constant: &Constant) -> Option<Source> {
        Some(match constant {
            Constant::Byte(v) => Source::Integral(BigInt::from(*v)),
            Constant::Short(v) => Source::Integral(BigInt::from(*v)),
            Constant::Int(v) => Source::Integral(BigInt::from(*v)),
            Constant::Long(v) => Source::Integral(BigInt::from(*v)),
            Constant::BigInteger(v) => Source::Integral(v.clone()),
            Constant::Float(v) => Source::Float(*v),
            Constant::Double(v) => Source::Double(*v),
            Constant::BigDecimal(d) => Source::Decimal(d.clone()),
            _ => return None,
        })
    }

    /// `Number.intValue()`: floating values saturate, wider integers wrap.
    fn int_value(&self) -> i32 {
        match self {
            Source::Float(v) => *v as i32,
            Source::Double(v) => *v as i32,
            _ => self.long_value() as i32,
        }
    }

    fn long_value(&self) -> i64 {
        match self {
            Source::Integral(v) => wrapping_i64(v),
            Source::Float(v) => *v as i64,
            Source::Double(v) => *v as i64,
            Source::Decimal(d) => wrapping_i64(&d.truncate()),
        }
    }

    fn float_value(&self) -> f32 {
        match self {
            Source::Integral(v) => v.to_f32().unwrap_or(f32::NAN),
            Source::Float(v) => *v,
            Source::Double(v) => *v as f32,
            Source::Decimal(d) => d.to_f64() as f32,
        }
    }

    fn double_value(&self) -> f64 {
        match self {
            Source::Integral(v) => v.to_f64().unwrap_or(f64::NAN),
            Source::Float(v) => *v as f64,
            Source::Double(v) => *v,
            Source::Decimal(d) => d.to_f64(),
        }
    }

    /// Floating values convert through their exact binary value, so
    /// `2.9` becomes `2` and `1e-40` becomes `0`.
    fn big_integer(&self) -> Option<BigInt> {
        match self {
            Source::Integral(v) => Some(v.clone()),
            Source::Float(v) => BigInt::from_f32(*v),
            Source::Double(v) => BigInt::from_f64(*v),
            Source::Decimal(d) => Some(d.truncate()),
        }
    }

    fn big_decimal(&self) -> Option<Decimal> {
        match self {
            Source::Integral(v) => Some(Decimal::from_integer(v.clone())),
            Source::Float(v) => Decimal::from_f32(*v),
            Source::Double(v) => Decimal::from_f64(*v),
            Source::Decimal(d) => Some(d.clone()),
        }
    }
}

/// Convert a numeric literal to the number kind named by `target` (a wrapper
/// class, `BigInteger` or `BigDecimal`). Byte and short narrow through
/// `int` with two's-complement truncation, so `300` as a byte is `44`.
pub fn convert_constant(constant: &Constant, target: &Type, span: Span) -> Result<Constant, LowerError> {
    let Some(source) = Source::of(constant) else {
        return Err(LowerError::unsupported_conversion(
            format!("{constant} is not a number"),
            span,
        ));
    };
    let out_of_range = || {
        LowerError::unsupported_conversion(format!("{constant} is out of range for {target}"), span)
    };
    let converted = match target.class_name() {
        Some("java.lang.Byte") => Constant::Byte(source.int_value() as i8),
        Some("java.lang.Short") => Constant::Short(source.int_value() as i16),
        Some("java.lang.Integer") => Constant::Int(source.int_value()),
        Some("java.lang.Long") => Constant::Long(source.long_value()),
        Some("java.lang.Float") => Constant::Float(source.float_value()),
        Some("java.lang.Double") => Constant::Double(source.double_value()),
        Some(BIG_INTEGER) => Constant::BigInteger(source.big_integer().ok_or_else(out_of_range)?),
        Some(BIG_DECIMAL) => Constant::BigDecimal(source.big_decimal().ok_or_else(out_of_range)?),
        _ => {
            return Err(LowerError::unsupported_conversion(
                format!("cannot convert {constant} to {target}"),
                span,
            ));
        }
    };
    Ok(converted)
}
