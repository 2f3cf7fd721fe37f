//! Numeric functions

use super::{builtin, num, num_or, Builtin};
use aggtree_core::Value;

const CATEGORY: &str = "math";

fn unary(args: &[Value], f: fn(f64) -> f64) -> Value {
    Value::Number(f(num(args, 0)))
}

fn round(args: &[Value]) -> Value {
    let x = num(args, 0);
    let digits = num_or(args, 1, 0.0);
    if digits == 0.0 {
        // Half rounds towards +infinity
        return Value::Number((x + 0.5).floor());
    }
    let factor = 10f64.powi(digits as i32);
    Value::Number(((x * factor) + 0.5).floor() / factor)
}

fn sign(args: &[Value]) -> Value {
    let x = num(args, 0);
    Value::Number(if x.is_nan() || x == 0.0 { x } else { x.signum() })
}

fn clz32(args: &[Value]) -> Value {
    let x = num(args, 0);
    let bits = if x.is_finite() { (x.trunc() as i64) as u32 } else { 0 };
    Value::Number(bits.leading_zeros() as f64)
}

fn greatest(args: &[Value]) -> Value {
    let mut best = f64::NEG_INFINITY;
    for v in args {
        let n = v.to_number();
        if n.is_nan() {
            return Value::Number(f64::NAN);
        }
        best = best.max(n);
    }
    Value::Number(best)
}

fn least(args: &[Value]) -> Value {
    let mut best = f64::INFINITY;
    for v in args {
        let n = v.to_number();
        if n.is_nan() {
            return Value::Number(f64::NAN);
        }
        best = best.min(n);
    }
    Value::Number(best)
}

fn modulo(args: &[Value]) -> Value {
    Value::Number(num(args, 0) % num(args, 1))
}

fn bin(args: &[Value]) -> Value {
    let (x, lo, hi, step) = (num(args, 0), num(args, 1), num(args, 2), num(args, 3));
    if !(step > 0.0) {
        return Value::Number(f64::NAN);
    }
    let clamped = x.max(lo).min(hi);
    Value::Number(lo + ((clamped - lo) / step).floor() * step)
}

pub static MATH_FUNCTIONS: &[Builtin] = &[
    builtin!(CATEGORY, "abs", [1], "abs(x)", "Absolute value", |a| unary(a, f64::abs)),
    builtin!(CATEGORY, "acos", [1], "acos(x)", "Arc cosine in radians", |a| unary(a, f64::acos)),
    builtin!(CATEGORY, "acosh", [1], "acosh(x)", "Inverse hyperbolic cosine", |a| unary(a, f64::acosh)),
    builtin!(CATEGORY, "asin", [1], "asin(x)", "Arc sine in radians", |a| unary(a, f64::asin)),
    builtin!(CATEGORY, "asinh", [1], "asinh(x)", "Inverse hyperbolic sine", |a| unary(a, f64::asinh)),
    builtin!(CATEGORY, "atan", [1], "atan(x)", "Arc tangent in radians", |a| unary(a, f64::atan)),
    builtin!(CATEGORY, "atan2", [2], "atan2(y, x)", "Angle of the point (x, y)", |a| Value::Number(num(a, 0).atan2(num(a, 1)))),
    builtin!(CATEGORY, "atanh", [1], "atanh(x)", "Inverse hyperbolic tangent", |a| unary(a, f64::atanh)),
    builtin!(CATEGORY, "bin", [4], "bin(x, lo, hi, step)", "Lower bound of the bin containing x", bin),
    builtin!(CATEGORY, "cbrt", [1], "cbrt(x)", "Cube root", |a| unary(a, f64::cbrt)),
    builtin!(CATEGORY, "ceil", [1], "ceil(x)", "Smallest integer not below x", |a| unary(a, f64::ceil)),
    builtin!(CATEGORY, "clz32", [1], "clz32(x)", "Leading zero bits of the 32-bit integer", clz32),
    builtin!(CATEGORY, "cos", [1], "cos(x)", "Cosine", |a| unary(a, f64::cos)),
    builtin!(CATEGORY, "cosh", [1], "cosh(x)", "Hyperbolic cosine", |a| unary(a, f64::cosh)),
    builtin!(CATEGORY, "degrees", [1], "degrees(x)", "Radians to degrees", |a| unary(a, f64::to_degrees)),
    builtin!(CATEGORY, "exp", [1], "exp(x)", "e raised to x", |a| unary(a, f64::exp)),
    builtin!(CATEGORY, "expm1", [1], "expm1(x)", "exp(x) - 1", |a| unary(a, f64::exp_m1)),
    builtin!(CATEGORY, "floor", [1], "floor(x)", "Largest integer not above x", |a| unary(a, f64::floor)),
    builtin!(CATEGORY, "fround", [1], "fround(x)", "Nearest single precision float", |a| unary(a, |x| x as f32 as f64)),
    builtin!(CATEGORY, "greatest", [1, 2, 3, 4, 5, 6, 7, 8], "greatest(x, y, ...)", "Largest argument", greatest),
    builtin!(CATEGORY, "hypot", [2], "hypot(x, y)", "Euclidean norm of (x, y)", |a| Value::Number(num(a, 0).hypot(num(a, 1)))),
    builtin!(CATEGORY, "is_finite", [1], "is_finite(x)", "True when x is a finite number", |a| Value::Bool(num(a, 0).is_finite())),
    builtin!(CATEGORY, "is_nan", [1], "is_nan(x)", "True when x is not a number", |a| Value::Bool(num(a, 0).is_nan())),
    builtin!(CATEGORY, "least", [1, 2, 3, 4, 5, 6, 7, 8], "least(x, y, ...)", "Smallest argument", least),
    builtin!(CATEGORY, "log", [1], "log(x)", "Natural logarithm", |a| unary(a, f64::ln)),
    builtin!(CATEGORY, "log10", [1], "log10(x)", "Base 10 logarithm", |a| unary(a, f64::log10)),
    builtin!(CATEGORY, "log1p", [1], "log1p(x)", "ln(1 + x)", |a| unary(a, f64::ln_1p)),
    builtin!(CATEGORY, "log2", [1], "log2(x)", "Base 2 logarithm", |a| unary(a, f64::log2)),
    builtin!(CATEGORY, "modulo", [2], "modulo(x, y)", "Remainder of x / y", modulo),
    builtin!(CATEGORY, "pow", [2], "pow(base, exponent)", "base raised to exponent", |a| Value::Number(num(a, 0).powf(num(a, 1)))),
    builtin!(CATEGORY, "radians", [1], "radians(x)", "Degrees to radians", |a| unary(a, f64::to_radians)),
    builtin!(CATEGORY, "round", [1, 2], "round(x, digits?)", "Round half up to the given decimal digits", round),
    builtin!(CATEGORY, "sign", [1], "sign(x)", "-1, 0 or 1", sign),
    builtin!(CATEGORY, "sin", [1], "sin(x)", "Sine", |a| unary(a, f64::sin)),
    builtin!(CATEGORY, "sinh", [1], "sinh(x)", "Hyperbolic sine", |a| unary(a, f64::sinh)),
    builtin!(CATEGORY, "sqrt", [1], "sqrt(x)", "Square root", |a| unary(a, f64::sqrt)),
    builtin!(CATEGORY, "tan", [1], "tan(x)", "Tangent", |a| unary(a, f64::tan)),
    builtin!(CATEGORY, "tanh", [1], "tanh(x)", "Hyperbolic tangent", |a| unary(a, f64::tanh)),
    builtin!(CATEGORY, "trunc", [1], "trunc(x)", "Integer part of x", |a| unary(a, f64::trunc)),
];
