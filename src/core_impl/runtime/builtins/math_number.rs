use super::super::operators::js_pow;
use super::*;

macro_rules! unary_math {
    ($($handler:ident => $op:expr;)*) => {
        $(
            fn $handler(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
                let op: fn(f64) -> f64 = $op;
                Ok(Value::Number(op(call.arg(0).as_number())))
            }
        )*
    };
}

unary_math! {
    math_abs => f64::abs;
    math_ceil => f64::ceil;
    math_floor => f64::floor;
    math_trunc => f64::trunc;
    math_round => js_round;
    math_sign => js_sign;
    math_sqrt => f64::sqrt;
    math_cbrt => f64::cbrt;
    math_exp => f64::exp;
    math_expm1 => f64::exp_m1;
    math_log => f64::ln;
    math_log2 => f64::log2;
    math_log10 => f64::log10;
    math_log1p => f64::ln_1p;
    math_sin => f64::sin;
    math_cos => f64::cos;
    math_tan => f64::tan;
    math_asin => f64::asin;
    math_acos => f64::acos;
    math_atan => f64::atan;
    math_sinh => f64::sinh;
    math_cosh => f64::cosh;
    math_tanh => f64::tanh;
    math_asinh => f64::asinh;
    math_acosh => f64::acosh;
    math_atanh => f64::atanh;
    math_fround => |value| f64::from(value as f32);
}

const MATH_CONSTANTS: [(&str, f64); 8] = [
    ("PI", std::f64::consts::PI),
    ("E", std::f64::consts::E),
    ("LN2", std::f64::consts::LN_2),
    ("LN10", std::f64::consts::LN_10),
    ("LOG2E", std::f64::consts::LOG2_E),
    ("LOG10E", std::f64::consts::LOG10_E),
    ("SQRT2", std::f64::consts::SQRT_2),
    ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
];

const NUMBER_CONSTANTS: [(&str, f64); 8] = [
    ("MAX_SAFE_INTEGER", 9_007_199_254_740_991.0),
    ("MIN_SAFE_INTEGER", -9_007_199_254_740_991.0),
    ("EPSILON", f64::EPSILON),
    ("MAX_VALUE", f64::MAX),
    ("MIN_VALUE", 5e-324),
    ("POSITIVE_INFINITY", f64::INFINITY),
    ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
    ("NaN", f64::NAN),
];

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    if let Some(math) = env.global_object("Math", ObjectKind::Host) {
        let functions: [(&str, NativeHandler); 35] = [
            ("abs", math_abs),
            ("ceil", math_ceil),
            ("floor", math_floor),
            ("trunc", math_trunc),
            ("round", math_round),
            ("sign", math_sign),
            ("sqrt", math_sqrt),
            ("cbrt", math_cbrt),
            ("exp", math_exp),
            ("expm1", math_expm1),
            ("log", math_log),
            ("log2", math_log2),
            ("log10", math_log10),
            ("log1p", math_log1p),
            ("sin", math_sin),
            ("cos", math_cos),
            ("tan", math_tan),
            ("asin", math_asin),
            ("acos", math_acos),
            ("atan", math_atan),
            ("sinh", math_sinh),
            ("cosh", math_cosh),
            ("tanh", math_tanh),
            ("asinh", math_asinh),
            ("acosh", math_acosh),
            ("atanh", math_atanh),
            ("fround", math_fround),
            ("atan2", math_atan2),
            ("pow", math_pow),
            ("max", math_max),
            ("min", math_min),
            ("hypot", math_hypot),
            ("imul", math_imul),
            ("clz32", math_clz32),
            ("random", math_random),
        ];
        for (key, handler) in functions {
            env.method(&math, key, &format!("Math.{key}"), handler);
        }
        for (key, value) in MATH_CONSTANTS {
            env.value(&math, key, &format!("Math.{key}"), Value::Number(value));
        }
    }

    let number_proto = env.realm().number_proto.clone();
    env.method(&number_proto, "toString", "Number.prototype.toString", number_to_string);
    env.method(&number_proto, "toLocaleString", "Number.prototype.toLocaleString", number_to_string);
    env.method(&number_proto, "toFixed", "Number.prototype.toFixed", number_to_fixed);
    env.method(&number_proto, "valueOf", "Number.prototype.valueOf", number_value_of);

    let boolean_proto = env.realm().boolean_proto.clone();
    env.method(&boolean_proto, "toString", "Boolean.prototype.toString", boolean_to_string);
    env.method(&boolean_proto, "valueOf", "Boolean.prototype.valueOf", boolean_value_of);
}

pub(super) fn install_statics(env: &mut HostEnvironmentEmulator<'_>, number: &Rc<FunctionValue>) {
    env.static_method(number, "isInteger", "Number.isInteger", is_integer);
    env.static_method(number, "isSafeInteger", "Number.isSafeInteger", is_safe_integer);
    env.static_method(number, "isFinite", "Number.isFinite", number_is_finite);
    env.static_method(number, "isNaN", "Number.isNaN", number_is_nan);
    env.static_method(number, "parseFloat", "Number.parseFloat", super::globals::parse_float);
    env.static_method(number, "parseInt", "Number.parseInt", super::globals::parse_int);
    for (key, value) in NUMBER_CONSTANTS {
        if env.implements(&format!("Number.{key}")) {
            number.props.borrow_mut().set(key, Value::Number(value));
        }
    }
}

/// Rounds half toward +Infinity.
fn js_round(value: f64) -> f64 {
    if !value.is_finite() || value.fract() == 0.0 {
        return value;
    }
    let floor = value.floor();
    let rounded = if value - floor >= 0.5 { floor + 1.0 } else { floor };
    if rounded == 0.0 && value < 0.0 { -0.0 } else { rounded }
}

fn js_sign(value: f64) -> f64 {
    if value.is_nan() || value == 0.0 { value } else { value.signum() }
}

fn math_atan2(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Number(call.arg(0).as_number().atan2(call.arg(1).as_number())))
}

fn math_pow(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Number(js_pow(call.arg(0).as_number(), call.arg(1).as_number())))
}

fn math_max(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut best = f64::NEG_INFINITY;
    for value in call.args.iter().map(Value::as_number) {
        if value.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if value > best || (value == 0.0 && best == 0.0 && best.is_sign_negative()) {
            best = value;
        }
    }
    Ok(Value::Number(best))
}

fn math_min(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut best = f64::INFINITY;
    for value in call.args.iter().map(Value::as_number) {
        if value.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if value < best || (value == 0.0 && best == 0.0 && value.is_sign_negative()) {
            best = value;
        }
    }
    Ok(Value::Number(best))
}

fn math_hypot(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let values = call.args.iter().map(Value::as_number).collect::<Vec<_>>();
    if values.iter().any(|value| value.is_infinite()) {
        return Ok(Value::Number(f64::INFINITY));
    }
    Ok(Value::Number(values.iter().map(|value| value * value).sum::<f64>().sqrt()))
}

fn math_imul(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let left = to_uint32(call.arg(0).as_number()) as i32;
    let right = to_uint32(call.arg(1).as_number()) as i32;
    Ok(Value::Number(f64::from(left.wrapping_mul(right))))
}

fn math_clz32(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Number(f64::from(to_uint32(call.arg(0).as_number()).leading_zeros())))
}

fn math_random(rt: &mut Runtime, _call: &NativeCall) -> Result<Value> {
    Ok(Value::Number(rt.next_random()))
}

fn is_integer(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(matches!(
        call.arg(0),
        Value::Number(value) if value.is_finite() && value.fract() == 0.0
    )))
}

fn is_safe_integer(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(matches!(
        call.arg(0),
        Value::Number(value)
            if value.fract() == 0.0 && value.abs() <= 9_007_199_254_740_991.0
    )))
}

fn number_is_finite(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(matches!(call.arg(0), Value::Number(value) if value.is_finite())))
}

fn number_is_nan(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(matches!(call.arg(0), Value::Number(value) if value.is_nan())))
}

fn this_number(rt: &Runtime, call: &NativeCall, api: &str) -> Result<f64> {
    match call.this {
        Value::Number(value) => Ok(value),
        _ => Err(rt.type_error(format!("{api} requires that 'this' be a Number"))),
    }
}

fn number_value_of(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Number(this_number(rt, call, "Number.prototype.valueOf")?))
}

fn number_to_string(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let value = this_number(rt, call, "Number.prototype.toString")?;
    let radix = match call.arg(0) {
        Value::Undefined => 10,
        other => {
            let radix = to_integer(other.as_number());
            if !(2.0..=36.0).contains(&radix) {
                return Err(rt.range_error("toString() radix must be between 2 and 36"));
            }
            radix as u32
        }
    };
    if radix == 10 || !value.is_finite() {
        return Ok(Value::string(format_number(value)));
    }
    Ok(Value::string(format_radix(value, radix)))
}

/// Integer digits exactly, then up to 52 fractional digits.
fn format_radix(value: f64, radix: u32) -> String {
    let negative = value < 0.0;
    let magnitude = value.abs();
    let mut integer = magnitude.trunc();
    let mut fraction = magnitude - integer;
    let base = f64::from(radix);

    let mut digits = Vec::new();
    loop {
        let digit = (integer % base) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        integer = (integer / base).trunc();
        if integer < 1.0 {
            break;
        }
    }
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.extend(digits.iter().rev());
    if fraction > 0.0 {
        out.push('.');
        for _ in 0..52 {
            fraction *= base;
            let digit = fraction.trunc();
            out.push(std::char::from_digit(digit as u32, radix).unwrap_or('0'));
            fraction -= digit;
            if fraction <= 0.0 {
                break;
            }
        }
    }
    out
}

fn number_to_fixed(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let value = this_number(rt, call, "Number.prototype.toFixed")?;
    let digits = to_integer(call.arg(0).as_number());
    if !(0.0..=100.0).contains(&digits) {
        return Err(rt.range_error("toFixed() digits argument must be between 0 and 100"));
    }
    if !value.is_finite() || value.abs() >= 1e21 {
        return Ok(Value::string(format_number(value)));
    }
    let value = if value == 0.0 { 0.0 } else { value };
    Ok(Value::string(format!("{:.*}", digits as usize, value)))
}

fn boolean_to_string(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    match call.this {
        Value::Bool(flag) => Ok(Value::string(if flag { "true" } else { "false" })),
        _ => Err(rt.type_error("Boolean.prototype.toString requires that 'this' be a Boolean")),
    }
}

fn boolean_value_of(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    match call.this {
        Value::Bool(flag) => Ok(Value::Bool(flag)),
        _ => Err(rt.type_error("Boolean.prototype.valueOf requires that 'this' be a Boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Value> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(&format!("var out = {src};"))?;
        rt.get_member(&rt.global_value(), "out", None)
    }

    #[test]
    fn rounding_follows_javascript_rules() {
        assert_eq!(js_round(2.5), 3.0);
        assert_eq!(js_round(-2.5), -2.0);
        assert_eq!(js_round(-0.4), 0.0);
        assert!(js_round(-0.4).is_sign_negative());
        assert_eq!(js_round(7.0), 7.0);
    }

    #[test]
    fn math_functions_and_constants() -> Result<()> {
        assert_eq!(run("Math.max(1, 5, 3)")?, Value::Number(5.0));
        assert_eq!(run("Math.min()")?, Value::Number(f64::INFINITY));
        assert!(run("Math.max(1, 'x')")?.as_number().is_nan());
        assert_eq!(run("Math.floor(Math.PI * 100)")?, Value::Number(314.0));
        assert_eq!(run("Math.pow(2, 10)")?, Value::Number(1024.0));
        assert_eq!(run("Math.imul(0xffffffff, 5)")?, Value::Number(-5.0));
        assert_eq!(run("Math.clz32(1)")?, Value::Number(31.0));
        Ok(())
    }

    #[test]
    fn random_is_deterministic_per_seed() -> Result<()> {
        let first = run("[Math.random(), Math.random()].join()")?.as_string();
        let second = run("[Math.random(), Math.random()].join()")?.as_string();
        assert_eq!(first, second);
        let value = run("Math.random()")?.as_number();
        assert!((0.0..1.0).contains(&value));
        Ok(())
    }

    #[test]
    fn number_formatting() -> Result<()> {
        assert_eq!(run("(255).toString(16)")?.as_string(), "ff");
        assert_eq!(run("(-10).toString(2)")?.as_string(), "-1010");
        assert_eq!(run("(0.5).toString(2)")?.as_string(), "0.1");
        assert_eq!(run("(1.005).toFixed(1)")?.as_string(), "1.0");
        assert_eq!(run("(3).toFixed(2)")?.as_string(), "3.00");
        assert_eq!(run("(-0.0001).toFixed(2)")?.as_string(), "-0.00");
        assert!(matches!(run("(1).toString(1)"), Err(Error::ScriptThrown(_))));
        Ok(())
    }

    #[test]
    fn number_statics() -> Result<()> {
        assert_eq!(run("Number.isInteger(5)")?, Value::Bool(true));
        assert_eq!(run("Number.isInteger('5')")?, Value::Bool(false));
        assert_eq!(run("Number.isNaN('abc')")?, Value::Bool(false));
        assert_eq!(run("Number.MAX_SAFE_INTEGER")?, Value::Number(9_007_199_254_740_991.0));
        assert_eq!(run("Number.parseInt('12px')")?, Value::Number(12.0));
        Ok(())
    }
}
