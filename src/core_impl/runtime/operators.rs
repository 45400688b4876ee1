use super::expression_eval::{property_key, to_int32, to_uint32};
use super::*;

impl Runtime {
    pub(crate) fn binary_op(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
        let value = match op {
            BinaryOp::Add => return self.add_values(left, right),
            BinaryOp::Sub => Value::Number(left.as_number() - right.as_number()),
            BinaryOp::Mul => Value::Number(left.as_number() * right.as_number()),
            BinaryOp::Div => Value::Number(left.as_number() / right.as_number()),
            BinaryOp::Mod => Value::Number(js_remainder(left.as_number(), right.as_number())),
            BinaryOp::Pow => Value::Number(js_pow(left.as_number(), right.as_number())),
            BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
            BinaryOp::Ne => Value::Bool(!loose_equals(left, right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNe => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Lt => Value::Bool(compare(left, right).is_some_and(|ord| ord.is_lt())),
            BinaryOp::Gt => Value::Bool(compare(left, right).is_some_and(|ord| ord.is_gt())),
            BinaryOp::Le => Value::Bool(compare(left, right).is_some_and(|ord| ord.is_le())),
            BinaryOp::Ge => Value::Bool(compare(left, right).is_some_and(|ord| ord.is_ge())),
            BinaryOp::BitAnd => int32_op(left, right, |a, b| a & b),
            BinaryOp::BitOr => int32_op(left, right, |a, b| a | b),
            BinaryOp::BitXor => int32_op(left, right, |a, b| a ^ b),
            BinaryOp::Shl => {
                let shift = to_uint32(right.as_number()) & 31;
                Value::Number(f64::from(to_int32(left.as_number()).wrapping_shl(shift)))
            }
            BinaryOp::Shr => {
                let shift = to_uint32(right.as_number()) & 31;
                Value::Number(f64::from(to_int32(left.as_number()) >> shift))
            }
            BinaryOp::UShr => {
                let shift = to_uint32(right.as_number()) & 31;
                Value::Number(f64::from(to_uint32(left.as_number()) >> shift))
            }
            BinaryOp::In => {
                let key = property_key(left);
                match self.has_member(right, &key) {
                    Some(found) => Value::Bool(found),
                    None => {
                        return Err(self.type_error(format!(
                            "Cannot use 'in' operator to search for '{key}' in {}",
                            render_value(right)
                        )));
                    }
                }
            }
            BinaryOp::InstanceOf => Value::Bool(self.instance_of(left, right)?),
        };
        Ok(value)
    }

    /// `+`: concatenation when either side is a string or an object,
    /// numeric addition otherwise. Concatenation unions operand taint.
    fn add_values(&mut self, left: &Value, right: &Value) -> Result<Value> {
        if is_numeric_operand(left) && is_numeric_operand(right) {
            return Ok(Value::Number(left.as_number() + right.as_number()));
        }
        let left = self.to_js_string(left)?;
        let right = self.to_js_string(right)?;
        self.check_string_length(left.as_str().len().saturating_add(right.as_str().len()))?;
        Ok(Value::String(left.concat(&right)))
    }

    fn instance_of(&self, value: &Value, constructor: &Value) -> Result<bool> {
        let Value::Function(function) = constructor else {
            if matches!(constructor, Value::Stub(_)) {
                return Ok(false);
            }
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        };
        let Some(Value::Object(target)) = function.props.borrow().get_own("prototype").cloned()
        else {
            return Ok(false);
        };
        let start = match value {
            Value::Object(object) => object.borrow().proto.clone(),
            Value::Array(_) => Some(self.realm.array_proto.clone()),
            Value::Function(function) => function.props.borrow().proto.clone(),
            Value::RegExp(_) => Some(self.realm.regexp_proto.clone()),
            Value::Promise(_) => Some(self.realm.promise_proto.clone()),
            _ => None,
        };
        let mut current = start;
        let mut depth = 0usize;
        while let Some(proto) = current {
            if Rc::ptr_eq(&proto, &target) {
                return Ok(true);
            }
            depth += 1;
            if depth > 256 {
                break;
            }
            current = proto.borrow().proto.clone();
        }
        Ok(false)
    }
}

fn is_numeric_operand(value: &Value) -> bool {
    matches!(
        value,
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
    )
}

fn int32_op(left: &Value, right: &Value, op: impl Fn(i32, i32) -> i32) -> Value {
    Value::Number(f64::from(op(
        to_int32(left.as_number()),
        to_int32(right.as_number()),
    )))
}

fn js_remainder(left: f64, right: f64) -> f64 {
    if right == 0.0 || left.is_infinite() || left.is_nan() || right.is_nan() {
        return f64::NAN;
    }
    if right.is_infinite() {
        return left;
    }
    left % right
}

pub(crate) fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() {
        return f64::NAN;
    }
    if base.abs() == 1.0 && exponent.is_infinite() {
        return f64::NAN;
    }
    base.powf(exponent)
}

pub(crate) fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => left.as_number() == right.as_number(),
        (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_)) => {
            loose_equals(&Value::String(left.as_js_string()), right)
        }
        (Value::String(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
            loose_equals(left, &Value::String(right.as_js_string()))
        }
        _ => left.strict_equals(right),
    }
}

/// Abstract relational comparison; `None` when either side is NaN.
pub(crate) fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Some(a.as_str().cmp(b.as_str()));
    }
    let (a, b) = match (left, right) {
        (Value::Array(_), _) | (_, Value::Array(_)) => {
            let a = left.as_js_string();
            let b = right.as_js_string();
            if matches!(left, Value::String(_) | Value::Array(_))
                && matches!(right, Value::String(_) | Value::Array(_))
            {
                return Some(a.as_str().cmp(b.as_str()));
            }
            (string_to_number(a.as_str()), string_to_number(b.as_str()))
        }
        _ => (left.as_number(), right.as_number()),
    };
    a.partial_cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_equality_coerces_like_javascript() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
        assert!(loose_equals(&Value::string("1"), &Value::Number(1.0)));
        assert!(loose_equals(&Value::Bool(true), &Value::string("1")));
        assert!(loose_equals(
            &Value::array(vec![Value::Number(2.0)]),
            &Value::string("2")
        ));
        assert!(!loose_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn relational_comparison_of_strings_is_lexical() {
        assert_eq!(
            compare(&Value::string("b"), &Value::string("abc")),
            Some(std::cmp::Ordering::Greater)
        );
        assert_eq!(
            compare(&Value::string("10"), &Value::Number(9.0)),
            Some(std::cmp::Ordering::Greater)
        );
        assert_eq!(compare(&Value::Undefined, &Value::Number(1.0)), None);
    }

    #[test]
    fn remainder_and_power_edge_cases() {
        assert!(js_remainder(1.0, 0.0).is_nan());
        assert_eq!(js_remainder(-7.0, 3.0), -1.0);
        assert_eq!(js_remainder(5.0, f64::INFINITY), 5.0);
        assert!(js_pow(1.0, f64::INFINITY).is_nan());
        assert_eq!(js_pow(2.0, 10.0), 1024.0);
        assert_eq!(js_pow(f64::NAN, 0.0), 1.0);
    }
}
