use crate::object::{
    self, manager::ObjectManager, object_function::ObjectFunction,
    object_string::fnv1a_hash, Object, ObjectKind,
};
use crate::table::Table;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    ValueNil,
    ValueBool,
    ValueNumber,
    ValueObject,
}

#[derive(Clone, Copy)]
pub union ValueUnion {
    pub boolean: bool,
    pub number: f64,
    pub object: *mut Object,
}

#[derive(Clone, Copy)]
pub struct Value {
    pub value_type: ValueType,
    pub value_as: ValueUnion,
}

impl Value {
    pub fn new() -> Value {
        make_nil_value()
    }
}

impl Default for Value {
    fn default() -> Value {
        Value::new()
    }
}

pub fn make_nil_value() -> Value {
    Value {
        value_type: ValueType::ValueNil,
        value_as: ValueUnion { number: 0.0 },
    }
}

pub fn make_bool_value(b: bool) -> Value {
    Value {
        value_type: ValueType::ValueBool,
        value_as: ValueUnion { boolean: b },
    }
}

pub fn make_number_value(n: f64) -> Value {
    Value {
        value_type: ValueType::ValueNumber,
        value_as: ValueUnion { number: n },
    }
}

pub fn make_object_value(obj: *mut Object) -> Value {
    Value {
        value_type: ValueType::ValueObject,
        value_as: ValueUnion { object: obj },
    }
}

pub fn make_function_value(function: *mut ObjectFunction) -> Value {
    make_object_value(function.cast())
}

/// Interns `content`, allocating a fresh `ObjectString` only on first sight;
/// repeated calls with equal content return the same pointer so identity
/// comparison (`values_equal`'s object-kind case) doubles as string equality.
pub fn make_string_value(
    object_manager: &mut ObjectManager,
    intern_strings: &mut Table,
    content: &str,
) -> Value {
    let hash = fnv1a_hash(content.as_bytes());
    if let Some(existing) = intern_strings.find_string(content, hash) {
        return make_object_value(existing.cast());
    }
    let (ptr, _) = object_manager.alloc_string(content);
    intern_strings.set(ptr, make_bool_value(true));
    make_object_value(ptr.cast())
}

pub fn is_nil(v: &Value) -> bool {
    v.value_type == ValueType::ValueNil
}
pub fn is_bool(v: &Value) -> bool {
    v.value_type == ValueType::ValueBool
}
pub fn is_number(v: &Value) -> bool {
    v.value_type == ValueType::ValueNumber
}
pub fn is_object(v: &Value) -> bool {
    v.value_type == ValueType::ValueObject
}

pub fn as_bool(v: &Value) -> bool {
    unsafe { v.value_as.boolean }
}
pub fn as_number(v: &Value) -> f64 {
    unsafe { v.value_as.number }
}
pub fn as_object(v: &Value) -> *mut Object {
    unsafe { v.value_as.object }
}

fn object_kind(v: &Value) -> Option<ObjectKind> {
    if is_object(v) {
        Some(unsafe { (*as_object(v)).kind })
    } else {
        None
    }
}

/// Upvalue count of a function constant, read by the disassembler to know
/// how many `(is_local, index)` pairs trail an `OP_CLOSURE` instruction.
pub fn as_function_upvalue_count(v: &Value) -> usize {
    let function = unsafe { object::as_function(as_object(v)) };
    unsafe { (*function).upvalue_count }
}

pub fn is_string(v: &Value) -> bool {
    object_kind(v) == Some(ObjectKind::String)
}
pub fn is_function(v: &Value) -> bool {
    object_kind(v) == Some(ObjectKind::Function)
}
pub fn is_closure(v: &Value) -> bool {
    object_kind(v) == Some(ObjectKind::Closure)
}
pub fn is_native(v: &Value) -> bool {
    object_kind(v) == Some(ObjectKind::NativeFunction)
}
pub fn is_class(v: &Value) -> bool {
    object_kind(v) == Some(ObjectKind::Class)
}
pub fn is_instance(v: &Value) -> bool {
    object_kind(v) == Some(ObjectKind::Instance)
}
pub fn is_bound_method(v: &Value) -> bool {
    object_kind(v) == Some(ObjectKind::BoundMethod)
}
pub fn is_list(v: &Value) -> bool {
    object_kind(v) == Some(ObjectKind::List)
}

/// Truthiness: `nil` is false, booleans are themselves, everything else is
/// true.
pub fn is_falsey(v: &Value) -> bool {
    is_nil(v) || (is_bool(v) && !as_bool(v))
}

/// Deep equality: same variant and componentwise equal; strings (and every
/// other object kind) compare by pointer identity, which is sound for
/// strings specifically because they are interned.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a.value_type != b.value_type {
        return false;
    }
    match a.value_type {
        ValueType::ValueNil => true,
        ValueType::ValueBool => as_bool(a) == as_bool(b),
        ValueType::ValueNumber => as_number(a) == as_number(b),
        ValueType::ValueObject => as_object(a) == as_object(b),
    }
}

/// Shortest round-trip formatting for a double: integral values print
/// without a decimal point, everything else uses Rust's default `Display`,
/// which already produces the shortest string that round-trips.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e18 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub fn print_value(value: &Value, out: &mut String) {
    match value.value_type {
        ValueType::ValueNil => out.push_str("nil"),
        ValueType::ValueBool => out.push_str(if as_bool(value) { "true" } else { "false" }),
        ValueType::ValueNumber => {
            let _ = write!(out, "{}", format_number(as_number(value)));
        }
        ValueType::ValueObject => {
            let rendered = unsafe { object::format_object(as_object(value)) };
            out.push_str(&rendered);
        }
    }
}

pub fn value_to_string(value: &Value) -> String {
    let mut out = String::new();
    print_value(value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(is_falsey(&make_nil_value()));
        assert!(is_falsey(&make_bool_value(false)));
        assert!(!is_falsey(&make_bool_value(true)));
        assert!(!is_falsey(&make_number_value(0.0)));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-2.0), "-2");
    }

    #[test]
    fn equality_by_variant_then_component() {
        assert!(values_equal(&make_number_value(1.0), &make_number_value(1.0)));
        assert!(!values_equal(&make_number_value(1.0), &make_bool_value(true)));
        assert!(!values_equal(&make_nil_value(), &make_bool_value(false)));
    }
}
