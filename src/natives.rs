//! Host functions exposed to scripts, each just a `NativeObject` impl
//! registered into the VM's globals table by `define_native` at startup.

use std::time::Instant;

use once_cell::sync::Lazy;

use crate::{
    object::{as_list, NativeObject},
    value::{as_number, as_object, is_list, is_number, make_nil_value, make_number_value, Value},
};

/// Process-relative baseline `clock()` measures against; a monotonic
/// `Instant` rather than wall-clock time, so elapsed seconds can't go
/// backwards under an epoch or NTP adjustment.
static START: Lazy<Instant> = Lazy::new(Instant::now);

/// `clock()` — elapsed host time in seconds since the VM started, for crude
/// benchmarking from script code.
pub struct ClockNative;

impl NativeObject for ClockNative {
    fn run(&self, _args: &[Value]) -> Result<Value, String> {
        Ok(make_number_value(START.elapsed().as_secs_f64()))
    }
}

/// `length(list)` — element count of a list value.
pub struct LengthNative;

impl NativeObject for LengthNative {
    fn run(&self, args: &[Value]) -> Result<Value, String> {
        let value = &args[0];
        if !is_list(value) {
            return Err("length() requires a list argument.".to_string());
        }
        let list = unsafe { &*as_list(as_object(value)) };
        Ok(make_number_value(list.items.len() as f64))
    }
}

/// `append(list, value)` — pushes onto the end of a list, returns `nil`.
pub struct AppendNative;

impl NativeObject for AppendNative {
    fn run(&self, args: &[Value]) -> Result<Value, String> {
        let list_value = &args[0];
        if !is_list(list_value) {
            return Err("append() requires a list as its first argument.".to_string());
        }
        let list = unsafe { &mut *as_list(as_object(list_value)) };
        list.append(args[1]);
        Ok(make_nil_value())
    }
}

/// `delete(list, index)` — removes and returns the element at `index`.
pub struct DeleteNative;

impl NativeObject for DeleteNative {
    fn run(&self, args: &[Value]) -> Result<Value, String> {
        let list_value = &args[0];
        if !is_list(list_value) {
            return Err("delete() requires a list as its first argument.".to_string());
        }
        if !is_number(&args[1]) {
            return Err("delete() requires a numeric index.".to_string());
        }
        let list = unsafe { &mut *as_list(as_object(list_value)) };
        list.delete(as_number(&args[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::manager::ObjectManager;
    use crate::value::make_object_value;

    #[test]
    fn length_reports_element_count() {
        let mut manager = ObjectManager::new();
        let (list_ptr, _) = manager.alloc_list();
        unsafe {
            (*list_ptr).append(make_number_value(1.0));
            (*list_ptr).append(make_number_value(2.0));
        }
        let result = LengthNative.run(&[make_object_value(list_ptr.cast())]).unwrap();
        assert_eq!(as_number(&result), 2.0);
    }

    #[test]
    fn append_adds_to_end_and_returns_nil() {
        let mut manager = ObjectManager::new();
        let (list_ptr, _) = manager.alloc_list();
        let list_value = make_object_value(list_ptr.cast());
        let result = AppendNative.run(&[list_value, make_number_value(5.0)]).unwrap();
        assert!(crate::value::is_nil(&result));
        assert_eq!(unsafe { (*list_ptr).items.len() }, 1);
    }

    #[test]
    fn delete_removes_and_returns_element() {
        let mut manager = ObjectManager::new();
        let (list_ptr, _) = manager.alloc_list();
        unsafe {
            (*list_ptr).append(make_number_value(10.0));
            (*list_ptr).append(make_number_value(20.0));
        }
        let list_value = make_object_value(list_ptr.cast());
        let removed = DeleteNative.run(&[list_value, make_number_value(0.0)]).unwrap();
        assert_eq!(as_number(&removed), 10.0);
        assert_eq!(unsafe { (*list_ptr).items.len() }, 1);
    }

    #[test]
    fn delete_out_of_range_errors() {
        let mut manager = ObjectManager::new();
        let (list_ptr, _) = manager.alloc_list();
        let list_value = make_object_value(list_ptr.cast());
        assert!(DeleteNative.run(&[list_value, make_number_value(0.0)]).is_err());
    }

    #[test]
    fn clock_returns_a_nonnegative_number() {
        let result = ClockNative.run(&[]).unwrap();
        assert!(as_number(&result) >= 0.0);
    }
}
