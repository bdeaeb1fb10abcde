use crate::value::Value;

use super::{Object, ObjectKind};

/// Fixed host-function signature natives are registered under. Errors flow
/// back through `Err`, which the VM's `CALL` handling turns into a normal
/// runtime error, rather than the native calling back into the VM's error
/// path directly.
pub trait NativeObject {
    fn run(&self, args: &[Value]) -> Result<Value, String>;
}

#[repr(C)]
pub struct ObjectNativeFunction {
    pub object: Object,
    pub name: String,
    pub arity: u8,
    pub native: Box<dyn NativeObject>,
}

impl ObjectNativeFunction {
    pub fn new(name: String, arity: u8, native: impl NativeObject + 'static) -> Box<ObjectNativeFunction> {
        Box::new(ObjectNativeFunction {
            object: Object::new(ObjectKind::NativeFunction),
            name,
            arity,
            native: Box::new(native),
        })
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        if args.len() != self.arity as usize {
            return Err(format!(
                "Expected {} arguments but got {}.",
                self.arity,
                args.len()
            ));
        }
        self.native.run(args)
    }
}
