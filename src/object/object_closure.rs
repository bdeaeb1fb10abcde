use super::{Object, ObjectFunction, ObjectKind, ObjectUpvalue};

#[repr(C)]
pub struct ObjectClosure {
    pub object: Object,
    pub function: *mut ObjectFunction,
    pub upvalues: Vec<*mut ObjectUpvalue>,
}

impl ObjectClosure {
    pub fn new(function: *mut ObjectFunction) -> Box<ObjectClosure> {
        let upvalue_count = unsafe { (*function).upvalue_count };
        Box::new(ObjectClosure {
            object: Object::new(ObjectKind::Closure),
            function,
            upvalues: Vec::with_capacity(upvalue_count),
        })
    }
}
