use crate::value::Value;

use super::{Object, ObjectClosure, ObjectKind};

#[repr(C)]
pub struct ObjectBoundMethod {
    pub object: Object,
    pub receiver: Value,
    pub method: *mut ObjectClosure,
}

impl ObjectBoundMethod {
    pub fn new(receiver: Value, method: *mut ObjectClosure) -> Box<ObjectBoundMethod> {
        Box::new(ObjectBoundMethod {
            object: Object::new(ObjectKind::BoundMethod),
            receiver,
            method,
        })
    }
}
