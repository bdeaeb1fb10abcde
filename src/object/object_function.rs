use crate::chunk::Chunk;

use super::{Object, ObjectKind};

#[repr(C)]
pub struct ObjectFunction {
    pub object: Object,
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Box<Chunk>,
    /// Empty for the implicit top-level script function.
    pub name: String,
}

impl ObjectFunction {
    pub fn new(arity: u8, name: String) -> Box<ObjectFunction> {
        Box::new(ObjectFunction {
            object: Object::new(ObjectKind::Function),
            arity,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        })
    }
}
