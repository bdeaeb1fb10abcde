use crate::table::Table;

use super::{Object, ObjectClass, ObjectKind};

#[repr(C)]
pub struct ObjectInstance {
    pub object: Object,
    pub class: *mut ObjectClass,
    pub fields: Table,
}

impl ObjectInstance {
    pub fn new(class: *mut ObjectClass) -> Box<ObjectInstance> {
        Box::new(ObjectInstance {
            object: Object::new(ObjectKind::Instance),
            class,
            fields: Table::new(),
        })
    }
}
