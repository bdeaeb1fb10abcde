use crate::table::Table;

use super::{Object, ObjectKind, ObjectString};

#[repr(C)]
pub struct ObjectClass {
    pub object: Object,
    pub name: *mut ObjectString,
    pub methods: Table,
}

impl ObjectClass {
    pub fn new(name: *mut ObjectString) -> Box<ObjectClass> {
        Box::new(ObjectClass {
            object: Object::new(ObjectKind::Class),
            name,
            methods: Table::new(),
        })
    }

    pub fn name_str(&self) -> &str {
        unsafe { &(*self.name).content }
    }
}
