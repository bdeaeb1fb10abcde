//! Heap object model: a common header plus one struct per object kind, all
//! `#[repr(C)]` so a `*mut Object` can be reinterpreted as `*mut ObjectString`,
//! `*mut ObjectClosure`, and so on once the kind tag has been checked.

pub mod manager;
pub mod object_bound_method;
pub mod object_class;
pub mod object_closure;
pub mod object_function;
pub mod object_instance;
pub mod object_list;
pub mod object_native_function;
pub mod object_string;
pub mod object_upvalue;

pub use object_bound_method::ObjectBoundMethod;
pub use object_class::ObjectClass;
pub use object_closure::ObjectClosure;
pub use object_function::ObjectFunction;
pub use object_instance::ObjectInstance;
pub use object_list::ObjectList;
pub use object_native_function::{NativeObject, ObjectNativeFunction};
pub use object_string::ObjectString;
pub use object_upvalue::{ObjectUpvalue, UpvalueState};

use crate::value::{print_value, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    String,
    Function,
    Closure,
    Upvalue,
    NativeFunction,
    Class,
    Instance,
    BoundMethod,
    List,
}

/// Header shared by every heap object: kind tag for downcasting, the GC mark
/// bit, and the intrusive link into the VM's heap list.
#[repr(C)]
pub struct Object {
    pub kind: ObjectKind,
    pub is_marked: bool,
    pub next: *mut Object,
}

impl Object {
    pub fn new(kind: ObjectKind) -> Object {
        Object {
            kind,
            is_marked: false,
            next: std::ptr::null_mut(),
        }
    }

    /// Approximate heap footprint of the object pointed to, used to drive the
    /// GC's allocation threshold. Safety: `ptr` must point at a live object
    /// whose kind tag matches its actual layout.
    pub unsafe fn deep_size(ptr: *mut Object) -> usize {
        match (*ptr).kind {
            ObjectKind::String => {
                std::mem::size_of::<ObjectString>() + (&(*as_string(ptr)).content).len()
            }
            ObjectKind::Function => {
                std::mem::size_of::<ObjectFunction>() + (*as_function(ptr)).chunk.code.len()
            }
            ObjectKind::Closure => {
                std::mem::size_of::<ObjectClosure>()
                    + (*as_closure(ptr)).upvalues.len() * std::mem::size_of::<*mut ObjectUpvalue>()
            }
            ObjectKind::Upvalue => std::mem::size_of::<ObjectUpvalue>(),
            ObjectKind::NativeFunction => std::mem::size_of::<ObjectNativeFunction>(),
            ObjectKind::Class => std::mem::size_of::<ObjectClass>(),
            ObjectKind::Instance => std::mem::size_of::<ObjectInstance>(),
            ObjectKind::BoundMethod => std::mem::size_of::<ObjectBoundMethod>(),
            ObjectKind::List => {
                std::mem::size_of::<ObjectList>()
                    + (*as_list(ptr)).items.capacity() * std::mem::size_of::<Value>()
            }
        }
    }
}

// SAFETY: every downcast below requires the caller to have already checked
// `(*ptr).kind` (or to otherwise know the pointer's true kind); each target
// struct starts with an embedded `object: Object` field at offset zero, so
// reinterpreting the pointer is layout-valid.
pub unsafe fn as_string(ptr: *mut Object) -> *mut ObjectString {
    ptr as *mut ObjectString
}
pub unsafe fn as_function(ptr: *mut Object) -> *mut ObjectFunction {
    ptr as *mut ObjectFunction
}
pub unsafe fn as_closure(ptr: *mut Object) -> *mut ObjectClosure {
    ptr as *mut ObjectClosure
}
pub unsafe fn as_upvalue(ptr: *mut Object) -> *mut ObjectUpvalue {
    ptr as *mut ObjectUpvalue
}
pub unsafe fn as_native(ptr: *mut Object) -> *mut ObjectNativeFunction {
    ptr as *mut ObjectNativeFunction
}
pub unsafe fn as_class(ptr: *mut Object) -> *mut ObjectClass {
    ptr as *mut ObjectClass
}
pub unsafe fn as_instance(ptr: *mut Object) -> *mut ObjectInstance {
    ptr as *mut ObjectInstance
}
pub unsafe fn as_bound_method(ptr: *mut Object) -> *mut ObjectBoundMethod {
    ptr as *mut ObjectBoundMethod
}
pub unsafe fn as_list(ptr: *mut Object) -> *mut ObjectList {
    ptr as *mut ObjectList
}

/// Render an object the way `PRINT`/`PRINTLN` would, kind-prefixed for
/// anything that isn't raw string bytes.
pub unsafe fn format_object(ptr: *mut Object) -> String {
    match (*ptr).kind {
        ObjectKind::String => (*as_string(ptr)).content.clone(),
        ObjectKind::Function => {
            let name = &(*as_function(ptr)).name;
            if name.is_empty() {
                "<script>".to_string()
            } else {
                format!("<fn {}>", name)
            }
        }
        ObjectKind::Closure => format_object((*as_closure(ptr)).function.cast()),
        ObjectKind::Upvalue => "<upvalue>".to_string(),
        ObjectKind::NativeFunction => "<native fn>".to_string(),
        ObjectKind::Class => (*as_class(ptr)).name_str().to_string(),
        ObjectKind::Instance => format!("<instance of {}>", (*(*as_instance(ptr)).class).name_str()),
        ObjectKind::BoundMethod => format_object((*as_bound_method(ptr)).method.cast()),
        ObjectKind::List => {
            let list = &*as_list(ptr);
            let parts: Vec<String> = list.items.iter().map(|v| print_value_to_string(v)).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

fn print_value_to_string(value: &Value) -> String {
    let mut buf = String::new();
    print_value(value, &mut buf);
    buf
}
