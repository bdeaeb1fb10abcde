use super::{
    NativeObject, Object, ObjectBoundMethod, ObjectClass, ObjectClosure, ObjectFunction,
    ObjectInstance, ObjectList, ObjectNativeFunction, ObjectString, ObjectUpvalue,
};
use crate::value::Value;

/// Owns the VM's heap: a single intrusive singly-linked list threaded through
/// each object's `next` field. Every `alloc_*` call links the new object onto
/// the head of the list and reports its size so the VM can drive the GC
/// threshold; nothing here ever frees memory except `GarbageCollector::sweep`
/// and `free_all` at VM teardown.
pub struct ObjectManager {
    head: *mut Object,
}

impl ObjectManager {
    pub fn new() -> Self {
        ObjectManager {
            head: std::ptr::null_mut(),
        }
    }

    pub fn head(&self) -> *mut Object {
        self.head
    }

    fn link(&mut self, ptr: *mut Object) -> usize {
        unsafe {
            (*ptr).next = self.head;
        }
        self.head = ptr;
        unsafe { Object::deep_size(ptr) }
    }

    pub fn alloc_string(&mut self, content: &str) -> (*mut ObjectString, usize) {
        let ptr = Box::into_raw(ObjectString::new(content));
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    pub fn alloc_function(&mut self, arity: u8, name: String) -> (*mut ObjectFunction, usize) {
        let ptr = Box::into_raw(ObjectFunction::new(arity, name));
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    /// Links an already-built function (the compiler assembles its chunk
    /// incrementally in a free-standing `Box` before this point) onto the
    /// heap list, same as every other `alloc_*` constructor.
    pub fn register_function(&mut self, function: Box<ObjectFunction>) -> (*mut ObjectFunction, usize) {
        let ptr = Box::into_raw(function);
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    pub fn alloc_closure(&mut self, function: *mut ObjectFunction) -> (*mut ObjectClosure, usize) {
        let ptr = Box::into_raw(ObjectClosure::new(function));
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    pub fn alloc_upvalue(&mut self, location: *mut Value) -> (*mut ObjectUpvalue, usize) {
        let ptr = Box::into_raw(ObjectUpvalue::new(location));
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    pub fn alloc_native<T: NativeObject + 'static>(
        &mut self,
        name: String,
        arity: u8,
        native: T,
    ) -> (*mut ObjectNativeFunction, usize) {
        let ptr = Box::into_raw(ObjectNativeFunction::new(name, arity, native));
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    pub fn alloc_class(&mut self, name: *mut ObjectString) -> (*mut ObjectClass, usize) {
        let ptr = Box::into_raw(ObjectClass::new(name));
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    pub fn alloc_instance(&mut self, class: *mut ObjectClass) -> (*mut ObjectInstance, usize) {
        let ptr = Box::into_raw(ObjectInstance::new(class));
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    pub fn alloc_bound_method(
        &mut self,
        receiver: Value,
        method: *mut ObjectClosure,
    ) -> (*mut ObjectBoundMethod, usize) {
        let ptr = Box::into_raw(ObjectBoundMethod::new(receiver, method));
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    pub fn alloc_list(&mut self) -> (*mut ObjectList, usize) {
        let ptr = Box::into_raw(ObjectList::new());
        let size = self.link(ptr.cast());
        (ptr, size)
    }

    /// Drop every object still on the list, freeing all heap memory. Used at
    /// VM teardown; individual unreachable objects are instead unlinked and
    /// freed one at a time by `GarbageCollector::sweep`.
    pub fn free_all(&mut self) {
        let mut current = self.head;
        while !current.is_null() {
            let next = unsafe { (*current).next };
            free_one(current);
            current = next;
        }
        self.head = std::ptr::null_mut();
    }

    pub fn set_head(&mut self, head: *mut Object) {
        self.head = head;
    }

    /// Walk the live heap list, in no particular order relative to
    /// allocation. Used by the GC's test suite and by `deep_size`-driven
    /// accounting; the VM's hot paths never need to enumerate the whole heap.
    pub fn iter(&self) -> ObjectIter {
        ObjectIter { current: self.head }
    }

    /// Free every object whose `is_marked` bit is clear, unlinking it from
    /// the intrusive list; survivors are unmarked so the next cycle starts
    /// them white again. Returns the total bytes freed.
    pub fn sweep_unmarked(&mut self) -> usize {
        let mut freed_bytes = 0usize;
        let mut prev: *mut Object = std::ptr::null_mut();
        let mut current = self.head;
        while !current.is_null() {
            unsafe {
                let next = (*current).next;
                if (*current).is_marked {
                    (*current).is_marked = false;
                    prev = current;
                } else {
                    if prev.is_null() {
                        self.head = next;
                    } else {
                        (*prev).next = next;
                    }
                    freed_bytes += Object::deep_size(current);
                    free_one(current);
                }
                current = next;
            }
        }
        freed_bytes
    }
}

pub struct ObjectIter {
    current: *mut Object,
}

impl Iterator for ObjectIter {
    type Item = *mut Object;

    fn next(&mut self) -> Option<*mut Object> {
        if self.current.is_null() {
            return None;
        }
        let ptr = self.current;
        self.current = unsafe { (*ptr).next };
        Some(ptr)
    }
}

/// Drop the boxed object behind `ptr` according to its kind tag.
pub fn free_one(ptr: *mut Object) {
    unsafe {
        match (*ptr).kind {
            super::ObjectKind::String => drop(Box::from_raw(super::as_string(ptr))),
            super::ObjectKind::Function => drop(Box::from_raw(super::as_function(ptr))),
            super::ObjectKind::Closure => drop(Box::from_raw(super::as_closure(ptr))),
            super::ObjectKind::Upvalue => drop(Box::from_raw(super::as_upvalue(ptr))),
            super::ObjectKind::NativeFunction => drop(Box::from_raw(super::as_native(ptr))),
            super::ObjectKind::Class => drop(Box::from_raw(super::as_class(ptr))),
            super::ObjectKind::Instance => drop(Box::from_raw(super::as_instance(ptr))),
            super::ObjectKind::BoundMethod => drop(Box::from_raw(super::as_bound_method(ptr))),
            super::ObjectKind::List => drop(Box::from_raw(super::as_list(ptr))),
        }
    }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        self.free_all();
    }
}
