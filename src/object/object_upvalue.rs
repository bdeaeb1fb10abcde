use crate::value::Value;

use super::{Object, ObjectKind};

/// Open upvalues alias a live stack slot; closed upvalues own their value.
/// The transition from open to closed happens exactly once, when the frame
/// that owns the slot returns or the block that declared it ends.
pub enum UpvalueState {
    Open {
        location: *mut Value,
        /// Next link in the VM's open-upvalue list, sorted by descending
        /// `location` address.
        next: *mut ObjectUpvalue,
    },
    Closed(Value),
}

#[repr(C)]
pub struct ObjectUpvalue {
    pub object: Object,
    pub state: UpvalueState,
}

impl ObjectUpvalue {
    pub fn new(location: *mut Value) -> Box<ObjectUpvalue> {
        Box::new(ObjectUpvalue {
            object: Object::new(ObjectKind::Upvalue),
            state: UpvalueState::Open {
                location,
                next: std::ptr::null_mut(),
            },
        })
    }

    pub fn location(&self) -> *mut Value {
        match self.state {
            UpvalueState::Open { location, .. } => location,
            UpvalueState::Closed(_) => std::ptr::null_mut(),
        }
    }

    /// Read the current value regardless of open/closed state.
    pub unsafe fn get(&self) -> Value {
        match self.state {
            UpvalueState::Open { location, .. } => *location,
            UpvalueState::Closed(value) => value,
        }
    }

    /// Write through to the aliased slot (open) or the owned value (closed).
    pub unsafe fn set(&mut self, value: Value) {
        match &mut self.state {
            UpvalueState::Open { location, .. } => **location = value,
            UpvalueState::Closed(slot) => *slot = value,
        }
    }

    pub fn close(&mut self) {
        if let UpvalueState::Open { location, .. } = self.state {
            let value = unsafe { *location };
            self.state = UpvalueState::Closed(value);
        }
    }
}
