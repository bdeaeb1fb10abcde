use crate::value::Value;

use super::{Object, ObjectKind};

#[repr(C)]
pub struct ObjectList {
    pub object: Object,
    pub items: Vec<Value>,
}

impl ObjectList {
    pub fn new() -> Box<ObjectList> {
        Box::new(ObjectList {
            object: Object::new(ObjectKind::List),
            items: Vec::new(),
        })
    }

    pub fn get(&self, index: f64) -> Result<Value, String> {
        let idx = Self::checked_index(index, self.items.len())?;
        Ok(self.items[idx])
    }

    pub fn set(&mut self, index: f64, value: Value) -> Result<(), String> {
        let idx = Self::checked_index(index, self.items.len())?;
        self.items[idx] = value;
        Ok(())
    }

    pub fn append(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn delete(&mut self, index: f64) -> Result<Value, String> {
        let idx = Self::checked_index(index, self.items.len())?;
        Ok(self.items.remove(idx))
    }

    fn checked_index(index: f64, len: usize) -> Result<usize, String> {
        let truncated = index.trunc();
        if truncated < 0.0 || truncated as usize >= len {
            return Err(format!("List index {} out of range.", truncated as i64));
        }
        Ok(truncated as usize)
    }
}
