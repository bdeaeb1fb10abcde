use super::{Object, ObjectKind};

/// FNV-1a, matching the spec's required 32-bit string hash.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[repr(C)]
pub struct ObjectString {
    pub object: Object,
    pub content: String,
    pub hash: u32,
}

impl ObjectString {
    pub fn new(content: &str) -> Box<ObjectString> {
        let hash = fnv1a_hash(content.as_bytes());
        Box::new(ObjectString {
            object: Object::new(ObjectKind::String),
            content: content.to_string(),
            hash,
        })
    }
}

impl PartialEq for ObjectString {
    fn eq(&self, other: &ObjectString) -> bool {
        self.content == other.content
    }
}
impl Eq for ObjectString {}
