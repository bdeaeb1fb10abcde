use crate::object::ObjectString;
use crate::value::{is_nil, make_bool_value, make_nil_value, Value};

const MAX_LOAD_FACTOR: f64 = 0.75;

#[derive(Clone, Copy)]
struct Entry {
    /// Null means this slot is either empty or a tombstone; the two are
    /// told apart by `value`: a tombstone carries `bool(true)`, a genuinely
    /// empty slot carries `nil`.
    key: *mut ObjectString,
    value: Value,
}

impl Entry {
    fn empty() -> Entry {
        Entry {
            key: std::ptr::null_mut(),
            value: make_nil_value(),
        }
    }

    fn is_tombstone(&self) -> bool {
        self.key.is_null() && !is_nil(&self.value)
    }

    fn is_empty_slot(&self) -> bool {
        self.key.is_null() && is_nil(&self.value)
    }
}

/// Open-addressed, linear-probed hash map from interned `ObjectString`
/// pointers to `Value`, used for globals, class method tables, and instance
/// field tables. Capacity is always a power of two; tombstones count toward
/// the load factor so probe sequences stay bounded between resizes.
pub struct Table {
    entries: Vec<Entry>,
    count: usize,
}

impl Table {
    pub fn new() -> Table {
        Table {
            entries: Vec::new(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find_entry_index(entries: &[Entry], capacity: usize, key: *mut ObjectString) -> usize {
        let hash = unsafe { (*key).hash };
        let mut index = hash as usize & (capacity - 1);
        let mut first_tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            if entry.is_empty_slot() {
                return first_tombstone.unwrap_or(index);
            } else if entry.is_tombstone() {
                if first_tombstone.is_none() {
                    first_tombstone = Some(index);
                }
            } else if entry.key == key {
                return index;
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn grow(&mut self, new_capacity: usize) {
        let mut new_entries = vec![Entry::empty(); new_capacity];
        let mut new_count = 0;
        for entry in self.entries.iter() {
            if entry.key.is_null() {
                continue;
            }
            let index = Self::find_entry_index(&new_entries, new_capacity, entry.key);
            new_entries[index] = *entry;
            new_count += 1;
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    fn ensure_capacity(&mut self) {
        if self.capacity() == 0 {
            self.grow(8);
            return;
        }
        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD_FACTOR {
            self.grow(self.capacity() * 2);
        }
    }

    /// Returns `true` if this replaced an existing value for `key`, `false`
    /// if it created a new entry.
    pub fn set(&mut self, key: *mut ObjectString, value: Value) -> bool {
        self.ensure_capacity();
        let capacity = self.capacity();
        let index = Self::find_entry_index(&self.entries, capacity, key);
        let is_new_key = self.entries[index].key.is_null();
        if is_new_key && self.entries[index].is_empty_slot() {
            self.count += 1;
        }
        self.entries[index] = Entry { key, value };
        !is_new_key
    }

    pub fn get(&self, key: *mut ObjectString) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let index = Self::find_entry_index(&self.entries, self.capacity(), key);
        let entry = &self.entries[index];
        if entry.key.is_null() {
            None
        } else {
            Some(entry.value)
        }
    }

    pub fn delete(&mut self, key: *mut ObjectString) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry_index(&self.entries, self.capacity(), key);
        if self.entries[index].key.is_null() {
            return false;
        }
        // Tombstone: key=null, value=bool(true), distinct from an empty slot
        // (key=null, value=nil) so probe sequences through here keep going.
        self.entries[index] = Entry {
            key: std::ptr::null_mut(),
            value: make_bool_value(true),
        };
        true
    }

    /// Copies every live entry from `self` into `dst`, used to seed a
    /// subclass's method table from its superclass.
    pub fn add_all(&self, dst: &mut Table) {
        for entry in &self.entries {
            if !entry.key.is_null() {
                dst.set(entry.key, entry.value);
            }
        }
    }

    /// Looks up an interned string by raw content + hash, used by the
    /// interning table before an `ObjectString` for `content` necessarily
    /// exists yet.
    pub fn find_string(&self, content: &str, hash: u32) -> Option<*mut ObjectString> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = hash as usize & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            if entry.is_empty_slot() {
                return None;
            }
            if !entry.key.is_null() {
                let candidate = unsafe { &*entry.key };
                if candidate.hash == hash && candidate.content == content {
                    return Some(entry.key);
                }
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (*mut ObjectString, Value)> + '_ {
        self.entries
            .iter()
            .filter(|e| !e.key.is_null())
            .map(|e| (e.key, e.value))
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{as_number, make_number_value};

    fn leaked(content: &str) -> *mut ObjectString {
        Box::into_raw(ObjectString::new(content))
    }

    #[test]
    fn set_get_roundtrip() {
        let mut table = Table::new();
        let key = leaked("x");
        assert!(!table.set(key, make_number_value(1.0)));
        assert_eq!(as_number(&table.get(key).unwrap()), 1.0);
        assert!(table.set(key, make_number_value(2.0)));
        assert_eq!(as_number(&table.get(key).unwrap()), 2.0);
    }

    #[test]
    fn delete_then_probe_past_tombstone() {
        let mut table = Table::new();
        let a = leaked("a");
        let b = leaked("b");
        table.set(a, make_number_value(1.0));
        table.set(b, make_number_value(2.0));
        assert!(table.delete(a));
        assert!(table.get(a).is_none());
        assert_eq!(as_number(&table.get(b).unwrap()), 2.0);
    }

    #[test]
    fn grows_past_load_factor() {
        let mut table = Table::new();
        let keys: Vec<_> = (0..40).map(|i| leaked(&format!("k{i}"))).collect();
        for (i, &k) in keys.iter().enumerate() {
            table.set(k, make_number_value(i as f64));
        }
        assert_eq!(table.len(), 40);
        for (i, &k) in keys.iter().enumerate() {
            assert_eq!(as_number(&table.get(k).unwrap()), i as f64);
        }
    }

    #[test]
    fn find_string_by_content() {
        let mut table = Table::new();
        let key = leaked("hello");
        let hash = unsafe { (*key).hash };
        table.set(key, make_number_value(0.0));
        assert_eq!(table.find_string("hello", hash), Some(key));
        assert_eq!(table.find_string("nope", hash), None);
    }
}
