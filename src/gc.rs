use crate::{
    call_frame::CallFrame,
    object::{
        manager::ObjectManager,
        object_upvalue::{ObjectUpvalue, UpvalueState},
        Object, ObjectKind,
    },
    table::Table,
    value::{as_object, is_object, Value},
};

/// Tri-color mark-sweep collector. Marking is driven by an explicit gray
/// worklist rather than a separate gray/black set: `is_marked` on the object
/// header distinguishes white (unmarked) from black (marked and blackened),
/// and the worklist itself is the gray frontier.
pub struct GarbageCollector {
    gray_stack: Vec<*mut Object>,
    stats: GCStats,
}

/// Aggregated GC statistics. Running totals only; the VM tracks the current
/// live byte count itself since that also drives the next collection
/// threshold.
#[derive(Default, Debug, Clone)]
pub struct GCStats {
    pub cycles: u64,
    pub total_freed_bytes: usize,
    pub last_freed_bytes: usize,
    pub last_before_bytes: usize,
    pub last_after_bytes: usize,
    pub last_next_trigger_bytes: usize,
}

impl GCStats {
    fn record(&mut self, before: usize, freed: usize, after: usize, next_trigger: usize) {
        self.cycles += 1;
        self.total_freed_bytes += freed;
        self.last_freed_bytes = freed;
        self.last_before_bytes = before;
        self.last_after_bytes = after;
        self.last_next_trigger_bytes = next_trigger;
    }
}

#[cfg(feature = "gc_debug")]
macro_rules! gc_trace { ($($arg:tt)*) => { eprintln!("[gc-trace] {}", format_args!($($arg)*)); } }
#[cfg(not(feature = "gc_debug"))]
macro_rules! gc_trace { ($($arg:tt)*) => {}; }
pub(crate) use gc_trace;

impl GarbageCollector {
    pub fn new() -> Self {
        GarbageCollector {
            gray_stack: Vec::new(),
            stats: GCStats::default(),
        }
    }

    /// Mark an object reachable, pushing it onto the gray worklist the first
    /// time it's seen. Idempotent: re-marking an already-black object is a
    /// no-op, which is what keeps cycles (e.g. an instance holding itself)
    /// from looping forever.
    pub fn mark_object(&mut self, ptr: *mut Object) {
        if ptr.is_null() {
            return;
        }
        unsafe {
            if (*ptr).is_marked {
                return;
            }
            (*ptr).is_marked = true;
        }
        gc_trace!("mark ptr={:p}", ptr);
        self.gray_stack.push(ptr);
    }

    pub fn mark_value(&mut self, value: &Value) {
        if is_object(value) {
            self.mark_object(as_object(value));
        }
    }

    fn mark_table_keys_and_values(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key.cast());
            self.mark_value(&value);
        }
    }

    /// Root set: the value stack, globals (keys and values, since global
    /// names are themselves heap strings), every active frame's closure, and
    /// every still-open upvalue. The interned-string table is deliberately
    /// left unmarked here — it's a weak set, swept by `remove_white_strings`.
    pub fn mark_roots(
        &mut self,
        stack: &[Value],
        stack_top: usize,
        globals: &Table,
        frames: &[CallFrame],
        open_upvalues: &[*mut ObjectUpvalue],
    ) {
        for value in &stack[0..stack_top] {
            self.mark_value(value);
        }
        self.mark_table_keys_and_values(globals);
        for frame in frames {
            self.mark_object(frame.closure().cast());
        }
        for &upvalue in open_upvalues {
            self.mark_object(upvalue.cast());
        }
    }

    /// Drain the gray worklist, blackening each object by marking everything
    /// it references (which may push new entries back onto the worklist).
    pub fn trace_references(&mut self) {
        while let Some(ptr) = self.gray_stack.pop() {
            gc_trace!("blacken ptr={:p}", ptr);
            unsafe {
                self.blacken_object(ptr);
            }
        }
    }

    unsafe fn blacken_object(&mut self, ptr: *mut Object) {
        match (*ptr).kind {
            ObjectKind::String | ObjectKind::NativeFunction => {}
            ObjectKind::Function => {
                let function = crate::object::as_function(ptr);
                for constant in (*function).chunk.iter_constants() {
                    self.mark_value(constant);
                }
            }
            ObjectKind::Closure => {
                let closure = crate::object::as_closure(ptr);
                self.mark_object((*closure).function.cast());
                for &upvalue in &(*closure).upvalues {
                    self.mark_object(upvalue.cast());
                }
            }
            ObjectKind::Upvalue => {
                let upvalue = crate::object::as_upvalue(ptr);
                if let UpvalueState::Closed(value) = (*upvalue).state {
                    self.mark_value(&value);
                }
            }
            ObjectKind::Class => {
                let class = crate::object::as_class(ptr);
                self.mark_object((*class).name.cast());
                self.mark_table_keys_and_values(&(*class).methods);
            }
            ObjectKind::Instance => {
                let instance = crate::object::as_instance(ptr);
                self.mark_object((*instance).class.cast());
                self.mark_table_keys_and_values(&(*instance).fields);
            }
            ObjectKind::BoundMethod => {
                let bound = crate::object::as_bound_method(ptr);
                self.mark_value(&(*bound).receiver);
                self.mark_object((*bound).method.cast());
            }
            ObjectKind::List => {
                let list = crate::object::as_list(ptr);
                for value in &(*list).items {
                    self.mark_value(value);
                }
            }
        }
    }

    /// Remove any interned string no longer reachable from anything else,
    /// so the table doesn't keep it alive past its last real reference. Must
    /// run after `trace_references` but before `sweep`, while unreachable
    /// strings are still unmarked but not yet freed.
    pub fn remove_white_strings(&self, intern_strings: &mut Table) {
        let dead: Vec<_> = intern_strings
            .iter()
            .filter(|(key, _)| unsafe { !(**key).object.is_marked })
            .map(|(key, _)| key)
            .collect();
        for key in dead {
            intern_strings.delete(key);
        }
    }

    /// Free every still-white object, unmarking survivors so they start the
    /// next cycle white again. Returns the bytes freed.
    pub fn sweep(&mut self, object_manager: &mut ObjectManager) -> usize {
        let freed = object_manager.sweep_unmarked();
        gc_trace!("sweep freed_bytes={}", freed);
        freed
    }

    pub fn record_cycle(&mut self, before: usize, freed: usize, after: usize, next_trigger: usize) {
        self.stats.record(before, freed, after, next_trigger);
        gc_trace!(
            "cycle summary cycles={} freed={} before={} after={} next_trigger={}",
            self.stats.cycles,
            freed,
            before,
            after,
            next_trigger
        );
    }

    pub fn stats(&self) -> &GCStats {
        &self.stats
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::make_object_value;

    fn value_from_object(ptr: *mut Object) -> Value {
        make_object_value(ptr)
    }

    #[test]
    fn gc_collects_unreachable_objects() {
        let mut manager = ObjectManager::new();
        let (keep, _) = manager.alloc_string("keep");
        manager.alloc_string("drop1");
        manager.alloc_string("drop2");
        manager.alloc_string("drop3");

        let mut gc = GarbageCollector::new();
        let mut stack = [Value::new(); 8];
        stack[0] = value_from_object(keep.cast());
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues: Vec<*mut ObjectUpvalue> = vec![];

        gc.mark_roots(&stack, 1, &globals, &frames, &open_upvalues);
        gc.trace_references();
        let freed = gc.sweep(&mut manager);
        assert!(freed > 0, "expected some bytes to be freed");
        assert_eq!(manager.iter().count(), 1, "only the rooted string should remain");
    }

    #[test]
    fn gc_preserves_reachable_closure_and_function() {
        let mut manager = ObjectManager::new();
        let (func_root, _) = manager.alloc_function(0, "f1".to_string());
        let (closure_root, _) = manager.alloc_closure(func_root);
        manager.alloc_function(0, "f2".to_string());

        let mut gc = GarbageCollector::new();
        let mut stack = [Value::new(); 8];
        stack[0] = value_from_object(closure_root.cast());
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues: Vec<*mut ObjectUpvalue> = vec![];

        gc.mark_roots(&stack, 1, &globals, &frames, &open_upvalues);
        gc.trace_references();
        gc.sweep(&mut manager);
        assert_eq!(manager.iter().count(), 2, "closure and its function should survive");
    }

    #[test]
    fn gc_marks_via_open_upvalue() {
        let mut manager = ObjectManager::new();
        let (string_ptr, _) = manager.alloc_string("captured");
        let mut stack = [Value::new(); 8];
        stack[0] = value_from_object(string_ptr.cast());
        let (upvalue_ptr, _) = manager.alloc_upvalue(&mut stack[0] as *mut Value);

        let mut gc = GarbageCollector::new();
        let globals = Table::new();
        let frames: Vec<CallFrame> = vec![];
        let open_upvalues = vec![upvalue_ptr];

        gc.mark_roots(&stack, 1, &globals, &frames, &open_upvalues);
        gc.trace_references();
        gc.sweep(&mut manager);
        assert_eq!(manager.iter().count(), 2, "upvalue and the string it points at should survive");
    }

    #[test]
    fn remove_white_strings_drops_unreachable_interned_entries() {
        let mut manager = ObjectManager::new();
        let (live, _) = manager.alloc_string("live");
        let (dead, _) = manager.alloc_string("dead");
        let mut intern = Table::new();
        intern.set(live, Value::new());
        intern.set(dead, Value::new());

        let mut gc = GarbageCollector::new();
        let stack = [Value::new(); 8];
        let globals = Table::new();
        gc.mark_object(live.cast());
        gc.mark_roots(&stack, 0, &globals, &[], &[]);
        gc.trace_references();
        gc.remove_white_strings(&mut intern);

        assert!(intern.get(live).is_some());
        assert!(intern.get(dead).is_none());
        gc.sweep(&mut manager);
    }

    #[test]
    fn gc_stats_record_cycle() {
        let mut gc = GarbageCollector::new();
        assert_eq!(gc.stats().cycles, 0);
        gc.record_cycle(1000, 400, 600, 1200);
        assert_eq!(gc.stats().cycles, 1);
        assert_eq!(gc.stats().last_before_bytes, 1000);
        assert_eq!(gc.stats().last_freed_bytes, 400);
        assert_eq!(gc.stats().last_after_bytes, 600);
        assert_eq!(gc.stats().last_next_trigger_bytes, 1200);
        assert_eq!(gc.stats().total_freed_bytes, 400);
    }
}
