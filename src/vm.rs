//! The dispatch loop: decodes one opcode at a time out of the current
//! frame's chunk, drives the value/frame stacks, and owns every other
//! runtime structure (globals, intern table, heap, collector).

use std::ptr::NonNull;

use crate::{
    call_frame::CallFrame,
    chunk::OpCode,
    compiler::Parser,
    gc::GarbageCollector,
    natives::{AppendNative, ClockNative, DeleteNative, LengthNative},
    object::{self, manager::ObjectManager, object_closure::ObjectClosure, object_upvalue::ObjectUpvalue, NativeObject, ObjectClass, ObjectKind, ObjectString},
    table::Table,
    value::{
        as_number, as_object, is_falsey, is_list, is_number, is_object, is_string,
        make_bool_value, make_function_value, make_nil_value, make_number_value,
        make_object_value, make_string_value, value_to_string, values_equal, Value,
    },
};

pub const FRAMES_MAX: usize = 256;
pub const STACK_MAX: usize = FRAMES_MAX * 256;
const GC_HEAP_GROW_FACTOR: usize = 2;
const INITIAL_GC_THRESHOLD: usize = 1024 * 1024;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// An owned, already-formatted error: message plus the per-frame stack
/// trace, assembled once at the point of failure rather than threaded
/// through every call site as structured data.
struct RuntimeError(String);

pub struct VM {
    stack: Box<[Value]>,
    stack_top: usize,
    frames: Vec<CallFrame>,
    globals: Table,
    intern_strings: Table,
    object_manager: ObjectManager,
    gc: GarbageCollector,
    open_upvalues: Vec<*mut ObjectUpvalue>,
    bytes_allocated: usize,
    next_gc: usize,
}

impl VM {
    pub fn new() -> Box<VM> {
        let mut vm = Box::new(VM {
            stack: vec![Value::new(); STACK_MAX].into_boxed_slice(),
            stack_top: 0,
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            intern_strings: Table::new(),
            object_manager: ObjectManager::new(),
            gc: GarbageCollector::new(),
            open_upvalues: Vec::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_GC_THRESHOLD,
        });
        vm.init();
        vm
    }

    pub fn init(&mut self) {
        self.define_native("clock", 0, ClockNative);
        self.define_native("length", 1, LengthNative);
        self.define_native("append", 2, AppendNative);
        self.define_native("delete", 2, DeleteNative);
    }

    pub fn teardown(&mut self) {
        self.reset_stacks();
        self.globals = Table::new();
        self.intern_strings = Table::new();
        self.object_manager.free_all();
        self.bytes_allocated = 0;
        self.next_gc = INITIAL_GC_THRESHOLD;
    }

    pub fn define_native(&mut self, name: &str, arity: u8, native: impl NativeObject + 'static) {
        let name_value = make_string_value(&mut self.object_manager, &mut self.intern_strings, name);
        let name_ptr = unsafe { object::as_string(as_object(&name_value)) };
        let (native_ptr, size) = self.object_manager.alloc_native(name.to_string(), arity, native);
        self.bytes_allocated += size;
        self.globals.set(name_ptr, make_object_value(native_ptr.cast()));
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = {
            let mut parser = Parser::new(&mut self.object_manager, &mut self.intern_strings);
            parser.compile(source)
        };
        let Some(function) = function else {
            return InterpretResult::CompileError;
        };

        let (function_ptr, size) = self.object_manager.register_function(function);
        self.bytes_allocated += size;
        self.push(make_function_value(function_ptr));
        let (closure_ptr, size) = self.object_manager.alloc_closure(function_ptr);
        self.bytes_allocated += size;
        self.pop();
        self.push(make_object_value(closure_ptr.cast()));

        if self.call(closure_ptr, 0).is_err() {
            self.reset_stacks();
            return InterpretResult::RuntimeError;
        }

        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(error) => {
                eprint!("{}", error.0);
                self.reset_stacks();
                InterpretResult::RuntimeError
            }
        }
    }

    fn reset_stacks(&mut self) {
        self.stack_top = 0;
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn push(&mut self, value: Value) {
        self.stack[self.stack_top] = value;
        self.stack_top += 1;
    }

    fn pop(&mut self) -> Value {
        self.stack_top -= 1;
        self.stack[self.stack_top]
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack_top - 1 - distance]
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("run() never executes without an active frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("run() never executes without an active frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let ip = frame.ip();
        let byte = unsafe { (&(*frame.function()).chunk.code)[ip] };
        frame.advance_ip(1);
        byte
    }

    fn read_short(&mut self) -> u16 {
        let high = self.read_byte() as u16;
        let low = self.read_byte() as u16;
        (high << 8) | low
    }

    fn read_constant(&self, index: u8) -> Value {
        let frame = self.frame();
        unsafe { *(*frame.function()).chunk.get_constant(index as usize) }
    }

    fn read_string_constant(&mut self) -> *mut ObjectString {
        let index = self.read_byte();
        let value = self.read_constant(index);
        unsafe { object::as_string(as_object(&value)) }
    }

    fn runtime_error(&self, message: &str) -> RuntimeError {
        let mut output = format!("{}\n", message);
        for frame in self.frames.iter().rev() {
            let function = frame.function();
            let line = unsafe {
                (&(*function)
                    .chunk
                    .lines)
                    .get(frame.ip().saturating_sub(1))
                    .copied()
                    .unwrap_or(0)
            };
            let name = unsafe { &(*function).name };
            if name.is_empty() {
                output.push_str(&format!("[line {}] in script\n", line));
            } else {
                output.push_str(&format!("[line {}] in {}()\n", line, name));
            }
        }
        RuntimeError(output)
    }

    fn track_alloc(&mut self, size: usize) {
        self.bytes_allocated += size;
        if cfg!(feature = "gc_debug") || self.bytes_allocated > self.next_gc {
            self.collect_garbage();
        }
    }

    fn collect_garbage(&mut self) {
        let before = self.bytes_allocated;
        self.gc.mark_roots(
            &self.stack,
            self.stack_top,
            &self.globals,
            &self.frames,
            &self.open_upvalues,
        );
        self.gc.trace_references();
        self.gc.remove_white_strings(&mut self.intern_strings);
        let freed = self.gc.sweep(&mut self.object_manager);
        self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
        self.next_gc = self.bytes_allocated.max(1) * GC_HEAP_GROW_FACTOR;
        self.gc.record_cycle(before, freed, self.bytes_allocated, self.next_gc);
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            #[cfg(feature = "debug_trace_execution")]
            debug_feature::trace(self);

            let byte = self.read_byte();
            let Some(opcode) = OpCode::from_byte(byte) else {
                return Err(self.runtime_error("Unknown opcode."));
            };

            match opcode {
                OpCode::Constant => {
                    let index = self.read_byte();
                    let value = self.read_constant(index);
                    self.push(value);
                }
                OpCode::Nil => self.push(make_nil_value()),
                OpCode::True => self.push(make_bool_value(true)),
                OpCode::False => self.push(make_bool_value(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte();
                    let value = self.frame().slot(slot as usize);
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte();
                    let value = self.peek(0);
                    self.frame_mut().set_slot(slot as usize, value);
                }
                OpCode::GetGlobal => {
                    let name = self.read_string_constant();
                    match self.globals.get(name) {
                        Some(value) => self.push(value),
                        None => {
                            let content = unsafe { (*name).content.clone() };
                            return Err(self.runtime_error(&format!("Undefined symbol '{}'.", content)));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string_constant();
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                OpCode::SetGlobal => {
                    let name = self.read_string_constant();
                    let value = self.peek(0);
                    if !self.globals.set(name, value) {
                        self.globals.delete(name);
                        let content = unsafe { (*name).content.clone() };
                        return Err(self.runtime_error(&format!("Undefined variable '{}'.", content)));
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte();
                    let closure = self.frame().closure();
                    let upvalue = unsafe { (&(*closure).upvalues)[slot as usize] };
                    self.push(unsafe { (*upvalue).get() });
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte();
                    let closure = self.frame().closure();
                    let upvalue = unsafe { (&(*closure).upvalues)[slot as usize] };
                    let value = self.peek(0);
                    unsafe { (*upvalue).set(value) };
                }
                OpCode::GetProperty => {
                    let name = self.read_string_constant();
                    let receiver = self.peek(0);
                    if !Self::is_instance(&receiver) {
                        return Err(self.runtime_error("Only instances have properties."));
                    }
                    let instance = unsafe { object::as_instance(as_object(&receiver)) };
                    if let Some(value) = unsafe { (*instance).fields.get(name) } {
                        self.pop();
                        self.push(value);
                    } else {
                        let class = unsafe { (*instance).class };
                        self.bind_method(class, name)?;
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string_constant();
                    let receiver = self.peek(1);
                    if !Self::is_instance(&receiver) {
                        return Err(self.runtime_error("Only instances have fields."));
                    }
                    let instance = unsafe { object::as_instance(as_object(&receiver)) };
                    let value = self.peek(0);
                    unsafe { (*instance).fields.set(name, value) };
                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_string_constant();
                    let superclass_value = self.pop();
                    let superclass = unsafe { object::as_class(as_object(&superclass_value)) };
                    self.bind_method(superclass, name)?;
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(make_bool_value(values_equal(&a, &b)));
                }
                OpCode::Greater => self.binary_number_op(|a, b| make_bool_value(a > b))?,
                OpCode::Less => self.binary_number_op(|a, b| make_bool_value(a < b))?,
                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_number_op(|a, b| make_number_value(a - b))?,
                OpCode::Multiply => self.binary_number_op(|a, b| make_number_value(a * b))?,
                OpCode::Divide => self.binary_number_op(|a, b| make_number_value(a / b))?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(make_bool_value(is_falsey(&value)));
                }
                OpCode::Negate => {
                    if !is_number(&self.peek(0)) {
                        return Err(self.runtime_error("Operand must be a number."));
                    }
                    let value = as_number(&self.pop());
                    self.push(make_number_value(-value));
                }
                OpCode::Print => {
                    let value = self.pop();
                    print!("{}", value_to_string(&value));
                }
                OpCode::PrintLn => {
                    let value = self.pop();
                    println!("{}", value_to_string(&value));
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    self.frame_mut().advance_ip(offset as usize);
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if is_falsey(&self.peek(0)) {
                        self.frame_mut().advance_ip(offset as usize);
                    }
                }
                OpCode::JumpIfTrue => {
                    let offset = self.read_short();
                    if !is_falsey(&self.peek(0)) {
                        self.frame_mut().advance_ip(offset as usize);
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    let ip = self.frame().ip();
                    self.frame_mut().set_ip(ip - offset as usize);
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize);
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string_constant();
                    let arg_count = self.read_byte();
                    self.invoke(name, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string_constant();
                    let arg_count = self.read_byte();
                    let superclass_value = self.pop();
                    let superclass = unsafe { object::as_class(as_object(&superclass_value)) };
                    self.invoke_from_class(superclass, name, arg_count)?;
                }
                OpCode::Closure => {
                    let index = self.read_byte();
                    let function_value = self.read_constant(index);
                    let function = unsafe { object::as_function(as_object(&function_value)) };
                    let (closure_ptr, size) = self.object_manager.alloc_closure(function);
                    // Root the closure on the stack before any further allocation (the
                    // upvalue captures below) and before the threshold check can collect.
                    self.push(make_object_value(closure_ptr.cast()));
                    self.track_alloc(size);
                    let upvalue_count = unsafe { (*function).upvalue_count };
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte();
                        let slot_index = self.read_byte();
                        let upvalue = if is_local != 0 {
                            let base = self.frame().slots();
                            let local_ptr = unsafe { base.as_ptr().add(slot_index as usize) };
                            self.capture_upvalue(local_ptr)
                        } else {
                            let enclosing = self.frame().closure();
                            unsafe { (&(*enclosing).upvalues)[slot_index as usize] }
                        };
                        unsafe { (*closure_ptr).upvalues.push(upvalue) };
                    }
                }
                OpCode::CloseUpvalue => {
                    let top_ptr = unsafe { self.stack.as_mut_ptr().add(self.stack_top - 1) };
                    self.close_upvalues(top_ptr);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let slots_ptr = self.frame().slots().as_ptr();
                    self.close_upvalues(slots_ptr);
                    let base = unsafe { slots_ptr.offset_from(self.stack.as_ptr()) as usize };
                    self.frames.pop();
                    if self.frames.is_empty() {
                        self.stack_top = 0;
                        return Ok(());
                    }
                    self.stack_top = base;
                    self.push(result);
                }
                OpCode::Class => {
                    let name = self.read_string_constant();
                    let (class_ptr, size) = self.object_manager.alloc_class(name);
                    self.push(make_object_value(class_ptr.cast()));
                    self.track_alloc(size);
                }
                OpCode::Inherit => {
                    let superclass_value = self.peek(1);
                    if !Self::is_class(&superclass_value) {
                        return Err(self.runtime_error("Superclass must be a class."));
                    }
                    let superclass = unsafe { object::as_class(as_object(&superclass_value)) };
                    let subclass_value = self.peek(0);
                    let subclass = unsafe { object::as_class(as_object(&subclass_value)) };
                    unsafe { (*superclass).methods.add_all(&mut (*subclass).methods) };
                    self.pop();
                }
                OpCode::Method => {
                    let name = self.read_string_constant();
                    let method = self.pop();
                    let class_value = self.peek(0);
                    let class = unsafe { object::as_class(as_object(&class_value)) };
                    unsafe { (*class).methods.set(name, method) };
                }
                OpCode::ListInit => {
                    let count = self.read_byte() as usize;
                    let (list_ptr, size) = self.object_manager.alloc_list();
                    self.push(make_object_value(list_ptr.cast()));
                    self.track_alloc(size);
                    let items_start = self.stack_top - 1 - count;
                    for i in 0..count {
                        let value = self.stack[items_start + i];
                        unsafe { (*list_ptr).append(value) };
                    }
                    let list_value = self.pop();
                    self.stack_top -= count;
                    self.push(list_value);
                }
                OpCode::ListGetIdx => {
                    let index_value = self.pop();
                    let list_value = self.pop();
                    if !is_list(&list_value) {
                        return Err(self.runtime_error("Can only index into a list."));
                    }
                    if !is_number(&index_value) {
                        return Err(self.runtime_error("List index must be a number."));
                    }
                    let list = unsafe { object::as_list(as_object(&list_value)) };
                    match unsafe { (*list).get(as_number(&index_value)) } {
                        Ok(value) => self.push(value),
                        Err(message) => return Err(self.runtime_error(&message)),
                    }
                }
                OpCode::ListSetIdx => {
                    let value = self.pop();
                    let index_value = self.pop();
                    let list_value = self.pop();
                    if !is_list(&list_value) {
                        return Err(self.runtime_error("Can only index into a list."));
                    }
                    if !is_number(&index_value) {
                        return Err(self.runtime_error("List index must be a number."));
                    }
                    let list = unsafe { object::as_list(as_object(&list_value)) };
                    match unsafe { (*list).set(as_number(&index_value), value) } {
                        Ok(()) => self.push(value),
                        Err(message) => return Err(self.runtime_error(&message)),
                    }
                }
            }
        }
    }

    fn binary_number_op(&mut self, op: impl Fn(f64, f64) -> Value) -> Result<(), RuntimeError> {
        if !is_number(&self.peek(0)) || !is_number(&self.peek(1)) {
            return Err(self.runtime_error("Operands must be numbers."));
        }
        let b = as_number(&self.pop());
        let a = as_number(&self.pop());
        self.push(op(a, b));
        Ok(())
    }

    fn add(&mut self) -> Result<(), RuntimeError> {
        let b = self.peek(0);
        let a = self.peek(1);
        if is_string(&a) && is_string(&b) {
            let b = self.pop();
            let a = self.pop();
            let combined = unsafe {
                let sa = &(*object::as_string(as_object(&a))).content;
                let sb = &(*object::as_string(as_object(&b))).content;
                format!("{sa}{sb}")
            };
            let value = make_string_value(&mut self.object_manager, &mut self.intern_strings, &combined);
            self.push(value);
            Ok(())
        } else if is_number(&a) && is_number(&b) {
            let b = as_number(&self.pop());
            let a = as_number(&self.pop());
            self.push(make_number_value(a + b));
            Ok(())
        } else {
            Err(self.runtime_error("Operands must be two numbers or two strings."))
        }
    }

    fn is_instance(value: &Value) -> bool {
        is_object(value) && unsafe { (*as_object(value)).kind == ObjectKind::Instance }
    }

    fn is_class(value: &Value) -> bool {
        is_object(value) && unsafe { (*as_object(value)).kind == ObjectKind::Class }
    }

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        if !is_object(&callee) {
            return Err(self.runtime_error("Can only call functions and classes."));
        }
        let object_ptr = as_object(&callee);
        match unsafe { (*object_ptr).kind } {
            ObjectKind::Closure => {
                let closure = unsafe { object::as_closure(object_ptr) };
                self.call(closure, arg_count)
            }
            ObjectKind::NativeFunction => {
                let native = unsafe { object::as_native(object_ptr) };
                let start = self.stack_top - arg_count as usize;
                let args: Vec<Value> = self.stack[start..self.stack_top].to_vec();
                match unsafe { (*native).invoke(&args) } {
                    Ok(result) => {
                        self.stack_top -= arg_count as usize + 1;
                        self.push(result);
                        Ok(())
                    }
                    Err(message) => Err(self.runtime_error(&message)),
                }
            }
            ObjectKind::Class => {
                let class = unsafe { object::as_class(object_ptr) };
                let (instance_ptr, size) = self.object_manager.alloc_instance(class);
                // Overwrite the callee slot (already part of the live stack window, so
                // already scanned by mark_roots) before the threshold check can collect.
                let slot = self.stack_top - arg_count as usize - 1;
                self.stack[slot] = make_object_value(instance_ptr.cast());
                self.track_alloc(size);
                let init_name = make_string_value(&mut self.object_manager, &mut self.intern_strings, "init");
                let init_key = unsafe { object::as_string(as_object(&init_name)) };
                match unsafe { (*class).methods.get(init_key) } {
                    Some(initializer) => {
                        let closure = unsafe { object::as_closure(as_object(&initializer)) };
                        self.call(closure, arg_count)
                    }
                    None if arg_count != 0 => {
                        Err(self.runtime_error(&format!("Expected 0 arguments but got {}.", arg_count)))
                    }
                    None => Ok(()),
                }
            }
            ObjectKind::BoundMethod => {
                let bound = unsafe { object::as_bound_method(object_ptr) };
                let slot = self.stack_top - arg_count as usize - 1;
                self.stack[slot] = unsafe { (*bound).receiver };
                let method = unsafe { (*bound).method };
                self.call(method, arg_count)
            }
            _ => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }

    fn call(&mut self, closure: *mut ObjectClosure, arg_count: u8) -> Result<(), RuntimeError> {
        let function = unsafe { (*closure).function };
        let arity = unsafe { (*function).arity };
        if arg_count != arity {
            return Err(self.runtime_error(&format!(
                "Expected {} arguments but got {}.",
                arity, arg_count
            )));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        let base = self.stack_top - arg_count as usize - 1;
        let slots = NonNull::new(&mut self.stack[base] as *mut Value).expect("stack slot is never null");
        self.frames.push(CallFrame::new(closure, slots));
        Ok(())
    }

    fn invoke(&mut self, name: *mut ObjectString, arg_count: u8) -> Result<(), RuntimeError> {
        let receiver = self.peek(arg_count as usize);
        if !Self::is_instance(&receiver) {
            return Err(self.runtime_error("Only instances have methods."));
        }
        let instance = unsafe { object::as_instance(as_object(&receiver)) };
        if let Some(field) = unsafe { (*instance).fields.get(name) } {
            let slot = self.stack_top - arg_count as usize - 1;
            self.stack[slot] = field;
            return self.call_value(field, arg_count);
        }
        let class = unsafe { (*instance).class };
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: *mut ObjectClass,
        name: *mut ObjectString,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        match unsafe { (*class).methods.get(name) } {
            Some(method) => {
                let closure = unsafe { object::as_closure(as_object(&method)) };
                self.call(closure, arg_count)
            }
            None => {
                let content = unsafe { (*name).content.clone() };
                Err(self.runtime_error(&format!("Undefined property '{}'.", content)))
            }
        }
    }

    fn bind_method(&mut self, class: *mut ObjectClass, name: *mut ObjectString) -> Result<(), RuntimeError> {
        let method = match unsafe { (*class).methods.get(name) } {
            Some(method) => method,
            None => {
                let content = unsafe { (*name).content.clone() };
                return Err(self.runtime_error(&format!("Undefined property '{}'.", content)));
            }
        };
        let closure = unsafe { object::as_closure(as_object(&method)) };
        let receiver = self.peek(0);
        let (bound_ptr, size) = self.object_manager.alloc_bound_method(receiver, closure);
        self.pop();
        self.push(make_object_value(bound_ptr.cast()));
        self.track_alloc(size);
        Ok(())
    }

    /// Finds (or creates) the Upvalue for `local`, reusing an existing one if
    /// the slot is already captured. `open_upvalues` stays sorted by
    /// descending address so this scan and `close_upvalues` both bail early.
    fn capture_upvalue(&mut self, local: *mut Value) -> *mut ObjectUpvalue {
        let mut index = 0;
        while index < self.open_upvalues.len() {
            let existing = self.open_upvalues[index];
            let location = unsafe { (*existing).location() };
            if location == local {
                return existing;
            }
            if location < local {
                break;
            }
            index += 1;
        }
        let (upvalue_ptr, size) = self.object_manager.alloc_upvalue(local);
        // open_upvalues is itself a GC root, so inserting first roots the upvalue
        // before the threshold check below can collect.
        self.open_upvalues.insert(index, upvalue_ptr);
        self.track_alloc(size);
        upvalue_ptr
    }

    fn close_upvalues(&mut self, from: *mut Value) {
        while let Some(&upvalue) = self.open_upvalues.first() {
            if unsafe { (*upvalue).location() } < from {
                break;
            }
            unsafe { (*upvalue).close() };
            self.open_upvalues.remove(0);
        }
    }
}

#[cfg(feature = "debug_trace_execution")]
mod debug_feature {
    use super::VM;
    use crate::debug;
    use crate::value::print_value;

    pub fn trace(vm: &VM) {
        print!("{:>17}", "");
        for slot in &vm.stack[0..vm.stack_top] {
            print!(" [ ");
            let mut rendered = String::new();
            print_value(slot, &mut rendered);
            print!("{}", rendered);
            print!(" ]");
        }
        println!();
        let frame = vm.frame();
        debug::disassemble_instruction(unsafe { &(*frame.function()).chunk }, frame.ip());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (Box<VM>, InterpretResult) {
        let mut vm = VM::new();
        let result = vm.interpret(source);
        (vm, result)
    }

    fn global_of(vm: &mut VM, name: &str) -> Value {
        let name_value = make_string_value(&mut vm.object_manager, &mut vm.intern_strings, name);
        let key = unsafe { object::as_string(as_object(&name_value)) };
        vm.globals.get(key).expect("global should be defined")
    }

    #[test]
    fn arithmetic_expression_runs_to_completion() {
        let (_vm, result) = run("var r = 1 + 2;");
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn computes_expected_arithmetic_result() {
        let (mut vm, result) = run("var r = 1 + 2;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(as_number(&global_of(&mut vm, "r")), 3.0);
    }

    #[test]
    fn concatenates_interned_strings() {
        let (mut vm, result) = run("var a = \"he\"; var b = \"llo\"; var c = a + b;");
        assert_eq!(result, InterpretResult::Ok);
        let c = global_of(&mut vm, "c");
        assert!(is_string(&c));
    }

    #[test]
    fn closures_capture_enclosing_locals() {
        let (mut vm, result) = run("fun mk(n) { fun inner() { return n; } return inner; } var got = mk(7)();");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(as_number(&global_of(&mut vm, "got")), 7.0);
    }

    #[test]
    fn subclass_inherits_unoverridden_methods() {
        let (_vm, result) = run("class A { greet() { print \"hi\"; } } class B < A {} B().greet();");
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn list_append_and_delete_shift_indices() {
        let (mut vm, result) = run(
            "var xs = [10, 20, 30]; append(xs, 40); delete(xs, 0); var mid = xs[1]; var n = length(xs);",
        );
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(as_number(&global_of(&mut vm, "mid")), 30.0);
        assert_eq!(as_number(&global_of(&mut vm, "n")), 3.0);
    }

    #[test]
    fn shared_upvalue_survives_across_calls() {
        let (mut vm, result) = run(
            "fun c() { var i = 0; fun next() { i = i + 1; return i; } return next; }\n             var n = c(); var a = n(); var b = n(); var d = n();",
        );
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(as_number(&global_of(&mut vm, "a")), 1.0);
        assert_eq!(as_number(&global_of(&mut vm, "b")), 2.0);
        assert_eq!(as_number(&global_of(&mut vm, "d")), 3.0);
    }

    #[test]
    fn initializer_implicitly_returns_the_instance() {
        let (_vm, result) = run("class Point { init(x) { this.x = x; } } var p = Point(5); print p.x;");
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn undefined_global_read_is_a_runtime_error() {
        let (_vm, result) = run("print undefined_name;");
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn calling_a_number_is_a_runtime_error() {
        let (_vm, result) = run("var n = 5; n();");
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn list_index_out_of_range_is_a_runtime_error() {
        let (_vm, result) = run("var xs = [1, 2]; print xs[5];");
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn forced_collection_keeps_reachable_values_alive() {
        let mut vm = VM::new();
        vm.next_gc = 0;
        let result = vm.interpret("var xs = [1, 2, 3]; var a = \"alive\"; var n = length(xs);");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(as_number(&global_of(&mut vm, "n")), 3.0);
    }
}
