//! Human-readable dumps of compiled bytecode, gated behind the
//! `debug_print_code` feature at compile time and invoked per-instruction
//! from the VM's dispatch loop behind `debug_trace_execution`.

use crate::chunk::{Chunk, OpCode};
use crate::value::{print_value, Value};

pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {} ==", name);

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{:04} ", offset);
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.lines[offset]);
    }

    let instruction = chunk.code[offset];
    let Some(opcode) = OpCode::from_byte(instruction) else {
        println!("Unknown opcode {}", instruction);
        return offset + 1;
    };

    match opcode {
        OpCode::Constant => constant_instruction("OP_CONSTANT", chunk, offset),
        OpCode::Nil => simple_instruction("OP_NIL", offset),
        OpCode::True => simple_instruction("OP_TRUE", offset),
        OpCode::False => simple_instruction("OP_FALSE", offset),
        OpCode::Pop => simple_instruction("OP_POP", offset),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset),
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, offset),
        OpCode::DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset),
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, offset),
        OpCode::GetUpvalue => byte_instruction("OP_GET_UPVALUE", chunk, offset),
        OpCode::SetUpvalue => byte_instruction("OP_SET_UPVALUE", chunk, offset),
        OpCode::GetProperty => constant_instruction("OP_GET_PROPERTY", chunk, offset),
        OpCode::SetProperty => constant_instruction("OP_SET_PROPERTY", chunk, offset),
        OpCode::GetSuper => constant_instruction("OP_GET_SUPER", chunk, offset),
        OpCode::Equal => simple_instruction("OP_EQUAL", offset),
        OpCode::Greater => simple_instruction("OP_GREATER", offset),
        OpCode::Less => simple_instruction("OP_LESS", offset),
        OpCode::Add => simple_instruction("OP_ADD", offset),
        OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset),
        OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset),
        OpCode::Divide => simple_instruction("OP_DIVIDE", offset),
        OpCode::Not => simple_instruction("OP_NOT", offset),
        OpCode::Negate => simple_instruction("OP_NEGATE", offset),
        OpCode::Print => simple_instruction("OP_PRINT", offset),
        OpCode::PrintLn => simple_instruction("OP_PRINTLN", offset),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        OpCode::JumpIfTrue => jump_instruction("OP_JUMP_IF_TRUE", 1, chunk, offset),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset),
        OpCode::Call => byte_instruction("OP_CALL", chunk, offset),
        OpCode::Invoke => invoke_instruction("OP_INVOKE", chunk, offset),
        OpCode::SuperInvoke => invoke_instruction("OP_SUPER_INVOKE", chunk, offset),
        OpCode::Closure => closure_instruction(chunk, offset),
        OpCode::CloseUpvalue => simple_instruction("OP_CLOSE_UPVALUE", offset),
        OpCode::Return => simple_instruction("OP_RETURN", offset),
        OpCode::Class => constant_instruction("OP_CLASS", chunk, offset),
        OpCode::Inherit => simple_instruction("OP_INHERIT", offset),
        OpCode::Method => constant_instruction("OP_METHOD", chunk, offset),
        OpCode::ListInit => byte_instruction("OP_LIST_INIT", chunk, offset),
        OpCode::ListGetIdx => simple_instruction("OP_LIST_GETIDX", offset),
        OpCode::ListSetIdx => simple_instruction("OP_LIST_SETIDX", offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{:<16} {:>4}", name, slot);
    offset + 2
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant_index = chunk.code[offset + 1] as usize;
    print!("{:<16} {:>4} '", name, constant_index);
    let mut rendered = String::new();
    print_value(chunk.get_constant(constant_index), &mut rendered);
    print!("{}", rendered);
    println!("'");
    offset + 2
}

fn invoke_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant_index = chunk.code[offset + 1] as usize;
    let argument_count = chunk.code[offset + 2];
    print!("{:<16} ({} args) {:>4} '", name, argument_count, constant_index);
    let mut rendered = String::new();
    print_value(chunk.get_constant(constant_index), &mut rendered);
    print!("{}", rendered);
    println!("'");
    offset + 3
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let high = chunk.code[offset + 1] as u16;
    let low = chunk.code[offset + 2] as u16;
    let jump = (high << 8) | low;
    let target = offset as i32 + 3 + sign * jump as i32;
    println!("{:<16} {:>4} -> {}", name, offset, target);
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize) -> usize {
    let mut current = offset + 1;
    let constant_index = chunk.code[current] as usize;
    current += 1;
    print!("{:<16} {:>4} '", "OP_CLOSURE", constant_index);
    let function_value: &Value = chunk.get_constant(constant_index);
    let mut rendered = String::new();
    print_value(function_value, &mut rendered);
    print!("{}", rendered);
    println!("'");

    let upvalue_count = crate::value::as_function_upvalue_count(function_value);
    for _ in 0..upvalue_count {
        let is_local = chunk.code[current];
        let index = chunk.code[current + 1];
        current += 2;
        println!(
            "{:04}      |                     {} {}",
            current - 2,
            if is_local != 0 { "local" } else { "upvalue" },
            index
        );
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, OpCode};
    use crate::value::make_number_value;

    #[test]
    fn disassembles_constant_and_return() {
        let mut chunk = Chunk::new();
        let index = chunk.add_constant(make_number_value(1.5));
        chunk.write(OpCode::Constant.to_byte(), 1);
        chunk.write(index as u8, 1);
        chunk.write(OpCode::Return.to_byte(), 1);

        let next = disassemble_instruction(&chunk, 0);
        assert_eq!(next, 2);
        let after_return = disassemble_instruction(&chunk, next);
        assert_eq!(after_return, 3);
    }

    #[test]
    fn disassembles_forward_jump() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::JumpIfFalse.to_byte(), 1);
        chunk.write(0, 1);
        chunk.write(2, 1);
        let next = disassemble_instruction(&chunk, 0);
        assert_eq!(next, 3);
    }
}
