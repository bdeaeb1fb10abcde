use crate::{
    chunk::{Chunk, OpCode},
    object::{manager::ObjectManager, object_function::ObjectFunction},
    scanner::{Scanner, Token, TokenType},
    table::Table,
    value::{make_function_value, make_number_value, make_string_value, Value},
};
use std::{io::Write, mem};

pub struct Parser<'a> {
    current: Token<'a>,
    previous: Token<'a>,
    scanner: Option<Box<Scanner<'a>>>,
    has_error: bool,
    panic_mode: bool,
    compilers: Vec<Compiler<'a>>,
    classes: Vec<ClassCompiler>,
    object_manager: &'a mut ObjectManager,
    intern_strings: &'a mut Table,
}

struct Local<'a> {
    name: Token<'a>,
    depth: i32,
}

#[derive(Clone)]
struct Upvalue {
    index: usize,
    is_local: bool,
}

/// Whether the class currently being compiled declared a superclass, which
/// gates whether `super` is legal inside its methods.
struct ClassCompiler {
    has_superclass: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    Function,
    Script,
    Method,
    Initializer,
}

struct Compiler<'a> {
    function: Box<ObjectFunction>,
    function_type: FunctionType,
    locals: Vec<Local<'a>>,
    upvalues: Vec<Upvalue>,
    scope_depth: i32,
}

impl<'a> Compiler<'a> {
    fn new(function_type: FunctionType) -> Self {
        Compiler {
            function: ObjectFunction::new(0, String::new()),
            function_type,
            locals: vec![],
            upvalues: vec![],
            scope_depth: 0,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
    Assignment, // =
    Or,
    And,
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . () []
    Primary,
}

impl From<u8> for Precedence {
    fn from(value: u8) -> Self {
        match value {
            0 => Precedence::None,
            1 => Precedence::Assignment,
            2 => Precedence::Or,
            3 => Precedence::And,
            4 => Precedence::Equality,
            5 => Precedence::Comparison,
            6 => Precedence::Term,
            7 => Precedence::Factor,
            8 => Precedence::Unary,
            9 => Precedence::Call,
            10 => Precedence::Primary,
            _ => unreachable!("invalid precedence value: {value}"),
        }
    }
}

type ParserFn = fn(&mut Parser<'_>, can_assign: bool);

#[derive(Debug, Clone, Copy)]
struct ParseRule {
    prefix: Option<ParserFn>,
    infix: Option<ParserFn>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(prefix: Option<ParserFn>, infix: Option<ParserFn>, precedence: Precedence) -> Self {
        ParseRule { prefix, infix, precedence }
    }
}

const RULES: [ParseRule; TokenType::Eof as usize + 1] = {
    let mut rules = [ParseRule::new(None, None, Precedence::None); TokenType::Eof as usize + 1];

    rules[TokenType::LeftParen as usize] =
        ParseRule::new(Some(|p, _| p.grouping()), Some(|p, ca| p.call(ca)), Precedence::Call);
    rules[TokenType::Dot as usize] =
        ParseRule::new(None, Some(|p, ca| p.dot(ca)), Precedence::Call);
    rules[TokenType::LeftBracket as usize] = ParseRule::new(
        Some(|p, _| p.list_literal()),
        Some(|p, ca| p.index(ca)),
        Precedence::Call,
    );
    rules[TokenType::Minus as usize] =
        ParseRule::new(Some(|p, _| p.unary()), Some(|p, _| p.binary()), Precedence::Term);
    rules[TokenType::Plus as usize] = ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Term);
    rules[TokenType::Slash as usize] = ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Factor);
    rules[TokenType::Star as usize] = ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Factor);
    rules[TokenType::Number as usize] = ParseRule::new(Some(|p, _| p.number()), None, Precedence::None);
    rules[TokenType::String as usize] = ParseRule::new(Some(|p, _| p.string()), None, Precedence::None);
    rules[TokenType::False as usize] = ParseRule::new(Some(|p, _| p.literal()), None, Precedence::None);
    rules[TokenType::True as usize] = ParseRule::new(Some(|p, _| p.literal()), None, Precedence::None);
    rules[TokenType::Nil as usize] = ParseRule::new(Some(|p, _| p.literal()), None, Precedence::None);
    rules[TokenType::This as usize] = ParseRule::new(Some(|p, _| p.this_expr()), None, Precedence::None);
    rules[TokenType::Super as usize] = ParseRule::new(Some(|p, _| p.super_expr()), None, Precedence::None);
    rules[TokenType::Bang as usize] = ParseRule::new(Some(|p, _| p.unary()), None, Precedence::None);
    rules[TokenType::BangEqual as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Equality);
    rules[TokenType::EqualEqual as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Equality);
    rules[TokenType::Greater as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Comparison);
    rules[TokenType::GreaterEqual as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Comparison);
    rules[TokenType::Less as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Comparison);
    rules[TokenType::LessEqual as usize] =
        ParseRule::new(None, Some(|p, _| p.binary()), Precedence::Comparison);
    rules[TokenType::Identifier as usize] =
        ParseRule::new(Some(|p, ca| p.variable(ca)), None, Precedence::None);
    rules[TokenType::And as usize] = ParseRule::new(None, Some(|p, ca| p.and(ca)), Precedence::And);
    rules[TokenType::Or as usize] = ParseRule::new(None, Some(|p, ca| p.or(ca)), Precedence::Or);

    rules
};

impl<'a> Parser<'a> {
    pub fn new(object_manager: &'a mut ObjectManager, intern_strings: &'a mut Table) -> Box<Parser<'a>> {
        let mut parser = Box::new(Parser {
            current: Token { token_type: TokenType::Eof, value: "", line: 0 },
            previous: Token { token_type: TokenType::Eof, value: "", line: 0 },
            scanner: None,
            has_error: false,
            panic_mode: false,
            compilers: vec![],
            classes: vec![],
            object_manager,
            intern_strings,
        });
        parser.init_compiler(FunctionType::Script);
        parser
    }

    pub fn had_error(&self) -> bool {
        self.has_error
    }

    pub fn compile(&mut self, source: &'a str) -> Option<Box<ObjectFunction>> {
        self.scanner = Some(Scanner::new(source));
        self.current = Token { token_type: TokenType::Eof, value: "", line: 0 };
        self.previous = Token { token_type: TokenType::Eof, value: "", line: 0 };

        self.advance();

        while !self.match_token(TokenType::Eof) {
            self.declaration();
        }

        self.consume(TokenType::Eof, "Expect end of expression.");

        let function = self.end_compiler();
        if self.has_error {
            None
        } else {
            function
        }
    }

    fn specific_compiler(&self, compiler_index: usize) -> &Compiler<'a> {
        self.compilers.get(compiler_index).expect("compiler index is invalid")
    }

    fn specific_compiler_mut(&mut self, compiler_index: usize) -> &mut Compiler<'a> {
        self.compilers.get_mut(compiler_index).expect("compiler index is invalid")
    }

    fn current_compiler(&self) -> &Compiler<'a> {
        self.compilers.last().expect("no active compiler")
    }

    fn current_compiler_mut(&mut self) -> &mut Compiler<'a> {
        self.compilers.last_mut().expect("no active compiler")
    }

    fn current_function(&self) -> &ObjectFunction {
        &self.current_compiler().function
    }

    fn current_function_mut(&mut self) -> &mut ObjectFunction {
        &mut self.current_compiler_mut().function
    }

    fn current_chunk(&self) -> &Chunk {
        &self.current_function().chunk
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.current_function_mut().chunk
    }

    fn current_locals(&self) -> &Vec<Local<'a>> {
        &self.current_compiler().locals
    }

    fn current_locals_mut(&mut self) -> &mut Vec<Local<'a>> {
        &mut self.current_compiler_mut().locals
    }

    fn current_class(&self) -> Option<&ClassCompiler> {
        self.classes.last()
    }

    fn synthetic_token(text: &'static str) -> Token<'static> {
        Token { token_type: TokenType::Identifier, value: text, line: 0 }
    }

    fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            if let Some(scanner) = &mut self.scanner {
                self.current = scanner.scan_token();
                if self.current.token_type != TokenType::Error {
                    break;
                }
                self.error_at_current(self.current.value);
            } else {
                panic!("compiler was not initialized correctly");
            }
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if !self.check(token_type) {
            return false;
        }
        self.advance();
        true
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current.token_type == token_type
    }

    fn consume(&mut self, token_type: TokenType, message: &'a str) {
        if self.current.token_type == token_type {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line as u32;
        self.current_chunk_mut().write(byte, line);
    }

    fn emit_bytes(&mut self, byte1: u8, byte2: u8) {
        self.emit_byte(byte1);
        self.emit_byte(byte2);
    }

    fn emit_constant(&mut self, value: Value) {
        let byte = self.make_constant(value);
        self.emit_bytes(OpCode::Constant.to_byte(), byte);
    }

    fn emit_return(&mut self) {
        if self.current_compiler().function_type == FunctionType::Initializer {
            self.emit_bytes(OpCode::GetLocal.to_byte(), 0);
        } else {
            self.emit_byte(OpCode::Nil.to_byte());
        }
        self.emit_byte(OpCode::Return.to_byte());
    }

    fn init_compiler(&mut self, function_type: FunctionType) {
        let mut compiler = Compiler::new(function_type);
        if compiler.function_type != FunctionType::Script {
            compiler.function.name = self.previous.value.to_string();
        }

        // Slot zero holds the callee (for methods, the receiver); reserving
        // it under the name "this" lets method bodies resolve `this` as an
        // ordinary local.
        let reserved_name = if matches!(function_type, FunctionType::Method | FunctionType::Initializer) {
            Token { token_type: TokenType::This, value: "this", line: 0 }
        } else {
            Token { token_type: TokenType::Eof, value: "", line: 0 }
        };
        compiler.locals.push(Local { name: reserved_name, depth: 0 });
        self.compilers.push(compiler);
    }

    fn end_compiler(&mut self) -> Option<Box<ObjectFunction>> {
        self.emit_return();

        if self.current_function().name.is_empty() {
            debug_feature::disassemble_chunk(self, "<script>");
        } else {
            let name = self.current_function().name.clone();
            debug_feature::disassemble_chunk(self, &name);
        }

        let function = mem::replace(&mut self.current_compiler_mut().function, ObjectFunction::new(0, String::new()));
        self.compilers.pop();
        Some(function)
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if let Some(index) = self.current_chunk().find_constant(value) {
            return index as u8;
        }

        let constant_index = self.current_chunk_mut().add_constant(value);
        if constant_index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        constant_index as u8
    }

    fn number(&mut self) {
        let value = self.previous.value.parse::<f64>().unwrap_or(0.0);
        self.emit_constant(make_number_value(value));
    }

    fn string(&mut self) {
        let content = &self.previous.value[1..self.previous.value.len() - 1];
        let value = make_string_value(self.object_manager, self.intern_strings, content);
        self.emit_constant(value);
    }

    fn declaration(&mut self) {
        if self.match_token(TokenType::Class) {
            self.class_declaration();
        } else if self.match_token(TokenType::Var) {
            self.variable_declaration();
        } else if self.match_token(TokenType::Fun) {
            self.function_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenType::Identifier, "Expect class name.");
        let class_name = self.previous.clone();
        let name_constant = self.identifier_constant(class_name.clone());
        self.declare_variable();

        self.emit_bytes(OpCode::Class.to_byte(), name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassCompiler { has_superclass: false });

        if self.match_token(TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.");
            self.variable(false);

            if Self::identifier_equal(&class_name, &self.previous.clone()) {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.add_local(Self::synthetic_token("super"));
            self.define_variable(0);

            self.named_variable(class_name.clone(), false);
            self.emit_byte(OpCode::Inherit.to_byte());
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.method();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.");
        self.emit_byte(OpCode::Pop.to_byte());

        if self.classes.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume(TokenType::Identifier, "Expect method name.");
        let name = self.previous.clone();
        let constant = self.identifier_constant(name.clone());
        let function_type = if name.value == "init" { FunctionType::Initializer } else { FunctionType::Method };
        self.function(function_type);
        self.emit_bytes(OpCode::Method.to_byte(), constant);
    }

    fn variable_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_byte(OpCode::Nil.to_byte());
        }
        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    fn parse_variable(&mut self, message: &'a str) -> u8 {
        self.consume(TokenType::Identifier, message);

        self.declare_variable();
        if self.current_compiler().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.clone())
    }

    fn declare_variable(&mut self) {
        if self.current_compiler().scope_depth == 0 {
            return;
        }

        let mut err = false;
        let variable_name = self.previous.clone();
        let scope_depth = self.current_compiler().scope_depth;
        for local in self.current_locals().iter().rev() {
            if local.depth != -1 && local.depth < scope_depth {
                break;
            }
            if Self::identifier_equal(&variable_name, &local.name) {
                err = true;
                break;
            }
        }
        if err {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(variable_name);
    }

    fn add_local(&mut self, variable_name: Token<'a>) {
        if self.current_locals().len() >= u8::MAX as usize {
            self.error("Too many local variables in function.");
            return;
        }
        self.current_locals_mut().push(Local { name: variable_name, depth: -1 });
    }

    fn function_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType) {
        self.init_compiler(function_type);

        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenType::RightParen) {
            loop {
                if self.current_function().arity == 255 {
                    self.error("Can't have more than 255 parameters.");
                } else {
                    self.current_function_mut().arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);

                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        self.block();

        let upvalues = self.current_compiler().upvalues.clone();

        let mut object_function = self.end_compiler().expect("function body always yields a function");
        object_function.upvalue_count = upvalues.len();
        let (object_function_ptr, _) = self.object_manager.register_function(object_function);
        let function_constant_index = self.make_constant(make_function_value(object_function_ptr));
        self.emit_bytes(OpCode::Closure.to_byte(), function_constant_index);

        for upvalue in upvalues.iter() {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index as u8);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut argument_count: u8 = 0;
        if !self.check(TokenType::RightParen) {
            loop {
                self.expression();
                if argument_count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                argument_count += 1;

                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        argument_count
    }

    fn identifier_constant(&mut self, token: Token) -> u8 {
        let value = make_string_value(self.object_manager, self.intern_strings, token.value);
        self.make_constant(value)
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_compiler().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal.to_byte(), global);
    }

    fn mark_initialized(&mut self) {
        let scope_depth = self.current_compiler().scope_depth;
        if scope_depth == 0 {
            return;
        }
        self.current_locals_mut().last_mut().unwrap().depth = scope_depth;
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.clone(), can_assign)
    }

    fn this_expr(&mut self) {
        if self.current_class().is_none() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    fn super_expr(&mut self) {
        match self.current_class() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.")
            }
            _ => {}
        }

        self.consume(TokenType::Dot, "Expect '.' after 'super'.");
        self.consume(TokenType::Identifier, "Expect superclass method name.");
        let constant = self.identifier_constant(self.previous.clone());

        self.named_variable(Self::synthetic_token("this"), false);
        if self.match_token(TokenType::LeftParen) {
            let argument_count = self.argument_list();
            self.named_variable(Self::synthetic_token("super"), false);
            self.emit_bytes(OpCode::SuperInvoke.to_byte(), constant);
            self.emit_byte(argument_count);
        } else {
            self.named_variable(Self::synthetic_token("super"), false);
            self.emit_bytes(OpCode::GetSuper.to_byte(), constant);
        }
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenType::Identifier, "Expect property name after '.'.");
        let constant = self.identifier_constant(self.previous.clone());

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetProperty.to_byte(), constant);
        } else if self.match_token(TokenType::LeftParen) {
            let argument_count = self.argument_list();
            self.emit_bytes(OpCode::Invoke.to_byte(), constant);
            self.emit_byte(argument_count);
        } else {
            self.emit_bytes(OpCode::GetProperty.to_byte(), constant);
        }
    }

    fn list_literal(&mut self) {
        let mut count: u8 = 0;
        if !self.check(TokenType::RightBracket) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 elements in a list literal.");
                }
                count += 1;
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightBracket, "Expect ']' after list elements.");
        self.emit_bytes(OpCode::ListInit.to_byte(), count);
    }

    fn index(&mut self, can_assign: bool) {
        self.expression();
        self.consume(TokenType::RightBracket, "Expect ']' after index.");

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_byte(OpCode::ListSetIdx.to_byte());
        } else {
            self.emit_byte(OpCode::ListGetIdx.to_byte());
        }
    }

    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let mut opcode_get = OpCode::GetLocal.to_byte();
        let mut opcode_set = OpCode::SetLocal.to_byte();
        let current_compiler_index = self.compilers.len() - 1;
        let mut index = self.resolve_local(current_compiler_index, &name);
        if index == -1 {
            index = self.resolve_upvalue(current_compiler_index, &name);
            if index == -1 {
                index = self.identifier_constant(name) as i32;
                opcode_get = OpCode::GetGlobal.to_byte();
                opcode_set = OpCode::SetGlobal.to_byte();
            } else {
                opcode_get = OpCode::GetUpvalue.to_byte();
                opcode_set = OpCode::SetUpvalue.to_byte();
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(opcode_set, index as u8);
        } else {
            self.emit_bytes(opcode_get, index as u8);
        }
    }

    fn resolve_local(&mut self, compiler_index: usize, name: &Token) -> i32 {
        let compiler = self.specific_compiler(compiler_index);
        for (index, local) in compiler.locals.iter().enumerate().rev() {
            if Self::identifier_equal(name, &local.name) {
                if local.depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return index as i32;
            }
        }
        -1
    }

    fn identifier_equal(left: &Token, right: &Token) -> bool {
        left.value == right.value
    }

    fn resolve_upvalue(&mut self, compiler_index: usize, name: &Token) -> i32 {
        if compiler_index == 0 {
            return -1;
        }
        let local = self.resolve_local(compiler_index - 1, name);
        if local != -1 {
            return self.add_upvalue(compiler_index, local, true) as i32;
        }

        let upvalue = self.resolve_upvalue(compiler_index - 1, name);
        if upvalue != -1 {
            return self.add_upvalue(compiler_index, upvalue, false) as i32;
        }

        -1
    }

    fn add_upvalue(&mut self, compiler_index: usize, local: i32, is_local: bool) -> usize {
        let compiler = self.specific_compiler_mut(compiler_index);
        for (index, upvalue) in compiler.upvalues.iter().enumerate() {
            if upvalue.is_local == is_local && upvalue.index == local as usize {
                return index;
            }
        }
        compiler.upvalues.push(Upvalue { index: local as usize, is_local });
        compiler.function.upvalue_count = compiler.upvalues.len();
        compiler.function.upvalue_count - 1
    }

    fn and(&mut self, _can_assign: bool) {
        let jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.parse_precedence(Precedence::And);
        self.patch_jump_offset(jump);
    }

    fn or(&mut self, _can_assign: bool) {
        let jump = self.emit_jump_bytes(OpCode::JumpIfTrue.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.parse_precedence(Precedence::Or);
        self.patch_jump_offset(jump);
    }

    fn statement(&mut self) {
        if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::Return) {
            self.return_statement();
        } else if self.match_token(TokenType::Print) {
            self.print_statement();
        } else if self.match_token(TokenType::PrintLn) {
            self.println_statement();
        } else {
            self.expression_statement();
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());
        self.statement();

        let else_jump = self.emit_jump_bytes(OpCode::Jump.to_byte());
        self.patch_jump_offset(jump);
        self.emit_byte(OpCode::Pop.to_byte());

        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump_offset(else_jump);
    }

    fn emit_jump_bytes(&mut self, instruction: u8) -> u16 {
        self.emit_byte(instruction);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        (self.current_chunk().len() - 2) as u16
    }

    fn patch_jump_offset(&mut self, offset: u16) {
        let jump_offset = self.current_chunk().len() as u16 - offset - 2;
        if jump_offset as u32 > u16::MAX as u32 {
            self.error("Too much code to jump over.");
        }

        let current_chunk = self.current_chunk_mut();
        current_chunk.write_by_offset(offset as usize, ((jump_offset >> 8) & 0xff) as u8);
        current_chunk.write_by_offset(offset as usize + 1, (jump_offset & 0xff) as u8);
    }

    fn begin_scope(&mut self) {
        self.current_compiler_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_compiler_mut().scope_depth -= 1;
        let scope_depth = self.current_compiler().scope_depth;
        loop {
            let locals = self.current_locals();
            if locals.is_empty() || locals.last().unwrap().depth <= scope_depth {
                break;
            }
            self.emit_byte(OpCode::Pop.to_byte());
            self.current_locals_mut().pop();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    fn return_statement(&mut self) {
        if self.current_compiler().function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenType::Semicolon) {
            self.emit_return();
        } else {
            if self.current_compiler().function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
            self.emit_byte(OpCode::Return.to_byte());
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Print.to_byte());
    }

    fn println_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::PrintLn.to_byte());
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();

        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte());
        self.emit_byte(OpCode::Pop.to_byte());

        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump_offset(jump);
        self.emit_byte(OpCode::Pop.to_byte());
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_byte(OpCode::Loop.to_byte());

        let offset = self.current_chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        self.emit_byte(((offset as u16 >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenType::Semicolon) {
            // no initializer
        } else if self.match_token(TokenType::Var) {
            self.variable_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();
        let mut exit_jump: i32 = -1;
        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");

            exit_jump = self.emit_jump_bytes(OpCode::JumpIfFalse.to_byte()) as i32;
            self.emit_byte(OpCode::Pop.to_byte());
        }

        if !self.match_token(TokenType::RightParen) {
            let body_jump = self.emit_jump_bytes(OpCode::Jump.to_byte());
            let increment_start = self.current_chunk().len();
            self.expression();
            self.emit_byte(OpCode::Pop.to_byte());
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump_offset(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if exit_jump != -1 {
            self.patch_jump_offset(exit_jump as u16);
            self.emit_byte(OpCode::Pop.to_byte());
        }
        self.end_scope();
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop.to_byte());
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn unary(&mut self) {
        let operator_type = self.previous.token_type;
        self.parse_precedence(Precedence::Unary);

        match operator_type {
            TokenType::Bang => self.emit_byte(OpCode::Not.to_byte()),
            TokenType::Minus => self.emit_byte(OpCode::Negate.to_byte()),
            _ => unreachable!("expected a unary operator"),
        }
    }

    fn binary(&mut self) {
        let operator_type = self.previous.token_type;
        let rule = &RULES[operator_type as usize];
        self.parse_precedence((rule.precedence as u8 + 1).into());

        match operator_type {
            TokenType::BangEqual => self.emit_bytes(OpCode::Equal.to_byte(), OpCode::Not.to_byte()),
            TokenType::EqualEqual => self.emit_byte(OpCode::Equal.to_byte()),
            TokenType::Greater => self.emit_byte(OpCode::Greater.to_byte()),
            TokenType::GreaterEqual => self.emit_bytes(OpCode::Less.to_byte(), OpCode::Not.to_byte()),
            TokenType::Less => self.emit_byte(OpCode::Less.to_byte()),
            TokenType::LessEqual => self.emit_bytes(OpCode::Greater.to_byte(), OpCode::Not.to_byte()),
            TokenType::Plus => self.emit_byte(OpCode::Add.to_byte()),
            TokenType::Minus => self.emit_byte(OpCode::Subtract.to_byte()),
            TokenType::Star => self.emit_byte(OpCode::Multiply.to_byte()),
            TokenType::Slash => self.emit_byte(OpCode::Divide.to_byte()),
            _ => unreachable!("unexpected binary operator: {operator_type}"),
        }
    }

    fn literal(&mut self) {
        match self.previous.token_type {
            TokenType::False => self.emit_byte(OpCode::False.to_byte()),
            TokenType::True => self.emit_byte(OpCode::True.to_byte()),
            TokenType::Nil => self.emit_byte(OpCode::Nil.to_byte()),
            other => unreachable!("unexpected literal token: {other}"),
        }
    }

    fn call(&mut self, _can_assign: bool) {
        let argument_count = self.argument_list();
        self.emit_bytes(OpCode::Call.to_byte(), argument_count);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let can_assign = precedence <= Precedence::Assignment;
        if let Some(prefix) = RULES[self.previous.token_type as usize].prefix {
            prefix(self, can_assign);
        } else {
            self.error("Expect expression.");
            return;
        }

        while precedence as u8 <= RULES[self.current.token_type as usize].precedence as u8 {
            self.advance();
            if let Some(infix) = RULES[self.previous.token_type as usize].infix {
                infix(self, can_assign);
            } else {
                self.error("Expect infix parse function.");
                return;
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.token_type != TokenType::Eof {
            if self.previous.token_type == TokenType::Semicolon {
                return;
            }

            if matches!(
                self.current.token_type,
                TokenType::Class
                    | TokenType::Fun
                    | TokenType::Var
                    | TokenType::For
                    | TokenType::If
                    | TokenType::While
                    | TokenType::Print
                    | TokenType::PrintLn
                    | TokenType::Return
            ) {
                return;
            }

            self.advance();
        }
    }

    fn error(&mut self, message: &'a str) {
        self.error_at(&self.previous.clone(), message);
    }

    fn error_at_current(&mut self, message: &'a str) {
        self.error_at(&self.current.clone(), message);
    }

    fn error_at(&mut self, token: &Token, message: &'a str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        write!(&mut std::io::stderr(), "[line {}] Error", token.line).ok();

        match token.token_type {
            TokenType::Eof => {
                write!(&mut std::io::stderr(), " at end").ok();
            }
            TokenType::Error => {}
            _ => {
                write!(&mut std::io::stderr(), " at '{}'", token.value).ok();
            }
        };

        writeln!(&mut std::io::stderr(), ": {message}").ok();
        self.has_error = true;
    }
}

#[cfg(feature = "debug_print_code")]
mod debug_feature {
    use crate::debug;

    use super::Parser;

    pub fn disassemble_chunk(parser: &Parser, name: &str) {
        if !parser.has_error {
            debug::disassemble_chunk(parser.current_chunk(), name);
        }
    }
}

#[cfg(not(feature = "debug_print_code"))]
mod debug_feature {
    use super::Parser;

    pub fn disassemble_chunk(_parser: &Parser, _name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::OpCode;
    use crate::value::as_number;

    #[test]
    fn compiles_arithmetic_and_comparison() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
        let result = parser.compile("!(5 - 4 > 3 * 2 == !nil);");
        assert!(result.is_some());

        let function = result.unwrap();
        let chunk = &function.chunk;
        assert_eq!(as_number(chunk.get_constant(0)), 5.0);
        assert_eq!(as_number(chunk.get_constant(1)), 4.0);
        assert_eq!(chunk.read_from_offset(0).unwrap(), OpCode::Constant.to_byte());
        assert_eq!(chunk.read_from_offset(4).unwrap(), OpCode::Subtract.to_byte());
    }

    #[test]
    fn interns_equal_string_literals() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        {
            let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
            assert!(parser.compile("\"hello\";").is_some());
        }
        {
            let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
            assert!(parser.compile("\"hello\";").is_some());
        }
        assert_eq!(intern_strings.len(), 1);
    }

    #[test]
    fn compiles_function_declaration_and_call() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
        let result = parser.compile(
            "fun sum(a, b, c) {\n                return a + b + c;\n            }\n            print sum(1, 2, 3);",
        );
        assert!(result.is_some());
    }

    #[test]
    fn compiles_class_with_inheritance_and_methods() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
        let result = parser.compile(
            "class Animal { speak() { print \"...\"; } }\n             class Dog < Animal { speak() { super.speak(); println \"Woof\"; } }\n             Dog().speak();",
        );
        assert!(result.is_some());
    }

    #[test]
    fn compiles_list_literal_and_index() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
        let result = parser.compile("var xs = [1, 2, 3]; xs[0] = 9;");
        assert!(result.is_some());
    }

    #[test]
    fn rejects_this_outside_class() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let mut parser = Parser::new(&mut object_manager, &mut intern_strings);
        parser.compile("print this;");
        assert!(parser.had_error());
    }
}
