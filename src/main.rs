mod call_frame;
mod chunk;
mod compiler;
mod debug;
mod gc;
mod natives;
mod object;
mod scanner;
mod table;
mod value;
mod vm;

use std::io::{self, Write};
use std::process::ExitCode;

use vm::{InterpretResult, VM};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match args.len() {
        1 => repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: vmcore [script]");
            ExitCode::from(64)
        }
    }
}

fn repl() -> ExitCode {
    let mut vm = VM::new();
    let mut line = String::new();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return ExitCode::from(70);
        }
        line.clear();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                println!();
                return ExitCode::SUCCESS;
            }
            Ok(_) => {
                vm.interpret(&line);
            }
            Err(_) => return ExitCode::from(70),
        }
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read file \"{}\": {}", path, error);
            return ExitCode::from(74);
        }
    };

    let mut vm = VM::new();
    match vm.interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(65),
        InterpretResult::RuntimeError => ExitCode::from(70),
    }
}
