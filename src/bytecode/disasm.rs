use std::fmt::Write;

use crate::bytecode::Bytecode;
use crate::bytecode::op::{Definition, lookup, read_operands};
use crate::lang::object::Object;

const RULE: &str = "════════════════════════════════════════";

/// Render an instruction stream as `offset mnemonic operand...` lines.
///
/// An undefined opcode byte is reported and skipped, so decoding resumes at
/// the next byte. A truncated final instruction is reported and ends the
/// listing.
pub fn disassemble(ins: &[u8]) -> String {
    let mut out = String::new();
    let mut ip = 0;

    while ip < ins.len() {
        let def = match lookup(ins[ip]) {
            Ok(def) => def,
            Err(err) => {
                let _ = writeln!(out, "{:04} ERROR: {}", ip, err);
                ip += 1;
                continue;
            }
        };

        match read_operands(def, &ins[ip + 1..]) {
            Ok((operands, read)) => {
                let _ = writeln!(out, "{:04} {}", ip, format_instruction(def, &operands));
                ip += 1 + read;
            }
            Err(err) => {
                let _ = writeln!(out, "{:04} ERROR: {}", ip, err);
                break;
            }
        }
    }

    out
}

fn format_instruction(def: &Definition, operands: &[usize]) -> String {
    match operands {
        [] => def.name.to_string(),
        [a] => format!("{} {}", def.name, a),
        [a, b] => format!("{} {} {}", def.name, a, b),
        _ => format!(
            "ERROR: unhandled operand count {} for {}",
            operands.len(),
            def.name
        ),
    }
}

/// Full listing of a compilation result: the main stream, the constant
/// pool, then the body of every function constant.
pub fn render_bytecode(bc: &Bytecode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== BYTECODE PROGRAM ===\n");

    section(&mut out, "main", bc.instructions.len());
    out.push_str(&disassemble(&bc.instructions));
    out.push('\n');

    if !bc.constants.is_empty() {
        let _ = writeln!(out, "constants:");
        for (i, constant) in bc.constants.iter().enumerate() {
            let _ = writeln!(out, "  [{}] {}", i, format_constant(i, constant));
        }
        out.push('\n');
    }

    for (i, constant) in bc.constants.iter().enumerate() {
        if let Object::CompiledFunction(func) = constant {
            let title = format!(
                "fn#{} (params {}, locals {})",
                i, func.num_parameters, func.num_locals
            );
            section(&mut out, &title, func.instructions.len());
            out.push_str(&disassemble(&func.instructions));
            out.push('\n');
        }
    }

    out
}

fn section(out: &mut String, title: &str, bytes: usize) {
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, " {}", title);
    let _ = writeln!(out, " {} bytes", bytes);
    let _ = writeln!(out, "{}", RULE);
}

fn format_constant(index: usize, obj: &Object) -> String {
    match obj {
        Object::String(s) => format!("{:?}", &**s),
        Object::CompiledFunction(_) => format!("<fn#{}>", index),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Instructions;
    use crate::bytecode::op::{Opcode, make};
    use crate::lang::object::CompiledFunction;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    #[test]
    fn test_instructions_string() {
        let ins = Instructions::concat(vec![
            make(Opcode::Add, &[]),
            make(Opcode::GetLocal, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Constant, &[65535]),
            make(Opcode::Closure, &[65535, 255]),
        ]);

        let expected = "0000 OpAdd
0001 OpGetLocal 1
0003 OpConstant 2
0006 OpConstant 65535
0009 OpClosure 65535 255
";
        assert_eq!(disassemble(&ins), expected);
        assert_eq!(ins.to_string(), expected);
    }

    #[test]
    fn test_undefined_opcode_skips_one_byte() {
        let mut bytes = vec![250];
        bytes.extend(make(Opcode::Pop, &[]));

        let out = disassemble(&bytes);
        assert_eq!(out, "0000 ERROR: opcode 250 undefined\n0001 OpPop\n");
    }

    #[test]
    fn test_garbage_always_terminates() {
        let bytes: Vec<u8> = (0..=255).collect();
        let out = disassemble(&bytes);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_truncated_instruction_stops() {
        let bytes = vec![Opcode::Pop as u8, Opcode::Constant as u8, 0];
        let out = disassemble(&bytes);
        assert_eq!(out.lines().count(), 2);
        assert!(out.starts_with("0000 OpPop\n0001 ERROR: OpConstant"));
    }

    #[test]
    fn test_render_bytecode_lists_functions() {
        let func = CompiledFunction {
            instructions: Instructions::concat(vec![
                make(Opcode::GetLocal, &[0]),
                make(Opcode::ReturnValue, &[]),
            ]),
            num_locals: 1,
            num_parameters: 1,
        };
        let bc = Bytecode {
            instructions: Instructions::concat(vec![
                make(Opcode::Closure, &[1, 0]),
                make(Opcode::Pop, &[]),
            ]),
            constants: vec![Object::from("hi"), Object::CompiledFunction(Rc::new(func))],
        };

        let out = render_bytecode(&bc);
        assert!(out.contains(" main\n 5 bytes\n"));
        assert!(out.contains("0000 OpClosure 1 0\n0004 OpPop\n"));
        assert!(out.contains("  [0] \"hi\"\n  [1] <fn#1>\n"));
        assert!(out.contains(" fn#1 (params 1, locals 1)\n"));
        assert!(out.contains("0000 OpGetLocal 0\n0002 OpReturnValue\n"));
    }
}
