//! CK-020: Opcodes of the recipe stack machine.
//!
//! The value stack holds word lists. A typical expression `cc -c [src]`
//! compiles to `Push; Literal cc; Literal -c; Push; Literal src; Call; Append`.

use super::pool::Istr;
use super::position::ExprPosition;
use std::fmt;

#[derive(Debug, Clone)]
pub enum Opcode {
    /// Push an empty list.
    Push,
    /// Append one word to the top list.
    Literal(Istr),
    /// Append one word after filling its match placeholders.
    Pattern(Istr),
    /// Pop `[name args...]`, call it, push the result.
    Call { pos: ExprPosition },
    /// Pop the top list and append it to the list beneath.
    Append,
    /// Pop the top list and glue it onto the list beneath: the last word
    /// below and the first word on top become one word.
    Catenate,
    /// Pop a value, pop a name list, bind the variable.
    Assign { pos: ExprPosition, local: bool },
    /// Pop a word list and run it as an external command.
    Command {
        pos: ExprPosition,
        errok: bool,
        silent: bool,
    },
    Jump(usize),
    /// Pop a list; jump if it is false.
    JumpFalse(usize),
    /// Pop a message and fail the program.
    Fail { pos: ExprPosition },
    Pop,
    /// Pop the result and leave the current frame.
    Return,
}

/// A compiled body, precondition or expression.
#[derive(Debug, Clone)]
pub struct OpcodeList {
    pub name: String,
    pub ops: Vec<Opcode>,
}

impl OpcodeList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    /// Append an opcode, returning its address.
    pub fn emit(&mut self, op: Opcode) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Address the next emitted opcode will get.
    pub fn here(&self) -> usize {
        self.ops.len()
    }

    /// Point a previously emitted jump at `target`.
    pub fn patch(&mut self, at: usize, target: usize) {
        match self.ops.get_mut(at) {
            Some(Opcode::Jump(t)) | Some(Opcode::JumpFalse(t)) => *t = target,
            _ => {}
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// True when the program does nothing but return an empty list.
    pub fn is_trivial(&self) -> bool {
        matches!(self.ops.as_slice(), [] | [Opcode::Push, Opcode::Return])
    }
}

impl fmt::Display for OpcodeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for (pc, op) in self.ops.iter().enumerate() {
            let text = match op {
                Opcode::Push => "push".to_string(),
                Opcode::Literal(s) => format!("literal {:?}", s.as_str()),
                Opcode::Pattern(s) => format!("pattern {:?}", s.as_str()),
                Opcode::Call { .. } => "call".to_string(),
                Opcode::Append => "append".to_string(),
                Opcode::Catenate => "catenate".to_string(),
                Opcode::Assign { local, .. } => {
                    if *local { "assign local" } else { "assign" }.to_string()
                }
                Opcode::Command { errok, silent, .. } => {
                    format!("command errok={} silent={}", errok, silent)
                }
                Opcode::Jump(t) => format!("jump {}", t),
                Opcode::JumpFalse(t) => format!("jump-false {}", t),
                Opcode::Fail { .. } => "fail".to_string(),
                Opcode::Pop => "pop".to_string(),
                Opcode::Return => "return".to_string(),
            };
            writeln!(f, "  {:4}  {}", pc, text)?;
        }
        Ok(())
    }
}
