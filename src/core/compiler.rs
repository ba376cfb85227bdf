//! CK-023: Expression and statement compiler.
//!
//! Turns cookbook text into [`OpcodeList`] programs. An expression is a
//! list of whitespace-separated words. Inside a word, `[name args...]` is a
//! substitution and `"..."` quotes text; pieces written next to each other
//! are glued into one word. Unquoted text holding match placeholders
//! compiles to a pattern word, filled from the captures at run time.

use super::error::CookError;
use super::flags::MatchMode;
use super::matcher;
use super::opcode::{Opcode, OpcodeList};
use super::pool::StringPool;
use super::position::ExprPosition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Statements
// ============================================================================

/// One statement of a recipe body. A bare string is a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Statement {
    Command(String),
    Full(CommandStmt),
    Set(SetStmt),
    Local(LocalStmt),
    Fail(FailStmt),
    If(IfStmt),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandStmt {
    pub command: String,
    #[serde(default)]
    pub errok: bool,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetStmt {
    pub set: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalStmt {
    pub local: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailStmt {
    pub fail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IfStmt {
    #[serde(rename = "if")]
    pub cond: String,
    #[serde(default)]
    pub then: Vec<Statement>,
    #[serde(default, rename = "else")]
    pub otherwise: Vec<Statement>,
}

// ============================================================================
// Expression syntax
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text { text: String, quoted: bool },
    Sub(Vec<Word>),
}

type Word = Vec<Piece>;

struct Scanner<'s> {
    chars: Vec<char>,
    at: usize,
    source: &'s str,
}

impl<'s> Scanner<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            chars: source.chars().collect(),
            at: 0,
            source,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.at).copied()
    }

    fn error(&self, message: &str) -> String {
        format!("{} in \"{}\" at column {}", message, self.source, self.at + 1)
    }

    /// Words up to the end of input, or up to the `]` closing a substitution.
    fn list(&mut self, nested: bool) -> Result<Vec<Word>, String> {
        let mut words = Vec::new();
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.at += 1;
            }
            match self.peek() {
                None if nested => return Err(self.error("unterminated [")),
                None => return Ok(words),
                Some(']') if nested => {
                    self.at += 1;
                    return Ok(words);
                }
                Some(']') => return Err(self.error("unexpected ]")),
                Some(_) => words.push(self.word()?),
            }
        }
    }

    fn word(&mut self) -> Result<Word, String> {
        let mut pieces = Vec::new();
        loop {
            match self.peek() {
                None | Some(']') => break,
                Some(c) if c.is_whitespace() => break,
                Some('[') => {
                    self.at += 1;
                    pieces.push(Piece::Sub(self.list(true)?));
                }
                Some('"') => {
                    self.at += 1;
                    pieces.push(Piece::Text {
                        text: self.quoted()?,
                        quoted: true,
                    });
                }
                Some(_) => pieces.push(Piece::Text {
                    text: self.bare(),
                    quoted: false,
                }),
            }
        }
        Ok(pieces)
    }

    fn quoted(&mut self) -> Result<String, String> {
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('"') => {
                    self.at += 1;
                    return Ok(text);
                }
                Some('\\') if matches!(self.chars.get(self.at + 1), Some('"' | '\\')) => {
                    text.push(self.chars[self.at + 1]);
                    self.at += 2;
                }
                Some(c) => {
                    text.push(c);
                    self.at += 1;
                }
            }
        }
    }

    /// Unquoted text. A backslash escapes a bracket, a quote or a blank;
    /// any other backslash is kept, so regex references like `\1` survive.
    fn bare(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '[' | ']' | '"') {
                break;
            }
            if c == '\\' {
                if let Some(&next) = self.chars.get(self.at + 1) {
                    if next.is_whitespace() || matches!(next, '[' | ']' | '"') {
                        text.push(next);
                        self.at += 2;
                        continue;
                    }
                }
            }
            text.push(c);
            self.at += 1;
        }
        text
    }
}

fn parse(text: &str) -> Result<Vec<Word>, String> {
    Scanner::new(text).list(false)
}

// ============================================================================
// Code generation
// ============================================================================

/// Compiles programs for one cookbook location and match mode.
pub struct Compiler<'a> {
    pool: &'a StringPool,
    mode: MatchMode,
    pos: ExprPosition,
}

impl<'a> Compiler<'a> {
    pub fn new(pool: &'a StringPool, mode: MatchMode, pos: ExprPosition) -> Self {
        Self { pool, mode, pos }
    }

    fn syntax(&self, message: String) -> CookError {
        CookError::Cookbook(format!("{}: {}", self.pos, message))
    }

    /// An expression program: leaves the word list as its result.
    pub fn expression(&self, name: &str, text: &str) -> Result<OpcodeList, CookError> {
        let words = parse(text).map_err(|m| self.syntax(m))?;
        let mut prog = OpcodeList::new(name);
        prog.emit(Opcode::Push);
        self.words(&mut prog, &words);
        prog.emit(Opcode::Return);
        Ok(prog)
    }

    /// A statement program. Its result is always empty.
    pub fn body(&self, name: &str, stmts: &[Statement]) -> Result<OpcodeList, CookError> {
        let mut prog = OpcodeList::new(name);
        for stmt in stmts {
            self.statement(&mut prog, stmt)?;
        }
        prog.emit(Opcode::Push);
        prog.emit(Opcode::Return);
        Ok(prog)
    }

    fn statement(&self, prog: &mut OpcodeList, stmt: &Statement) -> Result<(), CookError> {
        match stmt {
            Statement::Command(text) => self.command(prog, text, false, false),
            Statement::Full(c) => self.command(prog, &c.command, c.errok, c.silent),
            Statement::Set(s) => self.assignments(prog, &s.set, false),
            Statement::Local(s) => self.assignments(prog, &s.local, true),
            Statement::Fail(f) => {
                self.list(prog, &f.fail)?;
                prog.emit(Opcode::Fail {
                    pos: self.pos.clone(),
                });
                Ok(())
            }
            Statement::If(s) => {
                self.list(prog, &s.cond)?;
                let to_else = prog.emit(Opcode::JumpFalse(0));
                for st in &s.then {
                    self.statement(prog, st)?;
                }
                let to_end = prog.emit(Opcode::Jump(0));
                let else_at = prog.here();
                prog.patch(to_else, else_at);
                for st in &s.otherwise {
                    self.statement(prog, st)?;
                }
                let end = prog.here();
                prog.patch(to_end, end);
                Ok(())
            }
        }
    }

    fn command(
        &self,
        prog: &mut OpcodeList,
        text: &str,
        errok: bool,
        silent: bool,
    ) -> Result<(), CookError> {
        self.list(prog, text)?;
        prog.emit(Opcode::Command {
            pos: self.pos.clone(),
            errok,
            silent,
        });
        Ok(())
    }

    fn assignments(
        &self,
        prog: &mut OpcodeList,
        vars: &IndexMap<String, String>,
        local: bool,
    ) -> Result<(), CookError> {
        for (name, value) in vars {
            prog.emit(Opcode::Push);
            prog.emit(Opcode::Literal(self.pool.intern(name)));
            self.list(prog, value)?;
            prog.emit(Opcode::Assign {
                pos: self.pos.clone(),
                local,
            });
        }
        Ok(())
    }

    /// Push a new list holding the words of `text`.
    fn list(&self, prog: &mut OpcodeList, text: &str) -> Result<(), CookError> {
        let words = parse(text).map_err(|m| self.syntax(m))?;
        prog.emit(Opcode::Push);
        self.words(prog, &words);
        Ok(())
    }

    /// Append `words` to the list on top of the stack.
    fn words(&self, prog: &mut OpcodeList, words: &[Word]) {
        for word in words {
            match word.as_slice() {
                [] => {}
                [single] => self.piece(prog, single, false),
                [first, rest @ ..] => {
                    // glue inside a fresh list so an empty substitution
                    // never joins onto the previous word
                    prog.emit(Opcode::Push);
                    self.piece(prog, first, false);
                    for p in rest {
                        self.piece(prog, p, true);
                    }
                    prog.emit(Opcode::Append);
                }
            }
        }
    }

    fn piece(&self, prog: &mut OpcodeList, piece: &Piece, glue: bool) {
        if glue {
            prog.emit(Opcode::Push);
        }
        match piece {
            Piece::Text { text, quoted } => {
                let word = self.pool.intern(text);
                if !quoted && matcher::placeholders_used(self.mode, text) != 0 {
                    prog.emit(Opcode::Pattern(word));
                } else {
                    prog.emit(Opcode::Literal(word));
                }
            }
            Piece::Sub(inner) => {
                prog.emit(Opcode::Push);
                self.words(prog, inner);
                prog.emit(Opcode::Call {
                    pos: self.pos.clone(),
                });
                if !glue {
                    prog.emit(Opcode::Append);
                }
            }
        }
        if glue {
            prog.emit(Opcode::Catenate);
        }
    }
}

/// Placeholder slots an expression refers to, one bit per slot. Quoted
/// text does not count. Unparsable text refers to nothing.
pub fn expression_placeholders(mode: MatchMode, text: &str) -> u16 {
    fn walk(mode: MatchMode, words: &[Word]) -> u16 {
        let mut mask = 0;
        for piece in words.iter().flatten() {
            mask |= match piece {
                Piece::Text {
                    text,
                    quoted: false,
                } => matcher::placeholders_used(mode, text),
                Piece::Text { .. } => 0,
                Piece::Sub(inner) => walk(mode, inner),
            };
        }
        mask
    }
    parse(text).map_or(0, |words| walk(mode, &words))
}
