//! CK-022: The recipe opcode interpreter.
//!
//! A stack machine over [`OpcodeList`] programs. The context owns a call
//! stack of frames and a value stack of word lists. When a program reaches
//! a command it *suspends*: [`OpcodeContext::run`] returns
//! [`Step::Suspended`] with the command, the caller runs it however it
//! likes, then hands the exit status to [`OpcodeContext::resume`] and calls
//! `run` again. The interpreter itself never blocks.
//!
//! Broken opcode streams (value stack underflow, jumps out of range,
//! unbalanced frames) are compiler bugs. They come back as
//! [`CookError::Invariant`] and the whole run stops.

use super::diag::{Diagnostics, SubContext};
use super::error::CookError;
use super::flags::MatchMode;
use super::fs::FileSystem;
use super::id::{CallEnv, Id, Invoke};
use super::matcher::{Captures, CompiledPattern, MatchMethod};
use super::opcode::{Opcode, OpcodeList};
use super::pool::{Istr, StrList, StringPool};
use super::position::ExprPosition;
use super::symtab::SymbolTable;
use std::sync::Arc;

/// User function nesting limit.
const MAX_CALL_DEPTH: usize = 256;

/// Shared, read-only services a context runs against.
pub struct Env<'a> {
    pub pool: &'a StringPool,
    pub globals: &'a SymbolTable<Id>,
    pub diag: &'a Diagnostics,
    pub fs: &'a dyn FileSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    /// 0 for success, -1 for failure.
    pub fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Failure => -1,
        }
    }
}

/// An external command the program is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: String,
    pub pos: ExprPosition,
    pub silent: bool,
    pub errok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Finished(Status),
    Suspended(CommandRequest),
}

#[derive(Debug)]
struct Frame {
    program: Arc<OpcodeList>,
    pc: usize,
    locals: Vec<Istr>,
    value_base: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunState {
    Ready,
    Running,
    Suspended(CommandRequest),
    Finished(Status),
}

#[derive(Debug)]
pub struct OpcodeContext {
    call_stack: Vec<Frame>,
    value_stack: Vec<StrList>,
    thread: SymbolTable<Id>,
    matched: Option<(Arc<CompiledPattern>, Captures)>,
    match_mode: MatchMode,
    errok: bool,
    state: RunState,
    result: Option<StrList>,
    program_name: String,
}

impl OpcodeContext {
    pub fn new(program: Arc<OpcodeList>) -> Self {
        let program_name = program.name.clone();
        Self {
            call_stack: vec![Frame {
                program,
                pc: 0,
                locals: Vec::new(),
                value_base: 0,
            }],
            value_stack: Vec::new(),
            thread: SymbolTable::new(),
            matched: None,
            match_mode: MatchMode::Cook,
            errok: false,
            state: RunState::Ready,
            result: None,
            program_name,
        }
    }

    /// Captures used to fill `%` placeholders in pattern words. A literal
    /// target binds nothing, so its programs keep such words as written.
    pub fn with_match(mut self, pattern: Arc<CompiledPattern>, captures: Captures) -> Self {
        self.match_mode = pattern.mode();
        if pattern.literal().is_none() {
            self.matched = Some((pattern, captures));
        }
        self
    }

    /// Recipe-level errok: failed commands do not fail the program.
    pub fn with_errok(mut self, errok: bool) -> Self {
        self.errok = errok;
        self
    }

    /// Bind a variable visible to the whole program.
    pub fn bind(&mut self, name: Istr, value: StrList) {
        self.thread.assign(name, Id::Variable(value));
    }

    /// Value left by the outermost `Return`.
    pub fn take_result(&mut self) -> Option<StrList> {
        self.result.take()
    }

    fn fault(&self, message: &str) -> CookError {
        match self.call_stack.last() {
            Some(f) => CookError::invariant(&f.program.name, f.pc.saturating_sub(1), message),
            None => CookError::invariant(&self.program_name, 0, message),
        }
    }

    fn base(&self) -> usize {
        self.call_stack.last().map_or(0, |f| f.value_base)
    }

    fn pop(&mut self) -> Result<StrList, CookError> {
        if self.value_stack.len() <= self.base() {
            return Err(self.fault("value stack underflow"));
        }
        self.value_stack
            .pop()
            .ok_or_else(|| self.fault("value stack underflow"))
    }

    fn top_mut(&mut self) -> Result<&mut StrList, CookError> {
        if self.value_stack.len() <= self.base() {
            return Err(self.fault("value stack underflow"));
        }
        let last = self.value_stack.len() - 1;
        Ok(&mut self.value_stack[last])
    }

    fn unwind_frame(&mut self, frame: &Frame) {
        for name in frame.locals.iter().rev() {
            self.thread.pop(name);
        }
    }

    /// Abandon the program. Locals are unwound so the thread table is left
    /// as the caller set it up.
    fn fail(&mut self) -> Step {
        while let Some(frame) = self.call_stack.pop() {
            self.unwind_frame(&frame);
        }
        self.value_stack.clear();
        self.state = RunState::Finished(Status::Failure);
        Step::Finished(Status::Failure)
    }

    fn lookup(&self, name: &Istr, env: &Env<'_>) -> Option<Id> {
        self.thread
            .query(name)
            .or_else(|| env.globals.query(name))
            .cloned()
    }

    /// Step until the program finishes or suspends on a command.
    pub fn run(&mut self, env: &Env<'_>) -> Result<Step, CookError> {
        if let RunState::Finished(status) = self.state {
            return Ok(Step::Finished(status));
        }
        if matches!(self.state, RunState::Suspended(_)) {
            return Err(self.fault("run while suspended on a command"));
        }
        self.state = RunState::Running;
        loop {
            let (program, pc) = match self.call_stack.last_mut() {
                Some(frame) => {
                    let pc = frame.pc;
                    frame.pc += 1;
                    (Arc::clone(&frame.program), pc)
                }
                None => return Err(self.fault("no frame to execute")),
            };
            let Some(op) = program.ops.get(pc) else {
                return Err(self.fault("program counter ran past the end without return"));
            };
            match op {
                Opcode::Push => self.value_stack.push(StrList::new()),
                Opcode::Literal(word) => self.top_mut()?.push(word.clone()),
                Opcode::Pattern(word) => {
                    let filled = match &self.matched {
                        Some((pattern, caps)) => pattern.reconstruct_rhs(word.as_str(), caps),
                        None => Ok(word.to_string()),
                    };
                    match filled {
                        Ok(text) => {
                            let w = env.pool.intern(&text);
                            self.top_mut()?.push(w);
                        }
                        Err(msg) => {
                            let mut scp = SubContext::new();
                            scp.set_string("MeSsaGe", msg);
                            env.diag.report(None, &scp, "$message");
                            return Ok(self.fail());
                        }
                    }
                }
                Opcode::Call { pos } => {
                    let mut args = self.pop()?;
                    if args.is_empty() {
                        env.diag
                            .report(Some(pos), &SubContext::new(), "empty substitution []");
                        return Ok(self.fail());
                    }
                    let name = args.0.remove(0);
                    let Some(id) = self.lookup(&name, env) else {
                        let mut scp = SubContext::new();
                        scp.set_string("Name", name.as_str());
                        env.diag
                            .report(Some(pos), &scp, "the \"$name\" variable is undefined");
                        return Ok(self.fail());
                    };
                    let invoked = {
                        let defined = |n: &Istr| self.thread.contains(n) || env.globals.contains(n);
                        let call_env = CallEnv {
                            pool: env.pool,
                            fs: env.fs,
                            defined: &defined,
                            mode: self.match_mode,
                        };
                        id.interpret(&name, &args, &call_env)
                    };
                    match invoked {
                        Ok(Invoke::Value(value)) => self.value_stack.push(value),
                        Ok(Invoke::Enter(callee)) => {
                            if self.call_stack.len() >= MAX_CALL_DEPTH {
                                let mut scp = SubContext::new();
                                scp.set_string("Name", name.as_str());
                                env.diag
                                    .report(Some(pos), &scp, "function \"$name\" nests too deeply");
                                return Ok(self.fail());
                            }
                            let arg = env.pool.intern("arg");
                            self.thread.push(arg.clone(), Id::Variable(args));
                            self.call_stack.push(Frame {
                                program: callee,
                                pc: 0,
                                locals: vec![arg],
                                value_base: self.value_stack.len(),
                            });
                        }
                        Err(msg) => {
                            let mut scp = SubContext::new();
                            scp.set_string("MeSsaGe", msg);
                            env.diag.report(Some(pos), &scp, "$message");
                            return Ok(self.fail());
                        }
                    }
                }
                Opcode::Append => {
                    let top = self.pop()?;
                    self.top_mut()?.append(&top);
                }
                Opcode::Catenate => {
                    let right = self.pop()?;
                    let pool = env.pool;
                    let left = self.top_mut()?;
                    catenate(pool, left, right);
                }
                Opcode::Assign { pos, local } => {
                    let value = self.pop()?;
                    let names = self.pop()?;
                    let Some(name) = names.first().cloned() else {
                        env.diag.report(
                            Some(pos),
                            &SubContext::new(),
                            "assignment needs a variable name",
                        );
                        return Ok(self.fail());
                    };
                    if *local {
                        self.thread.push(name.clone(), Id::Variable(value));
                        if let Some(frame) = self.call_stack.last_mut() {
                            frame.locals.push(name);
                        }
                    } else {
                        self.thread.assign(name, Id::Variable(value));
                    }
                }
                Opcode::Command { pos, errok, silent } => {
                    let words = self.pop()?;
                    if words.is_empty() {
                        continue;
                    }
                    let request = CommandRequest {
                        command: words.join(" "),
                        pos: pos.clone(),
                        silent: *silent,
                        errok: *errok || self.errok,
                    };
                    self.state = RunState::Suspended(request.clone());
                    return Ok(Step::Suspended(request));
                }
                Opcode::Jump(target) => self.jump(*target, program.len())?,
                Opcode::JumpFalse(target) => {
                    let cond = self.pop()?;
                    if !cond.is_true() {
                        self.jump(*target, program.len())?;
                    }
                }
                Opcode::Fail { pos } => {
                    let msg = self.pop()?;
                    let mut scp = SubContext::new();
                    scp.set_string("MeSsaGe", msg.join(" "));
                    env.diag.report(Some(pos), &scp, "$message");
                    return Ok(self.fail());
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Return => {
                    let base = self.base();
                    let result = if self.value_stack.len() > base {
                        self.pop()?
                    } else {
                        StrList::new()
                    };
                    if self.value_stack.len() != base {
                        return Err(self.fault("unbalanced frame at return"));
                    }
                    let Some(frame) = self.call_stack.pop() else {
                        return Err(self.fault("return with no frame"));
                    };
                    self.unwind_frame(&frame);
                    if self.call_stack.is_empty() {
                        self.result = Some(result);
                        self.state = RunState::Finished(Status::Success);
                        return Ok(Step::Finished(Status::Success));
                    }
                    self.value_stack.push(result);
                }
            }
        }
    }

    fn jump(&mut self, target: usize, len: usize) -> Result<(), CookError> {
        if target >= len {
            return Err(self.fault(&format!("jump to {} outside program of {}", target, len)));
        }
        if let Some(frame) = self.call_stack.last_mut() {
            frame.pc = target;
        }
        Ok(())
    }

    /// Deliver the exit status of the command the program suspended on.
    pub fn resume(&mut self, exit_status: i32, env: &Env<'_>) -> Result<(), CookError> {
        let RunState::Suspended(request) = &self.state else {
            return Err(self.fault("resume without a pending command"));
        };
        if exit_status == 0 || request.errok {
            self.state = RunState::Running;
            return Ok(());
        }
        let mut scp = SubContext::new();
        scp.set_string("Command", request.command.as_str());
        scp.set_long("Number", i64::from(exit_status));
        let pos = request.pos.clone();
        env.diag
            .report(Some(&pos), &scp, "command \"$command\" exit status $number");
        self.fail();
        Ok(())
    }

    /// Run an expression program to completion. Commands are not allowed.
    /// `Ok(None)` means the expression failed (already reported).
    pub fn evaluate(mut self, env: &Env<'_>) -> Result<Option<StrList>, CookError> {
        match self.run(env)? {
            Step::Finished(Status::Success) => Ok(Some(self.take_result().unwrap_or_default())),
            Step::Finished(Status::Failure) => Ok(None),
            Step::Suspended(_) => Err(self.fault("command inside an expression")),
        }
    }
}

/// Glue `right` onto `left`: the last word of `left` and the first word of
/// `right` become one word.
fn catenate(pool: &StringPool, left: &mut StrList, right: StrList) {
    let mut rest = right.0.into_iter();
    match (left.0.pop(), rest.next()) {
        (Some(l), Some(r)) => left.push(pool.intern(&format!("{}{}", l, r))),
        (Some(l), None) => left.push(l),
        (None, Some(r)) => left.push(r),
        (None, None) => {}
    }
    left.0.extend(rest);
}
