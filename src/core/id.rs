//! CK-021: Names the interpreter can call.
//!
//! `[name args...]` resolves `name` to an [`Id`]: a variable, a user
//! function compiled from the cookbook, or a builtin. Each variant has one
//! evaluation entry point, [`Id::interpret`].

use super::flags::MatchMode;
use super::fs::{parent_dir, FileSystem};
use super::matcher::{self, MatchMethod};
use super::opcode::OpcodeList;
use super::pool::{Istr, StrList, StringPool};
use super::position::ExprPosition;
use std::sync::Arc;

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Istr,
    pub program: Arc<OpcodeList>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Not,
    And,
    Or,
    In,
    Exists,
    Defined,
    Count,
    Head,
    Tail,
    Join,
    Prepost,
    Fromto,
    Dirname,
    Entryname,
    Match,
    Filter,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("not", Builtin::Not),
    ("and", Builtin::And),
    ("or", Builtin::Or),
    ("in", Builtin::In),
    ("exists", Builtin::Exists),
    ("defined", Builtin::Defined),
    ("count", Builtin::Count),
    ("head", Builtin::Head),
    ("tail", Builtin::Tail),
    ("join", Builtin::Join),
    ("prepost", Builtin::Prepost),
    ("fromto", Builtin::Fromto),
    ("dirname", Builtin::Dirname),
    ("entryname", Builtin::Entryname),
    ("match", Builtin::Match),
    ("filter", Builtin::Filter),
];

#[derive(Debug, Clone)]
pub enum Id {
    Variable(StrList),
    Function(Arc<FunctionDef>),
    Builtin(Builtin),
}

/// What a call asks the interpreter to do next.
#[derive(Debug)]
pub enum Invoke {
    /// Push this value and carry on.
    Value(StrList),
    /// Run this program in a new frame with `arg` bound to the arguments.
    Enter(Arc<OpcodeList>),
}

/// What builtins may look at.
pub struct CallEnv<'a> {
    pub pool: &'a StringPool,
    pub fs: &'a dyn FileSystem,
    pub defined: &'a dyn Fn(&Istr) -> bool,
    pub mode: MatchMode,
}

impl Id {
    pub fn interpret(&self, name: &Istr, args: &StrList, env: &CallEnv<'_>) -> Result<Invoke, String> {
        match self {
            Id::Variable(value) => {
                if !args.is_empty() {
                    return Err(format!("variable \"{}\" references no arguments", name));
                }
                Ok(Invoke::Value(value.clone()))
            }
            Id::Function(def) => Ok(Invoke::Enter(Arc::clone(&def.program))),
            Id::Builtin(b) => b.call(args, env).map(Invoke::Value),
        }
    }
}

fn truth(pool: &StringPool, b: bool) -> StrList {
    if b {
        StrList(vec![pool.intern("1")])
    } else {
        StrList::new()
    }
}

fn need_args(name: &str, args: &StrList, n: usize) -> Result<(), String> {
    if args.len() < n {
        return Err(format!("{}: requires at least {} argument(s)", name, n));
    }
    Ok(())
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTINS.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
    }

    pub fn name(self) -> &'static str {
        BUILTINS
            .iter()
            .find(|(_, b)| *b == self)
            .map_or("?", |(n, _)| n)
    }

    pub fn all() -> impl Iterator<Item = (&'static str, Builtin)> {
        BUILTINS.iter().copied()
    }

    pub fn call(self, args: &StrList, env: &CallEnv<'_>) -> Result<StrList, String> {
        let pool = env.pool;
        let words = &args.0;
        let out = match self {
            Builtin::Not => truth(pool, !args.is_true()),
            Builtin::And => truth(pool, !words.is_empty() && words.iter().all(|w| !w.is_empty())),
            Builtin::Or => truth(pool, args.is_true()),
            Builtin::In => {
                need_args(self.name(), args, 1)?;
                truth(pool, words[1..].contains(&words[0]))
            }
            Builtin::Exists => {
                need_args(self.name(), args, 1)?;
                truth(pool, words.iter().all(|w| env.fs.exists(w.as_str())))
            }
            Builtin::Defined => {
                need_args(self.name(), args, 1)?;
                truth(pool, words.iter().all(|w| (env.defined)(w)))
            }
            Builtin::Count => StrList(vec![pool.intern(&words.len().to_string())]),
            Builtin::Head => words.first().cloned().into_iter().collect(),
            Builtin::Tail => words.iter().skip(1).cloned().collect(),
            Builtin::Join => {
                let joined: String = words.iter().map(Istr::as_str).collect();
                StrList(vec![pool.intern(&joined)])
            }
            Builtin::Prepost => {
                need_args(self.name(), args, 2)?;
                let (pre, post) = (words[0].as_str(), words[1].as_str());
                words[2..]
                    .iter()
                    .map(|w| pool.intern(&format!("{}{}{}", pre, w, post)))
                    .collect()
            }
            Builtin::Fromto => {
                need_args(self.name(), args, 2)?;
                let from = compile(env.mode, words[0].as_str())?;
                let mut out = StrList::new();
                for w in &words[2..] {
                    match from.execute(w.as_str(), pool) {
                        Some(caps) => {
                            out.push(pool.intern(&from.reconstruct_rhs(words[1].as_str(), &caps)?))
                        }
                        None => out.push(w.clone()),
                    }
                }
                out
            }
            Builtin::Dirname => words
                .iter()
                .map(|w| pool.intern(parent_dir(w.as_str()).unwrap_or(".")))
                .collect(),
            Builtin::Entryname => words
                .iter()
                .map(|w| {
                    let s = w.as_str();
                    pool.intern(s.rsplit('/').next().unwrap_or(s))
                })
                .collect(),
            Builtin::Match => {
                need_args(self.name(), args, 2)?;
                let pat = compile(env.mode, words[0].as_str())?;
                truth(pool, pat.execute(words[1].as_str(), pool).is_some())
            }
            Builtin::Filter => {
                need_args(self.name(), args, 1)?;
                let pat = compile(env.mode, words[0].as_str())?;
                words[1..]
                    .iter()
                    .filter(|w| pat.execute(w.as_str(), pool).is_some())
                    .cloned()
                    .collect()
            }
        };
        Ok(out)
    }
}

fn compile(mode: MatchMode, pattern: &str) -> Result<matcher::CompiledPattern, String> {
    matcher::compile(mode, pattern, &ExprPosition::builtin()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::MemFs;

    fn call(b: Builtin, pool: &StringPool, fs: &MemFs, words: &[&str]) -> Result<Vec<String>, String> {
        let defined = |n: &Istr| n.as_str() == "cc";
        let env = CallEnv {
            pool,
            fs,
            defined: &defined,
            mode: MatchMode::Cook,
        };
        b.call(&pool.list(words.iter().copied()), &env)
            .map(|l| l.iter().map(|w| w.to_string()).collect())
    }

    #[test]
    fn test_ck021_logic_builtins() {
        let pool = StringPool::new();
        let fs = MemFs::new();
        assert_eq!(call(Builtin::Not, &pool, &fs, &[]).unwrap(), vec!["1"]);
        assert!(call(Builtin::Not, &pool, &fs, &["x"]).unwrap().is_empty());
        assert_eq!(call(Builtin::And, &pool, &fs, &["a", "b"]).unwrap(), vec!["1"]);
        assert!(call(Builtin::And, &pool, &fs, &["a", ""]).unwrap().is_empty());
        assert_eq!(call(Builtin::Or, &pool, &fs, &["", "b"]).unwrap(), vec!["1"]);
        assert_eq!(call(Builtin::In, &pool, &fs, &["b", "a", "b"]).unwrap(), vec!["1"]);
        assert!(call(Builtin::In, &pool, &fs, &["z", "a"]).unwrap().is_empty());
        assert!(call(Builtin::In, &pool, &fs, &[]).is_err());
    }

    #[test]
    fn test_ck021_file_builtins() {
        let pool = StringPool::new();
        let fs = MemFs::new();
        fs.write("app.c", "x");
        assert_eq!(call(Builtin::Exists, &pool, &fs, &["app.c"]).unwrap(), vec!["1"]);
        assert!(call(Builtin::Exists, &pool, &fs, &["app.c", "nope"]).unwrap().is_empty());
        assert_eq!(call(Builtin::Defined, &pool, &fs, &["cc"]).unwrap(), vec!["1"]);
        assert_eq!(
            call(Builtin::Dirname, &pool, &fs, &["a/b/c.o", "d.o"]).unwrap(),
            vec!["a/b", "."]
        );
        assert_eq!(
            call(Builtin::Entryname, &pool, &fs, &["a/b/c.o", "d.o"]).unwrap(),
            vec!["c.o", "d.o"]
        );
    }

    #[test]
    fn test_ck021_list_builtins() {
        let pool = StringPool::new();
        let fs = MemFs::new();
        assert_eq!(call(Builtin::Count, &pool, &fs, &["a", "b"]).unwrap(), vec!["2"]);
        assert_eq!(call(Builtin::Head, &pool, &fs, &["a", "b"]).unwrap(), vec!["a"]);
        assert_eq!(call(Builtin::Tail, &pool, &fs, &["a", "b", "c"]).unwrap(), vec!["b", "c"]);
        assert_eq!(call(Builtin::Join, &pool, &fs, &["a", "b"]).unwrap(), vec!["ab"]);
        assert_eq!(
            call(Builtin::Prepost, &pool, &fs, &["-I", "/", "inc", "src"]).unwrap(),
            vec!["-Iinc/", "-Isrc/"]
        );
    }

    #[test]
    fn test_ck021_pattern_builtins() {
        let pool = StringPool::new();
        let fs = MemFs::new();
        assert_eq!(
            call(Builtin::Fromto, &pool, &fs, &["%.c", "%.o", "a.c", "b.h"]).unwrap(),
            vec!["a.o", "b.h"]
        );
        assert_eq!(
            call(Builtin::Filter, &pool, &fs, &["%.c", "a.c", "b.h", "c.c"]).unwrap(),
            vec!["a.c", "c.c"]
        );
        assert_eq!(call(Builtin::Match, &pool, &fs, &["%.c", "a.c"]).unwrap(), vec!["1"]);
        assert!(call(Builtin::Match, &pool, &fs, &["%1%2", "a.c"]).is_err());
    }

    #[test]
    fn test_ck021_variable_rejects_arguments() {
        let pool = StringPool::new();
        let fs = MemFs::new();
        let defined = |_: &Istr| false;
        let env = CallEnv {
            pool: &pool,
            fs: &fs,
            defined: &defined,
            mode: MatchMode::Cook,
        };
        let id = Id::Variable(pool.list(["gcc"]));
        let name = pool.intern("cc");
        assert!(matches!(
            id.interpret(&name, &StrList::new(), &env),
            Ok(Invoke::Value(v)) if v.join(" ") == "gcc"
        ));
        let err = id.interpret(&name, &pool.list(["x"]), &env).unwrap_err();
        assert_eq!(err, "variable \"cc\" references no arguments");
        assert_eq!(Builtin::from_name("prepost"), Some(Builtin::Prepost));
        assert_eq!(Builtin::Fromto.name(), "fromto");
    }
}
