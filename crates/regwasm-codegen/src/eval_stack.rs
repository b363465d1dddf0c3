//! Symbolic operand stack.
//!
//! Mirrors the WebAssembly validation stack at compile time. Every entry is
//! the register holding a value; scope-limit sentinels delimit the values
//! that belong to each enclosing block.

use regwasm_types::{CompileError, CompileResult, ErrorKind, Reg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Value(Reg),
    Limit,
}

#[derive(Debug, Clone, Default)]
pub struct EvalStack {
    entries: Vec<Entry>,
}

impl EvalStack {
    pub fn push(&mut self, reg: Reg) {
        self.entries.push(Entry::Value(reg));
    }

    /// Pop the top value. Popping across a scope limit is an underflow.
    pub fn pop(&mut self) -> CompileResult<Reg> {
        match self.entries.last() {
            Some(Entry::Value(reg)) => {
                let reg = *reg;
                self.entries.pop();
                Ok(reg)
            }
            _ => Err(CompileError::new(
                ErrorKind::StackUnderflow,
                "operand stack underflow",
            )),
        }
    }

    pub fn enter_scope(&mut self) {
        self.entries.push(Entry::Limit);
    }

    /// Remove the innermost scope limit. Values left above it are an error.
    pub fn exit_scope(&mut self) -> CompileResult<()> {
        let residual = self.scope_len();
        if residual > 0 {
            return Err(CompileError::new(
                ErrorKind::NonEmptyStackAtScopeExit,
                format!("{residual} value(s) left on the operand stack at end of block"),
            ));
        }
        match self.entries.pop() {
            Some(Entry::Limit) => Ok(()),
            _ => Err(CompileError::new(
                ErrorKind::StackUnderflow,
                "no open scope on the operand stack",
            )),
        }
    }

    /// Remove every value of the innermost scope, returning their registers.
    pub fn drain_scope(&mut self) -> Vec<Reg> {
        let start = self.entries.len() - self.scope_len();
        self.entries
            .drain(start..)
            .filter_map(|e| match e {
                Entry::Value(reg) => Some(reg),
                Entry::Limit => None,
            })
            .collect()
    }

    /// Number of values above the innermost scope limit.
    pub fn scope_len(&self) -> usize {
        self.entries
            .iter()
            .rev()
            .take_while(|e| matches!(e, Entry::Value(_)))
            .count()
    }

    /// Every value on the stack, across all scopes.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Reg> {
        self.entries.iter_mut().filter_map(|e| match e {
            Entry::Value(reg) => Some(reg),
            Entry::Limit => None,
        })
    }
}
