//! A small in-process IR with the same shape as the LLVM subset the lowering
//! uses: functions of doubles made of basic blocks, stack slots, calls and
//! conditional branches.
//!
//! Functions and instructions live in arenas and are addressed by index.
//! Deleting a function only marks it, so handles held elsewhere never dangle.

mod builder;
mod display;
mod engine;
mod passes;

pub use self::builder::{BlockRef, Builder};
pub use self::display::format_real;
pub use self::engine::{ExecutionEngine, DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_STEPS};
pub use self::passes::{Pass, PassManager};

use crate::codegen::{ArithOp, RealPredicate};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(usize);

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Const(f64),
    Param(usize),
    Inst(InstId),
    /// What the builder hands back for an instruction it had nowhere to put.
    Undef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Arith(ArithOp, Value, Value),
    FCmp(RealPredicate, Value, Value),
    BoolToReal(Value),
    Call(FuncId, Vec<Value>),
    Alloca,
    Load(Value),
    /// Value, then slot.
    Store(Value, Value),
    Br(BlockId),
    CondBr(Value, BlockId, BlockId),
    Ret(Value),
}

impl InstKind {
    pub fn operands(&self) -> Vec<Value> {
        match self {
            InstKind::Arith(_, l, r) | InstKind::FCmp(_, l, r) | InstKind::Store(l, r) => {
                vec![*l, *r]
            }
            InstKind::BoolToReal(v) | InstKind::Load(v) | InstKind::Ret(v) => vec![*v],
            InstKind::CondBr(c, _, _) => vec![*c],
            InstKind::Call(_, args) => args.clone(),
            InstKind::Alloca | InstKind::Br(_) => vec![],
        }
    }

    fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            InstKind::Arith(_, l, r) | InstKind::FCmp(_, l, r) | InstKind::Store(l, r) => {
                vec![l, r]
            }
            InstKind::BoolToReal(v) | InstKind::Load(v) | InstKind::Ret(v) => vec![v],
            InstKind::CondBr(c, _, _) => vec![c],
            InstKind::Call(_, args) => args.iter_mut().collect(),
            InstKind::Alloca | InstKind::Br(_) => vec![],
        }
    }

    pub fn is_terminator(&self) -> bool {
        match self {
            InstKind::Br(_) | InstKind::CondBr(..) | InstKind::Ret(_) => true,
            _ => false,
        }
    }

    /// Whether the instruction names a value other instructions can use.
    pub fn produces_value(&self) -> bool {
        match self {
            InstKind::Store(..) | InstKind::Br(_) | InstKind::CondBr(..) | InstKind::Ret(_) => {
                false
            }
            _ => true,
        }
    }

    /// Whether removing an unused instance changes nothing observable.
    pub fn is_pure(&self) -> bool {
        match self {
            InstKind::Arith(..)
            | InstKind::FCmp(..)
            | InstKind::BoolToReal(_)
            | InstKind::Alloca
            | InstKind::Load(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inst {
    pub kind: InstKind,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    insts: Vec<Inst>,
    blocks: Vec<Block>,
    layout: Vec<BlockId>,
    deleted: bool,
}

impl Function {
    fn new(name: String, params: Vec<String>) -> Function {
        Function {
            name,
            params,
            insts: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            deleted: false,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().cloned()
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    /// Blocks in layout order.
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    /// Instructions reachable through the layout, in layout order.
    pub fn live_insts(&self) -> Vec<InstId> {
        self.layout
            .iter()
            .flat_map(|b| self.blocks[b.0].insts.iter().cloned())
            .collect()
    }

    pub fn use_counts(&self) -> HashMap<InstId, usize> {
        let mut counts = HashMap::new();
        for id in self.live_insts() {
            for op in self.insts[id.0].kind.operands() {
                if let Value::Inst(used) = op {
                    *counts.entry(used).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    pub fn replace_all_uses(&mut self, from: InstId, to: Value) {
        for inst in &mut self.insts {
            for op in inst.kind.operands_mut() {
                if *op == Value::Inst(from) {
                    *op = to;
                }
            }
        }
    }

    /// Unlinks instructions from their blocks. Their arena entries stay.
    fn remove_insts(&mut self, dead: &[InstId]) {
        for block in &mut self.blocks {
            block.insts.retain(|id| !dead.contains(id));
        }
    }
}

/// A compilation unit's functions.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    functions: Vec<Function>,
    next_anonymous: usize,
}

impl Module {
    pub fn new(name: &str) -> Module {
        Module {
            name: name.to_owned(),
            functions: Vec::new(),
            next_anonymous: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` once the function has been deleted.
    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.0).filter(|f| !f.deleted)
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| !f.deleted && f.name == name)
            .map(FuncId)
    }

    /// Live functions in creation order.
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.deleted)
            .map(|(i, f)| (FuncId(i), f))
    }

    /// Adds a declaration. An empty name is replaced with the next free
    /// number, which no identifier can collide with.
    pub fn add_function(&mut self, name: &str, params: &[String]) -> FuncId {
        let name = if name.is_empty() {
            let n = self.next_anonymous;
            self.next_anonymous += 1;
            n.to_string()
        } else {
            name.to_owned()
        };
        self.functions.push(Function::new(name, params.to_vec()));
        FuncId(self.functions.len() - 1)
    }

    pub fn remove_function(&mut self, id: FuncId) {
        if let Some(f) = self.functions.get_mut(id.0) {
            f.deleted = true;
        }
    }

    fn raw(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    fn raw_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_anonymous_names() {
        let mut m = Module::new("m");
        let a = m.add_function("", &[]);
        let f = m.add_function("f", &["x".to_owned()]);
        let b = m.add_function("", &[]);
        assert_eq!(m.function(a).unwrap().name, "0");
        assert_eq!(m.function(b).unwrap().name, "1");
        assert_eq!(m.get_function("f"), Some(f));
        assert!(m.function(f).unwrap().is_declaration());
    }

    #[test]
    fn test_remove_function() {
        let mut m = Module::new("m");
        let f = m.add_function("f", &[]);
        m.remove_function(f);
        assert!(m.function(f).is_none());
        assert_eq!(m.get_function("f"), None);
        assert_eq!(m.functions().count(), 0);

        let g = m.add_function("f", &[]);
        assert_ne!(f, g);
        assert_eq!(m.get_function("f"), Some(g));
    }
}
