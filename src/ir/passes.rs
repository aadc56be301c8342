use super::{Function, InstId, InstKind, Value};
use std::collections::{HashMap, HashSet};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Replaces a load with the value last stored to the same slot earlier in
    /// the same block.
    ForwardStores,
    /// Evaluates arithmetic and comparisons whose operands are constants.
    FoldConstants,
    /// Removes unused pure instructions, and slots that are never loaded
    /// together with their stores.
    EliminateDeadCode,
}

/// An ordered list of passes run on each function once its body is built.
#[derive(Debug, Clone, Default)]
pub struct PassManager {
    passes: Vec<Pass>,
}

impl PassManager {
    pub fn new() -> PassManager {
        PassManager::default()
    }

    pub fn standard() -> PassManager {
        PassManager {
            passes: vec![Pass::ForwardStores, Pass::FoldConstants, Pass::EliminateDeadCode],
        }
    }

    pub fn add(&mut self, pass: Pass) {
        self.passes.push(pass);
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn run(&self, func: &mut Function) -> bool {
        let mut changed = false;
        for pass in &self.passes {
            let c = match pass {
                Pass::ForwardStores => forward_stores(func),
                Pass::FoldConstants => fold_constants(func),
                Pass::EliminateDeadCode => eliminate_dead_code(func),
            };
            trace!("{:?} on {}: changed = {}", pass, func.name, c);
            changed |= c;
        }
        changed
    }
}

fn resolve(replacements: &HashMap<InstId, Value>, mut v: Value) -> Value {
    while let Value::Inst(id) = v {
        match replacements.get(&id) {
            Some(next) => v = *next,
            None => break,
        }
    }
    v
}

pub fn forward_stores(func: &mut Function) -> bool {
    let mut replacements = HashMap::new();
    for b in func.layout() {
        let mut known: HashMap<InstId, Value> = HashMap::new();
        for id in &func.block(*b).insts {
            match &func.inst(*id).kind {
                InstKind::Store(value, Value::Inst(slot)) => {
                    known.insert(*slot, resolve(&replacements, *value));
                }
                InstKind::Load(Value::Inst(slot)) => {
                    if let Some(value) = known.get(slot) {
                        replacements.insert(*id, *value);
                    }
                }
                _ => {}
            }
        }
    }

    for (from, to) in &replacements {
        let to = resolve(&replacements, *to);
        func.replace_all_uses(*from, to);
    }
    !replacements.is_empty()
}

fn constant(v: Value) -> Option<f64> {
    match v {
        Value::Const(n) => Some(n),
        _ => None,
    }
}

pub fn fold_constants(func: &mut Function) -> bool {
    let mut changed = false;
    for id in func.live_insts() {
        let folded = match &func.inst(id).kind {
            InstKind::Arith(op, l, r) => match (constant(*l), constant(*r)) {
                (Some(l), Some(r)) => Some(op.apply(l, r)),
                _ => None,
            },
            InstKind::BoolToReal(Value::Inst(cmp)) => match &func.inst(*cmp).kind {
                InstKind::FCmp(pred, l, r) => match (constant(*l), constant(*r)) {
                    (Some(l), Some(r)) => Some(if pred.apply(l, r) { 1.0 } else { 0.0 }),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        };
        if let Some(n) = folded {
            func.replace_all_uses(id, Value::Const(n));
            changed = true;
        }
    }
    changed
}

pub fn eliminate_dead_code(func: &mut Function) -> bool {
    let mut changed = false;
    loop {
        let live = func.live_insts();
        let uses = func.use_counts();

        let loaded: HashSet<InstId> = live
            .iter()
            .filter_map(|id| match func.inst(*id).kind {
                InstKind::Load(Value::Inst(slot)) => Some(slot),
                _ => None,
            })
            .collect();

        let dead: Vec<InstId> = live
            .iter()
            .cloned()
            .filter(|id| {
                let kind = &func.inst(*id).kind;
                match kind {
                    InstKind::Store(_, Value::Inst(slot)) => {
                        func.inst(*slot).kind == InstKind::Alloca && !loaded.contains(slot)
                    }
                    _ => kind.is_pure() && uses.get(id).cloned().unwrap_or(0) == 0,
                }
            })
            .collect();

        if dead.is_empty() {
            return changed;
        }
        func.remove_insts(&dead);
        changed = true;
    }
}
