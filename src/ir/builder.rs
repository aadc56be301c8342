use super::{Block, BlockId, FuncId, Inst, InstKind, Module, PassManager, Value};
use crate::codegen::{ArithOp, IrBuilder, RealPredicate};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub func: FuncId,
    pub block: BlockId,
}

/// Builds functions into a [`Module`]. Arithmetic on two constants is
/// folded at construction.
#[derive(Debug)]
pub struct Builder {
    module: Module,
    position: Option<BlockRef>,
    passes: PassManager,
}

impl Builder {
    pub fn new(module_name: &str) -> Builder {
        Builder::with_passes(module_name, PassManager::new())
    }

    pub fn with_passes(module_name: &str, passes: PassManager) -> Builder {
        Builder {
            module: Module::new(module_name),
            position: None,
            passes,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    /// Appends at the insertion point. Without one the instruction is
    /// dropped and the result is [`Value::Undef`], which the engine refuses
    /// to read.
    fn push(&mut self, kind: InstKind, name: &str) -> Value {
        let at = match self.position {
            Some(at) => at,
            None => {
                warn!("dropping {:?}: no insertion point", kind);
                return Value::Undef;
            }
        };
        let func = self.module.raw_mut(at.func);
        let id = super::InstId(func.insts.len());
        func.insts.push(Inst {
            kind,
            name: name.to_owned(),
        });
        func.blocks[at.block.0].insts.push(id);
        Value::Inst(id)
    }
}

impl IrBuilder for Builder {
    type Value = Value;
    type Block = BlockRef;
    type Function = FuncId;

    fn const_real(&mut self, n: f64) -> Value {
        Value::Const(n)
    }

    fn build_arith(&mut self, op: ArithOp, lhs: Value, rhs: Value, name: &str) -> Value {
        match (lhs, rhs) {
            (Value::Const(l), Value::Const(r)) => Value::Const(op.apply(l, r)),
            _ => self.push(InstKind::Arith(op, lhs, rhs), name),
        }
    }

    fn build_fcmp(&mut self, pred: RealPredicate, lhs: Value, rhs: Value, name: &str) -> Value {
        self.push(InstKind::FCmp(pred, lhs, rhs), name)
    }

    fn build_bool_to_real(&mut self, value: Value, name: &str) -> Value {
        self.push(InstKind::BoolToReal(value), name)
    }

    fn build_call(&mut self, callee: FuncId, args: &[Value], name: &str) -> Value {
        self.push(InstKind::Call(callee, args.to_vec()), name)
    }

    fn build_entry_alloca(&mut self, function: FuncId, name: &str) -> Value {
        let func = self.module.raw_mut(function);
        let entry = match func.entry() {
            Some(entry) => entry,
            None => {
                func.blocks.push(Block {
                    name: "entry".to_owned(),
                    insts: Vec::new(),
                });
                let entry = BlockId(func.blocks.len() - 1);
                func.layout.push(entry);
                entry
            }
        };
        let id = super::InstId(func.insts.len());
        func.insts.push(Inst {
            kind: InstKind::Alloca,
            name: name.to_owned(),
        });

        // After the allocas already there, so slots keep creation order.
        let insts = &func.insts;
        let block = &mut func.blocks[entry.0];
        let at = block
            .insts
            .iter()
            .take_while(|i| insts[i.0].kind == InstKind::Alloca)
            .count();
        block.insts.insert(at, id);
        Value::Inst(id)
    }

    fn build_load(&mut self, slot: Value, name: &str) -> Value {
        self.push(InstKind::Load(slot), name)
    }

    fn build_store(&mut self, value: Value, slot: Value) {
        self.push(InstKind::Store(value, slot), "");
    }

    fn build_br(&mut self, dest: BlockRef) {
        self.push(InstKind::Br(dest.block), "");
    }

    fn build_cond_br(&mut self, cond: Value, then: BlockRef, otherwise: BlockRef) {
        self.push(InstKind::CondBr(cond, then.block, otherwise.block), "");
    }

    fn build_ret(&mut self, value: Value) {
        self.push(InstKind::Ret(value), "");
    }

    fn append_block(&mut self, function: FuncId, name: &str) -> BlockRef {
        let func = self.module.raw_mut(function);
        func.blocks.push(Block {
            name: name.to_owned(),
            insts: Vec::new(),
        });
        let block = BlockId(func.blocks.len() - 1);
        func.layout.push(block);
        BlockRef {
            func: function,
            block,
        }
    }

    fn move_block_to_end(&mut self, function: FuncId, block: BlockRef) {
        let layout = &mut self.module.raw_mut(function).layout;
        layout.retain(|b| *b != block.block);
        layout.push(block.block);
    }

    fn position_at_end(&mut self, block: BlockRef) {
        self.position = Some(block);
    }

    fn current_function(&self) -> Option<FuncId> {
        self.position.map(|at| at.func)
    }

    fn get_function(&self, name: &str) -> Option<FuncId> {
        if name.is_empty() {
            return None;
        }
        self.module.get_function(name)
    }

    fn declare_function(&mut self, name: &str, params: &[String]) -> FuncId {
        self.module.add_function(name, params)
    }

    fn param_count(&self, function: FuncId) -> usize {
        self.module.raw(function).params.len()
    }

    fn param(&self, _function: FuncId, index: usize) -> Value {
        Value::Param(index)
    }

    fn has_body(&self, function: FuncId) -> bool {
        !self.module.raw(function).is_declaration()
    }

    fn delete_function(&mut self, function: FuncId) {
        if self.position.map(|at| at.func) == Some(function) {
            self.position = None;
        }
        self.module.remove_function(function);
    }

    fn run_function_passes(&mut self, function: FuncId) {
        if self.passes.is_empty() {
            return;
        }
        trace!("running passes on {:?}", function);
        self.passes.run(self.module.raw_mut(function));
    }
}
