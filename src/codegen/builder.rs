use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

impl ArithOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            ArithOp::Add => lhs + rhs,
            ArithOp::Sub => lhs - rhs,
            ArithOp::Mul => lhs * rhs,
        }
    }
}

/// Floating point comparisons the lowering needs. Both are ordered: a NaN
/// operand compares false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealPredicate {
    OrderedLessThan,
    OrderedNotEqual,
}

impl RealPredicate {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            RealPredicate::OrderedLessThan => lhs < rhs,
            RealPredicate::OrderedNotEqual => !lhs.is_nan() && !rhs.is_nan() && lhs != rhs,
        }
    }
}

/// Instruction construction, block management and the function registry of a
/// code generation backend.
///
/// Every value is an `f64` except the results of `build_fcmp` (a boolean,
/// only fed to `build_bool_to_real` or `build_cond_br`) and of
/// `build_entry_alloca` (a stack slot, only fed to loads and stores).
/// Instructions are appended at the current insertion point.
pub trait IrBuilder {
    type Value: Copy + Debug;
    type Block: Copy + Debug;
    type Function: Copy + Debug;

    fn const_real(&mut self, n: f64) -> Self::Value;

    fn build_arith(
        &mut self,
        op: ArithOp,
        lhs: Self::Value,
        rhs: Self::Value,
        name: &str,
    ) -> Self::Value;

    fn build_fcmp(
        &mut self,
        pred: RealPredicate,
        lhs: Self::Value,
        rhs: Self::Value,
        name: &str,
    ) -> Self::Value;

    fn build_bool_to_real(&mut self, value: Self::Value, name: &str) -> Self::Value;

    fn build_call(
        &mut self,
        callee: Self::Function,
        args: &[Self::Value],
        name: &str,
    ) -> Self::Value;

    /// A stack slot at the top of `function`'s entry block, whatever the
    /// current insertion point.
    fn build_entry_alloca(&mut self, function: Self::Function, name: &str) -> Self::Value;

    fn build_load(&mut self, slot: Self::Value, name: &str) -> Self::Value;

    fn build_store(&mut self, value: Self::Value, slot: Self::Value);

    fn build_br(&mut self, dest: Self::Block);

    fn build_cond_br(&mut self, cond: Self::Value, then: Self::Block, otherwise: Self::Block);

    fn build_ret(&mut self, value: Self::Value);

    fn append_block(&mut self, function: Self::Function, name: &str) -> Self::Block;

    /// Moves `block` after the last block of `function`.
    fn move_block_to_end(&mut self, function: Self::Function, block: Self::Block);

    fn position_at_end(&mut self, block: Self::Block);

    /// The function owning the current insertion point.
    fn current_function(&self) -> Option<Self::Function>;

    fn get_function(&self, name: &str) -> Option<Self::Function>;

    /// Declares `double name(double, ...)`. An empty name asks the backend to
    /// pick a fresh one.
    fn declare_function(&mut self, name: &str, params: &[String]) -> Self::Function;

    fn param_count(&self, function: Self::Function) -> usize;

    fn param(&self, function: Self::Function, index: usize) -> Self::Value;

    fn has_body(&self, function: Self::Function) -> bool;

    fn delete_function(&mut self, function: Self::Function);

    /// Runs the backend's per-function optimization pipeline.
    fn run_function_passes(&mut self, function: Self::Function);
}
