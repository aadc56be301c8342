//! Lowering from the AST to basic blocks through an [`IrBuilder`].
//!
//! Every variable (parameters, loop counters, `var` bindings) lives in a
//! stack slot created in the function's entry block, so assignment and
//! shadowing need no SSA construction here; a backend pass may promote the
//! slots afterwards.

mod builder;
#[cfg(feature = "llvm")]
pub mod llvm;

pub use self::builder::{ArithOp, IrBuilder, RealPredicate};

use super::ast::{Expr, Prototype, PrototypeKind};
use super::error::{Error, ErrorKind};
use super::precedence::PrecedenceTable;
use std::collections::HashMap;
use tracing::{debug, trace};

type CodegenResult<T> = Result<T, Error>;

/// Per-unit lowering state: the variables in scope, every prototype seen so
/// far, and the backend (which owns the insertion point).
pub struct Codegen<B: IrBuilder> {
    builder: B,
    named_values: HashMap<String, B::Value>,
    prototypes: HashMap<String, Prototype>,
}

impl<B: IrBuilder> Codegen<B> {
    pub fn new(builder: B) -> Codegen<B> {
        Codegen {
            builder,
            named_values: HashMap::new(),
            prototypes: HashMap::new(),
        }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut B {
        &mut self.builder
    }

    pub fn into_builder(self) -> B {
        self.builder
    }

    pub fn prototype(&self, name: &str) -> Option<&Prototype> {
        self.prototypes.get(name)
    }

    /// Lowers one top-level form. A bare expression is lowered as the body of
    /// an anonymous function.
    pub fn codegen_toplevel(
        &mut self,
        expr: &Expr,
        precedence: &mut PrecedenceTable,
    ) -> CodegenResult<B::Function> {
        match expr {
            Expr::Prototype(proto) => {
                with_operator(proto, precedence, || self.codegen_proto(proto))
            }
            Expr::Function(proto, body) => self.codegen_func(proto, body, precedence),
            other => self.codegen_func(&Prototype::anonymous(), other, precedence),
        }
    }

    pub fn codegen_proto(&mut self, proto: &Prototype) -> CodegenResult<B::Function> {
        let function = self.declare(proto)?;
        if !proto.is_anonymous() {
            self.prototypes.insert(proto.name.clone(), proto.clone());
        }
        Ok(function)
    }

    fn declare(&mut self, proto: &Prototype) -> CodegenResult<B::Function> {
        if !proto.is_anonymous() {
            if let Some(function) = self.builder.get_function(&proto.name) {
                if self.builder.param_count(function) != proto.params.len() {
                    return Err(ErrorKind::ConflictingDeclaration(proto.name.clone()).into());
                }
                return Ok(function);
            }
        }
        debug!("declaring {}", proto);
        Ok(self.builder.declare_function(&proto.name, &proto.params))
    }

    /// A function in the module, or one declared on the spot from a
    /// prototype seen earlier in the unit.
    fn get_function(&mut self, name: &str) -> CodegenResult<Option<B::Function>> {
        if let Some(function) = self.builder.get_function(name) {
            return Ok(Some(function));
        }
        match self.prototypes.get(name).cloned() {
            Some(proto) => self.declare(&proto).map(Some),
            None => Ok(None),
        }
    }

    /// Lowers a definition. A binary operator keeps its precedence only if
    /// the definition lowers; otherwise the table goes back to what it held
    /// before the operator was declared.
    pub fn codegen_func(
        &mut self,
        proto: &Prototype,
        body: &Expr,
        precedence: &mut PrecedenceTable,
    ) -> CodegenResult<B::Function> {
        with_operator(proto, precedence, || self.lower_function(proto, body))
    }

    fn lower_function(&mut self, proto: &Prototype, body: &Expr) -> CodegenResult<B::Function> {
        let existing = if proto.is_anonymous() {
            None
        } else {
            self.builder.get_function(&proto.name)
        };
        let function = match existing {
            Some(f) if self.builder.has_body(f) => {
                return Err(ErrorKind::Redefinition(proto.name.clone()).into())
            }
            Some(f) if self.builder.param_count(f) != proto.params.len() => {
                return Err(ErrorKind::ConflictingDeclaration(proto.name.clone()).into())
            }
            Some(f) => f,
            None => self.builder.declare_function(&proto.name, &proto.params),
        };
        if !proto.is_anonymous() {
            self.prototypes.insert(proto.name.clone(), proto.clone());
        }

        let entry = self.builder.append_block(function, "entry");
        self.builder.position_at_end(entry);

        self.named_values.clear();
        for (i, name) in proto.params.iter().enumerate() {
            let slot = self.builder.build_entry_alloca(function, name);
            let arg = self.builder.param(function, i);
            self.builder.build_store(arg, slot);
            self.named_values.insert(name.clone(), slot);
        }

        match self.codegen_expr(body) {
            Ok(ret_val) => {
                self.builder.build_ret(ret_val);
                self.builder.run_function_passes(function);
                debug!("lowered {:?}", function);
                Ok(function)
            }
            Err(e) => {
                // Error reading body, remove function.
                debug!("dropping {:?}: {}", function, e);
                self.builder.delete_function(function);
                Err(e)
            }
        }
    }

    pub fn codegen_expr(&mut self, e: &Expr) -> CodegenResult<B::Value> {
        trace!("lowering {}", e);
        match e {
            Expr::Number(n) => Ok(self.builder.const_real(*n)),
            Expr::Variable(name) => {
                let slot = self.lookup(name)?;
                Ok(self.builder.build_load(slot, name))
            }
            Expr::Binary('=', lhs, rhs) => self.codegen_assign(lhs, rhs),
            Expr::Binary(op, lhs, rhs) => {
                let lhs_val = self.codegen_expr(lhs)?;
                let rhs_val = self.codegen_expr(rhs)?;
                match *op {
                    '+' => Ok(self
                        .builder
                        .build_arith(ArithOp::Add, lhs_val, rhs_val, "addtmp")),
                    '-' => Ok(self
                        .builder
                        .build_arith(ArithOp::Sub, lhs_val, rhs_val, "subtmp")),
                    '*' => Ok(self
                        .builder
                        .build_arith(ArithOp::Mul, lhs_val, rhs_val, "multmp")),
                    '<' => {
                        let cmp = self.builder.build_fcmp(
                            RealPredicate::OrderedLessThan,
                            lhs_val,
                            rhs_val,
                            "cmptmp",
                        );
                        // Convert bool 0/1 to double 0.0 or 1.0
                        Ok(self.builder.build_bool_to_real(cmp, "booltmp"))
                    }
                    op => {
                        let callee = self.operator_function("binary", op)?;
                        Ok(self.builder.build_call(callee, &[lhs_val, rhs_val], "binop"))
                    }
                }
            }
            Expr::Unary(op, operand) => {
                let operand_val = self.codegen_expr(operand)?;
                let callee = self.operator_function("unary", *op)?;
                Ok(self.builder.build_call(callee, &[operand_val], "unop"))
            }
            Expr::Call(name, args) => {
                let callee = self
                    .get_function(name)?
                    .ok_or_else(|| Error::from(ErrorKind::UnknownFunction(name.clone())))?;
                let expected = self.builder.param_count(callee);
                if expected != args.len() {
                    return Err(ErrorKind::ArgumentCount {
                        name: name.clone(),
                        expected,
                        found: args.len(),
                    }
                    .into());
                }

                let mut arg_vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vals.push(self.codegen_expr(arg)?);
                }
                Ok(self.builder.build_call(callee, &arg_vals, "calltmp"))
            }
            Expr::If(cond, then, otherwise) => self.codegen_if(cond, then, otherwise),
            Expr::For(name, start, end, step, body) => {
                self.codegen_for(name, start, end, step.as_deref(), body)
            }
            Expr::Let(bindings, body) => self.codegen_let(bindings, body),
            Expr::Prototype(proto) => {
                Err(ErrorKind::NotTopLevel(format!("extern {}", proto.name)).into())
            }
            Expr::Function(proto, _) => {
                Err(ErrorKind::NotTopLevel(format!("definition of {}", proto.name)).into())
            }
        }
    }

    fn lookup(&self, name: &str) -> CodegenResult<B::Value> {
        self.named_values
            .get(name)
            .cloned()
            .ok_or_else(|| ErrorKind::UnboundVariable(name.to_owned()).into())
    }

    fn restore_binding(&mut self, name: &str, shadowed: Option<B::Value>) {
        match shadowed {
            Some(slot) => {
                self.named_values.insert(name.to_owned(), slot);
            }
            None => {
                self.named_values.remove(name);
            }
        }
    }

    fn current_function(&self) -> CodegenResult<B::Function> {
        self.builder
            .current_function()
            .ok_or_else(|| ErrorKind::Backend("no insertion point".to_owned()).into())
    }

    fn operator_function(&mut self, kind: &'static str, op: char) -> CodegenResult<B::Function> {
        self.get_function(&format!("{}{}", kind, op))?
            .ok_or_else(|| ErrorKind::UnknownOperator(kind, op).into())
    }

    fn codegen_assign(&mut self, lhs: &Expr, rhs: &Expr) -> CodegenResult<B::Value> {
        let name = match lhs {
            Expr::Variable(name) => name,
            other => return Err(ErrorKind::InvalidAssignment(other.to_string()).into()),
        };
        let value = self.codegen_expr(rhs)?;
        let slot = self.lookup(name)?;
        self.builder.build_store(value, slot);
        Ok(value)
    }

    fn codegen_if(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr) -> CodegenResult<B::Value> {
        let cond_val = self.codegen_expr(cond)?;
        let zero = self.builder.const_real(0.0);
        let cond_val =
            self.builder
                .build_fcmp(RealPredicate::OrderedNotEqual, cond_val, zero, "ifcond");

        let function = self.current_function()?;
        let result = self.builder.build_entry_alloca(function, "iftmp");

        let then_bb = self.builder.append_block(function, "then");
        let else_bb = self.builder.append_block(function, "else");
        let merge_bb = self.builder.append_block(function, "ifcont");
        self.builder.build_cond_br(cond_val, then_bb, else_bb);

        self.builder.position_at_end(then_bb);
        let then_val = self.codegen_expr(then)?;
        self.builder.build_store(then_val, result);
        self.builder.build_br(merge_bb);

        self.builder.move_block_to_end(function, else_bb);
        self.builder.position_at_end(else_bb);
        let else_val = self.codegen_expr(otherwise)?;
        self.builder.build_store(else_val, result);
        self.builder.build_br(merge_bb);

        self.builder.move_block_to_end(function, merge_bb);
        self.builder.position_at_end(merge_bb);
        Ok(self.builder.build_load(result, "iftmp"))
    }

    fn codegen_for(
        &mut self,
        name: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
    ) -> CodegenResult<B::Value> {
        let function = self.current_function()?;
        let slot = self.builder.build_entry_alloca(function, name);

        // The start value does not see the loop variable.
        let start_val = self.codegen_expr(start)?;
        self.builder.build_store(start_val, slot);

        let loop_bb = self.builder.append_block(function, "loop");
        self.builder.build_br(loop_bb);
        self.builder.position_at_end(loop_bb);

        let shadowed = self.named_values.insert(name.to_owned(), slot);
        let end_cond = self.codegen_loop_tail(name, slot, end, step, body);
        self.restore_binding(name, shadowed);
        let end_cond = end_cond?;

        let after_bb = self.builder.append_block(function, "afterloop");
        self.builder.build_cond_br(end_cond, loop_bb, after_bb);
        self.builder.position_at_end(after_bb);

        Ok(self.builder.const_real(0.0))
    }

    /// Body, increment and exit test of one iteration. The test is the end
    /// expression itself, evaluated before the increment, compared with 0.0.
    fn codegen_loop_tail(
        &mut self,
        name: &str,
        slot: B::Value,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
    ) -> CodegenResult<B::Value> {
        self.codegen_expr(body)?;

        let step_val = match step {
            Some(step) => self.codegen_expr(step)?,
            None => self.builder.const_real(1.0),
        };

        let end_val = self.codegen_expr(end)?;

        let cur_var = self.builder.build_load(slot, name);
        let next_var = self
            .builder
            .build_arith(ArithOp::Add, cur_var, step_val, "nextvar");
        self.builder.build_store(next_var, slot);

        let zero = self.builder.const_real(0.0);
        Ok(self
            .builder
            .build_fcmp(RealPredicate::OrderedNotEqual, end_val, zero, "loopcond"))
    }

    fn codegen_let(&mut self, bindings: &[(String, Expr)], body: &Expr) -> CodegenResult<B::Value> {
        let function = self.current_function()?;
        let mut shadowed = Vec::with_capacity(bindings.len());
        let result = self
            .codegen_bindings(function, bindings, &mut shadowed)
            .and_then(|()| self.codegen_expr(body));
        for (name, old) in shadowed.into_iter().rev() {
            self.restore_binding(&name, old);
        }
        result
    }

    /// Binds each name in turn; an initializer sees the bindings before it
    /// but not itself or later ones.
    fn codegen_bindings(
        &mut self,
        function: B::Function,
        bindings: &[(String, Expr)],
        shadowed: &mut Vec<(String, Option<B::Value>)>,
    ) -> CodegenResult<()> {
        for (name, init) in bindings {
            let init_val = self.codegen_expr(init)?;
            let slot = self.builder.build_entry_alloca(function, name);
            self.builder.build_store(init_val, slot);
            let old = self.named_values.insert(name.clone(), slot);
            shadowed.push((name.clone(), old));
        }
        Ok(())
    }
}

/// Runs `lower` with `proto`'s precedence declared when it is a binary
/// operator, then settles the declaration on the outcome.
fn with_operator<T, F>(proto: &Prototype, precedence: &mut PrecedenceTable, lower: F) -> CodegenResult<T>
where
    F: FnOnce() -> CodegenResult<T>,
{
    let op = match (proto.kind, proto.operator_symbol()) {
        (PrototypeKind::Binary, Some(op)) => op,
        _ => return lower(),
    };
    precedence.declare(op, proto.precedence);
    let result = lower();
    match result {
        Ok(_) => precedence.commit(op),
        Err(_) => {
            debug!("retracting operator '{}'", op);
            precedence.retract(op);
        }
    }
    result
}
