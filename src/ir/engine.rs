use super::{FuncId, Function, InstId, InstKind, Module, Value};
use crate::error::{Error, ErrorKind};
use std::collections::HashMap;
use std::io::Write;
use tracing::trace;

pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1_000;

/// Interprets functions of a [`Module`].
///
/// Declarations without a body resolve to the built-in externals
/// `putchard(c)`, which writes the byte `c`, and `printd(x)`, which writes
/// `x` and a newline. Both return 0.
pub struct ExecutionEngine<W: Write> {
    out: W,
    max_steps: u64,
    max_call_depth: usize,
    steps: u64,
}

fn eval_error<T>(message: String) -> Result<T, Error> {
    Err(ErrorKind::Eval(message).into())
}

impl<W: Write> ExecutionEngine<W> {
    pub fn new(out: W) -> ExecutionEngine<W> {
        ExecutionEngine::with_limits(out, DEFAULT_MAX_STEPS, DEFAULT_MAX_CALL_DEPTH)
    }

    pub fn with_limits(out: W, max_steps: u64, max_call_depth: usize) -> ExecutionEngine<W> {
        ExecutionEngine {
            out,
            max_steps,
            max_call_depth,
            steps: 0,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn run_function(&mut self, module: &Module, f: FuncId, args: &[f64]) -> Result<f64, Error> {
        self.steps = 0;
        let result = self.call(module, f, args, 0);
        if let Err(e) = self.out.flush() {
            return eval_error(e.to_string());
        }
        result
    }

    fn call(&mut self, module: &Module, f: FuncId, args: &[f64], depth: usize) -> Result<f64, Error> {
        if depth > self.max_call_depth {
            return eval_error(format!("call depth exceeds {}", self.max_call_depth));
        }
        let func = match module.function(f) {
            Some(func) => func,
            None => return eval_error(format!("call to deleted function {}", module.raw(f).name)),
        };
        if func.params.len() != args.len() {
            return eval_error(format!(
                "{} takes {} arguments, got {}",
                func.name,
                func.params.len(),
                args.len()
            ));
        }
        if func.is_declaration() {
            return self.call_external(&func.name, args);
        }
        trace!("calling {}({:?})", func.name, args);
        self.run_body(module, func, args, depth)
    }

    fn call_external(&mut self, name: &str, args: &[f64]) -> Result<f64, Error> {
        let written = match (name, args) {
            ("putchard", [c]) => self.out.write_all(&[*c as u8]),
            ("printd", [x]) => writeln!(self.out, "{}", x),
            _ => return eval_error(format!("unresolved external function {}", name)),
        };
        match written {
            Ok(()) => Ok(0.0),
            Err(e) => eval_error(e.to_string()),
        }
    }

    fn run_body(&mut self, module: &Module, func: &Function, args: &[f64], depth: usize) -> Result<f64, Error> {
        let mut values = vec![0.0; func.insts.len()];
        let mut slots: HashMap<InstId, f64> = HashMap::new();
        let operand = |values: &[f64], v: Value| match v {
            Value::Const(n) => Ok(n),
            Value::Param(i) => Ok(args.get(i).cloned().unwrap_or(std::f64::NAN)),
            Value::Inst(id) => Ok(values[id.0]),
            Value::Undef => eval_error(format!("{} reads an undefined value", func.name)),
        };

        let mut block = match func.entry() {
            Some(entry) => entry,
            None => return eval_error(format!("{} has no body", func.name)),
        };
        loop {
            let mut next = None;
            for id in &func.block(block).insts {
                self.steps += 1;
                if self.steps > self.max_steps {
                    return eval_error(format!("step limit of {} exceeded", self.max_steps));
                }
                match &func.inst(*id).kind {
                    InstKind::Arith(op, l, r) => {
                        values[id.0] = op.apply(operand(&values, *l)?, operand(&values, *r)?)
                    }
                    InstKind::FCmp(pred, l, r) => {
                        let holds = pred.apply(operand(&values, *l)?, operand(&values, *r)?);
                        values[id.0] = if holds { 1.0 } else { 0.0 }
                    }
                    InstKind::BoolToReal(v) => {
                        values[id.0] = if operand(&values, *v)? != 0.0 { 1.0 } else { 0.0 }
                    }
                    InstKind::Call(callee, call_args) => {
                        let call_args = call_args
                            .iter()
                            .map(|a| operand(&values, *a))
                            .collect::<Result<Vec<f64>, Error>>()?;
                        values[id.0] = self.call(module, *callee, &call_args, depth + 1)?;
                    }
                    InstKind::Alloca => {
                        slots.insert(*id, 0.0);
                    }
                    InstKind::Load(slot) => {
                        values[id.0] = match slot {
                            Value::Inst(s) => slots.get(s).cloned().unwrap_or(0.0),
                            other => operand(&values, *other)?,
                        }
                    }
                    InstKind::Store(v, Value::Inst(s)) => {
                        let v = operand(&values, *v)?;
                        slots.insert(*s, v);
                    }
                    InstKind::Store(..) => {}
                    InstKind::Br(dest) => {
                        next = Some(*dest);
                        break;
                    }
                    InstKind::CondBr(cond, then, otherwise) => {
                        next = Some(if operand(&values, *cond)? != 0.0 {
                            *then
                        } else {
                            *otherwise
                        });
                        break;
                    }
                    InstKind::Ret(v) => return operand(&values, *v),
                }
            }
            match next {
                Some(dest) => block = dest,
                None => {
                    return eval_error(format!(
                        "block {} of {} falls through",
                        func.block(block).name,
                        func.name
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codegen::{ArithOp, IrBuilder};
    use crate::ir::Builder;

    fn putchard_program() -> (Builder, FuncId) {
        let mut b = Builder::new("m");
        let params = vec!["c".to_owned()];
        let putchard = b.declare_function("putchard", &params);
        let f = b.declare_function("", &[]);
        let entry = b.append_block(f, "entry");
        b.position_at_end(entry);
        for c in b"Hi\n" {
            let arg = b.const_real(f64::from(*c));
            b.build_call(putchard, &[arg], "calltmp");
        }
        let zero = b.const_real(0.0);
        b.build_ret(zero);
        (b, f)
    }

    #[test]
    fn test_putchard() {
        let (b, f) = putchard_program();
        let mut engine = ExecutionEngine::new(Vec::new());
        assert_eq!(engine.run_function(b.module(), f, &[]).unwrap(), 0.0);
        assert_eq!(engine.output().as_slice(), b"Hi\n");
    }

    #[test]
    fn test_printd() {
        let mut b = Builder::new("m");
        let params = vec!["x".to_owned()];
        let printd = b.declare_function("printd", &params);
        let mut engine = ExecutionEngine::new(Vec::new());
        engine.run_function(b.module(), printd, &[2.5]).unwrap();
        assert_eq!(String::from_utf8(engine.into_output()).unwrap(), "2.5\n");

        let sin = b.declare_function("sin", &params);
        let e = ExecutionEngine::new(Vec::new())
            .run_function(b.module(), sin, &[1.0])
            .unwrap_err();
        assert_eq!(
            e.kind(),
            &ErrorKind::Eval("unresolved external function sin".to_owned())
        );
    }

    #[test]
    fn test_step_limit() {
        let mut b = Builder::new("m");
        let f = b.declare_function("spin", &[]);
        let entry = b.append_block(f, "entry");
        b.position_at_end(entry);
        b.build_br(entry);

        let e = ExecutionEngine::with_limits(Vec::new(), 100, 10)
            .run_function(b.module(), f, &[])
            .unwrap_err();
        assert_eq!(e.kind(), &ErrorKind::Eval("step limit of 100 exceeded".to_owned()));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut b = Builder::new("m");
        let params = vec!["x".to_owned()];
        let f = b.declare_function("down", &params);
        let entry = b.append_block(f, "entry");
        b.position_at_end(entry);
        let x = b.param(f, 0);
        let one = b.const_real(1.0);
        let arg = b.build_arith(ArithOp::Sub, x, one, "subtmp");
        let v = b.build_call(f, &[arg], "calltmp");
        b.build_ret(v);

        let e = ExecutionEngine::with_limits(Vec::new(), 1_000_000, 50)
            .run_function(b.module(), f, &[0.0])
            .unwrap_err();
        assert_eq!(e.kind(), &ErrorKind::Eval("call depth exceeds 50".to_owned()));
    }

    #[test]
    fn test_deleted_function() {
        let (mut b, f) = putchard_program();
        b.delete_function(f);
        let e = ExecutionEngine::new(Vec::new())
            .run_function(b.module(), f, &[])
            .unwrap_err();
        assert_eq!(e.kind(), &ErrorKind::Eval("call to deleted function 0".to_owned()));
    }

    #[test]
    fn test_undefined_operand() {
        let mut b = Builder::new("m");
        let f = b.declare_function("f", &[]);
        let lost = b.build_load(Value::Undef, "lost");
        let entry = b.append_block(f, "entry");
        b.position_at_end(entry);
        let one = b.const_real(1.0);
        let v = b.build_arith(ArithOp::Add, lost, one, "addtmp");
        b.build_ret(v);

        let e = ExecutionEngine::new(Vec::new())
            .run_function(b.module(), f, &[])
            .unwrap_err();
        assert_eq!(e.kind(), &ErrorKind::Eval("f reads an undefined value".to_owned()));
    }
}
