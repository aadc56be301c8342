use super::{FuncId, Function, InstId, InstKind, Module, Value};
use crate::codegen::{ArithOp, RealPredicate};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write};

/// Textual form of a double constant: six fractional digits and a two digit
/// exponent when that reads back exactly, the raw bits in hex otherwise.
pub fn format_real(n: f64) -> String {
    let s = format!("{:.6e}", n);
    if let Some(pos) = s.find('e') {
        if let Ok(exp) = s[pos + 1..].parse::<i32>() {
            let text = format!(
                "{}e{}{:02}",
                &s[..pos],
                if exp < 0 { '-' } else { '+' },
                exp.abs()
            );
            if text.parse::<f64>().ok() == Some(n) {
                return text;
            }
        }
    }
    format!("0x{:016X}", n.to_bits())
}

fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    let ok = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '$' || c == '.' || c == '_';
    match chars.next() {
        Some(c) if c.is_ascii_digit() => name.chars().all(|c| c.is_ascii_digit()),
        Some(c) => ok(c) && chars.all(ok),
        None => false,
    }
}

fn global_name(name: &str) -> String {
    if is_plain_name(name) {
        format!("@{}", name)
    } else {
        format!("@\"{}\"", name)
    }
}

/// Local names made unique in definition order, the way a symbol table
/// would: a clash gets the next suffix of a counter shared by the function.
#[derive(Default)]
struct Namer {
    used: HashSet<String>,
    last_unique: usize,
}

impl Namer {
    fn unique(&mut self, hint: &str) -> String {
        let hint = if hint.is_empty() { "tmp" } else { hint };
        if self.used.insert(hint.to_owned()) {
            return hint.to_owned();
        }
        loop {
            self.last_unique += 1;
            let candidate = format!("{}{}", hint, self.last_unique);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

struct Names {
    params: Vec<String>,
    blocks: HashMap<usize, String>,
    insts: HashMap<InstId, String>,
}

impl Names {
    fn new(func: &Function) -> Names {
        let mut namer = Namer::default();
        let params = func.params.iter().map(|p| namer.unique(p)).collect();
        let mut blocks = HashMap::new();
        let mut insts = HashMap::new();
        for b in func.layout() {
            let block = func.block(*b);
            blocks.insert(b.0, namer.unique(&block.name));
            for id in &block.insts {
                let inst = func.inst(*id);
                if inst.kind.produces_value() {
                    insts.insert(*id, namer.unique(&inst.name));
                }
            }
        }
        Names {
            params,
            blocks,
            insts,
        }
    }

    fn value(&self, v: Value) -> String {
        match v {
            Value::Const(n) => format_real(n),
            Value::Param(i) => match self.params.get(i) {
                Some(name) => format!("%{}", name),
                None => format!("%arg{}", i),
            },
            Value::Inst(id) => match self.insts.get(&id) {
                Some(name) => format!("%{}", name),
                None => "undef".to_owned(),
            },
            Value::Undef => "undef".to_owned(),
        }
    }

    fn label(&self, b: super::BlockId) -> String {
        match self.blocks.get(&b.0) {
            Some(name) => format!("%{}", name),
            None => "%undef".to_owned(),
        }
    }
}

fn write_function(out: &mut String, module: &Module, func: &Function) -> fmt::Result {
    let names = Names::new(func);
    let params = names
        .params
        .iter()
        .map(|p| format!("double %{}", p))
        .collect::<Vec<_>>()
        .join(", ");

    if func.is_declaration() {
        return writeln!(out, "declare double {}({})", global_name(&func.name), params);
    }

    writeln!(out, "define double {}({}) {{", global_name(&func.name), params)?;
    for (i, b) in func.layout().iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "{}:", names.blocks[&b.0])?;
        for id in &func.block(*b).insts {
            out.push_str("  ");
            if let Some(name) = names.insts.get(id) {
                write!(out, "%{} = ", name)?;
            }
            write_inst(out, module, &names, &func.inst(*id).kind)?;
            out.push('\n');
        }
    }
    writeln!(out, "}}")
}

fn write_inst(out: &mut String, module: &Module, names: &Names, kind: &InstKind) -> fmt::Result {
    match kind {
        InstKind::Arith(op, l, r) => {
            let opcode = match op {
                ArithOp::Add => "fadd",
                ArithOp::Sub => "fsub",
                ArithOp::Mul => "fmul",
            };
            write!(out, "{} double {}, {}", opcode, names.value(*l), names.value(*r))
        }
        InstKind::FCmp(pred, l, r) => {
            let cond = match pred {
                RealPredicate::OrderedLessThan => "olt",
                RealPredicate::OrderedNotEqual => "one",
            };
            write!(out, "fcmp {} double {}, {}", cond, names.value(*l), names.value(*r))
        }
        InstKind::BoolToReal(v) => write!(out, "uitofp i1 {} to double", names.value(*v)),
        InstKind::Call(callee, args) => {
            let args = args
                .iter()
                .map(|a| format!("double {}", names.value(*a)))
                .collect::<Vec<_>>()
                .join(", ");
            write!(
                out,
                "call double {}({})",
                global_name(&module.raw(*callee).name),
                args
            )
        }
        InstKind::Alloca => write!(out, "alloca double"),
        InstKind::Load(slot) => write!(out, "load double, double* {}", names.value(*slot)),
        InstKind::Store(v, slot) => write!(
            out,
            "store double {}, double* {}",
            names.value(*v),
            names.value(*slot)
        ),
        InstKind::Br(b) => write!(out, "br label {}", names.label(*b)),
        InstKind::CondBr(c, t, e) => write!(
            out,
            "br i1 {}, label {}, label {}",
            names.value(*c),
            names.label(*t),
            names.label(*e)
        ),
        InstKind::Ret(v) => write!(out, "ret double {}", names.value(*v)),
    }
}

impl Module {
    /// `@name`, quoted when needed.
    pub fn display_name(&self, id: FuncId) -> String {
        global_name(&self.raw(id).name)
    }

    /// One function in textual form, deleted or not.
    pub fn display_function(&self, id: FuncId) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_function(&mut out, self, self.raw(id));
        out
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name())?;
        for (_, func) in self.functions() {
            let mut text = String::new();
            write_function(&mut text, self, func)?;
            write!(f, "\n{}", text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codegen::IrBuilder;
    use crate::ir::Builder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_real() {
        assert_eq!(format_real(9.0), "9.000000e+00");
        assert_eq!(format_real(0.0), "0.000000e+00");
        assert_eq!(format_real(2.0), "2.000000e+00");
        assert_eq!(format_real(42.0), "4.200000e+01");
        assert_eq!(format_real(-1.5), "-1.500000e+00");
        assert_eq!(format_real(0.1), "1.000000e-01");
        assert_eq!(format_real(1e100), "1.000000e+100");
        assert_eq!(format_real(1.0 / 3.0), "0x3FD5555555555555");
    }

    #[test]
    fn test_global_names() {
        assert_eq!(global_name("foo"), "@foo");
        assert_eq!(global_name("0"), "@0");
        assert_eq!(global_name("binary|"), "@\"binary|\"");
        assert_eq!(global_name("unary!"), "@\"unary!\"");
    }

    #[test]
    fn test_namer() {
        let mut n = Namer::default();
        assert_eq!(n.unique("a"), "a");
        assert_eq!(n.unique("a"), "a1");
        assert_eq!(n.unique("b"), "b");
        assert_eq!(n.unique("b"), "b2");
        assert_eq!(n.unique("a"), "a3");
    }

    #[test]
    fn test_module() {
        let mut b = Builder::new("my cool jit");
        let params = vec!["c".to_owned()];
        let putchard = b.declare_function("putchard", &params);
        let f = b.declare_function("", &[]);
        let entry = b.append_block(f, "entry");
        b.position_at_end(entry);
        let arg = b.const_real(42.0);
        let v = b.build_call(putchard, &[arg], "calltmp");
        b.build_ret(v);

        assert_eq!(
            b.module().to_string(),
            "; ModuleID = 'my cool jit'

declare double @putchard(double %c)

define double @0() {
entry:
  %calltmp = call double @putchard(double 4.200000e+01)
  ret double %calltmp
}
"
        );
    }
}
