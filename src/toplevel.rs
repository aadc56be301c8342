use super::ast::Expr;
use super::codegen::{Codegen, IrBuilder};
use super::config::Config;
use super::error::Error;
use super::ir::{self, ExecutionEngine, Module, PassManager};
use super::parser::Parser;
use super::precedence::PrecedenceTable;
use std::io::Write;
use tracing::{debug, info, warn};

/// Parses and lowers every top-level form of `source` into `builder`.
/// Forms that fail are reported and skipped.
pub fn lower_unit<B: IrBuilder>(source: &str, builder: B) -> (B, Vec<Error>) {
    let mut parser = Parser::new(source);
    let mut codegen = Codegen::new(builder);
    let mut diagnostics = Vec::new();
    while let Some(item) = parser.next() {
        let lowered = item.and_then(|e| codegen.codegen_toplevel(&e, parser.precedence_mut()));
        if let Err(e) = lowered {
            warn!("{}", e);
            diagnostics.push(e);
        }
    }
    (codegen.into_builder(), diagnostics)
}

/// What became of one top-level form.
#[derive(Debug)]
pub enum Outcome {
    Declared(String),
    Defined(String),
    Evaluated(f64),
    Error(Error),
}

/// A session over the in-process backend. Anonymous functions are run as
/// soon as they are lowered and then removed from the module.
///
/// Successive calls to `run` continue the same unit: definitions and
/// operator precedences carry over.
pub struct Toplevel<W: Write> {
    codegen: Codegen<ir::Builder>,
    engine: ExecutionEngine<W>,
    precedence: PrecedenceTable,
    evaluate: bool,
}

impl<W: Write> Toplevel<W> {
    pub fn new(config: &Config, out: W) -> Toplevel<W> {
        let passes = if config.optimize {
            PassManager::standard()
        } else {
            PassManager::new()
        };
        Toplevel {
            codegen: Codegen::new(ir::Builder::with_passes(&config.module_name, passes)),
            engine: ExecutionEngine::with_limits(out, config.max_steps, config.max_call_depth),
            precedence: PrecedenceTable::new(),
            evaluate: config.evaluate,
        }
    }

    pub fn module(&self) -> &Module {
        self.codegen.builder().module()
    }

    pub fn output(&self) -> &W {
        self.engine.output()
    }

    pub fn into_output(self) -> W {
        self.engine.into_output()
    }

    pub fn run(&mut self, source: &str) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        self.run_each(source, |o| outcomes.push(o));
        outcomes
    }

    /// Like `run`, handing each outcome over as soon as it is known.
    pub fn run_each<F: FnMut(Outcome)>(&mut self, source: &str, mut on_outcome: F) {
        let precedence = std::mem::replace(&mut self.precedence, PrecedenceTable::new());
        let mut parser = Parser::with_precedence(source, precedence);
        while let Some(item) = parser.next() {
            let outcome = match item.and_then(|e| self.handle(&e, parser.precedence_mut())) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("{}", e);
                    Outcome::Error(e)
                }
            };
            on_outcome(outcome);
        }
        self.precedence = parser.into_precedence();
    }

    fn handle(&mut self, expr: &Expr, precedence: &mut PrecedenceTable) -> Result<Outcome, Error> {
        let function = self.codegen.codegen_toplevel(expr, precedence)?;
        match expr {
            Expr::Prototype(proto) => {
                info!("read extern {}", proto);
                Ok(Outcome::Declared(proto.name.clone()))
            }
            Expr::Function(proto, _) if !proto.is_anonymous() => {
                info!("read function definition {}", proto);
                Ok(Outcome::Defined(proto.name.clone()))
            }
            _ if !self.evaluate => {
                let name = self.module().display_name(function);
                debug!("kept top-level expression as {}", name);
                Ok(Outcome::Defined(name))
            }
            _ => {
                let result =
                    self.engine
                        .run_function(self.codegen.builder().module(), function, &[]);
                // Remove the anonymous expression.
                self.codegen.builder_mut().delete_function(function);
                let value = result?;
                info!("evaluated to {}", value);
                Ok(Outcome::Evaluated(value))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn values(outcomes: &[Outcome]) -> Vec<f64> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Evaluated(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_session() {
        let mut top = Toplevel::new(&Config::default(), Vec::new());
        let outcomes = top.run("extern putchard(c); def twice(x) x * 2; twice(21); putchard(65)");
        match &outcomes[0] {
            Outcome::Declared(name) => assert_eq!(name, "putchard"),
            other => panic!("{:?}", other),
        }
        match &outcomes[1] {
            Outcome::Defined(name) => assert_eq!(name, "twice"),
            other => panic!("{:?}", other),
        }
        assert_eq!(values(&outcomes), vec![42.0, 0.0]);
        assert_eq!(top.output().as_slice(), b"A");

        // Evaluated expressions do not stay in the module.
        assert_eq!(top.module().functions().count(), 2);
    }

    #[test]
    fn test_errors_are_reported_and_skipped() {
        let mut top = Toplevel::new(&Config::default(), Vec::new());
        let outcomes = top.run("def f(x) y; 1 +; f(1); 3");
        let errors: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Error(e) => Some(e.kind().clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], ErrorKind::UnboundVariable("y".to_owned()));
        assert!(match &errors[1] {
            ErrorKind::UnexpectedToken(..) => true,
            _ => false,
        });
        // The failed definition still left its prototype behind.
        assert_eq!(
            errors[2],
            ErrorKind::Eval("unresolved external function f".to_owned())
        );
        assert_eq!(values(&outcomes), vec![3.0]);
    }

    #[test]
    fn test_runs_continue_the_unit() {
        let mut top = Toplevel::new(&Config::default(), Vec::new());
        top.run("def binary% 50 (a b) a - b * 3;");
        let outcomes = top.run("10 % 2 + 1");
        assert_eq!(values(&outcomes), vec![5.0]);
    }

    #[test]
    fn test_no_eval_keeps_expressions() {
        let config = Config {
            evaluate: false,
            ..Config::default()
        };
        let mut top = Toplevel::new(&config, Vec::new());
        let outcomes = top.run("4+5;");
        match &outcomes[0] {
            Outcome::Defined(name) => assert_eq!(name, "@0"),
            other => panic!("{:?}", other),
        }
        assert_eq!(
            top.module().to_string(),
            "; ModuleID = 'my cool jit'

define double @0() {
entry:
  ret double 9.000000e+00
}
"
        );
    }

    #[test]
    fn test_optimized_session() {
        let config = Config {
            optimize: true,
            ..Config::default()
        };
        let mut top = Toplevel::new(&config, Vec::new());
        let outcomes = top.run(
            "def fib(x) if x < 3 then 1 else fib(x-1)+fib(x-2);
fib(15)",
        );
        assert_eq!(values(&outcomes), vec![610.0]);
    }

    #[test]
    fn test_runaway_recursion_is_an_error() {
        let config = Config {
            max_call_depth: 100,
            ..Config::default()
        };
        let mut top = Toplevel::new(&config, Vec::new());
        let outcomes = top.run("def down(x) down(x - 1); down(0); 7");
        match &outcomes[1] {
            Outcome::Error(e) => assert!(match e.kind() {
                ErrorKind::Eval(_) => true,
                _ => false,
            }),
            other => panic!("{:?}", other),
        }
        assert_eq!(values(&outcomes), vec![7.0]);
        assert!(top.module().get_function("0").is_none());
    }

    #[test]
    fn test_lower_unit() {
        let (builder, diagnostics) = lower_unit("def f(x) x; g(); f(2)", ir::Builder::new("unit"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].kind(),
            &ErrorKind::UnknownFunction("g".to_owned())
        );
        let names: Vec<_> = builder
            .module()
            .functions()
            .map(|(_, f)| f.name.clone())
            .collect();
        assert_eq!(names, vec!["f", "1"]);
    }
}
