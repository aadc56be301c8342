use kaleidoc::config::Config;
use kaleidoc::parser::MAX_NESTING;
use kaleidoc::toplevel::{Outcome, Toplevel};
use kaleidoc::ErrorKind;
use pretty_assertions::assert_eq;

const OPERATORS: &str = "
# Logical unary not.
def unary!(v)
  if v then
    0
  else
    1;

def binary> 10 (LHS RHS)
  RHS < LHS;

# Binary logical or, which does not short circuit.
def binary| 5 (LHS RHS)
  if LHS then
    1
  else if RHS then
    1
  else
    0;

# Binary logical and, which does not short circuit.
def binary& 6 (LHS RHS)
  if !LHS then
    0
  else
    !!RHS;

# Define ':' for sequencing: as a low-precedence operator that ignores operands
# and just returns the RHS.
def binary : 1 (x y) y;
";

const MANDEL: &str = "
extern putchard(char);
def printdensity(d)
  if d > 8 then
    putchard(32)  # ' '
  else if d > 4 then
    putchard(46)  # '.'
  else if d > 2 then
    putchard(43)  # '+'
  else
    putchard(42); # '*'

def mandelconverger(real imag iters creal cimag)
  if iters > 255 | (real*real + imag*imag > 4) then
    iters
  else
    mandelconverger(real*real - imag*imag + creal,
                    2*real*imag + cimag,
                    iters+1, creal, cimag);

def mandelconverge(real imag)
  mandelconverger(real, imag, 0, real, imag);

def mandelhelp(xmin xmax xstep   ymin ymax ystep)
  for y = ymin, y < ymax, ystep in (
    (for x = xmin, x < xmax, xstep in
       printdensity(mandelconverge(x,y)))
    : putchard(10)
  );
";

fn run(config: &Config, source: &str) -> (Vec<Outcome>, String) {
    let mut top = Toplevel::new(config, Vec::new());
    let outcomes = top.run(source);
    let output = String::from_utf8(top.into_output()).unwrap();
    (outcomes, output)
}

fn values(outcomes: &[Outcome]) -> Vec<f64> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            Outcome::Evaluated(v) => Some(*v),
            _ => None,
        })
        .collect()
}

fn errors(outcomes: &[Outcome]) -> Vec<ErrorKind> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            Outcome::Error(e) => Some(e.kind().clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn user_defined_operators() {
    let source = format!(
        "{}
!0; !5;
3 > 2; 2 > 3;
0 | 0; 0 | 7;
1 & 0; 4 & 9;
1 : 2 : 3;
1 + 2 > 2 & 0 < 1",
        OPERATORS
    );
    let (outcomes, _) = run(&Config::default(), &source);
    assert_eq!(errors(&outcomes), vec![]);
    assert_eq!(
        values(&outcomes),
        vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 3.0, 1.0]
    );
}

#[test]
fn mandelbrot() {
    let source = format!("{}{}\nmandelhelp(0-2.3, 0.7, 0.3, 0-1.3, 1.3, 0.4)", OPERATORS, MANDEL);
    for optimize in &[false, true] {
        let config = Config {
            optimize: *optimize,
            ..Config::default()
        };
        let (outcomes, output) = run(&config, &source);
        assert_eq!(errors(&outcomes), vec![]);
        assert_eq!(values(&outcomes), vec![0.0]);

        let rows: Vec<&str> = output.lines().collect();
        assert_eq!(rows.len(), 8, "{}", output);
        assert!(output.ends_with('\n'));
        assert!(rows.iter().all(|r| r.len() == rows[0].len() && !r.is_empty()));
        assert!(output.chars().all(|c| " .+*\n".contains(c)));
        // (-2.3, -1.3) escapes at once, (-0.2, -0.1) never does.
        assert_eq!(rows[0].chars().next(), Some('*'));
        assert_eq!(rows[3].chars().nth(7), Some(' '));
    }
}

#[test]
fn failed_operator_definitions_keep_builtins() {
    let source = "
def binary< 5 (a b) zz;
def binary= 9 (a b) zz;
1 < 2;
def g(x) x = 3;
g(0) + (1 < 2) * 2";
    let (outcomes, _) = run(&Config::default(), source);
    assert_eq!(
        errors(&outcomes),
        vec![
            ErrorKind::UnboundVariable("zz".to_owned()),
            ErrorKind::UnboundVariable("zz".to_owned()),
        ]
    );
    assert_eq!(values(&outcomes), vec![1.0, 5.0]);
}

#[test]
fn deep_nesting_is_an_error() {
    let source = format!("{}1{};\n7", "(".repeat(50_000), ")".repeat(50_000));
    let (outcomes, _) = run(&Config::default(), &source);
    assert_eq!(errors(&outcomes), vec![ErrorKind::NestingTooDeep(MAX_NESTING)]);
    assert_eq!(values(&outcomes), vec![7.0]);
}

#[test]
fn printd_and_mutation() {
    let source = "
extern printd(x);
def binary : 1 (x y) y;
def fibi(x)
  var a = 1, b = 1, c = 0 in
  (for i = 3, i < x in
     c = a + b :
     a = b :
     b = c) :
  b;
printd(fibi(10));
fibi(10)";
    let (outcomes, output) = run(&Config::default(), source);
    assert_eq!(errors(&outcomes), vec![]);
    assert_eq!(values(&outcomes), vec![0.0, 55.0]);
    assert_eq!(output, "55\n");
}

#[test]
fn recovery_keeps_going() {
    let source = "
def broken(x) x +;
def binary @ 3 (a b) a;
def ok(x) x * 3;
(ok(2;
ok(2) @ 1;
1 @ 2";
    let (outcomes, _) = run(&Config::default(), source);
    let errs = errors(&outcomes);
    assert_eq!(errs.len(), 2, "{:?}", errs);
    assert_eq!(values(&outcomes), vec![6.0, 1.0]);
}

#[test]
fn optimized_module_text() {
    let config = Config {
        optimize: true,
        evaluate: false,
        module_name: "golden".to_owned(),
        ..Config::default()
    };
    let mut top = Toplevel::new(&config, Vec::new());
    top.run("def foo(a b) a*a + 2*a*b + b*b;");
    assert_eq!(
        top.module().to_string(),
        "; ModuleID = 'golden'

define double @foo(double %a, double %b) {
entry:
  %multmp = fmul double %a, %a
  %multmp1 = fmul double 2.000000e+00, %a
  %multmp2 = fmul double %multmp1, %b
  %addtmp = fadd double %multmp, %multmp2
  %multmp3 = fmul double %b, %b
  %addtmp4 = fadd double %addtmp, %multmp3
  ret double %addtmp4
}
"
    );
}
