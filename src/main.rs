use clap::Parser;
use kaleidoc::config::Config;
use kaleidoc::toplevel::{Outcome, Toplevel};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kaleidoc", version, about = "Compile and run Kaleidoscope programs")]
struct Cli {
    /// Source file; standard input when omitted
    file: Option<PathBuf>,

    /// Print the module once the whole input has been compiled
    #[arg(long = "ir")]
    emit_ir: bool,

    /// Optimize each function after it is built
    #[arg(short = 'O', long)]
    optimize: bool,

    /// Compile top-level expressions without running them
    #[arg(long)]
    no_eval: bool,

    /// Generate code with LLVM instead of the built-in backend (never evaluates)
    #[cfg(feature = "llvm")]
    #[arg(long)]
    llvm: bool,
}

fn read_source(file: &Option<PathBuf>) -> io::Result<String> {
    match file {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            Ok(source)
        }
    }
}

#[cfg(feature = "llvm")]
fn run_llvm(source: &str, config: &Config) {
    use kaleidoc::codegen::llvm::LlvmBuilder;
    use kaleidoc::toplevel::lower_unit;

    let builder = LlvmBuilder::new(&config.module_name, config.optimize);
    let (builder, diagnostics) = lower_unit(source, builder);
    for e in &diagnostics {
        eprintln!("error: {}", e);
    }
    print!("{}", builder.print_module());
}

fn main() -> Result<(), failure::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let source = read_source(&cli.file)?;
    let config = Config {
        optimize: cli.optimize,
        evaluate: !cli.no_eval,
        ..Config::default()
    };

    #[cfg(feature = "llvm")]
    {
        if cli.llvm {
            run_llvm(&source, &config);
            return Ok(());
        }
    }

    let mut toplevel = Toplevel::new(&config, io::stdout());
    toplevel.run_each(&source, |outcome| match outcome {
        Outcome::Declared(name) => println!("Read extern: {}", name),
        Outcome::Defined(name) => println!("Read function definition: {}", name),
        Outcome::Evaluated(value) => println!("Evaluated to {}", value),
        Outcome::Error(e) => eprintln!("error: {}", e),
    });

    if cli.emit_ir {
        print!("{}", toplevel.module());
    }
    Ok(())
}
