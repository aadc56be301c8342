use crate::ir::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_STEPS};

/// Settings for one compiler session.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub module_name: String,
    /// Run the per-function pass pipeline on every finished function.
    pub optimize: bool,
    /// Evaluate top-level expressions as they are lowered.
    pub evaluate: bool,
    pub max_steps: u64,
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            module_name: "my cool jit".to_owned(),
            optimize: false,
            evaluate: true,
            max_steps: DEFAULT_MAX_STEPS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
