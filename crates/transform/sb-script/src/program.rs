//! Script loading and compilation.

use rhai::{Engine, AST};
use sb_error::{BridgeError, Result, ScriptError};
use sb_types::{EngineLimits, ScriptConfig, DEFAULT_SCRIPT_NAME};
use std::path::Path;
use tracing::debug;

/// A compiled script together with the name used in diagnostics.
///
/// Immutable once built; every execution runs the same AST.
#[derive(Debug, Clone)]
pub struct ScriptProgram {
    ast: AST,
    name: String,
}

impl ScriptProgram {
    /// Loads and compiles the script described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - both or neither of `code` and `file` are set
    /// - the script file cannot be read
    /// - the script fails to compile
    pub async fn load(config: &ScriptConfig) -> Result<Self> {
        match (config.inline_code(), config.script_file()) {
            (Some(_), Some(_)) => Err(BridgeError::Config(
                "both 'code' and 'file' fields are specified but only one is allowed".to_string(),
            )),
            (None, None) => Err(BridgeError::Config(
                "neither 'code' nor 'file' fields are specified but one of them is required"
                    .to_string(),
            )),
            (Some(code), None) => Self::compile(DEFAULT_SCRIPT_NAME, code, &config.limits),
            (None, Some(path)) => {
                let code = load_script_from_file(path).await?;
                Self::compile(path, &code, &config.limits)
            }
        }
    }

    /// Compiles `source` under the display name `name`.
    pub fn compile(name: impl Into<String>, source: &str, limits: &EngineLimits) -> Result<Self> {
        let name = name.into();
        let engine = create_engine(limits);

        let mut ast = engine
            .compile(source)
            .map_err(|e| ScriptError::Compilation(format!("{name}: {e}")))?;
        ast.set_source(name.as_str());

        debug!(script = %name, "Compiled script");

        Ok(Self { ast, name })
    }

    /// Display name (the file path, or `main.rhai` for inline code).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

/// Creates a bare engine with safety limits applied.
///
/// Packages, module resolution and host functions are added per execution.
pub(crate) fn create_engine(limits: &EngineLimits) -> Engine {
    let mut engine = Engine::new_raw();

    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_function_expr_depth);
    engine.set_max_operations(limits.max_operations);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.set_max_call_levels(limits.max_call_levels);

    engine
}

async fn load_script_from_file(path: &str) -> Result<String> {
    let path = Path::new(path);
    tokio::fs::read_to_string(path).await.map_err(|e| {
        BridgeError::Io(format!(
            "failed to open the file specified in 'file' field {}: {e}",
            path.display()
        ))
    })
}
