//! Script console bound to the tracing logger.

use rhai::{Dynamic, Engine};
use tracing::{debug, error, info, warn};

/// Log target for everything a script writes.
pub const CONSOLE_TARGET: &str = "sb_script::console";

/// The `console` object visible to scripts.
///
/// `console.log`, `console.warn` and `console.error` map onto the info, warn
/// and error levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Console;

/// Registers the `Console` type and routes `print`/`debug` into tracing.
///
/// `console` resolves as a variable in every context: the main script,
/// script functions and imported modules. It shadows any script variable of
/// the same name.
pub fn register_console(engine: &mut Engine) {
    engine.register_type_with_name::<Console>("Console");

    engine.register_fn("log", |_: Console, message: Dynamic| {
        info!(target: CONSOLE_TARGET, "{message}");
    });
    engine.register_fn("warn", |_: Console, message: Dynamic| {
        warn!(target: CONSOLE_TARGET, "{message}");
    });
    engine.register_fn("error", |_: Console, message: Dynamic| {
        error!(target: CONSOLE_TARGET, "{message}");
    });

    // Function bodies cannot see the caller's scope, so resolve on the engine.
    #[allow(deprecated)]
    engine.on_var(|name, _, _| Ok((name == "console").then(|| Dynamic::from(Console))));

    engine.on_print(|text| info!(target: CONSOLE_TARGET, "{text}"));
    engine.on_debug(|text, source, pos| {
        debug!(target: CONSOLE_TARGET, source = source.unwrap_or("-"), position = %pos, "{text}");
    });
}
