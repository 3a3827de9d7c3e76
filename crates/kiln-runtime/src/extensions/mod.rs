//! Native extensions built into the host
//!
//! Configuration refers to them by name; each provides a module init
//! function that the context factory registers under the configured
//! module name.

pub mod fib;

use kiln_sdk::ModuleInit;

/// Names of the built-in extensions
pub const AVAILABLE: &[&str] = &["fib"];

/// Init function of the extension called `name`
pub fn lookup(name: &str) -> Option<ModuleInit> {
    match name {
        "fib" => Some(fib::init()),
        _ => None,
    }
}
