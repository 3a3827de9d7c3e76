//! The built-in demo unit
//!
//! Equivalent to this module, compiled:
//!
//! ```js
//! import * as m from "./fib.so";
//! console.log("Hello World");
//! console.log("fib(10)=", m.fib(10));
//! ```
//!
//! Its name is `examples/test_fib.js`, so the import resolves to the
//! `examples/fib.so` native module bound by the default configuration.

use crate::host::BytesSource;
use kiln_bytecode::{BuildError, FunctionBuilder, Opcode, UnitBuilder};

/// Name the demo unit is compiled under
pub const DEMO_NAME: &str = "examples/test_fib.js";

/// Encoded demo unit
pub fn test_fib_unit() -> Result<Vec<u8>, BuildError> {
    let mut main = FunctionBuilder::new("", 0, 1);
    main.import("./fib.so")
        .store_local(0)
        .load_global("console")
        .const_str("Hello World")
        .call_method("log", 1)
        .op(Opcode::Pop)
        .load_global("console")
        .const_str("fib(10)=")
        .load_local(0)
        .const_i32(10)
        .call_method("fib", 1)
        .call_method("log", 2)
        .op(Opcode::Pop)
        .op(Opcode::ReturnUndefined);

    let mut builder = UnitBuilder::module(DEMO_NAME);
    builder.entry(main)?;
    Ok(builder.finish().encode())
}

/// The demo unit as a host source
pub fn embedded() -> Result<BytesSource, BuildError> {
    Ok(BytesSource::new(DEMO_NAME, test_fib_unit()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_engine::BytecodeLoader;

    #[test]
    fn test_demo_unit_verifies() {
        let unit = BytecodeLoader::load(&test_fib_unit().unwrap()).unwrap();
        assert!(unit.is_module());
        assert_eq!(unit.name(), DEMO_NAME);
        assert_eq!(unit.imports(), &["./fib.so".to_string()]);
    }
}
