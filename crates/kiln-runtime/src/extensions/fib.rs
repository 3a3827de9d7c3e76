//! `fib` extension: exports `fib(n)`

use kiln_sdk::{FromNative, ModuleInit, NativeError, NativeModule, NativeValue};
use std::sync::Arc;

/// Largest `n` whose Fibonacci number fits in an `i64`
const MAX_N: i64 = 92;

/// Fibonacci number `n`, with `fib(n) = 0` for `n <= 0`
pub fn fib(n: i64) -> Option<i64> {
    if n > MAX_N {
        return None;
    }
    if n <= 0 {
        return Some(0);
    }
    let (mut a, mut b) = (0i64, 1i64);
    for _ in 1..n {
        let next = a.checked_add(b)?;
        a = b;
        b = next;
    }
    Some(b)
}

/// Module init registering `fib`
pub fn init() -> ModuleInit {
    Arc::new(|module: &mut NativeModule| {
        module.set_version("1.0.0");
        module.register_function("fib", |args| {
            let n = i64::from_native(args.first().unwrap_or(&NativeValue::Undefined))?;
            fib(n)
                .map(NativeValue::Int)
                .ok_or_else(|| NativeError::ArgumentError(format!("fib({}) overflows a 64-bit integer", n)))
        });
        Ok(())
    })
}
