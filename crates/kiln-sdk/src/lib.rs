//! Kiln SDK - Lightweight SDK for writing native modules
//!
//! A native module is a named table of host functions and constants that
//! scripts reach through `import`. This crate has no dependency on the
//! engine: modules are described with plain Rust types and bound into a
//! context by `kiln-engine`.
//!
//! # Example
//!
//! ```ignore
//! use kiln_sdk::{ModuleInit, NativeModule};
//! use std::sync::Arc;
//!
//! fn add(a: f64, b: f64) -> f64 {
//!     a + b
//! }
//!
//! let init: ModuleInit = Arc::new(|module: &mut NativeModule| {
//!     module.function2("add", add);
//!     Ok(())
//! });
//! ```

#![warn(missing_docs)]

mod convert;
mod error;
mod module;
mod value;

pub use convert::{FromNative, ToNative};
pub use error::{NativeError, NativeResult};
pub use module::{ModuleInit, NativeFn, NativeModule};
pub use value::NativeValue;
