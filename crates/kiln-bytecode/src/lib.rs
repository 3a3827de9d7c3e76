//! Kiln Bytecode Definitions
//!
//! The serialized unit format consumed by the Kiln engine: instruction set,
//! constant pool, unit encoding with header/length/checksum validation,
//! a structural verifier, and a builder for assembling units in code.

#![warn(rust_2018_idioms)]

pub mod builder;
pub mod constants;
pub mod encoder;
pub mod opcode;
pub mod unit;
pub mod verify;

pub use builder::{BuildError, FunctionBuilder, Label, UnitBuilder};
pub use constants::ConstantPool;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use opcode::Opcode;
pub use unit::{flags, Function, Unit, UnitError, HEADER_SIZE, MAGIC, VERSION};
pub use verify::{verify_unit, VerifyError, MAX_STACK_DEPTH};
