//! Programmatic unit assembly
//!
//! Used by embedders that generate units directly and by tests. Names are
//! recorded symbolically while a function is written and resolved against
//! the unit's constant pool when the function is added.
//!
//! ```
//! use kiln_bytecode::{FunctionBuilder, Opcode, UnitBuilder};
//!
//! let mut main = FunctionBuilder::new("", 0, 0);
//! main.load_global("console")
//!     .const_str("Hello World")
//!     .call_method("log", 1)
//!     .op(Opcode::Pop)
//!     .op(Opcode::ReturnUndefined);
//!
//! let mut unit = UnitBuilder::script("hello.js");
//! unit.entry(main).unwrap();
//! let bytes = unit.finish().encode();
//! assert_eq!(&bytes[..4], b"KLBC");
//! ```

use crate::encoder::BytecodeWriter;
use crate::opcode::Opcode;
use crate::unit::{flags, Function, Unit};
use thiserror::Error;

/// Errors raised while assembling a unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A label was jumped to but never bound
    #[error("Label {0} was never bound in function '{1}'")]
    UnboundLabel(usize, String),
}

/// A jump destination inside a [`FunctionBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone)]
enum Symbol {
    Str(String),
    BigInt(String),
    Import(String),
}

/// Builder for a single function body
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    name: String,
    param_count: usize,
    local_count: usize,
    writer: BytecodeWriter,
    labels: Vec<Option<usize>>,
    jumps: Vec<(usize, Label)>,
    symbols: Vec<(usize, Symbol)>,
}

impl FunctionBuilder {
    /// Start a function with the given parameter and local slot counts
    pub fn new(name: impl Into<String>, param_count: usize, local_count: usize) -> Self {
        Self {
            name: name.into(),
            param_count,
            local_count,
            writer: BytecodeWriter::new(),
            labels: Vec::new(),
            jumps: Vec::new(),
            symbols: Vec::new(),
        }
    }

    /// Current code offset
    pub fn offset(&self) -> usize {
        self.writer.offset()
    }

    /// Emit an instruction without operands
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.writer.emit_opcode(opcode);
        self
    }

    fn symbol(&mut self, opcode: Opcode, symbol: Symbol) -> &mut Self {
        self.writer.emit_opcode(opcode);
        let at = self.writer.offset();
        self.writer.emit_u32(0);
        self.symbols.push((at, symbol));
        self
    }

    /// Push a number
    pub fn const_i32(&mut self, value: i32) -> &mut Self {
        self.writer.emit_const_i32(value);
        self
    }

    /// Push a number
    pub fn const_f64(&mut self, value: f64) -> &mut Self {
        self.writer.emit_const_f64(value);
        self
    }

    /// Push a string
    pub fn const_str(&mut self, value: &str) -> &mut Self {
        self.symbol(Opcode::ConstStr, Symbol::Str(value.to_string()))
    }

    /// Push a BigInt given in decimal notation
    pub fn const_bigint(&mut self, decimal: &str) -> &mut Self {
        self.symbol(Opcode::ConstBigInt, Symbol::BigInt(decimal.to_string()))
    }

    /// Load a local slot
    pub fn load_local(&mut self, index: u16) -> &mut Self {
        self.writer.emit_with_u16(Opcode::LoadLocal, index);
        self
    }

    /// Store into a local slot
    pub fn store_local(&mut self, index: u16) -> &mut Self {
        self.writer.emit_with_u16(Opcode::StoreLocal, index);
        self
    }

    /// Load a unit-level variable
    pub fn load_unit_var(&mut self, index: u16) -> &mut Self {
        self.writer.emit_with_u16(Opcode::LoadUnitVar, index);
        self
    }

    /// Store into a unit-level variable
    pub fn store_unit_var(&mut self, index: u16) -> &mut Self {
        self.writer.emit_with_u16(Opcode::StoreUnitVar, index);
        self
    }

    /// Load a global binding
    pub fn load_global(&mut self, name: &str) -> &mut Self {
        self.symbol(Opcode::LoadGlobal, Symbol::Str(name.to_string()))
    }

    /// Store into a global binding
    pub fn store_global(&mut self, name: &str) -> &mut Self {
        self.symbol(Opcode::StoreGlobal, Symbol::Str(name.to_string()))
    }

    /// Read a named property of the object on the stack
    pub fn get_field(&mut self, name: &str) -> &mut Self {
        self.symbol(Opcode::GetField, Symbol::Str(name.to_string()))
    }

    /// Write a named property: stack is `object, value`
    pub fn set_field(&mut self, name: &str) -> &mut Self {
        self.symbol(Opcode::SetField, Symbol::Str(name.to_string()))
    }

    /// Call: stack is `callee, args...`
    pub fn call(&mut self, argc: u16) -> &mut Self {
        self.writer.emit_with_u16(Opcode::Call, argc);
        self
    }

    /// Method call: stack is `receiver, args...`
    pub fn call_method(&mut self, name: &str, argc: u16) -> &mut Self {
        self.symbol(Opcode::CallMethod, Symbol::Str(name.to_string()));
        self.writer.emit_u16(argc);
        self
    }

    /// Collect the top `count` values into an array
    pub fn new_array(&mut self, count: u16) -> &mut Self {
        self.writer.emit_with_u16(Opcode::NewArray, count);
        self
    }

    /// Push a closure over another function of the unit
    pub fn make_closure(&mut self, function_index: u32) -> &mut Self {
        self.writer.emit_with_u32(Opcode::MakeClosure, function_index);
        self
    }

    /// Push the namespace of a module
    pub fn import(&mut self, specifier: &str) -> &mut Self {
        self.symbol(Opcode::Import, Symbol::Import(specifier.to_string()))
    }

    /// Export the value on the stack
    pub fn export(&mut self, name: &str) -> &mut Self {
        self.symbol(Opcode::Export, Symbol::Str(name.to_string()))
    }

    /// Allocate an unbound label
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current offset
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.writer.offset());
        self
    }

    /// Emit a jump (`JMP`, `JMP_IF_FALSE`, `JMP_IF_TRUE`) or `TRY_BEGIN` to a label
    pub fn jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        let at = self.writer.emit_jump_placeholder(opcode);
        self.jumps.push((at, label));
        self
    }

    fn finish(mut self, unit: &mut Unit) -> Result<Function, BuildError> {
        for (at, label) in std::mem::take(&mut self.jumps) {
            let target = self.labels[label.0]
                .ok_or_else(|| BuildError::UnboundLabel(label.0, self.name.clone()))?;
            self.writer.patch_jump(at, target);
        }
        for (at, symbol) in std::mem::take(&mut self.symbols) {
            let index = match symbol {
                Symbol::Str(s) => unit.constants.intern_string(&s),
                Symbol::BigInt(b) => unit.constants.add_bigint(b),
                Symbol::Import(spec) => match unit.imports.iter().position(|i| *i == spec) {
                    Some(i) => i as u32,
                    None => {
                        unit.imports.push(spec);
                        (unit.imports.len() - 1) as u32
                    }
                },
            };
            self.writer.patch_u32(at, index);
        }
        Ok(Function {
            name: self.name,
            param_count: self.param_count,
            local_count: self.local_count,
            code: self.writer.into_bytes(),
        })
    }
}

/// Builder for a whole unit
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    unit: Unit,
}

impl UnitBuilder {
    /// Start a script-mode unit
    pub fn script(name: impl Into<String>) -> Self {
        let mut unit = Unit::new(name);
        unit.functions.push(Function {
            name: String::new(),
            param_count: 0,
            local_count: 0,
            code: vec![Opcode::ReturnUndefined.to_u8()],
        });
        Self { unit }
    }

    /// Start a module-mode unit
    pub fn module(name: impl Into<String>) -> Self {
        let mut builder = Self::script(name);
        builder.unit.flags |= flags::MODULE;
        builder
    }

    /// Mark the unit shareable across contexts
    pub fn shareable(mut self, shareable: bool) -> Self {
        if shareable {
            self.unit.flags |= flags::SHAREABLE;
        } else {
            self.unit.flags &= !flags::SHAREABLE;
        }
        self
    }

    /// Set the top-level function
    pub fn entry(&mut self, function: FunctionBuilder) -> Result<&mut Self, BuildError> {
        self.unit.functions[0] = function.finish(&mut self.unit)?;
        Ok(self)
    }

    /// Add a function, returning the index used by `MAKE_CLOSURE`
    pub fn function(&mut self, function: FunctionBuilder) -> Result<u32, BuildError> {
        let function = function.finish(&mut self.unit)?;
        self.unit.functions.push(function);
        Ok((self.unit.functions.len() - 1) as u32)
    }

    /// Index the next added function will get
    pub fn next_function_index(&self) -> u32 {
        self.unit.functions.len() as u32
    }

    /// Finish the unit
    pub fn finish(self) -> Unit {
        self.unit
    }
}
