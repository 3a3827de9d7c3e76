//! Instruction set of the Kiln engine
//!
//! Every opcode is a single byte, optionally followed by little-endian
//! operands. Operand widths are fixed per opcode (see [`Opcode::operand_size`]).
//!
//! Opcodes are grouped by range:
//! - 0x00-0x0F: Stack manipulation & constants
//! - 0x10-0x1F: Variables (locals, unit variables, globals)
//! - 0x20-0x2F: Arithmetic
//! - 0x30-0x3F: Comparison & logical
//! - 0x40-0x4F: Control flow
//! - 0x50-0x5F: Calls
//! - 0x60-0x6F: Objects & arrays
//! - 0x70-0x7F: Exceptions
//! - 0x80-0x8F: Modules

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Swap top two stack values
    Swap = 0x03,
    /// Push undefined
    ConstUndefined = 0x04,
    /// Push null
    ConstNull = 0x05,
    /// Push true
    ConstTrue = 0x06,
    /// Push false
    ConstFalse = 0x07,
    /// Push a number from an inline 32-bit integer (operand: i32)
    ConstI32 = 0x08,
    /// Push a number from an inline double (operand: f64)
    ConstF64 = 0x09,
    /// Push a string from the constant pool (operand: u32 string index)
    ConstStr = 0x0A,
    /// Push a BigInt from the constant pool (operand: u32 bigint index)
    ConstBigInt = 0x0B,

    // ===== Variables (0x10-0x1F) =====
    /// Load local variable (operand: u16 index)
    LoadLocal = 0x10,
    /// Pop into local variable (operand: u16 index)
    StoreLocal = 0x11,
    /// Load a unit-level variable, i.e. a local of the top-level function (operand: u16 index)
    LoadUnitVar = 0x12,
    /// Pop into a unit-level variable (operand: u16 index)
    StoreUnitVar = 0x13,
    /// Load a property of the global object by name (operand: u32 string index)
    LoadGlobal = 0x14,
    /// Pop into a property of the global object (operand: u32 string index)
    StoreGlobal = 0x15,

    // ===== Arithmetic (0x20-0x2F) =====
    /// pop b, pop a, push a + b (numeric add or string concatenation)
    Add = 0x20,
    /// pop b, pop a, push a - b
    Sub = 0x21,
    /// pop b, pop a, push a * b
    Mul = 0x22,
    /// pop b, pop a, push a / b
    Div = 0x23,
    /// pop b, pop a, push a % b
    Mod = 0x24,
    /// pop a, push -a
    Neg = 0x25,

    // ===== Comparison & Logical (0x30-0x3F) =====
    /// Loose equality
    Eq = 0x30,
    /// Loose inequality
    Ne = 0x31,
    /// Strict equality
    StrictEq = 0x32,
    /// Strict inequality
    StrictNe = 0x33,
    /// Less than
    Lt = 0x34,
    /// Less or equal
    Le = 0x35,
    /// Greater than
    Gt = 0x36,
    /// Greater or equal
    Ge = 0x37,
    /// Logical not
    Not = 0x38,
    /// Push the type name of the popped value
    Typeof = 0x39,

    // ===== Control Flow (0x40-0x4F) =====
    /// Unconditional jump (operand: i32 offset from the end of the instruction)
    Jmp = 0x40,
    /// Pop, jump if falsy (operand: i32 offset)
    JmpIfFalse = 0x41,
    /// Pop, jump if truthy (operand: i32 offset)
    JmpIfTrue = 0x42,

    // ===== Calls (0x50-0x5F) =====
    /// Call a function: stack is `callee, arg0..argN` (operand: u16 argc)
    Call = 0x50,
    /// Call a named method: stack is `receiver, arg0..argN` (operands: u32 name index, u16 argc)
    CallMethod = 0x51,
    /// Return the popped value
    Return = 0x52,
    /// Return undefined
    ReturnUndefined = 0x53,
    /// Push a closure over a function of this unit (operand: u32 function index)
    MakeClosure = 0x54,

    // ===== Objects & Arrays (0x60-0x6F) =====
    /// Push a fresh ordinary object
    NewObject = 0x60,
    /// Pop N values and push them as an array (operand: u16 count)
    NewArray = 0x61,
    /// pop obj, push obj[name] (operand: u32 name index)
    GetField = 0x62,
    /// pop value, pop obj, obj[name] = value (operand: u32 name index)
    SetField = 0x63,
    /// pop key, pop obj, push obj[key]
    GetElem = 0x64,
    /// pop value, pop key, pop obj, obj[key] = value
    SetElem = 0x65,

    // ===== Exceptions (0x70-0x7F) =====
    /// Throw the popped value
    Throw = 0x70,
    /// Install an exception handler (operand: i32 offset of the handler)
    TryBegin = 0x71,
    /// Remove the innermost exception handler
    TryEnd = 0x72,

    // ===== Modules (0x80-0x8F) =====
    /// Push the namespace of an imported module (operand: u32 import index)
    Import = 0x80,
    /// Pop a value and export it under a name (operand: u32 name index)
    Export = 0x81,
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        let op = match byte {
            0x00 => Self::Nop,
            0x01 => Self::Pop,
            0x02 => Self::Dup,
            0x03 => Self::Swap,
            0x04 => Self::ConstUndefined,
            0x05 => Self::ConstNull,
            0x06 => Self::ConstTrue,
            0x07 => Self::ConstFalse,
            0x08 => Self::ConstI32,
            0x09 => Self::ConstF64,
            0x0A => Self::ConstStr,
            0x0B => Self::ConstBigInt,

            0x10 => Self::LoadLocal,
            0x11 => Self::StoreLocal,
            0x12 => Self::LoadUnitVar,
            0x13 => Self::StoreUnitVar,
            0x14 => Self::LoadGlobal,
            0x15 => Self::StoreGlobal,

            0x20 => Self::Add,
            0x21 => Self::Sub,
            0x22 => Self::Mul,
            0x23 => Self::Div,
            0x24 => Self::Mod,
            0x25 => Self::Neg,

            0x30 => Self::Eq,
            0x31 => Self::Ne,
            0x32 => Self::StrictEq,
            0x33 => Self::StrictNe,
            0x34 => Self::Lt,
            0x35 => Self::Le,
            0x36 => Self::Gt,
            0x37 => Self::Ge,
            0x38 => Self::Not,
            0x39 => Self::Typeof,

            0x40 => Self::Jmp,
            0x41 => Self::JmpIfFalse,
            0x42 => Self::JmpIfTrue,

            0x50 => Self::Call,
            0x51 => Self::CallMethod,
            0x52 => Self::Return,
            0x53 => Self::ReturnUndefined,
            0x54 => Self::MakeClosure,

            0x60 => Self::NewObject,
            0x61 => Self::NewArray,
            0x62 => Self::GetField,
            0x63 => Self::SetField,
            0x64 => Self::GetElem,
            0x65 => Self::SetElem,

            0x70 => Self::Throw,
            0x71 => Self::TryBegin,
            0x72 => Self::TryEnd,

            0x80 => Self::Import,
            0x81 => Self::Export,

            _ => return None,
        };
        Some(op)
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Size in bytes of the operands following this opcode
    pub fn operand_size(self) -> usize {
        match self {
            Self::LoadLocal
            | Self::StoreLocal
            | Self::LoadUnitVar
            | Self::StoreUnitVar
            | Self::Call
            | Self::NewArray => 2,

            Self::ConstI32
            | Self::ConstStr
            | Self::ConstBigInt
            | Self::LoadGlobal
            | Self::StoreGlobal
            | Self::Jmp
            | Self::JmpIfFalse
            | Self::JmpIfTrue
            | Self::MakeClosure
            | Self::GetField
            | Self::SetField
            | Self::TryBegin
            | Self::Import
            | Self::Export => 4,

            Self::CallMethod => 6,
            Self::ConstF64 => 8,

            _ => 0,
        }
    }

    /// Get the human-readable name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::Swap => "SWAP",
            Self::ConstUndefined => "CONST_UNDEFINED",
            Self::ConstNull => "CONST_NULL",
            Self::ConstTrue => "CONST_TRUE",
            Self::ConstFalse => "CONST_FALSE",
            Self::ConstI32 => "CONST_I32",
            Self::ConstF64 => "CONST_F64",
            Self::ConstStr => "CONST_STR",
            Self::ConstBigInt => "CONST_BIGINT",
            Self::LoadLocal => "LOAD_LOCAL",
            Self::StoreLocal => "STORE_LOCAL",
            Self::LoadUnitVar => "LOAD_UNIT_VAR",
            Self::StoreUnitVar => "STORE_UNIT_VAR",
            Self::LoadGlobal => "LOAD_GLOBAL",
            Self::StoreGlobal => "STORE_GLOBAL",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Neg => "NEG",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::StrictEq => "STRICT_EQ",
            Self::StrictNe => "STRICT_NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Not => "NOT",
            Self::Typeof => "TYPEOF",
            Self::Jmp => "JMP",
            Self::JmpIfFalse => "JMP_IF_FALSE",
            Self::JmpIfTrue => "JMP_IF_TRUE",
            Self::Call => "CALL",
            Self::CallMethod => "CALL_METHOD",
            Self::Return => "RETURN",
            Self::ReturnUndefined => "RETURN_UNDEFINED",
            Self::MakeClosure => "MAKE_CLOSURE",
            Self::NewObject => "NEW_OBJECT",
            Self::NewArray => "NEW_ARRAY",
            Self::GetField => "GET_FIELD",
            Self::SetField => "SET_FIELD",
            Self::GetElem => "GET_ELEM",
            Self::SetElem => "SET_ELEM",
            Self::Throw => "THROW",
            Self::TryBegin => "TRY_BEGIN",
            Self::TryEnd => "TRY_END",
            Self::Import => "IMPORT",
            Self::Export => "EXPORT",
        }
    }

    /// Check if this opcode is a jump instruction
    pub fn is_jump(self) -> bool {
        matches!(self, Self::Jmp | Self::JmpIfFalse | Self::JmpIfTrue)
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ReturnUndefined)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return() || matches!(self, Self::Throw | Self::Jmp)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0u8..=0xFF {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.to_u8(), byte, "opcode {} does not round-trip", op);
            }
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x0C), None);
        assert_eq!(Opcode::from_u8(0x99), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::Nop.name(), "NOP");
        assert_eq!(Opcode::CallMethod.name(), "CALL_METHOD");
        assert_eq!(Opcode::ConstBigInt.to_string(), "CONST_BIGINT");
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(Opcode::Add.operand_size(), 0);
        assert_eq!(Opcode::LoadLocal.operand_size(), 2);
        assert_eq!(Opcode::ConstStr.operand_size(), 4);
        assert_eq!(Opcode::CallMethod.operand_size(), 6);
        assert_eq!(Opcode::ConstF64.operand_size(), 8);
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Return.is_terminator());
        assert!(Opcode::ReturnUndefined.is_terminator());
        assert!(Opcode::Throw.is_terminator());
        assert!(Opcode::Jmp.is_terminator());
        assert!(!Opcode::JmpIfFalse.is_terminator());
        assert!(!Opcode::Call.is_terminator());
    }
}
