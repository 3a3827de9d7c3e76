//! Serialized unit format
//!
//! A unit is the on-disk form of one compiled script or module:
//!
//! ```text
//! header   magic "KLBC" | version u32 | flags u32 | payload_len u32 | crc32 u32
//! payload  name | constant pool | imports | functions
//! ```
//!
//! All integers are little-endian. The checksum covers the payload only.

use crate::constants::{read_string_list, ConstantPool};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use thiserror::Error;

/// Magic number for Kiln units: "KLBC"
pub const MAGIC: [u8; 4] = *b"KLBC";

/// Current format version
pub const VERSION: u32 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 20;

/// Unit flags
pub mod flags {
    /// Unit was compiled in module mode (imports/exports, unit-local bindings)
    pub const MODULE: u32 = 1 << 0;
    /// The compiled image may be bound to more than one context
    pub const SHAREABLE: u32 = 1 << 1;
    /// Unit carries debug information
    pub const HAS_DEBUG_INFO: u32 = 1 << 2;

    /// Every flag this version understands
    pub const KNOWN: u32 = MODULE | SHAREABLE | HAS_DEBUG_INFO;
}

/// Unit encoding/decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    /// Buffer shorter than the fixed header
    #[error("Truncated unit: {0} bytes, header needs {HEADER_SIZE}")]
    Truncated(usize),

    /// Invalid magic number
    #[error("Invalid magic number: expected KLBC, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Flag bits this version does not know
    #[error("Unknown unit flags: {0:#x}")]
    UnknownFlags(u32),

    /// Declared payload length disagrees with the buffer
    #[error("Payload length mismatch: header declares {declared} bytes, buffer holds {actual}")]
    LengthMismatch {
        /// Length from the header
        declared: usize,
        /// Bytes actually present after the header
        actual: usize,
    },

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Checksum of the payload as read
        actual: u32,
    },

    /// Payload section could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Bytes left after the function table
    #[error("{0} trailing bytes after the function table")]
    TrailingBytes(usize),

    /// A unit needs at least its top-level function
    #[error("Unit has no top-level function")]
    NoEntryPoint,
}

/// Function definition
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Function name (empty for anonymous functions)
    pub name: String,
    /// Number of parameters
    pub param_count: usize,
    /// Number of local slots, parameters included
    pub local_count: usize,
    /// Bytecode instructions
    pub code: Vec<u8>,
}

impl Function {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.param_count as u32);
        writer.emit_u32(self.local_count as u32);
        writer.emit_blob(&self.code);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let param_count = reader.read_u32()? as usize;
        let local_count = reader.read_u32()? as usize;
        let code = reader.read_blob()?;
        Ok(Self {
            name,
            param_count,
            local_count,
            code,
        })
    }
}

/// A decoded unit
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Unit flags (see [`flags`])
    pub flags: u32,
    /// Originating name or path, also the module name in module mode
    pub name: String,
    /// Constant pool
    pub constants: ConstantPool,
    /// Module specifiers referenced by `IMPORT`
    pub imports: Vec<String>,
    /// Function table; index 0 is the top-level code
    pub functions: Vec<Function>,
}

impl Unit {
    /// Create an empty script-mode unit
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            flags: 0,
            name: name.into(),
            constants: ConstantPool::new(),
            imports: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Whether the unit was compiled in module mode
    pub fn is_module(&self) -> bool {
        self.flags & flags::MODULE != 0
    }

    /// Whether the unit is marked shareable across contexts
    pub fn is_shareable(&self) -> bool {
        self.flags & flags::SHAREABLE != 0
    }

    /// The top-level function
    pub fn entry(&self) -> Option<&Function> {
        self.functions.first()
    }

    /// Encode the unit to its binary format
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.buffer.extend_from_slice(&MAGIC);
        writer.emit_u32(VERSION);
        writer.emit_u32(self.flags);
        let length_at = writer.offset();
        writer.emit_u32(0);
        let checksum_at = writer.offset();
        writer.emit_u32(0);

        writer.emit_string(&self.name);
        self.constants.encode(&mut writer);
        writer.emit_u32(self.imports.len() as u32);
        for import in &self.imports {
            writer.emit_string(import);
        }
        writer.emit_u32(self.functions.len() as u32);
        for func in &self.functions {
            func.encode(&mut writer);
        }

        let payload_len = writer.offset() - HEADER_SIZE;
        let checksum = crc32fast::hash(&writer.buffer[HEADER_SIZE..]);
        writer.patch_u32(length_at, payload_len as u32);
        writer.patch_u32(checksum_at, checksum);

        writer.into_bytes()
    }

    /// Decode a unit, checking header, length and checksum.
    ///
    /// This only establishes that the buffer is well formed. Cross-references
    /// inside the code are checked by [`crate::verify_unit`].
    pub fn decode(data: &[u8]) -> Result<Self, UnitError> {
        if data.len() < HEADER_SIZE {
            return Err(UnitError::Truncated(data.len()));
        }

        let mut header = BytecodeReader::new(&data[..HEADER_SIZE]);
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header.read_bytes(4)?);
        if magic != MAGIC {
            return Err(UnitError::InvalidMagic(magic));
        }

        let version = header.read_u32()?;
        if version != VERSION {
            return Err(UnitError::UnsupportedVersion(version));
        }

        let unit_flags = header.read_u32()?;
        if unit_flags & !flags::KNOWN != 0 {
            return Err(UnitError::UnknownFlags(unit_flags & !flags::KNOWN));
        }

        let declared = header.read_u32()? as usize;
        let payload = &data[HEADER_SIZE..];
        if declared != payload.len() {
            return Err(UnitError::LengthMismatch {
                declared,
                actual: payload.len(),
            });
        }

        let expected = header.read_u32()?;
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(UnitError::ChecksumMismatch { expected, actual });
        }

        let mut reader = BytecodeReader::new(payload);
        let name = reader.read_string()?;
        let constants = ConstantPool::decode(&mut reader)?;
        let imports = read_string_list(&mut reader)?;

        let func_count = reader.read_u32()? as usize;
        let mut functions = Vec::with_capacity(func_count.min(reader.remaining() / 16));
        for _ in 0..func_count {
            functions.push(Function::decode(&mut reader)?);
        }

        if reader.has_more() {
            return Err(UnitError::TrailingBytes(reader.remaining()));
        }
        if functions.is_empty() {
            return Err(UnitError::NoEntryPoint);
        }

        Ok(Self {
            flags: unit_flags,
            name,
            constants,
            imports,
            functions,
        })
    }
}
