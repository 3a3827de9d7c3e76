//! Constant pool
//!
//! Strings are shared by `CONST_STR`, property names, global names and
//! export names. BigInt literals are stored as decimal strings so the
//! format does not depend on any particular big-integer representation.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Constant pool of a unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    /// String constants
    pub strings: Vec<String>,
    /// BigInt literals in decimal notation (optional leading `-`)
    pub bigints: Vec<String>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string, returning its index
    pub fn add_string(&mut self, value: impl Into<String>) -> u32 {
        self.strings.push(value.into());
        (self.strings.len() - 1) as u32
    }

    /// Add a string unless an equal one is already present
    pub fn intern_string(&mut self, value: &str) -> u32 {
        match self.strings.iter().position(|s| s == value) {
            Some(index) => index as u32,
            None => self.add_string(value),
        }
    }

    /// Add a BigInt literal, returning its index
    pub fn add_bigint(&mut self, decimal: impl Into<String>) -> u32 {
        self.bigints.push(decimal.into());
        (self.bigints.len() - 1) as u32
    }

    /// Get a string by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Get a BigInt literal by index
    pub fn get_bigint(&self, index: u32) -> Option<&str> {
        self.bigints.get(index as usize).map(String::as_str)
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
        writer.emit_u32(self.bigints.len() as u32);
        for b in &self.bigints {
            writer.emit_string(b);
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let strings = read_string_list(reader)?;
        let bigints = read_string_list(reader)?;
        Ok(Self { strings, bigints })
    }
}

/// Read a u32-counted list of strings.
///
/// The count is not trusted for pre-allocation; a hostile count simply runs
/// into `UnexpectedEnd`.
pub(crate) fn read_string_list(reader: &mut BytecodeReader<'_>) -> Result<Vec<String>, DecodeError> {
    let count = reader.read_u32()? as usize;
    let mut out = Vec::with_capacity(count.min(reader.remaining() / 4));
    for _ in 0..count {
        out.push(reader.read_string()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_string() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_string("log");
        let b = pool.intern_string("console");
        let c = pool.intern_string("log");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.strings.len(), 2);
    }

    #[test]
    fn test_pool_encoding() {
        let mut pool = ConstantPool::new();
        pool.add_string("hello");
        pool.add_bigint("-123456789012345678901234567890");

        let mut writer = BytecodeWriter::new();
        pool.encode(&mut writer);
        let bytes = writer.into_bytes();

        let decoded = ConstantPool::decode(&mut BytecodeReader::new(&bytes)).unwrap();
        assert_eq!(decoded.get_string(0), Some("hello"));
        assert_eq!(decoded.get_bigint(0), Some("-123456789012345678901234567890"));
        assert_eq!(decoded.get_string(1), None);
    }

    #[test]
    fn test_hostile_count() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u32(u32::MAX);
        let bytes = writer.into_bytes();
        let result = ConstantPool::decode(&mut BytecodeReader::new(&bytes));
        assert!(matches!(result, Err(DecodeError::UnexpectedEnd(_))));
    }
}
