//! Bytecode verification
//!
//! Runs once per unit before anything executes. After a unit passes, the
//! interpreter may index the constant pool, locals, the function table and
//! the import table without further checks.

use crate::encoder::BytecodeReader;
use crate::opcode::Opcode;
use crate::unit::{Function, Unit};
use std::collections::HashMap;

/// Deepest operand stack a single function may build
pub const MAX_STACK_DEPTH: i32 = 1024;

/// Bytecode verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Invalid opcode
    #[error("Invalid opcode {opcode:#04x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    /// Operands run past the end of the code
    #[error("Truncated instruction at offset {0}")]
    TruncatedInstruction(usize),

    /// Jump or handler target is not an instruction boundary
    #[error("Invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget { target: i64, offset: usize },

    /// String constant index out of range
    #[error("Invalid string constant reference: index {index} at offset {offset}")]
    InvalidStringRef { index: u32, offset: usize },

    /// BigInt constant index out of range
    #[error("Invalid bigint constant reference: index {index} at offset {offset}")]
    InvalidBigIntRef { index: u32, offset: usize },

    /// Local variable index out of range
    #[error("Invalid local variable reference: index {index} (max {max}) at offset {offset}")]
    InvalidLocalRef {
        index: usize,
        max: usize,
        offset: usize,
    },

    /// Unit variable index out of range
    #[error("Invalid unit variable reference: index {index} (max {max}) at offset {offset}")]
    InvalidUnitVarRef {
        index: usize,
        max: usize,
        offset: usize,
    },

    /// Function index out of range
    #[error("Invalid function reference: index {index} at offset {offset}")]
    InvalidFunctionRef { index: u32, offset: usize },

    /// Import index out of range
    #[error("Invalid import reference: index {index} at offset {offset}")]
    InvalidImportRef { index: u32, offset: usize },

    /// `EXPORT` used by a unit compiled in script mode
    #[error("EXPORT at offset {0} in a script-mode unit")]
    ExportInScript(usize),

    /// More parameters than local slots
    #[error("Function declares {params} parameters but only {locals} locals")]
    ParamsExceedLocals { params: usize, locals: usize },

    /// Stack underflow
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// Stack overflow
    #[error("Stack overflow at offset {0} (depth: {1})")]
    StackOverflow(usize, i32),

    /// Two paths reach an instruction with different stack depths
    #[error("Inconsistent stack depth at offset {offset}: {first} vs {second}")]
    StackMismatch {
        offset: usize,
        first: i32,
        second: i32,
    },

    /// Execution falls off end
    #[error("Execution falls off end of function at offset {0}")]
    FallOffEnd(usize),

    /// Error located inside a specific function
    #[error("Function #{index} ({name}): {source}")]
    InFunction {
        index: usize,
        name: String,
        #[source]
        source: Box<VerifyError>,
    },
}

/// Verify every function of a unit
pub fn verify_unit(unit: &Unit) -> Result<(), VerifyError> {
    let unit_vars = unit.entry().map_or(0, |f| f.local_count);
    for (index, function) in unit.functions.iter().enumerate() {
        verify_function(function, unit, unit_vars).map_err(|e| VerifyError::InFunction {
            index,
            name: function.name.clone(),
            source: Box::new(e),
        })?;
    }
    Ok(())
}

/// Verify a single function's bytecode
fn verify_function(function: &Function, unit: &Unit, unit_vars: usize) -> Result<(), VerifyError> {
    if function.param_count > function.local_count {
        return Err(VerifyError::ParamsExceedLocals {
            params: function.param_count,
            locals: function.local_count,
        });
    }

    let instructions = parse_instructions(&function.code)?;
    match instructions.last() {
        None => return Err(VerifyError::FallOffEnd(0)),
        Some(last) if !last.opcode.is_terminator() => {
            return Err(VerifyError::FallOffEnd(last.offset))
        }
        Some(_) => {}
    }

    let boundaries: HashMap<usize, usize> = instructions
        .iter()
        .enumerate()
        .map(|(i, instr)| (instr.offset, i))
        .collect();

    for instr in &instructions {
        verify_operands(instr, function, unit, unit_vars)?;
    }

    verify_stack_depth(&instructions, &boundaries)
}

/// Parsed instruction
#[derive(Debug, Clone)]
struct Instruction {
    offset: usize,
    opcode: Opcode,
    operands: Vec<u8>,
}

impl Instruction {
    fn end(&self) -> usize {
        self.offset + 1 + self.operands.len()
    }

    fn u16_at(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.operands[at], self.operands[at + 1]])
    }

    fn u32_at(&self, at: usize) -> u32 {
        u32::from_le_bytes([
            self.operands[at],
            self.operands[at + 1],
            self.operands[at + 2],
            self.operands[at + 3],
        ])
    }

    /// Absolute target of a jump or handler, relative to the end of the instruction
    fn branch_target(&self) -> i64 {
        self.end() as i64 + self.u32_at(0) as i32 as i64
    }
}

/// Parse all instructions from bytecode
fn parse_instructions(code: &[u8]) -> Result<Vec<Instruction>, VerifyError> {
    let mut instructions = Vec::new();
    let mut reader = BytecodeReader::new(code);

    while reader.has_more() {
        let offset = reader.position();
        let byte = reader
            .read_u8()
            .map_err(|_| VerifyError::TruncatedInstruction(offset))?;
        let opcode = Opcode::from_u8(byte).ok_or(VerifyError::InvalidOpcode {
            opcode: byte,
            offset,
        })?;
        let operands = reader
            .read_bytes(opcode.operand_size())
            .map_err(|_| VerifyError::TruncatedInstruction(offset))?;

        instructions.push(Instruction {
            offset,
            opcode,
            operands,
        });
    }

    Ok(instructions)
}

/// Check every index operand against the tables it refers to
fn verify_operands(
    instr: &Instruction,
    function: &Function,
    unit: &Unit,
    unit_vars: usize,
) -> Result<(), VerifyError> {
    let offset = instr.offset;
    match instr.opcode {
        Opcode::ConstStr
        | Opcode::LoadGlobal
        | Opcode::StoreGlobal
        | Opcode::GetField
        | Opcode::SetField
        | Opcode::CallMethod
        | Opcode::Export => {
            let index = instr.u32_at(0);
            if unit.constants.get_string(index).is_none() {
                return Err(VerifyError::InvalidStringRef { index, offset });
            }
            if instr.opcode == Opcode::Export && !unit.is_module() {
                return Err(VerifyError::ExportInScript(offset));
            }
        }
        Opcode::ConstBigInt => {
            let index = instr.u32_at(0);
            if unit.constants.get_bigint(index).is_none() {
                return Err(VerifyError::InvalidBigIntRef { index, offset });
            }
        }
        Opcode::LoadLocal | Opcode::StoreLocal => {
            let index = instr.u16_at(0) as usize;
            if index >= function.local_count {
                return Err(VerifyError::InvalidLocalRef {
                    index,
                    max: function.local_count,
                    offset,
                });
            }
        }
        Opcode::LoadUnitVar | Opcode::StoreUnitVar => {
            let index = instr.u16_at(0) as usize;
            if index >= unit_vars {
                return Err(VerifyError::InvalidUnitVarRef {
                    index,
                    max: unit_vars,
                    offset,
                });
            }
        }
        Opcode::MakeClosure => {
            let index = instr.u32_at(0);
            if index as usize >= unit.functions.len() {
                return Err(VerifyError::InvalidFunctionRef { index, offset });
            }
        }
        Opcode::Import => {
            let index = instr.u32_at(0);
            if index as usize >= unit.imports.len() {
                return Err(VerifyError::InvalidImportRef { index, offset });
            }
        }
        _ => {}
    }
    Ok(())
}

/// Stack effect of an instruction (pops, pushes)
fn stack_effect(instr: &Instruction) -> (i32, i32) {
    match instr.opcode {
        Opcode::Nop | Opcode::Jmp | Opcode::TryBegin | Opcode::TryEnd => (0, 0),
        Opcode::Pop => (1, 0),
        Opcode::Dup => (1, 2),
        Opcode::Swap => (2, 2),
        Opcode::ConstUndefined
        | Opcode::ConstNull
        | Opcode::ConstTrue
        | Opcode::ConstFalse
        | Opcode::ConstI32
        | Opcode::ConstF64
        | Opcode::ConstStr
        | Opcode::ConstBigInt
        | Opcode::LoadLocal
        | Opcode::LoadUnitVar
        | Opcode::LoadGlobal
        | Opcode::MakeClosure
        | Opcode::NewObject
        | Opcode::Import => (0, 1),
        Opcode::StoreLocal
        | Opcode::StoreUnitVar
        | Opcode::StoreGlobal
        | Opcode::JmpIfFalse
        | Opcode::JmpIfTrue
        | Opcode::Return
        | Opcode::Throw
        | Opcode::Export => (1, 0),
        Opcode::ReturnUndefined => (0, 0),
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod
        | Opcode::Eq
        | Opcode::Ne
        | Opcode::StrictEq
        | Opcode::StrictNe
        | Opcode::Lt
        | Opcode::Le
        | Opcode::Gt
        | Opcode::Ge
        | Opcode::GetElem => (2, 1),
        Opcode::Neg | Opcode::Not | Opcode::Typeof | Opcode::GetField => (1, 1),
        Opcode::SetField => (2, 0),
        Opcode::SetElem => (3, 0),
        Opcode::Call => (instr.u16_at(0) as i32 + 1, 1),
        Opcode::CallMethod => (instr.u16_at(4) as i32 + 1, 1),
        Opcode::NewArray => (instr.u16_at(0) as i32, 1),
    }
}

/// Verify stack depth consistency by abstract interpretation over the CFG.
///
/// Exception handlers are entered with the depth recorded at their
/// `TRY_BEGIN` plus the thrown value.
fn verify_stack_depth(
    instructions: &[Instruction],
    boundaries: &HashMap<usize, usize>,
) -> Result<(), VerifyError> {
    let mut depth_at: Vec<Option<i32>> = vec![None; instructions.len()];
    let mut worklist = vec![(0usize, 0i32)];

    let resolve = |instr: &Instruction| -> Result<usize, VerifyError> {
        let target = instr.branch_target();
        usize::try_from(target)
            .ok()
            .and_then(|t| boundaries.get(&t).copied())
            .ok_or(VerifyError::InvalidJumpTarget {
                target,
                offset: instr.offset,
            })
    };

    while let Some((index, depth)) = worklist.pop() {
        let instr = &instructions[index];
        match depth_at[index] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(VerifyError::StackMismatch {
                    offset: instr.offset,
                    first: seen,
                    second: depth,
                })
            }
            None => depth_at[index] = Some(depth),
        }

        let (pops, pushes) = stack_effect(instr);
        if depth < pops {
            return Err(VerifyError::StackUnderflow(instr.offset));
        }
        let after = depth - pops + pushes;
        if after > MAX_STACK_DEPTH {
            return Err(VerifyError::StackOverflow(instr.offset, after));
        }

        if instr.opcode.is_jump() {
            worklist.push((resolve(instr)?, after));
        }
        if instr.opcode == Opcode::TryBegin {
            worklist.push((resolve(instr)?, depth + 1));
        }
        if !instr.opcode.is_terminator() {
            // The last instruction is a terminator, so a successor exists.
            worklist.push((index + 1, after));
        }
    }

    // Unreachable instructions still need valid targets.
    for instr in instructions {
        if instr.opcode.is_jump() || instr.opcode == Opcode::TryBegin {
            resolve(instr)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::flags;

    fn unit_with(code: Vec<u8>, locals: usize) -> Unit {
        let mut unit = Unit::new("verify");
        unit.constants.add_string("x");
        unit.functions.push(Function {
            name: "main".to_string(),
            param_count: 0,
            local_count: locals,
            code,
        });
        unit
    }

    fn inner(err: VerifyError) -> VerifyError {
        match err {
            VerifyError::InFunction { source, .. } => *source,
            other => other,
        }
    }

    #[test]
    fn test_valid_function() {
        let code = vec![Opcode::ConstI32 as u8, 1, 0, 0, 0, Opcode::Return as u8];
        assert_eq!(verify_unit(&unit_with(code, 0)), Ok(()));
    }

    #[test]
    fn test_empty_function_falls_off() {
        let err = verify_unit(&unit_with(vec![], 0)).unwrap_err();
        assert_eq!(inner(err), VerifyError::FallOffEnd(0));
    }

    #[test]
    fn test_invalid_opcode() {
        let err = verify_unit(&unit_with(vec![0xEE, Opcode::ReturnUndefined as u8], 0)).unwrap_err();
        assert_eq!(
            inner(err),
            VerifyError::InvalidOpcode {
                opcode: 0xEE,
                offset: 0
            }
        );
    }

    #[test]
    fn test_truncated_operand() {
        let err = verify_unit(&unit_with(vec![Opcode::ConstI32 as u8, 1, 0], 0)).unwrap_err();
        assert_eq!(inner(err), VerifyError::TruncatedInstruction(0));
    }

    #[test]
    fn test_string_ref_out_of_range() {
        let code = vec![Opcode::ConstStr as u8, 9, 0, 0, 0, Opcode::Return as u8];
        let err = verify_unit(&unit_with(code, 0)).unwrap_err();
        assert_eq!(
            inner(err),
            VerifyError::InvalidStringRef {
                index: 9,
                offset: 0
            }
        );
    }

    #[test]
    fn test_jump_into_operand() {
        // JMP lands inside its own operand bytes
        let code = vec![Opcode::Jmp as u8, 0xFE, 0xFF, 0xFF, 0xFF];
        let err = verify_unit(&unit_with(code, 0)).unwrap_err();
        assert!(matches!(inner(err), VerifyError::InvalidJumpTarget { .. }));
    }

    #[test]
    fn test_loop_is_accepted() {
        // loop: JMP loop
        let code = vec![Opcode::Jmp as u8, 0xFB, 0xFF, 0xFF, 0xFF];
        assert_eq!(verify_unit(&unit_with(code, 0)), Ok(()));
    }

    #[test]
    fn test_stack_underflow() {
        let code = vec![Opcode::Add as u8, Opcode::Return as u8];
        let err = verify_unit(&unit_with(code, 0)).unwrap_err();
        assert_eq!(inner(err), VerifyError::StackUnderflow(0));
    }

    #[test]
    fn test_stack_mismatch_at_merge() {
        // TRUE; JMP_IF_FALSE +5; CONST_I32 1; ...merge: RETURN_UNDEFINED
        let code = vec![
            Opcode::ConstTrue as u8,
            Opcode::JmpIfFalse as u8,
            5,
            0,
            0,
            0,
            Opcode::ConstI32 as u8,
            1,
            0,
            0,
            0,
            Opcode::ReturnUndefined as u8,
        ];
        let err = verify_unit(&unit_with(code, 0)).unwrap_err();
        assert!(matches!(inner(err), VerifyError::StackMismatch { .. }));
    }

    #[test]
    fn test_handler_depth() {
        // TRY_BEGIN +1; RETURN_UNDEFINED; handler: RETURN (exception on stack)
        let code = vec![
            Opcode::TryBegin as u8,
            1,
            0,
            0,
            0,
            Opcode::ReturnUndefined as u8,
            Opcode::Return as u8,
        ];
        assert_eq!(verify_unit(&unit_with(code, 0)), Ok(()));
    }

    #[test]
    fn test_local_ref() {
        let code = vec![Opcode::LoadLocal as u8, 2, 0, Opcode::Return as u8];
        let err = verify_unit(&unit_with(code, 2)).unwrap_err();
        assert_eq!(
            inner(err),
            VerifyError::InvalidLocalRef {
                index: 2,
                max: 2,
                offset: 0
            }
        );
    }

    #[test]
    fn test_export_requires_module_mode() {
        let code = vec![
            Opcode::ConstNull as u8,
            Opcode::Export as u8,
            0,
            0,
            0,
            0,
            Opcode::ReturnUndefined as u8,
        ];
        let mut unit = unit_with(code, 0);
        let err = verify_unit(&unit).unwrap_err();
        assert_eq!(inner(err), VerifyError::ExportInScript(1));

        unit.flags |= flags::MODULE;
        assert_eq!(verify_unit(&unit), Ok(()));
    }

    #[test]
    fn test_params_exceed_locals() {
        let mut unit = unit_with(vec![Opcode::ReturnUndefined as u8], 1);
        unit.functions[0].param_count = 2;
        let err = verify_unit(&unit).unwrap_err();
        assert_eq!(
            inner(err),
            VerifyError::ParamsExceedLocals {
                params: 2,
                locals: 1
            }
        );
    }
}
