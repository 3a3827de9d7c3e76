//! Bytecode interpreter
//!
//! Each script call is one Rust-level `execute` invocation, so the call
//! depth limit bounds native stack use. The top-level function of a unit
//! (function 0) keeps its locals in the unit environment, where nested
//! closures reach them through `LOAD_UNIT_VAR` / `STORE_UNIT_VAR`.

use crate::context::Context;
use crate::conv;
use crate::loader::UnitImage;
use crate::ops::Arith;
use crate::value::{Callable, ObjectRef, ScriptResult, Value};
use kiln_bytecode::Opcode;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;

/// Local slots beyond this are unreachable with 16-bit operands
const MAX_LOCALS: usize = u16::MAX as usize + 1;

/// Unit-level state shared by the top level and every closure of one
/// execution of a unit
pub(crate) struct UnitEnv {
    pub(crate) image: Arc<UnitImage>,
    pub(crate) name: Rc<str>,
    pub(crate) vars: RefCell<Vec<Value>>,
    pub(crate) namespace: Option<ObjectRef>,
}

impl UnitEnv {
    pub(crate) fn new(image: Arc<UnitImage>, name: Rc<str>, namespace: Option<ObjectRef>) -> Self {
        let slots = image
            .unit
            .entry()
            .map_or(0, |f| f.local_count.min(MAX_LOCALS));
        Self {
            name,
            vars: RefCell::new(vec![Value::Undefined; slots]),
            image,
            namespace,
        }
    }
}

/// A function of a loaded unit together with its unit environment
pub struct Closure {
    pub(crate) env: Rc<UnitEnv>,
    pub(crate) function: usize,
}

enum Locals {
    Unit,
    Own(Vec<Value>),
}

impl Locals {
    fn get(&self, env: &UnitEnv, index: usize) -> Value {
        match self {
            Locals::Unit => env.vars.borrow().get(index).cloned().unwrap_or_default(),
            Locals::Own(slots) => slots.get(index).cloned().unwrap_or_default(),
        }
    }

    fn set(&mut self, env: &UnitEnv, index: usize, value: Value) {
        match self {
            Locals::Unit => store_unit_var(env, index, value),
            Locals::Own(slots) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = value;
                }
            }
        }
    }
}

fn store_unit_var(env: &UnitEnv, index: usize, value: Value) {
    let old = {
        let mut vars = env.vars.borrow_mut();
        match vars.get_mut(index) {
            Some(slot) => std::mem::replace(slot, value),
            None => value,
        }
    };
    drop(old);
}

struct Handler {
    target: usize,
    height: usize,
}

enum Flow {
    Continue,
    Return(Value),
}

struct Frame {
    pc: usize,
    stack: Vec<Value>,
    handlers: Vec<Handler>,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }

    fn take(&mut self, count: usize) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(count);
        self.stack.split_off(at)
    }

    fn operand<const N: usize>(&mut self, code: &[u8]) -> [u8; N] {
        let mut buf = [0u8; N];
        if let Some(bytes) = code.get(self.pc..self.pc + N) {
            buf.copy_from_slice(bytes);
        }
        self.pc += N;
        buf
    }

    fn u16(&mut self, code: &[u8]) -> u16 {
        u16::from_le_bytes(self.operand(code))
    }

    fn u32(&mut self, code: &[u8]) -> u32 {
        u32::from_le_bytes(self.operand(code))
    }

    fn i32(&mut self, code: &[u8]) -> i32 {
        i32::from_le_bytes(self.operand(code))
    }

    fn f64(&mut self, code: &[u8]) -> f64 {
        f64::from_le_bytes(self.operand(code))
    }

    /// Decode a relative jump; offsets count from the end of the instruction
    fn target(&mut self, code: &[u8]) -> usize {
        let rel = self.i32(code) as i64;
        (self.pc as i64 + rel) as usize
    }
}

impl Context {
    pub(crate) fn call_closure(&mut self, closure: &Rc<Closure>, args: &[Value]) -> ScriptResult {
        let env = closure.env.clone();
        let image = env.image.clone();
        let Some(function) = image.unit.functions.get(closure.function) else {
            return Err(self.internal_error("closure refers to a missing function"));
        };

        let mut locals = if closure.function == 0 {
            Locals::Unit
        } else {
            let mut slots = vec![Value::Undefined; function.local_count.min(MAX_LOCALS)];
            for (slot, arg) in slots.iter_mut().zip(args.iter().take(function.param_count)) {
                *slot = arg.clone();
            }
            Locals::Own(slots)
        };

        self.unit_stack.push(env.name.clone());
        let result = self.execute(&env, &function.code, &mut locals);
        self.unit_stack.pop();
        result
    }

    fn execute(&mut self, env: &Rc<UnitEnv>, code: &[u8], locals: &mut Locals) -> ScriptResult {
        let mut frame = Frame {
            pc: 0,
            stack: Vec::with_capacity(16),
            handlers: Vec::new(),
        };

        loop {
            let step = if self.heap.take_exhausted() {
                let err = self.internal_error("out of memory");
                // The error object itself must not trip the check again
                self.heap.take_exhausted();
                Err(err)
            } else {
                self.step(env, code, locals, &mut frame)
            };

            match step {
                Ok(Flow::Continue) => {}
                Ok(Flow::Return(value)) => return Ok(value),
                Err(thrown) => match frame.handlers.pop() {
                    Some(handler) => {
                        frame.stack.truncate(handler.height);
                        frame.stack.push(thrown);
                        frame.pc = handler.target;
                    }
                    None => return Err(thrown),
                },
            }
        }
    }

    fn constant_str<'a>(&self, env: &'a UnitEnv, index: u32) -> &'a str {
        env.image.unit.constants.get_string(index).unwrap_or_default()
    }

    fn step(
        &mut self,
        env: &Rc<UnitEnv>,
        code: &[u8],
        locals: &mut Locals,
        frame: &mut Frame,
    ) -> ScriptResult<Flow> {
        let Some(opcode) = code.get(frame.pc).copied().and_then(Opcode::from_u8) else {
            return Err(self.internal_error(format!("invalid instruction at offset {}", frame.pc)));
        };
        frame.pc += 1;

        match opcode {
            Opcode::Nop => {}
            Opcode::Pop => {
                frame.pop();
            }
            Opcode::Dup => {
                let top = frame.stack.last().cloned().unwrap_or_default();
                frame.push(top);
            }
            Opcode::Swap => {
                let len = frame.stack.len();
                if len >= 2 {
                    frame.stack.swap(len - 1, len - 2);
                }
            }

            // Constants
            Opcode::ConstUndefined => frame.push(Value::Undefined),
            Opcode::ConstNull => frame.push(Value::Null),
            Opcode::ConstTrue => frame.push(Value::Bool(true)),
            Opcode::ConstFalse => frame.push(Value::Bool(false)),
            Opcode::ConstI32 => {
                let n = frame.i32(code);
                frame.push(Value::Number(n as f64));
            }
            Opcode::ConstF64 => {
                let n = frame.f64(code);
                frame.push(Value::Number(n));
            }
            Opcode::ConstStr => {
                let index = frame.u32(code);
                frame.push(Value::from(self.constant_str(env, index)));
            }
            Opcode::ConstBigInt => {
                let index = frame.u32(code) as usize;
                if !self.capabilities().bigint {
                    return Err(self.type_error("BigInt is not supported in this context"));
                }
                let value = env.image.bigints.get(index).cloned().unwrap_or_default();
                frame.push(Value::from(value));
            }

            // Variables
            Opcode::LoadLocal => {
                let index = frame.u16(code) as usize;
                frame.push(locals.get(env, index));
            }
            Opcode::StoreLocal => {
                let index = frame.u16(code) as usize;
                let value = frame.pop();
                locals.set(env, index, value);
            }
            Opcode::LoadUnitVar => {
                let index = frame.u16(code) as usize;
                let value = env.vars.borrow().get(index).cloned().unwrap_or_default();
                frame.push(value);
            }
            Opcode::StoreUnitVar => {
                let index = frame.u16(code) as usize;
                let value = frame.pop();
                store_unit_var(env, index, value);
            }
            Opcode::LoadGlobal => {
                let index = frame.u32(code);
                let name = self.constant_str(env, index);
                match conv::chain_get(&self.global(), name) {
                    Some(value) => frame.push(value),
                    None => return Err(self.reference_error(format!("{} is not defined", name))),
                }
            }
            Opcode::StoreGlobal => {
                let index = frame.u32(code);
                let name = self.constant_str(env, index);
                let value = frame.pop();
                let global = self.global();
                let receiver = Value::Object(global.clone());
                self.set_object_property(&global, name, value, &receiver)?;
            }

            // Arithmetic
            Opcode::Add => {
                let b = frame.pop();
                let a = frame.pop();
                let result = self.add(&a, &b)?;
                frame.push(result);
            }
            Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                let op = match opcode {
                    Opcode::Sub => Arith::Sub,
                    Opcode::Mul => Arith::Mul,
                    Opcode::Div => Arith::Div,
                    _ => Arith::Mod,
                };
                let b = frame.pop();
                let a = frame.pop();
                let result = self.arith(op, &a, &b)?;
                frame.push(result);
            }
            Opcode::Neg => {
                let a = frame.pop();
                let result = self.negate(&a)?;
                frame.push(result);
            }

            // Comparison
            Opcode::Eq | Opcode::Ne | Opcode::StrictEq | Opcode::StrictNe => {
                let b = frame.pop();
                let a = frame.pop();
                let result = match opcode {
                    Opcode::Eq => conv::loose_equals(&a, &b),
                    Opcode::Ne => !conv::loose_equals(&a, &b),
                    Opcode::StrictEq => conv::strict_equals(&a, &b),
                    _ => !conv::strict_equals(&a, &b),
                };
                frame.push(Value::Bool(result));
            }
            Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let b = frame.pop();
                let a = frame.pop();
                let ord = self.compare(&a, &b);
                let result = match opcode {
                    Opcode::Lt => ord == Some(Ordering::Less),
                    Opcode::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    Opcode::Gt => ord == Some(Ordering::Greater),
                    _ => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                };
                frame.push(Value::Bool(result));
            }
            Opcode::Not => {
                let a = frame.pop();
                frame.push(Value::Bool(!conv::to_boolean(&a)));
            }
            Opcode::Typeof => {
                let a = frame.pop();
                frame.push(Value::from(conv::type_of(&a)));
            }

            // Control flow
            Opcode::Jmp => {
                frame.pc = frame.target(code);
            }
            Opcode::JmpIfFalse | Opcode::JmpIfTrue => {
                let target = frame.target(code);
                let condition = conv::to_boolean(&frame.pop());
                if condition == (opcode == Opcode::JmpIfTrue) {
                    frame.pc = target;
                }
            }

            // Calls
            Opcode::Call => {
                let argc = frame.u16(code) as usize;
                let args = frame.take(argc);
                let callee = frame.pop();
                let result = self.call(&callee, &Value::Undefined, &args)?;
                frame.push(result);
            }
            Opcode::CallMethod => {
                let index = frame.u32(code);
                let argc = frame.u16(code) as usize;
                let args = frame.take(argc);
                let receiver = frame.pop();
                let name = self.constant_str(env, index);
                let result = self.call_method(&receiver, name, &args)?;
                frame.push(result);
            }
            Opcode::Return => return Ok(Flow::Return(frame.pop())),
            Opcode::ReturnUndefined => return Ok(Flow::Return(Value::Undefined)),
            Opcode::MakeClosure => {
                let index = frame.u32(code) as usize;
                let name = env
                    .image
                    .unit
                    .functions
                    .get(index)
                    .map(|f| f.name.clone())
                    .unwrap_or_default();
                let closure = Rc::new(Closure {
                    env: env.clone(),
                    function: index,
                });
                let function = self.new_callable(&name, Callable::Bytecode(closure));
                frame.push(Value::Object(function));
            }

            // Objects
            Opcode::NewObject => {
                let object = self.new_object();
                frame.push(Value::Object(object));
            }
            Opcode::NewArray => {
                let count = frame.u16(code) as usize;
                let items = frame.take(count);
                let array = self.new_array(items);
                frame.push(Value::Object(array));
            }
            Opcode::GetField => {
                let index = frame.u32(code);
                let target = frame.pop();
                let value = self.get_property(&target, self.constant_str(env, index))?;
                frame.push(value);
            }
            Opcode::SetField => {
                let index = frame.u32(code);
                let value = frame.pop();
                let target = frame.pop();
                self.set_property(&target, self.constant_str(env, index), value)?;
            }
            Opcode::GetElem => {
                let key = frame.pop();
                let target = frame.pop();
                let value = self.get_element(&target, &key)?;
                frame.push(value);
            }
            Opcode::SetElem => {
                let value = frame.pop();
                let key = frame.pop();
                let target = frame.pop();
                self.set_element(&target, &key, value)?;
            }

            // Exceptions
            Opcode::Throw => return Err(frame.pop()),
            Opcode::TryBegin => {
                let target = frame.target(code);
                frame.handlers.push(Handler {
                    target,
                    height: frame.stack.len(),
                });
            }
            Opcode::TryEnd => {
                frame.handlers.pop();
            }

            // Modules
            Opcode::Import => {
                let index = frame.u32(code) as usize;
                let specifier = env.image.unit.imports.get(index).cloned().unwrap_or_default();
                let namespace = self.import_from_script(&specifier, &env.name)?;
                frame.push(Value::Object(namespace));
            }
            Opcode::Export => {
                let index = frame.u32(code);
                let value = frame.pop();
                let name = self.constant_str(env, index);
                match &env.namespace {
                    Some(namespace) => namespace.set_own(name, value),
                    None => {
                        return Err(self.internal_error(format!(
                            "export of '{}' outside a module",
                            name
                        )))
                    }
                }
            }
        }

        Ok(Flow::Continue)
    }
}
