//! Call frames

use std::borrow::Cow;
use std::rc::Rc;

use tracing::trace;
use valuevm_bytecode::{
    BodyInfo, FunctionBody, FunctionId, Register, FIRST_CAPTURE_REGISTER, THIS_REGISTER,
};
use valuevm_core::{NativeFrame, Value, CONST_MUTATION_MESSAGE};

use crate::error::{Fault, VMError, VMResult};
use crate::transaction::{ScopeToken, TransactionLog};

/// Lifecycle of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Ready,
    Running,
    Returned,
    Thrown,
}

/// Where the results of an in-flight call go when the callee returns.
#[derive(Debug)]
pub(crate) struct PendingCall {
    /// Register receiving the return value.
    pub return_target: Option<Register>,
    /// Register receiving the callee's final receiver.
    pub this_target: Option<Register>,
    /// Receiver as it was before the call, kept only while a protected
    /// region is active so a caught exception can restore it.
    pub retained_this: Option<Value>,
}

/// A protected region currently in force.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveRegion {
    pub index: usize,
    pub token: ScopeToken,
}

/// A function activation.
#[derive(Debug)]
pub struct CallFrame {
    pub(crate) function: FunctionId,
    pub(crate) name: Rc<str>,
    pub(crate) ip: usize,
    pub(crate) registers: Vec<Value>,
    /// The receiver may be read but not mutated.
    pub(crate) const_this: bool,
    pub(crate) state: FrameState,
    pub(crate) pending: Option<PendingCall>,
    pub(crate) regions: Vec<ActiveRegion>,
    pub(crate) transactions: TransactionLog,
}

impl CallFrame {
    pub(crate) fn new(
        function: FunctionId,
        body: &FunctionBody,
        info: &BodyInfo,
        this: Value,
        const_this: bool,
        captures: &[Value],
        args: Vec<Value>,
    ) -> Self {
        let mut registers = vec![Value::Void; body.register_count];
        if let Some(slot) = registers.get_mut(THIS_REGISTER) {
            *slot = this;
        }
        for (slot, capture) in registers
            .iter_mut()
            .skip(FIRST_CAPTURE_REGISTER)
            .zip(captures.iter().take(body.captures.len()))
        {
            *slot = capture.clone();
        }
        let first_param = body.first_param_register();
        for (slot, arg) in registers
            .iter_mut()
            .skip(first_param)
            .zip(args.into_iter().take(body.param_count))
        {
            *slot = arg;
        }
        CallFrame {
            function,
            name: Rc::clone(&info.body_ref.name),
            ip: 0,
            registers,
            const_this,
            state: FrameState::Ready,
            pending: None,
            regions: Vec::new(),
            transactions: TransactionLog::new(),
        }
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// An invariant violation at the current instruction.
    pub(crate) fn internal(&self, message: impl Into<String>) -> VMError {
        internal_error(&self.name, self.ip, message)
    }

    /// Read a register; empty registers read as `undefined`.
    pub(crate) fn read(&self, register: Register) -> VMResult<Value> {
        self.registers
            .get(register)
            .map(|v| v.clone().or_undefined())
            .ok_or_else(|| missing_register(&self.name, self.ip, register))
    }

    /// Borrow a register's value without cloning it.
    pub(crate) fn peek(&self, register: Register) -> VMResult<Cow<'_, Value>> {
        match self.registers.get(register) {
            Some(Value::Void) => Ok(Cow::Owned(Value::Undefined)),
            Some(other) => Ok(Cow::Borrowed(other)),
            None => Err(missing_register(&self.name, self.ip, register)),
        }
    }

    /// Move a value out of a register. The receiver is never moved out:
    /// it must still be there to be written back to the caller.
    pub(crate) fn take(&mut self, register: Register) -> VMResult<Value> {
        if register == THIS_REGISTER {
            return self.read(register);
        }
        self.take_receiver(register)
    }

    /// Move a value out of any register, the receiver included. Used to
    /// thread a receiver into a callee.
    pub(crate) fn take_receiver(&mut self, register: Register) -> VMResult<Value> {
        self.registers
            .get_mut(register)
            .map(|v| std::mem::take(v).or_undefined())
            .ok_or_else(|| missing_register(&self.name, self.ip, register))
    }

    /// Store into a register. Writing the receiver of a const frame throws.
    pub(crate) fn write(&mut self, register: Register, value: Value) -> Result<(), Fault> {
        *self.slot_mut(register)? = value;
        Ok(())
    }

    /// Mutable access for in-place updates, refused for a const receiver.
    pub(crate) fn slot_mut(&mut self, register: Register) -> Result<&mut Value, Fault> {
        if register == THIS_REGISTER && self.const_this {
            return Err(Fault::Throw(const_violation()));
        }
        Ok(self.slot(register)?)
    }

    /// Mutable access that ignores the const flag. Callers enforce it.
    pub(crate) fn slot(&mut self, register: Register) -> VMResult<&mut Value> {
        self.registers
            .get_mut(register)
            .ok_or_else(|| missing_register(&self.name, self.ip, register))
    }

    /// Whether `register` may be threaded as a mutable receiver.
    pub(crate) fn is_assignable(&self, register: Register) -> bool {
        !(register == THIS_REGISTER && self.const_this)
    }

    pub(crate) fn has_active_region(&self) -> bool {
        !self.regions.is_empty()
    }

    /// Bring the active region stack in line with `ip`: leave (commit)
    /// regions that no longer contain it, then enter regions starting at it.
    pub(crate) fn sync_regions(&mut self, body: &FunctionBody, info: &BodyInfo) {
        while let Some(top) = self.regions.last() {
            match body.regions.get(top.index) {
                Some(region) if region.contains(self.ip) => break,
                _ => {
                    let token = top.token;
                    self.regions.pop();
                    self.transactions.commit(token);
                }
            }
        }
        for &index in info.regions_starting_at(self.ip) {
            if self.regions.iter().any(|active| active.index == index) {
                continue;
            }
            if let Some(region) = body.regions.get(index) {
                let token = self
                    .transactions
                    .begin_scope(&self.registers, &region.snapshot);
                trace!(function = %self.name, region = index, ip = self.ip, "enter protected region");
                self.regions.push(ActiveRegion { index, token });
            }
        }
    }
}

/// A native running as a frame: it calls program functions by asking the
/// VM to push their frames above it.
#[derive(Debug)]
pub(crate) struct NativeCallFrame {
    pub name: &'static str,
    pub state: Box<dyn NativeFrame>,
}

/// An entry of the VM's frame stack.
#[derive(Debug)]
pub(crate) enum Frame {
    Bytecode(CallFrame),
    Native(NativeCallFrame),
}

impl Frame {
    pub(crate) fn name(&self) -> &str {
        match self {
            Frame::Bytecode(frame) => &frame.name,
            Frame::Native(frame) => frame.name,
        }
    }

    pub(crate) fn internal(&self, message: impl Into<String>) -> VMError {
        match self {
            Frame::Bytecode(frame) => frame.internal(message),
            Frame::Native(frame) => VMError::Internal {
                function: frame.name.to_string(),
                ip: 0,
                message: message.into(),
            },
        }
    }
}

/// The type error raised when a const receiver would be mutated.
pub(crate) fn const_violation() -> Value {
    Value::type_error(CONST_MUTATION_MESSAGE)
}

fn internal_error(function: &str, ip: usize, message: impl Into<String>) -> VMError {
    VMError::Internal {
        function: function.to_string(),
        // `ip` has already advanced past the executing instruction
        ip: ip.saturating_sub(1),
        message: message.into(),
    }
}

fn missing_register(function: &str, ip: usize, register: Register) -> VMError {
    internal_error(function, ip, format!("register r{register} is out of range"))
}
