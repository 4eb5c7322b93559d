//! Builder for creating VM instances

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use valuevm_bytecode::LoadedProgram;
use valuevm_core::Value;

use crate::error::VMError;
use crate::host::{HostFunction, HostRegistry};
use crate::safety::ResourceLimits;
use crate::vm::VM;

/// Interpreter configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMConfig {
    /// Resource ceilings enforced by the dispatch loop
    pub limits: ResourceLimits,
    /// Log every executed instruction at `debug` level
    pub trace: bool,
}

/// Builder for constructing a VM with its program, limits and host functions
pub struct VMBuilder {
    program: Option<LoadedProgram>,
    config: VMConfig,
    hosts: HostRegistry,
}

impl VMBuilder {
    /// Create a new VM builder
    pub fn new() -> Self {
        Self {
            program: None,
            config: VMConfig::default(),
            hosts: HostRegistry::new(),
        }
    }

    /// Set the program to execute
    pub fn with_program(mut self, program: LoadedProgram) -> Self {
        self.program = Some(program);
        self
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: VMConfig) -> Self {
        self.config = config;
        self
    }

    /// Set resource limits
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Register a host function under an import name
    pub fn with_host<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Value> + 'static,
    {
        self.hosts.register(name, function);
        self
    }

    /// Register a host function object
    pub fn with_host_function(mut self, name: &str, function: impl HostFunction + 'static) -> Self {
        self.hosts.register(name, function);
        self
    }

    /// Enable trace mode
    pub fn with_trace(mut self) -> Self {
        self.config.trace = true;
        self
    }

    /// Build the VM instance. Fails if no program was given or if an
    /// imported host function has no implementation.
    pub fn build(self) -> Result<VM> {
        let program = self
            .program
            .ok_or_else(|| anyhow!("VMBuilder requires a program"))?;
        if let Some(missing) = self.hosts.first_missing(program.host_imports()) {
            return Err(VMError::MissingHostFunction(missing.to_string()).into());
        }
        Ok(VM::with_parts(program, self.config, self.hosts))
    }
}

impl Default for VMBuilder {
    fn default() -> Self {
        Self::new()
    }
}
