//! Transaction manager
//!
//! Snapshots a set of register bindings when a protected region is entered
//! and restores exactly those bindings if the region throws. A snapshot
//! holds handles, not payloads: taking one is O(k) handle clones, and
//! copy-on-write keeps the captured payloads unchanged while the region
//! mutates its own copies.

use tracing::trace;
use valuevm_bytecode::Register;
use valuevm_core::Value;

/// Bindings captured at scope entry.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(Register, Value)>,
}

impl Snapshot {
    pub fn capture(registers: &[Value], bindings: &[Register]) -> Self {
        Snapshot {
            entries: bindings
                .iter()
                .filter_map(|&r| registers.get(r).map(|v| (r, v.clone())))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn restore(self, registers: &mut [Value]) {
        for (register, value) in self.entries {
            if let Some(slot) = registers.get_mut(register) {
                *slot = value;
            }
        }
    }
}

/// Identifies an open scope. Scopes close in stack order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeToken(usize);

/// Open scopes of one frame.
#[derive(Debug, Default)]
pub struct TransactionLog {
    scopes: Vec<Snapshot>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `bindings` and open a scope.
    pub fn begin_scope(&mut self, registers: &[Value], bindings: &[Register]) -> ScopeToken {
        let snapshot = Snapshot::capture(registers, bindings);
        trace!(depth = self.scopes.len(), bindings = snapshot.len(), "begin scope");
        self.scopes.push(snapshot);
        ScopeToken(self.scopes.len() - 1)
    }

    /// Close the scope and every scope opened after it, keeping the current
    /// bindings.
    pub fn commit(&mut self, token: ScopeToken) {
        trace!(depth = token.0, "commit scope");
        self.scopes.truncate(token.0);
    }

    /// Close the scope and every scope opened after it, restoring the
    /// bindings captured by `token`. Bindings outside its snapshot are left
    /// as they are.
    pub fn revert(&mut self, token: ScopeToken, registers: &mut [Value]) {
        if token.0 >= self.scopes.len() {
            return;
        }
        self.scopes.truncate(token.0 + 1);
        if let Some(snapshot) = self.scopes.pop() {
            trace!(depth = token.0, bindings = snapshot.len(), "revert scope");
            snapshot.restore(registers);
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}
