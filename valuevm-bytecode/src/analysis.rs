//! Load-time analysis
//!
//! Computes, once per body:
//! - a structural digest used by content-hash equality, so identical
//!   declarations at different sites are indistinguishable;
//! - whether the body may mutate its receiver, directly or by calling a
//!   receiver-mutating method on itself;
//! - which protected regions start at each instruction offset.

use std::rc::Rc;

use sha2::{Digest, Sha256};
use tracing::debug;
use valuevm_core::{BodyRef, ContentHash};

use crate::error::Result;
use crate::validate::validate_program;
use crate::{Constant, FunctionBody, FunctionId, Instruction, Program, THIS_REGISTER};

/// Facts derived from a body at load time.
#[derive(Debug, Clone)]
pub struct BodyInfo {
    /// Reference used by function values created from this body
    pub body_ref: BodyRef,
    /// Whether calling the body may change its receiver
    pub mutates_this: bool,
    /// For each offset, the regions starting there, outermost first
    pub region_entries: Vec<Vec<usize>>,
}

impl BodyInfo {
    /// Structural digest of the body
    pub fn digest(&self) -> ContentHash {
        self.body_ref.digest
    }

    /// Regions entered at `offset`
    pub fn regions_starting_at(&self, offset: usize) -> &[usize] {
        self.region_entries
            .get(offset)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A validated program with its analysis.
#[derive(Debug, Clone)]
pub struct LoadedProgram {
    program: Program,
    info: Vec<BodyInfo>,
}

impl LoadedProgram {
    /// Validate and analyse `program`.
    pub fn new(program: Program) -> Result<Self> {
        validate_program(&program)?;
        let info = analyze(&program)?;
        debug!(
            functions = program.functions.len(),
            mutating = info.iter().filter(|i| i.mutates_this).count(),
            "program loaded"
        );
        Ok(LoadedProgram { program, info })
    }

    /// The underlying program
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Body by id
    pub fn body(&self, id: FunctionId) -> Option<&FunctionBody> {
        self.program.functions.get(id)
    }

    /// Analysis by id
    pub fn info(&self, id: FunctionId) -> Option<&BodyInfo> {
        self.info.get(id)
    }

    /// Entry point
    pub fn entry(&self) -> Option<FunctionId> {
        self.program.entry
    }

    /// Declared host imports
    pub fn host_imports(&self) -> &[String] {
        &self.program.host_imports
    }

    /// Id of the first body called `name`
    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.program.functions.iter().position(|f| f.name == name)
    }
}

fn analyze(program: &Program) -> Result<Vec<BodyInfo>> {
    let mut digests = DigestContext::new(program);
    program
        .functions
        .iter()
        .enumerate()
        .map(|(id, body)| {
            Ok(BodyInfo {
                body_ref: BodyRef {
                    index: id,
                    name: Rc::from(body.name.as_str()),
                    digest: digests.digest(id)?,
                },
                mutates_this: mutates_this(body),
                region_entries: region_entries(body),
            })
        })
        .collect()
}

/// Whether a body may change its receiver.
///
/// Writing `r1`, threading `r1` into another call as a mutable receiver, or
/// an explicit `RequireMutableThis` all count.
pub fn mutates_this(body: &FunctionBody) -> bool {
    body.instructions.iter().any(|instruction| {
        matches!(instruction, Instruction::RequireMutableThis)
            || instruction.written_registers().contains(&THIS_REGISTER)
    })
}

fn region_entries(body: &FunctionBody) -> Vec<Vec<usize>> {
    let mut entries = vec![Vec::new(); body.instructions.len()];
    for (index, region) in body.regions.iter().enumerate() {
        if let Some(slot) = entries.get_mut(region.start) {
            slot.push(index);
        }
    }
    for slot in &mut entries {
        slot.sort_by_key(|&index| std::cmp::Reverse(body.regions[index].end));
    }
    entries
}

mod tag {
    pub const FUNCTION_REF: u8 = 0xf0;
    pub const RECURSIVE_REF: u8 = 0xf1;
    pub const ARRAY: u8 = 0xf2;
    pub const OBJECT: u8 = 0xf3;
    pub const CLASS: u8 = 0xf4;
    pub const LEAF: u8 = 0xf5;
}

struct DigestContext<'a> {
    program: &'a Program,
    memo: Vec<Option<ContentHash>>,
    visiting: Vec<FunctionId>,
    recursive_refs: usize,
}

impl<'a> DigestContext<'a> {
    fn new(program: &'a Program) -> Self {
        DigestContext {
            program,
            memo: vec![None; program.functions.len()],
            visiting: Vec::new(),
            recursive_refs: 0,
        }
    }

    /// Digest over everything that determines a body's behaviour. The body
    /// name is excluded; referenced bodies contribute their own digests.
    fn digest(&mut self, id: FunctionId) -> Result<ContentHash> {
        if let Some(hash) = self.memo[id] {
            return Ok(hash);
        }
        if let Some(position) = self.visiting.iter().rposition(|&v| v == id) {
            self.recursive_refs += 1;
            let mut hasher = Sha256::new();
            hasher.update([tag::RECURSIVE_REF]);
            hasher.update(((self.visiting.len() - position) as u64).to_le_bytes());
            return Ok(ContentHash::from_bytes(hasher.finalize().into()));
        }

        let program = self.program;
        let body = &program.functions[id];
        let recursive_before = self.recursive_refs;
        self.visiting.push(id);

        let mut hasher = Sha256::new();
        hasher.update(b"valuevm-body\0");
        for n in [
            body.param_count,
            body.captures.len(),
            body.register_count,
            body.constants.len(),
        ] {
            hasher.update((n as u64).to_le_bytes());
        }
        hasher.update(serde_json::to_vec(&body.instructions)?);
        hasher.update(serde_json::to_vec(&body.regions)?);
        for constant in &body.constants {
            self.constant(&mut hasher, constant)?;
        }

        self.visiting.pop();
        let hash = ContentHash::from_bytes(hasher.finalize().into());
        if self.recursive_refs == recursive_before {
            self.memo[id] = Some(hash);
        }
        Ok(hash)
    }

    fn constant(&mut self, hasher: &mut Sha256, constant: &Constant) -> Result<()> {
        match constant {
            Constant::Function(id) => {
                let digest = self.digest(*id)?;
                hasher.update([tag::FUNCTION_REF]);
                hasher.update(digest.as_bytes());
            }
            Constant::Array(items) => {
                hasher.update([tag::ARRAY]);
                hasher.update((items.len() as u64).to_le_bytes());
                for item in items {
                    self.constant(hasher, item)?;
                }
            }
            Constant::Object(fields) => {
                hasher.update([tag::OBJECT]);
                hasher.update((fields.len() as u64).to_le_bytes());
                for (key, value) in fields {
                    hash_str(hasher, key);
                    self.constant(hasher, value)?;
                }
            }
            Constant::Class {
                name,
                constructor,
                methods,
                statics,
            } => {
                hasher.update([tag::CLASS]);
                hash_str(hasher, name);
                match constructor {
                    Some(id) => {
                        let digest = self.digest(*id)?;
                        hasher.update([1]);
                        hasher.update(digest.as_bytes());
                    }
                    None => hasher.update([0]),
                }
                hasher.update((methods.len() as u64).to_le_bytes());
                for (key, id) in methods {
                    let digest = self.digest(*id)?;
                    hash_str(hasher, key);
                    hasher.update(digest.as_bytes());
                }
                hasher.update((statics.len() as u64).to_le_bytes());
                for (key, value) in statics {
                    hash_str(hasher, key);
                    self.constant(hasher, value)?;
                }
            }
            leaf => {
                hasher.update([tag::LEAF]);
                hasher.update(serde_json::to_vec(leaf)?);
            }
        }
        Ok(())
    }
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
