//! Content hashing and structural equality
//!
//! Two values are `===` when they have the same structure, regardless of
//! which handles they live behind. Functions and classes are compared by a
//! digest of their bytecode body plus their captured values, so identity
//! tracks content rather than declaration site.
//!
//! Hashes of composite payloads are cached on the payload; copy-on-write
//! clears the cache whenever a payload is about to be mutated.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use sha2::{Digest, Sha256};

use crate::value::Value;

/// SHA-256 digest of a value's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        ContentHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn from_hasher(hasher: Sha256) -> Self {
        ContentHash(hasher.finalize().into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

mod tag {
    pub const UNDEFINED: u8 = 0;
    pub const NULL: u8 = 1;
    pub const BOOL: u8 = 2;
    pub const NUMBER: u8 = 3;
    pub const BIGINT: u8 = 4;
    pub const STRING: u8 = 5;
    pub const ARRAY: u8 = 6;
    pub const OBJECT: u8 = 7;
    pub const FUNCTION: u8 = 8;
    pub const CLASS: u8 = 9;
    pub const NATIVE: u8 = 10;
    pub const BUILTIN: u8 = 11;
    pub const COPY_COUNTER: u8 = 12;
    pub const BACK_REFERENCE: u8 = 13;
}

/// Content hash of `value`.
pub fn content_hash(value: &Value) -> ContentHash {
    HashWalker::default().hash(value)
}

#[derive(Default)]
struct HashWalker {
    /// Payload addresses currently being hashed.
    in_progress: Vec<usize>,
    back_references: usize,
}

impl HashWalker {
    fn hash(&mut self, value: &Value) -> ContentHash {
        match value {
            Value::Array(a) => {
                let data = a.read();
                self.composite(a.addr(), &data.hash, |walker, hasher| {
                    hasher.update([tag::ARRAY]);
                    hasher.update((data.elements.len() as u64).to_le_bytes());
                    for element in &data.elements {
                        hasher.update(walker.hash(element).as_bytes());
                    }
                })
            }
            Value::Object(o) => {
                let data = o.read();
                self.composite(o.addr(), &data.hash, |walker, hasher| {
                    hasher.update([tag::OBJECT]);
                    hash_fields(walker, hasher, data.fields.iter());
                    match &data.prototype {
                        Some(proto) => {
                            hasher.update([1]);
                            hasher.update(walker.hash(proto).as_bytes());
                        }
                        None => hasher.update([0]),
                    }
                })
            }
            Value::Function(f) => {
                let data = f.read();
                self.composite(f.addr(), &data.hash, |walker, hasher| {
                    hasher.update([tag::FUNCTION]);
                    hasher.update(data.body.digest.as_bytes());
                    hasher.update((data.captures.len() as u64).to_le_bytes());
                    for capture in &data.captures {
                        hasher.update(walker.hash(capture).as_bytes());
                    }
                })
            }
            Value::Class(c) => {
                let data = c.read();
                self.composite(c.addr(), &data.hash, |walker, hasher| {
                    hasher.update([tag::CLASS]);
                    hash_str(hasher, &data.name);
                    hasher.update(walker.hash(&data.constructor).as_bytes());
                    hasher.update(walker.hash(&data.prototype).as_bytes());
                    hash_fields(walker, hasher, data.statics.iter());
                })
            }
            Value::CopyCounter(c) => {
                let mut hasher = Sha256::new();
                hasher.update([tag::COPY_COUNTER]);
                hasher.update((c.counter_addr() as u64).to_le_bytes());
                hasher.update(self.hash(&c.tag).as_bytes());
                ContentHash::from_hasher(hasher)
            }
            primitive => hash_primitive(primitive),
        }
    }

    fn composite(
        &mut self,
        addr: usize,
        cache: &std::cell::OnceCell<ContentHash>,
        body: impl FnOnce(&mut Self, &mut Sha256),
    ) -> ContentHash {
        if let Some(hash) = cache.get() {
            return *hash;
        }
        if let Some(position) = self.in_progress.iter().rposition(|&a| a == addr) {
            self.back_references += 1;
            let mut hasher = Sha256::new();
            hasher.update([tag::BACK_REFERENCE]);
            hasher.update(((self.in_progress.len() - position) as u64).to_le_bytes());
            return ContentHash::from_hasher(hasher);
        }

        let back_references = self.back_references;
        self.in_progress.push(addr);
        let mut hasher = Sha256::new();
        body(self, &mut hasher);
        self.in_progress.pop();
        let hash = ContentHash::from_hasher(hasher);

        // A hash that depends on an enclosing payload is only valid from here.
        if self.back_references == back_references {
            let _ = cache.set(hash);
        }
        hash
    }
}

fn hash_fields<'a>(
    walker: &mut HashWalker,
    hasher: &mut Sha256,
    fields: impl Iterator<Item = (&'a String, &'a Value)>,
) {
    let mut sorted: Vec<_> = fields.collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    hasher.update((sorted.len() as u64).to_le_bytes());
    for (key, value) in sorted {
        hash_str(hasher, key);
        hasher.update(walker.hash(value).as_bytes());
    }
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_primitive(value: &Value) -> ContentHash {
    let mut hasher = Sha256::new();
    match value {
        Value::Void | Value::Undefined => hasher.update([tag::UNDEFINED]),
        Value::Null => hasher.update([tag::NULL]),
        Value::Bool(b) => hasher.update([tag::BOOL, u8::from(*b)]),
        Value::Number(n) => {
            hasher.update([tag::NUMBER]);
            let normalized = if *n == 0.0 {
                0.0
            } else if n.is_nan() {
                f64::NAN
            } else {
                *n
            };
            hasher.update(normalized.to_bits().to_le_bytes());
        }
        Value::BigInt(b) => {
            hasher.update([tag::BIGINT]);
            hasher.update(b.to_signed_bytes_le());
        }
        Value::String(s) => {
            hasher.update([tag::STRING]);
            hash_str(&mut hasher, s);
        }
        Value::Native(native) => {
            hasher.update([tag::NATIVE]);
            hasher.update((native.addr() as u64).to_le_bytes());
        }
        Value::Builtin(b) => {
            hasher.update([tag::BUILTIN]);
            hash_str(&mut hasher, b.name());
        }
        // Composites never reach here; HashWalker::hash handles them.
        Value::Array(_)
        | Value::Object(_)
        | Value::Function(_)
        | Value::Class(_)
        | Value::CopyCounter(_) => {}
    }
    ContentHash::from_hasher(hasher)
}

/// `===`
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    EqWalker::default().equals(a, b)
}

#[derive(Default)]
struct EqWalker {
    in_progress: Vec<(usize, usize)>,
}

impl EqWalker {
    fn equals(&mut self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Void | Value::Undefined, Value::Void | Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::BigInt(x), Value::BigInt(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => {
                if x.ptr_eq(y) {
                    return true;
                }
                let (xd, yd) = (x.read(), y.read());
                if cached_differ(xd.hash.get(), yd.hash.get()) || xd.len() != yd.len() {
                    return false;
                }
                self.guarded(x.addr(), y.addr(), |walker| {
                    xd.elements
                        .iter()
                        .zip(&yd.elements)
                        .all(|(l, r)| walker.equals(l, r))
                })
            }
            (Value::Object(x), Value::Object(y)) => {
                if x.ptr_eq(y) {
                    return true;
                }
                let (xd, yd) = (x.read(), y.read());
                if cached_differ(xd.hash.get(), yd.hash.get())
                    || xd.fields.len() != yd.fields.len()
                {
                    return false;
                }
                self.guarded(x.addr(), y.addr(), |walker| {
                    let prototypes_equal = match (&xd.prototype, &yd.prototype) {
                        (None, None) => true,
                        (Some(p), Some(q)) => walker.equals(p, q),
                        _ => false,
                    };
                    prototypes_equal
                        && xd.fields.iter().all(|(key, value)| {
                            yd.fields
                                .get(key)
                                .is_some_and(|other| walker.equals(value, other))
                        })
                })
            }
            (Value::Function(x), Value::Function(y)) => {
                x.ptr_eq(y) || content_hash(a) == content_hash(b)
            }
            (Value::Class(x), Value::Class(y)) => x.ptr_eq(y) || content_hash(a) == content_hash(b),
            (Value::Native(x), Value::Native(y)) => std::ptr::eq(*x, *y),
            (Value::Builtin(x), Value::Builtin(y)) => x == y,
            (Value::CopyCounter(x), Value::CopyCounter(y)) => x.same_counter(y),
            _ => false,
        }
    }

    fn guarded(&mut self, a: usize, b: usize, f: impl FnOnce(&mut Self) -> bool) -> bool {
        if self.in_progress.contains(&(a, b)) {
            return true;
        }
        self.in_progress.push((a, b));
        let result = f(self);
        self.in_progress.pop();
        result
    }
}

fn cached_differ(a: Option<&ContentHash>, b: Option<&ContentHash>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x != y)
}

/// `==`
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() || y.is_nullish() => x.is_nullish() && y.is_nullish(),
        (Value::Number(x), Value::String(_)) => *x == b.to_number(),
        (Value::String(_), Value::Number(y)) => a.to_number() == *y,
        (Value::BigInt(x), Value::Number(y)) | (Value::Number(y), Value::BigInt(x)) => {
            compare_bigint_number(x, *y) == Some(Ordering::Equal)
        }
        (Value::BigInt(x), Value::String(s)) | (Value::String(s), Value::BigInt(x)) => {
            s.trim().parse::<BigInt>().is_ok_and(|parsed| &parsed == x)
        }
        (Value::Bool(x), _) => loose_equals(&Value::Number(f64::from(u8::from(*x))), b),
        (_, Value::Bool(y)) => loose_equals(a, &Value::Number(f64::from(u8::from(*y)))),
        (Value::Array(_), Value::Number(_) | Value::String(_) | Value::BigInt(_)) => {
            loose_equals(&Value::from(a.to_string()), b)
        }
        (Value::Number(_) | Value::String(_) | Value::BigInt(_), Value::Array(_)) => {
            loose_equals(a, &Value::from(b.to_string()))
        }
        _ => strict_equals(a, b),
    }
}

/// Numeric comparison between a BigInt and a Number.
pub fn compare_bigint_number(big: &BigInt, n: f64) -> Option<Ordering> {
    if n.is_nan() {
        return None;
    }
    if n.is_infinite() {
        return Some(if n > 0.0 {
            Ordering::Less
        } else {
            Ordering::Greater
        });
    }
    if n.fract() == 0.0 {
        if let Some(int) = BigInt::from_f64(n) {
            return Some(big.cmp(&int));
        }
    }
    big.to_f64().and_then(|b| b.partial_cmp(&n))
}
