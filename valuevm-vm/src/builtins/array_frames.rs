//! Array methods that call back into the program
//!
//! Each method runs as a [`NativeFrame`]: it asks the VM to call the
//! callback, gets the result through `resume`, and decides what to do next.
//! The interpreter is never re-entered, so callbacks see the same limits,
//! protected regions and frame depth as ordinary calls.

use std::fmt;
use std::mem;

use valuevm_core::{ArrayData, FrameStep, NativeFrame, Value};

fn array_data(value: &Value) -> Result<&ArrayData, Value> {
    value.as_array().ok_or_else(|| {
        Value::type_error(format!("Array method called on {}", value.typeof_()))
    })
}

/// The callback argument, which must be callable.
fn callback(value: Option<Value>) -> Result<Value, Value> {
    match value {
        Some(f @ (Value::Function(_) | Value::Native(_))) => Ok(f),
        Some(Value::Builtin(b)) if b.is_callable() => Ok(Value::Builtin(b)),
        other => Err(Value::type_error(format!(
            "{} is not a function",
            other.map_or("undefined", |v| v.typeof_())
        ))),
    }
}

// ===== Element-wise callbacks =====

/// Accumulates callback results for one mapping method.
trait MappingState: fmt::Debug {
    /// Record the callback's `result` for `element`. `Some` finishes the
    /// method early with that value.
    fn process(&mut self, index: usize, element: Value, result: Value) -> Option<Value>;

    fn finish(&mut self) -> Value;
}

/// Calls the callback with `(element, index, array)` for each element,
/// skipping holes.
#[derive(Debug)]
struct MappingFrame<S> {
    array: Value,
    callback: Value,
    this_arg: Value,
    index: usize,
    current: Option<(usize, Value)>,
    state: S,
    early: Option<Value>,
}

impl<S: MappingState> NativeFrame for MappingFrame<S> {
    fn step(&mut self) -> Result<FrameStep, Value> {
        if let Some(value) = self.early.take() {
            return Ok(FrameStep::Return {
                value,
                this: mem::take(&mut self.array),
            });
        }
        let data = array_data(&self.array)?;
        while let Some(element) = data.elements.get(self.index) {
            let index = self.index;
            self.index += 1;
            if element.is_void() {
                continue;
            }
            self.current = Some((index, element.clone()));
            return Ok(FrameStep::Call {
                callee: self.callback.clone(),
                this: self.this_arg.clone(),
                args: vec![element.clone(), Value::Number(index as f64), self.array.clone()],
            });
        }
        Ok(FrameStep::Return {
            value: self.state.finish(),
            this: mem::take(&mut self.array),
        })
    }

    fn resume(&mut self, result: Value) -> Result<(), Value> {
        if let Some((index, element)) = self.current.take() {
            self.early = self.state.process(index, element, result);
        }
        Ok(())
    }
}

fn mapping<S: MappingState + 'static>(
    this: Value,
    args: Vec<Value>,
    state: impl FnOnce(usize) -> S,
) -> Result<Box<dyn NativeFrame>, Value> {
    let len = array_data(&this)?.len();
    let mut args = args.into_iter();
    let callback = callback(args.next())?;
    let this_arg = args.next().map_or(Value::Undefined, Value::or_undefined);
    Ok(Box::new(MappingFrame {
        array: this,
        callback,
        this_arg,
        index: 0,
        current: None,
        state: state(len),
        early: None,
    }))
}

/// Holes stay holes.
#[derive(Debug)]
struct MapState {
    mapped: Vec<Value>,
}

impl MappingState for MapState {
    fn process(&mut self, index: usize, _element: Value, result: Value) -> Option<Value> {
        if let Some(slot) = self.mapped.get_mut(index) {
            *slot = result;
        }
        None
    }

    fn finish(&mut self) -> Value {
        Value::array(mem::take(&mut self.mapped))
    }
}

#[derive(Debug, Default)]
struct FilterState {
    kept: Vec<Value>,
}

impl MappingState for FilterState {
    fn process(&mut self, _index: usize, element: Value, result: Value) -> Option<Value> {
        if result.is_truthy() {
            self.kept.push(element);
        }
        None
    }

    fn finish(&mut self) -> Value {
        Value::array(mem::take(&mut self.kept))
    }
}

#[derive(Debug)]
struct FindState;

impl MappingState for FindState {
    fn process(&mut self, _index: usize, element: Value, result: Value) -> Option<Value> {
        result.is_truthy().then_some(element)
    }

    fn finish(&mut self) -> Value {
        Value::Undefined
    }
}

#[derive(Debug)]
struct FindIndexState;

impl MappingState for FindIndexState {
    fn process(&mut self, index: usize, _element: Value, result: Value) -> Option<Value> {
        result.is_truthy().then_some(Value::Number(index as f64))
    }

    fn finish(&mut self) -> Value {
        Value::Number(-1.0)
    }
}

#[derive(Debug)]
struct EveryState;

impl MappingState for EveryState {
    fn process(&mut self, _index: usize, _element: Value, result: Value) -> Option<Value> {
        (!result.is_truthy()).then_some(Value::Bool(false))
    }

    fn finish(&mut self) -> Value {
        Value::Bool(true)
    }
}

#[derive(Debug)]
struct SomeState;

impl MappingState for SomeState {
    fn process(&mut self, _index: usize, _element: Value, result: Value) -> Option<Value> {
        result.is_truthy().then_some(Value::Bool(true))
    }

    fn finish(&mut self) -> Value {
        Value::Bool(false)
    }
}

/// Array results are spliced in one level deep.
#[derive(Debug, Default)]
struct FlatMapState {
    flattened: Vec<Value>,
}

impl MappingState for FlatMapState {
    fn process(&mut self, _index: usize, _element: Value, result: Value) -> Option<Value> {
        match result {
            Value::Array(inner) => self
                .flattened
                .extend(inner.read().elements.iter().filter(|v| !v.is_void()).cloned()),
            other => self.flattened.push(other),
        }
        None
    }

    fn finish(&mut self) -> Value {
        Value::array(mem::take(&mut self.flattened))
    }
}

pub(crate) fn make_map(this: Value, args: Vec<Value>) -> Result<Box<dyn NativeFrame>, Value> {
    mapping(this, args, |len| MapState {
        mapped: vec![Value::Void; len],
    })
}

pub(crate) fn make_filter(this: Value, args: Vec<Value>) -> Result<Box<dyn NativeFrame>, Value> {
    mapping(this, args, |_| FilterState::default())
}

pub(crate) fn make_find(this: Value, args: Vec<Value>) -> Result<Box<dyn NativeFrame>, Value> {
    mapping(this, args, |_| FindState)
}

pub(crate) fn make_find_index(
    this: Value,
    args: Vec<Value>,
) -> Result<Box<dyn NativeFrame>, Value> {
    mapping(this, args, |_| FindIndexState)
}

pub(crate) fn make_every(this: Value, args: Vec<Value>) -> Result<Box<dyn NativeFrame>, Value> {
    mapping(this, args, |_| EveryState)
}

pub(crate) fn make_some(this: Value, args: Vec<Value>) -> Result<Box<dyn NativeFrame>, Value> {
    mapping(this, args, |_| SomeState)
}

pub(crate) fn make_flat_map(this: Value, args: Vec<Value>) -> Result<Box<dyn NativeFrame>, Value> {
    mapping(this, args, |_| FlatMapState::default())
}

// ===== Reduce =====

/// `reduce` and `reduceRight`.
///
/// The accumulator is moved into the callback's arguments rather than
/// cloned, so a reducer that pushes onto an accumulated array mutates it in
/// place.
#[derive(Debug)]
struct ReduceFrame {
    array: Value,
    callback: Value,
    accumulator: Option<Value>,
    visited: usize,
    from_right: bool,
}

impl NativeFrame for ReduceFrame {
    fn step(&mut self) -> Result<FrameStep, Value> {
        let data = array_data(&self.array)?;
        let len = data.len();
        while self.visited < len {
            let offset = self.visited;
            self.visited += 1;
            let index = if self.from_right { len - 1 - offset } else { offset };
            let Some(element) = data.elements.get(index).filter(|v| !v.is_void()) else {
                continue;
            };
            match self.accumulator.take() {
                None => self.accumulator = Some(element.clone()),
                Some(accumulator) => {
                    return Ok(FrameStep::Call {
                        callee: self.callback.clone(),
                        this: Value::Undefined,
                        args: vec![
                            accumulator,
                            element.clone(),
                            Value::Number(index as f64),
                            self.array.clone(),
                        ],
                    })
                }
            }
        }
        match self.accumulator.take() {
            Some(value) => Ok(FrameStep::Return {
                value,
                this: mem::take(&mut self.array),
            }),
            None => Err(Value::type_error(
                "Reduce of empty array with no initial value",
            )),
        }
    }

    fn resume(&mut self, result: Value) -> Result<(), Value> {
        self.accumulator = Some(result);
        Ok(())
    }
}

fn reduce(this: Value, args: Vec<Value>, from_right: bool) -> Result<Box<dyn NativeFrame>, Value> {
    array_data(&this)?;
    let has_initial = args.len() > 1;
    let mut args = args.into_iter();
    let callback = callback(args.next())?;
    let accumulator = if has_initial {
        args.next().map(Value::or_undefined)
    } else {
        None
    };
    Ok(Box::new(ReduceFrame {
        array: this,
        callback,
        accumulator,
        visited: 0,
        from_right,
    }))
}

pub(crate) fn make_reduce(this: Value, args: Vec<Value>) -> Result<Box<dyn NativeFrame>, Value> {
    reduce(this, args, false)
}

pub(crate) fn make_reduce_right(
    this: Value,
    args: Vec<Value>,
) -> Result<Box<dyn NativeFrame>, Value> {
    reduce(this, args, true)
}

// ===== Sort =====

/// In-place stable sort.
///
/// Without a comparator elements are ordered by their string forms. With
/// one, a bottom-up merge sort asks for one comparison per step; a positive
/// result puts the right element first. `undefined` sorts after everything
/// and holes after that.
#[derive(Debug)]
struct SortFrame {
    array: Value,
    comparator: Value,
    len: usize,
    undefined_count: usize,
    items: Vec<Value>,
    merged: Vec<Value>,
    width: usize,
    start: usize,
    left: usize,
    right: usize,
}

impl SortFrame {
    fn bounds(&self) -> (usize, usize) {
        let n = self.items.len();
        (
            (self.start + self.width).min(n),
            (self.start + 2 * self.width).min(n),
        )
    }

    fn finish(&mut self) -> FrameStep {
        let mut sorted = mem::take(&mut self.items);
        sorted.extend(std::iter::repeat(Value::Undefined).take(self.undefined_count));
        sorted.resize(self.len, Value::Void);
        if let Value::Array(handle) = &mut self.array {
            handle.get_mut().elements = sorted;
        }
        FrameStep::Return {
            value: self.array.clone(),
            this: mem::take(&mut self.array),
        }
    }
}

impl NativeFrame for SortFrame {
    fn step(&mut self) -> Result<FrameStep, Value> {
        loop {
            let n = self.items.len();
            if self.comparator.is_undefined() || self.width >= n {
                return Ok(self.finish());
            }
            if self.start >= n {
                self.items = mem::take(&mut self.merged);
                self.width *= 2;
                self.start = 0;
                self.left = 0;
                self.right = self.width.min(n);
                continue;
            }
            let (mid, end) = self.bounds();
            if self.left < mid && self.right < end {
                return Ok(FrameStep::Call {
                    callee: self.comparator.clone(),
                    this: Value::Undefined,
                    args: vec![
                        self.items[self.left].clone(),
                        self.items[self.right].clone(),
                    ],
                });
            }
            self.merged
                .extend(self.items[self.left..mid].iter_mut().map(mem::take));
            self.merged
                .extend(self.items[self.right..end].iter_mut().map(mem::take));
            self.start = end;
            self.left = end;
            self.right = (end + self.width).min(n);
        }
    }

    fn resume(&mut self, result: Value) -> Result<(), Value> {
        let from = if result.to_number() > 0.0 {
            &mut self.right
        } else {
            &mut self.left
        };
        let item = mem::take(&mut self.items[*from]);
        *from += 1;
        self.merged.push(item);
        Ok(())
    }
}

pub(crate) fn make_sort(this: Value, args: Vec<Value>) -> Result<Box<dyn NativeFrame>, Value> {
    let comparator = match args.into_iter().next().map(Value::or_undefined) {
        None | Some(Value::Undefined) => Value::Undefined,
        Some(f) => callback(Some(f)).map_err(|_| {
            Value::type_error("The comparison function must be either a function or undefined")
        })?,
    };
    let data = array_data(&this)?;
    let len = data.len();
    let mut items: Vec<Value> = data
        .elements
        .iter()
        .filter(|v| !v.is_undefined())
        .cloned()
        .collect();
    let undefined_count = data
        .elements
        .iter()
        .filter(|v| matches!(v, Value::Undefined))
        .count();
    if comparator.is_undefined() {
        items.sort_by_cached_key(|v| v.to_string());
    }
    let right = items.len().min(1);
    Ok(Box::new(SortFrame {
        array: this,
        comparator,
        len,
        undefined_count,
        items,
        merged: Vec::new(),
        width: 1,
        start: 0,
        left: 0,
        right,
    }))
}
