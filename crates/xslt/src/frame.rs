//! The per-run variable storage: a stack of fixed-size local frames and the
//! pool of global values.
use crate::error::ExecutionError;
use std::cell::RefCell;
use weft_xpath1::XPathValue;

/// Counters used to check that every `link` had its `unlink`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub links: usize,
    pub unlinks: usize,
    pub max_frames: usize,
}

impl FrameStats {
    pub fn is_balanced(&self) -> bool {
        self.links == self.unlinks
    }
}

/// Local frames laid out back to back in one slot vector.
#[derive(Debug)]
pub struct FrameStack<N> {
    slots: Vec<Option<XPathValue<N>>>,
    bases: Vec<usize>,
    stats: FrameStats,
}

impl<N> Default for FrameStack<N> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            bases: Vec::new(),
            stats: FrameStats::default(),
        }
    }
}

impl<N: Clone> FrameStack<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a frame of `size` unset slots.
    pub fn link(&mut self, size: usize) {
        self.bases.push(self.slots.len());
        self.slots.resize_with(self.slots.len() + size, || None);
        self.stats.links += 1;
        self.stats.max_frames = self.stats.max_frames.max(self.bases.len());
    }

    pub fn unlink(&mut self) {
        if let Some(base) = self.bases.pop() {
            self.slots.truncate(base);
            self.stats.unlinks += 1;
        }
    }

    pub fn depth(&self) -> usize {
        self.bases.len()
    }

    /// Slots held by all linked frames together.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    fn slot_index(&self, depth: usize, index: usize) -> Option<usize> {
        let frame = self.bases.len().checked_sub(depth + 1)?;
        let base = self.bases[frame];
        let end = self.bases.get(frame + 1).copied().unwrap_or(self.slots.len());
        (base + index < end).then_some(base + index)
    }

    /// Reads `index` in the frame `depth` levels below the current one.
    pub fn get_local(&self, depth: usize, index: usize) -> Option<&XPathValue<N>> {
        self.slot_index(depth, index)
            .and_then(|i| self.slots[i].as_ref())
    }

    /// Writes `index` in the current frame.
    pub fn set_local(&mut self, index: usize, value: XPathValue<N>) -> Result<(), ExecutionError> {
        let i = self.slot_index(0, index).ok_or_else(|| {
            ExecutionError::Structure(format!("Slot {} is outside the current frame", index))
        })?;
        self.slots[i] = Some(value);
        Ok(())
    }

    /// True if the current frame has `index` set.
    pub fn is_set(&self, index: usize) -> bool {
        self.get_local(0, index).is_some()
    }
}

/// A linked frame. Dropping it unlinks the frame, on every exit path.
pub struct LinkedFrame<'r, N: Clone> {
    stack: &'r RefCell<FrameStack<N>>,
}

impl<'r, N: Clone> LinkedFrame<'r, N> {
    pub fn link(stack: &'r RefCell<FrameStack<N>>, size: usize) -> Self {
        stack.borrow_mut().link(size);
        Self { stack }
    }
}

impl<N: Clone> Drop for LinkedFrame<'_, N> {
    fn drop(&mut self) {
        match self.stack.try_borrow_mut() {
            Ok(mut stack) => stack.unlink(),
            Err(_) => log::error!("frame stack is borrowed while a frame is released; frame left linked"),
        }
    }
}

#[derive(Debug, Clone)]
enum GlobalState<N> {
    Pending,
    Evaluating,
    Ready(XPathValue<N>),
}

/// Transformation-wide values, each computed at most once per run.
#[derive(Debug)]
pub struct GlobalPool<N> {
    values: Vec<GlobalState<N>>,
}

/// What a read of a global found.
pub enum GlobalLookup<N> {
    Ready(XPathValue<N>),
    /// Not yet computed; the caller must evaluate it and call `finish`.
    Started,
}

impl<N: Clone> GlobalPool<N> {
    pub fn new(count: usize) -> Self {
        Self {
            values: vec![GlobalState::Pending; count],
        }
    }

    /// Stores a value supplied from outside the stylesheet, such as a parameter.
    pub fn set_global(&mut self, index: usize, value: XPathValue<N>) {
        if let Some(state) = self.values.get_mut(index) {
            *state = GlobalState::Ready(value);
        }
    }

    pub fn get_global(&self, index: usize) -> Option<&XPathValue<N>> {
        match self.values.get(index) {
            Some(GlobalState::Ready(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns the value if ready, or marks the global as being evaluated.
    /// Reading a global that is already being evaluated is a circular reference.
    pub fn begin(&mut self, index: usize, name: &str) -> Result<GlobalLookup<N>, ExecutionError> {
        match self.values.get_mut(index) {
            Some(GlobalState::Ready(value)) => Ok(GlobalLookup::Ready(value.clone())),
            Some(GlobalState::Evaluating) => Err(ExecutionError::CircularVariable(name.to_string())),
            Some(state @ GlobalState::Pending) => {
                *state = GlobalState::Evaluating;
                Ok(GlobalLookup::Started)
            }
            None => Err(ExecutionError::Structure(format!(
                "Global slot {} does not exist",
                index
            ))),
        }
    }

    pub fn finish(&mut self, index: usize, value: XPathValue<N>) {
        self.set_global(index, value);
    }

    /// Returns an interrupted evaluation to pending.
    pub fn abandon(&mut self, index: usize) {
        if let Some(state @ GlobalState::Evaluating) = self.values.get_mut(index) {
            *state = GlobalState::Pending;
        }
    }
}
