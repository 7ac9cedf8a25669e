//! Typed arenas.
//!
//! Every IR collection that is referenced by index (types, expressions,
//! variables, functions) lives in an [`Arena`] or a deduplicating
//! [`UniqueArena`] and is addressed through a [`Handle`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed index into an [`Arena`] or [`UniqueArena`].
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.index)
    }
}

impl<T> Handle<T> {
    fn from_raw(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Zero-based position of the value in its arena.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Converts an arena length into the index of the next slot.
fn slot(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("arena holds more than u32::MAX items ({len})"))
}

/// A half-open run of handles `[start, end)`, used by `Emit` statements.
pub struct Range<T> {
    start: u32,
    end: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Range<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Range<T> {}

impl<T> PartialEq for Range<T> {
    fn eq(&self, other: &Self) -> bool {
        (self.start, self.end) == (other.start, other.end)
    }
}

impl<T> Eq for Range<T> {}

impl<T> fmt::Debug for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}

impl<T> Range<T> {
    /// Builds the range covering raw indices `range.start..range.end`.
    pub fn from_index_range(range: std::ops::Range<u32>) -> Self {
        Self {
            start: range.start,
            end: range.end,
            _marker: PhantomData,
        }
    }

    /// Builds the inclusive range `first..=last`.
    pub fn inclusive(first: Handle<T>, last: Handle<T>) -> Self {
        Self::from_index_range(first.index..last.index + 1)
    }

    /// Returns the raw index range.
    pub fn index_range(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }

    /// Returns `true` if the range covers no handles.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Iterates over the handles in the range, in order.
    pub fn iter(&self) -> impl Iterator<Item = Handle<T>> + use<T> {
        (self.start..self.end).map(Handle::from_raw)
    }
}

/// An append-only store addressed by [`Handle`].
#[derive(Clone, Debug)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Number of values stored.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The handle the next [`append`](Self::append) will return.
    pub fn next_handle(&self) -> Handle<T> {
        Handle::from_raw(slot(self.items.len()))
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let handle = self.next_handle();
        self.items.push(value);
        handle
    }

    /// Returns the value behind `handle`, or `None` if it is out of bounds.
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index())
    }

    /// The range of handles appended since the arena held `start_len` values.
    pub fn range_from(&self, start_len: usize) -> Range<T> {
        Range::from_index_range(slot(start_len)..slot(self.items.len()))
    }

    /// Iterates over `(handle, &value)` pairs in append order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::from_raw(i as u32), v))
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.items[handle.index()]
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.items[handle.index()]
    }
}

/// An arena that stores each distinct value once.
#[derive(Clone, Debug)]
pub struct UniqueArena<T> {
    items: Vec<T>,
    lookup: HashMap<T, u32>,
}

impl<T: Hash + Eq> Default for UniqueArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> UniqueArena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Number of distinct values stored.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts `value`, or returns the handle of an equal value already present.
    pub fn insert(&mut self, value: T) -> Handle<T>
    where
        T: Clone,
    {
        if let Some(&index) = self.lookup.get(&value) {
            return Handle::from_raw(index);
        }
        let index = slot(self.items.len());
        self.lookup.insert(value.clone(), index);
        self.items.push(value);
        Handle::from_raw(index)
    }

    /// Returns the handle of a value equal to `value`, if present.
    pub fn get(&self, value: &T) -> Option<Handle<T>> {
        self.lookup.get(value).map(|&index| Handle::from_raw(index))
    }

    /// Returns the value behind `handle`, or `None` if it is out of bounds.
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index())
    }

    /// Iterates over `(handle, &value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::from_raw(i as u32), v))
    }
}

impl<T> Index<Handle<T>> for UniqueArena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.items[handle.index()]
    }
}
