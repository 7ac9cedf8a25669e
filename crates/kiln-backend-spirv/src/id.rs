//! Result ids and their allocator.

use std::fmt;

/// A SPIR-V result id. Never zero.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Id(u32);

impl Id {
    /// The raw id word.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Issues ids in strictly increasing order, starting at 1.
#[derive(Debug)]
pub struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    /// An allocator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next unused id.
    pub fn next_id(&mut self) -> Id {
        let id = Id(self.next);
        self.next += 1;
        id
    }

    /// One past the highest id issued so far.
    pub fn bound(&self) -> u32 {
        self.next
    }
}
