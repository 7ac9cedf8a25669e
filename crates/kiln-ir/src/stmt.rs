//! Statements: side effects and structured control flow.

use crate::arena::{Handle, Range};
use crate::expr::{AtomicFunction, Expression};

/// A block of statements.
pub type Block = Vec<Statement>;

/// Bitflags for synchronization barriers.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Barrier(u32);

impl Barrier {
    /// Empty barrier (no flags set).
    pub const EMPTY: Self = Self(0);
    /// Storage buffer barrier.
    pub const STORAGE: Self = Self(1);
    /// Workgroup memory barrier.
    pub const WORKGROUP: Self = Self(2);

    /// Returns `true` if `self` contains all flags in `other`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flags are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Barrier {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One selector of a `switch` case.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum SwitchValue {
    I32(i32),
    U32(u32),
    Default,
}

/// A `switch` case: every selector in `values` runs `body`.
#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub values: Vec<SwitchValue>,
    pub body: Block,
}

impl SwitchCase {
    /// Returns `true` if this case handles the default selector.
    pub fn is_default(&self) -> bool {
        self.values.contains(&SwitchValue::Default)
    }
}

/// A statement in the IR.
#[derive(Clone, Debug)]
pub enum Statement {
    /// Evaluate a range of expressions at this point.
    Emit(Range<Expression>),
    /// A nested scope.
    Block(Block),
    /// Write a value through a pointer.
    Store {
        pointer: Handle<Expression>,
        value: Handle<Expression>,
    },
    /// Two-way conditional.
    If {
        condition: Handle<Expression>,
        accept: Block,
        reject: Block,
    },
    /// Multi-way branch on an integer selector.
    Switch {
        selector: Handle<Expression>,
        cases: Vec<SwitchCase>,
    },
    /// Unified loop construct (`for`, `while` and `loop` all lower here).
    ///
    /// `continuing` runs at the end of every iteration; when `break_if`
    /// is set and evaluates to true after it, the loop exits.
    Loop {
        body: Block,
        continuing: Block,
        break_if: Option<Handle<Expression>>,
    },
    /// Call a function.
    Call {
        function: Handle<crate::Function>,
        arguments: Vec<Handle<Expression>>,
        result: Option<Handle<Expression>>,
    },
    /// Perform an atomic operation.
    Atomic {
        pointer: Handle<Expression>,
        fun: AtomicFunction,
        value: Handle<Expression>,
        result: Option<Handle<Expression>>,
    },
    /// Exit the innermost loop or switch.
    Break,
    /// Jump to the continuing block of the innermost loop.
    Continue,
    /// Return from the function.
    Return { value: Option<Handle<Expression>> },
    /// Discard the current fragment.
    Kill,
    /// Synchronization barrier.
    Barrier(Barrier),
}

impl Statement {
    /// Returns `true` if control never continues past this statement.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Break | Self::Continue | Self::Return { .. } | Self::Kill
        )
    }
}
