//! Stack of structured control-flow constructs, for `break` and `continue`.

use crate::error::Error;
use crate::id::Id;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameKind {
    If,
    Loop,
    Switch,
}

/// One active construct.
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    pub merge_block: Id,
    pub continue_block: Option<Id>,
    pub kind: FrameKind,
}

#[derive(Debug, Default)]
pub struct ControlFlowStack {
    frames: Vec<Frame>,
}

impl ControlFlowStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_if(&mut self, merge_block: Id) {
        self.frames.push(Frame {
            merge_block,
            continue_block: None,
            kind: FrameKind::If,
        });
    }

    pub fn push_loop(&mut self, merge_block: Id, continue_block: Id) {
        self.frames.push(Frame {
            merge_block,
            continue_block: Some(continue_block),
            kind: FrameKind::Loop,
        });
    }

    /// A switch inherits the continue block of the enclosing loop, if any.
    pub fn push_switch(&mut self, merge_block: Id) {
        let continue_block = self
            .frames
            .iter()
            .rev()
            .find(|f| f.kind == FrameKind::Loop)
            .and_then(|f| f.continue_block);
        self.frames.push(Frame {
            merge_block,
            continue_block,
            kind: FrameKind::Switch,
        });
    }

    pub fn pop(&mut self) -> Result<Frame, Error> {
        self.frames
            .pop()
            .ok_or_else(|| Error::internal("control-flow stack underflow"))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Merge block of the nearest loop or switch.
    pub fn break_target(&self) -> Result<Id, Error> {
        self.frames
            .iter()
            .rev()
            .find(|f| matches!(f.kind, FrameKind::Loop | FrameKind::Switch))
            .map(|f| f.merge_block)
            .ok_or(Error::NotInLoopOrSwitch)
    }

    /// Continue block of the nearest loop, looking through switches.
    pub fn continue_target(&self) -> Result<Id, Error> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.kind == FrameKind::Loop)
            .and_then(|f| f.continue_block)
            .ok_or(Error::NotInLoopOrSwitch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdAllocator;

    #[test]
    fn empty_stack_has_no_targets() {
        let stack = ControlFlowStack::new();
        assert!(matches!(stack.break_target(), Err(Error::NotInLoopOrSwitch)));
        assert!(matches!(
            stack.continue_target(),
            Err(Error::NotInLoopOrSwitch)
        ));
    }

    #[test]
    fn if_frames_are_transparent() {
        let mut ids = IdAllocator::new();
        let mut stack = ControlFlowStack::new();
        stack.push_if(ids.next_id());
        assert!(stack.break_target().is_err());

        let (merge, cont) = (ids.next_id(), ids.next_id());
        stack.push_loop(merge, cont);
        stack.push_if(ids.next_id());
        assert_eq!(stack.break_target().unwrap(), merge);
        assert_eq!(stack.continue_target().unwrap(), cont);
    }

    #[test]
    fn switch_in_loop() {
        let mut ids = IdAllocator::new();
        let mut stack = ControlFlowStack::new();
        let (loop_merge, cont) = (ids.next_id(), ids.next_id());
        stack.push_loop(loop_merge, cont);
        let switch_merge = ids.next_id();
        stack.push_switch(switch_merge);

        assert_eq!(stack.break_target().unwrap(), switch_merge);
        assert_eq!(stack.continue_target().unwrap(), cont);
        assert_eq!(stack.pop().unwrap().continue_block, Some(cont));
        assert_eq!(stack.break_target().unwrap(), loop_merge);
    }

    #[test]
    fn loop_in_switch() {
        let mut ids = IdAllocator::new();
        let mut stack = ControlFlowStack::new();
        stack.push_switch(ids.next_id());
        assert!(stack.continue_target().is_err());

        let (merge, cont) = (ids.next_id(), ids.next_id());
        stack.push_loop(merge, cont);
        assert_eq!(stack.break_target().unwrap(), merge);
        assert_eq!(stack.continue_target().unwrap(), cont);
        stack.pop().unwrap();
        stack.pop().unwrap();
        assert_eq!(stack.depth(), 0);
        assert!(stack.pop().is_err());
    }
}
