//! Instructions and operands.

use spirv::Op;

use crate::id::Id;

/// One operand of an instruction.
///
/// Float literals are stored as [`Operand::LiteralU32`] holding their
/// IEEE-754 bits.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A result id: a type, value, label or function.
    IdRef(Id),
    /// One literal word: an integer, enumerant, mask or raw float bits.
    LiteralU32(u32),
    /// UTF-8, NUL terminated and zero padded to a word boundary.
    LiteralString(String),
}

impl Operand {
    /// Number of 32-bit words this operand occupies.
    pub fn word_count(&self) -> usize {
        match *self {
            Self::IdRef(_) | Self::LiteralU32(_) => 1,
            Self::LiteralString(ref s) => s.len() / 4 + 1,
        }
    }
}

/// An opcode with its ordered operands, including any result type and result id.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    /// The opcode; the word count is derived when writing.
    pub op: Op,
    /// Operands in encoding order.
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// An instruction with no operands yet. Operands are appended with the
    /// builder methods below, in encoding order.
    pub fn new(op: Op) -> Self {
        Self {
            op,
            operands: Vec::new(),
        }
    }

    /// Appends an id operand.
    pub fn id(mut self, id: Id) -> Self {
        self.operands.push(Operand::IdRef(id));
        self
    }

    /// Appends id operands; an empty iterator (or `None`) appends nothing.
    pub fn ids(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.operands.extend(ids.into_iter().map(Operand::IdRef));
        self
    }

    /// Appends a literal word.
    pub fn lit(mut self, value: u32) -> Self {
        self.operands.push(Operand::LiteralU32(value));
        self
    }

    /// Appends literal words.
    pub fn lits(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.operands
            .extend(values.into_iter().map(Operand::LiteralU32));
        self
    }

    /// Appends a literal string.
    pub fn string(mut self, value: &str) -> Self {
        self.operands.push(Operand::LiteralString(value.to_string()));
        self
    }

    /// Total encoded length, including the opcode word.
    pub fn word_count(&self) -> usize {
        1 + self.operands.iter().map(Operand::word_count).sum::<usize>()
    }

    /// Returns `true` for block terminators.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.op,
            Op::Branch
                | Op::BranchConditional
                | Op::Switch
                | Op::Return
                | Op::ReturnValue
                | Op::Kill
                | Op::Unreachable
        )
    }

    // ---- Common shapes ----

    /// `OpLabel`, opening a block.
    pub fn label(id: Id) -> Self {
        Self::new(Op::Label).id(id)
    }

    /// `OpBranch` to `target`.
    pub fn branch(target: Id) -> Self {
        Self::new(Op::Branch).id(target)
    }

    /// `OpBranchConditional`: `accept` when `condition` holds, else `reject`.
    pub fn branch_conditional(condition: Id, accept: Id, reject: Id) -> Self {
        Self::new(Op::BranchConditional)
            .id(condition)
            .id(accept)
            .id(reject)
    }

    /// `OpSelectionMerge` with no selection control.
    pub fn selection_merge(merge: Id) -> Self {
        Self::new(Op::SelectionMerge)
            .id(merge)
            .lit(spirv::SelectionControl::NONE.bits())
    }

    /// `OpLoopMerge` with no loop control.
    pub fn loop_merge(merge: Id, continuing: Id) -> Self {
        Self::new(Op::LoopMerge)
            .id(merge)
            .id(continuing)
            .lit(spirv::LoopControl::NONE.bits())
    }

    /// `OpLoad` through `pointer`.
    pub fn load(result_type: Id, id: Id, pointer: Id) -> Self {
        Self::new(Op::Load).id(result_type).id(id).id(pointer)
    }

    /// `OpStore` of `value` through `pointer`.
    pub fn store(pointer: Id, value: Id) -> Self {
        Self::new(Op::Store).id(pointer).id(value)
    }

    /// `OpVariable`, with an optional constant initializer.
    pub fn variable(pointer_type: Id, id: Id, class: spirv::StorageClass, init: Option<Id>) -> Self {
        Self::new(Op::Variable)
            .id(pointer_type)
            .id(id)
            .lit(class as u32)
            .ids(init)
    }

    /// `OpAccessChain`; `result_type` is a pointer type.
    pub fn access_chain(result_type: Id, id: Id, base: Id, indices: &[Id]) -> Self {
        Self::new(Op::AccessChain)
            .id(result_type)
            .id(id)
            .id(base)
            .ids(indices.iter().copied())
    }

    /// `OpCompositeConstruct` from `parts`, in order.
    pub fn composite_construct(result_type: Id, id: Id, parts: &[Id]) -> Self {
        Self::new(Op::CompositeConstruct)
            .id(result_type)
            .id(id)
            .ids(parts.iter().copied())
    }

    /// `OpCompositeExtract` with literal indices.
    pub fn composite_extract(result_type: Id, id: Id, composite: Id, indices: &[u32]) -> Self {
        Self::new(Op::CompositeExtract)
            .id(result_type)
            .id(id)
            .id(composite)
            .lits(indices.iter().copied())
    }

    /// `OpDecorate` with the decoration's literal operands.
    pub fn decorate(target: Id, decoration: spirv::Decoration, operands: &[u32]) -> Self {
        Self::new(Op::Decorate)
            .id(target)
            .lit(decoration as u32)
            .lits(operands.iter().copied())
    }

    /// `OpMemberDecorate` of struct member `member`.
    pub fn member_decorate(
        target: Id,
        member: u32,
        decoration: spirv::Decoration,
        operands: &[u32],
    ) -> Self {
        Self::new(Op::MemberDecorate)
            .id(target)
            .lit(member)
            .lit(decoration as u32)
            .lits(operands.iter().copied())
    }

    /// `OpName` debug instruction.
    pub fn name(target: Id, name: &str) -> Self {
        Self::new(Op::Name).id(target).string(name)
    }

    /// `OpMemberName` debug instruction.
    pub fn member_name(target: Id, member: u32, name: &str) -> Self {
        Self::new(Op::MemberName).id(target).lit(member).string(name)
    }
}
