//! Function bodies as lists of basic blocks.

use spirv::Op;

use crate::error::Error;
use crate::id::Id;
use crate::instruction::Instruction;

/// A basic block: a label, straight-line instructions and one terminator.
#[derive(Debug)]
pub struct Block {
    pub label: Id,
    label_instruction: Instruction,
    pub body: Vec<Instruction>,
    pub terminator: Option<Instruction>,
}

/// A function under construction.
#[derive(Debug)]
pub struct Function {
    pub id: Id,
    pub type_id: Id,
    pub return_type: Id,
    pub parameter_ids: Vec<Id>,
    declaration: Instruction,
    parameters: Vec<Instruction>,
    /// `OpVariable Function` instructions; written at the top of the first block.
    variables: Vec<Instruction>,
    blocks: Vec<Block>,
}

impl Function {
    pub fn new(id: Id, type_id: Id, return_type: Id) -> Self {
        let declaration = Instruction::new(Op::Function)
            .id(return_type)
            .id(id)
            .lit(spirv::FunctionControl::NONE.bits())
            .id(type_id);
        Self {
            id,
            type_id,
            return_type,
            parameter_ids: Vec::new(),
            declaration,
            parameters: Vec::new(),
            variables: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn add_parameter(&mut self, ty: Id, id: Id) {
        self.parameter_ids.push(id);
        self.parameters
            .push(Instruction::new(Op::FunctionParameter).id(ty).id(id));
    }

    pub fn add_variable(&mut self, variable: Instruction) {
        self.variables.push(variable);
    }

    /// Starts a new block. The previous block must already be terminated.
    pub fn begin_block(&mut self, label: Id) -> Result<(), Error> {
        if self.has_open_block() {
            return Err(Error::internal(format!(
                "block {label} started while {} is still open",
                self.blocks.last().map_or(label, |b| b.label)
            )));
        }
        log::trace!("begin block {label} in function {}", self.id);
        self.blocks.push(Block {
            label,
            label_instruction: Instruction::label(label),
            body: Vec::new(),
            terminator: None,
        });
        Ok(())
    }

    /// Appends a non-terminator to the current block.
    pub fn push(&mut self, instruction: Instruction) -> Result<(), Error> {
        if instruction.is_terminator() {
            return self.terminate(instruction);
        }
        match self.blocks.last_mut() {
            Some(block) if block.terminator.is_none() => {
                block.body.push(instruction);
                Ok(())
            }
            _ => Err(Error::internal(format!(
                "{:?} emitted outside an open block",
                instruction.op
            ))),
        }
    }

    /// Closes the current block.
    pub fn terminate(&mut self, terminator: Instruction) -> Result<(), Error> {
        match self.blocks.last_mut() {
            Some(block) if block.terminator.is_none() => {
                block.terminator = Some(terminator);
                Ok(())
            }
            _ => Err(Error::internal(format!(
                "{:?} has no open block to terminate",
                terminator.op
            ))),
        }
    }

    pub fn has_open_block(&self) -> bool {
        self.blocks
            .last()
            .is_some_and(|block| block.terminator.is_none())
    }

    /// Label of the block receiving instructions, if one is open.
    pub fn current_label(&self) -> Option<Id> {
        self.blocks
            .last()
            .filter(|block| block.terminator.is_none())
            .map(|block| block.label)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Checks that the function has a body and every block is terminated.
    pub fn finish(&self) -> Result<(), Error> {
        if self.blocks.is_empty() {
            return Err(Error::internal(format!("function {} has no blocks", self.id)));
        }
        if let Some(block) = self.blocks.iter().find(|b| b.terminator.is_none()) {
            return Err(Error::internal(format!(
                "block {} in function {} has no terminator",
                block.label, self.id
            )));
        }
        Ok(())
    }

    /// The instruction stream from `OpFunction` up to, not including, `OpFunctionEnd`.
    pub fn instructions(&self) -> Vec<&Instruction> {
        let mut out = vec![&self.declaration];
        out.extend(&self.parameters);
        for (index, block) in self.blocks.iter().enumerate() {
            out.push(&block.label_instruction);
            if index == 0 {
                out.extend(&self.variables);
            }
            out.extend(&block.body);
            out.extend(&block.terminator);
        }
        out
    }
}
