//! Word-stream serialization.

use crate::instruction::{Instruction, Operand};
use crate::module::{Module, Section};

/// Serializes modules to SPIR-V words.
#[derive(Debug)]
pub struct BinaryWriter {
    version: u32,
    generator: u32,
    words: Vec<u32>,
}

impl BinaryWriter {
    /// A writer for the given `(major, minor)` version and generator magic.
    pub fn new(version: (u8, u8), generator: u32) -> Self {
        Self {
            version: (u32::from(version.0) << 16) | (u32::from(version.1) << 8),
            generator,
            words: Vec::new(),
        }
    }

    /// The five header words; `bound` is one past the largest id.
    pub fn write_header(&mut self, bound: u32) {
        self.words
            .extend([spirv::MAGIC_NUMBER, self.version, self.generator, bound, 0]);
    }

    /// Appends one encoded instruction.
    pub fn write_instruction(&mut self, instruction: &Instruction) {
        let word_count = instruction.word_count() as u32;
        self.words
            .push((word_count << 16) | instruction.op as u32);
        for operand in &instruction.operands {
            match *operand {
                Operand::IdRef(id) => self.words.push(id.get()),
                Operand::LiteralU32(value) => self.words.push(value),
                Operand::LiteralString(ref s) => self.write_string(s),
            }
        }
    }

    fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        // The chunk holding the terminator is always present.
        for chunk_start in (0..=bytes.len()).step_by(4) {
            let mut word = [0u8; 4];
            let end = (chunk_start + 4).min(bytes.len());
            if chunk_start < end {
                word[..end - chunk_start].copy_from_slice(&bytes[chunk_start..end]);
            }
            self.words.push(u32::from_le_bytes(word));
        }
    }

    /// Header, every section in order, then the finished functions.
    pub fn write_module(mut self, module: &Module) -> Vec<u32> {
        self.write_header(module.bound());
        for section in Section::ALL {
            for instruction in module.section(section) {
                self.write_instruction(instruction);
            }
        }
        let end = Instruction::new(spirv::Op::FunctionEnd);
        for function in module.functions() {
            for instruction in function.instructions() {
                self.write_instruction(instruction);
            }
            self.write_instruction(&end);
        }
        log::debug!(
            "wrote SPIR-V module: bound {}, {} words",
            module.bound(),
            self.words.len()
        );
        self.words
    }

    /// Everything written so far.
    pub fn into_words(self) -> Vec<u32> {
        self.words
    }
}
