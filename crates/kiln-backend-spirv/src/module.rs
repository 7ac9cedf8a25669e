//! The module container: logical sections plus finished functions.

use spirv::Op;

use crate::error::Error;
use crate::function::Function;
use crate::id::{Id, IdAllocator};
use crate::instruction::Instruction;

/// Module-level sections, in the order they are written.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Section {
    /// `OpCapability`, deduplicated.
    Capabilities,
    /// `OpExtension`.
    Extensions,
    /// `OpExtInstImport`.
    ExtInstImports,
    /// The single `OpMemoryModel`.
    MemoryModel,
    /// `OpEntryPoint`.
    EntryPoints,
    /// `OpExecutionMode`.
    ExecutionModes,
    /// `OpName` and `OpMemberName`.
    Debug,
    /// `OpDecorate` and `OpMemberDecorate`.
    Annotations,
    /// Types, constants and global variables, each defined before its first use.
    Globals,
}

impl Section {
    /// Every section, in binary order.
    pub const ALL: [Section; 9] = [
        Section::Capabilities,
        Section::Extensions,
        Section::ExtInstImports,
        Section::MemoryModel,
        Section::EntryPoints,
        Section::ExecutionModes,
        Section::Debug,
        Section::Annotations,
        Section::Globals,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// A SPIR-V module under construction.
#[derive(Debug, Default)]
pub struct Module {
    ids: IdAllocator,
    sections: [Vec<Instruction>; 9],
    functions: Vec<Function>,
    current: Option<Function>,
    glsl_std: Option<Id>,
}

impl Module {
    /// An empty module; ids start at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh result id.
    pub fn next_id(&mut self) -> Id {
        self.ids.next_id()
    }

    /// One past the highest id issued.
    pub fn bound(&self) -> u32 {
        self.ids.bound()
    }

    /// Appends to a module-level section. Capabilities are deduplicated.
    pub fn push(&mut self, section: Section, instruction: Instruction) {
        let list = &mut self.sections[section.index()];
        if section == Section::Capabilities && list.contains(&instruction) {
            return;
        }
        list.push(instruction);
    }

    /// Declares `capability`; repeated requests are ignored.
    pub fn add_capability(&mut self, capability: spirv::Capability) {
        self.push(
            Section::Capabilities,
            Instruction::new(Op::Capability).lit(capability as u32),
        );
    }

    /// The `GLSL.std.450` import, created on first use.
    pub fn glsl_std(&mut self) -> Id {
        if let Some(id) = self.glsl_std {
            return id;
        }
        let id = self.next_id();
        self.push(
            Section::ExtInstImports,
            Instruction::new(Op::ExtInstImport).id(id).string("GLSL.std.450"),
        );
        self.glsl_std = Some(id);
        id
    }

    /// The instructions pushed to `section` so far.
    pub fn section(&self, section: Section) -> &[Instruction] {
        &self.sections[section.index()]
    }

    /// The function currently being populated.
    pub fn current_function(&mut self) -> Result<&mut Function, Error> {
        self.current.as_mut().ok_or(Error::NotInFunction)
    }

    /// Makes `function` the current function. Only one may be open.
    pub fn open_function(&mut self, function: Function) -> Result<(), Error> {
        if let Some(open) = &self.current {
            return Err(Error::internal(format!(
                "function {} opened while {} is still open",
                function.id, open.id
            )));
        }
        self.current = Some(function);
        Ok(())
    }

    /// Validates the current function and moves it to the finished list.
    pub fn close_function(&mut self) -> Result<(), Error> {
        let function = self.current.take().ok_or(Error::NotInFunction)?;
        function.finish()?;
        self.functions.push(function);
        Ok(())
    }

    /// Drops a half-built function after a lowering error.
    pub fn abandon_function(&mut self) {
        self.current = None;
    }

    /// Returns `true` while a function is being populated.
    pub fn has_open_function(&self) -> bool {
        self.current.is_some()
    }

    /// Finished functions, in the order they were closed.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_are_deduplicated() {
        let mut m = Module::new();
        m.add_capability(spirv::Capability::Shader);
        m.add_capability(spirv::Capability::Float64);
        m.add_capability(spirv::Capability::Shader);
        assert_eq!(m.section(Section::Capabilities).len(), 2);
    }

    #[test]
    fn glsl_import_is_created_once() {
        let mut m = Module::new();
        let a = m.glsl_std();
        let b = m.glsl_std();
        assert_eq!(a, b);
        assert_eq!(m.section(Section::ExtInstImports).len(), 1);
        assert_eq!(m.bound(), a.get() + 1);
    }

    #[test]
    fn current_function_requires_open_function() {
        let mut m = Module::new();
        assert!(matches!(m.current_function(), Err(Error::NotInFunction)));
        assert!(matches!(m.close_function(), Err(Error::NotInFunction)));

        let (ret, ty, id) = (m.next_id(), m.next_id(), m.next_id());
        m.open_function(Function::new(id, ty, ret)).unwrap();
        assert!(m.open_function(Function::new(id, ty, ret)).is_err());

        let entry = m.next_id();
        let f = m.current_function().unwrap();
        f.begin_block(entry).unwrap();
        f.terminate(Instruction::new(Op::Return)).unwrap();
        m.close_function().unwrap();
        assert!(!m.has_open_function());
        assert_eq!(m.functions().len(), 1);
    }

    #[test]
    fn unterminated_function_fails_to_close() {
        let mut m = Module::new();
        let (ret, ty, id) = (m.next_id(), m.next_id(), m.next_id());
        m.open_function(Function::new(id, ty, ret)).unwrap();
        let entry = m.next_id();
        m.current_function().unwrap().begin_block(entry).unwrap();
        assert!(matches!(
            m.close_function(),
            Err(Error::InternalConsistency(_))
        ));
    }
}
