//! SPIR-V backend for kiln.
//!
//! Lowers kiln IR into a binary SPIR-V module. The builder deduplicates
//! every type and constant structurally, keeps module-level instructions in
//! their logical sections, and emits functions as structured basic blocks.
//! [`write_module`] is the entry point; [`SpirvBackend`] wraps it for the
//! backend registry.

use kiln_backend_core::{Backend, BackendError, BackendOptions, BackendOutput};
use kiln_ir::Module as IrModule;

mod cache;
mod error;
mod flow;
mod function;
mod id;
mod instruction;
mod lower;
mod module;
pub mod ops;
mod writer;

pub use cache::{ConstantValue, MemberLayout, StructLayout, TypeConstantCache, TypeKey};
pub use error::{Error, FunctionError};
pub use flow::{ControlFlowStack, Frame, FrameKind};
pub use function::{Block, Function};
pub use id::{Id, IdAllocator};
pub use instruction::{Instruction, Operand};
pub use lower::{Options, write_module};
pub use module::{Module, Section};
pub use writer::BinaryWriter;

/// Backend that compiles kiln IR into a `.spv` binary.
#[derive(Debug)]
pub struct SpirvBackend;

impl Backend for SpirvBackend {
    fn name(&self) -> &str {
        "SPIR-V"
    }

    fn targets(&self) -> &[&str] {
        &["spirv", "spv"]
    }

    fn compile(
        &self,
        module: &IrModule,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        opts.validate()?;
        if module.entry_points.is_empty() {
            return Err(BackendError::Other("no entry points in module".into()));
        }
        let options = Options::from(opts);
        let words = write_module(module, &options)?;
        log::debug!(
            "SPIR-V {}.{}: {} entry point(s), {} words",
            options.version.0,
            options.version.1,
            module.entry_points.len(),
            words.len()
        );
        Ok(BackendOutput::single("module.spv", words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spirv::Op;

    #[test]
    fn backend_metadata() {
        let backend = SpirvBackend;
        assert_eq!(backend.name(), "SPIR-V");
        assert!(backend.targets().contains(&"spirv"));
        assert!(backend.targets().contains(&"spv"));
    }

    #[test]
    fn compile_empty_module_fails() {
        let backend = SpirvBackend;
        let result = backend.compile(&IrModule::default(), &BackendOptions::default());
        assert!(matches!(result, Err(BackendError::Other(_))));
    }

    #[test]
    fn compile_rejects_unknown_versions_before_lowering() {
        let opts = BackendOptions {
            spirv_version: (1, 7),
            ..Default::default()
        };
        let result = SpirvBackend.compile(&IrModule::default(), &opts);
        assert!(matches!(result, Err(BackendError::Unsupported(_))));
    }

    #[test]
    fn empty_module_writes_header_only_sections() {
        let words = write_module(&IrModule::default(), &Options::default()).unwrap();
        assert_eq!(words[0], spirv::MAGIC_NUMBER);
        assert_eq!(words[1], 0x0001_0300);
        // OpCapability Shader, OpMemoryModel Logical GLSL450
        assert_eq!(words[5], (2 << 16) | Op::Capability as u32);
        assert_eq!(words[7], (3 << 16) | Op::MemoryModel as u32);
        assert_eq!(words.len(), 10);
    }
}
