//! kiln intermediate representation.
//!
//! An arena-based, typed IR for shader programs. Functions hold a tree of
//! structured statements over expressions, and every expression carries its
//! resolved type so backends never re-run type inference.

pub mod arena;
mod display;
mod error;
mod expr;
mod func;
mod global;
mod stmt;
mod types;

pub use arena::{Arena, Handle, Range, UniqueArena};
pub use display::{dump_module, format_type, format_type_inner};
pub use error::IrError;
pub use expr::{
    AtomicFunction, BinaryOp, Expression, Literal, MathFunction, SwizzleComponent, UnaryOp,
};
pub use func::{EntryPoint, Function, FunctionArgument, FunctionResult, LocalVariable, ShaderStage};
pub use global::{
    AddressSpace, Binding, BuiltIn, GlobalVariable, Interpolation, Override, ResourceBinding,
    StorageAccess,
};
pub use stmt::{Barrier, Block, Statement, SwitchCase, SwitchValue};
pub use types::{ArraySize, Bytes, Scalar, ScalarKind, StructMember, Type, TypeInner, VectorSize};

/// A complete shader program.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Deduplicated type arena.
    pub types: UniqueArena<Type>,
    /// Pipeline-overridable constants.
    pub overrides: Arena<Override>,
    /// Module-scope variables.
    pub global_variables: Arena<GlobalVariable>,
    /// Module-scope constant expressions.
    pub global_expressions: Arena<Expression>,
    /// Resolved type of each global expression, indexed like `global_expressions`.
    pub global_expression_types: Vec<Handle<Type>>,
    /// Helper (non-entry-point) functions. A function only calls functions
    /// that appear before it.
    pub functions: Arena<Function>,
    /// Shader entry points.
    pub entry_points: Vec<EntryPoint>,
}

impl Module {
    /// Appends a module-scope constant expression with its resolved type.
    pub fn add_global_expression(&mut self, expr: Expression, ty: Handle<Type>) -> Handle<Expression> {
        self.global_expression_types.push(ty);
        self.global_expressions.append(expr)
    }

    /// The resolved type of a module-scope constant expression.
    pub fn global_expression_type(
        &self,
        handle: Handle<Expression>,
    ) -> Result<Handle<Type>, IrError> {
        if handle.index() >= self.global_expressions.len() {
            return Err(IrError::BadHandle {
                index: handle.index(),
                size: self.global_expressions.len(),
            });
        }
        self.global_expression_types
            .get(handle.index())
            .copied()
            .ok_or(IrError::MissingExpressionType {
                index: handle.index(),
            })
    }
}
