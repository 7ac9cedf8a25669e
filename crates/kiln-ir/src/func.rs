//! Functions, entry points, and local variables.

use std::collections::HashMap;

use crate::arena::{Arena, Handle};
use crate::error::IrError;
use crate::expr::Expression;
use crate::global::Binding;
use crate::stmt::Block;
use crate::types::Type;

/// A function argument declaration.
#[derive(Clone, Debug)]
pub struct FunctionArgument {
    /// Optional argument name.
    pub name: Option<String>,
    /// The type of this argument.
    pub ty: Handle<Type>,
    /// Stage interface binding (entry points only).
    pub binding: Option<Binding>,
}

/// The return type and optional binding of a function.
#[derive(Clone, Debug)]
pub struct FunctionResult {
    /// The return type.
    pub ty: Handle<Type>,
    /// Stage interface binding (entry points only).
    pub binding: Option<Binding>,
}

/// A function-local variable.
#[derive(Clone, Debug)]
pub struct LocalVariable {
    /// Optional variable name.
    pub name: Option<String>,
    /// The type of this variable.
    pub ty: Handle<Type>,
    /// Constant initializer, by handle into the function's expressions.
    pub init: Option<Handle<Expression>>,
}

/// An IR function.
#[derive(Clone, Debug)]
pub struct Function {
    /// Optional function name.
    pub name: Option<String>,
    /// Formal parameters.
    pub arguments: Vec<FunctionArgument>,
    /// Return type and optional binding.
    pub result: Option<FunctionResult>,
    /// Function-local variable declarations.
    pub local_variables: Arena<LocalVariable>,
    /// Expression arena for this function.
    pub expressions: Arena<Expression>,
    /// Resolved type of each expression, indexed like `expressions`.
    /// Pointer-producing expressions have pointer types.
    pub expression_types: Vec<Handle<Type>>,
    /// Map from expression handles to user-defined names.
    pub named_expressions: HashMap<Handle<Expression>, String>,
    /// The function body.
    pub body: Block,
}

impl Function {
    /// Creates an empty function with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            arguments: Vec::new(),
            result: None,
            local_variables: Arena::new(),
            expressions: Arena::new(),
            expression_types: Vec::new(),
            named_expressions: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Appends an expression together with its resolved type.
    pub fn add_expression(&mut self, expr: Expression, ty: Handle<Type>) -> Handle<Expression> {
        self.expression_types.push(ty);
        self.expressions.append(expr)
    }

    /// The resolved type of `handle`.
    pub fn expression_type(&self, handle: Handle<Expression>) -> Result<Handle<Type>, IrError> {
        if handle.index() >= self.expressions.len() {
            return Err(IrError::BadHandle {
                index: handle.index(),
                size: self.expressions.len(),
            });
        }
        self.expression_types
            .get(handle.index())
            .copied()
            .ok_or(IrError::MissingExpressionType {
                index: handle.index(),
            })
    }
}

/// The pipeline stage an entry point runs in.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// A shader entry point.
#[derive(Clone, Debug)]
pub struct EntryPoint {
    /// Entry point name (matches the WGSL function name).
    pub name: String,
    /// Pipeline stage.
    pub stage: ShaderStage,
    /// Workgroup dimensions `[x, y, z]`; `[0, 0, 0]` outside compute.
    pub workgroup_size: [u32; 3],
    /// The entry point function body.
    pub function: Function,
}

impl EntryPoint {
    /// Checks stage-specific requirements.
    pub fn validate(&self) -> Result<(), IrError> {
        if self.stage == ShaderStage::Compute && self.workgroup_size.contains(&0) {
            return Err(IrError::InvalidWorkgroupSize(self.workgroup_size));
        }
        Ok(())
    }
}
