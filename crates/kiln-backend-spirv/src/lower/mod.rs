//! IR to SPIR-V lowering.
//!
//! A [`Builder`] owns the module, the type/constant cache and the
//! per-global bookkeeping for one program. Module-level declarations are
//! lowered here; function bodies go through [`expr`] and [`stmt`].

mod expr;
mod stmt;

use std::collections::{HashMap, HashSet};

use kiln_backend_core::BackendOptions;
use kiln_ir::{
    AddressSpace, ArraySize, Binding, BuiltIn, Expression, Handle, Interpolation, Literal, Scalar,
    ScalarKind, ShaderStage, StorageAccess, Type, TypeInner,
};
use spirv::{Decoration, ExecutionMode, ExecutionModel, Op, StorageClass};

use crate::cache::{ConstantValue, MemberLayout, StructLayout, TypeConstantCache, TypeKey};
use crate::error::{Error, FunctionError};
use crate::flow::ControlFlowStack;
use crate::function::Function;
use crate::id::Id;
use crate::instruction::Instruction;
use crate::module::{Module, Section};
use crate::writer::BinaryWriter;

/// Settings for one [`write_module`] call.
#[derive(Clone, Debug)]
pub struct Options {
    /// SPIR-V version as `(major, minor)`.
    pub version: (u8, u8),
    /// Generator magic written to header word 2.
    pub generator: u32,
    /// Emit `OpName` / `OpMemberName`.
    pub debug_names: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            version: (1, 3),
            generator: 0,
            debug_names: true,
        }
    }
}

impl From<&BackendOptions> for Options {
    fn from(options: &BackendOptions) -> Self {
        Self {
            version: options.spirv_version,
            generator: 0,
            debug_names: options.debug_names,
        }
    }
}

/// Lowers a whole IR module and returns the SPIR-V word stream.
///
/// Every function is attempted; if any of them fails, the collected
/// failures are returned as [`Error::Aborted`] and no words are produced.
pub fn write_module(ir: &kiln_ir::Module, options: &Options) -> Result<Vec<u32>, Error> {
    let mut builder = Builder::new(ir, options);
    builder.lower()?;
    let Builder { module, .. } = builder;
    Ok(BinaryWriter::new(options.version, options.generator).write_module(&module))
}

/// How a global variable is reached from function code.
#[derive(Clone, Copy, Debug)]
struct GlobalInfo {
    var: Id,
    /// Non-struct buffer contents live in member 0 of a `Block` wrapper.
    wrapped: bool,
    /// Pointer type of the unwrapped contents.
    inner_pointer: Id,
}

/// An entry-point `Input` or `Output` variable.
#[derive(Clone, Copy, Debug)]
struct InterfaceVariable {
    var: Id,
    /// Member of the returned struct, or `None` when the whole value is stored.
    member: Option<(u32, Id)>,
    /// `SampleMask` is declared as a one-element array; this is the pointer
    /// type of that element.
    element: Option<Id>,
}

/// Lowering state for one function body.
struct FunctionState<'a> {
    function: &'a kiln_ir::Function,
    name: String,
    /// Result id of each expression lowered so far.
    values: Vec<Option<Id>>,
    /// Order in which `values` entries were filled, for scoped rollback.
    scope_log: Vec<Handle<Expression>>,
    /// Right-hand operands of `&&`/`||` (and their private operands),
    /// lowered on demand instead of at their `Emit`.
    deferred: Vec<bool>,
    locals: Vec<Id>,
    arguments: Vec<Id>,
    global_pointers: Vec<Option<Id>>,
    outputs: Vec<InterfaceVariable>,
    flow: ControlFlowStack,
    return_type: Id,
    returns_void: bool,
}

impl<'a> FunctionState<'a> {
    fn new(function: &'a kiln_ir::Function, name: String, return_type: Id, returns_void: bool) -> Self {
        let count = function.expressions.len();
        Self {
            function,
            name,
            values: vec![None; count],
            scope_log: Vec::new(),
            deferred: deferred_expressions(function),
            locals: Vec::new(),
            arguments: Vec::new(),
            global_pointers: Vec::new(),
            outputs: Vec::new(),
            flow: ControlFlowStack::new(),
            return_type,
            returns_void,
        }
    }

    fn cache(&mut self, handle: Handle<Expression>, id: Id) {
        if let Some(slot) = self.values.get_mut(handle.index()) {
            *slot = Some(id);
            self.scope_log.push(handle);
        }
    }

    fn cached(&self, handle: Handle<Expression>) -> Option<Id> {
        self.values.get(handle.index()).copied().flatten()
    }

    /// Forgets every value cached after `mark`.
    fn rollback(&mut self, mark: usize) {
        for handle in self.scope_log.drain(mark..) {
            self.values[handle.index()] = None;
        }
    }
}

/// Marks expressions whose only uses are as the right operand of a
/// short-circuit operator, directly or through other such expressions.
///
/// An expression is only deferred when it is emitted in the same epoch as
/// its user, so no store, call, atomic or nested construct lies between
/// where the IR evaluates it and where the right-hand block does.
fn deferred_expressions(function: &kiln_ir::Function) -> Vec<bool> {
    let count = function.expressions.len();
    let mut users: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (handle, expr) in function.expressions.iter() {
        for operand in expr.operands() {
            if let Some(list) = users.get_mut(operand.index()) {
                list.push(handle.index());
            }
        }
    }

    let mut used_by_statements = vec![false; count];
    stmt::collect_statement_uses(&function.body, &mut used_by_statements);

    let mut epochs = vec![None; count];
    stmt::collect_emit_epochs(&function.body, &mut 0, &mut epochs);
    let same_epoch = |operand: usize, user: usize| match (epochs[operand], epochs[user]) {
        (None, _) => true,
        (Some(a), Some(b)) => a == b,
        (Some(_), None) => false,
    };

    let mut deferred = vec![false; count];
    let exprs: Vec<&Expression> = function.expressions.iter().map(|(_, e)| e).collect();
    for index in (0..count).rev() {
        if users[index].is_empty() || used_by_statements[index] {
            continue;
        }
        deferred[index] = users[index].iter().all(|&user| {
            if !same_epoch(index, user) {
                return false;
            }
            let rhs_only = matches!(
                *exprs[user],
                Expression::Binary { op, left, right }
                    if op.is_short_circuit()
                        && right.index() == index
                        && left.index() != index
            );
            rhs_only || (user > index && deferred[user])
        });
    }
    deferred
}

pub(crate) struct Builder<'a> {
    ir: &'a kiln_ir::Module,
    options: &'a Options,
    module: Module,
    cache: TypeConstantCache,
    types: HashMap<Handle<Type>, Id>,
    globals: Vec<GlobalInfo>,
    global_values: Vec<Option<Id>>,
    /// Spec constant of each override.
    overrides: Vec<Id>,
    function_ids: Vec<Id>,
    errors: Vec<FunctionError>,
}

impl<'a> Builder<'a> {
    fn new(ir: &'a kiln_ir::Module, options: &'a Options) -> Self {
        Self {
            ir,
            options,
            module: Module::new(),
            cache: TypeConstantCache::new(options.debug_names),
            types: HashMap::new(),
            globals: Vec::new(),
            global_values: vec![None; ir.global_expressions.len()],
            overrides: Vec::with_capacity(ir.overrides.len()),
            function_ids: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn lower(&mut self) -> Result<(), Error> {
        let ir = self.ir;
        self.module.add_capability(spirv::Capability::Shader);
        self.module.push(
            Section::MemoryModel,
            Instruction::new(Op::MemoryModel)
                .lit(spirv::AddressingModel::Logical as u32)
                .lit(spirv::MemoryModel::GLSL450 as u32),
        );

        self.lower_overrides()?;
        self.lower_global_variables()?;

        self.function_ids = ir
            .functions
            .iter()
            .map(|_| self.module.next_id())
            .collect();

        for (handle, function) in ir.functions.iter() {
            let name = function
                .name
                .clone()
                .unwrap_or_else(|| format!("function{}", handle.index()));
            if let Err(error) = self.lower_helper(handle, function, &name) {
                self.fail(name, error);
            }
        }
        for entry in &ir.entry_points {
            let result = entry
                .validate()
                .map_err(Error::from)
                .and_then(|()| self.lower_entry_point(entry));
            if let Err(error) = result {
                self.fail(entry.name.clone(), error);
            }
        }

        if !self.errors.is_empty() {
            return Err(Error::Aborted(std::mem::take(&mut self.errors)));
        }
        log::debug!(
            "lowered {} function(s) and {} entry point(s), bound {}",
            ir.functions.len(),
            ir.entry_points.len(),
            self.module.bound()
        );
        Ok(())
    }

    fn fail(&mut self, function: String, error: Error) {
        log::debug!("function `{function}` failed to lower: {error}");
        self.module.abandon_function();
        self.errors.push(FunctionError { function, error });
    }

    fn name(&mut self, target: Id, name: Option<&str>) {
        if let (true, Some(name)) = (self.options.debug_names, name) {
            self.module.push(Section::Debug, Instruction::name(target, name));
        }
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    fn storage_class(&self, space: AddressSpace) -> StorageClass {
        match space {
            AddressSpace::Function => StorageClass::Function,
            AddressSpace::Private => StorageClass::Private,
            AddressSpace::Workgroup => StorageClass::Workgroup,
            AddressSpace::Uniform => StorageClass::Uniform,
            AddressSpace::Storage { .. } if self.options.version >= (1, 3) => {
                StorageClass::StorageBuffer
            }
            AddressSpace::Storage { .. } => StorageClass::Uniform,
        }
    }

    /// `BufferBlock` is the pre-1.3 spelling of a storage buffer.
    fn block_decoration(&self, space: AddressSpace) -> Decoration {
        match space {
            AddressSpace::Storage { .. } if self.options.version < (1, 3) => {
                Decoration::BufferBlock
            }
            _ => Decoration::Block,
        }
    }

    fn ir_type(&self, ty: Handle<Type>) -> Result<&'a Type, Error> {
        let ir = self.ir;
        ir.types.try_get(ty).ok_or_else(|| {
            Error::from(kiln_ir::IrError::BadHandle {
                index: ty.index(),
                size: ir.types.len(),
            })
        })
    }

    fn type_id(&mut self, ty: Handle<Type>) -> Result<Id, Error> {
        if let Some(&id) = self.types.get(&ty) {
            return Ok(id);
        }
        let ir_type = self.ir_type(ty)?;
        let key = match ir_type.inner {
            TypeInner::Scalar(scalar) | TypeInner::Atomic(scalar) => TypeKey::Scalar(scalar),
            TypeInner::Vector { size, scalar } => TypeKey::Vector {
                scalar,
                size: size as u32,
            },
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => TypeKey::Matrix {
                columns: columns as u32,
                rows: rows as u32,
                scalar,
            },
            TypeInner::Pointer { base, space } => TypeKey::Pointer {
                class: self.storage_class(space),
                pointee: self.type_id(base)?,
            },
            TypeInner::Array { base, size, stride } => {
                let element = self.type_id(base)?;
                match size {
                    ArraySize::Constant(length) => TypeKey::Array {
                        element,
                        length,
                        stride,
                    },
                    ArraySize::Dynamic => TypeKey::RuntimeArray { element, stride },
                }
            }
            TypeInner::Struct { ref members, .. } => {
                let mut layout = Vec::with_capacity(members.len());
                for member in members {
                    layout.push(MemberLayout {
                        ty: self.type_id(member.ty)?,
                        name: member.name.clone(),
                        offset: member.offset,
                        matrix_stride: self.matrix_stride(member.ty)?,
                    });
                }
                TypeKey::Struct(StructLayout {
                    name: ir_type.name.clone(),
                    members: layout,
                    block: None,
                })
            }
        };
        let id = self.cache.get_or_create_type(&mut self.module, key);
        self.types.insert(ty, id);
        Ok(id)
    }

    /// Column stride of a matrix, looking through arrays.
    fn matrix_stride(&self, ty: Handle<Type>) -> Result<Option<u32>, Error> {
        match self.ir_type(ty)?.inner {
            TypeInner::Matrix { rows, scalar, .. } => {
                let width = u32::from(scalar.width);
                let rows = match rows {
                    kiln_ir::VectorSize::Bi => 2,
                    _ => 4,
                };
                Ok(Some(rows * width))
            }
            TypeInner::Array { base, .. } => self.matrix_stride(base),
            _ => Ok(None),
        }
    }

    fn void_type(&mut self) -> Id {
        self.cache.void_type(&mut self.module)
    }

    // ---------------------------------------------------------------------
    // Constants
    // ---------------------------------------------------------------------

    /// Lowers a module-scope constant expression.
    fn global_constant(&mut self, handle: Handle<Expression>) -> Result<Id, Error> {
        if let Some(id) = self.global_values.get(handle.index()).copied().flatten() {
            return Ok(id);
        }
        let ir = self.ir;
        let expr = ir
            .global_expressions
            .try_get(handle)
            .ok_or(kiln_ir::IrError::BadHandle {
                index: handle.index(),
                size: ir.global_expressions.len(),
            })?;
        let id = match *expr {
            Expression::Literal(literal) => self.cache.literal(&mut self.module, literal),
            Expression::Constant(inner) => self.global_constant(inner)?,
            Expression::Override(o) => self.override_value(o)?,
            Expression::ZeroValue(ty) => {
                let ty = self.type_id(ty)?;
                self.cache.null_constant(&mut self.module, ty)
            }
            Expression::Compose { ty, ref components } => {
                let ty = self.type_id(ty)?;
                let parts = components
                    .iter()
                    .map(|&c| self.global_constant(c))
                    .collect::<Result<Vec<_>, _>>()?;
                if parts.iter().any(|&part| self.cache.is_spec_constant(part)) {
                    return Err(Error::unsupported("module-scope composite of overrides"));
                }
                self.cache
                    .get_or_create_constant(&mut self.module, ty, ConstantValue::Composite(parts))
            }
            Expression::Splat { size, value } => {
                let ty = self.type_id(ir.global_expression_type(handle)?)?;
                let part = self.global_constant(value)?;
                self.cache.get_or_create_constant(
                    &mut self.module,
                    ty,
                    ConstantValue::Composite(vec![part; size as usize]),
                )
            }
            ref other => {
                return Err(Error::unsupported(format!(
                    "non-constant module-scope expression {other:?}"
                )));
            }
        };
        self.global_values[handle.index()] = Some(id);
        Ok(id)
    }

    /// `1` of a numeric scalar type.
    fn scalar_one(&mut self, scalar: kiln_ir::Scalar) -> Result<Id, Error> {
        let value = match (scalar.kind, scalar.width) {
            (ScalarKind::Float, 2) => ConstantValue::Bits32(0x3c00),
            (ScalarKind::Float, 4) => ConstantValue::Bits32(1.0f32.to_bits()),
            (ScalarKind::Float, 8) => ConstantValue::Bits64(1.0f64.to_bits()),
            (ScalarKind::Sint | ScalarKind::Uint, 8) => ConstantValue::Bits64(1),
            (ScalarKind::Sint | ScalarKind::Uint, _) => ConstantValue::Bits32(1),
            _ => return Err(Error::unsupported(format!("constant one of type {scalar}"))),
        };
        let ty = self.cache.scalar_type(&mut self.module, scalar);
        Ok(self.cache.get_or_create_constant(&mut self.module, ty, value))
    }

    /// `1` of a numeric scalar or vector type.
    fn one_constant(&mut self, inner: &TypeInner, ty: Id) -> Result<Id, Error> {
        match *inner {
            TypeInner::Scalar(scalar) => self.scalar_one(scalar),
            TypeInner::Vector { size, scalar } => {
                let one = self.scalar_one(scalar)?;
                Ok(self.cache.get_or_create_constant(
                    &mut self.module,
                    ty,
                    ConstantValue::Composite(vec![one; size as usize]),
                ))
            }
            _ => Err(Error::unsupported("constant one of a non-numeric type")),
        }
    }

    // ---------------------------------------------------------------------
    // Overrides
    // ---------------------------------------------------------------------

    /// One `OpSpecConstant*` per override, decorated with its `SpecId`.
    /// Overrides without `@id` take the lowest ids no `@id` claims, in
    /// declaration order.
    fn lower_overrides(&mut self) -> Result<(), Error> {
        let ir = self.ir;
        let claimed: HashSet<u32> = ir
            .overrides
            .iter()
            .filter_map(|(_, o)| o.id.map(u32::from))
            .collect();
        let mut unclaimed = (0u32..).filter(|id| !claimed.contains(id));

        for (handle, o) in ir.overrides.iter() {
            let name = o
                .name
                .clone()
                .unwrap_or_else(|| format!("override{}", handle.index()));
            let TypeInner::Scalar(scalar) = self.ir_type(o.ty)?.inner else {
                return Err(Error::unsupported(format!(
                    "override `{name}` of non-scalar type"
                )));
            };
            let default = match o.init {
                Some(init) => self.override_default(init)?,
                None => zero_literal(scalar)
                    .ok_or_else(|| Error::unsupported(format!("override `{name}` of type {scalar}")))?,
            };
            if default.scalar() != scalar {
                return Err(Error::internal(format!(
                    "override `{name}` is {scalar} but defaults to {default:?}"
                )));
            }
            let spec_id = match o.id {
                Some(id) => u32::from(id),
                None => unclaimed
                    .next()
                    .ok_or_else(|| Error::internal("no specialization ids left"))?,
            };

            let id = self.cache.spec_constant(&mut self.module, default);
            self.module.push(
                Section::Annotations,
                Instruction::decorate(id, Decoration::SpecId, &[spec_id]),
            );
            self.name(id, Some(&name));
            self.overrides.push(id);
        }
        Ok(())
    }

    /// The literal an override's initializer folds to.
    fn override_default(&self, handle: Handle<Expression>) -> Result<Literal, Error> {
        let ir = self.ir;
        match ir.global_expressions.try_get(handle) {
            Some(&Expression::Literal(literal)) => Ok(literal),
            Some(&Expression::Constant(inner)) => self.override_default(inner),
            Some(&Expression::ZeroValue(ty)) => match self.ir_type(ty)?.inner {
                TypeInner::Scalar(scalar) => zero_literal(scalar)
                    .ok_or_else(|| Error::unsupported(format!("override of type {scalar}"))),
                _ => Err(Error::unsupported("override of non-scalar type")),
            },
            Some(other) => Err(Error::unsupported(format!(
                "override initializer {other:?}"
            ))),
            None => Err(kiln_ir::IrError::BadHandle {
                index: handle.index(),
                size: ir.global_expressions.len(),
            }
            .into()),
        }
    }

    fn override_value(&self, handle: Handle<kiln_ir::Override>) -> Result<Id, Error> {
        self.overrides
            .get(handle.index())
            .copied()
            .ok_or_else(|| Error::internal(format!("override {handle:?} was not declared")))
    }

    // ---------------------------------------------------------------------
    // Global variables
    // ---------------------------------------------------------------------

    fn lower_global_variables(&mut self) -> Result<(), Error> {
        let ir = self.ir;
        for (_, var) in ir.global_variables.iter() {
            let class = self.storage_class(var.space);
            let inner = self.type_id(var.ty)?;
            let inner_pointer = self.cache.pointer_type(&mut self.module, class, inner);

            let (pointee, wrapped) = if var.space.is_buffer() {
                let decoration = self.block_decoration(var.space);
                match self.ir_type(var.ty)?.inner {
                    TypeInner::Struct { .. } => {
                        self.cache.decorate_block(&mut self.module, inner, decoration);
                        (inner, false)
                    }
                    _ => {
                        let wrapper = TypeKey::Struct(StructLayout {
                            name: None,
                            members: vec![MemberLayout {
                                ty: inner,
                                name: None,
                                offset: 0,
                                matrix_stride: self.matrix_stride(var.ty)?,
                            }],
                            block: Some(decoration),
                        });
                        (self.cache.get_or_create_type(&mut self.module, wrapper), true)
                    }
                }
            } else {
                (inner, false)
            };
            let pointer = self.cache.pointer_type(&mut self.module, class, pointee);

            let init = match var.space {
                AddressSpace::Private => Some(match var.init {
                    Some(init) => self.global_constant(init)?,
                    None => self.cache.null_constant(&mut self.module, pointee),
                }),
                _ => None,
            };

            let id = self.module.next_id();
            self.module
                .push(Section::Globals, Instruction::variable(pointer, id, class, init));

            if let Some(binding) = var.binding {
                self.module.push(
                    Section::Annotations,
                    Instruction::decorate(id, Decoration::DescriptorSet, &[binding.group]),
                );
                self.module.push(
                    Section::Annotations,
                    Instruction::decorate(id, Decoration::Binding, &[binding.binding]),
                );
            }
            if let AddressSpace::Storage { access } = var.space {
                if !access.contains(StorageAccess::STORE) {
                    self.module.push(
                        Section::Annotations,
                        Instruction::decorate(id, Decoration::NonWritable, &[]),
                    );
                }
            }
            self.name(id, var.name.as_deref());

            self.globals.push(GlobalInfo {
                var: id,
                wrapped,
                inner_pointer,
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Functions
    // ---------------------------------------------------------------------

    fn lower_helper(
        &mut self,
        handle: Handle<kiln_ir::Function>,
        function: &'a kiln_ir::Function,
        name: &str,
    ) -> Result<(), Error> {
        log::debug!("lowering function `{name}`");
        let id = self.function_ids[handle.index()];
        let (return_type, returns_void) = match function.result {
            Some(ref result) => (self.type_id(result.ty)?, false),
            None => (self.void_type(), true),
        };
        let params = function
            .arguments
            .iter()
            .map(|arg| self.type_id(arg.ty))
            .collect::<Result<Vec<_>, _>>()?;
        let type_id = self.cache.get_or_create_type(
            &mut self.module,
            TypeKey::Function {
                ret: return_type,
                params: params.clone(),
            },
        );

        let mut spv = Function::new(id, type_id, return_type);
        let mut state = FunctionState::new(function, name.to_owned(), return_type, returns_void);
        for (arg, ty) in function.arguments.iter().zip(params) {
            let param = self.module.next_id();
            spv.add_parameter(ty, param);
            self.name(param, arg.name.as_deref());
            state.arguments.push(param);
        }
        self.name(id, Some(name));
        self.module.open_function(spv)?;

        self.begin_body(&mut state)?;
        self.finish_body(&mut state)
    }

    fn lower_entry_point(&mut self, entry: &'a kiln_ir::EntryPoint) -> Result<(), Error> {
        log::debug!("lowering {} entry point `{}`", entry.stage, entry.name);
        let function = &entry.function;
        let void = self.void_type();
        let type_id = self.cache.get_or_create_type(
            &mut self.module,
            TypeKey::Function {
                ret: void,
                params: Vec::new(),
            },
        );
        let id = self.module.next_id();
        self.name(id, Some(&entry.name));

        // Interface variables are declared before the body opens.
        let mut interface = Vec::new();
        let mut inputs = Vec::with_capacity(function.arguments.len());
        for arg in &function.arguments {
            let vars = self.interface_variables(
                arg.ty,
                arg.binding,
                arg.name.as_deref(),
                entry.stage,
                StorageClass::Input,
            )?;
            interface.extend(vars.iter().map(|v| v.var));
            inputs.push((arg.ty, vars));
        }
        let mut outputs = Vec::new();
        if let Some(ref result) = function.result {
            outputs = self.interface_variables(
                result.ty,
                result.binding,
                None,
                entry.stage,
                StorageClass::Output,
            )?;
            interface.extend(outputs.iter().map(|v| v.var));
        }
        if self.options.version >= (1, 4) {
            interface.extend(self.globals.iter().map(|g| g.var));
        }

        let mut state = FunctionState::new(function, entry.name.clone(), void, true);
        state.outputs = outputs;
        self.module.open_function(Function::new(id, type_id, void))?;
        self.begin_body(&mut state)?;

        for (ty, vars) in inputs {
            let ty_id = self.type_id(ty)?;
            let value = if let [single @ InterfaceVariable { member: None, .. }] = vars[..] {
                let pointer = self.interface_pointer(single)?;
                let value = self.module.next_id();
                self.module
                    .current_function()?
                    .push(Instruction::load(ty_id, value, pointer))?;
                value
            } else {
                let mut parts = Vec::with_capacity(vars.len());
                for &v in &vars {
                    let (_, member_ty) = v
                        .member
                        .ok_or_else(|| Error::internal("struct input without member index"))?;
                    let pointer = self.interface_pointer(v)?;
                    let part = self.module.next_id();
                    self.module
                        .current_function()?
                        .push(Instruction::load(member_ty, part, pointer))?;
                    parts.push(part);
                }
                let value = self.module.next_id();
                self.module
                    .current_function()?
                    .push(Instruction::composite_construct(ty_id, value, &parts))?;
                value
            };
            state.arguments.push(value);
        }

        self.finish_body(&mut state)?;

        let (model, modes) = match entry.stage {
            ShaderStage::Vertex => (ExecutionModel::Vertex, Vec::new()),
            ShaderStage::Fragment => {
                let mut modes = vec![Instruction::new(Op::ExecutionMode)
                    .id(id)
                    .lit(ExecutionMode::OriginUpperLeft as u32)];
                if writes_frag_depth(self.ir, function) {
                    modes.push(
                        Instruction::new(Op::ExecutionMode)
                            .id(id)
                            .lit(ExecutionMode::DepthReplacing as u32),
                    );
                }
                (ExecutionModel::Fragment, modes)
            }
            ShaderStage::Compute => (
                ExecutionModel::GLCompute,
                vec![Instruction::new(Op::ExecutionMode)
                    .id(id)
                    .lit(ExecutionMode::LocalSize as u32)
                    .lits(entry.workgroup_size)],
            ),
        };
        self.module.push(
            Section::EntryPoints,
            Instruction::new(Op::EntryPoint)
                .lit(model as u32)
                .id(id)
                .string(&entry.name)
                .ids(interface),
        );
        for mode in modes {
            self.module.push(Section::ExecutionModes, mode);
        }
        Ok(())
    }

    /// `Input`/`Output` variables for one entry-point argument or result.
    /// Structs without a binding are split into one variable per member.
    fn interface_variables(
        &mut self,
        ty: Handle<Type>,
        binding: Option<Binding>,
        name: Option<&str>,
        stage: ShaderStage,
        class: StorageClass,
    ) -> Result<Vec<InterfaceVariable>, Error> {
        if let Some(binding) = binding {
            let (var, element) = self.interface_variable(ty, binding, name, stage, class)?;
            return Ok(vec![InterfaceVariable {
                var,
                member: None,
                element,
            }]);
        }
        let TypeInner::Struct { ref members, .. } = self.ir_type(ty)?.inner else {
            return Err(Error::unsupported(format!(
                "entry point {} without a binding",
                if class == StorageClass::Input { "argument" } else { "result" }
            )));
        };
        let mut vars = Vec::with_capacity(members.len());
        for (index, member) in (0u32..).zip(members) {
            let binding = member.binding.ok_or_else(|| {
                Error::unsupported("entry point struct member without a binding")
            })?;
            let (var, element) =
                self.interface_variable(member.ty, binding, member.name.as_deref(), stage, class)?;
            let member_ty = self.type_id(member.ty)?;
            vars.push(InterfaceVariable {
                var,
                member: Some((index, member_ty)),
                element,
            });
        }
        Ok(vars)
    }

    /// Declares one interface variable; also returns the element pointer
    /// type when the value sits in a one-element array.
    fn interface_variable(
        &mut self,
        ty: Handle<Type>,
        binding: Binding,
        name: Option<&str>,
        stage: ShaderStage,
        class: StorageClass,
    ) -> Result<(Id, Option<Id>), Error> {
        let ty_id = self.type_id(ty)?;
        let (declared, element) = if binding == Binding::BuiltIn(BuiltIn::SampleMask) {
            let array = self.cache.get_or_create_type(
                &mut self.module,
                TypeKey::Array {
                    element: ty_id,
                    length: 1,
                    stride: 0,
                },
            );
            let element = self.cache.pointer_type(&mut self.module, class, ty_id);
            (array, Some(element))
        } else {
            (ty_id, None)
        };
        let pointer = self.cache.pointer_type(&mut self.module, class, declared);
        let id = self.module.next_id();
        self.module
            .push(Section::Globals, Instruction::variable(pointer, id, class, None));

        let input = class == StorageClass::Input;
        match binding {
            Binding::BuiltIn(builtin) => {
                if builtin == BuiltIn::SampleIndex {
                    self.module
                        .add_capability(spirv::Capability::SampleRateShading);
                }
                let word = spirv_builtin(builtin, stage, input) as u32;
                self.module.push(
                    Section::Annotations,
                    Instruction::decorate(id, Decoration::BuiltIn, &[word]),
                );
                if let (BuiltIn::Position { invariant: true }, false) = (builtin, input) {
                    self.module.push(
                        Section::Annotations,
                        Instruction::decorate(id, Decoration::Invariant, &[]),
                    );
                }
            }
            Binding::Location {
                location,
                interpolation,
            } => {
                self.module.push(
                    Section::Annotations,
                    Instruction::decorate(id, Decoration::Location, &[location]),
                );
                let varying = match stage {
                    ShaderStage::Vertex => !input,
                    ShaderStage::Fragment => input,
                    ShaderStage::Compute => false,
                };
                let integer = self
                    .ir_type(ty)?
                    .inner
                    .scalar()
                    .is_some_and(|s| matches!(s.kind, ScalarKind::Sint | ScalarKind::Uint));
                let decoration = match interpolation {
                    _ if !varying => None,
                    Some(Interpolation::Flat) => Some(Decoration::Flat),
                    _ if integer => Some(Decoration::Flat),
                    Some(Interpolation::Linear) => Some(Decoration::NoPerspective),
                    Some(Interpolation::Perspective) | None => None,
                };
                if let Some(decoration) = decoration {
                    self.module.push(
                        Section::Annotations,
                        Instruction::decorate(id, decoration, &[]),
                    );
                }
            }
        }
        self.name(id, name);
        Ok((id, element))
    }

    /// Pointer to the value behind an interface variable, going through
    /// element 0 for array-declared built-ins.
    fn interface_pointer(&mut self, variable: InterfaceVariable) -> Result<Id, Error> {
        let Some(element) = variable.element else {
            return Ok(variable.var);
        };
        let zero = self.cache.index_constant(&mut self.module, 0);
        let id = self.module.next_id();
        self.module.current_function()?.push(Instruction::access_chain(
            element,
            id,
            variable.var,
            &[zero],
        ))?;
        Ok(id)
    }

    /// Opens the first block: locals, then pointers into wrapped buffers.
    fn begin_body(&mut self, state: &mut FunctionState<'a>) -> Result<(), Error> {
        let function = state.function;
        let entry = self.module.next_id();
        self.module.current_function()?.begin_block(entry)?;

        for (_, local) in function.local_variables.iter() {
            let ty = self.type_id(local.ty)?;
            let pointer = self
                .cache
                .pointer_type(&mut self.module, StorageClass::Function, ty);
            let init = match local.init {
                Some(init) => {
                    let id = self.expression(state, init)?;
                    if !(self.cache.is_constant(id) || self.cache.is_spec_constant(id)) {
                        return Err(Error::unsupported(format!(
                            "non-constant initializer for local `{}`",
                            local.name.as_deref().unwrap_or("_")
                        )));
                    }
                    Some(id)
                }
                None => None,
            };
            let id = self.module.next_id();
            self.module.current_function()?.add_variable(Instruction::variable(
                pointer,
                id,
                StorageClass::Function,
                init,
            ));
            self.name(id, local.name.as_deref());
            state.locals.push(id);
        }

        let mut used = vec![false; self.globals.len()];
        for (_, expr) in function.expressions.iter() {
            if let Expression::GlobalVariable(g) = *expr {
                if let Some(flag) = used.get_mut(g.index()) {
                    *flag = true;
                }
            }
        }
        state.global_pointers = vec![None; self.globals.len()];
        for (index, global) in self.globals.clone().into_iter().enumerate() {
            if !(global.wrapped && used[index]) {
                continue;
            }
            let zero = self.cache.index_constant(&mut self.module, 0);
            let id = self.module.next_id();
            self.module.current_function()?.push(Instruction::access_chain(
                global.inner_pointer,
                id,
                global.var,
                &[zero],
            ))?;
            state.global_pointers[index] = Some(id);
        }
        Ok(())
    }

    /// Lowers the statements and closes the function.
    fn finish_body(&mut self, state: &mut FunctionState<'a>) -> Result<(), Error> {
        let function = state.function;
        self.block(state, &function.body)?;

        let current = self.module.current_function()?;
        if current.has_open_block() {
            let terminator = if state.returns_void {
                Instruction::new(Op::Return)
            } else {
                let null = self.cache.null_constant(&mut self.module, state.return_type);
                Instruction::new(Op::ReturnValue).id(null)
            };
            self.module.current_function()?.terminate(terminator)?;
        }
        if state.flow.depth() != 0 {
            return Err(Error::internal(format!(
                "{} control-flow frame(s) left open in `{}`",
                state.flow.depth(),
                state.name
            )));
        }
        self.module.close_function()
    }
}

fn spirv_builtin(builtin: BuiltIn, stage: ShaderStage, input: bool) -> spirv::BuiltIn {
    match builtin {
        BuiltIn::Position { .. } if stage == ShaderStage::Fragment && input => {
            spirv::BuiltIn::FragCoord
        }
        BuiltIn::Position { .. } => spirv::BuiltIn::Position,
        BuiltIn::VertexIndex => spirv::BuiltIn::VertexIndex,
        BuiltIn::InstanceIndex => spirv::BuiltIn::InstanceIndex,
        BuiltIn::FrontFacing => spirv::BuiltIn::FrontFacing,
        BuiltIn::FragDepth => spirv::BuiltIn::FragDepth,
        BuiltIn::SampleIndex => spirv::BuiltIn::SampleId,
        BuiltIn::SampleMask => spirv::BuiltIn::SampleMask,
        BuiltIn::GlobalInvocationId => spirv::BuiltIn::GlobalInvocationId,
        BuiltIn::LocalInvocationId => spirv::BuiltIn::LocalInvocationId,
        BuiltIn::LocalInvocationIndex => spirv::BuiltIn::LocalInvocationIndex,
        BuiltIn::WorkgroupId => spirv::BuiltIn::WorkgroupId,
        BuiltIn::NumWorkgroups => spirv::BuiltIn::NumWorkgroups,
    }
}

/// Zero of a scalar type, if it has a literal form.
fn zero_literal(scalar: Scalar) -> Option<Literal> {
    Some(match (scalar.kind, scalar.width) {
        (ScalarKind::Bool, _) => Literal::Bool(false),
        (ScalarKind::Sint, 4) => Literal::I32(0),
        (ScalarKind::Uint, 4) => Literal::U32(0),
        (ScalarKind::Float, 4) => Literal::F32(0.0),
        (ScalarKind::Sint, 8) => Literal::I64(0),
        (ScalarKind::Uint, 8) => Literal::U64(0),
        (ScalarKind::Float, 8) => Literal::F64(0.0),
        _ => return None,
    })
}

fn writes_frag_depth(ir: &kiln_ir::Module, function: &kiln_ir::Function) -> bool {
    let Some(ref result) = function.result else {
        return false;
    };
    let depth = Some(Binding::BuiltIn(BuiltIn::FragDepth));
    if result.binding == depth {
        return true;
    }
    match ir.types.try_get(result.ty).map(|t| &t.inner) {
        Some(TypeInner::Struct { members, .. }) => members.iter().any(|m| m.binding == depth),
        _ => false,
    }
}
