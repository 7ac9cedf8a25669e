//! Lowering pass: `naga::Module` + `naga::valid::ModuleInfo` → `kiln_ir::Module`.

use std::collections::HashMap;

use kiln_ir::Handle;
use naga::proc::TypeResolution;

use crate::ParseError;

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Module-level lowering context: handle mappings between naga and kiln IR.
struct LowerCtx<'a> {
    naga: &'a naga::Module,
    info: &'a naga::valid::ModuleInfo,
    module: kiln_ir::Module,
    type_map: HashMap<naga::Handle<naga::Type>, Handle<kiln_ir::Type>>,
    global_var_map: HashMap<naga::Handle<naga::GlobalVariable>, Handle<kiln_ir::GlobalVariable>>,
    override_map: HashMap<naga::Handle<naga::Override>, Handle<kiln_ir::Override>>,
    const_expr_map: HashMap<naga::Handle<naga::Expression>, Handle<kiln_ir::Expression>>,
    func_map: HashMap<naga::Handle<naga::Function>, Handle<kiln_ir::Function>>,
}

/// Per-function lowering context for expressions and locals.
struct FuncCtx {
    function: kiln_ir::Function,
    expr_map: HashMap<naga::Handle<naga::Expression>, Handle<kiln_ir::Expression>>,
    local_var_map: HashMap<naga::Handle<naga::LocalVariable>, Handle<kiln_ir::LocalVariable>>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn lower_module(
    naga: &naga::Module,
    info: &naga::valid::ModuleInfo,
) -> Result<kiln_ir::Module, ParseError> {
    let mut ctx = LowerCtx {
        naga,
        info,
        module: kiln_ir::Module::default(),
        type_map: HashMap::new(),
        global_var_map: HashMap::new(),
        override_map: HashMap::new(),
        const_expr_map: HashMap::new(),
        func_map: HashMap::new(),
    };

    ctx.lower_types()?;
    ctx.declare_overrides()?;
    ctx.lower_global_expressions()?;
    ctx.lower_override_defaults()?;
    ctx.lower_global_variables()?;
    ctx.lower_functions()?;
    ctx.lower_entry_points()?;

    log::debug!(
        "lowered WGSL module: {} types, {} globals, {} functions, {} entry points",
        ctx.module.types.len(),
        ctx.module.global_variables.len(),
        ctx.module.functions.len(),
        ctx.module.entry_points.len()
    );
    Ok(ctx.module)
}

// ---------------------------------------------------------------------------
// Type lowering
// ---------------------------------------------------------------------------

impl LowerCtx<'_> {
    fn lower_types(&mut self) -> Result<(), ParseError> {
        let naga = self.naga;
        for (naga_handle, ty) in naga.types.iter() {
            // Opaque handle types only appear behind `AddressSpace::Handle`
            // globals, which are rejected when a function touches them.
            let inner = match self.lower_type_inner(&ty.inner) {
                Ok(inner) => inner,
                Err(ParseError::Unsupported(what)) => {
                    log::debug!("skipping type {:?}: {what}", ty.name);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let ir_handle = self.module.types.insert(kiln_ir::Type {
                name: ty.name.clone(),
                inner,
            });
            self.type_map.insert(naga_handle, ir_handle);
        }
        Ok(())
    }

    fn lower_type_inner(
        &mut self,
        inner: &naga::TypeInner,
    ) -> Result<kiln_ir::TypeInner, ParseError> {
        match *inner {
            naga::TypeInner::Scalar(s) => Ok(kiln_ir::TypeInner::Scalar(lower_scalar(s))),
            naga::TypeInner::Vector { size, scalar } => Ok(kiln_ir::TypeInner::Vector {
                size: lower_vector_size(size),
                scalar: lower_scalar(scalar),
            }),
            naga::TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => Ok(kiln_ir::TypeInner::Matrix {
                columns: lower_vector_size(columns),
                rows: lower_vector_size(rows),
                scalar: lower_scalar(scalar),
            }),
            naga::TypeInner::Atomic(s) => Ok(kiln_ir::TypeInner::Atomic(lower_scalar(s))),
            naga::TypeInner::Pointer { base, space } => Ok(kiln_ir::TypeInner::Pointer {
                base: self.map_type(base)?,
                space: lower_address_space(space)?,
            }),
            naga::TypeInner::ValuePointer {
                size,
                scalar,
                space,
            } => {
                // A pointer to a vector or scalar that has no naga type
                // handle of its own. Materialize the pointee in our arena.
                let base_inner = match size {
                    Some(sz) => kiln_ir::TypeInner::Vector {
                        size: lower_vector_size(sz),
                        scalar: lower_scalar(scalar),
                    },
                    None => kiln_ir::TypeInner::Scalar(lower_scalar(scalar)),
                };
                let base = self.module.types.insert(kiln_ir::Type {
                    name: None,
                    inner: base_inner,
                });
                Ok(kiln_ir::TypeInner::Pointer {
                    base,
                    space: lower_address_space(space)?,
                })
            }
            naga::TypeInner::Array { base, size, stride } => Ok(kiln_ir::TypeInner::Array {
                base: self.map_type(base)?,
                size: lower_array_size(size)?,
                stride,
            }),
            naga::TypeInner::Struct { ref members, span } => {
                let ir_members = members
                    .iter()
                    .map(|m| {
                        Ok(kiln_ir::StructMember {
                            name: m.name.clone(),
                            ty: self.map_type(m.ty)?,
                            binding: m.binding.as_ref().map(lower_binding).transpose()?,
                            offset: m.offset,
                        })
                    })
                    .collect::<Result<Vec<_>, ParseError>>()?;
                Ok(kiln_ir::TypeInner::Struct {
                    members: ir_members,
                    span,
                })
            }
            naga::TypeInner::Image { .. } => Err(unsupported("Image type")),
            naga::TypeInner::Sampler { .. } => Err(unsupported("Sampler type")),
            naga::TypeInner::AccelerationStructure { .. } => {
                Err(unsupported("AccelerationStructure type"))
            }
            naga::TypeInner::RayQuery { .. } => Err(unsupported("RayQuery type")),
            naga::TypeInner::BindingArray { .. } => Err(unsupported("BindingArray type")),
        }
    }

    fn map_type(&self, h: naga::Handle<naga::Type>) -> Result<Handle<kiln_ir::Type>, ParseError> {
        self.type_map.get(&h).copied().ok_or_else(|| match self.naga.types.get_handle(h) {
            Ok(ty) => unsupported(&format!("type {:?}", ty.name.as_deref().unwrap_or("_"))),
            Err(_) => ParseError::Lowering(format!("unmapped type {h:?}")),
        })
    }

    /// Converts a validator type resolution into an IR type handle.
    fn resolve_type(&mut self, res: &TypeResolution) -> Result<Handle<kiln_ir::Type>, ParseError> {
        match *res {
            TypeResolution::Handle(h) => self.map_type(h),
            TypeResolution::Value(ref inner) => {
                let inner = self.lower_type_inner(inner)?;
                Ok(self.module.types.insert(kiln_ir::Type { name: None, inner }))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

impl LowerCtx<'_> {
    /// Declares every override without its default; global expressions may
    /// refer to them.
    fn declare_overrides(&mut self) -> Result<(), ParseError> {
        for (naga_handle, o) in self.naga.overrides.iter() {
            let ty = self.map_type(o.ty)?;
            let ir_handle = self.module.overrides.append(kiln_ir::Override {
                name: o.name.clone(),
                id: o.id,
                ty,
                init: None,
            });
            self.override_map.insert(naga_handle, ir_handle);
        }
        Ok(())
    }

    fn lower_override_defaults(&mut self) -> Result<(), ParseError> {
        for (naga_handle, o) in self.naga.overrides.iter() {
            let Some(init) = o.init else { continue };
            let init = self.map_const_expr(init)?;
            let ir_handle = self.map_override(naga_handle)?;
            self.module.overrides[ir_handle].init = Some(init);
        }
        Ok(())
    }

    fn map_override(
        &self,
        h: naga::Handle<naga::Override>,
    ) -> Result<Handle<kiln_ir::Override>, ParseError> {
        self.override_map
            .get(&h)
            .copied()
            .ok_or_else(|| ParseError::Lowering(format!("unmapped override {h:?}")))
    }
}

// ---------------------------------------------------------------------------
// Global (constant) expressions
// ---------------------------------------------------------------------------

impl LowerCtx<'_> {
    fn lower_global_expressions(&mut self) -> Result<(), ParseError> {
        let (naga, info) = (self.naga, self.info);
        for (naga_handle, expr) in naga.global_expressions.iter() {
            let ty = self.resolve_type(&info[naga_handle])?;
            let ir_expr = self.lower_const_expr(expr)?;
            let ir_handle = self.module.add_global_expression(ir_expr, ty);
            self.const_expr_map.insert(naga_handle, ir_handle);
        }
        Ok(())
    }

    fn lower_const_expr(&self, expr: &naga::Expression) -> Result<kiln_ir::Expression, ParseError> {
        match *expr {
            naga::Expression::Literal(lit) => Ok(kiln_ir::Expression::Literal(lower_literal(lit)?)),
            naga::Expression::ZeroValue(ty) => Ok(kiln_ir::Expression::ZeroValue(self.map_type(ty)?)),
            naga::Expression::Constant(h) => Ok(kiln_ir::Expression::Constant(
                self.map_const_expr(self.naga.constants[h].init)?,
            )),
            naga::Expression::Compose { ty, ref components } => {
                Ok(kiln_ir::Expression::Compose {
                    ty: self.map_type(ty)?,
                    components: components
                        .iter()
                        .map(|c| self.map_const_expr(*c))
                        .collect::<Result<Vec<_>, _>>()?,
                })
            }
            naga::Expression::Splat { size, value } => Ok(kiln_ir::Expression::Splat {
                size: lower_vector_size(size),
                value: self.map_const_expr(value)?,
            }),
            naga::Expression::Override(h) => Ok(kiln_ir::Expression::Override(self.map_override(h)?)),
            _ => Err(ParseError::Lowering(format!(
                "unsupported global expression: {expr:?}"
            ))),
        }
    }

    fn map_const_expr(
        &self,
        h: naga::Handle<naga::Expression>,
    ) -> Result<Handle<kiln_ir::Expression>, ParseError> {
        self.const_expr_map
            .get(&h)
            .copied()
            .ok_or_else(|| ParseError::Lowering(format!("unmapped const expression {h:?}")))
    }
}

// ---------------------------------------------------------------------------
// Global variables
// ---------------------------------------------------------------------------

impl LowerCtx<'_> {
    fn lower_global_variables(&mut self) -> Result<(), ParseError> {
        for (naga_handle, var) in self.naga.global_variables.iter() {
            // Textures and samplers; any function using them fails later.
            if matches!(var.space, naga::AddressSpace::Handle) {
                log::debug!("skipping handle global {:?}", var.name);
                continue;
            }

            let global = kiln_ir::GlobalVariable {
                name: var.name.clone(),
                space: lower_address_space(var.space)?,
                binding: var.binding.as_ref().map(|b| kiln_ir::ResourceBinding {
                    group: b.group,
                    binding: b.binding,
                }),
                ty: self.map_type(var.ty)?,
                init: var.init.map(|h| self.map_const_expr(h)).transpose()?,
            };
            let ir_handle = self.module.global_variables.append(global);
            self.global_var_map.insert(naga_handle, ir_handle);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

impl LowerCtx<'_> {
    fn lower_functions(&mut self) -> Result<(), ParseError> {
        let (naga, info) = (self.naga, self.info);
        for (naga_handle, naga_func) in naga.functions.iter() {
            let ir_func = self.lower_function(naga_func, &info[naga_handle])?;
            let ir_handle = self.module.functions.append(ir_func);
            self.func_map.insert(naga_handle, ir_handle);
        }
        Ok(())
    }

    fn lower_entry_points(&mut self) -> Result<(), ParseError> {
        let (naga, info) = (self.naga, self.info);
        for (index, ep) in naga.entry_points.iter().enumerate() {
            let stage = lower_shader_stage(ep.stage)?;
            if ep.workgroup_size_overrides.is_some() {
                return Err(unsupported("override-sized workgroup"));
            }
            let function = self.lower_function(&ep.function, info.get_entry_point(index))?;
            self.module.entry_points.push(kiln_ir::EntryPoint {
                name: ep.name.clone(),
                stage,
                workgroup_size: ep.workgroup_size,
                function,
            });
        }
        Ok(())
    }

    fn lower_function(
        &mut self,
        naga_func: &naga::Function,
        fun_info: &naga::valid::FunctionInfo,
    ) -> Result<kiln_ir::Function, ParseError> {
        let mut fctx = FuncCtx {
            function: kiln_ir::Function::new(""),
            expr_map: HashMap::new(),
            local_var_map: HashMap::new(),
        };
        fctx.function.name = naga_func.name.clone();

        for arg in &naga_func.arguments {
            fctx.function.arguments.push(kiln_ir::FunctionArgument {
                name: arg.name.clone(),
                ty: self.map_type(arg.ty)?,
                binding: arg.binding.as_ref().map(lower_binding).transpose()?,
            });
        }

        if let Some(ref res) = naga_func.result {
            fctx.function.result = Some(kiln_ir::FunctionResult {
                ty: self.map_type(res.ty)?,
                binding: res.binding.as_ref().map(lower_binding).transpose()?,
            });
        }

        // Local variables first, with init=None: expressions refer to them.
        let mut local_inits = Vec::new();
        for (naga_handle, var) in naga_func.local_variables.iter() {
            if let Some(init) = var.init {
                local_inits.push((naga_handle, init));
            }
            let ir_handle = fctx
                .function
                .local_variables
                .append(kiln_ir::LocalVariable {
                    name: var.name.clone(),
                    ty: self.map_type(var.ty)?,
                    init: None,
                });
            fctx.local_var_map.insert(naga_handle, ir_handle);
        }

        // Expression types need `&mut self` to materialize anonymous types,
        // so resolve them all before lowering the expressions themselves.
        let types = naga_func
            .expressions
            .iter()
            .map(|(h, _)| self.resolve_type(&fun_info[h].ty))
            .collect::<Result<Vec<_>, _>>()?;

        for ((naga_handle, expr), ty) in naga_func.expressions.iter().zip(types) {
            let ir_expr = self.lower_expression(expr, &fctx)?;
            let ir_handle = fctx.function.add_expression(ir_expr, ty);
            fctx.expr_map.insert(naga_handle, ir_handle);
        }

        for (naga_handle, init) in local_inits {
            let ir_init = self.map_local_init(&mut fctx, init)?;
            let ir_handle = fctx.local_var_map[&naga_handle];
            fctx.function.local_variables[ir_handle].init = Some(ir_init);
        }

        for (naga_handle, name) in &naga_func.named_expressions {
            if let Some(&ir_handle) = fctx.expr_map.get(naga_handle) {
                fctx.function
                    .named_expressions
                    .insert(ir_handle, name.clone());
            }
        }

        fctx.function.body = self.lower_block(&naga_func.body, &fctx)?;

        log::debug!(
            "lowered function {:?}: {} expressions, {} locals",
            fctx.function.name,
            fctx.function.expressions.len(),
            fctx.function.local_variables.len()
        );
        Ok(fctx.function)
    }

    /// Local initializers live in the function arena; older naga modules
    /// point them at global expressions instead, which we wrap.
    fn map_local_init(
        &self,
        fctx: &mut FuncCtx,
        h: naga::Handle<naga::Expression>,
    ) -> Result<Handle<kiln_ir::Expression>, ParseError> {
        if let Some(&ir) = fctx.expr_map.get(&h) {
            return Ok(ir);
        }
        let global = self.map_const_expr(h)?;
        let ty = self
            .module
            .global_expression_type(global)
            .map_err(|e| ParseError::Lowering(e.to_string()))?;
        Ok(fctx
            .function
            .add_expression(kiln_ir::Expression::Constant(global), ty))
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

impl LowerCtx<'_> {
    fn lower_expression(
        &self,
        expr: &naga::Expression,
        fctx: &FuncCtx,
    ) -> Result<kiln_ir::Expression, ParseError> {
        match *expr {
            naga::Expression::Literal(lit) => Ok(kiln_ir::Expression::Literal(lower_literal(lit)?)),
            naga::Expression::Constant(h) => Ok(kiln_ir::Expression::Constant(
                self.map_const_expr(self.naga.constants[h].init)?,
            )),
            naga::Expression::Override(h) => Ok(kiln_ir::Expression::Override(self.map_override(h)?)),
            naga::Expression::ZeroValue(ty) => Ok(kiln_ir::Expression::ZeroValue(self.map_type(ty)?)),
            naga::Expression::Compose { ty, ref components } => Ok(kiln_ir::Expression::Compose {
                ty: self.map_type(ty)?,
                components: components
                    .iter()
                    .map(|c| self.map_func_expr(fctx, *c))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            naga::Expression::Access { base, index } => Ok(kiln_ir::Expression::Access {
                base: self.map_func_expr(fctx, base)?,
                index: self.map_func_expr(fctx, index)?,
            }),
            naga::Expression::AccessIndex { base, index } => Ok(kiln_ir::Expression::AccessIndex {
                base: self.map_func_expr(fctx, base)?,
                index,
            }),
            naga::Expression::Splat { size, value } => Ok(kiln_ir::Expression::Splat {
                size: lower_vector_size(size),
                value: self.map_func_expr(fctx, value)?,
            }),
            naga::Expression::Swizzle {
                size,
                vector,
                pattern,
            } => Ok(kiln_ir::Expression::Swizzle {
                size: lower_vector_size(size),
                vector: self.map_func_expr(fctx, vector)?,
                pattern: lower_swizzle_pattern(pattern),
            }),
            naga::Expression::FunctionArgument(idx) => {
                Ok(kiln_ir::Expression::FunctionArgument(idx))
            }
            naga::Expression::GlobalVariable(h) => {
                let ir_h = self.global_var_map.get(&h).copied().ok_or_else(|| {
                    unsupported("texture or sampler global")
                })?;
                Ok(kiln_ir::Expression::GlobalVariable(ir_h))
            }
            naga::Expression::LocalVariable(h) => {
                let ir_h = fctx
                    .local_var_map
                    .get(&h)
                    .copied()
                    .ok_or_else(|| ParseError::Lowering(format!("unmapped local var {h:?}")))?;
                Ok(kiln_ir::Expression::LocalVariable(ir_h))
            }
            naga::Expression::Load { pointer } => Ok(kiln_ir::Expression::Load {
                pointer: self.map_func_expr(fctx, pointer)?,
            }),
            naga::Expression::Unary { op, expr } => Ok(kiln_ir::Expression::Unary {
                op: lower_unary_op(op),
                expr: self.map_func_expr(fctx, expr)?,
            }),
            naga::Expression::Binary { op, left, right } => Ok(kiln_ir::Expression::Binary {
                op: lower_binary_op(op),
                left: self.map_func_expr(fctx, left)?,
                right: self.map_func_expr(fctx, right)?,
            }),
            naga::Expression::Select {
                condition,
                accept,
                reject,
            } => Ok(kiln_ir::Expression::Select {
                condition: self.map_func_expr(fctx, condition)?,
                accept: self.map_func_expr(fctx, accept)?,
                reject: self.map_func_expr(fctx, reject)?,
            }),
            naga::Expression::Math {
                fun,
                arg,
                arg1,
                arg2,
                arg3,
            } => {
                if arg3.is_some() {
                    return Err(unsupported(&format!("{fun:?} with four arguments")));
                }
                Ok(kiln_ir::Expression::Math {
                    fun: lower_math_function(fun)?,
                    arg: self.map_func_expr(fctx, arg)?,
                    arg1: self.map_func_expr_opt(fctx, arg1)?,
                    arg2: self.map_func_expr_opt(fctx, arg2)?,
                })
            }
            naga::Expression::As {
                expr,
                kind,
                convert,
            } => Ok(kiln_ir::Expression::As {
                expr: self.map_func_expr(fctx, expr)?,
                kind: lower_scalar_kind(kind),
                convert,
            }),
            naga::Expression::CallResult(h) => {
                let ir_h = self
                    .func_map
                    .get(&h)
                    .copied()
                    .ok_or_else(|| ParseError::Lowering(format!("unmapped function {h:?}")))?;
                Ok(kiln_ir::Expression::CallResult(ir_h))
            }
            naga::Expression::AtomicResult { ty, comparison } => {
                Ok(kiln_ir::Expression::AtomicResult {
                    ty: self.map_type(ty)?,
                    comparison,
                })
            }
            naga::Expression::ArrayLength(expr) => Ok(kiln_ir::Expression::ArrayLength(
                self.map_func_expr(fctx, expr)?,
            )),
            naga::Expression::Derivative { .. } => Err(unsupported("Derivative expression")),
            naga::Expression::Relational { .. } => Err(unsupported("Relational expression")),
            naga::Expression::ImageSample { .. } => Err(unsupported("ImageSample expression")),
            naga::Expression::ImageLoad { .. } => Err(unsupported("ImageLoad expression")),
            naga::Expression::ImageQuery { .. } => Err(unsupported("ImageQuery expression")),
            naga::Expression::RayQueryProceedResult => {
                Err(unsupported("RayQueryProceedResult expression"))
            }
            naga::Expression::RayQueryGetIntersection { .. } => {
                Err(unsupported("RayQueryGetIntersection expression"))
            }
            naga::Expression::RayQueryVertexPositions { .. } => {
                Err(unsupported("RayQueryVertexPositions expression"))
            }
            naga::Expression::SubgroupBallotResult => {
                Err(unsupported("SubgroupBallotResult expression"))
            }
            naga::Expression::SubgroupOperationResult { .. } => {
                Err(unsupported("SubgroupOperationResult expression"))
            }
            naga::Expression::WorkGroupUniformLoadResult { .. } => {
                Err(unsupported("WorkGroupUniformLoadResult expression"))
            }
        }
    }

    fn map_func_expr(
        &self,
        fctx: &FuncCtx,
        h: naga::Handle<naga::Expression>,
    ) -> Result<Handle<kiln_ir::Expression>, ParseError> {
        fctx.expr_map
            .get(&h)
            .copied()
            .ok_or_else(|| ParseError::Lowering(format!("unmapped expression {h:?}")))
    }

    fn map_func_expr_opt(
        &self,
        fctx: &FuncCtx,
        h: Option<naga::Handle<naga::Expression>>,
    ) -> Result<Option<Handle<kiln_ir::Expression>>, ParseError> {
        h.map(|h| self.map_func_expr(fctx, h)).transpose()
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

impl LowerCtx<'_> {
    fn lower_block(
        &self,
        block: &naga::Block,
        fctx: &FuncCtx,
    ) -> Result<kiln_ir::Block, ParseError> {
        let mut out = Vec::new();
        for stmt in block.iter() {
            self.lower_statement(stmt, fctx, &mut out)?;
        }
        Ok(out)
    }

    fn lower_statement(
        &self,
        stmt: &naga::Statement,
        fctx: &FuncCtx,
        out: &mut kiln_ir::Block,
    ) -> Result<(), ParseError> {
        match *stmt {
            naga::Statement::Emit(ref range) => {
                if let Some((first, last)) = range.clone().first_and_last() {
                    // naga's `last` is inclusive.
                    out.push(kiln_ir::Statement::Emit(kiln_ir::Range::inclusive(
                        self.map_func_expr(fctx, first)?,
                        self.map_func_expr(fctx, last)?,
                    )));
                }
            }
            naga::Statement::Block(ref block) => {
                out.push(kiln_ir::Statement::Block(self.lower_block(block, fctx)?));
            }
            naga::Statement::Store { pointer, value } => {
                out.push(kiln_ir::Statement::Store {
                    pointer: self.map_func_expr(fctx, pointer)?,
                    value: self.map_func_expr(fctx, value)?,
                });
            }
            naga::Statement::If {
                condition,
                ref accept,
                ref reject,
            } => {
                out.push(kiln_ir::Statement::If {
                    condition: self.map_func_expr(fctx, condition)?,
                    accept: self.lower_block(accept, fctx)?,
                    reject: self.lower_block(reject, fctx)?,
                });
            }
            naga::Statement::Switch {
                selector,
                ref cases,
            } => {
                out.push(kiln_ir::Statement::Switch {
                    selector: self.map_func_expr(fctx, selector)?,
                    cases: self.lower_switch_cases(cases, fctx)?,
                });
            }
            naga::Statement::Loop {
                ref body,
                ref continuing,
                break_if,
            } => {
                out.push(kiln_ir::Statement::Loop {
                    body: self.lower_block(body, fctx)?,
                    continuing: self.lower_block(continuing, fctx)?,
                    break_if: self.map_func_expr_opt(fctx, break_if)?,
                });
            }
            naga::Statement::Break => out.push(kiln_ir::Statement::Break),
            naga::Statement::Continue => out.push(kiln_ir::Statement::Continue),
            naga::Statement::Kill => out.push(kiln_ir::Statement::Kill),
            naga::Statement::Return { value } => {
                out.push(kiln_ir::Statement::Return {
                    value: self.map_func_expr_opt(fctx, value)?,
                });
            }
            naga::Statement::Call {
                function,
                ref arguments,
                result,
            } => {
                let ir_func = self.func_map.get(&function).copied().ok_or_else(|| {
                    ParseError::Lowering(format!("unmapped called function {function:?}"))
                })?;
                out.push(kiln_ir::Statement::Call {
                    function: ir_func,
                    arguments: arguments
                        .iter()
                        .map(|a| self.map_func_expr(fctx, *a))
                        .collect::<Result<Vec<_>, _>>()?,
                    result: self.map_func_expr_opt(fctx, result)?,
                });
            }
            naga::Statement::Atomic {
                pointer,
                ref fun,
                value,
                result,
            } => {
                out.push(kiln_ir::Statement::Atomic {
                    pointer: self.map_func_expr(fctx, pointer)?,
                    fun: self.lower_atomic_function(fun, fctx)?,
                    value: self.map_func_expr(fctx, value)?,
                    result: self.map_func_expr_opt(fctx, result)?,
                });
            }
            naga::Statement::ControlBarrier(barrier) | naga::Statement::MemoryBarrier(barrier) => {
                let ir_barrier = lower_barrier(barrier);
                if !ir_barrier.is_empty() {
                    out.push(kiln_ir::Statement::Barrier(ir_barrier));
                }
            }
            naga::Statement::ImageStore { .. } => return Err(unsupported("ImageStore statement")),
            naga::Statement::ImageAtomic { .. } => {
                return Err(unsupported("ImageAtomic statement"));
            }
            naga::Statement::RayQuery { .. } => return Err(unsupported("RayQuery statement")),
            naga::Statement::SubgroupBallot { .. } => {
                return Err(unsupported("SubgroupBallot statement"));
            }
            naga::Statement::SubgroupGather { .. } => {
                return Err(unsupported("SubgroupGather statement"));
            }
            naga::Statement::SubgroupCollectiveOperation { .. } => {
                return Err(unsupported("SubgroupCollectiveOperation statement"));
            }
            naga::Statement::WorkGroupUniformLoad { .. } => {
                return Err(unsupported("WorkGroupUniformLoad statement"));
            }
        }
        Ok(())
    }

    /// naga spells `case 1, 2: {}` as empty fall-through cases followed by
    /// the case that owns the body; fold those into one selector list.
    fn lower_switch_cases(
        &self,
        cases: &[naga::SwitchCase],
        fctx: &FuncCtx,
    ) -> Result<Vec<kiln_ir::SwitchCase>, ParseError> {
        let mut out = Vec::new();
        let mut pending = Vec::new();
        for case in cases {
            pending.push(lower_switch_value(case.value));
            if case.fall_through {
                if !case.body.is_empty() {
                    return Err(unsupported("switch case falling through after a body"));
                }
                continue;
            }
            out.push(kiln_ir::SwitchCase {
                values: std::mem::take(&mut pending),
                body: self.lower_block(&case.body, fctx)?,
            });
        }
        if !pending.is_empty() {
            out.push(kiln_ir::SwitchCase {
                values: pending,
                body: Vec::new(),
            });
        }
        Ok(out)
    }

    fn lower_atomic_function(
        &self,
        fun: &naga::AtomicFunction,
        fctx: &FuncCtx,
    ) -> Result<kiln_ir::AtomicFunction, ParseError> {
        Ok(match *fun {
            naga::AtomicFunction::Add => kiln_ir::AtomicFunction::Add,
            naga::AtomicFunction::Subtract => kiln_ir::AtomicFunction::Subtract,
            naga::AtomicFunction::And => kiln_ir::AtomicFunction::And,
            naga::AtomicFunction::ExclusiveOr => kiln_ir::AtomicFunction::ExclusiveOr,
            naga::AtomicFunction::InclusiveOr => kiln_ir::AtomicFunction::InclusiveOr,
            naga::AtomicFunction::Min => kiln_ir::AtomicFunction::Min,
            naga::AtomicFunction::Max => kiln_ir::AtomicFunction::Max,
            naga::AtomicFunction::Exchange { compare } => kiln_ir::AtomicFunction::Exchange {
                compare: self.map_func_expr_opt(fctx, compare)?,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Enum mapping helpers
// ---------------------------------------------------------------------------

/// Abstract numeric types are concretized to 32 bits, matching WGSL's
/// default conversion rank.
fn lower_scalar(s: naga::Scalar) -> kiln_ir::Scalar {
    match s.kind {
        naga::ScalarKind::AbstractInt => kiln_ir::Scalar::I32,
        naga::ScalarKind::AbstractFloat => kiln_ir::Scalar::F32,
        kind => kiln_ir::Scalar {
            kind: lower_scalar_kind(kind),
            width: s.width,
        },
    }
}

fn lower_scalar_kind(kind: naga::ScalarKind) -> kiln_ir::ScalarKind {
    match kind {
        naga::ScalarKind::Bool => kiln_ir::ScalarKind::Bool,
        naga::ScalarKind::Sint | naga::ScalarKind::AbstractInt => kiln_ir::ScalarKind::Sint,
        naga::ScalarKind::Uint => kiln_ir::ScalarKind::Uint,
        naga::ScalarKind::Float | naga::ScalarKind::AbstractFloat => kiln_ir::ScalarKind::Float,
    }
}

fn lower_vector_size(size: naga::VectorSize) -> kiln_ir::VectorSize {
    match size {
        naga::VectorSize::Bi => kiln_ir::VectorSize::Bi,
        naga::VectorSize::Tri => kiln_ir::VectorSize::Tri,
        naga::VectorSize::Quad => kiln_ir::VectorSize::Quad,
    }
}

fn lower_array_size(size: naga::ArraySize) -> Result<kiln_ir::ArraySize, ParseError> {
    match size {
        naga::ArraySize::Constant(n) => Ok(kiln_ir::ArraySize::Constant(n.get())),
        naga::ArraySize::Dynamic => Ok(kiln_ir::ArraySize::Dynamic),
        naga::ArraySize::Pending(_) => Err(unsupported("override-sized array")),
    }
}

fn lower_address_space(space: naga::AddressSpace) -> Result<kiln_ir::AddressSpace, ParseError> {
    match space {
        naga::AddressSpace::Function => Ok(kiln_ir::AddressSpace::Function),
        naga::AddressSpace::Private => Ok(kiln_ir::AddressSpace::Private),
        naga::AddressSpace::WorkGroup => Ok(kiln_ir::AddressSpace::Workgroup),
        naga::AddressSpace::Uniform => Ok(kiln_ir::AddressSpace::Uniform),
        naga::AddressSpace::Storage { access } => {
            let mut ir_access = kiln_ir::StorageAccess::EMPTY;
            if access.contains(naga::StorageAccess::LOAD) {
                ir_access |= kiln_ir::StorageAccess::LOAD;
            }
            if access.contains(naga::StorageAccess::STORE) {
                ir_access |= kiln_ir::StorageAccess::STORE;
            }
            Ok(kiln_ir::AddressSpace::Storage { access: ir_access })
        }
        naga::AddressSpace::Handle => Err(unsupported("Handle address space")),
        _ => Err(unsupported(&format!("{space:?} address space"))),
    }
}

#[allow(unreachable_patterns)]
fn lower_shader_stage(stage: naga::ShaderStage) -> Result<kiln_ir::ShaderStage, ParseError> {
    match stage {
        naga::ShaderStage::Vertex => Ok(kiln_ir::ShaderStage::Vertex),
        naga::ShaderStage::Fragment => Ok(kiln_ir::ShaderStage::Fragment),
        naga::ShaderStage::Compute => Ok(kiln_ir::ShaderStage::Compute),
        other => Err(unsupported(&format!("{other:?} shader stage"))),
    }
}

fn lower_builtin(builtin: naga::BuiltIn) -> Result<kiln_ir::BuiltIn, ParseError> {
    match builtin {
        naga::BuiltIn::Position { invariant } => Ok(kiln_ir::BuiltIn::Position { invariant }),
        naga::BuiltIn::VertexIndex => Ok(kiln_ir::BuiltIn::VertexIndex),
        naga::BuiltIn::InstanceIndex => Ok(kiln_ir::BuiltIn::InstanceIndex),
        naga::BuiltIn::FrontFacing => Ok(kiln_ir::BuiltIn::FrontFacing),
        naga::BuiltIn::FragDepth => Ok(kiln_ir::BuiltIn::FragDepth),
        naga::BuiltIn::SampleIndex => Ok(kiln_ir::BuiltIn::SampleIndex),
        naga::BuiltIn::SampleMask => Ok(kiln_ir::BuiltIn::SampleMask),
        naga::BuiltIn::GlobalInvocationId => Ok(kiln_ir::BuiltIn::GlobalInvocationId),
        naga::BuiltIn::LocalInvocationId => Ok(kiln_ir::BuiltIn::LocalInvocationId),
        naga::BuiltIn::LocalInvocationIndex => Ok(kiln_ir::BuiltIn::LocalInvocationIndex),
        naga::BuiltIn::WorkGroupId => Ok(kiln_ir::BuiltIn::WorkgroupId),
        naga::BuiltIn::NumWorkGroups => Ok(kiln_ir::BuiltIn::NumWorkgroups),
        other => Err(unsupported(&format!("{other:?} builtin"))),
    }
}

#[allow(unreachable_patterns)]
fn lower_interpolation(interp: naga::Interpolation) -> Result<kiln_ir::Interpolation, ParseError> {
    match interp {
        naga::Interpolation::Perspective => Ok(kiln_ir::Interpolation::Perspective),
        naga::Interpolation::Linear => Ok(kiln_ir::Interpolation::Linear),
        naga::Interpolation::Flat => Ok(kiln_ir::Interpolation::Flat),
        other => Err(unsupported(&format!("{other:?} interpolation"))),
    }
}

fn lower_binding(binding: &naga::Binding) -> Result<kiln_ir::Binding, ParseError> {
    match *binding {
        naga::Binding::BuiltIn(b) => Ok(kiln_ir::Binding::BuiltIn(lower_builtin(b)?)),
        naga::Binding::Location {
            location,
            interpolation,
            ..
        } => Ok(kiln_ir::Binding::Location {
            location,
            interpolation: interpolation.map(lower_interpolation).transpose()?,
        }),
    }
}

fn lower_switch_value(value: naga::SwitchValue) -> kiln_ir::SwitchValue {
    match value {
        naga::SwitchValue::I32(v) => kiln_ir::SwitchValue::I32(v),
        naga::SwitchValue::U32(v) => kiln_ir::SwitchValue::U32(v),
        naga::SwitchValue::Default => kiln_ir::SwitchValue::Default,
    }
}

fn lower_unary_op(op: naga::UnaryOperator) -> kiln_ir::UnaryOp {
    match op {
        naga::UnaryOperator::Negate => kiln_ir::UnaryOp::Negate,
        naga::UnaryOperator::LogicalNot => kiln_ir::UnaryOp::LogicalNot,
        naga::UnaryOperator::BitwiseNot => kiln_ir::UnaryOp::BitwiseNot,
    }
}

fn lower_binary_op(op: naga::BinaryOperator) -> kiln_ir::BinaryOp {
    match op {
        naga::BinaryOperator::Add => kiln_ir::BinaryOp::Add,
        naga::BinaryOperator::Subtract => kiln_ir::BinaryOp::Subtract,
        naga::BinaryOperator::Multiply => kiln_ir::BinaryOp::Multiply,
        naga::BinaryOperator::Divide => kiln_ir::BinaryOp::Divide,
        naga::BinaryOperator::Modulo => kiln_ir::BinaryOp::Modulo,
        naga::BinaryOperator::Equal => kiln_ir::BinaryOp::Equal,
        naga::BinaryOperator::NotEqual => kiln_ir::BinaryOp::NotEqual,
        naga::BinaryOperator::Less => kiln_ir::BinaryOp::Less,
        naga::BinaryOperator::LessEqual => kiln_ir::BinaryOp::LessEqual,
        naga::BinaryOperator::Greater => kiln_ir::BinaryOp::Greater,
        naga::BinaryOperator::GreaterEqual => kiln_ir::BinaryOp::GreaterEqual,
        naga::BinaryOperator::And => kiln_ir::BinaryOp::BitwiseAnd,
        naga::BinaryOperator::ExclusiveOr => kiln_ir::BinaryOp::BitwiseXor,
        naga::BinaryOperator::InclusiveOr => kiln_ir::BinaryOp::BitwiseOr,
        naga::BinaryOperator::LogicalAnd => kiln_ir::BinaryOp::LogicalAnd,
        naga::BinaryOperator::LogicalOr => kiln_ir::BinaryOp::LogicalOr,
        naga::BinaryOperator::ShiftLeft => kiln_ir::BinaryOp::ShiftLeft,
        naga::BinaryOperator::ShiftRight => kiln_ir::BinaryOp::ShiftRight,
    }
}

fn lower_math_function(fun: naga::MathFunction) -> Result<kiln_ir::MathFunction, ParseError> {
    use kiln_ir::MathFunction as Mf;
    Ok(match fun {
        naga::MathFunction::Abs => Mf::Abs,
        naga::MathFunction::Min => Mf::Min,
        naga::MathFunction::Max => Mf::Max,
        naga::MathFunction::Clamp => Mf::Clamp,
        naga::MathFunction::Saturate => Mf::Saturate,
        naga::MathFunction::Sign => Mf::Sign,
        naga::MathFunction::Floor => Mf::Floor,
        naga::MathFunction::Ceil => Mf::Ceil,
        naga::MathFunction::Round => Mf::Round,
        naga::MathFunction::Fract => Mf::Fract,
        naga::MathFunction::Trunc => Mf::Trunc,
        naga::MathFunction::Sin => Mf::Sin,
        naga::MathFunction::Cos => Mf::Cos,
        naga::MathFunction::Tan => Mf::Tan,
        naga::MathFunction::Asin => Mf::Asin,
        naga::MathFunction::Acos => Mf::Acos,
        naga::MathFunction::Atan => Mf::Atan,
        naga::MathFunction::Atan2 => Mf::Atan2,
        naga::MathFunction::Sinh => Mf::Sinh,
        naga::MathFunction::Cosh => Mf::Cosh,
        naga::MathFunction::Tanh => Mf::Tanh,
        naga::MathFunction::Radians => Mf::Radians,
        naga::MathFunction::Degrees => Mf::Degrees,
        naga::MathFunction::Sqrt => Mf::Sqrt,
        naga::MathFunction::InverseSqrt => Mf::InverseSqrt,
        naga::MathFunction::Log => Mf::Log,
        naga::MathFunction::Log2 => Mf::Log2,
        naga::MathFunction::Exp => Mf::Exp,
        naga::MathFunction::Exp2 => Mf::Exp2,
        naga::MathFunction::Pow => Mf::Pow,
        naga::MathFunction::Dot => Mf::Dot,
        naga::MathFunction::Cross => Mf::Cross,
        naga::MathFunction::Normalize => Mf::Normalize,
        naga::MathFunction::Length => Mf::Length,
        naga::MathFunction::Distance => Mf::Distance,
        naga::MathFunction::Transpose => Mf::Transpose,
        naga::MathFunction::Determinant => Mf::Determinant,
        naga::MathFunction::Reflect => Mf::Reflect,
        naga::MathFunction::Mix => Mf::Mix,
        naga::MathFunction::Step => Mf::Step,
        naga::MathFunction::SmoothStep => Mf::SmoothStep,
        naga::MathFunction::Fma => Mf::Fma,
        other => return Err(unsupported(&format!("{other:?} math function"))),
    })
}

fn lower_literal(lit: naga::Literal) -> Result<kiln_ir::Literal, ParseError> {
    match lit {
        naga::Literal::Bool(v) => Ok(kiln_ir::Literal::Bool(v)),
        naga::Literal::I32(v) => Ok(kiln_ir::Literal::I32(v)),
        naga::Literal::U32(v) => Ok(kiln_ir::Literal::U32(v)),
        naga::Literal::I64(v) => Ok(kiln_ir::Literal::I64(v)),
        naga::Literal::U64(v) => Ok(kiln_ir::Literal::U64(v)),
        naga::Literal::F32(v) => Ok(kiln_ir::Literal::F32(v)),
        naga::Literal::F64(v) => Ok(kiln_ir::Literal::F64(v)),
        naga::Literal::AbstractInt(v) => i32::try_from(v)
            .map(kiln_ir::Literal::I32)
            .map_err(|_| unsupported(&format!("abstract integer {v} outside i32 range"))),
        naga::Literal::AbstractFloat(v) => Ok(kiln_ir::Literal::F32(v as f32)),
        _ => Err(unsupported(&format!("{lit:?} literal"))),
    }
}

fn lower_swizzle_pattern(pattern: [naga::SwizzleComponent; 4]) -> [kiln_ir::SwizzleComponent; 4] {
    pattern.map(|c| match c {
        naga::SwizzleComponent::X => kiln_ir::SwizzleComponent::X,
        naga::SwizzleComponent::Y => kiln_ir::SwizzleComponent::Y,
        naga::SwizzleComponent::Z => kiln_ir::SwizzleComponent::Z,
        naga::SwizzleComponent::W => kiln_ir::SwizzleComponent::W,
    })
}

fn lower_barrier(barrier: naga::Barrier) -> kiln_ir::Barrier {
    let mut ir = kiln_ir::Barrier::EMPTY;
    if barrier.contains(naga::Barrier::STORAGE) {
        ir = ir | kiln_ir::Barrier::STORAGE;
    }
    if barrier.contains(naga::Barrier::WORK_GROUP) {
        ir = ir | kiln_ir::Barrier::WORKGROUP;
    }
    ir
}

fn unsupported(what: &str) -> ParseError {
    ParseError::Unsupported(what.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
