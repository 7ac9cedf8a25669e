//! Expression lowering.

use kiln_ir::{
    BinaryOp, Bytes, Expression, Handle, IrError, MathFunction, Scalar, ScalarKind, TypeInner,
    UnaryOp, VectorSize,
};
use spirv::{GLOp, Op};

use super::{Builder, FunctionState};
use crate::cache::ConstantValue;
use crate::error::Error;
use crate::id::Id;
use crate::instruction::Instruction;
use crate::ops::{self, Arrangement, Conversion, MathLowering};

impl<'a> Builder<'a> {
    pub(super) fn expression_inner(
        &self,
        state: &FunctionState<'a>,
        handle: Handle<Expression>,
    ) -> Result<&'a TypeInner, Error> {
        let ty = state.function.expression_type(handle)?;
        Ok(&self.ir_type(ty)?.inner)
    }

    pub(super) fn expression_type_id(
        &mut self,
        state: &FunctionState<'a>,
        handle: Handle<Expression>,
    ) -> Result<Id, Error> {
        let ty = state.function.expression_type(handle)?;
        self.type_id(ty)
    }

    /// Appends to the current block.
    pub(super) fn emit(&mut self, instruction: Instruction) -> Result<(), Error> {
        self.module.current_function()?.push(instruction)
    }

    /// Scope and semantics operands shared by every atomic instruction.
    pub(super) fn atomic_operands(&mut self) -> (Id, Id) {
        let scope = self
            .cache
            .index_constant(&mut self.module, spirv::Scope::Device as u32);
        let semantics = self.cache.index_constant(&mut self.module, 0);
        (scope, semantics)
    }

    pub(super) fn points_to_atomic(
        &self,
        state: &FunctionState<'a>,
        pointer: Handle<Expression>,
    ) -> Result<bool, Error> {
        match *self.expression_inner(state, pointer)? {
            TypeInner::Pointer { base, .. } => {
                Ok(matches!(self.ir_type(base)?.inner, TypeInner::Atomic(_)))
            }
            _ => Ok(false),
        }
    }

    /// Returns the id of an expression, lowering it on first use.
    pub(super) fn expression(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
    ) -> Result<Id, Error> {
        if let Some(id) = state.cached(handle) {
            return Ok(id);
        }
        let function = state.function;
        let expr = function
            .expressions
            .try_get(handle)
            .ok_or(IrError::BadHandle {
                index: handle.index(),
                size: function.expressions.len(),
            })?;
        let id = self.lower_expression(state, handle, expr)?;
        state.cache(handle, id);

        if let Some(name) = function.named_expressions.get(&handle) {
            let computed = !matches!(
                *expr,
                Expression::Literal(_)
                    | Expression::Constant(_)
                    | Expression::ZeroValue(_)
                    | Expression::Override(_)
                    | Expression::FunctionArgument(_)
                    | Expression::GlobalVariable(_)
                    | Expression::LocalVariable(_)
                    | Expression::CallResult(_)
                    | Expression::AtomicResult { .. }
            );
            if computed && !self.cache.is_constant(id) {
                self.name(id, Some(name));
            }
        }
        Ok(id)
    }

    fn lower_expression(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        expr: &'a Expression,
    ) -> Result<Id, Error> {
        let id = match *expr {
            Expression::Literal(literal) => self.cache.literal(&mut self.module, literal),
            Expression::Constant(global) => self.global_constant(global)?,
            Expression::Override(o) => self.override_value(o)?,
            Expression::ZeroValue(ty) => {
                let ty = self.type_id(ty)?;
                self.cache.null_constant(&mut self.module, ty)
            }
            Expression::Compose { ty, ref components } => {
                let ty = self.type_id(ty)?;
                let mut parts = Vec::with_capacity(components.len());
                for &component in components {
                    parts.push(self.expression(state, component)?);
                }
                self.composite(ty, parts)?
            }
            Expression::FunctionArgument(index) => state
                .arguments
                .get(index as usize)
                .copied()
                .ok_or_else(|| Error::internal(format!("argument {index} out of range")))?,
            Expression::GlobalVariable(global) => {
                match state.global_pointers.get(global.index()).copied().flatten() {
                    Some(pointer) => pointer,
                    None => self
                        .globals
                        .get(global.index())
                        .map(|info| info.var)
                        .ok_or_else(|| {
                            Error::internal(format!("global {global:?} was not declared"))
                        })?,
                }
            }
            Expression::LocalVariable(local) => state
                .locals
                .get(local.index())
                .copied()
                .ok_or_else(|| Error::internal(format!("local {local:?} was not declared")))?,
            Expression::Load { pointer } => self.load(state, handle, pointer)?,
            Expression::Access { base, index } => self.access(state, handle, base, index)?,
            Expression::AccessIndex { base, index } => {
                self.access_index(state, handle, base, index)?
            }
            Expression::Swizzle {
                size,
                vector,
                pattern,
            } => {
                let ty = self.expression_type_id(state, handle)?;
                let vector = self.expression(state, vector)?;
                let id = self.module.next_id();
                self.emit(
                    Instruction::new(Op::VectorShuffle)
                        .id(ty)
                        .id(id)
                        .id(vector)
                        .id(vector)
                        .lits(pattern[..size as usize].iter().map(|&c| c as u32)),
                )?;
                id
            }
            Expression::Splat { size, value } => {
                let ty = self.expression_type_id(state, handle)?;
                let part = self.expression(state, value)?;
                self.composite(ty, vec![part; size as usize])?
            }
            Expression::Unary { op, expr: operand } => self.unary(state, handle, op, operand)?,
            Expression::Binary { op, left, right } if op.is_short_circuit() => {
                self.short_circuit(state, handle, op, left, right)?
            }
            Expression::Binary { op, left, right } => self.binary(state, handle, op, left, right)?,
            Expression::Select {
                condition,
                accept,
                reject,
            } => self.select(state, handle, condition, accept, reject)?,
            Expression::Math {
                fun,
                arg,
                arg1,
                arg2,
            } => self.math(state, handle, fun, arg, [arg1, arg2])?,
            Expression::As {
                expr: operand,
                kind,
                convert,
            } => self.conversion(state, handle, operand, kind, convert)?,
            Expression::ArrayLength(array) => self.array_length(state, array)?,
            Expression::CallResult(_) | Expression::AtomicResult { .. } => {
                return Err(Error::internal(format!(
                    "{expr:?} [{}] used before the statement producing it",
                    handle.index()
                )));
            }
        };
        Ok(id)
    }

    /// A constant composite when every part is constant, otherwise
    /// `OpCompositeConstruct`.
    fn composite(&mut self, ty: Id, parts: Vec<Id>) -> Result<Id, Error> {
        if parts.iter().all(|&part| self.cache.is_constant(part)) {
            return Ok(self.cache.get_or_create_constant(
                &mut self.module,
                ty,
                ConstantValue::Composite(parts),
            ));
        }
        let id = self.module.next_id();
        self.emit(Instruction::composite_construct(ty, id, &parts))?;
        Ok(id)
    }

    /// Broadcasts a scalar to a vector of `size` components.
    fn splat(&mut self, value: Id, scalar: Scalar, size: VectorSize) -> Result<Id, Error> {
        let ty = self
            .cache
            .vector_type(&mut self.module, scalar, size as u32);
        self.composite(ty, vec![value; size as usize])
    }

    fn load(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        pointer: Handle<Expression>,
    ) -> Result<Id, Error> {
        let ty = self.expression_type_id(state, handle)?;
        let atomic = self.points_to_atomic(state, pointer)?;
        let pointer = self.expression(state, pointer)?;
        let id = self.module.next_id();
        if atomic {
            let (scope, semantics) = self.atomic_operands();
            self.emit(
                Instruction::new(Op::AtomicLoad)
                    .id(ty)
                    .id(id)
                    .id(pointer)
                    .id(scope)
                    .id(semantics),
            )?;
        } else {
            self.emit(Instruction::load(ty, id, pointer))?;
        }
        Ok(id)
    }

    /// The value of an index expression, when it is a literal or a module
    /// constant that is one.
    fn constant_index(&self, state: &FunctionState<'a>, index: Handle<Expression>) -> Option<u32> {
        match *state.function.expressions.try_get(index)? {
            Expression::Literal(literal) => literal.as_index(),
            Expression::Constant(global) => match *self.ir.global_expressions.try_get(global)? {
                Expression::Literal(literal) => literal.as_index(),
                _ => None,
            },
            _ => None,
        }
    }

    fn access(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        base: Handle<Expression>,
        index: Handle<Expression>,
    ) -> Result<Id, Error> {
        let base_inner = self.expression_inner(state, base)?;
        let ty = self.expression_type_id(state, handle)?;
        let base_id = self.expression(state, base)?;
        let id;

        if base_inner.is_pointer() {
            let index = self.expression(state, index)?;
            id = self.module.next_id();
            self.emit(Instruction::access_chain(ty, id, base_id, &[index]))?;
        } else if let Some(constant) = self.constant_index(state, index) {
            id = self.module.next_id();
            self.emit(Instruction::composite_extract(ty, id, base_id, &[constant]))?;
        } else if let TypeInner::Vector { .. } = *base_inner {
            let index = self.expression(state, index)?;
            id = self.module.next_id();
            self.emit(
                Instruction::new(Op::VectorExtractDynamic)
                    .id(ty)
                    .id(id)
                    .id(base_id)
                    .id(index),
            )?;
        } else {
            return Err(Error::unsupported(
                "dynamic index into a non-vector value; store it in a variable first",
            ));
        }
        Ok(id)
    }

    fn access_index(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        base: Handle<Expression>,
        index: u32,
    ) -> Result<Id, Error> {
        let base_inner = self.expression_inner(state, base)?;
        let ty = self.expression_type_id(state, handle)?;
        let base_id = self.expression(state, base)?;
        let id = if base_inner.is_pointer() {
            let index = self.cache.index_constant(&mut self.module, index);
            let id = self.module.next_id();
            self.emit(Instruction::access_chain(ty, id, base_id, &[index]))?;
            id
        } else {
            let id = self.module.next_id();
            self.emit(Instruction::composite_extract(ty, id, base_id, &[index]))?;
            id
        };
        Ok(id)
    }

    fn unary(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        op: UnaryOp,
        operand: Handle<Expression>,
    ) -> Result<Id, Error> {
        let opcode = ops::unary_op(op, self.expression_inner(state, operand)?)?;
        let ty = self.expression_type_id(state, handle)?;
        let value = self.expression(state, operand)?;
        let id = self.module.next_id();
        self.emit(Instruction::new(opcode).id(ty).id(id).id(value))?;
        Ok(id)
    }

    fn binary(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        op: BinaryOp,
        left: Handle<Expression>,
        right: Handle<Expression>,
    ) -> Result<Id, Error> {
        let left_inner = self.expression_inner(state, left)?;
        let right_inner = self.expression_inner(state, right)?;
        let lowering = ops::binary_op(op, left_inner, right_inner)?;
        let ty = self.expression_type_id(state, handle)?;
        let l = self.expression(state, left)?;
        let r = self.expression(state, right)?;

        let (a, b) = match lowering.arrangement {
            Arrangement::Normal => (l, r),
            Arrangement::Swapped => (r, l),
            Arrangement::SplatLeft => (self.splat_operand(l, left_inner, right_inner)?, r),
            Arrangement::SplatRight => (l, self.splat_operand(r, right_inner, left_inner)?),
        };
        let id = self.module.next_id();
        self.emit(Instruction::new(lowering.op).id(ty).id(id).id(a).id(b))?;
        Ok(id)
    }

    fn splat_operand(
        &mut self,
        value: Id,
        scalar: &TypeInner,
        vector: &TypeInner,
    ) -> Result<Id, Error> {
        match (scalar.scalar(), vector.vector_size()) {
            (Some(scalar), Some(size)) => self.splat(value, scalar, size),
            _ => Err(Error::internal("splat of a non-scalar operand")),
        }
    }

    /// `a && b` / `a || b` as a selection construct ending in `OpPhi`.
    fn short_circuit(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        op: BinaryOp,
        left: Handle<Expression>,
        right: Handle<Expression>,
    ) -> Result<Id, Error> {
        let ty = self.expression_type_id(state, handle)?;
        let a = self.expression(state, left)?;
        let from = self
            .module
            .current_function()?
            .current_label()
            .ok_or_else(|| Error::internal("short-circuit operator outside a block"))?;

        let rhs = self.module.next_id();
        let merge = self.module.next_id();
        let branch = match op {
            BinaryOp::LogicalAnd => Instruction::branch_conditional(a, rhs, merge),
            _ => Instruction::branch_conditional(a, merge, rhs),
        };
        self.emit(Instruction::selection_merge(merge))?;
        self.module.current_function()?.terminate(branch)?;

        self.module.current_function()?.begin_block(rhs)?;
        let mark = state.scope_log.len();
        let b = self.expression(state, right)?;
        let rhs_end = self
            .module
            .current_function()?
            .current_label()
            .ok_or_else(|| Error::internal("right operand closed its block"))?;
        self.module
            .current_function()?
            .terminate(Instruction::branch(merge))?;
        // Values computed in the right-hand block do not dominate the merge.
        state.rollback(mark);

        self.module.current_function()?.begin_block(merge)?;
        let id = self.module.next_id();
        self.emit(
            Instruction::new(Op::Phi)
                .id(ty)
                .id(id)
                .ids([a, from, b, rhs_end]),
        )?;
        Ok(id)
    }

    fn select(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        condition: Handle<Expression>,
        accept: Handle<Expression>,
        reject: Handle<Expression>,
    ) -> Result<Id, Error> {
        let condition_inner = self.expression_inner(state, condition)?;
        let accept_inner = self.expression_inner(state, accept)?;
        let ty = self.expression_type_id(state, handle)?;
        let mut c = self.expression(state, condition)?;
        let a = self.expression(state, accept)?;
        let r = self.expression(state, reject)?;

        if let (TypeInner::Scalar(_), Some(size)) = (condition_inner, accept_inner.vector_size()) {
            c = self.splat(c, Scalar::BOOL, size)?;
        }
        let id = self.module.next_id();
        self.emit(Instruction::new(Op::Select).id(ty).id(id).ids([c, a, r]))?;
        Ok(id)
    }

    fn math(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        fun: MathFunction,
        arg: Handle<Expression>,
        extra: [Option<Handle<Expression>>; 2],
    ) -> Result<Id, Error> {
        let arg_inner = self.expression_inner(state, arg)?;
        let lowering = ops::math_op(fun, arg_inner)?;
        let ty = self.expression_type_id(state, handle)?;
        let mut args = vec![self.expression(state, arg)?];
        for operand in extra.into_iter().flatten() {
            args.push(self.expression(state, operand)?);
        }
        if args.len() != fun.argument_count() {
            return Err(Error::internal(format!(
                "{fun:?} takes {} argument(s), got {}",
                fun.argument_count(),
                args.len()
            )));
        }

        let id = match lowering {
            MathLowering::Identity => return Ok(args[0]),
            MathLowering::Core(op) => {
                let id = self.module.next_id();
                self.emit(Instruction::new(op).id(ty).id(id).ids(args))?;
                id
            }
            MathLowering::Ext(instruction) => self.ext_inst(ty, instruction, args)?,
            MathLowering::Saturate => {
                let zero = self.cache.null_constant(&mut self.module, ty);
                let one = self.one_constant(arg_inner, ty)?;
                self.ext_inst(ty, GLOp::FClamp, vec![args[0], zero, one])?
            }
        };
        Ok(id)
    }

    fn ext_inst(&mut self, ty: Id, instruction: GLOp, args: Vec<Id>) -> Result<Id, Error> {
        let set = self.module.glsl_std();
        let id = self.module.next_id();
        self.emit(
            Instruction::new(Op::ExtInst)
                .id(ty)
                .id(id)
                .id(set)
                .lit(instruction as u32)
                .ids(args),
        )?;
        Ok(id)
    }

    fn conversion(
        &mut self,
        state: &mut FunctionState<'a>,
        handle: Handle<Expression>,
        operand: Handle<Expression>,
        kind: ScalarKind,
        convert: Option<Bytes>,
    ) -> Result<Id, Error> {
        let source_inner = self.expression_inner(state, operand)?;
        let source = source_inner
            .scalar()
            .ok_or_else(|| Error::unsupported("conversion of a non-numeric value"))?;
        let lowering = ops::conversion(source, kind, convert)?;
        let target_inner = self.expression_inner(state, handle)?;
        let ty = self.expression_type_id(state, handle)?;
        let value = self.expression(state, operand)?;

        let id = match lowering {
            Conversion::Identity => return Ok(value),
            Conversion::Op(op) => {
                let id = self.module.next_id();
                self.emit(Instruction::new(op).id(ty).id(id).id(value))?;
                id
            }
            Conversion::BoolToNumber => {
                let one = self.one_constant(target_inner, ty)?;
                let zero = self.cache.null_constant(&mut self.module, ty);
                let id = self.module.next_id();
                self.emit(Instruction::new(Op::Select).id(ty).id(id).ids([value, one, zero]))?;
                id
            }
            Conversion::NumberToBool(op) => {
                let source_ty = self.expression_type_id(state, operand)?;
                let zero = self.cache.null_constant(&mut self.module, source_ty);
                let id = self.module.next_id();
                self.emit(Instruction::new(op).id(ty).id(id).ids([value, zero]))?;
                id
            }
        };
        Ok(id)
    }

    /// `OpArrayLength` needs the struct holding the runtime array, so only
    /// buffer globals (wrapped or struct-typed) are accepted.
    fn array_length(
        &mut self,
        state: &FunctionState<'a>,
        array: Handle<Expression>,
    ) -> Result<Id, Error> {
        let exprs = &state.function.expressions;
        let (global, member) = match exprs.try_get(array) {
            Some(&Expression::GlobalVariable(global)) => (global, None),
            Some(&Expression::AccessIndex { base, index }) => match exprs.try_get(base) {
                Some(&Expression::GlobalVariable(global)) => (global, Some(index)),
                _ => return Err(Error::unsupported("arrayLength of a non-buffer array")),
            },
            _ => return Err(Error::unsupported("arrayLength of a non-buffer array")),
        };
        let info = *self
            .globals
            .get(global.index())
            .ok_or_else(|| Error::internal(format!("global {global:?} was not declared")))?;
        let member = match (info.wrapped, member) {
            (true, None) => 0,
            (false, Some(index)) => index,
            _ => return Err(Error::unsupported("arrayLength of a non-buffer array")),
        };

        let u32_ty = self.cache.u32_type(&mut self.module);
        let id = self.module.next_id();
        self.emit(
            Instruction::new(Op::ArrayLength)
                .id(u32_ty)
                .id(id)
                .id(info.var)
                .lit(member),
        )?;
        Ok(id)
    }
}
