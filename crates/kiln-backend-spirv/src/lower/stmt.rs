//! Statement lowering: structured control flow over basic blocks.

use kiln_ir::{
    AtomicFunction, Barrier, Block, Expression, Handle, ScalarKind, Statement, SwitchCase,
    SwitchValue, TypeInner,
};
use spirv::{MemorySemantics, Op, Scope};

use super::{Builder, FunctionState};
use crate::error::Error;
use crate::id::Id;
use crate::instruction::Instruction;

/// Flags every expression a statement reads directly.
pub(super) fn collect_statement_uses(block: &[Statement], used: &mut [bool]) {
    fn mark(used: &mut [bool], handle: Handle<Expression>) {
        if let Some(flag) = used.get_mut(handle.index()) {
            *flag = true;
        }
    }

    for statement in block {
        match *statement {
            Statement::Emit(_)
            | Statement::Break
            | Statement::Continue
            | Statement::Kill
            | Statement::Barrier(_) => {}
            Statement::Block(ref block) => collect_statement_uses(block, used),
            Statement::Store { pointer, value } => {
                mark(used, pointer);
                mark(used, value);
            }
            Statement::If {
                condition,
                ref accept,
                ref reject,
            } => {
                mark(used, condition);
                collect_statement_uses(accept, used);
                collect_statement_uses(reject, used);
            }
            Statement::Switch {
                selector,
                ref cases,
            } => {
                mark(used, selector);
                for case in cases {
                    collect_statement_uses(&case.body, used);
                }
            }
            Statement::Loop {
                ref body,
                ref continuing,
                break_if,
            } => {
                collect_statement_uses(body, used);
                collect_statement_uses(continuing, used);
                if let Some(condition) = break_if {
                    mark(used, condition);
                }
            }
            Statement::Call { ref arguments, .. } => {
                for &argument in arguments {
                    mark(used, argument);
                }
            }
            Statement::Atomic {
                pointer,
                fun,
                value,
                ..
            } => {
                mark(used, pointer);
                mark(used, value);
                if let AtomicFunction::Exchange {
                    compare: Some(compare),
                } = fun
                {
                    mark(used, compare);
                }
            }
            Statement::Return { value } => {
                if let Some(value) = value {
                    mark(used, value);
                }
            }
        }
    }
}

/// Records, for every emitted expression, how many side effects and
/// nested constructs precede its `Emit`. Two expressions with the same
/// epoch see the same memory.
pub(super) fn collect_emit_epochs(block: &[Statement], epoch: &mut u32, epochs: &mut [Option<u32>]) {
    for statement in block {
        match *statement {
            Statement::Emit(ref range) => {
                for handle in range.iter() {
                    if let Some(slot) = epochs.get_mut(handle.index()) {
                        *slot = Some(*epoch);
                    }
                }
            }
            Statement::Store { .. }
            | Statement::Call { .. }
            | Statement::Atomic { .. }
            | Statement::Barrier(_) => *epoch += 1,
            Statement::Block(ref block) => {
                *epoch += 1;
                collect_emit_epochs(block, epoch, epochs);
                *epoch += 1;
            }
            Statement::If {
                ref accept,
                ref reject,
                ..
            } => {
                *epoch += 1;
                collect_emit_epochs(accept, epoch, epochs);
                *epoch += 1;
                collect_emit_epochs(reject, epoch, epochs);
                *epoch += 1;
            }
            Statement::Switch { ref cases, .. } => {
                for case in cases {
                    *epoch += 1;
                    collect_emit_epochs(&case.body, epoch, epochs);
                }
                *epoch += 1;
            }
            Statement::Loop {
                ref body,
                ref continuing,
                ..
            } => {
                *epoch += 1;
                collect_emit_epochs(body, epoch, epochs);
                *epoch += 1;
                collect_emit_epochs(continuing, epoch, epochs);
                *epoch += 1;
            }
            Statement::Break | Statement::Continue | Statement::Return { .. } | Statement::Kill => {}
        }
    }
}

impl<'a> Builder<'a> {
    pub(super) fn block(
        &mut self,
        state: &mut FunctionState<'a>,
        block: &'a Block,
    ) -> Result<(), Error> {
        for statement in block {
            self.statement(state, statement)?;
        }
        Ok(())
    }

    /// Code after a terminator lands in a fresh block nothing branches to.
    fn ensure_open_block(&mut self) -> Result<(), Error> {
        if !self.module.current_function()?.has_open_block() {
            let label = self.module.next_id();
            self.module.current_function()?.begin_block(label)?;
        }
        Ok(())
    }

    fn terminate(&mut self, terminator: Instruction) -> Result<(), Error> {
        self.module.current_function()?.terminate(terminator)
    }

    fn begin_block(&mut self, label: Id) -> Result<(), Error> {
        self.module.current_function()?.begin_block(label)
    }

    /// Falls through to `target` unless the block already ended.
    fn close_to(&mut self, target: Id) -> Result<(), Error> {
        if self.module.current_function()?.has_open_block() {
            self.terminate(Instruction::branch(target))?;
        }
        Ok(())
    }

    fn statement(
        &mut self,
        state: &mut FunctionState<'a>,
        statement: &'a Statement,
    ) -> Result<(), Error> {
        self.ensure_open_block()?;
        match *statement {
            Statement::Emit(ref range) => {
                for handle in range.iter() {
                    if !state.deferred.get(handle.index()).copied().unwrap_or(false) {
                        self.expression(state, handle)?;
                    }
                }
            }
            Statement::Block(ref block) => self.block(state, block)?,
            Statement::Store { pointer, value } => self.store(state, pointer, value)?,
            Statement::If {
                condition,
                ref accept,
                ref reject,
            } => self.if_statement(state, condition, accept, reject)?,
            Statement::Switch {
                selector,
                ref cases,
            } => self.switch(state, selector, cases)?,
            Statement::Loop {
                ref body,
                ref continuing,
                break_if,
            } => self.loop_statement(state, body, continuing, break_if)?,
            Statement::Call {
                function,
                ref arguments,
                result,
            } => self.call(state, function, arguments, result)?,
            Statement::Atomic {
                pointer,
                fun,
                value,
                result,
            } => self.atomic(state, pointer, fun, value, result)?,
            Statement::Break => {
                let target = state.flow.break_target()?;
                self.terminate(Instruction::branch(target))?;
            }
            Statement::Continue => {
                let target = state.flow.continue_target()?;
                self.terminate(Instruction::branch(target))?;
            }
            Statement::Return { value } => self.return_statement(state, value)?,
            Statement::Kill => self.terminate(Instruction::new(Op::Kill))?,
            Statement::Barrier(barrier) => self.barrier(barrier)?,
        }
        Ok(())
    }

    fn store(
        &mut self,
        state: &mut FunctionState<'a>,
        pointer: Handle<Expression>,
        value: Handle<Expression>,
    ) -> Result<(), Error> {
        let atomic = self.points_to_atomic(state, pointer)?;
        let pointer = self.expression(state, pointer)?;
        let value = self.expression(state, value)?;
        if atomic {
            let (scope, semantics) = self.atomic_operands();
            self.emit(
                Instruction::new(Op::AtomicStore).ids([pointer, scope, semantics, value]),
            )
        } else {
            self.emit(Instruction::store(pointer, value))
        }
    }

    fn if_statement(
        &mut self,
        state: &mut FunctionState<'a>,
        condition: Handle<Expression>,
        accept: &'a Block,
        reject: &'a Block,
    ) -> Result<(), Error> {
        let condition = self.expression(state, condition)?;
        let merge = self.module.next_id();
        let accept_label = self.module.next_id();
        let reject_label = if reject.is_empty() {
            merge
        } else {
            self.module.next_id()
        };

        self.emit(Instruction::selection_merge(merge))?;
        self.terminate(Instruction::branch_conditional(
            condition,
            accept_label,
            reject_label,
        ))?;
        state.flow.push_if(merge);

        self.begin_block(accept_label)?;
        self.block(state, accept)?;
        self.close_to(merge)?;

        if !reject.is_empty() {
            self.begin_block(reject_label)?;
            self.block(state, reject)?;
            self.close_to(merge)?;
        }

        state.flow.pop()?;
        self.begin_block(merge)
    }

    fn loop_statement(
        &mut self,
        state: &mut FunctionState<'a>,
        body: &'a Block,
        continuing: &'a Block,
        break_if: Option<Handle<Expression>>,
    ) -> Result<(), Error> {
        let header = self.module.next_id();
        let body_label = self.module.next_id();
        let continue_label = self.module.next_id();
        let merge = self.module.next_id();

        self.terminate(Instruction::branch(header))?;
        self.begin_block(header)?;
        self.emit(Instruction::loop_merge(merge, continue_label))?;
        self.terminate(Instruction::branch(body_label))?;
        state.flow.push_loop(merge, continue_label);

        self.begin_block(body_label)?;
        self.block(state, body)?;
        self.close_to(continue_label)?;

        self.begin_block(continue_label)?;
        self.block(state, continuing)?;
        if self.module.current_function()?.has_open_block() {
            let back_edge = match break_if {
                Some(condition) => {
                    let condition = self.expression(state, condition)?;
                    Instruction::branch_conditional(condition, merge, header)
                }
                None => Instruction::branch(header),
            };
            self.terminate(back_edge)?;
        }

        state.flow.pop()?;
        self.begin_block(merge)
    }

    fn switch(
        &mut self,
        state: &mut FunctionState<'a>,
        selector: Handle<Expression>,
        cases: &'a [SwitchCase],
    ) -> Result<(), Error> {
        let selector_inner = self.expression_inner(state, selector)?;
        let mut value = self.expression(state, selector)?;
        if let TypeInner::Pointer { base, .. } = *selector_inner {
            let ty = self.type_id(base)?;
            let loaded = self.module.next_id();
            self.emit(Instruction::load(ty, loaded, value))?;
            value = loaded;
        }

        let merge = self.module.next_id();
        let labels: Vec<Id> = cases.iter().map(|_| self.module.next_id()).collect();
        let (default, fallback) = match cases.iter().position(SwitchCase::is_default) {
            Some(index) => (labels[index], None),
            None => {
                let label = self.module.next_id();
                (label, Some(label))
            }
        };

        let mut instruction = Instruction::new(Op::Switch).id(value).id(default);
        for (case, &label) in cases.iter().zip(&labels) {
            for selector in &case.values {
                let literal = match *selector {
                    SwitchValue::I32(v) => v as u32,
                    SwitchValue::U32(v) => v,
                    SwitchValue::Default => continue,
                };
                instruction = instruction.lit(literal).id(label);
            }
        }
        self.emit(Instruction::selection_merge(merge))?;
        self.terminate(instruction)?;
        state.flow.push_switch(merge);

        for (case, &label) in cases.iter().zip(&labels) {
            self.begin_block(label)?;
            self.block(state, &case.body)?;
            self.close_to(merge)?;
        }
        if let Some(label) = fallback {
            self.begin_block(label)?;
            self.terminate(Instruction::branch(merge))?;
        }

        state.flow.pop()?;
        self.begin_block(merge)
    }

    fn call(
        &mut self,
        state: &mut FunctionState<'a>,
        function: Handle<kiln_ir::Function>,
        arguments: &'a [Handle<Expression>],
        result: Option<Handle<Expression>>,
    ) -> Result<(), Error> {
        let target = self
            .function_ids
            .get(function.index())
            .copied()
            .ok_or_else(|| Error::internal(format!("call to unknown function {function:?}")))?;
        let mut args = Vec::with_capacity(arguments.len());
        for &argument in arguments {
            args.push(self.expression(state, argument)?);
        }
        let ty = match result {
            Some(result) => self.expression_type_id(state, result)?,
            None => self.void_type(),
        };
        let id = self.module.next_id();
        self.emit(
            Instruction::new(Op::FunctionCall)
                .id(ty)
                .id(id)
                .id(target)
                .ids(args),
        )?;
        if let Some(result) = result {
            state.cache(result, id);
        }
        Ok(())
    }

    fn atomic(
        &mut self,
        state: &mut FunctionState<'a>,
        pointer: Handle<Expression>,
        fun: AtomicFunction,
        value: Handle<Expression>,
        result: Option<Handle<Expression>>,
    ) -> Result<(), Error> {
        let signed = self
            .expression_inner(state, value)?
            .scalar()
            .is_some_and(|s| s.kind == ScalarKind::Sint);
        let ty = self.expression_type_id(state, value)?;
        let pointer = self.expression(state, pointer)?;
        let value = self.expression(state, value)?;
        let (scope, semantics) = self.atomic_operands();
        let id = self.module.next_id();

        let op = match fun {
            AtomicFunction::Add => Op::AtomicIAdd,
            AtomicFunction::Subtract => Op::AtomicISub,
            AtomicFunction::And => Op::AtomicAnd,
            AtomicFunction::InclusiveOr => Op::AtomicOr,
            AtomicFunction::ExclusiveOr => Op::AtomicXor,
            AtomicFunction::Min if signed => Op::AtomicSMin,
            AtomicFunction::Min => Op::AtomicUMin,
            AtomicFunction::Max if signed => Op::AtomicSMax,
            AtomicFunction::Max => Op::AtomicUMax,
            AtomicFunction::Exchange { compare: None } => Op::AtomicExchange,
            AtomicFunction::Exchange {
                compare: Some(compare),
            } => {
                let compare = self.expression(state, compare)?;
                self.emit(
                    Instruction::new(Op::AtomicCompareExchange)
                        .id(ty)
                        .id(id)
                        .ids([pointer, scope, semantics, semantics, value, compare]),
                )?;
                if let Some(result) = result {
                    // { old_value, exchanged }
                    let bool_ty = self.cache.bool_type(&mut self.module);
                    let exchanged = self.module.next_id();
                    self.emit(
                        Instruction::new(Op::IEqual)
                            .id(bool_ty)
                            .id(exchanged)
                            .ids([id, compare]),
                    )?;
                    let result_ty = self.expression_type_id(state, result)?;
                    let composite = self.module.next_id();
                    self.emit(Instruction::composite_construct(
                        result_ty,
                        composite,
                        &[id, exchanged],
                    ))?;
                    state.cache(result, composite);
                }
                return Ok(());
            }
        };

        self.emit(
            Instruction::new(op)
                .id(ty)
                .id(id)
                .ids([pointer, scope, semantics, value]),
        )?;
        if let Some(result) = result {
            state.cache(result, id);
        }
        Ok(())
    }

    fn return_statement(
        &mut self,
        state: &mut FunctionState<'a>,
        value: Option<Handle<Expression>>,
    ) -> Result<(), Error> {
        let Some(value) = value else {
            return self.terminate(Instruction::new(Op::Return));
        };
        let value = self.expression(state, value)?;

        if !state.outputs.is_empty() {
            for output in state.outputs.clone() {
                let pointer = self.interface_pointer(output)?;
                let stored = match output.member {
                    None => value,
                    Some((index, member_ty)) => {
                        let part = self.module.next_id();
                        self.emit(Instruction::composite_extract(
                            member_ty,
                            part,
                            value,
                            &[index],
                        ))?;
                        part
                    }
                };
                self.emit(Instruction::store(pointer, stored))?;
            }
            return self.terminate(Instruction::new(Op::Return));
        }
        if state.returns_void {
            return Err(Error::internal(format!(
                "value returned from `{}`, which returns nothing",
                state.name
            )));
        }
        self.terminate(Instruction::new(Op::ReturnValue).id(value))
    }

    fn barrier(&mut self, barrier: Barrier) -> Result<(), Error> {
        if barrier.is_empty() {
            return Ok(());
        }
        let mut semantics = MemorySemantics::ACQUIRE_RELEASE;
        if barrier.contains(Barrier::STORAGE) {
            semantics |= MemorySemantics::UNIFORM_MEMORY;
        }
        if barrier.contains(Barrier::WORKGROUP) {
            semantics |= MemorySemantics::WORKGROUP_MEMORY;
        }
        let scope = self
            .cache
            .index_constant(&mut self.module, Scope::Workgroup as u32);
        let semantics = self
            .cache
            .index_constant(&mut self.module, semantics.bits());
        self.emit(Instruction::new(Op::ControlBarrier).ids([scope, scope, semantics]))
    }
}
