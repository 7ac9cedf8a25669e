//! Shared helpers for building IR by hand and inspecting the produced SPIR-V.

#![allow(dead_code)]

use kiln_backend_spirv::{Options, write_module};
use kiln_ir::*;
use rspirv::dr;
use spirv::Op;

pub fn ty(module: &mut Module, inner: TypeInner) -> Handle<Type> {
    module.types.insert(Type { name: None, inner })
}

pub fn scalar(module: &mut Module, scalar: Scalar) -> Handle<Type> {
    ty(module, TypeInner::Scalar(scalar))
}

pub fn pointer(module: &mut Module, base: Handle<Type>, space: AddressSpace) -> Handle<Type> {
    ty(module, TypeInner::Pointer { base, space })
}

pub fn private_global(module: &mut Module, name: &str, ty: Handle<Type>) -> Handle<GlobalVariable> {
    module.global_variables.append(GlobalVariable {
        name: Some(name.into()),
        space: AddressSpace::Private,
        binding: None,
        ty,
        init: None,
    })
}

/// Emits every expression appended since `start`.
pub fn emit_since(function: &Function, start: usize) -> Statement {
    Statement::Emit(function.expressions.range_from(start))
}

pub fn compile(module: &Module) -> Vec<u32> {
    write_module(module, &Options::default()).expect("module should lower")
}

pub fn compile_without_names(module: &Module) -> Vec<u32> {
    let options = Options {
        debug_names: false,
        ..Options::default()
    };
    write_module(module, &options).expect("module should lower")
}

pub fn parse(words: &[u32]) -> dr::Module {
    let module = rspirv::dr::load_words(words).expect("binary should parse");
    assert_structured(&module);
    module
}

pub fn opcode(inst: &dr::Instruction) -> Op {
    inst.class.opcode
}

/// Every instruction of every function body, labels excluded.
pub fn body_instructions(module: &dr::Module) -> Vec<&dr::Instruction> {
    module
        .functions
        .iter()
        .flat_map(|f| f.blocks.iter())
        .flat_map(|b| b.instructions.iter())
        .collect()
}

pub fn count_in_bodies(module: &dr::Module, op: Op) -> usize {
    body_instructions(module)
        .into_iter()
        .filter(|i| opcode(i) == op)
        .count()
}

pub fn count_globals(module: &dr::Module, op: Op) -> usize {
    module
        .types_global_values
        .iter()
        .filter(|i| opcode(i) == op)
        .count()
}

pub fn id_operand(inst: &dr::Instruction, index: usize) -> u32 {
    match inst.operands[index] {
        dr::Operand::IdRef(id) => id,
        ref other => panic!("operand {index} of {:?} is {other:?}", opcode(inst)),
    }
}

pub fn label(block: &dr::Block) -> u32 {
    block
        .label
        .as_ref()
        .and_then(|l| l.result_id)
        .expect("block without label")
}

pub fn block_with_label(function: &dr::Function, id: u32) -> &dr::Block {
    function
        .blocks
        .iter()
        .find(|b| label(b) == id)
        .unwrap_or_else(|| panic!("no block %{id}"))
}

pub fn terminator(block: &dr::Block) -> &dr::Instruction {
    block.instructions.last().expect("empty block")
}

fn is_terminator(op: Op) -> bool {
    matches!(
        op,
        Op::Branch
            | Op::BranchConditional
            | Op::Switch
            | Op::Return
            | Op::ReturnValue
            | Op::Kill
            | Op::Unreachable
    )
}

/// Each block ends in exactly one terminator, and each merge instruction is
/// immediately followed by the branch it annotates.
pub fn assert_structured(module: &dr::Module) {
    for function in &module.functions {
        assert!(!function.blocks.is_empty(), "function without blocks");
        for block in &function.blocks {
            let ops: Vec<Op> = block.instructions.iter().map(opcode).collect();
            let last = *ops.last().expect("empty block");
            assert!(is_terminator(last), "block %{} ends in {last:?}", label(block));
            assert_eq!(
                ops.iter().filter(|&&op| is_terminator(op)).count(),
                1,
                "block %{} has several terminators",
                label(block)
            );
            for (index, op) in ops.iter().enumerate() {
                match op {
                    Op::SelectionMerge => {
                        assert_eq!(index, ops.len() - 2);
                        assert!(matches!(last, Op::BranchConditional | Op::Switch));
                    }
                    Op::LoopMerge => {
                        assert_eq!(index, ops.len() - 2);
                        assert!(matches!(last, Op::Branch | Op::BranchConditional));
                    }
                    Op::Phi => assert!(
                        ops[..index].iter().all(|&op| op == Op::Phi),
                        "OpPhi after a non-phi instruction"
                    ),
                    _ => {}
                }
            }
        }
    }
}
