//! Integration tests: lower hand-built IR and inspect the decoded SPIR-V.

mod common;

use common::*;
use kiln_ir::*;
use spirv::Op;

/// ```wgsl
/// fn pick() -> i32 {
///     return vec3<i32>(1, 2, 3)[1];
/// }
/// ```
#[test]
fn constant_index_into_composite_value_extracts() {
    let mut module = Module::default();
    let i32_ty = scalar(&mut module, Scalar::I32);
    let vec3_ty = ty(
        &mut module,
        TypeInner::Vector {
            size: VectorSize::Tri,
            scalar: Scalar::I32,
        },
    );

    let mut function = Function::new("pick");
    function.result = Some(FunctionResult {
        ty: i32_ty,
        binding: None,
    });
    let x = function.add_expression(Expression::Literal(Literal::I32(1)), i32_ty);
    let y = function.add_expression(Expression::Literal(Literal::I32(2)), i32_ty);
    let z = function.add_expression(Expression::Literal(Literal::I32(3)), i32_ty);
    let start = function.expressions.len();
    let v = function.add_expression(
        Expression::Compose {
            ty: vec3_ty,
            components: vec![x, y, z],
        },
        vec3_ty,
    );
    let index = function.add_expression(Expression::Literal(Literal::I32(1)), i32_ty);
    let element = function.add_expression(Expression::Access { base: v, index }, i32_ty);
    function.body = vec![
        emit_since(&function, start),
        Statement::Return {
            value: Some(element),
        },
    ];
    module.functions.append(function);

    let spv = parse(&compile(&module));
    assert_eq!(count_in_bodies(&spv, Op::CompositeExtract), 1);
    assert_eq!(count_in_bodies(&spv, Op::Load), 0);
    assert_eq!(count_in_bodies(&spv, Op::Store), 0);
    assert_eq!(count_in_bodies(&spv, Op::Variable), 0);
    assert_eq!(count_globals(&spv, Op::ConstantComposite), 1);
}

/// ```wgsl
/// fn pick(i: u32) -> i32 {
///     var v: vec3<i32>;
///     return v[i];
/// }
/// ```
#[test]
fn runtime_index_into_variable_uses_access_chain() {
    let mut module = Module::default();
    let i32_ty = scalar(&mut module, Scalar::I32);
    let u32_ty = scalar(&mut module, Scalar::U32);
    let vec3_ty = ty(
        &mut module,
        TypeInner::Vector {
            size: VectorSize::Tri,
            scalar: Scalar::I32,
        },
    );
    let vec3_ptr = pointer(&mut module, vec3_ty, AddressSpace::Function);
    let i32_ptr = pointer(&mut module, i32_ty, AddressSpace::Function);

    let mut function = Function::new("pick");
    function.arguments.push(FunctionArgument {
        name: Some("i".into()),
        ty: u32_ty,
        binding: None,
    });
    function.result = Some(FunctionResult {
        ty: i32_ty,
        binding: None,
    });
    let local = function.local_variables.append(LocalVariable {
        name: Some("v".into()),
        ty: vec3_ty,
        init: None,
    });
    let var = function.add_expression(Expression::LocalVariable(local), vec3_ptr);
    let i = function.add_expression(Expression::FunctionArgument(0), u32_ty);
    let start = function.expressions.len();
    let element_ptr = function.add_expression(Expression::Access { base: var, index: i }, i32_ptr);
    let element = function.add_expression(
        Expression::Load {
            pointer: element_ptr,
        },
        i32_ty,
    );
    function.body = vec![
        emit_since(&function, start),
        Statement::Return {
            value: Some(element),
        },
    ];
    module.functions.append(function);

    let spv = parse(&compile(&module));
    let body: Vec<Op> = body_instructions(&spv).into_iter().map(opcode).collect();
    assert_eq!(
        body,
        [Op::Variable, Op::AccessChain, Op::Load, Op::ReturnValue]
    );
    assert_eq!(count_in_bodies(&spv, Op::CompositeExtract), 0);
    assert_eq!(count_in_bodies(&spv, Op::VectorExtractDynamic), 0);
    assert_eq!(spv.functions[0].parameters.len(), 1);
}

struct Flags {
    module: Module,
    bool_ty: Handle<Type>,
    bool_ptr: Handle<Type>,
    globals: Vec<Handle<GlobalVariable>>,
}

fn bool_globals(names: &[&str]) -> Flags {
    let mut module = Module::default();
    let bool_ty = scalar(&mut module, Scalar::BOOL);
    let bool_ptr = pointer(&mut module, bool_ty, AddressSpace::Private);
    let globals = names
        .iter()
        .map(|name| private_global(&mut module, name, bool_ty))
        .collect();
    Flags {
        module,
        bool_ty,
        bool_ptr,
        globals,
    }
}

fn load_global(function: &mut Function, flags: &Flags, index: usize) -> Handle<Expression> {
    let pointer = function.add_expression(
        Expression::GlobalVariable(flags.globals[index]),
        flags.bool_ptr,
    );
    function.add_expression(Expression::Load { pointer }, flags.bool_ty)
}

/// ```wgsl
/// var<private> a: bool;
/// var<private> b: bool;
/// fn both() -> bool { return a && b; }
/// ```
#[test]
fn logical_and_evaluates_right_operand_in_its_own_block() {
    let mut flags = bool_globals(&["a", "b"]);
    let mut function = Function::new("both");
    function.result = Some(FunctionResult {
        ty: flags.bool_ty,
        binding: None,
    });
    let a = load_global(&mut function, &flags, 0);
    let b = load_global(&mut function, &flags, 1);
    let both = function.add_expression(
        Expression::Binary {
            op: BinaryOp::LogicalAnd,
            left: a,
            right: b,
        },
        flags.bool_ty,
    );
    function.body = vec![
        emit_since(&function, 0),
        Statement::Return { value: Some(both) },
    ];
    flags.module.functions.append(function);

    let spv = parse(&compile(&flags.module));
    let blocks = &spv.functions[0].blocks;
    assert_eq!(blocks.len(), 3);

    let entry: Vec<Op> = blocks[0].instructions.iter().map(opcode).collect();
    assert_eq!(entry, [Op::Load, Op::SelectionMerge, Op::BranchConditional]);
    let rhs: Vec<Op> = blocks[1].instructions.iter().map(opcode).collect();
    assert_eq!(rhs, [Op::Load, Op::Branch]);
    let merge: Vec<Op> = blocks[2].instructions.iter().map(opcode).collect();
    assert_eq!(merge, [Op::Phi, Op::ReturnValue]);

    // `a` true runs the right operand, `a` false goes straight to the merge.
    let branch = terminator(&blocks[0]);
    assert_eq!(id_operand(branch, 1), label(&blocks[1]));
    assert_eq!(id_operand(branch, 2), label(&blocks[2]));

    let phi = &blocks[2].instructions[0];
    let a_id = blocks[0].instructions[0].result_id.unwrap();
    let b_id = blocks[1].instructions[0].result_id.unwrap();
    assert_eq!(id_operand(phi, 0), a_id);
    assert_eq!(id_operand(phi, 1), label(&blocks[0]));
    assert_eq!(id_operand(phi, 2), b_id);
    assert_eq!(id_operand(phi, 3), label(&blocks[1]));
}

/// ```wgsl
/// fn any(a: bool, b: bool, c: bool) -> bool { return a || (b && c); }
/// ```
#[test]
fn nested_short_circuit_phi_names_the_inner_merge_block() {
    let mut flags = bool_globals(&["a", "b", "c"]);
    let mut function = Function::new("any");
    function.result = Some(FunctionResult {
        ty: flags.bool_ty,
        binding: None,
    });
    let a = load_global(&mut function, &flags, 0);
    let b = load_global(&mut function, &flags, 1);
    let c = load_global(&mut function, &flags, 2);
    let inner = function.add_expression(
        Expression::Binary {
            op: BinaryOp::LogicalAnd,
            left: b,
            right: c,
        },
        flags.bool_ty,
    );
    let outer = function.add_expression(
        Expression::Binary {
            op: BinaryOp::LogicalOr,
            left: a,
            right: inner,
        },
        flags.bool_ty,
    );
    function.body = vec![
        emit_since(&function, 0),
        Statement::Return { value: Some(outer) },
    ];
    flags.module.functions.append(function);

    let spv = parse(&compile(&flags.module));
    let function = &spv.functions[0];
    let phis: Vec<(&rspirv::dr::Block, &rspirv::dr::Instruction)> = function
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter().map(move |i| (b, i)))
        .filter(|(_, i)| opcode(i) == Op::Phi)
        .collect();
    assert_eq!(phis.len(), 2);

    let (inner_block, inner_phi) = phis[0];
    let (_, outer_phi) = phis[1];
    assert_eq!(id_operand(outer_phi, 2), inner_phi.result_id.unwrap());
    assert_eq!(id_operand(outer_phi, 3), label(inner_block));

    // `||` skips the right operand when `a` is true.
    let branch = terminator(&function.blocks[0]);
    assert_eq!(opcode(branch), Op::BranchConditional);
    let skip = id_operand(branch, 1);
    assert_eq!(id_operand(outer_phi, 1), label(&function.blocks[0]));
    assert!(function.blocks.iter().any(|b| label(b) == skip));
    assert_eq!(count_in_bodies(&spv, Op::Load), 3);
}

/// ```wgsl
/// var<private> out: i32;
/// fn choose(x: i32) {
///     switch x {
///         case 1, 2: { out = 1; }
///         default: { out = 2; }
///     }
/// }
/// ```
#[test]
fn switch_with_shared_case_labels() {
    let mut module = Module::default();
    let i32_ty = scalar(&mut module, Scalar::I32);
    let i32_ptr = pointer(&mut module, i32_ty, AddressSpace::Private);
    let out = private_global(&mut module, "out", i32_ty);

    let mut function = Function::new("choose");
    function.arguments.push(FunctionArgument {
        name: Some("x".into()),
        ty: i32_ty,
        binding: None,
    });
    let x = function.add_expression(Expression::FunctionArgument(0), i32_ty);
    let out_ptr = function.add_expression(Expression::GlobalVariable(out), i32_ptr);
    let one = function.add_expression(Expression::Literal(Literal::I32(1)), i32_ty);
    let two = function.add_expression(Expression::Literal(Literal::I32(2)), i32_ty);
    function.body = vec![Statement::Switch {
        selector: x,
        cases: vec![
            SwitchCase {
                values: vec![SwitchValue::I32(1), SwitchValue::I32(2)],
                body: vec![Statement::Store {
                    pointer: out_ptr,
                    value: one,
                }],
            },
            SwitchCase {
                values: vec![SwitchValue::Default],
                body: vec![Statement::Store {
                    pointer: out_ptr,
                    value: two,
                }],
            },
        ],
    }];
    module.functions.append(function);

    let spv = parse(&compile(&module));
    let function = &spv.functions[0];
    let entry = &function.blocks[0];
    let switch = terminator(entry);
    assert_eq!(opcode(switch), Op::Switch);
    assert_eq!(opcode(&entry.instructions[entry.instructions.len() - 2]), Op::SelectionMerge);

    // selector, default, then (literal, label) for each case value
    assert_eq!(switch.operands.len(), 6);
    assert_eq!(switch.operands[3], switch.operands[5]);
    let case_label = id_operand(switch, 3);
    let default_label = id_operand(switch, 1);
    assert_ne!(case_label, default_label);

    let merge = id_operand(&entry.instructions[entry.instructions.len() - 2], 0);
    for target in [case_label, default_label] {
        let block = block_with_label(function, target);
        let ops: Vec<Op> = block.instructions.iter().map(opcode).collect();
        assert_eq!(ops, [Op::Store, Op::Branch]);
        assert_eq!(id_operand(terminator(block), 0), merge);
    }
    assert_eq!(opcode(terminator(block_with_label(function, merge))), Op::Return);
}

/// ```wgsl
/// fn spin(x: i32) {
///     loop {
///         switch x {
///             case 0: { continue; }
///             default: { break; }
///         }
///     }
/// }
/// ```
#[test]
fn break_targets_innermost_switch_and_continue_targets_loop() {
    let mut module = Module::default();
    let i32_ty = scalar(&mut module, Scalar::I32);

    let mut function = Function::new("spin");
    function.arguments.push(FunctionArgument {
        name: Some("x".into()),
        ty: i32_ty,
        binding: None,
    });
    let x = function.add_expression(Expression::FunctionArgument(0), i32_ty);
    function.body = vec![Statement::Loop {
        body: vec![Statement::Switch {
            selector: x,
            cases: vec![
                SwitchCase {
                    values: vec![SwitchValue::I32(0)],
                    body: vec![Statement::Continue],
                },
                SwitchCase {
                    values: vec![SwitchValue::Default],
                    body: vec![Statement::Break],
                },
            ],
        }],
        continuing: Vec::new(),
        break_if: None,
    }];
    module.functions.append(function);

    let spv = parse(&compile(&module));
    let function = &spv.functions[0];
    let header = function
        .blocks
        .iter()
        .find(|b| b.instructions.iter().any(|i| opcode(i) == Op::LoopMerge))
        .expect("loop header");
    let loop_merge = &header.instructions[header.instructions.len() - 2];
    let continue_target = id_operand(loop_merge, 1);

    let selection = function
        .blocks
        .iter()
        .find(|b| opcode(terminator(b)) == Op::Switch)
        .expect("switch block");
    let switch_merge = id_operand(&selection.instructions[selection.instructions.len() - 2], 0);
    let switch = terminator(selection);
    let default_label = id_operand(switch, 1);
    let case_label = id_operand(switch, 3);

    let case = terminator(block_with_label(function, case_label));
    assert_eq!(opcode(case), Op::Branch);
    assert_eq!(id_operand(case, 0), continue_target);

    let default = terminator(block_with_label(function, default_label));
    assert_eq!(opcode(default), Op::Branch);
    assert_eq!(id_operand(default, 0), switch_merge);

    // The loop body falls through to the continue block after the switch.
    let after_switch = terminator(block_with_label(function, switch_merge));
    assert_eq!(id_operand(after_switch, 0), continue_target);
    let back_edge = terminator(block_with_label(function, continue_target));
    assert_eq!(id_operand(back_edge, 0), label(header));
}

/// ```wgsl
/// fn f() {}
/// ```
#[test]
fn void_function_declares_void_type_right_after_memory_model() {
    let mut module = Module::default();
    module.functions.append(Function::new("f"));

    let words = compile_without_names(&module);
    // header, OpCapability Shader, OpMemoryModel, then the globals section.
    assert_eq!(words[10..12], [(2 << 16) | Op::TypeVoid as u32, 2]);
    assert_eq!(words[12] & 0xffff, Op::TypeFunction as u32);

    let spv = parse(&words);
    assert_eq!(spv.functions.len(), 1);
    let ops: Vec<Op> = body_instructions(&spv).into_iter().map(opcode).collect();
    assert_eq!(ops, [Op::Return]);
}

enum SideEffect {
    Call,
    Store,
}

/// ```wgsl
/// var<private> x: bool;
/// fn bump() { x = true; }
/// fn check() -> bool {
///     let y = x;
///     bump();          // or `x = false;`
///     return true && y;
/// }
/// ```
fn read_across(effect: SideEffect) -> rspirv::dr::Module {
    let mut flags = bool_globals(&["x"]);

    let mut bump = Function::new("bump");
    let x_ptr = bump.add_expression(Expression::GlobalVariable(flags.globals[0]), flags.bool_ptr);
    let yes = bump.add_expression(Expression::Literal(Literal::Bool(true)), flags.bool_ty);
    bump.body = vec![Statement::Store {
        pointer: x_ptr,
        value: yes,
    }];
    let bump = flags.module.functions.append(bump);

    let mut function = Function::new("check");
    function.result = Some(FunctionResult {
        ty: flags.bool_ty,
        binding: None,
    });
    let x_ptr = function.add_expression(Expression::GlobalVariable(flags.globals[0]), flags.bool_ptr);
    let y = load_global(&mut function, &flags, 0);
    let read = emit_since(&function, 0);
    let effect = match effect {
        SideEffect::Call => Statement::Call {
            function: bump,
            arguments: Vec::new(),
            result: None,
        },
        SideEffect::Store => {
            let no = function.add_expression(Expression::Literal(Literal::Bool(false)), flags.bool_ty);
            Statement::Store {
                pointer: x_ptr,
                value: no,
            }
        }
    };
    let yes = function.add_expression(Expression::Literal(Literal::Bool(true)), flags.bool_ty);
    let start = function.expressions.len();
    let both = function.add_expression(
        Expression::Binary {
            op: BinaryOp::LogicalAnd,
            left: yes,
            right: y,
        },
        flags.bool_ty,
    );
    function.body = vec![
        read,
        effect,
        emit_since(&function, start),
        Statement::Return { value: Some(both) },
    ];
    flags.module.functions.append(function);

    parse(&compile(&flags.module))
}

fn check_ops(spv: &rspirv::dr::Module) -> Vec<Op> {
    spv.functions[1]
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .map(opcode)
        .collect()
}

#[test]
fn right_operand_read_before_a_call_stays_before_it() {
    let spv = read_across(SideEffect::Call);
    let ops = check_ops(&spv);
    let load = ops.iter().position(|&op| op == Op::Load).expect("load");
    let call = ops.iter().position(|&op| op == Op::FunctionCall).expect("call");
    assert!(load < call, "{ops:?}");

    // The right-hand block has nothing left to evaluate.
    let blocks = &spv.functions[1].blocks;
    assert_eq!(blocks.len(), 3);
    let rhs: Vec<Op> = blocks[1].instructions.iter().map(opcode).collect();
    assert_eq!(rhs, [Op::Branch]);
}

#[test]
fn right_operand_read_before_a_store_stays_before_it() {
    let spv = read_across(SideEffect::Store);
    let ops = check_ops(&spv);
    let load = ops.iter().position(|&op| op == Op::Load).expect("load");
    let store = ops.iter().position(|&op| op == Op::Store).expect("store");
    assert!(load < store, "{ops:?}");
    assert_eq!(ops.iter().filter(|&&op| op == Op::Load).count(), 1);
}

/// ```wgsl
/// var<private> done: bool;
/// fn wait() {
///     loop {
///         continuing { break if done; }
///     }
/// }
/// ```
#[test]
fn break_if_exits_from_the_continue_block() {
    let mut flags = bool_globals(&["done"]);
    let mut function = Function::new("wait");
    let done = load_global(&mut function, &flags, 0);
    function.body = vec![Statement::Loop {
        body: Vec::new(),
        continuing: vec![emit_since(&function, 0)],
        break_if: Some(done),
    }];
    flags.module.functions.append(function);

    let spv = parse(&compile(&flags.module));
    let function = &spv.functions[0];
    let header = function
        .blocks
        .iter()
        .find(|b| b.instructions.iter().any(|i| opcode(i) == Op::LoopMerge))
        .expect("loop header");
    let loop_merge = &header.instructions[header.instructions.len() - 2];
    let merge = id_operand(loop_merge, 0);
    let continue_target = id_operand(loop_merge, 1);

    let continuing = block_with_label(function, continue_target);
    let ops: Vec<Op> = continuing.instructions.iter().map(opcode).collect();
    assert_eq!(ops, [Op::Load, Op::BranchConditional]);
    let back_edge = terminator(continuing);
    assert_eq!(id_operand(back_edge, 0), continuing.instructions[0].result_id.unwrap());
    assert_eq!(id_operand(back_edge, 1), merge);
    assert_eq!(id_operand(back_edge, 2), label(header));

    assert_eq!(opcode(terminator(block_with_label(function, merge))), Op::Return);
}

/// ```wgsl
/// fn sign(x: bool) -> i32 {
///     if x { return 1; } else { return 2; }
/// }
/// ```
#[test]
fn if_with_both_branches_returning_still_emits_its_merge_block() {
    let mut module = Module::default();
    let bool_ty = scalar(&mut module, Scalar::BOOL);
    let i32_ty = scalar(&mut module, Scalar::I32);

    let mut function = Function::new("sign");
    function.arguments.push(FunctionArgument {
        name: Some("x".into()),
        ty: bool_ty,
        binding: None,
    });
    function.result = Some(FunctionResult {
        ty: i32_ty,
        binding: None,
    });
    let x = function.add_expression(Expression::FunctionArgument(0), bool_ty);
    let one = function.add_expression(Expression::Literal(Literal::I32(1)), i32_ty);
    let two = function.add_expression(Expression::Literal(Literal::I32(2)), i32_ty);
    function.body = vec![Statement::If {
        condition: x,
        accept: vec![Statement::Return { value: Some(one) }],
        reject: vec![Statement::Return { value: Some(two) }],
    }];
    module.functions.append(function);

    let spv = parse(&compile(&module));
    let function = &spv.functions[0];
    assert_eq!(function.blocks.len(), 4);

    let entry = &function.blocks[0];
    let selection_merge = &entry.instructions[entry.instructions.len() - 2];
    assert_eq!(opcode(selection_merge), Op::SelectionMerge);
    let merge = id_operand(selection_merge, 0);

    let branch = terminator(entry);
    assert_eq!(opcode(branch), Op::BranchConditional);
    for operand in [1, 2] {
        let arm = terminator(block_with_label(function, id_operand(branch, operand)));
        assert_eq!(opcode(arm), Op::ReturnValue);
    }

    // Unreachable, but the merge label must still name a block.
    assert_eq!(label(&function.blocks[3]), merge);
    assert_eq!(opcode(terminator(&function.blocks[3])), Op::ReturnValue);
}

/// ```wgsl
/// var<private> flag: bool;
/// fn stop() {
///     return;
///     flag = true;
/// }
/// ```
#[test]
fn code_after_return_lands_in_a_fresh_unreferenced_block() {
    let mut flags = bool_globals(&["flag"]);
    let mut function = Function::new("stop");
    let flag = function.add_expression(Expression::GlobalVariable(flags.globals[0]), flags.bool_ptr);
    let yes = function.add_expression(Expression::Literal(Literal::Bool(true)), flags.bool_ty);
    function.body = vec![
        Statement::Return { value: None },
        Statement::Store {
            pointer: flag,
            value: yes,
        },
    ];
    flags.module.functions.append(function);

    let spv = parse(&compile(&flags.module));
    let blocks = &spv.functions[0].blocks;
    assert_eq!(blocks.len(), 2);
    let first: Vec<Op> = blocks[0].instructions.iter().map(opcode).collect();
    assert_eq!(first, [Op::Return]);
    let second: Vec<Op> = blocks[1].instructions.iter().map(opcode).collect();
    assert_eq!(second, [Op::Store, Op::Return]);

    let fresh = label(&blocks[1]);
    let referenced = body_instructions(&spv)
        .into_iter()
        .flat_map(|i| i.operands.iter())
        .any(|operand| *operand == rspirv::dr::Operand::IdRef(fresh));
    assert!(!referenced);
}
