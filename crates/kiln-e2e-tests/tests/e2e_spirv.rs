mod common;

use kiln_backend_core::{BackendOptions, BackendRegistry};
use kiln_backend_spirv::SpirvBackend;
use rspirv::dr::Operand;
use spirv::{BuiltIn, Capability, Decoration, ExecutionMode, ExecutionModel, Op, StorageClass};

const DEMOS: [&str; 5] = ["scale", "histogram", "tonemap", "classify", "coverage"];

fn decorations(module: &rspirv::dr::Module, decoration: Decoration) -> usize {
    module
        .annotations
        .iter()
        .filter(|inst| inst.operands.contains(&Operand::Decoration(decoration)))
        .count()
}

fn variables_in(module: &rspirv::dr::Module, class: StorageClass) -> usize {
    module
        .types_global_values
        .iter()
        .filter(|inst| {
            inst.class.opcode == Op::Variable && inst.operands[0] == Operand::StorageClass(class)
        })
        .count()
}

#[test]
fn every_demo_compiles_to_loadable_spirv() {
    for name in DEMOS {
        let output = common::compile_wgsl(&common::load_demo(name), &BackendOptions::default());
        assert_eq!(output.files.len(), 1, "{name}");
        assert_eq!(output.files[0].name, "module.spv");
        let file = &output.files[0];
        assert_eq!(file.to_bytes()[..4], spirv::MAGIC_NUMBER.to_le_bytes(), "{name}");
        // Generator word: no registered tool id.
        assert_eq!(file.words[2], 0, "{name}");

        let module = common::load(&file.words);
        let header = module.header.as_ref().expect("header");
        assert_eq!(header.version(), (1, 3), "{name}");
        assert_eq!(file.header().map(|h| h.bound), Some(header.bound), "{name}");
        assert_eq!(
            module.capabilities[0].operands,
            [Operand::Capability(Capability::Shader)],
            "{name}"
        );
        assert_eq!(count(&module, Op::MemoryModel), 1, "{name}");
        assert!(!module.entry_points.is_empty(), "{name}");
    }
}

fn count(module: &rspirv::dr::Module, op: Op) -> usize {
    common::count(module, op)
}

#[test]
fn scale_reads_uniform_and_storage_buffers() {
    let module = common::demo_module("scale");

    assert_eq!(module.entry_points.len(), 1);
    assert_eq!(
        module.entry_points[0].operands[0],
        Operand::ExecutionModel(ExecutionModel::GLCompute)
    );
    assert_eq!(
        module.execution_modes[0].operands[1],
        Operand::ExecutionMode(ExecutionMode::LocalSize)
    );

    assert_eq!(variables_in(&module, StorageClass::Uniform), 1);
    assert_eq!(variables_in(&module, StorageClass::StorageBuffer), 2);
    assert_eq!(decorations(&module, Decoration::DescriptorSet), 3);
    assert_eq!(decorations(&module, Decoration::Binding), 3);
    // Only `input` is read-only storage.
    assert_eq!(decorations(&module, Decoration::NonWritable), 1);

    assert_eq!(count(&module, Op::ArrayLength), 1);
    // `||` short-circuits through a phi.
    assert_eq!(count(&module, Op::Phi), 1);
    assert_eq!(count(&module, Op::FMul), 1);
}

#[test]
fn histogram_uses_atomics_and_barriers() {
    let module = common::demo_module("histogram");

    assert_eq!(count(&module, Op::AtomicStore), 1);
    assert_eq!(count(&module, Op::AtomicLoad), 1);
    assert_eq!(count(&module, Op::AtomicIAdd), 2);
    assert_eq!(count(&module, Op::ControlBarrier), 2);
    assert_eq!(count(&module, Op::LoopMerge), 1);
    assert_eq!(variables_in(&module, StorageClass::Workgroup), 1);
}

#[test]
fn tonemap_has_vertex_and_fragment_stages() {
    let module = common::demo_module("tonemap");

    let models: Vec<&Operand> = module.entry_points.iter().map(|e| &e.operands[0]).collect();
    assert_eq!(
        models,
        [
            &Operand::ExecutionModel(ExecutionModel::Vertex),
            &Operand::ExecutionModel(ExecutionModel::Fragment),
        ]
    );
    assert_eq!(module.execution_modes.len(), 1);
    assert_eq!(
        module.execution_modes[0].operands[1],
        Operand::ExecutionMode(ExecutionMode::OriginUpperLeft)
    );

    // Two entry points plus the `luminance` helper.
    assert_eq!(module.functions.len(), 3);
    assert_eq!(count(&module, Op::FunctionCall), 1);
    assert_eq!(count(&module, Op::Kill), 1);
    assert_eq!(count(&module, Op::Dot), 1);
    assert_eq!(count(&module, Op::ExtInstImport), 1);
    assert!(count(&module, Op::ExtInst) >= 1);
    assert!(decorations(&module, Decoration::BuiltIn) >= 2);
    assert!(decorations(&module, Decoration::Location) >= 3);
    assert!(variables_in(&module, StorageClass::Input) >= 2);
    assert!(variables_in(&module, StorageClass::Output) >= 3);
}

#[test]
fn classify_nests_loops_inside_switch() {
    let module = common::demo_module("classify");

    assert_eq!(count(&module, Op::Switch), 1);
    assert_eq!(count(&module, Op::LoopMerge), 1);
    assert_eq!(count(&module, Op::ArrayLength), 1);
    assert!(count(&module, Op::SelectionMerge) >= 3);
}

fn debug_name(module: &rspirv::dr::Module, id: u32) -> Option<&str> {
    module.debug_names.iter().find_map(|inst| match &inst.operands[..] {
        [Operand::IdRef(target), Operand::LiteralString(name)] if *target == id => {
            Some(name.as_str())
        }
        _ => None,
    })
}

fn decorated(module: &rspirv::dr::Module, decoration: Operand) -> Vec<(u32, &[Operand])> {
    module
        .annotations
        .iter()
        .filter(|inst| inst.class.opcode == Op::Decorate && inst.operands[1] == decoration)
        .filter_map(|inst| Some((inst.operands[0].id_ref_any()?, &inst.operands[2..])))
        .collect()
}

fn builtin_variables(module: &rspirv::dr::Module, builtin: BuiltIn) -> Vec<u32> {
    decorated(module, Operand::Decoration(Decoration::BuiltIn))
        .into_iter()
        .filter(|(_, rest)| *rest == [Operand::BuiltIn(builtin)])
        .map(|(id, _)| id)
        .collect()
}

fn global(module: &rspirv::dr::Module, id: u32) -> &rspirv::dr::Instruction {
    module
        .types_global_values
        .iter()
        .find(|inst| inst.result_id == Some(id))
        .unwrap_or_else(|| panic!("%{id} is not declared"))
}

#[test]
fn coverage_overrides_become_spec_constants() {
    let module = common::demo_module("coverage");

    let mut spec_ids: Vec<(&str, &[Operand])> =
        decorated(&module, Operand::Decoration(Decoration::SpecId))
            .into_iter()
            .map(|(id, rest)| (debug_name(&module, id).expect("named override"), rest))
            .collect();
    spec_ids.sort_by_key(|(name, _)| *name);
    // `@id(7)` is kept; the others take the lowest free ids in order.
    assert_eq!(
        spec_ids,
        [
            ("dither", &[Operand::LiteralBit32(1)][..]),
            ("opacity", &[Operand::LiteralBit32(0)][..]),
            ("sample_bits", &[Operand::LiteralBit32(7)][..]),
        ]
    );

    assert_eq!(count(&module, Op::SpecConstant), 2);
    assert_eq!(count(&module, Op::SpecConstantFalse), 1);
    let bits = module
        .types_global_values
        .iter()
        .find(|inst| {
            inst.class.opcode == Op::SpecConstant
                && inst.result_id.and_then(|id| debug_name(&module, id)) == Some("sample_bits")
        })
        .expect("sample_bits spec constant");
    assert_eq!(bits.operands, [Operand::LiteralBit32(0x0f)]);

    // Functions read the spec constants directly.
    for name in ["opacity", "dither", "sample_bits"] {
        let id = module
            .types_global_values
            .iter()
            .filter_map(|inst| inst.result_id)
            .find(|&id| debug_name(&module, id) == Some(name))
            .expect("override declared");
        let used = module
            .functions
            .iter()
            .flat_map(|f| &f.blocks)
            .flat_map(|b| &b.instructions)
            .any(|inst| inst.operands.contains(&Operand::IdRef(id)));
        assert!(used, "{name} is never read");
    }
}

#[test]
fn coverage_declares_invariant_position_and_sample_builtins() {
    let module = common::demo_module("coverage");

    let capabilities: Vec<&Operand> =
        module.capabilities.iter().map(|inst| &inst.operands[0]).collect();
    assert_eq!(
        capabilities,
        [
            &Operand::Capability(Capability::Shader),
            &Operand::Capability(Capability::SampleRateShading),
        ]
    );

    let positions = builtin_variables(&module, BuiltIn::Position);
    assert_eq!(positions.len(), 1);
    let invariant: Vec<u32> = decorated(&module, Operand::Decoration(Decoration::Invariant))
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(invariant, positions);

    assert_eq!(builtin_variables(&module, BuiltIn::SampleId).len(), 1);

    // Input and output masks are both `u32[1]`, reached through element 0.
    let masks = builtin_variables(&module, BuiltIn::SampleMask);
    assert_eq!(masks.len(), 2);
    for mask in masks {
        let pointer_type = global(&module, mask).result_type.expect("typed variable");
        let pointee = global(&module, pointer_type).operands[1]
            .id_ref_any()
            .expect("pointee");
        let array = global(&module, pointee);
        assert_eq!(array.class.opcode, Op::TypeArray);
        let length = array.operands[1].id_ref_any().expect("length");
        assert_eq!(global(&module, length).operands, [Operand::LiteralBit32(1)]);

        let chained = module.functions.iter().flat_map(|f| &f.blocks).any(|block| {
            block.instructions.iter().any(|inst| {
                inst.class.opcode == Op::AccessChain
                    && inst.operands[0] == Operand::IdRef(mask)
            })
        });
        assert!(chained, "mask %{mask} is not accessed through element 0");
    }
    assert_eq!(
        decorations(&module, Decoration::ArrayStride),
        0,
        "interface arrays carry no stride"
    );
}

#[test]
fn output_is_deterministic() {
    for name in DEMOS {
        let source = common::load_demo(name);
        let a = common::compile_wgsl(&source, &BackendOptions::default());
        let b = common::compile_wgsl(&source, &BackendOptions::default());
        assert_eq!(common::first_words(&a), common::first_words(&b), "{name}");
    }
}

#[test]
fn ids_stay_below_bound_and_globals_are_ordered() {
    for name in DEMOS {
        let module = common::demo_module(name);
        let bound = module.header.as_ref().expect("header").bound;
        let max = module
            .all_inst_iter()
            .filter_map(|inst| inst.result_id)
            .max()
            .unwrap_or(0);
        assert!(max < bound, "{name}: id {max} >= bound {bound}");

        let globals: Vec<u32> = module
            .types_global_values
            .iter()
            .filter_map(|inst| inst.result_id)
            .collect();
        assert!(
            globals.windows(2).all(|w| w[0] < w[1]),
            "{name}: globals out of order"
        );
    }
}

#[test]
fn debug_names_can_be_disabled() {
    let source = common::load_demo("scale");
    let named = common::load(common::first_words(&common::compile_wgsl(
        &source,
        &BackendOptions::default(),
    )));
    assert!(count(&named, Op::Name) > 0);
    assert!(count(&named, Op::MemberName) > 0);

    let opts = BackendOptions {
        debug_names: false,
        ..Default::default()
    };
    let bare = common::load(common::first_words(&common::compile_wgsl(&source, &opts)));
    assert_eq!(count(&bare, Op::Name), 0);
    assert_eq!(count(&bare, Op::MemberName), 0);
}

#[test]
fn version_selects_buffer_decoration_and_interface() {
    let source = common::load_demo("scale");
    for minor in 0..=6 {
        let opts = BackendOptions {
            spirv_version: (1, minor),
            ..Default::default()
        };
        let module = common::load(common::first_words(&common::compile_wgsl(&source, &opts)));
        assert_eq!(module.header.as_ref().unwrap().version(), (1, minor));

        let interface = module.entry_points[0].operands.len() - 3;
        if minor >= 4 {
            // gid plus the three buffers
            assert_eq!(interface, 4, "1.{minor}");
        } else {
            assert_eq!(interface, 1, "1.{minor}");
        }
        if minor >= 3 {
            assert_eq!(variables_in(&module, StorageClass::StorageBuffer), 2);
            assert_eq!(decorations(&module, Decoration::BufferBlock), 0);
        } else {
            assert_eq!(variables_in(&module, StorageClass::StorageBuffer), 0);
            assert_eq!(variables_in(&module, StorageClass::Uniform), 3);
            assert!(decorations(&module, Decoration::BufferBlock) >= 1);
        }
    }
}

#[test]
fn registry_dispatches_spirv_targets() {
    let mut registry = BackendRegistry::new();
    registry.register(Box::new(SpirvBackend));
    assert_eq!(registry.find("spirv").map(|b| b.name()), Some("SPIR-V"));
    assert_eq!(registry.find("spv").map(|b| b.name()), Some("SPIR-V"));
    assert!(registry.find("ir-dump").is_none());
}
