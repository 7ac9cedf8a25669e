use kiln_backend_core::{Backend, BackendError, BackendOptions, BackendOutput};
use kiln_backend_spirv::SpirvBackend;
use rspirv::dr;
use spirv::Op;

/// Parse WGSL source and compile it to SPIR-V with the given options.
#[allow(dead_code)]
pub fn compile_wgsl(source: &str, opts: &BackendOptions) -> BackendOutput {
    try_compile_wgsl(source, opts).expect("backend compilation failed")
}

/// Like `compile_wgsl` but returns the backend error instead of panicking.
#[allow(dead_code)]
pub fn try_compile_wgsl(source: &str, opts: &BackendOptions) -> Result<BackendOutput, BackendError> {
    let module = kiln_parser::parse(source).expect("WGSL parse failed");
    SpirvBackend.compile(&module, opts)
}

/// Load a demo shader by name (without extension).
#[allow(dead_code)]
pub fn load_demo(name: &str) -> String {
    let path = format!("{}/../../demos/{name}.wgsl", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to load {path}: {e}"))
}

/// Words of the first module in a `BackendOutput`.
#[allow(dead_code)]
pub fn first_words(output: &BackendOutput) -> &[u32] {
    &output.files[0].words
}

/// Compile a demo with default options and load the result with rspirv.
#[allow(dead_code)]
pub fn demo_module(name: &str) -> dr::Module {
    let output = compile_wgsl(&load_demo(name), &BackendOptions::default());
    load(first_words(&output))
}

/// Load a word stream with rspirv and check its block structure.
#[allow(dead_code)]
pub fn load(words: &[u32]) -> dr::Module {
    let module = rspirv::dr::load_words(words).expect("rspirv failed to load module");
    check_blocks(&module);
    module
}

#[allow(dead_code)]
pub fn count(module: &dr::Module, op: Op) -> usize {
    module
        .all_inst_iter()
        .filter(|inst| inst.class.opcode == op)
        .count()
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

/// Every block ends in its only terminator; merges sit right before it.
#[allow(dead_code)]
pub fn check_blocks(module: &dr::Module) {
    for function in &module.functions {
        for block in &function.blocks {
            let ops: Vec<Op> = block.instructions.iter().map(|i| i.class.opcode).collect();
            let Some((&last, rest)) = ops.split_last() else {
                panic!("empty block in function");
            };
            assert!(is_terminator(last), "block ends in {last:?}");
            assert!(!rest.iter().any(|&op| is_terminator(op)), "terminator mid-block");
            if let Some(pos) = rest
                .iter()
                .position(|&op| matches!(op, Op::SelectionMerge | Op::LoopMerge))
            {
                assert_eq!(pos, rest.len() - 1, "merge instruction not before branch");
            }
        }
    }
}
