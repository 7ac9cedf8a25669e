//! Display implementations and the text dump used by `--emit-ir`.

use std::fmt::{self, Write as _};

use crate::Module;
use crate::arena::{Arena, Handle, UniqueArena};
use crate::expr::{
    AtomicFunction, BinaryOp, Expression, Literal, MathFunction, SwizzleComponent, UnaryOp,
};
use crate::func::{Function, ShaderStage};
use crate::global::{AddressSpace, Binding, BuiltIn, Interpolation, ResourceBinding, StorageAccess};
use crate::stmt::{Barrier, Statement, SwitchValue};
use crate::types::{ArraySize, Scalar, ScalarKind, Type, TypeInner, VectorSize};

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Sint => "sint",
            Self::Uint => "uint",
            Self::Float => "float",
        })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = u32::from(self.width) * 8;
        match self.kind {
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::Sint => write!(f, "i{bits}"),
            ScalarKind::Uint => write!(f, "u{bits}"),
            ScalarKind::Float => write!(f, "f{bits}"),
        }
    }
}

impl fmt::Display for VectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u32)
    }
}

impl fmt::Display for StorageAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let load = self.contains(StorageAccess::LOAD);
        let store = self.contains(StorageAccess::STORE);
        f.write_str(match (load, store) {
            (true, true) => "read_write",
            (true, false) => "read",
            (false, true) => "write",
            (false, false) => "none",
        })
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Private => write!(f, "private"),
            Self::Workgroup => write!(f, "workgroup"),
            Self::Uniform => write!(f, "uniform"),
            Self::Storage { access } => write!(f, "storage, {access}"),
        }
    }
}

impl fmt::Display for BuiltIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Position { .. } => "position",
            Self::VertexIndex => "vertex_index",
            Self::InstanceIndex => "instance_index",
            Self::FrontFacing => "front_facing",
            Self::FragDepth => "frag_depth",
            Self::SampleIndex => "sample_index",
            Self::SampleMask => "sample_mask",
            Self::GlobalInvocationId => "global_invocation_id",
            Self::LocalInvocationId => "local_invocation_id",
            Self::LocalInvocationIndex => "local_invocation_index",
            Self::WorkgroupId => "workgroup_id",
            Self::NumWorkgroups => "num_workgroups",
        })
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Perspective => "perspective",
            Self::Linear => "linear",
            Self::Flat => "flat",
        })
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltIn(b @ BuiltIn::Position { invariant: true }) => {
                write!(f, "@builtin({b}) @invariant")
            }
            Self::BuiltIn(b) => write!(f, "@builtin({b})"),
            Self::Location {
                location,
                interpolation: None,
            } => write!(f, "@location({location})"),
            Self::Location {
                location,
                interpolation: Some(interp),
            } => write!(f, "@location({location}) @interpolate({interp})"),
        }
    }
}

impl fmt::Display for ResourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@group({}) @binding({})", self.group, self.binding)
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "@vertex",
            Self::Fragment => "@fragment",
            Self::Compute => "@compute",
        })
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}i"),
            Self::U32(v) => write!(f, "{v}u"),
            Self::I64(v) => write!(f, "{v}li"),
            Self::U64(v) => write!(f, "{v}lu"),
            Self::F32(v) => write!(f, "{v}f"),
            Self::F64(v) => write!(f, "{v}lf"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Negate => "-",
            Self::LogicalNot => "!",
            Self::BitwiseNot => "~",
        })
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::BitwiseXor => "^",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        })
    }
}

impl fmt::Display for MathFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Clamp => "clamp",
            Self::Saturate => "saturate",
            Self::Sign => "sign",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Fract => "fract",
            Self::Trunc => "trunc",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Radians => "radians",
            Self::Degrees => "degrees",
            Self::Sqrt => "sqrt",
            Self::InverseSqrt => "inverseSqrt",
            Self::Log => "log",
            Self::Log2 => "log2",
            Self::Exp => "exp",
            Self::Exp2 => "exp2",
            Self::Pow => "pow",
            Self::Dot => "dot",
            Self::Cross => "cross",
            Self::Normalize => "normalize",
            Self::Length => "length",
            Self::Distance => "distance",
            Self::Transpose => "transpose",
            Self::Determinant => "determinant",
            Self::Reflect => "reflect",
            Self::Mix => "mix",
            Self::Step => "step",
            Self::SmoothStep => "smoothstep",
            Self::Fma => "fma",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.contains(Barrier::STORAGE);
        let workgroup = self.contains(Barrier::WORKGROUP);
        f.write_str(match (storage, workgroup) {
            (true, true) => "storageBarrier | workgroupBarrier",
            (true, false) => "storageBarrier",
            (false, true) => "workgroupBarrier",
            (false, false) => "<no barrier>",
        })
    }
}

impl fmt::Display for SwizzleComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::W => "w",
        })
    }
}

impl fmt::Display for SwitchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}i"),
            Self::U32(v) => write!(f, "{v}u"),
            Self::Default => f.write_str("default"),
        }
    }
}

impl fmt::Display for AtomicFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "atomicAdd"),
            Self::Subtract => write!(f, "atomicSub"),
            Self::And => write!(f, "atomicAnd"),
            Self::ExclusiveOr => write!(f, "atomicXor"),
            Self::InclusiveOr => write!(f, "atomicOr"),
            Self::Min => write!(f, "atomicMin"),
            Self::Max => write!(f, "atomicMax"),
            Self::Exchange { compare: None } => write!(f, "atomicExchange"),
            Self::Exchange { compare: Some(c) } => write!(f, "atomicCompareExchange({c:?})"),
        }
    }
}

/// Formats a type using the type arena for resolving inner references.
pub fn format_type(ty: &Type, types: &UniqueArena<Type>) -> String {
    match ty.name {
        Some(ref name) => name.clone(),
        None => format_type_inner(&ty.inner, types),
    }
}

/// Formats a [`TypeInner`] using the type arena for resolving references.
pub fn format_type_inner(inner: &TypeInner, types: &UniqueArena<Type>) -> String {
    match inner {
        TypeInner::Scalar(s) => format!("{s}"),
        TypeInner::Vector { size, scalar } => format!("vec{size}<{scalar}>"),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!("mat{columns}x{rows}<{scalar}>"),
        TypeInner::Atomic(s) => format!("atomic<{s}>"),
        TypeInner::Pointer { base, space } => {
            format!("ptr<{space}, {}>", format_type(&types[*base], types))
        }
        TypeInner::Array { base, size, stride } => {
            let base = format_type(&types[*base], types);
            match size {
                ArraySize::Constant(n) => format!("array<{base}, {n}> /*stride {stride}*/"),
                ArraySize::Dynamic => format!("array<{base}> /*stride {stride}*/"),
            }
        }
        TypeInner::Struct { members, span } => {
            format!("struct({} members, span {span})", members.len())
        }
    }
}

fn format_expr(handle: Handle<Expression>, exprs: &Arena<Expression>) -> String {
    match &exprs[handle] {
        Expression::Literal(lit) => format!("{lit}"),
        Expression::Constant(h) => format!("Constant({h:?})"),
        Expression::ZeroValue(ty) => format!("ZeroValue({ty:?})"),
        Expression::Override(h) => format!("Override({h:?})"),
        Expression::Compose { ty, components } => {
            let args: Vec<_> = components.iter().map(|h| format!("{h:?}")).collect();
            format!("Compose({ty:?}, [{}])", args.join(", "))
        }
        Expression::FunctionArgument(i) => format!("FunctionArgument({i})"),
        Expression::GlobalVariable(h) => format!("GlobalVariable({h:?})"),
        Expression::LocalVariable(h) => format!("LocalVariable({h:?})"),
        Expression::Load { pointer } => format!("Load({pointer:?})"),
        Expression::Access { base, index } => format!("Access({base:?}, {index:?})"),
        Expression::AccessIndex { base, index } => format!("AccessIndex({base:?}, {index})"),
        Expression::Swizzle {
            size,
            vector,
            pattern,
        } => {
            let comps: String = pattern[..*size as usize]
                .iter()
                .map(|c| c.to_string())
                .collect();
            format!("Swizzle({vector:?}).{comps}")
        }
        Expression::Splat { size, value } => format!("Splat({value:?}, vec{size})"),
        Expression::Unary { op, expr } => format!("{op}{expr:?}"),
        Expression::Binary { op, left, right } => format!("{left:?} {op} {right:?}"),
        Expression::Select {
            condition,
            accept,
            reject,
        } => format!("Select({condition:?}, {accept:?}, {reject:?})"),
        Expression::Math {
            fun,
            arg,
            arg1,
            arg2,
        } => {
            let args: Vec<_> = std::iter::once(arg)
                .chain(arg1)
                .chain(arg2)
                .map(|h| format!("{h:?}"))
                .collect();
            format!("{fun}({})", args.join(", "))
        }
        Expression::As {
            expr,
            kind,
            convert,
        } => match convert {
            Some(w) => format!("As({expr:?} -> {kind}/{w})"),
            None => format!("Bitcast({expr:?} -> {kind})"),
        },
        Expression::ArrayLength(expr) => format!("ArrayLength({expr:?})"),
        Expression::CallResult(f) => format!("CallResult({f:?})"),
        Expression::AtomicResult { ty, comparison } => {
            format!("AtomicResult({ty:?}, cmp={comparison})")
        }
    }
}

fn write_block(out: &mut String, block: &[Statement], indent: usize) {
    for stmt in block {
        write_stmt(out, stmt, indent);
    }
}

fn write_stmt(out: &mut String, stmt: &Statement, indent: usize) {
    let pad = " ".repeat(indent);
    // Writing to a String cannot fail.
    let _ = match stmt {
        Statement::Emit(range) => writeln!(out, "{pad}Emit({range:?})"),
        Statement::Block(block) => {
            let _ = writeln!(out, "{pad}Block {{");
            write_block(out, block, indent + 4);
            writeln!(out, "{pad}}}")
        }
        Statement::Store { pointer, value } => writeln!(out, "{pad}Store {pointer:?} = {value:?}"),
        Statement::If {
            condition,
            accept,
            reject,
        } => {
            let _ = writeln!(out, "{pad}If ({condition:?}) {{");
            write_block(out, accept, indent + 4);
            if !reject.is_empty() {
                let _ = writeln!(out, "{pad}}} else {{");
                write_block(out, reject, indent + 4);
            }
            writeln!(out, "{pad}}}")
        }
        Statement::Switch { selector, cases } => {
            let _ = writeln!(out, "{pad}Switch ({selector:?}) {{");
            for case in cases {
                let values: Vec<_> = case.values.iter().map(|v| v.to_string()).collect();
                let _ = writeln!(out, "{pad}  Case {}:", values.join(", "));
                write_block(out, &case.body, indent + 4);
            }
            writeln!(out, "{pad}}}")
        }
        Statement::Loop {
            body,
            continuing,
            break_if,
        } => {
            let _ = writeln!(out, "{pad}Loop {{");
            write_block(out, body, indent + 4);
            if !continuing.is_empty() || break_if.is_some() {
                let _ = writeln!(out, "{pad}  Continuing {{");
                write_block(out, continuing, indent + 8);
                if let Some(cond) = break_if {
                    let _ = writeln!(out, "{pad}    BreakIf({cond:?})");
                }
                let _ = writeln!(out, "{pad}  }}");
            }
            writeln!(out, "{pad}}}")
        }
        Statement::Call {
            function,
            arguments,
            result,
        } => {
            let args: Vec<_> = arguments.iter().map(|h| format!("{h:?}")).collect();
            let res = result.map(|r| format!(" -> {r:?}")).unwrap_or_default();
            writeln!(out, "{pad}Call {function:?}({}){res}", args.join(", "))
        }
        Statement::Atomic {
            pointer,
            fun,
            value,
            result,
        } => {
            let res = result.map(|r| format!(" -> {r:?}")).unwrap_or_default();
            writeln!(out, "{pad}{fun}({pointer:?}, {value:?}){res}")
        }
        Statement::Break => writeln!(out, "{pad}Break"),
        Statement::Continue => writeln!(out, "{pad}Continue"),
        Statement::Return { value: Some(v) } => writeln!(out, "{pad}Return {v:?}"),
        Statement::Return { value: None } => writeln!(out, "{pad}Return"),
        Statement::Kill => writeln!(out, "{pad}Kill"),
        Statement::Barrier(b) => writeln!(out, "{pad}Barrier({b})"),
    };
}

/// Produces a human-readable text dump of a [`Module`] for debugging.
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();

    out.push_str("Types:\n");
    for (handle, ty) in module.types.iter() {
        let _ = writeln!(out, "  {handle:?} {}", format_type(ty, &module.types));
    }

    if !module.overrides.is_empty() {
        out.push_str("\nOverrides:\n");
        for (handle, o) in module.overrides.iter() {
            let name = o.name.as_deref().unwrap_or("_");
            let ty = format_type(&module.types[o.ty], &module.types);
            let id = o.id.map(|id| format!("@id({id}) ")).unwrap_or_default();
            let init = o.init.map(|h| format!(" = {h:?}")).unwrap_or_default();
            let _ = writeln!(out, "  {handle:?} {id}override {name}: {ty}{init}");
        }
    }

    if !module.global_variables.is_empty() {
        out.push_str("\nGlobal Variables:\n");
        for (handle, var) in module.global_variables.iter() {
            let name = var.name.as_deref().unwrap_or("_");
            let ty = format_type(&module.types[var.ty], &module.types);
            let binding = var.binding.map(|b| format!("{b} ")).unwrap_or_default();
            let _ = writeln!(
                out,
                "  {handle:?} {binding}var<{}>  {name}: {ty}",
                var.space
            );
        }
    }

    if !module.global_expressions.is_empty() {
        out.push_str("\nGlobal Expressions:\n");
        for (handle, _) in module.global_expressions.iter() {
            let _ = writeln!(
                out,
                "  {handle:?} {}",
                format_expr(handle, &module.global_expressions)
            );
        }
    }

    if !module.functions.is_empty() {
        out.push_str("\nFunctions:\n");
        for (handle, func) in module.functions.iter() {
            dump_function(&mut out, &format!("{handle:?}"), func, &module.types);
        }
    }

    if !module.entry_points.is_empty() {
        out.push_str("\nEntry Points:\n");
        for ep in &module.entry_points {
            match ep.stage {
                ShaderStage::Compute => {
                    let [x, y, z] = ep.workgroup_size;
                    let _ = writeln!(out, "  {} @workgroup_size({x}, {y}, {z})", ep.stage);
                }
                _ => {
                    let _ = writeln!(out, "  {}", ep.stage);
                }
            }
            dump_function(&mut out, &ep.name, &ep.function, &module.types);
        }
    }

    out
}

fn dump_function(out: &mut String, label: &str, func: &Function, types: &UniqueArena<Type>) {
    let name = func.name.as_deref().unwrap_or("_");

    let args: Vec<_> = func
        .arguments
        .iter()
        .map(|arg| {
            let binding = arg.binding.map(|b| format!("{b} ")).unwrap_or_default();
            format!(
                "{binding}{}: {}",
                arg.name.as_deref().unwrap_or("_"),
                format_type(&types[arg.ty], types)
            )
        })
        .collect();
    let ret = func
        .result
        .as_ref()
        .map(|r| format!(" -> {}", format_type(&types[r.ty], types)))
        .unwrap_or_default();
    let _ = writeln!(out, "  fn {name}({})  [{label}]{ret} {{", args.join(", "));

    for (handle, var) in func.local_variables.iter() {
        let init = var
            .init
            .map(|h| format!(" = {}", format_expr(h, &func.expressions)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "    var {handle:?} {}: {}{init}",
            var.name.as_deref().unwrap_or("_"),
            format_type(&types[var.ty], types)
        );
    }

    if !func.expressions.is_empty() {
        out.push_str("    Expressions:\n");
        for (handle, _) in func.expressions.iter() {
            let ty = func
                .expression_types
                .get(handle.index())
                .map(|&ty| format_type(&types[ty], types))
                .unwrap_or_else(|| "?".into());
            let _ = writeln!(
                out,
                "      {handle:?} {} : {ty}",
                format_expr(handle, &func.expressions)
            );
        }
    }

    if !func.body.is_empty() {
        out.push_str("    Body:\n");
        write_block(out, &func.body, 6);
    }

    out.push_str("  }\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stmt::SwitchCase;
    use crate::{EntryPoint, Function};

    #[test]
    fn display_scalar() {
        assert_eq!(format!("{}", Scalar::F32), "f32");
        assert_eq!(format!("{}", Scalar::I64), "i64");
        assert_eq!(format!("{}", Scalar::F16), "f16");
        assert_eq!(format!("{}", Scalar::BOOL), "bool");
    }

    #[test]
    fn display_address_space() {
        assert_eq!(format!("{}", AddressSpace::Uniform), "uniform");
        assert_eq!(
            format!(
                "{}",
                AddressSpace::Storage {
                    access: StorageAccess::LOAD
                }
            ),
            "storage, read"
        );
    }

    #[test]
    fn display_bindings() {
        let b = Binding::BuiltIn(BuiltIn::Position { invariant: false });
        assert_eq!(format!("{b}"), "@builtin(position)");
        let b = Binding::BuiltIn(BuiltIn::Position { invariant: true });
        assert_eq!(format!("{b}"), "@builtin(position) @invariant");
        let b = Binding::BuiltIn(BuiltIn::SampleMask);
        assert_eq!(format!("{b}"), "@builtin(sample_mask)");
        let loc = Binding::Location {
            location: 1,
            interpolation: Some(Interpolation::Flat),
        };
        assert_eq!(format!("{loc}"), "@location(1) @interpolate(flat)");
        let rb = ResourceBinding {
            group: 0,
            binding: 2,
        };
        assert_eq!(format!("{rb}"), "@group(0) @binding(2)");
    }

    #[test]
    fn display_literals_and_ops() {
        assert_eq!(format!("{}", Literal::F32(3.125)), "3.125f");
        assert_eq!(format!("{}", Literal::U32(42)), "42u");
        assert_eq!(format!("{}", BinaryOp::LogicalOr), "||");
        assert_eq!(format!("{}", MathFunction::InverseSqrt), "inverseSqrt");
        assert_eq!(format!("{}", SwitchValue::Default), "default");
    }

    #[test]
    fn dump_empty_module() {
        let dump = dump_module(&Module::default());
        assert!(dump.contains("Types:"));
        assert!(!dump.contains("Entry Points:"));
    }

    #[test]
    fn dump_switch_and_kill() {
        let mut module = Module::default();
        let i32_ty = module.types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::I32),
        });
        let mut function = Function::new("fs_main");
        let sel = function.add_expression(Expression::Literal(Literal::I32(1)), i32_ty);
        function.body.push(Statement::Switch {
            selector: sel,
            cases: vec![
                SwitchCase {
                    values: vec![SwitchValue::I32(1), SwitchValue::I32(2)],
                    body: vec![Statement::Kill],
                },
                SwitchCase {
                    values: vec![SwitchValue::Default],
                    body: vec![],
                },
            ],
        });
        module.entry_points.push(EntryPoint {
            name: "fs_main".into(),
            stage: ShaderStage::Fragment,
            workgroup_size: [0; 3],
            function,
        });

        let dump = dump_module(&module);
        assert!(dump.contains("@fragment"));
        assert!(dump.contains("Case 1i, 2i:"));
        assert!(dump.contains("Kill"));
        assert!(dump.contains("1i : i32"));
    }
}
