//! Operation lowering table.
//!
//! Maps IR operators, math functions and conversions to SPIR-V opcodes or
//! `GLSL.std.450` instructions, given the operand types. Anything without
//! a rule is reported as [`Error::UnsupportedOperation`].

use kiln_ir::{BinaryOp, Bytes, MathFunction, Scalar, ScalarKind, TypeInner, UnaryOp};
use spirv::{GLOp, Op};

use crate::error::Error;

/// How the operands feed the chosen instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arrangement {
    /// `op left right`
    Normal,
    /// `op right left`
    Swapped,
    /// The scalar left operand is splatted to the right operand's size.
    SplatLeft,
    /// The scalar right operand is splatted to the left operand's size.
    SplatRight,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BinaryLowering {
    pub op: Op,
    pub arrangement: Arrangement,
}

impl BinaryLowering {
    fn normal(op: Op) -> Self {
        Self {
            op,
            arrangement: Arrangement::Normal,
        }
    }
}

/// Operand shape, as far as the table cares.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Shape {
    Scalar,
    Vector,
    Matrix,
}

fn describe(ty: &TypeInner) -> String {
    match *ty {
        TypeInner::Scalar(s) => format!("{s}"),
        TypeInner::Vector { size, scalar } => format!("vec{size}<{scalar}>"),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!("mat{columns}x{rows}<{scalar}>"),
        TypeInner::Atomic(s) => format!("atomic<{s}>"),
        TypeInner::Pointer { .. } => "pointer".into(),
        TypeInner::Array { .. } => "array".into(),
        TypeInner::Struct { .. } => "struct".into(),
    }
}

fn classify(ty: &TypeInner) -> Result<(Shape, Scalar), Error> {
    match *ty {
        TypeInner::Scalar(s) => Ok((Shape::Scalar, s)),
        TypeInner::Vector { scalar, .. } => Ok((Shape::Vector, scalar)),
        TypeInner::Matrix { scalar, .. } => Ok((Shape::Matrix, scalar)),
        ref other => Err(Error::unsupported(format!(
            "operand of type {}",
            describe(other)
        ))),
    }
}

pub fn binary_op(op: BinaryOp, left: &TypeInner, right: &TypeInner) -> Result<BinaryLowering, Error> {
    let (lshape, lscalar) = classify(left)?;
    let (rshape, _) = classify(right)?;
    let kind = lscalar.kind;
    let unsupported = || {
        Err(Error::unsupported(format!(
            "{op:?} on {} and {}",
            describe(left),
            describe(right)
        )))
    };

    use Arrangement::*;
    use Shape::{Matrix, Scalar as S, Vector};

    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Divide | BinaryOp::Modulo => {
            let opcode = match (op, kind) {
                (_, ScalarKind::Bool) => return unsupported(),
                (BinaryOp::Add, ScalarKind::Float) => Op::FAdd,
                (BinaryOp::Add, _) => Op::IAdd,
                (BinaryOp::Subtract, ScalarKind::Float) => Op::FSub,
                (BinaryOp::Subtract, _) => Op::ISub,
                (BinaryOp::Divide, ScalarKind::Float) => Op::FDiv,
                (BinaryOp::Divide, ScalarKind::Sint) => Op::SDiv,
                (BinaryOp::Divide, _) => Op::UDiv,
                (_, ScalarKind::Float) => Op::FRem,
                (_, ScalarKind::Sint) => Op::SRem,
                (_, _) => Op::UMod,
            };
            let arrangement = match (lshape, rshape) {
                (S, S) | (Vector, Vector) => Normal,
                (Vector, S) => SplatRight,
                (S, Vector) => SplatLeft,
                _ => return unsupported(),
            };
            Ok(BinaryLowering {
                op: opcode,
                arrangement,
            })
        }
        BinaryOp::Multiply => {
            let float = kind == ScalarKind::Float;
            let (opcode, arrangement) = match (lshape, rshape) {
                _ if kind == ScalarKind::Bool => return unsupported(),
                (S, S) | (Vector, Vector) => (if float { Op::FMul } else { Op::IMul }, Normal),
                (Vector, S) if float => (Op::VectorTimesScalar, Normal),
                (S, Vector) if float => (Op::VectorTimesScalar, Swapped),
                (Vector, S) => (Op::IMul, SplatRight),
                (S, Vector) => (Op::IMul, SplatLeft),
                (Matrix, S) if float => (Op::MatrixTimesScalar, Normal),
                (S, Matrix) if float => (Op::MatrixTimesScalar, Swapped),
                (Matrix, Vector) if float => (Op::MatrixTimesVector, Normal),
                (Vector, Matrix) if float => (Op::VectorTimesMatrix, Normal),
                (Matrix, Matrix) if float => (Op::MatrixTimesMatrix, Normal),
                _ => return unsupported(),
            };
            Ok(BinaryLowering { op: opcode, arrangement })
        }
        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::Less
        | BinaryOp::LessEqual
        | BinaryOp::Greater
        | BinaryOp::GreaterEqual => {
            if lshape != rshape || lshape == Matrix {
                return unsupported();
            }
            let opcode = match (kind, op) {
                (ScalarKind::Bool, BinaryOp::Equal) => Op::LogicalEqual,
                (ScalarKind::Bool, BinaryOp::NotEqual) => Op::LogicalNotEqual,
                (ScalarKind::Bool, _) => return unsupported(),
                (ScalarKind::Float, BinaryOp::Equal) => Op::FOrdEqual,
                (ScalarKind::Float, BinaryOp::NotEqual) => Op::FUnordNotEqual,
                (ScalarKind::Float, BinaryOp::Less) => Op::FOrdLessThan,
                (ScalarKind::Float, BinaryOp::LessEqual) => Op::FOrdLessThanEqual,
                (ScalarKind::Float, BinaryOp::Greater) => Op::FOrdGreaterThan,
                (ScalarKind::Float, _) => Op::FOrdGreaterThanEqual,
                (_, BinaryOp::Equal) => Op::IEqual,
                (_, BinaryOp::NotEqual) => Op::INotEqual,
                (ScalarKind::Sint, BinaryOp::Less) => Op::SLessThan,
                (ScalarKind::Sint, BinaryOp::LessEqual) => Op::SLessThanEqual,
                (ScalarKind::Sint, BinaryOp::Greater) => Op::SGreaterThan,
                (ScalarKind::Sint, _) => Op::SGreaterThanEqual,
                (_, BinaryOp::Less) => Op::ULessThan,
                (_, BinaryOp::LessEqual) => Op::ULessThanEqual,
                (_, BinaryOp::Greater) => Op::UGreaterThan,
                (_, _) => Op::UGreaterThanEqual,
            };
            Ok(BinaryLowering::normal(opcode))
        }
        BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr | BinaryOp::BitwiseXor => {
            if lshape != rshape || lshape == Matrix {
                return unsupported();
            }
            let opcode = match (kind, op) {
                (ScalarKind::Bool, BinaryOp::BitwiseAnd) => Op::LogicalAnd,
                (ScalarKind::Bool, BinaryOp::BitwiseOr) => Op::LogicalOr,
                (ScalarKind::Bool, _) => Op::LogicalNotEqual,
                (ScalarKind::Float, _) => return unsupported(),
                (_, BinaryOp::BitwiseAnd) => Op::BitwiseAnd,
                (_, BinaryOp::BitwiseOr) => Op::BitwiseOr,
                (_, _) => Op::BitwiseXor,
            };
            Ok(BinaryLowering::normal(opcode))
        }
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
            if lshape != rshape || lshape == Matrix {
                return unsupported();
            }
            let opcode = match (kind, op) {
                (ScalarKind::Sint | ScalarKind::Uint, BinaryOp::ShiftLeft) => {
                    Op::ShiftLeftLogical
                }
                (ScalarKind::Sint, _) => Op::ShiftRightArithmetic,
                (ScalarKind::Uint, _) => Op::ShiftRightLogical,
                _ => return unsupported(),
            };
            Ok(BinaryLowering::normal(opcode))
        }
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => Err(Error::internal(
            "short-circuit operators are lowered as control flow",
        )),
    }
}

pub fn unary_op(op: UnaryOp, operand: &TypeInner) -> Result<Op, Error> {
    let (shape, scalar) = classify(operand)?;
    match (op, scalar.kind) {
        (UnaryOp::Negate, ScalarKind::Float) => Ok(Op::FNegate),
        (UnaryOp::Negate, ScalarKind::Sint | ScalarKind::Uint) if shape != Shape::Matrix => {
            Ok(Op::SNegate)
        }
        (UnaryOp::LogicalNot, ScalarKind::Bool) => Ok(Op::LogicalNot),
        (UnaryOp::BitwiseNot, ScalarKind::Sint | ScalarKind::Uint) => Ok(Op::Not),
        _ => Err(Error::unsupported(format!(
            "{op:?} on {}",
            describe(operand)
        ))),
    }
}

/// How a math function is emitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MathLowering {
    /// `OpExtInst GLSL.std.450 <op> args...`
    Ext(GLOp),
    /// A core instruction taking the arguments in order.
    Core(Op),
    /// `FClamp(x, 0, 1)`.
    Saturate,
    /// The argument itself.
    Identity,
}

pub fn math_op(fun: MathFunction, arg: &TypeInner) -> Result<MathLowering, Error> {
    use MathLowering::{Core, Ext};

    let (_, scalar) = classify(arg)?;
    let kind = scalar.kind;
    let float = kind == ScalarKind::Float;
    let unsupported = || {
        Err(Error::unsupported(format!(
            "{fun:?} on {}",
            describe(arg)
        )))
    };
    if kind == ScalarKind::Bool {
        return unsupported();
    }

    let lowering = match fun {
        MathFunction::Abs => match kind {
            ScalarKind::Float => Ext(GLOp::FAbs),
            ScalarKind::Sint => Ext(GLOp::SAbs),
            _ => MathLowering::Identity,
        },
        MathFunction::Min => Ext(match kind {
            ScalarKind::Float => GLOp::FMin,
            ScalarKind::Sint => GLOp::SMin,
            _ => GLOp::UMin,
        }),
        MathFunction::Max => Ext(match kind {
            ScalarKind::Float => GLOp::FMax,
            ScalarKind::Sint => GLOp::SMax,
            _ => GLOp::UMax,
        }),
        MathFunction::Clamp => Ext(match kind {
            ScalarKind::Float => GLOp::FClamp,
            ScalarKind::Sint => GLOp::SClamp,
            _ => GLOp::UClamp,
        }),
        MathFunction::Sign => match kind {
            ScalarKind::Float => Ext(GLOp::FSign),
            ScalarKind::Sint => Ext(GLOp::SSign),
            _ => return unsupported(),
        },
        MathFunction::Dot if float => Core(Op::Dot),
        MathFunction::Transpose if float => Core(Op::Transpose),
        MathFunction::Saturate if float => MathLowering::Saturate,
        _ if !float => return unsupported(),
        MathFunction::Floor => Ext(GLOp::Floor),
        MathFunction::Ceil => Ext(GLOp::Ceil),
        MathFunction::Round => Ext(GLOp::RoundEven),
        MathFunction::Fract => Ext(GLOp::Fract),
        MathFunction::Trunc => Ext(GLOp::Trunc),
        MathFunction::Sin => Ext(GLOp::Sin),
        MathFunction::Cos => Ext(GLOp::Cos),
        MathFunction::Tan => Ext(GLOp::Tan),
        MathFunction::Asin => Ext(GLOp::Asin),
        MathFunction::Acos => Ext(GLOp::Acos),
        MathFunction::Atan => Ext(GLOp::Atan),
        MathFunction::Atan2 => Ext(GLOp::Atan2),
        MathFunction::Sinh => Ext(GLOp::Sinh),
        MathFunction::Cosh => Ext(GLOp::Cosh),
        MathFunction::Tanh => Ext(GLOp::Tanh),
        MathFunction::Radians => Ext(GLOp::Radians),
        MathFunction::Degrees => Ext(GLOp::Degrees),
        MathFunction::Sqrt => Ext(GLOp::Sqrt),
        MathFunction::InverseSqrt => Ext(GLOp::InverseSqrt),
        MathFunction::Log => Ext(GLOp::Log),
        MathFunction::Log2 => Ext(GLOp::Log2),
        MathFunction::Exp => Ext(GLOp::Exp),
        MathFunction::Exp2 => Ext(GLOp::Exp2),
        MathFunction::Pow => Ext(GLOp::Pow),
        MathFunction::Cross => Ext(GLOp::Cross),
        MathFunction::Normalize => Ext(GLOp::Normalize),
        MathFunction::Length => Ext(GLOp::Length),
        MathFunction::Distance => Ext(GLOp::Distance),
        MathFunction::Determinant => Ext(GLOp::Determinant),
        MathFunction::Reflect => Ext(GLOp::Reflect),
        MathFunction::Mix => Ext(GLOp::FMix),
        MathFunction::Step => Ext(GLOp::Step),
        MathFunction::SmoothStep => Ext(GLOp::SmoothStep),
        MathFunction::Fma => Ext(GLOp::Fma),
        MathFunction::Dot | MathFunction::Transpose | MathFunction::Saturate => {
            return unsupported();
        }
    };
    Ok(lowering)
}

/// How an `As` expression is emitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Conversion {
    /// Same kind and width: the operand itself.
    Identity,
    /// A single conversion or bitcast instruction.
    Op(Op),
    /// `OpSelect cond 1 0` in the target type.
    BoolToNumber,
    /// Compare against zero with the given opcode.
    NumberToBool(Op),
}

/// `convert` is the target width for a numeric conversion, `None` for a bitcast.
pub fn conversion(source: Scalar, kind: ScalarKind, convert: Option<Bytes>) -> Result<Conversion, Error> {
    let unsupported = || {
        Err(Error::unsupported(format!(
            "conversion from {:?}{} to {kind:?} ({convert:?})",
            source.kind,
            source.width * 8
        )))
    };

    let Some(width) = convert else {
        return match (source.kind, kind) {
            (ScalarKind::Bool, _) | (_, ScalarKind::Bool) => unsupported(),
            (a, b) if a == b => Ok(Conversion::Identity),
            _ => Ok(Conversion::Op(Op::Bitcast)),
        };
    };

    let target = Scalar { kind, width };
    if target == source {
        return Ok(Conversion::Identity);
    }
    let same_width = source.width == width;
    let lowering = match (source.kind, kind) {
        (ScalarKind::Bool, ScalarKind::Bool) => Conversion::Identity,
        (ScalarKind::Bool, _) => Conversion::BoolToNumber,
        (ScalarKind::Float, ScalarKind::Bool) => Conversion::NumberToBool(Op::FUnordNotEqual),
        (_, ScalarKind::Bool) => Conversion::NumberToBool(Op::INotEqual),
        (ScalarKind::Float, ScalarKind::Float) => Conversion::Op(Op::FConvert),
        (ScalarKind::Float, ScalarKind::Sint) => Conversion::Op(Op::ConvertFToS),
        (ScalarKind::Float, ScalarKind::Uint) => Conversion::Op(Op::ConvertFToU),
        (ScalarKind::Sint, ScalarKind::Float) => Conversion::Op(Op::ConvertSToF),
        (ScalarKind::Uint, ScalarKind::Float) => Conversion::Op(Op::ConvertUToF),
        (ScalarKind::Sint | ScalarKind::Uint, _) if same_width => Conversion::Op(Op::Bitcast),
        (ScalarKind::Sint, _) => Conversion::Op(Op::SConvert),
        (ScalarKind::Uint, _) => Conversion::Op(Op::UConvert),
    };
    Ok(lowering)
}
