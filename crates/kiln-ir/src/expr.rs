//! Expressions: values computed without side effects.

use crate::arena::Handle;
use crate::types::{Bytes, Scalar, ScalarKind, Type, VectorSize};

/// A vector swizzle component.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum SwizzleComponent {
    X = 0,
    Y = 1,
    Z = 2,
    W = 3,
}

/// A literal constant value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Literal {
    /// Returns the scalar type of this literal.
    pub fn scalar(&self) -> Scalar {
        match *self {
            Self::Bool(_) => Scalar::BOOL,
            Self::I32(_) => Scalar::I32,
            Self::U32(_) => Scalar::U32,
            Self::I64(_) => Scalar::I64,
            Self::U64(_) => Scalar::U64,
            Self::F32(_) => Scalar::F32,
            Self::F64(_) => Scalar::F64,
        }
    }

    /// The value as an array/struct index, if it is a non-negative integer.
    pub fn as_index(&self) -> Option<u32> {
        match *self {
            Self::I32(v) => u32::try_from(v).ok(),
            Self::U32(v) => Some(v),
            Self::I64(v) => u32::try_from(v).ok(),
            Self::U64(v) => u32::try_from(v).ok(),
            Self::Bool(_) | Self::F32(_) | Self::F64(_) => None,
        }
    }
}

/// A unary operator.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitwiseNot,
}

/// A binary operator.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// Short-circuiting `&&`.
    LogicalAnd,
    /// Short-circuiting `||`.
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    /// `&&` and `||`, whose right operand is evaluated conditionally.
    pub fn is_short_circuit(self) -> bool {
        matches!(self, Self::LogicalAnd | Self::LogicalOr)
    }
}

/// A built-in math function.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum MathFunction {
    // Component-wise
    Abs,
    Min,
    Max,
    Clamp,
    Saturate,
    Sign,
    // Rounding
    Floor,
    Ceil,
    Round,
    Fract,
    Trunc,
    // Trigonometric
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Radians,
    Degrees,
    // Exponential
    Sqrt,
    InverseSqrt,
    Log,
    Log2,
    Exp,
    Exp2,
    Pow,
    // Linear algebra
    Dot,
    Cross,
    Normalize,
    Length,
    Distance,
    Transpose,
    Determinant,
    Reflect,
    // Interpolation
    Mix,
    Step,
    SmoothStep,
    // Fused multiply-add
    Fma,
}

impl MathFunction {
    /// Number of operands the function takes.
    pub fn argument_count(self) -> usize {
        match self {
            Self::Clamp | Self::Mix | Self::SmoothStep | Self::Fma => 3,
            Self::Min
            | Self::Max
            | Self::Atan2
            | Self::Pow
            | Self::Dot
            | Self::Cross
            | Self::Distance
            | Self::Reflect
            | Self::Step => 2,
            _ => 1,
        }
    }
}

/// An atomic read-modify-write operation.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum AtomicFunction {
    Add,
    Subtract,
    And,
    ExclusiveOr,
    InclusiveOr,
    Min,
    Max,
    Exchange { compare: Option<Handle<Expression>> },
}

/// An expression: a value with no side effects.
///
/// Expressions live in per-function or module-level arenas and are
/// referenced by [`Handle<Expression>`]. Every expression has a resolved
/// type recorded next to it (see [`crate::Function::expression_types`]).
#[derive(Clone, Debug)]
pub enum Expression {
    /// A literal constant.
    Literal(Literal),
    /// A module-scope constant expression, by handle into
    /// [`crate::Module::global_expressions`].
    Constant(Handle<Expression>),
    /// A zero value of the given type.
    ZeroValue(Handle<Type>),
    /// The value of a pipeline-overridable constant.
    Override(Handle<crate::Override>),
    /// Construct a composite type from components.
    Compose {
        ty: Handle<Type>,
        components: Vec<Handle<Expression>>,
    },
    /// Reference to a function argument by index.
    FunctionArgument(u32),
    /// Reference to a global variable (produces a pointer).
    GlobalVariable(Handle<crate::GlobalVariable>),
    /// Reference to a local variable (produces a pointer).
    LocalVariable(Handle<crate::LocalVariable>),
    /// Load a value through a pointer.
    Load { pointer: Handle<Expression> },
    /// Index into an array, vector or matrix (value or pointer) by a computed index.
    Access {
        base: Handle<Expression>,
        index: Handle<Expression>,
    },
    /// Index into a composite (value or pointer) by a known index.
    AccessIndex {
        base: Handle<Expression>,
        index: u32,
    },
    /// Swizzle vector components.
    Swizzle {
        size: VectorSize,
        vector: Handle<Expression>,
        pattern: [SwizzleComponent; 4],
    },
    /// Broadcast a scalar to a vector.
    Splat {
        size: VectorSize,
        value: Handle<Expression>,
    },
    /// Apply a unary operator.
    Unary {
        op: UnaryOp,
        expr: Handle<Expression>,
    },
    /// Apply a binary operator.
    Binary {
        op: BinaryOp,
        left: Handle<Expression>,
        right: Handle<Expression>,
    },
    /// Select between two values based on a condition.
    Select {
        condition: Handle<Expression>,
        accept: Handle<Expression>,
        reject: Handle<Expression>,
    },
    /// Call a built-in math function.
    Math {
        fun: MathFunction,
        arg: Handle<Expression>,
        arg1: Option<Handle<Expression>>,
        arg2: Option<Handle<Expression>>,
    },
    /// Numeric conversion (`convert` is the target width) or bitcast (`None`).
    As {
        expr: Handle<Expression>,
        kind: ScalarKind,
        convert: Option<Bytes>,
    },
    /// Length of the runtime-sized array behind a pointer.
    ArrayLength(Handle<Expression>),
    /// The result of a function call (paired with a `Call` statement).
    CallResult(Handle<crate::Function>),
    /// The result of an atomic operation (paired with an `Atomic` statement).
    AtomicResult { ty: Handle<Type>, comparison: bool },
}

impl Expression {
    /// The expressions this one reads, in operand order.
    pub fn operands(&self) -> Vec<Handle<Expression>> {
        match *self {
            Self::Literal(_)
            | Self::Constant(_)
            | Self::ZeroValue(_)
            | Self::Override(_)
            | Self::FunctionArgument(_)
            | Self::GlobalVariable(_)
            | Self::LocalVariable(_)
            | Self::CallResult(_)
            | Self::AtomicResult { .. } => Vec::new(),
            Self::Compose { ref components, .. } => components.clone(),
            Self::Load { pointer } => vec![pointer],
            Self::Access { base, index } => vec![base, index],
            Self::AccessIndex { base, .. } => vec![base],
            Self::Swizzle { vector, .. } => vec![vector],
            Self::Splat { value, .. } => vec![value],
            Self::Unary { expr, .. } => vec![expr],
            Self::Binary { left, right, .. } => vec![left, right],
            Self::Select {
                condition,
                accept,
                reject,
            } => vec![condition, accept, reject],
            Self::Math {
                arg, arg1, arg2, ..
            } => std::iter::once(arg).chain(arg1).chain(arg2).collect(),
            Self::As { expr, .. } => vec![expr],
            Self::ArrayLength(expr) => vec![expr],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn literal_scalars() {
        assert_eq!(Literal::F32(1.0).scalar(), Scalar::F32);
        assert_eq!(Literal::I32(-1).scalar(), Scalar::I32);
        assert_eq!(Literal::U64(42).scalar(), Scalar::U64);
        assert_eq!(Literal::Bool(true).scalar(), Scalar::BOOL);
    }

    #[test]
    fn literal_as_index() {
        assert_eq!(Literal::I32(3).as_index(), Some(3));
        assert_eq!(Literal::I32(-3).as_index(), None);
        assert_eq!(Literal::U32(9).as_index(), Some(9));
        assert_eq!(Literal::F32(1.0).as_index(), None);
    }

    #[test]
    fn short_circuit_ops() {
        assert!(BinaryOp::LogicalAnd.is_short_circuit());
        assert!(BinaryOp::LogicalOr.is_short_circuit());
        assert!(!BinaryOp::BitwiseAnd.is_short_circuit());
    }

    #[test]
    fn operands_follow_source_order() {
        let mut exprs = Arena::new();
        let a = exprs.append(Expression::Literal(Literal::F32(1.0)));
        let b = exprs.append(Expression::Literal(Literal::F32(2.0)));
        let c = exprs.append(Expression::Literal(Literal::F32(0.5)));
        let mix = Expression::Math {
            fun: MathFunction::Mix,
            arg: a,
            arg1: Some(b),
            arg2: Some(c),
        };
        assert_eq!(mix.operands(), vec![a, b, c]);
        assert_eq!(MathFunction::Mix.argument_count(), 3);

        let sub = Expression::Binary {
            op: BinaryOp::Subtract,
            left: b,
            right: a,
        };
        assert_eq!(sub.operands(), vec![b, a]);
        assert!(Expression::FunctionArgument(0).operands().is_empty());
    }
}
