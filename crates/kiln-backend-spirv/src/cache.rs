//! Structural deduplication of types and constants.
//!
//! Every `OpType*` and `OpConstant*` is created through a
//! [`TypeConstantCache`], which maps a structural key to the id allocated the
//! first time the key was seen. Keys refer to component types by id, so a
//! component is always resolved (and emitted) before the type using it,
//! which keeps the globals section in definition-before-use order.

use std::collections::{HashMap, HashSet};

use kiln_ir::{Literal, Scalar, ScalarKind};
use spirv::{Capability, Decoration, Op, StorageClass};

use crate::id::Id;
use crate::instruction::Instruction;
use crate::module::{Module, Section};

/// Structural description of a type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum TypeKey {
    Void,
    Scalar(Scalar),
    Vector {
        scalar: Scalar,
        size: u32,
    },
    Matrix {
        columns: u32,
        rows: u32,
        scalar: Scalar,
    },
    /// A `stride` of 0 leaves the array without `ArrayStride`.
    Array {
        element: Id,
        length: u32,
        stride: u32,
    },
    RuntimeArray {
        element: Id,
        stride: u32,
    },
    Struct(StructLayout),
    Pointer {
        class: StorageClass,
        pointee: Id,
    },
    Function {
        ret: Id,
        params: Vec<Id>,
    },
}

/// Member layout of a struct type. Names are part of the key.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct StructLayout {
    pub name: Option<String>,
    pub members: Vec<MemberLayout>,
    /// `Block` or `BufferBlock` for buffer wrapper structs.
    pub block: Option<Decoration>,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct MemberLayout {
    pub ty: Id,
    pub name: Option<String>,
    pub offset: u32,
    /// Column stride for matrix members (or arrays of matrices).
    pub matrix_stride: Option<u32>,
}

/// A constant value, normalized so equal values share a key.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    /// Raw bits of a 32-bit or narrower scalar.
    Bits32(u32),
    Bits64(u64),
    Composite(Vec<Id>),
    Null,
    /// A real `OpConstant 0`, for operands where `OpConstantNull` is not allowed.
    ExplicitZero,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
struct ConstantKey {
    ty: Id,
    value: ConstantValue,
}

/// Deduplicating table of types and constants for one module.
#[derive(Debug)]
pub struct TypeConstantCache {
    types: HashMap<TypeKey, Id>,
    constants: HashMap<ConstantKey, Id>,
    /// Every constant id, and the subset that are `OpConstantNull`.
    constant_ids: HashSet<Id>,
    null_ids: HashSet<Id>,
    /// Specialization constants; never deduplicated.
    spec_ids: HashSet<Id>,
    /// Struct ids already decorated as blocks.
    blocks: HashSet<Id>,
    debug_names: bool,
}

impl TypeConstantCache {
    pub fn new(debug_names: bool) -> Self {
        Self {
            types: HashMap::new(),
            constants: HashMap::new(),
            constant_ids: HashSet::new(),
            null_ids: HashSet::new(),
            spec_ids: HashSet::new(),
            blocks: HashSet::new(),
            debug_names,
        }
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    pub fn get_or_create_type(&mut self, module: &mut Module, key: TypeKey) -> Id {
        if let Some(&id) = self.types.get(&key) {
            return id;
        }

        // Component types first, so they get the smaller ids.
        let instruction = match key {
            TypeKey::Void => Instruction::new(Op::TypeVoid),
            TypeKey::Scalar(scalar) => {
                require_width_capability(module, scalar);
                match scalar.kind {
                    ScalarKind::Bool => Instruction::new(Op::TypeBool),
                    ScalarKind::Sint => Instruction::new(Op::TypeInt)
                        .lit(u32::from(scalar.width) * 8)
                        .lit(1),
                    ScalarKind::Uint => Instruction::new(Op::TypeInt)
                        .lit(u32::from(scalar.width) * 8)
                        .lit(0),
                    ScalarKind::Float => {
                        Instruction::new(Op::TypeFloat).lit(u32::from(scalar.width) * 8)
                    }
                }
            }
            TypeKey::Vector { scalar, size } => {
                let component = self.scalar_type(module, scalar);
                Instruction::new(Op::TypeVector).id(component).lit(size)
            }
            TypeKey::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let column = self.vector_type(module, scalar, rows);
                Instruction::new(Op::TypeMatrix).id(column).lit(columns)
            }
            TypeKey::Array { element, length, .. } => {
                let length_id = self.index_constant(module, length);
                Instruction::new(Op::TypeArray).id(element).id(length_id)
            }
            TypeKey::RuntimeArray { element, .. } => {
                Instruction::new(Op::TypeRuntimeArray).id(element)
            }
            TypeKey::Struct(ref layout) => Instruction::new(Op::TypeStruct)
                .ids(layout.members.iter().map(|member| member.ty)),
            TypeKey::Pointer { class, pointee } => Instruction::new(Op::TypePointer)
                .lit(class as u32)
                .id(pointee),
            TypeKey::Function { ret, ref params } => Instruction::new(Op::TypeFunction)
                .id(ret)
                .ids(params.iter().copied()),
        };

        let id = module.next_id();
        let Instruction { op, operands } = instruction;
        let mut with_result = Instruction::new(op).id(id);
        with_result.operands.extend(operands);
        module.push(Section::Globals, with_result);
        self.decorate_type(module, id, &key);
        self.types.insert(key, id);
        id
    }

    fn decorate_type(&mut self, module: &mut Module, id: Id, key: &TypeKey) {
        match *key {
            TypeKey::Array { stride, .. } | TypeKey::RuntimeArray { stride, .. } if stride != 0 => {
                module.push(
                    Section::Annotations,
                    Instruction::decorate(id, Decoration::ArrayStride, &[stride]),
                );
            }
            TypeKey::Struct(ref layout) => {
                if let Some(block) = layout.block {
                    self.decorate_block(module, id, block);
                }
                for (index, member) in (0u32..).zip(&layout.members) {
                    module.push(
                        Section::Annotations,
                        Instruction::member_decorate(
                            id,
                            index,
                            Decoration::Offset,
                            &[member.offset],
                        ),
                    );
                    if let Some(stride) = member.matrix_stride {
                        module.push(
                            Section::Annotations,
                            Instruction::member_decorate(id, index, Decoration::ColMajor, &[]),
                        );
                        module.push(
                            Section::Annotations,
                            Instruction::member_decorate(
                                id,
                                index,
                                Decoration::MatrixStride,
                                &[stride],
                            ),
                        );
                    }
                    if self.debug_names {
                        if let Some(name) = &member.name {
                            module.push(Section::Debug, Instruction::member_name(id, index, name));
                        }
                    }
                }
                if self.debug_names {
                    if let Some(name) = &layout.name {
                        module.push(Section::Debug, Instruction::name(id, name));
                    }
                }
            }
            _ => {}
        }
    }

    /// Decorates a struct as a buffer block, once.
    pub fn decorate_block(&mut self, module: &mut Module, struct_id: Id, decoration: Decoration) {
        if self.blocks.insert(struct_id) {
            module.push(
                Section::Annotations,
                Instruction::decorate(struct_id, decoration, &[]),
            );
        }
    }

    pub fn void_type(&mut self, module: &mut Module) -> Id {
        self.get_or_create_type(module, TypeKey::Void)
    }

    pub fn scalar_type(&mut self, module: &mut Module, scalar: Scalar) -> Id {
        self.get_or_create_type(module, TypeKey::Scalar(scalar))
    }

    pub fn bool_type(&mut self, module: &mut Module) -> Id {
        self.scalar_type(module, Scalar::BOOL)
    }

    pub fn u32_type(&mut self, module: &mut Module) -> Id {
        self.scalar_type(module, Scalar::U32)
    }

    pub fn vector_type(&mut self, module: &mut Module, scalar: Scalar, size: u32) -> Id {
        self.get_or_create_type(module, TypeKey::Vector { scalar, size })
    }

    pub fn pointer_type(&mut self, module: &mut Module, class: StorageClass, pointee: Id) -> Id {
        self.get_or_create_type(module, TypeKey::Pointer { class, pointee })
    }

    // ---------------------------------------------------------------------
    // Constants
    // ---------------------------------------------------------------------

    pub fn get_or_create_constant(
        &mut self,
        module: &mut Module,
        ty: Id,
        value: ConstantValue,
    ) -> Id {
        let value = self.normalize(value);
        let key = ConstantKey { ty, value };
        if let Some(&id) = self.constants.get(&key) {
            return id;
        }

        let id = module.next_id();
        let instruction = match key.value {
            ConstantValue::Bool(true) => Instruction::new(Op::ConstantTrue).id(ty).id(id),
            ConstantValue::Bool(false) => Instruction::new(Op::ConstantFalse).id(ty).id(id),
            ConstantValue::Bits32(bits) => Instruction::new(Op::Constant).id(ty).id(id).lit(bits),
            ConstantValue::Bits64(bits) => Instruction::new(Op::Constant)
                .id(ty)
                .id(id)
                .lit(bits as u32)
                .lit((bits >> 32) as u32),
            ConstantValue::Composite(ref parts) => Instruction::new(Op::ConstantComposite)
                .id(ty)
                .id(id)
                .ids(parts.iter().copied()),
            ConstantValue::Null => {
                self.null_ids.insert(id);
                Instruction::new(Op::ConstantNull).id(ty).id(id)
            }
            ConstantValue::ExplicitZero => Instruction::new(Op::Constant).id(ty).id(id).lit(0),
        };
        module.push(Section::Globals, instruction);
        self.constant_ids.insert(id);
        self.constants.insert(key, id);
        id
    }

    /// Zero scalars and all-null composites become `OpConstantNull`.
    fn normalize(&self, value: ConstantValue) -> ConstantValue {
        match value {
            ConstantValue::Bool(false) | ConstantValue::Bits32(0) | ConstantValue::Bits64(0) => {
                ConstantValue::Null
            }
            ConstantValue::Composite(ref parts)
                if !parts.is_empty() && parts.iter().all(|p| self.null_ids.contains(p)) =>
            {
                ConstantValue::Null
            }
            other => other,
        }
    }

    /// The constant for an IR literal.
    pub fn literal(&mut self, module: &mut Module, literal: Literal) -> Id {
        let ty = self.scalar_type(module, literal.scalar());
        let value = match literal {
            Literal::Bool(v) => ConstantValue::Bool(v),
            Literal::I32(v) => ConstantValue::Bits32(v as u32),
            Literal::U32(v) => ConstantValue::Bits32(v),
            Literal::F32(v) => ConstantValue::Bits32(v.to_bits()),
            Literal::I64(v) => ConstantValue::Bits64(v as u64),
            Literal::U64(v) => ConstantValue::Bits64(v),
            Literal::F64(v) => ConstantValue::Bits64(v.to_bits()),
        };
        self.get_or_create_constant(module, ty, value)
    }

    pub fn null_constant(&mut self, module: &mut Module, ty: Id) -> Id {
        self.get_or_create_constant(module, ty, ConstantValue::Null)
    }

    /// A `u32` constant usable as an index, scope or semantics operand.
    ///
    /// Zero gets its own `OpConstant` rather than the shared `OpConstantNull`.
    pub fn index_constant(&mut self, module: &mut Module, value: u32) -> Id {
        let ty = self.u32_type(module);
        let value = if value == 0 {
            ConstantValue::ExplicitZero
        } else {
            ConstantValue::Bits32(value)
        };
        self.get_or_create_constant(module, ty, value)
    }

    /// Returns `true` if `id` names a constant created by this cache.
    pub fn is_constant(&self, id: Id) -> bool {
        self.constant_ids.contains(&id)
    }

    /// A fresh `OpSpecConstant*` whose default is `literal`.
    pub fn spec_constant(&mut self, module: &mut Module, literal: Literal) -> Id {
        let ty = self.scalar_type(module, literal.scalar());
        let id = module.next_id();
        let instruction = match literal {
            Literal::Bool(true) => Instruction::new(Op::SpecConstantTrue).id(ty).id(id),
            Literal::Bool(false) => Instruction::new(Op::SpecConstantFalse).id(ty).id(id),
            Literal::I32(v) => Instruction::new(Op::SpecConstant).id(ty).id(id).lit(v as u32),
            Literal::U32(v) => Instruction::new(Op::SpecConstant).id(ty).id(id).lit(v),
            Literal::F32(v) => Instruction::new(Op::SpecConstant)
                .id(ty)
                .id(id)
                .lit(v.to_bits()),
            Literal::I64(v) => wide_spec_constant(ty, id, v as u64),
            Literal::U64(v) => wide_spec_constant(ty, id, v),
            Literal::F64(v) => wide_spec_constant(ty, id, v.to_bits()),
        };
        module.push(Section::Globals, instruction);
        self.spec_ids.insert(id);
        id
    }

    /// Returns `true` for ids issued by [`Self::spec_constant`].
    pub fn is_spec_constant(&self, id: Id) -> bool {
        self.spec_ids.contains(&id)
    }
}

/// Low word first.
fn wide_spec_constant(ty: Id, id: Id, bits: u64) -> Instruction {
    Instruction::new(Op::SpecConstant)
        .id(ty)
        .id(id)
        .lit(bits as u32)
        .lit((bits >> 32) as u32)
}

fn require_width_capability(module: &mut Module, scalar: Scalar) {
    let capability = match (scalar.kind, scalar.width) {
        (ScalarKind::Float, 2) => Capability::Float16,
        (ScalarKind::Float, 8) => Capability::Float64,
        (ScalarKind::Sint | ScalarKind::Uint, 1) => Capability::Int8,
        (ScalarKind::Sint | ScalarKind::Uint, 2) => Capability::Int16,
        (ScalarKind::Sint | ScalarKind::Uint, 8) => Capability::Int64,
        _ => return,
    };
    module.add_capability(capability);
}
