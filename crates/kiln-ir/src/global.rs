//! Global variables, address spaces and shader interface bindings.

use crate::arena::Handle;
use crate::types::Type;

/// Bitflags for storage buffer access modes.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct StorageAccess(u32);

impl StorageAccess {
    /// No access.
    pub const EMPTY: Self = Self(0);
    /// Read access.
    pub const LOAD: Self = Self(1);
    /// Write access.
    pub const STORE: Self = Self(2);

    /// Returns `true` if `self` contains all flags in `other`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flags are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for StorageAccess {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StorageAccess {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Memory address space for variables and pointers.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum AddressSpace {
    /// Function-local storage.
    Function,
    /// Module-scope private storage.
    Private,
    /// Workgroup shared storage.
    Workgroup,
    /// Uniform buffer (read-only).
    Uniform,
    /// Storage buffer with specified access.
    Storage { access: StorageAccess },
}

impl AddressSpace {
    /// Uniform and storage buffers, which are backed by host memory.
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::Uniform | Self::Storage { .. })
    }
}

/// `@group(N) @binding(N)` resource binding.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ResourceBinding {
    pub group: u32,
    pub binding: u32,
}

/// Built-in shader inputs and outputs.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BuiltIn {
    /// `@builtin(position)`: vertex output / fragment input, vec4<f32>.
    /// `invariant` is set by `@invariant`.
    Position { invariant: bool },
    /// `@builtin(vertex_index)`: u32
    VertexIndex,
    /// `@builtin(instance_index)`: u32
    InstanceIndex,
    /// `@builtin(front_facing)`: bool
    FrontFacing,
    /// `@builtin(frag_depth)`: f32
    FragDepth,
    /// `@builtin(sample_index)`: fragment input, u32
    SampleIndex,
    /// `@builtin(sample_mask)`: fragment input or output, u32
    SampleMask,
    /// `@builtin(global_invocation_id)`: vec3<u32>
    GlobalInvocationId,
    /// `@builtin(local_invocation_id)`: vec3<u32>
    LocalInvocationId,
    /// `@builtin(local_invocation_index)`: u32
    LocalInvocationIndex,
    /// `@builtin(workgroup_id)`: vec3<u32>
    WorkgroupId,
    /// `@builtin(num_workgroups)`: vec3<u32>
    NumWorkgroups,
}

/// How a user-defined stage variable is interpolated.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Interpolation {
    Perspective,
    Linear,
    Flat,
}

/// A binding for a function argument, result or struct member.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Binding {
    /// A built-in shader variable.
    BuiltIn(BuiltIn),
    /// A user-defined location.
    Location {
        location: u32,
        interpolation: Option<Interpolation>,
    },
}

/// A pipeline-overridable constant (`override name: T = init;`).
#[derive(Clone, Debug)]
pub struct Override {
    pub name: Option<String>,
    /// `@id(N)`, if given.
    pub id: Option<u16>,
    /// Always a scalar type.
    pub ty: Handle<Type>,
    /// Default value, by handle into [`crate::Module::global_expressions`].
    pub init: Option<Handle<crate::Expression>>,
}

/// A module-scope variable.
#[derive(Clone, Debug)]
pub struct GlobalVariable {
    pub name: Option<String>,
    pub space: AddressSpace,
    pub binding: Option<ResourceBinding>,
    pub ty: Handle<Type>,
    /// Initializer, by handle into [`crate::Module::global_expressions`].
    pub init: Option<Handle<crate::Expression>>,
}
