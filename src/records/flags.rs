//! Flag sets stored inside records
//!
//! Records keep raw integers so they stay `Pod`; these types give the bits
//! names at the API surface.

use bitflags::bitflags;

bitflags! {
    /// Per-contact behaviour requested by the application
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct JacobianFlags: u8 {
        const DISABLED = 1 << 0;
        const ENABLE_MASS_FACTORS = 1 << 1;
        const USER_FLAG_0 = 1 << 2;
        const USER_FLAG_1 = 1 << 3;
        const USER_FLAG_2 = 1 << 4;
        const IS_TRIGGER = 1 << 5;
        const ENABLE_COLLISION_EVENTS = 1 << 6;
        const ENABLE_SURFACE_VELOCITY = 1 << 7;
    }
}

bitflags! {
    /// Solver-internal state of one Jacobian record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct JacobianHeaderFlags: u32 {
        /// Next surface-velocity write replaces instead of accumulating
        const SURFACE_VELOCITY_DIRTY = 1 << 3;
        /// Manifold is disabled or a trigger; the solver applies no impulse
        const MANIFOLD_IS_NOT_NORMAL = 1 << 10;
    }
}

bitflags! {
    /// Collision-cache state derived from contact modifications
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionFlags: u32 {
        const ENABLE_CONTACT_WELDING = 1 << 4;
        const DONT_BUILD_CONTACT_JACOBIANS = 1 << 9;
        const ENABLE_RESTITUTION = 1 << 20;
        const ENABLE_SURFACE_VELOCITY = 1 << 25;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QualityFlags: u32 {
        /// Cached impulses may be reused next step
        const ENABLE_CONTACT_CACHING = 1 << 10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ManifoldDataFields: u32 {
        const INERTIA_MODIFIED = 1 << 1;
        const CONTAINS_TRIANGLE = 1 << 2;
    }
}

bitflags! {
    /// Optional modifier sections present in a Jacobian record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierTypes: u8 {
        const SURFACE_VELOCITY = 1 << 0;
        const NORMAL_VELOCITY = 1 << 1;
        const MASS_CHANGER = 1 << 2;
    }
}

/// Kind of a manifold record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ManifoldType {
    Normal = 0,
    Trigger = 1,
    Disabled = 3,
}

impl ManifoldType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ManifoldType::Normal),
            1 => Some(ManifoldType::Trigger),
            3 => Some(ManifoldType::Disabled),
            _ => None,
        }
    }
}

/// Friction sub-record kind of a Jacobian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrictionType {
    None = 0,
    Friction3d = 3,
    Friction3dRolling = 4,
}

impl FrictionType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(FrictionType::None),
            3 => Some(FrictionType::Friction3d),
            4 => Some(FrictionType::Friction3dRolling),
            _ => None,
        }
    }

    pub fn has_friction(self) -> bool {
        !matches!(self, FrictionType::None)
    }
}
