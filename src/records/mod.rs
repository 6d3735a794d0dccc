//! Records crossing the backend boundary
//!
//! Every record is a `#[repr(C)]` Pod struct stored padded to 16 bytes in
//! a block stream. Variable-length records carry their own size so readers
//! can skip them.

pub mod body_pair;
pub mod event_records;
pub mod flags;
pub mod jacobian;
pub mod layout;
pub mod manifold;

pub use body_pair::BodyIndexPair;
pub use event_records::{
    collision_event_record_size, write_collision_event, CollisionEventHeader, CollisionEventView,
    TriggerEventRecord,
};
pub use flags::{
    CollisionFlags, FrictionType, JacobianFlags, JacobianHeaderFlags, ManifoldDataFields,
    ManifoldType, ModifierTypes, QualityFlags,
};
pub use jacobian::{
    friction_basis, write_jacobian, FrictionRow, Jac3dFriction, JacAngular, JacModHeader, JacobianHeader,
    JacobianLayout, JacobianRecord, JacobianRecordMut, JacobianSections, NormalVelocitySection,
    SectionTable, SurfaceVelocitySection, JACOBIAN_HEADER_SIZE,
};
pub use layout::{FieldLayout, LayoutManifest, RecordLayout, RecordLayoutInfo};
pub use manifold::{
    manifold_record_size, write_manifold, CollisionCache, ContactPointRecord, ManifoldHeader,
    ManifoldStreamHeader, ManifoldView, ManifoldViewMut, MassFactors,
};
