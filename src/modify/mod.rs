//! Modification protocol - mid-step views over phase output
//!
//! Each job runner walks one phase's records, hands the callback a copy
//! wrapped in a view that tracks what was changed, and writes back only the
//! changed parts. A callback that changes nothing leaves every record byte
//! untouched.
//!
//! Streams carry backend body ids; views expose engine body indices
//! translated through the step context's body id table.

pub mod body_pairs;
pub mod contacts;
pub mod jacobians;

pub use body_pairs::{run_body_pairs_job, BodyPairsJob, ModifiableBodyPair};
pub use contacts::{run_contacts_job, ContactsJob, ModifiableContactHeader, ModifiableContactPoint};
pub use jacobians::{
    run_jacobians_job, JacobiansJob, ModifiableContactJacobian, ModifiableJacobianHeader,
    SurfaceVelocity,
};
