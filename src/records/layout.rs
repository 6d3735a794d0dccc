//! Record layout descriptions and the binding manifest
//!
//! Before a backend is used, both sides compare the size, alignment and
//! field offsets of every record type crossing the boundary. Any difference
//! is fatal.

use serde::{Deserialize, Serialize};

use super::body_pair::BodyIndexPair;
use super::event_records::{CollisionEventHeader, TriggerEventRecord};
use super::jacobian::{
    FrictionRow, Jac3dFriction, JacAngular, JacModHeader, JacobianHeader, NormalVelocitySection,
    SectionTable, SurfaceVelocitySection,
};
use super::manifold::{
    CollisionCache, ContactPointRecord, ManifoldHeader, ManifoldStreamHeader, MassFactors,
};
use crate::body::{Entity, Joint, MotionData, MotionVelocity, RigidBody, Velocity};
use crate::error::{PhysicsError, PhysicsResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub name: String,
    pub type_name: String,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayoutInfo {
    pub name: String,
    pub size: usize,
    pub align: usize,
    pub fields: Vec<FieldLayout>,
}

/// A record type whose layout is part of the boundary contract
pub trait RecordLayout: bytemuck::Pod {
    fn layout() -> RecordLayoutInfo;
}

/// Implement [`RecordLayout`] from a field list; each field's declared
/// type is checked against the struct definition.
macro_rules! record_layout {
    ($ty:ident { $($field:ident : $fty:ty),* $(,)? }) => {
        impl RecordLayout for $ty {
            fn layout() -> RecordLayoutInfo {
                RecordLayoutInfo {
                    name: stringify!($ty).to_string(),
                    size: ::std::mem::size_of::<$ty>(),
                    align: ::std::mem::align_of::<$ty>(),
                    fields: vec![$({
                        fn field_type(record: &$ty) -> &$fty {
                            &record.$field
                        }
                        let _ = field_type;
                        FieldLayout {
                            name: stringify!($field).to_string(),
                            type_name: stringify!($fty).to_string(),
                            offset: ::std::mem::offset_of!($ty, $field),
                            size: ::std::mem::size_of::<$fty>(),
                        }
                    }),*],
                }
            }
        }
    };
}

record_layout!(BodyIndexPair { body_index_a: i32, body_index_b: i32 });
record_layout!(Entity { index: i32, version: i32 });
record_layout!(RigidBody {
    entity: Entity,
    position: [f32; 3],
    collider_radius: f32,
    rotation: [f32; 4],
    custom_tags: u32,
    collision_response: u32,
    friction: f32,
    restitution: f32,
});
record_layout!(MotionData {
    position: [f32; 3],
    linear_damping: f32,
    rotation: [f32; 4],
    angular_damping: f32,
    gravity_factor: f32,
});
record_layout!(MotionVelocity {
    linear: [f32; 3],
    inverse_mass: f32,
    angular: [f32; 3],
    inverse_inertia: [f32; 3],
});
record_layout!(Velocity { linear: [f32; 3], angular: [f32; 3] });
record_layout!(Joint { body_pair: BodyIndexPair, rest_length: f32 });
record_layout!(ManifoldStreamHeader { body_pair: BodyIndexPair, num_manifolds: u32 });
record_layout!(ContactPointRecord { position: [f32; 3], distance: f32 });
record_layout!(MassFactors {
    inverse_inertia_factor_a: [f32; 3],
    inverse_mass_factor_a: f32,
    inverse_inertia_factor_b: [f32; 3],
    inverse_mass_factor_b: f32,
});
record_layout!(ManifoldHeader {
    size_div16: u32,
    num_points: u32,
    manifold_type: u32,
    data_fields: u32,
    normal: [f32; 3],
    cache_index: u32,
    collider_key_a: u32,
    collider_key_b: u32,
    mass_factors: MassFactors,
});
record_layout!(CollisionCache {
    body_pair: BodyIndexPair,
    collision_flags: u32,
    quality_flags: u32,
    friction: f32,
    restitution: f32,
    friction_rhs_multiplier: f32,
    custom_tags: u32,
    jacobian_flags: u32,
    cached_impulse: f32,
    integrated_friction_rhs: [f32; 4],
});
record_layout!(SectionTable {
    angular: u16,
    friction: u16,
    modifier_header: u16,
    surface_velocity: u16,
    normal_velocity: u16,
    mass_factors: u16,
});
record_layout!(JacobianHeader {
    size_div16: u8,
    num_points: u8,
    friction_type: u8,
    modifier_types: u8,
    manifold_type: u8,
    jacobian_flags: u8,
    header_flags: u32,
    cache_index: u32,
    body_pair: BodyIndexPair,
    sections: SectionTable,
    coefficient_of_friction: f32,
    normal: [f32; 3],
    coefficient_of_restitution: f32,
});
record_layout!(JacAngular {
    angular_a: [f32; 3],
    effective_mass: f32,
    angular_b: [f32; 3],
    velocity_to_reach_contact_plane: f32,
    impulse: f32,
});
record_layout!(FrictionRow {
    linear: [f32; 3],
    rhs: f32,
    angular_a: [f32; 3],
    effective_mass: f32,
    angular_b: [f32; 3],
    impulse: f32,
});
record_layout!(Jac3dFriction {
    friction0: FrictionRow,
    friction1: FrictionRow,
    angular_friction: FrictionRow,
});
record_layout!(JacModHeader { modifier_types: u32 });
record_layout!(SurfaceVelocitySection { projected: [f32; 3] });
record_layout!(NormalVelocitySection { normal_velocity: f32 });
record_layout!(CollisionEventHeader {
    size: u32,
    num_points: u32,
    body_pair: BodyIndexPair,
    collider_key_a: u32,
    collider_key_b: u32,
    normal: [f32; 3],
    impulse: f32,
});
record_layout!(TriggerEventRecord {
    body_pair: BodyIndexPair,
    collider_key_a: u32,
    collider_key_b: u32,
});

/// Every record layout one side of the boundary was built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutManifest {
    pub records: Vec<RecordLayoutInfo>,
}

impl LayoutManifest {
    /// Layouts compiled into this crate
    pub fn binding() -> Self {
        Self {
            records: vec![
                BodyIndexPair::layout(),
                Entity::layout(),
                RigidBody::layout(),
                MotionData::layout(),
                MotionVelocity::layout(),
                Velocity::layout(),
                Joint::layout(),
                ManifoldStreamHeader::layout(),
                ContactPointRecord::layout(),
                MassFactors::layout(),
                ManifoldHeader::layout(),
                CollisionCache::layout(),
                SectionTable::layout(),
                JacobianHeader::layout(),
                JacAngular::layout(),
                FrictionRow::layout(),
                Jac3dFriction::layout(),
                JacModHeader::layout(),
                SurfaceVelocitySection::layout(),
                NormalVelocitySection::layout(),
                CollisionEventHeader::layout(),
                TriggerEventRecord::layout(),
            ],
        }
    }

    pub fn record(&self, name: &str) -> Option<&RecordLayoutInfo> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Hash of names, types, sizes and offsets
    pub fn fingerprint(&self) -> u64 {
        let mut names = crc32fast::Hasher::new();
        let mut shape = crc32fast::Hasher::new();
        for record in &self.records {
            names.update(record.name.as_bytes());
            shape.update(&(record.size as u64).to_le_bytes());
            shape.update(&(record.align as u64).to_le_bytes());
            for field in &record.fields {
                names.update(field.name.as_bytes());
                names.update(field.type_name.as_bytes());
                shape.update(&(field.offset as u64).to_le_bytes());
                shape.update(&(field.size as u64).to_le_bytes());
            }
        }
        ((names.finalize() as u64) << 32) | shape.finalize() as u64
    }

    /// Every record of `self` must appear in `other` with an identical layout
    pub fn compare(&self, other: &LayoutManifest) -> PhysicsResult<()> {
        for expected in &self.records {
            let incompatible = |detail: String| PhysicsError::IncompatibleLayout {
                record: expected.name.clone(),
                detail,
            };

            let found = other
                .record(&expected.name)
                .ok_or_else(|| incompatible("missing from backend manifest".to_string()))?;

            if found.size != expected.size || found.align != expected.align {
                return Err(incompatible(format!(
                    "size/align {}/{} != {}/{}",
                    found.size, found.align, expected.size, expected.align
                )));
            }

            for field in &expected.fields {
                match found.fields.iter().find(|f| f.name == field.name) {
                    None => return Err(incompatible(format!("field '{}' missing", field.name))),
                    Some(f) if f != field => {
                        return Err(incompatible(format!(
                            "field '{}' at {}+{} ({}) != {}+{} ({})",
                            field.name, f.offset, f.size, f.type_name, field.offset, field.size, field.type_name
                        )))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> PhysicsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> PhysicsResult<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_layouts_are_consistent() {
        let manifest = LayoutManifest::binding();
        for record in &manifest.records {
            assert_eq!(record.size % record.align, 0, "{}", record.name);
            for field in &record.fields {
                assert!(field.offset + field.size <= record.size, "{}.{}", record.name, field.name);
            }
        }

        let header = manifest.record("JacobianHeader").expect("jacobian header");
        assert_eq!(header.size, 64);
        let sections = header.fields.iter().find(|f| f.name == "sections").expect("sections");
        assert_eq!((sections.offset, sections.size), (24, 12));
    }

    #[test]
    fn test_identical_manifests_agree() {
        let ours = LayoutManifest::binding();
        let theirs = LayoutManifest::from_json(&ours.to_json().expect("json")).expect("parse");
        assert!(ours.compare(&theirs).is_ok());
        assert_eq!(ours.fingerprint(), theirs.fingerprint());
    }

    #[test]
    fn test_offset_mismatch_is_fatal() {
        let ours = LayoutManifest::binding();
        let mut theirs = ours.clone();
        let record = theirs
            .records
            .iter_mut()
            .find(|r| r.name == "ManifoldHeader")
            .expect("manifold header");
        record.fields[4].offset += 4;

        let err = ours.compare(&theirs).expect_err("mismatch");
        assert!(err.is_fatal());
        assert!(matches!(err, PhysicsError::IncompatibleLayout { ref record, .. } if record == "ManifoldHeader"));
        assert_ne!(ours.fingerprint(), theirs.fingerprint());
    }

    #[test]
    fn test_missing_record_is_fatal() {
        let ours = LayoutManifest::binding();
        let mut theirs = ours.clone();
        theirs.records.retain(|r| r.name != "TriggerEventRecord");
        assert!(matches!(
            ours.compare(&theirs),
            Err(PhysicsError::IncompatibleLayout { .. })
        ));
    }
}
