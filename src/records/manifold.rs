//! Manifold stream records and collision caches
//!
//! The narrowphase writes one [`ManifoldStreamHeader`] per body pair
//! followed by `num_manifolds` manifold records. A manifold record is a
//! [`ManifoldHeader`] followed by `num_points` [`ContactPointRecord`]s.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use static_assertions::assert_eq_size;

use super::body_pair::BodyIndexPair;
use super::flags::{CollisionFlags, JacobianFlags, ManifoldDataFields, ManifoldType, QualityFlags};
use crate::constants::contact::MAX_CONTACT_POINTS;
use crate::error::{PhysicsError, PhysicsResult};
use crate::stream::{BlockStream, RecordLocation};

const STREAM: &str = "manifolds";

/// Precedes the manifolds of one body pair
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ManifoldStreamHeader {
    pub body_pair: BodyIndexPair,
    pub num_manifolds: u32,
    pub _padding: u32,
}

/// One narrow-phase contact point
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ContactPointRecord {
    pub position: [f32; 3],
    /// Signed separation; negative when penetrating
    pub distance: f32,
}

impl ContactPointRecord {
    pub fn new(position: Vec3, distance: f32) -> Self {
        Self {
            position: position.to_array(),
            distance,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Scales applied to inverse mass and inertia of each body
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MassFactors {
    pub inverse_inertia_factor_a: [f32; 3],
    pub inverse_mass_factor_a: f32,
    pub inverse_inertia_factor_b: [f32; 3],
    pub inverse_mass_factor_b: f32,
}

impl MassFactors {
    pub const IDENTITY: MassFactors = MassFactors {
        inverse_inertia_factor_a: [1.0; 3],
        inverse_mass_factor_a: 1.0,
        inverse_inertia_factor_b: [1.0; 3],
        inverse_mass_factor_b: 1.0,
    };
}

impl Default for MassFactors {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Fixed part of a manifold record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ManifoldHeader {
    /// Record size including points, in 16 byte units
    pub size_div16: u32,
    pub num_points: u32,
    /// Raw [`ManifoldType`]
    pub manifold_type: u32,
    /// Raw [`ManifoldDataFields`]
    pub data_fields: u32,
    pub normal: [f32; 3],
    /// Index into the step context's collision caches
    pub cache_index: u32,
    pub collider_key_a: u32,
    pub collider_key_b: u32,
    pub _padding: [u32; 2],
    pub mass_factors: MassFactors,
}

impl ManifoldHeader {
    pub fn new(normal: Vec3, num_points: usize, cache_index: u32) -> Self {
        Self {
            size_div16: (manifold_record_size(num_points) / 16) as u32,
            num_points: num_points as u32,
            manifold_type: ManifoldType::Normal as u32,
            data_fields: 0,
            normal: normal.to_array(),
            cache_index,
            collider_key_a: 0,
            collider_key_b: 0,
            _padding: [0; 2],
            mass_factors: MassFactors::IDENTITY,
        }
    }

    pub fn manifold_type(&self) -> Option<ManifoldType> {
        ManifoldType::from_raw(self.manifold_type)
    }

    pub fn data_fields(&self) -> ManifoldDataFields {
        ManifoldDataFields::from_bits_retain(self.data_fields)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn record_size(&self) -> usize {
        self.size_div16 as usize * 16
    }
}

/// Bytes a manifold record with `num_points` points occupies
pub fn manifold_record_size(num_points: usize) -> usize {
    std::mem::size_of::<ManifoldHeader>() + num_points * std::mem::size_of::<ContactPointRecord>()
}

/// Append one manifold record
pub fn write_manifold(
    stream: &mut BlockStream,
    header: &ManifoldHeader,
    points: &[ContactPointRecord],
) -> PhysicsResult<RecordLocation> {
    if points.len() > MAX_CONTACT_POINTS {
        return Err(PhysicsError::corrupted(
            STREAM,
            format!("{} contact points exceed the maximum of {}", points.len(), MAX_CONTACT_POINTS),
        ));
    }

    let mut header = *header;
    header.num_points = points.len() as u32;
    header.size_div16 = (manifold_record_size(points.len()) / 16) as u32;

    let size = header.record_size();
    Ok(stream.append_with(size, |out| {
        let header_size = std::mem::size_of::<ManifoldHeader>();
        out[..header_size].copy_from_slice(bytemuck::bytes_of(&header));
        out[header_size..].copy_from_slice(bytemuck::cast_slice(points));
    }))
}

fn checked_record_size(header: &ManifoldHeader, available: usize) -> PhysicsResult<usize> {
    let num_points = header.num_points as usize;
    if num_points > MAX_CONTACT_POINTS {
        return Err(PhysicsError::corrupted(
            STREAM,
            format!("declared {} contact points", num_points),
        ));
    }
    let size = header.record_size();
    if size != manifold_record_size(num_points) {
        return Err(PhysicsError::corrupted(
            STREAM,
            format!("size {} disagrees with {} points", size, num_points),
        ));
    }
    if size > available {
        return Err(PhysicsError::corrupted(
            STREAM,
            format!("record of {} bytes truncated to {}", size, available),
        ));
    }
    if header.manifold_type().is_none() {
        return Err(PhysicsError::corrupted(
            STREAM,
            format!("unknown manifold type {}", header.manifold_type),
        ));
    }
    Ok(size)
}

/// Read-only view of one manifold record
#[derive(Debug, Clone, Copy)]
pub struct ManifoldView<'a> {
    pub header: &'a ManifoldHeader,
    pub points: &'a [ContactPointRecord],
}

impl<'a> ManifoldView<'a> {
    pub fn parse(bytes: &'a [u8]) -> PhysicsResult<Self> {
        let header_size = std::mem::size_of::<ManifoldHeader>();
        let header: &ManifoldHeader = bytes
            .get(..header_size)
            .and_then(|b| bytemuck::try_from_bytes(b).ok())
            .ok_or_else(|| PhysicsError::corrupted(STREAM, "truncated manifold header"))?;
        let size = checked_record_size(header, bytes.len())?;
        let points = bytemuck::try_cast_slice(&bytes[header_size..size])
            .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))?;
        Ok(Self { header, points })
    }

    pub fn record_size(&self) -> usize {
        self.header.record_size()
    }
}

/// Mutable view of one manifold record
#[derive(Debug)]
pub struct ManifoldViewMut<'a> {
    pub header: &'a mut ManifoldHeader,
    pub points: &'a mut [ContactPointRecord],
}

impl<'a> ManifoldViewMut<'a> {
    pub fn parse(bytes: &'a mut [u8]) -> PhysicsResult<Self> {
        let size = ManifoldView::parse(bytes)?.record_size();
        let header_size = std::mem::size_of::<ManifoldHeader>();
        let (head, tail) = bytes[..size].split_at_mut(header_size);
        let header = bytemuck::try_from_bytes_mut(head)
            .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))?;
        let points = bytemuck::try_cast_slice_mut(tail)
            .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))?;
        Ok(Self { header, points })
    }
}

/// Per-manifold collision state consulted by the solver
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CollisionCache {
    pub body_pair: BodyIndexPair,
    /// Raw [`CollisionFlags`]
    pub collision_flags: u32,
    /// Raw [`QualityFlags`]
    pub quality_flags: u32,
    pub friction: f32,
    pub restitution: f32,
    pub friction_rhs_multiplier: f32,
    /// Custom tags of body A in the low byte, body B in the next
    pub custom_tags: u32,
    /// Raw [`JacobianFlags`]
    pub jacobian_flags: u32,
    /// Summed normal impulse of the previous step, for warm starting
    pub cached_impulse: f32,
    pub _padding: [u32; 2],
    /// Friction drive integrated from surface velocities
    pub integrated_friction_rhs: [f32; 4],
}

impl CollisionCache {
    pub fn new(body_pair: BodyIndexPair) -> Self {
        Self {
            body_pair,
            collision_flags: 0,
            quality_flags: QualityFlags::ENABLE_CONTACT_CACHING.bits(),
            friction: 0.5,
            restitution: 0.0,
            friction_rhs_multiplier: 1.0,
            custom_tags: 0,
            jacobian_flags: 0,
            cached_impulse: 0.0,
            _padding: [0; 2],
            integrated_friction_rhs: [0.0; 4],
        }
    }

    pub fn collision_flags(&self) -> CollisionFlags {
        CollisionFlags::from_bits_retain(self.collision_flags)
    }

    pub fn set_collision_flags(&mut self, flags: CollisionFlags) {
        self.collision_flags = flags.bits();
    }

    pub fn quality_flags(&self) -> QualityFlags {
        QualityFlags::from_bits_retain(self.quality_flags)
    }

    pub fn set_quality_flags(&mut self, flags: QualityFlags) {
        self.quality_flags = flags.bits();
    }

    pub fn jacobian_flags(&self) -> JacobianFlags {
        JacobianFlags::from_bits_retain(self.jacobian_flags as u8)
    }

    pub fn set_jacobian_flags(&mut self, flags: JacobianFlags) {
        self.jacobian_flags = flags.bits() as u32;
    }

    pub fn custom_tags(&self) -> (u8, u8) {
        ((self.custom_tags & 0xff) as u8, ((self.custom_tags >> 8) & 0xff) as u8)
    }

    pub fn set_custom_tags(&mut self, tags_a: u8, tags_b: u8) {
        self.custom_tags = tags_a as u32 | ((tags_b as u32) << 8);
    }
}

assert_eq_size!(ManifoldStreamHeader, [u8; 16]);
assert_eq_size!(ContactPointRecord, [u8; 16]);
assert_eq_size!(MassFactors, [u8; 32]);
assert_eq_size!(ManifoldHeader, [u8; 80]);
assert_eq_size!(CollisionCache, [u8; 64]);
