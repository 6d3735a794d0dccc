//! Collision and trigger event records

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use static_assertions::assert_eq_size;

use super::body_pair::BodyIndexPair;
use super::manifold::ContactPointRecord;
use crate::constants::contact::MAX_CONTACT_POINTS;
use crate::error::{PhysicsError, PhysicsResult};
use crate::stream::{BlockStream, RecordLocation};

const STREAM: &str = "collision events";

/// Fixed part of a collision event; followed by `num_points` contact points
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CollisionEventHeader {
    /// Total record size in bytes, points included
    pub size: u32,
    pub num_points: u32,
    pub body_pair: BodyIndexPair,
    pub collider_key_a: u32,
    pub collider_key_b: u32,
    pub _padding: [u32; 2],
    pub normal: [f32; 3],
    /// Summed normal impulse applied by the solver
    pub impulse: f32,
}

impl CollisionEventHeader {
    pub fn new(body_pair: BodyIndexPair, normal: Vec3, impulse: f32) -> Self {
        Self {
            size: 0,
            num_points: 0,
            body_pair,
            collider_key_a: 0,
            collider_key_b: 0,
            _padding: [0; 2],
            normal: normal.to_array(),
            impulse,
        }
    }
}

/// Body pair that overlapped a trigger
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TriggerEventRecord {
    pub body_pair: BodyIndexPair,
    pub collider_key_a: u32,
    pub collider_key_b: u32,
}

/// Bytes a collision event with `num_points` points occupies
pub fn collision_event_record_size(num_points: usize) -> usize {
    std::mem::size_of::<CollisionEventHeader>()
        + num_points * std::mem::size_of::<ContactPointRecord>()
}

/// Append one collision event record
pub fn write_collision_event(
    stream: &mut BlockStream,
    header: &CollisionEventHeader,
    points: &[ContactPointRecord],
) -> PhysicsResult<RecordLocation> {
    if points.len() > MAX_CONTACT_POINTS {
        return Err(PhysicsError::corrupted(
            STREAM,
            format!("{} contact points exceed the maximum", points.len()),
        ));
    }
    let mut header = *header;
    header.num_points = points.len() as u32;
    header.size = collision_event_record_size(points.len()) as u32;

    let size = header.size as usize;
    Ok(stream.append_with(size, |out| {
        let header_size = std::mem::size_of::<CollisionEventHeader>();
        out[..header_size].copy_from_slice(bytemuck::bytes_of(&header));
        out[header_size..].copy_from_slice(bytemuck::cast_slice(points));
    }))
}

/// Read-only view of one collision event record
#[derive(Debug, Clone, Copy)]
pub struct CollisionEventView<'a> {
    pub header: &'a CollisionEventHeader,
    pub points: &'a [ContactPointRecord],
}

impl<'a> CollisionEventView<'a> {
    pub fn parse(bytes: &'a [u8]) -> PhysicsResult<Self> {
        let header_size = std::mem::size_of::<CollisionEventHeader>();
        let header: &CollisionEventHeader = bytes
            .get(..header_size)
            .and_then(|b| bytemuck::try_from_bytes(b).ok())
            .ok_or_else(|| PhysicsError::corrupted(STREAM, "truncated event header"))?;

        let num_points = header.num_points as usize;
        let size = header.size as usize;
        if num_points > MAX_CONTACT_POINTS || size != collision_event_record_size(num_points) {
            return Err(PhysicsError::corrupted(
                STREAM,
                format!("size {} with {} points", size, num_points),
            ));
        }
        let body = bytes
            .get(header_size..size)
            .ok_or_else(|| PhysicsError::corrupted(STREAM, "event truncated"))?;
        let points = bytemuck::try_cast_slice(body)
            .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))?;
        Ok(Self { header, points })
    }

    pub fn record_size(&self) -> usize {
        self.header.size as usize
    }
}

assert_eq_size!(CollisionEventHeader, [u8; 48]);
assert_eq_size!(TriggerEventRecord, [u8; 16]);
