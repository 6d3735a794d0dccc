//! Contact Jacobian records
//!
//! Layout of one record:
//!
//! ```text
//! JacobianHeader                      64 bytes
//! JacAngular x num_points             48 bytes each
//! Jac3dFriction                       144 bytes, when friction_type has friction
//! JacModHeader                        16 bytes, when any modifier is present
//!   SurfaceVelocitySection            16 bytes, SURFACE_VELOCITY
//!   NormalVelocitySection             16 bytes, NORMAL_VELOCITY
//!   MassFactors                       32 bytes, MASS_CHANGER
//! ```
//!
//! The section offsets are written into the header's [`SectionTable`] when
//! the record is created. Readers recompute the table from the header's
//! point count, friction type and modifier bits and refuse the record if
//! the two disagree.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use static_assertions::assert_eq_size;

use super::body_pair::BodyIndexPair;
use super::flags::{FrictionType, JacobianFlags, JacobianHeaderFlags, ManifoldType, ModifierTypes};
use super::manifold::MassFactors;
use crate::constants::contact::MAX_CONTACT_POINTS;
use crate::error::{PhysicsError, PhysicsResult};
use crate::stream::{BlockStream, RecordLocation};

const STREAM: &str = "jacobians";

pub const JACOBIAN_HEADER_SIZE: usize = std::mem::size_of::<JacobianHeader>();
const ANGULAR_SIZE: usize = std::mem::size_of::<JacAngular>();
const FRICTION_SIZE: usize = std::mem::size_of::<Jac3dFriction>();
const MOD_HEADER_SIZE: usize = std::mem::size_of::<JacModHeader>();
const SURFACE_VELOCITY_SIZE: usize = std::mem::size_of::<SurfaceVelocitySection>();
const NORMAL_VELOCITY_SIZE: usize = std::mem::size_of::<NormalVelocitySection>();
const MASS_FACTORS_SIZE: usize = std::mem::size_of::<MassFactors>();

/// Byte offsets of the optional sections; 0 means absent
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SectionTable {
    pub angular: u16,
    pub friction: u16,
    pub modifier_header: u16,
    pub surface_velocity: u16,
    pub normal_velocity: u16,
    pub mass_factors: u16,
}

/// Fixed part of a contact Jacobian record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct JacobianHeader {
    pub size_div16: u8,
    pub num_points: u8,
    /// Raw [`FrictionType`]
    pub friction_type: u8,
    /// Raw [`ModifierTypes`]
    pub modifier_types: u8,
    /// Raw [`ManifoldType`]
    pub manifold_type: u8,
    /// Raw [`JacobianFlags`]
    pub jacobian_flags: u8,
    pub _reserved: [u8; 2],
    /// Raw [`JacobianHeaderFlags`]
    pub header_flags: u32,
    /// Index into the step context's collision caches
    pub cache_index: u32,
    pub body_pair: BodyIndexPair,
    pub sections: SectionTable,
    pub coefficient_of_friction: f32,
    pub normal: [f32; 3],
    pub coefficient_of_restitution: f32,
    pub _padding: [u32; 2],
}

impl JacobianHeader {
    pub fn new(body_pair: BodyIndexPair, cache_index: u32, normal: Vec3) -> Self {
        Self {
            size_div16: 0,
            num_points: 0,
            friction_type: FrictionType::None as u8,
            modifier_types: 0,
            manifold_type: ManifoldType::Normal as u32 as u8,
            jacobian_flags: 0,
            _reserved: [0; 2],
            header_flags: 0,
            cache_index,
            body_pair,
            sections: SectionTable::default(),
            coefficient_of_friction: 0.0,
            normal: normal.to_array(),
            coefficient_of_restitution: 0.0,
            _padding: [0; 2],
        }
    }

    pub fn header_flags(&self) -> JacobianHeaderFlags {
        JacobianHeaderFlags::from_bits_retain(self.header_flags)
    }

    pub fn set_header_flags(&mut self, flags: JacobianHeaderFlags) {
        self.header_flags = flags.bits();
    }

    pub fn jacobian_flags(&self) -> JacobianFlags {
        JacobianFlags::from_bits_retain(self.jacobian_flags)
    }

    pub fn modifier_types(&self) -> ModifierTypes {
        ModifierTypes::from_bits_retain(self.modifier_types)
    }

    pub fn manifold_type(&self) -> Option<ManifoldType> {
        ManifoldType::from_raw(self.manifold_type as u32)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn record_size(&self) -> usize {
        self.size_div16 as usize * 16
    }
}

/// Tangent directions of the friction rows for a contact normal. Writers and
/// modifiers both derive the basis here so projections agree.
pub fn friction_basis(normal: Vec3) -> (Vec3, Vec3) {
    let n = normal.normalize_or_zero();
    let (ax, ay, az) = (n.x.abs(), n.y.abs(), n.z.abs());
    let seed = if ax <= ay && ax <= az {
        Vec3::X
    } else if ay <= az {
        Vec3::Y
    } else {
        Vec3::Z
    };
    let dir0 = seed.cross(n).normalize_or_zero();
    let dir1 = n.cross(dir0);
    (dir0, dir1)
}

/// Angular Jacobian of one contact point
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct JacAngular {
    pub angular_a: [f32; 3],
    pub effective_mass: f32,
    pub angular_b: [f32; 3],
    /// Normal velocity the solver may allow before the contact plane is reached
    pub velocity_to_reach_contact_plane: f32,
    /// Accumulated normal impulse
    pub impulse: f32,
    pub _padding: [f32; 3],
}

/// One friction constraint row
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct FrictionRow {
    pub linear: [f32; 3],
    /// Target relative velocity along the row
    pub rhs: f32,
    pub angular_a: [f32; 3],
    pub effective_mass: f32,
    pub angular_b: [f32; 3],
    pub impulse: f32,
}

/// Two tangential rows and one twist row
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Jac3dFriction {
    pub friction0: FrictionRow,
    pub friction1: FrictionRow,
    pub angular_friction: FrictionRow,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct JacModHeader {
    /// Raw [`ModifierTypes`], duplicated from the record header
    pub modifier_types: u32,
    pub _reserved: [u32; 3],
}

/// Surface velocity projected onto the friction rows
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SurfaceVelocitySection {
    /// Linear velocity along friction directions 0 and 1, angular velocity about the normal
    pub projected: [f32; 3],
    pub _padding: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct NormalVelocitySection {
    pub normal_velocity: f32,
    pub _padding: [f32; 3],
}

/// Section table plus total record size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JacobianLayout {
    pub sections: SectionTable,
    pub total_size: usize,
}

impl JacobianLayout {
    /// Offsets for a record with the given shape
    pub fn compute(num_points: usize, friction_type: u8, modifier_types: u8) -> PhysicsResult<Self> {
        if num_points > MAX_CONTACT_POINTS {
            return Err(PhysicsError::corrupted(
                STREAM,
                format!("{} contact points exceed the maximum", num_points),
            ));
        }
        let friction = FrictionType::from_raw(friction_type).ok_or_else(|| {
            PhysicsError::corrupted(STREAM, format!("unknown friction type {}", friction_type))
        })?;
        let modifiers = ModifierTypes::from_bits(modifier_types).ok_or_else(|| {
            PhysicsError::corrupted(STREAM, format!("unknown modifier bits {:#04x}", modifier_types))
        })?;

        let mut sections = SectionTable {
            angular: JACOBIAN_HEADER_SIZE as u16,
            ..SectionTable::default()
        };
        let mut offset = JACOBIAN_HEADER_SIZE + num_points * ANGULAR_SIZE;

        if friction.has_friction() {
            sections.friction = offset as u16;
            offset += FRICTION_SIZE;
        }
        if !modifiers.is_empty() {
            sections.modifier_header = offset as u16;
            offset += MOD_HEADER_SIZE;
            if modifiers.contains(ModifierTypes::SURFACE_VELOCITY) {
                sections.surface_velocity = offset as u16;
                offset += SURFACE_VELOCITY_SIZE;
            }
            if modifiers.contains(ModifierTypes::NORMAL_VELOCITY) {
                sections.normal_velocity = offset as u16;
                offset += NORMAL_VELOCITY_SIZE;
            }
            if modifiers.contains(ModifierTypes::MASS_CHANGER) {
                sections.mass_factors = offset as u16;
                offset += MASS_FACTORS_SIZE;
            }
        }

        Ok(Self {
            sections,
            total_size: offset,
        })
    }

    /// Recompute the layout from `header` and check it against the stored table
    pub fn validate(header: &JacobianHeader) -> PhysicsResult<Self> {
        let layout = Self::compute(
            header.num_points as usize,
            header.friction_type,
            header.modifier_types,
        )?;
        if layout.sections != header.sections {
            return Err(PhysicsError::corrupted(
                STREAM,
                format!(
                    "stored sections {:?} disagree with computed {:?}",
                    header.sections, layout.sections
                ),
            ));
        }
        if layout.total_size != header.record_size() {
            return Err(PhysicsError::corrupted(
                STREAM,
                format!(
                    "stored size {} disagrees with computed {}",
                    header.record_size(),
                    layout.total_size
                ),
            ));
        }
        if header.manifold_type().is_none() {
            return Err(PhysicsError::corrupted(
                STREAM,
                format!("unknown manifold type {}", header.manifold_type),
            ));
        }
        Ok(layout)
    }
}

/// Optional sections handed to [`write_jacobian`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JacobianSections<'a> {
    pub angular: &'a [JacAngular],
    pub friction: Option<Jac3dFriction>,
    pub surface_velocity: Option<SurfaceVelocitySection>,
    pub normal_velocity: Option<NormalVelocitySection>,
    pub mass_factors: Option<MassFactors>,
}

/// Append a Jacobian record; shape fields of `header` are derived from `sections`
pub fn write_jacobian(
    stream: &mut BlockStream,
    header: &JacobianHeader,
    sections: &JacobianSections<'_>,
) -> PhysicsResult<RecordLocation> {
    let mut header = *header;
    let friction_type = match (sections.friction, FrictionType::from_raw(header.friction_type)) {
        (Some(_), Some(kind)) if kind.has_friction() => kind,
        (Some(_), _) => FrictionType::Friction3d,
        (None, _) => FrictionType::None,
    };
    let mut modifiers = ModifierTypes::empty();
    modifiers.set(ModifierTypes::SURFACE_VELOCITY, sections.surface_velocity.is_some());
    modifiers.set(ModifierTypes::NORMAL_VELOCITY, sections.normal_velocity.is_some());
    modifiers.set(ModifierTypes::MASS_CHANGER, sections.mass_factors.is_some());

    let layout = JacobianLayout::compute(sections.angular.len(), friction_type as u8, modifiers.bits())?;
    header.num_points = sections.angular.len() as u8;
    header.friction_type = friction_type as u8;
    header.modifier_types = modifiers.bits();
    header.sections = layout.sections;
    header.size_div16 = (layout.total_size / 16) as u8;

    let table = layout.sections;
    Ok(stream.append_with(layout.total_size, |out| {
        out[..JACOBIAN_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
        let angular_start = table.angular as usize;
        let angular_bytes: &[u8] = bytemuck::cast_slice(sections.angular);
        out[angular_start..angular_start + angular_bytes.len()].copy_from_slice(angular_bytes);

        if let Some(friction) = &sections.friction {
            place(out, table.friction, friction);
        }
        if table.modifier_header != 0 {
            let mod_header = JacModHeader {
                modifier_types: modifiers.bits() as u32,
                _reserved: [0; 3],
            };
            place(out, table.modifier_header, &mod_header);
        }
        if let Some(surface_velocity) = &sections.surface_velocity {
            place(out, table.surface_velocity, surface_velocity);
        }
        if let Some(normal_velocity) = &sections.normal_velocity {
            place(out, table.normal_velocity, normal_velocity);
        }
        if let Some(mass_factors) = &sections.mass_factors {
            place(out, table.mass_factors, mass_factors);
        }
    }))
}

fn place<T: Pod>(out: &mut [u8], offset: u16, value: &T) {
    let start = offset as usize;
    let bytes = bytemuck::bytes_of(value);
    out[start..start + bytes.len()].copy_from_slice(bytes);
}

fn view<T: Pod>(bytes: &[u8], offset: u16) -> PhysicsResult<Option<&T>> {
    if offset == 0 {
        return Ok(None);
    }
    let start = offset as usize;
    let slice = bytes
        .get(start..start + std::mem::size_of::<T>())
        .ok_or_else(|| PhysicsError::corrupted(STREAM, "section past record end"))?;
    bytemuck::try_from_bytes(slice)
        .map(Some)
        .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))
}

fn view_mut<T: Pod>(bytes: &mut [u8], offset: u16) -> PhysicsResult<Option<&mut T>> {
    if offset == 0 {
        return Ok(None);
    }
    let start = offset as usize;
    let slice = bytes
        .get_mut(start..start + std::mem::size_of::<T>())
        .ok_or_else(|| PhysicsError::corrupted(STREAM, "section past record end"))?;
    bytemuck::try_from_bytes_mut(slice)
        .map(Some)
        .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))
}

fn parse_header(bytes: &[u8]) -> PhysicsResult<(JacobianHeader, JacobianLayout)> {
    let header: JacobianHeader = bytes
        .get(..JACOBIAN_HEADER_SIZE)
        .map(bytemuck::pod_read_unaligned)
        .ok_or_else(|| PhysicsError::corrupted(STREAM, "truncated jacobian header"))?;
    let layout = JacobianLayout::validate(&header)?;
    if layout.total_size > bytes.len() {
        return Err(PhysicsError::corrupted(
            STREAM,
            format!("record of {} bytes truncated to {}", layout.total_size, bytes.len()),
        ));
    }
    Ok((header, layout))
}

/// Read-only view of one Jacobian record
#[derive(Debug, Clone, Copy)]
pub struct JacobianRecord<'a> {
    bytes: &'a [u8],
    layout: JacobianLayout,
    num_points: usize,
}

impl<'a> JacobianRecord<'a> {
    pub fn parse(bytes: &'a [u8]) -> PhysicsResult<Self> {
        let (header, layout) = parse_header(bytes)?;
        Ok(Self {
            bytes: &bytes[..layout.total_size],
            layout,
            num_points: header.num_points as usize,
        })
    }

    pub fn layout(&self) -> JacobianLayout {
        self.layout
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn header(&self) -> PhysicsResult<&'a JacobianHeader> {
        bytemuck::try_from_bytes(&self.bytes[..JACOBIAN_HEADER_SIZE])
            .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))
    }

    pub fn angular(&self) -> PhysicsResult<&'a [JacAngular]> {
        let start = self.layout.sections.angular as usize;
        bytemuck::try_cast_slice(&self.bytes[start..start + self.num_points * ANGULAR_SIZE])
            .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))
    }

    pub fn friction(&self) -> PhysicsResult<Option<&'a Jac3dFriction>> {
        view(self.bytes, self.layout.sections.friction)
    }

    pub fn surface_velocity(&self) -> PhysicsResult<Option<&'a SurfaceVelocitySection>> {
        view(self.bytes, self.layout.sections.surface_velocity)
    }

    pub fn normal_velocity(&self) -> PhysicsResult<Option<&'a NormalVelocitySection>> {
        view(self.bytes, self.layout.sections.normal_velocity)
    }

    pub fn mass_factors(&self) -> PhysicsResult<Option<&'a MassFactors>> {
        view(self.bytes, self.layout.sections.mass_factors)
    }
}

/// Mutable view of one Jacobian record
#[derive(Debug)]
pub struct JacobianRecordMut<'a> {
    bytes: &'a mut [u8],
    layout: JacobianLayout,
    num_points: usize,
}

impl<'a> JacobianRecordMut<'a> {
    pub fn parse(bytes: &'a mut [u8]) -> PhysicsResult<Self> {
        let (header, layout) = parse_header(bytes)?;
        Ok(Self {
            bytes: &mut bytes[..layout.total_size],
            layout,
            num_points: header.num_points as usize,
        })
    }

    pub fn layout(&self) -> JacobianLayout {
        self.layout
    }

    pub fn as_record(&self) -> JacobianRecord<'_> {
        JacobianRecord {
            bytes: self.bytes,
            layout: self.layout,
            num_points: self.num_points,
        }
    }

    pub fn header_mut(&mut self) -> PhysicsResult<&mut JacobianHeader> {
        bytemuck::try_from_bytes_mut(&mut self.bytes[..JACOBIAN_HEADER_SIZE])
            .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))
    }

    pub fn angular_mut(&mut self) -> PhysicsResult<&mut [JacAngular]> {
        let start = self.layout.sections.angular as usize;
        let end = start + self.num_points * ANGULAR_SIZE;
        bytemuck::try_cast_slice_mut(&mut self.bytes[start..end])
            .map_err(|e| PhysicsError::corrupted(STREAM, format!("{:?}", e)))
    }

    pub fn friction_mut(&mut self) -> PhysicsResult<Option<&mut Jac3dFriction>> {
        view_mut(self.bytes, self.layout.sections.friction)
    }

    pub fn surface_velocity_mut(&mut self) -> PhysicsResult<Option<&mut SurfaceVelocitySection>> {
        view_mut(self.bytes, self.layout.sections.surface_velocity)
    }

    pub fn normal_velocity_mut(&mut self) -> PhysicsResult<Option<&mut NormalVelocitySection>> {
        view_mut(self.bytes, self.layout.sections.normal_velocity)
    }

    pub fn mass_factors_mut(&mut self) -> PhysicsResult<Option<&mut MassFactors>> {
        view_mut(self.bytes, self.layout.sections.mass_factors)
    }
}

assert_eq_size!(SectionTable, [u8; 12]);
assert_eq_size!(JacobianHeader, [u8; 64]);
assert_eq_size!(JacAngular, [u8; 48]);
assert_eq_size!(FrictionRow, [u8; 48]);
assert_eq_size!(Jac3dFriction, [u8; 144]);
assert_eq_size!(JacModHeader, [u8; 16]);
assert_eq_size!(SurfaceVelocitySection, [u8; 16]);
assert_eq_size!(NormalVelocitySection, [u8; 16]);

#[cfg(test)]
mod tests {
    use super::*;

    fn angular_rows(count: usize) -> Vec<JacAngular> {
        (0..count)
            .map(|i| JacAngular {
                angular_a: [i as f32, 1.0, 2.0],
                effective_mass: 0.5,
                angular_b: [-(i as f32), -1.0, -2.0],
                velocity_to_reach_contact_plane: 0.1 * i as f32,
                impulse: 0.0,
                _padding: [0.0; 3],
            })
            .collect()
    }

    #[test]
    fn test_layout_offsets() {
        let layout = JacobianLayout::compute(2, FrictionType::Friction3d as u8, 0).expect("layout");
        assert_eq!(layout.sections.angular, 64);
        assert_eq!(layout.sections.friction, 64 + 96);
        assert_eq!(layout.sections.modifier_header, 0);
        assert_eq!(layout.total_size, 64 + 96 + 144);

        let all = ModifierTypes::all().bits();
        let layout = JacobianLayout::compute(1, FrictionType::None as u8, all).expect("layout");
        assert_eq!(layout.sections.friction, 0);
        assert_eq!(layout.sections.modifier_header, 112);
        assert_eq!(layout.sections.surface_velocity, 128);
        assert_eq!(layout.sections.normal_velocity, 144);
        assert_eq!(layout.sections.mass_factors, 160);
        assert_eq!(layout.total_size, 192);
        assert_eq!(layout.total_size % 16, 0);
    }

    #[test]
    fn test_unknown_flags_are_fatal() {
        let err = JacobianLayout::compute(1, 2, 0).expect_err("friction type 2");
        assert!(err.is_fatal());
        let err = JacobianLayout::compute(1, 0, 0x40).expect_err("modifier bit 6");
        assert!(err.is_fatal());
        assert!(JacobianLayout::compute(MAX_CONTACT_POINTS + 1, 0, 0).is_err());
    }

    #[test]
    fn test_jacobian_round_trip_for_every_point_count() {
        let mut stream = BlockStream::new("jacobians");
        let mut written = Vec::new();
        for count in 0..=MAX_CONTACT_POINTS {
            let mut header = JacobianHeader::new(BodyIndexPair::new(1, 2), count as u32, Vec3::Z);
            header.coefficient_of_friction = 0.7;
            header.set_header_flags(JacobianHeaderFlags::SURFACE_VELOCITY_DIRTY);
            let rows = angular_rows(count);
            let friction = (count % 2 == 0).then(|| Jac3dFriction {
                friction0: FrictionRow { rhs: 1.5, ..FrictionRow::default() },
                ..Jac3dFriction::default()
            });
            let sections = JacobianSections {
                angular: &rows,
                friction,
                surface_velocity: Some(SurfaceVelocitySection { projected: [1.0, 2.0, 3.0], _padding: 0.0 }),
                normal_velocity: None,
                mass_factors: (count > 2).then_some(MassFactors::IDENTITY),
            };
            write_jacobian(&mut stream, &header, &sections).expect("write");
            written.push((rows, friction, count > 2));
        }

        let mut reader = stream.reader();
        for (rows, friction, has_mass_factors) in &written {
            let record = JacobianRecord::parse(reader.peek().expect("peek")).expect("parse");
            let header = record.header().expect("header");
            assert_eq!(header.num_points as usize, rows.len());
            assert_eq!(header.coefficient_of_friction, 0.7);
            assert!(header.header_flags().contains(JacobianHeaderFlags::SURFACE_VELOCITY_DIRTY));
            assert_eq!(record.angular().expect("angular"), rows.as_slice());
            assert_eq!(record.friction().expect("friction").copied(), *friction);
            assert_eq!(
                record.surface_velocity().expect("sv").map(|s| s.projected),
                Some([1.0, 2.0, 3.0])
            );
            assert!(record.normal_velocity().expect("nv").is_none());
            assert_eq!(record.mass_factors().expect("mf").is_some(), *has_mass_factors);
            reader.advance(header.record_size()).expect("advance");
        }
        assert!(!reader.has_items());
    }

    #[test]
    fn test_tampered_section_table_rejected() {
        let mut stream = BlockStream::new("jacobians");
        let rows = angular_rows(2);
        let header = JacobianHeader::new(BodyIndexPair::new(0, 1), 0, Vec3::Y);
        let location = write_jacobian(
            &mut stream,
            &header,
            &JacobianSections { angular: &rows, friction: Some(Jac3dFriction::default()), ..JacobianSections::default() },
        )
        .expect("write");

        {
            let bytes = stream.record_bytes_mut(location).expect("bytes");
            let mut record = JacobianRecordMut::parse(bytes).expect("parse");
            record.header_mut().expect("header").modifier_types = ModifierTypes::MASS_CHANGER.bits();
        }
        let result = JacobianRecord::parse(stream.record_bytes(location).expect("bytes"));
        assert!(matches!(result, Err(PhysicsError::CorruptedRecord { .. })));
    }

    #[test]
    fn test_friction_basis_is_orthonormal() {
        for normal in [Vec3::X, Vec3::Y, -Vec3::Z, Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let (dir0, dir1) = friction_basis(normal);
            assert!((dir0.length() - 1.0).abs() < 1e-5);
            assert!((dir1.length() - 1.0).abs() < 1e-5);
            assert!(dir0.dot(normal).abs() < 1e-5);
            assert!(dir1.dot(normal).abs() < 1e-5);
            assert!(dir0.dot(dir1).abs() < 1e-5);
        }
    }
}
