//! Skinned vertex records.
//!
//! The CPU rigid and smooth vertices and the GPU skin vertices all decode into one
//! [`RawVertex`]. Fields a given layout does not store keep their neutral values.

use crate::codecs::{PackedNormal, Vector3, decode_vector_interval_fixed32_gpu, half_to_f32};
use crate::data::{ByteCursor, GameTag, VersionContext};
use crate::error::DecodeResult;
use crate::schema::{Layout, Rule, RuleTable, Step, always};

/// Superset of every skinned vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawVertex {
    pub position: Vector3,
    /// Tangent, binormal and normal. Layouts that drop the binormal leave it zero.
    pub normals: [PackedNormal; 3],
    pub uv: [f32; 2],
    /// Indices into the owning chunk's bone palette.
    pub bone_indices: [u8; 4],
    /// Weights out of 255. A rigid vertex has its single bone at full weight.
    pub bone_weights: [u8; 4],
    pub color: Option<u32>,
}

impl RawVertex {
    pub fn normal(&self) -> PackedNormal {
        self.normals[2]
    }

    fn set_rigid_bone(&mut self, bone: u8) {
        self.bone_indices = [bone, 0, 0, 0];
        self.bone_weights = [255, 0, 0, 0];
    }
}

/// Smallest rigid vertex on disk: position, three normals, half UV and a bone byte.
pub const RIGID_VERTEX_MIN_SIZE: usize = 29;
/// Smallest smooth vertex on disk: position, three normals, half UV and 4+4 influences.
pub const SMOOTH_VERTEX_MIN_SIZE: usize = 36;

/// Where a title keeps the number of UV sets per vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UvSetCount {
    Fixed(u8),
    /// A count byte precedes the UVs of every vertex.
    PerVertex,
}

pub static UV_SET_COUNT: RuleTable<UvSetCount> = RuleTable {
    record: "UvSetCount",
    rules: &[
        Rule::new(
            "Frontlines per-vertex count",
            |ctx| ctx.is(GameTag::Frontlines) && ctx.licensee_version > 52,
            UvSetCount::PerVertex,
        ),
        Rule::new(
            "Frontlines two sets",
            |ctx| ctx.is(GameTag::Frontlines) && ctx.licensee_version >= 3,
            UvSetCount::Fixed(2),
        ),
        Rule::new(
            "Midway and Transformers two sets",
            |ctx| {
                (ctx.is(GameTag::Mk) && ctx.licensee_version >= 11)
                    || ctx.is(GameTag::Strangle)
                    || (ctx.is(GameTag::Transformers) && ctx.licensee_version >= 55)
            },
            UvSetCount::Fixed(2),
        ),
        Rule::new(
            "Mirror's Edge three sets",
            |ctx| ctx.is(GameTag::MirrorEdge) && ctx.licensee_version >= 13,
            UvSetCount::Fixed(3),
        ),
        Rule::new("four sets", |ctx| ctx.format_version >= 709, UvSetCount::Fixed(4)),
        Rule::fallback("single set", always, UvSetCount::Fixed(1)),
    ],
};

fn read_normals(c: &mut ByteCursor<'_>, v: &mut RawVertex) -> DecodeResult<()> {
    for n in &mut v.normals {
        *n = c.read_packed_normal()?;
    }
    Ok(())
}

/// Float UVs followed by any extra sets, which are skipped.
fn read_uv_sets(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    v: &mut RawVertex,
) -> DecodeResult<()> {
    let sets = match UV_SET_COUNT.resolve_value(ctx)? {
        UvSetCount::Fixed(n) => *n,
        UvSetCount::PerVertex => c.read_u8()?,
    };
    v.uv = c.read_float_uv()?;
    if sets > 1 {
        c.skip((sets as usize - 1) * 8)?;
    }
    Ok(())
}

fn read_influences(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    v: &mut RawVertex,
) -> DecodeResult<()> {
    if ctx.format_version >= 333 {
        for i in 0..4 {
            v.bone_indices[i] = c.read_u8()?;
        }
        for i in 0..4 {
            v.bone_weights[i] = c.read_u8()?;
        }
    } else {
        for i in 0..4 {
            v.bone_indices[i] = c.read_u8()?;
            v.bone_weights[i] = c.read_u8()?;
        }
    }
    Ok(())
}

fn r6_half_uvs(ctx: &VersionContext) -> bool {
    ctx.is(GameTag::R6Vegas2) && ctx.licensee_version >= 63
}

type V = Step<RawVertex>;

const POSITION_AND_NORMALS: &[V] = &[
    V::read("position", |c, _, v| {
        v.position = c.read_vector()?;
        Ok(())
    }),
    V::read("normals", |c, _, v| read_normals(c, v)),
];

/// Position padded to four floats, normals, and UVs padded to four sets.
const CRIMECRAFT_HEAD: &[V] = &[
    V::read("position", |c, _, v| {
        v.position = c.read_vector()?;
        Ok(())
    }),
    V::read_if("position w", |ctx| ctx.licensee_version >= 1, |c, _, _| c.skip(4)),
    V::read("normals", |c, _, v| read_normals(c, v)),
    V::read("uv", |c, _, v| {
        v.uv = c.read_float_uv()?;
        Ok(())
    }),
    V::read_if("extra uv sets", |ctx| ctx.licensee_version >= 2, |c, _, _| c.skip(24)),
];

const HALF_UV: &[V] = &[V::read("half uv", |c, _, v| {
    v.uv = c.read_half_uv()?;
    Ok(())
})];

const UVS_AND_COLOR: &[V] = &[
    V::read("uv sets", read_uv_sets),
    V::read_if("color", |ctx| ctx.format_version >= 710, |c, _, v| {
        v.color = Some(c.read_u32()?);
        Ok(())
    }),
];

const RIGID_BONE: &[V] = &[V::read("bone", |c, _, v| {
    let bone = c.read_u8()?;
    v.set_rigid_bone(bone);
    Ok(())
})];

const RIGID_TAIL: &[V] = &[
    V::read_if(
        "MagnaCarta extra",
        |ctx| ctx.is(GameTag::MagnaCarta) && ctx.licensee_version >= 5,
        |c, _, _| c.skip(4),
    ),
    V::read("bone", |c, _, v| {
        let bone = c.read_u8()?;
        v.set_rigid_bone(bone);
        Ok(())
    }),
    V::read_if(
        "Frontlines extra",
        |ctx| ctx.is(GameTag::Frontlines) && ctx.licensee_version >= 88,
        |c, _, _| c.skip(4),
    ),
];

/// Vertex influenced by a single bone.
pub static RIGID_VERTEX: RuleTable<Layout<RawVertex>> = RuleTable {
    record: "RigidVertex",
    rules: &[
        Rule::new(
            "CrimeCraft",
            |ctx| ctx.is(GameTag::CrimeCraft),
            Layout::Steps(&[CRIMECRAFT_HEAD, RIGID_BONE]),
        ),
        Rule::new(
            "R6 Vegas 2 half UVs",
            r6_half_uvs,
            Layout::Steps(&[POSITION_AND_NORMALS, HALF_UV, RIGID_BONE]),
        ),
        Rule::fallback(
            "stock",
            always,
            Layout::Steps(&[POSITION_AND_NORMALS, UVS_AND_COLOR, RIGID_TAIL]),
        ),
    ],
};

const INFLUENCES: &[V] = &[
    V::read("influences", read_influences),
    V::read_if(
        "MagnaCarta extra",
        |ctx| ctx.is(GameTag::MagnaCarta) && ctx.licensee_version >= 5,
        |c, _, _| c.skip(4),
    ),
];

const SMOOTH_FRONTLINES_EXTRA: &[V] = &[V::read_if(
    "Frontlines extra",
    |ctx| ctx.is(GameTag::Frontlines) && ctx.licensee_version >= 88,
    |c, _, _| c.skip(4),
)];

/// Vertex blended between up to four bones.
pub static SMOOTH_VERTEX: RuleTable<Layout<RawVertex>> = RuleTable {
    record: "SmoothVertex",
    rules: &[
        Rule::new(
            "CrimeCraft",
            |ctx| ctx.is(GameTag::CrimeCraft),
            Layout::Steps(&[CRIMECRAFT_HEAD, INFLUENCES]),
        ),
        Rule::new(
            "R6 Vegas 2 half UVs",
            r6_half_uvs,
            Layout::Steps(&[POSITION_AND_NORMALS, HALF_UV, INFLUENCES]),
        ),
        Rule::fallback(
            "stock",
            always,
            Layout::Steps(&[
                POSITION_AND_NORMALS,
                UVS_AND_COLOR,
                SMOOTH_FRONTLINES_EXTRA,
                INFLUENCES,
            ]),
        ),
    ],
};

/// GPU vertex element layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpuVertexKind {
    Half,
    #[default]
    Float,
    PackedHalf,
    PackedFloat,
}

/// Everything the GPU vertex decoder needs to know about its buffer. Passed explicitly to
/// every vertex read.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuStreamFormat {
    pub num_uv_sets: u32,
    pub full_precision_uvs: bool,
    pub packed_position: bool,
    pub mesh_origin: Vector3,
    pub mesh_extension: Vector3,
}

impl Default for GpuStreamFormat {
    fn default() -> Self {
        GpuStreamFormat {
            num_uv_sets: 1,
            full_precision_uvs: true,
            packed_position: false,
            mesh_origin: Vector3::ZERO,
            mesh_extension: Vector3::ZERO,
        }
    }
}

impl GpuStreamFormat {
    pub fn kind(&self) -> GpuVertexKind {
        match (self.full_precision_uvs, self.packed_position) {
            (false, false) => GpuVertexKind::Half,
            (true, false) => GpuVertexKind::Float,
            (false, true) => GpuVertexKind::PackedHalf,
            (true, true) => GpuVertexKind::PackedFloat,
        }
    }

    fn read_uvs(&self, c: &mut ByteCursor<'_>) -> DecodeResult<[f32; 2]> {
        let (uv, size) = if self.full_precision_uvs {
            (c.read_float_uv()?, 4)
        } else {
            let u = c.read_u16()?;
            let v = c.read_u16()?;
            ([half_to_f32(u), half_to_f32(v)], 2)
        };
        if self.num_uv_sets > 1 {
            c.skip((self.num_uv_sets as usize - 1) * 2 * size)?;
        }
        Ok(uv)
    }

    /// Normals and influences shared by every GPU layout.
    fn read_common(
        &self,
        c: &mut ByteCursor<'_>,
        ctx: &VersionContext,
        v: &mut RawVertex,
    ) -> DecodeResult<()> {
        if ctx.is(GameTag::Ava) || ctx.format_version >= 494 {
            v.normals[0] = c.read_packed_normal()?;
            v.normals[2] = c.read_packed_normal()?;
        } else {
            read_normals(c, v)?;
        }
        if (ctx.is(GameTag::CrimeCraft) && ctx.licensee_version >= 1)
            || (ctx.is(GameTag::Frontlines) && ctx.licensee_version >= 88)
        {
            c.skip(4)?;
        }
        for i in 0..4 {
            v.bone_indices[i] = c.read_u8()?;
        }
        for i in 0..4 {
            v.bone_weights[i] = c.read_u8()?;
        }
        Ok(())
    }

    /// Decode one GPU vertex. Packed positions are expanded around the mesh origin.
    pub fn read_vertex(
        &self,
        c: &mut ByteCursor<'_>,
        ctx: &VersionContext,
    ) -> DecodeResult<RawVertex> {
        let mut v = RawVertex::default();
        if self.packed_position {
            self.read_common(c, ctx, &mut v)?;
            let packed = c.read_u32()?;
            v.position =
                decode_vector_interval_fixed32_gpu(packed, self.mesh_origin, self.mesh_extension);
        } else if ctx.format_version < 592 {
            v.position = c.read_vector()?;
            self.read_common(c, ctx, &mut v)?;
        } else {
            self.read_common(c, ctx, &mut v)?;
            v.position = c.read_vector()?;
        }
        v.uv = self.read_uvs(c)?;
        Ok(v)
    }
}
