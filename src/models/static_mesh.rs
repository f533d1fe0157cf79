//! Static mesh records.
//!
//! A static LOD stores positions and the tangent basis/UVs in two parallel streams. Older
//! cooks embedded positions in the UV stream or used a single legacy vertex array; the
//! record keeps whatever was on disk and tags it with a [`StaticStreamLayout`] so the
//! reconstruction step can normalize it.

use tracing::debug;

use super::skeletal::skip_transformers_stream;
use super::{
    BoxSphereBounds, EDGE, EDGE_MIN_SIZE, Edge, note_default_layout, read_edges_bulk,
    read_i16_array, read_i32_array, read_index_buffer, read_u8_array,
};
use crate::codecs::{PackedNormal, Vector3, half_to_f32};
use crate::data::cursor::BulkDataHeader;
use crate::data::{ByteCursor, GameTag, VersionContext};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::DecodeResult;
use crate::schema::{Layout, Rule, RuleTable, Step, always};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticMeshSection {
    /// Object reference of the section material.
    pub material: i32,
    pub enable_collision: bool,
    pub old_enable_collision: bool,
    pub enable_shadow_casting: bool,
    pub first_index: i32,
    pub num_faces: i32,
    pub min_vertex_index: i32,
    pub max_vertex_index: i32,
    pub index: i32,
    pub fragments: Vec<[i32; 2]>,
}

const SECTION_MIN_SIZE: usize = 24;

type Sec = Step<StaticMeshSection>;

fn read_pair_array(c: &mut ByteCursor<'_>) -> DecodeResult<Vec<[i32; 2]>> {
    c.read_array(8, |c| Ok([c.read_i32()?, c.read_i32()?]))
}

fn read_face_range(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    s: &mut StaticMeshSection,
) -> DecodeResult<()> {
    s.first_index = c.read_i32()?;
    s.num_faces = c.read_i32()?;
    s.min_vertex_index = c.read_i32()?;
    s.max_vertex_index = c.read_i32()?;
    Ok(())
}

fn read_section_index(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    s: &mut StaticMeshSection,
) -> DecodeResult<()> {
    s.index = c.read_i32()?;
    Ok(())
}

fn is_short_section(ctx: &VersionContext) -> bool {
    (ctx.is(GameTag::MassEffect) || ctx.is(GameTag::Huxley)) && ctx.format_version >= 485
}

const SECTION_TUROK: &[Sec] = &[
    Sec::read("collision flags", |c, _, s| {
        s.enable_collision = c.read_i32()? != 0;
        s.old_enable_collision = c.read_i32()? != 0;
        Ok(())
    }),
    Sec::read("face range", read_face_range),
];

const SECTION_STOCK: &[Sec] = &[
    Sec::read("material and collision flags", |c, _, s| {
        s.material = c.read_i32()?;
        s.enable_collision = c.read_i32()? != 0;
        s.old_enable_collision = c.read_i32()? != 0;
        Ok(())
    }),
    Sec::read_if(
        "shadow casting",
        |ctx| ctx.format_version >= 473,
        |c, _, s| {
            s.enable_shadow_casting = c.read_i32()? != 0;
            Ok(())
        },
    ),
    Sec::read("face range", read_face_range),
    Sec::read_if("Mass Effect and Huxley index", is_short_section, read_section_index),
    Sec::stop_if("Mass Effect and Huxley end here", is_short_section),
    Sec::read_if("index", |ctx| ctx.format_version >= 492, read_section_index),
    Sec::read_if(
        "Alpha Protocol extra",
        |ctx| ctx.is(GameTag::AlphaProtocol) && ctx.licensee_version >= 13,
        |c, _, _| c.skip(8),
    ),
    Sec::read_if(
        "MK edges",
        |ctx| ctx.is(GameTag::Mk) && ctx.format_version >= 409,
        |c, ctx, _| EDGE.decode_array(c, ctx, EDGE_MIN_SIZE).map(|_| ()),
    ),
    Sec::read_if(
        "Transformers fragments",
        |ctx| ctx.is(GameTag::Transformers) && ctx.licensee_version >= 49,
        |c, _, s| {
            s.fragments = read_pair_array(c)?;
            Ok(())
        },
    ),
    Sec::stop_if("Transformers ends here", |ctx| {
        ctx.is(GameTag::Transformers) && ctx.licensee_version >= 49
    }),
    Sec::read_if(
        "fragments",
        |ctx| ctx.format_version >= 514,
        |c, _, s| {
            s.fragments = read_pair_array(c)?;
            Ok(())
        },
    ),
    Sec::read_if(
        "Alpha Protocol trailer",
        |ctx| ctx.is(GameTag::AlphaProtocol) && ctx.licensee_version >= 39,
        |c, _, _| c.skip(4),
    ),
    Sec::read_if(
        "MOH2010 section data",
        |ctx| ctx.is(GameTag::Moh2010) && ctx.format_version >= 575,
        |c, _, _| {
            if c.read_u8()? != 0 {
                read_i32_array(c)?;
                read_i32_array(c)?;
                for _ in 0..6 {
                    read_i16_array(c)?;
                }
            }
            Ok(())
        },
    ),
    Sec::read_if("trailing byte", |ctx| ctx.format_version >= 618, |c, _, _| c.skip(1)),
];

pub static STATIC_MESH_SECTION: RuleTable<Layout<StaticMeshSection>> = RuleTable {
    record: "StaticMeshSection",
    rules: &[
        Rule::new(
            "Turok without material",
            |ctx| ctx.is(GameTag::Turok) && ctx.licensee_version >= 57,
            Layout::Steps(&[SECTION_TUROK]),
        ),
        Rule::fallback("stock", always, Layout::Steps(&[SECTION_STOCK])),
    ],
};

/// Positions of a static LOD.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticVertexStream {
    pub vertex_size: i32,
    pub num_vertices: i32,
    /// Set when an AVA cook declared the stream absent.
    pub stripped: bool,
    pub positions: Vec<Vector3>,
}

type Vs = Step<StaticVertexStream>;

fn stream_present(_: &VersionContext, s: &StaticVertexStream) -> bool {
    !s.stripped
}

pub static STATIC_VERTEX_STREAM: RuleTable<Layout<StaticVertexStream>> = RuleTable {
    record: "StaticVertexStream",
    rules: &[Rule::new(
        "all versions",
        always,
        Layout::Steps(&[&[
            Vs::read("header", |c, _, s| {
                s.vertex_size = c.read_i32()?;
                s.num_vertices = c.read_i32()?;
                Ok(())
            }),
            Vs::read_if(
                "Batman extra",
                |ctx| ctx.is(GameTag::Batman) && ctx.licensee_version >= 0x11,
                |c, _, _| c.skip(4),
            ),
            Vs::read_if(
                "AVA presence",
                |ctx| ctx.is(GameTag::Ava) && ctx.format_version >= 442,
                |c, _, s| {
                    s.stripped = c.read_i32()? == 0;
                    if s.stripped {
                        debug!("static mesh without vertex stream");
                    }
                    Ok(())
                },
            ),
            Vs::read_if_record(
                "MOH2010 extra",
                |ctx, s| !s.stripped && ctx.is(GameTag::Moh2010) && ctx.licensee_version >= 58,
                |c, _, _| c.skip(4),
            ),
            Vs::read_if_record(
                "Shadows of the Damned extra",
                |ctx, s| {
                    !s.stripped && ctx.is(GameTag::ShadowsDamned) && ctx.licensee_version >= 26
                },
                |c, _, _| c.skip(4),
            ),
            Vs::read_if_record("positions", stream_present, |c, _, s| {
                s.positions = c.read_bulk_array(|c| c.read_vector())?;
                Ok(())
            }),
        ]]),
    )],
};

/// Explicit parameters of the UV item decoder: how many UV sets each item holds and
/// whether they are stored as floats or halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UvStreamFormat {
    pub num_uv_sets: u32,
    pub full_precision_uvs: bool,
}

impl Default for UvStreamFormat {
    fn default() -> Self {
        UvStreamFormat {
            num_uv_sets: 1,
            full_precision_uvs: true,
        }
    }
}

/// Tangent basis and first UV set of one static vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticUvItem {
    /// Only stored by cooks older than 472, where this stream carried everything.
    pub position: Vector3,
    pub normals: [PackedNormal; 3],
    pub color: u32,
    pub uv: [f32; 2],
}

impl UvStreamFormat {
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

    fn read_tangents(
        &self,
        c: &mut ByteCursor<'_>,
        ctx: &VersionContext,
        item: &mut StaticUvItem,
    ) -> DecodeResult<()> {
        item.normals[0] = c.read_packed_normal()?;
        if ctx.format_version < 477 {
            item.normals[1] = c.read_packed_normal()?;
        }
        item.normals[2] = c.read_packed_normal()?;

        let no_color = (ctx.is(GameTag::Apb) && ctx.licensee_version >= 12)
            || (ctx.is(GameTag::Moh2010) && ctx.licensee_version >= 58)
            || ctx.is(GameTag::Undertow);
        // a separate color stream replaced this at 615
        if !no_color && (434..615).contains(&ctx.format_version) {
            item.color = c.read_u32()?;
        }
        Ok(())
    }

    pub fn read_item(
        &self,
        c: &mut ByteCursor<'_>,
        ctx: &VersionContext,
    ) -> DecodeResult<StaticUvItem> {
        let mut item = StaticUvItem::default();
        if ctx.is(GameTag::Mk) {
            // MK9 keeps the tangents in a separate normal stream
            if ctx.format_version < 472 {
                c.skip(4)?;
                self.read_tangents(c, ctx, &mut item)?;
            }
        } else if ctx.is(GameTag::A51) {
            self.read_tangents(c, ctx, &mut item)?;
        } else if ctx.is(GameTag::Ava) {
            item.normals[0] = c.read_packed_normal()?;
            item.normals[2] = c.read_packed_normal()?;
            item.color = c.read_u32()?;
        } else {
            if ctx.format_version < 472 {
                item.position = c.read_vector()?;
                c.skip(4)?;
            }
            if ctx.is(GameTag::Fury) && ctx.licensee_version >= 7 {
                c.skip(4)?;
            }
            self.read_tangents(c, ctx, &mut item)?;
        }
        item.uv = self.read_uvs(c)?;
        Ok(item)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticUvStream {
    pub num_tex_coords: i32,
    pub item_size: i32,
    pub num_vertices: i32,
    pub format: UvStreamFormat,
    pub items: Vec<StaticUvItem>,
}

type Uvs = Step<StaticUvStream>;

fn read_full_precision(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    s: &mut StaticUvStream,
) -> DecodeResult<()> {
    s.format.full_precision_uvs = c.read_i32()? != 0;
    Ok(())
}

pub static STATIC_UV_STREAM: RuleTable<Layout<StaticUvStream>> = RuleTable {
    record: "StaticUvStream",
    rules: &[Rule::new(
        "all versions",
        always,
        Layout::Steps(&[&[
            Uvs::read("header", |c, _, s| {
                s.num_tex_coords = c.read_i32()?;
                s.item_size = c.read_i32()?;
                s.num_vertices = c.read_i32()?;
                s.format.full_precision_uvs = true;
                Ok(())
            }),
            Uvs::read_if(
                "Turok precision",
                |ctx| ctx.is(GameTag::Turok) && ctx.licensee_version >= 59,
                |c, _, s| {
                    s.format.full_precision_uvs = c.read_i32()? == 0;
                    c.skip(4)
                },
            ),
            Uvs::read_if(
                "full precision flag",
                |ctx| {
                    (ctx.is(GameTag::Ava) && ctx.format_version >= 441)
                        || (ctx.is(GameTag::Moha) && ctx.format_version >= 421)
                        || ctx.format_version >= 474
                },
                read_full_precision,
            ),
            Uvs::read_if(
                "MK half UVs",
                |ctx| ctx.is(GameTag::Mk),
                |_, _, s| {
                    s.format.full_precision_uvs = false;
                    Ok(())
                },
            ),
            Uvs::read_if(
                "A51 precision",
                |ctx| ctx.is(GameTag::A51) && ctx.licensee_version >= 22,
                read_full_precision,
            ),
            Uvs::read_if(
                "title extra",
                |ctx| {
                    (ctx.is(GameTag::Moh2010) && ctx.licensee_version >= 58)
                        || (ctx.is(GameTag::Fury) && ctx.licensee_version >= 34)
                        || (ctx.is(GameTag::ShadowsDamned) && ctx.licensee_version >= 22)
                },
                |c, _, _| c.skip(4),
            ),
            Uvs::read("items", |c, ctx, s| {
                s.format.num_uv_sets = s.num_tex_coords.max(0) as u32;
                let format = s.format;
                s.items = c.read_bulk_array(|c| format.read_item(c, ctx))?;
                Ok(())
            }),
        ]]),
    )],
};

/// Per-vertex colors, or whatever else a title stored with this shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorStream {
    pub item_size: i32,
    pub num_vertices: i32,
    pub colors: Vec<u32>,
}

impl ColorStream {
    pub fn read(c: &mut ByteCursor<'_>) -> DecodeResult<Self> {
        Ok(ColorStream {
            item_size: c.read_i32()?,
            num_vertices: c.read_i32()?,
            colors: c.read_bulk_array(|c| c.read_u32())?,
        })
    }

    /// Since 615 the payload is omitted when the stream is empty.
    pub fn read_sparse(c: &mut ByteCursor<'_>) -> DecodeResult<Self> {
        let item_size = c.read_i32()?;
        let num_vertices = c.read_i32()?;
        let colors = if num_vertices != 0 {
            c.read_bulk_array(|c| c.read_u32())?
        } else {
            Vec::new()
        };
        Ok(ColorStream {
            item_size,
            num_vertices,
            colors,
        })
    }
}

/// Pre-333 static vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LegacyStaticVertex {
    pub position: Vector3,
    pub normals: [PackedNormal; 3],
}

fn read_legacy_vertex(c: &mut ByteCursor<'_>) -> DecodeResult<LegacyStaticVertex> {
    Ok(LegacyStaticVertex {
        position: c.read_vector()?,
        normals: [c.read_packed_normal()?, c.read_packed_normal()?, c.read_packed_normal()?],
    })
}

fn read_legacy_uv_stream(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
) -> DecodeResult<Vec<[f32; 2]>> {
    let uvs = c.read_array(8, |c| c.read_float_uv())?;
    if ctx.format_version < 297 {
        c.read_i32()?;
    }
    Ok(uvs)
}

/// How the vertex data of a [`StaticLod`] is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StaticStreamLayout {
    /// Parallel position and UV streams.
    #[default]
    Separate,
    /// Positions live in the UV items (364..472).
    PositionsInUvStream,
    /// Pre-333 vertex array plus float UV streams.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticLod {
    pub vertex_bulk: Option<BulkDataHeader>,
    pub sections: Vec<StaticMeshSection>,
    pub layout: StaticStreamLayout,
    pub vertex_stream: StaticVertexStream,
    pub uv_stream: StaticUvStream,
    /// MK9 tangent stream, parallel to the UV stream.
    pub mk_normals: Option<Vec<[PackedNormal; 3]>>,
    pub colors: Vec<ColorStream>,
    pub legacy_vertices: Vec<LegacyStaticVertex>,
    pub legacy_uv_streams: Vec<Vec<[f32; 2]>>,
    /// MK and AVA sometimes store twice as many UV items as positions; the position
    /// stream is then repeated.
    pub may_duplicate_positions: bool,
    pub num_vertices: i32,
    pub indices: Vec<u32>,
    pub wireframe_indices: Vec<u32>,
    pub adjacency_indices: Vec<u32>,
    pub edges: Vec<Edge>,
    pub face_flags: Vec<u8>,
}

const STATIC_LOD_MIN_SIZE: usize = 4;

type Lod = Step<StaticLod>;

fn read_vertex_stream(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut StaticLod,
) -> DecodeResult<()> {
    l.vertex_stream = STATIC_VERTEX_STREAM.decode(c, ctx)?;
    Ok(())
}

fn read_uv_stream(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut StaticLod,
) -> DecodeResult<()> {
    l.uv_stream = STATIC_UV_STREAM.decode(c, ctx)?;
    Ok(())
}

fn read_color_stream(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    l: &mut StaticLod,
) -> DecodeResult<()> {
    l.colors.push(ColorStream::read(c)?);
    Ok(())
}

fn read_sparse_color_stream(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    l: &mut StaticLod,
) -> DecodeResult<()> {
    l.colors.push(ColorStream::read_sparse(c)?);
    Ok(())
}

fn read_num_vertices(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    l: &mut StaticLod,
) -> DecodeResult<()> {
    l.num_vertices = c.read_i32()?;
    Ok(())
}

fn read_indices(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut StaticLod,
) -> DecodeResult<()> {
    l.indices = read_index_buffer(c, ctx)?;
    Ok(())
}

fn read_wireframe_indices(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut StaticLod,
) -> DecodeResult<()> {
    l.wireframe_indices = read_index_buffer(c, ctx)?;
    Ok(())
}

fn read_edges(c: &mut ByteCursor<'_>, ctx: &VersionContext, l: &mut StaticLod) -> DecodeResult<()> {
    l.edges = read_edges_bulk(c, ctx)?;
    l.face_flags = read_u8_array(c)?;
    Ok(())
}

fn mark_duplicable(
    _: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut StaticLod,
) -> DecodeResult<()> {
    l.may_duplicate_positions = ctx.is(GameTag::Mk) || ctx.is(GameTag::Ava);
    Ok(())
}

const LOD_HEAD: &[Lod] = &[
    Lod::read_if(
        "Fury end offset",
        |ctx| ctx.is(GameTag::Fury) && ctx.licensee_version >= 8,
        |c, _, _| c.skip(4),
    ),
    Lod::read_if(
        "Fury extra",
        |ctx| ctx.is(GameTag::Fury) && ctx.licensee_version >= 18,
        |c, _, _| c.skip(4),
    ),
    Lod::read_if(
        "Huxley item size",
        |ctx| ctx.is(GameTag::Huxley) && ctx.licensee_version >= 14,
        |c, _, _| c.skip(4),
    ),
    Lod::read_if("APB bulk seek", |ctx| ctx.is(GameTag::Apb), |c, _, _| c.skip(8)),
    Lod::read_if(
        "bulk data",
        |ctx| !ctx.is(GameTag::Apb) && ctx.format_version >= 218,
        |c, _, l| {
            l.vertex_bulk = Some(c.skip_bulk_data()?);
            Ok(())
        },
    ),
    Lod::read_if(
        "TLR bulk data",
        |ctx| ctx.is(GameTag::Tlr) && ctx.licensee_version >= 2,
        |c, _, _| c.skip_bulk_data().map(|_| ()),
    ),
    Lod::read("sections", |c, ctx, l| {
        l.sections = STATIC_MESH_SECTION.decode_array(c, ctx, SECTION_MIN_SIZE)?;
        Ok(())
    }),
];

const LOD_STREAMS: &[Lod] = &[
    Lod::read("vertex stream", read_vertex_stream),
    Lod::read("uv stream", read_uv_stream),
    Lod::read_if(
        "sparse color stream",
        |ctx| {
            (ctx.is(GameTag::Moh2010) && ctx.licensee_version >= 55)
                || (ctx.is(GameTag::BladeNSoul) && ctx.format_version >= 572)
                || ctx.format_version >= 615
        },
        read_sparse_color_stream,
    ),
    Lod::read_if("color stream", |ctx| ctx.format_version < 686, read_color_stream),
    Lod::read("vertex count", read_num_vertices),
];

const LOD_STREAMS_MK_NORMALS: &[Lod] = &[
    Lod::read("vertex stream", read_vertex_stream),
    Lod::read("color stream", read_color_stream),
    Lod::read("normal stream", |c, _, l| {
        c.read_i32()?;
        c.read_i32()?;
        let normals = c.read_bulk_array(|c| {
            Ok([c.read_packed_normal()?, c.read_packed_normal()?, c.read_packed_normal()?])
        })?;
        l.mk_normals = Some(normals);
        Ok(())
    }),
    Lod::read("uv stream", read_uv_stream),
    Lod::read("vertex count", read_num_vertices),
    Lod::read("duplication", mark_duplicable),
];

const LOD_STREAMS_466: &[Lod] = &[
    Lod::read("vertex stream", read_vertex_stream),
    Lod::read("uv stream", read_uv_stream),
    Lod::read("vertex count", read_num_vertices),
    Lod::read("duplication", mark_duplicable),
];

const LOD_STREAMS_364: &[Lod] = &[
    Lod::read("uv stream with positions", |c, ctx, l| {
        l.layout = StaticStreamLayout::PositionsInUvStream;
        read_uv_stream(c, ctx, l)
    }),
    Lod::read("vertex count", read_num_vertices),
];

const LOD_STREAMS_LEGACY: &[Lod] = &[Lod::read("legacy vertices", |c, ctx, l| {
    l.layout = StaticStreamLayout::Legacy;
    l.legacy_vertices = c.read_array(24, read_legacy_vertex)?;
    l.legacy_uv_streams = c.read_array(4, |c| read_legacy_uv_stream(c, ctx))?;
    Ok(())
})];

const LOD_BORDERLANDS: &[Lod] = &[
    Lod::read("vertex stream", read_vertex_stream),
    Lod::read("uv stream", read_uv_stream),
    Lod::read("vertex count", read_num_vertices),
    Lod::read("indices", read_indices),
];

const LOD_TRANSFORMERS: &[Lod] = &[
    Lod::read("vertex stream", read_vertex_stream),
    Lod::read("uv stream", read_uv_stream),
    Lod::read_if(
        "sparse color stream",
        |ctx| ctx.format_version >= 536,
        read_sparse_color_stream,
    ),
    Lod::read_if(
        "extra stream",
        |ctx| ctx.licensee_version >= 71,
        |c, _, _| skip_transformers_stream(c),
    ),
    Lod::read_if("color stream", |ctx| ctx.format_version < 536, read_color_stream),
    Lod::read("vertex count", read_num_vertices),
    Lod::read("indices", read_indices),
    Lod::read("wireframe indices", read_wireframe_indices),
    Lod::read_if("wireframe extra", |ctx| ctx.licensee_version >= 58, |c, _, _| c.skip(4)),
    Lod::read_if("edges", |ctx| ctx.format_version < 536, read_edges),
];

const LOD_TAIL: &[Lod] = &[
    Lod::read("indices", read_indices),
    Lod::read_if(
        "wireframe indices",
        |ctx| !ctx.is(GameTag::EndWar) && !ctx.is(GameTag::Apb),
        read_wireframe_indices,
    ),
    Lod::read_if("APB index seek", |ctx| ctx.is(GameTag::Apb), |c, _, _| c.skip(8)),
    Lod::read_if("edges", |ctx| ctx.format_version < 686, read_edges),
    Lod::read_if(
        "Alpha Protocol extra",
        |ctx| ctx.is(GameTag::AlphaProtocol) && ctx.licensee_version >= 4,
        |c, _, _| c.skip_bulk_array(),
    ),
    Lod::read_if(
        "AVA extra",
        |ctx| ctx.is(GameTag::Ava) && ctx.licensee_version >= 2,
        |c, _, _| c.skip(8),
    ),
    Lod::read_if(
        "AVA bulk data",
        |ctx| ctx.is(GameTag::Ava) && ctx.licensee_version >= 4,
        |c, _, _| {
            for _ in 0..8 {
                c.skip_bulk_data()?;
            }
            Ok(())
        },
    ),
    Lod::read_if(
        "adjacency indices",
        |ctx| ctx.format_version >= 841,
        |c, ctx, l| {
            l.adjacency_indices = read_index_buffer(c, ctx)?;
            Ok(())
        },
    ),
];

pub static STATIC_LOD: RuleTable<Layout<StaticLod>> = RuleTable {
    record: "StaticLod",
    rules: &[
        Rule::new(
            "A51",
            |ctx| ctx.is(GameTag::A51),
            Layout::Steps(&[LOD_HEAD, LOD_STREAMS, LOD_TAIL]),
        ),
        Rule::new(
            "MK normal stream",
            |ctx| ctx.is(GameTag::Mk) && ctx.format_version >= 472,
            Layout::Steps(&[LOD_HEAD, LOD_STREAMS_MK_NORMALS, LOD_TAIL]),
        ),
        Rule::new(
            "MK and AVA",
            |ctx| ctx.is(GameTag::Mk) || ctx.is(GameTag::Ava),
            Layout::Steps(&[LOD_HEAD, LOD_STREAMS_466, LOD_TAIL]),
        ),
        Rule::new(
            "Borderlands",
            |ctx| ctx.is(GameTag::Borderlands),
            Layout::Steps(&[LOD_HEAD, LOD_BORDERLANDS]),
        ),
        Rule::new(
            "Transformers",
            |ctx| ctx.is(GameTag::Transformers),
            Layout::Steps(&[LOD_HEAD, LOD_TRANSFORMERS]),
        ),
        Rule::fallback(
            "separate streams",
            |ctx| ctx.format_version >= 472,
            Layout::Steps(&[LOD_HEAD, LOD_STREAMS, LOD_TAIL]),
        ),
        Rule::fallback(
            "separate streams without colors",
            |ctx| ctx.format_version >= 466,
            Layout::Steps(&[LOD_HEAD, LOD_STREAMS_466, LOD_TAIL]),
        ),
        Rule::fallback(
            "positions in uv stream",
            |ctx| ctx.format_version >= 364,
            Layout::Steps(&[LOD_HEAD, LOD_STREAMS_364, LOD_TAIL]),
        ),
        Rule::new(
            "quaternion vertex stream",
            |ctx| ctx.format_version >= 333,
            Layout::Unsupported("compressed vertex stream between 333 and 364"),
        ),
        Rule::fallback(
            "legacy vertices",
            always,
            Layout::Steps(&[LOD_HEAD, LOD_STREAMS_LEGACY, LOD_TAIL]),
        ),
    ],
};

/// Node of the collision kDOP tree.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KDopNode {
    pub bounds: [Vector3; 2],
    pub index: i32,
    pub children: [i32; 2],
}

type Node = Step<KDopNode>;

/// Node bounds. Enslaved quantizes them to shorts.
fn read_kdop_bounds(c: &mut ByteCursor<'_>, ctx: &VersionContext) -> DecodeResult<[Vector3; 2]> {
    if ctx.is(GameTag::Enslaved) {
        let mut v = [0f32; 6];
        for slot in &mut v {
            *slot = c.read_i16()? as f32;
        }
        return Ok([Vector3::new(v[0], v[1], v[2]), Vector3::new(v[3], v[4], v[5])]);
    }
    Ok([c.read_vector()?, c.read_vector()?])
}

fn is_dcu_compact(ctx: &VersionContext) -> bool {
    ctx.is(GameTag::DcUniverse) && (ctx.licensee_version & 0xFF00) >= 0xA00
}

/// Whether kDOP nodes and triangles store their indices as shorts.
fn kdop_short_indices(ctx: &VersionContext) -> bool {
    if (ctx.is(GameTag::Frontlines) && ctx.licensee_version >= 7)
        || (ctx.is(GameTag::Moha) && ctx.licensee_version >= 8)
    {
        return true;
    }
    if ctx.is(GameTag::Mk) {
        return false;
    }
    ctx.format_version < 209 || ctx.format_version >= 468
}

pub static KDOP_NODE: RuleTable<Layout<KDopNode>> = RuleTable {
    record: "KDopNode",
    rules: &[
        Rule::new(
            "Enslaved",
            |ctx| ctx.is(GameTag::Enslaved),
            Layout::Steps(&[&[Node::read("compressed node", |c, ctx, n| {
                n.bounds = read_kdop_bounds(c, ctx)?;
                n.children = [c.read_u8()? as i32, c.read_u8()? as i32];
                n.index = c.read_i16()? as i32;
                Ok(())
            })]]),
        ),
        Rule::new(
            "DC Universe shared bounds",
            is_dcu_compact,
            Layout::Steps(&[&[Node::read("node", |c, _, n| {
                n.index = c.read_i32()?;
                n.children = [c.read_i16()? as i32, c.read_i16()? as i32];
                Ok(())
            })]]),
        ),
        Rule::new(
            "stock",
            always,
            Layout::Steps(&[&[Node::read("node", |c, ctx, n| {
                n.bounds = read_kdop_bounds(c, ctx)?;
                n.index = c.read_i32()?;
                n.children = if kdop_short_indices(ctx) {
                    [c.read_i16()? as i32, c.read_i16()? as i32]
                } else {
                    [c.read_i32()?, c.read_i32()?]
                };
                Ok(())
            })]]),
        ),
    ],
};

fn read_kdop_triangle(c: &mut ByteCursor<'_>, ctx: &VersionContext) -> DecodeResult<[i32; 4]> {
    let short = (ctx.is(GameTag::Fury) && ctx.licensee_version >= 25) || kdop_short_indices(ctx);
    let mut tri = [0; 4];
    for slot in &mut tri {
        *slot = if short { c.read_i16()? as i32 } else { c.read_i32()? };
    }
    Ok(tri)
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticMesh {
    pub bounds: BoxSphereBounds,
    /// Object reference of the physics body setup.
    pub body_setup: i32,
    pub source_file_name: Option<String>,
    pub kdop_nodes: Vec<KDopNode>,
    /// Tree bounds shared by the compact nodes used since 770.
    pub kdop_bounds: Option<[Vector3; 2]>,
    pub kdop_compact_nodes: Vec<[u8; 6]>,
    pub kdop_triangles: Vec<[i32; 4]>,
    pub internal_version: i32,
    /// Name references as (index, number).
    pub content_tags: Vec<[i32; 2]>,
    pub extra_lod: Option<StaticLod>,
    pub lods: Vec<StaticLod>,
}

type Mesh = Step<StaticMesh>;

fn read_kdop_nodes(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    m: &mut StaticMesh,
) -> DecodeResult<()> {
    m.kdop_nodes = KDOP_NODE.decode_bulk_array(c, ctx)?;
    Ok(())
}

fn read_kdop_triangles(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    m: &mut StaticMesh,
) -> DecodeResult<()> {
    m.kdop_triangles = c.read_bulk_array(|c| read_kdop_triangle(c, ctx))?;
    Ok(())
}

fn read_compact_kdop(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    m: &mut StaticMesh,
) -> DecodeResult<()> {
    m.kdop_bounds = Some(read_kdop_bounds(c, ctx)?);
    m.kdop_compact_nodes = c.read_bulk_array(|c| {
        let mut node = [0u8; 6];
        node.copy_from_slice(c.read(6)?);
        Ok(node)
    })?;
    Ok(())
}

fn read_lods(c: &mut ByteCursor<'_>, ctx: &VersionContext, m: &mut StaticMesh) -> DecodeResult<()> {
    m.lods = STATIC_LOD.decode_array(c, ctx, STATIC_LOD_MIN_SIZE)?;
    Ok(())
}

const MESH_HEAD: &[Mesh] = &[
    Mesh::read_if(
        "Fury extra",
        |ctx| ctx.is(GameTag::Fury) && ctx.licensee_version >= 14,
        |c, _, _| c.skip(8),
    ),
    Mesh::read_if(
        "Dark Void extra",
        |ctx| ctx.is(GameTag::DarkVoid) && ctx.licensee_version >= 5,
        |c, _, _| c.skip(8),
    ),
    Mesh::read_if(
        "Dark Void flag",
        |ctx| ctx.is(GameTag::DarkVoid) && ctx.licensee_version >= 6,
        |c, _, _| c.skip(4),
    ),
    Mesh::read_if(
        "Tera source file",
        |ctx| ctx.is(GameTag::Tera) && ctx.licensee_version >= 3,
        |c, _, m| {
            m.source_file_name = Some(c.read_fstring()?);
            Ok(())
        },
    ),
];

const MESH_BOUNDS: &[Mesh] = &[
    Mesh::read("bounds and body setup", |c, _, m| {
        m.bounds = BoxSphereBounds::read(c)?;
        m.body_setup = c.read_i32()?;
        Ok(())
    }),
    Mesh::read_if(
        "Turok extra",
        |ctx| ctx.is(GameTag::Turok) && ctx.licensee_version >= 59,
        |c, _, _| c.skip(8),
    ),
    Mesh::read_if("legacy reference", |ctx| ctx.format_version < 315, |c, _, _| c.skip(4)),
];

const MESH_KDOP_NODES: &[Mesh] = &[
    Mesh::read_if("kDOP nodes", |ctx| ctx.format_version < 770, read_kdop_nodes),
    Mesh::read_if("compact kDOP", |ctx| ctx.format_version >= 770, read_compact_kdop),
];

/// Singularity writes the old tree and then the compact one.
const MESH_KDOP_TWICE: &[Mesh] = &[
    Mesh::read("kDOP nodes", read_kdop_nodes),
    Mesh::read("kDOP triangles", read_kdop_triangles),
    Mesh::read("compact kDOP", read_compact_kdop),
];

const MESH_KDOP_COMPACT: &[Mesh] = &[Mesh::read("compact kDOP", read_compact_kdop)];

const MESH_KDOP_TRIANGLES: &[Mesh] = &[
    Mesh::read_if(
        "Fury kDOP extra",
        |ctx| ctx.is(GameTag::Fury) && ctx.licensee_version >= 32,
        |c, _, _| c.skip(4),
    ),
    Mesh::read("kDOP triangles", read_kdop_triangles),
    Mesh::read_if("DC Universe tree bounds", is_dcu_compact, |c, ctx, m| {
        m.kdop_bounds = Some(read_kdop_bounds(c, ctx)?);
        Ok(())
    }),
];

const MESH_VERSION: &[Mesh] = &[
    Mesh::read("internal version", |c, _, m| {
        m.internal_version = c.read_i32()?;
        Ok(())
    }),
    Mesh::read_if(
        "Fury extras",
        |ctx| ctx.is(GameTag::Fury),
        |c, ctx, m| {
            if ctx.licensee_version >= 34 {
                c.skip(4)?;
            }
            if ctx.licensee_version >= 33 {
                c.skip(4)?;
            }
            if ctx.licensee_version >= 8 {
                c.read_array(1, |c| {
                    if ctx.format_version < 297 {
                        c.skip(4)?;
                    }
                    if ctx.licensee_version >= 4 {
                        c.skip(12)?;
                        read_i16_array(c)?;
                    }
                    Ok(())
                })?;
            }
            // Fury writes 18 but lays out the rest like 16
            m.internal_version = 16;
            Ok(())
        },
    ),
];

const MESH_EXTRAS: &[Mesh] = &[
    Mesh::read_if_record(
        "content tags",
        |ctx, m| m.internal_version >= 17 && ctx.format_version < 593,
        |c, _, m| {
            m.content_tags = read_pair_array(c)?;
            Ok(())
        },
    ),
    Mesh::read_if(
        "extra LOD",
        |ctx| ctx.format_version >= 823,
        |c, ctx, m| {
            if c.read_i32()? != 0 {
                m.extra_lod = Some(STATIC_LOD.decode(c, ctx)?);
            }
            if ctx.format_version < 829 {
                read_i32_array(c)?;
            } else {
                let count = c.read_count(7)?;
                c.skip(count * 7)?;
            }
            c.skip(4)
        },
    ),
    Mesh::read_if(
        "Shadows of the Damned extra",
        |ctx| ctx.is(GameTag::ShadowsDamned) && ctx.licensee_version >= 26,
        |c, _, _| c.skip(4),
    ),
];

const MESH_DOH: &[Mesh] = &[Mesh::read("DOH tree extras", |c, _, m| {
    c.read_vector()?;
    m.internal_version = c.read_i32()?;
    c.read_array(12, |c| c.read_vector())?;
    c.skip(4)
})];

const MESH_LODS: &[Mesh] = &[Mesh::read("lods", read_lods)];

pub static STATIC_MESH: RuleTable<Layout<StaticMesh>> = RuleTable {
    record: "StaticMesh",
    rules: &[
        Rule::new(
            "Transformers raw tree",
            |ctx| ctx.is(GameTag::Transformers) && ctx.licensee_version >= 50,
            Layout::Steps(&[
                MESH_HEAD,
                &[
                    Mesh::read("kDOP nodes", read_kdop_nodes),
                    Mesh::read("kDOP triangles", read_kdop_triangles),
                ],
                MESH_LODS,
            ]),
        ),
        Rule::new(
            "EndWar without kDOP",
            |ctx| ctx.is(GameTag::EndWar),
            Layout::Steps(&[MESH_HEAD, MESH_BOUNDS, MESH_VERSION, MESH_EXTRAS, MESH_LODS]),
        ),
        Rule::new(
            "Singularity",
            |ctx| ctx.is(GameTag::Singularity),
            Layout::Steps(&[
                MESH_HEAD,
                MESH_BOUNDS,
                MESH_KDOP_TWICE,
                MESH_KDOP_TRIANGLES,
                MESH_VERSION,
                MESH_EXTRAS,
                MESH_LODS,
            ]),
        ),
        Rule::new(
            "Bulletstorm compact kDOP",
            |ctx| ctx.is(GameTag::Bulletstorm) && ctx.format_version >= 739,
            Layout::Steps(&[
                MESH_HEAD,
                MESH_BOUNDS,
                MESH_KDOP_COMPACT,
                MESH_KDOP_TRIANGLES,
                MESH_VERSION,
                MESH_EXTRAS,
                MESH_LODS,
            ]),
        ),
        Rule::new(
            "DOH",
            |ctx| ctx.is(GameTag::Doh) && ctx.licensee_version >= 73,
            Layout::Steps(&[
                MESH_HEAD,
                MESH_BOUNDS,
                MESH_KDOP_NODES,
                MESH_KDOP_TRIANGLES,
                MESH_DOH,
                MESH_LODS,
            ]),
        ),
        Rule::new(
            "Transformers",
            |ctx| ctx.is(GameTag::Transformers),
            Layout::Steps(&[
                MESH_HEAD,
                MESH_BOUNDS,
                MESH_KDOP_NODES,
                MESH_KDOP_TRIANGLES,
                MESH_VERSION,
                MESH_LODS,
            ]),
        ),
        Rule::fallback(
            "stock",
            always,
            Layout::Steps(&[
                MESH_HEAD,
                MESH_BOUNDS,
                MESH_KDOP_NODES,
                MESH_KDOP_TRIANGLES,
                MESH_VERSION,
                MESH_EXTRAS,
                MESH_LODS,
            ]),
        ),
    ],
};

/// Decode the native part of a static mesh object that follows its properties. The
/// cursor is left at the stopper.
pub fn decode_static_mesh(
    cursor: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    sink: &mut dyn DiagnosticSink,
) -> DecodeResult<StaticMesh> {
    note_default_layout(&STATIC_MESH, ctx, sink);
    note_default_layout(&STATIC_LOD, ctx, sink);
    let mesh = STATIC_MESH.decode(cursor, ctx)?;
    debug!(
        lods = mesh.lods.len(),
        kdop_nodes = mesh.kdop_nodes.len() + mesh.kdop_compact_nodes.len(),
        internal_version = mesh.internal_version,
        "static mesh"
    );
    for (index, lod) in mesh.lods.iter().enumerate() {
        if !lod.adjacency_indices.is_empty() {
            sink.report(Diagnostic::ExtraData {
                record: STATIC_LOD.record.to_string(),
                detail: format!(
                    "LOD {index} has an extra index buffer of {} items",
                    lod.adjacency_indices.len()
                ),
            });
        }
    }
    if mesh.extra_lod.is_some() {
        sink.report(Diagnostic::ExtraData {
            record: STATIC_MESH.record.to_string(),
            detail: "extra LOD model".to_string(),
        });
    }
    cursor.seek_to_stopper();
    Ok(mesh)
}
