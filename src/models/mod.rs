/// Skeletal mesh LOD records: sections, chunks, GPU skin and influences
pub mod skeletal;
/// Static mesh LOD records, streams and the mesh header
pub mod static_mesh;
/// Per-vertex records shared by the skeletal and GPU streams
pub mod vertex;

use crate::codecs::Vector3;
use crate::data::{ByteCursor, GameTag, VersionContext};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::DecodeResult;
use crate::schema::{Layout, Rule, RuleTable, Step};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxSphereBounds {
    pub origin: Vector3,
    pub box_extent: Vector3,
    pub sphere_radius: f32,
}

impl BoxSphereBounds {
    pub fn read(cursor: &mut ByteCursor<'_>) -> DecodeResult<Self> {
        Ok(BoxSphereBounds {
            origin: cursor.read_vector()?,
            box_extent: cursor.read_vector()?,
            sphere_radius: cursor.read_f32()?,
        })
    }
}

/// Mesh edge linking two vertices and the two faces on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    pub vertices: [i32; 2],
    pub faces: [i32; 2],
}

pub const EDGE_MIN_SIZE: usize = 8;

type E = Step<Edge>;

pub static EDGE: RuleTable<Layout<Edge>> = RuleTable {
    record: "Edge",
    rules: &[
        Rule::new(
            "Batman short edges",
            |ctx| ctx.is(GameTag::Batman) && ctx.licensee_version >= 5,
            Layout::Steps(&[&[E::read("vertices and faces", |c, _, e| {
                e.vertices = [c.read_i16()? as i32, c.read_i16()? as i32];
                e.faces = [c.read_i16()? as i32, c.read_i16()? as i32];
                Ok(())
            })]]),
        ),
        Rule::new(
            "int edges",
            crate::schema::always,
            Layout::Steps(&[&[E::read("vertices and faces", |c, _, e| {
                e.vertices = [c.read_i32()?, c.read_i32()?];
                e.faces = [c.read_i32()?, c.read_i32()?];
                Ok(())
            })]]),
        ),
    ],
};

/// Edges serialized as a bulk array.
pub fn read_edges_bulk(
    cursor: &mut ByteCursor<'_>,
    ctx: &VersionContext,
) -> DecodeResult<Vec<Edge>> {
    EDGE.decode_bulk_array(cursor, ctx)
}

/// 16-bit index buffer. Before 297 a trailing revision number follows the indices.
pub fn read_index_buffer(
    cursor: &mut ByteCursor<'_>,
    ctx: &VersionContext,
) -> DecodeResult<Vec<u32>> {
    let indices = cursor.read_bulk_array(|c| c.read_u16().map(u32::from))?;
    if ctx.format_version < 297 {
        cursor.read_i32()?;
    }
    Ok(indices)
}

/// Skeletal index buffer. Since 806 it declares its element width and may hold 32-bit
/// indices.
pub fn read_skel_index_buffer(
    cursor: &mut ByteCursor<'_>,
    ctx: &VersionContext,
) -> DecodeResult<Vec<u32>> {
    let mut item_size = 2;
    if ctx.format_version >= 806 {
        cursor.read_i32()?;
        item_size = cursor.read_u8()?;
    }
    let indices = match item_size {
        4 => cursor.read_bulk_array(|c| c.read_u32())?,
        _ => cursor.read_bulk_array(|c| c.read_u16().map(u32::from))?,
    };
    if ctx.format_version < 297 {
        cursor.read_i32()?;
    }
    Ok(indices)
}

/// Count-prefixed array of signed 16-bit values.
pub(crate) fn read_i16_array(cursor: &mut ByteCursor<'_>) -> DecodeResult<Vec<i16>> {
    cursor.read_array(2, |c| c.read_i16())
}

pub(crate) fn read_i32_array(cursor: &mut ByteCursor<'_>) -> DecodeResult<Vec<i32>> {
    cursor.read_array(4, |c| c.read_i32())
}

pub(crate) fn read_u8_array(cursor: &mut ByteCursor<'_>) -> DecodeResult<Vec<u8>> {
    let count = cursor.read_count(1)?;
    Ok(cursor.read(count)?.to_vec())
}

/// Report rows that are the stock layout standing in for a licensee title.
pub(crate) fn note_default_layout<P>(
    table: &RuleTable<P>,
    ctx: &VersionContext,
    sink: &mut dyn DiagnosticSink,
) {
    if ctx.is(GameTag::Unreal3) {
        return;
    }
    match table.resolve(ctx) {
        Ok(rule) if rule.fallback => sink.report(Diagnostic::DefaultLayout {
            record: table.record.to_string(),
            rule: rule.name.to_string(),
            context: *ctx,
        }),
        _ => {}
    }
}

/// Report when two counts that should agree differ.
pub(crate) fn check_count(
    sink: &mut dyn DiagnosticSink,
    record: &str,
    what: &str,
    expected: usize,
    actual: usize,
) {
    if expected != actual {
        sink.report(Diagnostic::CountMismatch {
            record: record.to_string(),
            what: what.to_string(),
            expected,
            actual,
        });
    }
}
