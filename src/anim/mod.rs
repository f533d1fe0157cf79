//! Animation track decompression.
//!
//! An animation set names the bones it animates and holds sequences. A sequence is either
//! a table of per-bone offsets into one compressed byte stream, or, for uncompressed data,
//! a list of raw key tracks. [`decode_anim_set`] turns either form into per-bone
//! [`AnimTrack`]s.

mod decompress;
mod format;

use bon::Builder;
use tracing::debug;

pub use decompress::{ANIM_PROFILE, AnimProfile, decode_sequence};
pub use format::{AnimationCompressionFormat, KeyEncodingFormat};

use crate::codecs::{Quat, Vector3};
use crate::data::VersionContext;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::DecodeResult;
use crate::recognized::Recognized;

/// Uncompressed keys of one bone.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawAnimTrack {
    pub positions: Vec<Vector3>,
    pub rotations: Vec<Quat>,
    /// In frames. May be empty.
    pub times: Vec<f32>,
}

/// The fields of one sequence object that drive decompression.
#[derive(Debug, Clone, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimSequenceInput {
    #[builder(into)]
    pub name: String,
    pub num_frames: i32,
    /// Seconds.
    pub sequence_length: f32,
    #[builder(default = 1.0)]
    pub rate_scale: f32,
    #[builder(default = Recognized::Known(AnimationCompressionFormat::None))]
    pub translation_format: Recognized<AnimationCompressionFormat>,
    #[builder(default = Recognized::Known(AnimationCompressionFormat::None))]
    pub rotation_format: Recognized<AnimationCompressionFormat>,
    #[builder(default = Recognized::Known(KeyEncodingFormat::ConstantKeyLerp))]
    pub key_encoding: Recognized<KeyEncodingFormat>,
    #[builder(default)]
    pub track_offsets: Vec<i32>,
    #[builder(default)]
    pub byte_stream: Vec<u8>,
    #[builder(default)]
    pub raw_tracks: Vec<RawAnimTrack>,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimSetInput {
    pub track_bone_names: Vec<String>,
    pub sequences: Vec<AnimSequenceInput>,
}

/// Keys of one bone in one sequence. Empty key lists mean the bone keeps its bind pose
/// for that channel. Time arrays are only filled for variable-rate streams.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimTrack {
    pub bone: String,
    pub positions: Vec<Vector3>,
    pub position_times: Vec<f32>,
    pub rotations: Vec<Quat>,
    pub rotation_times: Vec<f32>,
}

impl AnimTrack {
    fn new(bone: &str) -> Self {
        AnimTrack {
            bone: bone.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimSequence {
    pub name: String,
    pub num_frames: i32,
    /// Frames per second.
    pub rate: f32,
    pub tracks: Vec<AnimTrack>,
}

impl AnimSequence {
    pub fn track(&self, bone: &str) -> Option<&AnimTrack> {
        self.tracks.iter().find(|track| track.bone.eq_ignore_ascii_case(bone))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimSet {
    pub bones: Vec<String>,
    pub sequences: Vec<AnimSequence>,
}

impl AnimSet {
    pub fn sequence(&self, name: &str) -> Option<&AnimSequence> {
        self.sequences.iter().find(|seq| seq.name == name)
    }
}

/// Decode every sequence of a set. A sequence that cannot be decoded is reported as
/// skipped and left out.
pub fn decode_anim_set(
    input: &AnimSetInput,
    ctx: &VersionContext,
    sink: &mut dyn DiagnosticSink,
) -> DecodeResult<AnimSet> {
    let profile = ANIM_PROFILE.resolve_value(ctx)?;
    let mut set = AnimSet {
        bones: input.track_bone_names.clone(),
        sequences: Vec::with_capacity(input.sequences.len()),
    };
    for seq in &input.sequences {
        match decode_sequence(seq, &input.track_bone_names, ctx, profile, sink) {
            Ok(decoded) => set.sequences.push(decoded),
            Err(e) => sink.report(Diagnostic::SequenceSkipped {
                sequence: seq.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
    debug!(
        bones = set.bones.len(),
        sequences = set.sequences.len(),
        skipped = input.sequences.len() - set.sequences.len(),
        "decoded animation set"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ByteWriter;

    fn bones(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn raw_tracks_are_copied_with_scaled_times() {
        let seq = AnimSequenceInput::builder()
            .name("Idle")
            .num_frames(30)
            .sequence_length(1.0)
            .raw_tracks(vec![RawAnimTrack {
                positions: vec![Vector3::new(1.0, 2.0, 3.0)],
                rotations: vec![Quat::IDENTITY, Quat::IDENTITY],
                times: vec![0.0, 0.5],
            }])
            .build();
        let input = AnimSetInput {
            track_bone_names: bones(&["Root"]),
            sequences: vec![seq],
        };
        let ctx = VersionContext::builder().format_version(584).build();
        let mut sink: Vec<Diagnostic> = Vec::new();
        let set = decode_anim_set(&input, &ctx, &mut sink).unwrap();
        let seq = set.sequence("Idle").unwrap();
        assert_eq!(seq.rate, 30.0);
        let track = seq.track("root").unwrap();
        assert_eq!(track.positions, vec![Vector3::new(1.0, 2.0, 3.0)]);
        assert_eq!(track.rotations.len(), 2);
        assert_eq!(track.rotation_times, vec![0.0, 15.0]);
        assert!(sink.is_empty());
    }

    #[test]
    fn wrong_offset_table_skips_only_that_sequence() {
        let good = AnimSequenceInput::builder()
            .name("Good")
            .num_frames(2)
            .sequence_length(1.0)
            .track_offsets(vec![-1, 0, -1, 0])
            .build();
        let bad = AnimSequenceInput::builder()
            .name("Bad")
            .num_frames(2)
            .sequence_length(1.0)
            .track_offsets(vec![0, 1, 12])
            .byte_stream(ByteWriter::new().zeros(12).finish())
            .build();
        let input = AnimSetInput {
            track_bone_names: bones(&["Root"]),
            sequences: vec![bad, good],
        };
        let ctx = VersionContext::builder().format_version(584).build();
        let mut sink: Vec<Diagnostic> = Vec::new();
        let set = decode_anim_set(&input, &ctx, &mut sink).unwrap();
        assert_eq!(set.sequences.len(), 1);
        assert_eq!(set.sequences[0].name, "Good");
        assert!(matches!(
            &sink[..],
            [Diagnostic::SequenceSkipped { sequence, .. }] if sequence == "Bad"
        ));
    }
}
