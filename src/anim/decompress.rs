use tracing::{debug, trace, warn};

use super::format::{AnimationCompressionFormat, KeyEncodingFormat};
use super::{AnimSequence, AnimSequenceInput, AnimTrack};
use crate::codecs::{
    Quat, QuatCodec, Vector3, VectorCodec, decode_fixed32_no_w, decode_fixed48_no_w,
    decode_float32_no_w, decode_interval_fixed32_no_w, decode_vector_fixed48,
    decode_vector_interval_fixed32, restore_quat_w, transformers_modify_quat,
};
use crate::data::{ByteCursor, GameTag, VersionContext};
use crate::diagnostics::{Diagnostic, DiagnosticSink, TrackChannel};
use crate::error::{DecodeError, DecodeResult};
use crate::recognized::Recognized;
use crate::schema::{Rule, RuleTable, always};

/// Per-title deviations of the compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimProfile {
    /// Offset table stride when the title overrides the 4 (or 2 for per-track) default.
    pub offsets_per_bone: Option<usize>,
    /// The two extra offsets per bone locate scale keys, which are skipped.
    pub scale_channel: bool,
    /// Tracks of four or more translation keys may start with a scale/offset header.
    pub packed_translation: bool,
    /// Interval rotation keys are post-multiplied by a per-track modifier quaternion.
    pub rotation_modifier: bool,
    /// Rotation tracks never store their `(min, range)` pair.
    pub skip_rotation_ranges: bool,
}

const STOCK: AnimProfile = AnimProfile {
    offsets_per_bone: None,
    scale_channel: false,
    packed_translation: false,
    rotation_modifier: false,
    skip_rotation_ranges: false,
};

pub static ANIM_PROFILE: RuleTable<AnimProfile> = RuleTable {
    record: "AnimSequence",
    rules: &[
        Rule::new(
            "TLR scale keys",
            |ctx| ctx.is(GameTag::Tlr),
            AnimProfile {
                offsets_per_bone: Some(6),
                scale_channel: true,
                ..STOCK
            },
        ),
        Rule::new(
            "X-Men cut info",
            |ctx| ctx.is(GameTag::XMen),
            AnimProfile {
                offsets_per_bone: Some(6),
                ..STOCK
            },
        ),
        Rule::new(
            "Transformers",
            |ctx| ctx.is(GameTag::Transformers),
            AnimProfile {
                packed_translation: true,
                rotation_modifier: true,
                ..STOCK
            },
        ),
        Rule::new(
            "Shadows of the Damned",
            |ctx| ctx.is(GameTag::ShadowsDamned),
            AnimProfile {
                skip_rotation_ranges: true,
                ..STOCK
            },
        ),
        Rule::new("stock", always, STOCK),
    ],
};

/// Per-track headers store the key count in 24 bits; nothing decodes more.
const MAX_KEYS: usize = 0xFF_FFFF;

fn known<T: Copy>(format: &Recognized<T>) -> DecodeResult<T> {
    match format {
        Recognized::Known(format) => Ok(*format),
        Recognized::Unknown(name) => Err(DecodeError::UnknownCompressionScheme {
            scheme: name.clone(),
        }),
    }
}

fn unknown_scheme(format: AnimationCompressionFormat, channel: TrackChannel) -> DecodeError {
    DecodeError::UnknownCompressionScheme {
        scheme: format!("{format} for {channel}"),
    }
}

/// Frames per second, guarded against zero-length sequences.
fn sequence_rate(input: &AnimSequenceInput) -> f32 {
    if input.sequence_length > 0.0 && input.sequence_length.is_finite() {
        input.num_frames as f32 / input.sequence_length * input.rate_scale
    } else {
        warn!(
            sequence = %input.name,
            length = input.sequence_length,
            "sequence has no length, using the rate scale as its rate"
        );
        input.rate_scale
    }
}

/// Decode one sequence. Failures inside a bone track are reported and leave that track
/// empty; failures that concern the whole sequence are returned.
pub fn decode_sequence(
    input: &AnimSequenceInput,
    bones: &[String],
    ctx: &VersionContext,
    profile: &AnimProfile,
    sink: &mut dyn DiagnosticSink,
) -> DecodeResult<AnimSequence> {
    let key_encoding = known(&input.key_encoding)?;
    let per_track = key_encoding == KeyEncodingFormat::PerTrackCompression;
    let offsets_per_bone = profile.offsets_per_bone.unwrap_or(if per_track { 2 } else { 4 });
    let rate = sequence_rate(input);

    let mut seq = AnimSequence {
        name: input.name.clone(),
        num_frames: input.num_frames,
        rate,
        tracks: Vec::with_capacity(bones.len()),
    };

    if input.track_offsets.is_empty() && !input.raw_tracks.is_empty() {
        if input.raw_tracks.len() != bones.len() {
            return Err(DecodeError::malformed(
                0,
                format!(
                    "{} raw tracks for {} bones",
                    input.raw_tracks.len(),
                    bones.len()
                ),
            ));
        }
        for (bone, raw) in bones.iter().zip(&input.raw_tracks) {
            let times: Vec<f32> = raw.times.iter().map(|t| t * rate).collect();
            seq.tracks.push(AnimTrack {
                bone: bone.clone(),
                positions: raw.positions.clone(),
                position_times: times.clone(),
                rotations: raw.rotations.clone(),
                rotation_times: times,
            });
        }
        trace!(sequence = %input.name, "copied raw tracks");
        return Ok(seq);
    }

    if input.track_offsets.len() != bones.len() * offsets_per_bone {
        return Err(DecodeError::malformed(
            0,
            format!(
                "{} track offsets, expected {} for {} bones",
                input.track_offsets.len(),
                bones.len() * offsets_per_bone,
                bones.len()
            ),
        ));
    }

    let formats = if per_track {
        None
    } else {
        Some((known(&input.translation_format)?, known(&input.rotation_format)?))
    };

    debug!(
        sequence = %input.name,
        bones = bones.len(),
        frames = input.num_frames,
        bytes = input.byte_stream.len(),
        %key_encoding,
        "decompressing sequence"
    );

    let mut cursor = ByteCursor::for_context(&input.byte_stream, ctx);
    let mut resync = false;
    for (index, (bone, offsets)) in bones
        .iter()
        .zip(input.track_offsets.chunks_exact(offsets_per_bone))
        .enumerate()
    {
        let mut reader = TrackReader {
            cursor: &mut cursor,
            ctx,
            profile,
            sequence: &input.name,
            track: index,
            num_frames: input.num_frames,
            resync,
            sink: &mut *sink,
        };
        let mut track = AnimTrack::new(bone);
        let result = match formats {
            None => reader.read_per_track(offsets, &mut track),
            Some((translation, rotation)) => reader.read_track(
                offsets,
                translation,
                rotation,
                key_encoding == KeyEncodingFormat::VariableKeyLerp,
                &mut track,
            ),
        };
        resync = reader.resync || result.is_err();
        if let Err(e) = result {
            sink.report(Diagnostic::TrackSkipped {
                sequence: input.name.clone(),
                track: index,
                reason: e.to_string(),
            });
            track = AnimTrack::new(bone);
        }
        seq.tracks.push(track);
    }
    Ok(seq)
}

/// Decoded fields of a per-track header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PackedTrackInfo {
    format: u32,
    component_mask: u32,
    num_keys: usize,
    has_times: bool,
}

impl From<u32> for PackedTrackInfo {
    fn from(info: u32) -> Self {
        let component_mask = (info >> 24) & 0xF;
        PackedTrackInfo {
            format: info >> 28,
            component_mask,
            num_keys: (info & 0xFF_FFFF) as usize,
            has_times: component_mask & 8 != 0,
        }
    }
}

impl PackedTrackInfo {
    fn has(&self, axis: usize) -> bool {
        self.component_mask & (1 << axis) != 0
    }
}

struct TrackReader<'c, 'a, 's> {
    cursor: &'c mut ByteCursor<'a>,
    ctx: &'c VersionContext,
    profile: &'c AnimProfile,
    sequence: &'c str,
    track: usize,
    num_frames: i32,
    /// The previous track was abandoned part way, so the next seek is not a hole.
    resync: bool,
    sink: &'s mut dyn DiagnosticSink,
}

impl TrackReader<'_, '_, '_> {
    fn offset(&self, declared: i32) -> DecodeResult<usize> {
        usize::try_from(declared).map_err(|_| {
            DecodeError::malformed(self.cursor.tell(), format!("negative track offset {declared}"))
        })
    }

    /// Report when the cursor is not where the offset table says the next channel starts,
    /// then continue from the declared offset.
    fn seek_checked(&mut self, declared: usize, channel: TrackChannel) -> DecodeResult<()> {
        let actual = self.cursor.tell();
        if std::mem::take(&mut self.resync) {
            trace!(track = self.track, declared, actual, "resyncing after a skipped track");
        } else if actual != declared {
            self.sink.report(Diagnostic::ReconstructionHole {
                sequence: self.sequence.to_string(),
                track: self.track,
                channel,
                declared,
                actual,
            });
        }
        self.cursor.seek(declared)
    }

    fn key_count(&self, keys: i32) -> DecodeResult<usize> {
        usize::try_from(keys).ok().filter(|&n| n <= MAX_KEYS).ok_or_else(|| {
            DecodeError::malformed(self.cursor.tell(), format!("bad key count {keys}"))
        })
    }

    /// Keys that occupy no bytes collapse to a single neutral key.
    fn fit_keys(&self, count: usize, key_size: usize) -> DecodeResult<usize> {
        if key_size == 0 {
            return Ok(count.min(1));
        }
        if count.saturating_mul(key_size) > self.cursor.remaining() {
            return Err(DecodeError::malformed(
                self.cursor.tell(),
                format!(
                    "{count} keys of {key_size} bytes exceed the {} bytes left",
                    self.cursor.remaining()
                ),
            ));
        }
        Ok(count)
    }

    /// Per-key frame numbers, one byte each for short sequences.
    fn read_times(&mut self, num_keys: usize) -> DecodeResult<Vec<f32>> {
        if num_keys <= 1 {
            return Ok(Vec::new());
        }
        let mut times = Vec::with_capacity(num_keys.min(self.cursor.remaining()));
        for _ in 0..num_keys {
            let t = if self.num_frames < 256 {
                self.cursor.read_u8()? as f32
            } else {
                self.cursor.read_u16()? as f32
            };
            times.push(t);
        }
        self.cursor.align(4)?;
        Ok(times)
    }

    fn read_track(
        &mut self,
        offsets: &[i32],
        translation: AnimationCompressionFormat,
        rotation: AnimationCompressionFormat,
        variable_times: bool,
        track: &mut AnimTrack,
    ) -> DecodeResult<()> {
        let (trans_offset, trans_keys) = (offsets[0], offsets[1]);
        let (rot_offset, rot_keys) = (offsets[2], offsets[3]);

        if trans_keys != 0 {
            let offset = self.offset(trans_offset)?;
            self.seek_checked(offset, TrackChannel::Translation)?;
            // a single key is always stored uncompressed
            let format = if trans_keys == 1 {
                AnimationCompressionFormat::None
            } else {
                translation
            };
            track.positions = self.read_translation_keys(trans_keys, format)?;
            self.cursor.align(4)?;
            if variable_times {
                track.position_times = self.read_times(track.positions.len())?;
            }
        }

        if rot_keys != 0 {
            let offset = self.offset(rot_offset)?;
            self.seek_checked(offset, TrackChannel::Rotation)?;
            let format = if rot_keys == 1 {
                AnimationCompressionFormat::Float96NoW
            } else {
                rotation
            };
            track.rotations = self.read_rotation_keys(rot_keys, format)?;
            self.cursor.align(4)?;
            if variable_times {
                track.rotation_times = self.read_times(track.rotations.len())?;
            }
        }

        if self.profile.scale_channel && offsets.len() >= 6 && offsets[5] > 0 {
            let end = self.offset(offsets[4])? + offsets[5] as usize * 12;
            self.cursor.seek(end)?;
            self.cursor.align(4)?;
        }
        Ok(())
    }

    fn read_translation_keys(
        &mut self,
        keys: i32,
        format: AnimationCompressionFormat,
    ) -> DecodeResult<Vec<Vector3>> {
        use AnimationCompressionFormat as F;

        let keys = self.key_count(keys)?;
        if self.profile.packed_translation && keys >= 4 {
            let scale_x = self.cursor.read_f32()?;
            // -1 marks a track stored the stock way behind the 4-byte flag
            if scale_x != -1.0 {
                let scale = Vector3::new(scale_x, self.cursor.read_f32()?, self.cursor.read_f32()?);
                let offset = self.cursor.read_vector()?;
                let codec = VectorCodec::PackedTrans { offset, scale };
                let count = self.fit_keys(keys, codec.key_size())?;
                return self.read_vector_keys(codec, count);
            }
        }

        let codec = match format {
            F::None | F::Float96NoW => VectorCodec::Float96,
            F::Fixed48NoW => VectorCodec::Fixed48,
            F::IntervalFixed32NoW => {
                let min = self.cursor.read_vector()?;
                let range = self.cursor.read_vector()?;
                VectorCodec::IntervalFixed32 { min, range }
            }
            F::Delta48NoW => {
                let min = self.cursor.read_vector()?;
                let range = self.cursor.read_vector()?;
                let base = self.cursor.read_vector()?;
                let codec = VectorCodec::Delta48 { min, range, base };
                // the base is the first key
                let count = self.fit_keys(keys.saturating_sub(1), codec.key_size())?;
                let mut positions = Vec::with_capacity(count + 1);
                positions.push(base);
                positions.extend(self.read_vector_keys(codec, count)?);
                return Ok(positions);
            }
            F::Identity => VectorCodec::Identity,
            other => return Err(unknown_scheme(other, TrackChannel::Translation)),
        };
        let count = self.fit_keys(keys, codec.key_size())?;
        self.read_vector_keys(codec, count)
    }

    fn read_vector_keys(
        &mut self,
        mut codec: VectorCodec,
        count: usize,
    ) -> DecodeResult<Vec<Vector3>> {
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(codec.read_key(self.cursor)?);
        }
        Ok(keys)
    }

    fn read_rotation_keys(
        &mut self,
        keys: i32,
        format: AnimationCompressionFormat,
    ) -> DecodeResult<Vec<Quat>> {
        use AnimationCompressionFormat as F;

        let keys = self.key_count(keys)?;
        let ranged = matches!(
            format,
            F::IntervalFixed32NoW | F::IntervalFixed48NoW | F::Delta48NoW
        );
        // before 761 every multi-key track carried the pair, needed or not
        let (mut min, mut range) = (Vector3::ZERO, Vector3::ZERO);
        if keys > 1
            && (ranged || self.ctx.format_version < 761)
            && !self.profile.skip_rotation_ranges
        {
            min = self.cursor.read_vector()?;
            range = self.cursor.read_vector()?;
        }
        let base = match format {
            F::Delta48NoW => Some(self.cursor.read_quat()?),
            _ => None,
        };
        let modifier = if self.profile.rotation_modifier && keys >= 2 {
            Some(self.cursor.read_quat()?)
        } else {
            None
        };

        let mut codec = match format {
            F::None => QuatCodec::Float128,
            F::Float96NoW => QuatCodec::Float96NoW,
            F::Fixed48NoW => QuatCodec::Fixed48NoW,
            F::Fixed32NoW => QuatCodec::Fixed32NoW,
            F::Float32NoW => QuatCodec::Float32NoW,
            F::IntervalFixed32NoW => QuatCodec::IntervalFixed32NoW { min, range },
            F::IntervalFixed48NoW => QuatCodec::IntervalFixed48NoW { min, range },
            F::Delta48NoW => QuatCodec::Delta48NoW {
                min,
                range,
                base: base.unwrap_or(Quat::IDENTITY),
            },
            F::Fixed48Max => QuatCodec::Fixed48Max,
            F::BioFixed48 => QuatCodec::BioFixed48,
            F::Identity => QuatCodec::Identity,
            F::Delta40NoW => return Err(unknown_scheme(format, TrackChannel::Rotation)),
        };

        let mut rotations = Vec::new();
        let mut remaining = keys;
        if let Some(base) = base {
            rotations.push(base);
            remaining = remaining.saturating_sub(1);
        }
        let count = self.fit_keys(remaining, codec.key_size())?;
        rotations.reserve(count);
        for _ in 0..count {
            let q = codec.read_key(self.cursor)?;
            rotations.push(match (format, modifier) {
                (F::IntervalFixed48NoW, Some(m)) => transformers_modify_quat(q, m),
                _ => q,
            });
        }
        Ok(rotations)
    }

    /// Tracks whose header names their own scheme. Offset -1 stands for a single neutral
    /// key.
    fn read_per_track(&mut self, offsets: &[i32], track: &mut AnimTrack) -> DecodeResult<()> {
        let (trans_offset, rot_offset) = (offsets[0], offsets[1]);

        if trans_offset == -1 {
            track.positions.push(Vector3::ZERO);
        } else {
            let offset = self.offset(trans_offset)?;
            self.cursor.seek(offset)?;
            let info = PackedTrackInfo::from(self.cursor.read_u32()?);
            track.positions = self.read_per_track_translation(&info)?;
            self.cursor.align(4)?;
            if info.has_times {
                track.position_times = self.read_times(track.positions.len())?;
            }
        }

        if rot_offset == -1 {
            track.rotations.push(Quat::IDENTITY);
        } else {
            let offset = self.offset(rot_offset)?;
            self.cursor.seek(offset)?;
            let info = PackedTrackInfo::from(self.cursor.read_u32()?);
            track.rotations = self.read_per_track_rotation(&info)?;
            self.cursor.align(4)?;
            if info.has_times {
                track.rotation_times = self.read_times(track.rotations.len())?;
            }
        }
        Ok(())
    }

    fn track_format(&self, info: &PackedTrackInfo) -> DecodeResult<AnimationCompressionFormat> {
        AnimationCompressionFormat::from_tag(info.format).known_or_else(|tag| {
            DecodeError::UnknownCompressionScheme {
                scheme: format!("per-track scheme {tag}"),
            }
        })
    }

    /// Bytes per key of a per-track scheme. Unknown schemes report zero and fail when
    /// decoded.
    fn per_track_key_size(format: AnimationCompressionFormat, info: &PackedTrackInfo) -> usize {
        use AnimationCompressionFormat as F;

        let components = (info.component_mask & 7).count_ones() as usize;
        match format {
            F::Float96NoW if components == 0 => 12,
            F::Float96NoW => 4 * components,
            F::Fixed48NoW => 2 * components,
            F::Fixed32NoW | F::Float32NoW | F::IntervalFixed32NoW => 4,
            _ => 0,
        }
    }

    /// Interval pairs are stored per present component.
    fn read_masked_ranges(&mut self, info: &PackedTrackInfo) -> DecodeResult<(Vector3, Vector3)> {
        let mut min = [0f32; 3];
        let mut range = [0f32; 3];
        for axis in 0..3 {
            if info.has(axis) {
                min[axis] = self.cursor.read_f32()?;
                range[axis] = self.cursor.read_f32()?;
            }
        }
        Ok((
            Vector3::new(min[0], min[1], min[2]),
            Vector3::new(range[0], range[1], range[2]),
        ))
    }

    /// Floats of the present components, or all three when the mask names none.
    fn read_masked_floats(&mut self, info: &PackedTrackInfo) -> DecodeResult<Vector3> {
        if info.component_mask & 7 == 0 {
            return self.cursor.read_vector();
        }
        let mut v = [0f32; 3];
        for (axis, slot) in v.iter_mut().enumerate() {
            if info.has(axis) {
                *slot = self.cursor.read_f32()?;
            }
        }
        Ok(Vector3::new(v[0], v[1], v[2]))
    }

    /// Fixed-point words of the present components. Missing ones decode to zero.
    fn read_masked_words(&mut self, info: &PackedTrackInfo) -> DecodeResult<[u16; 3]> {
        let mut words = [32767u16; 3];
        for (axis, slot) in words.iter_mut().enumerate() {
            if info.has(axis) {
                *slot = self.cursor.read_u16()?;
            }
        }
        Ok(words)
    }

    fn read_per_track_translation(&mut self, info: &PackedTrackInfo) -> DecodeResult<Vec<Vector3>> {
        use AnimationCompressionFormat as F;

        let format = self.track_format(info)?;
        let (min, range) = match format {
            F::IntervalFixed32NoW => self.read_masked_ranges(info)?,
            _ => (Vector3::ZERO, Vector3::ZERO),
        };
        let count = self.fit_keys(info.num_keys, Self::per_track_key_size(format, info))?;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            let v = match format {
                F::Float96NoW => self.read_masked_floats(info)?,
                F::IntervalFixed32NoW => {
                    decode_vector_interval_fixed32(self.cursor.read_u32()?, min, range)
                }
                // per-track fixed keys are 128 times smaller than stock ones
                F::Fixed48NoW => {
                    decode_vector_fixed48(self.read_masked_words(info)?) * (1.0 / 128.0)
                }
                F::Identity => Vector3::ZERO,
                other => return Err(unknown_scheme(other, TrackChannel::Translation)),
            };
            keys.push(v);
        }
        Ok(keys)
    }

    fn read_per_track_rotation(&mut self, info: &PackedTrackInfo) -> DecodeResult<Vec<Quat>> {
        use AnimationCompressionFormat as F;

        let format = self.track_format(info)?;
        let (min, range) = match format {
            F::IntervalFixed32NoW => self.read_masked_ranges(info)?,
            _ => (Vector3::ZERO, Vector3::ZERO),
        };
        let count = self.fit_keys(info.num_keys, Self::per_track_key_size(format, info))?;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            let q = match format {
                F::Float96NoW => {
                    let v = self.read_masked_floats(info)?;
                    restore_quat_w(v.x, v.y, v.z)
                }
                F::Fixed48NoW => decode_fixed48_no_w(self.read_masked_words(info)?),
                F::Fixed32NoW => decode_fixed32_no_w(self.cursor.read_u32()?),
                F::IntervalFixed32NoW => {
                    decode_interval_fixed32_no_w(self.cursor.read_u32()?, min, range)
                }
                F::Float32NoW => decode_float32_no_w(self.cursor.read_u32()?),
                F::Identity => Quat::IDENTITY,
                other => return Err(unknown_scheme(other, TrackChannel::Rotation)),
            };
            keys.push(q);
        }
        Ok(keys)
    }
}
