use std::fmt;

use crate::recognized::Recognized;

/// Key compression schemes, in the engine's enum order. The order matters: per-track
/// compressed streams store the scheme as its index in the top four bits of each track
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AnimationCompressionFormat {
    None,
    Float96NoW,
    Fixed48NoW,
    IntervalFixed32NoW,
    Fixed32NoW,
    Float32NoW,
    Identity,
    Fixed48Max,
    BioFixed48,
    Delta40NoW,
    Delta48NoW,
    IntervalFixed48NoW,
}

impl AnimationCompressionFormat {
    pub const ALL: &'static [AnimationCompressionFormat] = &[
        AnimationCompressionFormat::None,
        AnimationCompressionFormat::Float96NoW,
        AnimationCompressionFormat::Fixed48NoW,
        AnimationCompressionFormat::IntervalFixed32NoW,
        AnimationCompressionFormat::Fixed32NoW,
        AnimationCompressionFormat::Float32NoW,
        AnimationCompressionFormat::Identity,
        AnimationCompressionFormat::Fixed48Max,
        AnimationCompressionFormat::BioFixed48,
        AnimationCompressionFormat::Delta40NoW,
        AnimationCompressionFormat::Delta48NoW,
        AnimationCompressionFormat::IntervalFixed48NoW,
    ];

    /// Resolve the name stored in the sequence properties, with or without the `ACF_`
    /// prefix.
    pub fn from_name(name: &str) -> Recognized<Self> {
        let short = name.strip_prefix("ACF_").unwrap_or(name);
        match Self::ALL.iter().find(|format| format.short_name() == short) {
            Some(format) => Recognized::Known(*format),
            None => Recognized::Unknown(name.to_string()),
        }
    }

    /// Resolve the 4-bit scheme index of a per-track header.
    pub fn from_tag(tag: u32) -> Recognized<Self, u32> {
        match Self::ALL.get(tag as usize) {
            Some(format) => Recognized::Known(*format),
            None => Recognized::Unknown(tag),
        }
    }

    pub const fn tag(&self) -> u32 {
        *self as u32
    }

    pub const fn name(&self) -> &'static str {
        match self {
            AnimationCompressionFormat::None => "ACF_None",
            AnimationCompressionFormat::Float96NoW => "ACF_Float96NoW",
            AnimationCompressionFormat::Fixed48NoW => "ACF_Fixed48NoW",
            AnimationCompressionFormat::IntervalFixed32NoW => "ACF_IntervalFixed32NoW",
            AnimationCompressionFormat::Fixed32NoW => "ACF_Fixed32NoW",
            AnimationCompressionFormat::Float32NoW => "ACF_Float32NoW",
            AnimationCompressionFormat::Identity => "ACF_Identity",
            AnimationCompressionFormat::Fixed48Max => "ACF_Fixed48Max",
            AnimationCompressionFormat::BioFixed48 => "ACF_BioFixed48",
            AnimationCompressionFormat::Delta40NoW => "ACF_Delta40NoW",
            AnimationCompressionFormat::Delta48NoW => "ACF_Delta48NoW",
            AnimationCompressionFormat::IntervalFixed48NoW => "ACF_IntervalFixed48NoW",
        }
    }

    fn short_name(&self) -> &'static str {
        &self.name()[4..]
    }
}

impl fmt::Display for AnimationCompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How keys are spaced in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyEncodingFormat {
    /// Keys evenly spaced over the sequence.
    #[default]
    ConstantKeyLerp,
    /// Every track carries a time array after its keys.
    VariableKeyLerp,
    /// Each track starts with a header naming its own scheme and key count.
    PerTrackCompression,
}

impl KeyEncodingFormat {
    pub fn from_name(name: &str) -> Recognized<Self> {
        match name.strip_prefix("AKF_").unwrap_or(name) {
            "ConstantKeyLerp" => Recognized::Known(Self::ConstantKeyLerp),
            "VariableKeyLerp" => Recognized::Known(Self::VariableKeyLerp),
            "PerTrackCompression" => Recognized::Known(Self::PerTrackCompression),
            _ => Recognized::Unknown(name.to_string()),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            KeyEncodingFormat::ConstantKeyLerp => "AKF_ConstantKeyLerp",
            KeyEncodingFormat::VariableKeyLerp => "AKF_VariableKeyLerp",
            KeyEncodingFormat::PerTrackCompression => "AKF_PerTrackCompression",
        }
    }
}

impl fmt::Display for KeyEncodingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
