/// Positioned byte cursor over an in-memory record stream
pub mod cursor;
/// Shared winnow-based parsers for engine primitives
pub mod parser_utils;

use std::fmt;
use std::ops::Deref;

use bon::Builder;
use winnow::binary::Endianness;

pub use cursor::ByteCursor;

/// Title identifier. `Unreal3` is the stock engine; every other variant is a licensee fork
/// whose record layouts diverge somewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GameTag {
    #[default]
    Unreal3,
    EndWar,
    CrimeCraft,
    R6Vegas2,
    MirrorEdge,
    Mk,
    Strangle,
    Transformers,
    Frontlines,
    MagnaCarta,
    BladeNSoul,
    ArmyOf2,
    Batman,
    Ava,
    Huxley,
    Moh2010,
    Moha,
    Fury,
    Borderlands,
    Apb,
    BloodOnSand,
    MassEffect,
    MassEffect2,
    Turok,
    A51,
    Undertow,
    ShadowsDamned,
    Tlr,
    XMen,
    AlphaProtocol,
    DarkVoid,
    Tera,
    Singularity,
    Bulletstorm,
    DcUniverse,
    Doh,
    Enslaved,
}

impl GameTag {
    pub const ALL: &'static [GameTag] = &[
        GameTag::Unreal3,
        GameTag::EndWar,
        GameTag::CrimeCraft,
        GameTag::R6Vegas2,
        GameTag::MirrorEdge,
        GameTag::Mk,
        GameTag::Strangle,
        GameTag::Transformers,
        GameTag::Frontlines,
        GameTag::MagnaCarta,
        GameTag::BladeNSoul,
        GameTag::ArmyOf2,
        GameTag::Batman,
        GameTag::Ava,
        GameTag::Huxley,
        GameTag::Moh2010,
        GameTag::Moha,
        GameTag::Fury,
        GameTag::Borderlands,
        GameTag::Apb,
        GameTag::BloodOnSand,
        GameTag::MassEffect,
        GameTag::MassEffect2,
        GameTag::Turok,
        GameTag::A51,
        GameTag::Undertow,
        GameTag::ShadowsDamned,
        GameTag::Tlr,
        GameTag::XMen,
        GameTag::AlphaProtocol,
        GameTag::DarkVoid,
        GameTag::Tera,
        GameTag::Singularity,
        GameTag::Bulletstorm,
        GameTag::DcUniverse,
        GameTag::Doh,
        GameTag::Enslaved,
    ];

    /// Case-insensitive lookup by variant name, as typed on the command line.
    pub fn from_name(name: &str) -> Option<GameTag> {
        GameTag::ALL
            .iter()
            .copied()
            .find(|tag| format!("{tag:?}").eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for GameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Platform {
    #[default]
    Pc,
    Xbox360,
    Ps3,
    Ios,
    Android,
}

impl Platform {
    pub fn from_name(name: &str) -> Option<Platform> {
        match name.to_ascii_lowercase().as_str() {
            "pc" => Some(Platform::Pc),
            "xbox360" | "x360" => Some(Platform::Xbox360),
            "ps3" => Some(Platform::Ps3),
            "ios" => Some(Platform::Ios),
            "android" => Some(Platform::Android),
            _ => None,
        }
    }

    pub fn is_console(&self) -> bool {
        matches!(self, Platform::Xbox360 | Platform::Ps3)
    }
}

/// The three identity signals plus platform that every layout decision is made from.
///
/// A context is fixed for the whole asset. The only sanctioned mutation is
/// [`VersionContext::override_format_version`], which hands out a guard that puts the
/// saved value back when it goes out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionContext {
    pub format_version: i32,
    #[builder(default)]
    pub licensee_version: i32,
    #[builder(default)]
    pub game: GameTag,
    #[builder(default)]
    pub platform: Platform,
}

impl VersionContext {
    pub fn is(&self, game: GameTag) -> bool {
        self.game == game
    }

    pub fn is_big_endian(&self) -> bool {
        self.platform.is_console()
    }

    pub fn endianness(&self) -> Endianness {
        if self.is_big_endian() {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Temporarily decode as if the record were written by `format_version`.
    pub fn override_format_version(&mut self, format_version: i32) -> VersionOverride<'_> {
        let saved = self.format_version;
        self.format_version = format_version;
        VersionOverride { ctx: self, saved }
    }
}

impl fmt::Display for VersionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (format {}, licensee {}, {:?})",
            self.game, self.format_version, self.licensee_version, self.platform
        )
    }
}

/// Scoped format-version override. Restores the previous value on drop.
pub struct VersionOverride<'a> {
    ctx: &'a mut VersionContext,
    saved: i32,
}

impl VersionOverride<'_> {
    pub fn saved_format_version(&self) -> i32 {
        self.saved
    }
}

impl Deref for VersionOverride<'_> {
    type Target = VersionContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl Drop for VersionOverride<'_> {
    fn drop(&mut self) {
        self.ctx.format_version = self.saved;
    }
}
