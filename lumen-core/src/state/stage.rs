//! Connection bring-up stages reported by the engine.

use crate::error::LumenError;

/// One phase of the engine's connection bring-up, in engine order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum Stage {
    None = 0,
    PlatformInit = 1,
    Handshake = 2,
    ControlStreamInit = 3,
    VideoStreamInit = 4,
    AudioStreamInit = 5,
    InputStreamInit = 6,
    ControlStreamStart = 7,
    VideoStreamStart = 8,
    AudioStreamStart = 9,
    InputStreamStart = 10,
}

impl Stage {
    /// Every real stage in bring-up order (excludes `None`).
    pub const ALL: [Stage; 10] = [
        Stage::PlatformInit,
        Stage::Handshake,
        Stage::ControlStreamInit,
        Stage::VideoStreamInit,
        Stage::AudioStreamInit,
        Stage::InputStreamInit,
        Stage::ControlStreamStart,
        Stage::VideoStreamStart,
        Stage::AudioStreamStart,
        Stage::InputStreamStart,
    ];

    /// Map an engine ordinal to a stage.
    pub fn from_ordinal(ordinal: i32) -> Result<Self, LumenError> {
        match ordinal {
            0 => Ok(Stage::None),
            1..=10 => Ok(Stage::ALL[(ordinal - 1) as usize]),
            _ => Err(LumenError::UnknownStage(ordinal)),
        }
    }

    pub const fn ordinal(self) -> i32 {
        self as i32
    }

    /// Human-readable progress text.
    pub const fn description(self) -> &'static str {
        match self {
            Stage::None => "Idle",
            Stage::PlatformInit => "Initializing platform",
            Stage::Handshake => "Starting handshake",
            Stage::ControlStreamInit => "Initializing control stream",
            Stage::VideoStreamInit => "Initializing video stream",
            Stage::AudioStreamInit => "Initializing audio stream",
            Stage::InputStreamInit => "Initializing input stream",
            Stage::ControlStreamStart => "Starting control stream",
            Stage::VideoStreamStart => "Starting video stream",
            Stage::AudioStreamStart => "Starting audio stream",
            Stage::InputStreamStart => "Starting input stream",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

impl TryFrom<i32> for Stage {
    type Error = LumenError;

    fn try_from(ordinal: i32) -> Result<Self, Self::Error> {
        Stage::from_ordinal(ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_ordinal(stage.ordinal()).unwrap(), stage);
        }
        assert_eq!(Stage::from_ordinal(0).unwrap(), Stage::None);
    }

    #[test]
    fn bring_up_order() {
        assert_eq!(Stage::Handshake.ordinal(), 2);
        assert_eq!(Stage::InputStreamStart.ordinal(), 10);
        assert!(Stage::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn unknown_ordinal() {
        assert!(matches!(Stage::try_from(11), Err(LumenError::UnknownStage(11))));
        assert!(Stage::from_ordinal(-1).is_err());
    }

    #[test]
    fn description_text() {
        assert_eq!(Stage::Handshake.to_string(), "Starting handshake");
        assert_eq!(Stage::AudioStreamInit.description(), "Initializing audio stream");
    }
}
