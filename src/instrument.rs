use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Instrument packet types handled by this crate.
///
/// Codes are those stored with each downlinked frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum InstrumentType {
    EpdElectron,
    EpdIon,
    EpdElectronSurvey,
    EpdIonSurvey,
    FgmCompressed,
    EpdInnerElectron,
    EpdInnerIon,
}

impl InstrumentType {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            InstrumentType::EpdElectron => 3,
            InstrumentType::EpdIon => 4,
            InstrumentType::EpdElectronSurvey => 5,
            InstrumentType::EpdIonSurvey => 6,
            InstrumentType::FgmCompressed => 19,
            InstrumentType::EpdInnerElectron => 22,
            InstrumentType::EpdInnerIon => 23,
        }
    }

    #[must_use]
    pub fn is_epd(self) -> bool {
        !self.is_fgm()
    }

    #[must_use]
    pub fn is_fgm(self) -> bool {
        self == InstrumentType::FgmCompressed
    }

    /// Survey mode EPD packets carry 4 sectors instead of 16.
    #[must_use]
    pub fn is_survey(self) -> bool {
        matches!(
            self,
            InstrumentType::EpdElectronSurvey | InstrumentType::EpdIonSurvey
        )
    }

    /// The inner EPD stream, which has a species/spin-integration byte before the marker.
    #[must_use]
    pub fn is_inner(self) -> bool {
        matches!(
            self,
            InstrumentType::EpdInnerElectron | InstrumentType::EpdInnerIon
        )
    }

    /// Species expected in the side byte of inner EPD packets.
    #[must_use]
    pub fn species(self) -> Option<Species> {
        match self {
            InstrumentType::EpdInnerElectron => Some(Species::Electron),
            InstrumentType::EpdInnerIon => Some(Species::Ion),
            _ => None,
        }
    }

    /// Offset of the onboard time field in a reassembled packet.
    #[must_use]
    pub fn time_offset(self) -> usize {
        if self.is_fgm() {
            0
        } else {
            usize::from(self.is_inner()) + 1
        }
    }
}

impl TryFrom<u8> for InstrumentType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            3 => InstrumentType::EpdElectron,
            4 => InstrumentType::EpdIon,
            5 => InstrumentType::EpdElectronSurvey,
            6 => InstrumentType::EpdIonSurvey,
            19 => InstrumentType::FgmCompressed,
            22 => InstrumentType::EpdInnerElectron,
            23 => InstrumentType::EpdInnerIon,
            _ => return Err(Error::InstrumentType(code)),
        })
    }
}

impl From<InstrumentType> for u8 {
    fn from(value: InstrumentType) -> Self {
        value.code()
    }
}

impl Display for InstrumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Particle species tag carried in the high nibble of the inner EPD side byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    Electron,
    Ion,
}

impl Species {
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Species::Electron => 0x1,
            Species::Ion => 0x2,
        }
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x1 => Some(Species::Electron),
            0x2 => Some(Species::Ion),
            _ => None,
        }
    }
}
