//! Merge stages
//!
//! During a merge conflict a path is represented by up to three entries:
//! the common ancestor (stage 1), ours (stage 2), and theirs (stage 3).
//! Outside a conflict a path has exactly one stage-0 entry.

use anyhow::anyhow;

/// The merge stage of an index entry, stored in bits 13–12 of the entry
/// flags word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    #[default]
    Zero,
    One,
    Two,
    Three,
}

impl Stage {
    /// Decode from the 2-bit field of an entry flags word.
    pub(crate) fn from_flag_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => Stage::Zero,
            1 => Stage::One,
            2 => Stage::Two,
            _ => Stage::Three,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Stage::Zero => 0,
            Stage::One => 1,
            Stage::Two => 2,
            Stage::Three => 3,
        }
    }

    pub fn is_merged(self) -> bool {
        self == Stage::Zero
    }
}

impl TryFrom<u8> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> anyhow::Result<Self> {
        match value {
            0 => Ok(Stage::Zero),
            1 => Ok(Stage::One),
            2 => Ok(Stage::Two),
            3 => Ok(Stage::Three),
            _ => Err(anyhow!("Invalid merge stage: {}", value)),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Stage::Zero, 0)]
    #[case(Stage::One, 1)]
    #[case(Stage::Two, 2)]
    #[case(Stage::Three, 3)]
    fn test_stage_round_trips_through_u8(#[case] stage: Stage, #[case] value: u8) {
        pretty_assertions::assert_eq!(stage.as_u8(), value);
        pretty_assertions::assert_eq!(Stage::try_from(value).unwrap(), stage);
        pretty_assertions::assert_eq!(Stage::from_flag_bits(value as u16), stage);
    }

    #[test]
    fn test_out_of_range_stage_is_rejected() {
        assert!(Stage::try_from(4).is_err());
    }
}
