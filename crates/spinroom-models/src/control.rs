use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Mixer channel, one per deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Channel::A => "A",
            Channel::B => "B",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    fn as_str(self) -> &'static str {
        match self {
            EqBand::Low => "low",
            EqBand::Mid => "mid",
            EqBand::High => "high",
        }
    }
}

/// Every continuous control a client can own or move. The wire form is
/// the dotted string id ("crossfader", "channelA.gain",
/// "channelB.eq.low"), but internally this is a closed sum type so an
/// unknown control id is a decode failure at the protocol boundary,
/// never a runtime lookup miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    Crossfader,
    MasterVolume,
    ChannelFader(Channel),
    ChannelGain(Channel),
    ChannelEq(Channel, EqBand),
}

impl ControlId {
    /// Inclusive value bounds. Faders and volume are unipolar; gain and
    /// EQ are bipolar around their neutral position.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            ControlId::Crossfader | ControlId::MasterVolume | ControlId::ChannelFader(_) => {
                (0.0, 1.0)
            }
            ControlId::ChannelGain(_) | ControlId::ChannelEq(..) => (-1.0, 1.0),
        }
    }

    pub fn validate_value(self, value: f64) -> Result<(), ControlValueError> {
        let (lo, hi) = self.bounds();
        if !value.is_finite() || value < lo || value > hi {
            return Err(ControlValueError {
                control: self,
                value,
                lo,
                hi,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("value {value} out of bounds [{lo}, {hi}] for control {control}")]
pub struct ControlValueError {
    pub control: ControlId,
    pub value: f64,
    pub lo: f64,
    pub hi: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown control id: {0}")]
pub struct ParseControlIdError(pub String);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlId::Crossfader => write!(f, "crossfader"),
            ControlId::MasterVolume => write!(f, "master.volume"),
            ControlId::ChannelFader(ch) => write!(f, "channel{}.fader", ch.as_str()),
            ControlId::ChannelGain(ch) => write!(f, "channel{}.gain", ch.as_str()),
            ControlId::ChannelEq(ch, band) => {
                write!(f, "channel{}.eq.{}", ch.as_str(), band.as_str())
            }
        }
    }
}

impl FromStr for ControlId {
    type Err = ParseControlIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crossfader" => return Ok(ControlId::Crossfader),
            "master.volume" => return Ok(ControlId::MasterVolume),
            _ => {}
        }
        let channel = if let Some(rest) = s.strip_prefix("channelA.") {
            Some((Channel::A, rest))
        } else {
            s.strip_prefix("channelB.").map(|rest| (Channel::B, rest))
        };
        if let Some((ch, rest)) = channel {
            return match rest {
                "fader" => Ok(ControlId::ChannelFader(ch)),
                "gain" => Ok(ControlId::ChannelGain(ch)),
                "eq.low" => Ok(ControlId::ChannelEq(ch, EqBand::Low)),
                "eq.mid" => Ok(ControlId::ChannelEq(ch, EqBand::Mid)),
                "eq.high" => Ok(ControlId::ChannelEq(ch, EqBand::High)),
                _ => Err(ParseControlIdError(s.to_string())),
            };
        }
        Err(ParseControlIdError(s.to_string()))
    }
}

impl Serialize for ControlId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ControlId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_round_trip() {
        for id in [
            ControlId::Crossfader,
            ControlId::MasterVolume,
            ControlId::ChannelFader(Channel::A),
            ControlId::ChannelGain(Channel::B),
            ControlId::ChannelEq(Channel::A, EqBand::Mid),
        ] {
            let wire = id.to_string();
            assert_eq!(wire.parse::<ControlId>().unwrap(), id);
        }
    }

    #[test]
    fn unknown_ids_fail_to_parse() {
        assert!("channelC.fader".parse::<ControlId>().is_err());
        assert!("channelA.reverb".parse::<ControlId>().is_err());
        assert!("".parse::<ControlId>().is_err());
    }

    #[test]
    fn crossfader_rejects_out_of_range() {
        let err = ControlId::Crossfader.validate_value(1.5).unwrap_err();
        assert_eq!(err.hi, 1.0);
        assert!(ControlId::Crossfader.validate_value(f64::NAN).is_err());
    }

    #[test]
    fn gain_accepts_negative_values() {
        assert!(ControlId::ChannelGain(Channel::A)
            .validate_value(-1.0)
            .is_ok());
        assert!(ControlId::ChannelGain(Channel::A)
            .validate_value(-1.01)
            .is_err());
    }

    #[test]
    fn serde_uses_the_dotted_form() {
        let json = serde_json::to_string(&ControlId::ChannelEq(Channel::B, EqBand::High)).unwrap();
        assert_eq!(json, "\"channelB.eq.high\"");
        let back: ControlId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ControlId::ChannelEq(Channel::B, EqBand::High));
    }
}
