use crate::control::{Channel, ControlId, EqBand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One channel strip: unipolar fader, bipolar gain and three-band EQ.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStrip {
    pub fader: f64,
    pub gain: f64,
    pub eq_low: f64,
    pub eq_mid: f64,
    pub eq_high: f64,
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self {
            fader: 1.0,
            gain: 0.0,
            eq_low: 0.0,
            eq_mid: 0.0,
            eq_high: 0.0,
        }
    }
}

/// Shared mixer surface. Continuous controls are addressed through the
/// typed [`ControlId`] accessors; the DSP that consumes these values
/// lives entirely client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerState {
    pub crossfader: f64,
    pub master_volume: f64,
    pub channel_a: ChannelStrip,
    pub channel_b: ChannelStrip,
    pub fx_enabled: bool,
    /// Free-form FX parameters, all unipolar.
    pub fx: BTreeMap<String, f64>,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            crossfader: 0.5,
            master_volume: 0.8,
            channel_a: ChannelStrip::default(),
            channel_b: ChannelStrip::default(),
            fx_enabled: false,
            fx: BTreeMap::new(),
        }
    }
}

impl MixerState {
    fn strip(&self, channel: Channel) -> &ChannelStrip {
        match channel {
            Channel::A => &self.channel_a,
            Channel::B => &self.channel_b,
        }
    }

    fn strip_mut(&mut self, channel: Channel) -> &mut ChannelStrip {
        match channel {
            Channel::A => &mut self.channel_a,
            Channel::B => &mut self.channel_b,
        }
    }

    pub fn get(&self, control: ControlId) -> f64 {
        match control {
            ControlId::Crossfader => self.crossfader,
            ControlId::MasterVolume => self.master_volume,
            ControlId::ChannelFader(ch) => self.strip(ch).fader,
            ControlId::ChannelGain(ch) => self.strip(ch).gain,
            ControlId::ChannelEq(ch, EqBand::Low) => self.strip(ch).eq_low,
            ControlId::ChannelEq(ch, EqBand::Mid) => self.strip(ch).eq_mid,
            ControlId::ChannelEq(ch, EqBand::High) => self.strip(ch).eq_high,
        }
    }

    /// Write a control value. Callers validate bounds first; this is a
    /// plain typed setter with no failure mode.
    pub fn set(&mut self, control: ControlId, value: f64) {
        match control {
            ControlId::Crossfader => self.crossfader = value,
            ControlId::MasterVolume => self.master_volume = value,
            ControlId::ChannelFader(ch) => self.strip_mut(ch).fader = value,
            ControlId::ChannelGain(ch) => self.strip_mut(ch).gain = value,
            ControlId::ChannelEq(ch, EqBand::Low) => self.strip_mut(ch).eq_low = value,
            ControlId::ChannelEq(ch, EqBand::Mid) => self.strip_mut(ch).eq_mid = value,
            ControlId::ChannelEq(ch, EqBand::High) => self.strip_mut(ch).eq_high = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_control_round_trips_through_the_accessor_table() {
        let mut mixer = MixerState::default();
        let controls = [
            ControlId::Crossfader,
            ControlId::MasterVolume,
            ControlId::ChannelFader(Channel::A),
            ControlId::ChannelFader(Channel::B),
            ControlId::ChannelGain(Channel::A),
            ControlId::ChannelEq(Channel::B, EqBand::Low),
            ControlId::ChannelEq(Channel::A, EqBand::Mid),
            ControlId::ChannelEq(Channel::B, EqBand::High),
        ];
        for (i, control) in controls.into_iter().enumerate() {
            let value = 0.1 * (i as f64 + 1.0);
            mixer.set(control, value);
            assert_eq!(mixer.get(control), value);
        }
    }
}
