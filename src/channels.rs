use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the twelve pressure pads in the seat cushion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    RightHip,
    LeftHip,
    LeftThigh1,
    LeftThigh2,
    RightThigh1,
    RightThigh2,
    LeftCalf,
    RightCalf,
    SpineBottom,
    SpineTop,
    LeftWingBone,
    RightWingBone,
}

impl Channel {
    pub const ALL: [Channel; 12] = [
        Channel::RightHip,
        Channel::LeftHip,
        Channel::LeftThigh1,
        Channel::LeftThigh2,
        Channel::RightThigh1,
        Channel::RightThigh2,
        Channel::LeftCalf,
        Channel::RightCalf,
        Channel::SpineBottom,
        Channel::SpineTop,
        Channel::LeftWingBone,
        Channel::RightWingBone,
    ];

    /// Wire name, as sent by the device.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::RightHip => "right_hip",
            Channel::LeftHip => "left_hip",
            Channel::LeftThigh1 => "left_thigh1",
            Channel::LeftThigh2 => "left_thigh2",
            Channel::RightThigh1 => "right_thigh1",
            Channel::RightThigh2 => "right_thigh2",
            Channel::LeftCalf => "left_calf",
            Channel::RightCalf => "right_calf",
            Channel::SpineBottom => "spine_bottom",
            Channel::SpineTop => "spine_top",
            Channel::LeftWingBone => "left_wing_bone",
            Channel::RightWingBone => "right_wing_bone",
        }
    }

    /// Position in [`Channel::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .copied()
            .find(|channel| channel.as_str() == s)
            .ok_or(())
    }
}

/// One decoded frame: the pressures present in it, tagged with its arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub seq: u64,
    values: BTreeMap<Channel, f64>,
}

impl SensorRecord {
    pub fn new(seq: u64, values: BTreeMap<Channel, f64>) -> Self {
        Self { seq, values }
    }

    /// Pressure for `channel`; channels absent from the frame read as 0.
    pub fn value(&self, channel: Channel) -> f64 {
        self.values.get(&channel).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.values.contains_key(&channel)
    }

    /// Sum over all twelve channels.
    pub fn aggregate(&self) -> f64 {
        Channel::ALL.iter().map(|channel| self.value(*channel)).sum()
    }
}
