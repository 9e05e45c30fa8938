use std::fmt;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::device::constants::{
    ACCELEROMETER_SCALE, EMG_PAYLOAD_SIZE, GYROSCOPE_SCALE, IMU_PAYLOAD_SIZE, ORIENTATION_SCALE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EmgMode {
    #[default]
    None = 0x00,
    /// Filtered EMG, 200Hz
    SendEmg = 0x02,
    /// Unfiltered EMG, 200Hz
    SendRaw = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ImuMode {
    #[default]
    None = 0x00,
    SendData = 0x01,
    /// Motion events only (taps).
    SendEvents = 0x02,
    SendAll = 0x03,
    SendRaw = 0x04,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ClassifierMode {
    #[default]
    Disabled = 0x00,
    Enabled = 0x01,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SleepMode {
    /// The band goes to sleep after a period of inactivity.
    #[default]
    Normal = 0x00,
    NeverSleep = 0x01,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VibrationType {
    None = 0x00,
    Short = 0x01,
    Medium = 0x02,
    Long = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnlockType {
    /// Re-lock immediately.
    Lock = 0x00,
    /// Unlock now and re-lock after a fixed timeout.
    Timed = 0x01,
    /// Unlock now and remain unlocked until a lock command is received.
    Hold = 0x02,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UserActionType {
    Single = 0x00,
}

macro_rules! wire_byte {
    ($($ty:ty),*) => {
        $(impl From<$ty> for u8 {
            fn from(value: $ty) -> u8 {
                value as u8
            }
        })*
    };
}

wire_byte!(EmgMode, ImuMode, ClassifierMode, SleepMode, VibrationType, UnlockType, UserActionType);

impl EmgMode {
    pub fn is_enabled(&self) -> bool {
        *self != EmgMode::None
    }
}

impl ImuMode {
    pub fn is_enabled(&self) -> bool {
        *self != ImuMode::None
    }
}

/// The modes most recently negotiated with the band through `set_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modes {
    pub emg: EmgMode,
    pub imu: ImuMode,
    pub classifier: ClassifierMode,
}

/// The semantic kind of a notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Emg,
    Imu,
}

impl StreamKind {
    /// The exact size of one notification of this kind.
    pub fn payload_size(&self) -> usize {
        match self {
            StreamKind::Emg => EMG_PAYLOAD_SIZE,
            StreamKind::Imu => IMU_PAYLOAD_SIZE,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            StreamKind::Emg => "EMG",
            StreamKind::Imu => "IMU",
        };

        write!(f, "{}", result)
    }
}

/// Two consecutive 8-channel EMG samples, as carried by one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmgSample {
    pub sample1: [i8; 8],
    pub sample2: [i8; 8],
}

impl EmgSample {
    pub fn from_bytes(raw: &[u8; EMG_PAYLOAD_SIZE]) -> Self {
        let mut sample1 = [0i8; 8];
        let mut sample2 = [0i8; 8];

        for (i, byte) in raw.iter().enumerate() {
            let value = *byte as i8;
            if i < 8 {
                sample1[i] = value;
            } else {
                sample2[i - 8] = value;
            }
        }

        EmgSample { sample1, sample2 }
    }
}

impl fmt::Display for EmgSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EMG Measurement:")?;
        writeln!(f, "sample1: {:?}", self.sample1)?;
        write!(f, "sample2: {:?}", self.sample2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quaternion {
    pub w: i16,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// One IMU notification: orientation, accelerometer and gyroscope, all raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImuSample {
    pub orientation: Quaternion,
    pub accelerometer: [i16; 3],
    pub gyroscope: [i16; 3],
}

impl ImuSample {
    pub fn from_bytes(raw: &[u8; IMU_PAYLOAD_SIZE]) -> Self {
        let mut fields = [0i16; 10];
        for (field, chunk) in fields.iter_mut().zip(raw.chunks_exact(2)) {
            *field = i16::from_le_bytes([chunk[0], chunk[1]]);
        }

        ImuSample {
            orientation: Quaternion {
                w: fields[0],
                x: fields[1],
                y: fields[2],
                z: fields[3],
            },
            accelerometer: [fields[4], fields[5], fields[6]],
            gyroscope: [fields[7], fields[8], fields[9]],
        }
    }

    /// Orientation as a unit quaternion `[w, x, y, z]`.
    pub fn orientation_unit(&self) -> [f32; 4] {
        let q = &self.orientation;
        [q.w, q.x, q.y, q.z].map(|v| v as f32 / ORIENTATION_SCALE)
    }

    /// Acceleration in g.
    pub fn accelerometer_g(&self) -> [f32; 3] {
        self.accelerometer.map(|v| v as f32 / ACCELEROMETER_SCALE)
    }

    /// Angular velocity in degrees per second.
    pub fn gyroscope_dps(&self) -> [f32; 3] {
        self.gyroscope.map(|v| v as f32 / GYROSCOPE_SCALE)
    }
}

impl fmt::Display for ImuSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = &self.orientation;
        writeln!(f, "IMU Measurement")?;
        writeln!(f, "Orientation: w={}, x={} y={} z={}", q.w, q.x, q.y, q.z)?;
        writeln!(f, "Accelerometer: {:?}", self.accelerometer)?;
        write!(f, "Gyroscope: {:?}", self.gyroscope)
    }
}

/// A notification on a handle that is not mapped to a sample stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub handle: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Configuring,
    Subscribing,
    Streaming,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Configuring => "configuring",
            SessionState::Subscribing => "subscribing",
            SessionState::Streaming => "streaming",
            SessionState::Closed => "closed",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    StateChange(SessionState),
    Emg(EmgSample),
    Imu(ImuSample),
    Raw(RawNotification),
}
