//! Byte-exact encoding of commands and decoding of notification payloads.
//!
//! Every command is a packed little-endian structure: a two byte header
//! (`kind`, `payload_size`) followed by the fields of that kind, with no padding.
//! Notifications are complete frames of a fixed size per stream kind.

use crate::device::constants::{command_codes, COMMAND_HEADER_SIZE, EMG_PAYLOAD_SIZE, IMU_PAYLOAD_SIZE, VIBRATE2_STEPS};
use crate::device::types::{
    ClassifierMode, EmgMode, EmgSample, ImuMode, ImuSample, SleepMode, StreamKind, UnlockType,
    UserActionType, VibrationType,
};
use crate::error::DeviceError;

/// One step of a `vibrate2` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VibrationStep {
    pub duration_ms: u16,
    /// 0 (motor off) to 255 (full speed).
    pub strength: u8,
}

/// A command written to the band's command characteristic.
///
/// Fields hold the raw wire values; the typed constructors convert from the mode enumerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetMode { emg_mode: u8, imu_mode: u8, classifier_mode: u8 },
    Vibrate { vibration: u8 },
    DeepSleep,
    Vibrate2 { steps: [VibrationStep; VIBRATE2_STEPS] },
    SetSleepMode { sleep_mode: u8 },
    Unlock { unlock_type: u8 },
    UserAction { action: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub kind: u8,
    pub payload_size: u8,
}

/// The fixed payload size of a command kind.
pub fn payload_size_of(kind: u8) -> Result<usize, DeviceError> {
    let size = match kind {
        command_codes::SET_MODE => 3,
        command_codes::VIBRATE => 1,
        command_codes::DEEP_SLEEP => 0,
        command_codes::VIBRATE2 => VIBRATE2_STEPS * 3,
        command_codes::SET_SLEEP_MODE => 1,
        command_codes::UNLOCK => 1,
        command_codes::USER_ACTION => 1,
        _ => return Err(DeviceError::UnsupportedCommandKind(kind)),
    };

    Ok(size)
}

impl Command {
    pub fn set_mode(emg: EmgMode, imu: ImuMode, classifier: ClassifierMode) -> Self {
        Command::SetMode {
            emg_mode: emg.into(),
            imu_mode: imu.into(),
            classifier_mode: classifier.into(),
        }
    }

    pub fn vibrate(vibration: VibrationType) -> Self {
        Command::Vibrate { vibration: vibration.into() }
    }

    pub fn vibrate2(steps: [VibrationStep; VIBRATE2_STEPS]) -> Self {
        Command::Vibrate2 { steps }
    }

    pub fn set_sleep_mode(sleep_mode: SleepMode) -> Self {
        Command::SetSleepMode { sleep_mode: sleep_mode.into() }
    }

    pub fn unlock(unlock_type: UnlockType) -> Self {
        Command::Unlock { unlock_type: unlock_type.into() }
    }

    pub fn user_action(action: UserActionType) -> Self {
        Command::UserAction { action: action.into() }
    }

    pub fn kind(&self) -> u8 {
        match self {
            Command::SetMode { .. } => command_codes::SET_MODE,
            Command::Vibrate { .. } => command_codes::VIBRATE,
            Command::DeepSleep => command_codes::DEEP_SLEEP,
            Command::Vibrate2 { .. } => command_codes::VIBRATE2,
            Command::SetSleepMode { .. } => command_codes::SET_SLEEP_MODE,
            Command::Unlock { .. } => command_codes::UNLOCK,
            Command::UserAction { .. } => command_codes::USER_ACTION,
        }
    }

    pub fn header(&self) -> CommandHeader {
        CommandHeader {
            kind: self.kind(),
            payload_size: self.payload().len() as u8,
        }
    }

    /// The packed payload, without header.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::SetMode { emg_mode, imu_mode, classifier_mode } => {
                vec![*emg_mode, *imu_mode, *classifier_mode]
            },
            Command::Vibrate { vibration } => vec![*vibration],
            Command::DeepSleep => vec![],
            Command::Vibrate2 { steps } => {
                let mut payload = Vec::with_capacity(VIBRATE2_STEPS * 3);
                for step in steps {
                    payload.extend_from_slice(&step.duration_ms.to_le_bytes());
                    payload.push(step.strength);
                }
                payload
            },
            Command::SetSleepMode { sleep_mode } => vec![*sleep_mode],
            Command::Unlock { unlock_type } => vec![*unlock_type],
            Command::UserAction { action } => vec![*action],
        }
    }

    /// Build a command from its raw kind code, declared payload size and packed payload.
    pub fn from_parts(kind: u8, payload_size: u8, payload: &[u8]) -> Result<Self, DeviceError> {
        let expected = payload_size_of(kind)?;
        let declared = payload_size as usize;

        if declared != expected {
            return Err(DeviceError::MalformedCommand { kind, declared, expected });
        }
        if payload.len() != expected {
            return Err(DeviceError::MalformedCommand { kind, declared: payload.len(), expected });
        }

        let command = match kind {
            command_codes::SET_MODE => Command::SetMode {
                emg_mode: payload[0],
                imu_mode: payload[1],
                classifier_mode: payload[2],
            },
            command_codes::VIBRATE => Command::Vibrate { vibration: payload[0] },
            command_codes::DEEP_SLEEP => Command::DeepSleep,
            command_codes::VIBRATE2 => {
                let mut steps = [VibrationStep::default(); VIBRATE2_STEPS];
                for (step, chunk) in steps.iter_mut().zip(payload.chunks_exact(3)) {
                    step.duration_ms = u16::from_le_bytes([chunk[0], chunk[1]]);
                    step.strength = chunk[2];
                }
                Command::Vibrate2 { steps }
            },
            command_codes::SET_SLEEP_MODE => Command::SetSleepMode { sleep_mode: payload[0] },
            command_codes::UNLOCK => Command::Unlock { unlock_type: payload[0] },
            command_codes::USER_ACTION => Command::UserAction { action: payload[0] },
            _ => return Err(DeviceError::UnsupportedCommandKind(kind)),
        };

        Ok(command)
    }
}

pub fn encode(command: &Command) -> Vec<u8> {
    let payload = command.payload();
    let mut bytes = Vec::with_capacity(COMMAND_HEADER_SIZE + payload.len());
    bytes.push(command.kind());
    bytes.push(payload.len() as u8);
    bytes.extend_from_slice(&payload);
    bytes
}

/// Encode a command given as raw parts, validating the kind and its layout.
pub fn encode_parts(kind: u8, payload_size: u8, payload: &[u8]) -> Result<Vec<u8>, DeviceError> {
    Ok(encode(&Command::from_parts(kind, payload_size, payload)?))
}

pub fn decode_header(bytes: &[u8]) -> Result<CommandHeader, DeviceError> {
    match bytes {
        [kind, payload_size, ..] => Ok(CommandHeader { kind: *kind, payload_size: *payload_size }),
        _ => Err(DeviceError::MalformedCommand {
            kind: bytes.first().copied().unwrap_or(0),
            declared: bytes.len(),
            expected: COMMAND_HEADER_SIZE,
        }),
    }
}

pub fn decode_command(bytes: &[u8]) -> Result<Command, DeviceError> {
    let header = decode_header(bytes)?;
    Command::from_parts(header.kind, header.payload_size, &bytes[COMMAND_HEADER_SIZE..])
}

pub fn decode_emg(bytes: &[u8]) -> Result<EmgSample, DeviceError> {
    let raw: &[u8; EMG_PAYLOAD_SIZE] = bytes.try_into().map_err(|_| DeviceError::MalformedPayload {
        kind: StreamKind::Emg,
        expected: StreamKind::Emg.payload_size(),
        actual: bytes.len(),
    })?;

    Ok(EmgSample::from_bytes(raw))
}

pub fn decode_imu(bytes: &[u8]) -> Result<ImuSample, DeviceError> {
    let raw: &[u8; IMU_PAYLOAD_SIZE] = bytes.try_into().map_err(|_| DeviceError::MalformedPayload {
        kind: StreamKind::Imu,
        expected: StreamKind::Imu.payload_size(),
        actual: bytes.len(),
    })?;

    Ok(ImuSample::from_bytes(raw))
}
