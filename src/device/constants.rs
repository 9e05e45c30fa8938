/**
 * How long (milliseconds) a scan for advertising bands runs by default.
 */
pub const SCAN_DURATION: u64 = 2000;

/**
 * How long (milliseconds) a connection attempt to a single candidate may take.
 */
pub const CONNECT_DEADLINE: u64 = 10000;

/**
 * How long (milliseconds) a write to a characteristic or descriptor may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) service discovery after connecting may take.
 */
pub const DISCOVER_DEADLINE: u64 = 15000;

/**
 * Default timeout (milliseconds) of a single notification pump.
 */
pub const NOTIFICATION_TIMEOUT: u64 = 1000;

/**
 * The vendor UUID template, in the byte order a raw advertisement carries it (little-endian).
 * Bytes 12 and 13 are the placeholder for a 16-bit service or characteristic id:
 * `4248124a7f2c4847b9de04a9xxxx06d5`
 */
pub const UUID_TEMPLATE_LE: [u8; 16] = [
    0x42, 0x48, 0x12, 0x4a, 0x7f, 0x2c, 0x48, 0x47,
    0xb9, 0xde, 0x04, 0xa9, 0x00, 0x00, 0x06, 0xd5,
];

/**
 * Offset of the 16-bit placeholder inside [`UUID_TEMPLATE_LE`].
 */
pub const UUID_PLACEHOLDER_OFFSET: usize = 12;

/**
 * Value written to a client characteristic configuration descriptor to enable notifications.
 */
pub const CCCD_ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/**
 * Value written to a client characteristic configuration descriptor to disable notifications.
 */
pub const CCCD_DISABLE: [u8; 2] = [0x00, 0x00];

/**
 * The client characteristic configuration descriptor sits at value handle + 1.
 */
pub const CCCD_HANDLE_OFFSET: u16 = 1;

/// Size in bytes of the `kind, payload_size` header in front of every command.
pub const COMMAND_HEADER_SIZE: usize = 2;

/// Size in bytes of one EMG notification.
pub const EMG_PAYLOAD_SIZE: usize = 16;

/// Size in bytes of one IMU notification.
pub const IMU_PAYLOAD_SIZE: usize = 20;

/// Number of steps in a `vibrate2` command.
pub const VIBRATE2_STEPS: usize = 6;

/// Raw orientation values are unit quaternion components multiplied by this.
pub const ORIENTATION_SCALE: f32 = 16384.0;

/// Raw accelerometer values are g multiplied by this.
pub const ACCELEROMETER_SCALE: f32 = 2048.0;

/// Raw gyroscope values are degrees per second multiplied by this.
pub const GYROSCOPE_SCALE: f32 = 16.0;

/// 16-bit service and characteristic ids from the band's protocol header.
pub mod ids {
    pub const CONTROL_SERVICE: u16 = 0x0001;
    pub const MYO_INFO_CHARACTERISTIC: u16 = 0x0101;
    pub const FIRMWARE_VERSION_CHARACTERISTIC: u16 = 0x0201;
    pub const COMMAND_CHARACTERISTIC: u16 = 0x0401;

    pub const IMU_DATA_SERVICE: u16 = 0x0002;
    pub const IMU_DATA_CHARACTERISTIC: u16 = 0x0402;
    pub const MOTION_EVENT_CHARACTERISTIC: u16 = 0x0502;

    pub const CLASSIFIER_SERVICE: u16 = 0x0003;
    pub const CLASSIFIER_EVENT_CHARACTERISTIC: u16 = 0x0103;

    pub const EMG_DATA_SERVICE: u16 = 0x0005;
    pub const EMG_DATA0_CHARACTERISTIC: u16 = 0x0105;
    pub const EMG_DATA1_CHARACTERISTIC: u16 = 0x0205;
    pub const EMG_DATA2_CHARACTERISTIC: u16 = 0x0305;
    pub const EMG_DATA3_CHARACTERISTIC: u16 = 0x0405;
}

/// Command kind codes, the first byte of every command.
pub mod command_codes {
    pub const SET_MODE: u8 = 0x01;
    pub const VIBRATE: u8 = 0x03;
    pub const DEEP_SLEEP: u8 = 0x04;
    pub const VIBRATE2: u8 = 0x07;
    pub const SET_SLEEP_MODE: u8 = 0x09;
    pub const UNLOCK: u8 = 0x0a;
    pub const USER_ACTION: u8 = 0x0b;
}
