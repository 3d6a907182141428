//! Wire codec for the Mitsubishi CN105 service port.
//!
//! Frames are `fc <type> 01 30 <len> <payload...> <checksum>` with the
//! checksum computed as `0xfc - sum(previous bytes)`. The unit answers info
//! requests (type 0x42) with info frames (type 0x62) whose first payload
//! byte names the report: 0x02 settings, 0x03 room temperature, 0x06
//! operating status.

pub const FRAME_START: u8 = 0xfc;

const TYPE_SET: u8 = 0x41;
const TYPE_GET: u8 = 0x42;
const TYPE_CONNECT: u8 = 0x5a;
const TYPE_SET_ACK: u8 = 0x61;
const TYPE_INFO: u8 = 0x62;
const TYPE_CONNECT_ACK: u8 = 0x7a;

const INFO_SETTINGS: u8 = 0x02;
const INFO_ROOM_TEMP: u8 = 0x03;
const INFO_STATUS: u8 = 0x06;

const PAYLOAD_LEN: usize = 16;

pub const MIN_TEMP: f32 = 16.0;
pub const MAX_TEMP: f32 = 31.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Heat,
    Dry,
    Cool,
    Fan,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSpeed {
    Auto,
    Quiet,
    Speed1,
    Speed2,
    Speed3,
    Speed4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vane {
    Auto,
    Position1,
    Position2,
    Position3,
    Position4,
    Position5,
    Swing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideVane {
    FarLeft,
    Left,
    Center,
    Right,
    FarRight,
    Split,
    Swing,
}

impl Power {
    pub fn as_str(self) -> &'static str {
        match self {
            Power::Off => "OFF",
            Power::On => "ON",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "OFF" => Some(Power::Off),
            "ON" => Some(Power::On),
            _ => None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            Power::Off => 0x00,
            Power::On => 0x01,
        }
    }

    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Power::Off),
            0x01 => Some(Power::On),
            _ => None,
        }
    }
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Heat => "HEAT",
            Mode::Dry => "DRY",
            Mode::Cool => "COOL",
            Mode::Fan => "FAN",
            Mode::Auto => "AUTO",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "HEAT" => Some(Mode::Heat),
            "DRY" => Some(Mode::Dry),
            "COOL" => Some(Mode::Cool),
            "FAN" => Some(Mode::Fan),
            "AUTO" => Some(Mode::Auto),
            _ => None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            Mode::Heat => 0x01,
            Mode::Dry => 0x02,
            Mode::Cool => 0x03,
            Mode::Fan => 0x07,
            Mode::Auto => 0x08,
        }
    }

    fn from_wire(byte: u8) -> Option<Self> {
        // Units with an i-see sensor add 0x08 on top of the mode value.
        let base = if byte > 0x08 { byte - 0x08 } else { byte };
        match base {
            0x01 => Some(Mode::Heat),
            0x02 => Some(Mode::Dry),
            0x03 => Some(Mode::Cool),
            0x07 => Some(Mode::Fan),
            0x08 => Some(Mode::Auto),
            _ => None,
        }
    }
}

impl FanSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            FanSpeed::Auto => "AUTO",
            FanSpeed::Quiet => "QUIET",
            FanSpeed::Speed1 => "1",
            FanSpeed::Speed2 => "2",
            FanSpeed::Speed3 => "3",
            FanSpeed::Speed4 => "4",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "AUTO" => Some(FanSpeed::Auto),
            "QUIET" => Some(FanSpeed::Quiet),
            "1" => Some(FanSpeed::Speed1),
            "2" => Some(FanSpeed::Speed2),
            "3" => Some(FanSpeed::Speed3),
            "4" => Some(FanSpeed::Speed4),
            _ => None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            FanSpeed::Auto => 0x00,
            FanSpeed::Quiet => 0x01,
            FanSpeed::Speed1 => 0x02,
            FanSpeed::Speed2 => 0x03,
            FanSpeed::Speed3 => 0x05,
            FanSpeed::Speed4 => 0x06,
        }
    }

    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(FanSpeed::Auto),
            0x01 => Some(FanSpeed::Quiet),
            0x02 => Some(FanSpeed::Speed1),
            0x03 => Some(FanSpeed::Speed2),
            0x05 => Some(FanSpeed::Speed3),
            0x06 => Some(FanSpeed::Speed4),
            _ => None,
        }
    }
}

impl Vane {
    pub fn as_str(self) -> &'static str {
        match self {
            Vane::Auto => "AUTO",
            Vane::Position1 => "1",
            Vane::Position2 => "2",
            Vane::Position3 => "3",
            Vane::Position4 => "4",
            Vane::Position5 => "5",
            Vane::Swing => "SWING",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "AUTO" => Some(Vane::Auto),
            "1" => Some(Vane::Position1),
            "2" => Some(Vane::Position2),
            "3" => Some(Vane::Position3),
            "4" => Some(Vane::Position4),
            "5" => Some(Vane::Position5),
            "SWING" => Some(Vane::Swing),
            _ => None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            Vane::Auto => 0x00,
            Vane::Position1 => 0x01,
            Vane::Position2 => 0x02,
            Vane::Position3 => 0x03,
            Vane::Position4 => 0x04,
            Vane::Position5 => 0x05,
            Vane::Swing => 0x07,
        }
    }

    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Vane::Auto),
            0x01 => Some(Vane::Position1),
            0x02 => Some(Vane::Position2),
            0x03 => Some(Vane::Position3),
            0x04 => Some(Vane::Position4),
            0x05 => Some(Vane::Position5),
            0x07 => Some(Vane::Swing),
            _ => None,
        }
    }
}

impl WideVane {
    pub fn as_str(self) -> &'static str {
        match self {
            WideVane::FarLeft => "<<",
            WideVane::Left => "<",
            WideVane::Center => "|",
            WideVane::Right => ">",
            WideVane::FarRight => ">>",
            WideVane::Split => "<>",
            WideVane::Swing => "SWING",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "<<" => Some(WideVane::FarLeft),
            "<" => Some(WideVane::Left),
            "|" => Some(WideVane::Center),
            ">" => Some(WideVane::Right),
            ">>" => Some(WideVane::FarRight),
            "<>" => Some(WideVane::Split),
            "SWING" => Some(WideVane::Swing),
            _ => None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            WideVane::FarLeft => 0x01,
            WideVane::Left => 0x02,
            WideVane::Center => 0x03,
            WideVane::Right => 0x04,
            WideVane::FarRight => 0x05,
            WideVane::Split => 0x08,
            WideVane::Swing => 0x0c,
        }
    }

    fn from_wire(byte: u8) -> Option<Self> {
        // The top nibble carries an adjustment flag on some units.
        match byte & 0x0f {
            // Units without a horizontal vane report 0.
            0x00 => Some(WideVane::Center),
            0x01 => Some(WideVane::FarLeft),
            0x02 => Some(WideVane::Left),
            0x03 => Some(WideVane::Center),
            0x04 => Some(WideVane::Right),
            0x05 => Some(WideVane::FarRight),
            0x08 => Some(WideVane::Split),
            0x0c => Some(WideVane::Swing),
            _ => None,
        }
    }
}

/// The unit's active settings, as reported by a settings info frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub power: Power,
    pub mode: Mode,
    pub temperature: f32,
    pub fan: FanSpeed,
    pub vane: Vane,
    pub wide_vane: WideVane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingStatus {
    pub operating: bool,
    pub compressor_frequency: u8,
}

/// Fields of a set packet; `None` leaves the corresponding setting alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SettingsUpdate {
    pub power: Option<Power>,
    pub mode: Option<Mode>,
    pub temperature: Option<f32>,
    pub fan: Option<FanSpeed>,
    pub vane: Option<Vane>,
    pub wide_vane: Option<WideVane>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Connected,
    SetAck,
    Settings(Settings),
    RoomTemp(f32),
    Status(OperatingStatus),
    Unknown(u8),
}

pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u8 = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xfcu8.wrapping_sub(sum)
}

fn frame(frame_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 6);
    out.extend_from_slice(&[FRAME_START, frame_type, 0x01, 0x30, payload.len() as u8]);
    out.extend_from_slice(payload);
    out.push(checksum(&out));
    out
}

/// Handshake packet; the unit answers with a connect-ack frame and starts
/// accepting requests.
pub fn connect_packet() -> Vec<u8> {
    frame(TYPE_CONNECT, &[0xca, 0x01])
}

pub fn settings_request() -> Vec<u8> {
    info_request(INFO_SETTINGS)
}

pub fn room_temp_request() -> Vec<u8> {
    info_request(INFO_ROOM_TEMP)
}

pub fn status_request() -> Vec<u8> {
    info_request(INFO_STATUS)
}

fn info_request(info_mode: u8) -> Vec<u8> {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = info_mode;
    frame(TYPE_GET, &payload)
}

/// Encode a set packet carrying only the fields present in `update`.
pub fn set_packet(update: &SettingsUpdate) -> Vec<u8> {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = 0x01;

    if let Some(power) = update.power {
        payload[1] |= 0x01;
        payload[3] = power.to_wire();
    }
    if let Some(mode) = update.mode {
        payload[1] |= 0x02;
        payload[4] = mode.to_wire();
    }
    if let Some(temperature) = update.temperature {
        payload[1] |= 0x04;
        payload[5] = encode_target_temp(temperature);
    }
    if let Some(fan) = update.fan {
        payload[1] |= 0x08;
        payload[6] = fan.to_wire();
    }
    if let Some(vane) = update.vane {
        payload[1] |= 0x10;
        payload[7] = vane.to_wire();
    }
    if let Some(wide_vane) = update.wide_vane {
        payload[2] |= 0x01;
        payload[13] = wide_vane.to_wire();
    }

    frame(TYPE_SET, &payload)
}

/// Target temperatures go on the wire as `31 - celsius`, whole degrees,
/// clamped to the unit's 16-31 range.
fn encode_target_temp(celsius: f32) -> u8 {
    let celsius = celsius.round().clamp(MIN_TEMP, MAX_TEMP);
    31 - celsius as u8
}

fn decode_target_temp(byte: u8) -> f32 {
    f32::from(31u8.saturating_sub(byte).clamp(MIN_TEMP as u8, MAX_TEMP as u8))
}

/// Extract the next complete, checksum-valid frame from `buf`, consuming it
/// and any junk preceding it. Returns `None` when no complete frame is
/// buffered yet; corrupt frames are skipped.
pub fn extract_frame(buf: &mut Vec<u8>) -> Option<Frame> {
    loop {
        let start = buf.iter().position(|b| *b == FRAME_START)?;
        buf.drain(..start);

        if buf.len() < 5 {
            return None;
        }
        // Not a real header: resync one byte further on.
        if buf[2] != 0x01 || buf[3] != 0x30 {
            buf.drain(..1);
            continue;
        }

        let payload_len = buf[4] as usize;
        let frame_len = 5 + payload_len + 1;
        if buf.len() < frame_len {
            return None;
        }

        let expected = checksum(&buf[..frame_len - 1]);
        if buf[frame_len - 1] != expected {
            buf.drain(..1);
            continue;
        }

        let frame = Frame {
            frame_type: buf[1],
            payload: buf[5..frame_len - 1].to_vec(),
        };
        buf.drain(..frame_len);
        return Some(frame);
    }
}

pub fn decode(frame: &Frame) -> Result<Response, String> {
    match frame.frame_type {
        TYPE_CONNECT_ACK => Ok(Response::Connected),
        TYPE_SET_ACK => Ok(Response::SetAck),
        TYPE_INFO => decode_info(&frame.payload),
        other => Err(format!("unexpected frame type 0x{other:02x}")),
    }
}

fn decode_info(payload: &[u8]) -> Result<Response, String> {
    if payload.len() < PAYLOAD_LEN {
        return Err(format!("short info payload ({} bytes)", payload.len()));
    }
    match payload[0] {
        INFO_SETTINGS => {
            let power = Power::from_wire(payload[3])
                .ok_or_else(|| format!("unknown power byte 0x{:02x}", payload[3]))?;
            let mode = Mode::from_wire(payload[4])
                .ok_or_else(|| format!("unknown mode byte 0x{:02x}", payload[4]))?;
            // Newer firmware reports half degrees in byte 11; older units
            // use the 31-offset map in byte 5.
            let temperature = if payload[11] != 0 {
                f32::from(payload[11].wrapping_sub(128)) / 2.0
            } else {
                decode_target_temp(payload[5])
            };
            let fan = FanSpeed::from_wire(payload[6])
                .ok_or_else(|| format!("unknown fan byte 0x{:02x}", payload[6]))?;
            let vane = Vane::from_wire(payload[7])
                .ok_or_else(|| format!("unknown vane byte 0x{:02x}", payload[7]))?;
            let wide_vane = WideVane::from_wire(payload[10])
                .ok_or_else(|| format!("unknown wideVane byte 0x{:02x}", payload[10]))?;
            Ok(Response::Settings(Settings {
                power,
                mode,
                temperature,
                fan,
                vane,
                wide_vane,
            }))
        }
        INFO_ROOM_TEMP => {
            let celsius = if payload[6] != 0 {
                f32::from(payload[6].wrapping_sub(128)) / 2.0
            } else {
                // Legacy map: index 0 is 10 degrees, one degree per step.
                f32::from(payload[3]) + 10.0
            };
            Ok(Response::RoomTemp(celsius))
        }
        INFO_STATUS => Ok(Response::Status(OperatingStatus {
            operating: payload[4] != 0,
            compressor_frequency: payload[3],
        })),
        other => Ok(Response::Unknown(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_frame(payload: [u8; PAYLOAD_LEN]) -> Vec<u8> {
        frame(TYPE_INFO, &payload)
    }

    #[test]
    fn connect_packet_matches_known_bytes() {
        assert_eq!(
            connect_packet(),
            vec![0xfc, 0x5a, 0x01, 0x30, 0x02, 0xca, 0x01, 0xa8]
        );
    }

    #[test]
    fn checksum_balances_frames() {
        let packet = settings_request();
        let (body, check) = packet.split_at(packet.len() - 1);
        assert_eq!(check[0], checksum(body));
    }

    #[test]
    fn set_packet_encodes_only_requested_fields() {
        let packet = set_packet(&SettingsUpdate {
            power: Some(Power::On),
            mode: Some(Mode::Heat),
            temperature: Some(22.0),
            ..Default::default()
        });
        assert_eq!(packet[1], TYPE_SET);
        // payload starts at byte 5
        assert_eq!(packet[6], 0x01 | 0x02 | 0x04);
        assert_eq!(packet[7], 0x00);
        assert_eq!(packet[8], 0x01); // power on
        assert_eq!(packet[9], 0x01); // heat
        assert_eq!(packet[10], 31 - 22);
    }

    #[test]
    fn set_packet_puts_wide_vane_in_the_second_flag_byte() {
        let packet = set_packet(&SettingsUpdate {
            wide_vane: Some(WideVane::Swing),
            ..Default::default()
        });
        assert_eq!(packet[6], 0x00);
        assert_eq!(packet[7], 0x01);
        assert_eq!(packet[18], 0x0c);
    }

    #[test]
    fn target_temp_is_clamped_to_unit_range() {
        assert_eq!(encode_target_temp(40.0), 0);
        assert_eq!(encode_target_temp(10.0), 15);
        assert_eq!(encode_target_temp(20.4), 11);
    }

    #[test]
    fn extract_frame_skips_leading_junk() {
        let mut buf = vec![0x00, 0x12, 0x34];
        buf.extend(connect_packet());
        let frame = extract_frame(&mut buf).unwrap();
        assert_eq!(frame.frame_type, TYPE_CONNECT);
        assert_eq!(frame.payload, vec![0xca, 0x01]);
        assert!(buf.is_empty());
    }

    #[test]
    fn extract_frame_waits_for_a_complete_frame() {
        let packet = connect_packet();
        let mut buf = packet[..packet.len() - 2].to_vec();
        assert_eq!(extract_frame(&mut buf), None);
        buf.extend_from_slice(&packet[packet.len() - 2..]);
        assert!(extract_frame(&mut buf).is_some());
    }

    #[test]
    fn extract_frame_drops_corrupt_checksums() {
        let mut bad = connect_packet();
        let last = bad.len() - 1;
        bad[last] ^= 0xff;
        let mut buf = bad;
        buf.extend(connect_packet());
        let frame = extract_frame(&mut buf).unwrap();
        assert_eq!(frame.frame_type, TYPE_CONNECT);
    }

    #[test]
    fn decodes_a_settings_report() {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = INFO_SETTINGS;
        payload[3] = 0x01; // on
        payload[4] = 0x01; // heat
        payload[5] = 31 - 21;
        payload[6] = 0x00; // fan auto
        payload[7] = 0x07; // vane swing
        payload[10] = 0x03; // wide vane centered
        let mut buf = info_frame(payload);
        let frame = extract_frame(&mut buf).unwrap();
        let decoded = decode(&frame).unwrap();
        assert_eq!(
            decoded,
            Response::Settings(Settings {
                power: Power::On,
                mode: Mode::Heat,
                temperature: 21.0,
                fan: FanSpeed::Auto,
                vane: Vane::Swing,
                wide_vane: WideVane::Center,
            })
        );
    }

    #[test]
    fn settings_report_prefers_the_half_degree_field() {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = INFO_SETTINGS;
        payload[3] = 0x01;
        payload[4] = 0x03; // cool
        payload[5] = 31 - 21;
        payload[11] = 128 + 45; // 22.5 degrees
        let mut buf = info_frame(payload);
        let frame = extract_frame(&mut buf).unwrap();
        match decode(&frame).unwrap() {
            Response::Settings(settings) => assert_eq!(settings.temperature, 22.5),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn decodes_room_temperature_both_encodings() {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = INFO_ROOM_TEMP;
        payload[3] = 11; // 21 degrees on the legacy map
        let mut buf = info_frame(payload);
        let frame = extract_frame(&mut buf).unwrap();
        assert_eq!(decode(&frame).unwrap(), Response::RoomTemp(21.0));

        payload[6] = 128 + 43; // 21.5 degrees direct
        let mut buf = info_frame(payload);
        let frame = extract_frame(&mut buf).unwrap();
        assert_eq!(decode(&frame).unwrap(), Response::RoomTemp(21.5));
    }

    #[test]
    fn decodes_operating_status() {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = INFO_STATUS;
        payload[3] = 42;
        payload[4] = 0x01;
        let mut buf = info_frame(payload);
        let frame = extract_frame(&mut buf).unwrap();
        assert_eq!(
            decode(&frame).unwrap(),
            Response::Status(OperatingStatus {
                operating: true,
                compressor_frequency: 42,
            })
        );
    }

    #[test]
    fn unknown_info_modes_are_surfaced_not_fatal() {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = 0x05;
        let mut buf = info_frame(payload);
        let frame = extract_frame(&mut buf).unwrap();
        assert_eq!(decode(&frame).unwrap(), Response::Unknown(0x05));
    }
}
