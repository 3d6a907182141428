use std::time::{Duration, Instant};

use serialport::{DataBits, Parity, SerialPort, StopBits};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;

use super::protocol::{self, Frame, Power, Response, SettingsUpdate};
use super::{Capability, HvacCommand, HvacUpdate};

const BAUD_RATE: u32 = 2400;
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const SETTINGS_POLL: Duration = Duration::from_secs(5);
const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_WINDOW: Duration = Duration::from_secs(2);
const LINK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HvacClient {
    serial_port: String,
    room_temp_interval: Duration,
}

impl HvacClient {
    pub fn new(config: &Config) -> Self {
        Self {
            serial_port: config.serial_port.clone(),
            room_temp_interval: Duration::from_millis(config.room_temp_interval_ms),
        }
    }

    /// Main device loop. Connects, polls, applies commands, reconnects with
    /// backoff on failure. Serial I/O is blocking, so this runs on its own
    /// thread; the mpsc/watch channels bridge to the async side.
    pub fn run(
        &self,
        update_tx: mpsc::Sender<HvacUpdate>,
        mut cmd_rx: mpsc::Receiver<HvacCommand>,
        connected_tx: watch::Sender<bool>,
    ) {
        let mut backoff = Duration::from_secs(5);
        let max_backoff = Duration::from_secs(60);
        // Survives reconnects so an operator doesn't lose the frame dump
        // mid-diagnosis.
        let mut debug_frames = false;

        loop {
            info!("Connecting to heat pump on {}", self.serial_port);

            match self.run_session(&update_tx, &mut cmd_rx, &connected_tx, &mut debug_frames) {
                Ok(()) => {
                    info!("Heat pump session ended cleanly");
                    connected_tx.send_replace(false);
                    return;
                }
                Err(e) => {
                    connected_tx.send_replace(false);
                    error!("Heat pump session error: {}. Reconnecting in {:?}", e, backoff);
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    }

    fn run_session(
        &self,
        update_tx: &mpsc::Sender<HvacUpdate>,
        cmd_rx: &mut mpsc::Receiver<HvacCommand>,
        connected_tx: &watch::Sender<bool>,
        debug_frames: &mut bool,
    ) -> Result<(), String> {
        let mut port = serialport::new(self.serial_port.as_str(), BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| format!("failed to open {}: {e}", self.serial_port))?;

        let mut rx_buf: Vec<u8> = Vec::new();
        handshake(port.as_mut(), &mut rx_buf)?;
        info!("Connected to heat pump");
        connected_tx.send_replace(true);

        let mut last_settings_poll: Option<Instant> = None;
        let mut last_room_temp_poll: Option<Instant> = None;
        // Alternate settings and status requests; the unit answers one
        // request at a time.
        let mut poll_status_next = false;
        let mut last_frame = Instant::now();

        loop {
            loop {
                match cmd_rx.try_recv() {
                    Ok(cmd) => self.apply_command(port.as_mut(), cmd, debug_frames)?,
                    Err(TryRecvError::Empty) => break,
                    // Channel closed: the bridge is shutting down.
                    Err(TryRecvError::Disconnected) => return Ok(()),
                }
            }

            if last_settings_poll.is_none_or(|t| t.elapsed() >= SETTINGS_POLL) {
                last_settings_poll = Some(Instant::now());
                let request = if poll_status_next {
                    protocol::status_request()
                } else {
                    protocol::settings_request()
                };
                poll_status_next = !poll_status_next;
                send(port.as_mut(), &request)?;
            }
            if last_room_temp_poll.is_none_or(|t| t.elapsed() >= self.room_temp_interval) {
                last_room_temp_poll = Some(Instant::now());
                send(port.as_mut(), &protocol::room_temp_request())?;
            }

            read_chunk(port.as_mut(), &mut rx_buf)?;
            while let Some(frame) = protocol::extract_frame(&mut rx_buf) {
                last_frame = Instant::now();
                process_frame(&frame, update_tx, *debug_frames);
            }

            if last_frame.elapsed() > LINK_TIMEOUT {
                return Err(format!(
                    "no valid frames from the unit for {}s",
                    LINK_TIMEOUT.as_secs()
                ));
            }
        }
    }

    fn apply_command(
        &self,
        port: &mut dyn SerialPort,
        cmd: HvacCommand,
        debug_frames: &mut bool,
    ) -> Result<(), String> {
        let update = match cmd {
            HvacCommand::SetDebug(on) => {
                *debug_frames = on;
                info!("Frame dump {}", if on { "enabled" } else { "disabled" });
                return Ok(());
            }
            HvacCommand::SetPower(power) => SettingsUpdate {
                power: Some(power),
                ..Default::default()
            },
            // Selecting a mode implies switching the unit on, matching how
            // thermostat cards drive the mode topic.
            HvacCommand::SetMode(mode) => SettingsUpdate {
                power: Some(Power::On),
                mode: Some(mode),
                ..Default::default()
            },
            HvacCommand::SetTemp(celsius) => SettingsUpdate {
                temperature: Some(celsius),
                ..Default::default()
            },
            HvacCommand::SetFan(fan) => SettingsUpdate {
                fan: Some(fan),
                ..Default::default()
            },
            HvacCommand::SetVane(vane) => SettingsUpdate {
                vane: Some(vane),
                ..Default::default()
            },
            HvacCommand::SetWideVane(wide_vane) => SettingsUpdate {
                wide_vane: Some(wide_vane),
                ..Default::default()
            },
        };

        info!("Sending command to unit: {:?}", cmd);
        send(port, &protocol::set_packet(&update))
    }
}

fn handshake(port: &mut dyn SerialPort, rx_buf: &mut Vec<u8>) -> Result<(), String> {
    for attempt in 1..=CONNECT_ATTEMPTS {
        send(port, &protocol::connect_packet())?;

        let deadline = Instant::now() + CONNECT_WINDOW;
        while Instant::now() < deadline {
            read_chunk(port, rx_buf)?;
            while let Some(frame) = protocol::extract_frame(rx_buf) {
                if matches!(protocol::decode(&frame), Ok(Response::Connected)) {
                    return Ok(());
                }
            }
        }
        warn!("No connect ack from unit (attempt {attempt}/{CONNECT_ATTEMPTS})");
    }
    Err("unit did not acknowledge the connect handshake".into())
}

fn send(port: &mut dyn SerialPort, packet: &[u8]) -> Result<(), String> {
    port.write_all(packet)
        .map_err(|e| format!("serial write failed: {e}"))
}

fn read_chunk(port: &mut dyn SerialPort, rx_buf: &mut Vec<u8>) -> Result<(), String> {
    let mut chunk = [0u8; 64];
    match port.read(&mut chunk) {
        Ok(n) => rx_buf.extend_from_slice(&chunk[..n]),
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
        Err(e) => return Err(format!("serial read failed: {e}")),
    }
    Ok(())
}

fn process_frame(frame: &Frame, update_tx: &mpsc::Sender<HvacUpdate>, debug_frames: bool) {
    if debug_frames {
        let hex: Vec<String> = frame
            .payload
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        let line = format!("type {:02x}: {}", frame.frame_type, hex.join(" "));
        if update_tx.blocking_send(HvacUpdate::Debug(line)).is_err() {
            warn!("Update channel closed");
            return;
        }
    }

    let update = match protocol::decode(frame) {
        Ok(Response::Settings(settings)) => HvacUpdate::Settings(settings),
        Ok(Response::RoomTemp(celsius)) => HvacUpdate::RoomTemp(celsius),
        Ok(Response::Status(status)) => HvacUpdate::Status(status),
        Ok(Response::SetAck) => {
            debug!("Unit acknowledged settings change");
            return;
        }
        Ok(Response::Connected) => {
            debug!("Duplicate connect ack");
            return;
        }
        Ok(Response::Unknown(info_mode)) => {
            debug!("Ignoring info mode 0x{info_mode:02x}");
            return;
        }
        Err(e) => {
            warn!("Undecodable frame: {}", e);
            return;
        }
    };

    if update_tx.blocking_send(update).is_err() {
        warn!("Update channel closed");
    }
}

/// Build an [`HvacCommand`] from a `/set` payload, converting Home
/// Assistant vocabulary to the unit's where they differ.
pub fn build_command(capability: Capability, payload: &str) -> Option<HvacCommand> {
    use super::protocol::{FanSpeed, Mode, Vane, WideVane};

    let payload = payload.trim();
    match capability {
        Capability::Power => Power::from_name(payload).map(HvacCommand::SetPower),
        Capability::Mode => match payload.to_ascii_lowercase().as_str() {
            // HA turns the unit off through the mode topic.
            "off" => Some(HvacCommand::SetPower(Power::Off)),
            "fan_only" => Some(HvacCommand::SetMode(Mode::Fan)),
            other => Mode::from_name(other).map(HvacCommand::SetMode),
        },
        Capability::Temp => payload
            .parse::<f32>()
            .ok()
            .filter(|celsius| celsius.is_finite())
            .map(HvacCommand::SetTemp),
        Capability::Fan => FanSpeed::from_name(payload).map(HvacCommand::SetFan),
        Capability::Vane => Vane::from_name(payload).map(HvacCommand::SetVane),
        Capability::WideVane => WideVane::from_name(payload).map(HvacCommand::SetWideVane),
        Capability::Debug => match payload.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Some(HvacCommand::SetDebug(true)),
            "off" | "false" | "0" => Some(HvacCommand::SetDebug(false)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::super::protocol::Mode;
    use super::*;

    #[test]
    fn mode_off_becomes_a_power_command() {
        assert_eq!(
            build_command(Capability::Mode, "off"),
            Some(HvacCommand::SetPower(Power::Off))
        );
    }

    #[test]
    fn ha_fan_only_maps_to_unit_fan_mode() {
        assert_eq!(
            build_command(Capability::Mode, "fan_only"),
            Some(HvacCommand::SetMode(Mode::Fan))
        );
    }

    #[test]
    fn mode_names_are_case_insensitive() {
        assert_eq!(
            build_command(Capability::Mode, "HEAT"),
            Some(HvacCommand::SetMode(Mode::Heat))
        );
        assert_eq!(
            build_command(Capability::Mode, "heat"),
            Some(HvacCommand::SetMode(Mode::Heat))
        );
    }

    #[test]
    fn temperature_payloads_parse_as_celsius() {
        assert_eq!(
            build_command(Capability::Temp, "21.5"),
            Some(HvacCommand::SetTemp(21.5))
        );
        assert_eq!(build_command(Capability::Temp, "warm"), None);
        assert_eq!(build_command(Capability::Temp, "NaN"), None);
    }

    #[test]
    fn debug_toggle_accepts_the_usual_spellings() {
        assert_eq!(
            build_command(Capability::Debug, "on"),
            Some(HvacCommand::SetDebug(true))
        );
        assert_eq!(
            build_command(Capability::Debug, "0"),
            Some(HvacCommand::SetDebug(false))
        );
        assert_eq!(build_command(Capability::Debug, "maybe"), None);
    }

    #[test]
    fn garbage_payloads_are_dropped() {
        assert_eq!(build_command(Capability::Power, "sideways"), None);
        assert_eq!(build_command(Capability::Fan, "11"), None);
    }
}
