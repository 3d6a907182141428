pub mod client;
pub mod protocol;

use protocol::{FanSpeed, Mode, OperatingStatus, Power, Settings, Vane, WideVane};

/// A decoded update from the unit, ready to publish to MQTT.
#[derive(Debug, Clone, PartialEq)]
pub enum HvacUpdate {
    Settings(Settings),
    RoomTemp(f32),
    Status(OperatingStatus),
    Debug(String),
}

/// A command for the unit, produced from an incoming `/set` publish.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HvacCommand {
    SetPower(Power),
    SetMode(Mode),
    SetTemp(f32),
    SetFan(FanSpeed),
    SetVane(Vane),
    SetWideVane(WideVane),
    SetDebug(bool),
}

/// Which `/set` topic a publish arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Power,
    Mode,
    Temp,
    Fan,
    Vane,
    WideVane,
    Debug,
}
