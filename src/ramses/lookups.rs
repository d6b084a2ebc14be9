/// Name tables for enumerated payload bytes

/// Alarm types reported by 3120, indexed by the alarm-type byte
pub const ALARM_TYPES: [&str; 64] = [
    "No alarm",
    "Flame failure",
    "Ignition lockout",
    "Flame signal lost",
    "Flame detected out of sequence",
    "Pilot flame failure",
    "Igniter failure",
    "Gas valve failure",
    "Gas valve relay stuck",
    "Low gas pressure",
    "High gas pressure",
    "Pressure switch failed to close",
    "Pressure switch failed to open",
    "Pressure switch open in run",
    "Inducer motor failure",
    "Combustion air blower failure",
    "Blocked flue",
    "Blocked condensate drain",
    "High limit open",
    "Manual reset high limit open",
    "Rollout switch open",
    "Supply sensor open",
    "Supply sensor shorted",
    "Return sensor open",
    "Return sensor shorted",
    "DHW sensor open",
    "DHW sensor shorted",
    "Flue sensor open",
    "Flue sensor shorted",
    "Outdoor sensor open",
    "Outdoor sensor shorted",
    "Supply overtemperature",
    "Flue overtemperature",
    "Excessive supply/return differential",
    "Low water pressure",
    "High water pressure",
    "Low water cutoff",
    "No water flow",
    "Circulator pump failure",
    "Frost protection active",
    "Freeze sensor open",
    "Heat exchanger overheat",
    "Boiler pump overrun",
    "DHW overtemperature",
    "DHW pump failure",
    "Fan speed low",
    "Fan speed high",
    "Fan tachometer missing",
    "Line voltage low",
    "Line voltage high",
    "Line frequency error",
    "Polarity reversed",
    "Ground fault",
    "Low 24VAC supply",
    "Internal control fault",
    "Internal memory fault",
    "Internal watchdog reset",
    "Parameter table corrupt",
    "Communication lost with thermostat",
    "Communication lost with appliance",
    "Service interval due",
    "Filter service due",
    "Anti-cycling lockout",
    "Hard lockout, manual reset required",
];

/// Burner control instantaneous states (3E70 byte 0)
pub const INSTANTANEOUS_STATES: [&str; 12] = [
    "Standby",
    "Heat request",
    "Pre-purge",
    "Ignition trial",
    "Flame stabilisation",
    "Running",
    "Modulating",
    "Post-purge",
    "Pump overrun",
    "Soft lockout",
    "Hard lockout",
    "Off",
];

/// Burner control sequence states (3E70 byte 2)
pub const SEQUENCE_STATES: [&str; 8] = [
    "Idle",
    "Safe start check",
    "Pressure switch proving",
    "Purge",
    "Ignition",
    "Main flame",
    "Post-purge",
    "Recycle delay",
];

/// Evohome system modes (2E04 byte 0)
pub const SYSTEM_MODES: [&str; 8] = [
    "Auto",
    "Heating off",
    "Eco",
    "Away",
    "Day off",
    "Day off (eco)",
    "Auto with reset",
    "Custom",
];

/// Table entry for `index`, or a hex placeholder naming the raw byte
pub fn lookup(table: &[&str], index: u8) -> String {
    table
        .get(index as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("unknown (0x{:02X})", index))
}
