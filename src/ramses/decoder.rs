/// Payload decoding for known RAMSES-II message codes
///
/// Temperatures are big-endian fixed point in 0.01°C unless a rule says
/// otherwise; `0x7FFF` marks a reading as not available. Rules for the
/// appliance-facing codes (the table that used to travel through the serial
/// adapter) also accept one trailing checksum byte, which is skipped and
/// reported as `checksum_ignored`.
use crate::models::{DecodedRecord, FieldValue};
use crate::ramses::frame::ch_value;
use crate::ramses::lookups::{
    lookup, ALARM_TYPES, INSTANTANEOUS_STATES, SEQUENCE_STATES, SYSTEM_MODES,
};

const SENTINEL: i16 = 0x7FFF;
const FORCE_OFF: u8 = 0xFC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCode {
    RelayDemand,
    RfCheck,
    SupplyHighLimit,
    DhwSetpoint,
    DhwSetpointLimits,
    NodeOsNumber,
    NodeVersion,
    DhwTemperature,
    OutdoorHumidity,
    OutdoorTemperature,
    DisplayedTemperature,
    ChSetpointRequest,
    DeviceDiscovery,
    ControllerKeepalive,
    DesiredBoilerSetpoint,
    CentralHeatSetpoint,
    ZoneSetpoint,
    SystemMode,
    ZoneTemperature,
    DhwDemand,
    SystemDemand,
    BoilerDemand,
    Alarm,
    HeatDemand,
    BoilerTemperature,
    ActuatorSync,
    DeviceStatus,
    ActuatorState,
}

impl MessageCode {
    /// None for any code this decoder does not know
    pub fn from_code(code: &str) -> Option<Self> {
        let code = match code.trim().to_ascii_uppercase().as_str() {
            "0008" => MessageCode::RelayDemand,
            "0016" => MessageCode::RfCheck,
            "1081" => MessageCode::SupplyHighLimit,
            "10A0" => MessageCode::DhwSetpoint,
            "10A1" => MessageCode::DhwSetpointLimits,
            "10E0" => MessageCode::NodeOsNumber,
            "10E1" => MessageCode::NodeVersion,
            "1260" => MessageCode::DhwTemperature,
            "1280" => MessageCode::OutdoorHumidity,
            "1290" => MessageCode::OutdoorTemperature,
            "12C0" => MessageCode::DisplayedTemperature,
            "1F09" => MessageCode::ChSetpointRequest,
            "1FC9" => MessageCode::DeviceDiscovery,
            "1FD4" => MessageCode::ControllerKeepalive,
            "22D9" => MessageCode::DesiredBoilerSetpoint,
            "22DB" => MessageCode::CentralHeatSetpoint,
            "2309" => MessageCode::ZoneSetpoint,
            "2E04" => MessageCode::SystemMode,
            "30C9" => MessageCode::ZoneTemperature,
            "30D0" => MessageCode::DhwDemand,
            "3110" => MessageCode::SystemDemand,
            "3114" => MessageCode::BoilerDemand,
            "3120" => MessageCode::Alarm,
            "3150" => MessageCode::HeatDemand,
            "3200" => MessageCode::BoilerTemperature,
            "3B00" => MessageCode::ActuatorSync,
            "3E70" => MessageCode::DeviceStatus,
            "3EF0" => MessageCode::ActuatorState,
            _ => return None,
        };
        Some(code)
    }

    pub fn meaning(&self) -> &'static str {
        match self {
            MessageCode::RelayDemand => "Relay demand",
            MessageCode::RfCheck => "RF check",
            MessageCode::SupplyHighLimit => "Supply high limit",
            MessageCode::DhwSetpoint => "DHW setpoint",
            MessageCode::DhwSetpointLimits => "DHW setpoint limits",
            MessageCode::NodeOsNumber => "Node identification (OS number)",
            MessageCode::NodeVersion => "Node identification (version)",
            MessageCode::DhwTemperature => "DHW cylinder temperature",
            MessageCode::OutdoorHumidity => "Outdoor humidity",
            MessageCode::OutdoorTemperature => "Outdoor temperature",
            MessageCode::DisplayedTemperature => "Displayed temperature",
            MessageCode::ChSetpointRequest => "CH setpoint request",
            MessageCode::DeviceDiscovery => "Device discovery (bind)",
            MessageCode::ControllerKeepalive => "Controller keepalive",
            MessageCode::DesiredBoilerSetpoint => "Desired boiler setpoint",
            MessageCode::CentralHeatSetpoint => "Central Heat setpoint",
            MessageCode::ZoneSetpoint => "Zone setpoint",
            MessageCode::SystemMode => "System mode",
            MessageCode::ZoneTemperature => "Zone temperature",
            MessageCode::DhwDemand => "DHW demand",
            MessageCode::SystemDemand => "Heat/Cool demand (system)",
            MessageCode::BoilerDemand => "Heat/Cool demand (boiler)",
            MessageCode::Alarm => "Alarm",
            MessageCode::HeatDemand => "Heat demand",
            MessageCode::BoilerTemperature => "Boiler temperature",
            MessageCode::ActuatorSync => "Actuator sync",
            MessageCode::DeviceStatus => "Device status",
            MessageCode::ActuatorState => "Actuator state",
        }
    }

    /// None when the payload length fits none of the rule's layouts
    fn decode_bytes(&self, data: &[u8]) -> Option<DecodedRecord> {
        let rec = DecodedRecord::new(self.meaning());
        match self {
            MessageCode::RelayDemand => {
                let [domain, demand] = exact::<2>(data)?;
                Some(
                    rec.with("domain", int(domain))
                        .with("percent", FieldValue::Float(demand as f64 / 2.0)),
                )
            }
            MessageCode::RfCheck => {
                let [domain, signal] = exact::<2>(data)?;
                Some(rec.with("domain", int(domain)).with("signal", int(signal)))
            }
            MessageCode::SupplyHighLimit => {
                let (d, checksum) = fit(data, &[5])?;
                Some(with_checksum(
                    rec.with("setpoint_c", centi(&d[0..2]))
                        .with("differential_c", centi(&d[2..4]))
                        .with("status", int(d[4])),
                    checksum,
                ))
            }
            MessageCode::DhwSetpoint => {
                let (d, checksum) = fit(data, &[2, 5])?;
                let mut rec = rec.with("setpoint_c", centi(&d[0..2]));
                if d.len() == 5 {
                    rec.insert("differential_c", centi(&d[3..5]));
                }
                Some(with_checksum(rec, checksum))
            }
            MessageCode::DhwSetpointLimits => {
                let (d, checksum) = fit(data, &[8])?;
                Some(with_checksum(
                    rec.with("max_setpoint_c", centi(&d[0..2]))
                        .with("min_setpoint_c", centi(&d[2..4]))
                        .with("max_differential_c", centi(&d[4..6]))
                        .with("min_differential_c", centi(&d[6..8])),
                    checksum,
                ))
            }
            MessageCode::NodeOsNumber => decode_os_number(rec, data),
            MessageCode::NodeVersion => {
                let (d, checksum) = fit(data, &[9])?;
                Some(with_checksum(
                    rec.with("unit_id", int(d[0]))
                        .with("field", int(d[1]))
                        .with("major", int(d[2]))
                        .with("minor", int(d[3]))
                        .with("version", text(format!("{}.{}", d[2], d[3])))
                        .with("tail", text(hex::encode_upper(&d[4..9]))),
                    checksum,
                ))
            }
            MessageCode::DhwTemperature => {
                let (d, checksum) = fit(data, &[6])?;
                Some(with_checksum(
                    rec.with("cylinder_c", signed_centi(&d[0..2]))
                        .with("top_c", signed_centi(&d[2..4]))
                        .with("bottom_c", signed_centi(&d[4..6])),
                    checksum,
                ))
            }
            MessageCode::OutdoorHumidity => {
                let (d, checksum) = fit(data, &[6])?;
                Some(with_checksum(
                    rec.with("humidity_pct", FieldValue::Float(d[0] as f64))
                        .with("temperature_c", signed_centi(&d[1..3]))
                        .with("dewpoint_c", signed_centi(&d[3..5])),
                    checksum,
                ))
            }
            MessageCode::OutdoorTemperature => {
                let (d, checksum) = fit(data, &[2])?;
                Some(with_checksum(
                    rec.with("value_c", signed_centi(&d[0..2])),
                    checksum,
                ))
            }
            MessageCode::DisplayedTemperature => {
                let (d, checksum) = fit(data, &[3])?;
                let rec = match d[1] {
                    0x00 => rec
                        .with("value_f", int(d[0]))
                        .with("units", text("F".to_string())),
                    0x01 => rec
                        .with("value_c", FieldValue::Float(d[0] as f64 / 2.0))
                        .with("units", text("C".to_string())),
                    units => rec
                        .with("value_raw", int(d[0]))
                        .with("decode_warning", text(format!("unknown units 0x{:02X}", units))),
                };
                Some(with_checksum(rec, checksum))
            }
            MessageCode::ChSetpointRequest => {
                Some(rec.with("value_c", FieldValue::Float(ch_value(data)?)))
            }
            MessageCode::DeviceDiscovery => {
                let offers = records(data, 6)?
                    .map(|r| {
                        text(format!(
                            "{:02X} {} {}",
                            r[0],
                            hex::encode_upper(&r[1..3]),
                            device_id(&r[3..6])
                        ))
                    })
                    .collect();
                Some(rec.with("offers", FieldValue::List(offers)))
            }
            MessageCode::ControllerKeepalive => {
                let [_, hi, lo] = exact::<3>(data)?;
                Some(rec.with("ticker", int(u16::from_be_bytes([hi, lo]))))
            }
            MessageCode::DesiredBoilerSetpoint => {
                let (d, checksum) = fit(data, &[2])?;
                Some(with_checksum(
                    rec.with("setpoint_c", centi(&d[0..2])),
                    checksum,
                ))
            }
            MessageCode::CentralHeatSetpoint => {
                let (d, checksum) = fit(data, &[2, 4])?;
                let mut rec = rec.with("setpoint_c", centi(&d[0..2]));
                if d.len() == 4 {
                    rec.insert("differential_c", centi(&d[2..4]));
                }
                Some(with_checksum(rec, checksum))
            }
            MessageCode::ZoneSetpoint | MessageCode::ZoneTemperature => zone_temperatures(rec, data),
            MessageCode::SystemMode => {
                let d = exact::<8>(data)?;
                Some(
                    rec.with("mode", text(lookup(&SYSTEM_MODES, d[0])))
                        .with("until", text(hex::encode_upper(&d[1..7])))
                        .with("until_type", int(d[7])),
                )
            }
            MessageCode::DhwDemand => {
                let (d, checksum) = fit(data, &[2])?;
                let rec = demand(rec, d[0])
                    .with("burner_on", FieldValue::Bool(d[1] & 0x01 != 0))
                    .with("gas", FieldValue::Bool(d[1] & 0x10 != 0));
                Some(with_checksum(rec, checksum))
            }
            MessageCode::SystemDemand | MessageCode::BoilerDemand => {
                let (d, checksum) = fit(data, &[4])?;
                let rec = demand(rec.with("stage1", int(d[0])), d[1])
                    .with("qualification", int(d[2]))
                    .with("stage1_echo", int(d[3]));
                Some(with_checksum(rec, checksum))
            }
            MessageCode::Alarm => {
                let (d, checksum) = fit(data, &[2])?;
                Some(with_checksum(
                    rec.with("alarm_code", int(d[0]))
                        .with("alarm_type", text(lookup(&ALARM_TYPES, d[0])))
                        .with("active", FieldValue::Bool(d[1] == 0x01)),
                    checksum,
                ))
            }
            MessageCode::HeatDemand => {
                let pairs: Vec<&[u8]> = records(data, 2)?.collect();
                let mut rec = rec
                    .with("zones", FieldValue::List(pairs.iter().map(|p| int(p[0])).collect()))
                    .with(
                        "percents",
                        FieldValue::List(
                            pairs
                                .iter()
                                .map(|p| FieldValue::Float(p[1] as f64 / 2.0))
                                .collect(),
                        ),
                    );
                if let [single] = pairs.as_slice() {
                    rec.insert("percent", FieldValue::Float(single[1] as f64 / 2.0));
                }
                Some(rec)
            }
            MessageCode::BoilerTemperature => {
                let (d, checksum) = fit(data, &[4])?;
                Some(with_checksum(
                    rec.with("supply_c", signed_centi(&d[0..2]))
                        .with("return_c", signed_centi(&d[2..4])),
                    checksum,
                ))
            }
            MessageCode::ActuatorSync => {
                let [domain, state] = exact::<2>(data)?;
                Some(
                    rec.with("domain", int(domain))
                        .with("active", FieldValue::Bool(state == 0xC8)),
                )
            }
            MessageCode::DeviceStatus => {
                let (d, checksum) = fit(data, &[8])?;
                Some(with_checksum(
                    rec.with("instantaneous_state", text(lookup(&INSTANTANEOUS_STATES, d[0])))
                        .with("field", int(d[1]))
                        .with("sequence_state", text(lookup(&SEQUENCE_STATES, d[2])))
                        .with("flame_current_na", int(u16::from_be_bytes([d[6], d[7]]))),
                    checksum,
                ))
            }
            MessageCode::ActuatorState => {
                // 6 and 9 byte forms extend the first three
                if ![3, 6, 9].contains(&data.len()) {
                    return None;
                }
                let modulation = match data[1] {
                    0xFF => None,
                    m => Some(m as f64 / 2.0),
                };
                Some(
                    rec.with("percent", FieldValue::optional(modulation))
                        .with("flame_on", FieldValue::Bool(data[2] & 0x10 != 0)),
                )
            }
        }
    }
}

/// Decode one payload; None means the code is not known
///
/// Never fails: malformed hex yields a `decode_error` record and a payload
/// that fits no layout yields a `decode_warning` record, both carrying the
/// payload verbatim.
pub fn decode(code: &str, payload_hex: &str) -> Option<DecodedRecord> {
    let code = MessageCode::from_code(code)?;
    let payload_hex = payload_hex.trim();

    let data = match hex::decode(payload_hex) {
        Ok(data) => data,
        Err(_) => {
            return Some(
                DecodedRecord::new(code.meaning())
                    .with("decode_error", text("invalid hex payload".to_string()))
                    .with("payload_bytes", text(payload_hex.to_string())),
            )
        }
    };

    Some(code.decode_bytes(&data).unwrap_or_else(|| {
        DecodedRecord::new(code.meaning())
            .with(
                "decode_warning",
                text(format!("unexpected payload length ({} bytes)", data.len())),
            )
            .with("payload_bytes", text(hex::encode_upper(&data)))
    }))
}

/// Unpack 6-bit characters (offset by 32) from a big-endian bit string
pub fn six_bit_ascii(bytes: &[u8]) -> String {
    let bits = bytes.len() * 8;
    (0..bits / 6)
        .map(|group| {
            let value = (0..6).fold(0u8, |acc, k| {
                let bit = group * 6 + k;
                let set = bytes[bit / 8] >> (7 - bit % 8) & 1;
                (acc << 1) | set
            });
            (value + 32) as char
        })
        .collect()
}

fn decode_os_number(rec: DecodedRecord, data: &[u8]) -> Option<DecodedRecord> {
    if let Some((d, checksum)) = fit(data, &[8]) {
        if d[0] == 0 && d[1] == 0 {
            return Some(with_checksum(
                rec.with("os_number", text(six_bit_ascii(&d[2..8]))),
                checksum,
            ));
        }
    }

    let printable: String = data
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|&b| b as char)
        .collect();
    let printable = printable.trim();
    if printable.is_empty() {
        return None;
    }
    Some(rec.with("os_number", text(printable.to_string())))
}

fn zone_temperatures(rec: DecodedRecord, data: &[u8]) -> Option<DecodedRecord> {
    let zones: Vec<&[u8]> = records(data, 3)?.collect();
    let values: Vec<FieldValue> = zones.iter().map(|z| signed_centi(&z[1..3])).collect();
    let mut rec = rec.with("zones", FieldValue::List(zones.iter().map(|z| int(z[0])).collect()));
    if let [single] = values.as_slice() {
        rec.insert("value_c", single.clone());
    }
    Some(rec.with("values_c", FieldValue::List(values)))
}

/// Demand byte: 0..200 in half percent, `0xFC` forces the appliance off
fn demand(rec: DecodedRecord, byte: u8) -> DecodedRecord {
    match byte {
        FORCE_OFF => rec
            .with("percent", FieldValue::Null)
            .with("force_off", FieldValue::Bool(true)),
        0..=200 => rec
            .with("percent", FieldValue::Float(byte as f64 / 2.0))
            .with("force_off", FieldValue::Bool(false)),
        other => rec
            .with("percent", FieldValue::Null)
            .with("demand_raw", int(other)),
    }
}

/// Payload in one of `lengths`, or one of them plus a trailing checksum byte
fn fit<'a>(data: &'a [u8], lengths: &[usize]) -> Option<(&'a [u8], Option<u8>)> {
    if lengths.contains(&data.len()) {
        return Some((data, None));
    }
    let (last, body) = data.split_last()?;
    if lengths.contains(&body.len()) {
        Some((body, Some(*last)))
    } else {
        None
    }
}

fn exact<const N: usize>(data: &[u8]) -> Option<[u8; N]> {
    data.try_into().ok()
}

/// Non-empty run of fixed-width records
fn records(data: &[u8], width: usize) -> Option<std::slice::Chunks<'_, u8>> {
    if data.is_empty() || data.len() % width != 0 {
        None
    } else {
        Some(data.chunks(width))
    }
}

fn with_checksum(rec: DecodedRecord, checksum: Option<u8>) -> DecodedRecord {
    match checksum {
        Some(c) => rec.with("checksum_ignored", text(format!("0x{:02X}", c))),
        None => rec,
    }
}

fn centi(b: &[u8]) -> FieldValue {
    FieldValue::Float(u16::from_be_bytes([b[0], b[1]]) as f64 / 100.0)
}

fn signed_centi(b: &[u8]) -> FieldValue {
    match i16::from_be_bytes([b[0], b[1]]) {
        SENTINEL => FieldValue::Null,
        raw => FieldValue::Float(raw as f64 / 100.0),
    }
}

fn device_id(b: &[u8]) -> String {
    let class = b[0] >> 2;
    let id = ((b[0] as u32 & 0x03) << 16) | ((b[1] as u32) << 8) | b[2] as u32;
    format!("{:02}:{:06}", class, id)
}

fn int<T: Into<i64>>(v: T) -> FieldValue {
    FieldValue::Int(v.into())
}

fn text(s: String) -> FieldValue {
    FieldValue::Text(s)
}
