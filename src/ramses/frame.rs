/// Structural parsing of one RF frame text
use std::fmt;
use thiserror::Error;

use crate::ramses::assembler::{FrameAssembler, LINE_TERMINATOR};
use crate::utils::is_hex;

/// Message code of the CH setpoint requests the limiter rewrites
pub const CH_SETPOINT_CODE: &str = "1F09";

/// Keeps a product landing a hair under a whole step on that step
const STEP_EPSILON: f64 = 1e-6;

const NULL_ADDRESS: &str = "--:------";
const MARKER: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("expected 9 tokens, found {0}")]
    TokenCount(usize),
    #[error("bad RSSI field '{0}'")]
    Rssi(String),
    #[error("unknown verb '{0}'")]
    Verb(String),
    #[error("missing '---' marker, found '{0}'")]
    Marker(String),
    #[error("bad address '{0}'")]
    Address(String),
    #[error("bad message code '{0}'")]
    Code(String),
    #[error("bad length field '{0}'")]
    Length(String),
    #[error("bad payload '{0}'")]
    Payload(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Request,
    Reply,
    Info,
    Write,
}

impl Verb {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "RQ" => Some(Verb::Request),
            "RP" => Some(Verb::Reply),
            "I" => Some(Verb::Info),
            "W" => Some(Verb::Write),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Request => "RQ",
            Verb::Reply => "RP",
            Verb::Info => "I",
            Verb::Write => "W",
        }
    }
}

/// Device address `class:id`, or the null address `--:------`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Device { class: u8, id: u32 },
    Null,
}

impl Address {
    fn parse(token: &str) -> Option<Self> {
        if token == NULL_ADDRESS {
            return Some(Address::Null);
        }
        let (class, id) = token.split_once(':')?;
        if class.len() != 2 || id.len() != 6 {
            return None;
        }
        if !class.bytes().chain(id.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Address::Device {
            class: class.parse().ok()?,
            id: id.parse().ok()?,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Address::Null)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Device { class, id } => write!(f, "{:02}:{:06}", class, id),
            Address::Null => f.write_str(NULL_ADDRESS),
        }
    }
}

/// One parsed frame: `RSSI VERB --- SRC DST VIA CODE LEN PAYLOAD`
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub raw: Vec<u8>,
    pub text: String,
    pub rssi: u16,
    pub verb: Verb,
    pub src: Address,
    pub dst: Address,
    pub via: Address,
    pub code: String,
    pub declared_len: usize,
    pub payload: String,
    /// Byte offset of the payload token inside `text`
    payload_at: usize,
}

impl Frame {
    /// Structural match only; nothing here interprets the payload
    pub fn parse(text: &str) -> Result<Frame, FrameError> {
        let text = text.trim();
        let tokens: Vec<(usize, &str)> = token_offsets(text);
        if tokens.len() != 9 {
            return Err(FrameError::TokenCount(tokens.len()));
        }
        let tok = |i: usize| tokens[i].1;

        let rssi = tok(0);
        if rssi.len() != 3 || !rssi.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FrameError::Rssi(rssi.to_string()));
        }
        let verb = Verb::parse(tok(1)).ok_or_else(|| FrameError::Verb(tok(1).to_string()))?;
        if tok(2) != MARKER {
            return Err(FrameError::Marker(tok(2).to_string()));
        }
        let address = |s: &str| Address::parse(s).ok_or_else(|| FrameError::Address(s.to_string()));
        let src = address(tok(3))?;
        let dst = address(tok(4))?;
        let via = address(tok(5))?;

        let code = tok(6);
        if code.len() != 4 || !is_hex(code) {
            return Err(FrameError::Code(code.to_string()));
        }
        let len = tok(7);
        if len.len() != 3 || !is_hex(len) {
            return Err(FrameError::Length(len.to_string()));
        }
        let declared_len =
            usize::from_str_radix(len, 16).map_err(|_| FrameError::Length(len.to_string()))?;

        let payload = tok(8);
        if payload.len() % 2 != 0 || !is_hex(payload) {
            return Err(FrameError::Payload(payload.to_string()));
        }

        Ok(Frame {
            raw: text.as_bytes().to_vec(),
            text: text.to_string(),
            rssi: rssi.parse().map_err(|_| FrameError::Rssi(rssi.to_string()))?,
            verb,
            src,
            dst,
            via,
            code: code.to_ascii_uppercase(),
            declared_len,
            payload: payload.to_ascii_uppercase(),
            payload_at: tokens[8].0,
        })
    }

    pub fn is_ch_setpoint(&self) -> bool {
        self.code == CH_SETPOINT_CODE
    }

    /// Bytes to forward: the raw form when it is already terminated
    pub fn wire_bytes(&self) -> Vec<u8> {
        if self.raw.ends_with(b"\n") {
            self.raw.clone()
        } else {
            FrameAssembler::format_for_write(&self.text)
        }
    }

    pub fn payload_bytes(&self) -> Option<Vec<u8>> {
        hex::decode(&self.payload).ok()
    }

    /// `(declared, actual)` byte counts when the LEN field disagrees with the payload
    pub fn length_mismatch(&self) -> Option<(usize, usize)> {
        let actual = self.payload.len() / 2;
        if actual != self.declared_len {
            Some((self.declared_len, actual))
        } else {
            None
        }
    }

    /// CH setpoint carried in the trailing payload bytes
    ///
    /// Two or more bytes: last two big-endian in 0.1°C. One byte: 0.5°C.
    pub fn get_ch_value(&self) -> Option<f64> {
        ch_value(&self.payload_bytes()?)
    }

    /// New frame with the trailing CH setpoint replaced by `value_c`
    ///
    /// Uses the width `get_ch_value` would read and rounds down to the
    /// field step, so the result never exceeds `value_c`. Every other token is kept
    /// as received; the new raw bytes carry the line terminator. When the
    /// payload holds no setpoint an unchanged copy is returned.
    pub fn with_new_ch(&self, value_c: f64) -> Frame {
        let mut payload = match self.payload_bytes() {
            Some(p) if !p.is_empty() => p,
            _ => return self.clone(),
        };

        let n = payload.len();
        if n >= 2 {
            let raw = encode_step(value_c, 10.0, u16::MAX as f64) as u16;
            payload[n - 2..].copy_from_slice(&raw.to_be_bytes());
        } else {
            payload[0] = encode_step(value_c, 2.0, u8::MAX as f64) as u8;
        }

        let payload = hex::encode_upper(&payload);
        let text = format!("{}{}", &self.text[..self.payload_at], payload);
        let mut raw = text.as_bytes().to_vec();
        raw.extend_from_slice(LINE_TERMINATOR.as_bytes());

        Frame {
            raw,
            text,
            payload,
            ..self.clone()
        }
    }
}

/// Shared by the frame accessor and the 1F09 decode rule
pub fn ch_value(payload: &[u8]) -> Option<f64> {
    match payload {
        [] => None,
        [half_degrees] => Some(*half_degrees as f64 / 2.0),
        [.., hi, lo] => Some(u16::from_be_bytes([*hi, *lo]) as f64 / 10.0),
    }
}

fn encode_step(value_c: f64, steps_per_degree: f64, max: f64) -> f64 {
    (value_c * steps_per_degree + STEP_EPSILON).floor().clamp(0.0, max)
}

fn token_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push((s, &text[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, &text[s..]));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYNC: &str = "045  I --- 01:145038 --:------ 01:145038 1F09 003 FF0546";

    #[test]
    fn parses_all_fields() {
        let frame = Frame::parse(SYNC).unwrap();
        assert_eq!(frame.rssi, 45);
        assert_eq!(frame.verb, Verb::Info);
        assert_eq!(frame.src, Address::Device { class: 1, id: 145038 });
        assert!(frame.dst.is_null());
        assert_eq!(frame.via.to_string(), "01:145038");
        assert_eq!(frame.code, "1F09");
        assert_eq!(frame.declared_len, 3);
        assert_eq!(frame.payload, "FF0546");
        assert!(frame.is_ch_setpoint());
        assert_eq!(frame.length_mismatch(), None);
    }

    #[test]
    fn rejects_structural_garbage() {
        assert_eq!(Frame::parse("hello world"), Err(FrameError::TokenCount(2)));
        assert!(matches!(
            Frame::parse("045 XX --- 01:145038 --:------ 01:145038 1F09 003 FF0546"),
            Err(FrameError::Verb(_))
        ));
        assert!(matches!(
            Frame::parse("045 I --- 1:145038 --:------ 01:145038 1F09 003 FF0546"),
            Err(FrameError::Address(_))
        ));
        assert!(matches!(
            Frame::parse("045 I --- 01:145038 --:------ 01:145038 1F09 003 FF054"),
            Err(FrameError::Payload(_))
        ));
        assert!(matches!(
            Frame::parse("045 I --- 01:145038 --:------ 01:145038 1G09 003 FF0546"),
            Err(FrameError::Code(_))
        ));
    }

    #[test]
    fn reports_declared_length_mismatch() {
        let frame =
            Frame::parse("045  I --- 01:145038 --:------ 01:145038 1F09 005 FF0546").unwrap();
        assert_eq!(frame.length_mismatch(), Some((5, 3)));
    }

    #[test]
    fn reads_two_byte_tenths() {
        let frame = Frame::parse(SYNC).unwrap();
        assert_eq!(frame.get_ch_value(), Some(135.0));
    }

    #[test]
    fn reads_single_byte_halves() {
        let frame =
            Frame::parse("045 RQ --- 01:145038 10:067219 --:------ 1F09 001 79").unwrap();
        assert_eq!(frame.get_ch_value(), Some(60.5));
    }

    #[test]
    fn rewrites_only_the_payload_tail() {
        let frame = Frame::parse(SYNC).unwrap();
        let limited = frame.with_new_ch(55.0);

        assert_eq!(
            limited.text,
            "045  I --- 01:145038 --:------ 01:145038 1F09 003 FF0226"
        );
        assert_eq!(limited.raw, format!("{}\r\n", limited.text).into_bytes());
        assert_eq!(limited.get_ch_value(), Some(55.0));
        assert_eq!(limited.declared_len, 3);
        // Source frame is left as parsed
        assert_eq!(frame.payload, "FF0546");
    }

    #[test]
    fn rewrites_single_byte_in_half_degrees() {
        let frame =
            Frame::parse("045 RQ --- 01:145038 10:067219 --:------ 1F09 001 79").unwrap();
        let limited = frame.with_new_ch(45.5);
        assert_eq!(limited.payload, "5B");
        assert_eq!(limited.get_ch_value(), Some(45.5));
    }

    #[test]
    fn exact_tenths_survive_float_noise() {
        let frame = Frame::parse(SYNC).unwrap();
        assert_eq!(frame.with_new_ch(30.7).get_ch_value(), Some(30.7));
        assert_eq!(frame.with_new_ch(0.3).get_ch_value(), Some(0.3));
        // Sum of a held value and a ramp step, just under 322 tenths
        assert_eq!(frame.with_new_ch(30.4 + 1.8).get_ch_value(), Some(32.2));
    }

    #[test]
    fn encoding_rounds_down_to_the_field_step() {
        let frame = Frame::parse(SYNC).unwrap();
        assert_eq!(frame.with_new_ch(59.47).get_ch_value(), Some(59.4));
        assert_eq!(frame.with_new_ch(59.49999).get_ch_value(), Some(59.4));

        let single =
            Frame::parse("045 RQ --- 01:145038 10:067219 --:------ 1F09 001 79").unwrap();
        assert_eq!(single.with_new_ch(55.3).get_ch_value(), Some(55.0));
        assert_eq!(single.with_new_ch(55.99).get_ch_value(), Some(55.5));
    }

    #[test]
    fn encoding_saturates_to_the_field_width() {
        let frame = Frame::parse(SYNC).unwrap();
        assert_eq!(frame.with_new_ch(-4.0).payload, "FF0000");
        assert_eq!(frame.with_new_ch(1.0e6).payload, "FFFFFF");
    }

    #[test]
    fn ch_value_absent_for_empty_payload() {
        assert_eq!(ch_value(&[]), None);
    }
}
