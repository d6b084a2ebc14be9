/// Per-frame pipeline: log, mirror, decode, limit, forward
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;

use crate::control::SetpointLimiter;
use crate::models::{DecodedRecord, FieldValue};
use crate::ramses::{decode, Frame, FrameAssembler};
use crate::transport::mqtt::{DECODED_TOPIC_PREFIX, RAW_TOPIC};
use crate::transport::{Publisher, SerialLink};

const READ_CHUNK: usize = 256;
const ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

pub struct FrameProcessor<P: Publisher> {
    /// None in observe mode
    limiter: Option<SetpointLimiter>,
    publisher: P,
}

impl<P: Publisher> FrameProcessor<P> {
    pub fn new(limiter: Option<SetpointLimiter>, publisher: P) -> Self {
        FrameProcessor { limiter, publisher }
    }

    /// Handle one frame text and return the bytes to forward downstream
    ///
    /// Frames that fail to parse are forwarded as received.
    pub fn handle(&mut self, text: &str, now: OffsetDateTime) -> Vec<u8> {
        info!("RF RAW: {}", text);
        self.publish(RAW_TOPIC, text.as_bytes().to_vec());

        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("RF unparsed ({}) | raw='{}'", e, text);
                return FrameAssembler::format_for_write(text);
            }
        };

        debug!(
            "RF {} {} from {} to {}{} (rssi {})",
            frame.verb.as_str(),
            frame.code,
            frame.src,
            frame.dst,
            if frame.via.is_null() { String::new() } else { format!(" via {}", frame.via) },
            frame.rssi
        );

        if let Some((declared, actual)) = frame.length_mismatch() {
            warn!(
                "RF {} | length field says {} bytes, payload has {} | raw='{}'",
                frame.code, declared, actual, frame.text
            );
        }

        match decode(&frame.code, &frame.payload) {
            Some(record) => {
                log_record(&frame, &record);
                match serde_json::to_vec(&record) {
                    Ok(json) => self.publish(&format!("{}/{}", DECODED_TOPIC_PREFIX, frame.code), json),
                    Err(e) => debug!("Failed to serialize decoded {}: {}", frame.code, e),
                }
            }
            None => debug!("RF {} | undecoded | raw='{}'", frame.code, frame.text),
        }

        let frame = match self.limiter.as_mut() {
            Some(limiter) => limiter.process(frame, now),
            None => frame,
        };

        frame.wire_bytes()
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) {
        if let Err(e) = self.publisher.publish(topic, payload) {
            debug!("Publish to {} failed: {}", topic, e);
        }
    }
}

fn log_record(frame: &Frame, record: &DecodedRecord) {
    if record.is_diagnostic() {
        let problem = record
            .get("decode_error")
            .or_else(|| record.get("decode_warning"))
            .unwrap_or(&FieldValue::Null);
        warn!(
            "RF {} | {} | {} | raw='{}'",
            frame.code, record.meaning, problem, frame.text
        );
    } else if let Some(value) = record.get("value_c") {
        match value {
            FieldValue::Float(v) => info!(
                "RF {} | {} = {:.1} °C | raw='{}'",
                frame.code, record.meaning, v, frame.text
            ),
            other => info!(
                "RF {} | {} = {} | raw='{}'",
                frame.code, record.meaning, other, frame.text
            ),
        }
    } else if let Some(percent) = record.get("percent").and_then(FieldValue::as_f64) {
        info!(
            "RF {} | {} = {:.1} % | raw='{}'",
            frame.code, record.meaning, percent, frame.text
        );
    } else if let Some(values) = record.get("values_c") {
        info!(
            "RF {} | {} {} | raw='{}'",
            frame.code, record.meaning, values, frame.text
        );
    } else {
        info!("RF {} | {} | raw='{}'", frame.code, record.meaning, frame.text);
    }
}

/// Read, frame, handle and forward until `running` is cleared
///
/// Serial errors are logged and retried; nothing here ends the loop.
pub fn run_bridge<S, P>(serial: &mut S, processor: &mut FrameProcessor<P>, running: &AtomicBool)
where
    S: SerialLink,
    P: Publisher,
{
    let mut assembler = FrameAssembler::new();

    while running.load(Ordering::Relaxed) {
        let chunk = match serial.read(READ_CHUNK) {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("Serial read failed: {}", e);
                std::thread::sleep(ERROR_BACKOFF);
                continue;
            }
        };
        if chunk.is_empty() {
            continue;
        }

        for text in assembler.feed(&chunk) {
            let out = processor.handle(&text, OffsetDateTime::now_utc());
            if let Err(e) = serial.write(&out) {
                error!("Serial write failed: {}", e);
            }
        }
    }

    info!("Bridge loop stopped ({} bytes unframed)", assembler.buffered());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{AdaptiveCeiling, AdaptiveConfig, LimiterConfig, OutdoorContext};
    use crate::control::context::DEFAULT_MAX_AGE;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;
    use time::Duration;

    const SETPOINT: &str = "045  I --- 01:145038 --:------ 01:145038 1F09 003 FF0320";
    const OUTDOOR: &str = "052  I --- 02:001107 --:------ 02:001107 1290 002 07D0";

    #[derive(Default)]
    struct Recorder {
        messages: RefCell<Vec<(String, Vec<u8>)>>,
    }

    impl Publisher for Recorder {
        fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String> {
            self.messages.borrow_mut().push((topic.to_string(), payload));
            Ok(())
        }
    }

    struct Offline;

    impl Publisher for Offline {
        fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), String> {
            Err("not connected".to_string())
        }
    }

    struct ScriptedSerial<'a> {
        chunks: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        running: &'a AtomicBool,
    }

    impl SerialLink for ScriptedSerial<'_> {
        fn read(&mut self, _max_bytes: usize) -> io::Result<Vec<u8>> {
            match self.chunks.pop_front() {
                Some(chunk) => chunk,
                None => {
                    self.running.store(false, Ordering::Relaxed);
                    Ok(Vec::new())
                }
            }
        }

        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    fn limiter(base_max: f64) -> SetpointLimiter {
        SetpointLimiter::new(
            LimiterConfig {
                base_max,
                ramp_step: 1.0,
                ramp_interval: Duration::seconds(60),
                outdoor_max_age: DEFAULT_MAX_AGE,
            },
            AdaptiveCeiling::new(AdaptiveConfig {
                enabled: false,
                curve: Vec::new(),
                min: 0.0,
                max: 100.0,
            }),
            Arc::new(OutdoorContext::new()),
        )
    }

    #[test]
    fn observe_mode_forwards_unchanged_and_mirrors() {
        let mut processor = FrameProcessor::new(None, Recorder::default());
        let out = processor.handle(OUTDOOR, at(0));
        assert_eq!(out, format!("{}\r\n", OUTDOOR).into_bytes());

        let messages = processor.publisher.messages.borrow();
        assert_eq!(messages[0], (RAW_TOPIC.to_string(), OUTDOOR.as_bytes().to_vec()));
        assert_eq!(messages[1].0, "evohome/mitm/decoded/1290");
        assert_eq!(
            String::from_utf8_lossy(&messages[1].1),
            r#"{"meaning":"Outdoor temperature","value_c":20.0}"#
        );
    }

    #[test]
    fn limit_mode_rewrites_ch_setpoint() {
        // 0x0320 = 80.0 °C requested, capped at 60.0 (0x0258)
        let mut processor = FrameProcessor::new(Some(limiter(60.0)), Recorder::default());
        let out = processor.handle(SETPOINT, at(0));
        assert_eq!(
            out,
            b"045  I --- 01:145038 --:------ 01:145038 1F09 003 FF0258\r\n".to_vec()
        );

        // Other codes are never touched
        assert_eq!(processor.handle(OUTDOOR, at(1)), format!("{}\r\n", OUTDOOR).into_bytes());
    }

    #[test]
    fn unparsable_frames_are_forwarded_verbatim() {
        let mut processor = FrameProcessor::new(Some(limiter(60.0)), Recorder::default());
        let text = "045  I --- 01:145038 --:------ 1F09 003 FF0320";
        assert_eq!(processor.handle(text, at(0)), format!("{}\r\n", text).into_bytes());
        assert_eq!(processor.publisher.messages.borrow().len(), 1);
    }

    #[test]
    fn publish_failures_do_not_stop_forwarding() {
        let mut processor = FrameProcessor::new(Some(limiter(60.0)), Offline);
        let out = processor.handle(SETPOINT, at(0));
        assert!(out.ends_with(b"FF0258\r\n"));
    }

    #[test]
    fn bridge_forwards_every_frame_across_chunks() {
        let running = AtomicBool::new(true);
        let stream = format!("{}\r\n{}\r\n", OUTDOOR, SETPOINT).into_bytes();
        let (first, second) = stream.split_at(30);
        let mut serial = ScriptedSerial {
            chunks: VecDeque::from([
                Ok(first.to_vec()),
                Ok(Vec::new()),
                Err(io::Error::new(io::ErrorKind::Other, "glitch")),
                Ok(second.to_vec()),
            ]),
            written: Vec::new(),
            running: &running,
        };
        let mut processor = FrameProcessor::new(None, Recorder::default());

        run_bridge(&mut serial, &mut processor, &running);

        assert_eq!(serial.written, stream);
        assert!(!running.load(Ordering::Relaxed));
    }
}
