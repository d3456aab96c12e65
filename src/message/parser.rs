//! Record classification and positional field extraction.
use std::str::FromStr;

use super::types::*;
use super::{ParseError, Result};

pub const DEBUG_HEADER: &str = "Debug Message";
pub const STATUS_HEADER: &str = "Status Message";
pub const ERROR_HEADER: &str = "Error Message";
pub const COMMAND_HEADER: &str = "Command Data Message";
pub const ANALOG_HEADER: &str = "?A";
pub const DIGITAL_HEADER: &str = "?D";
pub const PWM_HEADER: &str = "?P";
pub const DIGITAL_OUTPUT_HEADER: &str = "Digital Output";
pub const V1_ANALOG_HEADER: &str = "Analog Input";
pub const V1_DIGITAL_HEADER: &str = "Digital Input";

pub const NETWORK_ERROR_FLAG: &str = "[NETWORK]";
pub const MESSAGE_TAG: &str = "Message: ";
pub const VALUE_TAG: &str = "Value: ";
pub const HIGH_MARKER: &str = "H";

/// Classify one record.
///
/// Text headers are tested before data tags because their bodies may quote
/// data tags.
pub fn classify(record: &str) -> Result<RawMessage> {
    if record.contains(DEBUG_HEADER) {
        return Ok(RawMessage::Debug(text_message(record)));
    }
    if record.contains(STATUS_HEADER) {
        return Ok(RawMessage::Status(text_message(record)));
    }
    if record.contains(ERROR_HEADER) {
        return Ok(RawMessage::Error {
            message: text_message(record),
            network: record.contains(NETWORK_ERROR_FLAG),
        });
    }
    if record.contains(COMMAND_HEADER) {
        return Ok(RawMessage::CommandEcho(text_message(record)));
    }
    if record.contains(ANALOG_HEADER) {
        return parse_analog(record).map(RawMessage::AnalogData);
    }
    if record.contains(V1_ANALOG_HEADER) {
        return Err(ParseError::DeprecatedFirmware("analog input"));
    }
    if record.contains(DIGITAL_HEADER) {
        return parse_digital(record).map(RawMessage::DigitalData);
    }
    if record.contains(V1_DIGITAL_HEADER) {
        return Err(ParseError::DeprecatedFirmware("digital input"));
    }
    if record.contains(DIGITAL_OUTPUT_HEADER) {
        return parse_digital_output(record).map(RawMessage::DigitalOutputData);
    }
    if record.contains(PWM_HEADER) {
        return parse_pwm(record).map(RawMessage::PwmData);
    }
    Err(ParseError::Unrecognized)
}

/// Classify, logging and discarding records that cannot be parsed.
pub fn classify_or_drop(record: &str) -> Option<RawMessage> {
    match classify(record) {
        Ok(message) => Some(message),
        Err(e) => {
            log::warn!("Dropping inbound record ({}): {:?}", e, record);
            None
        }
    }
}

fn text_message(record: &str) -> TextMessage {
    let body = match record.find(MESSAGE_TAG) {
        Some(pos) => {
            let rest = &record[pos + MESSAGE_TAG.len()..];
            let line = rest.split('\n').next().unwrap_or(rest);
            line.trim_end_matches('\r').to_string()
        }
        None => record.trim().to_string(),
    };
    TextMessage { body, raw: record.to_string() }
}

fn parse_field<T: FromStr>(field: &'static str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| ParseError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

fn parse_timestamp(raw: &str) -> Result<u64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    parse_field("timestamp", &compact)
}

/// Locate `header`, parse the channel number up to the line break and return
/// the text after it.
fn channel_line<'a>(record: &'a str, header: &str) -> Result<(u8, &'a str)> {
    let start = record.find(header).ok_or(ParseError::MissingField("header"))? + header.len();
    let (channel, rest) = record[start..]
        .split_once('\n')
        .ok_or(ParseError::MissingField("channel"))?;
    Ok((parse_field("channel", channel)?, rest))
}

// ?A<channel>\r\n<timestamp>,<reading>
fn parse_analog(record: &str) -> Result<AnalogReading> {
    let (channel, rest) = channel_line(record, ANALOG_HEADER)?;
    let (timestamp, reading) = rest.split_once(',').ok_or(ParseError::MissingField("reading"))?;
    Ok(AnalogReading {
        channel,
        timestamp: parse_timestamp(timestamp)?,
        reading: parse_field("reading", reading)?,
    })
}

// ?D<channel>\r\n<timestamp>,<H|L>
fn parse_digital(record: &str) -> Result<DigitalReading> {
    let (channel, rest) = channel_line(record, DIGITAL_HEADER)?;
    let (timestamp, state) = rest.split_once(',').ok_or(ParseError::MissingField("state"))?;
    Ok(DigitalReading {
        channel,
        timestamp: parse_timestamp(timestamp)?,
        high: state.contains(HIGH_MARKER),
    })
}

// ?P<channel>\r\n<transitions>,<percentage>\n<timestamp>
fn parse_pwm(record: &str) -> Result<PwmReading> {
    let (channel, rest) = channel_line(record, PWM_HEADER)?;
    let (transitions, rest) = rest.split_once(',').ok_or(ParseError::MissingField("percentage"))?;
    let (percentage, timestamp) = rest.split_once('\n').ok_or(ParseError::MissingField("timestamp"))?;
    Ok(PwmReading {
        channel,
        timestamp: parse_timestamp(timestamp)?,
        transitions: parse_field("transitions", transitions)?,
        percentage: parse_field("percentage", percentage)?,
    })
}

fn parse_digital_output(record: &str) -> Result<DigitalOutputState> {
    let header = record
        .find(DIGITAL_OUTPUT_HEADER)
        .ok_or(ParseError::MissingField("header"))?;
    let start = record[header..]
        .find(VALUE_TAG)
        .ok_or(ParseError::MissingField("value"))?
        + header
        + VALUE_TAG.len();
    let rest = &record[start..];
    let mask = rest.split('\n').next().unwrap_or(rest).trim();
    Ok(DigitalOutputState { outputs: decode_output_mask(mask)? })
}

/// Decode a hex mask into output states, first entry = most significant bit.
pub fn decode_output_mask(mask: &str) -> Result<[bool; DIGITAL_OUTPUT_STATES]> {
    let width = DIGITAL_OUTPUT_STATES / 4;
    if mask.is_empty() || mask.len() > width {
        return Err(ParseError::InvalidHex(mask.to_string()));
    }
    let padded = format!("{:0>width$}", mask, width = width);
    let bytes = hex::decode(&padded).map_err(|_| ParseError::InvalidHex(mask.to_string()))?;

    let mut outputs = [false; DIGITAL_OUTPUT_STATES];
    for (i, out) in outputs.iter_mut().enumerate() {
        *out = bytes[i / 8] & (0x80 >> (i % 8)) != 0;
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analog_record() {
        let msg = classify("?A0\r\n967711311300,-512").unwrap();
        assert_eq!(
            msg,
            RawMessage::AnalogData(AnalogReading { channel: 0, timestamp: 967711311300, reading: -512 })
        );
        assert_eq!(msg.channel(), Some(0));
    }

    #[test]
    fn test_parse_digital_record() {
        let high = classify("?D7\r\n1200,H").unwrap();
        assert_eq!(high, RawMessage::DigitalData(DigitalReading { channel: 7, timestamp: 1200, high: true }));
        let low = classify("?D7\r\n1201,L").unwrap();
        assert!(matches!(low, RawMessage::DigitalData(DigitalReading { high: false, .. })));
    }

    #[test]
    fn test_parse_pwm_record() {
        let msg = classify("?P3\r\n42,37.5\n 1000 200").unwrap();
        assert_eq!(
            msg,
            RawMessage::PwmData(PwmReading { channel: 3, timestamp: 1000200, transitions: 42, percentage: 37.5 })
        );
    }

    #[test]
    fn test_parse_digital_output_record() {
        let msg = classify("Digital Output\r\nValue: 8001\r\n").unwrap();
        match msg {
            RawMessage::DigitalOutputData(state) => {
                assert!(state.outputs[0]);
                assert!(state.outputs[15]);
                assert_eq!(state.outputs.iter().filter(|o| **o).count(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_wins_over_data_tags() {
        let msg = classify("Status Message\r\nMessage: read ?A3 complete\r\n").unwrap();
        assert_eq!(msg.kind(), MessageKind::Status);
        assert_eq!(msg.text().unwrap().body, "read ?A3 complete");
    }

    #[test]
    fn test_error_network_flag() {
        let msg = classify("Error Message\r\nMessage: [NETWORK] link lost\r\n").unwrap();
        assert!(matches!(msg, RawMessage::Error { network: true, .. }));
        let plain = classify("Error Message\r\nMessage: bad parameter\r\n").unwrap();
        assert!(matches!(plain, RawMessage::Error { network: false, .. }));
    }

    #[test]
    fn test_text_without_message_tag() {
        let msg = classify("  Debug Message heap ok \r\n").unwrap();
        assert_eq!(msg.text().unwrap().body, "Debug Message heap ok");
    }

    #[test]
    fn test_v1_records_are_rejected() {
        assert!(matches!(classify("Analog Input 3"), Err(ParseError::DeprecatedFirmware(_))));
        assert!(matches!(classify("Digital Input 3"), Err(ParseError::DeprecatedFirmware(_))));
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(classify("RANDOMDATA"), Err(ParseError::Unrecognized)));
        assert!(matches!(classify("?A0\r\n96771,abc"), Err(ParseError::InvalidNumber { field: "reading", .. })));
        assert!(matches!(classify("?A0"), Err(ParseError::MissingField("channel"))));
        assert!(classify_or_drop("?Ax\r\n1,1").is_none());
        assert!(matches!(classify("Digital Output\nValue: ZZ\n"), Err(ParseError::InvalidHex(_))));
    }

    #[test]
    fn test_decode_short_mask() {
        let outputs = decode_output_mask("1").unwrap();
        assert!(outputs[15]);
        assert_eq!(outputs.iter().filter(|o| **o).count(), 1);
        assert!(decode_output_mask("12345").is_err());
    }
}
