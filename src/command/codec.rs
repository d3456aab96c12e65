//! Textual command-line codec.
//!
//! Wire format, one command per line:
//! `<COMMAND_NAME> [--<PARAM_NAME>=<VALUE> ...]\r`
use std::fmt;
use serde::{Deserialize, Serialize};

use super::{CodecError, Result};

/// Separator between the command name and each parameter.
pub const GENERAL_DELIMITER: char = ' ';
/// Marks the start of a parameter token.
pub const PARAMETER_FLAG: &str = "--";
/// Separates a parameter name from its value.
pub const KEY_VALUE_SEPARATOR: char = '=';
/// Terminates every command line.
pub const COMMAND_EOF: u8 = b'\r';

/// Declares a closed wire enumeration whose variants map to a wire name and a
/// wire ordinal (declaration order).
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in wire-ordinal order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Name used on the wire.
            pub fn name(&self) -> &'static str {
                match self { $($name::$variant => $wire),+ }
            }

            /// Look up a variant by its wire name (case-sensitive).
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($wire => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Compact wire ordinal.
            pub fn ordinal(&self) -> u8 {
                *self as u8
            }

            pub fn from_ordinal(ordinal: u8) -> Option<Self> {
                Self::ALL.get(ordinal as usize).copied()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

wire_enum! {
    /// Board operations understood by the firmware command line.
    Opcode {
        Disconnect => "DISCONNECT",
        Upgrade => "UPGRADE",
        Identify => "IDENTIFY",
        Sample => "SAMPLE",
        Halt => "HALT",
        SetRtc => "SET_RTC",
        SetUserMac => "SET_USER_MAC",
        SetStaticIp => "SET_STATIC_IP",
        NoOp => "NONE",
        ListAnalogInputs => "LIST_ANALOG_INPUTS",
        ReadAdcRegisters => "READ_ADC_REGISTERS",
        ReadAnalogInput => "READ_ANALOG_INPUT",
        AddAnalogInput => "ADD_ANALOG_INPUT",
        RemoveAnalogInput => "REMOVE_ANALOG_INPUT",
        CheckAnalogInput => "CHECK_ANALOG_INPUT",
        SetAnalogInputScale => "SET_ANALOG_INPUT_SCALE",
        GetAnalogInputScale => "GET_ANALOG_INPUT_SCALE",
        ListDigitalInputs => "LIST_DIGITAL_INPUTS",
        ReadDigitalInput => "READ_DIGITAL_INPUT",
        AddDigitalInput => "ADD_DIGITAL_INPUT",
        RemoveDigitalInput => "REMOVE_DIGITAL_INPUT",
        ListDigitalOutputs => "LIST_DIGITAL_OUTPUTS",
        SetDigitalOutput => "SET_DIGITAL_OUTPUT",
        SetPwmOutput => "SET_PWM_OUTPUT",
        SetPwmOutputTimer => "SET_PWM_OUTPUT_TIMER",
        ReadDigitalOutput => "READ_DIGITAL_OUTPUT",
        AddDigitalOutput => "ADD_DIGITAL_OUTPUT",
        RemoveDigitalOutput => "REMOVE_DIGITAL_OUTPUT",
        ClearDigitalOutputFault => "CLEAR_DIGITAL_OUTPUT_FAULT",
        SystemGcal => "SYSTEM_GCAL",
        SystemCal => "SYSTEM_CAL",
        ReadSystemGcal => "READ_SYSTEM_GCAL",
        GetCalibrationStatus => "GET_CALIBRATION_STATUS",
        EnterCalibrationMode => "ENTER_CALIBRATION_MODE",
        WriteGainCalibrationValue => "WRITE_GAIN_CALIBRATION_VALUE",
        WriteCalibrationTemp => "WRITE_CALIBRATION_TEMP",
        WriteCalibrationValid => "WRITE_CALIBRATION_VALID",
        ExitCalibrationMode => "EXIT_CALIBRATION_MODE",
        SetBoardSerialNum => "SET_BOARD_SERIAL_NUM",
        SetFactoryMacAddr => "SET_FACTORY_MAC_ADDR",
        ReadSelfGcal => "READ_SELF_GCAL",
        AddPwmInput => "ADD_PWM_INPUT",
        RemovePwmInput => "REMOVE_PWM_INPUT",
        ReadPwmInput => "READ_PWM_INPUT",
        ListPwmInputs => "LIST_PWM_INPUTS",
    }
}

wire_enum! {
    /// Named command parameters.
    Param {
        Input => "INPUT",
        Rate => "RATE",
        Gain => "GAIN",
        Buffer => "BUFFER",
        Number => "NUMBER",
        Name => "NAME",
        Output => "OUTPUT",
        State => "STATE",
        Value => "VALUE",
        Scale => "SCALE",
        Temperature => "TEMPERATURE",
        Index => "INDEX",
        All => "ALL",
        DutyCycle => "DUTYCYCLE",
    }
}

/// Primitive parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Decode a wire value: integers first, then decimals (a `.` or an
    /// exponent marker), otherwise text.
    ///
    /// The wire carries no type tag, so text that reads as a number decodes
    /// as that number: `Text("5")` comes back as `Int(5)`.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return ParamValue::Int(i);
        }
        if raw.contains(['.', 'e', 'E']) {
            if let Ok(f) = raw.parse::<f64>() {
                return ParamValue::Float(f);
            }
        }
        ParamValue::Text(raw.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            // Debug always emits a "." or an exponent, so floats never read back as integers.
            ParamValue::Float(v) => write!(f, "{:?}", v),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

macro_rules! param_from_int {
    ($($t:ty),+) => { $(impl From<$t> for ParamValue { fn from(v: $t) -> Self { ParamValue::Int(v as i64) } })+ };
}
param_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for ParamValue { fn from(v: f32) -> Self { ParamValue::Float(v as f64) } }
impl From<f64> for ParamValue { fn from(v: f64) -> Self { ParamValue::Float(v) } }
impl From<&str> for ParamValue { fn from(v: &str) -> Self { ParamValue::Text(v.to_string()) } }
impl From<String> for ParamValue { fn from(v: String) -> Self { ParamValue::Text(v) } }

/// A single outbound instruction. Immutable once built; always encodes to the
/// same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    opcode: Opcode,
    params: Vec<(Param, ParamValue)>,
}

impl Command {
    pub fn new(opcode: Opcode) -> Self {
        Self { opcode, params: Vec::new() }
    }

    /// Append a parameter; parameters are encoded in the order they are added.
    pub fn with(mut self, param: Param, value: impl Into<ParamValue>) -> Self {
        self.params.push((param, value.into()));
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn params(&self) -> &[(Param, ParamValue)] {
        &self.params
    }

    pub fn param(&self, param: Param) -> Option<&ParamValue> {
        self.params.iter().find(|(p, _)| *p == param).map(|(_, v)| v)
    }

    /// Textual line without the terminator.
    pub fn to_line(&self) -> String {
        let mut line = String::from(self.opcode.name());
        for (param, value) in &self.params {
            line.push(GENERAL_DELIMITER);
            line.push_str(PARAMETER_FLAG);
            line.push_str(param.name());
            line.push(KEY_VALUE_SEPARATOR);
            line.push_str(&value.to_string());
        }
        line
    }

    /// Bytes written to the transport, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_line().into_bytes();
        bytes.push(COMMAND_EOF);
        bytes
    }

    /// Parse a wire line (terminator optional) back into a command.
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(COMMAND_EOF as char);
        let mut tokens = line.split(GENERAL_DELIMITER).filter(|t| !t.is_empty());

        let name = tokens.next().ok_or(CodecError::EmptyLine)?;
        let opcode = Opcode::from_name(name)
            .ok_or_else(|| CodecError::UnknownCommand(name.to_string()))?;

        let mut command = Command::new(opcode);
        for token in tokens {
            let body = token
                .strip_prefix(PARAMETER_FLAG)
                .ok_or_else(|| CodecError::MalformedParameter(token.to_string()))?;
            let (key, value) = body
                .split_once(KEY_VALUE_SEPARATOR)
                .ok_or_else(|| CodecError::MalformedParameter(token.to_string()))?;
            let param = Param::from_name(key)
                .ok_or_else(|| CodecError::UnknownParameter(key.to_string()))?;
            command.params.push((param, ParamValue::parse(value)));
        }
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_params() {
        assert_eq!(Command::new(Opcode::Halt).encode(), b"HALT\r".to_vec());
    }

    #[test]
    fn test_encode_params_in_declaration_order() {
        let cmd = Command::new(Opcode::ReadAnalogInput)
            .with(Param::Input, 5)
            .with(Param::Number, 10);
        assert_eq!(cmd.encode(), b"READ_ANALOG_INPUT --INPUT=5 --NUMBER=10\r".to_vec());
    }

    #[test]
    fn test_decode_recovers_opcode_and_params() {
        let cmd = Command::new(Opcode::ReadAnalogInput)
            .with(Param::Input, 5)
            .with(Param::Number, 10);
        let line = String::from_utf8(cmd.encode()).unwrap();
        let decoded = Command::decode(&line).unwrap();
        assert_eq!(decoded.opcode(), Opcode::ReadAnalogInput);
        assert_eq!(decoded.param(Param::Input), Some(&ParamValue::Int(5)));
        assert_eq!(decoded.param(Param::Number), Some(&ParamValue::Int(10)));
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn test_float_and_text_values() {
        let cmd = Command::new(Opcode::WriteCalibrationTemp)
            .with(Param::Temperature, 25.0)
            .with(Param::Index, 2);
        assert_eq!(cmd.to_line(), "WRITE_CALIBRATION_TEMP --TEMPERATURE=25.0 --INDEX=2");
        let decoded = Command::decode(&cmd.to_line()).unwrap();
        assert_eq!(decoded.param(Param::Temperature), Some(&ParamValue::Float(25.0)));

        let all = Command::decode("READ_DIGITAL_INPUT --INPUT=ALL --NUMBER=1\r").unwrap();
        assert_eq!(all.param(Param::Input), Some(&ParamValue::Text("ALL".into())));
    }

    #[test]
    fn test_extreme_floats_decode_as_floats() {
        for value in [1e20, 1e-7, -2.5e300, 6.02e23] {
            let cmd = Command::new(Opcode::WriteGainCalibrationValue).with(Param::Value, value);
            let decoded = Command::decode(&cmd.to_line()).unwrap();
            assert_eq!(decoded.param(Param::Value), Some(&ParamValue::Float(value)), "{}", cmd.to_line());
            assert_eq!(decoded.to_line(), cmd.to_line());
        }
    }

    #[test]
    fn test_numeric_text_decodes_as_number() {
        let cmd = Command::new(Opcode::SetBoardSerialNum).with(Param::Value, "5");
        let decoded = Command::decode(&cmd.to_line()).unwrap();
        assert_eq!(decoded.param(Param::Value), Some(&ParamValue::Int(5)));
        assert_eq!(decoded.to_line(), cmd.to_line());

        let serial = Command::decode("SET_BOARD_SERIAL_NUM --VALUE=E1X").unwrap();
        assert_eq!(serial.param(Param::Value), Some(&ParamValue::Text("E1X".into())));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(Command::decode(""), Err(CodecError::EmptyLine)));
        assert!(matches!(Command::decode("FLY"), Err(CodecError::UnknownCommand(_))));
        assert!(matches!(Command::decode("SAMPLE NUMBER=1"), Err(CodecError::MalformedParameter(_))));
        assert!(matches!(Command::decode("SAMPLE --SPEED=1"), Err(CodecError::UnknownParameter(_))));
    }

    #[test]
    fn test_ordinals_follow_declaration_order() {
        assert_eq!(Opcode::Disconnect.ordinal(), 0);
        assert_eq!(Opcode::NoOp.ordinal(), 8);
        assert_eq!(Opcode::ALL.len(), 45);
        assert_eq!(Opcode::from_ordinal(44), Some(Opcode::ListPwmInputs));
        assert_eq!(Opcode::from_ordinal(45), None);
        assert_eq!(Param::DutyCycle.ordinal(), 13);
        assert_eq!(Param::from_ordinal(Param::Scale.ordinal()), Some(Param::Scale));
    }
}
