//! Factories for every board operation.
//!
//! Each function returns a ready-to-queue [`Command`]; nothing here touches
//! the transport.
use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

use super::codec::{Command, Opcode, Param};
use super::{CodecError, Result};

pub const ANALOG_INPUT_COUNT: u8 = 32;
pub const DIGITAL_INPUT_COUNT: u8 = 24;
pub const DIGITAL_OUTPUT_COUNT: usize = 16;

/// Keyword selecting every channel of a kind.
const ALL_CHANNELS: &str = "ALL";

/// Analog front-end gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gain { X1, X2, X4, X8, X16, X32, X64 }

impl Gain {
    pub fn value(&self) -> u8 {
        match self {
            Gain::X1 => 1,
            Gain::X2 => 2,
            Gain::X4 => 4,
            Gain::X8 => 8,
            Gain::X16 => 16,
            Gain::X32 => 32,
            Gain::X64 => 64,
        }
    }
}

/// ADC sample rate in samples per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rate {
    Sps30000, Sps15000, Sps7500, Sps3750, Sps2000, Sps1000, Sps500, Sps100,
    Sps60, Sps50, Sps30, Sps25, Sps15, Sps10, Sps5, Sps2_5,
}

impl Rate {
    pub fn wire(&self) -> &'static str {
        match self {
            Rate::Sps30000 => "30000",
            Rate::Sps15000 => "15000",
            Rate::Sps7500 => "7500",
            Rate::Sps3750 => "3750",
            Rate::Sps2000 => "2000",
            Rate::Sps1000 => "1000",
            Rate::Sps500 => "500",
            Rate::Sps100 => "100",
            Rate::Sps60 => "60",
            Rate::Sps50 => "50",
            Rate::Sps30 => "30",
            Rate::Sps25 => "25",
            Rate::Sps15 => "15",
            Rate::Sps10 => "10",
            Rate::Sps5 => "5",
            Rate::Sps2_5 => "2.5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferState { Enabled, Disabled }

impl BufferState {
    pub fn wire(&self) -> &'static str {
        match self {
            BufferState::Enabled => "ENABLED",
            BufferState::Disabled => "DISABLED",
        }
    }
}

/// Full-scale range of the analog inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalogScale { Scale5V, Scale400V }

impl AnalogScale {
    pub fn wire(&self) -> &'static str {
        match self {
            AnalogScale::Scale5V => "ANALOG_SCALE_5V",
            AnalogScale::Scale400V => "ANALOG_SCALE_400V",
        }
    }
}

fn channel_set(inputs: &BTreeSet<u8>) -> Result<String> {
    if inputs.is_empty() {
        return Err(CodecError::InvalidArgument("input set is empty".into()));
    }
    Ok(inputs.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(","))
}

/// Encode output states as hex, first entry = most significant bit.
pub fn outputs_to_hex(states: &[bool]) -> Result<String> {
    if states.is_empty() || states.len() % 8 != 0 {
        return Err(CodecError::InvalidArgument(format!(
            "output state count must be a non-zero multiple of 8, got {}",
            states.len()
        )));
    }
    let bytes: Vec<u8> = states
        .chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &on| (acc << 1) | on as u8))
        .collect();
    Ok(hex::encode_upper(bytes))
}

pub fn read_analog_input(input: u8, number: u32) -> Command {
    Command::new(Opcode::ReadAnalogInput).with(Param::Input, input).with(Param::Number, number)
}

pub fn read_analog_input_range(start: u8, end: u8, number: u32) -> Command {
    Command::new(Opcode::ReadAnalogInput)
        .with(Param::Input, format!("{}-{}", start, end))
        .with(Param::Number, number)
}

pub fn read_analog_input_set(inputs: &BTreeSet<u8>, number: u32) -> Result<Command> {
    Ok(Command::new(Opcode::ReadAnalogInput)
        .with(Param::Input, channel_set(inputs)?)
        .with(Param::Number, number))
}

pub fn read_all_analog_input(number: u32) -> Command {
    Command::new(Opcode::ReadAnalogInput).with(Param::Input, ALL_CHANNELS).with(Param::Number, number)
}

pub fn read_digital_input(input: u8, number: u32) -> Command {
    Command::new(Opcode::ReadDigitalInput).with(Param::Input, input).with(Param::Number, number)
}

pub fn read_digital_input_range(start: u8, end: u8, number: u32) -> Command {
    Command::new(Opcode::ReadDigitalInput)
        .with(Param::Input, format!("{}-{}", start, end))
        .with(Param::Number, number)
}

pub fn read_digital_input_set(inputs: &BTreeSet<u8>, number: u32) -> Result<Command> {
    Ok(Command::new(Opcode::ReadDigitalInput)
        .with(Param::Input, channel_set(inputs)?)
        .with(Param::Number, number))
}

pub fn read_all_digital_input(number: u32) -> Command {
    Command::new(Opcode::ReadDigitalInput).with(Param::Input, ALL_CHANNELS).with(Param::Number, number)
}

pub fn add_analog_input(input: u8, gain: Gain, rate: Rate, buffer: BufferState) -> Command {
    Command::new(Opcode::AddAnalogInput)
        .with(Param::Input, input)
        .with(Param::Gain, gain.value())
        .with(Param::Rate, rate.wire())
        .with(Param::Buffer, buffer.wire())
}

pub fn remove_analog_input(input: u8) -> Command {
    Command::new(Opcode::RemoveAnalogInput).with(Param::Input, input)
}

/// One REMOVE_ANALOG_INPUT per physical analog channel.
pub fn deactivate_all_analog_inputs() -> Vec<Command> {
    (0..ANALOG_INPUT_COUNT).map(remove_analog_input).collect()
}

pub fn add_digital_input(input: u8) -> Command {
    Command::new(Opcode::AddDigitalInput).with(Param::Input, input)
}

pub fn remove_digital_input(input: u8) -> Command {
    Command::new(Opcode::RemoveDigitalInput).with(Param::Input, input)
}

pub fn deactivate_all_digital_inputs() -> Vec<Command> {
    (0..DIGITAL_INPUT_COUNT).map(remove_digital_input).collect()
}

pub fn set_digital_output_by_hex(hex_mask: &str) -> Command {
    Command::new(Opcode::SetDigitalOutput).with(Param::Output, hex_mask)
}

pub fn set_digital_output(states: &[bool]) -> Result<Command> {
    if states.len() != DIGITAL_OUTPUT_COUNT {
        return Err(CodecError::InvalidArgument(format!(
            "expected {} output states, got {}",
            DIGITAL_OUTPUT_COUNT,
            states.len()
        )));
    }
    Ok(set_digital_output_by_hex(&outputs_to_hex(states)?))
}

pub fn set_digital_output_pwm(hex_mask: &str, duty_cycle: u8) -> Result<Command> {
    if duty_cycle > 100 {
        return Err(CodecError::InvalidArgument(format!(
            "duty cycle must be within 0..=100, got {}",
            duty_cycle
        )));
    }
    Ok(Command::new(Opcode::SetDigitalOutput)
        .with(Param::Output, hex_mask)
        .with(Param::DutyCycle, duty_cycle))
}

pub fn read_digital_output() -> Command {
    Command::new(Opcode::ReadDigitalOutput)
}

pub fn set_pwm_output_timer(time: u32) -> Command {
    Command::new(Opcode::SetPwmOutputTimer).with(Param::Value, time)
}

pub fn add_pwm_input(input: u8) -> Command {
    Command::new(Opcode::AddPwmInput).with(Param::Input, input)
}

pub fn remove_pwm_input(input: u8) -> Command {
    Command::new(Opcode::RemovePwmInput).with(Param::Input, input)
}

pub fn read_pwm_input(input: u8, number: u32) -> Command {
    Command::new(Opcode::ReadPwmInput).with(Param::Input, input).with(Param::Number, number)
}

pub fn list_pwm_inputs() -> Command {
    Command::new(Opcode::ListPwmInputs)
}

pub fn list_analog_inputs() -> Command {
    Command::new(Opcode::ListAnalogInputs)
}

pub fn set_analog_input_scale(scale: AnalogScale) -> Command {
    Command::new(Opcode::SetAnalogInputScale).with(Param::Scale, scale.wire())
}

pub fn get_analog_input_scale() -> Command {
    Command::new(Opcode::GetAnalogInputScale)
}

pub fn system_gain_calibrate(input: u8) -> Command {
    Command::new(Opcode::SystemGcal).with(Param::Input, input)
}

pub fn system_calibrate() -> Command {
    Command::new(Opcode::SystemCal)
}

pub fn read_system_gain_calibration() -> Command {
    Command::new(Opcode::ReadSystemGcal)
}

pub fn read_self_gain_calibration(gain: Gain, rate: Rate, buffer: BufferState) -> Command {
    Command::new(Opcode::ReadSelfGcal)
        .with(Param::Gain, gain.value())
        .with(Param::Rate, rate.wire())
        .with(Param::Buffer, buffer.wire())
}

pub fn get_calibration_status() -> Command {
    Command::new(Opcode::GetCalibrationStatus)
}

pub fn enter_calibration_mode() -> Command {
    Command::new(Opcode::EnterCalibrationMode)
}

pub fn exit_calibration_mode() -> Command {
    Command::new(Opcode::ExitCalibrationMode)
}

pub fn write_calibration_temperature(temperature: f64, index: u8) -> Command {
    Command::new(Opcode::WriteCalibrationTemp)
        .with(Param::Temperature, temperature)
        .with(Param::Index, index)
}

pub fn write_gain_calibration_value(
    value: f32,
    gain: Gain,
    rate: Rate,
    buffer: BufferState,
    scale: AnalogScale,
    temperature: i32,
) -> Command {
    Command::new(Opcode::WriteGainCalibrationValue)
        .with(Param::Temperature, temperature)
        .with(Param::Value, value)
        .with(Param::Buffer, buffer.wire())
        .with(Param::Rate, rate.wire())
        .with(Param::Gain, gain.value())
        .with(Param::Scale, scale.wire())
}

pub fn write_calibration_valid() -> Command {
    Command::new(Opcode::WriteCalibrationValid)
}

pub fn read_adc_registers() -> Command {
    Command::new(Opcode::ReadAdcRegisters)
}

/// Set the board real-time clock (seconds since the Unix epoch).
pub fn set_rtc(timestamp: i64) -> Command {
    Command::new(Opcode::SetRtc).with(Param::Value, timestamp)
}

pub fn write_serial_number(serial: &str) -> Command {
    Command::new(Opcode::SetBoardSerialNum).with(Param::Value, serial)
}

pub fn write_factory_mac_address(mac: i64) -> Command {
    Command::new(Opcode::SetFactoryMacAddr).with(Param::Value, mac)
}

pub fn sample(number: u32) -> Command {
    Command::new(Opcode::Sample).with(Param::Number, number)
}

pub fn halt() -> Command { Command::new(Opcode::Halt) }
pub fn identify() -> Command { Command::new(Opcode::Identify) }
pub fn upgrade() -> Command { Command::new(Opcode::Upgrade) }
pub fn disconnect() -> Command { Command::new(Opcode::Disconnect) }

/// Lightweight no-op, used as the heartbeat keep-alive.
pub fn none() -> Command { Command::new(Opcode::NoOp) }
