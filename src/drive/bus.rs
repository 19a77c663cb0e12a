// Serial servo bus for the drive and steer motors.
//
// Dynamixel-1.0-style framing: [0xFF, 0xFF, ID, Length, Instruction,
// Params..., Checksum]. Drive motors run in velocity mode, steer motors in
// position mode; both expose position/velocity feedback registers.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Broadcast address for sync writes.
const BROADCAST_ID: u8 = 0xFE;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register map of the servo's control table.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalPosition = 42,    // 2 bytes
    GoalVelocity = 46,    // 2 bytes, sign-magnitude
    Lock = 55,            // 1 byte
    PresentPosition = 56, // 2 bytes, read-only
    PresentVelocity = 58, // 2 bytes, read-only, sign-magnitude
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("servo {id} reported error status 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("timeout waiting for servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, BusError>;

/// A shared serial line with up to eight servos on it.
pub struct ServoBus {
    port: Box<dyn SerialPort>,
}

impl ServoBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    /// Complement checksum over everything after the header.
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(6 + params.len());
        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push((params.len() + 2) as u8); // params + instruction + checksum
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));
        packet
    }

    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read and validate one status packet, returning its parameter bytes.
    fn read_status(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout { id: expected_id }
            } else {
                BusError::Io(e)
            }
        })?;
        if header != HEADER {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("bad header {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let (id, length) = (id_length[0], id_length[1] as usize);
        if id != expected_id {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("responder id {} != {}", id, expected_id),
            });
        }

        // error byte + params + checksum
        let mut body = vec![0u8; length];
        self.port.read_exact(&mut body)?;

        let mut checked = vec![id, length as u8];
        checked.extend_from_slice(&body[..body.len() - 1]);
        if Self::checksum(&checked) != body[body.len() - 1] {
            return Err(BusError::ChecksumMismatch { id });
        }

        if body[0] != 0 {
            return Err(BusError::ServoError { id, status: body[0] });
        }
        Ok(body[1..body.len() - 1].to_vec())
    }

    pub fn ping(&mut self, id: u8) -> Result<bool> {
        self.send(&Self::build_packet(id, Instruction::Ping, &[]))?;
        match self.read_status(id) {
            Ok(_) => Ok(true),
            Err(BusError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("servo {}: {:?} <- {}", id, register, value);
        self.send(&Self::build_packet(id, Instruction::Write, &[register as u8, value]))?;
        self.read_status(id)?;
        Ok(())
    }

    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        let params = [register as u8, (value & 0xFF) as u8, (value >> 8) as u8];
        self.send(&Self::build_packet(id, Instruction::Write, &params))?;
        self.read_status(id)?;
        Ok(())
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        self.send(&Self::build_packet(id, Instruction::Read, &[register as u8, 2]))?;
        let response = self.read_status(id)?;
        if response.len() < 2 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    /// One-transaction read of the contiguous position/velocity registers.
    ///
    /// The feedback pair feeds odometry every cycle; fetching both in a
    /// single exchange halves the bus traffic per wheel.
    pub fn read_position_velocity(&mut self, id: u8) -> Result<(u16, i16)> {
        self.send(&Self::build_packet(
            id,
            Instruction::Read,
            &[Register::PresentPosition as u8, 4],
        ))?;
        let response = self.read_status(id)?;
        if response.len() < 4 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("expected 4 bytes, got {}", response.len()),
            });
        }
        let position = u16::from_le_bytes([response[0], response[1]]);
        let velocity = decode_sign_magnitude(u16::from_le_bytes([response[2], response[3]]));
        Ok((position, velocity))
    }

    /// Write the same register on several servos in one broadcast packet.
    /// Sync writes are unacknowledged.
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut params = vec![register as u8, 2];
        for &(id, value) in data {
            params.push(id);
            params.push((value & 0xFF) as u8);
            params.push((value >> 8) as u8);
        }
        debug!("sync write {:?} to {} servos", register, data.len());
        self.send(&Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params))
    }

    pub fn sync_write_i16(&mut self, register: Register, data: &[(u8, i16)]) -> Result<()> {
        let encoded: Vec<(u8, u16)> = data
            .iter()
            .map(|&(id, value)| (id, encode_sign_magnitude(value)))
            .collect();
        self.sync_write_u16(register, &encoded)
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Torque must be disabled before the mode register accepts a write.
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }
}

/// Velocity registers use sign-magnitude: bit 15 is direction, bits 0-14
/// magnitude.
pub fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (-(value as i32)) as u16
    }
}

pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        assert_eq!(ServoBus::checksum(&data), 215);
    }

    #[test]
    fn test_build_ping_packet() {
        let packet = ServoBus::build_packet(1, Instruction::Ping, &[]);
        assert_eq!(packet.len(), 6);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], 1); // ID
        assert_eq!(packet[3], 2); // instruction + checksum
        assert_eq!(packet[4], 0x01);
        assert_eq!(packet[5], ServoBus::checksum(&packet[2..5]));
    }

    #[test]
    fn test_build_sync_write_packet() {
        let mut params = vec![Register::GoalVelocity as u8, 2];
        for &(id, value) in &[(7u8, 100u16), (8, 200)] {
            params.push(id);
            params.push((value & 0xFF) as u8);
            params.push((value >> 8) as u8);
        }
        let packet = ServoBus::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        assert_eq!(packet[2], BROADCAST_ID);
        assert_eq!(packet[4], Instruction::SyncWrite as u8);
        assert_eq!(packet.len(), 6 + params.len());
    }

    #[test]
    fn test_sign_magnitude_round_trip() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(-1), 0x8001);
        assert_eq!(encode_sign_magnitude(i16::MIN), 0x8000);

        for value in [-3000i16, -1, 0, 1, 3000] {
            assert_eq!(decode_sign_magnitude(encode_sign_magnitude(value)), value);
        }
    }
}
