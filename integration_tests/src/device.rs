//! Console client for the receiver.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

use crate::protocol::{
    build_command, build_command_payload, cobs_decode, cobs_encode, key_value, parse_response,
    CommandId, ConfigKey, Response, ResponseId, CURVE_BYTES, MAX_CURVE_CHUNK,
};

/// Find the console port by sending GetVersion to each USB serial adapter.
pub fn find_console_port(baud_rate: u32) -> Result<String> {
    let ports = serialport::available_ports()?;

    for port_info in ports {
        let name = &port_info.port_name;
        if !(name.contains("ttyUSB") || name.contains("ttyACM")) {
            continue;
        }

        if let Ok(mut client) = DeviceClient::new(name, baud_rate) {
            client.set_timeout(Duration::from_millis(500));
            if let Ok(response) = client.send_command(CommandId::GetVersion, &[]) {
                if response.resp_id == ResponseId::Version {
                    return Ok(name.clone());
                }
            }
        }
    }

    anyhow::bail!("No console port found - ensure the receiver is connected")
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str, baud_rate: u32) -> Result<String> {
    if port_arg == "auto" {
        find_console_port(baud_rate)
    } else {
        Ok(port_arg.to_string())
    }
}

/// Client for the receiver's configuration console.
pub struct DeviceClient {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl DeviceClient {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
        })
    }

    /// Set the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Clear any pending data in the serial buffer.
    pub fn clear_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    /// Send a command and wait for response.
    pub fn send_command(&mut self, cmd_id: CommandId, payload: &[u8]) -> Result<Response> {
        let frame = build_command(cmd_id, payload);
        self.exchange(&frame)
    }

    /// Send a frame with an arbitrary command id (for testing invalid commands).
    pub fn send_raw_command(&mut self, cmd_id: u8, payload: &[u8]) -> Result<Response> {
        let frame = cobs_encode(&build_command_payload(cmd_id, payload));
        self.exchange(&frame)
    }

    /// Send a valid frame with one payload bit flipped after the CRC was computed.
    pub fn send_corrupted_command(
        &mut self,
        cmd_id: CommandId,
        payload: &[u8],
    ) -> Result<Response> {
        let mut raw = build_command_payload(cmd_id as u8, payload);
        raw[4] ^= 0x01;
        let frame = cobs_encode(&raw);
        self.exchange(&frame)
    }

    pub fn get_key(&mut self, key: ConfigKey) -> Result<Response> {
        self.send_command(CommandId::GetKey, &[key as u8])
    }

    pub fn set_key(&mut self, key: ConfigKey, value: i32) -> Result<Response> {
        self.send_command(CommandId::SetKey, &key_value(key, value))
    }

    pub fn get_curve_chunk(&mut self, offset: u16, len: u8) -> Result<Response> {
        let mut payload = offset.to_le_bytes().to_vec();
        payload.push(len);
        self.send_command(CommandId::GetCurveChunk, &payload)
    }

    pub fn set_curve_chunk(&mut self, offset: u16, bytes: &[u8]) -> Result<Response> {
        let mut payload = offset.to_le_bytes().to_vec();
        payload.extend_from_slice(bytes);
        self.send_command(CommandId::SetCurveChunk, &payload)
    }

    /// Read the whole staged battery curve chunk by chunk
    pub fn read_curve(&mut self) -> Result<Vec<u8>> {
        let mut curve = Vec::with_capacity(CURVE_BYTES);
        while curve.len() < CURVE_BYTES {
            let offset = curve.len() as u16;
            let len = MAX_CURVE_CHUNK.min(CURVE_BYTES - curve.len()) as u8;
            let response = self.get_curve_chunk(offset, len)?;
            let Some(bytes) = response.curve_chunk(offset) else {
                anyhow::bail!("Expected curve chunk at {}, got {:?}", offset, response.resp_id);
            };
            curve.extend_from_slice(bytes);
        }
        Ok(curve)
    }

    fn exchange(&mut self, frame: &[u8]) -> Result<Response> {
        self.port.write_all(frame)?;
        self.port.flush()?;

        let mut data = self.read_frame()?;
        // corncobs expects the zero delimiter
        data.push(0x00);
        let decoded = cobs_decode(&data)?;
        parse_response(&decoded)
    }

    /// Read bytes until zero delimiter.
    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = [0u8; 1];
        let start = Instant::now();

        while start.elapsed() < self.timeout {
            match self.port.read(&mut buf) {
                Ok(1) => {
                    if buf[0] == 0x00 {
                        if !data.is_empty() {
                            return Ok(data);
                        }
                    } else {
                        data.push(buf[0]);
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        anyhow::bail!(
            "Timeout waiting for response, got {} bytes: {:02x?}",
            data.len(),
            data
        );
    }
}
