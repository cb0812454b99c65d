//! ZMQ Telemetry Bridge - Binary Fleet Ingestion
//!
//! High-frequency ZeroMQ subscriber for the backend fleet publisher.
//! - ZMQ SUB with CONFLATE (always process latest data)
//! - Non-blocking receive; the poll loop never stalls on the socket
//! - Manual little-endian field parsing, truncated records skipped
//!
//! Enable with the `zmq-telemetry` feature flag. Without it, a stub
//! receiver that never yields data compiles in its place.

use crate::fetcher::{TelemetryError, TelemetrySource};
use crate::snapshot::VehicleRecord;
use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

/// Binary packet header.
/// Layout: [frame_id: u64, timestamp: f64, vehicle_count: u32, padding: u32]
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub frame_id: u64,
    pub timestamp: f64, // Publisher time in seconds
    pub vehicle_count: u32,
}

impl PacketHeader {
    pub const SIZE: usize = 24; // 8 + 8 + 4 + 4 bytes

    /// Parse header from bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }

        let frame_id = u64::from_le_bytes(data[0..8].try_into().ok()?);
        let timestamp = f64::from_le_bytes(data[8..16].try_into().ok()?);
        let vehicle_count = u32::from_le_bytes(data[16..20].try_into().ok()?);

        Some(Self {
            frame_id,
            timestamp,
            vehicle_count,
        })
    }
}

/// Vehicle status flag bits inside a wire record.
pub mod flags {
    pub const IS_EV: u32 = 1 << 0;
    pub const CHARGING: u32 = 1 << 1;
    pub const QUEUED: u32 = 1 << 2;
    pub const STRANDED: u32 = 1 << 3;
    pub const CIRCLING: u32 = 1 << 4;
    pub const V2G: u32 = 1 << 5;
}

/// Per-vehicle wire record.
/// Layout: { id: u64, lon: f64, lat: f64, battery: f32, flags: u32, station: i32 }
#[derive(Debug, Clone, Copy, Default)]
pub struct WireVehicle {
    pub id: u64,
    pub lon: f64,
    pub lat: f64,
    pub battery: f32,
    pub flags: u32,
    /// Assigned station index, -1 when none
    pub station: i32,
}

impl WireVehicle {
    pub const SIZE: usize = 36; // 8 + 8 + 8 + 4 + 4 + 4 bytes

    /// Parse one vehicle record from bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }

        let id = u64::from_le_bytes(data[0..8].try_into().ok()?);
        let lon = f64::from_le_bytes(data[8..16].try_into().ok()?);
        let lat = f64::from_le_bytes(data[16..24].try_into().ok()?);
        let battery = f32::from_le_bytes(data[24..28].try_into().ok()?);
        let flags = u32::from_le_bytes(data[28..32].try_into().ok()?);
        let station = i32::from_le_bytes(data[32..36].try_into().ok()?);

        Some(Self {
            id,
            lon,
            lat,
            battery,
            flags,
            station,
        })
    }

    /// Parse multiple vehicles from a contiguous buffer
    pub fn parse_batch(data: &[u8], count: usize) -> Vec<Self> {
        let mut vehicles = Vec::with_capacity(count);

        for i in 0..count {
            let start = i * Self::SIZE;
            let end = start + Self::SIZE;

            if end > data.len() {
                break;
            }

            if let Some(vehicle) = Self::from_bytes(&data[start..end]) {
                vehicles.push(vehicle);
            }
        }

        vehicles
    }

    /// Converts a wire record to the engine's snapshot contract.
    pub fn to_record(&self) -> VehicleRecord {
        VehicleRecord {
            id: format!("v{}", self.id),
            lon: self.lon,
            lat: self.lat,
            is_ev: self.flags & flags::IS_EV != 0,
            battery_percent: self.battery as f64,
            is_charging: self.flags & flags::CHARGING != 0,
            is_queued: self.flags & flags::QUEUED != 0,
            is_stranded: self.flags & flags::STRANDED != 0,
            is_circling: self.flags & flags::CIRCLING != 0,
            assigned_station: (self.station >= 0).then(|| format!("s{}", self.station)),
            v2g_active: self.flags & flags::V2G != 0,
        }
    }
}

/// Complete fleet packet from the publisher
#[derive(Debug, Clone)]
pub struct FleetPacket {
    pub header: PacketHeader,
    pub vehicles: Vec<WireVehicle>,
}

impl FleetPacket {
    /// Parse complete packet from binary data
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let header = PacketHeader::from_bytes(data)?;

        let vehicle_data = &data[PacketHeader::SIZE..];
        let vehicles = WireVehicle::parse_batch(vehicle_data, header.vehicle_count as usize);

        Some(Self { header, vehicles })
    }
}

/// Errors for the ZMQ receiver
#[derive(Error, Debug)]
pub enum ZmqTelemetryError {
    #[error("ZMQ error: {0}")]
    Zmq(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// ZMQ-based fleet telemetry receiver
///
/// Connects to the backend publisher and receives high-frequency vehicle
/// state updates; CONFLATE keeps only the most recent frame.
#[cfg(feature = "zmq-telemetry")]
pub struct FleetZmqReceiver {
    telemetry_socket: zmq::Socket,
    _context: zmq::Context,

    // Latest state
    pub last_packet: Option<FleetPacket>,
}

#[cfg(feature = "zmq-telemetry")]
impl FleetZmqReceiver {
    /// Create new receiver connected to the fleet publisher
    pub fn new(endpoint: &str) -> Result<Self, ZmqTelemetryError> {
        let context = zmq::Context::new();

        let telemetry_socket = context
            .socket(zmq::SUB)
            .map_err(|e| ZmqTelemetryError::Zmq(e.to_string()))?;

        telemetry_socket
            .set_conflate(true) // Keep only latest
            .map_err(|e| ZmqTelemetryError::Zmq(e.to_string()))?;
        telemetry_socket
            .set_rcvtimeo(100) // 100ms timeout
            .map_err(|e| ZmqTelemetryError::Zmq(e.to_string()))?;
        telemetry_socket
            .connect(endpoint)
            .map_err(|e| ZmqTelemetryError::Zmq(e.to_string()))?;
        telemetry_socket
            .set_subscribe(b"") // Subscribe to all
            .map_err(|e| ZmqTelemetryError::Zmq(e.to_string()))?;

        Ok(Self {
            telemetry_socket,
            _context: context,
            last_packet: None,
        })
    }

    /// Receive latest fleet packet (non-blocking with ZMQ_CONFLATE)
    pub fn receive_telemetry(&mut self) -> Result<Option<FleetPacket>, ZmqTelemetryError> {
        match self.telemetry_socket.recv_bytes(zmq::DONTWAIT) {
            Ok(data) => {
                let packet = FleetPacket::from_bytes(&data)
                    .ok_or_else(|| ZmqTelemetryError::Parse("Invalid packet format".into()))?;
                self.last_packet = Some(packet.clone());
                Ok(Some(packet))
            }
            Err(zmq::Error::EAGAIN) => Ok(None), // No message available
            Err(e) => Err(ZmqTelemetryError::Zmq(e.to_string())),
        }
    }
}

// ============================================================================
// NON-ZMQ FALLBACK (when zmq-telemetry feature is disabled)
// ============================================================================

/// Stub receiver for builds without ZMQ
#[cfg(not(feature = "zmq-telemetry"))]
pub struct FleetZmqReceiver {
    pub last_packet: Option<FleetPacket>,
}

#[cfg(not(feature = "zmq-telemetry"))]
impl FleetZmqReceiver {
    pub fn new(_endpoint: &str) -> Result<Self, ZmqTelemetryError> {
        Ok(Self { last_packet: None })
    }

    pub fn receive_telemetry(&mut self) -> Result<Option<FleetPacket>, ZmqTelemetryError> {
        Ok(None)
    }
}

/// [`TelemetrySource`] over the ZMQ receiver.
///
/// Serves the freshest packet the socket has seen; with nothing new on the
/// wire, the previous packet is re-served and the fetcher's fingerprint
/// suppresses the redundant downstream work.
pub struct ZmqTelemetrySource {
    receiver: Mutex<FleetZmqReceiver>,
}

impl ZmqTelemetrySource {
    pub fn connect(endpoint: &str) -> Result<Self, ZmqTelemetryError> {
        Ok(Self {
            receiver: Mutex::new(FleetZmqReceiver::new(endpoint)?),
        })
    }
}

#[async_trait]
impl TelemetrySource for ZmqTelemetrySource {
    async fn fetch(&self) -> Result<Vec<VehicleRecord>, TelemetryError> {
        let mut receiver = self
            .receiver
            .lock()
            .map_err(|_| TelemetryError::Transport("receiver poisoned".into()))?;

        match receiver.receive_telemetry() {
            Ok(Some(packet)) => Ok(packet.vehicles.iter().map(WireVehicle::to_record).collect()),
            Ok(None) => Ok(receiver
                .last_packet
                .as_ref()
                .map(|packet| packet.vehicles.iter().map(WireVehicle::to_record).collect())
                .unwrap_or_default()),
            Err(ZmqTelemetryError::Parse(message)) => Err(TelemetryError::Parse(message)),
            Err(error) => Err(TelemetryError::Transport(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(frame_id: u64, timestamp: f64, count: u32) -> Vec<u8> {
        let mut data = vec![0u8; PacketHeader::SIZE];
        data[0..8].copy_from_slice(&frame_id.to_le_bytes());
        data[8..16].copy_from_slice(&timestamp.to_le_bytes());
        data[16..20].copy_from_slice(&count.to_le_bytes());
        data
    }

    fn vehicle_bytes(vehicle: &WireVehicle) -> Vec<u8> {
        let mut data = vec![0u8; WireVehicle::SIZE];
        data[0..8].copy_from_slice(&vehicle.id.to_le_bytes());
        data[8..16].copy_from_slice(&vehicle.lon.to_le_bytes());
        data[16..24].copy_from_slice(&vehicle.lat.to_le_bytes());
        data[24..28].copy_from_slice(&vehicle.battery.to_le_bytes());
        data[28..32].copy_from_slice(&vehicle.flags.to_le_bytes());
        data[32..36].copy_from_slice(&vehicle.station.to_le_bytes());
        data
    }

    #[test]
    fn test_header_parsing() {
        let data = header_bytes(42, 1.5, 3);
        let header = PacketHeader::from_bytes(&data).unwrap();

        assert_eq!(header.frame_id, 42);
        assert!((header.timestamp - 1.5).abs() < 0.001);
        assert_eq!(header.vehicle_count, 3);
    }

    #[test]
    fn test_header_rejects_short_buffer() {
        assert!(PacketHeader::from_bytes(&[0u8; 10]).is_none());
    }

    #[test]
    fn test_vehicle_round_trip() {
        let vehicle = WireVehicle {
            id: 17,
            lon: 13.4,
            lat: 52.5,
            battery: 41.5,
            flags: flags::IS_EV | flags::CHARGING,
            station: 3,
        };

        let parsed = WireVehicle::from_bytes(&vehicle_bytes(&vehicle)).unwrap();
        assert_eq!(parsed.id, 17);
        assert!((parsed.lon - 13.4).abs() < 1e-12);
        assert_eq!(parsed.flags, vehicle.flags);
        assert_eq!(parsed.station, 3);
    }

    #[test]
    fn test_to_record_maps_flags_and_station() {
        let vehicle = WireVehicle {
            id: 9,
            lon: 13.4,
            lat: 52.5,
            battery: 15.0,
            flags: flags::IS_EV | flags::STRANDED | flags::V2G,
            station: -1,
        };

        let record = vehicle.to_record();
        assert_eq!(record.id, "v9");
        assert!(record.is_ev);
        assert!(record.is_stranded);
        assert!(record.v2g_active);
        assert!(!record.is_charging);
        assert!(record.assigned_station.is_none());

        let stationed = WireVehicle {
            station: 4,
            ..vehicle
        };
        assert_eq!(stationed.to_record().assigned_station.as_deref(), Some("s4"));
    }

    #[test]
    fn test_full_packet_parsing_skips_truncated_tail() {
        let mut data = header_bytes(1, 0.5, 2);
        data.extend(vehicle_bytes(&WireVehicle {
            id: 1,
            ..Default::default()
        }));
        // Second record truncated: only the first survives
        data.extend(&[0u8; 12]);

        let packet = FleetPacket::from_bytes(&data).unwrap();
        assert_eq!(packet.header.frame_id, 1);
        assert_eq!(packet.vehicles.len(), 1);
        assert_eq!(packet.vehicles[0].id, 1);
    }
}
