//! Raw record types and the event wire header.
//!
//! Every record written by the kernel program starts with a native-endian
//! header:
//!
//! | Offset | Size | Field        |
//! |--------|------|--------------|
//! | 0      | 8    | `cpu`        |
//! | 8      | 8    | `timestamp`  |
//! | 16     | 4    | `event_type` |
//!
//! The first 16 bytes are the Quick Info the reorderer keys on.

use bytes::{BufMut, BytesMut};

/// Bytes needed to extract [`QuickInfo`].
pub const QUICK_INFO_LEN: usize = 16;

/// Bytes needed to extract a full [`EventHeader`].
pub const HEADER_LEN: usize = 20;

/// An opaque record payload plus the CPU it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub cpu: u32,
    pub data: BytesMut,
}

impl RawRecord {
    pub fn new(cpu: u32, data: BytesMut) -> Self {
        Self { cpu, data }
    }

    #[inline]
    pub fn quick_info(&self) -> Option<QuickInfo> {
        QuickInfo::extract(&self.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickInfo {
    pub cpu: u64,
    pub timestamp: u64,
}

impl QuickInfo {
    /// Reads the leading `{cpu, timestamp}` pair, `None` on short input.
    #[inline]
    pub fn extract(payload: &[u8]) -> Option<Self> {
        Some(Self {
            cpu: read_u64(payload, 0)?,
            timestamp: read_u64(payload, 8)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub cpu: u64,
    pub timestamp: u64,
    pub event_type: u32,
}

impl EventHeader {
    pub fn new(cpu: u64, timestamp: u64, event_type: u32) -> Self {
        Self {
            cpu,
            timestamp,
            event_type,
        }
    }

    #[inline]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let info = QuickInfo::extract(payload)?;
        let event_type = payload.get(QUICK_INFO_LEN..HEADER_LEN)?;
        Some(Self {
            cpu: info.cpu,
            timestamp: info.timestamp,
            event_type: u32::from_ne_bytes(event_type.try_into().ok()?),
        })
    }

    /// Appends the header in wire layout.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN);
        buf.put_slice(&self.cpu.to_ne_bytes());
        buf.put_slice(&self.timestamp.to_ne_bytes());
        buf.put_slice(&self.event_type.to_ne_bytes());
    }
}

#[inline]
fn read_u64(payload: &[u8], offset: usize) -> Option<u64> {
    let bytes = payload.get(offset..offset + 8)?;
    Some(u64::from_ne_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let mut buf = BytesMut::new();
        EventHeader::new(3, 0xdead_beef, 7).write_to(&mut buf);
        buf.put_slice(b"tail");
        assert_eq!(buf.len(), HEADER_LEN + 4);

        let header = EventHeader::parse(&buf).unwrap();
        assert_eq!(header, EventHeader::new(3, 0xdead_beef, 7));

        let info = QuickInfo::extract(&buf).unwrap();
        assert_eq!(info.cpu, 3);
        assert_eq!(info.timestamp, 0xdead_beef);
    }

    #[test]
    fn short_payloads_are_rejected() {
        assert!(QuickInfo::extract(&[0u8; 15]).is_none());
        assert!(QuickInfo::extract(&[0u8; 16]).is_some());
        assert!(EventHeader::parse(&[0u8; 19]).is_none());
        assert!(EventHeader::parse(&[]).is_none());
    }
}
