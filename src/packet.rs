use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RconError;

/// Largest size field we are willing to accept from the other side. Anything
/// above this is treated as a corrupt header rather than allocated.
pub const MAX_INBOUND_SIZE: i32 = 64 * 1024;

/// Largest body we will send. Servers cap a whole frame at 4096 bytes,
/// size field excluded.
pub const MAX_BODY_SIZE: usize = 4096 - Packet::BASE_PACKET_SIZE as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    // SERVERDATA_AUTH
    Auth,
    // SERVERDATA_EXECCOMMAND
    Exec,
    // SERVERDATA_AUTH_RESPONSE
    AuthResponse,
    // SERVERDATA_RESPONSE_VALUE
    Response,
}

/// Which way a packet travels. The protocol reuses type code 2 for both
/// `Exec` (to the server) and `AuthResponse` (from the server), so decoding
/// needs to know the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    Serverbound,
    /// Server to client.
    Clientbound,
}

impl PacketType {
    pub fn code(&self) -> i32 {
        match self {
            PacketType::Auth => 3,
            PacketType::Exec => 2,
            PacketType::AuthResponse => 2,
            PacketType::Response => 0,
        }
    }

    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.code().to_le_bytes()
    }

    pub fn from_code(code: i32, direction: Direction) -> Result<Self, RconError> {
        match (code, direction) {
            (3, Direction::Serverbound) => Ok(PacketType::Auth),
            (2, Direction::Serverbound) => Ok(PacketType::Exec),
            (2, Direction::Clientbound) => Ok(PacketType::AuthResponse),
            (0, Direction::Clientbound) => Ok(PacketType::Response),
            (other, _) => Err(RconError::UnknownPacketType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: i32,
    packet_type: PacketType,
    body: String,
}

impl Packet {
    pub const BASE_PACKET_SIZE: i32 = 10;

    pub fn new(id: i32, packet_type: PacketType, body: &str) -> Self {
        Packet {
            id,
            packet_type,
            body: body.to_owned(),
        }
    }

    /// Decode a single frame. `incoming` must hold exactly one packet,
    /// including its size field.
    pub fn unpack(incoming: &[u8], direction: Direction) -> Result<Self, RconError> {
        if incoming.len() < 4 {
            return Err(RconError::MalformedPacketHeader);
        }

        let declared = read_i32(incoming, 0);
        if declared < Self::BASE_PACKET_SIZE {
            return Err(RconError::MalformedPacketHeader);
        }
        if declared as usize + 4 != incoming.len() {
            return Err(RconError::SizeMismatch {
                declared,
                available: incoming.len().saturating_sub(4),
            });
        }

        let id = read_i32(incoming, 4);
        let packet_type = PacketType::from_code(read_i32(incoming, 8), direction)?;

        let end = incoming.len() - 2;
        if incoming[end..] != [0, 0] {
            return Err(RconError::MissingTerminator);
        }
        let body = std::str::from_utf8(&incoming[12..end])?;

        Ok(Packet::new(id, packet_type, body))
    }

    // Since the only one of these values that can change in length is the body,
    // an easy way to calculate the size of a packet is to find the byte-length
    // of the packet body, then add 10 to it.
    pub fn size(&self) -> i32 {
        self.body.len() as i32 + Self::BASE_PACKET_SIZE
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn body(&self) -> &str {
        self.body.as_ref()
    }

    pub fn pack(&self) -> Vec<u8> {
        // Size, ID, Type, Body, Terminator
        let mut payload = Vec::<u8>::with_capacity(self.size() as usize + 4);
        payload.extend_from_slice(&self.size().to_le_bytes());
        payload.extend_from_slice(&self.id().to_le_bytes());
        payload.extend_from_slice(&self.packet_type().to_le_bytes());
        payload.extend_from_slice(self.body().as_bytes());
        // null terminate the body, then null terminate the entire packet
        payload.extend_from_slice(&[0u8, 0u8]);
        payload
    }
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Reassembles frames from a byte stream.
///
/// Bytes are only consumed from the stream by a single `read` call and are
/// kept here until a whole frame is available, so `next()` is cancel safe:
/// dropping it under a timeout loses nothing, and the next call picks up
/// where the last one stopped.
#[derive(Debug)]
pub struct FrameReader {
    direction: Direction,
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new(direction: Direction) -> Self {
        FrameReader {
            direction,
            buffer: Vec::new(),
        }
    }

    /// Read the next frame. Returns `Ok(None)` if the peer closed the
    /// connection cleanly between frames.
    pub async fn next<R>(&mut self, reader: &mut R) -> Result<Option<Packet>, RconError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(packet) = self.pop()? {
                return Ok(Some(packet));
            }
            let read = reader
                .read(&mut chunk)
                .await
                .map_err(RconError::ReceiveError)?;
            if read == 0 {
                return self.finish();
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Take one complete frame off the buffer, if there is one.
    fn pop(&mut self) -> Result<Option<Packet>, RconError> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let declared = read_i32(&self.buffer, 0);
        if !(Packet::BASE_PACKET_SIZE..=MAX_INBOUND_SIZE).contains(&declared) {
            return Err(RconError::MalformedPacketHeader);
        }
        let total = declared as usize + 4;
        if self.buffer.len() < total {
            return Ok(None);
        }
        let frame: Vec<u8> = self.buffer.drain(..total).collect();
        Packet::unpack(&frame, self.direction).map(Some)
    }

    // the peer hung up; whatever is left is a frame cut short
    fn finish(&self) -> Result<Option<Packet>, RconError> {
        match self.buffer.len() {
            0 => Ok(None),
            1..=3 => Err(RconError::MalformedPacketHeader),
            _ => Packet::unpack(&self.buffer, self.direction).map(Some),
        }
    }
}

/// Write one frame to the stream and flush it.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), RconError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&packet.pack())
        .await
        .map_err(RconError::SendError)?;
    writer.flush().await.map_err(RconError::SendError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_layout_matches_wire_format() {
        let packet = Packet::new(0, PacketType::Auth, "secret");
        let bytes = packet.pack();

        assert_eq!(bytes.len(), 14 + "secret".len());
        assert_eq!(&bytes[0..4], &16i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &3i32.to_le_bytes());
        assert_eq!(&bytes[12..18], b"secret");
        assert_eq!(&bytes[18..], &[0, 0]);
    }

    #[test]
    fn size_field_never_counts_itself() {
        for body in ["", "a", "give wood 10000", "ünïcødé"] {
            let bytes = Packet::new(0, PacketType::Exec, body).pack();
            let size = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            assert_eq!(size as usize, 10 + body.len());
            assert_eq!(bytes.len(), size as usize + 4);
        }
    }

    #[test]
    fn unpack_keeps_body_and_size() {
        let body = "say hi\0with a null";
        let bytes = Packet::new(7, PacketType::Exec, body).pack();
        let packet = Packet::unpack(&bytes, Direction::Serverbound).unwrap();

        assert_eq!(packet.body(), body);
        assert_eq!(packet.size() as usize, 10 + body.len());
        assert_eq!(packet.id(), 7);
        assert_eq!(packet.packet_type(), PacketType::Exec);
    }

    #[test]
    fn empty_body_round_trips() {
        let bytes = Packet::new(0, PacketType::Response, "").pack();
        let packet = Packet::unpack(&bytes, Direction::Clientbound).unwrap();
        assert_eq!(packet.body(), "");
        assert_eq!(packet.size(), 10);
    }

    #[test]
    fn type_two_depends_on_direction() {
        let bytes = Packet::new(0, PacketType::Exec, "").pack();
        let from_server = Packet::unpack(&bytes, Direction::Clientbound).unwrap();
        assert_eq!(from_server.packet_type(), PacketType::AuthResponse);
    }

    #[test]
    fn rejects_declared_size_larger_than_buffer() {
        let mut bytes = Packet::new(0, PacketType::Response, "hello").pack();
        bytes[0..4].copy_from_slice(&100i32.to_le_bytes());

        match Packet::unpack(&bytes, Direction::Clientbound) {
            Err(RconError::SizeMismatch { declared, available }) => {
                assert_eq!(declared, 100);
                assert_eq!(available, 15);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn rejects_short_and_undersized_headers() {
        assert!(matches!(
            Packet::unpack(&[1, 0], Direction::Clientbound),
            Err(RconError::MalformedPacketHeader)
        ));

        let mut bytes = Packet::new(0, PacketType::Response, "").pack();
        bytes[0..4].copy_from_slice(&4i32.to_le_bytes());
        assert!(matches!(
            Packet::unpack(&bytes, Direction::Clientbound),
            Err(RconError::MalformedPacketHeader)
        ));
    }

    #[test]
    fn rejects_unknown_type_codes() {
        let mut bytes = Packet::new(0, PacketType::Response, "").pack();
        bytes[8..12].copy_from_slice(&9i32.to_le_bytes());
        assert!(matches!(
            Packet::unpack(&bytes, Direction::Clientbound),
            Err(RconError::UnknownPacketType(9))
        ));

        // the server never sends an auth request
        let bytes = Packet::new(0, PacketType::Auth, "").pack();
        assert!(matches!(
            Packet::unpack(&bytes, Direction::Clientbound),
            Err(RconError::UnknownPacketType(3))
        ));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut bytes = Packet::new(0, PacketType::Response, "ok").pack();
        let last = bytes.len() - 1;
        bytes[last] = b'!';
        assert!(matches!(
            Packet::unpack(&bytes, Direction::Clientbound),
            Err(RconError::MissingTerminator)
        ));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut bytes = Packet::new(0, PacketType::Response, "ab").pack();
        bytes[12] = 0xff;
        assert!(matches!(
            Packet::unpack(&bytes, Direction::Clientbound),
            Err(RconError::MalformedPacketBody(_))
        ));
    }

    #[tokio::test]
    async fn reads_consecutive_frames_from_a_stream() {
        let mut wire = Packet::new(1, PacketType::Response, "").pack();
        wire.extend(Packet::new(1, PacketType::AuthResponse, "").pack());
        let mut reader = wire.as_slice();
        let mut frames = FrameReader::new(Direction::Clientbound);

        let first = frames.next(&mut reader).await.unwrap();
        let second = frames.next(&mut reader).await.unwrap();
        let end = frames.next(&mut reader).await.unwrap();

        assert_eq!(first.map(|p| p.packet_type()), Some(PacketType::Response));
        assert_eq!(second.map(|p| p.packet_type()), Some(PacketType::AuthResponse));
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn truncated_frame_on_stream_is_a_size_mismatch() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&100i32.to_le_bytes());
        wire.extend_from_slice(&0i32.to_le_bytes());
        wire.extend_from_slice(&0i32.to_le_bytes());
        let mut reader = wire.as_slice();

        let result = FrameReader::new(Direction::Clientbound)
            .next(&mut reader)
            .await;
        assert!(matches!(
            result,
            Err(RconError::SizeMismatch { declared: 100, available: 8 })
        ));
    }

    #[tokio::test]
    async fn absurd_size_field_is_rejected_before_allocating() {
        let wire = i32::MAX.to_le_bytes();
        let mut reader = &wire[..];
        assert!(matches!(
            FrameReader::new(Direction::Clientbound).next(&mut reader).await,
            Err(RconError::MalformedPacketHeader)
        ));
    }

    #[tokio::test]
    async fn frame_split_across_reads_is_reassembled() {
        let wire = Packet::new(0, PacketType::Response, "split me").pack();
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut frames = FrameReader::new(Direction::Clientbound);

        for byte in &wire[..wire.len() - 1] {
            tx.write_all(&[*byte]).await.unwrap();
        }
        tx.write_all(&wire[wire.len() - 1..]).await.unwrap();

        let packet = frames.next(&mut rx).await.unwrap().unwrap();
        assert_eq!(packet.body(), "split me");
    }

    #[tokio::test]
    async fn timed_out_read_keeps_partial_frame() {
        let wire = Packet::new(0, PacketType::AuthResponse, "").pack();
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut frames = FrameReader::new(Direction::Clientbound);

        // half a header, then the reader gives up
        tx.write_all(&wire[..6]).await.unwrap();
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            frames.next(&mut rx),
        )
        .await;
        assert!(waited.is_err());

        tx.write_all(&wire[6..]).await.unwrap();
        let packet = frames.next(&mut rx).await.unwrap().unwrap();
        assert_eq!(packet.packet_type(), PacketType::AuthResponse);
        assert_eq!(packet.id(), 0);
    }

    #[tokio::test]
    async fn write_packet_emits_the_packed_frame() {
        let packet = Packet::new(0, PacketType::Exec, "status");
        let mut out = Vec::new();
        write_packet(&mut out, &packet).await.unwrap();
        assert_eq!(out, packet.pack());
    }
}
