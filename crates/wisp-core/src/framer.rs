//! Encode/decode the four Wisp packet types. Packets are little-endian; the
//! common header is five bytes: `type:u8, stream_id:u32`.

/// Number of slots in a stream's inbound queue. CONTINUE credit and the
/// initial session-wide handshake both advertise this value.
pub const QUEUE_CAPACITY: u32 = 128;

const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WispPacketType {
  Connect,
  Data,
  Continue,
  Close,
  /// Any type byte the server doesn't recognize. The session silently
  /// ignores these rather than treating them as a decode failure.
  Unknown(u8),
}

impl WispPacketType {
  fn from_byte(b: u8) -> Self {
    match b {
      0x01 => WispPacketType::Connect,
      0x02 => WispPacketType::Data,
      0x03 => WispPacketType::Continue,
      0x04 => WispPacketType::Close,
      other => WispPacketType::Unknown(other),
    }
  }

  fn to_byte(self) -> u8 {
    match self {
      WispPacketType::Connect => 0x01,
      WispPacketType::Data => 0x02,
      WispPacketType::Continue => 0x03,
      WispPacketType::Close => 0x04,
      WispPacketType::Unknown(b) => b,
    }
  }
}

/// CLOSE reason codes the server emits. Any `u8` is accepted from the client
/// (see `Other`), but the server only ever emits these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
  NormalClosure,
  RemoteReadError,
  StreamTypeUnsupported,
  ConnectionFailed,
  RateLimited,
  Other(u8),
}

impl CloseReason {
  pub fn code(self) -> u8 {
    match self {
      CloseReason::NormalClosure => 0x02,
      CloseReason::RemoteReadError => 0x03,
      CloseReason::StreamTypeUnsupported => 0x41,
      CloseReason::ConnectionFailed => 0x42,
      CloseReason::RateLimited => 0x49,
      CloseReason::Other(b) => b,
    }
  }

  pub fn from_code(b: u8) -> Self {
    match b {
      0x02 => CloseReason::NormalClosure,
      0x03 => CloseReason::RemoteReadError,
      0x41 => CloseReason::StreamTypeUnsupported,
      0x42 => CloseReason::ConnectionFailed,
      0x49 => CloseReason::RateLimited,
      other => CloseReason::Other(other),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
  Tcp,
  Udp,
}

impl StreamType {
  pub fn from_byte(b: u8) -> Option<Self> {
    match b {
      0x01 => Some(StreamType::Tcp),
      0x02 => Some(StreamType::Udp),
      _ => None,
    }
  }

  pub fn to_byte(self) -> u8 {
    match self {
      StreamType::Tcp => 0x01,
      StreamType::Udp => 0x02,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPayload {
  pub stream_type_raw: u8,
  pub dest_port: u16,
  pub hostname: String,
}

/// Decode a CONNECT payload (`stream_type:u8, dest_port:u16,
/// hostname:utf-8 bytes`). `None` on a malformed (too-short or non-UTF8)
/// payload — treated the same as a `ProtocolDecode` error by callers.
pub fn parse_connect(payload: &[u8]) -> Option<ConnectPayload> {
  if payload.len() < 3 {
    return None;
  }
  let stream_type_raw = payload[0];
  let dest_port = u16::from_le_bytes([payload[1], payload[2]]);
  let hostname = std::str::from_utf8(&payload[3..]).ok()?.to_string();
  Some(ConnectPayload {
    stream_type_raw,
    dest_port,
    hostname,
  })
}

/// Decode a common-header frame into `(type, stream_id, payload)` without
/// copying the payload. Rejects frames shorter than 5 bytes.
pub fn decode(frame: &[u8]) -> Option<(WispPacketType, u32, &[u8])> {
  if frame.len() < HEADER_LEN {
    return None;
  }
  let ptype = WispPacketType::from_byte(frame[0]);
  let stream_id = u32::from_le_bytes([frame[1], frame[2], frame[3], frame[4]]);
  Some((ptype, stream_id, &frame[HEADER_LEN..]))
}

fn encode(ptype: WispPacketType, stream_id: u32, payload: &[u8]) -> Vec<u8> {
  let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
  buf.push(ptype.to_byte());
  buf.extend_from_slice(&stream_id.to_le_bytes());
  buf.extend_from_slice(payload);
  buf
}

pub fn encode_connect(stream_id: u32, stream_type: StreamType, port: u16, hostname: &str) -> Vec<u8> {
  let mut payload = Vec::with_capacity(3 + hostname.len());
  payload.push(stream_type.to_byte());
  payload.extend_from_slice(&port.to_le_bytes());
  payload.extend_from_slice(hostname.as_bytes());
  encode(WispPacketType::Connect, stream_id, &payload)
}

pub fn encode_data(stream_id: u32, data: &[u8]) -> Vec<u8> {
  encode(WispPacketType::Data, stream_id, data)
}

pub fn encode_continue(stream_id: u32, buffer_remaining: u32) -> Vec<u8> {
  encode(WispPacketType::Continue, stream_id, &buffer_remaining.to_le_bytes())
}

pub fn encode_close(stream_id: u32, reason: CloseReason) -> Vec<u8> {
  encode(WispPacketType::Close, stream_id, &[reason.code()])
}
