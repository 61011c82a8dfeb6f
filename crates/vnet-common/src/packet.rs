// packet.rs — connectionless and sequenced packet framing
//
// Mirrors `LibSourceEngine/Packet.{h,cpp}`: connectionless packets are a
// `0xFFFFFFFF` header plus a one-character id and a positional payload;
// sequenced packets carry a CRC-checked header, optional choke/challenge
// fields, an optional reliable-channel block, and an unreliable tail.

use std::collections::HashMap;

use crate::bitstream::{BitPosition, BitReader, BitWriter, ReadableBits, WritableBits};
use crate::crc::{compress_checksum_to_u16, crc32_block};
use crate::error::{NetError, NetResult};
use crate::message::{Message, MESSAGE_ID_BITS};

/// The 4 bytes every connectionless packet starts with (`-1` as an i32).
pub const CONNECTIONLESS_HEADER: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AuthProtocol {
    AuthCertificate = 1,
    HashedCDKey = 2,
    Steam = 3,
}

impl AuthProtocol {
    fn from_i32(value: i32) -> NetResult<Self> {
        Ok(match value {
            1 => AuthProtocol::AuthCertificate,
            2 => AuthProtocol::HashedCDKey,
            3 => AuthProtocol::Steam,
            other => return Err(NetError::Decode(format!("unknown auth protocol {other}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetChallengePacket {
    pub challenge: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectPacket {
    pub protocol_version: i32,
    pub auth_protocol: AuthProtocol,
    pub server_challenge: i32,
    pub client_challenge: i32,
    pub client_name: String,
    pub password: String,
    pub version_string: String,
    pub steam_cookie: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChallengePacket {
    pub magic_version: i32,
    pub challenge: i32,
    pub client_challenge: i32,
    pub auth_protocol: AuthProtocol,
    pub steam_id: u64,
    pub is_secure: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPacket {
    pub challenge: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRejectPacket {
    pub challenge: i32,
    pub reason: String,
}

/// Every connectionless variant used by this core, tagged by its ASCII id.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionlessPacket {
    GetChallenge(GetChallengePacket),
    Connect(ConnectPacket),
    Challenge(ChallengePacket),
    Connection(ConnectionPacket),
    ConnectReject(ConnectRejectPacket),
}

impl ConnectionlessPacket {
    pub fn id(&self) -> u8 {
        match self {
            ConnectionlessPacket::GetChallenge(_) => b'q',
            ConnectionlessPacket::Connect(_) => b'k',
            ConnectionlessPacket::Challenge(_) => b'A',
            ConnectionlessPacket::Connection(_) => b'B',
            ConnectionlessPacket::ConnectReject(_) => b'9',
        }
    }

    pub fn encode(&self) -> NetResult<Vec<u8>> {
        let mut stream = BitWriter::new();
        stream.write_i32(CONNECTIONLESS_HEADER)?;
        stream.write_u8(self.id())?;
        match self {
            ConnectionlessPacket::GetChallenge(p) => stream.write_i32(p.challenge)?,
            ConnectionlessPacket::Connect(_) => {
                return Err(NetError::Unsupported("encoding Connect is not needed by the server".into()))
            }
            ConnectionlessPacket::Challenge(p) => {
                stream.write_i32(p.magic_version)?;
                stream.write_i32(p.challenge)?;
                stream.write_i32(p.client_challenge)?;
                stream.write_i32(p.auth_protocol as i32)?;
                stream.write_u16(0)?; // legacy Steam2 encryption key
                stream.write_bits(p.steam_id, 64)?;
                stream.write_u8(p.is_secure as u8)?;
            }
            ConnectionlessPacket::Connection(p) => stream.write_i32(p.challenge)?,
            ConnectionlessPacket::ConnectReject(p) => {
                stream.write_i32(p.challenge)?;
                stream.write_cstring(&p.reason)?;
            }
        }
        Ok(stream.into_bytes())
    }

    /// Decode a connectionless packet whose leading 4-byte header has
    /// already been recognized as `CONNECTIONLESS_HEADER`.
    pub fn decode(bytes: &[u8]) -> NetResult<ConnectionlessPacket> {
        let mut stream = BitReader::new(bytes);
        let header = stream.read_i32()?;
        if header != CONNECTIONLESS_HEADER {
            return Err(NetError::Decode("not a connectionless packet".into()));
        }
        let id = stream.read_u8()?;
        Ok(match id {
            b'q' => ConnectionlessPacket::GetChallenge(GetChallengePacket { challenge: stream.read_i32()? }),
            b'k' => {
                let protocol_version = stream.read_i32()?;
                let auth_protocol = AuthProtocol::from_i32(stream.read_i32()?)?;
                if auth_protocol != AuthProtocol::Steam {
                    return Err(NetError::Unsupported("only Steam auth protocol is supported".into()));
                }
                let server_challenge = stream.read_i32()?;
                let client_challenge = stream.read_i32()?;
                let client_name = stream.read_cstring()?;
                let password = stream.read_cstring()?;
                let version_string = stream.read_cstring()?;
                let steam_cookie_len = stream.read_u16()? as usize;
                let steam_cookie = stream.read_bytes(steam_cookie_len)?;
                ConnectionlessPacket::Connect(ConnectPacket {
                    protocol_version,
                    auth_protocol,
                    server_challenge,
                    client_challenge,
                    client_name,
                    password,
                    version_string,
                    steam_cookie,
                })
            }
            other => return Err(NetError::Decode(format!("unknown connectionless packet id {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Normal = 0,
    File = 1,
}

const PACKET_FLAG_RELIABLE: u8 = 1 << 0;
const PACKET_FLAG_CHOKED: u8 = 1 << 4;
const PACKET_FLAG_CHALLENGE: u8 = 1 << 5;
const PACKET_FLAG_PAD_SHIFT: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData {
    pub subchannel: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivingPacket {
    pub sequence: i32,
    pub sequence_ack: i32,
    pub reliable_state: u8,
    pub choked_count: Option<u8>,
    pub challenge: Option<i32>,
    pub channel_data: HashMap<Channel, ChannelData>,
    pub unreliable_data: Vec<u8>,
}

impl ReceivingPacket {
    pub fn read(bytes: &[u8]) -> NetResult<ReceivingPacket> {
        let mut stream = BitReader::new(bytes);

        let sequence = stream.read_i32()?;
        let sequence_ack = stream.read_i32()?;
        let flags = stream.read_u8()?;
        let checksum = stream.read_u16()?;

        let bytes_to_checksum = stream.remaining_bytes();
        let calculated = compress_checksum_to_u16(crc32_block(bytes_to_checksum));
        if calculated != checksum {
            return Err(NetError::ChecksumMismatch);
        }

        let reliable_state = stream.read_u8()?;

        let choked_count = if flags & PACKET_FLAG_CHOKED != 0 { Some(stream.read_u8()?) } else { None };
        let challenge = if flags & PACKET_FLAG_CHALLENGE != 0 { Some(stream.read_i32()?) } else { None };

        let mut channel_data = HashMap::new();
        if flags & PACKET_FLAG_RELIABLE != 0 {
            let subchannel = stream.read_u8_bits(3)?;
            for channel in [Channel::Normal, Channel::File] {
                if stream.read_bool()? {
                    let is_fragmented = stream.read_bool()?;
                    if is_fragmented {
                        return Err(NetError::Unsupported("fragmented channel data".into()));
                    }
                    let is_compressed = stream.read_bool()?;
                    if is_compressed {
                        return Err(NetError::Unsupported("compressed channel data".into()));
                    }
                    let data_size = stream.read_varint32()? as usize;
                    let data = stream.read_bytes(data_size)?;
                    channel_data.insert(channel, ChannelData { subchannel, data });
                }
            }
        }

        let unreliable_position = stream.position();
        let consumed_bytes = (unreliable_position >> 3) + if unreliable_position % 8 == 0 { 0 } else { 1 };
        let remaining = stream.len_bytes() - consumed_bytes;
        let unreliable_data = stream.read_bytes(remaining)?;

        Ok(ReceivingPacket {
            sequence,
            sequence_ack,
            reliable_state,
            choked_count,
            challenge,
            channel_data,
            unreliable_data,
        })
    }
}

/// Decode a flat byte stream of back-to-back messages (a channel's data or
/// the unreliable tail) into a list of messages.
pub fn decode_message_stream(bytes: &[u8]) -> NetResult<Vec<Message>> {
    let mut stream = BitReader::new(bytes);
    let mut messages = Vec::new();
    let total_bits = bytes.len() * 8;
    while stream.position() + MESSAGE_ID_BITS as usize <= total_bits {
        let id = stream.read_u8_bits(MESSAGE_ID_BITS)?;
        messages.push(Message::decode(id, &mut stream)?);
    }
    Ok(messages)
}

#[derive(Debug, Clone, Default)]
pub struct SendingPacket {
    pub sequence: i32,
    pub sequence_ack: i32,
    pub choked_count: Option<u8>,
    pub challenge: Option<i32>,
    pub reliable_messages: Vec<Message>,
    pub unreliable_messages: Vec<Message>,
}

impl SendingPacket {
    pub fn write(&self) -> NetResult<Vec<u8>> {
        let mut stream = BitWriter::new();
        stream.write_i32(self.sequence)?;
        stream.write_i32(self.sequence_ack)?;

        let mut flags: u8 = 0;
        if self.challenge.is_some() {
            flags |= PACKET_FLAG_CHALLENGE;
        }
        if self.choked_count.is_some() {
            flags |= PACKET_FLAG_CHOKED;
        }
        let is_reliable = !self.reliable_messages.is_empty();
        if is_reliable {
            flags |= PACKET_FLAG_RELIABLE;
        }

        let flags_position = stream.position();
        stream.write_u8(flags)?;
        let checksum_position = stream.position();
        stream.write_u16(0)?;
        let checksum_from_position = stream.position();

        stream.write_u8(0)?; // reliable state

        if let Some(choked) = self.choked_count {
            stream.write_u8(choked)?;
        }
        if let Some(challenge) = self.challenge {
            stream.write_i32(challenge)?;
        }

        if is_reliable {
            // Subchannel index: there are 8; this core always uses 0.
            stream.write_u8_bits(0, 3)?;
            for channel in [Channel::Normal, Channel::File] {
                if channel == Channel::Normal {
                    stream.write_bool(true)?;
                    stream.write_bool(false)?; // not fragmented
                    stream.write_bool(false)?; // not compressed
                    let mut payload = BitWriter::new();
                    for message in &self.reliable_messages {
                        message.encode(&mut payload)?;
                    }
                    let payload_bytes = payload.into_bytes();
                    stream.write_varint32(payload_bytes.len() as u32)?;
                    stream.write_bytes(&payload_bytes)?;
                } else {
                    stream.write_bool(false)?;
                }
            }
        }

        for message in &self.unreliable_messages {
            message.encode(&mut stream)?;
        }

        let additional_bits = stream.position() % 8;
        let mut flags_with_pad = flags;
        if additional_bits > 0 {
            let bits_to_pad = 8 - additional_bits;
            flags_with_pad |= ((bits_to_pad as u8) << PACKET_FLAG_PAD_SHIFT) & 0xFF;
            stream.write_bits(0, bits_to_pad as u32)?;
        }

        let end_position = stream.position();

        stream.set_position(flags_position)?;
        stream.write_u8(flags_with_pad)?;
        stream.set_position(end_position)?;

        let checksum = crc32_block(&stream.bytes()[checksum_from_position >> 3..]);
        let compressed_checksum = compress_checksum_to_u16(checksum);
        stream.set_position(checksum_position)?;
        stream.write_u16(compressed_checksum)?;
        stream.set_position(end_position)?;

        Ok(stream.into_bytes())
    }
}
