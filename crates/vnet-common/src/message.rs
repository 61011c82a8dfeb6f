// message.rs — the control-message catalog
//
// A closed tagged variant over the message ids the handshake needs,
// mirroring `LibSourceEngine/Message.h` and its `Messages/*.h` siblings.
// Every message starts with a 6-bit id; the payload that follows is
// positional, not self-describing.

use crate::bitstream::{ReadableBits, WritableBits};
use crate::error::{NetError, NetResult};

pub const MESSAGE_ID_BITS: u32 = 6;
const USER_MESSAGE_SIZE_BITS: u32 = 11;
const CREATE_STRING_TABLE_MAX_ENTRIES: u16 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOnState {
    None = 0,
    Challenge = 1,
    Connected = 2,
    New = 3,
    PreSpawn = 4,
    Spawn = 5,
    Full = 6,
    ChangeLevel = 7,
}

impl SignOnState {
    fn from_u8(value: u8) -> NetResult<Self> {
        Ok(match value {
            0 => SignOnState::None,
            1 => SignOnState::Challenge,
            2 => SignOnState::Connected,
            3 => SignOnState::New,
            4 => SignOnState::PreSpawn,
            5 => SignOnState::Spawn,
            6 => SignOnState::Full,
            7 => SignOnState::ChangeLevel,
            other => return Err(NetError::Decode(format!("unknown sign-on state {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondConVarResponse {
    Success = 0,
    NotFound = 1,
    NotAConVar = 2,
    CannotQuery = 3,
}

impl RespondConVarResponse {
    fn from_u8(value: u8) -> NetResult<Self> {
        Ok(match value {
            0 => RespondConVarResponse::Success,
            1 => RespondConVarResponse::NotFound,
            2 => RespondConVarResponse::NotAConVar,
            3 => RespondConVarResponse::CannotQuery,
            other => return Err(NetError::Decode(format!("unknown convar response {other}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub protocol: i16,
    pub server_count: i32,
    pub is_hltv: bool,
    pub is_dedicated: bool,
    pub max_classes: u16,
    pub map_md5: [u8; 16],
    pub player_slot: u8,
    pub max_clients: u8,
    pub tick_interval: f32,
    pub operating_system: i8,
    pub game_dir: String,
    pub map_name: String,
    pub sky_name: String,
    pub host_name: String,
    pub is_replay: bool,
}

/// client.dll CRC: a legacy field from before signed binaries / VAC; this
/// core writes a fixed sentinel and ignores it on read.
const SERVER_INFO_CLIENT_CRC_SENTINEL: i32 = 1337420;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub server_count: i32,
    pub send_table_crc: i32,
    pub is_hltv: bool,
    pub friends_id: i32,
    pub friends_name: String,
    pub custom_file_crc: [Option<u32>; 4],
    pub is_replay: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Nop,
    Disconnect { reason: String },
    Tick { tick: i32, host_frame_time: u16, host_frame_time_stddev: u16 },
    SetConVar { vars: Vec<(String, String)> },
    SignOnStateMsg { state: SignOnState, spawn_count: i32 },
    Print { text: String },
    ServerInfoMsg(ServerInfo),
    ClientInfoMsg(ClientInfo),
    CreateStringTable { name: String },
    RespondConVarValue { cookie: i32, response: RespondConVarResponse, name: String, value: String },
    UserMessage { payload: Vec<u8> },
    GetConVarValue { cookie: i32, name: String },
}

impl Message {
    pub fn id(&self) -> u8 {
        match self {
            Message::Nop => 0,
            Message::Disconnect { .. } => 1,
            Message::Tick { .. } => 3,
            Message::SetConVar { .. } => 5,
            Message::SignOnStateMsg { .. } => 6,
            Message::Print { .. } => 7,
            Message::ServerInfoMsg(_) | Message::ClientInfoMsg(_) => 8,
            Message::CreateStringTable { .. } => 12,
            Message::RespondConVarValue { .. } => 13,
            Message::UserMessage { .. } => 23,
            Message::GetConVarValue { .. } => 31,
        }
    }

    pub fn encode<W: WritableBits>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u8_bits(self.id(), MESSAGE_ID_BITS)?;
        match self {
            Message::Nop => {}
            Message::Disconnect { reason } => stream.write_cstring(reason)?,
            Message::Tick { tick, host_frame_time, host_frame_time_stddev } => {
                stream.write_i32(*tick)?;
                stream.write_u16(*host_frame_time)?;
                stream.write_u16(*host_frame_time_stddev)?;
            }
            Message::SetConVar { vars } => {
                if vars.len() > u8::MAX as usize {
                    return Err(NetError::Unsupported("too many convars in SetConVar".into()));
                }
                stream.write_u8(vars.len() as u8)?;
                for (key, value) in vars {
                    stream.write_cstring(key)?;
                    stream.write_cstring(value)?;
                }
            }
            Message::SignOnStateMsg { state, spawn_count } => {
                stream.write_u8(*state as u8)?;
                stream.write_i32(*spawn_count)?;
            }
            Message::Print { text } => {
                stream.write_cstring(&format!("{text}\n"))?;
            }
            Message::ServerInfoMsg(info) => encode_server_info(stream, info)?,
            Message::ClientInfoMsg(info) => encode_client_info(stream, info)?,
            Message::CreateStringTable { name } => {
                stream.write_cstring(name)?;
                stream.write_u16(CREATE_STRING_TABLE_MAX_ENTRIES)?;
                let entry_bits = (CREATE_STRING_TABLE_MAX_ENTRIES as u32).ilog2() + 1;
                stream.write_bits(0, entry_bits)?;
                stream.write_varint32(0)?;
                stream.write_bool(false)?;
                stream.write_bool(false)?;
            }
            Message::RespondConVarValue { cookie, response, name, value } => {
                stream.write_i32(*cookie)?;
                stream.write_u8_bits(*response as u8, 4)?;
                stream.write_cstring(name)?;
                stream.write_cstring(value)?;
            }
            Message::UserMessage { payload } => {
                let size_position = stream.position();
                stream.write_bits(0, USER_MESSAGE_SIZE_BITS)?;
                stream.write_bytes(payload)?;
                let after_position = stream.position();
                stream.set_position(size_position)?;
                let payload_bits = (after_position - size_position - USER_MESSAGE_SIZE_BITS as usize) as u64;
                stream.write_bits(payload_bits, USER_MESSAGE_SIZE_BITS)?;
                stream.set_position(after_position)?;
            }
            Message::GetConVarValue { cookie, name } => {
                stream.write_i32(*cookie)?;
                stream.write_cstring(name)?;
            }
        }
        Ok(())
    }

    /// Decode a message whose id has already been consumed from `stream`.
    /// `id` 8 is overloaded by direction: callers that only ever receive
    /// from clients (this core's server) decode it as `ClientInfoMsg`.
    pub fn decode<R: ReadableBits>(id: u8, stream: &mut R) -> NetResult<Message> {
        Ok(match id {
            0 => Message::Nop,
            1 => Message::Disconnect { reason: stream.read_cstring()? },
            3 => Message::Tick {
                tick: stream.read_i32()?,
                host_frame_time: stream.read_u16()?,
                host_frame_time_stddev: stream.read_u16()?,
            },
            5 => {
                let count = stream.read_u8()?;
                let mut vars = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let key = stream.read_cstring()?;
                    let value = stream.read_cstring()?;
                    vars.push((key, value));
                }
                Message::SetConVar { vars }
            }
            6 => Message::SignOnStateMsg {
                state: SignOnState::from_u8(stream.read_u8()?)?,
                spawn_count: stream.read_i32()?,
            },
            7 => Message::Print { text: stream.read_cstring()? },
            8 => Message::ClientInfoMsg(decode_client_info(stream)?),
            12 => return Err(NetError::Unsupported("CreateStringTable decode not implemented".into())),
            13 => Message::RespondConVarValue {
                cookie: stream.read_i32()?,
                response: RespondConVarResponse::from_u8(stream.read_u8_bits(4)?)?,
                name: stream.read_cstring()?,
                value: stream.read_cstring()?,
            },
            23 => {
                let size_bits = stream.read_bits(USER_MESSAGE_SIZE_BITS)? as usize;
                if size_bits % 8 != 0 {
                    return Err(NetError::Unsupported("non-byte-aligned user message payload".into()));
                }
                Message::UserMessage { payload: stream.read_bytes(size_bits / 8)? }
            }
            31 => Message::GetConVarValue { cookie: stream.read_i32()?, name: stream.read_cstring()? },
            other => return Err(NetError::Decode(format!("unknown message id {other}"))),
        })
    }
}

fn encode_server_info<W: WritableBits>(stream: &mut W, info: &ServerInfo) -> NetResult<()> {
    stream.write_bits(info.protocol as u16 as u64, 16)?;
    stream.write_i32(info.server_count)?;
    stream.write_bool(info.is_hltv)?;
    stream.write_bool(info.is_dedicated)?;
    stream.write_i32(SERVER_INFO_CLIENT_CRC_SENTINEL)?;
    stream.write_u16(info.max_classes)?;
    stream.write_bytes(&info.map_md5)?;
    stream.write_u8(info.player_slot)?;
    stream.write_u8(info.max_clients)?;
    stream.write_f32(info.tick_interval)?;
    stream.write_i8(info.operating_system)?;
    stream.write_cstring(&info.game_dir)?;
    stream.write_cstring(&info.map_name)?;
    stream.write_cstring(&info.sky_name)?;
    stream.write_cstring(&info.host_name)?;
    stream.write_bool(info.is_replay)?;
    Ok(())
}

#[allow(dead_code)]
fn decode_server_info<R: ReadableBits>(stream: &mut R) -> NetResult<ServerInfo> {
    let protocol = stream.read_bits(16)? as u16 as i16;
    let server_count = stream.read_i32()?;
    let is_hltv = stream.read_bool()?;
    let is_dedicated = stream.read_bool()?;
    let _client_crc = stream.read_i32()?;
    let max_classes = stream.read_u16()?;
    let mut map_md5 = [0u8; 16];
    map_md5.copy_from_slice(&stream.read_bytes(16)?);
    let player_slot = stream.read_u8()?;
    let max_clients = stream.read_u8()?;
    let tick_interval = stream.read_f32()?;
    let operating_system = stream.read_i8()?;
    let game_dir = stream.read_cstring()?;
    let map_name = stream.read_cstring()?;
    let sky_name = stream.read_cstring()?;
    let host_name = stream.read_cstring()?;
    let is_replay = stream.read_bool()?;
    Ok(ServerInfo {
        protocol,
        server_count,
        is_hltv,
        is_dedicated,
        max_classes,
        map_md5,
        player_slot,
        max_clients,
        tick_interval,
        operating_system,
        game_dir,
        map_name,
        sky_name,
        host_name,
        is_replay,
    })
}

fn encode_client_info<W: WritableBits>(stream: &mut W, info: &ClientInfo) -> NetResult<()> {
    stream.write_i32(info.server_count)?;
    stream.write_i32(info.send_table_crc)?;
    stream.write_bool(info.is_hltv)?;
    stream.write_i32(info.friends_id)?;
    stream.write_cstring(&info.friends_name)?;
    for crc in info.custom_file_crc {
        match crc {
            Some(value) => {
                stream.write_bool(true)?;
                stream.write_u32(value)?;
            }
            None => stream.write_bool(false)?,
        }
    }
    stream.write_bool(info.is_replay)?;
    Ok(())
}

fn decode_client_info<R: ReadableBits>(stream: &mut R) -> NetResult<ClientInfo> {
    let server_count = stream.read_i32()?;
    let send_table_crc = stream.read_i32()?;
    let is_hltv = stream.read_bool()?;
    let friends_id = stream.read_i32()?;
    let friends_name = stream.read_cstring()?;
    let mut custom_file_crc = [None; 4];
    for slot in custom_file_crc.iter_mut() {
        if stream.read_bool()? {
            *slot = Some(stream.read_u32()?);
        }
    }
    let is_replay = stream.read_bool()?;
    Ok(ClientInfo { server_count, send_table_crc, is_hltv, friends_id, friends_name, custom_file_crc, is_replay })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitReader, BitWriter};

    fn round_trip(msg: &Message) -> Message {
        let mut w = BitWriter::new();
        msg.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let id = r.read_u8_bits(MESSAGE_ID_BITS).unwrap();
        Message::decode(id, &mut r).unwrap()
    }

    // === per-message round-trip === //

    #[test]
    fn nop_round_trips() {
        assert_eq!(round_trip(&Message::Nop), Message::Nop);
    }

    #[test]
    fn disconnect_round_trips() {
        let msg = Message::Disconnect { reason: "bye".into() };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn tick_round_trips() {
        let msg = Message::Tick { tick: 12345, host_frame_time: 16, host_frame_time_stddev: 2 };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn set_con_var_round_trips() {
        let msg = Message::SetConVar { vars: vec![("sv_cheats".into(), "0".into())] };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn sign_on_state_round_trips() {
        let msg = Message::SignOnStateMsg { state: SignOnState::Connected, spawn_count: 0 };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn print_appends_newline() {
        let mut w = BitWriter::new();
        Message::Print { text: "hi".into() }.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let id = r.read_u8_bits(MESSAGE_ID_BITS).unwrap();
        match Message::decode(id, &mut r).unwrap() {
            Message::Print { text } => assert_eq!(text, "hi\n"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn respond_con_var_value_round_trips() {
        let msg = Message::RespondConVarValue {
            cookie: 7,
            response: RespondConVarResponse::NotFound,
            name: "sv_gravity".into(),
            value: "".into(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn get_con_var_value_round_trips() {
        let msg = Message::GetConVarValue { cookie: 3, name: "mp_timelimit".into() };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn user_message_round_trips_and_frames_size() {
        let msg = Message::UserMessage { payload: vec![1, 2, 3, 4] };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn server_info_round_trips() {
        let info = ServerInfo {
            protocol: 24,
            server_count: 1,
            is_hltv: false,
            is_dedicated: true,
            max_classes: 256,
            map_md5: [0x42; 16],
            player_slot: 1,
            max_clients: 16,
            tick_interval: 1.0 / 66.0,
            operating_system: b'l' as i8,
            game_dir: "tf".into(),
            map_name: "ctf_2fort".into(),
            sky_name: "sky_day01_01".into(),
            host_name: "test server".into(),
            is_replay: false,
        };
        let mut w = BitWriter::new();
        encode_server_info(&mut w, &info).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let decoded = decode_server_info(&mut r).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn client_info_round_trips_through_message_decode() {
        let info = ClientInfo {
            server_count: 5,
            send_table_crc: -42,
            is_hltv: false,
            friends_id: 0,
            friends_name: String::new(),
            custom_file_crc: [Some(1), None, Some(3), None],
            is_replay: false,
        };
        let mut w = BitWriter::new();
        Message::ClientInfoMsg(info.clone()).encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let id = r.read_u8_bits(MESSAGE_ID_BITS).unwrap();
        assert_eq!(id, 8);
        match Message::decode(id, &mut r).unwrap() {
            Message::ClientInfoMsg(decoded) => assert_eq!(decoded, info),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_id_is_decode_error() {
        let mut r = BitReader::new(&[]);
        assert!(matches!(Message::decode(63, &mut r), Err(NetError::Decode(_))));
    }
}
