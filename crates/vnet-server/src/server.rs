// server.rs — the UDP reactor
//
// Grounded on `Server/Server.cpp`'s `exec()`/`tick()`/`receive()`/
// `disconnect()`/`try_or_disconnect()`: a single-threaded loop that binds
// one socket, dispatches each datagram as either connectionless or
// sequenced, and ticks at a fixed rate in between.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use vnet_common::addr::PeerKey;
use vnet_common::client::{Client, ClientTable};
use vnet_common::error::{NetError, NetResult};
use vnet_common::message::{ClientInfo, Message, ServerInfo, SignOnState};
use vnet_common::packet::{
    decode_message_stream, AuthProtocol, Channel, ChallengePacket, ConnectPacket, ConnectRejectPacket,
    ConnectionPacket, ConnectionlessPacket, GetChallengePacket, ReceivingPacket, SendingPacket, CONNECTIONLESS_HEADER,
};

use crate::config::Config;

/// `challenge_magic_version` from `Server.h`: stamped into every
/// `Challenge` reply so old clients can reject a server they don't speak
/// the wire format of.
const CHALLENGE_MAGIC_VERSION: i32 = 0x5A4F4933u32 as i32;
/// `bytes_to_receive` from `Server.h`.
const RECEIVE_BUFFER_SIZE: usize = 2 * 1024;
const HANDSHAKE_PROTOCOL: i16 = 24;
const HANDSHAKE_GAME_DIR: &str = "hl2";
const HANDSHAKE_SKY_NAME: &str = "sky_day01_01";
const HANDSHAKE_HOST_NAME: &str = "vnet server";
const HANDSHAKE_MAX_CLASSES: u16 = 256;
const HANDSHAKE_MAX_CLIENTS: u8 = 16;

pub struct Server {
    socket: UdpSocket,
    clients: ClientTable,
    map_name: String,
    map_md5: [u8; 16],
    tick_interval: Duration,
    show_errors_to_clients: bool,
}

impl Server {
    pub fn bind(config: &Config, map_md5: [u8; 16]) -> NetResult<Server> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port))?;
        Ok(Server {
            socket,
            clients: ClientTable::new(),
            map_name: config.map_name.clone(),
            map_md5,
            tick_interval: Duration::from_secs_f64(1.0 / config.tick_rate_hz),
            show_errors_to_clients: config.show_errors_to_clients,
        })
    }

    /// Drive the receive/dispatch/tick loop forever. Returns only on an
    /// unrecoverable socket error.
    pub fn run(&mut self) -> NetResult<()> {
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        let mut next_tick = Instant::now() + self.tick_interval;

        loop {
            let remaining = next_tick.saturating_duration_since(Instant::now());
            self.socket.set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;

            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    println!("received {len} bytes from {from}");
                    self.try_or_disconnect(from, &buf[..len]);
                }
                Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
                Err(e) => return Err(NetError::from(e)),
            }

            if Instant::now() >= next_tick {
                self.tick();
                next_tick = next_tick_after(next_tick, self.tick_interval);
            }

            self.clients.flush_removals();
        }
    }

    /// Called once per fixed interval. There is no game simulation in this
    /// core, so the only work is noticing and logging an overrun.
    fn tick(&mut self) {
        let began = Instant::now();
        // No per-tick game state to advance; this core only drives the
        // handshake, which is entirely receive-driven.
        let elapsed = began.elapsed();
        if elapsed > self.tick_interval {
            eprintln!("tick overran budget by {:?}", elapsed - self.tick_interval);
        }
    }

    fn try_or_disconnect(&mut self, from: SocketAddr, datagram: &[u8]) {
        if let Err(err) = self.dispatch(from, datagram) {
            eprintln!("error handling datagram from {from}: {err}");
            let reason =
                if self.show_errors_to_clients { err.to_string() } else { "disconnected due to an error".to_string() };
            if let Err(disconnect_err) = self.disconnect(from, reason) {
                eprintln!("failed to notify {from} of disconnect: {disconnect_err}");
            }
        }
    }

    fn dispatch(&mut self, from: SocketAddr, datagram: &[u8]) -> NetResult<()> {
        if datagram.len() < 4 {
            return Err(NetError::Decode("datagram shorter than a packet header".into()));
        }
        let header = i32::from_le_bytes(datagram[0..4].try_into().unwrap());
        if header == CONNECTIONLESS_HEADER {
            self.dispatch_connectionless(from, datagram)
        } else {
            self.dispatch_sequenced(from, datagram)
        }
    }

    fn dispatch_connectionless(&mut self, from: SocketAddr, datagram: &[u8]) -> NetResult<()> {
        let packet = ConnectionlessPacket::decode(datagram)?;
        println!("dispatching connectionless id {} from {from}", packet.id() as char);
        match packet {
            ConnectionlessPacket::GetChallenge(packet) => self.handle_get_challenge(from, packet),
            ConnectionlessPacket::Connect(packet) => self.handle_connect(from, packet),
            other => Err(NetError::Unsupported(format!("server never receives {:?}", other))),
        }
    }

    fn handle_get_challenge(&mut self, from: SocketAddr, request: GetChallengePacket) -> NetResult<()> {
        let key = PeerKey::from_socket_addr(from);
        let server_challenge: i32 = rand::random();
        self.clients.insert_new(key, Client::new(request.challenge, server_challenge))?;

        let reply = ConnectionlessPacket::Challenge(ChallengePacket {
            magic_version: CHALLENGE_MAGIC_VERSION,
            challenge: server_challenge,
            client_challenge: request.challenge,
            auth_protocol: AuthProtocol::Steam,
            steam_id: rand::random(),
            is_secure: false,
        });
        self.send_connectionless(&reply, from)
    }

    fn handle_connect(&mut self, from: SocketAddr, request: ConnectPacket) -> NetResult<()> {
        let key = PeerKey::from_socket_addr(from);
        let client = self
            .clients
            .get(key)
            .ok_or_else(|| NetError::Protocol("Client tried to connect without asking for a challenge".into()))?;

        if request.server_challenge != client.server_challenge {
            return Err(NetError::Protocol("Connect echoed the wrong server challenge".into()));
        }

        let reply = ConnectionlessPacket::Connection(ConnectionPacket { challenge: client.client_challenge });
        self.send_connectionless(&reply, from)
    }

    fn dispatch_sequenced(&mut self, from: SocketAddr, datagram: &[u8]) -> NetResult<()> {
        let received = ReceivingPacket::read(datagram)?;

        if let Some(normal) = received.channel_data.get(&Channel::Normal) {
            for message in decode_message_stream(&normal.data)? {
                self.handle_message(from, message)?;
            }
        }
        for message in decode_message_stream(&received.unreliable_data)? {
            self.handle_message(from, message)?;
        }
        Ok(())
    }

    fn handle_message(&mut self, from: SocketAddr, message: Message) -> NetResult<()> {
        let key = PeerKey::from_socket_addr(from);
        match message {
            Message::Disconnect { reason } => {
                println!("{from} disconnected: {reason}");
                self.clients.schedule_removal(key);
            }
            Message::SignOnStateMsg { state: SignOnState::Connected, .. } => {
                println!("{from} sign-on state -> Connected");
                self.send_handshake_burst(from)?;
            }
            // Only [absent] -> Challenge -> Connected -> New is driven by
            // this core; later states are observed, not advanced.
            Message::SignOnStateMsg { .. } => {}
            Message::ClientInfoMsg(info) => self.handle_client_info(from, info),
            Message::Nop | Message::SetConVar { .. } | Message::GetConVarValue { .. } | Message::Tick { .. } => {
                // Game-state concerns this core doesn't model; acknowledged
                // implicitly by not disconnecting the peer.
            }
            other => return Err(NetError::Unsupported(format!("unhandled message {:?}", other))),
        }
        Ok(())
    }

    fn handle_client_info(&self, from: SocketAddr, info: ClientInfo) {
        println!("{from} client info: friends_id={} is_hltv={}", info.friends_id, info.is_hltv);
    }

    /// The reply burst a client expects after announcing
    /// `SignOnState::Connected`: server info, a welcome print, the sign-on
    /// state advance, and the (empty) downloadables table.
    fn send_handshake_burst(&mut self, from: SocketAddr) -> NetResult<()> {
        let key = PeerKey::from_socket_addr(from);
        let client = self.clients.get_mut(key).ok_or_else(|| NetError::Protocol("unknown client".into()))?;
        let server_challenge = client.server_challenge;
        let sequence = client.next_outbound_sequence();

        let server_info = Message::ServerInfoMsg(ServerInfo {
            protocol: HANDSHAKE_PROTOCOL,
            server_count: 0,
            is_hltv: false,
            is_dedicated: true,
            max_classes: HANDSHAKE_MAX_CLASSES,
            map_md5: self.map_md5,
            player_slot: 1,
            max_clients: HANDSHAKE_MAX_CLIENTS,
            tick_interval: self.tick_interval.as_secs_f32(),
            operating_system: b'l' as i8,
            game_dir: HANDSHAKE_GAME_DIR.to_string(),
            map_name: self.map_name.clone(),
            sky_name: HANDSHAKE_SKY_NAME.to_string(),
            host_name: HANDSHAKE_HOST_NAME.to_string(),
            is_replay: false,
        });
        let welcome = Message::Print { text: format!("Welcome to {}", self.map_name) };
        let sign_on = Message::SignOnStateMsg { state: SignOnState::New, spawn_count: 0 };
        let string_table = Message::CreateStringTable { name: "downloadables".to_string() };

        let packet = SendingPacket {
            sequence,
            sequence_ack: 0,
            choked_count: None,
            challenge: Some(server_challenge),
            reliable_messages: Vec::new(),
            unreliable_messages: vec![server_info, welcome, sign_on, string_table],
        };
        let bytes = packet.write()?;
        self.socket.send_to(&bytes, from)?;
        Ok(())
    }

    fn disconnect(&mut self, from: SocketAddr, reason: String) -> NetResult<()> {
        let key = PeerKey::from_socket_addr(from);
        if let Some(client) = self.clients.get(key) {
            let reject =
                ConnectionlessPacket::ConnectReject(ConnectRejectPacket { challenge: client.client_challenge, reason });
            self.send_connectionless(&reject, from)?;
        }
        self.clients.schedule_removal(key);
        Ok(())
    }

    fn send_connectionless(&self, packet: &ConnectionlessPacket, to: SocketAddr) -> NetResult<()> {
        let bytes = packet.encode()?;
        self.socket.send_to(&bytes, to)?;
        Ok(())
    }
}

/// Schedule the next tick deadline. If the previous tick ran long enough
/// that the computed deadline has already passed, fall back to "now" rather
/// than letting the loop spin through a backlog of missed ticks.
fn next_tick_after(previous_deadline: Instant, interval: Duration) -> Instant {
    let candidate = previous_deadline + interval;
    let now = Instant::now();
    if candidate < now {
        now
    } else {
        candidate
    }
}
