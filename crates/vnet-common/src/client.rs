// client.rs — per-peer connection state and the table that owns it
//
// Grounded on `Server/Client.h` and the `HashMap<sockaddr_in, Client>`
// kept by `Server.cpp`: challenge/sequence bookkeeping per peer, with
// insertion restricted to the `GetChallenge` path and removal deferred
// until the current datagram has fully finished dispatching.

use std::collections::HashMap;

use crate::addr::PeerKey;
use crate::error::{NetError, NetResult};
use crate::message::SignOnState;

#[derive(Debug, Clone)]
pub struct Client {
    /// The challenge the peer chose; echoed back on `Connect`.
    pub client_challenge: i32,
    /// The challenge this server chose for the peer.
    pub server_challenge: i32,
    pub inbound_sequence: i32,
    pub outbound_sequence: i32,
    pub sign_on_state: SignOnState,
    pub spawn_count: i32,
}

impl Client {
    pub fn new(client_challenge: i32, server_challenge: i32) -> Self {
        Self {
            client_challenge,
            server_challenge,
            inbound_sequence: 0,
            outbound_sequence: 1,
            sign_on_state: SignOnState::Challenge,
            spawn_count: 0,
        }
    }

    /// Consume and return the next sequence number to stamp an outgoing
    /// packet with.
    pub fn next_outbound_sequence(&mut self) -> i32 {
        let seq = self.outbound_sequence;
        self.outbound_sequence += 1;
        seq
    }
}

/// Maps peer identity to connection state. New entries are created only
/// through `insert_new`; removals are staged with `schedule_removal` and
/// applied in bulk by `flush_removals`, so a handler mid-dispatch never
/// has its client disappear out from under it.
#[derive(Debug, Default)]
pub struct ClientTable {
    clients: HashMap<PeerKey, Client>,
    pending_removal: Vec<PeerKey>,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: PeerKey) -> Option<&Client> {
        self.clients.get(&key)
    }

    pub fn get_mut(&mut self, key: PeerKey) -> Option<&mut Client> {
        self.clients.get_mut(&key)
    }

    /// Insert a brand-new client for `key`. An existing entry is a
    /// protocol violation (the peer sent `GetChallenge` twice).
    pub fn insert_new(&mut self, key: PeerKey, client: Client) -> NetResult<()> {
        if self.clients.contains_key(&key) {
            return Err(NetError::Protocol("client already has a challenge".into()));
        }
        self.clients.insert(key, client);
        Ok(())
    }

    pub fn schedule_removal(&mut self, key: PeerKey) {
        self.pending_removal.push(key);
    }

    /// Apply every removal queued since the last flush. Call once per
    /// datagram, after its handler has returned.
    pub fn flush_removals(&mut self) {
        for key in self.pending_removal.drain(..) {
            self.clients.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(port: u16) -> PeerKey {
        PeerKey::from_socket_addr(format!("127.0.0.1:{port}").parse().unwrap())
    }

    #[test]
    fn insert_new_succeeds_once() {
        let mut table = ClientTable::new();
        table.insert_new(key(1), Client::new(1, 2)).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn inserting_twice_is_a_protocol_error() {
        let mut table = ClientTable::new();
        table.insert_new(key(1), Client::new(1, 2)).unwrap();
        let err = table.insert_new(key(1), Client::new(3, 4)).unwrap_err();
        assert!(matches!(err, NetError::Protocol(_)));
    }

    #[test]
    fn outbound_sequence_starts_at_one_and_increments() {
        let mut client = Client::new(1, 2);
        assert_eq!(client.next_outbound_sequence(), 1);
        assert_eq!(client.next_outbound_sequence(), 2);
        assert_eq!(client.next_outbound_sequence(), 3);
    }

    #[test]
    fn removal_is_deferred_until_flush() {
        let mut table = ClientTable::new();
        table.insert_new(key(1), Client::new(1, 2)).unwrap();
        table.schedule_removal(key(1));
        assert_eq!(table.len(), 1, "still present before flush");
        table.flush_removals();
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn get_returns_none_for_unknown_peer() {
        let table = ClientTable::new();
        assert!(table.get(key(9999)).is_none());
    }
}
