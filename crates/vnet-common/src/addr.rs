// addr.rs — UDP peer identity
//
// The client table is keyed by the full peer triple (address, port,
// family), hashed by combining the three pieces with a pair-mix function
// rather than relying on a derived hash — mirroring the hand-rolled
// `AK::Traits<sockaddr_in>` hash the server's client map used upstream.

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

/// Address family, carried alongside the address/port so that two peers
/// differing only in family never alias to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerKey {
    ip: [u8; 16],
    port: u16,
    family: Family,
}

impl PeerKey {
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => {
                let mut ip = [0u8; 16];
                ip[..4].copy_from_slice(&v4.ip().octets());
                Self { ip, port: v4.port(), family: Family::V4 }
            }
            SocketAddr::V6(v6) => {
                Self { ip: v6.ip().octets(), port: v6.port(), family: Family::V6 }
            }
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Mix two 32-bit words the way a pair hash combines two keys: splits
/// `ip` into two halves, folds `port`/`family` into a third word, and
/// multiplies each through a large odd constant before XOR-folding.
fn pair_int_hash(a: u32, b: u32) -> u64 {
    const MIX: u64 = 0x9E3779B97F4A7C15;
    let combined = ((a as u64) << 32) | b as u64;
    combined.wrapping_mul(MIX) ^ (combined.rotate_left(17))
}

impl Hash for PeerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let ip_lo = u32::from_be_bytes(self.ip[0..4].try_into().unwrap());
        let ip_hi = u32::from_be_bytes(self.ip[4..8].try_into().unwrap());
        let port_family = ((self.port as u32) << 8) | self.family as u32;

        let mixed = pair_int_hash(ip_lo, ip_hi) ^ pair_int_hash(port_family, port_family);
        state.write_u64(mixed);
    }
}
