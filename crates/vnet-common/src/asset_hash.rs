// asset_hash.rs — map fingerprint for ServerInfo
//
// Delegates to the `md-5` crate (RustCrypto). Full BSP/VPK/VTF file parsing
// lives outside this crate (see `vnet-server::bsp`); this module only
// implements the hashing interface the core needs: hash the concatenation
// of a BSP's lump records, skipping the Entities lump (index 0).

use md5::{Digest, Md5};

const ENTITIES_LUMP_INDEX: usize = 0;

/// MD5 context — wraps the `md-5` crate's hasher.
pub struct Md5Context {
    hasher: Md5,
}

impl Md5Context {
    pub fn new() -> Self {
        Self { hasher: Md5::new() }
    }

    pub fn update(&mut self, input: &[u8]) {
        self.hasher.update(input);
    }

    pub fn finalize(self) -> [u8; 16] {
        let result = self.hasher.finalize();
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&result);
        digest
    }
}

impl Default for Md5Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the map fingerprint from a map's lump records, in on-disk
/// order, skipping the Entities lump.
pub fn compute_map_md5(records: &[Vec<u8>]) -> [u8; 16] {
    let mut ctx = Md5Context::new();
    for (index, record) in records.iter().enumerate() {
        if index == ENTITIES_LUMP_INDEX {
            continue;
        }
        ctx.update(record);
    }
    ctx.finalize()
}
