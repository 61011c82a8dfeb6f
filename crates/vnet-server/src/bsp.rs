// bsp.rs — just enough of the BSP lump directory to fingerprint a map
//
// Full BSP parsing (faces, visibility, displacement, ...) is out of scope;
// this reads the 64-entry lump directory and hands the raw lump bytes to
// `vnet_common::asset_hash`, mirroring `LibSourceEngine/BSP.cpp`'s
// `try_parse` and `calculate_md5_hash`.

use std::fs;
use std::path::Path;

use vnet_common::asset_hash::compute_map_md5;
use vnet_common::error::{NetError, NetResult};

const BSP_SIGNATURE: u32 = 0x50534256; // "VBSP"
const NUMBER_OF_LUMPS: usize = 64;
const HEADER_SIZE: usize = 4 + 4; // signature + version
const LUMP_DIRECTORY_ENTRY_SIZE: usize = 4 + 4 + 4 + 4; // offset, length, version, uncompressed_size

struct LumpDirectoryEntry {
    offset: u32,
    length: u32,
}

/// Read a BSP file's lump directory and the raw bytes of every lump.
fn read_lumps(bytes: &[u8]) -> NetResult<Vec<Vec<u8>>> {
    if bytes.len() < HEADER_SIZE + NUMBER_OF_LUMPS * LUMP_DIRECTORY_ENTRY_SIZE {
        return Err(NetError::Decode("BSP file too short for lump directory".into()));
    }

    let signature = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if signature != BSP_SIGNATURE {
        return Err(NetError::Decode("invalid BSP signature".into()));
    }

    let mut entries = Vec::with_capacity(NUMBER_OF_LUMPS);
    let mut cursor = HEADER_SIZE;
    for _ in 0..NUMBER_OF_LUMPS {
        let offset = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
        let length = u32::from_le_bytes(bytes[cursor + 4..cursor + 8].try_into().unwrap());
        entries.push(LumpDirectoryEntry { offset, length });
        cursor += LUMP_DIRECTORY_ENTRY_SIZE;
    }

    entries
        .into_iter()
        .map(|entry| {
            let start = entry.offset as usize;
            let end = start + entry.length as usize;
            bytes
                .get(start..end)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| NetError::Decode("lump offset/length out of bounds".into()))
        })
        .collect()
}

/// Load a BSP file from disk and compute its map fingerprint the way the
/// engine does: every lump except `Entities` (index 0), in directory order.
pub fn compute_map_md5_from_file(path: &Path) -> NetResult<[u8; 16]> {
    let bytes = fs::read(path)?;
    let lumps = read_lumps(&bytes)?;
    Ok(compute_map_md5(&lumps))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_bsp(lump_contents: [&[u8]; NUMBER_OF_LUMPS]) -> Vec<u8> {
        let mut directory_offset = HEADER_SIZE + NUMBER_OF_LUMPS * LUMP_DIRECTORY_ENTRY_SIZE;
        let mut directory = Vec::new();
        let mut data = Vec::new();
        for content in lump_contents {
            directory.extend_from_slice(&(directory_offset as u32).to_le_bytes());
            directory.extend_from_slice(&(content.len() as u32).to_le_bytes());
            directory.extend_from_slice(&0u32.to_le_bytes()); // version
            directory.extend_from_slice(&0u32.to_le_bytes()); // uncompressed_size
            data.extend_from_slice(content);
            directory_offset += content.len();
        }

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&BSP_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes()); // version
        bytes.extend_from_slice(&directory);
        bytes.extend_from_slice(&data);
        bytes
    }

    #[test]
    fn rejects_bad_signature() {
        let bytes = vec![0u8; HEADER_SIZE + NUMBER_OF_LUMPS * LUMP_DIRECTORY_ENTRY_SIZE];
        assert!(matches!(read_lumps(&bytes), Err(NetError::Decode(_))));
    }

    #[test]
    fn reads_lump_directory_and_hashes_matching_bsp_cpp() {
        let mut contents = [&b""[..]; NUMBER_OF_LUMPS];
        contents[0] = b"ent_lump_contents"; // Entities, skipped by the hash
        contents[1] = b"plane_data";
        let bytes = minimal_bsp(contents);
        let lumps = read_lumps(&bytes).unwrap();
        assert_eq!(lumps.len(), NUMBER_OF_LUMPS);
        assert_eq!(lumps[0], b"ent_lump_contents");
        assert_eq!(lumps[1], b"plane_data");

        let md5 = compute_map_md5(&lumps);

        let mut altered = contents;
        altered[0] = b"a_completely_different_entity_lump";
        let altered_bytes = minimal_bsp(altered);
        let altered_lumps = read_lumps(&altered_bytes).unwrap();
        assert_eq!(compute_map_md5(&altered_lumps), md5, "entities lump must not affect the hash");
    }

    #[test]
    fn out_of_bounds_lump_is_a_decode_error() {
        let mut bytes = vec![0u8; HEADER_SIZE + NUMBER_OF_LUMPS * LUMP_DIRECTORY_ENTRY_SIZE];
        bytes[0..4].copy_from_slice(&BSP_SIGNATURE.to_le_bytes());
        // First lump directory entry claims a huge offset/length.
        let first_entry = HEADER_SIZE;
        bytes[first_entry..first_entry + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        bytes[first_entry + 4..first_entry + 8].copy_from_slice(&16u32.to_le_bytes());
        assert!(matches!(read_lumps(&bytes), Err(NetError::Decode(_))));
    }
}
