pub mod addr;
pub mod asset_hash;
pub mod bitstream;
pub mod client;
pub mod crc;
pub mod error;
pub mod message;
pub mod packet;
