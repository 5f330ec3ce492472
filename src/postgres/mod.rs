pub mod connection;
pub mod decoder;
pub mod parsers;
pub mod reader;
pub mod types;


#[cfg(test)]
pub mod test_utils;


pub use connection::{standby_status_update, ReplicationSession, SystemInfo};
pub use decoder::PgOutputDecoder;
pub use parsers::{type_parser, TypeParser};
pub use reader::ByteReader;
pub use types::*;
