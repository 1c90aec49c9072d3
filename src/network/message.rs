// Wire codec. Every connection carries exactly one frame:
//
//   command (12 bytes, NUL-padded ASCII) || payload length (u32 BE) || payload
//
// Payloads are bincode with the standard configuration, so round-trips are
// byte-exact. The length field is capped so a misbehaving peer cannot make
// us allocate unbounded memory.

use crate::error::{NodeError, Result};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const COMMAND_LEN: usize = 12;
const MAX_PAYLOAD_LEN: u32 = 4 * 1024 * 1024;

/// What kind of item an `inv` or `getdata` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum OpType {
    Block,
    Tx,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct VersionPayload {
    pub addr_from: String,
    pub version: usize,
    pub best_height: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct AddrPayload {
    pub addr_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct InvPayload {
    pub addr_from: String,
    pub op_type: OpType,
    pub items: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct GetBlocksPayload {
    pub addr_from: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct GetDataPayload {
    pub addr_from: String,
    pub op_type: OpType,
    pub id: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockPayload {
    pub addr_from: String,
    pub block: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxPayload {
    pub addr_from: String,
    pub transaction: Vec<u8>,
}

/// One protocol message, dispatched by its command tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Package {
    Version(VersionPayload),
    Verack(VersionPayload),
    Addr(AddrPayload),
    Inv(InvPayload),
    GetBlocks(GetBlocksPayload),
    GetData(GetDataPayload),
    Block(BlockPayload),
    Tx(TxPayload),
}

impl Package {
    pub fn command(&self) -> &'static str {
        match self {
            Package::Version(_) => "version",
            Package::Verack(_) => "verack",
            Package::Addr(_) => "addr",
            Package::Inv(_) => "inv",
            Package::GetBlocks(_) => "getblocks",
            Package::GetData(_) => "getdata",
            Package::Block(_) => "block",
            Package::Tx(_) => "tx",
        }
    }

    fn payload_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Package::Version(p) | Package::Verack(p) => serialize(p),
            Package::Addr(p) => serialize(p),
            Package::Inv(p) => serialize(p),
            Package::GetBlocks(p) => serialize(p),
            Package::GetData(p) => serialize(p),
            Package::Block(p) => serialize(p),
            Package::Tx(p) => serialize(p),
        }
    }

    /// Write the full frame.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let payload = self.payload_bytes()?;
        if payload.len() > MAX_PAYLOAD_LEN as usize {
            return Err(NodeError::MalformedMessage(format!(
                "Payload of {} bytes exceeds the frame limit",
                payload.len()
            )));
        }
        writer.write_all(&command_to_bytes(self.command()))?;
        writer.write_all(&(payload.len() as u32).to_be_bytes())?;
        writer.write_all(&payload)?;
        Ok(())
    }

    /// Read one frame and decode it. Unknown commands and oversized or
    /// undecodable payloads are `MalformedMessage`.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Package> {
        let mut command_buf = [0u8; COMMAND_LEN];
        reader.read_exact(&mut command_buf)?;
        let command = bytes_to_command(&command_buf);

        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let payload_len = u32::from_be_bytes(len_buf);
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(NodeError::MalformedMessage(format!(
                "Declared payload of {payload_len} bytes exceeds the frame limit"
            )));
        }

        let mut payload = vec![0u8; payload_len as usize];
        reader.read_exact(&mut payload)?;

        let malformed = |e: NodeError| NodeError::MalformedMessage(e.to_string());
        match command.as_str() {
            "version" => Ok(Package::Version(deserialize(&payload).map_err(malformed)?)),
            "verack" => Ok(Package::Verack(deserialize(&payload).map_err(malformed)?)),
            "addr" => Ok(Package::Addr(deserialize(&payload).map_err(malformed)?)),
            "inv" => Ok(Package::Inv(deserialize(&payload).map_err(malformed)?)),
            "getblocks" => Ok(Package::GetBlocks(deserialize(&payload).map_err(malformed)?)),
            "getdata" => Ok(Package::GetData(deserialize(&payload).map_err(malformed)?)),
            "block" => Ok(Package::Block(deserialize(&payload).map_err(malformed)?)),
            "tx" => Ok(Package::Tx(deserialize(&payload).map_err(malformed)?)),
            other => Err(NodeError::MalformedMessage(format!(
                "Unknown command: {other}"
            ))),
        }
    }
}

/// NUL-pad an ASCII command into the fixed tag width.
pub fn command_to_bytes(command: &str) -> [u8; COMMAND_LEN] {
    let mut bytes = [0u8; COMMAND_LEN];
    for (i, byte) in command.bytes().take(COMMAND_LEN).enumerate() {
        bytes[i] = byte;
    }
    bytes
}

/// Strip NUL padding back off a command tag.
pub fn bytes_to_command(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0x00)
        .map(|b| *b as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(package: Package) -> Package {
        let mut frame = vec![];
        package.write_to(&mut frame).unwrap();
        Package::read_from(&mut Cursor::new(frame)).unwrap()
    }

    #[test]
    fn test_command_tag_padding() {
        let tag = command_to_bytes("inv");
        assert_eq!(tag.len(), COMMAND_LEN);
        assert_eq!(&tag[..3], b"inv");
        assert!(tag[3..].iter().all(|b| *b == 0));
        assert_eq!(bytes_to_command(&tag), "inv");
    }

    #[test]
    fn test_version_round_trip() {
        let package = Package::Version(VersionPayload {
            addr_from: "127.0.0.1:3000".to_string(),
            version: 1,
            best_height: 7,
        });
        assert_eq!(round_trip(package.clone()), package);
        assert_eq!(package.command(), "version");
    }

    #[test]
    fn test_verack_uses_its_own_tag() {
        let package = Package::Verack(VersionPayload {
            addr_from: "127.0.0.1:3001".to_string(),
            version: 1,
            best_height: 0,
        });
        assert_eq!(package.command(), "verack");
        assert_eq!(round_trip(package.clone()), package);
    }

    #[test]
    fn test_inv_round_trip() {
        let package = Package::Inv(InvPayload {
            addr_from: "127.0.0.1:3000".to_string(),
            op_type: OpType::Block,
            items: vec![vec![0xaa; 32], vec![0xbb; 32]],
        });
        assert_eq!(round_trip(package.clone()), package);
    }

    #[test]
    fn test_getdata_and_blob_messages_round_trip() {
        for package in [
            Package::GetBlocks(GetBlocksPayload {
                addr_from: "127.0.0.1:3002".to_string(),
            }),
            Package::GetData(GetDataPayload {
                addr_from: "127.0.0.1:3002".to_string(),
                op_type: OpType::Tx,
                id: vec![0xcc; 32],
            }),
            Package::Block(BlockPayload {
                addr_from: "127.0.0.1:3002".to_string(),
                block: vec![1, 2, 3],
            }),
            Package::Tx(TxPayload {
                addr_from: "127.0.0.1:3002".to_string(),
                transaction: vec![4, 5, 6],
            }),
            Package::Addr(AddrPayload {
                addr_list: vec!["127.0.0.1:3003".to_string()],
            }),
        ] {
            assert_eq!(round_trip(package.clone()), package);
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut frame = vec![];
        frame.extend(command_to_bytes("bogus"));
        frame.extend(0u32.to_be_bytes());
        let result = Package::read_from(&mut Cursor::new(frame));
        assert!(matches!(result, Err(NodeError::MalformedMessage(_))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut frame = vec![];
        frame.extend(command_to_bytes("tx"));
        frame.extend(u32::MAX.to_be_bytes());
        let result = Package::read_from(&mut Cursor::new(frame));
        assert!(matches!(result, Err(NodeError::MalformedMessage(_))));
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let mut frame = vec![];
        frame.extend(command_to_bytes("tx"));
        frame.extend(16u32.to_be_bytes());
        frame.extend([0u8; 4]); // promised 16 bytes, sent 4
        assert!(Package::read_from(&mut Cursor::new(frame)).is_err());
    }
}
