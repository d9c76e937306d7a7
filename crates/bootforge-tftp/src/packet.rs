//! TFTP packet parsing and building (RFC 1350, options per RFC 2347-2349)

use crate::error::{Result, TftpError};
use bytes::{BufMut, Bytes, BytesMut};

/// TFTP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
    /// Option acknowledgment (RFC 2347)
    Oack = 6,
}

impl TryFrom<u16> for Opcode {
    type Error = TftpError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Opcode::Rrq),
            2 => Ok(Opcode::Wrq),
            3 => Ok(Opcode::Data),
            4 => Ok(Opcode::Ack),
            5 => Ok(Opcode::Error),
            6 => Ok(Opcode::Oack),
            _ => Err(TftpError::InvalidPacket(format!(
                "unknown opcode: {}",
                value
            ))),
        }
    }
}

/// TFTP error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    IllegalOperation = 4,
    UnknownTransferId = 5,
}

/// Negotiable transfer options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TftpOptions {
    /// Block size (RFC 2348)
    pub blksize: Option<u16>,
    /// Transfer size (RFC 2349)
    pub tsize: Option<u64>,
    /// Timeout in seconds (RFC 2349)
    pub timeout: Option<u8>,
}

impl TftpOptions {
    /// Check if any options are set
    pub fn is_empty(&self) -> bool {
        self.blksize.is_none() && self.tsize.is_none() && self.timeout.is_none()
    }
}

/// TFTP packet types
#[derive(Debug, Clone)]
pub enum TftpPacket {
    ReadRequest {
        filename: String,
        options: TftpOptions,
    },
    WriteRequest {
        filename: String,
    },
    Data {
        block: u16,
        data: Bytes,
    },
    Ack {
        block: u16,
    },
    Error {
        code: u16,
        message: String,
    },
    Oack {
        options: TftpOptions,
    },
}

impl TftpPacket {
    /// Parse a packet from raw bytes
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(TftpError::InvalidPacket("short packet".to_string()));
        }

        let opcode = Opcode::try_from(u16::from_be_bytes([buf[0], buf[1]]))?;
        let rest = &buf[2..];

        match opcode {
            Opcode::Rrq => {
                let mut cursor = rest;
                let filename = take_cstr(&mut cursor)?;
                let mode = take_cstr(&mut cursor)?;
                match mode.to_ascii_lowercase().as_str() {
                    "octet" | "netascii" => {}
                    other => {
                        return Err(TftpError::InvalidPacket(format!(
                            "unknown mode: {}",
                            other
                        )))
                    }
                }
                let options = parse_options(cursor)?;
                Ok(TftpPacket::ReadRequest { filename, options })
            }
            Opcode::Wrq => {
                let mut cursor = rest;
                let filename = take_cstr(&mut cursor)?;
                Ok(TftpPacket::WriteRequest { filename })
            }
            Opcode::Data => Ok(TftpPacket::Data {
                block: u16::from_be_bytes([rest[0], rest[1]]),
                data: Bytes::copy_from_slice(&rest[2..]),
            }),
            Opcode::Ack => Ok(TftpPacket::Ack {
                block: u16::from_be_bytes([rest[0], rest[1]]),
            }),
            Opcode::Error => {
                let code = u16::from_be_bytes([rest[0], rest[1]]);
                let mut cursor = &rest[2..];
                let message = take_cstr(&mut cursor).unwrap_or_default();
                Ok(TftpPacket::Error { code, message })
            }
            Opcode::Oack => {
                let options = parse_options(rest)?;
                Ok(TftpPacket::Oack { options })
            }
        }
    }

    /// Build a DATA packet
    pub fn data(block: u16, data: Bytes) -> Self {
        TftpPacket::Data { block, data }
    }

    /// Build an ERROR packet
    pub fn error(code: ErrorCode, message: &str) -> Self {
        TftpPacket::Error {
            code: code as u16,
            message: message.to_string(),
        }
    }

    /// Build an OACK packet
    pub fn oack(options: TftpOptions) -> Self {
        TftpPacket::Oack { options }
    }

    /// Encode the packet to wire bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            TftpPacket::ReadRequest { filename, .. } => {
                buf.put_u16(Opcode::Rrq as u16);
                put_cstr(&mut buf, filename);
                put_cstr(&mut buf, "octet");
            }
            TftpPacket::WriteRequest { filename } => {
                buf.put_u16(Opcode::Wrq as u16);
                put_cstr(&mut buf, filename);
                put_cstr(&mut buf, "octet");
            }
            TftpPacket::Data { block, data } => {
                buf.put_u16(Opcode::Data as u16);
                buf.put_u16(*block);
                buf.put_slice(data);
            }
            TftpPacket::Ack { block } => {
                buf.put_u16(Opcode::Ack as u16);
                buf.put_u16(*block);
            }
            TftpPacket::Error { code, message } => {
                buf.put_u16(Opcode::Error as u16);
                buf.put_u16(*code);
                put_cstr(&mut buf, message);
            }
            TftpPacket::Oack { options } => {
                buf.put_u16(Opcode::Oack as u16);
                if let Some(blksize) = options.blksize {
                    put_cstr(&mut buf, "blksize");
                    put_cstr(&mut buf, &blksize.to_string());
                }
                if let Some(tsize) = options.tsize {
                    put_cstr(&mut buf, "tsize");
                    put_cstr(&mut buf, &tsize.to_string());
                }
                if let Some(timeout) = options.timeout {
                    put_cstr(&mut buf, "timeout");
                    put_cstr(&mut buf, &timeout.to_string());
                }
            }
        }
        buf.freeze()
    }
}

/// Read a NUL-terminated string, advancing the cursor past the terminator
fn take_cstr(cursor: &mut &[u8]) -> Result<String> {
    let nul = cursor
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| TftpError::InvalidPacket("unterminated string".to_string()))?;
    let s = std::str::from_utf8(&cursor[..nul])
        .map_err(|_| TftpError::InvalidPacket("non-UTF-8 string".to_string()))?
        .to_string();
    *cursor = &cursor[nul + 1..];
    Ok(s)
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// Parse trailing option name/value pairs; unknown options are ignored
fn parse_options(mut cursor: &[u8]) -> Result<TftpOptions> {
    let mut options = TftpOptions::default();
    while !cursor.is_empty() {
        let name = take_cstr(&mut cursor)?;
        let value = take_cstr(&mut cursor)?;
        match name.to_ascii_lowercase().as_str() {
            "blksize" => options.blksize = value.parse().ok(),
            "tsize" => options.tsize = value.parse().ok(),
            "timeout" => options.timeout = value.parse().ok(),
            _ => {}
        }
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rrq_bytes(filename: &str, mode: &str, options: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = vec![0, 1];
        buf.extend_from_slice(filename.as_bytes());
        buf.push(0);
        buf.extend_from_slice(mode.as_bytes());
        buf.push(0);
        for (name, value) in options {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
            buf.extend_from_slice(value.as_bytes());
            buf.push(0);
        }
        buf
    }

    #[test]
    fn test_parse_rrq_plain() {
        let packet = TftpPacket::parse(&rrq_bytes("ipxe.efi", "octet", &[])).unwrap();
        match packet {
            TftpPacket::ReadRequest { filename, options } => {
                assert_eq!(filename, "ipxe.efi");
                assert!(options.is_empty());
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rrq_with_options() {
        let raw = rrq_bytes(
            "autoexec.ipxe",
            "octet",
            &[("blksize", "1468"), ("tsize", "0"), ("windowsize", "4")],
        );
        let packet = TftpPacket::parse(&raw).unwrap();
        match packet {
            TftpPacket::ReadRequest { options, .. } => {
                assert_eq!(options.blksize, Some(1468));
                assert_eq!(options.tsize, Some(0));
                // windowsize is not supported and silently dropped
                assert_eq!(options.timeout, None);
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rrq_bad_mode() {
        let raw = rrq_bytes("ipxe.efi", "mail", &[]);
        assert!(TftpPacket::parse(&raw).is_err());
    }

    #[test]
    fn test_parse_ack() {
        let packet = TftpPacket::parse(&[0, 4, 0, 7]).unwrap();
        match packet {
            TftpPacket::Ack { block } => assert_eq!(block, 7),
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_parse_short_packet() {
        assert!(TftpPacket::parse(&[0, 4]).is_err());
    }

    #[test]
    fn test_parse_unknown_opcode() {
        assert!(TftpPacket::parse(&[0, 9, 0, 0]).is_err());
    }

    #[test]
    fn test_encode_data() {
        let packet = TftpPacket::data(1, Bytes::from_static(b"hello"));
        let wire = packet.encode();
        assert_eq!(&wire[..], &[0, 3, 0, 1, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_encode_error() {
        let wire = TftpPacket::error(ErrorCode::FileNotFound, "nope").encode();
        assert_eq!(&wire[..4], &[0, 5, 0, 1]);
        assert_eq!(&wire[4..], b"nope\0");
    }

    #[test]
    fn test_encode_oack() {
        let wire = TftpPacket::oack(TftpOptions {
            blksize: Some(1024),
            tsize: Some(5),
            timeout: None,
        })
        .encode();
        let parsed = TftpPacket::parse(&wire).unwrap();
        match parsed {
            TftpPacket::Oack { options } => {
                assert_eq!(options.blksize, Some(1024));
                assert_eq!(options.tsize, Some(5));
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }
}
