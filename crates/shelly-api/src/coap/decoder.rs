// Binary CoAP decoding for CoIoT status packets.
//
// Layout after the optional 8-byte `prxy` relay header:
//   byte 0: version/type/token-length (low nibble)
//   byte 1: code
//   bytes 2-3: message id
//   token, then delta/length encoded options, then 0xFF + payload.

use std::net::Ipv4Addr;

use thiserror::Error;

/// CoAP code Shelly uses for status publications.
pub const STATUS_CODE: u8 = 30;

/// Option number carrying `<type>#<id>#<revision>`.
pub const IDENTITY_OPTION: u32 = 3332;

const HEADER_LEN: usize = 4;
const PROXY_MARKER: &[u8] = b"prxy";
const PROXY_HEADER_LEN: usize = 8;
const PAYLOAD_MARKER: u8 = 0xFF;

/// Reasons a status datagram is rejected. None of these are fatal: the
/// listener logs and drops the packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoapError {
    #[error("token of {len} bytes overruns the datagram")]
    TruncatedToken { len: usize },

    #[error("reserved option nibble 15 at offset {offset}")]
    ReservedNibble { offset: usize },

    #[error("option truncated at offset {offset}")]
    TruncatedOption { offset: usize },

    #[error("status packet has no device identity option")]
    MissingIdentity,

    #[error("malformed device identity {0:?}")]
    MalformedIdentity(String),
}

/// A decoded status publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapStatusPacket {
    pub code: u8,
    pub device_type: String,
    pub device_id: String,
    /// JSON status text (ISO-8859-1 on the wire, re-encoded as UTF-8).
    pub payload: String,
    /// Original sender when the packet came through a `prxy` relay.
    pub relayed_from: Option<Ipv4Addr>,
}

/// Decode one datagram.
///
/// `Ok(None)` means "not a status packet": too short, or a CoAP code other
/// than [`STATUS_CODE`]. Structural damage is an error.
pub fn decode_status(datagram: &[u8]) -> Result<Option<CoapStatusPacket>, CoapError> {
    let (message, relayed_from) = match strip_proxy_header(datagram) {
        Some(split) => split,
        None => return Ok(None),
    };

    let mut reader = Reader::new(message);
    let Some(header) = reader.take(HEADER_LEN) else {
        return Ok(None);
    };
    let (first, code) = match header {
        [first, code, ..] => (*first, *code),
        _ => return Ok(None),
    };

    if code != STATUS_CODE {
        return Ok(None);
    }

    let token_len = usize::from(first & 0x0F);
    if reader.take(token_len).is_none() {
        return Err(CoapError::TruncatedToken { len: token_len });
    }

    let mut number: u32 = 0;
    let mut identity = None;
    let mut payload: &[u8] = &[];

    while let Some(byte) = reader.byte() {
        if byte == PAYLOAD_MARKER {
            payload = reader.rest();
            break;
        }
        let offset = reader.pos - 1;
        let delta = extended(byte >> 4, &mut reader, offset)?;
        let length = extended(byte & 0x0F, &mut reader, offset)?;
        number = number.saturating_add(delta);

        let value = usize::try_from(length)
            .ok()
            .and_then(|len| reader.take(len))
            .ok_or(CoapError::TruncatedOption { offset })?;

        if number == IDENTITY_OPTION {
            identity = Some(latin1(value));
        }
    }

    let identity = identity.ok_or(CoapError::MissingIdentity)?;
    let (device_type, device_id) = split_identity(&identity)?;

    Ok(Some(CoapStatusPacket {
        code,
        device_type,
        device_id,
        payload: latin1(payload),
        relayed_from,
    }))
}

/// Returns the real CoAP message and the relayed source, or `None` when a
/// `prxy` header is present but cut short.
fn strip_proxy_header(datagram: &[u8]) -> Option<(&[u8], Option<Ipv4Addr>)> {
    if !datagram.starts_with(PROXY_MARKER) {
        return Some((datagram, None));
    }
    let addr: [u8; 4] = datagram.get(PROXY_MARKER.len()..PROXY_HEADER_LEN)?.try_into().ok()?;
    let message = datagram.get(PROXY_HEADER_LEN..)?;
    Some((message, Some(Ipv4Addr::from(addr))))
}

/// Resolve a 4-bit delta/length nibble, reading extension bytes as needed.
fn extended(nibble: u8, reader: &mut Reader<'_>, offset: usize) -> Result<u32, CoapError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => reader
            .byte()
            .map(|b| u32::from(b) + 13)
            .ok_or(CoapError::TruncatedOption { offset }),
        14 => reader
            .take(2)
            .and_then(|b| <[u8; 2]>::try_from(b).ok())
            .map(|b| u32::from(u16::from_be_bytes(b)) + 269)
            .ok_or(CoapError::TruncatedOption { offset }),
        _ => Err(CoapError::ReservedNibble { offset }),
    }
}

fn split_identity(identity: &str) -> Result<(String, String), CoapError> {
    let mut parts = identity.split('#');
    match (parts.next(), parts.next()) {
        (Some(device_type), Some(device_id)) if !device_type.is_empty() && !device_id.is_empty() => {
            Ok((device_type.to_owned(), device_id.to_owned()))
        }
        _ => Err(CoapError::MalformedIdentity(identity.to_owned())),
    }
}

/// ISO-8859-1 maps each byte to the code point of the same value.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = self.buf.get(self.pos..).unwrap_or_default();
        self.pos = self.buf.len();
        slice
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// Build a status datagram the way a Shelly 1 emits it.
    pub(crate) fn status_datagram(identity: &str, payload: &str) -> Vec<u8> {
        let mut buf = vec![0x50, STATUS_CODE, 0x00, 0x01];
        // Option 3332 = 269 + 3063, so delta nibble 14 with two extension bytes.
        let ext = u16::try_from(IDENTITY_OPTION - 269).unwrap().to_be_bytes();
        let len = identity.len();
        if len < 13 {
            buf.push(0xE0 | u8::try_from(len).unwrap());
            buf.extend_from_slice(&ext);
        } else {
            buf.push(0xED);
            buf.extend_from_slice(&ext);
            buf.push(u8::try_from(len - 13).unwrap());
        }
        buf.extend_from_slice(identity.as_bytes());
        buf.push(PAYLOAD_MARKER);
        buf.extend_from_slice(payload.as_bytes());
        buf
    }

    #[test]
    fn identity_option_splits_on_hash() {
        let datagram = status_datagram("SHSW-1#A4CF12F45A1B#2", r#"{"G":[[0,1101,1]]}"#);
        let packet = decode_status(&datagram).unwrap().unwrap();
        assert_eq!(packet.code, STATUS_CODE);
        assert_eq!(packet.device_type, "SHSW-1");
        assert_eq!(packet.device_id, "A4CF12F45A1B");
        assert_eq!(packet.payload, r#"{"G":[[0,1101,1]]}"#);
        assert_eq!(packet.relayed_from, None);
    }

    #[test]
    fn short_identity_uses_inline_length() {
        let datagram = status_datagram("SHHT-1#ABC", "{}");
        let packet = decode_status(&datagram).unwrap().unwrap();
        assert_eq!(packet.device_type, "SHHT-1");
        assert_eq!(packet.device_id, "ABC");
    }

    #[test]
    fn proxy_prefix_decodes_like_bare_packet() {
        let bare = status_datagram("SHSW-25#1234AB#2", r#"{"G":[]}"#);
        let mut relayed = b"prxy".to_vec();
        relayed.extend_from_slice(&[192, 168, 1, 40]);
        relayed.extend_from_slice(&bare);

        let direct = decode_status(&bare).unwrap().unwrap();
        let proxied = decode_status(&relayed).unwrap().unwrap();
        assert_eq!(proxied.device_type, direct.device_type);
        assert_eq!(proxied.device_id, direct.device_id);
        assert_eq!(proxied.payload, direct.payload);
        assert_eq!(proxied.relayed_from, Some(Ipv4Addr::new(192, 168, 1, 40)));
    }

    #[test]
    fn buffers_shorter_than_header_are_not_status() {
        for len in 0..HEADER_LEN {
            let buf = vec![0x50; len];
            assert_eq!(decode_status(&buf), Ok(None));
        }
        assert_eq!(decode_status(b"prxy\x01"), Ok(None));
    }

    #[test]
    fn other_codes_are_ignored() {
        let mut datagram = status_datagram("SHSW-1#AA#2", "{}");
        datagram[1] = 69;
        assert_eq!(decode_status(&datagram), Ok(None));
    }

    #[test]
    fn nibble_fifteen_is_malformed() {
        let datagram = [0x50, STATUS_CODE, 0, 1, 0xF1, 0x00];
        assert_eq!(
            decode_status(&datagram),
            Err(CoapError::ReservedNibble { offset: 4 })
        );
    }

    #[test]
    fn truncated_token_is_malformed() {
        let datagram = [0x58, STATUS_CODE, 0, 1, 0xAA];
        assert_eq!(
            decode_status(&datagram),
            Err(CoapError::TruncatedToken { len: 8 })
        );
    }

    #[test]
    fn truncated_option_value_is_malformed() {
        let datagram = [0x50, STATUS_CODE, 0, 1, 0x15, b'a'];
        assert_eq!(
            decode_status(&datagram),
            Err(CoapError::TruncatedOption { offset: 4 })
        );
    }

    #[test]
    fn missing_identity_is_malformed() {
        let datagram = [0x50, STATUS_CODE, 0, 1, 0x11, b'x', PAYLOAD_MARKER, b'{', b'}'];
        assert_eq!(decode_status(&datagram), Err(CoapError::MissingIdentity));
    }

    #[test]
    fn payload_is_latin1() {
        let mut datagram = status_datagram("SHSW-1#AA#2", "");
        datagram.push(0xB0); // degree sign
        let packet = decode_status(&datagram).unwrap().unwrap();
        assert_eq!(packet.payload, "\u{00B0}");
    }
}
