// DNS wire format, just enough for mDNS service discovery.

use std::net::Ipv4Addr;

use thiserror::Error;

pub const TYPE_A: u16 = 1;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_SRV: u16 = 33;

const CLASS_IN: u16 = 1;
const HEADER_LEN: usize = 12;
const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_TRUNCATED: u16 = 0x0200;
const MAX_POINTER_JUMPS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MdnsError {
    #[error("message truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("response has the TC bit set")]
    TruncatedResponse,

    #[error("message is a query, not a response")]
    NotAResponse,

    #[error("name compression loop at offset {offset}")]
    CompressionLoop { offset: usize },

    #[error("invalid label type at offset {offset}")]
    InvalidLabel { offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Ptr(String),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Txt(Vec<String>),
    Other(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub ttl: u32,
    pub data: RecordData,
}

/// A parsed response. Records from the answer, authority and additional
/// sections are flattened in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u16,
    pub flags: u16,
    pub records: Vec<Record>,
}

/// Build a one-question PTR query for `service` (e.g. `_http._tcp.local`).
pub fn build_ptr_query(service: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + service.len() + 6);
    // id 0, flags 0, one question, no records
    buf.extend_from_slice(&[0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
    for label in service.split('.').filter(|l| !l.is_empty()) {
        let bytes = label.as_bytes();
        // Labels are capped at 63 bytes by the format.
        let len = bytes.len().min(63);
        buf.push(u8::try_from(len).unwrap_or(63));
        buf.extend_from_slice(bytes.get(..len).unwrap_or_default());
    }
    buf.push(0);
    buf.extend_from_slice(&TYPE_PTR.to_be_bytes());
    buf.extend_from_slice(&CLASS_IN.to_be_bytes());
    buf
}

/// Parse a response message.
pub fn parse_message(buf: &[u8]) -> Result<Message, MdnsError> {
    let mut cursor = Cursor { buf, pos: 0 };

    let id = cursor.u16()?;
    let flags = cursor.u16()?;
    if flags & FLAG_RESPONSE == 0 {
        return Err(MdnsError::NotAResponse);
    }
    if flags & FLAG_TRUNCATED != 0 {
        return Err(MdnsError::TruncatedResponse);
    }

    let questions = cursor.u16()?;
    let answers = cursor.u16()?;
    let authority = cursor.u16()?;
    let additional = cursor.u16()?;

    for _ in 0..questions {
        let (_, next) = read_name(buf, cursor.pos)?;
        cursor.pos = next;
        cursor.skip(4)?;
    }

    let total = usize::from(answers) + usize::from(authority) + usize::from(additional);
    let mut records = Vec::with_capacity(total);
    for _ in 0..total {
        records.push(read_record(&mut cursor)?);
    }

    Ok(Message { id, flags, records })
}

fn read_record(cursor: &mut Cursor<'_>) -> Result<Record, MdnsError> {
    let (name, next) = read_name(cursor.buf, cursor.pos)?;
    cursor.pos = next;

    let rtype = cursor.u16()?;
    let _class = cursor.u16()?;
    let ttl = cursor.u32()?;
    let rdlength = usize::from(cursor.u16()?);
    let start = cursor.pos;
    let rdata = cursor.take(rdlength)?;

    let data = match rtype {
        TYPE_A => {
            let octets: [u8; 4] = rdata
                .try_into()
                .map_err(|_| MdnsError::Truncated { offset: start })?;
            RecordData::A(Ipv4Addr::from(octets))
        }
        TYPE_PTR => RecordData::Ptr(read_name(cursor.buf, start)?.0),
        TYPE_SRV => {
            let mut srv = Cursor {
                buf: cursor.buf,
                pos: start,
            };
            let priority = srv.u16()?;
            let weight = srv.u16()?;
            let port = srv.u16()?;
            let (target, _) = read_name(cursor.buf, srv.pos)?;
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            }
        }
        TYPE_TXT => RecordData::Txt(read_txt(rdata)),
        other => RecordData::Other(other),
    };

    Ok(Record { name, ttl, data })
}

fn read_txt(mut rdata: &[u8]) -> Vec<String> {
    let mut entries = Vec::new();
    while let Some((&len, rest)) = rdata.split_first() {
        let len = usize::from(len).min(rest.len());
        let (entry, tail) = rest.split_at(len);
        if !entry.is_empty() {
            entries.push(String::from_utf8_lossy(entry).into_owned());
        }
        rdata = tail;
    }
    entries
}

/// Read a possibly-compressed name starting at `pos`. Returns the dotted
/// name and the offset just past it in the original stream.
fn read_name(buf: &[u8], mut pos: usize) -> Result<(String, usize), MdnsError> {
    let mut labels: Vec<String> = Vec::new();
    let mut resume = None;
    let mut jumps = 0;

    loop {
        let len = *buf.get(pos).ok_or(MdnsError::Truncated { offset: pos })?;
        match len & 0xC0 {
            0x00 if len == 0 => {
                pos += 1;
                break;
            }
            0x00 => {
                let start = pos + 1;
                let end = start + usize::from(len);
                let label = buf
                    .get(start..end)
                    .ok_or(MdnsError::Truncated { offset: start })?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                pos = end;
            }
            0xC0 => {
                let low = *buf
                    .get(pos + 1)
                    .ok_or(MdnsError::Truncated { offset: pos + 1 })?;
                if resume.is_none() {
                    resume = Some(pos + 2);
                }
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(MdnsError::CompressionLoop { offset: pos });
                }
                pos = usize::from(u16::from_be_bytes([len & 0x3F, low]));
            }
            _ => return Err(MdnsError::InvalidLabel { offset: pos }),
        }
    }

    Ok((labels.join("."), resume.unwrap_or(pos)))
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], MdnsError> {
        let slice = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or(MdnsError::Truncated { offset: self.pos })?;
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), MdnsError> {
        self.take(len).map(|_| ())
    }

    fn u16(&mut self) -> Result<u16, MdnsError> {
        let offset = self.pos;
        let bytes: [u8; 2] = self
            .take(2)?
            .try_into()
            .map_err(|_| MdnsError::Truncated { offset })?;
        Ok(u16::from_be_bytes(bytes))
    }

    fn u32(&mut self) -> Result<u32, MdnsError> {
        let offset = self.pos;
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| MdnsError::Truncated { offset })?;
        Ok(u32::from_be_bytes(bytes))
    }
}

// ── Test fixtures ────────────────────────────────────────────────────


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::fixtures::shelly_response;
    use super::*;

    #[test]
    fn query_encodes_labels_and_ptr_type() {
        let query = build_ptr_query("_http._tcp.local");
        assert_eq!(&query[..12], &[0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&query[12..18], b"\x05_http");
        assert_eq!(&query[query.len() - 4..], &[0, 12, 0, 1]);
    }

    #[test]
    fn parses_all_sections_with_compression() {
        let buf = shelly_response([192, 168, 1, 50], &["gen=2", "app=Plus1PM"]);
        let message = parse_message(&buf).unwrap();
        assert_eq!(message.records.len(), 4);

        assert_eq!(
            message.records[0].data,
            RecordData::Ptr("shellyplus1pm-a8032ab12345._http._tcp.local".into())
        );
        assert_eq!(message.records[1].name, "shellyplus1pm-a8032ab12345._http._tcp.local");
        assert_eq!(
            message.records[1].data,
            RecordData::Srv {
                priority: 0,
                weight: 0,
                port: 80,
                target: "shellyplus1pm-a8032ab12345.local".into()
            }
        );
        assert_eq!(
            message.records[2].data,
            RecordData::Txt(vec!["gen=2".into(), "app=Plus1PM".into()])
        );
        assert_eq!(message.records[3].name, "shellyplus1pm-a8032ab12345.local");
        assert_eq!(
            message.records[3].data,
            RecordData::A(Ipv4Addr::new(192, 168, 1, 50))
        );
    }

    #[test]
    fn truncated_flag_is_rejected() {
        let mut buf = shelly_response([10, 0, 0, 2], &[]);
        buf[2] |= 0x02;
        assert_eq!(parse_message(&buf), Err(MdnsError::TruncatedResponse));
    }

    #[test]
    fn queries_are_not_responses() {
        let query = build_ptr_query("_http._tcp.local");
        assert_eq!(parse_message(&query), Err(MdnsError::NotAResponse));
    }

    #[test]
    fn pointer_loops_are_detected() {
        // Answer name is a pointer to itself.
        let buf = [0, 0, 0x84, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0xC0, 12];
        assert_eq!(
            parse_message(&buf),
            Err(MdnsError::CompressionLoop { offset: 12 })
        );
    }

    #[test]
    fn short_buffers_are_truncated_errors() {
        assert!(matches!(
            parse_message(&[0x00, 0x00, 0x84]),
            Err(MdnsError::Truncated { .. })
        ));
    }
}
