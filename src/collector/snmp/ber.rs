//! SNMPv2c message encoding (BER subset).

use super::{Oid, SnmpError, SnmpValue};

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

/// SNMPv2c wire version number.
const VERSION_2C: i64 = 1;

/// Request PDU kinds sent by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PduKind {
    Get = 0xA0,
    GetNext = 0xA1,
}

const TAG_RESPONSE: u8 = 0xA2;

/// A decoded response PDU.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Response {
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(Oid, SnmpValue)>,
}

/// Encode a single-varbind request.
pub(crate) fn encode_request(
    kind: PduKind,
    community: &str,
    request_id: i32,
    oid: &Oid,
) -> Vec<u8> {
    let mut varbind = Vec::new();
    write_oid(&mut varbind, oid);
    write_tlv(&mut varbind, TAG_NULL, &[]);

    let mut varbind_list = Vec::new();
    write_tlv(&mut varbind_list, TAG_SEQUENCE, &varbind);

    let mut pdu = Vec::new();
    write_integer(&mut pdu, i64::from(request_id));
    write_integer(&mut pdu, 0);
    write_integer(&mut pdu, 0);
    write_tlv(&mut pdu, TAG_SEQUENCE, &varbind_list);

    let mut message = Vec::new();
    write_integer(&mut message, VERSION_2C);
    write_tlv(&mut message, TAG_OCTET_STRING, community.as_bytes());
    write_tlv(&mut message, kind as u8, &pdu);

    let mut out = Vec::with_capacity(message.len() + 4);
    write_tlv(&mut out, TAG_SEQUENCE, &message);
    out
}

/// Decode a response message.
pub(crate) fn decode_response(buf: &[u8]) -> Result<Response, SnmpError> {
    let mut outer = Reader::new(buf);
    let mut message = outer.expect(TAG_SEQUENCE)?;

    let version = message.read_integer()?;
    if version != VERSION_2C {
        return Err(decode_err(format!("unsupported version {version}")));
    }
    let _community = message.expect(TAG_OCTET_STRING)?;

    let mut pdu = message.expect(TAG_RESPONSE)?;
    let request_id = i32::try_from(pdu.read_integer()?)
        .map_err(|_| decode_err("request id out of range"))?;
    let error_status = pdu.read_integer()?;
    let error_index = pdu.read_integer()?;

    let mut list = pdu.expect(TAG_SEQUENCE)?;
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut varbind = list.expect(TAG_SEQUENCE)?;
        let (tag, body) = varbind.read_tlv()?;
        if tag != TAG_OID {
            return Err(decode_err(format!("expected oid, found tag {tag:#04x}")));
        }
        let oid = decode_oid(body)?;
        let value = varbind.read_value()?;
        varbinds.push((oid, value));
    }

    Ok(Response {
        request_id,
        error_status,
        error_index,
        varbinds,
    })
}

fn decode_err(msg: impl Into<String>) -> SnmpError {
    SnmpError::Decode(msg.into())
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    write_length(out, body.len());
    out.extend_from_slice(body);
}

fn write_integer(out: &mut Vec<u8>, value: i64) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // Strip redundant sign bytes, keeping the sign bit of the next byte intact.
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    write_tlv(out, TAG_INTEGER, &bytes[start..]);
}

fn write_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut tmp = [0u8; 5];
    let mut i = tmp.len();
    loop {
        i -= 1;
        tmp[i] = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    let last = tmp.len() - 1;
    for (offset, byte) in tmp[i..].iter().enumerate() {
        if i + offset == last {
            out.push(*byte);
        } else {
            out.push(byte | 0x80);
        }
    }
}

fn write_oid(out: &mut Vec<u8>, oid: &Oid) {
    let arcs = oid.arcs();
    let mut body = Vec::with_capacity(arcs.len() + 2);
    match arcs {
        [first, second, rest @ ..] => {
            write_base128(&mut body, first * 40 + second);
            for arc in rest {
                write_base128(&mut body, *arc);
            }
        }
        [first] => write_base128(&mut body, first * 40),
        [] => {}
    }
    write_tlv(out, TAG_OID, &body);
}

fn decode_oid(body: &[u8]) -> Result<Oid, SnmpError> {
    let mut subids = Vec::new();
    let mut acc: u64 = 0;
    let mut pending = false;
    for byte in body {
        acc = (acc << 7) | u64::from(byte & 0x7F);
        if acc > u64::from(u32::MAX) {
            return Err(decode_err("oid arc overflow"));
        }
        pending = true;
        if byte & 0x80 == 0 {
            subids.push(acc as u32);
            acc = 0;
            pending = false;
        }
    }
    if pending {
        return Err(decode_err("truncated oid"));
    }

    let Some((&first, rest)) = subids.split_first() else {
        return Err(decode_err("empty oid"));
    };
    let (a, b) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut arcs = Vec::with_capacity(subids.len() + 1);
    arcs.push(a);
    arcs.push(b);
    arcs.extend_from_slice(rest);
    Ok(Oid::new(arcs))
}

fn decode_signed(body: &[u8]) -> Result<i64, SnmpError> {
    if body.is_empty() || body.len() > 8 {
        return Err(decode_err(format!("bad integer length {}", body.len())));
    }
    let mut value: i64 = if body[0] & 0x80 != 0 { -1 } else { 0 };
    for byte in body {
        value = (value << 8) | i64::from(*byte);
    }
    Ok(value)
}

fn decode_unsigned(body: &[u8]) -> Result<u64, SnmpError> {
    let trimmed = match body {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    };
    if trimmed.is_empty() || trimmed.len() > 8 {
        return Err(decode_err(format!("bad unsigned length {}", body.len())));
    }
    Ok(trimmed
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
}

fn decode_u32(body: &[u8]) -> Result<u32, SnmpError> {
    u32::try_from(decode_unsigned(body)?).map_err(|_| decode_err("32-bit value overflow"))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, SnmpError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| decode_err("unexpected end of message"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_length(&mut self) -> Result<usize, SnmpError> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }
        let count = usize::from(first & 0x7F);
        if count == 0 || count > 4 {
            return Err(decode_err(format!("unsupported length form {first:#04x}")));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | usize::from(self.byte()?);
        }
        Ok(len)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), SnmpError> {
        let tag = self.byte()?;
        let len = self.read_length()?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| decode_err("length exceeds message"))?;
        let body = &self.buf[self.pos..end];
        self.pos = end;
        Ok((tag, body))
    }

    fn expect(&mut self, want: u8) -> Result<Reader<'a>, SnmpError> {
        let (tag, body) = self.read_tlv()?;
        if tag != want {
            return Err(decode_err(format!(
                "expected tag {want:#04x}, found {tag:#04x}"
            )));
        }
        Ok(Reader::new(body))
    }

    fn read_integer(&mut self) -> Result<i64, SnmpError> {
        let (tag, body) = self.read_tlv()?;
        if tag != TAG_INTEGER {
            return Err(decode_err(format!("expected integer, found {tag:#04x}")));
        }
        decode_signed(body)
    }

    fn read_value(&mut self) -> Result<SnmpValue, SnmpError> {
        let (tag, body) = self.read_tlv()?;
        let value = match tag {
            TAG_INTEGER => SnmpValue::Integer(decode_signed(body)?),
            TAG_OCTET_STRING => SnmpValue::OctetString(body.to_vec()),
            TAG_NULL => SnmpValue::Null,
            TAG_OID => SnmpValue::ObjectId(decode_oid(body)?),
            TAG_IP_ADDRESS => {
                let octets: [u8; 4] = body
                    .try_into()
                    .map_err(|_| decode_err("ip address must be 4 bytes"))?;
                SnmpValue::IpAddress(octets)
            }
            TAG_COUNTER32 => SnmpValue::Counter32(decode_u32(body)?),
            TAG_GAUGE32 => SnmpValue::Gauge32(decode_u32(body)?),
            TAG_TIMETICKS => SnmpValue::TimeTicks(decode_u32(body)?),
            TAG_OPAQUE => SnmpValue::Opaque(body.to_vec()),
            TAG_COUNTER64 => SnmpValue::Counter64(decode_unsigned(body)?),
            TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
            TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
            TAG_END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
            other => return Err(decode_err(format!("unsupported value tag {other:#04x}"))),
        };
        Ok(value)
    }
}
