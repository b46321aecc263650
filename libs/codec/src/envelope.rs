//! # Wire Envelope Framing
//!
//! Envelopes whose target lives in another context leave the process as one frame:
//!
//! ```text
//! magic u32 | ver u8 | flags u8 | rsv u16 | body_len u32 | crc32 u32
//!
//! tag kind u8 | tag fields | target aid | target service | source aid | is_err_ret u8
//!     | message type u64 | payload len u32 | payload
//! ```
//!
//! All integers are big-endian. The checksum covers the body only. Decoding a frame
//! held in [`Bytes`] slices the payload out of the same allocation.

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use strand_types::{
    Aid, CtxId, Exit, ExitCode, Link, LinkKind, MatchType, Message, Recver, Request, Response,
    ServiceId, Tag,
};
use tracing::trace;

/// One envelope in transit between contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEnvelope {
    pub tag: Tag,
    /// Target actor; nil when the envelope is addressed to a service.
    pub target: Aid,
    /// Target service; nil when the envelope is addressed to an actor.
    pub target_svc: ServiceId,
    /// Actor that put the envelope on the wire.
    pub source: Aid,
    /// Set on envelopes synthesized as an error reply; these never bounce.
    pub is_err_ret: bool,
    pub msg: Message,
}

impl WireEnvelope {
    pub fn new(target: impl Into<Recver>, tag: Tag, msg: Message) -> Self {
        let (target, target_svc) = match target.into() {
            Recver::Aid(aid) => (aid, ServiceId::default()),
            Recver::Service(svc) => (Aid::nil(), svc),
        };
        Self {
            tag,
            target,
            target_svc,
            source: tag.sender(),
            is_err_ret: false,
            msg,
        }
    }

    pub fn with_source(mut self, source: Aid) -> Self {
        self.source = source;
        self
    }

    pub fn err_ret(mut self) -> Self {
        self.is_err_ret = true;
        self
    }

    /// Whoever the envelope is addressed to.
    pub fn recver(&self) -> Recver {
        if self.target.is_nil() {
            Recver::Service(self.target_svc)
        } else {
            Recver::Aid(self.target)
        }
    }

    /// Context the envelope is addressed to.
    pub fn target_ctxid(&self) -> CtxId {
        match self.recver() {
            Recver::Aid(aid) => aid.ctxid,
            Recver::Service(svc) => svc.ctxid,
        }
    }

    fn body_len(&self) -> usize {
        let tag_len = 1 + match self.tag {
            Tag::Direct(_) => AID_WIRE_SIZE,
            Tag::Request(_) | Tag::Response(_) => 8 + AID_WIRE_SIZE,
            Tag::Exit(_) | Tag::Link(_) => 1 + AID_WIRE_SIZE,
        };
        tag_len + AID_WIRE_SIZE + SERVICE_WIRE_SIZE + AID_WIRE_SIZE + 1 + 8 + 4 + self.msg.len()
    }
}

/// Encode `env` as a complete frame.
pub fn encode(env: &WireEnvelope) -> ProtocolResult<Bytes> {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + env.body_len());
    encode_into(env, &mut buf)?;
    Ok(buf.freeze())
}

/// Append the frame for `env` to `buf`.
pub fn encode_into(env: &WireEnvelope, buf: &mut BytesMut) -> ProtocolResult<()> {
    if env.msg.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::payload_too_large(
            env.msg.len(),
            MAX_PAYLOAD_SIZE,
        ));
    }

    let body_len = env.body_len();
    buf.reserve(FRAME_HEADER_SIZE + body_len);
    let header_at = buf.len();
    buf.put_u32(FRAME_MAGIC);
    buf.put_u8(FRAME_VERSION);
    buf.put_u8(0);
    buf.put_u16(0);
    buf.put_u32(body_len as u32);
    buf.put_u32(0);

    let body_at = buf.len();
    put_tag(buf, &env.tag);
    put_aid(buf, &env.target);
    put_service(buf, &env.target_svc);
    put_aid(buf, &env.source);
    buf.put_u8(env.is_err_ret as u8);
    buf.put_u64(env.msg.ty().value());
    buf.put_u32(env.msg.len() as u32);
    buf.put_slice(env.msg.payload());

    let crc = crc32fast::hash(&buf[body_at..]);
    buf[header_at + 12..header_at + 16].copy_from_slice(&crc.to_be_bytes());

    trace!(
        tag = env.tag.kind_name(),
        target = %env.recver(),
        body_len,
        "Encoded envelope frame"
    );
    Ok(())
}

/// Total size of the frame starting at `buf[0]`, or `None` while the header is incomplete.
pub fn frame_len(buf: &[u8]) -> ProtocolResult<Option<usize>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let mut header = &buf[..FRAME_HEADER_SIZE];
    let magic = header.get_u32();
    if magic != FRAME_MAGIC {
        return Err(ProtocolError::invalid_magic(FRAME_MAGIC, magic, 0));
    }
    let version = header.get_u8();
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ProtocolError::unsupported_version(version, SUPPORTED_VERSIONS));
    }
    header.advance(3);
    let body_len = header.get_u32() as usize;
    if body_len > MAX_PAYLOAD_SIZE + MAX_BODY_OVERHEAD {
        return Err(ProtocolError::payload_too_large(body_len, MAX_PAYLOAD_SIZE));
    }
    Ok(Some(FRAME_HEADER_SIZE + body_len))
}

/// Split one complete frame off the front of a stream buffer and decode it.
pub fn decode_stream(buf: &mut BytesMut) -> ProtocolResult<Option<WireEnvelope>> {
    match frame_len(buf)? {
        Some(len) if buf.len() >= len => decode(buf.split_to(len).freeze()).map(Some),
        _ => Ok(None),
    }
}

/// Decode exactly one frame.
pub fn decode(mut frame: Bytes) -> ProtocolResult<WireEnvelope> {
    let total = match frame_len(&frame)? {
        Some(total) => total,
        None => {
            return Err(ProtocolError::message_too_small(
                FRAME_HEADER_SIZE,
                frame.len(),
                "frame header",
            ))
        }
    };
    if frame.len() < total {
        return Err(ProtocolError::message_too_small(
            total,
            frame.len(),
            "frame body",
        ));
    }

    let expected_crc = u32::from_be_bytes([frame[12], frame[13], frame[14], frame[15]]);
    frame.advance(FRAME_HEADER_SIZE);
    let body_len = total - FRAME_HEADER_SIZE;
    let body = frame.split_to(body_len);
    let calculated = crc32fast::hash(&body);
    if calculated != expected_crc {
        return Err(ProtocolError::checksum_mismatch(
            expected_crc,
            calculated,
            body_len,
        ));
    }

    let mut reader = Reader::new(body);
    let tag = reader.tag()?;
    let target = reader.aid()?;
    let target_svc = reader.service()?;
    let source = reader.aid()?;
    let is_err_ret = reader.u8("error reply flag")? != 0;
    let ty = MatchType(reader.u64("message type")?);
    let len = reader.u32("payload length")? as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::payload_too_large(len, MAX_PAYLOAD_SIZE));
    }
    let payload = reader.bytes(len, "payload")?;
    if reader.offset != body_len {
        return Err(ProtocolError::LengthMismatch {
            declared: body_len,
            consumed: reader.offset,
        });
    }

    Ok(WireEnvelope {
        tag,
        target,
        target_svc,
        source,
        is_err_ret,
        msg: Message::from_bytes(ty, payload),
    })
}

fn put_aid(buf: &mut BytesMut, aid: &Aid) {
    buf.put_u64(aid.ctxid.0.value());
    buf.put_u32(aid.strand);
    buf.put_u32(aid.slot);
    buf.put_u32(aid.generation);
}

fn put_tag(buf: &mut BytesMut, tag: &Tag) {
    match tag {
        Tag::Direct(from) => {
            buf.put_u8(TAG_DIRECT);
            put_aid(buf, from);
        }
        Tag::Request(req) => {
            buf.put_u8(TAG_REQUEST);
            buf.put_u64(req.sid);
            put_aid(buf, &req.from);
        }
        Tag::Response(res) => {
            buf.put_u8(TAG_RESPONSE);
            buf.put_u64(res.sid);
            put_aid(buf, &res.from);
        }
        Tag::Exit(ex) => {
            buf.put_u8(TAG_EXIT);
            buf.put_u8(ex.code as u8);
            put_aid(buf, &ex.from);
        }
        Tag::Link(link) => {
            buf.put_u8(TAG_LINK);
            buf.put_u8(link.kind as u8);
            put_aid(buf, &link.peer);
        }
    }
}

fn put_service(buf: &mut BytesMut, svc: &ServiceId) {
    buf.put_u64(svc.ctxid.0.value());
    buf.put_u64(svc.name.value());
}

/// Bounds-checked cursor over a frame body.
struct Reader {
    body: Bytes,
    offset: usize,
}

impl Reader {
    fn new(body: Bytes) -> Self {
        Self { body, offset: 0 }
    }

    fn need(&self, n: usize, context: &str) -> ProtocolResult<()> {
        if self.body.remaining() < n {
            return Err(ProtocolError::message_too_small(
                self.offset + n,
                self.offset + self.body.remaining(),
                context,
            ));
        }
        Ok(())
    }

    fn u8(&mut self, context: &str) -> ProtocolResult<u8> {
        self.need(1, context)?;
        self.offset += 1;
        Ok(self.body.get_u8())
    }

    fn u32(&mut self, context: &str) -> ProtocolResult<u32> {
        self.need(4, context)?;
        self.offset += 4;
        Ok(self.body.get_u32())
    }

    fn u64(&mut self, context: &str) -> ProtocolResult<u64> {
        self.need(8, context)?;
        self.offset += 8;
        Ok(self.body.get_u64())
    }

    fn bytes(&mut self, n: usize, context: &str) -> ProtocolResult<Bytes> {
        self.need(n, context)?;
        self.offset += n;
        Ok(self.body.split_to(n))
    }

    fn aid(&mut self) -> ProtocolResult<Aid> {
        self.need(AID_WIRE_SIZE, "actor id")?;
        let ctxid = CtxId(MatchType(self.u64("actor ctxid")?));
        let strand = self.u32("actor strand")?;
        let slot = self.u32("actor slot")?;
        let generation = self.u32("actor generation")?;
        Ok(Aid::new(ctxid, strand, slot, generation))
    }

    fn tag(&mut self) -> ProtocolResult<Tag> {
        let at = self.offset;
        let kind = self.u8("tag kind")?;
        let tag = match kind {
            TAG_DIRECT => Tag::Direct(self.aid()?),
            TAG_REQUEST => {
                let sid = self.u64("request sid")?;
                Tag::Request(Request {
                    sid,
                    from: self.aid()?,
                })
            }
            TAG_RESPONSE => {
                let sid = self.u64("response sid")?;
                Tag::Response(Response {
                    sid,
                    from: self.aid()?,
                })
            }
            TAG_EXIT => {
                let field_at = self.offset;
                let raw = self.u8("exit code")?;
                let code = ExitCode::try_from(raw)
                    .map_err(|v| ProtocolError::invalid_field("exit code", v, field_at))?;
                Tag::Exit(Exit {
                    code,
                    from: self.aid()?,
                })
            }
            TAG_LINK => {
                let field_at = self.offset;
                let raw = self.u8("link kind")?;
                let kind = LinkKind::try_from(raw)
                    .map_err(|v| ProtocolError::invalid_field("link kind", v, field_at))?;
                Tag::Link(Link {
                    kind,
                    peer: self.aid()?,
                })
            }
            other => return Err(ProtocolError::UnknownTagKind { kind: other, offset: at }),
        };
        Ok(tag)
    }

    fn service(&mut self) -> ProtocolResult<ServiceId> {
        let ctxid = CtxId(MatchType(self.u64("service ctxid")?));
        let name = MatchType(self.u64("service name")?);
        Ok(ServiceId::new(ctxid, name))
    }
}
