use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{
    IOT_ETX, IOT_LSCB_BODY, IOT_LSCB_HEADER, IOT_MAX_HEADERS, IOT_MSCB_ID, IOT_MSCB_PATH,
    IOT_PREFIX_RESERVE, IOT_RS,
};
use crate::error::ProtocolError;
use crate::method::Method;
use crate::request::Request;

/// A frame split into its control prefix and its (unchunked) body.
///
/// The prefix already reflects whatever `id`, `path`, and `headers` the
/// request carries; the caller is responsible for splitting `body` into
/// `buffer_size`-bounded fragments and re-emitting `prefix` ahead of each
/// one, per the wire format's multipart convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Control bytes through the body-length field, inclusive.
    pub prefix: Bytes,
    /// The full, unfragmented body.
    pub body: Bytes,
}

/// Encodes `request` against a negotiated `buffer_size`.
///
/// `request.id` must already be resolved (`None` if
/// `request.method.forbids_id()`, caller's choice otherwise) — allocation
/// against an in-flight table is a connection-level concern, not this
/// codec's.
///
/// # Errors
///
/// Returns [`ProtocolError::TooManyHeaders`] if there are more than 255
/// headers, [`ProtocolError::PrefixTooLarge`] if path+headers don't fit the
/// buffer budget, [`ProtocolError::BodyTooLarge`] if the body exceeds the
/// method's length-field width, and [`ProtocolError::AliveFrameCarriesPayload`]
/// if an alive method was asked to carry a path, headers, or a body, or
/// [`ProtocolError::IdNotAllowed`] if an alive/buffer-size method was asked
/// to carry an id.
pub fn encode(request: &Request, buffer_size: u32) -> Result<EncodedFrame, ProtocolError> {
    let method = request.method;

    if !method.carries_payload() && (request.path.is_some() || !request.headers.is_empty() || !request.body.is_empty())
    {
        return Err(ProtocolError::AliveFrameCarriesPayload);
    }

    if method.forbids_id() && request.id.is_some() {
        return Err(ProtocolError::IdNotAllowed(method));
    }

    if request.headers.len() > IOT_MAX_HEADERS {
        return Err(ProtocolError::TooManyHeaders(request.headers.len()));
    }

    let body_len = request.body.len() as u32;
    if body_len > method.max_body_len() {
        return Err(ProtocolError::BodyTooLarge { found: body_len, limit: method.max_body_len() });
    }

    let path_bytes = request.path.as_deref().map(str::len).unwrap_or(0) as u32;
    let has_path = request.path.is_some();
    let encoded_headers_len: u32 = request
        .headers
        .iter()
        .map(|(k, v)| (k.len() + 1 + v.len() + 1) as u32)
        .sum::<u32>()
        + u32::from(!request.headers.is_empty());
    let prefix_and_headers = path_bytes + u32::from(has_path) + encoded_headers_len;
    let limit = buffer_size.saturating_sub(IOT_PREFIX_RESERVE);
    if prefix_and_headers > limit {
        return Err(ProtocolError::PrefixTooLarge { found: prefix_and_headers, limit });
    }

    let mut prefix = BytesMut::new();

    let has_id = request.id.is_some();
    let mut mscb = request.version.min(63) << 2;
    if has_id {
        mscb |= IOT_MSCB_ID;
    }
    if has_path {
        mscb |= IOT_MSCB_PATH;
    }

    let mut lscb = (method as u8) << 2;
    if !request.headers.is_empty() {
        lscb |= IOT_LSCB_HEADER;
    }
    if !request.body.is_empty() {
        lscb |= IOT_LSCB_BODY;
    }

    prefix.put_u8(mscb);
    prefix.put_u8(lscb);

    if let Some(id) = request.id {
        prefix.put_u16(id);
    }

    if let Some(path) = &request.path {
        prefix.put_slice(path.as_bytes());
        prefix.put_u8(IOT_ETX);
    }

    if !request.headers.is_empty() {
        prefix.put_u8(request.headers.len() as u8);
        for (key, value) in &request.headers {
            prefix.put_slice(key.as_bytes());
            prefix.put_u8(IOT_RS);
            prefix.put_slice(value.as_bytes());
            prefix.put_u8(IOT_ETX);
        }
    }

    if !request.body.is_empty() {
        match method.body_len_width() {
            1 => prefix.put_u8(body_len as u8),
            2 => prefix.put_u16(body_len as u16),
            4 => prefix.put_u32(body_len),
            _ => {}
        }
    }

    Ok(EncodedFrame { prefix: prefix.freeze(), body: request.body.clone() })
}

/// One fragment parsed from the head of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFragment {
    /// The request this fragment contributes to. `body` holds only the
    /// bytes this fragment delivered; `total_body_length` is the
    /// authoritative total declared by the frame's length field.
    pub request: Request,
    /// Bytes consumed from the input buffer by this fragment.
    pub consumed: usize,
}

/// Parses one fragment from the head of `buf`.
///
/// `already_received` is the number of body bytes already reassembled for
/// this frame's id (0 for the first fragment); the caller (the reassembly
/// engine) supplies it so this function can compute how many of the
/// remaining body bytes belong to this fragment versus the next frame that
/// may follow it in the same buffer.
///
/// Returns `Ok(None)` when `buf` does not yet contain enough bytes to
/// determine the control bytes, id, or body-length field (the caller should
/// retain `buf` as a remainder and wait for more data). Returns `Err` for
/// any frame judged malformed outright (e.g. a path with no ETX) rather than
/// incomplete — those are dropped, not buffered.
///
/// # Errors
///
/// See [`ProtocolError`] variants other than those implying "need more
/// bytes", which this function signals via `Ok(None)` instead.
pub fn decode_fragment(buf: &[u8], already_received: u32) -> Result<Option<DecodedFragment>, ProtocolError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let mscb = buf[0];
    let lscb = buf[1];
    let version = (mscb >> 2).max(1).min(63);
    let has_id = mscb & IOT_MSCB_ID != 0;
    let has_path = mscb & IOT_MSCB_PATH != 0;
    let has_headers = lscb & IOT_LSCB_HEADER != 0;
    let has_body = lscb & IOT_LSCB_BODY != 0;
    let method = Method::from_u8(lscb >> 2)?;

    if !method.carries_payload() && (has_path || has_headers || has_body) {
        return Err(ProtocolError::AliveFrameCarriesPayload);
    }
    if method.forbids_id() && has_id {
        return Err(ProtocolError::IdNotAllowed(method));
    }

    let mut cursor = 2usize;

    let id = if has_id {
        if buf.len() < cursor + 2 {
            return Ok(None);
        }
        let value = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]);
        cursor += 2;
        Some(value)
    } else {
        None
    };

    let path = if has_path {
        let Some(etx_offset) = buf[cursor..].iter().position(|&b| b == IOT_ETX) else {
            return Err(ProtocolError::MissingPathTerminator);
        };
        let raw = &buf[cursor..cursor + etx_offset];
        let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::NonUtf8Field { field: "path" })?;
        let text = text.to_owned();
        cursor += etx_offset + 1;
        Some(text)
    } else {
        None
    };

    let mut headers = crate::request::Headers::new();
    if has_headers {
        if buf.len() < cursor + 1 {
            return Ok(None);
        }
        let count = buf[cursor] as usize;
        cursor += 1;
        if count > IOT_MAX_HEADERS {
            return Err(ProtocolError::TooManyHeaders(count));
        }
        for _ in 0..count {
            let Some(rs_offset) = buf[cursor..].iter().position(|&b| b == IOT_RS) else {
                return Err(ProtocolError::MissingHeaderTerminator);
            };
            let key_raw = &buf[cursor..cursor + rs_offset];
            let key =
                std::str::from_utf8(key_raw).map_err(|_| ProtocolError::NonUtf8Field { field: "header key" })?;
            let key = key.to_owned();
            cursor += rs_offset + 1;

            let Some(etx_offset) = buf[cursor..].iter().position(|&b| b == IOT_ETX) else {
                return Err(ProtocolError::MissingHeaderTerminator);
            };
            let value_raw = &buf[cursor..cursor + etx_offset];
            let value =
                std::str::from_utf8(value_raw).map_err(|_| ProtocolError::NonUtf8Field { field: "header value" })?;
            let value = value.to_owned();
            cursor += etx_offset + 1;

            headers.insert(key, value);
        }
    }

    let mut total_body_length = 0u32;
    if has_body {
        let width = method.body_len_width();
        if buf.len() < cursor + width {
            return Ok(None);
        }
        total_body_length = match width {
            1 => u32::from(buf[cursor]),
            2 => u32::from(u16::from_be_bytes([buf[cursor], buf[cursor + 1]])),
            4 => u32::from_be_bytes([buf[cursor], buf[cursor + 1], buf[cursor + 2], buf[cursor + 3]]),
            _ => 0,
        };
        cursor += width;
    }

    let remaining_needed = total_body_length.saturating_sub(already_received);
    let available_body = (buf.len() - cursor) as u32;
    let chunk_len = remaining_needed.min(available_body) as usize;

    let body = Bytes::copy_from_slice(&buf[cursor..cursor + chunk_len]);
    cursor += chunk_len;

    let request = Request {
        version,
        method,
        id,
        path,
        headers,
        body,
        total_body_length,
        parts: 1,
    };

    Ok(Some(DecodedFragment { request, consumed: cursor }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[test]
    fn minimal_signal_encodes_to_two_bytes() {
        let req = Request::new(Method::Signal);
        let encoded = encode(&req, 1024).unwrap();
        assert_eq!(encoded.prefix.as_ref(), &[0x04, 0x04][..]);
        assert!(encoded.body.is_empty());
    }

    #[test]
    fn minimal_signal_decodes_from_two_bytes() {
        let decoded = decode_fragment(&[0x04, 0x04], 0).unwrap().unwrap();
        assert_eq!(decoded.consumed, 2);
        assert_eq!(decoded.request.method, Method::Signal);
        assert_eq!(decoded.request.version, 1);
        assert!(decoded.request.id.is_none());
        assert!(decoded.request.path.is_none());
        assert!(decoded.request.headers.is_empty());
        assert!(decoded.request.body.is_empty());
    }

    #[test]
    fn signal_with_path_and_body_matches_literal_bytes() {
        let req = Request::new(Method::Signal).with_path("/x").with_body(&b"hi"[..]);
        let encoded = encode(&req, 1024).unwrap();
        let mut full = BytesMut::new();
        full.extend_from_slice(&encoded.prefix);
        full.extend_from_slice(&encoded.body);
        assert_eq!(full.as_ref(), &[0x05, 0x05, b'/', b'x', 0x03, 0x02, b'h', b'i'][..]);
    }

    #[test]
    fn request_with_id_path_header_and_body_matches_literal_bytes() {
        let req = Request::new(Method::Request)
            .with_id(276)
            .with_path("/a")
            .with_header("foo", "bar")
            .with_body(&b"hi"[..]);
        let encoded = encode(&req, 1024).unwrap();
        let mut full = BytesMut::new();
        full.extend_from_slice(&encoded.prefix);
        full.extend_from_slice(&encoded.body);

        let expected = [
            0x07, 0x0B, 0x01, 0x14, b'/', b'a', 0x03, 0x01, b'f', b'o', b'o', 0x1E, b'b', b'a', b'r', 0x03, 0x00,
            0x02, b'h', b'i',
        ];
        assert_eq!(full.as_ref(), &expected[..]);
    }

    #[test]
    fn alive_request_rejects_attached_payload() {
        let req = Request::new(Method::AliveRequest).with_path("/nope");
        assert_eq!(encode(&req, 1024), Err(ProtocolError::AliveFrameCarriesPayload));
    }

    #[test]
    fn missing_path_terminator_is_rejected() {
        let buf = [0x05, 0x04, b'/', b'x'];
        assert_eq!(decode_fragment(&buf, 0), Err(ProtocolError::MissingPathTerminator));
    }

    #[test]
    fn short_buffer_waits_for_more_bytes() {
        assert_eq!(decode_fragment(&[0x04], 0), Ok(None));
        assert_eq!(decode_fragment(&[], 0), Ok(None));
    }

    #[test]
    fn oversized_signal_body_is_rejected_at_encode() {
        let body = vec![0u8; 256];
        let req = Request::new(Method::Signal).with_body(body);
        assert_eq!(encode(&req, 1024), Err(ProtocolError::BodyTooLarge { found: 256, limit: 255 }));
    }

    #[test]
    fn multipart_fragment_consumes_only_declared_remainder() {
        let req = Request::new(Method::Streaming).with_id(1).with_body(vec![b'a'; 1500]);
        let encoded = encode(&req, 1024).unwrap();
        let prefix_len = encoded.prefix.len();
        let first_chunk_cap = 1024 - prefix_len;

        let mut first_write = BytesMut::new();
        first_write.extend_from_slice(&encoded.prefix);
        first_write.extend_from_slice(&encoded.body[..first_chunk_cap]);

        let decoded = decode_fragment(&first_write, 0).unwrap().unwrap();
        assert_eq!(decoded.request.body.len(), first_chunk_cap);
        assert_eq!(decoded.request.total_body_length, 1500);
        assert_eq!(decoded.consumed, first_write.len());

        let mut second_write = BytesMut::new();
        second_write.extend_from_slice(&encoded.prefix);
        second_write.extend_from_slice(&encoded.body[first_chunk_cap..]);

        let decoded2 = decode_fragment(&second_write, first_chunk_cap as u32).unwrap().unwrap();
        assert_eq!(decoded2.request.body.len(), 1500 - first_chunk_cap);
        assert_eq!(
            first_chunk_cap as u32 + decoded2.request.body.len() as u32,
            decoded2.request.total_body_length
        );
    }
}
