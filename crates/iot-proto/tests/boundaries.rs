use bytes::Bytes;
use iot_proto::{decode_fragment, encode, Method, ProtocolError, Request};

const BUFFER_SIZE: u32 = 1024;

#[test]
fn signal_body_of_255_bytes_encodes() {
    let req = Request::new(Method::Signal).with_body(vec![0u8; 255]);
    let encoded = encode(&req, BUFFER_SIZE).unwrap();
    assert_eq!(encoded.body.len(), 255);
}

#[test]
fn signal_body_of_256_bytes_is_rejected() {
    let req = Request::new(Method::Signal).with_body(vec![0u8; 256]);
    assert_eq!(encode(&req, BUFFER_SIZE), Err(ProtocolError::BodyTooLarge { found: 256, limit: 255 }));
}

#[test]
fn request_body_of_65535_bytes_round_trips() {
    let req = Request::new(Method::Request).with_id(1).with_body(vec![b'x'; 65_535]);
    let encoded = encode(&req, 70_000).unwrap();
    let mut buf = bytes::BytesMut::new();
    buf.extend_from_slice(&encoded.prefix);
    buf.extend_from_slice(&encoded.body);

    let decoded = decode_fragment(&buf, 0).unwrap().unwrap();
    assert_eq!(decoded.request.total_body_length, 65_535);
    assert_eq!(decoded.request.body.len(), 65_535);
}

#[test]
fn request_body_of_65536_bytes_is_rejected() {
    let req = Request::new(Method::Request).with_id(1).with_body(vec![b'x'; 65_536]);
    assert_eq!(encode(&req, 70_000), Err(ProtocolError::BodyTooLarge { found: 65_536, limit: 65_535 }));
}

#[test]
fn response_body_of_65535_bytes_round_trips() {
    let req = Request::new(Method::Response).with_id(1).with_body(vec![b'y'; 65_535]);
    let encoded = encode(&req, 70_000).unwrap();
    assert_eq!(encoded.body.len(), 65_535);
}

#[test]
fn streaming_body_near_four_gib_limit_is_not_rejected_by_method_cap() {
    // We don't actually allocate 4 GiB; this checks the *declared* cap only.
    assert_eq!(Method::Streaming.max_body_len(), u32::MAX);
}

#[test]
fn header_count_of_255_is_accepted() {
    let mut req = Request::new(Method::Signal);
    for i in 0..255u32 {
        req = req.with_header(format!("h{i}"), "v");
    }
    assert_eq!(req.headers.len(), 255);
    assert!(encode(&req, 1 << 20).is_ok());
}

#[test]
fn header_count_of_256_is_rejected() {
    let mut req = Request::new(Method::Signal);
    for i in 0..256u32 {
        req = req.with_header(format!("h{i}"), "v");
    }
    assert_eq!(encode(&req, 1 << 20), Err(ProtocolError::TooManyHeaders(256)));
}

// `prefix_and_headers = path_bytes + 1 (path ETX) + [key.len() + 1 (RS) +
// value.len() + 1 (ETX)] + 1 (header-count byte)`. With a one-byte key this
// is `path.len() + value.len() + 5`; solve for `value.len()` to land exactly
// on (or one past) the `buffer_size - 8` budget.
const PATH: &str = "/abcde";
const FIXED_OVERHEAD: usize = 5;

#[test]
fn path_plus_headers_exactly_at_budget_is_accepted() {
    let buffer_size = 64u32;
    let budget = (buffer_size - 8) as usize;
    let value_len = budget - PATH.len() - FIXED_OVERHEAD;
    let value = "v".repeat(value_len);

    let req = Request::new(Method::Signal).with_path(PATH).with_header("k", value);
    assert!(encode(&req, buffer_size).is_ok());
}

#[test]
fn path_plus_headers_one_byte_over_budget_is_rejected() {
    let buffer_size = 64u32;
    let budget = (buffer_size - 8) as usize;
    let value_len = budget - PATH.len() - FIXED_OVERHEAD + 1;
    let value = "v".repeat(value_len);

    let req = Request::new(Method::Signal).with_path(PATH).with_header("k", value);
    assert!(matches!(encode(&req, buffer_size), Err(ProtocolError::PrefixTooLarge { .. })));
}

#[test]
fn alive_frames_never_carry_path_headers_or_body() {
    assert_eq!(
        encode(&Request::new(Method::AliveRequest).with_header("x", "y"), BUFFER_SIZE),
        Err(ProtocolError::AliveFrameCarriesPayload)
    );
    assert_eq!(
        encode(&Request::new(Method::AliveResponse).with_body(Bytes::from_static(b"x")), BUFFER_SIZE),
        Err(ProtocolError::AliveFrameCarriesPayload)
    );
}

#[test]
fn buffer_size_and_alive_methods_reject_an_explicit_id() {
    assert_eq!(
        encode(&Request::new(Method::BufferSizeRequest).with_id(7), BUFFER_SIZE),
        Err(ProtocolError::IdNotAllowed(Method::BufferSizeRequest))
    );
    assert_eq!(
        encode(&Request::new(Method::AliveResponse).with_id(7), BUFFER_SIZE),
        Err(ProtocolError::IdNotAllowed(Method::AliveResponse))
    );
}
