// Licensed under the Apache-2.0 license

//! Response extraction tests

use crate::common::{payload, test_constants::*, TestBed};
use virtio_tpm_testing::{build_response, EchoResponder, FixedResponder, LoopbackDevice};
use virtio_tpm_transport::{TransportError, TPM_RESPONSE_LEN};

#[test]
fn test_twenty_byte_response() {
    println!("Testing a 20 byte response to a 12 byte command...");

    let expected = payload(0xa0, 20);
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(FixedResponder::with_payload(TAG_NO_SESSIONS, &expected)),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();

    tpm.send(&STARTUP_CLEAR).expect("Failed to send command");
    assert_eq!(tpm.response_len(), 28, "Header plus payload");

    let mut buf = [0u8; 32];
    let len = tpm.recv(&mut buf).expect("Failed to receive response");
    assert_eq!(len, 20);
    assert_eq!(&buf[..20], expected.as_slice());
    assert_eq!(&buf[20..], &[0u8; 12], "Bytes past the payload are untouched");

    println!("Response test completed successfully!");
}

#[test]
fn test_recv_before_send() {
    let bed = TestBed::new(LoopbackDevice::new(), TEST_TIMEOUT_MS);
    let mut buf = [0u8; 16];
    assert_eq!(
        bed.driver.transport().recv(&mut buf),
        Err(TransportError::NoResponse)
    );
}

#[test]
fn test_small_buffer_is_refused() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(FixedResponder::with_payload(
            TAG_NO_SESSIONS,
            &payload(1, 20),
        )),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();
    tpm.send(&GET_RANDOM_8).expect("Failed to send command");

    let mut small = [0u8; 19];
    assert_eq!(
        tpm.recv(&mut small),
        Err(TransportError::SizeMismatch {
            needed: 20,
            capacity: 19
        })
    );
    assert_eq!(small, [0u8; 19], "Nothing copied on failure");

    let mut exact = [0u8; 20];
    assert_eq!(tpm.recv(&mut exact), Ok(20), "Response is still readable");
}

#[test]
fn test_recv_is_repeatable() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(EchoResponder),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();
    tpm.send(&GET_RANDOM_8).expect("Failed to send command");

    let mut first = [0u8; 16];
    let mut second = [0u8; 16];
    assert_eq!(tpm.recv(&mut first), Ok(12));
    assert_eq!(tpm.recv(&mut second), Ok(12));
    assert_eq!(first, second);
}

#[test]
fn test_empty_payload() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(FixedResponder::with_payload(TAG_NO_SESSIONS, &[])),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();
    tpm.send(&GET_RANDOM_8).expect("Failed to send command");

    let mut buf = [0u8; 0];
    assert_eq!(tpm.recv(&mut buf), Ok(0));
}

#[test]
fn test_header_longer_than_completion() {
    let mut response = build_response(TAG_NO_SESSIONS, &[1, 2, 3, 4]);
    response[4..8].copy_from_slice(&100u32.to_be_bytes());
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(FixedResponder::new(response)),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();
    tpm.send(&GET_RANDOM_8).expect("Failed to send command");

    let mut buf = [0u8; 256];
    assert_eq!(
        tpm.recv(&mut buf),
        Err(TransportError::LengthMismatch {
            declared: 100,
            available: 4
        })
    );
}

#[test]
fn test_oversized_response_is_truncated_by_device() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(FixedResponder::with_payload(
            TAG_NO_SESSIONS,
            &vec![0x55; 600],
        )),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();
    tpm.send(&GET_RANDOM_8).expect("Failed to send command");
    assert_eq!(tpm.response_len(), TPM_RESPONSE_LEN);

    let mut buf = vec![0u8; 1024];
    assert_eq!(
        tpm.recv(&mut buf),
        Err(TransportError::LengthMismatch {
            declared: 600,
            available: TPM_RESPONSE_LEN - 8
        })
    );
}

#[test]
fn test_truncated_header() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(FixedResponder::new(vec![0x00, 0x00, 0x80, 0x01])),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();
    tpm.send(&GET_RANDOM_8).expect("Failed to send command");

    let mut buf = [0u8; 16];
    assert_eq!(
        tpm.recv(&mut buf),
        Err(TransportError::MalformedResponse(4))
    );
}
