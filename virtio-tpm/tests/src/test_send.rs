// Licensed under the Apache-2.0 license

//! Command submission tests

use crate::common::{answer_in_background, payload, test_constants::*, TestBed};
use virtio_tpm_testing::{build_response, EchoResponder, LoopbackDevice, SilentResponder};
use virtio_tpm_transport::TransportError;

#[test]
fn test_send_reaches_device_unchanged() {
    println!("Testing command delivery through the queue...");

    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(EchoResponder),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();

    tpm.send(&STARTUP_CLEAR).expect("Failed to send command");

    let mut buf = [0u8; 64];
    let len = tpm.recv(&mut buf).expect("Failed to receive response");
    assert_eq!(&buf[..len], &STARTUP_CLEAR, "Echoed command should match");
    assert_eq!(bed.queue().kick_count(), 1, "One kick per command");

    println!("Command delivery test completed successfully!");
}

#[test]
fn test_empty_command_is_rejected() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(EchoResponder),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();

    assert_eq!(tpm.send(&[]), Err(TransportError::EmptyCommand));
    assert_eq!(bed.queue().kick_count(), 0, "Nothing should be submitted");
    assert_eq!(bed.queue().outstanding(), 0);
}

#[test]
fn test_broken_queue_reports_device_unavailable() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(EchoResponder),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();

    bed.queue().set_broken(true);
    assert!(matches!(
        tpm.send(&GET_RANDOM_8),
        Err(TransportError::DeviceUnavailable(_))
    ));
    assert!(!tpm.is_busy(), "A rejected command is not in flight");
    assert_eq!(bed.queue().outstanding(), 0);

    bed.queue().set_broken(false);
    tpm.send(&GET_RANDOM_8)
        .expect("Queue should accept commands again");
}

#[test]
fn test_timeout_leaves_device_busy() {
    println!("Testing timeout on a silent device...");

    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(SilentResponder),
        SHORT_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();

    assert_eq!(
        tpm.send(&STARTUP_CLEAR),
        Err(TransportError::Timeout(SHORT_TIMEOUT_MS))
    );
    assert!(tpm.is_busy(), "Timed out command still belongs to the device");
    assert_eq!(tpm.send(&GET_RANDOM_8), Err(TransportError::Busy));
    assert_eq!(bed.queue().outstanding(), 1);

    println!("Timeout test completed successfully!");
}

#[test]
fn test_late_completion_is_reaped() {
    println!("Testing recovery after a late completion...");

    let bed = TestBed::new(LoopbackDevice::new(), SHORT_TIMEOUT_MS);
    let tpm = bed.driver.transport();

    assert!(matches!(
        tpm.send(&STARTUP_CLEAR),
        Err(TransportError::Timeout(_))
    ));

    // The device answers after the caller gave up.
    bed.device
        .answer_next(&build_response(TAG_NO_SESSIONS, &[0xde, 0xad]))
        .expect("Failed to answer the first command");

    let fresh = payload(0x40, 6);
    let responder = answer_in_background(bed.queue(), build_response(TAG_NO_SESSIONS, &fresh));
    tpm.send(&GET_RANDOM_8)
        .expect("Device should accept a command after the late completion");
    responder
        .join()
        .expect("Responder thread panicked")
        .expect("Responder did not see the second command");

    let mut buf = [0u8; 16];
    let len = tpm.recv(&mut buf).expect("Failed to receive response");
    assert_eq!(&buf[..len], fresh.as_slice(), "Late response must not leak");
    assert_eq!(bed.queue().outstanding(), 0);

    println!("Late completion test completed successfully!");
}

#[test]
fn test_commands_keep_order() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(EchoResponder),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();

    for i in 0..32u8 {
        let command = payload(i, 1 + i as usize);
        tpm.send(&command).expect("Failed to send command");
        let mut buf = [0u8; 64];
        let len = tpm.recv(&mut buf).expect("Failed to receive response");
        assert_eq!(&buf[..len], command.as_slice(), "Response {} mismatched", i);
    }
    assert_eq!(bed.queue().kick_count(), 32);
}
