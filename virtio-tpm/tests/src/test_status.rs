// Licensed under the Apache-2.0 license

//! Status register tests

use crate::common::{answer_in_background, payload, test_constants::*, TestBed};
use std::sync::Arc;
use std::thread;
use virtio_tpm_osal::Duration;
use virtio_tpm_testing::{build_response, EchoResponder, LoopbackDevice};
use virtio_tpm_transport::status::STATUS_READ_ZERO;
use virtio_tpm_transport::{STATUS_COMPLETE, STATUS_DATA_AVAIL, STATUS_VALID};

#[test]
fn test_status_idle_device() {
    let bed = TestBed::new(LoopbackDevice::new(), TEST_TIMEOUT_MS);
    assert_eq!(bed.driver.transport().status(), 0, "No response yet");
}

#[test]
fn test_valid_clear_while_in_flight() {
    println!("Testing status while a command is in flight...");

    let bed = TestBed::new(LoopbackDevice::new(), TEST_TIMEOUT_MS);
    let tpm = Arc::clone(bed.driver.transport());
    let queue = bed.queue();

    let sender = {
        let tpm = tpm.clone();
        thread::spawn(move || tpm.send(&STARTUP_CLEAR))
    };

    let request = queue
        .wait_available(Duration::from_secs(5))
        .expect("Command never reached the device");
    assert_eq!(
        tpm.status() & STATUS_VALID,
        0,
        "VALID must stay clear until the completion"
    );
    assert!(tpm.is_busy());

    queue
        .complete(request.head, &build_response(TAG_NO_SESSIONS, &[1, 2]))
        .expect("Failed to complete command");
    queue.interrupt();

    sender
        .join()
        .expect("Sender thread panicked")
        .expect("Send should succeed once completed");
    assert_eq!(tpm.status() & STATUS_COMPLETE, STATUS_COMPLETE);

    println!("In-flight status test completed successfully!");
}

#[test]
fn test_new_command_supersedes_response() {
    let bed = TestBed::new(LoopbackDevice::new(), TEST_TIMEOUT_MS);
    let tpm = Arc::clone(bed.driver.transport());

    let responder = answer_in_background(bed.queue(), build_response(TAG_NO_SESSIONS, &[7]));
    tpm.send(&GET_RANDOM_8).expect("Failed to send first command");
    responder.join().expect("Responder thread panicked");
    assert_eq!(tpm.status(), STATUS_VALID | STATUS_DATA_AVAIL);

    let sender = {
        let tpm = tpm.clone();
        thread::spawn(move || tpm.send(&GET_RANDOM_8))
    };
    let request = bed
        .queue()
        .wait_available(Duration::from_secs(5))
        .expect("Second command never reached the device");
    assert_eq!(tpm.status(), 0, "Previous response is superseded");

    bed.queue()
        .complete(request.head, &build_response(TAG_NO_SESSIONS, &payload(0, 8)))
        .expect("Failed to complete command");
    bed.queue().interrupt();
    sender
        .join()
        .expect("Sender thread panicked")
        .expect("Second send failed");
    assert_eq!(tpm.status(), STATUS_VALID | STATUS_DATA_AVAIL);
}

#[test]
fn test_read_zero_bits_stay_clear() {
    let bed = TestBed::new(
        LoopbackDevice::new().with_responder(EchoResponder),
        TEST_TIMEOUT_MS,
    );
    let tpm = bed.driver.transport();

    for _ in 0..4 {
        tpm.send(&STARTUP_CLEAR).expect("Failed to send command");
        assert_eq!(tpm.status() & STATUS_READ_ZERO, 0);
        let mut buf = [0u8; 32];
        tpm.recv(&mut buf).expect("Failed to receive response");
        assert_eq!(tpm.status() & STATUS_READ_ZERO, 0);
    }
}
