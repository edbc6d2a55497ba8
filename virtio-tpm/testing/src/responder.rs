// Licensed under the Apache-2.0 license

//! Device-side command handlers for the loopback backend

use virtio_tpm_transport::ResponseHeader;
use zerocopy::IntoBytes;

/// Response tag used by the canned responders
pub const TPM2_ST_NO_SESSIONS: u32 = 0x8001;

/// Build a response region: header `{tag, payload.len()}` followed by `payload`.
pub fn build_response(tag: u32, payload: &[u8]) -> Vec<u8> {
    let header = ResponseHeader::new(tag, payload.len() as u32);
    let mut response = header.as_bytes().to_vec();
    response.extend_from_slice(payload);
    response
}

/// Answers commands on behalf of the loopback device.
///
/// Returning `None` leaves the command with the device forever, as a hung
/// TPM would.
pub trait Responder: Send + Sync {
    fn respond(&self, command: &[u8]) -> Option<Vec<u8>>;
}

impl<F> Responder for F
where
    F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync,
{
    fn respond(&self, command: &[u8]) -> Option<Vec<u8>> {
        self(command)
    }
}

/// Echoes the command back as the response payload
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    fn respond(&self, command: &[u8]) -> Option<Vec<u8>> {
        Some(build_response(TPM2_ST_NO_SESSIONS, command))
    }
}

/// Answers every command with the same bytes
#[derive(Debug, Clone)]
pub struct FixedResponder {
    response: Vec<u8>,
}

impl FixedResponder {
    pub fn new(response: Vec<u8>) -> Self {
        Self { response }
    }

    pub fn with_payload(tag: u32, payload: &[u8]) -> Self {
        Self::new(build_response(tag, payload))
    }
}

impl Responder for FixedResponder {
    fn respond(&self, _command: &[u8]) -> Option<Vec<u8>> {
        Some(self.response.clone())
    }
}

/// Never answers
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentResponder;

impl Responder for SilentResponder {
    fn respond(&self, _command: &[u8]) -> Option<Vec<u8>> {
        None
    }
}
