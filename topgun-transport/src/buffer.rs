//! Transfer buffer owned by a session
//!
//! The buffer moves into the bus with each read request and comes back with
//! the completion, so it can never be dropped while a read still targets it.

use crate::report::REPORT_LEN;

/// Fixed-size report buffer plus the length handed to the bus
#[derive(Debug)]
pub struct ReportBuffer {
    data: Box<[u8; REPORT_LEN]>,
    /// Bytes the bus may write per read (min of max packet size and report length)
    transfer_len: usize,
    /// Bytes written by the last completed read
    actual_len: usize,
}

impl ReportBuffer {
    /// Allocate a buffer for an endpoint with the given max packet size
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            data: Box::new([0u8; REPORT_LEN]),
            transfer_len: max_packet_size.clamp(1, REPORT_LEN),
            actual_len: 0,
        }
    }

    pub fn transfer_len(&self) -> usize {
        self.transfer_len
    }

    pub fn actual_len(&self) -> usize {
        self.actual_len
    }

    /// Region the bus writes into
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.transfer_len]
    }

    /// Record how many bytes the last read produced
    pub fn set_actual_len(&mut self, len: usize) {
        self.actual_len = len.min(self.transfer_len);
    }

    /// Copy a received report into the buffer, returning the bytes taken
    pub fn write_report(&mut self, bytes: &[u8]) -> usize {
        let len = bytes.len().min(self.transfer_len);
        self.data[..len].copy_from_slice(&bytes[..len]);
        self.actual_len = len;
        len
    }

    /// Full report view for the decoder
    pub fn report(&self) -> &[u8; REPORT_LEN] {
        &self.data
    }

    /// Bytes written by the last read
    pub fn received(&self) -> &[u8] {
        &self.data[..self.actual_len]
    }
}
