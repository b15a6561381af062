//! Response synthesis for tests.

use super::iana::{Class, Rcode, Rtype};
use super::name::encode_name;
use super::query::Query;
use bytes::Bytes;

//------------ ResponseBuilder -----------------------------------------------

/// Builds wire-format responses for tests.
pub struct ResponseBuilder {
    buf: Vec<u8>,
    answers: u16,
}

impl ResponseBuilder {
    /// Starts a NOERROR response answering the given query.
    pub fn answering(query: &Query) -> Self {
        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&query.id().to_be_bytes());
        buf.extend_from_slice(&0x8180u16.to_be_bytes()); // QR | RD | RA
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&[0; 6]);
        buf.extend_from_slice(query.question_bytes());
        ResponseBuilder { buf, answers: 0 }
    }

    /// Sets the response code.
    pub fn rcode(mut self, rcode: Rcode) -> Self {
        self.buf[3] = (self.buf[3] & 0xF0) | rcode.to_int();
        self
    }

    /// Sets the truncation flag.
    pub fn truncated(mut self) -> Self {
        self.buf[2] |= 0x02;
        self
    }

    /// Appends an A record to the answer section.
    pub fn a_record(
        self,
        name: &str,
        addr: [u8; 4],
        ttl: u32,
    ) -> Self {
        self.record(name, Rtype::A, ttl, &addr)
    }

    /// Appends an AAAA record to the answer section.
    pub fn aaaa_record(
        self,
        name: &str,
        addr: [u8; 16],
        ttl: u32,
    ) -> Self {
        self.record(name, Rtype::AAAA, ttl, &addr)
    }

    /// Appends a CNAME record to the answer section.
    pub fn cname_record(
        self,
        name: &str,
        target: &str,
        ttl: u32,
    ) -> Self {
        let rdata = encode_name(target).unwrap();
        self.record(name, Rtype::CNAME, ttl, &rdata)
    }

    /// Appends an arbitrary answer record.
    pub fn record(
        mut self,
        name: &str,
        rtype: Rtype,
        ttl: u32,
        rdata: &[u8],
    ) -> Self {
        self.buf
            .extend_from_slice(&encode_name(name).unwrap());
        self.buf.extend_from_slice(&rtype.to_int().to_be_bytes());
        self.buf
            .extend_from_slice(&Class::IN.to_int().to_be_bytes());
        self.buf.extend_from_slice(&ttl.to_be_bytes());
        self.buf
            .extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(rdata);
        self.answers += 1;
        self
    }

    /// Finishes the message.
    pub fn build(mut self) -> Bytes {
        self.buf[6..8].copy_from_slice(&self.answers.to_be_bytes());
        self.buf.into()
    }
}
