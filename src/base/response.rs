//! DNS response messages.
//!
//! A response starts life as raw octets filled in by a transport. It
//! only becomes a [`Response`] through [`Response::validate`], which
//! checks the header, the response flag, and, when the originating
//! [`Query`] is supplied, that id and question echo the query exactly.
//! Every accessor on `Response` can therefore rely on a verified
//! structure.

#![warn(missing_docs)]

use super::error::WireError;
use super::header::{Header, HEADER_LEN};
use super::iana::{Class, Rcode, Rtype};
use super::name::{decode_name, skip_name};
use super::query::Query;
use bytes::Bytes;
use std::borrow::Cow;

//------------ Module Configuration ------------------------------------------

/// The size of the receive buffer for UDP responses.
pub const MAX_UDP_SIZE: usize = 4096;

/// The smallest possible question entry: root name, type, class.
const MIN_QUESTION_LEN: usize = 5;

/// The smallest possible resource record: root name and fixed fields.
const MIN_RECORD_LEN: usize = 11;

//------------ Response ------------------------------------------------------

/// A validated DNS response.
///
/// The response owns its buffer; [`answer`][Self::answer] hands out a
/// cheap [`RecordParser`] cursor positioned at the start of the answer
/// section. Cursors copy freely and scan independently while sharing
/// the buffer.
#[derive(Clone, Debug)]
pub struct Response {
    /// The wire octets of the whole message.
    bytes: Bytes,

    /// The header copied out during validation.
    header: Header,

    /// The offset of the answer section.
    answer_offset: usize,
}

impl Response {
    /// Validates raw octets into a response.
    ///
    /// The buffer must hold a complete header whose QR bit is set, and
    /// must be long enough for the smallest encoding of the record
    /// counts the header declares. If `query` is given, the id and the
    /// raw question-section octets must match the query byte for byte;
    /// a semantically equal but differently encoded question is
    /// rejected. Without a query, the declared questions are skipped by
    /// parsing them.
    pub fn validate(
        bytes: Bytes,
        query: Option<&Query>,
    ) -> Result<Self, WireError> {
        let header = Header::parse(&bytes)?;
        if !header.qr() {
            return Err(WireError::NotAResponse);
        }

        let questions = header.qdcount() as usize;
        let records = header.ancount() as usize
            + header.nscount() as usize
            + header.arcount() as usize;
        if bytes.len()
            < HEADER_LEN
                + questions * MIN_QUESTION_LEN
                + records * MIN_RECORD_LEN
        {
            return Err(WireError::ShortMessage);
        }

        let answer_offset = match query {
            Some(query) => {
                if header.id() != query.id() {
                    return Err(WireError::IdMismatch);
                }
                let question = query.question_bytes();
                let end = HEADER_LEN + question.len();
                if bytes.len() < end
                    || &bytes[HEADER_LEN..end] != question
                {
                    return Err(WireError::QuestionMismatch);
                }
                end
            }
            None => {
                let mut pos = HEADER_LEN;
                for _ in 0..questions {
                    pos += skip_name(&bytes, pos)?;
                    pos += 4;
                    if pos > bytes.len() {
                        return Err(WireError::ShortMessage);
                    }
                }
                pos
            }
        };

        Ok(Response {
            bytes,
            header,
            answer_offset,
        })
    }

    /// Returns the message header.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Returns the transaction id.
    pub fn id(&self) -> u16 {
        self.header.id()
    }

    /// Returns the response code.
    pub fn rcode(&self) -> Rcode {
        self.header.rcode()
    }

    /// Returns whether the response was truncated.
    pub fn is_truncated(&self) -> bool {
        self.header.tc()
    }

    /// Returns the number of answer records.
    pub fn answer_count(&self) -> u16 {
        self.header.ancount()
    }

    /// Returns a cursor over the answer section.
    pub fn answer(&self) -> RecordParser<'_> {
        RecordParser {
            message: &self.bytes,
            pos: self.answer_offset,
            remaining: self.header.ancount(),
        }
    }

    /// Returns a cursor over all records behind the question section.
    pub fn records(&self) -> RecordParser<'_> {
        let remaining = self
            .header
            .ancount()
            .saturating_add(self.header.nscount())
            .saturating_add(self.header.arcount());
        RecordParser {
            message: &self.bytes,
            pos: self.answer_offset,
            remaining,
        }
    }

    /// Returns the raw octets of the message.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

//------------ RecordParser --------------------------------------------------

/// A cursor reading resource records out of a response.
///
/// The parser carries the number of records it may still read; asking
/// for more fails with [`WireError::RecordLimitExceeded`] no matter what
/// else the buffer contains. Copies share the buffer but advance
/// independently.
#[derive(Clone, Copy, Debug)]
pub struct RecordParser<'a> {
    /// The whole message, for compressed name resolution.
    message: &'a [u8],

    /// The current read position.
    pos: usize,

    /// The number of records left to read.
    remaining: u16,
}

impl<'a> RecordParser<'a> {
    /// Returns the number of records left to read.
    pub fn remaining(&self) -> u16 {
        self.remaining
    }

    /// Reads the next resource record.
    ///
    /// The cursor only advances when a whole record was read
    /// successfully; after an error it stays where it was.
    pub fn read_record(
        &mut self,
    ) -> Result<ResourceRecord<'a>, WireError> {
        if self.remaining == 0 {
            return Err(WireError::RecordLimitExceeded);
        }

        let message = self.message;
        let (name, name_len) = decode_name(message, self.pos)?;
        let mut pos = self.pos + name_len;

        let field = |at: usize, len: usize| {
            message.get(at..at + len).ok_or(WireError::ShortMessage)
        };
        let rtype =
            u16::from_be_bytes(field(pos, 2)?.try_into().unwrap());
        let class =
            u16::from_be_bytes(field(pos + 2, 2)?.try_into().unwrap());
        let ttl =
            u32::from_be_bytes(field(pos + 4, 4)?.try_into().unwrap());
        let rdlen =
            u16::from_be_bytes(field(pos + 8, 2)?.try_into().unwrap());
        pos += 10;
        let rdata = field(pos, rdlen as usize)?;
        let rdata_offset = pos;
        pos += rdlen as usize;

        self.pos = pos;
        self.remaining -= 1;
        Ok(ResourceRecord {
            name,
            rtype: rtype.into(),
            class: class.into(),
            ttl,
            rdata: Cow::Borrowed(rdata),
            rdata_offset: Some(rdata_offset),
        })
    }
}

//------------ ResourceRecord ------------------------------------------------

/// A single resource record.
///
/// Records read from a response borrow their data from the response
/// buffer; synthesized records own it. The owned form is authoritative
/// whenever both could exist.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceRecord<'a> {
    /// The owner name in dotted form.
    pub name: String,

    /// The record type.
    pub rtype: Rtype,

    /// The record class.
    pub class: Class,

    /// The time to live in seconds.
    pub ttl: u32,

    /// The record data.
    rdata: Cow<'a, [u8]>,

    /// Where borrowed data sits in the message, for names with
    /// compression pointers inside the data.
    rdata_offset: Option<usize>,
}

impl<'a> ResourceRecord<'a> {
    /// Creates a record owning its data.
    pub fn new_owned(
        name: String,
        rtype: Rtype,
        class: Class,
        ttl: u32,
        rdata: Vec<u8>,
    ) -> ResourceRecord<'static> {
        ResourceRecord {
            name,
            rtype,
            class,
            ttl,
            rdata: Cow::Owned(rdata),
            rdata_offset: None,
        }
    }

    /// Returns the record data.
    pub fn rdata(&self) -> &[u8] {
        &self.rdata
    }

    /// Returns the offset of borrowed record data in its message.
    pub fn rdata_offset(&self) -> Option<usize> {
        self.rdata_offset
    }
}

//============ Testing =======================================================
