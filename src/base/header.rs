//! The header of a DNS message.

#![warn(missing_docs)]

use super::error::WireError;
use super::iana::Rcode;

//------------ Module Configuration ------------------------------------------

/// The length of a message header in octets.
pub const HEADER_LEN: usize = 12;

/// The QR bit: set in responses, clear in queries.
const FLAG_QR: u16 = 0x8000;

/// The AA bit: authoritative answer.
const FLAG_AA: u16 = 0x0400;

/// The TC bit: the response was truncated.
const FLAG_TC: u16 = 0x0200;

/// The RD bit: recursion desired.
const FLAG_RD: u16 = 0x0100;

/// The RA bit: recursion available.
const FLAG_RA: u16 = 0x0080;

//------------ Header --------------------------------------------------------

/// A decoded copy of the fixed twelve-octet message header.
///
/// The header is copied out of a message buffer in one step via
/// [`parse`][Self::parse]; the accessors then operate on plain fields.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Header {
    /// The transaction id.
    id: u16,

    /// The flags word including opcode and rcode.
    flags: u16,

    /// The number of questions.
    qdcount: u16,

    /// The number of answer records.
    ancount: u16,

    /// The number of authority records.
    nscount: u16,

    /// The number of additional records.
    arcount: u16,
}

impl Header {
    /// Copies the header out of the start of a message buffer.
    pub fn parse(message: &[u8]) -> Result<Self, WireError> {
        if message.len() < HEADER_LEN {
            return Err(WireError::ShortMessage);
        }
        let word =
            |i: usize| u16::from_be_bytes([message[i], message[i + 1]]);
        Ok(Header {
            id: word(0),
            flags: word(2),
            qdcount: word(4),
            ancount: word(6),
            nscount: word(8),
            arcount: word(10),
        })
    }

    /// Returns the transaction id.
    pub fn id(self) -> u16 {
        self.id
    }

    /// Returns whether the message is a response.
    pub fn qr(self) -> bool {
        self.flags & FLAG_QR != 0
    }

    /// Returns whether the answer is authoritative.
    pub fn aa(self) -> bool {
        self.flags & FLAG_AA != 0
    }

    /// Returns whether the response was truncated.
    pub fn tc(self) -> bool {
        self.flags & FLAG_TC != 0
    }

    /// Returns whether recursion was requested.
    pub fn rd(self) -> bool {
        self.flags & FLAG_RD != 0
    }

    /// Returns whether the server offers recursion.
    pub fn ra(self) -> bool {
        self.flags & FLAG_RA != 0
    }

    /// Returns the response code.
    pub fn rcode(self) -> Rcode {
        Rcode::from_int((self.flags & 0x000F) as u8)
    }

    /// Returns the number of questions.
    pub fn qdcount(self) -> u16 {
        self.qdcount
    }

    /// Returns the number of answer records.
    pub fn ancount(self) -> u16 {
        self.ancount
    }

    /// Returns the number of authority records.
    pub fn nscount(self) -> u16 {
        self.nscount
    }

    /// Returns the number of additional records.
    pub fn arcount(self) -> u16 {
        self.arcount
    }
}

//------------ Composing -----------------------------------------------------

/// Appends a query header with the given id to a message under
/// construction.
///
/// The header requests recursion and declares one question; the
/// additional count is patched later if an OPT record is appended.
pub(super) fn compose_query_header(target: &mut Vec<u8>, id: u16) {
    target.extend_from_slice(&id.to_be_bytes());
    target.extend_from_slice(&FLAG_RD.to_be_bytes());
    target.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    target.extend_from_slice(&0u16.to_be_bytes()); // ANCOUNT
    target.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    target.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT
}

//============ Testing =======================================================
