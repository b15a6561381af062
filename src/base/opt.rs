//! The EDNS0 OPT pseudo record.
//!
//! The OPT record travels in the additional section of a query and
//! carries protocol extensions: the requested UDP payload size in its
//! class field and a sequence of options in its data. The only option
//! composed by this crate is the padding option used to round DNS over
//! HTTPS messages up to a block size.

#![warn(missing_docs)]

use super::iana::Rtype;

//------------ Module Configuration ------------------------------------------

/// The UDP payload size advertised in queries.
///
/// Chosen to avoid fragmentation on common paths, see
/// draft-ietf-dnsop-avoid-fragmentation.
pub const ADVERTISED_PAYLOAD_SIZE: u16 = 1232;

/// The EDNS option code of the padding option (RFC 7830).
pub const PADDING_CODE: u16 = 12;

/// The fixed part of an OPT record: root name, type, class, TTL, RDLEN.
const OPT_FIXED_LEN: usize = 11;

/// The header of a single option: code and length.
const OPTION_HEADER_LEN: usize = 4;

//------------ OptRecord -----------------------------------------------------

/// An OPT pseudo record under construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OptRecord {
    /// The options carried in the record data, in order.
    options: Vec<OptOption>,
}

/// A single EDNS option.
#[derive(Clone, Debug, Eq, PartialEq)]
struct OptOption {
    /// The option code.
    code: u16,

    /// The option value.
    data: Vec<u8>,
}

impl OptRecord {
    /// Creates a new, empty OPT record.
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends an option.
    pub fn push_option(&mut self, code: u16, data: Vec<u8>) {
        self.options.push(OptOption { code, data });
    }

    /// Returns whether the record carries any options.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Returns the encoded length of the record, fixed part included.
    pub fn encoded_len(&self) -> usize {
        OPT_FIXED_LEN + self.rdata_len()
    }

    /// Returns the length of the record data.
    fn rdata_len(&self) -> usize {
        self.options
            .iter()
            .map(|option| OPTION_HEADER_LEN + option.data.len())
            .sum()
    }

    /// Appends the record to a message under construction.
    ///
    /// An extra all-zero padding option of `padding` octets of data is
    /// appended behind the regular options when requested.
    pub(super) fn compose(
        &self,
        target: &mut Vec<u8>,
        padding: Option<usize>,
    ) {
        let mut rdata_len = self.rdata_len();
        if let Some(padding) = padding {
            rdata_len += OPTION_HEADER_LEN + padding;
        }

        target.push(0); // root owner name
        target.extend_from_slice(&Rtype::OPT.to_int().to_be_bytes());
        target.extend_from_slice(
            &ADVERTISED_PAYLOAD_SIZE.to_be_bytes(),
        );
        // TTL: extended rcode, version 0, flags all zero.
        target.extend_from_slice(&0u32.to_be_bytes());
        target.extend_from_slice(&(rdata_len as u16).to_be_bytes());
        for option in &self.options {
            target.extend_from_slice(&option.code.to_be_bytes());
            target.extend_from_slice(
                &(option.data.len() as u16).to_be_bytes(),
            );
            target.extend_from_slice(&option.data);
        }
        if let Some(padding) = padding {
            target.extend_from_slice(&PADDING_CODE.to_be_bytes());
            target.extend_from_slice(&(padding as u16).to_be_bytes());
            target.resize(target.len() + padding, 0);
        }
    }
}

//============ Testing =======================================================
