//! IANA definitions used by the resolver.
//!
//! Only the record types, classes, and response codes the stub resolver
//! actually speaks are defined here.

#![warn(missing_docs)]

use std::fmt;

//------------ Rtype ---------------------------------------------------------

/// A resource record type.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rtype(u16);

impl Rtype {
    /// A host address.
    pub const A: Rtype = Rtype(1);

    /// An authoritative name server.
    pub const NS: Rtype = Rtype(2);

    /// The canonical name for an alias.
    pub const CNAME: Rtype = Rtype(5);

    /// The start of a zone of authority.
    pub const SOA: Rtype = Rtype(6);

    /// A domain name pointer.
    pub const PTR: Rtype = Rtype(12);

    /// Text strings.
    pub const TXT: Rtype = Rtype(16);

    /// An IPv6 host address.
    pub const AAAA: Rtype = Rtype(28);

    /// Server selection.
    pub const SRV: Rtype = Rtype(33);

    /// The EDNS0 OPT pseudo record type.
    pub const OPT: Rtype = Rtype(41);

    /// The HTTPS service binding type.
    pub const HTTPS: Rtype = Rtype(65);

    /// Creates a record type from its integer value.
    pub const fn from_int(value: u16) -> Self {
        Rtype(value)
    }

    /// Returns the integer value of the record type.
    pub const fn to_int(self) -> u16 {
        self.0
    }
}

impl From<u16> for Rtype {
    fn from(value: u16) -> Self {
        Rtype(value)
    }
}

impl fmt::Display for Rtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Rtype::A => write!(f, "A"),
            Rtype::NS => write!(f, "NS"),
            Rtype::CNAME => write!(f, "CNAME"),
            Rtype::SOA => write!(f, "SOA"),
            Rtype::PTR => write!(f, "PTR"),
            Rtype::TXT => write!(f, "TXT"),
            Rtype::AAAA => write!(f, "AAAA"),
            Rtype::SRV => write!(f, "SRV"),
            Rtype::OPT => write!(f, "OPT"),
            Rtype::HTTPS => write!(f, "HTTPS"),
            Rtype(value) => write!(f, "TYPE{}", value),
        }
    }
}

//------------ Class ---------------------------------------------------------

/// A resource record class.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Class(u16);

impl Class {
    /// The Internet class.
    pub const IN: Class = Class(1);

    /// Creates a class from its integer value.
    pub const fn from_int(value: u16) -> Self {
        Class(value)
    }

    /// Returns the integer value of the class.
    pub const fn to_int(self) -> u16 {
        self.0
    }
}

impl From<u16> for Class {
    fn from(value: u16) -> Self {
        Class(value)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Class::IN => write!(f, "IN"),
            Class(value) => write!(f, "CLASS{}", value),
        }
    }
}

//------------ Rcode ---------------------------------------------------------

/// A response code.
///
/// Only the basic four-bit header rcode is modeled; extended rcodes from
/// the OPT record are outside what the transaction engine reacts to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rcode(u8);

impl Rcode {
    /// No error condition.
    pub const NOERROR: Rcode = Rcode(0);

    /// The server was unable to interpret the query.
    pub const FORMERR: Rcode = Rcode(1);

    /// The server encountered an internal failure.
    pub const SERVFAIL: Rcode = Rcode(2);

    /// The queried name does not exist.
    pub const NXDOMAIN: Rcode = Rcode(3);

    /// The server does not implement the requested kind of query.
    pub const NOTIMP: Rcode = Rcode(4);

    /// The server refuses to answer for policy reasons.
    pub const REFUSED: Rcode = Rcode(5);

    /// Creates an rcode from the low four bits of the value.
    pub const fn from_int(value: u8) -> Self {
        Rcode(value & 0x0F)
    }

    /// Returns the integer value of the rcode.
    pub const fn to_int(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Rcode::NOERROR => write!(f, "NOERROR"),
            Rcode::FORMERR => write!(f, "FORMERR"),
            Rcode::SERVFAIL => write!(f, "SERVFAIL"),
            Rcode::NXDOMAIN => write!(f, "NXDOMAIN"),
            Rcode::NOTIMP => write!(f, "NOTIMP"),
            Rcode::REFUSED => write!(f, "REFUSED"),
            Rcode(value) => write!(f, "RCODE{}", value),
        }
    }
}
