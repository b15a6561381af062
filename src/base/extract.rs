//! Extracting address results from a response.
//!
//! An answer section that resolves a host name is a logical chain: zero
//! or more CNAME records leading from the queried name to a final owner
//! name, then address records for that owner. Servers may emit the
//! records in any physical order, so extraction reconstructs the chain
//! rather than trusting the order on the wire.

#![warn(missing_docs)]

use super::error::WireError;
use super::iana::{Class, Rtype};
use super::name::decode_name;
use super::response::Response;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

//------------ AddressList ---------------------------------------------------

/// The addresses a response resolved a name to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressList {
    /// The resolved addresses, in answer-section order.
    pub addresses: Vec<IpAddr>,

    /// The alias chain, canonical name first, queried name last.
    pub aliases: Vec<String>,

    /// The smallest time to live across every contributing record.
    ///
    /// `None` when the answer section held neither aliases nor
    /// addresses for the queried name.
    pub ttl: Option<u32>,
}

//------------ extract_address_chain -----------------------------------------

/// Walks the answer section and returns the addresses for a name.
///
/// `expected_type` must be [`Rtype::A`] or [`Rtype::AAAA`]. Owner names
/// compare case-insensitively. The chain rules are strict:
///
/// * every CNAME must continue the chain from the queried name —
///   a CNAME with an owner outside the chain is
///   [`WireError::NameMismatch`];
/// * two CNAMEs for one owner are [`WireError::MultipleCnames`];
/// * an owner cannot both alias away and carry an address — that is
///   [`WireError::CnameAfterAddress`];
/// * address data must match the family's length or the record is
///   [`WireError::SizeMismatch`].
pub fn extract_address_chain(
    response: &Response,
    expected_name: &str,
    expected_type: Rtype,
) -> Result<AddressList, WireError> {
    let mut cnames: HashMap<String, (String, u32)> = HashMap::new();
    let mut addresses: Vec<(String, IpAddr, u32)> = Vec::new();

    let mut parser = response.answer();
    while parser.remaining() > 0 {
        let record = parser.read_record()?;
        if record.class != Class::IN {
            continue;
        }
        let owner = record.name.to_ascii_lowercase();
        if record.rtype == Rtype::CNAME {
            let target = decode_cname_target(
                response,
                record.rdata_offset(),
                record.rdata().len(),
            )?;
            if cnames
                .insert(owner, (target, record.ttl))
                .is_some()
            {
                return Err(WireError::MultipleCnames);
            }
        } else if record.rtype == expected_type {
            let addr = parse_address(record.rdata(), expected_type)?;
            addresses.push((owner, addr, record.ttl));
        }
        // Other record types do not contribute to the chain.
    }

    // Follow the chain from the queried name to its final owner.
    let mut current = expected_name
        .strip_suffix('.')
        .unwrap_or(expected_name)
        .to_ascii_lowercase();
    let mut aliases = vec![current.clone()];
    let mut ttl: Option<u32> = None;
    let mut followed = 0;
    while let Some((target, cname_ttl)) = cnames.get(&current) {
        if addresses.iter().any(|(owner, _, _)| *owner == current) {
            return Err(WireError::CnameAfterAddress);
        }
        ttl = Some(ttl.map_or(*cname_ttl, |t| t.min(*cname_ttl)));
        current = target.clone();
        if aliases.contains(&current) {
            // The chain bit its own tail; it can never terminate.
            return Err(WireError::FormError);
        }
        aliases.push(current.clone());
        followed += 1;
        if followed > cnames.len() {
            return Err(WireError::FormError);
        }
    }

    // Every CNAME must have been part of the chain.
    if followed < cnames.len() {
        return Err(WireError::NameMismatch);
    }

    // Addresses belong to the final owner name, nothing else.
    let mut result = Vec::with_capacity(addresses.len());
    for (owner, addr, addr_ttl) in addresses {
        if owner != current {
            return Err(WireError::NameMismatch);
        }
        ttl = Some(ttl.map_or(addr_ttl, |t| t.min(addr_ttl)));
        result.push(addr);
    }

    aliases.reverse();
    Ok(AddressList {
        addresses: result,
        aliases,
        ttl,
    })
}

/// Decodes the target name out of CNAME record data.
///
/// The target may use compression pointers into the whole message, so
/// decoding runs against the full buffer at the data's offset.
fn decode_cname_target(
    response: &Response,
    rdata_offset: Option<usize>,
    rdata_len: usize,
) -> Result<String, WireError> {
    let offset = rdata_offset.ok_or(WireError::FormError)?;
    let (target, consumed) = decode_name(response.as_slice(), offset)?;
    if consumed != rdata_len {
        return Err(WireError::FormError);
    }
    Ok(target.to_ascii_lowercase())
}

/// Parses address record data for the given family.
fn parse_address(
    rdata: &[u8],
    rtype: Rtype,
) -> Result<IpAddr, WireError> {
    match rtype {
        Rtype::A => {
            let octets: [u8; 4] = rdata
                .try_into()
                .map_err(|_| WireError::SizeMismatch)?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        Rtype::AAAA => {
            let octets: [u8; 16] = rdata
                .try_into()
                .map_err(|_| WireError::SizeMismatch)?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => Err(WireError::FormError),
    }
}

//============ Testing =======================================================
