//! Converting between dotted host names and DNS wire-format names.
//!
//! A wire-format name is a sequence of labels, each prefixed by its
//! length, terminated by the zero-length root label. Inside a message a
//! name may also end in a compression pointer referring back to an
//! earlier occurrence of its suffix. Decoding therefore always happens
//! against the whole message buffer.

#![warn(missing_docs)]

use super::error::WireError;

//------------ Module Configuration ------------------------------------------

/// The maximum length of a single label in octets.
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum length of an encoded name in octets, root label included.
pub const MAX_NAME_LEN: usize = 255;

/// The two top bits of a length octet that mark a direct label.
const LABEL_DIRECT: u8 = 0x00;

/// The two top bits of a length octet that mark a compression pointer.
const LABEL_POINTER: u8 = 0xC0;

//------------ Encoding ------------------------------------------------------

/// Encodes a dotted host name into wire format.
///
/// Each label must be between 1 and 63 octets of attested host name
/// characters (ASCII letters, digits, hyphen, and underscore), and the
/// encoded name including the root label must not exceed 255 octets. A
/// single trailing dot marks a fully-qualified name and is accepted;
/// empty labels anywhere else are not.
///
/// Fails with [`WireError::InvalidName`] for anything that cannot be
/// represented.
pub fn encode_name(hostname: &str) -> Result<Vec<u8>, WireError> {
    let name = hostname.strip_suffix('.').unwrap_or(hostname);
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(WireError::InvalidName);
    }

    let mut target = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(WireError::InvalidName);
        }
        if !label.bytes().all(is_hostname_char) {
            return Err(WireError::InvalidName);
        }
        target.push(label.len() as u8);
        target.extend_from_slice(label.as_bytes());
    }
    target.push(0);
    if target.len() > MAX_NAME_LEN {
        return Err(WireError::InvalidName);
    }
    Ok(target)
}

/// Returns whether the octet may appear in a host name label.
fn is_hostname_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'-' || ch == b'_'
}

/// Counts the labels of an encoded name, the root label excluded.
///
/// The name must be uncompressed; this is only used on names produced by
/// [`encode_name`].
pub fn count_labels(wire: &[u8]) -> usize {
    let mut count = 0;
    let mut pos = 0;
    while pos < wire.len() && wire[pos] != 0 {
        count += 1;
        pos += wire[pos] as usize + 1;
    }
    count
}

//------------ Decoding ------------------------------------------------------

/// Decodes a possibly compressed name out of a message buffer.
///
/// Decoding starts at `start` and follows compression pointers until the
/// root label. The returned octet count covers the name's encoding at
/// `start` only: it ends after the first pointer if one occurs, since
/// everything beyond it belongs to an earlier part of the message.
///
/// Three structural bounds protect against crafted buffers: a cumulative
/// count of octets visited may never exceed the buffer length (a pointer
/// chain that revisits data must trip this and fails with
/// [`WireError::CompressionLoop`]), the decoded text may not grow beyond
/// [`MAX_NAME_LEN`] characters ([`WireError::NameTooLong`]), and only
/// direct and pointer label types are accepted
/// ([`WireError::UnknownLabelType`]).
pub fn decode_name(
    message: &[u8],
    start: usize,
) -> Result<(String, usize), WireError> {
    let mut pos = start;
    let mut consumed = 0usize;
    let mut seen = 0usize;
    let mut name = String::new();

    loop {
        let len = *message.get(pos).ok_or(WireError::ShortMessage)?;
        match len & 0xC0 {
            LABEL_DIRECT => {
                if len == 0 {
                    if consumed == 0 {
                        consumed = pos + 1 - start;
                    }
                    return Ok((name, consumed));
                }
                let len = len as usize;
                let label = message
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(WireError::ShortMessage)?;
                seen += 1 + len;
                if seen > message.len() {
                    return Err(WireError::CompressionLoop);
                }
                if !name.is_empty() {
                    name.push('.');
                }
                if name.len() + len > MAX_NAME_LEN {
                    return Err(WireError::NameTooLong);
                }
                name.extend(label.iter().map(|&ch| ch as char));
                pos += 1 + len;
            }
            LABEL_POINTER => {
                let low =
                    *message.get(pos + 1).ok_or(WireError::ShortMessage)?;
                if consumed == 0 {
                    consumed = pos + 2 - start;
                }
                seen += 2;
                if seen > message.len() {
                    return Err(WireError::CompressionLoop);
                }
                pos = usize::from(len & 0x3F) << 8 | usize::from(low);
            }
            _ => return Err(WireError::UnknownLabelType),
        }
    }
}

/// Skips over a possibly compressed name, returning the octets consumed.
pub(super) fn skip_name(
    message: &[u8],
    start: usize,
) -> Result<usize, WireError> {
    decode_name(message, start).map(|(_, consumed)| consumed)
}

//------------ Utility -------------------------------------------------------

/// Joins a host name and a search suffix into one dotted name.
pub(crate) fn join_suffix(hostname: &str, suffix: &str) -> String {
    let mut joined =
        String::with_capacity(hostname.len() + suffix.len() + 1);
    joined.push_str(hostname);
    joined.push('.');
    joined.push_str(suffix);
    joined
}

//============ Testing =======================================================
