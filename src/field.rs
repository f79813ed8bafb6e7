//! Fixed-offset, fixed-width field extraction from a raw byte buffer.
//! Every accessor is bounds-checked; out-of-range reads return `None` so
//! callers decide which error to report.

/// Bounds-checked reader over a header or subheader byte buffer.
///
/// NITF encodes all counts and lengths as fixed-width decimal ASCII, blank
/// or zero padded. Numeric accessors reject sign characters: a `-` inside a
/// field that is assumed unsigned must fail instead of aliasing to a huge
/// value.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Raw bytes at `offset..offset+len`, or `None` if out of range.
    #[inline]
    pub fn bytes_at(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.buf.len() {
            return None;
        }
        Some(&self.buf[offset..end])
    }

    /// Field as text, verbatim (lossy UTF-8; NITF fields are ASCII).
    pub fn str_at(&self, offset: usize, len: usize) -> Option<String> {
        Some(String::from_utf8_lossy(self.bytes_at(offset, len)?).into_owned())
    }

    /// Field as text with trailing spaces removed.
    pub fn trimmed_at(&self, offset: usize, len: usize) -> Option<String> {
        Some(
            String::from_utf8_lossy(self.bytes_at(offset, len)?)
                .trim_end()
                .to_string(),
        )
    }

    /// Fixed-width unsigned decimal field. Blank padding on either side is
    /// tolerated; any other non-digit (including `-` and `+`) fails.
    pub fn uint_at(&self, offset: usize, len: usize) -> Option<u64> {
        let bytes = self.bytes_at(offset, len)?;
        parse_uint(bytes)
    }

    /// Like [`uint_at`](Self::uint_at) but an all-blank field reads as zero
    /// (blank optional numeric fields are common in old producers).
    pub fn uint_or_zero_at(&self, offset: usize, len: usize) -> Option<u64> {
        let bytes = self.bytes_at(offset, len)?;
        if bytes.iter().all(|&b| b == b' ') {
            return Some(0);
        }
        parse_uint(bytes)
    }

    /// Signed decimal field (display/attachment locations may be negative).
    pub fn int_at(&self, offset: usize, len: usize) -> Option<i64> {
        let s = self.str_at(offset, len)?;
        let t = s.trim();
        if t.is_empty() {
            return Some(0);
        }
        t.parse::<i64>().ok()
    }

    /// Floating-point field (RPC coefficients carry signs and exponents).
    pub fn f64_at(&self, offset: usize, len: usize) -> Option<f64> {
        let s = self.str_at(offset, len)?;
        let t = s.trim();
        if t.is_empty() {
            return Some(0.0);
        }
        t.parse::<f64>().ok()
    }
}

/// Parse an unsigned fixed-width decimal field, rejecting sign characters.
pub fn parse_uint(bytes: &[u8]) -> Option<u64> {
    let mut val: u64 = 0;
    let mut seen_digit = false;
    let mut done = false;
    for &b in bytes {
        match b {
            b'0'..=b'9' => {
                if done {
                    return None;
                }
                seen_digit = true;
                val = val.checked_mul(10)?.checked_add((b - b'0') as u64)?;
            }
            b' ' => {
                // Leading pad before digits, trailing pad after.
                if seen_digit {
                    done = true;
                }
            }
            _ => return None,
        }
    }
    if seen_digit {
        Some(val)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_rejects_sign() {
        let r = FieldReader::new(b"-0001");
        assert_eq!(r.uint_at(0, 5), None);
        let r = FieldReader::new(b"+0001");
        assert_eq!(r.uint_at(0, 5), None);
    }

    #[test]
    fn uint_blank_padding() {
        let r = FieldReader::new(b"  12 ");
        assert_eq!(r.uint_at(0, 5), Some(12));
        assert_eq!(r.uint_at(0, 6), None);
    }

    #[test]
    fn uint_embedded_space_fails() {
        let r = FieldReader::new(b"1 2");
        assert_eq!(r.uint_at(0, 3), None);
    }

    #[test]
    fn signed_location() {
        let r = FieldReader::new(b"-0010");
        assert_eq!(r.int_at(0, 5), Some(-10));
    }

    #[test]
    fn trimmed_keeps_leading() {
        let r = FieldReader::new(b" abc  ");
        assert_eq!(r.trimmed_at(0, 6).as_deref(), Some(" abc"));
    }
}
