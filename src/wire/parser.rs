use crate::error::WireError;
use crate::wire::name::Name;

/// A bounded cursor over an immutable wire buffer.
///
/// `end` can be temporarily pulled in with [`restrict_to`](Parser::restrict_to)
/// so that rdata decoding cannot read past its declared rdlength; any read
/// past the active end fails instead of consuming neighbouring records.
pub struct Parser<'a> {
    wire: &'a [u8],
    current: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    pub fn new(wire: &'a [u8]) -> Parser<'a> {
        Parser {
            wire,
            current: 0,
            end: wire.len(),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn remaining(&self) -> usize {
        self.end - self.current
    }

    pub fn get_bytes(&mut self, size: usize) -> Result<&'a [u8], WireError> {
        if size > self.remaining() {
            return Err(WireError::Malformed);
        }
        let out = &self.wire[self.current..self.current + size];
        self.current += size;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.get_bytes(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, WireError> {
        let b = self.get_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        let b = self.get_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// One-octet length followed by that many bytes (TXT strings).
    pub fn get_counted_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.get_u8()? as usize;
        self.get_bytes(len)
    }

    /// Everything up to the active end.
    pub fn get_remaining(&mut self) -> Result<&'a [u8], WireError> {
        self.get_bytes(self.remaining())
    }

    /// Seeking to the active end is valid; past it is not.
    pub fn seek(&mut self, to: usize) -> Result<(), WireError> {
        if to > self.end {
            return Err(WireError::Malformed);
        }
        self.current = to;
        Ok(())
    }

    /// Pull the active end in to `current + size`, returning the prior end
    /// for [`restore_end`](Parser::restore_end).
    pub fn restrict_to(&mut self, size: usize) -> Result<usize, WireError> {
        if size > self.remaining() {
            return Err(WireError::Malformed);
        }
        let saved = self.end;
        self.end = self.current + size;
        Ok(saved)
    }

    pub fn restore_end(&mut self, saved: usize) {
        self.end = saved;
    }

    /// Decode a possibly-compressed name.
    ///
    /// Pointers must reference a strictly earlier offset, and the chain is
    /// bounded because every jump target must be smaller than the last.
    /// After the first pointer the caller's offset rests just past it.
    pub fn get_name(&mut self) -> Result<Name, WireError> {
        let mut labels: Vec<Vec<u8>> = Vec::new();
        let mut biggest_pointer = self.current;
        let mut resume: Option<usize> = None;
        let mut total = 1usize;
        loop {
            let len = self.get_u8()? as usize;
            if len > 63 {
                if len < 192 {
                    return Err(WireError::BadLabelType);
                }
                let low = self.get_u8()? as usize;
                let target = (len - 192) * 256 + low;
                if target >= biggest_pointer {
                    return Err(WireError::PointerForward);
                }
                if resume.is_none() {
                    resume = Some(self.current);
                }
                biggest_pointer = target;
                self.seek(target)?;
            } else if len == 0 {
                break;
            } else {
                total += len + 1;
                if total > 255 {
                    return Err(WireError::NameTooLong);
                }
                labels.push(self.get_bytes(len)?.to_vec());
            }
        }
        if let Some(resume) = resume {
            self.current = resume;
        }
        Ok(Name::from_labels_unchecked(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_reads() {
        let wire = [0x04, 0xd2, 0x81, 0x80, 0x00, 0x01];
        let mut p = Parser::new(&wire);
        assert_eq!(p.get_u16().unwrap(), 0x04d2);
        assert_eq!(p.get_u32().unwrap(), 0x8180_0001);
        assert_eq!(p.remaining(), 0);
        assert_eq!(p.get_u8().unwrap_err(), WireError::Malformed);
    }

    #[test]
    fn test_get_name_plain() {
        let wire = [3, b'f', b'o', b'o', 3, b'b', b'a', b'r', 0, 0xff];
        let mut p = Parser::new(&wire);
        let name = p.get_name().unwrap();
        assert_eq!(name.to_text(), "foo.bar.");
        assert_eq!(p.current(), 9);
    }

    #[test]
    fn test_get_name_compressed() {
        // "bar." at 0, then "foo" + pointer back to 0 starting at 5
        let wire = [3, b'b', b'a', b'r', 0, 3, b'f', b'o', b'o', 0xc0, 0x00];
        let mut p = Parser::new(&wire);
        p.seek(5).unwrap();
        let name = p.get_name().unwrap();
        assert_eq!(name.to_text(), "foo.bar.");
        // the cursor advances only past the pointer
        assert_eq!(p.current(), 11);
    }

    #[test]
    fn test_forward_pointer_rejected() {
        let wire = [0xc0, 0x04, 0, 0, 3, b'f', b'o', b'o', 0];
        let mut p = Parser::new(&wire);
        assert_eq!(p.get_name().unwrap_err(), WireError::PointerForward);
    }

    #[test]
    fn test_self_pointer_rejected() {
        // a pointer to itself must not loop
        let wire = [0, 0xc0, 0x01];
        let mut p = Parser::new(&wire);
        p.seek(1).unwrap();
        assert_eq!(p.get_name().unwrap_err(), WireError::PointerForward);
    }

    #[test]
    fn test_bad_label_type() {
        let wire = [0x80, 0x00];
        let mut p = Parser::new(&wire);
        assert_eq!(p.get_name().unwrap_err(), WireError::BadLabelType);
    }

    #[test]
    fn test_name_length_cap() {
        // five 63-octet labels exceed 255 octets in wire form
        let mut wire = Vec::new();
        for _ in 0..5 {
            wire.push(63);
            wire.extend_from_slice(&[b'a'; 63]);
        }
        wire.push(0);
        let mut p = Parser::new(&wire);
        assert_eq!(p.get_name().unwrap_err(), WireError::NameTooLong);
    }

    #[test]
    fn test_restrict_to() {
        let wire = [1, 2, 3, 4, 5, 6];
        let mut p = Parser::new(&wire);
        let saved = p.restrict_to(3).unwrap();
        assert_eq!(p.remaining(), 3);
        assert_eq!(p.get_bytes(3).unwrap(), &[1, 2, 3]);
        assert_eq!(p.get_u8().unwrap_err(), WireError::Malformed);
        p.restore_end(saved);
        assert_eq!(p.get_bytes(3).unwrap(), &[4, 5, 6]);
    }

    #[test]
    fn test_restrict_past_end() {
        let wire = [0u8; 4];
        let mut p = Parser::new(&wire);
        assert_eq!(p.restrict_to(5).unwrap_err(), WireError::Malformed);
    }

    #[test]
    fn test_seek_bounds() {
        let wire = [0u8; 4];
        let mut p = Parser::new(&wire);
        p.seek(4).unwrap();
        assert_eq!(p.seek(5).unwrap_err(), WireError::Malformed);
    }
}
