use std::fmt;

use crate::error::WireError;

/// A domain name: a sequence of labels, stored without the trailing root
/// label.  Wire-format decoding (including compression pointers) lives in
/// the parser; encoding here is always uncompressed.
#[derive(Debug, Clone, Eq)]
pub struct Name {
    labels: Vec<Vec<u8>>,
}

impl Name {
    pub fn root() -> Name {
        Name { labels: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    /// Build a name from raw labels, enforcing the 63-octet label and
    /// 255-octet total limits.
    pub fn from_labels(labels: Vec<Vec<u8>>) -> Result<Name, WireError> {
        let mut total = 1usize;
        for label in &labels {
            if label.is_empty() {
                return Err(WireError::EmptyLabel);
            }
            if label.len() > 63 {
                return Err(WireError::LabelTooLong);
            }
            total += label.len() + 1;
        }
        if total > 255 {
            return Err(WireError::NameTooLong);
        }
        Ok(Name { labels })
    }

    // The parser has already validated lengths while reading.
    pub(crate) fn from_labels_unchecked(labels: Vec<Vec<u8>>) -> Name {
        Name { labels }
    }

    /// Parse a textual name.  A trailing dot is accepted; `""` and `"."`
    /// are the root.
    pub fn from_text(text: &str) -> Result<Name, WireError> {
        let text = text.strip_suffix('.').unwrap_or(text);
        if text.is_empty() {
            return Ok(Name::root());
        }
        let labels = text
            .split('.')
            .map(|label| label.as_bytes().to_vec())
            .collect();
        Name::from_labels(labels)
    }

    /// Absolute textual form with a trailing dot; the root is `"."`.
    pub fn to_text(&self) -> String {
        if self.labels.is_empty() {
            return ".".to_string();
        }
        let mut out = String::new();
        for label in &self.labels {
            out.push_str(&String::from_utf8_lossy(label));
            out.push('.');
        }
        out
    }

    /// Encoded length, including the root terminator.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Append the uncompressed wire form.
    pub fn to_wire(&self, buf: &mut Vec<u8>) {
        for label in &self.labels {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label);
        }
        buf.push(0);
    }
}

// Names compare case-insensitively, per RFC 1035.
impl PartialEq for Name {
    fn eq(&self, other: &Name) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(other.labels.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
