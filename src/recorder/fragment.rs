//! Recorded fragments
//!
//! A recording arrives as a sequence of encoded chunks. Only their
//! concatenation, in arrival order, is a valid media file.

/// One chunk of encoded media data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    data: Vec<u8>,
}

impl Fragment {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Fragment {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for Fragment {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

/// Append-only, ordered log of the fragments of one session
///
/// Consumed exactly once by `into_bytes` when the session is finalized.
#[derive(Debug, Default)]
pub struct FragmentLog {
    fragments: Vec<Fragment>,
    total_bytes: usize,
    dropped_empty: usize,
}

impl FragmentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment; empty fragments are discarded
    ///
    /// Returns whether the fragment was kept.
    pub fn append(&mut self, fragment: Fragment) -> bool {
        if fragment.is_empty() {
            self.dropped_empty += 1;
            return false;
        }
        self.total_bytes += fragment.len();
        self.fragments.push(fragment);
        true
    }

    /// Number of fragments kept
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of empty fragments that were discarded
    pub fn dropped_empty(&self) -> usize {
        self.dropped_empty
    }

    /// Concatenate every fragment in arrival order
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.total_bytes);
        for fragment in self.fragments {
            bytes.extend_from_slice(fragment.as_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_fragments_are_dropped() {
        let mut log = FragmentLog::new();

        assert!(log.append(Fragment::new(b"A".to_vec())));
        assert!(!log.append(Fragment::new(Vec::new())));
        assert!(log.append(Fragment::new(b"B".to_vec())));

        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped_empty(), 1);
        assert_eq!(log.into_bytes(), b"AB".to_vec());
    }

    #[test]
    fn test_concatenation_keeps_arrival_order() {
        let mut log = FragmentLog::new();
        for chunk in [&b"\x1a\x45"[..], b"\xdf\xa3", b"cluster-1", b"cluster-2"] {
            log.append(Fragment::from(chunk));
        }

        assert_eq!(log.total_bytes(), 22);
        assert_eq!(log.into_bytes(), b"\x1a\x45\xdf\xa3cluster-1cluster-2".to_vec());
    }

    #[test]
    fn test_empty_log_yields_no_bytes() {
        let log = FragmentLog::new();
        assert!(log.is_empty());
        assert!(log.into_bytes().is_empty());
    }
}
