//! Path allow/deny lists for worker location filtering.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Location restrictions declared by a worker.
///
/// Deny entries win over allow entries. An empty allow list allows every
/// location that is not denied. Matching is by path component prefix, so
/// `/media/usb` covers `/media/usb/a.png` but not `/media/usb2/a.png`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LocationFilter {
    #[serde(default)]
    pub allow: Vec<PathBuf>,
    #[serde(default)]
    pub deny: Vec<PathBuf>,
}

impl LocationFilter {
    pub fn new(allow: Vec<PathBuf>, deny: Vec<PathBuf>) -> Self {
        Self { allow, deny }
    }

    pub fn allows(&self, path: &Path) -> bool {
        if self.deny.iter().any(|d| path.starts_with(d)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| path.starts_with(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_allows_everything() {
        assert!(LocationFilter::default().allows(Path::new("/any/where.png")));
    }

    #[test]
    fn deny_wins_over_allow() {
        let filter = LocationFilter::new(vec!["/home".into()], vec!["/home/u/private".into()]);
        assert!(filter.allows(Path::new("/home/u/pics/a.png")));
        assert!(!filter.allows(Path::new("/home/u/private/a.png")));
        assert!(!filter.allows(Path::new("/srv/a.png")));
    }

    #[test]
    fn matches_whole_components() {
        let filter = LocationFilter::new(vec![], vec!["/media/usb".into()]);
        assert!(!filter.allows(Path::new("/media/usb/a.png")));
        assert!(filter.allows(Path::new("/media/usb2/a.png")));
    }
}
