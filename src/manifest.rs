//! Remote version manifest: one `identifier==version` entry per line.

/// Published versions keyed by bot identifier, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionManifest {
    entries: Vec<(String, String)>,
}

impl VersionManifest {
    /// Parse a manifest body. Blank lines and lines without `==` are skipped;
    /// both halves are whitespace-trimmed and the version is everything after
    /// the first separator.
    pub fn parse(body: &str) -> Self {
        let entries = body
            .lines()
            .filter_map(|line| {
                let (key, version) = line.split_once("==")?;
                let key = key.trim();
                let version = version.trim();
                if key.is_empty() || version.is_empty() {
                    return None;
                }
                Some((key.to_string(), version.to_string()))
            })
            .collect();
        Self { entries }
    }

    /// Published version for `identifier`. The first matching line wins.
    pub fn version_for(&self, identifier: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == identifier)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lookup() {
        let m = VersionManifest::parse("moderation-bot.js==1.0.2\nwelcome-bot.js==1.0.5\n");
        assert_eq!(m.len(), 2);
        assert_eq!(m.version_for("moderation-bot.js"), Some("1.0.2"));
        assert_eq!(m.version_for("welcome-bot.js"), Some("1.0.5"));
        assert_eq!(m.version_for("message-logger.js"), None);
    }

    #[test]
    fn test_trims_whitespace_and_crlf() {
        let m = VersionManifest::parse("  addcommands-bot.js == 2.1.0 \r\n");
        assert_eq!(m.version_for("addcommands-bot.js"), Some("2.1.0"));
    }

    #[test]
    fn test_key_must_match_exactly() {
        // A prefix match would let "moderation-bot.js.bak" shadow the real entry.
        let m = VersionManifest::parse("moderation-bot.js.bak==9.9.9\nmoderation-bot.js==1.0.0\n");
        assert_eq!(m.version_for("moderation-bot.js"), Some("1.0.0"));
        assert_eq!(m.version_for("moderation"), None);
    }

    #[test]
    fn test_skips_malformed_lines() {
        let m = VersionManifest::parse("# versions\n\nno separator\n==1.0\nbot==\nbot==1.2\n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.version_for("bot"), Some("1.2"));
    }

    #[test]
    fn test_first_entry_wins() {
        let m = VersionManifest::parse("bot==1.0\nbot==2.0\n");
        assert_eq!(m.version_for("bot"), Some("1.0"));
    }

    #[test]
    fn test_version_keeps_later_separators() {
        let m = VersionManifest::parse("bot==1.0==beta\n");
        assert_eq!(m.version_for("bot"), Some("1.0==beta"));
    }

    #[test]
    fn test_empty_body() {
        assert!(VersionManifest::parse("").is_empty());
    }
}
