use crate::error::{FetchError, Result};

/// Request header asking for everything from `offset` onwards.
pub fn range_header(offset: u64) -> (String, String) { ("Range".to_string(), format!("bytes={offset}-")) }

/// A parsed `Content-Range` response header.
///
/// `start` and `end` are `None` only for the unsatisfied form `bytes */<total>`
/// sent along with `416 Range Not Satisfiable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: Option<u64>,
    pub end:   Option<u64>,
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parses `bytes <start>-<end>/<total>`, `bytes <start>-<end>/*` and
    /// `bytes */<total>`.
    ///
    /// ```
    /// use recache_fetch::ContentRange;
    ///
    /// let range = ContentRange::parse("bytes 100-199/1000").unwrap();
    /// assert_eq!(range.start, Some(100));
    /// assert_eq!(range.total, Some(1000));
    /// assert_eq!(range.len(), Some(100));
    /// ```
    pub fn parse(header: &str) -> Result<Self> {
        let invalid = || FetchError::InvalidContentRange(header.to_string());

        let rest = header.trim().strip_prefix("bytes").ok_or_else(invalid)?;
        if !rest.starts_with(char::is_whitespace) {
            return Err(invalid());
        }
        let (span, total) = rest.trim_start().split_once('/').ok_or_else(invalid)?;

        let total = match total.trim() {
            "*" => None,
            digits => Some(parse_number(digits).ok_or_else(invalid)?),
        };

        if span.trim() == "*" {
            return match total {
                Some(_) => Ok(Self {
                    start: None,
                    end: None,
                    total,
                }),
                None => Err(invalid()),
            };
        }

        let (start, end) = span.split_once('-').ok_or_else(invalid)?;
        let start = parse_number(start).ok_or_else(invalid)?;
        let end = parse_number(end).ok_or_else(invalid)?;
        if end < start || total.is_some_and(|total| end >= total) {
            return Err(invalid());
        }

        Ok(Self {
            start: Some(start),
            end: Some(end),
            total,
        })
    }

    pub fn is_unsatisfied(&self) -> bool { self.start.is_none() }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> Option<u64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start + 1),
            _ => None,
        }
    }
}

fn parse_number(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
