//! Byte ranges taken from an inbound `Range` header.

/// A `Range` header value, kept verbatim so it can be passed straight
/// through to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRange(String);

/// How a range applies to an object of a known length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Header not understood; serve the whole object.
    Full,
    /// Inclusive byte bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

impl FileRange {
    pub fn new(header: impl Into<String>) -> Self {
        Self(header.into())
    }

    /// `None` for a missing or blank header.
    pub fn from_header(header: Option<&str>) -> Option<Self> {
        header
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Apply the first range of a `bytes=` header to an object of `len`
    /// bytes, following RFC 9110 rules for open-ended and suffix ranges.
    pub fn resolve(&self, len: u64) -> RangeOutcome {
        let Some(spec) = self.0.trim().strip_prefix("bytes=") else {
            return RangeOutcome::Full;
        };
        let first = spec.split(',').next().unwrap_or_default().trim();
        let Some((start, end)) = first.split_once('-') else {
            return RangeOutcome::Full;
        };

        match (start.trim(), end.trim()) {
            ("", "") => RangeOutcome::Full,
            ("", suffix) => match suffix.parse::<u64>() {
                Ok(0) => RangeOutcome::Unsatisfiable,
                Ok(_) if len == 0 => RangeOutcome::Unsatisfiable,
                Ok(n) => RangeOutcome::Partial {
                    start: len.saturating_sub(n),
                    end: len - 1,
                },
                Err(_) => RangeOutcome::Full,
            },
            (start, end) => {
                let Ok(start) = start.parse::<u64>() else {
                    return RangeOutcome::Full;
                };
                let end = if end.is_empty() {
                    None
                } else {
                    match end.parse::<u64>() {
                        Ok(end) => Some(end),
                        Err(_) => return RangeOutcome::Full,
                    }
                };
                if start >= len {
                    return RangeOutcome::Unsatisfiable;
                }
                match end {
                    Some(end) if end < start => RangeOutcome::Full,
                    Some(end) => RangeOutcome::Partial {
                        start,
                        end: end.min(len - 1),
                    },
                    None => RangeOutcome::Partial {
                        start,
                        end: len - 1,
                    },
                }
            }
        }
    }
}
