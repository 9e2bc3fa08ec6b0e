use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{Position, ReferenceGenome};
use crate::UncertaintyError;

/// Interval restriction on a reference sequence, 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Reference sequence name.
    pub sequence: Arc<str>,
    /// First offset included.
    pub start: u32,
    /// Last offset included; `None` runs to the end of the sequence.
    pub end: Option<u32>,
}

impl Region {
    /// Construct a region; `start` is clamped to 1.
    pub fn new(
        sequence: impl Into<Arc<str>>,
        start: u32,
        end: Option<u32>,
    ) -> Result<Self, UncertaintyError> {
        let sequence = sequence.into();
        let start = start.max(1);
        if let Some(end) = end {
            if end < start {
                return Err(UncertaintyError::InvalidRegion {
                    region: format!("{sequence}:{start}-{end}"),
                    reason: "end precedes start".to_string(),
                });
            }
        }
        Ok(Self {
            sequence,
            start,
            end,
        })
    }

    /// Whole sequence.
    pub fn whole(sequence: impl Into<Arc<str>>) -> Self {
        Self {
            sequence: sequence.into(),
            start: 1,
            end: None,
        }
    }

    /// Parse a region against the loaded reference.
    ///
    /// Text naming a reference sequence exactly selects all of it, so names holding
    /// colons need no braces. Otherwise the text is parsed as `chr:start-end` and the
    /// sequence must exist.
    pub fn resolve(text: &str, reference: &ReferenceGenome) -> Result<Self, UncertaintyError> {
        let text = text.trim();
        if reference.sequence_len(text).is_some() {
            return Ok(Self::whole(text));
        }
        let region: Region = text.parse()?;
        if reference.sequence_len(&region.sequence).is_none() {
            return Err(UncertaintyError::InvalidRegion {
                region: text.to_string(),
                reason: format!("sequence {} is not in the reference", region.sequence),
            });
        }
        Ok(region)
    }

    /// Whether the position falls inside the region.
    pub fn contains(&self, position: &Position) -> bool {
        position.sequence == self.sequence
            && position.offset >= self.start
            && self.end.map_or(true, |end| position.offset <= end)
    }
}

impl FromStr for Region {
    type Err = UncertaintyError;

    /// Parse `chr`, `chr:start`, `chr:start-end` or `chr:-end`; commas in numbers are ignored.
    ///
    /// A name holding colons can be wrapped in braces, as in `{HLA-A*01:01}:5-9`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| UncertaintyError::InvalidRegion {
            region: s.to_string(),
            reason: reason.to_string(),
        };
        let parse_offset = |text: &str| -> Result<Option<u32>, UncertaintyError> {
            let cleaned = text.trim().replace(',', "");
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse::<u32>()
                .map(Some)
                .map_err(|_| invalid("offset is not a number"))
        };

        let s_trimmed = s.trim();
        let (name, range) = if let Some(braced) = s_trimmed.strip_prefix('{') {
            let (name, rest) = braced
                .split_once('}')
                .ok_or_else(|| invalid("unclosed brace"))?;
            match rest {
                "" => (name, None),
                _ => (
                    name,
                    Some(
                        rest.strip_prefix(':')
                            .ok_or_else(|| invalid("expected ':' after braced name"))?,
                    ),
                ),
            }
        } else {
            match s_trimmed.rsplit_once(':') {
                Some((name, range)) => (name, Some(range)),
                None => (s_trimmed, None),
            }
        };
        if name.is_empty() {
            return Err(invalid("missing sequence name"));
        }

        let (start, end) = match range {
            None => (None, None),
            Some(range) => match range.split_once('-') {
                Some((start, end)) => (parse_offset(start)?, parse_offset(end)?),
                None => (parse_offset(range)?, None),
            },
        };

        Region::new(name, start.unwrap_or(1), end)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}:{}-{}", self.sequence, self.start, end),
            None => write!(f, "{}:{}-", self.sequence, self.start),
        }
    }
}
