use crate::types::NO_LIMIT;
use std::convert::TryFrom;

// Term flips are rare in practice, so a handful of cached flips cover the usual suffix.
const DEFAULT_TERM_CACHE_SIZE: usize = 4;

#[derive(Clone, Debug, Default)]
pub struct RaftLogOptions {
    /// Number of term changes remembered by the term cache.
    pub term_cache_size: Option<usize>,
    /// Byte budget of a single `next_committed_ents` batch. Unlimited by default.
    pub max_committed_size_per_ready: Option<u64>,
}

#[derive(Copy, Clone, Debug)]
pub(super) struct RaftLogOptionsValidated {
    pub term_cache_size: usize,
    pub max_committed_size_per_ready: u64,
}

impl RaftLogOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.term_cache_size == 0 {
            return Err("Term cache must hold at least one entry");
        }
        if self.max_committed_size_per_ready == 0 {
            return Err("Committed entries batch size must be positive");
        }

        Ok(())
    }
}

impl TryFrom<RaftLogOptions> for RaftLogOptionsValidated {
    type Error = &'static str;

    fn try_from(options: RaftLogOptions) -> Result<Self, Self::Error> {
        let values = RaftLogOptionsValidated {
            term_cache_size: options.term_cache_size.unwrap_or(DEFAULT_TERM_CACHE_SIZE),
            max_committed_size_per_ready: options.max_committed_size_per_ready.unwrap_or(NO_LIMIT),
        };

        values.validate()?;
        Ok(values)
    }
}
