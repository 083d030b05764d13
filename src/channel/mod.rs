//! Channel model and energy-scan channel selection.
//!
//! This module contains:
//! - [`page`]: Pages, page-channel bytes, channel masks and search modes
//! - [`reservoir`]: Candidate reservoir picking a quiet channel from an energy scan

mod page;
mod reservoir;

pub use page::{
    full_page_channels, ChannelError, ChannelMask, PageChannel, SearchMode, ALL_2_4_GHZ_CHANNELS,
    ALL_PAGE_29_CHANNELS, ALL_SUBGHZ_CHANNELS, MAX_2_4_GHZ_CHANNEL, MAX_CHANNELS_PER_PAGE,
    MAX_SUBGHZ_PAGE, MIN_2_4_GHZ_CHANNEL, MIN_SUBGHZ_PAGE, PAGE_2_4_GHZ,
};
pub use reservoir::{
    candidates_for_budget, CandidateReservoir, ChannelCandidate, ReservoirError,
    CANDIDATE_ENTRY_BYTES, DEFAULT_CANDIDATE_BUFFER_BYTES, ENERGY_FUZZ, MAX_CHANNEL_CANDIDATES,
    MAX_ENERGY,
};
