//! Channel pages, page-channel bytes and channel masks.
//!
//! 802.15.4 groups channels into pages. Page 0 is the 2.4 GHz band with
//! channels 11 to 26. Sub-GHz pages 28 to 31 carry channels 0 to 26, except
//! page 29 which stops at channel 8.
//!
//! Two compact encodings are used when talking to radio drivers:
//!
//! - a **page-channel byte**: the channel number for page 0, otherwise
//!   `((page - 24) << 5) | channel`
//! - a **channel mask**: page number in bits 31..27, one bit per channel in
//!   bits 26..0
//!
//! # Example
//!
//! ```
//! use wpan_form_join::channel::{ChannelMask, PageChannel};
//!
//! let ch = PageChannel::new(28, 3).unwrap();
//! assert_eq!(ch.to_byte(), 0x83);
//! assert_eq!(PageChannel::from_byte(0x83).unwrap(), ch);
//!
//! let mask = ChannelMask::new(0, (1 << 15) | (1 << 20)).unwrap();
//! let channels: Vec<u8> = mask.iter().map(|c| c.channel()).collect();
//! assert_eq!(channels, vec![15, 20]);
//! ```

use std::fmt;

/// The 2.4 GHz page.
pub const PAGE_2_4_GHZ: u8 = 0;

/// Lowest sub-GHz page number.
pub const MIN_SUBGHZ_PAGE: u8 = 28;

/// Highest sub-GHz page number.
pub const MAX_SUBGHZ_PAGE: u8 = 31;

/// Lowest 2.4 GHz channel number.
pub const MIN_2_4_GHZ_CHANNEL: u8 = 11;

/// Highest 2.4 GHz channel number.
pub const MAX_2_4_GHZ_CHANNEL: u8 = 26;

/// Channel bits available in a mask (bits 26..0).
pub const MAX_CHANNELS_PER_PAGE: u8 = 27;

/// Every 2.4 GHz channel (11..=26).
pub const ALL_2_4_GHZ_CHANNELS: u32 = 0x07FF_F800;

/// Every channel on sub-GHz pages 28, 30 and 31.
pub const ALL_SUBGHZ_CHANNELS: u32 = 0x07FF_FFFF;

/// Every channel on sub-GHz page 29.
pub const ALL_PAGE_29_CHANNELS: u32 = 0x0000_01FF;

const PAGE_SHIFT: u32 = 27;
const PAGE_BITS: u32 = 0xF800_0000;
const SUBGHZ_BYTE_OFFSET: u8 = 24;

/// Errors for channel, page and mask values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// Page number is neither 0 nor 28..=31.
    InvalidPage(u8),
    /// Channel number does not exist on the page.
    InvalidChannel {
        /// Page the channel was requested on.
        page: u8,
        /// Offending channel number.
        channel: u8,
    },
    /// Mask sets channel bits the page does not have.
    InvalidMask(u32),
    /// Search mode bits are empty or unknown.
    InvalidSearchMode(u8),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPage(page) => write!(f, "invalid channel page {}", page),
            Self::InvalidChannel { page, channel } => {
                write!(f, "channel {} does not exist on page {}", channel, page)
            }
            Self::InvalidMask(raw) => write!(f, "invalid channel mask 0x{:08X}", raw),
            Self::InvalidSearchMode(bits) => write!(f, "invalid search mode 0x{:02X}", bits),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Channel bitmap of every channel that exists on `page`.
pub fn full_page_channels(page: u8) -> Result<u32, ChannelError> {
    match page {
        PAGE_2_4_GHZ => Ok(ALL_2_4_GHZ_CHANNELS),
        29 => Ok(ALL_PAGE_29_CHANNELS),
        28 | 30 | 31 => Ok(ALL_SUBGHZ_CHANNELS),
        _ => Err(ChannelError::InvalidPage(page)),
    }
}

/// A channel qualified by its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageChannel {
    page: u8,
    channel: u8,
}

impl PageChannel {
    /// Create a page-qualified channel, checking it exists on the page.
    pub fn new(page: u8, channel: u8) -> Result<Self, ChannelError> {
        let bits = full_page_channels(page)?;
        if channel >= MAX_CHANNELS_PER_PAGE || bits & (1 << channel) == 0 {
            return Err(ChannelError::InvalidChannel { page, channel });
        }
        Ok(Self { page, channel })
    }

    /// Page number.
    pub fn page(self) -> u8 {
        self.page
    }

    /// Channel number within the page.
    pub fn channel(self) -> u8 {
        self.channel
    }

    /// True for any page other than 2.4 GHz.
    pub fn is_subghz(self) -> bool {
        self.page != PAGE_2_4_GHZ
    }

    /// Encode as a single page-channel byte.
    pub fn to_byte(self) -> u8 {
        if self.page == PAGE_2_4_GHZ {
            self.channel
        } else {
            ((self.page - SUBGHZ_BYTE_OFFSET) << 5) | self.channel
        }
    }

    /// Decode a page-channel byte.
    pub fn from_byte(byte: u8) -> Result<Self, ChannelError> {
        let page_bits = byte >> 5;
        let page = if page_bits == 0 {
            PAGE_2_4_GHZ
        } else {
            page_bits + SUBGHZ_BYTE_OFFSET
        };
        Self::new(page, byte & 0x1F)
    }

    /// Mask selecting only this channel.
    pub fn mask(self) -> ChannelMask {
        ChannelMask::from_raw(((self.page as u32) << PAGE_SHIFT) | (1 << self.channel))
    }
}

impl fmt::Display for PageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.page == PAGE_2_4_GHZ {
            write!(f, "ch {}", self.channel)
        } else {
            write!(f, "page {} ch {}", self.page, self.channel)
        }
    }
}

/// Page-qualified channel bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChannelMask(u32);

impl ChannelMask {
    /// Every 2.4 GHz channel.
    pub const ALL_2_4_GHZ: Self = Self(ALL_2_4_GHZ_CHANNELS);

    /// Build a mask for `page` from a channel bitmap.
    pub fn new(page: u8, channels: u32) -> Result<Self, ChannelError> {
        let valid = full_page_channels(page)?;
        let raw = ((page as u32) << PAGE_SHIFT) | channels;
        if channels & !valid != 0 {
            return Err(ChannelError::InvalidMask(raw));
        }
        Ok(Self(raw))
    }

    /// Every channel that exists on `page`.
    pub fn all_channels(page: u8) -> Result<Self, ChannelError> {
        Self::new(page, full_page_channels(page)?)
    }

    /// Wrap a raw 32-bit mask without checking it.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw 32-bit representation handed to the radio driver.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Page encoded in the upper bits.
    pub fn page(self) -> u8 {
        ((self.0 & PAGE_BITS) >> PAGE_SHIFT) as u8
    }

    /// Channel bitmap without the page bits.
    pub fn channels(self) -> u32 {
        self.0 & !PAGE_BITS
    }

    /// True if no channel bit is set.
    pub fn is_empty(self) -> bool {
        self.channels() == 0
    }

    /// Number of channels selected.
    pub fn count(self) -> u32 {
        self.channels().count_ones()
    }

    /// True if `channel` is on this page and selected.
    pub fn contains(self, channel: PageChannel) -> bool {
        channel.page() == self.page() && self.channels() & (1 << channel.channel()) != 0
    }

    /// Channels of `self` that `other` does not select, on the same page.
    pub fn without(self, other: ChannelMask) -> ChannelMask {
        if other.page() != self.page() {
            return self;
        }
        Self((self.0 & PAGE_BITS) | (self.channels() & !other.channels()))
    }

    /// First selected channel at or above `cursor`.
    pub fn next_channel_from(self, cursor: u8) -> Option<PageChannel> {
        let page = self.page();
        (cursor..MAX_CHANNELS_PER_PAGE)
            .find(|ch| self.channels() & (1 << ch) != 0)
            .map(|channel| PageChannel { page, channel })
    }

    /// Iterate the selected channels in ascending order.
    pub fn iter(self) -> impl Iterator<Item = PageChannel> {
        let page = self.page();
        let channels = self.channels();
        (0..MAX_CHANNELS_PER_PAGE)
            .filter(move |ch| channels & (1 << ch) != 0)
            .map(move |channel| PageChannel { page, channel })
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} mask 0x{:07X}", self.page(), self.channels())
    }
}

/// Radio bands a discovery request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMode(u8);

impl SearchMode {
    /// 2.4 GHz only.
    pub const GHZ_2_4: Self = Self(0x01);
    /// Sub-GHz pages only.
    pub const SUB_GHZ: Self = Self(0x02);
    /// Both bands, 2.4 GHz first.
    pub const BOTH: Self = Self(0x03);

    /// Parse a search-mode bitmask.
    pub fn from_bits(bits: u8) -> Result<Self, ChannelError> {
        if bits == 0 || bits & !Self::BOTH.0 != 0 {
            return Err(ChannelError::InvalidSearchMode(bits));
        }
        Ok(Self(bits))
    }

    /// Raw bitmask.
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn includes_2_4_ghz(self) -> bool {
        self.0 & Self::GHZ_2_4.0 != 0
    }

    pub fn includes_subghz(self) -> bool {
        self.0 & Self::SUB_GHZ.0 != 0
    }
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::GHZ_2_4
    }
}
