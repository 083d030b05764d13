//! Discovery policy configuration.

use crate::channel::{
    ChannelError, ChannelMask, SearchMode, MAX_SUBGHZ_PAGE, MIN_SUBGHZ_PAGE, PAGE_2_4_GHZ,
};
use crate::joinable::ExtendedPanId;
use crate::session::SessionConfig;
use heapless::Vec;
use std::fmt;
use std::time::Duration;

/// Sub-GHz pages a policy can name (28 to 31).
pub const MAX_SUBGHZ_PAGES: usize = 4;

/// Pages one search can walk: 2.4 GHz plus every sub-GHz page.
pub const MAX_SEARCH_PAGES: usize = MAX_SUBGHZ_PAGES + 1;

/// Preferred 2.4 GHz channels: 11, 14, 15, 19, 20, 24 and 25.
pub const PREFERRED_2_4_GHZ_CHANNELS: u32 = 0x0318_C800;

/// Default post-join confirmation window.
pub const DEFAULT_POST_JOIN_WINDOW: Duration = Duration::from_secs(60);

/// Ordered masks a search walks, one per page.
pub type PageList = Vec<ChannelMask, MAX_SEARCH_PAGES>;

/// Configuration for the discovery orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Channels to use on the 2.4 GHz page.
    pub primary_mask: ChannelMask,

    /// Channels to use on each sub-GHz page, at most one mask per page.
    pub subghz_masks: Vec<ChannelMask, MAX_SUBGHZ_PAGES>,

    /// Bands a search may use.
    pub search_mode: SearchMode,

    /// Network to join; the all-zero value accepts any network.
    pub extended_pan_id: ExtendedPanId,

    /// Retry a failed join search once on the channels the masks left out.
    /// Channels already scanned in the first pass are skipped, not rescanned.
    pub scan_all_channels: bool,

    /// Form on 2.4 GHz, then pick a sub-GHz channel for the second interface.
    pub dual_phy: bool,

    /// How long after a join the application may still leave and resume.
    pub post_join_window: Duration,

    /// Scan durations, timeouts and buffer budgets.
    pub session: SessionConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            primary_mask: ChannelMask::from_raw(PREFERRED_2_4_GHZ_CHANNELS),
            subghz_masks: Vec::new(),
            search_mode: SearchMode::GHZ_2_4,
            extended_pan_id: ExtendedPanId::WILDCARD,
            scan_all_channels: false,
            dual_phy: false,
            post_join_window: DEFAULT_POST_JOIN_WINDOW,
            session: SessionConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Validate configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `primary_mask` is not a valid 2.4 GHz mask
    /// - a sub-GHz mask is invalid, not on page 28..=31, or repeats a page
    /// - dual-PHY is enabled without any sub-GHz channel
    /// - the search mode leaves no channel to scan
    /// - `post_join_window` is zero
    /// - the session configuration is invalid
    pub fn validate(&self) -> Result<(), DiscoveryConfigError> {
        if self.primary_mask.page() != PAGE_2_4_GHZ {
            return Err(DiscoveryConfigError::InvalidConfig(
                "primary_mask must be on page 0",
            ));
        }
        check_mask(self.primary_mask)?;

        for (i, mask) in self.subghz_masks.iter().enumerate() {
            if !(MIN_SUBGHZ_PAGE..=MAX_SUBGHZ_PAGE).contains(&mask.page()) {
                return Err(DiscoveryConfigError::InvalidConfig(
                    "subghz_masks must be on pages 28 to 31",
                ));
            }
            check_mask(*mask)?;
            if self.subghz_masks[..i]
                .iter()
                .any(|other| other.page() == mask.page())
            {
                return Err(DiscoveryConfigError::InvalidConfig(
                    "subghz_masks must name each page once",
                ));
            }
        }

        if self.dual_phy && self.secondary_pages().is_empty() {
            return Err(DiscoveryConfigError::InvalidConfig(
                "dual_phy needs at least one sub-GHz channel",
            ));
        }
        if self.search_pages().is_empty() {
            return Err(DiscoveryConfigError::InvalidConfig(
                "search_mode leaves no channel to scan",
            ));
        }
        if self.post_join_window.is_zero() {
            return Err(DiscoveryConfigError::InvalidConfig(
                "post_join_window must be non-zero",
            ));
        }
        self.session
            .validate()
            .map_err(|_| DiscoveryConfigError::InvalidConfig("invalid session config"))
    }

    /// Configured mask for `page`, if any.
    pub fn mask_for(&self, page: u8) -> Option<ChannelMask> {
        if page == PAGE_2_4_GHZ {
            return Some(self.primary_mask);
        }
        self.subghz_masks
            .iter()
            .find(|mask| mask.page() == page)
            .copied()
    }

    /// Store `mask` as the mask of its page, replacing any previous one.
    pub fn set_mask(&mut self, mask: ChannelMask) -> Result<(), DiscoveryConfigError> {
        if mask.page() == PAGE_2_4_GHZ {
            self.primary_mask = mask;
            return Ok(());
        }
        if let Some(slot) = self
            .subghz_masks
            .iter_mut()
            .find(|slot| slot.page() == mask.page())
        {
            *slot = mask;
            return Ok(());
        }
        self.subghz_masks
            .push(mask)
            .map_err(|_| DiscoveryConfigError::InvalidConfig("too many sub-GHz masks"))
    }

    /// Non-empty masks the search mode enables, 2.4 GHz first.
    pub fn search_pages(&self) -> PageList {
        let mut pages = PageList::new();
        if self.search_mode.includes_2_4_ghz() && !self.primary_mask.is_empty() {
            let _ = pages.push(self.primary_mask);
        }
        if self.search_mode.includes_subghz() {
            for mask in self.subghz_masks.iter().filter(|mask| !mask.is_empty()) {
                let _ = pages.push(*mask);
            }
        }
        pages
    }

    /// Masks the primary interface forms on.
    pub fn form_pages(&self) -> PageList {
        if self.dual_phy {
            let mut pages = PageList::new();
            if !self.primary_mask.is_empty() {
                let _ = pages.push(self.primary_mask);
            }
            pages
        } else {
            self.search_pages()
        }
    }

    /// Sub-GHz masks the second interface picks its channel from.
    pub fn secondary_pages(&self) -> PageList {
        self.subghz_masks
            .iter()
            .filter(|mask| !mask.is_empty())
            .copied()
            .collect()
    }

    /// Channels of the searched pages that the configured masks leave out.
    pub fn unscanned_pages(&self) -> PageList {
        self.search_pages()
            .iter()
            .filter_map(|mask| {
                ChannelMask::all_channels(mask.page())
                    .ok()
                    .map(|full| full.without(*mask))
            })
            .filter(|rest| !rest.is_empty())
            .collect()
    }
}

/// Every channel of each page in `pages`.
pub fn full_pages(pages: &PageList) -> PageList {
    pages
        .iter()
        .filter_map(|mask| ChannelMask::all_channels(mask.page()).ok())
        .collect()
}

fn check_mask(mask: ChannelMask) -> Result<(), DiscoveryConfigError> {
    ChannelMask::new(mask.page(), mask.channels())
        .map(|_| ())
        .map_err(DiscoveryConfigError::Channel)
}

/// Error type for discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryConfigError {
    /// Invalid configuration parameter.
    InvalidConfig(&'static str),
    /// Invalid channel, page or mask.
    Channel(ChannelError),
}

impl fmt::Display for DiscoveryConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid discovery config: {}", msg),
            Self::Channel(e) => write!(f, "invalid discovery config: {}", e),
        }
    }
}

impl std::error::Error for DiscoveryConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mask;

    fn subghz(page: u8, channels: u32) -> ChannelMask {
        ChannelMask::new(page, channels).unwrap()
    }

    fn both_bands() -> DiscoveryConfig {
        let mut config = DiscoveryConfig {
            search_mode: SearchMode::BOTH,
            ..Default::default()
        };
        config.subghz_masks.push(subghz(28, 0b110)).unwrap();
        config.subghz_masks.push(subghz(30, 0)).unwrap();
        config
    }

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.primary_mask.count(), 7);
        assert_eq!(config.search_pages().len(), 1);
    }

    #[test]
    fn test_search_pages_order_and_empty_skip() {
        let config = both_bands();
        let pages = config.search_pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page(), 0);
        assert_eq!(pages[1].page(), 28);
    }

    #[test]
    fn test_subghz_only() {
        let config = DiscoveryConfig {
            search_mode: SearchMode::SUB_GHZ,
            ..both_bands()
        };
        let pages = config.search_pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page(), 28);
    }

    #[test]
    fn test_dual_phy_forms_on_2_4_only() {
        let config = DiscoveryConfig {
            dual_phy: true,
            ..both_bands()
        };
        assert!(config.validate().is_ok());
        let form = config.form_pages();
        assert_eq!(form.len(), 1);
        assert_eq!(form[0].page(), 0);
        assert_eq!(config.secondary_pages().len(), 1);
    }

    #[test]
    fn test_dual_phy_requires_subghz() {
        let config = DiscoveryConfig {
            dual_phy: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DiscoveryConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_masks() {
        let config = DiscoveryConfig {
            primary_mask: ChannelMask::from_raw(1 << 3),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DiscoveryConfigError::Channel(_))
        ));

        let mut config = DiscoveryConfig::default();
        config.subghz_masks.push(subghz(28, 1)).unwrap();
        config.subghz_masks.push(subghz(28, 2)).unwrap();
        assert!(config.validate().is_err());

        let mut config = DiscoveryConfig::default();
        config.subghz_masks.push(ChannelMask::ALL_2_4_GHZ).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_channel_to_scan() {
        let config = DiscoveryConfig {
            search_mode: SearchMode::SUB_GHZ,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_mask_replaces_same_page() {
        let mut config = DiscoveryConfig::default();
        config.set_mask(subghz(29, 0b1)).unwrap();
        config.set_mask(subghz(29, 0b10)).unwrap();
        config.set_mask(mask(&[20])).unwrap();
        assert_eq!(config.subghz_masks.len(), 1);
        assert_eq!(config.mask_for(29).unwrap().channels(), 0b10);
        assert_eq!(config.mask_for(0).unwrap(), mask(&[20]));
        assert_eq!(config.mask_for(31), None);
    }

    #[test]
    fn test_unscanned_pages() {
        let config = DiscoveryConfig {
            primary_mask: mask(&[11, 15]),
            ..Default::default()
        };
        let rest = config.unscanned_pages();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].count(), 14);
        assert!(!rest[0].contains(crate::testing::ch(11)));

        let everything = DiscoveryConfig {
            primary_mask: ChannelMask::ALL_2_4_GHZ,
            ..Default::default()
        };
        assert!(everything.unscanned_pages().is_empty());
    }

    #[test]
    fn test_full_pages() {
        let config = both_bands();
        let full = full_pages(&config.search_pages());
        assert_eq!(full[0], ChannelMask::ALL_2_4_GHZ);
        assert_eq!(full[1].count(), 27);
    }
}
