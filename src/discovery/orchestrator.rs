//! Discovery orchestrator.
//!
//! Turns the two application goals, "form a network" and "join a network",
//! into a sequence of scan sessions across channel pages:
//!
//! - **Form**: energy scan each enabled page into one reservoir, pick a quiet
//!   channel, then search it for an unused PAN ID. If no channel is viable the
//!   energy scan is repeated once over every channel of those pages. With
//!   dual-PHY the primary interface forms on 2.4 GHz; once the application
//!   reports the network up, a second energy scan picks the sub-GHz channel.
//! - **Join**: joinable scan each enabled page in turn, handing networks to
//!   the application one at a time. When every page is exhausted and
//!   scan-all-channels is set, the channels the masks left out are tried once.
//!   After a successful join the search stays resumable for a confirmation
//!   window; leaving in that window continues with the next network.
//!
//! All inputs go through [`Orchestrator::step`], which returns the
//! notifications the application must act on instead of calling back into it.

use super::config::{full_pages, DiscoveryConfig, DiscoveryConfigError, PageList};
use super::notify::{DiscoveryEvent, Notifications};
use crate::buffer::BufferProvider;
use crate::channel::{ChannelError, ChannelMask, SearchMode};
use crate::joinable::ExtendedPanId;
use crate::radio::{Radio, RadioEvent};
use crate::session::{ScanError, ScanSession, SessionOutcome, Timer};
use log::{debug, info, warn};
use rand_core::RngCore;
use std::fmt;
use std::mem;
use std::time::Instant;

/// Inputs the orchestrator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Find a channel and unused PAN ID to form on.
    FindUnusedPanId,
    /// Find a joinable network.
    FindJoinableNetwork,
    /// Skip the offered network and continue the search.
    ContinueSearch,
    /// Joining the offered network failed.
    JoinFailed,
    /// Joining the offered network succeeded.
    Joined,
    /// The node left the network it joined.
    LeftNetwork,
    /// The formed network is up.
    NetworkUp,
    /// Abandon the current search.
    Abort,
    /// Event from the radio driver.
    Radio(RadioEvent),
    /// Check timers.
    Poll,
}

/// Externally visible orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    /// Energy scanning for the primary interface.
    Forming,
    /// Searching the chosen channel for an unused PAN ID.
    ChoosingPanId,
    /// Waiting for the application to bring the formed network up.
    AwaitingNetworkUp,
    /// Energy scanning for the second interface.
    SecondaryScan,
    /// Joinable scan running.
    Joining,
    /// A network was offered; waiting for the join result.
    Offering,
    /// Joined; the application may still leave and resume.
    JoinWindow,
}

/// Errors returned synchronously by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Policy changes are refused while a search is active.
    Busy,
    /// Invalid configuration.
    Config(DiscoveryConfigError),
    /// The request was refused by the scan session.
    Scan(ScanError),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "search in progress"),
            Self::Config(e) => write!(f, "{}", e),
            Self::Scan(e) => write!(f, "scan error: {}", e),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Scan(e) => Some(e),
            Self::Busy => None,
        }
    }
}

impl From<ScanError> for DiscoveryError {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}

impl From<DiscoveryConfigError> for DiscoveryError {
    fn from(e: DiscoveryConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ChannelError> for DiscoveryError {
    fn from(e: ChannelError) -> Self {
        Self::Config(DiscoveryConfigError::Channel(e))
    }
}

/// Pages a search walks, and whether its one fallback pass was used.
#[derive(Debug, Clone)]
struct PagePlan {
    pages: PageList,
    next: usize,
    fallback_used: bool,
}

impl PagePlan {
    fn new(pages: PageList) -> Self {
        Self {
            pages,
            next: 0,
            fallback_used: false,
        }
    }

    fn next_page(&mut self) -> Option<ChannelMask> {
        let mask = self.pages.get(self.next).copied();
        if mask.is_some() {
            self.next += 1;
        }
        mask
    }

    fn fall_back(&mut self, pages: PageList) {
        self.pages = pages;
        self.next = 0;
        self.fallback_used = true;
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Forming(PagePlan),
    ChoosingPanId,
    AwaitingNetworkUp,
    Secondary(PagePlan),
    Joining(PagePlan),
    Offering(PagePlan),
    JoinWindow { plan: PagePlan, window: Timer },
}

/// Policy layer sequencing scan sessions for form and join requests.
pub struct Orchestrator<R, B, G> {
    config: DiscoveryConfig,
    session: ScanSession<R, B, G>,
    phase: Phase,
}

impl<R: Radio, B: BufferProvider, G: RngCore> Orchestrator<R, B, G> {
    /// Create an idle orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: DiscoveryConfig,
        radio: R,
        buffers: B,
        rng: G,
    ) -> Result<Self, DiscoveryError> {
        config.validate()?;
        let session = ScanSession::new(config.session, radio, buffers, rng)
            .map_err(|_| DiscoveryConfigError::InvalidConfig("invalid session config"))?;
        Ok(Self {
            config,
            session,
            phase: Phase::Idle,
        })
    }

    /// Feed one input and collect the resulting notifications.
    ///
    /// # Errors
    ///
    /// - [`ScanError::AlreadyScanning`] for a new request while a search is active
    /// - [`ScanError::InvalidCall`] for an input the current state does not expect
    /// - [`ScanError::NoBuffers`] or a radio error if a search could not start
    pub fn step(&mut self, input: Input, now: Instant) -> Result<Notifications, DiscoveryError> {
        match input {
            Input::FindUnusedPanId => self.start_form(),
            Input::FindJoinableNetwork => self.start_join(),
            Input::ContinueSearch | Input::JoinFailed => {
                if !matches!(self.phase, Phase::Offering(_)) {
                    return Err(ScanError::InvalidCall.into());
                }
                self.resume_join(now)
            }
            Input::Joined => self.on_joined(now),
            Input::LeftNetwork => self.on_left_network(now),
            Input::NetworkUp => self.on_network_up(),
            Input::Abort => {
                self.stop();
                Ok(Notifications::new())
            }
            Input::Radio(event) => {
                let outcome = self.session.handle(event, now);
                Ok(self.on_outcome(outcome, now))
            }
            Input::Poll => Ok(self.on_poll(now)),
        }
    }

    // ==================== Application requests ====================

    /// Start looking for a channel and PAN ID to form a network on.
    pub fn find_unused_pan_id_and_form(
        &mut self,
        now: Instant,
    ) -> Result<Notifications, DiscoveryError> {
        self.step(Input::FindUnusedPanId, now)
    }

    /// Start looking for a network to join.
    pub fn find_joinable_network(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        self.step(Input::FindJoinableNetwork, now)
    }

    /// Skip the offered network and continue with the next one.
    pub fn continue_search(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        self.step(Input::ContinueSearch, now)
    }

    /// Report that joining the offered network failed.
    pub fn join_failed(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        self.step(Input::JoinFailed, now)
    }

    /// Report that the offered network was joined.
    pub fn joined(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        self.step(Input::Joined, now)
    }

    /// Report that the node left the network it joined.
    pub fn left_network(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        self.step(Input::LeftNetwork, now)
    }

    /// Report that the formed network is up.
    pub fn network_up(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        self.step(Input::NetworkUp, now)
    }

    /// Abandon the current search.
    pub fn abort(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        self.step(Input::Abort, now)
    }

    /// Feed a radio driver event.
    pub fn handle_radio(
        &mut self,
        event: RadioEvent,
        now: Instant,
    ) -> Result<Notifications, DiscoveryError> {
        self.step(Input::Radio(event), now)
    }

    /// Check timers.
    pub fn poll(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        self.step(Input::Poll, now)
    }

    // ==================== Policy ====================

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Replace the whole policy.
    pub fn set_config(&mut self, config: DiscoveryConfig) -> Result<(), DiscoveryError> {
        self.ensure_quiet()?;
        config.validate()?;
        self.session
            .set_config(config.session)
            .map_err(|_| DiscoveryConfigError::InvalidConfig("invalid session config"))?;
        self.config = config;
        Ok(())
    }

    /// Set the channel mask of the mask's page.
    pub fn set_channel_mask(&mut self, mask: ChannelMask) -> Result<(), DiscoveryError> {
        let mask = ChannelMask::new(mask.page(), mask.channels())?;
        self.update(|config| config.set_mask(mask))
    }

    /// Channel mask configured for `page`.
    pub fn channel_mask(&self, page: u8) -> Option<ChannelMask> {
        self.config.mask_for(page)
    }

    /// Set the search-mode bitmask.
    pub fn set_search_mode(&mut self, bits: u8) -> Result<(), DiscoveryError> {
        let mode = SearchMode::from_bits(bits)?;
        self.update(|config| {
            config.search_mode = mode;
            Ok(())
        })
    }

    pub fn search_mode(&self) -> SearchMode {
        self.config.search_mode
    }

    /// Restrict joins to one network, or accept any with the all-zero value.
    pub fn set_extended_pan_id(&mut self, id: ExtendedPanId) -> Result<(), DiscoveryError> {
        self.update(|config| {
            config.extended_pan_id = id;
            Ok(())
        })
    }

    pub fn extended_pan_id(&self) -> ExtendedPanId {
        self.config.extended_pan_id
    }

    pub fn set_scan_all_channels(&mut self, enabled: bool) -> Result<(), DiscoveryError> {
        self.update(|config| {
            config.scan_all_channels = enabled;
            Ok(())
        })
    }

    pub fn scan_all_channels(&self) -> bool {
        self.config.scan_all_channels
    }

    pub fn set_dual_phy(&mut self, enabled: bool) -> Result<(), DiscoveryError> {
        self.update(|config| {
            config.dual_phy = enabled;
            Ok(())
        })
    }

    pub fn dual_phy(&self) -> bool {
        self.config.dual_phy
    }

    // ==================== Queries ====================

    pub fn state(&self) -> DiscoveryState {
        match self.phase {
            Phase::Idle => DiscoveryState::Idle,
            Phase::Forming(_) => DiscoveryState::Forming,
            Phase::ChoosingPanId => DiscoveryState::ChoosingPanId,
            Phase::AwaitingNetworkUp => DiscoveryState::AwaitingNetworkUp,
            Phase::Secondary(_) => DiscoveryState::SecondaryScan,
            Phase::Joining(_) => DiscoveryState::Joining,
            Phase::Offering(_) => DiscoveryState::Offering,
            Phase::JoinWindow { .. } => DiscoveryState::JoinWindow,
        }
    }

    /// True while a search or its session is active.
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle) || self.session.is_scanning()
    }

    /// Earliest time [`poll`](Self::poll) has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.phase {
            Phase::JoinWindow { window, .. } => window.deadline(),
            _ => self.session.resume_deadline(),
        }
    }

    pub fn session(&self) -> &ScanSession<R, B, G> {
        &self.session
    }

    pub fn radio_mut(&mut self) -> &mut R {
        self.session.radio_mut()
    }

    // ==================== Transitions ====================

    fn ensure_quiet(&self) -> Result<(), DiscoveryError> {
        if self.is_active() {
            warn!("policy change refused: search in progress");
            return Err(DiscoveryError::Busy);
        }
        Ok(())
    }

    fn update<F>(&mut self, change: F) -> Result<(), DiscoveryError>
    where
        F: FnOnce(&mut DiscoveryConfig) -> Result<(), DiscoveryConfigError>,
    {
        self.ensure_quiet()?;
        let mut config = self.config.clone();
        change(&mut config)?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn ensure_can_start(&self) -> Result<(), DiscoveryError> {
        if self.is_active() {
            warn!("request rejected: {:?} in progress", self.state());
            return Err(ScanError::AlreadyScanning.into());
        }
        Ok(())
    }

    fn start_form(&mut self) -> Result<Notifications, DiscoveryError> {
        self.ensure_can_start()?;
        let mut plan = PagePlan::new(self.config.form_pages());
        let first = plan
            .next_page()
            .ok_or(DiscoveryConfigError::InvalidConfig("no channels enabled"))?;
        info!("form request over {} page(s)", plan.pages.len());
        self.session.begin_energy_scan(first)?;
        self.phase = Phase::Forming(plan);
        Ok(Notifications::new())
    }

    fn start_join(&mut self) -> Result<Notifications, DiscoveryError> {
        self.ensure_can_start()?;
        let mut plan = PagePlan::new(self.config.search_pages());
        let first = plan
            .next_page()
            .ok_or(DiscoveryConfigError::InvalidConfig("no channels enabled"))?;
        info!(
            "join request over {} page(s), extended PAN ID {}",
            plan.pages.len(),
            self.config.extended_pan_id
        );
        self.session
            .begin_joinable_scan(first, self.config.extended_pan_id)?;
        self.phase = Phase::Joining(plan);
        Ok(Notifications::new())
    }

    fn on_joined(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        let plan = match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Offering(plan) => plan,
            other => {
                self.phase = other;
                return Err(ScanError::InvalidCall.into());
            }
        };
        if !self.session.can_continue_joinable_scan(now) {
            info!("join reported after the offer expired");
            self.stop();
            return Err(ScanError::InvalidCall.into());
        }
        self.session.pause_resume_timer();
        let mut window = Timer::new();
        window.arm(now, self.config.post_join_window);
        info!(
            "joined, confirming for {:?}",
            self.config.post_join_window
        );
        self.phase = Phase::JoinWindow { plan, window };
        Ok(Notifications::new())
    }

    fn on_left_network(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        let window_closed = match &self.phase {
            Phase::JoinWindow { window, .. } => window.expired(now),
            _ => return Err(ScanError::InvalidCall.into()),
        };
        if window_closed {
            // Too late to resume: the join already stands
            info!("left after the post-join window, search finished");
            self.stop();
            let mut out = Notifications::new();
            out.push(DiscoveryEvent::SearchFinished);
            return Ok(out);
        }
        info!("left joined network, resuming search");
        self.resume_join(now)
    }

    fn resume_join(&mut self, now: Instant) -> Result<Notifications, DiscoveryError> {
        let plan = match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Offering(plan) | Phase::JoinWindow { plan, .. } => plan,
            other => {
                self.phase = other;
                return Err(ScanError::InvalidCall.into());
            }
        };
        match self.session.next(now) {
            Ok(outcome) => {
                self.phase = Phase::Joining(plan);
                Ok(self.on_outcome(outcome, now))
            }
            Err(e) => {
                self.session.cleanup();
                Err(e.into())
            }
        }
    }

    fn on_network_up(&mut self) -> Result<Notifications, DiscoveryError> {
        if !matches!(self.phase, Phase::AwaitingNetworkUp) {
            return Err(ScanError::InvalidCall.into());
        }
        self.phase = Phase::Idle;
        let mut out = Notifications::new();
        if !self.config.dual_phy {
            info!("network up, form request finished");
            out.push(DiscoveryEvent::SearchFinished);
            return Ok(out);
        }

        let mut plan = PagePlan::new(self.config.secondary_pages());
        match plan.next_page() {
            Some(first) => match self.session.begin_energy_scan(first) {
                Ok(()) => {
                    info!("network up, choosing channel for second interface");
                    self.phase = Phase::Secondary(plan);
                }
                Err(e) => self.finish_with_error(e, &mut out),
            },
            None => self.finish_with_error(ScanError::NoViableCandidate, &mut out),
        }
        Ok(out)
    }

    fn on_poll(&mut self, now: Instant) -> Notifications {
        let mut out = Notifications::new();
        let window_closed =
            matches!(&self.phase, Phase::JoinWindow { window, .. } if window.expired(now));
        if window_closed {
            info!("post-join window closed, search finished");
            self.stop();
            out.push(DiscoveryEvent::SearchFinished);
        } else if matches!(self.phase, Phase::Offering(_))
            && self.session.poll(now) == SessionOutcome::Expired
        {
            // Nobody asked for the next network in time
            debug!("offered network abandoned");
            self.phase = Phase::Idle;
        }
        out
    }

    fn on_outcome(&mut self, outcome: SessionOutcome, now: Instant) -> Notifications {
        let mut out = Notifications::new();
        match outcome {
            SessionOutcome::NotHandled | SessionOutcome::Handled => {}
            SessionOutcome::EnergyPageScanned => self.energy_page_done(&mut out),
            SessionOutcome::UnusedPanId { pan_id, channel } => {
                self.phase = Phase::AwaitingNetworkUp;
                out.push(DiscoveryEvent::UnusedPanIdFound { pan_id, channel });
            }
            SessionOutcome::NetworkFound(record) => {
                if let Phase::Joining(plan) = mem::replace(&mut self.phase, Phase::Idle) {
                    self.phase = Phase::Offering(plan);
                }
                debug!(
                    "offering network {} on {}",
                    record.extended_pan_id(),
                    record.beacon.channel
                );
                out.push(DiscoveryEvent::NetworkFound(record));
            }
            SessionOutcome::Exhausted(ScanError::NoBeacons) => self.join_page_done(&mut out, now),
            SessionOutcome::Exhausted(error) | SessionOutcome::Failed(error) => {
                self.finish_with_error(error, &mut out)
            }
            SessionOutcome::Expired => self.phase = Phase::Idle,
        }
        out
    }

    fn energy_page_done(&mut self, out: &mut Notifications) {
        let (mut plan, secondary) = match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Forming(plan) => (plan, false),
            Phase::Secondary(plan) => (plan, true),
            other => {
                self.phase = other;
                return;
            }
        };

        if let Some(mask) = plan.next_page() {
            match self.session.continue_energy_scan(mask) {
                Ok(()) => self.phase = energy_phase(plan, secondary),
                Err(e) => self.finish_with_error(e, out),
            }
            return;
        }

        match self.session.select_channel() {
            Ok(channel) if secondary => {
                info!("second interface channel {}", channel);
                self.session.cleanup();
                out.push(DiscoveryEvent::SecondaryChannelSelected(channel));
                out.push(DiscoveryEvent::SearchFinished);
            }
            Ok(channel) => match self.session.begin_pan_id_scan(channel) {
                Ok(()) => self.phase = Phase::ChoosingPanId,
                Err(e) => self.finish_with_error(e, out),
            },
            Err(ScanError::NoViableCandidate) if !plan.fallback_used => {
                warn!("no viable channel, rescanning every channel");
                let pages = full_pages(&plan.pages);
                plan.fall_back(pages);
                match plan.next_page() {
                    Some(mask) => match self.session.restart_energy_scan(mask) {
                        Ok(()) => self.phase = energy_phase(plan, secondary),
                        Err(e) => self.finish_with_error(e, out),
                    },
                    None => self.finish_with_error(ScanError::NoViableCandidate, out),
                }
            }
            Err(e) => self.finish_with_error(e, out),
        }
    }

    fn join_page_done(&mut self, out: &mut Notifications, now: Instant) {
        let mut plan = match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Joining(plan) | Phase::Offering(plan) => plan,
            _ => {
                self.finish_with_error(ScanError::NoBeacons, out);
                return;
            }
        };

        loop {
            let mask = match plan.next_page() {
                Some(mask) => mask,
                None if self.config.scan_all_channels && !plan.fallback_used => {
                    info!("configured channels exhausted, trying the rest");
                    plan.fall_back(self.config.unscanned_pages());
                    continue;
                }
                None => {
                    self.finish_with_error(ScanError::NoBeacons, out);
                    return;
                }
            };
            match self
                .session
                .begin_joinable_scan(mask, self.config.extended_pan_id)
            {
                Ok(()) => {
                    debug!("joinable scan moves on to {} at {:?}", mask, now);
                    self.phase = Phase::Joining(plan);
                    return;
                }
                Err(ScanError::NoBeacons) => continue,
                Err(e) => {
                    self.finish_with_error(e, out);
                    return;
                }
            }
        }
    }

    fn finish_with_error(&mut self, error: ScanError, out: &mut Notifications) {
        warn!("search failed: {} (0x{:02X})", error, error.status_code());
        self.stop();
        out.push(DiscoveryEvent::ScanError(error));
    }

    fn stop(&mut self) {
        self.session.cleanup();
        self.phase = Phase::Idle;
    }
}

fn energy_phase(plan: PagePlan, secondary: bool) -> Phase {
    if secondary {
        Phase::Secondary(plan)
    } else {
        Phase::Forming(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StaticBufferPool;
    use crate::channel::PageChannel;
    use crate::radio::{RecordingRadio, ScanKind, ScanStatus};
    use crate::rng::ScanRng;
    use crate::testing::{ch, make_beacon, mask};
    use std::time::Duration;

    type TestOrchestrator = Orchestrator<RecordingRadio, StaticBufferPool, ScanRng>;

    fn orchestrator(config: DiscoveryConfig) -> TestOrchestrator {
        orchestrator_with(config, StaticBufferPool::default())
    }

    fn orchestrator_with(config: DiscoveryConfig, pool: StaticBufferPool) -> TestOrchestrator {
        Orchestrator::new(config, RecordingRadio::new(2), pool, ScanRng::new(11)).unwrap()
    }

    fn primary(channels: &[u8]) -> DiscoveryConfig {
        DiscoveryConfig {
            primary_mask: mask(channels),
            ..Default::default()
        }
    }

    fn with_subghz(mut config: DiscoveryConfig, page: u8, channels: u32) -> DiscoveryConfig {
        config.search_mode = SearchMode::BOTH;
        config
            .subghz_masks
            .push(ChannelMask::new(page, channels).unwrap())
            .unwrap();
        config
    }

    fn complete_on(channel: PageChannel) -> RadioEvent {
        RadioEvent::ScanComplete {
            channel,
            status: ScanStatus::Success,
        }
    }

    fn complete(channel: u8) -> RadioEvent {
        complete_on(ch(channel))
    }

    fn energy_on(channel: PageChannel, energy: i8) -> RadioEvent {
        RadioEvent::EnergyScanResult { channel, energy }
    }

    fn found(id: u8, channel: u8) -> RadioEvent {
        RadioEvent::NetworkFound {
            beacon: make_beacon(id, 0x1000 + id as u16, channel),
            lqi: 180,
            rssi: -60,
        }
    }

    fn feed(o: &mut TestOrchestrator, event: RadioEvent, now: Instant) -> Vec<DiscoveryEvent> {
        o.handle_radio(event, now).unwrap().iter().copied().collect()
    }

    fn last_request(o: &TestOrchestrator) -> crate::radio::ScanRequest {
        *o.session().radio().last_request().unwrap()
    }

    fn offered_id(events: &[DiscoveryEvent]) -> u8 {
        match events {
            [DiscoveryEvent::NetworkFound(record)] => record.extended_pan_id().bytes()[0],
            other => panic!("expected one network, got {:?}", other),
        }
    }

    // ==================== Form ====================

    #[test]
    fn test_form_single_page() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11, 15, 20]));
        assert!(o.find_unused_pan_id_and_form(now).unwrap().is_empty());
        assert_eq!(o.state(), DiscoveryState::Forming);
        assert_eq!(last_request(&o).kind, ScanKind::Energy);
        assert_eq!(last_request(&o).mask, mask(&[11, 15, 20]));

        feed(&mut o, energy_on(ch(11), -20), now);
        feed(&mut o, energy_on(ch(15), -90), now);
        feed(&mut o, energy_on(ch(20), -30), now);
        assert!(feed(&mut o, complete(20), now).is_empty());

        assert_eq!(o.state(), DiscoveryState::ChoosingPanId);
        assert_eq!(last_request(&o).kind, ScanKind::Active);
        assert_eq!(last_request(&o).mask, ch(15).mask());

        let events = feed(&mut o, complete(15), now);
        assert!(matches!(
            events.as_slice(),
            [DiscoveryEvent::UnusedPanIdFound { channel, .. }] if *channel == ch(15)
        ));
        assert_eq!(o.state(), DiscoveryState::AwaitingNetworkUp);

        let done = o.network_up(now).unwrap();
        assert_eq!(done.as_slice(), &[DiscoveryEvent::SearchFinished]);
        assert!(!o.is_active());
    }

    #[test]
    fn test_form_holds_until_network_up_reported() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[15]));
        let _ = o.find_unused_pan_id_and_form(now).unwrap();
        feed(&mut o, energy_on(ch(15), -90), now);
        let _ = feed(&mut o, complete(15), now);
        let _ = feed(&mut o, complete(15), now);
        assert_eq!(o.state(), DiscoveryState::AwaitingNetworkUp);

        assert_eq!(
            o.find_joinable_network(now),
            Err(DiscoveryError::Scan(ScanError::AlreadyScanning))
        );
        assert_eq!(o.set_scan_all_channels(true), Err(DiscoveryError::Busy));

        let _ = o.network_up(now).unwrap();
        assert!(o.set_scan_all_channels(true).is_ok());
    }

    #[test]
    fn test_form_walks_pages_into_one_reservoir() {
        let now = Instant::now();
        let mut o = orchestrator(with_subghz(primary(&[11]), 28, 0b110));
        let quiet = PageChannel::new(28, 1).unwrap();

        let _ = o.find_unused_pan_id_and_form(now).unwrap();
        feed(&mut o, energy_on(ch(11), -40), now);
        assert!(feed(&mut o, complete(11), now).is_empty());

        // Second page scanned without resetting the readings
        assert_eq!(o.state(), DiscoveryState::Forming);
        assert_eq!(last_request(&o).kind, ScanKind::Energy);
        assert_eq!(last_request(&o).mask.page(), 28);

        feed(&mut o, energy_on(quiet, -90), now);
        feed(&mut o, complete_on(quiet), now);

        assert_eq!(o.state(), DiscoveryState::ChoosingPanId);
        let request = last_request(&o);
        assert_eq!(request.mask, quiet.mask());
        assert_eq!(request.duration, 5);
    }

    #[test]
    fn test_form_fallback_fires_once() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_unused_pan_id_and_form(now).unwrap();

        assert!(feed(&mut o, complete(11), now).is_empty());
        assert_eq!(last_request(&o).kind, ScanKind::Energy);
        assert_eq!(last_request(&o).mask, ChannelMask::ALL_2_4_GHZ);

        let events = feed(&mut o, complete(26), now);
        assert_eq!(
            events,
            vec![DiscoveryEvent::ScanError(ScanError::NoViableCandidate)]
        );
        assert_eq!(o.session().radio().requests().len(), 2);
        assert!(!o.is_active());
    }

    #[test]
    fn test_form_fallback_can_succeed() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_unused_pan_id_and_form(now).unwrap();
        let _ = feed(&mut o, complete(11), now);

        feed(&mut o, energy_on(ch(24), -75), now);
        let _ = feed(&mut o, complete(26), now);
        assert_eq!(o.state(), DiscoveryState::ChoosingPanId);
        assert_eq!(last_request(&o).mask, ch(24).mask());
    }

    #[test]
    fn test_dual_phy_picks_secondary_channel_after_network_up() {
        let now = Instant::now();
        let config = DiscoveryConfig {
            dual_phy: true,
            ..with_subghz(primary(&[20]), 28, 0b11)
        };
        let mut o = orchestrator(config);
        let secondary = PageChannel::new(28, 1).unwrap();

        let _ = o.find_unused_pan_id_and_form(now).unwrap();
        assert_eq!(last_request(&o).mask.page(), 0);
        feed(&mut o, energy_on(ch(20), -80), now);
        let _ = feed(&mut o, complete(20), now);
        // Primary forms on 2.4 GHz alone
        assert_eq!(o.state(), DiscoveryState::ChoosingPanId);

        let events = feed(&mut o, complete(20), now);
        assert!(matches!(
            events.as_slice(),
            [DiscoveryEvent::UnusedPanIdFound { .. }]
        ));

        assert!(o.network_up(now).unwrap().is_empty());
        assert_eq!(o.state(), DiscoveryState::SecondaryScan);
        assert_eq!(last_request(&o).kind, ScanKind::Energy);
        assert_eq!(last_request(&o).mask.page(), 28);

        feed(&mut o, energy_on(secondary, -85), now);
        let events = feed(&mut o, complete_on(secondary), now);
        assert_eq!(
            events,
            vec![
                DiscoveryEvent::SecondaryChannelSelected(secondary),
                DiscoveryEvent::SearchFinished
            ]
        );
        assert!(!o.is_active());
    }

    #[test]
    fn test_radio_failure_during_form() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_unused_pan_id_and_form(now).unwrap();
        let failure = RadioEvent::ScanComplete {
            channel: ch(11),
            status: ScanStatus::Failed(0x39),
        };
        assert_eq!(
            feed(&mut o, failure, now),
            vec![DiscoveryEvent::ScanError(ScanError::Radio(
                ScanStatus::Failed(0x39)
            ))]
        );
        assert_eq!(o.state(), DiscoveryState::Idle);
    }

    // ==================== Join ====================

    #[test]
    fn test_join_offers_networks_until_exhausted() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11, 15]));
        assert!(o.find_joinable_network(now).unwrap().is_empty());
        assert_eq!(last_request(&o).mask, ch(11).mask());

        feed(&mut o, found(1, 11), now);
        assert_eq!(offered_id(&feed(&mut o, complete(11), now)), 1);
        assert_eq!(o.state(), DiscoveryState::Offering);

        // Cache empty: the next channel is scanned
        assert!(o.join_failed(now).unwrap().is_empty());
        assert_eq!(o.state(), DiscoveryState::Joining);
        assert_eq!(last_request(&o).mask, ch(15).mask());

        feed(&mut o, found(2, 15), now);
        assert_eq!(offered_id(&feed(&mut o, complete(15), now)), 2);

        let events = o.continue_search(now).unwrap();
        assert_eq!(
            events.as_slice(),
            &[DiscoveryEvent::ScanError(ScanError::NoBeacons)]
        );
        assert!(!o.is_active());
        assert!(!o.session().buffers().in_use());
    }

    #[test]
    fn test_join_walks_subghz_page_after_2_4() {
        let now = Instant::now();
        let mut o = orchestrator(with_subghz(primary(&[11]), 28, 1 << 3));
        let _ = o.find_joinable_network(now).unwrap();
        assert!(feed(&mut o, complete(11), now).is_empty());

        let request = last_request(&o);
        assert_eq!(request.mask, PageChannel::new(28, 3).unwrap().mask());
        assert_eq!(request.duration, 5);
        assert_eq!(o.state(), DiscoveryState::Joining);
    }

    #[test]
    fn test_join_scan_all_fallback_fires_once() {
        let now = Instant::now();
        let config = DiscoveryConfig {
            scan_all_channels: true,
            ..primary(&[11])
        };
        let mut o = orchestrator(config);
        let _ = o.find_joinable_network(now).unwrap();

        assert!(feed(&mut o, complete(11), now).is_empty());
        assert_eq!(last_request(&o).mask, ch(12).mask());

        for channel in 12..26 {
            assert!(feed(&mut o, complete(channel), now).is_empty());
        }
        let events = feed(&mut o, complete(26), now);
        assert_eq!(events, vec![DiscoveryEvent::ScanError(ScanError::NoBeacons)]);

        let requests = o.session().radio().requests();
        assert_eq!(requests.len(), 16);
        assert_eq!(
            requests.iter().filter(|r| r.mask == ch(11).mask()).count(),
            1,
            "channel 11 scanned twice"
        );
    }

    #[test]
    fn test_join_without_scan_all_stops_after_configured_mask() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_joinable_network(now).unwrap();
        let events = feed(&mut o, complete(11), now);
        assert_eq!(events, vec![DiscoveryEvent::ScanError(ScanError::NoBeacons)]);
        assert_eq!(o.session().radio().requests().len(), 1);
    }

    #[test]
    fn test_post_join_window_leave_resumes_iterator() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_joinable_network(now).unwrap();
        feed(&mut o, found(1, 11), now);
        feed(&mut o, found(2, 11), now);
        assert_eq!(offered_id(&feed(&mut o, complete(11), now)), 2);

        assert!(o.joined(now).unwrap().is_empty());
        assert_eq!(o.state(), DiscoveryState::JoinWindow);

        // The resumption timeout is paused during the window
        let t45 = now + Duration::from_secs(45);
        assert!(o.poll(t45).unwrap().is_empty());
        assert_eq!(o.state(), DiscoveryState::JoinWindow);

        let events = o.left_network(t45).unwrap();
        assert_eq!(offered_id(events.as_slice()), 1);
        assert_eq!(o.state(), DiscoveryState::Offering);
    }

    #[test]
    fn test_post_join_window_expiry_finishes() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_joinable_network(now).unwrap();
        feed(&mut o, found(1, 11), now);
        feed(&mut o, found(2, 11), now);
        let _ = feed(&mut o, complete(11), now);
        let _ = o.joined(now).unwrap();

        assert_eq!(o.next_deadline(), Some(now + Duration::from_secs(60)));
        assert!(o.poll(now + Duration::from_secs(59)).unwrap().is_empty());
        let events = o.poll(now + Duration::from_secs(60)).unwrap();
        assert_eq!(events.as_slice(), &[DiscoveryEvent::SearchFinished]);
        assert!(!o.is_active());
        assert!(!o.session().buffers().in_use());

        assert_eq!(
            o.left_network(now + Duration::from_secs(61)),
            Err(DiscoveryError::Scan(ScanError::InvalidCall))
        );
    }

    #[test]
    fn test_leave_after_window_closed_finishes_without_rescan() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11, 15]));
        let _ = o.find_joinable_network(now).unwrap();
        feed(&mut o, found(1, 11), now);
        feed(&mut o, found(2, 11), now);
        let _ = feed(&mut o, complete(11), now);
        let _ = o.joined(now).unwrap();

        // No poll in between: the window closed while nobody looked
        let events = o.left_network(now + Duration::from_secs(600)).unwrap();
        assert_eq!(events.as_slice(), &[DiscoveryEvent::SearchFinished]);
        assert_eq!(o.state(), DiscoveryState::Idle);
        assert_eq!(o.session().radio().requests().len(), 1);
        assert!(!o.session().buffers().in_use());
    }

    #[test]
    fn test_joined_after_offer_expired_is_refused() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11, 15]));
        let _ = o.find_joinable_network(now).unwrap();
        feed(&mut o, found(1, 11), now);
        let _ = feed(&mut o, complete(11), now);
        assert_eq!(o.state(), DiscoveryState::Offering);

        assert_eq!(
            o.joined(now + Duration::from_secs(600)),
            Err(DiscoveryError::Scan(ScanError::InvalidCall))
        );
        assert_eq!(o.state(), DiscoveryState::Idle);
        assert!(!o.is_active());
        assert!(!o.session().buffers().in_use());
    }

    #[test]
    fn test_joined_just_before_offer_expires() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_joinable_network(now).unwrap();
        feed(&mut o, found(1, 11), now);
        let _ = feed(&mut o, complete(11), now);

        assert!(o.joined(now + Duration::from_secs(29)).unwrap().is_empty());
        assert_eq!(o.state(), DiscoveryState::JoinWindow);
    }

    #[test]
    fn test_offer_abandoned_after_resume_timeout() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_joinable_network(now).unwrap();
        feed(&mut o, found(1, 11), now);
        let _ = feed(&mut o, complete(11), now);

        let late = now + Duration::from_secs(31);
        assert_eq!(
            o.continue_search(late),
            Err(DiscoveryError::Scan(ScanError::InvalidCall))
        );
        assert!(!o.is_active());
        assert!(!o.session().buffers().in_use());
    }

    #[test]
    fn test_poll_discards_abandoned_offer_silently() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_joinable_network(now).unwrap();
        feed(&mut o, found(1, 11), now);
        let _ = feed(&mut o, complete(11), now);

        assert!(o.poll(now + Duration::from_secs(30)).unwrap().is_empty());
        assert_eq!(o.state(), DiscoveryState::Idle);
        assert!(!o.session().buffers().in_use());
    }

    #[test]
    fn test_no_buffers_rejects_join_before_scanning() {
        let now = Instant::now();
        let mut o = orchestrator_with(primary(&[11]), StaticBufferPool::exhausted());
        assert_eq!(
            o.find_joinable_network(now),
            Err(DiscoveryError::Scan(ScanError::NoBuffers))
        );
        assert!(o.session().radio().requests().is_empty());
        assert!(!o.is_active());
    }

    // ==================== Policy ====================

    #[test]
    fn test_second_request_rejected_while_active() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11, 15]));
        let _ = o.find_joinable_network(now).unwrap();
        assert_eq!(
            o.find_unused_pan_id_and_form(now),
            Err(DiscoveryError::Scan(ScanError::AlreadyScanning))
        );
        assert_eq!(o.state(), DiscoveryState::Joining);
        assert_eq!(o.session().radio().requests().len(), 1);
    }

    #[test]
    fn test_policy_refused_while_active() {
        let now = Instant::now();
        let mut o = orchestrator(primary(&[11]));
        let _ = o.find_joinable_network(now).unwrap();

        assert_eq!(o.set_scan_all_channels(true), Err(DiscoveryError::Busy));
        assert_eq!(o.set_channel_mask(mask(&[12])), Err(DiscoveryError::Busy));
        assert_eq!(o.set_search_mode(0x03), Err(DiscoveryError::Busy));
        assert!(!o.scan_all_channels());

        assert!(o.abort(now).unwrap().is_empty());
        assert!(!o.session().buffers().in_use());
        assert!(o.set_scan_all_channels(true).is_ok());
        assert!(o.scan_all_channels());
    }

    #[test]
    fn test_policy_setters_validate() {
        let mut o = orchestrator(DiscoveryConfig::default());
        assert!(matches!(
            o.set_search_mode(0),
            Err(DiscoveryError::Config(DiscoveryConfigError::Channel(_)))
        ));
        // No sub-GHz mask yet
        assert!(o.set_dual_phy(true).is_err());
        assert!(o.set_search_mode(0x02).is_err());

        let page_28 = ChannelMask::new(28, 0b111).unwrap();
        o.set_channel_mask(page_28).unwrap();
        assert_eq!(o.channel_mask(28), Some(page_28));
        o.set_search_mode(0x03).unwrap();
        assert_eq!(o.search_mode(), SearchMode::BOTH);
        o.set_dual_phy(true).unwrap();
        assert!(o.dual_phy());

        let id = ExtendedPanId::new([1, 2, 3, 4, 5, 6, 7, 8]);
        o.set_extended_pan_id(id).unwrap();
        assert_eq!(o.extended_pan_id(), id);
    }

    #[test]
    fn test_inputs_outside_their_state() {
        let now = Instant::now();
        let mut o = orchestrator(DiscoveryConfig::default());
        for input in [
            Input::ContinueSearch,
            Input::JoinFailed,
            Input::Joined,
            Input::LeftNetwork,
            Input::NetworkUp,
        ] {
            assert_eq!(
                o.step(input, now),
                Err(DiscoveryError::Scan(ScanError::InvalidCall)),
                "{:?}",
                input
            );
        }
        assert!(o.step(Input::Poll, now).unwrap().is_empty());
        assert!(o.step(Input::Abort, now).unwrap().is_empty());
    }
}
