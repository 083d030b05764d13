//! Scan session state machine.
//!
//! A session owns one scan from start to cleanup. It starts radio scans,
//! routes driver events to the handler of its current state, and reports
//! what happened as a [`SessionOutcome`].
//!
//! # States
//!
//! ```text
//! Idle ──begin_energy_scan──▶ EnergyScan ──begin_pan_id_scan──▶ PanIdScan ──▶ Idle
//!   │
//!   └──begin_joinable_scan──▶ JoinableScan ◀──next (cache empty)──┐
//!                                  │                              │
//!                           ScanComplete ──▶ NextNetwork ─────────┘
//! ```
//!
//! Joinable scans cover one channel per active scan. After each channel the
//! cached networks are handed out one at a time (most recent first); once the
//! cache is empty the scan resumes at the next channel above the cursor.
//! Every delivered network arms the resumption timer; when it expires the
//! session is torn down and `next` fails with [`ScanError::InvalidCall`].
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use wpan_form_join::buffer::StaticBufferPool;
//! use wpan_form_join::channel::PageChannel;
//! use wpan_form_join::radio::{RadioEvent, RecordingRadio, ScanStatus};
//! use wpan_form_join::rng::ScanRng;
//! use wpan_form_join::session::{ScanSession, SessionConfig, SessionOutcome};
//!
//! let mut session = ScanSession::new(
//!     SessionConfig::default(),
//!     RecordingRadio::new(2),
//!     StaticBufferPool::default(),
//!     ScanRng::new(1),
//! )
//! .unwrap();
//!
//! let now = Instant::now();
//! let ch15 = PageChannel::new(0, 15).unwrap();
//! session.begin_energy_scan(ch15.mask()).unwrap();
//! let _ = session.handle(RadioEvent::EnergyScanResult { channel: ch15, energy: -80 }, now);
//! let outcome = session.handle(
//!     RadioEvent::ScanComplete { channel: ch15, status: ScanStatus::Success },
//!     now,
//! );
//! assert_eq!(outcome, SessionOutcome::EnergyPageScanned);
//! assert_eq!(session.select_channel().unwrap(), ch15);
//! ```

use super::{ScanError, ScanStats, SessionConfig, SessionConfigError, Timer};
use crate::buffer::{BufferHandle, BufferProvider};
use crate::channel::{CandidateReservoir, ChannelMask, PageChannel, PAGE_2_4_GHZ};
use crate::joinable::{ConsiderResult, ExtendedPanId, JoinFilter, JoinableCache, NetworkRecord};
use crate::pan_id::{PanIdTrialSet, INVALID_PAN_ID};
use crate::radio::{Radio, RadioEvent, ScanKind, ScanStatus};
use log::{debug, info, warn};
use rand_core::RngCore;
use std::time::Instant;

/// Session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    Idle,
    /// Collecting energy readings.
    EnergyScan,
    /// Active scan checking PAN ID candidates for collisions.
    PanIdScan,
    /// Active scan collecting joinable networks on one channel.
    JoinableScan,
    /// Handing out cached networks; resumable until the timer expires.
    NextNetwork,
}

/// What handling an event or request produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "session outcomes carry results and terminal errors"]
pub enum SessionOutcome {
    /// The event does not belong to the current state.
    NotHandled,
    /// Consumed with nothing to report.
    Handled,
    /// The energy scan over the requested mask finished.
    EnergyPageScanned,
    /// A collision-free PAN ID was found. The session has ended.
    UnusedPanId { pan_id: u16, channel: PageChannel },
    /// Next joinable network, resumable until the timer expires.
    NetworkFound(NetworkRecord),
    /// Nothing left to try. The session has ended.
    Exhausted(ScanError),
    /// The radio failed the scan. The session has ended.
    Failed(ScanError),
    /// The resumption timer fired. The session has ended.
    Expired,
}

#[derive(Debug, Clone)]
struct PanIdSearch {
    channel: PageChannel,
    trials: PanIdTrialSet,
}

/// The scan session, owning its radio, buffer provider and PRNG.
pub struct ScanSession<R, B, G> {
    radio: R,
    buffers: B,
    rng: G,
    config: SessionConfig,
    state: SessionState,
    scan_in_flight: bool,
    reservoir: CandidateReservoir,
    pan_id: Option<PanIdSearch>,
    cache: JoinableCache,
    buffer: Option<BufferHandle>,
    filter: JoinFilter,
    join_mask: ChannelMask,
    cursor: u8,
    timer: Timer,
    stats: ScanStats,
}

impl<R: Radio, B: BufferProvider, G: RngCore> ScanSession<R, B, G> {
    /// Create an idle session.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: SessionConfig,
        radio: R,
        buffers: B,
        rng: G,
    ) -> Result<Self, SessionConfigError> {
        let (reservoir, cache) = Self::storage_for(&config)?;
        let filter = JoinFilter::new(radio.stack_profile(), ExtendedPanId::WILDCARD);
        Ok(Self {
            radio,
            buffers,
            rng,
            config,
            state: SessionState::Idle,
            scan_in_flight: false,
            reservoir,
            pan_id: None,
            cache,
            buffer: None,
            filter,
            join_mask: ChannelMask::default(),
            cursor: 0,
            timer: Timer::new(),
            stats: ScanStats::default(),
        })
    }

    fn storage_for(
        config: &SessionConfig,
    ) -> Result<(CandidateReservoir, JoinableCache), SessionConfigError> {
        config.validate()?;
        let reservoir = CandidateReservoir::new(config.candidate_slots())
            .map_err(|_| SessionConfigError::InvalidConfig("invalid candidate buffer"))?;
        let cache = JoinableCache::new(config.cache_config())
            .map_err(|_| SessionConfigError::InvalidConfig("invalid cache buffer"))?;
        Ok((reservoir, cache))
    }

    /// Replace the configuration. Only allowed while idle.
    pub fn set_config(&mut self, config: SessionConfig) -> Result<(), SessionConfigError> {
        if self.state != SessionState::Idle {
            return Err(SessionConfigError::InvalidConfig(
                "cannot reconfigure an active session",
            ));
        }
        let (reservoir, cache) = Self::storage_for(&config)?;
        self.reservoir = reservoir;
        self.cache = cache;
        self.config = config;
        Ok(())
    }

    // ==================== Starting scans ====================

    /// Start an energy scan over `mask` with a fresh reservoir.
    pub fn begin_energy_scan(&mut self, mask: ChannelMask) -> Result<(), ScanError> {
        self.ensure_idle()?;
        self.stats = ScanStats::default();
        self.reservoir.reset();
        self.state = SessionState::EnergyScan;
        info!("energy scan on {}", mask);
        self.start_energy(mask)
    }

    /// Scan another mask (usually the next page) into the same reservoir.
    pub fn continue_energy_scan(&mut self, mask: ChannelMask) -> Result<(), ScanError> {
        self.ensure_settled_energy()?;
        debug!("energy scan continues on {}", mask);
        self.start_energy(mask)
    }

    /// Discard every reading and scan `mask` again.
    pub fn restart_energy_scan(&mut self, mask: ChannelMask) -> Result<(), ScanError> {
        self.ensure_settled_energy()?;
        self.reservoir.reset();
        info!("energy scan restarted on {}", mask);
        self.start_energy(mask)
    }

    /// Pick a quiet channel from the readings collected so far.
    ///
    /// The session stays in the energy scan state either way, so the caller
    /// can restart the scan or move on to the PAN ID search.
    pub fn select_channel(&mut self) -> Result<PageChannel, ScanError> {
        self.ensure_settled_energy()?;
        let candidate = self
            .reservoir
            .select(&mut self.rng)
            .map_err(|_| ScanError::NoViableCandidate)?;
        let channel = candidate.channel().ok_or(ScanError::NoViableCandidate)?;
        info!("selected {} (energy {})", channel, candidate.energy());
        Ok(channel)
    }

    /// Look for a PAN ID no nearby network uses on `channel`.
    ///
    /// Allowed from idle or from a finished energy scan.
    pub fn begin_pan_id_scan(&mut self, channel: PageChannel) -> Result<(), ScanError> {
        match self.state {
            SessionState::Idle => self.stats = ScanStats::default(),
            SessionState::EnergyScan if !self.scan_in_flight => {}
            _ => return self.reject_start(),
        }
        self.stats.pan_id_attempts = 0;
        self.state = SessionState::PanIdScan;
        self.start_pan_id_attempt(channel)
    }

    /// Start a resumable search for joinable networks over `mask`.
    ///
    /// Networks must advertise the radio's stack profile and permit joining;
    /// a non-wildcard `extended_pan_id` narrows the search to that network.
    pub fn begin_joinable_scan(
        &mut self,
        mask: ChannelMask,
        extended_pan_id: ExtendedPanId,
    ) -> Result<(), ScanError> {
        self.ensure_idle()?;
        let handle = self
            .buffers
            .acquire(self.cache.config().buffer_bytes())
            .ok_or_else(|| {
                warn!("no buffer for the joinable cache");
                ScanError::NoBuffers
            })?;

        self.buffer = Some(handle);
        self.stats = ScanStats::default();
        self.cache.clear();
        self.filter = JoinFilter::new(self.radio.stack_profile(), extended_pan_id);
        self.join_mask = mask;
        self.cursor = 0;
        self.timer.cancel();
        self.state = SessionState::JoinableScan;
        info!("joinable scan on {}", mask);

        match self.scan_next_channel() {
            Some(result) => result,
            None => {
                self.cleanup();
                Err(ScanError::NoBeacons)
            }
        }
    }

    // ==================== Resumable iteration ====================

    /// Hand out the next cached network, or resume scanning when none is left.
    ///
    /// # Errors
    ///
    /// [`ScanError::InvalidCall`] if no joinable session is waiting or its
    /// resumption window has passed (the session is then torn down).
    pub fn next(&mut self, now: Instant) -> Result<SessionOutcome, ScanError> {
        if self.state != SessionState::NextNetwork {
            return Err(ScanError::InvalidCall);
        }
        if self.timer.expired(now) {
            info!("resumable joinable scan expired");
            self.cleanup();
            return Err(ScanError::InvalidCall);
        }
        Ok(self.deliver_next(now))
    }

    /// True while `next` would be accepted.
    pub fn can_continue_joinable_scan(&self, now: Instant) -> bool {
        self.state == SessionState::NextNetwork && !self.timer.expired(now)
    }

    /// Stop the resumption timer, keeping the iterator alive.
    pub fn pause_resume_timer(&mut self) {
        if self.state == SessionState::NextNetwork {
            self.timer.cancel();
        }
    }

    /// Restart the resumption timer from `now`.
    pub fn resume_resume_timer(&mut self, now: Instant) {
        if self.state == SessionState::NextNetwork {
            self.timer.arm(now, self.config.resume_timeout);
        }
    }

    /// Check the resumption timer.
    pub fn poll(&mut self, now: Instant) -> SessionOutcome {
        if self.timer.expired(now) {
            info!("resumable joinable scan expired");
            self.cleanup();
            SessionOutcome::Expired
        } else {
            SessionOutcome::NotHandled
        }
    }

    // ==================== Driver events ====================

    /// Route a radio event to the current state.
    pub fn handle(&mut self, event: RadioEvent, now: Instant) -> SessionOutcome {
        match (self.state, event) {
            (SessionState::EnergyScan, RadioEvent::EnergyScanResult { channel, energy })
                if self.scan_in_flight =>
            {
                self.stats.energy_samples += 1;
                if self.reservoir.observe(channel, energy) {
                    debug!("{} energy {} kept as candidate", channel, energy);
                }
                SessionOutcome::Handled
            }
            (SessionState::EnergyScan, RadioEvent::ScanComplete { status, .. })
                if self.scan_in_flight =>
            {
                match self.complete(status) {
                    Some(outcome) => outcome,
                    None => SessionOutcome::EnergyPageScanned,
                }
            }
            (SessionState::PanIdScan, RadioEvent::NetworkFound { beacon, .. }) => {
                self.stats.beacons_seen += 1;
                if let Some(search) = self.pan_id.as_mut() {
                    if search.trials.observe(beacon.pan_id) > 0 {
                        debug!("PAN ID 0x{:04X} in use on {}", beacon.pan_id, beacon.channel);
                    }
                }
                SessionOutcome::Handled
            }
            (SessionState::PanIdScan, RadioEvent::UnusedPanIdFound { pan_id, channel }) => {
                if pan_id == INVALID_PAN_ID {
                    return SessionOutcome::Handled;
                }
                info!("driver found unused PAN ID 0x{:04X} on {}", pan_id, channel);
                self.cleanup();
                SessionOutcome::UnusedPanId { pan_id, channel }
            }
            (SessionState::PanIdScan, RadioEvent::ScanComplete { status, .. }) => {
                match self.complete(status) {
                    Some(outcome) => outcome,
                    None => self.pan_id_scan_complete(),
                }
            }
            (SessionState::JoinableScan, RadioEvent::NetworkFound { beacon, lqi, rssi }) => {
                self.consider(NetworkRecord::new(beacon, lqi, rssi));
                SessionOutcome::Handled
            }
            (SessionState::JoinableScan, RadioEvent::ScanComplete { channel, status }) => {
                if let Some(outcome) = self.complete(status) {
                    return outcome;
                }
                debug!(
                    "joinable scan of {} complete, {} cached",
                    channel,
                    self.cache.len()
                );
                self.state = SessionState::NextNetwork;
                self.deliver_next(now)
            }
            _ => SessionOutcome::NotHandled,
        }
    }

    // ==================== Teardown ====================

    /// End the session: release the cache buffer, cancel the timer, go idle.
    ///
    /// Safe to call at any time, any number of times.
    pub fn cleanup(&mut self) {
        if let Some(handle) = self.buffer.take() {
            self.buffers.release(handle);
        }
        self.cache.clear();
        self.timer.cancel();
        self.pan_id = None;
        self.scan_in_flight = false;
        if self.state != SessionState::Idle {
            debug!("{:?} session ended ({})", self.state, self.stats);
            self.state = SessionState::Idle;
        }
    }

    // ==================== Queries ====================

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while any session is active.
    pub fn is_scanning(&self) -> bool {
        self.state != SessionState::Idle
    }

    /// True while a scan request is outstanding at the radio.
    pub fn is_scan_in_flight(&self) -> bool {
        self.scan_in_flight
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Networks cached and not yet handed out.
    pub fn cached_networks(&self) -> impl Iterator<Item = &NetworkRecord> {
        self.cache.iter()
    }

    /// Lowest channel number the joinable scan has not covered yet.
    pub fn cursor(&self) -> u8 {
        self.cursor
    }

    /// Mask of the current (or last) joinable scan.
    pub fn join_mask(&self) -> ChannelMask {
        self.join_mask
    }

    /// Deadline of the resumption timer, if armed.
    pub fn resume_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn buffers(&self) -> &B {
        &self.buffers
    }

    // ==================== Internals ====================

    fn ensure_idle(&self) -> Result<(), ScanError> {
        if self.state == SessionState::Idle {
            Ok(())
        } else {
            self.reject_start()
        }
    }

    fn reject_start(&self) -> Result<(), ScanError> {
        warn!("scan request rejected: {:?} session active", self.state);
        Err(ScanError::AlreadyScanning)
    }

    fn ensure_settled_energy(&self) -> Result<(), ScanError> {
        if self.state == SessionState::EnergyScan && !self.scan_in_flight {
            Ok(())
        } else {
            Err(ScanError::InvalidCall)
        }
    }

    fn start_energy(&mut self, mask: ChannelMask) -> Result<(), ScanError> {
        let duration = self.config.energy_scan_duration;
        self.start_scan(ScanKind::Energy, mask, duration)
    }

    fn start_active(&mut self, mask: ChannelMask) -> Result<(), ScanError> {
        let duration = if mask.page() == PAGE_2_4_GHZ {
            self.config.active_scan_duration
        } else {
            self.config.subghz_active_scan_duration
        };
        self.start_scan(ScanKind::Active, mask, duration)
    }

    fn start_scan(
        &mut self,
        kind: ScanKind,
        mask: ChannelMask,
        duration: u8,
    ) -> Result<(), ScanError> {
        match self.radio.start_scan(kind, mask, duration) {
            Ok(()) => {
                self.scan_in_flight = true;
                self.stats.channels_scanned += mask.count();
                Ok(())
            }
            Err(status) => {
                warn!("radio refused {} scan on {}: {}", kind, mask, status);
                self.cleanup();
                Err(ScanError::Radio(status))
            }
        }
    }

    /// Classify a completion status. `None` means the scan finished cleanly.
    fn complete(&mut self, status: ScanStatus) -> Option<SessionOutcome> {
        match status {
            ScanStatus::Success => {
                self.scan_in_flight = false;
                None
            }
            ScanStatus::MacTransmitFailure => {
                debug!("beacon request not sent on one channel, scan continues");
                Some(SessionOutcome::Handled)
            }
            failure => {
                warn!("{:?} scan failed: {}", self.state, failure);
                self.cleanup();
                Some(SessionOutcome::Failed(ScanError::Radio(failure)))
            }
        }
    }

    fn start_pan_id_attempt(&mut self, channel: PageChannel) -> Result<(), ScanError> {
        self.stats.pan_id_attempts += 1;
        debug!(
            "PAN ID attempt {} on {}",
            self.stats.pan_id_attempts, channel
        );
        self.pan_id = Some(PanIdSearch {
            channel,
            trials: PanIdTrialSet::generate(&mut self.rng),
        });
        self.start_active(channel.mask())
    }

    fn pan_id_scan_complete(&mut self) -> SessionOutcome {
        let (channel, pan_id) = match self.pan_id.as_ref() {
            Some(search) => (search.channel, search.trials.first_live()),
            None => return SessionOutcome::NotHandled,
        };
        match pan_id {
            Some(pan_id) => {
                info!("unused PAN ID 0x{:04X} on {}", pan_id, channel);
                self.cleanup();
                SessionOutcome::UnusedPanId { pan_id, channel }
            }
            None if self.stats.pan_id_attempts < u32::from(self.config.max_pan_id_attempts) => {
                debug!("every PAN ID candidate collided, drawing again");
                match self.start_pan_id_attempt(channel) {
                    Ok(()) => SessionOutcome::Handled,
                    Err(error) => SessionOutcome::Failed(error),
                }
            }
            None => {
                warn!(
                    "no unused PAN ID on {} after {} attempts",
                    channel, self.stats.pan_id_attempts
                );
                self.cleanup();
                SessionOutcome::Exhausted(ScanError::PanIdExhausted)
            }
        }
    }

    fn consider(&mut self, record: NetworkRecord) {
        self.stats.beacons_seen += 1;
        let id = *record.extended_pan_id();
        match self.cache.consider(record, &self.filter) {
            ConsiderResult::Inserted => {
                if let Some(handle) = self.buffer {
                    if let Err(e) = self.buffers.resize(handle, self.cache.len()) {
                        warn!("dropping network {}: {}", id, e);
                        let _ = self.cache.pop();
                        self.stats.dropped += 1;
                        return;
                    }
                }
                self.stats.networks_cached += 1;
                debug!("cached network {} on {}", id, record.beacon.channel);
            }
            ConsiderResult::Duplicate => self.stats.duplicates += 1,
            ConsiderResult::Full => {
                self.stats.dropped += 1;
                debug!("joinable cache full, dropping network {}", id);
            }
            ConsiderResult::Rejected(reason) => {
                self.stats.rejected += 1;
                debug!("network {} rejected: {}", id, reason);
            }
        }
    }

    fn deliver_next(&mut self, now: Instant) -> SessionOutcome {
        if let Some(record) = self.cache.pop() {
            if let Some(handle) = self.buffer {
                if let Err(e) = self.buffers.resize(handle, self.cache.len()) {
                    warn!("joinable cache shrink failed: {}", e);
                }
            }
            self.timer.arm(now, self.config.resume_timeout);
            return SessionOutcome::NetworkFound(record);
        }

        self.timer.cancel();
        match self.scan_next_channel() {
            Some(Ok(())) => SessionOutcome::Handled,
            Some(Err(error)) => SessionOutcome::Failed(error),
            None => {
                info!("joinable scan of {} exhausted", self.join_mask);
                self.cleanup();
                SessionOutcome::Exhausted(ScanError::NoBeacons)
            }
        }
    }

    /// Scan the next channel at or above the cursor, `None` when the mask is done.
    fn scan_next_channel(&mut self) -> Option<Result<(), ScanError>> {
        let channel = self.join_mask.next_channel_from(self.cursor)?;
        self.cursor = channel.channel() + 1;
        self.state = SessionState::JoinableScan;
        Some(self.start_active(channel.mask()))
    }
}
