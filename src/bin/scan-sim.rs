//! Host simulator for network formation and join scanning.
//!
//! Plays a simulated RF environment described by a JSON scenario against the
//! discovery orchestrator:
//! - Energy readings and beacons per channel
//! - Scan durations applied in real time
//! - Joins accepted or rejected per network
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin scan-sim -- scenarios/office.json
//! RUST_LOG=debug cargo run --bin scan-sim -- scenarios/office.json
//! ```

use log::{debug, error, info, warn};
use rand_core::{OsRng, RngCore};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wpan_form_join::buffer::StaticBufferPool;
use wpan_form_join::channel::{ChannelMask, PageChannel, SearchMode};
use wpan_form_join::discovery::{
    DiscoveryConfig, DiscoveryError, DiscoveryEvent, Notifications, Orchestrator,
    PREFERRED_2_4_GHZ_CHANNELS,
};
use wpan_form_join::joinable::{Beacon, ExtendedPanId};
use wpan_form_join::radio::{RadioEvent, RecordingRadio, ScanKind, ScanRequest, ScanStatus};
use wpan_form_join::rng::ScanRng;

const DEFAULT_SCENARIO: &str = "scenarios/office.json";

/// 802.15.4 base superframe duration in symbols.
const BASE_SUPERFRAME_SYMBOLS: u64 = 960;

/// Symbol time on the 2.4 GHz O-QPSK PHY.
const SYMBOL_TIME_US: u64 = 16;

/// Energy reported for channels the scenario does not list.
const DEFAULT_NOISE_FLOOR: i8 = -95;

type SimOrchestrator = Orchestrator<RecordingRadio, StaticBufferPool, ScanRng>;

// ==================== Scenario ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Goal {
    Form,
    Join,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    goal: Goal,
    #[serde(default)]
    seed: Option<u32>,
    #[serde(default = "default_stack_profile")]
    stack_profile: u8,
    #[serde(default)]
    primary_channels: Option<Vec<u8>>,
    #[serde(default)]
    subghz: Vec<PageMask>,
    #[serde(default = "default_search_mode")]
    search_mode: u8,
    #[serde(default)]
    extended_pan_id: Option<[u8; 8]>,
    #[serde(default)]
    scan_all_channels: bool,
    #[serde(default)]
    dual_phy: bool,
    #[serde(default)]
    post_join_window_secs: Option<u64>,
    #[serde(default = "default_noise_floor")]
    noise_floor: i8,
    #[serde(default)]
    channels: Vec<ChannelEnv>,
    /// Networks that accept our join; every other join fails.
    #[serde(default)]
    accept_join: Vec<[u8; 8]>,
    /// Leave the first joined network inside the confirmation window.
    #[serde(default)]
    leave_after_join: bool,
}

#[derive(Debug, Deserialize)]
struct PageMask {
    page: u8,
    channels: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ChannelEnv {
    #[serde(default)]
    page: u8,
    channel: u8,
    #[serde(default)]
    energy: Option<i8>,
    #[serde(default)]
    networks: Vec<NetworkEnv>,
}

#[derive(Debug, Deserialize)]
struct NetworkEnv {
    extended_pan_id: [u8; 8],
    pan_id: u16,
    #[serde(default = "default_stack_profile")]
    stack_profile: u8,
    #[serde(default = "default_true")]
    allowing_join: bool,
    #[serde(default = "default_lqi")]
    lqi: u8,
    #[serde(default = "default_rssi")]
    rssi: i8,
}

fn default_stack_profile() -> u8 {
    2
}

fn default_search_mode() -> u8 {
    SearchMode::GHZ_2_4.bits()
}

fn default_noise_floor() -> i8 {
    DEFAULT_NOISE_FLOOR
}

fn default_true() -> bool {
    true
}

fn default_lqi() -> u8 {
    200
}

fn default_rssi() -> i8 {
    -60
}

fn channel_bits(channels: &[u8]) -> u32 {
    channels
        .iter()
        .filter(|&&channel| channel < 32)
        .fold(0, |bits, &channel| bits | (1 << channel))
}

impl Scenario {
    fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        serde_json::from_str(&text).map_err(|e| format!("invalid scenario: {}", e))
    }

    fn discovery_config(&self) -> Result<DiscoveryConfig, DiscoveryError> {
        let mut config = DiscoveryConfig {
            search_mode: SearchMode::from_bits(self.search_mode)?,
            scan_all_channels: self.scan_all_channels,
            dual_phy: self.dual_phy,
            ..Default::default()
        };
        config.primary_mask = match &self.primary_channels {
            Some(channels) => ChannelMask::new(0, channel_bits(channels))?,
            None => ChannelMask::from_raw(PREFERRED_2_4_GHZ_CHANNELS),
        };
        for page in &self.subghz {
            config.set_mask(ChannelMask::new(page.page, channel_bits(&page.channels))?)?;
        }
        if let Some(id) = self.extended_pan_id {
            config.extended_pan_id = ExtendedPanId::new(id);
        }
        if let Some(secs) = self.post_join_window_secs {
            config.post_join_window = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    fn environment(&self, channel: PageChannel) -> Option<&ChannelEnv> {
        self.channels
            .iter()
            .find(|env| env.page == channel.page() && env.channel == channel.channel())
    }

    fn energy(&self, channel: PageChannel) -> i8 {
        self.environment(channel)
            .and_then(|env| env.energy)
            .unwrap_or(self.noise_floor)
    }

    fn accepts(&self, id: &ExtendedPanId) -> bool {
        self.accept_join.iter().any(|bytes| bytes == id.bytes())
    }
}

// ==================== Radio playback ====================

/// Time one channel of a scan takes: `(2^n + 1)` base superframes.
fn channel_scan_time(duration: u8) -> Duration {
    let superframes = (1u64 << duration.min(14)) + 1;
    Duration::from_micros(superframes * BASE_SUPERFRAME_SYMBOLS * SYMBOL_TIME_US)
}

/// Run one scan request against the scenario and return the driver events.
async fn play_scan(scenario: &Scenario, request: ScanRequest) -> Vec<RadioEvent> {
    let mut events = Vec::new();
    let mut last = None;
    for channel in request.mask.iter() {
        tokio::time::sleep(channel_scan_time(request.duration)).await;
        last = Some(channel);
        match request.kind {
            ScanKind::Energy => events.push(RadioEvent::EnergyScanResult {
                channel,
                energy: scenario.energy(channel),
            }),
            ScanKind::Active => {
                let networks = scenario
                    .environment(channel)
                    .map(|env| env.networks.as_slice())
                    .unwrap_or_default();
                for network in networks {
                    events.push(RadioEvent::NetworkFound {
                        beacon: Beacon {
                            extended_pan_id: ExtendedPanId::new(network.extended_pan_id),
                            pan_id: network.pan_id,
                            channel,
                            stack_profile: network.stack_profile,
                            allowing_join: network.allowing_join,
                            nwk_update_id: 0,
                        },
                        lqi: network.lqi,
                        rssi: network.rssi,
                    });
                }
            }
        }
    }
    if let Some(channel) = last {
        events.push(RadioEvent::ScanComplete {
            channel,
            status: ScanStatus::Success,
        });
    }
    events
}

// ==================== Application ====================

struct Simulation {
    scenario: Scenario,
    orchestrator: SimOrchestrator,
    scans: usize,
    left_once: bool,
    finished: bool,
}

impl Simulation {
    fn new(scenario: Scenario) -> Result<Self, DiscoveryError> {
        let config = scenario.discovery_config()?;
        let seed = scenario.seed.unwrap_or_else(|| OsRng.next_u32());
        info!("PRNG seed {}", seed);
        let orchestrator = Orchestrator::new(
            config,
            RecordingRadio::new(scenario.stack_profile),
            StaticBufferPool::default(),
            ScanRng::new(seed),
        )?;
        Ok(Self {
            scenario,
            orchestrator,
            scans: 0,
            left_once: false,
            finished: false,
        })
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<(), DiscoveryError> {
        let started = match self.scenario.goal {
            Goal::Form => self.orchestrator.find_unused_pan_id_and_form(Instant::now())?,
            Goal::Join => self.orchestrator.find_joinable_network(Instant::now())?,
        };
        self.respond(started)?;

        while !self.finished && !cancel.is_cancelled() {
            if let Some(request) = self.next_request() {
                debug!(
                    "radio: {} scan on {} (duration {})",
                    request.kind, request.mask, request.duration
                );
                let events = tokio::select! {
                    _ = cancel.cancelled() => break,
                    events = play_scan(&self.scenario, request) => events,
                };
                for event in events {
                    let out = self.orchestrator.handle_radio(event, Instant::now())?;
                    self.respond(out)?;
                }
                continue;
            }

            match self.orchestrator.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                    let out = self.orchestrator.poll(Instant::now())?;
                    self.respond(out)?;
                }
                None if self.orchestrator.is_active() => {
                    warn!("search stalled in {:?}", self.orchestrator.state());
                    break;
                }
                None => break,
            }
        }

        if cancel.is_cancelled() {
            let _ = self.orchestrator.abort(Instant::now())?;
        }
        Ok(())
    }

    fn next_request(&mut self) -> Option<ScanRequest> {
        let request = self.orchestrator.radio_mut().take_request()?;
        self.scans += 1;
        Some(request)
    }

    /// Act on notifications the way an application would.
    fn respond(&mut self, first: Notifications) -> Result<(), DiscoveryError> {
        let mut queue: VecDeque<DiscoveryEvent> = first.iter().copied().collect();
        while let Some(event) = queue.pop_front() {
            let now = Instant::now();
            let out = match event {
                DiscoveryEvent::NetworkFound(record) => {
                    let id = *record.extended_pan_id();
                    if self.scenario.accepts(&id) {
                        info!(
                            "joined {} (PAN 0x{:04X}) on {}",
                            id, record.beacon.pan_id, record.beacon.channel
                        );
                        let mut out = self.orchestrator.joined(now)?;
                        if self.scenario.leave_after_join && !self.left_once {
                            self.left_once = true;
                            info!("leaving {} to try the next network", id);
                            out = self.orchestrator.left_network(now)?;
                        }
                        out
                    } else {
                        info!("join to {} on {} failed", id, record.beacon.channel);
                        self.orchestrator.join_failed(now)?
                    }
                }
                DiscoveryEvent::UnusedPanIdFound { pan_id, channel } => {
                    info!("forming PAN 0x{:04X} on {}", pan_id, channel);
                    self.orchestrator.network_up(now)?
                }
                DiscoveryEvent::SecondaryChannelSelected(channel) => {
                    info!("second interface on {}", channel);
                    continue;
                }
                DiscoveryEvent::ScanError(e) => {
                    warn!("search ended: {} (0x{:02X})", e, e.status_code());
                    self.finished = true;
                    continue;
                }
                DiscoveryEvent::SearchFinished => {
                    info!("search finished");
                    self.finished = true;
                    continue;
                }
            };
            queue.extend(out.iter().copied());
        }
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    info!("=== scan-sim: {} ===", path);

    let scenario = match Scenario::load(Path::new(&path)) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let mut sim = match Simulation::new(scenario) {
        Ok(sim) => sim,
        Err(e) => {
            error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            signal_cancel.cancel();
        }
    });

    let result = sim.run(cancel).await;
    info!(
        "{} scan request(s), last session: {}",
        sim.scans,
        sim.orchestrator.session().stats()
    );
    if let Err(e) = result {
        error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}
