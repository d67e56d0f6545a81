//! Channel State Store
//!
//! Per-channel console state plus scenes and master level. Every mutation
//! goes through `execute`, which clamps numeric parameters into range and
//! reports a before/after diff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::commands::{
    ChannelCommand, ChannelOperation, Command, CommandKind, DcaCommand, DcaOperation, EqBand,
    GlobalCommand, GlobalOperation, ParameterUnit, SceneCommand, SceneOperation, SendBus,
};
use crate::config::Config;

/// Results kept for inspection
const RESULT_HISTORY_SIZE: usize = 50;

const PAN_LIMIT: f64 = 100.0;

/// Per-band EQ gain range
const EQ_RANGE: DbRange = DbRange {
    min: -15.0,
    max: 15.0,
};

const COMP_RATIO_MIN: f64 = 1.0;
const COMP_RATIO_MAX: f64 = 20.0;
const COMP_RATIO_DEFAULT: f64 = 2.0;

const COMP_ATTACK_MIN_MS: f64 = 0.1;
const COMP_ATTACK_MAX_MS: f64 = 200.0;
const COMP_ATTACK_DEFAULT_MS: f64 = 10.0;

/// Inclusive dB range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbRange {
    pub min: f64,
    pub max: f64,
}

impl DbRange {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Absolute value for a set operation; percent maps linearly onto the range
    fn absolute(&self, value: f64, unit: Option<ParameterUnit>) -> f64 {
        match unit {
            Some(ParameterUnit::Percent) => self.min + (value / 100.0) * (self.max - self.min),
            _ => value,
        }
    }

    /// Step size for a relative operation
    fn delta(&self, value: f64, unit: Option<ParameterUnit>) -> f64 {
        match unit {
            Some(ParameterUnit::Percent) => (value / 100.0) * (self.max - self.min),
            _ => value,
        }
    }
}

/// Console limits and step sizes
#[derive(Debug, Clone)]
pub struct MixerLimits {
    pub channel_count: u32,
    pub dca_count: u32,
    pub max_scene: u32,
    pub fader: DbRange,
    pub gain: DbRange,
    pub send: DbRange,
    pub eq: DbRange,
    pub fader_step_db: f64,
    pub gain_step_db: f64,
    pub pan_step: f64,
    pub eq_step_db: f64,
}

impl Default for MixerLimits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for MixerLimits {
    fn from(config: &Config) -> Self {
        Self {
            channel_count: config.channel_count,
            dca_count: config.dca_count,
            max_scene: config.max_scene,
            fader: DbRange {
                min: config.fader_min_db,
                max: config.fader_max_db,
            },
            gain: DbRange {
                min: config.gain_min_db,
                max: config.gain_max_db,
            },
            send: DbRange {
                min: config.send_min_db,
                max: config.send_max_db,
            },
            eq: EQ_RANGE,
            fader_step_db: config.fader_step_db,
            gain_step_db: config.gain_step_db,
            pan_step: config.pan_step,
            eq_step_db: config.eq_step_db,
        }
    }
}

/// One channel send (monitor mix or effect)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSend {
    pub bus: SendBus,
    pub level_db: f64,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel_number: u32,
    pub is_muted: bool,
    pub is_soloed: bool,
    pub fader_level: f64,
    pub gain_level: f64,
    /// -100 (hard left) ..= 100 (hard right)
    pub pan_position: f64,
    pub phantom_power: bool,
    pub eq_bypassed: bool,
    pub compressor_bypassed: bool,
    pub compressor_ratio: f64,
    pub compressor_attack_ms: f64,
    pub gate_enabled: bool,
    pub high_pass: bool,
    pub eq_low_db: f64,
    pub eq_mid_db: f64,
    pub eq_high_db: f64,
    /// Scribble-strip name given by voice
    pub label: Option<String>,
    /// Kept sorted by bus
    pub sends: Vec<ChannelSend>,
    pub last_updated: DateTime<Utc>,
}

impl ChannelState {
    pub fn new(channel_number: u32, limits: &MixerLimits) -> Self {
        Self {
            channel_number,
            is_muted: false,
            is_soloed: false,
            fader_level: limits.fader.clamp(0.0),
            gain_level: limits.gain.clamp(0.0),
            pan_position: 0.0,
            phantom_power: false,
            eq_bypassed: false,
            compressor_bypassed: false,
            compressor_ratio: COMP_RATIO_DEFAULT,
            compressor_attack_ms: COMP_ATTACK_DEFAULT_MS,
            gate_enabled: false,
            high_pass: false,
            eq_low_db: 0.0,
            eq_mid_db: 0.0,
            eq_high_db: 0.0,
            label: None,
            sends: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn eq_gain(&self, band: EqBand) -> f64 {
        match band {
            EqBand::Low => self.eq_low_db,
            EqBand::Mid => self.eq_mid_db,
            EqBand::High => self.eq_high_db,
        }
    }

    fn eq_gain_mut(&mut self, band: EqBand) -> &mut f64 {
        match band {
            EqBand::Low => &mut self.eq_low_db,
            EqBand::Mid => &mut self.eq_mid_db,
            EqBand::High => &mut self.eq_high_db,
        }
    }

    pub fn send(&self, bus: SendBus) -> Option<&ChannelSend> {
        self.sends.iter().find(|s| s.bus == bus)
    }

    fn send_mut(&mut self, bus: SendBus) -> &mut ChannelSend {
        let index = match self.sends.binary_search_by(|s| s.bus.cmp(&bus)) {
            Ok(index) => index,
            Err(index) => {
                self.sends.insert(
                    index,
                    ChannelSend {
                        bus,
                        level_db: 0.0,
                        enabled: false,
                    },
                );
                index
            }
        };
        &mut self.sends[index]
    }

    /// Same parameters, ignoring the update timestamp
    pub fn same_settings(&self, other: &ChannelState) -> bool {
        describe_changes(self, other).is_empty()
    }
}

/// Outcome of one execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: Command,
    pub success: bool,
    pub previous_state: Option<ChannelState>,
    pub new_state: Option<ChannelState>,
    pub message: String,
    pub execution_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Running execution counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MixerStatistics {
    pub executed: u64,
    pub failed: u64,
    pub success_rate: f64,
}

/// A DCA (VCA) group master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaState {
    pub dca_number: u32,
    pub fader_level: f64,
    pub is_muted: bool,
    pub label: Option<String>,
}

impl DcaState {
    fn new(dca_number: u32, limits: &MixerLimits) -> Self {
        Self {
            dca_number,
            fader_level: limits.fader.clamp(0.0),
            is_muted: false,
            label: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneSnapshot {
    channels: BTreeMap<u32, ChannelState>,
    dcas: BTreeMap<u32, DcaState>,
    master_level: f64,
}

#[derive(Debug)]
struct MixerState {
    channels: BTreeMap<u32, ChannelState>,
    dcas: BTreeMap<u32, DcaState>,
    master_level: f64,
    scenes: BTreeMap<u32, SceneSnapshot>,
}

impl MixerState {
    fn new(limits: &MixerLimits) -> Self {
        Self {
            channels: (1..=limits.channel_count)
                .map(|n| (n, ChannelState::new(n, limits)))
                .collect(),
            dcas: (1..=limits.dca_count)
                .map(|n| (n, DcaState::new(n, limits)))
                .collect(),
            master_level: limits.fader.clamp(0.0),
            scenes: BTreeMap::new(),
        }
    }

    /// Back to defaults; scenes and names survive
    fn reset(&mut self, limits: &MixerLimits) {
        let mut fresh = MixerState::new(limits);
        fresh.scenes = std::mem::take(&mut self.scenes);
        for (n, channel) in fresh.channels.iter_mut() {
            channel.label = self.channels.get(n).and_then(|c| c.label.clone());
        }
        for (n, dca) in fresh.dcas.iter_mut() {
            dca.label = self.dcas.get(n).and_then(|d| d.label.clone());
        }
        *self = fresh;
    }
}

/// What an operation did, before it is wrapped into an `ExecutionResult`
struct Outcome {
    success: bool,
    previous: Option<ChannelState>,
    new: Option<ChannelState>,
    message: String,
}

impl Outcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            previous: None,
            new: None,
            message: message.into(),
        }
    }

    fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            previous: None,
            new: None,
            message: message.into(),
        }
    }
}

/// Apply a channel operation to a state, producing the next state
pub fn apply(state: &ChannelState, cmd: &ChannelCommand, limits: &MixerLimits) -> ChannelState {
    use ChannelOperation::*;

    let mut next = state.clone();
    let value = cmd.parameter_value;
    let unit = cmd.parameter_unit;

    match cmd.operation {
        MuteOn => next.is_muted = true,
        MuteOff => next.is_muted = false,
        SoloOn => next.is_soloed = true,
        SoloOff => next.is_soloed = false,
        FaderSet => {
            if let Some(v) = value {
                next.fader_level = limits.fader.clamp(limits.fader.absolute(v, unit));
            }
        }
        FaderUp | FaderDown => {
            let step = value
                .map(|v| limits.fader.delta(v.abs(), unit))
                .unwrap_or(limits.fader_step_db);
            let signed = if cmd.operation == FaderUp { step } else { -step };
            next.fader_level = limits.fader.clamp(state.fader_level + signed);
        }
        GainSet => {
            if let Some(v) = value {
                next.gain_level = limits.gain.clamp(limits.gain.absolute(v, unit));
            }
        }
        GainUp | GainDown => {
            let step = value
                .map(|v| limits.gain.delta(v.abs(), unit))
                .unwrap_or(limits.gain_step_db);
            let signed = if cmd.operation == GainUp { step } else { -step };
            next.gain_level = limits.gain.clamp(state.gain_level + signed);
        }
        PanSet => {
            if let Some(v) = value {
                next.pan_position = v.clamp(-PAN_LIMIT, PAN_LIMIT);
            }
        }
        PanLeft | PanRight => {
            let step = value.map(f64::abs).unwrap_or(limits.pan_step);
            let signed = if cmd.operation == PanRight { step } else { -step };
            next.pan_position = (state.pan_position + signed).clamp(-PAN_LIMIT, PAN_LIMIT);
        }
        PanCenter => next.pan_position = 0.0,
        PhantomOn => next.phantom_power = true,
        PhantomOff => next.phantom_power = false,
        EqBypassOn => next.eq_bypassed = true,
        EqBypassOff => next.eq_bypassed = false,
        CompressorBypassOn => next.compressor_bypassed = true,
        CompressorBypassOff => next.compressor_bypassed = false,
        CompressorRatio => {
            if let Some(v) = value {
                next.compressor_ratio = v.clamp(COMP_RATIO_MIN, COMP_RATIO_MAX);
            }
        }
        CompressorAttack => {
            if let Some(v) = value {
                next.compressor_attack_ms = v.clamp(COMP_ATTACK_MIN_MS, COMP_ATTACK_MAX_MS);
            }
        }
        GateOn => next.gate_enabled = true,
        GateOff => next.gate_enabled = false,
        HighPassOn => next.high_pass = true,
        HighPassOff => next.high_pass = false,
        EqBoost | EqCut => {
            if let Some(band) = cmd.band {
                let step = value
                    .map(|v| limits.eq.delta(v.abs(), unit))
                    .unwrap_or(limits.eq_step_db);
                let signed = if cmd.operation == EqBoost { step } else { -step };
                let gain = next.eq_gain_mut(band);
                *gain = limits.eq.clamp(state.eq_gain(band) + signed);
            }
        }
        Label => {
            if let Some(name) = &cmd.name {
                next.label = Some(name.clone());
            }
        }
        SendOn | SendOff | SendLevel => {
            if let Some(bus) = cmd.bus {
                let send = next.send_mut(bus);
                match cmd.operation {
                    SendOn => send.enabled = true,
                    SendOff => send.enabled = false,
                    _ => {
                        if let Some(v) = value {
                            send.level_db = limits.send.clamp(limits.send.absolute(v, unit));
                        }
                        send.enabled = true;
                    }
                }
            }
        }
    }

    next.last_updated = Utc::now();
    next
}

/// Field-by-field description of what changed between two states
pub fn describe_changes(before: &ChannelState, after: &ChannelState) -> Vec<String> {
    let mut changes = Vec::new();

    let on_off = |b: bool| if b { "on" } else { "off" };
    let flags = [
        ("mute", before.is_muted, after.is_muted),
        ("solo", before.is_soloed, after.is_soloed),
        ("phantom", before.phantom_power, after.phantom_power),
        ("eq bypass", before.eq_bypassed, after.eq_bypassed),
        ("comp bypass", before.compressor_bypassed, after.compressor_bypassed),
        ("gate", before.gate_enabled, after.gate_enabled),
        ("hpf", before.high_pass, after.high_pass),
    ];
    for (name, old, new) in flags {
        if old != new {
            changes.push(format!("{} {} -> {}", name, on_off(old), on_off(new)));
        }
    }

    let levels = [
        ("fader", before.fader_level, after.fader_level, " dB"),
        ("gain", before.gain_level, after.gain_level, " dB"),
        ("pan", before.pan_position, after.pan_position, "%"),
        ("eq low", before.eq_low_db, after.eq_low_db, " dB"),
        ("eq mid", before.eq_mid_db, after.eq_mid_db, " dB"),
        ("eq high", before.eq_high_db, after.eq_high_db, " dB"),
        ("comp ratio", before.compressor_ratio, after.compressor_ratio, ":1"),
        ("comp attack", before.compressor_attack_ms, after.compressor_attack_ms, " ms"),
    ];
    for (name, old, new, unit) in levels {
        if (old - new).abs() > f64::EPSILON {
            changes.push(format!("{} {:.1}{} -> {:.1}{}", name, old, unit, new, unit));
        }
    }

    if before.label != after.label {
        changes.push(format!(
            "label {} -> {}",
            describe_label(&before.label),
            describe_label(&after.label)
        ));
    }

    for send in &after.sends {
        match before.send(send.bus) {
            Some(old) if old == send => {}
            Some(old) => {
                if old.enabled != send.enabled {
                    changes.push(format!(
                        "{} send {} -> {}",
                        send.bus,
                        on_off(old.enabled),
                        on_off(send.enabled)
                    ));
                }
                if (old.level_db - send.level_db).abs() > f64::EPSILON {
                    changes.push(format!(
                        "{} send {:.1} dB -> {:.1} dB",
                        send.bus, old.level_db, send.level_db
                    ));
                }
            }
            None => changes.push(format!(
                "{} send {} at {:.1} dB",
                send.bus,
                on_off(send.enabled),
                send.level_db
            )),
        }
    }

    changes
}

fn describe_label(label: &Option<String>) -> String {
    match label {
        Some(name) => format!("'{}'", name),
        None => "none".to_string(),
    }
}

/// Shared console state; the only place channel state is mutated
pub struct ChannelStateStore {
    limits: MixerLimits,
    state: RwLock<MixerState>,
    history: Mutex<VecDeque<ExecutionResult>>,
    executed: AtomicU64,
    failed: AtomicU64,
}

impl ChannelStateStore {
    pub fn new(limits: MixerLimits) -> Self {
        let state = MixerState::new(&limits);
        Self {
            limits,
            state: RwLock::new(state),
            history: Mutex::new(VecDeque::with_capacity(RESULT_HISTORY_SIZE)),
            executed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn limits(&self) -> &MixerLimits {
        &self.limits
    }

    /// Execute any command; failures are reported in the result, never retried
    pub fn execute(&self, command: &Command) -> ExecutionResult {
        let start = Instant::now();

        let outcome = match &command.kind {
            CommandKind::Channel(cmd) => self.execute_channel(cmd),
            CommandKind::Scene(cmd) => self.execute_scene(cmd),
            CommandKind::Global(cmd) => self.execute_global(cmd),
            CommandKind::Dca(cmd) => self.execute_dca(cmd),
            CommandKind::Unknown { reason } => {
                Outcome::failure(format!("Command not recognized: {}", reason))
            }
        };

        let result = ExecutionResult {
            command: command.clone(),
            success: outcome.success,
            previous_state: outcome.previous,
            new_state: outcome.new,
            message: outcome.message,
            execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        };

        self.executed.fetch_add(1, Ordering::Relaxed);
        if result.success {
            debug!("🎚️ {}", result.message);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            warn!("❌ Execution failed: {}", result.message);
        }

        match self.history.lock() {
            Ok(mut history) => {
                if history.len() >= RESULT_HISTORY_SIZE {
                    history.pop_front();
                }
                history.push_back(result.clone());
            }
            Err(e) => warn!("⚠️ Result history unavailable: {}", e),
        }

        result
    }

    fn execute_channel(&self, cmd: &ChannelCommand) -> Outcome {
        if cmd.channel_number == 0 || cmd.channel_number > self.limits.channel_count {
            return Outcome::failure(format!(
                "Invalid channel {} (console has 1-{})",
                cmd.channel_number, self.limits.channel_count
            ));
        }
        if cmd.operation.requires_bus() && cmd.bus.is_none() {
            return Outcome::failure(format!("{:?} needs a destination bus", cmd.operation));
        }
        if let Some(SendBus::Mix { number: 0 }) = cmd.bus {
            return Outcome::failure("Invalid mix bus 0");
        }
        if cmd.operation.requires_band() && cmd.band.is_none() {
            return Outcome::failure(format!("{:?} needs an eq band", cmd.operation));
        }
        if cmd.operation == ChannelOperation::Label && cmd.name.is_none() {
            return Outcome::failure("Label needs a name");
        }

        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(e) => return Outcome::failure(format!("Internal fault: {}", e)),
        };
        let Some(current) = state.channels.get_mut(&cmd.channel_number) else {
            return Outcome::failure(format!("Channel {} not initialized", cmd.channel_number));
        };

        let previous = current.clone();
        let next = apply(&previous, cmd, &self.limits);
        let changes = describe_changes(&previous, &next);
        *current = next.clone();

        let message = if changes.is_empty() {
            format!("ch {}: no change", cmd.channel_number)
        } else {
            format!("ch {}: {}", cmd.channel_number, changes.join(", "))
        };

        Outcome {
            success: true,
            previous: Some(previous),
            new: Some(next),
            message,
        }
    }

    fn execute_scene(&self, cmd: &SceneCommand) -> Outcome {
        if cmd.scene_number == 0 || cmd.scene_number > self.limits.max_scene {
            return Outcome::failure(format!(
                "Invalid scene {} (valid 1-{})",
                cmd.scene_number, self.limits.max_scene
            ));
        }

        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(e) => return Outcome::failure(format!("Internal fault: {}", e)),
        };

        match cmd.operation {
            SceneOperation::Store => {
                let snapshot = SceneSnapshot {
                    channels: state.channels.clone(),
                    dcas: state.dcas.clone(),
                    master_level: state.master_level,
                };
                state.scenes.insert(cmd.scene_number, snapshot);
                info!("💾 Stored scene {}", cmd.scene_number);
                Outcome::success(format!("Stored scene {}", cmd.scene_number))
            }
            SceneOperation::Recall => {
                let Some(snapshot) = state.scenes.get(&cmd.scene_number).cloned() else {
                    return Outcome::failure(format!("Scene {} is empty", cmd.scene_number));
                };
                let now = Utc::now();
                state.channels = snapshot.channels;
                state.dcas = snapshot.dcas;
                for channel in state.channels.values_mut() {
                    channel.last_updated = now;
                }
                state.master_level = snapshot.master_level;
                info!("📂 Recalled scene {}", cmd.scene_number);
                Outcome::success(format!("Recalled scene {}", cmd.scene_number))
            }
        }
    }

    fn execute_global(&self, cmd: &GlobalCommand) -> Outcome {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(e) => return Outcome::failure(format!("Internal fault: {}", e)),
        };
        let now = Utc::now();
        let fader = self.limits.fader;

        let message = match cmd.operation {
            GlobalOperation::MuteAll | GlobalOperation::UnmuteAll => {
                let muted = cmd.operation == GlobalOperation::MuteAll;
                for channel in state.channels.values_mut() {
                    channel.is_muted = muted;
                    channel.last_updated = now;
                }
                if muted {
                    "All channels muted".to_string()
                } else {
                    "All channels unmuted".to_string()
                }
            }
            GlobalOperation::ClearSolos => {
                let mut cleared = 0;
                for channel in state.channels.values_mut().filter(|c| c.is_soloed) {
                    channel.is_soloed = false;
                    channel.last_updated = now;
                    cleared += 1;
                }
                format!("Cleared {} solos", cleared)
            }
            GlobalOperation::ResetAll => {
                state.reset(&self.limits);
                "Console reset to defaults".to_string()
            }
            GlobalOperation::MasterSet => {
                let Some(value) = cmd.parameter else {
                    return Outcome::failure("Master level needs a value");
                };
                let previous = state.master_level;
                state.master_level = fader.clamp(fader.absolute(value, cmd.parameter_unit));
                format!("master {:.1} dB -> {:.1} dB", previous, state.master_level)
            }
            GlobalOperation::MasterUp | GlobalOperation::MasterDown => {
                let step = cmd
                    .parameter
                    .map(|v| fader.delta(v.abs(), cmd.parameter_unit))
                    .unwrap_or(self.limits.fader_step_db);
                let signed = if cmd.operation == GlobalOperation::MasterUp {
                    step
                } else {
                    -step
                };
                let previous = state.master_level;
                state.master_level = fader.clamp(previous + signed);
                format!("master {:.1} dB -> {:.1} dB", previous, state.master_level)
            }
        };

        Outcome::success(message)
    }

    fn execute_dca(&self, cmd: &DcaCommand) -> Outcome {
        if cmd.dca_number == 0 || cmd.dca_number > self.limits.dca_count {
            return Outcome::failure(format!(
                "Invalid dca {} (console has 1-{})",
                cmd.dca_number, self.limits.dca_count
            ));
        }

        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(e) => return Outcome::failure(format!("Internal fault: {}", e)),
        };
        let Some(dca) = state.dcas.get_mut(&cmd.dca_number) else {
            return Outcome::failure(format!("Dca {} not initialized", cmd.dca_number));
        };

        let fader = self.limits.fader;
        let previous = dca.clone();
        match cmd.operation {
            DcaOperation::FaderSet => {
                let Some(value) = cmd.parameter else {
                    return Outcome::failure("Dca level needs a value");
                };
                dca.fader_level = fader.clamp(fader.absolute(value, cmd.parameter_unit));
            }
            DcaOperation::FaderUp | DcaOperation::FaderDown => {
                let step = cmd
                    .parameter
                    .map(|v| fader.delta(v.abs(), cmd.parameter_unit))
                    .unwrap_or(self.limits.fader_step_db);
                let signed = if cmd.operation == DcaOperation::FaderUp {
                    step
                } else {
                    -step
                };
                dca.fader_level = fader.clamp(previous.fader_level + signed);
            }
            DcaOperation::MuteOn => dca.is_muted = true,
            DcaOperation::MuteOff => dca.is_muted = false,
            DcaOperation::Label => {
                let Some(name) = &cmd.name else {
                    return Outcome::failure("Label needs a name");
                };
                dca.label = Some(name.clone());
            }
        }

        let mut changes = Vec::new();
        if (previous.fader_level - dca.fader_level).abs() > f64::EPSILON {
            changes.push(format!(
                "fader {:.1} dB -> {:.1} dB",
                previous.fader_level, dca.fader_level
            ));
        }
        if previous.is_muted != dca.is_muted {
            let on_off = |b: bool| if b { "on" } else { "off" };
            changes.push(format!(
                "mute {} -> {}",
                on_off(previous.is_muted),
                on_off(dca.is_muted)
            ));
        }
        if previous.label != dca.label {
            changes.push(format!(
                "label {} -> {}",
                describe_label(&previous.label),
                describe_label(&dca.label)
            ));
        }

        if changes.is_empty() {
            Outcome::success(format!("dca {}: no change", cmd.dca_number))
        } else {
            Outcome::success(format!("dca {}: {}", cmd.dca_number, changes.join(", ")))
        }
    }

    /// Read one channel
    pub fn snapshot(&self, channel: u32) -> Option<ChannelState> {
        self.state.read().ok()?.channels.get(&channel).cloned()
    }

    pub fn snapshot_all(&self) -> Vec<ChannelState> {
        self.state
            .read()
            .map(|s| s.channels.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dca_snapshot(&self, dca: u32) -> Option<DcaState> {
        self.state.read().ok()?.dcas.get(&dca).cloned()
    }

    pub fn snapshot_dcas(&self) -> Vec<DcaState> {
        self.state
            .read()
            .map(|s| s.dcas.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn master_level(&self) -> Option<f64> {
        self.state.read().ok().map(|s| s.master_level)
    }

    pub fn stored_scenes(&self) -> Vec<u32> {
        self.state
            .read()
            .map(|s| s.scenes.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn last_result(&self) -> Option<ExecutionResult> {
        self.history.lock().ok()?.back().cloned()
    }

    /// Most recent results, oldest first
    pub fn recent_results(&self) -> Vec<ExecutionResult> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn success_rate(&self) -> f64 {
        let executed = self.executed.load(Ordering::Relaxed);
        if executed == 0 {
            return 1.0;
        }
        let failed = self.failed.load(Ordering::Relaxed);
        (executed - failed) as f64 / executed as f64
    }

    pub fn statistics(&self) -> MixerStatistics {
        MixerStatistics {
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            success_rate: self.success_rate(),
        }
    }

    /// Manual reset: every channel back to defaults, scenes kept
    pub fn reset(&self) {
        match self.state.write() {
            Ok(mut state) => {
                state.reset(&self.limits);
                info!("🔄 Console state reset");
            }
            Err(e) => warn!("⚠️ Could not reset console state: {}", e),
        }
    }
}
