//! Command model
//!
//! Structured mixer commands produced by the parser and consumed by the
//! channel state store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How literally a parser pattern matched the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternExactness {
    Exact,
    Partial,
    Fuzzy,
}

impl PatternExactness {
    /// One class looser, used when the target itself was only fuzzily resolved
    pub fn loosened(self) -> Self {
        match self {
            PatternExactness::Exact => PatternExactness::Partial,
            PatternExactness::Partial | PatternExactness::Fuzzy => PatternExactness::Fuzzy,
        }
    }
}

/// Unit attached to a parsed numeric parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterUnit {
    Db,
    Percent,
    /// Compressor ratio, N:1
    Ratio,
    Ms,
}

impl fmt::Display for ParameterUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterUnit::Db => write!(f, "dB"),
            ParameterUnit::Percent => write!(f, "%"),
            ParameterUnit::Ratio => write!(f, ":1"),
            ParameterUnit::Ms => write!(f, "ms"),
        }
    }
}

/// Per-channel operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelOperation {
    MuteOn,
    MuteOff,
    SoloOn,
    SoloOff,
    FaderSet,
    FaderUp,
    FaderDown,
    GainSet,
    GainUp,
    GainDown,
    PanSet,
    PanLeft,
    PanRight,
    PanCenter,
    PhantomOn,
    PhantomOff,
    EqBypassOn,
    EqBypassOff,
    CompressorBypassOn,
    CompressorBypassOff,
    CompressorRatio,
    CompressorAttack,
    GateOn,
    GateOff,
    EqBoost,
    EqCut,
    HighPassOn,
    HighPassOff,
    SendOn,
    SendOff,
    SendLevel,
    Label,
}

impl ChannelOperation {
    /// Send operations need a destination bus
    pub fn requires_bus(self) -> bool {
        matches!(
            self,
            ChannelOperation::SendOn | ChannelOperation::SendOff | ChannelOperation::SendLevel
        )
    }

    /// EQ boost and cut need a band
    pub fn requires_band(self) -> bool {
        matches!(self, ChannelOperation::EqBoost | ChannelOperation::EqCut)
    }
}

/// Three-band channel EQ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "bass" | "low" | "lows" | "low end" | "bottom" | "bottom end" => Some(EqBand::Low),
            "mid" | "mids" | "midrange" => Some(EqBand::Mid),
            "high" | "highs" | "treble" | "top" | "top end" | "air" => Some(EqBand::High),
            _ => None,
        }
    }
}

impl fmt::Display for EqBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EqBand::Low => write!(f, "low"),
            EqBand::Mid => write!(f, "mid"),
            EqBand::High => write!(f, "high"),
        }
    }
}

/// Destination of a channel send (monitor mix or effect return)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SendBus {
    Mix { number: u32 },
    Reverb,
    Delay,
}

impl SendBus {
    /// Parse a captured bus token ("3", "reverb", "echo", ...)
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "reverb" | "verb" | "rev" => Some(SendBus::Reverb),
            "delay" | "echo" => Some(SendBus::Delay),
            other => other
                .parse::<u32>()
                .ok()
                .map(|number| SendBus::Mix { number }),
        }
    }
}

impl fmt::Display for SendBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendBus::Mix { number } => write!(f, "mix {}", number),
            SendBus::Reverb => write!(f, "reverb"),
            SendBus::Delay => write!(f, "delay"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCommand {
    pub channel_number: u32,
    pub operation: ChannelOperation,
    pub parameter_value: Option<f64>,
    pub parameter_unit: Option<ParameterUnit>,
    /// Spoken target ("guitar", "ch 3") used for pronoun carry-forward
    pub target_label: Option<String>,
    pub bus: Option<SendBus>,
    pub band: Option<EqBand>,
    /// New channel name for `Label`
    pub name: Option<String>,
}

impl ChannelCommand {
    pub fn new(channel_number: u32, operation: ChannelOperation) -> Self {
        Self {
            channel_number,
            operation,
            parameter_value: None,
            parameter_unit: None,
            target_label: None,
            bus: None,
            band: None,
            name: None,
        }
    }

    pub fn with_value(mut self, value: f64, unit: ParameterUnit) -> Self {
        self.parameter_value = Some(value);
        self.parameter_unit = Some(unit);
        self
    }

    pub fn with_bus(mut self, bus: SendBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_band(mut self, band: EqBand) -> Self {
        self.band = Some(band);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SceneOperation {
    Recall,
    Store,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneCommand {
    pub scene_number: u32,
    pub operation: SceneOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalOperation {
    MuteAll,
    UnmuteAll,
    ClearSolos,
    ResetAll,
    MasterSet,
    MasterUp,
    MasterDown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalCommand {
    pub operation: GlobalOperation,
    pub parameter: Option<f64>,
    pub parameter_unit: Option<ParameterUnit>,
}

/// DCA (VCA) group operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DcaOperation {
    FaderSet,
    FaderUp,
    FaderDown,
    MuteOn,
    MuteOff,
    Label,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaCommand {
    pub dca_number: u32,
    pub operation: DcaOperation,
    pub parameter: Option<f64>,
    pub parameter_unit: Option<ParameterUnit>,
    pub name: Option<String>,
}

impl DcaCommand {
    pub fn new(dca_number: u32, operation: DcaOperation) -> Self {
        Self {
            dca_number,
            operation,
            parameter: None,
            parameter_unit: None,
            name: None,
        }
    }
}

/// What a command does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    Channel(ChannelCommand),
    Scene(SceneCommand),
    Global(GlobalCommand),
    Dca(DcaCommand),
    Unknown { reason: String },
}

/// A parsed command together with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    /// Verbatim transcript fragment this command came from
    pub original_text: String,
    pub confidence: f64,
    /// Shared by every command split out of one compound utterance
    pub compound_group_id: Option<Uuid>,
}

impl Command {
    pub fn new(kind: CommandKind, original_text: &str, confidence: f64) -> Self {
        Self {
            kind,
            original_text: original_text.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            compound_group_id: None,
        }
    }

    pub fn unknown(original_text: &str, reason: impl Into<String>) -> Self {
        Self::new(
            CommandKind::Unknown {
                reason: reason.into(),
            },
            original_text,
            0.0,
        )
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self.kind, CommandKind::Unknown { .. })
    }

    pub fn as_channel(&self) -> Option<&ChannelCommand> {
        match &self.kind {
            CommandKind::Channel(cmd) => Some(cmd),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CommandKind::Channel(cmd) => {
                write!(f, "ch {} {:?}", cmd.channel_number, cmd.operation)?;
                if let Some(bus) = cmd.bus {
                    write!(f, " -> {}", bus)?;
                }
                if let Some(band) = cmd.band {
                    write!(f, " {}", band)?;
                }
                if let (Some(value), Some(unit)) = (cmd.parameter_value, cmd.parameter_unit) {
                    write!(f, " {}{}", value, unit)?;
                }
                if let Some(name) = &cmd.name {
                    write!(f, " '{}'", name)?;
                }
                Ok(())
            }
            CommandKind::Scene(cmd) => write!(f, "scene {} {:?}", cmd.scene_number, cmd.operation),
            CommandKind::Global(cmd) => {
                write!(f, "{:?}", cmd.operation)?;
                if let Some(value) = cmd.parameter {
                    write!(f, " {}", value)?;
                }
                Ok(())
            }
            CommandKind::Dca(cmd) => {
                write!(f, "dca {} {:?}", cmd.dca_number, cmd.operation)?;
                if let (Some(value), Some(unit)) = (cmd.parameter, cmd.parameter_unit) {
                    write!(f, " {}{}", value, unit)?;
                }
                if let Some(name) = &cmd.name {
                    write!(f, " '{}'", name)?;
                }
                Ok(())
            }
            CommandKind::Unknown { reason } => write!(f, "unknown ({})", reason),
        }
    }
}
