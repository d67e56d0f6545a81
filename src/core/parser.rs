//! Command Parser
//!
//! Turns normalized transcripts into structured mixer commands. Patterns are
//! tried in a fixed priority order (channel, then scene, then global) and
//! the first structural match wins.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;
use uuid::Uuid;

use super::compound::{CompoundSplitter, PreviousFragment, SingleActionIdiom};
use super::targets::TargetResolver;
use super::text_normalizer::TextNormalizer;
use crate::commands::{
    ChannelCommand, ChannelOperation, Command, CommandKind, DcaCommand, DcaOperation, EqBand,
    GlobalCommand, GlobalOperation, ParameterUnit, PatternExactness, SceneCommand, SceneOperation,
    SendBus,
};
use crate::config::Config;

/// Confidence added for an exact pattern match
pub const EXACT_BOOST: f64 = 0.1;
/// Confidence removed for a fuzzy pattern match (half for partial)
pub const FUZZY_PENALTY: f64 = 0.2;
/// Confidence removed when a numeric parameter had to be parsed
pub const PARAMETER_PENALTY: f64 = 0.05;

/// The second word is lazy so "keys to center" targets "keys"
const TARGET: &str = r"(?P<target>ch \d+|[a-z][a-z\-]*(?: [a-z][a-z\-]*)??)";
const VALUE: &str = r"(?P<value>[+-]?\d+(?:\.\d+)?|-inf)(?: (?P<unit>db|%))?";
const BY_VALUE: &str = r"(?: (?:by )?(?P<value>[+-]?\d+(?:\.\d+)?)(?: (?P<unit>db|%))?)?";
const MIX: &str = r"(?:mix|aux|monitor|bus|wedge|mon)";
const FX: &str = r"(?P<bus>reverb|verb|delay|echo)";
const BAND: &str =
    r"(?P<band>bass|lows?|low end|bottom(?: end)?|mids?|midrange|highs?|treble|top(?: end)?|air)";
const HPF: &str = r"(?:high pass|highpass|high-pass|hpf|low cut)(?: filter)?";
const NAME: &str = r"(?P<name>[a-z][a-z\-]*(?: [a-z][a-z\-]*)?)";
const DCA: &str = r"(?:(?:dca|vca|group) (?P<number>\d+)|(?P<dca_name>[a-z][a-z\-]*) (?:dca|vca|group))";

/// Names that would shadow global or pronoun handling
const RESERVED_NAMES: &[&str] = &["all", "everything", "master", "main", "stereo"];

fn expand(pattern: &str) -> Regex {
    let source = pattern
        .replace("{T}", TARGET)
        .replace("{V}", VALUE)
        .replace("{BY_V}", BY_VALUE)
        .replace("{MIX}", MIX)
        .replace("{FX}", FX)
        .replace("{BAND}", BAND)
        .replace("{HPF}", HPF)
        .replace("{NAME}", NAME)
        .replace("{DCA}", DCA);
    Regex::new(&source).unwrap_or_else(|e| panic!("invalid command pattern {}: {}", pattern, e))
}

/// Where a pattern's numeric parameter comes from
#[derive(Debug, Clone, Copy)]
enum ValueSource {
    None,
    Captured,
    Fixed(f64, ParameterUnit),
}

struct ChannelPattern {
    regex: Regex,
    operation: ChannelOperation,
    exactness: PatternExactness,
    value: ValueSource,
    bus: Option<SendBus>,
}

impl ChannelPattern {
    fn new(pattern: &str, operation: ChannelOperation, exactness: PatternExactness) -> Self {
        let regex = expand(pattern);
        let value = if regex.capture_names().flatten().any(|n| n == "value") {
            ValueSource::Captured
        } else {
            ValueSource::None
        };
        Self {
            regex,
            operation,
            exactness,
            value,
            bus: None,
        }
    }

    fn fixed(mut self, value: f64, unit: ParameterUnit) -> Self {
        self.value = ValueSource::Fixed(value, unit);
        self
    }

    fn bus(mut self, bus: SendBus) -> Self {
        self.bus = Some(bus);
        self
    }
}

struct ScenePattern {
    regex: Regex,
    operation: SceneOperation,
    exactness: PatternExactness,
}

struct GlobalPattern {
    regex: Regex,
    operation: GlobalOperation,
    exactness: PatternExactness,
}

struct DcaPattern {
    regex: Regex,
    operation: DcaOperation,
    exactness: PatternExactness,
}

lazy_static! {
    static ref CHANNEL_PATTERNS: Vec<ChannelPattern> = {
        use ChannelOperation::*;
        use PatternExactness::*;
        let p = ChannelPattern::new;
        vec![
            // Labels
            p(r"^(?:name|label|call|tag|mark) (?P<target>ch \d+) (?:as |to )?{NAME}$", Label, Exact),
            p(r"^(?:set )?(?P<target>ch \d+) (?:name|label) (?:to |as )?{NAME}$", Label, Exact),
            // Phantom power
            p(r"^(?:turn |switch )?phantom(?: power)? on (?:for |on )?{T}$", PhantomOn, Exact),
            p(r"^(?:turn|switch) on phantom(?: power)? (?:for |on )?{T}$", PhantomOn, Exact),
            p(r"^{T} phantom(?: power)? on$", PhantomOn, Exact),
            p(r"^(?:turn |switch )?phantom(?: power)? off (?:for |on )?{T}$", PhantomOff, Exact),
            p(r"^(?:turn|switch) off phantom(?: power)? (?:for |on )?{T}$", PhantomOff, Exact),
            p(r"^{T} phantom(?: power)? off$", PhantomOff, Exact),
            // EQ bypass
            p(r"^bypass eq (?:on |for )?{T}$", EqBypassOn, Exact),
            p(r"^{T} eq bypass(?: on)?$", EqBypassOn, Exact),
            p(r"^(?:turn |switch )?eq off (?:on |for )?{T}$", EqBypassOn, Partial),
            p(r"^(?:turn|switch) off eq (?:on |for )?{T}$", EqBypassOn, Partial),
            p(r"^(?:enable|engage|unbypass) eq (?:on |for )?{T}$", EqBypassOff, Exact),
            p(r"^(?:turn |switch )?eq on (?:on |for )?{T}$", EqBypassOff, Partial),
            p(r"^(?:turn|switch) on eq (?:on |for )?{T}$", EqBypassOff, Partial),
            // Compressor bypass
            p(r"^bypass comp (?:on |for )?{T}$", CompressorBypassOn, Exact),
            p(r"^{T} comp bypass(?: on)?$", CompressorBypassOn, Exact),
            p(r"^(?:turn |switch )?comp off (?:on |for )?{T}$", CompressorBypassOn, Partial),
            p(r"^(?:turn|switch) off comp (?:on |for )?{T}$", CompressorBypassOn, Partial),
            p(r"^(?:enable|engage|unbypass) comp (?:on |for )?{T}$", CompressorBypassOff, Exact),
            p(r"^(?:turn |switch )?comp on (?:on |for )?{T}$", CompressorBypassOff, Partial),
            p(r"^(?:turn|switch) on comp (?:on |for )?{T}$", CompressorBypassOff, Partial),
            p(r"^(?:compress|comp|squash) {T}$", CompressorBypassOff, Fuzzy),
            // Compressor settings
            p(r"^(?:set )?comp (?:ratio )?(?:to )?(?P<value>\d+(?:\.\d+)?)(?: to 1| 1)? (?:on |for )?{T}$", CompressorRatio, Exact),
            p(r"^(?:set )?{T} comp ratio (?:to )?(?P<value>\d+(?:\.\d+)?)(?: to 1| 1)?$", CompressorRatio, Exact),
            p(r"^(?:fast|quick) (?:comp )?attack (?:on |for )?{T}$", CompressorAttack, Partial).fixed(1.0, ParameterUnit::Ms),
            p(r"^slow (?:comp )?attack (?:on |for )?{T}$", CompressorAttack, Partial).fixed(50.0, ParameterUnit::Ms),
            p(r"^(?:set )?{T} (?:comp )?attack (?:to )?(?P<value>\d+(?:\.\d+)?)(?: ms)?$", CompressorAttack, Exact),
            // Gate
            p(r"^(?:turn |switch )?(?:noise )?gate off (?:on |for )?{T}$", GateOff, Exact),
            p(r"^(?:turn|switch) off (?:noise )?gate (?:on |for )?{T}$", GateOff, Exact),
            p(r"^(?:ungate|remove gate from) {T}$", GateOff, Exact),
            p(r"^{T} gate off$", GateOff, Exact),
            p(r"^(?:turn on |switch on )?(?:noise )?gate (?:on |for )?{T}$", GateOn, Exact),
            p(r"^{T} gate(?: on)?$", GateOn, Exact),
            // High-pass filter
            p(r"^(?:turn |switch )?{HPF} off (?:on |for )?{T}$", HighPassOff, Exact),
            p(r"^(?:remove|disable|bypass|turn off) {HPF} (?:on |from |for )?{T}$", HighPassOff, Exact),
            p(r"^(?:add |enable |engage |turn on )?{HPF}(?: on)? (?:on |to |for )?{T}$", HighPassOn, Exact),
            // EQ bands
            p(r"^(?:boost|up|bring up|more) {BAND}{BY_V} (?:on|in|for|to) {T}$", EqBoost, Exact),
            p(r"^(?:cut|down|pull down|take out|less) {BAND}{BY_V} (?:on|in|for|from) {T}$", EqCut, Exact),
            p(r"^(?:boost|up|bring up|more) {BAND} (?:on|in|for|to) {T}{BY_V}$", EqBoost, Exact),
            p(r"^(?:cut|down|pull down|take out|less) {BAND} (?:on|in|for|from) {T}{BY_V}$", EqCut, Exact),
            p(r"^{T} {BAND} (?:boost|up){BY_V}$", EqBoost, Partial),
            p(r"^{T} {BAND} (?:cut|down){BY_V}$", EqCut, Partial),
            // Mute
            p(r"^(?:turn |switch )?mute off {T}$", MuteOff, Exact),
            p(r"^{T} mute off$", MuteOff, Exact),
            p(r"^mute (?:on )?{T}$", MuteOn, Exact),
            p(r"^{T} mute(?: on)?$", MuteOn, Exact),
            p(r"^(?:turn|switch) off {T}$", MuteOn, Partial),
            p(r"^(?:turn|switch) on {T}$", MuteOff, Partial),
            p(r"^(?:kill|cut|lose|ditch|dump|silence) {T}$", MuteOn, Fuzzy),
            p(r"^(?:restore|bring back|open) {T}$", MuteOff, Fuzzy),
            // Solo
            p(r"^solo off {T}$", SoloOff, Exact),
            p(r"^{T} solo off$", SoloOff, Exact),
            p(r"^solo (?:on )?{T}$", SoloOn, Exact),
            p(r"^{T} solo(?: on)?$", SoloOn, Exact),
            p(r"^(?:isolate|listen to|pfl) {T}$", SoloOn, Fuzzy),
            // Gain
            p(r"^(?:set |put )?(?:gain|trim|preamp)(?: on| for| of)? {T} (?:to|at) {V}$", GainSet, Exact),
            p(r"^(?:set |put )?{T} (?:gain|trim|preamp) (?:to |at )?{V}$", GainSet, Exact),
            p(r"^(?:gain|trim|preamp) up (?:on |for )?{T}{BY_V}$", GainUp, Exact),
            p(r"^{T} (?:gain|trim|preamp) up{BY_V}$", GainUp, Exact),
            p(r"^(?:up|boost) (?:gain|trim|preamp) (?:on |for )?{T}{BY_V}$", GainUp, Partial),
            p(r"^(?:gain|trim|preamp) down (?:on |for )?{T}{BY_V}$", GainDown, Exact),
            p(r"^{T} (?:gain|trim|preamp) down{BY_V}$", GainDown, Exact),
            p(r"^(?:down|cut) (?:gain|trim|preamp) (?:on |for )?{T}{BY_V}$", GainDown, Partial),
            // Fader
            p(r"^(?:set |put |dial in |park |bring |move )?{T} (?:fader |level |volume )?(?:to|at) {V}$", FaderSet, Exact),
            p(r"^(?:set |put |bring |move )?(?:fader|level|volume)(?: on| for| of)? {T} (?:to|at) {V}$", FaderSet, Exact),
            p(r"^(?:set |put )?{T} (?:fader|level|volume) {V}$", FaderSet, Partial),
            p(r"^(?:set )?fader (?P<target>\d+) (?:to|at) {V}$", FaderSet, Partial),
            p(r"^(?:bring |push |pull |nudge |bump |turn |move |make )?up {T}{BY_V}$", FaderUp, Exact),
            p(r"^(?:bring |push |pull |nudge |bump |turn |move |make )?{T} up{BY_V}$", FaderUp, Exact),
            p(r"^(?:boost|bump) {T}(?: by)? {V}$", FaderUp, Partial),
            p(r"^(?:boost|push|ride) {T}$", FaderUp, Fuzzy),
            p(r"^(?:bring |push |pull |nudge |bump |turn |move |make )?down {T}{BY_V}$", FaderDown, Exact),
            p(r"^(?:bring |push |pull |nudge |bump |turn |move |make )?{T} down{BY_V}$", FaderDown, Exact),
            p(r"^(?:cut|drop|dip) {T}(?: by)? {V}$", FaderDown, Partial),
            p(r"^(?:bury|back off) {T}$", FaderDown, Fuzzy),
            // Pan
            p(r"^(?:pan )?{T} (?:to )?center$", PanCenter, Exact),
            p(r"^center {T}$", PanCenter, Exact),
            p(r"^pan {T} (?:to )?hard left$", PanSet, Exact).fixed(-100.0, ParameterUnit::Percent),
            p(r"^pan {T} (?:to )?hard right$", PanSet, Exact).fixed(100.0, ParameterUnit::Percent),
            p(r"^pan {T} (?:to )?(?:slightly|little|bit) left$", PanLeft, Partial).fixed(10.0, ParameterUnit::Percent),
            p(r"^pan {T} (?:to )?(?:slightly|little|bit) right$", PanRight, Partial).fixed(10.0, ParameterUnit::Percent),
            p(r"^pan {T} (?:to )?left{BY_V}$", PanLeft, Exact),
            p(r"^pan {T} (?:to )?right{BY_V}$", PanRight, Exact),
            p(r"^pan {T} (?:to )?{V}$", PanSet, Exact),
            p(r"^{T} pan (?:to )?{V}$", PanSet, Exact),
            // Routing sends
            p(r"^(?:send|route|add|patch|feed) {T} to {MIX} (?P<bus>\d+) (?:at|to) {V}$", SendLevel, Exact),
            p(r"^(?:set )?{T} (?:send )?to {MIX} (?P<bus>\d+) (?:at|to) {V}$", SendLevel, Exact),
            p(r"^(?:send|route|add|patch|feed) {T} to {MIX} (?P<bus>\d+)$", SendOn, Exact),
            p(r"^(?:remove|unroute|unpatch|disconnect|kill) {T} (?:from|to) {MIX} (?P<bus>\d+)$", SendOff, Exact),
            // Effects sends
            p(r"^(?:add|send|give) {FX} (?:to|on) {T} (?:at|to) {V}$", SendLevel, Exact),
            p(r"^(?:add|send|give) {FX} (?:to|on) {T}$", SendOn, Exact),
            p(r"^(?:add|send|give) {T} (?:to )?{FX}$", SendOn, Partial),
            p(r"^{FX} on {T}$", SendOn, Partial),
            p(r"^(?:remove|kill|lose) {FX} (?:from|on) {T}$", SendOff, Exact),
            p(r"^{T} {FX} off$", SendOff, Partial),
            p(r"^(?:add|send) {T} to (?:hall|plate|room)$", SendOn, Fuzzy).bus(SendBus::Reverb),
        ]
    };

    static ref SCENE_PATTERNS: Vec<ScenePattern> = {
        use PatternExactness::*;
        use SceneOperation::*;
        [
            (r"^(?:recall|load|go to|switch to|call up|change to) scene (?P<number>\d+)$", Recall, Exact),
            (r"^(?:store|save) (?:current |this )?(?:mix |settings |state )?(?:to |as |in )?scene (?P<number>\d+)$", Store, Exact),
            (r"^scene (?P<number>\d+)$", Recall, Partial),
            (r"^scene change (?:to )?(?P<number>\d+)$", Recall, Fuzzy),
            (r"^(?:recall|load|go to) (?P<number>\d+)$", Recall, Fuzzy),
        ]
        .into_iter()
        .map(|(pattern, operation, exactness)| ScenePattern {
            regex: expand(pattern),
            operation,
            exactness,
        })
        .collect()
    };

    static ref GLOBAL_PATTERNS: Vec<GlobalPattern> = {
        use GlobalOperation::*;
        use PatternExactness::*;
        [
            (r"^mute (?:all|everything)(?: ch)?$", MuteAll, Exact),
            (r"^(?:kill|cut) (?:all|everything)$", MuteAll, Fuzzy),
            (r"^mute off (?:all|everything)(?: ch)?$", UnmuteAll, Exact),
            (r"^(?:clear|cancel|reset|release) (?:all )?solos?$", ClearSolos, Exact),
            (r"^solo off (?:all|everything)(?: ch)?$", ClearSolos, Exact),
            (r"^(?:reset|initialize|zero out|flatten) (?:all|everything|console|mixer|desk|board)(?: ch)?$", ResetAll, Exact),
            (r"^(?:set |put |bring )?(?:master|main|main mix|stereo)(?: fader| level| volume)? (?:to|at) {V}$", MasterSet, Exact),
            (r"^(?:bring |push |turn )?(?:master|main|stereo)(?: fader| level| volume)? up{BY_V}$", MasterUp, Exact),
            (r"^(?:bring |push |turn )?up (?:master|main|stereo)(?: fader| level| volume)?{BY_V}$", MasterUp, Exact),
            (r"^(?:bring |pull |turn )?(?:master|main|stereo)(?: fader| level| volume)? down{BY_V}$", MasterDown, Exact),
            (r"^(?:bring |pull |turn )?down (?:master|main|stereo)(?: fader| level| volume)?{BY_V}$", MasterDown, Exact),
        ]
        .into_iter()
        .map(|(pattern, operation, exactness)| GlobalPattern {
            regex: expand(pattern),
            operation,
            exactness,
        })
        .collect()
    };

    static ref DCA_PATTERNS: Vec<DcaPattern> = {
        use DcaOperation::*;
        use PatternExactness::*;
        [
            (r"^(?:name|label|call|tag|mark) {DCA} (?:as |to )?{NAME}$", Label, Exact),
            (r"^(?:set )?{DCA} (?:name|label) (?:to |as )?{NAME}$", Label, Exact),
            (r"^(?:set |put |bring |move )?{DCA} (?:fader |level )?(?:to|at) {V}$", FaderSet, Exact),
            (r"^(?:set |put )?(?:fader|level)(?: on| for| of)? {DCA} (?:to|at) {V}$", FaderSet, Exact),
            (r"^(?:bring |push |turn )?{DCA} up{BY_V}$", FaderUp, Exact),
            (r"^(?:bring |push |turn )?up {DCA}{BY_V}$", FaderUp, Exact),
            (r"^(?:bring |pull |turn )?{DCA} down{BY_V}$", FaderDown, Exact),
            (r"^(?:bring |pull |turn )?down {DCA}{BY_V}$", FaderDown, Exact),
            (r"^(?:turn |switch )?mute off {DCA}$", MuteOff, Exact),
            (r"^{DCA} mute off$", MuteOff, Exact),
            (r"^(?:turn|switch) on {DCA}$", MuteOff, Partial),
            (r"^mute (?:on )?{DCA}$", MuteOn, Exact),
            (r"^{DCA} mute(?: on)?$", MuteOn, Exact),
            (r"^(?:turn|switch) off {DCA}$", MuteOn, Partial),
        ]
        .into_iter()
        .map(|(pattern, operation, exactness)| DcaPattern {
            regex: expand(pattern),
            operation,
            exactness,
        })
        .collect()
    };
}

/// Apply the exactness and parameter adjustments to a recognizer confidence
pub fn adjust_confidence(base: f64, exactness: PatternExactness, has_parameter: bool) -> f64 {
    let mut confidence = base;
    confidence += match exactness {
        PatternExactness::Exact => EXACT_BOOST,
        PatternExactness::Partial => -FUZZY_PENALTY / 2.0,
        PatternExactness::Fuzzy => -FUZZY_PENALTY,
    };
    if has_parameter {
        confidence -= PARAMETER_PENALTY;
    }
    confidence.clamp(0.0, 1.0)
}

fn parse_value(caps: &Captures) -> Option<(f64, Option<ParameterUnit>)> {
    let raw = caps.name("value")?.as_str();
    let value = if raw == "-inf" {
        f64::NEG_INFINITY
    } else {
        raw.parse::<f64>().ok()?
    };
    let unit = caps.name("unit").map(|m| match m.as_str() {
        "%" => ParameterUnit::Percent,
        _ => ParameterUnit::Db,
    });
    Some((value, unit))
}

fn default_unit(operation: ChannelOperation) -> ParameterUnit {
    match operation {
        ChannelOperation::PanSet | ChannelOperation::PanLeft | ChannelOperation::PanRight => {
            ParameterUnit::Percent
        }
        ChannelOperation::CompressorRatio => ParameterUnit::Ratio,
        ChannelOperation::CompressorAttack => ParameterUnit::Ms,
        _ => ParameterUnit::Db,
    }
}

/// A spoken name that can later be used as a target
fn spoken_name(caps: &Captures) -> Result<String, Rejection> {
    let name = caps.name("name").map(|m| m.as_str().trim()).unwrap_or_default();
    let usable = !name.is_empty()
        && !RESERVED_NAMES.contains(&name)
        && !name.split_whitespace().any(TargetResolver::is_pronoun);
    if usable {
        Ok(name.to_string())
    } else {
        Err(Rejection::BadParameter)
    }
}

/// Why a structurally matching pattern was still rejected
enum Rejection {
    UnresolvedTarget(String),
    BadParameter,
}

/// Parser settings taken from config
#[derive(Debug, Clone)]
pub struct ParserSettings {
    pub min_confidence: f64,
    pub max_transcript_length: usize,
}

impl From<&Config> for ParserSettings {
    fn from(config: &Config) -> Self {
        Self {
            min_confidence: config.min_command_confidence,
            max_transcript_length: config.max_transcript_length,
        }
    }
}

/// Pattern-based natural language command parser
pub struct CommandParser {
    normalizer: TextNormalizer,
    resolver: TargetResolver,
    splitter: CompoundSplitter,
    settings: ParserSettings,
}

impl CommandParser {
    pub fn new(config: &Config) -> Self {
        Self {
            normalizer: TextNormalizer::new(&config.voice_corrections),
            resolver: TargetResolver::new(&config.channel_labels),
            splitter: CompoundSplitter::new(),
            settings: ParserSettings::from(config),
        }
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    pub fn normalize(&self, transcript: &str) -> String {
        self.normalizer.normalize(transcript)
    }

    /// Parse a raw transcript into one or more commands
    pub fn parse(&self, transcript: &str, confidence: f64) -> Vec<Command> {
        if transcript.chars().count() > self.settings.max_transcript_length {
            return vec![Command::unknown(transcript, "transcript too long")];
        }

        let normalized = self.normalize(transcript);
        if normalized.is_empty() {
            return vec![Command::unknown(transcript, "empty transcript")];
        }

        if let Some(idiom) = self.splitter.detect_idiom(&normalized) {
            return self.expand_idiom(&normalized, idiom, confidence);
        }

        let fragments = self.splitter.split(&normalized);
        if fragments.len() <= 1 {
            return vec![self.parse_single(&normalized, confidence)];
        }

        self.parse_compound(&fragments, confidence)
    }

    fn parse_compound(&self, fragments: &[String], confidence: f64) -> Vec<Command> {
        let group = Uuid::new_v4();
        let mut last_target: Option<String> = None;
        let mut previous: Option<PreviousFragment> = None;
        let mut commands = Vec::with_capacity(fragments.len());

        for (i, fragment) in fragments.iter().enumerate() {
            let candidates = if i == 0 {
                vec![fragment.clone()]
            } else {
                self.splitter
                    .resolution_candidates(fragment, last_target.as_deref(), previous.as_ref())
            };

            let resolved = candidates.iter().find_map(|candidate| {
                let cmd = self.parse_single(candidate, confidence);
                cmd.is_valid().then(|| (candidate.clone(), cmd))
            });

            let mut command = match resolved {
                Some((text, cmd)) => {
                    if let Some(label) = cmd.as_channel().and_then(|c| c.target_label.clone()) {
                        previous = Some(PreviousFragment {
                            text,
                            target: label.clone(),
                        });
                        last_target = Some(label);
                    }
                    cmd
                }
                None => self.parse_single(fragment, confidence),
            };

            command.original_text = fragment.clone();
            command.compound_group_id = Some(group);
            commands.push(command);
        }

        debug!(
            "🔗 Compound command split into {} actions (group {})",
            commands.len(),
            group
        );
        commands
    }

    fn expand_idiom(&self, normalized: &str, idiom: SingleActionIdiom, confidence: f64) -> Vec<Command> {
        let (channel_commands, has_parameter) = match idiom {
            SingleActionIdiom::MultiTarget {
                targets,
                value,
                unit,
            } => {
                let value = if value == "-inf" {
                    f64::NEG_INFINITY
                } else {
                    match value.parse::<f64>() {
                        Ok(v) => v,
                        Err(_) => return vec![Command::unknown(normalized, "invalid level")],
                    }
                };
                let unit = match unit.as_deref() {
                    Some("%") => ParameterUnit::Percent,
                    _ => ParameterUnit::Db,
                };
                let mut out = Vec::with_capacity(targets.len());
                for target in &targets {
                    let Some(resolved) = self.resolver.resolve(target) else {
                        return vec![Command::unknown(
                            normalized,
                            format!("unresolved target '{}'", target),
                        )];
                    };
                    let mut cmd = ChannelCommand::new(resolved.channel, ChannelOperation::FaderSet)
                        .with_value(value, unit);
                    cmd.target_label = Some(resolved.label);
                    out.push(cmd);
                }
                (out, true)
            }
            SingleActionIdiom::MultiSend { target, buses } => {
                let Some(resolved) = self.resolver.resolve(&target) else {
                    return vec![Command::unknown(
                        normalized,
                        format!("unresolved target '{}'", target),
                    )];
                };
                let out = buses
                    .into_iter()
                    .map(|number| {
                        let mut cmd = ChannelCommand::new(resolved.channel, ChannelOperation::SendOn)
                            .with_bus(SendBus::Mix { number });
                        cmd.target_label = Some(resolved.label.clone());
                        cmd
                    })
                    .collect();
                (out, false)
            }
        };

        let adjusted = adjust_confidence(confidence, PatternExactness::Partial, has_parameter);
        channel_commands
            .into_iter()
            .map(|cmd| self.accept(CommandKind::Channel(cmd), normalized, adjusted))
            .collect()
    }

    /// Parse one normalized, non-compound fragment
    pub fn parse_single(&self, normalized: &str, confidence: f64) -> Command {
        let text = normalized.trim();
        if text.is_empty() {
            return Command::unknown(normalized, "empty transcript");
        }

        let mut rejection: Option<Rejection> = None;

        for pattern in CHANNEL_PATTERNS.iter() {
            let Some(caps) = pattern.regex.captures(text) else {
                continue;
            };
            match self.build_channel(pattern, &caps) {
                Ok((cmd, fuzzy_target)) => {
                    let exactness = if fuzzy_target {
                        pattern.exactness.loosened()
                    } else {
                        pattern.exactness
                    };
                    let adjusted =
                        adjust_confidence(confidence, exactness, cmd.parameter_value.is_some());
                    debug!("🎯 Matched {:?} ({:?}) for '{}'", cmd.operation, exactness, text);
                    return self.accept(CommandKind::Channel(cmd), text, adjusted);
                }
                Err(r) => {
                    rejection.get_or_insert(r);
                }
            }
        }

        for pattern in SCENE_PATTERNS.iter() {
            let Some(caps) = pattern.regex.captures(text) else {
                continue;
            };
            if let Some(scene_number) = caps.name("number").and_then(|m| m.as_str().parse().ok()) {
                let adjusted = adjust_confidence(confidence, pattern.exactness, false);
                return self.accept(
                    CommandKind::Scene(SceneCommand {
                        scene_number,
                        operation: pattern.operation,
                    }),
                    text,
                    adjusted,
                );
            }
            rejection.get_or_insert(Rejection::BadParameter);
        }

        for pattern in GLOBAL_PATTERNS.iter() {
            let Some(caps) = pattern.regex.captures(text) else {
                continue;
            };
            let parsed = parse_value(&caps);
            if caps.name("value").is_some() && parsed.is_none() {
                rejection.get_or_insert(Rejection::BadParameter);
                continue;
            }
            let adjusted = adjust_confidence(confidence, pattern.exactness, parsed.is_some());
            return self.accept(
                CommandKind::Global(GlobalCommand {
                    operation: pattern.operation,
                    parameter: parsed.map(|(v, _)| v),
                    parameter_unit: parsed.map(|(_, u)| u.unwrap_or(ParameterUnit::Db)),
                }),
                text,
                adjusted,
            );
        }

        for pattern in DCA_PATTERNS.iter() {
            let Some(caps) = pattern.regex.captures(text) else {
                continue;
            };
            match self.build_dca(pattern, &caps) {
                Ok(cmd) => {
                    let adjusted =
                        adjust_confidence(confidence, pattern.exactness, cmd.parameter.is_some());
                    debug!("🎚️ Matched dca {:?} for '{}'", cmd.operation, text);
                    return self.accept(CommandKind::Dca(cmd), text, adjusted);
                }
                Err(r) => {
                    rejection.get_or_insert(r);
                }
            }
        }

        let reason = match rejection {
            Some(Rejection::UnresolvedTarget(target)) => format!("unresolved target '{}'", target),
            Some(Rejection::BadParameter) => "invalid parameter".to_string(),
            None => "no pattern matched".to_string(),
        };
        debug!("❓ No command for '{}': {}", text, reason);
        Command::unknown(text, reason)
    }

    fn build_channel(
        &self,
        pattern: &ChannelPattern,
        caps: &Captures,
    ) -> Result<(ChannelCommand, bool), Rejection> {
        let target_text = caps.name("target").map(|m| m.as_str()).unwrap_or_default();
        let target = self
            .resolver
            .resolve(target_text)
            .ok_or_else(|| Rejection::UnresolvedTarget(target_text.to_string()))?;

        let mut cmd = ChannelCommand::new(target.channel, pattern.operation);
        cmd.target_label = Some(target.label);

        match pattern.value {
            ValueSource::None => {}
            ValueSource::Fixed(value, unit) => {
                cmd = cmd.with_value(value, unit);
            }
            ValueSource::Captured => {
                if caps.name("value").is_some() {
                    let (value, unit) = parse_value(caps).ok_or(Rejection::BadParameter)?;
                    cmd = cmd.with_value(value, unit.unwrap_or_else(|| default_unit(pattern.operation)));
                }
            }
        }

        if pattern.operation.requires_bus() {
            let bus = match caps.name("bus") {
                Some(m) => SendBus::from_token(m.as_str()),
                None => pattern.bus,
            };
            cmd.bus = Some(bus.ok_or(Rejection::BadParameter)?);
        }

        if pattern.operation.requires_band() {
            let band = caps.name("band").and_then(|m| EqBand::from_token(m.as_str()));
            cmd.band = Some(band.ok_or(Rejection::BadParameter)?);
        }

        if pattern.operation == ChannelOperation::Label {
            cmd.name = Some(spoken_name(caps)?);
        }

        Ok((cmd, target.fuzzy))
    }

    fn build_dca(&self, pattern: &DcaPattern, caps: &Captures) -> Result<DcaCommand, Rejection> {
        let dca_number = match (caps.name("number"), caps.name("dca_name")) {
            (Some(m), _) => self
                .normalizer
                .parse_number(m.as_str())
                .ok_or(Rejection::BadParameter)?,
            (None, Some(m)) => self
                .resolver
                .resolve_dca(m.as_str())
                .ok_or_else(|| Rejection::UnresolvedTarget(format!("{} dca", m.as_str())))?,
            (None, None) => return Err(Rejection::BadParameter),
        };

        let mut cmd = DcaCommand::new(dca_number, pattern.operation);
        if caps.name("value").is_some() {
            let (value, unit) = parse_value(caps).ok_or(Rejection::BadParameter)?;
            cmd.parameter = Some(value);
            cmd.parameter_unit = Some(unit.unwrap_or(ParameterUnit::Db));
        }
        if pattern.operation == DcaOperation::Label {
            cmd.name = Some(spoken_name(caps)?);
        }
        Ok(cmd)
    }

    /// Make a name given by a Label command resolvable from now on
    pub fn remember_label(&self, command: &Command) {
        match &command.kind {
            CommandKind::Channel(cmd) if cmd.operation == ChannelOperation::Label => {
                if let Some(name) = &cmd.name {
                    self.resolver.set_label(name, cmd.channel_number);
                }
            }
            CommandKind::Dca(cmd) if cmd.operation == DcaOperation::Label => {
                if let Some(name) = &cmd.name {
                    self.resolver.set_dca_label(name, cmd.dca_number);
                }
            }
            _ => {}
        }
    }

    /// Enforce the minimum acceptance threshold
    fn accept(&self, kind: CommandKind, text: &str, confidence: f64) -> Command {
        if confidence < self.settings.min_confidence {
            let mut cmd = Command::unknown(
                text,
                format!(
                    "confidence {:.2} below threshold {:.2}",
                    confidence, self.settings.min_confidence
                ),
            );
            cmd.confidence = confidence;
            return cmd;
        }
        Command::new(kind, text, confidence)
    }
}
