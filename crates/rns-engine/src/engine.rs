//! Retry and fallback protocol over an ordered list of transports
//!
//! One `run` sweeps the transports in order. A refusal or context overflow
//! earns a single retry on the same transport with the minimal prompt. The
//! first unparseable reply switches the whole run into format-fix mode and
//! restarts the sweep at the first transport; from then on every transport,
//! including ones that never failed, receives the reminder prompt. Anything
//! else moves on to the next transport. The error from the last attempt of the
//! last sweep is the one returned.

use crate::config::EngineConfig;
use crate::error::{EngineError, ParseError};
use crate::parser::{LeakDetector, TagParser};
use crate::prompt::{format_fix_prompt, PromptBuilder, TaskPrompts};
use crate::sanitize::Sanitizer;
use rns_domain::{
    Decision, FailureKind, FileDescriptor, FileMetadata, RenameRequest, RenameResult,
    SortRequest, SortResult, StemActionRequest, StemActionResult, Task, Transport,
};
use tracing::{debug, info, warn};

/// Which prompt family the run is currently sending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Normal,
    FormatFix,
}

impl Mode {
    fn purpose(self, label: &str) -> String {
        match self {
            Mode::Normal => label.to_string(),
            Mode::FormatFix => format!("{} (format fix)", label),
        }
    }
}

/// Position within the attempts made against one transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Primary,
    MinimalRetry,
}

/// What the loop does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Same transport, minimal prompt
    RetryMinimal,
    /// Next transport, same mode
    Advance,
    /// Enter format-fix mode and start over at the first transport
    RestartFormatFix,
}

/// The whole retry policy
pub(crate) fn transition(mode: Mode, stage: Stage, kind: FailureKind) -> Transition {
    match (mode, stage, kind) {
        (Mode::Normal, Stage::Primary, kind) if kind.is_shrinkable() => Transition::RetryMinimal,
        (Mode::Normal, Stage::Primary, FailureKind::ParseError) => Transition::RestartFormatFix,
        _ => Transition::Advance,
    }
}

/// Drives transports through the retry/fallback protocol
///
/// The engine borrows its transports; it keeps no state between runs, so one
/// engine can serve any number of requests.
pub struct Engine<'t> {
    transports: Vec<&'t dyn Transport>,
    config: EngineConfig,
    parser: TagParser,
    prompts: PromptBuilder,
    sanitizer: Sanitizer,
}

impl<'t> Engine<'t> {
    /// Create an engine with the default configuration
    pub fn new(transports: Vec<&'t dyn Transport>) -> Self {
        Self::build(transports, EngineConfig::default())
    }

    /// Create an engine with a validated configuration
    pub fn with_config(
        transports: Vec<&'t dyn Transport>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        Ok(Self::build(transports, config))
    }

    fn build(transports: Vec<&'t dyn Transport>, config: EngineConfig) -> Self {
        Self {
            parser: TagParser::new(LeakDetector::new(&config.leak_phrases)),
            prompts: PromptBuilder::from_config(&config),
            sanitizer: Sanitizer::from_config(&config),
            transports,
            config,
        }
    }

    /// The active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Names of the transports, in sweep order
    pub fn transport_names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// Run any task
    pub fn run(&self, task: &Task) -> Result<Decision, EngineError> {
        match task {
            Task::Rename(req) => self.run_rename(req).map(Decision::Rename),
            Task::StemAction(req) => self.run_stem_action(req).map(Decision::StemAction),
            Task::Sort(req) => self.run_sort(req).map(Decision::Sort),
        }
    }

    /// Suggest a new name for `current_name`
    pub fn rename(
        &self,
        current_name: &str,
        metadata: &FileMetadata,
    ) -> Result<RenameResult, EngineError> {
        self.run_rename(&RenameRequest::new(current_name, metadata.clone()))
    }

    /// Decide what to do with `original_stem` given a suggested name
    pub fn stem_action(
        &self,
        original_stem: &str,
        suggested_name: &str,
    ) -> Result<StemActionResult, EngineError> {
        self.run_stem_action(&StemActionRequest::new(original_stem, suggested_name))
    }

    /// Assign one of `allowed_categories` to `file`
    pub fn sort(
        &self,
        file: &FileDescriptor,
        allowed_categories: &[String],
    ) -> Result<SortResult, EngineError> {
        self.run_sort(&SortRequest {
            file: file.clone(),
            allowed_categories: allowed_categories.to_vec(),
            context: None,
        })
    }

    /// Run a rename request
    pub fn run_rename(&self, req: &RenameRequest) -> Result<RenameResult, EngineError> {
        let task = Task::Rename(req.clone());
        let result = self.drive(&task, self.config.rename_max_tokens, |text| {
            self.parser.parse_rename(text)
        })?;
        let extension = req.extension();
        Ok(self
            .sanitizer
            .rename(&req.current_name, extension.as_deref(), result))
    }

    /// Run a stem-action request
    pub fn run_stem_action(
        &self,
        req: &StemActionRequest,
    ) -> Result<StemActionResult, EngineError> {
        let task = Task::StemAction(req.clone());
        let result = self.drive(&task, self.config.stem_action_max_tokens, |text| {
            self.parser.parse_stem_action(text)
        })?;
        Ok(self.sanitizer.stem_action(result))
    }

    /// Run a sort request
    pub fn run_sort(&self, req: &SortRequest) -> Result<SortResult, EngineError> {
        if req.allowed_categories.is_empty() {
            return Err(EngineError::Config(
                "sort requires at least one allowed category".to_string(),
            ));
        }
        let task = Task::Sort(req.clone());
        self.drive(&task, self.config.sort_max_tokens, |text| {
            let result = self.parser.parse_sort(text, &req.file.path)?;
            self.sanitizer.sort(result, &req.allowed_categories)
        })
    }

    fn drive<T, F>(&self, task: &Task, max_tokens: u32, parse: F) -> Result<T, EngineError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        if self.transports.is_empty() {
            return Err(EngineError::NoTransports);
        }

        let label = task.label();
        let TaskPrompts {
            full,
            minimal,
            example,
        } = self.prompts.prompts(task);
        let format_fix = format_fix_prompt(&full, example);

        info!(
            "Running {} across {} transport(s)",
            label,
            self.transports.len()
        );

        let mut mode = Mode::Normal;
        let mut index = 0;
        let mut attempt = 0;
        let mut last_error = None;

        'sweep: while let Some(&transport) = self.transports.get(index) {
            let mut stage = Stage::Primary;

            loop {
                let prompt = match (mode, stage) {
                    (Mode::FormatFix, _) => &format_fix,
                    (Mode::Normal, Stage::Primary) => &full,
                    (Mode::Normal, Stage::MinimalRetry) => &minimal,
                };
                let purpose = mode.purpose(label);
                attempt += 1;

                debug!(
                    "Attempt {}: transport '{}', mode {:?}, stage {:?}, purpose '{}', {} prompt chars",
                    attempt,
                    transport.name(),
                    mode,
                    stage,
                    purpose,
                    prompt.len()
                );

                let failure = match transport.generate(prompt, &purpose, max_tokens) {
                    Ok(text) => match parse(&text) {
                        Ok(value) => {
                            info!(
                                "{} succeeded on transport '{}' (attempt {})",
                                label,
                                transport.name(),
                                attempt
                            );
                            return Ok(value);
                        }
                        Err(source) => EngineError::Parse {
                            transport: transport.name().to_string(),
                            source,
                        },
                    },
                    Err(source) => EngineError::Transport {
                        transport: transport.name().to_string(),
                        source,
                    },
                };

                let kind = failure.kind().unwrap_or(FailureKind::Unknown);
                let next = transition(mode, stage, kind);
                warn!(
                    "{} attempt {} on '{}' failed ({}): {}; next: {:?}",
                    label,
                    attempt,
                    transport.name(),
                    kind,
                    failure,
                    next
                );
                last_error = Some(failure);

                match next {
                    Transition::RetryMinimal => stage = Stage::MinimalRetry,
                    Transition::Advance => {
                        index += 1;
                        continue 'sweep;
                    }
                    Transition::RestartFormatFix => {
                        mode = Mode::FormatFix;
                        index = 0;
                        continue 'sweep;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(EngineError::NoTransports))
    }
}
