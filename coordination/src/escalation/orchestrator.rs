//! Healing Orchestrator: drives one error through the escalation ladder
//!
//! Every phase is a transition function from [`SessionState`] to the next
//! state. Collaborator calls are strictly sequential and bounded by the
//! configured timeouts.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::escalation::collaborators::{
    DependencyFile, FixGenerator, FixValidator, GenerationError, ValidationOutcome,
    ValidationRequest,
};
use crate::escalation::diff::{changed_lines, line_diff};
use crate::escalation::outcome::FixOutcome;
use crate::escalation::prompt::{build_prompt, extract_code};
use crate::escalation::state::{GenerationTier, HealingPhase, ModelUsed, SessionState};
use crate::escalation::HealError;
use crate::memory::{file_pattern, FixMemory, RepairStrategy};
use crate::relations;
use crate::trace::{parse_structure, relative_to_root, ErrorDescription, TraceParser};

/// Tunables for a healing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Cost charged per cheap-tier attempt that returns a candidate.
    pub cheap_cost: f64,
    /// Cost charged per smart-tier attempt that returns a candidate.
    pub smart_cost: f64,
    /// Upper bound on one generation call.
    pub generation_timeout: Duration,
    /// Upper bound on one validation call.
    pub validation_timeout: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            cheap_cost: GenerationTier::Cheap.default_cost(),
            smart_cost: GenerationTier::Smart.default_cost(),
            generation_timeout: Duration::from_secs(120),
            validation_timeout: Duration::from_secs(60),
        }
    }
}

impl EscalationConfig {
    pub fn cost_for(&self, tier: GenerationTier) -> f64 {
        match tier {
            GenerationTier::Cheap => self.cheap_cost,
            GenerationTier::Smart => self.smart_cost,
        }
    }
}

/// Per-session bookkeeping that outlives individual states.
#[derive(Debug, Default)]
struct SessionContext {
    phases: Vec<HealingPhase>,
    total_cost: f64,
    last_cost: f64,
    prompt: String,
    dependencies: Vec<DependencyFile>,
}

/// Escalation orchestrator: parse → relate → recall → cheap → (memory) → smart.
pub struct HealingOrchestrator {
    parser: TraceParser,
    memory: Arc<dyn FixMemory>,
    generator: Arc<dyn FixGenerator>,
    validator: Arc<dyn FixValidator>,
    config: EscalationConfig,
}

impl HealingOrchestrator {
    pub fn new(
        codebase_root: impl AsRef<Path>,
        memory: Arc<dyn FixMemory>,
        generator: Arc<dyn FixGenerator>,
        validator: Arc<dyn FixValidator>,
    ) -> Self {
        Self {
            parser: TraceParser::new(codebase_root.as_ref()),
            memory,
            generator,
            validator,
            config: EscalationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EscalationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    pub fn codebase_root(&self) -> &Path {
        self.parser.codebase_root()
    }

    /// Run one healing session to completion. Never returns an error: every
    /// fault becomes a failed [`FixOutcome`].
    pub async fn heal(&self, raw: &str) -> FixOutcome {
        let session_id = Uuid::new_v4();
        let span = info_span!("heal_session", %session_id);
        self.run(raw).instrument(span).await
    }

    /// Run the session on its own task so a panic inside a collaborator
    /// surfaces as a failed outcome instead of unwinding the caller.
    ///
    /// The report is parsed up front as well, so an aborted session still
    /// carries the failing file and line.
    pub async fn heal_detached(self: Arc<Self>, raw: String) -> FixOutcome {
        let location = parse_structure(&raw).ok();
        let handle = tokio::spawn(async move { self.heal(&raw).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = HealError::from(e);
                warn!(error = %err, "Healing session aborted");
                let outcome = FixOutcome::failure(err.to_string());
                match location {
                    Some(error) => outcome.with_error(error),
                    None => outcome,
                }
            }
        }
    }

    async fn run(&self, raw: &str) -> FixOutcome {
        let mut ctx = SessionContext::default();
        let mut state = SessionState::Parsing {
            raw: raw.to_string(),
        };

        loop {
            ctx.phases.push(state.phase());
            state = match state {
                SessionState::Parsing { raw } => self.parse(&raw),
                SessionState::Relating { error } => self.relate(error, &mut ctx),
                SessionState::MemoryLookup { error } => self.lookup(error, &mut ctx).await,
                SessionState::GenerateCheap { error, strategies } => {
                    self.generate_cheap(error, strategies, &mut ctx).await
                }
                SessionState::ValidateCheap {
                    error,
                    strategies,
                    candidate,
                } => self.validate_cheap(error, strategies, candidate, &ctx).await,
                SessionState::MemoryFallback {
                    error,
                    strategies,
                    reason,
                } => self.memory_fallback(error, strategies, reason, &ctx).await,
                SessionState::GenerateSmart {
                    error,
                    strategies,
                    reason,
                } => self.generate_smart(error, strategies, reason, &mut ctx).await,
                SessionState::ValidateSmart { error, candidate } => {
                    self.validate_smart(error, candidate, &ctx).await
                }
                SessionState::Done(outcome) => return finish(*outcome, ctx),
            };
        }
    }

    fn parse(&self, raw: &str) -> SessionState {
        match self.parser.parse(raw) {
            Ok(error) => {
                info!(
                    error_type = %error.error_type,
                    file = %error.file_path,
                    line = error.line_number,
                    dialect = %error.dialect,
                    "Error parsed"
                );
                SessionState::Relating { error }
            }
            Err(e) => {
                info!(reason = %e, "Error report not parseable");
                SessionState::done(FixOutcome::failure("could not parse error"))
            }
        }
    }

    fn relate(&self, mut error: ErrorDescription, ctx: &mut SessionContext) -> SessionState {
        let count = relations::attach(&mut error);
        ctx.dependencies = self.read_dependencies(&error);
        info!(
            relations = count,
            dependencies = ctx.dependencies.len(),
            "Call chain mapped"
        );
        SessionState::MemoryLookup { error }
    }

    /// Read every implicated file except the target; unreadable files are
    /// skipped.
    fn read_dependencies(&self, error: &ErrorDescription) -> Vec<DependencyFile> {
        relations::implicated_files(&error.related_files, &error.file_path)
            .into_iter()
            .filter_map(|path| {
                let full = self.codebase_root().join(path);
                match std::fs::read_to_string(&full) {
                    Ok(content) => Some(DependencyFile {
                        path: relative_to_root(self.codebase_root(), path),
                        content,
                    }),
                    Err(e) => {
                        warn!(path = %full.display(), error = %e, "Skipping unreadable related file");
                        None
                    }
                }
            })
            .collect()
    }

    async fn lookup(&self, error: ErrorDescription, ctx: &mut SessionContext) -> SessionState {
        let strategies = match self.memory.retrieve_similar(&error).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Fix memory lookup failed; continuing without strategies");
                Vec::new()
            }
        };
        info!(strategies = strategies.len(), "Fix memory consulted");
        ctx.prompt = build_prompt(&error, &strategies);
        SessionState::GenerateCheap { error, strategies }
    }

    async fn generate_cheap(
        &self,
        error: ErrorDescription,
        strategies: Vec<RepairStrategy>,
        ctx: &mut SessionContext,
    ) -> SessionState {
        match self.generate(&error, GenerationTier::Cheap, ctx).await {
            Ok(candidate) => SessionState::ValidateCheap {
                error,
                strategies,
                candidate,
            },
            Err(e) if !strategies.is_empty() => {
                warn!(error = %e, "Cheap tier failed; trying fix memory");
                SessionState::MemoryFallback {
                    error,
                    strategies,
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cheap tier failed; escalating to smart tier");
                SessionState::GenerateSmart {
                    error,
                    strategies,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn validate_cheap(
        &self,
        error: ErrorDescription,
        strategies: Vec<RepairStrategy>,
        candidate: String,
        ctx: &SessionContext,
    ) -> SessionState {
        let result = self.validate(&error, &candidate, ctx).await;
        if result.success {
            info!(tier = %GenerationTier::Cheap, "Cheap tier fix validated");
            return self
                .accept(error, candidate, GenerationTier::Cheap, ctx)
                .await;
        }
        let reason = result.error.unwrap_or_else(|| "validation failed".to_string());
        warn!(reason = %reason, "Cheap tier fix failed validation; escalating to smart tier");
        SessionState::GenerateSmart {
            error,
            strategies,
            reason,
        }
    }

    async fn memory_fallback(
        &self,
        error: ErrorDescription,
        strategies: Vec<RepairStrategy>,
        reason: String,
        ctx: &SessionContext,
    ) -> SessionState {
        let Some(top) = strategies.first() else {
            return SessionState::GenerateSmart {
                error,
                strategies,
                reason,
            };
        };
        let Some(replacement) = top.replacement.clone() else {
            info!(fingerprint = %top.fingerprint, "Top strategy has no stored replacement");
            return SessionState::GenerateSmart {
                error,
                strategies,
                reason,
            };
        };

        let result = self.validate(&error, &replacement, ctx).await;
        if !result.success {
            warn!(
                reason = %result.error.as_deref().unwrap_or("validation failed"),
                "Remembered fix failed validation; escalating to smart tier"
            );
            return SessionState::GenerateSmart {
                error,
                strategies,
                reason,
            };
        }

        info!(fingerprint = %top.fingerprint, "Remembered fix validated");
        let mut outcome = FixOutcome::success(ModelUsed::Memory, 0.0);
        outcome.diff = Some(line_diff(error.file_content.as_deref(), &replacement));
        outcome.fix_strategy = Some(top.description.clone());
        outcome.fixed_code = Some(replacement);
        SessionState::done(outcome.with_error(error))
    }

    async fn generate_smart(
        &self,
        error: ErrorDescription,
        _strategies: Vec<RepairStrategy>,
        reason: String,
        ctx: &mut SessionContext,
    ) -> SessionState {
        debug!(previous = %reason, "Escalated to smart tier");
        match self.generate(&error, GenerationTier::Smart, ctx).await {
            Ok(candidate) => SessionState::ValidateSmart { error, candidate },
            Err(e) => {
                warn!(error = %e, "Smart tier failed");
                SessionState::done(
                    FixOutcome::failure(format!("smart tier failed: {e}")).with_error(error),
                )
            }
        }
    }

    async fn validate_smart(
        &self,
        error: ErrorDescription,
        candidate: String,
        ctx: &SessionContext,
    ) -> SessionState {
        let result = self.validate(&error, &candidate, ctx).await;
        if result.success {
            info!(tier = %GenerationTier::Smart, "Smart tier fix validated");
            return self
                .accept(error, candidate, GenerationTier::Smart, ctx)
                .await;
        }
        let last = result.error.unwrap_or_else(|| "unknown".to_string());
        warn!(reason = %last, "Smart tier fix failed validation");
        SessionState::done(
            FixOutcome::failure(format!(
                "could not generate working fix. Last error: {last}"
            ))
            .with_error(error),
        )
    }

    /// One bounded generation call; charges the tier cost when a candidate
    /// comes back.
    async fn generate(
        &self,
        error: &ErrorDescription,
        tier: GenerationTier,
        ctx: &mut SessionContext,
    ) -> Result<String, GenerationError> {
        info!(%tier, "Generating fix");
        let timeout = self.config.generation_timeout;
        let raw = tokio::time::timeout(timeout, self.generator.generate(&ctx.prompt, tier))
            .await
            .map_err(|_| GenerationError::Timeout {
                tier,
                seconds: timeout.as_secs(),
            })??;

        let candidate = extract_code(&raw, error);
        if candidate.is_empty() {
            return Err(GenerationError::EmptyResponse { tier });
        }

        let cost = self.config.cost_for(tier);
        ctx.last_cost = cost;
        ctx.total_cost += cost;
        debug!(%tier, chars = candidate.len(), cost, "Candidate generated");
        Ok(candidate)
    }

    /// One bounded validation call; transport faults and timeouts are
    /// reported as failed validations.
    async fn validate(
        &self,
        error: &ErrorDescription,
        candidate: &str,
        ctx: &SessionContext,
    ) -> ValidationOutcome {
        let mut request = ValidationRequest::new(error, candidate, ctx.dependencies.clone());
        request.target_path = relative_to_root(self.codebase_root(), &request.target_path);
        let timeout = self.config.validation_timeout;
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.validator.validate(&request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(error = %e, "Validator error counted as failed validation");
                ValidationOutcome::failed(e.to_string(), started.elapsed())
            }
            Err(_) => {
                warn!(seconds = timeout.as_secs(), "Validation timed out");
                ValidationOutcome::failed(
                    format!("validation timed out after {}s", timeout.as_secs()),
                    started.elapsed(),
                )
            }
        }
    }

    /// Build the success outcome for a validated tier candidate and record it.
    async fn accept(
        &self,
        error: ErrorDescription,
        candidate: String,
        tier: GenerationTier,
        ctx: &SessionContext,
    ) -> SessionState {
        let original = error.file_content.as_deref();
        let mut outcome = FixOutcome::success(tier.into(), ctx.last_cost);
        outcome.diff = Some(line_diff(original, &candidate));
        outcome.fix_strategy = Some(describe_fix(tier, &error, original, &candidate));
        outcome.fixed_code = Some(candidate);

        if let Err(e) = self.memory.store(&error, &outcome).await {
            warn!(error = %e, "Failed to record fix in memory");
        }
        SessionState::done(outcome.with_error(error))
    }
}

/// `"<tier> tier rewrite of <pattern>: changed N line(s), first at line L"`
fn describe_fix(
    tier: GenerationTier,
    error: &ErrorDescription,
    original: Option<&str>,
    candidate: &str,
) -> String {
    let changed = changed_lines(original, candidate);
    let pattern = file_pattern(&error.file_path);
    match changed.first() {
        Some(first) => format!(
            "{tier} tier rewrite of {pattern}: changed {} line(s), first at line {first}",
            changed.len()
        ),
        None => format!("{tier} tier rewrite of {pattern}: no line changes"),
    }
}

fn finish(mut outcome: FixOutcome, ctx: SessionContext) -> FixOutcome {
    outcome.phases = ctx.phases;
    outcome.total_cost = ctx.total_cost;
    info!(
        success = outcome.success,
        model = ?outcome.model_used,
        total_cost = outcome.total_cost,
        "Healing session finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::collaborators::{MockFixGenerator, MockFixValidator, ValidationError};
    use crate::memory::{InMemoryFixMemory, MemoryError};
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use mockall::Sequence;

    const TRACE: &str = "Traceback (most recent call last):\n  File \"app.py\", line 2, in run\n    x = 1/0\nZeroDivisionError: division by zero";

    fn orchestrator(
        generator: MockFixGenerator,
        validator: MockFixValidator,
        memory: Arc<dyn FixMemory>,
    ) -> HealingOrchestrator {
        HealingOrchestrator::new(".", memory, Arc::new(generator), Arc::new(validator))
    }

    struct BrokenMemory;

    #[async_trait]
    impl FixMemory for BrokenMemory {
        async fn retrieve_similar(
            &self,
            _error: &ErrorDescription,
        ) -> Result<Vec<RepairStrategy>, MemoryError> {
            Err(MemoryError::Backend("offline".into()))
        }

        async fn store(
            &self,
            _error: &ErrorDescription,
            _outcome: &FixOutcome,
        ) -> Result<(), MemoryError> {
            Err(MemoryError::Backend("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_cheap_then_smart_ordering() {
        let mut seq = Sequence::new();
        let mut generator = MockFixGenerator::new();
        let mut validator = MockFixValidator::new();

        generator
            .expect_generate()
            .with(mockall::predicate::always(), eq(GenerationTier::Cheap))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("x = 0".to_string()));
        validator
            .expect_validate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ValidationOutcome::failed("still broken", Duration::ZERO)));
        generator
            .expect_generate()
            .with(mockall::predicate::always(), eq(GenerationTier::Smart))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("```python\nx = 1\n```".to_string()));
        validator
            .expect_validate()
            .withf(|req| req.candidate == "x = 1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ValidationOutcome::passed("ok", Duration::ZERO)));

        let memory = Arc::new(InMemoryFixMemory::new());
        let outcome = orchestrator(generator, validator, memory.clone())
            .heal(TRACE)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.model_used, Some(ModelUsed::Smart));
        assert_eq!(outcome.fixed_code.as_deref(), Some("x = 1"));
        assert!((outcome.total_cost - 0.0062).abs() < 1e-9);
        assert_eq!(outcome.cost, 0.006);
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_validator_error_counts_as_failure() {
        let mut generator = MockFixGenerator::new();
        let mut validator = MockFixValidator::new();
        generator
            .expect_generate()
            .times(2)
            .returning(|_, _| Ok("x = 1".to_string()));
        validator
            .expect_validate()
            .times(2)
            .returning(|_| Err(ValidationError::Transport("connection refused".into())));

        let outcome = orchestrator(generator, validator, Arc::new(InMemoryFixMemory::new()))
            .heal(TRACE)
            .await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.message,
            "could not generate working fix. Last error: sandbox transport error: connection refused"
        );
        assert_eq!(outcome.location(), Some(("app.py", 2)));
    }

    #[tokio::test]
    async fn test_broken_memory_is_not_fatal() {
        let mut generator = MockFixGenerator::new();
        let mut validator = MockFixValidator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_, _| Ok("x = 1".to_string()));
        validator
            .expect_validate()
            .times(1)
            .returning(|_| Ok(ValidationOutcome::passed("", Duration::ZERO)));

        let outcome = orchestrator(generator, validator, Arc::new(BrokenMemory))
            .heal(TRACE)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.model_used, Some(ModelUsed::Cheap));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_is_hard_failure() {
        struct SlowGenerator;

        #[async_trait]
        impl FixGenerator for SlowGenerator {
            async fn generate(
                &self,
                _prompt: &str,
                _tier: GenerationTier,
            ) -> Result<String, GenerationError> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok("late".into())
            }
        }

        let validator = MockFixValidator::new();
        let orch = HealingOrchestrator::new(
            ".",
            Arc::new(InMemoryFixMemory::new()),
            Arc::new(SlowGenerator),
            Arc::new(validator),
        );
        let outcome = orch.heal(TRACE).await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.message,
            "smart tier failed: smart tier timed out after 120s"
        );
        assert_eq!(outcome.total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_panicking_validator_becomes_failure() {
        let mut generator = MockFixGenerator::new();
        let mut validator = MockFixValidator::new();
        generator
            .expect_generate()
            .returning(|_, _| Ok("x = 1".to_string()));
        validator
            .expect_validate()
            .returning(|_| panic!("sandbox client bug"));

        let orch = Arc::new(orchestrator(
            generator,
            validator,
            Arc::new(InMemoryFixMemory::new()),
        ));
        let outcome = orch.heal_detached(TRACE.to_string()).await;
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("healing session panicked"));
        assert_eq!(outcome.location(), Some(("app.py", 2)));
        assert_eq!(outcome.error.map(|e| e.error_type).as_deref(), Some("ZeroDivisionError"));
    }

    #[tokio::test]
    async fn test_detached_unparseable_input() {
        let mut generator = MockFixGenerator::new();
        generator.expect_generate().never();
        let mut validator = MockFixValidator::new();
        validator.expect_validate().never();

        let orch = Arc::new(orchestrator(
            generator,
            validator,
            Arc::new(InMemoryFixMemory::new()),
        ));
        let outcome = orch.heal_detached("no trace here".to_string()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "could not parse error");
        assert!(outcome.location().is_none());
    }

    #[test]
    fn test_describe_fix() {
        let error = crate::trace::parse_structure(TRACE).unwrap();
        let text = describe_fix(GenerationTier::Cheap, &error, Some("a\nb"), "a\nc");
        assert_eq!(text, "cheap tier rewrite of *.py: changed 1 line(s), first at line 2");
    }
}
