//! The execution orchestrator.
//!
//! One [`Orchestrator`] runs one manifest execution:
//!
//! 1. bind and check variables
//! 2. render the system and user prompts
//! 3. invoke the model with the tool set
//! 4. while the model calls tools: run them in order, feed results back,
//!    and stop once the terminating tool succeeds
//!
//! `execute()` never returns `Err`; every failure is folded into the
//! [`ExecutionResult`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentrun_config::{AppConfig, CredentialSet};
use agentrun_core::error::{Error, Result};
use agentrun_core::{
    Bindings, Content, ContentPart, InvokeOptions, Manifest, Message, Provider, TemplateRenderer,
    ToolCall, ToolChoice, ToolDeclaration, ToolOutcome, ToolRouter, Usage,
};
use agentrun_telemetry::{
    HttpPricingSource, HttpTraceSink, ModelPricing, PricingCache, PricingSource, ToolStatus,
    ToolTrace, TraceEmitter, TurnTrace, spawn_fetch,
};
use chrono::Utc;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::builtin;
use crate::control::{CallbackSignal, CancelHandle, ToolCallback};
use crate::result::{ExecutionResult, UsageSummary};
use crate::settings::ExecutionSettings;

/// How a run ended, short of failing.
enum RunOutcome {
    Completed(Value),
    Cancelled,
}

/// Runs a manifest against one provider.
pub struct Orchestrator {
    manifest: Manifest,
    provider: Arc<dyn Provider>,
    router: Option<ToolRouter>,
    variables: Bindings,
    attachments: Vec<ContentPart>,
    settings: ExecutionSettings,
    callback: Option<Arc<dyn ToolCallback>>,
    cancel: CancelHandle,
    tracer: TraceEmitter,
    run_id: String,

    /// Provider id and model name used for pricing lookups
    pricing_key: (String, String),
    pricing: Option<ModelPricing>,
    pricing_fetch: Option<JoinHandle<Option<ModelPricing>>>,
    default_rate: (f64, f64),

    // Per-run state
    bindings: Bindings,
    messages: Vec<Message>,
    error_counts: HashMap<String, u32>,
    usage: Usage,
}

impl Orchestrator {
    /// Create an orchestrator for a manifest with an explicit provider.
    pub fn new(manifest: Manifest, provider: Arc<dyn Provider>) -> Result<Self> {
        manifest.validate()?;
        let primary = manifest.primary_model()?;
        let pricing_key = (primary.provider.clone(), primary.model.clone());

        Ok(Self {
            manifest,
            provider,
            router: None,
            variables: Bindings::new(),
            attachments: Vec::new(),
            settings: ExecutionSettings::default(),
            callback: None,
            cancel: CancelHandle::new(),
            tracer: TraceEmitter::disabled(),
            run_id: uuid::Uuid::new_v4().to_string(),
            pricing_key,
            pricing: None,
            pricing_fetch: None,
            default_rate: (
                agentrun_telemetry::pricing::DEFAULT_INPUT_PER_M,
                agentrun_telemetry::pricing::DEFAULT_OUTPUT_PER_M,
            ),
            bindings: Bindings::new(),
            messages: Vec::new(),
            error_counts: HashMap::new(),
            usage: Usage::default(),
        })
    }

    /// Create an orchestrator, building the adapter for the primary model.
    ///
    /// Fails when the manifest is invalid or the credentials for its
    /// provider are missing.
    pub fn from_manifest(manifest: Manifest, credentials: &CredentialSet) -> Result<Self> {
        manifest.validate()?;
        let provider = agentrun_providers::build_provider(manifest.primary_model()?, credentials)?;
        Self::new(manifest, provider)
    }

    /// Create an orchestrator wired from application config: credentials,
    /// execution settings, pricing source and trace sink.
    ///
    /// Must be called within a Tokio runtime when a pricing source is
    /// configured, since the pricing fetch starts immediately.
    pub fn from_config(manifest: Manifest, config: &AppConfig) -> Result<Self> {
        let mut orchestrator = Self::from_manifest(manifest, &config.providers)?
            .with_settings(ExecutionSettings::from(&config.execution))
            .with_default_rate(
                config.pricing.default_input_per_m,
                config.pricing.default_output_per_m,
            );

        if let Some(url) = &config.pricing.source_url {
            let source = HttpPricingSource::new(url).map_err(|e| Error::Config {
                message: e.to_string(),
            })?;
            let source: Arc<dyn PricingSource> = Arc::new(source);
            let ttl = Duration::from_secs(config.pricing.ttl_hours.saturating_mul(3600));
            orchestrator = orchestrator.with_pricing(Arc::new(PricingCache::new(ttl)), Some(source));
        }

        if let Some(endpoint) = &config.tracing.endpoint {
            let sink = HttpTraceSink::new(endpoint, config.tracing.api_key.clone()).map_err(|e| {
                Error::Config {
                    message: e.to_string(),
                }
            })?;
            orchestrator = orchestrator.with_tracer(TraceEmitter::new(Arc::new(sink)));
        }

        Ok(orchestrator)
    }

    /// Attach caller-supplied tool handlers.
    pub fn with_router(mut self, router: ToolRouter) -> Self {
        self.router = Some(router);
        self
    }

    /// Set runtime variable bindings.
    pub fn with_variables(mut self, variables: Bindings) -> Self {
        self.variables = variables;
        self
    }

    /// Append non-text content (images) after the rendered user text.
    pub fn with_attachments(mut self, attachments: Vec<ContentPart>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Fallback USD rates per 1M tokens when no pricing is known.
    pub fn with_default_rate(mut self, input_per_m: f64, output_per_m: f64) -> Self {
        self.default_rate = (input_per_m, output_per_m);
        self
    }

    /// Use a shared pricing cache, refilled from `source` on a miss.
    ///
    /// The fetch starts in the background immediately; `execute()` awaits it
    /// before computing the first cost. Must be called within a Tokio
    /// runtime when a fetch is needed.
    pub fn with_pricing(
        mut self,
        cache: Arc<PricingCache>,
        source: Option<Arc<dyn PricingSource>>,
    ) -> Self {
        let (provider, model) = &self.pricing_key;
        if let Some(hit) = cache.get(provider, model) {
            debug!(provider = %provider, model = %model, "Using cached pricing");
            self.pricing = Some(hit);
        } else if let Some(source) = source {
            self.pricing_fetch = Some(spawn_fetch(cache, source, provider.clone(), model.clone()));
        }
        self
    }

    pub fn with_tracer(mut self, tracer: TraceEmitter) -> Self {
        self.tracer = tracer;
        self
    }

    /// Observe (and optionally abort after) every non-terminating tool call.
    pub fn with_callback(mut self, callback: Arc<dyn ToolCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// A handle that cancels this execution from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Request cancellation. Takes effect at the next check point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The UUID identifying this execution in logs and traces.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Accumulated token usage.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Current failure count for a router tool.
    pub fn error_count(&self, tool: &str) -> u32 {
        self.error_counts.get(tool).copied().unwrap_or(0)
    }

    /// Run the manifest to completion, cancellation, or failure.
    pub async fn execute(&mut self) -> ExecutionResult {
        let manifest_name = self
            .manifest
            .name
            .clone()
            .or_else(|| self.manifest.id.clone())
            .unwrap_or_else(|| "unnamed".into());
        let span = info_span!("execution", run_id = %self.run_id, manifest = %manifest_name);

        let outcome = self.run().instrument(span).await;
        let usage = self.usage_summary();
        let messages = self.messages.clone();

        match outcome {
            Ok(RunOutcome::Completed(result)) => {
                info!(
                    run_id = %self.run_id,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    cost_usd = usage.total_cost_usd,
                    "Execution completed"
                );
                ExecutionResult::completed(result, usage, messages)
            }
            Ok(RunOutcome::Cancelled) => {
                info!(run_id = %self.run_id, "Execution cancelled");
                ExecutionResult::cancelled(usage, messages)
            }
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Execution failed");
                ExecutionResult::failed(e.to_string(), usage, messages)
            }
        }
    }

    async fn run(&mut self) -> Result<RunOutcome> {
        self.messages.clear();
        self.error_counts.clear();
        self.usage = Usage::default();

        // ── validating ──
        self.bindings = self.bind_variables()?;

        // ── first turn ──
        let (system, user) = {
            let renderer = TemplateRenderer::new(&self.manifest.blocks)
                .with_max_depth(self.settings.max_block_depth);
            (
                renderer.render(&self.manifest.system, &self.bindings),
                renderer.render(&self.manifest.user, &self.bindings),
            )
        };
        let user = self.user_content(user);
        self.messages.push(Message::system(system));
        self.messages.push(Message::user(user));

        let tools = self.tool_set();
        let initial_choice = self.settings.tool_choice.clone();

        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        self.invoke_turn(&tools, initial_choice.clone()).await?;

        let calls = self.last_tool_calls();
        if calls.is_empty() {
            if tools.is_empty() || self.router.is_none() {
                return Ok(RunOutcome::Completed(Value::String(self.last_text())));
            }
            return Err(Error::NoTerminatingCall(self.settings.finish_tool.clone()));
        }

        if self.router.is_none() && !calls.iter().any(|c| self.is_scenario_call(c)) {
            debug!(tool = %calls[0].name, "No tool router, returning tool call arguments directly");
            return Ok(RunOutcome::Completed(calls[0].arguments.clone()));
        }

        // ── tool loop ──
        loop {
            if self.cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            let calls = self.last_tool_calls();
            if calls.is_empty() {
                return Err(Error::NoTerminatingCall(self.settings.finish_tool.clone()));
            }

            if self.messages.len() >= self.settings.max_messages {
                return Err(Error::MessageLimit {
                    limit: self.settings.max_messages,
                });
            }

            debug!(count = calls.len(), messages = self.messages.len(), "Executing tool calls");

            let mut finished: Option<Value> = None;
            let mut forced: Option<String> = None;

            for call in &calls {
                let terminating = call.name == self.settings.finish_tool;
                let result = self.dispatch(call).await?;
                self.messages.push(Message::tool_result(call, &result));

                let outcome = ToolOutcome(&result);
                if let Some(next) = outcome.force_next_tool() {
                    forced = Some(next.to_string());
                }

                if terminating {
                    if outcome.is_rejected() {
                        debug!(tool = %call.name, "Terminating call rejected, continuing");
                    } else if finished.is_none() {
                        finished = Some(call.arguments.clone());
                    }
                    continue;
                }

                if let Some(callback) = self.callback.clone() {
                    if self.cancel.is_cancelled() {
                        return Ok(RunOutcome::Cancelled);
                    }
                    if callback.on_tool_call(call, &result).await == CallbackSignal::Abort {
                        info!(tool = %call.name, "Callback aborted execution");
                        self.cancel.cancel();
                    }
                    if self.cancel.is_cancelled() {
                        return Ok(RunOutcome::Cancelled);
                    }
                }
            }

            if let Some(result) = finished {
                return Ok(RunOutcome::Completed(result));
            }

            let choice = match forced {
                Some(tool) => {
                    debug!(tool = %tool, "Forcing tool for next turn");
                    ToolChoice::Tool(tool)
                }
                None => initial_choice.clone(),
            };
            self.invoke_turn(&tools, choice).await?;
        }
    }

    /// Apply defaults and check every declared variable.
    fn bind_variables(&self) -> Result<Bindings> {
        let mut bindings = self.variables.clone();

        for decl in &self.manifest.variables {
            match bindings.get(&decl.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    if !decl.kind.accepts(value) {
                        return Err(Error::InvalidVariable {
                            name: decl.name.clone(),
                            expected: decl.kind.to_string(),
                        });
                    }
                }
                None => {
                    if let Some(default) = &decl.default {
                        bindings.insert(decl.name.clone(), default.clone());
                    } else if decl.required {
                        return Err(Error::MissingVariable(decl.name.clone()));
                    }
                }
            }
        }

        Ok(bindings)
    }

    fn user_content(&self, text: String) -> Content {
        if self.attachments.is_empty() {
            return Content::Text(text);
        }
        let mut parts = vec![ContentPart::text(text)];
        parts.extend(self.attachments.iter().cloned());
        Content::Parts(parts)
    }

    /// Manifest tools plus the built-ins not already declared.
    fn tool_set(&self) -> Vec<ToolDeclaration> {
        let mut tools = self.manifest.tools.clone();
        let has_scenarios = !self.manifest.scenarios.is_empty();

        if has_scenarios {
            for decl in builtin::scenario_declarations() {
                if !decl.name().is_some_and(|n| self.manifest.declares_tool(n)) {
                    tools.push(decl);
                }
            }
        }

        let finish = &self.settings.finish_tool;
        if (!self.manifest.tools.is_empty() || has_scenarios) && !self.manifest.declares_tool(finish) {
            tools.push(builtin::finish_declaration(finish));
        }

        tools
    }

    fn is_scenario_call(&self, call: &ToolCall) -> bool {
        !self.manifest.scenarios.is_empty() && builtin::is_scenario_tool(&call.name)
    }

    fn last_tool_calls(&self) -> Vec<ToolCall> {
        match self.messages.last() {
            Some(msg) if self.provider.has_tool_calls(msg) => msg.tool_calls.clone(),
            _ => Vec::new(),
        }
    }

    fn last_text(&self) -> String {
        self.messages.last().map(|m| m.text()).unwrap_or_default()
    }

    /// Resolve one tool call: terminating tool, scenario tools, then router.
    async fn dispatch(&mut self, call: &ToolCall) -> Result<Value> {
        let name = call.name.as_str();
        let handler = self.router.as_ref().and_then(|r| r.get(name));

        if name == self.settings.finish_tool && handler.is_none() {
            return Ok(call.arguments.clone());
        }

        if self.is_scenario_call(call) {
            let started = Instant::now();
            let output = if name == builtin::LIST_SCENARIOS {
                builtin::list_scenarios(&self.manifest.scenarios)
            } else {
                builtin::get_scenario_instructions(&self.manifest.scenarios, &call.arguments)
            };
            self.trace_tool(call, &output, started);
            return Ok(output);
        }

        let Some(handler) = handler else {
            warn!(tool = name, "Tool not found");
            return Ok(json!({
                "error": true,
                "message": format!("Tool not found: {name}"),
            }));
        };

        match handler.execute(call.arguments.clone()).await {
            Ok(value) => {
                self.error_counts.remove(name);
                Ok(value)
            }
            Err(e) => {
                let count = self.error_counts.entry(name.to_string()).or_insert(0);
                *count += 1;
                if *count >= self.settings.max_tool_failures {
                    warn!(tool = name, failures = *count, error = %e, "Tool failure limit reached");
                    return Err(e.into());
                }
                warn!(tool = name, failures = *count, error = %e, "Tool failed, reporting to model");
                Ok(json!({
                    "error": true,
                    "message": e.to_string(),
                }))
            }
        }
    }

    async fn invoke_turn(&mut self, tools: &[ToolDeclaration], tool_choice: ToolChoice) -> Result<()> {
        let options = InvokeOptions {
            tools: tools.to_vec(),
            tool_choice,
        };

        debug!(
            provider = %self.provider.name(),
            model = %self.provider.model(),
            messages = self.messages.len(),
            tool_choice = %options.tool_choice,
            "Invoking provider"
        );

        let started = Instant::now();
        let response = self.provider.invoke(&self.messages, &options).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.usage.input_tokens += response.usage.input_tokens;
        self.usage.output_tokens += response.usage.output_tokens;

        let pricing = self.resolve_pricing().await;
        if self.tracer.is_enabled() {
            self.tracer.emit_turn(TurnTrace {
                run_id: self.run_id.clone(),
                timestamp: Utc::now(),
                provider: self.pricing_key.0.clone(),
                model: self.pricing_key.1.clone(),
                manifest: serde_json::to_value(&self.manifest).unwrap_or_default(),
                variables: Value::Object(self.bindings.clone()),
                messages: self.messages.get(2..).unwrap_or_default().to_vec(),
                response: response.message.clone(),
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
                cost_usd: pricing.cost(response.usage.input_tokens, response.usage.output_tokens),
                duration_ms,
            });
        }

        self.messages.push(response.message);
        Ok(())
    }

    fn trace_tool(&self, call: &ToolCall, output: &Value, started: Instant) {
        if !self.tracer.is_enabled() {
            return;
        }
        let status = if ToolOutcome(output).is_rejected() {
            ToolStatus::Error
        } else {
            ToolStatus::Success
        };
        self.tracer.emit_tool(ToolTrace {
            run_id: self.run_id.clone(),
            timestamp: Utc::now(),
            tool_name: call.name.clone(),
            input: call.arguments.clone(),
            output: output.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            status,
        });
    }

    /// Await any in-flight pricing fetch, then return the active pricing.
    async fn resolve_pricing(&mut self) -> ModelPricing {
        if let Some(fetch) = self.pricing_fetch.take() {
            match fetch.await {
                Ok(Some(pricing)) => {
                    debug!(model = %pricing.model, "Pricing resolved");
                    self.pricing = Some(pricing);
                }
                Ok(None) => debug!("No pricing found, using default rate"),
                Err(e) => warn!(error = %e, "Pricing task failed, using default rate"),
            }
        }
        self.active_pricing()
    }

    fn active_pricing(&self) -> ModelPricing {
        self.pricing.clone().unwrap_or_else(|| {
            let (provider, model) = &self.pricing_key;
            ModelPricing::new(provider, model, self.default_rate.0, self.default_rate.1)
        })
    }

    fn usage_summary(&self) -> UsageSummary {
        UsageSummary {
            input_tokens: self.usage.input_tokens,
            output_tokens: self.usage.output_tokens,
            total_cost_usd: self
                .active_pricing()
                .cost(self.usage.input_tokens, self.usage.output_tokens),
        }
    }
}
