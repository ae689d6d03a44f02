//! The agent core: one conversation, one turn at a time.
//!
//! A turn adds the user message, picks a model and then alternates model
//! calls and tool rounds until the model answers without tool calls or the
//! round bound is hit. Model calls go through [`Failover`]; tool calls go
//! through the approval policy and then the [`Dispatcher`].

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use bonza_config::AppConfig;
use bonza_core::context::{ConversationContext, InMemoryContext};
use bonza_core::error::ProviderError;
use bonza_core::event::{AgentEvent, Observers};
use bonza_core::message::{Message, MessageToolCall, Role};
use bonza_core::provider::{ModelRoute, ProviderRequest, ToolDefinition, default_temperature};
use bonza_core::tool::ToolRegistry;
use bonza_core::util::truncate_chars;
use bonza_core::{AutonomySettings, AutonomySnapshot, TrustLevel};
use bonza_providers::{Failover, ProviderRouter, build_from_config};
use bonza_security::scope::home_dir;
use bonza_security::{AuditSink, AutoReason, Decision, PolicyInput, ProjectLog, ShellEnv, decide};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::approval::{ApprovalHandler, ApprovalNotifier};
use crate::attachments::build_user_content;
use crate::dispatcher::Dispatcher;
use crate::notify::TelegramNotifier;
use crate::prompt::system_prompt;
use crate::selector::{FixedModelSelector, ModelSelector};
use crate::stream::{Aggregate, aggregate};

/// Returned in place of an answer when a turn runs out of tool rounds.
pub const CUTOFF_MESSAGE: &str =
    "I've made too many tool calls in this turn. Let me give you what I have so far.";

/// Tool result recorded when the user declines a call.
pub const REJECTED_MESSAGE: &str = "❌ Execution rejected by user.";

const NEW_CHAT_SUGGESTION: &str =
    "💡 This conversation is getting long. Consider starting a new chat with /newchat";

/// Tunables for the turn loop.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Upper bound on model calls per turn
    pub max_tool_iterations: usize,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Model used when neither the user nor the selector picks one
    pub default_model: String,
    /// Replaces the built-in system prompt when set
    pub system_prompt: Option<String>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_tool_iterations: 25,
            temperature: default_temperature(),
            max_tokens: Some(4096),
            default_model: "llama-3.3-70b".into(),
            system_prompt: None,
        }
    }
}

impl AgentOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_tool_iterations: config.agent.max_tool_iterations,
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            default_model: config.default_model.clone(),
            system_prompt: None,
        }
    }
}

/// Snapshot of the session for `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStats {
    pub chat_id: String,
    pub model_override: Option<String>,
    pub selector_mode: String,
    pub trust_level: TrustLevel,
    pub providers: Vec<String>,
    pub tools: usize,
    pub messages: usize,
    pub context_tokens: usize,
}

pub struct AgentCore {
    router: ProviderRouter,
    failover: Failover,
    dispatcher: Dispatcher,
    settings: Arc<AutonomySettings>,
    context: Arc<dyn ConversationContext>,
    observers: Observers,
    selector: Box<dyn ModelSelector>,
    approval: RwLock<Option<Arc<dyn ApprovalHandler>>>,
    notifier: Option<Arc<dyn ApprovalNotifier>>,
    options: AgentOptions,
    model_override: RwLock<Option<String>>,
    chat_id: RwLock<String>,
    turn_lock: tokio::sync::Mutex<()>,
}

impl AgentCore {
    /// Create an agent and install the system prompt into `context`.
    pub fn new(
        router: ProviderRouter,
        tools: ToolRegistry,
        settings: Arc<AutonomySettings>,
        context: Arc<dyn ConversationContext>,
        options: AgentOptions,
    ) -> Self {
        let agent = Self {
            router,
            failover: Failover::disabled(),
            dispatcher: Dispatcher::new(tools),
            settings,
            context,
            observers: Observers::new(),
            selector: Box::new(FixedModelSelector::new(&options.default_model)),
            approval: RwLock::new(None),
            notifier: None,
            options,
            model_override: RwLock::new(None),
            chat_id: RwLock::new(new_chat_id()),
            turn_lock: tokio::sync::Mutex::new(()),
        };

        let has_system = agent
            .context
            .messages(true)
            .first()
            .is_some_and(|m| m.role == Role::System);
        if !has_system {
            agent.install_system_prompt();
        }
        agent
    }

    /// Wire an agent from configuration: providers, fallback, autonomy
    /// settings, an in-memory context and the Telegram notifier.
    pub fn from_config(config: &AppConfig, tools: ToolRegistry) -> Self {
        let (router, fallback) = build_from_config(config);
        let settings = Arc::new(config.autonomy.to_settings());
        let context = Arc::new(InMemoryContext::new(config.agent.new_chat_threshold_tokens));

        let mut agent = Self::new(
            router,
            tools,
            settings,
            context,
            AgentOptions::from_config(config),
        );
        if let Some(route) = fallback {
            agent = agent.with_failover(Failover::new(route));
        }
        if let Some(notifier) = TelegramNotifier::from_config(&config.notifications.telegram) {
            agent = agent.with_notifier(Arc::new(notifier));
        }
        agent
    }

    pub fn with_failover(mut self, failover: Failover) -> Self {
        self.failover = failover;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.dispatcher = self.dispatcher.with_audit_sink(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ApprovalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_selector(mut self, selector: Box<dyn ModelSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Register the handler asked about gated tool calls. Without one,
    /// gated calls run unasked.
    pub fn set_approval_handler(&self, handler: Arc<dyn ApprovalHandler>) {
        *self.approval.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn settings(&self) -> &Arc<AutonomySettings> {
        &self.settings
    }

    pub fn context(&self) -> &Arc<dyn ConversationContext> {
        &self.context
    }

    pub fn chat_id(&self) -> String {
        self.chat_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one full turn for `message` and return the assistant's answer.
    ///
    /// Turns are serialized; a second caller waits for the first to finish.
    pub async fn chat(&self, message: &str, stream: bool) -> Result<String, ProviderError> {
        let _turn = self.turn_lock.lock().await;
        let started = Instant::now();

        self.context
            .add_message(Message::user(build_user_content(message)));

        let model_override = self.model_override();
        let model = self.selector.select(message, model_override.as_deref());
        self.observers.emit(AgentEvent::Model(model.clone()));

        let reply = self.run_loop(&model, stream).await?;
        self.context.add_message(Message::assistant(reply.clone()));

        info!(
            model = %model,
            duration_ms = started.elapsed().as_millis() as u64,
            "Turn complete"
        );

        if self.context.needs_new_chat() {
            self.observers
                .emit(AgentEvent::Suggestion(NEW_CHAT_SUGGESTION.into()));
        }

        Ok(reply)
    }

    /// Run the tool loop on the current context without adding a user message.
    pub async fn run_turn(&self, model: &str, stream: bool) -> Result<String, ProviderError> {
        let _turn = self.turn_lock.lock().await;
        self.run_loop(model, stream).await
    }

    /// Drop the history and start over with a fresh chat id.
    ///
    /// Waits for a turn in progress to finish.
    pub async fn new_chat(&self) {
        let _turn = self.turn_lock.lock().await;
        self.context.clear();
        self.install_system_prompt();
        *self.chat_id.write().unwrap_or_else(PoisonError::into_inner) = new_chat_id();
        info!(chat_id = %self.chat_id(), "New chat");
        self.observers
            .emit(AgentEvent::Info("🔄 New chat started".into()));
    }

    /// Replace the history with `messages` under `chat_id`.
    ///
    /// System messages in `messages` are ignored; the current system
    /// prompt is installed instead. Waits for a turn in progress to finish.
    pub async fn load_chat(&self, chat_id: impl Into<String>, messages: Vec<Message>) {
        let _turn = self.turn_lock.lock().await;
        self.context.clear();
        self.install_system_prompt();

        let mut loaded = 0;
        for message in messages.into_iter().filter(|m| m.role != Role::System) {
            self.context.add_message(message);
            loaded += 1;
        }

        *self.chat_id.write().unwrap_or_else(PoisonError::into_inner) = chat_id.into();
        self.observers.emit(AgentEvent::Info(format!(
            "🔄 Loaded chat history ({loaded} messages)"
        )));
    }

    /// Pin the model for later turns. An empty name or `auto` hands the
    /// choice back to the selector. Takes effect from the next turn.
    pub async fn set_model(&self, name: &str) {
        let _turn = self.turn_lock.lock().await;
        let name = name.trim();
        let value = (!name.is_empty() && name != "auto").then(|| name.to_string());
        *self
            .model_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value;

        let shown = if name.is_empty() { "auto" } else { name };
        self.observers
            .emit(AgentEvent::Info(format!("Model set to: {shown}")));
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            chat_id: self.chat_id(),
            model_override: self.model_override(),
            selector_mode: self.selector.mode().to_string(),
            trust_level: self.settings.trust_level(),
            providers: self.router.list().into_iter().map(String::from).collect(),
            tools: self.dispatcher.count(),
            messages: self.context.messages(true).len(),
            context_tokens: self.context.estimated_tokens(),
        }
    }

    fn model_override(&self) -> Option<String> {
        self.model_override
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn approval_handler(&self) -> Option<Arc<dyn ApprovalHandler>> {
        self.approval
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install_system_prompt(&self) {
        let prompt = self
            .options
            .system_prompt
            .clone()
            .unwrap_or_else(|| system_prompt(None));
        self.context.add_message(Message::system(prompt));
    }

    async fn run_loop(&self, model: &str, stream: bool) -> Result<String, ProviderError> {
        let mut route = self.resolve_route(model)?;
        let definitions = self.dispatcher.definitions();
        let definitions = definitions.as_slice();

        for round in 1..=self.options.max_tool_iterations {
            let attempt = self
                .failover
                .call(&route, &self.observers, move |r| {
                    self.call_model(r, stream, definitions)
                })
                .await?;

            // Once the fallback answers, it serves the rest of the turn.
            if let Some(next) = attempt.switched_to {
                route = next;
            }

            let reply = attempt.value;
            if !reply.has_tool_calls() {
                return Ok(reply.text);
            }

            debug!(round, calls = reply.tool_calls.len(), "Model requested tools");
            self.execute_tool_calls(reply).await;
        }

        warn!(
            max = self.options.max_tool_iterations,
            "Tool round limit reached, ending turn"
        );
        Ok(CUTOFF_MESSAGE.to_string())
    }

    fn resolve_route(&self, model: &str) -> Result<ModelRoute, ProviderError> {
        match self.router.resolve(model) {
            Ok(route) => Ok(route),
            Err(e) => {
                let Some(fallback) = self.failover.fallback() else {
                    return Err(e);
                };
                warn!(model, error = %e, "Model unroutable, using fallback");
                self.observers.emit(AgentEvent::Info(format!(
                    "⚠️ {model} unavailable ({}). Falling back to {}...",
                    e.kind(),
                    fallback.provider_name()
                )));
                Ok(fallback.clone())
            }
        }
    }

    async fn call_model(
        &self,
        route: ModelRoute,
        stream: bool,
        definitions: &[ToolDefinition],
    ) -> Result<Aggregate, ProviderError> {
        let started = Instant::now();
        let request = ProviderRequest {
            model: route.model.clone(),
            messages: self.context.messages(route.supports_tools),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            tools: if route.supports_tools {
                definitions.to_vec()
            } else {
                Vec::new()
            },
            stream,
        };

        let reply = if stream {
            let rx = route.provider.stream(request).await?;
            aggregate(rx, &self.observers).await?
        } else {
            Aggregate::from_response(route.provider.complete(request).await?)
        };

        debug!(
            provider = %route.provider_name(),
            model = %route.model,
            duration_ms = started.elapsed().as_millis() as u64,
            "Model call finished"
        );
        Ok(reply)
    }

    async fn execute_tool_calls(&self, reply: Aggregate) {
        let calls: Vec<MessageToolCall> = reply
            .tool_calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = format!("tc_{}", Uuid::new_v4().simple());
                }
                call
            })
            .collect();

        self.context
            .add_message(Message::assistant_tool_calls(reply.text, calls.clone()));

        for call in &calls {
            let arguments = parse_arguments(&call.arguments);
            self.observers.emit(AgentEvent::ToolStart(format!(
                "🔧 Running: {}({})",
                call.name,
                truncate_chars(&arguments.to_string(), 100)
            )));

            // Fresh per call so trust changes made mid-turn apply.
            let snapshot = self.settings.snapshot();

            let result = if self.approve(&call.name, &arguments, &snapshot).await {
                self.dispatcher.execute(&call.name, arguments.clone()).await
            } else {
                REJECTED_MESSAGE.to_string()
            };

            self.observers.emit(AgentEvent::ToolResult(format!(
                "✅ {}: {}",
                call.name,
                truncate_chars(&result, 200)
            )));

            if let Some(scope) = snapshot.active_scope() {
                ProjectLog::new(scope).append(&call.name, &arguments, &result);
            }

            self.context
                .add_message(Message::tool_result(&call.id, result));
        }

        info!(
            count = calls.len(),
            trust = %self.settings.trust_level(),
            "Executed tool calls"
        );
    }

    async fn approve(&self, tool_name: &str, arguments: &Value, snapshot: &AutonomySnapshot) -> bool {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let home = home_dir();
        let env = ShellEnv {
            cwd: &cwd,
            home: home.as_deref(),
        };

        let decision = decide(
            snapshot,
            &PolicyInput {
                tool_name,
                arguments,
                env: &env,
            },
        );
        debug!(tool = tool_name, decision = decision.tag(), "Approval decision");

        let command = arguments
            .get("command")
            .or_else(|| arguments.get("code"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let prompt = match decision {
            Decision::Auto(reason) => {
                let notice = match reason {
                    AutoReason::Autonomous => Some(format!(
                        "⚡ [autonomous] Running: {}",
                        truncate_chars(command, 80)
                    )),
                    AutoReason::Scope => {
                        Some(format!("⚡ [auto] Running: {}", truncate_chars(command, 80)))
                    }
                    AutoReason::Code if snapshot.trust_level == TrustLevel::Autonomous => {
                        Some("⚡ [autonomous] Running code...".to_string())
                    }
                    _ => None,
                };
                if let Some(notice) = notice {
                    self.observers.emit(AgentEvent::Info(notice));
                }
                return true;
            }
            Decision::Ask { prompt, .. } => prompt,
        };

        let Some(handler) = self.approval_handler() else {
            warn!(tool = tool_name, "No approval handler registered, running unasked");
            return true;
        };

        self.observers
            .emit(AgentEvent::ApprovalRequired(prompt.clone()));

        if snapshot.notify_on_pending
            && let Some(notifier) = self.notifier.clone()
        {
            let tool = tool_name.to_string();
            let command = command.to_string();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_pending(&tool, &command).await {
                    debug!(error = %e, "Approval notification failed");
                }
            });
        }

        let approved = handler.approve(&prompt).await;
        info!(tool = tool_name, approved, "Approval answered");
        approved
    }
}

fn new_chat_id() -> String {
    format!("chat_{}", Uuid::new_v4().simple())
}

/// Parse model-produced arguments; anything but a JSON object becomes `{}`.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => {
            warn!("Failed to parse tool args: {}", truncate_chars(raw, 100));
            Value::Object(Default::default())
        }
    }
}
