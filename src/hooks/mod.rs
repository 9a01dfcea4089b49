//! Hook pipeline: ordered observation/interception callbacks around dispatch.
//!
//! The callback lists are assembled before the coordinator starts and frozen
//! behind an `Arc`; dispatch only ever reads them. Every stage is
//! observational except `OnRequestInitialization`, which may veto a session's
//! initialization.

use crate::protocol::types::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, RequestId,
};
use serde_json::Value;
use std::borrow::Cow;
use tracing::trace;

/// Named interception points in the request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeAny,
    OnSuccess,
    OnError,
    BeforeInitialize,
    AfterInitialize,
    OnRequestInitialization,
    BeforeCallTool,
    AfterCallTool,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeAny => "before_any",
            Self::OnSuccess => "on_success",
            Self::OnError => "on_error",
            Self::BeforeInitialize => "before_initialize",
            Self::AfterInitialize => "after_initialize",
            Self::OnRequestInitialization => "on_request_initialization",
            Self::BeforeCallTool => "before_call_tool",
            Self::AfterCallTool => "after_call_tool",
        }
    }
}

/// What every callback gets to see about the request being processed.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub request_id: Option<RequestId>,
    pub method: String,
    pub params: Option<Value>,
}

/// Rejection returned by an `OnRequestInitialization` callback.
#[derive(Debug, Clone)]
pub struct InitializeVeto {
    pub reason: Cow<'static, str>,
}

impl InitializeVeto {
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

type ObserverHook = Box<dyn Fn(&HookEvent) + Send + Sync>;
type SuccessHook = Box<dyn Fn(&HookEvent, &Value) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&HookEvent, &JsonRpcError) + Send + Sync>;
type AfterInitializeHook = Box<dyn Fn(&HookEvent, &InitializeResult) + Send + Sync>;
type GateHook = Box<dyn Fn(&HookEvent) -> Result<(), InitializeVeto> + Send + Sync>;
type BeforeCallToolHook = Box<dyn Fn(&HookEvent, &CallToolParams) + Send + Sync>;
type AfterCallToolHook = Box<dyn Fn(&HookEvent, &CallToolParams, &CallToolResult) + Send + Sync>;

/// The pipeline itself: one ordered callback list per stage.
#[derive(Default)]
pub struct Hooks {
    before_any: Vec<ObserverHook>,
    on_success: Vec<SuccessHook>,
    on_error: Vec<ErrorHook>,
    before_initialize: Vec<ObserverHook>,
    after_initialize: Vec<AfterInitializeHook>,
    on_request_initialization: Vec<GateHook>,
    before_call_tool: Vec<BeforeCallToolHook>,
    after_call_tool: Vec<AfterCallToolHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_before_any(&mut self, hook: impl Fn(&HookEvent) + Send + Sync + 'static) {
        self.before_any.push(Box::new(hook));
    }

    pub fn add_on_success(&mut self, hook: impl Fn(&HookEvent, &Value) + Send + Sync + 'static) {
        self.on_success.push(Box::new(hook));
    }

    pub fn add_on_error(
        &mut self,
        hook: impl Fn(&HookEvent, &JsonRpcError) + Send + Sync + 'static,
    ) {
        self.on_error.push(Box::new(hook));
    }

    pub fn add_before_initialize(&mut self, hook: impl Fn(&HookEvent) + Send + Sync + 'static) {
        self.before_initialize.push(Box::new(hook));
    }

    pub fn add_after_initialize(
        &mut self,
        hook: impl Fn(&HookEvent, &InitializeResult) + Send + Sync + 'static,
    ) {
        self.after_initialize.push(Box::new(hook));
    }

    pub fn add_on_request_initialization(
        &mut self,
        hook: impl Fn(&HookEvent) -> Result<(), InitializeVeto> + Send + Sync + 'static,
    ) {
        self.on_request_initialization.push(Box::new(hook));
    }

    pub fn add_before_call_tool(
        &mut self,
        hook: impl Fn(&HookEvent, &CallToolParams) + Send + Sync + 'static,
    ) {
        self.before_call_tool.push(Box::new(hook));
    }

    pub fn add_after_call_tool(
        &mut self,
        hook: impl Fn(&HookEvent, &CallToolParams, &CallToolResult) + Send + Sync + 'static,
    ) {
        self.after_call_tool.push(Box::new(hook));
    }

    pub fn run_before_any(&self, event: &HookEvent) {
        trace!(stage = HookStage::BeforeAny.as_str(), method = %event.method, "Running hooks");
        for hook in &self.before_any {
            hook(event);
        }
    }

    pub fn run_on_success(&self, event: &HookEvent, result: &Value) {
        trace!(stage = HookStage::OnSuccess.as_str(), method = %event.method, "Running hooks");
        for hook in &self.on_success {
            hook(event, result);
        }
    }

    pub fn run_on_error(&self, event: &HookEvent, error: &JsonRpcError) {
        trace!(stage = HookStage::OnError.as_str(), method = %event.method, "Running hooks");
        for hook in &self.on_error {
            hook(event, error);
        }
    }

    pub fn run_before_initialize(&self, event: &HookEvent) {
        trace!(stage = HookStage::BeforeInitialize.as_str(), "Running hooks");
        for hook in &self.before_initialize {
            hook(event);
        }
    }

    pub fn run_after_initialize(&self, event: &HookEvent, result: &InitializeResult) {
        trace!(stage = HookStage::AfterInitialize.as_str(), "Running hooks");
        for hook in &self.after_initialize {
            hook(event, result);
        }
    }

    /// Run the initialization gate.
    ///
    /// Every registered callback runs, even after a veto has been recorded;
    /// the first veto is the one returned.
    pub fn run_on_request_initialization(&self, event: &HookEvent) -> Result<(), InitializeVeto> {
        trace!(
            stage = HookStage::OnRequestInitialization.as_str(),
            "Running hooks"
        );
        let mut veto = None;
        for hook in &self.on_request_initialization {
            if let Err(rejection) = hook(event) {
                trace!(reason = %rejection.reason, "Initialization vetoed");
                veto.get_or_insert(rejection);
            }
        }
        match veto {
            Some(rejection) => Err(rejection),
            None => Ok(()),
        }
    }

    pub fn run_before_call_tool(&self, event: &HookEvent, params: &CallToolParams) {
        trace!(stage = HookStage::BeforeCallTool.as_str(), tool = %params.name, "Running hooks");
        for hook in &self.before_call_tool {
            hook(event, params);
        }
    }

    pub fn run_after_call_tool(
        &self,
        event: &HookEvent,
        params: &CallToolParams,
        result: &CallToolResult,
    ) {
        trace!(stage = HookStage::AfterCallTool.as_str(), tool = %params.name, "Running hooks");
        for hook in &self.after_call_tool {
            hook(event, params, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event(method: &str) -> HookEvent {
        HookEvent {
            request_id: Some(1.into()),
            method: method.into(),
            params: None,
        }
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut hooks = Hooks::new();
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            hooks.add_before_any(move |_| order.lock().push(tag));
        }

        hooks.run_before_any(&event("ping"));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_veto_aborts_initialization() {
        let mut hooks = Hooks::new();
        hooks.add_on_request_initialization(|_| Err(InitializeVeto::new("not allowed")));

        let veto = hooks
            .run_on_request_initialization(&event("initialize"))
            .unwrap_err();
        assert_eq!(veto.reason, "not allowed");
    }

    #[test]
    fn test_veto_does_not_skip_later_callbacks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut hooks = Hooks::new();
        hooks.add_on_request_initialization(|_| Err(InitializeVeto::new("first veto")));
        {
            let calls = Arc::clone(&calls);
            hooks.add_on_request_initialization(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        hooks.add_on_request_initialization(|_| Err(InitializeVeto::new("second veto")));

        let veto = hooks
            .run_on_request_initialization(&event("initialize"))
            .unwrap_err();
        // First veto wins, but every callback still ran.
        assert_eq!(veto.reason, "first veto");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_gate_allows() {
        let hooks = Hooks::new();
        assert!(hooks.run_on_request_initialization(&event("initialize")).is_ok());
    }
}
