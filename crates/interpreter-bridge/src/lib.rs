//! Owns the single interpreter instance a document's execution passes share.
//!
//! The interpreter is a pure-Rust, sandboxed JavaScript engine (`boa_engine`). It hosts
//! user-authored expression text — advanced filter predicates and `polars_code` bodies —
//! and the named bindings the Execution Engine wires up for each node. `boa_engine`'s
//! `Context` is not `Send`: this mirrors the single-threaded cooperative scheduling model
//! the rest of the engine assumes (only one logical task ever touches the interpreter),
//! so the bridge is deliberately usable only from a current-thread runtime.

use std::sync::Arc;

use boa_engine::{Context, JsValue, Source};
use tokio::sync::{Mutex, RwLock};

mod error;
pub use error::BridgeError;

/// The interpreter's lifecycle state, mirrored from the gateway pattern this bridge is
/// modelled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialised,
    Initialising,
    Ready,
    Failed,
}

/// Native stand-in for the browser's COOP/COEP isolation check: the interpreter refuses
/// to start unless the host confirms it is running in a cross-origin-isolated context.
#[derive(Debug, Clone, Copy)]
pub struct HostEnvironment {
    pub cross_origin_isolated: bool,
}

/// Single-process, single-threaded collaborator wrapping the sandboxed interpreter.
/// All exec/eval calls are serialised through one `tokio::sync::Mutex` — `RwLock` would
/// be wrong here because the concurrency model requires a second caller to *wait*, not
/// read concurrently, while a node's source runs.
pub struct InterpreterBridge {
    state: Arc<RwLock<BridgeState>>,
    context: Arc<Mutex<Option<Context>>>,
}

impl Default for InterpreterBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterBridge {
    pub fn new() -> Self {
        Self { state: Arc::new(RwLock::new(BridgeState::Uninitialised)), context: Arc::new(Mutex::new(None)) }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> BridgeState {
        *self.state.read().await
    }

    pub async fn is_ready(&self) -> bool {
        *self.state.read().await == BridgeState::Ready
    }

    /// Bring the interpreter up. Fails immediately with `HostNotIsolated` if the host
    /// environment is not isolated, before ever constructing the interpreter.
    pub async fn initialise(&self, env: HostEnvironment) -> Result<(), BridgeError> {
        if !env.cross_origin_isolated {
            *self.state.write().await = BridgeState::Failed;
            return Err(BridgeError::HostNotIsolated);
        }

        *self.state.write().await = BridgeState::Initialising;
        let ctx = Context::default();
        *self.context.lock().await = Some(ctx);
        *self.state.write().await = BridgeState::Ready;
        log::info!(target: "interpreter_bridge", "interpreter ready");
        Ok(())
    }

    /// Tear the interpreter down. Idempotent.
    pub async fn stop(&self) {
        *self.context.lock().await = None;
        *self.state.write().await = BridgeState::Uninitialised;
    }

    /// Execute `source` for side effects (global bindings it introduces persist).
    pub async fn exec(&self, source: &str) -> Result<(), BridgeError> {
        self.eval(source).await.map(|_| ())
    }

    /// Evaluate `source` and return its value as JSON.
    pub async fn eval(&self, source: &str) -> Result<serde_json::Value, BridgeError> {
        self.require_ready().await?;
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(BridgeError::NotReady)?;
        let value = ctx
            .eval(Source::from_bytes(source))
            .map_err(|e| BridgeError::Exec(e.to_string()))?;
        js_value_to_json(&value, ctx)
    }

    /// Bind `value` as a global under `name`.
    pub async fn set_global(&self, name: &str, value: &serde_json::Value) -> Result<(), BridgeError> {
        self.require_ready().await?;
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(BridgeError::NotReady)?;
        let js_value = json_to_js_value(value, ctx)?;
        ctx.global_object().set(boa_engine::JsString::from(name), js_value, false, ctx).map_err(|e| BridgeError::Exec(e.to_string()))?;
        Ok(())
    }

    /// Remove a previously-bound global. Used to unbind scratch `__file_` globals after
    /// a node consumes them, and to clear `df_`-prefixed bindings on document teardown.
    pub async fn del_global(&self, name: &str) -> Result<(), BridgeError> {
        self.require_ready().await?;
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(BridgeError::NotReady)?;
        ctx.global_object().delete_property_or_throw(boa_engine::JsString::from(name), ctx).map_err(|e| BridgeError::Exec(e.to_string()))?;
        Ok(())
    }

    async fn require_ready(&self) -> Result<(), BridgeError> {
        if !self.is_ready().await {
            return Err(BridgeError::NotReady);
        }
        Ok(())
    }
}

fn js_value_to_json(value: &JsValue, ctx: &mut Context) -> Result<serde_json::Value, BridgeError> {
    value.to_json(ctx).map_err(|e| BridgeError::Exec(e.to_string()))
}

fn json_to_js_value(value: &serde_json::Value, ctx: &mut Context) -> Result<JsValue, BridgeError> {
    JsValue::from_json(value, ctx).map_err(|e| BridgeError::Exec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated() -> HostEnvironment {
        HostEnvironment { cross_origin_isolated: true }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn uninitialised_bridge_is_not_ready() {
        let bridge = InterpreterBridge::new();
        assert_eq!(bridge.state().await, BridgeState::Uninitialised);
        assert!(!bridge.is_ready().await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn initialise_without_isolation_fails_before_starting_interpreter() {
        let bridge = InterpreterBridge::new();
        let err = bridge.initialise(HostEnvironment { cross_origin_isolated: false }).await.unwrap_err();
        assert!(matches!(err, BridgeError::HostNotIsolated));
        assert_eq!(bridge.state().await, BridgeState::Failed);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn initialise_then_eval_round_trips_json() {
        let bridge = InterpreterBridge::new();
        bridge.initialise(isolated()).await.unwrap();
        let value = bridge.eval("1 + 2").await.unwrap();
        assert_eq!(value, serde_json::json!(3));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn set_global_is_visible_to_later_eval() {
        let bridge = InterpreterBridge::new();
        bridge.initialise(isolated()).await.unwrap();
        bridge.set_global("x", &serde_json::json!(41)).await.unwrap();
        let value = bridge.eval("x + 1").await.unwrap();
        assert_eq!(value, serde_json::json!(42));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn del_global_removes_binding() {
        let bridge = InterpreterBridge::new();
        bridge.initialise(isolated()).await.unwrap();
        bridge.set_global("scratch", &serde_json::json!(1)).await.unwrap();
        bridge.del_global("scratch").await.unwrap();
        let err = bridge.eval("scratch").await.unwrap_err();
        assert!(matches!(err, BridgeError::Exec(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn eval_before_initialise_reports_not_ready() {
        let bridge = InterpreterBridge::new();
        let err = bridge.eval("1").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotReady));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stop_then_reinitialise_recovers_readiness() {
        let bridge = InterpreterBridge::new();
        bridge.initialise(isolated()).await.unwrap();
        bridge.stop().await;
        assert_eq!(bridge.state().await, BridgeState::Uninitialised);
        bridge.initialise(isolated()).await.unwrap();
        assert!(bridge.is_ready().await);
    }
}
