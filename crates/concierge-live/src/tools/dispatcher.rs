//! Resolves engine tool calls into results.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::collaborators::{ContextEnricher, EntityMemory, ToolExecutor};
use super::follow_up::follow_up_for;
use super::registry::ToolRegistry;
use super::{DispatchContext, ToolSpec};
use crate::{LiveError, ToolCall, ToolResult};

/// Result of one dispatch plus an optional proactive follow-up turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub result: ToolResult,
    pub follow_up: Option<String>,
}

pub struct ToolCallDispatcher {
    registry: Arc<dyn ToolRegistry>,
    executor: Arc<dyn ToolExecutor>,
    enricher: Arc<dyn ContextEnricher>,
    memory: Arc<dyn EntityMemory>,
}

impl ToolCallDispatcher {
    pub fn new(
        registry: Arc<dyn ToolRegistry>,
        executor: Arc<dyn ToolExecutor>,
        enricher: Arc<dyn ContextEnricher>,
        memory: Arc<dyn EntityMemory>,
    ) -> Self {
        Self {
            registry,
            executor,
            enricher,
            memory,
        }
    }

    pub fn registry(&self) -> &Arc<dyn ToolRegistry> {
        &self.registry
    }

    /// Release per-session state held by collaborators.
    pub async fn end_session(&self, session_id: &str) {
        self.memory.forget_session(session_id).await;
    }

    /// Resolve every call concurrently. Results come back in call order.
    pub async fn dispatch_all(&self, calls: &[ToolCall], ctx: &DispatchContext) -> Vec<Dispatched> {
        join_all(calls.iter().map(|call| self.resolve(call, ctx))).await
    }

    /// Resolve one call. Failures become error results; this never errors.
    pub async fn resolve(&self, call: &ToolCall, ctx: &DispatchContext) -> Dispatched {
        let Some(tool) = self.lookup(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            return Dispatched {
                result: ToolResult::failed(call, format!("Unknown tool: {}", call.name)),
                follow_up: None,
            };
        };

        let mut args = match &call.arguments {
            Value::Object(_) => call.arguments.clone(),
            Value::Null => Value::Object(Default::default()),
            other => {
                return Dispatched {
                    result: ToolResult::failed(
                        call,
                        format!("Arguments for {} must be an object, got {other}", tool.name),
                    ),
                    follow_up: None,
                };
            }
        };

        if let Some(entity) = tool.creation_entity() {
            args = self.enrich(ctx, &tool, entity, args).await;
        }
        args = self.resolve_smart_parameters(ctx, &tool, args).await;

        debug!(tool = %tool.name, call = %call.id, "Executing tool");
        match self.executor.execute(&tool, args, ctx).await {
            Ok(value) => {
                self.track(ctx, &tool, &value).await;
                let follow_up = follow_up_for(&tool.name, &value);
                info!(tool = %tool.name, call = %call.id, "Tool succeeded");
                Dispatched {
                    result: ToolResult::ok(call, value),
                    follow_up,
                }
            }
            Err(e) => {
                let message = match e {
                    LiveError::Tool(message) => message,
                    other => other.to_string(),
                };
                warn!(tool = %tool.name, call = %call.id, error = %message, "Tool failed");
                Dispatched {
                    result: ToolResult::failed(call, message),
                    follow_up: None,
                }
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<ToolSpec> {
        self.registry
            .tool(name)
            .or_else(|| self.executor.find_tool(name, &self.registry.all_tools()))
    }

    /// Merge suggested creation data into the draft. Keys the engine
    /// already filled are kept.
    async fn enrich(
        &self,
        ctx: &DispatchContext,
        tool: &ToolSpec,
        entity: &str,
        args: Value,
    ) -> Value {
        let intent = format!("create_{entity}");
        let enrichment = match self
            .enricher
            .scan_for_context(&ctx.user_id, &intent, entity, &args)
            .await
        {
            Ok(enrichment) => enrichment,
            Err(e) => {
                debug!(tool = %tool.name, error = %e, "Context enrichment failed");
                return args;
            }
        };

        let (true, Some(suggested), Value::Object(mut map)) =
            (enrichment.success, enrichment.suggested_data, args.clone())
        else {
            return args;
        };

        for (key, value) in suggested {
            let missing = match map.get(&key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                map.insert(key, value);
            }
        }
        Value::Object(map)
    }

    async fn resolve_smart_parameters(
        &self,
        ctx: &DispatchContext,
        tool: &ToolSpec,
        args: Value,
    ) -> Value {
        let session = match self
            .memory
            .get_or_create_session(&ctx.user_id, &ctx.session_id)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                debug!(error = %e, "Entity memory unavailable");
                return args;
            }
        };

        match self
            .memory
            .resolve_smart_parameters(&session, tool, args.clone())
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(tool = %tool.name, error = %e, "Smart parameter resolution failed");
                args
            }
        }
    }

    async fn track(&self, ctx: &DispatchContext, tool: &ToolSpec, result: &Value) {
        if let Err(e) = self
            .memory
            .track_entities_from_result(&ctx.session_id, tool.domain(), result)
            .await
        {
            debug!(tool = %tool.name, error = %e, "Entity tracking failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Enrichment, RecentEntityMemory, StaticToolRegistry};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records executed calls and answers from a fixed table.
    #[derive(Default)]
    struct ScriptedExecutor {
        seen: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ToolExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            tool: &ToolSpec,
            args: Value,
            _ctx: &DispatchContext,
        ) -> Result<Value, LiveError> {
            self.seen.lock().unwrap().push((tool.name.clone(), args.clone()));
            match tool.name.as_str() {
                "contacts.search" => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(json!([{ "id": "c1" }, { "id": "c2" }]))
                }
                "contacts.create" => Ok(json!({ "id": "c9", "name": args["name"] })),
                "deals.create" => Ok(json!({ "id": "d1", "contact_id": args["contact_id"] })),
                _ => Err(LiveError::Tool("backend exploded".into())),
            }
        }
    }

    struct FixedEnricher(Result<Enrichment, ()>);

    #[async_trait]
    impl ContextEnricher for FixedEnricher {
        async fn scan_for_context(
            &self,
            _user_id: &str,
            _intent: &str,
            _entity_type: &str,
            _draft: &Value,
        ) -> Result<Enrichment, LiveError> {
            self.0
                .clone()
                .map_err(|_| LiveError::Collaborator("scan down".into()))
        }
    }

    fn registry() -> Arc<StaticToolRegistry> {
        Arc::new(
            StaticToolRegistry::new(vec![
                ToolSpec::new("contacts.search", "Find contacts"),
                ToolSpec::new("contacts.create", "Create contact"),
                ToolSpec::new("deals.create", "Create deal"),
                ToolSpec::new("reports.export", "Export"),
            ])
            .unwrap(),
        )
    }

    fn dispatcher(
        enrichment: Result<Enrichment, ()>,
    ) -> (ToolCallDispatcher, Arc<ScriptedExecutor>) {
        let executor = Arc::new(ScriptedExecutor::default());
        let dispatcher = ToolCallDispatcher::new(
            registry(),
            executor.clone(),
            Arc::new(FixedEnricher(enrichment)),
            Arc::new(RecentEntityMemory::new()),
        );
        (dispatcher, executor)
    }

    fn ctx() -> DispatchContext {
        DispatchContext {
            user_id: "u1".into(),
            session_id: "s1".into(),
            conversation_id: "conv1".into(),
            voice_mode: true,
        }
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let (d, executor) = dispatcher(Err(()));
        let out = d.resolve(&call("1", "weather.get", json!({})), &ctx()).await;
        assert!(!out.result.success);
        assert!(out.result.error.unwrap().contains("weather.get"));
        assert!(executor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn misspelled_tool_is_found() {
        let (d, _) = dispatcher(Err(()));
        let out = d.resolve(&call("1", "contacts_search", json!({})), &ctx()).await;
        assert!(out.result.success);
        assert_eq!(out.result.name, "contacts_search");
    }

    #[tokio::test]
    async fn execution_failure_carries_message() {
        let (d, _) = dispatcher(Err(()));
        let out = d.resolve(&call("7", "reports.export", json!({})), &ctx()).await;
        assert_eq!(out.result.id, "7");
        assert_eq!(out.result.error.as_deref(), Some("backend exploded"));
        assert_eq!(out.follow_up, None);
    }

    #[tokio::test]
    async fn enrichment_fills_missing_fields_only() {
        let enrichment = Enrichment {
            success: true,
            suggested_data: Some(
                json!({ "name": "Ignored", "email": "dana@example.com" })
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
        };
        let (d, executor) = dispatcher(Ok(enrichment));
        let out = d
            .resolve(&call("1", "contacts.create", json!({ "name": "Dana" })), &ctx())
            .await;
        assert!(out.result.success);
        assert!(out.follow_up.unwrap().contains("Dana"));

        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen[0].1["name"], "Dana");
        assert_eq!(seen[0].1["email"], "dana@example.com");
    }

    #[tokio::test]
    async fn enrichment_failure_keeps_original_arguments() {
        let (d, executor) = dispatcher(Err(()));
        let out = d
            .resolve(&call("1", "contacts.create", json!({ "name": "Dana" })), &ctx())
            .await;
        assert!(out.result.success);
        assert_eq!(executor.seen.lock().unwrap()[0].1, json!({ "name": "Dana" }));
    }

    #[tokio::test]
    async fn results_feed_smart_parameters() {
        let (d, executor) = dispatcher(Err(()));
        d.resolve(&call("1", "contacts.search", json!({ "q": "a" })), &ctx())
            .await;
        let out = d
            .resolve(
                &call("2", "deals.create", json!({ "contact_id": "the second one" })),
                &ctx(),
            )
            .await;
        assert_eq!(out.result.result.unwrap()["contact_id"], "c2");
        assert_eq!(executor.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_all_preserves_call_order() {
        let (d, _) = dispatcher(Err(()));
        let calls = vec![
            call("slow", "contacts.search", json!({})),
            call("fast", "reports.export", json!({})),
            call("bad", "nope.nope", json!({})),
        ];
        let out = d.dispatch_all(&calls, &ctx()).await;
        let ids: Vec<_> = out.iter().map(|o| o.result.id.as_str()).collect();
        assert_eq!(ids, ["slow", "fast", "bad"]);
        assert!(out[0].result.success);
        assert!(!out[1].result.success);
        assert!(!out[2].result.success);
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected() {
        let (d, _) = dispatcher(Err(()));
        let out = d
            .resolve(&call("1", "contacts.search", json!("oops")), &ctx())
            .await;
        assert!(!out.result.success);
    }
}
