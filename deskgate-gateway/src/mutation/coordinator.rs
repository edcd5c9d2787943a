//! Fetch-merge-upload workflow with bounded retry on conflict.

use std::fmt;
use std::time::Duration;

use deskgate_core::config::MutationSettings;
use deskgate_core::error::{GatewayError, Result, UpstreamError};
use deskgate_core::types::ResourceKind;
use deskgate_telemetry::spans::mutation_span;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{Instrument, debug, info, warn};

use super::merge::{PathOperation, apply_operations, merge_changes};
use crate::upstream::ResourceApi;

/// Stage of one mutation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Retrieving the current object.
    Fetching,
    /// Applying the mutation locally.
    Merging,
    /// Replacing the upstream object.
    Uploading,
    /// Waiting before a fresh fetch after a conflict.
    ConflictRetry,
    /// Upload accepted.
    Done,
    /// Aborted with an error, including exhausted retries.
    Failed,
}

impl MutationState {
    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Merging => "merging",
            Self::Uploading => "uploading",
            Self::ConflictRetry => "conflict_retry",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which address block of an order to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    /// `shipping`
    Shipping,
    /// `customer`
    Customer,
    /// `return_address`
    ReturnAddress,
}

impl AddressKind {
    /// Returns the order field holding this address.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::Shipping => "shipping",
            Self::Customer => "customer",
            Self::ReturnAddress => "return_address",
        }
    }
}

impl std::str::FromStr for AddressKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shipping" => Ok(Self::Shipping),
            "customer" => Ok(Self::Customer),
            "return_address" | "return" => Ok(Self::ReturnAddress),
            other => Err(GatewayError::invalid(
                "address_type",
                format!("Unknown address type '{other}', expected shipping, customer or return_address"),
            )),
        }
    }
}

/// A change applied to a freshly fetched object on every attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Shallow change-set; `null` removes a key.
    Merge(Map<String, Value>),
    /// Path operations applied in order.
    Operations(Vec<PathOperation>),
    /// Sets `folder_id`.
    MoveToFolder(u64),
    /// Appends to `order_items` and bumps `quantity_total` when present.
    AddItems(Vec<Value>),
    /// Merges fields into one address block.
    UpdateAddress {
        /// Target block.
        kind: AddressKind,
        /// Change-set for the block; `null` removes a field.
        address: Map<String, Value>,
    },
}

impl Mutation {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Merge(_) => "merge",
            Self::Operations(_) => "operations",
            Self::MoveToFolder(_) => "move_to_folder",
            Self::AddItems(_) => "add_items",
            Self::UpdateAddress { .. } => "update_address",
        }
    }

    /// Checks the mutation before any upstream call is made.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Operations(ops) if ops.is_empty() => {
                Err(GatewayError::missing("operations"))
            }
            Self::AddItems(items) if items.is_empty() => Err(GatewayError::missing("items")),
            Self::AddItems(items) if items.iter().any(|i| !i.is_object()) => {
                Err(GatewayError::invalid("items", "Each item must be a JSON object"))
            }
            _ => Ok(()),
        }
    }

    /// Produces the object to upload from the fetched one.
    pub fn apply(&self, current: Map<String, Value>) -> Result<Map<String, Value>> {
        match self {
            Self::Merge(changes) => Ok(merge_changes(&current, changes)),
            Self::Operations(ops) => {
                let mut target = current;
                apply_operations(&mut target, ops)?;
                Ok(target)
            }
            Self::MoveToFolder(folder_id) => {
                let mut target = current;
                target.insert("folder_id".to_string(), Value::from(*folder_id));
                Ok(target)
            }
            Self::AddItems(items) => Ok(append_items(current, items)),
            Self::UpdateAddress { kind, address } => {
                let mut target = current;
                let existing = match target.remove(kind.field()) {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                target.insert(
                    kind.field().to_string(),
                    Value::Object(merge_changes(&existing, address)),
                );
                Ok(target)
            }
        }
    }
}

fn append_items(mut order: Map<String, Value>, items: &[Value]) -> Map<String, Value> {
    let added = items
        .iter()
        .filter_map(|item| item.get("quantity"))
        .fold(Value::from(0), |acc, qty| add_numbers(&acc, qty));

    let list = order
        .entry("order_items".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match list {
        Value::Array(existing) => existing.extend(items.iter().cloned()),
        other => *other = Value::Array(items.to_vec()),
    }

    if let Some(total) = order.get_mut("quantity_total") {
        if total.is_number() {
            *total = add_numbers(total, &added);
        }
    }
    order
}

fn add_numbers(a: &Value, b: &Value) -> Value {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => Value::from(x.saturating_add(y)),
        _ => Value::from(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)),
    }
}

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// The object as returned by the upload, or as sent when the upstream echoes nothing.
    pub resource: Value,
    /// Fetch-merge-upload cycles used.
    pub attempts: u32,
}

/// Runs mutations against a [`ResourceApi`] with conflict-only retry.
///
/// Every attempt starts from a fresh fetch, so concurrent upstream edits to
/// keys outside the change-set survive. Attempt `n` that ends in a conflict
/// waits `n * backoff_step` before the next fetch. Any other error aborts.
#[derive(Debug, Clone)]
pub struct MutationCoordinator {
    max_attempts: u32,
    backoff_step: Duration,
}

impl Default for MutationCoordinator {
    fn default() -> Self {
        Self::new(&MutationSettings::default())
    }
}

impl MutationCoordinator {
    /// Creates a coordinator from settings. At least one attempt is always made.
    #[must_use]
    pub fn new(settings: &MutationSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff_step: Duration::from_millis(settings.backoff_step_ms),
        }
    }

    /// Returns the attempt ceiling.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// Applies a shallow change-set to a resource.
    pub async fn update(
        &self,
        api: &dyn ResourceApi,
        kind: ResourceKind,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<MutationOutcome> {
        self.execute(api, kind, id, &Mutation::Merge(changes)).await
    }

    /// Runs the fetch-merge-upload loop for one mutation.
    pub async fn execute(
        &self,
        api: &dyn ResourceApi,
        kind: ResourceKind,
        id: &str,
        mutation: &Mutation,
    ) -> Result<MutationOutcome> {
        mutation.validate()?;
        let span = mutation_span(kind.label(), id, self.max_attempts);
        self.run(api, kind, id, mutation).instrument(span).await
    }

    async fn run(
        &self,
        api: &dyn ResourceApi,
        kind: ResourceKind,
        id: &str,
        mutation: &Mutation,
    ) -> Result<MutationOutcome> {
        let mut tracker = StateTracker::new(mutation.name());

        for attempt in 1..=self.max_attempts {
            tracker.enter(MutationState::Fetching, attempt);
            let current = match api.fetch(kind, id).await {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    tracker.enter(MutationState::Failed, attempt);
                    return Err(UpstreamError::invalid_response(format!(
                        "{} {id} is not a JSON object",
                        kind.label()
                    ))
                    .into());
                }
                Err(e) => {
                    tracker.enter(MutationState::Failed, attempt);
                    warn!(attempt, error = %e, "Fetch failed");
                    return Err(e);
                }
            };

            tracker.enter(MutationState::Merging, attempt);
            let sent = match mutation.apply(current) {
                Ok(merged) => Value::Object(merged),
                Err(e) => {
                    tracker.enter(MutationState::Failed, attempt);
                    return Err(e);
                }
            };

            tracker.enter(MutationState::Uploading, attempt);
            match api.replace(kind, id, sent.clone()).await {
                Ok(returned) => {
                    tracker.enter(MutationState::Done, attempt);
                    info!(attempt, "Mutation applied");
                    let resource = if returned.is_object() { returned } else { sent };
                    return Ok(MutationOutcome { resource, attempts: attempt });
                }
                Err(e) if e.is_conflict() && attempt < self.max_attempts => {
                    tracker.enter(MutationState::ConflictRetry, attempt);
                    let delay = self.backoff_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Conflict on upload, refetching"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_conflict() => {
                    tracker.enter(MutationState::Failed, attempt);
                    warn!(attempt, "Conflict retries exhausted");
                }
                Err(e) => {
                    tracker.enter(MutationState::Failed, attempt);
                    warn!(attempt, error = %e, "Upload failed");
                    return Err(e);
                }
            }
        }

        Err(GatewayError::conflict(self.max_attempts))
    }
}

struct StateTracker {
    mutation: &'static str,
    state: MutationState,
}

impl StateTracker {
    const fn new(mutation: &'static str) -> Self {
        Self {
            mutation,
            state: MutationState::Fetching,
        }
    }

    fn enter(&mut self, next: MutationState, attempt: u32) {
        debug!(attempt, mutation = self.mutation, from = %self.state, to = %next, "Mutation state change");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deskgate_core::error::UpstreamErrorCode;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// In-memory upstream: serves `current` on fetch and pops scripted upload outcomes.
    struct ScriptedApi {
        current: Mutex<Value>,
        uploads: Mutex<VecDeque<Result<()>>>,
        fetch_error: Option<GatewayError>,
        concurrent_edit: Option<(&'static str, Value)>,
        fetches: Mutex<u32>,
        replaces: Mutex<Vec<Value>>,
    }

    impl ScriptedApi {
        fn new(current: Value) -> Self {
            Self {
                current: Mutex::new(current),
                uploads: Mutex::new(VecDeque::new()),
                fetch_error: None,
                concurrent_edit: None,
                fetches: Mutex::new(0),
                replaces: Mutex::new(Vec::new()),
            }
        }

        fn with_uploads(self, outcomes: Vec<Result<()>>) -> Self {
            *self.uploads.lock() = outcomes.into();
            self
        }

        fn with_fetch_error(mut self, error: GatewayError) -> Self {
            self.fetch_error = Some(error);
            self
        }

        /// Sets `key` upstream whenever an upload is rejected, simulating another writer.
        fn with_concurrent_edit(mut self, key: &'static str, value: Value) -> Self {
            self.concurrent_edit = Some((key, value));
            self
        }

        fn fetch_count(&self) -> u32 {
            *self.fetches.lock()
        }

        fn replace_count(&self) -> usize {
            self.replaces.lock().len()
        }
    }

    #[async_trait]
    impl ResourceApi for ScriptedApi {
        async fn fetch(&self, kind: ResourceKind, id: &str) -> Result<Value> {
            *self.fetches.lock() += 1;
            if let Some(e) = &self.fetch_error {
                return Err(e.clone());
            }
            if id == "missing" {
                return Err(GatewayError::not_found(kind.label(), id));
            }
            Ok(self.current.lock().clone())
        }

        async fn replace(&self, _kind: ResourceKind, _id: &str, body: Value) -> Result<Value> {
            self.replaces.lock().push(body.clone());
            match self.uploads.lock().pop_front().unwrap_or(Ok(())) {
                Ok(()) => {
                    *self.current.lock() = body.clone();
                    Ok(body)
                }
                Err(e) => {
                    if let Some((key, value)) = &self.concurrent_edit {
                        if let Value::Object(map) = &mut *self.current.lock() {
                            map.insert((*key).to_string(), value.clone());
                        }
                    }
                    Err(e)
                }
            }
        }
    }

    fn conflict() -> Result<()> {
        Err(UpstreamError::from_status(409, "Order was modified").into())
    }

    fn coordinator(max_attempts: u32) -> MutationCoordinator {
        MutationCoordinator::new(&MutationSettings {
            max_attempts,
            backoff_step_ms: 100,
        })
    }

    fn changes(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_try_success() {
        let api = ScriptedApi::new(json!({"a": 1, "b": 2, "c": 3}));
        let outcome = coordinator(5)
            .update(&api, ResourceKind::Order, "1", changes(json!({"b": null, "c": 5})))
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.resource, json!({"a": 1, "c": 5}));
        assert_eq!(api.fetch_count(), 1);
        assert_eq!(api.replace_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_then_success_refetches() {
        let api = ScriptedApi::new(json!({"a": 1})).with_uploads(vec![conflict(), Ok(())]);
        let outcome = coordinator(5)
            .update(&api, ResourceKind::Order, "1", changes(json!({"a": 2})))
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(api.fetch_count(), 2);
        assert_eq!(api.replace_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_forever_exhausts_exactly() {
        let api = ScriptedApi::new(json!({"a": 1}))
            .with_uploads(vec![conflict(), conflict(), conflict(), conflict()]);
        let err = coordinator(3)
            .update(&api, ResourceKind::Order, "1", changes(json!({"a": 2})))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Conflict { attempts: 3 }));
        assert_eq!(api.fetch_count(), 3);
        assert_eq!(api.replace_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_conflict_is_retried() {
        let message_conflict = Err(UpstreamError::new(
            UpstreamErrorCode::ApiError,
            "Update conflict detected",
        )
        .into());
        let api = ScriptedApi::new(json!({"a": 1})).with_uploads(vec![message_conflict, Ok(())]);
        let outcome = coordinator(5)
            .update(&api, ResourceKind::Order, "1", changes(json!({"a": 2})))
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_aborts_without_retry() {
        let api = ScriptedApi::new(json!({}));
        let err = coordinator(5)
            .update(&api, ResourceKind::Order, "missing", changes(json!({"a": 2})))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(api.fetch_count(), 1);
        assert_eq!(api.replace_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_conflict_is_not_retried() {
        let api = ScriptedApi::new(json!({}))
            .with_fetch_error(UpstreamError::from_status(409, "busy").into());
        let err = coordinator(5)
            .update(&api, ResourceKind::Order, "1", changes(json!({"a": 2})))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_server_error_aborts() {
        let api = ScriptedApi::new(json!({"a": 1}))
            .with_uploads(vec![Err(UpstreamError::from_status(500, "boom").into())]);
        let err = coordinator(5)
            .update(&api, ResourceKind::Order, "1", changes(json!({"a": 2})))
            .await
            .unwrap_err();

        assert!(!err.is_conflict());
        assert_eq!(api.fetch_count(), 1);
        assert_eq!(api.replace_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_keeps_concurrent_edit() {
        let api = ScriptedApi::new(json!({"a": 1, "b": 1}))
            .with_uploads(vec![conflict(), Ok(())])
            .with_concurrent_edit("b", json!(9));
        let outcome = coordinator(5)
            .update(&api, ResourceKind::Order, "1", changes(json!({"a": 2})))
            .await
            .unwrap();

        assert_eq!(outcome.resource, json!({"a": 2, "b": 9}));
        assert_eq!(api.replaces.lock()[0], json!({"a": 2, "b": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_object_fetch_is_invalid_response() {
        let api = ScriptedApi::new(json!([1, 2]));
        let err = coordinator(5)
            .update(&api, ResourceKind::Order, "1", changes(json!({"a": 2})))
            .await
            .unwrap_err();
        assert_eq!(
            err.as_upstream().map(|e| e.code),
            Some(UpstreamErrorCode::InvalidResponse)
        );
    }

    #[test]
    fn test_backoff_scales_with_attempt() {
        let c = coordinator(5);
        assert_eq!(c.backoff_for(1), Duration::from_millis(100));
        assert_eq!(c.backoff_for(4), Duration::from_millis(400));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(coordinator(0).max_attempts(), 1);
    }

    #[test]
    fn test_move_to_folder() {
        let order = changes(json!({"id": "1", "folder_id": 10}));
        let moved = Mutation::MoveToFolder(42).apply(order).unwrap();
        assert_eq!(moved["folder_id"], json!(42));
    }

    #[test]
    fn test_add_items_appends_and_bumps_total() {
        let order = changes(json!({"order_items": [{"code": "A", "quantity": 1}], "quantity_total": 1}));
        let items = vec![json!({"code": "B", "quantity": 2}), json!({"code": "C", "quantity": 3})];
        let updated = Mutation::AddItems(items).apply(order).unwrap();

        assert_eq!(updated["order_items"].as_array().unwrap().len(), 3);
        assert_eq!(updated["quantity_total"], json!(6));
    }

    #[test]
    fn test_add_items_without_existing_list() {
        let order = changes(json!({"id": "1"}));
        let updated = Mutation::AddItems(vec![json!({"code": "B", "quantity": 2})])
            .apply(order)
            .unwrap();

        assert_eq!(updated["order_items"], json!([{"code": "B", "quantity": 2}]));
        assert!(updated.get("quantity_total").is_none());
    }

    #[test]
    fn test_add_items_rejects_empty_and_non_objects() {
        assert!(Mutation::AddItems(vec![]).validate().is_err());
        assert!(Mutation::AddItems(vec![json!(1)]).validate().is_err());
        assert!(Mutation::Operations(vec![]).validate().is_err());
    }

    #[test]
    fn test_update_address_merges_block() {
        let order = changes(json!({"shipping": {"city": "Oslo", "zip": "0150", "phone": "1"}}));
        let update = Mutation::UpdateAddress {
            kind: AddressKind::Shipping,
            address: changes(json!({"city": "Bergen", "phone": null})),
        };
        let updated = update.apply(order).unwrap();
        assert_eq!(updated["shipping"], json!({"city": "Bergen", "zip": "0150"}));
    }

    #[test]
    fn test_address_kind_parse() {
        assert_eq!("customer".parse::<AddressKind>().unwrap(), AddressKind::Customer);
        assert_eq!("return_address".parse::<AddressKind>().unwrap().field(), "return_address");
        assert!("billing".parse::<AddressKind>().is_err());
    }
}
