use axum::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use seating_engine::{
    compact, first_duplicate_id, stats, validate, Arrangement, ChangeType, Finding, GenerationOutcome, GenerationRequest,
    GroupMixingRule, GroupRequest, Guest, PairRule, Preferences, RecordOutcome, SeatingEngine, Table,
    TablePolicy,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditEventType;
use crate::error::ApiError;
use crate::guests::{describe_changes, GuestInput, RsvpUpdate};
use crate::state::{AppState, GeneratedBy, LayoutSettings, PlanKey, SeatingPlan};
use crate::store::StoreError;

type ApiResult<T> = Result<T, ApiError>;

pub const OWNER_HEADER: &str = "x-user-id";

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let seating = "/api/events/:event_id/seating";
    let guests = "/api/events/:event_id/guests";

    Router::new()
        .route("/health", get(health))
        .route(seating, get(get_plan).post(save_plan).delete(delete_plan))
        .route(&format!("{seating}/generate"), post(generate))
        .route(&format!("{seating}/optimize"), post(optimize))
        .route(&format!("{seating}/statistics"), get(statistics))
        .route(&format!("{seating}/validate"), post(validate_arrangement))
        .route(&format!("{seating}/clone"), post(clone_plan))
        .route(&format!("{seating}/sync/pending"), get(pending_triggers))
        .route(&format!("{seating}/sync/processed"), post(mark_processed))
        .route(guests, get(list_guests).post(add_guest))
        .route(&format!("{guests}/bulk"), post(add_guests_bulk))
        .route(&format!("{guests}/:guest_id"), put(update_guest).delete(delete_guest))
        .route(&format!("{guests}/:guest_id/rsvp"), patch(update_rsvp))
        .with_state(state)
}

// ─── Owner Extractor ──────────────────────────────────────────────────────────

/// Plan owner, resolved upstream and passed in the `x-user-id` header.
pub struct Owner(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn not_found(event_id: &str) -> ApiError {
    StoreError::NotFound { event_id: event_id.to_string() }.into()
}

fn capacity_problems(tables: &[Table], minimum: u32) -> Vec<String> {
    let mut problems: Vec<String> = tables
        .iter()
        .filter(|t| t.capacity < minimum)
        .map(|t| format!("Table \"{}\" must have at least {minimum} seats", t.name))
        .collect();
    if let Some(id) = first_duplicate_id(tables) {
        problems.push(format!("Table id \"{id}\" is used by more than one table"));
    }
    problems
}

/// Audit, persist and broadcast a committed plan change.
async fn after_commit(state: &AppState, event_type: AuditEventType, plan: &SeatingPlan, payload: Value) {
    state
        .audit
        .append(event_type, &plan.event_id, &plan.owner_id, payload)
        .await;
    state.persist().await;
    state.realtime.seating_updated(
        &plan.event_id,
        &json!({
            "eventId": plan.event_id,
            "ownerId": plan.owner_id,
            "version": plan.version,
            "generatedBy": plan.generated_by,
            "reason": event_type,
        }),
    );
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "serverTime": Utc::now().timestamp_millis() }))
}

// ─── Plan CRUD ────────────────────────────────────────────────────────────────

async fn get_plan(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
) -> Json<SeatingPlan> {
    let key = PlanKey::new(event_id, owner);
    let plan = match state.store.get(&key).await {
        Some(plan) => plan,
        None => SeatingPlan::shell(&key, &state.config.engine, Utc::now()),
    };
    Json(plan)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePlanRequest {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub arrangement: Arrangement,
    pub preferences: Option<Preferences>,
    pub layout_settings: Option<LayoutSettings>,
    pub expected_version: Option<u64>,
}

async fn save_plan(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
    Json(body): Json<SavePlanRequest>,
) -> ApiResult<Json<SeatingPlan>> {
    let guests = state.guests.list(&event_id).await;
    let mut problems = capacity_problems(&body.tables, state.config.engine.min_table_capacity);
    problems.extend(
        validate(&body.tables, &body.arrangement, &guests)
            .iter()
            .filter(|f| f.is_over_capacity())
            .map(Finding::to_string),
    );
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let key = PlanKey::new(event_id, owner);
    let plan = state
        .store
        .commit(&key, body.expected_version, &state.config.engine, |plan| {
            plan.tables = body.tables;
            plan.arrangement = body.arrangement;
            if let Some(prefs) = body.preferences {
                plan.preferences = prefs;
            }
            if let Some(layout) = body.layout_settings {
                plan.layout_settings = layout;
            }
            plan.generated_by = GeneratedBy::Manual;
        })
        .await?;

    info!("Saved plan {}/{} v{}", plan.event_id, plan.owner_id, plan.version);
    after_commit(
        &state,
        AuditEventType::PlanSaved,
        &plan,
        json!({ "version": plan.version, "tables": plan.tables.len() }),
    )
    .await;
    Ok(Json(plan))
}

async fn delete_plan(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
) -> ApiResult<StatusCode> {
    let plan = state.store.remove(&PlanKey::new(event_id, owner)).await?;
    info!("Deleted plan {}/{}", plan.event_id, plan.owner_id);
    after_commit(&state, AuditEventType::PlanDeleted, &plan, json!({ "version": plan.version })).await;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Generation ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Tables to start from; the engine may add more. Defaults to the stored tables.
    pub tables: Option<Vec<Table>>,
    /// Complete inventory, auto-created tables included. Disables table creation.
    pub all_tables: Option<Vec<Table>>,
    pub preferences: Option<Preferences>,
    /// Seats to keep; switches to incremental generation
    pub existing_arrangement: Option<Arrangement>,
    pub must_sit_together: Option<Vec<PairRule>>,
    pub cannot_sit_together: Option<Vec<PairRule>>,
    pub group_together: Option<Vec<GroupRequest>>,
    pub group_mixing_rules: Option<Vec<GroupMixingRule>>,
    pub allow_group_mixing: Option<bool>,
    pub preferred_table_size: Option<u32>,
    pub expected_version: Option<u64>,
}

impl GenerateRequest {
    /// Body preferences (or the stored ones) with any per-rule overrides applied.
    fn take_preferences(&mut self, stored: &Preferences) -> Preferences {
        let mut prefs = self.preferences.take().unwrap_or_else(|| stored.clone());
        if let Some(rules) = self.must_sit_together.take() {
            prefs.must_sit_together = rules;
        }
        if let Some(rules) = self.cannot_sit_together.take() {
            prefs.cannot_sit_together = rules;
        }
        if let Some(groups) = self.group_together.take() {
            prefs.group_together = groups;
        }
        if let Some(rules) = self.group_mixing_rules.take() {
            prefs.group_mixing_rules = rules;
        }
        if let Some(allow) = self.allow_group_mixing {
            prefs.allow_group_mixing = allow;
        }
        if let Some(size) = self.preferred_table_size {
            prefs.preferred_table_size = size;
        }
        prefs
    }
}

/// Run the engine off the async runtime, bounded by the configured timeout.
async fn run_engine(
    state: &AppState,
    guests: Vec<Guest>,
    tables: Vec<Table>,
    preferences: Preferences,
    existing: Option<Arrangement>,
    table_policy: TablePolicy,
) -> ApiResult<GenerationOutcome> {
    let engine = SeatingEngine::new(state.config.engine.clone());
    let task = tokio::task::spawn_blocking(move || {
        engine.generate(GenerationRequest {
            guests: &guests,
            tables,
            preferences: &preferences,
            existing,
            table_policy,
        })
    });

    let limit = state.config.generation_timeout;
    match tokio::time::timeout(limit, task).await {
        Err(_) => {
            warn!("Seating generation exceeded {} ms", limit.as_millis());
            Err(ApiError::Timeout(limit.as_millis()))
        }
        Ok(Err(join)) => Err(ApiError::Internal(anyhow::anyhow!("generation task failed: {join}"))),
        Ok(Ok(result)) => Ok(result?),
    }
}

async fn generate(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
    Json(mut body): Json<GenerateRequest>,
) -> ApiResult<Json<Value>> {
    let key = PlanKey::new(event_id.clone(), owner);
    let current = match state.store.get(&key).await {
        Some(plan) => plan,
        None => SeatingPlan::shell(&key, &state.config.engine, Utc::now()),
    };
    if let Some(expected) = body.expected_version {
        if expected != current.version {
            return Err(StoreError::VersionConflict { expected, actual: current.version }.into());
        }
    }

    let preferences = body.take_preferences(&current.preferences);
    let (tables, policy) = match (body.all_tables.take(), body.tables.take()) {
        (Some(all), _) => (all, TablePolicy::AsSupplied),
        (None, Some(tables)) => (tables, TablePolicy::AutoExtend),
        (None, None) => (current.tables.clone(), TablePolicy::AutoExtend),
    };
    let guests = state.guests.list(&event_id).await;

    let outcome = run_engine(
        &state,
        guests.clone(),
        tables,
        preferences.clone(),
        body.existing_arrangement.take(),
        policy,
    )
    .await?;

    let plan = state
        .store
        .commit(&key, Some(current.version), &state.config.engine, |plan| {
            plan.tables = outcome.tables.clone();
            plan.arrangement = outcome.arrangement.clone();
            plan.preferences = preferences;
            plan.generated_by = GeneratedBy::Ai;
        })
        .await?;
    let statistics = stats::compute(&plan.tables, &plan.arrangement, &guests);

    info!(
        "Generated {:?} plan {}/{} v{}: {} seated, {} unseated, {} table(s) created",
        outcome.mode,
        plan.event_id,
        plan.owner_id,
        plan.version,
        statistics.seated_guests,
        outcome.unseated.len(),
        outcome.created_tables.len()
    );
    after_commit(
        &state,
        AuditEventType::PlanGenerated,
        &plan,
        json!({
            "version": plan.version,
            "mode": outcome.mode,
            "createdTables": outcome.created_tables,
            "unseated": outcome.unseated,
        }),
    )
    .await;

    Ok(Json(json!({
        "mode": outcome.mode,
        "version": plan.version,
        "arrangement": plan.arrangement,
        "tables": plan.tables,
        "createdTables": outcome.created_tables,
        "unseated": outcome.unseated,
        "statistics": statistics,
    })))
}

// ─── Optimize / Statistics / Validate ─────────────────────────────────────────

async fn optimize(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
) -> ApiResult<Json<Value>> {
    let key = PlanKey::new(event_id.clone(), owner);
    let current = state.store.get(&key).await.ok_or_else(|| not_found(&event_id))?;
    let guests = state.guests.list(&event_id).await;

    let (mut tables, mut arrangement) = (current.tables.clone(), current.arrangement.clone());
    let report = compact(
        &mut tables,
        &mut arrangement,
        &guests,
        &current.preferences,
        &state.config.engine,
    );

    let plan = if report.changed() {
        let plan = state
            .store
            .commit(&key, Some(current.version), &state.config.engine, |plan| {
                plan.tables = tables;
                plan.arrangement = arrangement;
            })
            .await?;
        after_commit(
            &state,
            AuditEventType::PlanOptimized,
            &plan,
            json!({ "version": plan.version, "report": report }),
        )
        .await;
        plan
    } else {
        current
    };
    let statistics = stats::compute(&plan.tables, &plan.arrangement, &guests);

    Ok(Json(json!({
        "changed": report.changed(),
        "report": report,
        "plan": plan,
        "statistics": statistics,
    })))
}

async fn statistics(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
) -> Json<stats::SeatingStatistics> {
    let key = PlanKey::new(event_id.clone(), owner);
    let guests = state.guests.list(&event_id).await;
    let stats = match state.store.get(&key).await {
        Some(plan) => stats::compute(&plan.tables, &plan.arrangement, &guests),
        None => stats::compute(&[], &Arrangement::new(), &guests),
    };
    Json(stats)
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub arrangement: Arrangement,
}

async fn validate_arrangement(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(body): Json<ValidateRequest>,
) -> Json<Value> {
    let guests = state.guests.list(&event_id).await;
    let issues = validate(&body.tables, &body.arrangement, &guests);
    let messages: Vec<String> = issues.iter().map(Finding::to_string).collect();
    Json(json!({
        "valid": issues.is_empty(),
        "issues": issues,
        "messages": messages,
    }))
}

// ─── Clone ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequest {
    pub target_event_id: String,
}

async fn clone_plan(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
    Json(body): Json<CloneRequest>,
) -> ApiResult<(StatusCode, Json<SeatingPlan>)> {
    let target = body.target_event_id.trim().to_string();
    if target.is_empty() || target == event_id {
        return Err(ApiError::Validation(vec![
            "targetEventId must name a different event".to_string(),
        ]));
    }
    let source = state
        .store
        .get(&PlanKey::new(event_id.clone(), owner.clone()))
        .await
        .ok_or_else(|| not_found(&event_id))?;

    let mut plan = SeatingPlan::shell(&PlanKey::new(target, owner), &state.config.engine, Utc::now());
    plan.tables = source
        .tables
        .iter()
        .map(|t| Table { id: format!("table-{}", Uuid::new_v4()), ..t.clone() })
        .collect();
    plan.layout_settings = source.layout_settings.clone();
    plan.version = 1;
    let plan = state.store.insert_new(plan).await?;

    info!("Cloned {} table(s) from {} to {}", plan.tables.len(), event_id, plan.event_id);
    after_commit(
        &state,
        AuditEventType::PlanCloned,
        &plan,
        json!({ "sourceEventId": event_id, "tables": plan.tables.len() }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(plan)))
}

// ─── Sync Triggers ────────────────────────────────────────────────────────────

async fn pending_triggers(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
) -> Json<Value> {
    let plan = state.store.get(&PlanKey::new(event_id.clone(), owner)).await;
    let (pending, last) = match &plan {
        Some(plan) => (plan.sync.pending(), plan.sync.last_sync_trigger()),
        None => (Vec::new(), None),
    };
    Json(json!({
        "eventId": event_id,
        "pending": pending,
        "lastSyncTrigger": last,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MarkProcessedRequest {
    pub timestamps: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<String>,
}

async fn mark_processed(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Owner(owner): Owner,
    Json(body): Json<MarkProcessedRequest>,
) -> ApiResult<Json<Value>> {
    if body.timestamps.is_empty() {
        return Err(ApiError::Validation(vec!["timestamps must not be empty".to_string()]));
    }
    let key = PlanKey::new(event_id, owner);
    let marked = state
        .store
        .update(&key, |plan| {
            plan.sync
                .mark_processed(&body.timestamps, Utc::now(), body.result.as_deref())
        })
        .await?;

    if marked > 0 {
        state
            .audit
            .append(
                AuditEventType::TriggersAcknowledged,
                &key.event_id,
                &key.owner_id,
                json!({ "count": marked, "result": body.result }),
            )
            .await;
        state.persist().await;
    }
    Ok(Json(json!({ "marked": marked })))
}

// ─── Guest Source ─────────────────────────────────────────────────────────────

/// Record each change on every plan of the event and tell watchers.
async fn notify_guest_changes(state: &AppState, event_id: &str, changes: &[ChangeType], data: Value) {
    let now = Utc::now();
    for &change in changes {
        let outcomes = state
            .store
            .record_trigger(event_id, change, &data, now, &state.config.engine)
            .await;
        let recorded = outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == RecordOutcome::Recorded)
            .count();
        if recorded > 0 {
            info!("Sync trigger {change} recorded on {recorded} plan(s) of {event_id}");
            state.realtime.sync_trigger(
                event_id,
                &json!({
                    "eventId": event_id,
                    "changeType": change,
                    "changeData": data,
                    "timestamp": now,
                }),
            );
        }
    }
    state.persist().await;
}

fn guest_summary(guest: &Guest) -> Value {
    json!({
        "guestId": guest.id,
        "status": guest.status,
        "attendingCount": guest.attending_count,
        "group": guest.group,
    })
}

async fn list_guests(State(state): State<AppState>, Path(event_id): Path<String>) -> Json<Vec<Guest>> {
    Json(state.guests.list(&event_id).await)
}

async fn add_guest(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(input): Json<GuestInput>,
) -> ApiResult<(StatusCode, Json<Guest>)> {
    let problems = input.problems();
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }
    let guest = state
        .guests
        .add(&event_id, vec![input])
        .await
        .and_then(|mut added| added.pop())
        .ok_or_else(|| ApiError::Conflict("a guest with this id already exists".to_string()))?;

    notify_guest_changes(&state, &event_id, &[ChangeType::GuestAdded], guest_summary(&guest)).await;
    Ok((StatusCode::CREATED, Json(guest)))
}

async fn add_guests_bulk(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(inputs): Json<Vec<GuestInput>>,
) -> ApiResult<(StatusCode, Json<Vec<Guest>>)> {
    if inputs.is_empty() {
        return Err(ApiError::Validation(vec!["at least one guest is required".to_string()]));
    }
    let problems: Vec<String> = inputs
        .iter()
        .enumerate()
        .flat_map(|(i, input)| input.problems().into_iter().map(move |p| format!("guest #{}: {p}", i + 1)))
        .collect();
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }

    let added = state
        .guests
        .add(&event_id, inputs)
        .await
        .ok_or_else(|| ApiError::Conflict("one or more guest ids already exist".to_string()))?;
    let ids: Vec<&str> = added.iter().map(|g| g.id.as_str()).collect();
    notify_guest_changes(
        &state,
        &event_id,
        &[ChangeType::BulkGuestsAdded],
        json!({ "count": added.len(), "guestIds": ids }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn update_guest(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(String, String)>,
    Json(input): Json<GuestInput>,
) -> ApiResult<Json<Guest>> {
    let problems = input.problems();
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems));
    }
    let (before, after) = state
        .guests
        .replace(&event_id, &guest_id, input)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("guest {guest_id}")))?;

    let changes = describe_changes(&before, &after, ChangeType::GuestUpdated);
    notify_guest_changes(&state, &event_id, &changes, guest_summary(&after)).await;
    Ok(Json(after))
}

async fn update_rsvp(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(String, String)>,
    Json(rsvp): Json<RsvpUpdate>,
) -> ApiResult<Json<Guest>> {
    if rsvp.attending_count == Some(0) && rsvp.status == seating_engine::GuestStatus::Confirmed {
        return Err(ApiError::Validation(vec![
            "a confirmed RSVP must bring at least 1 person".to_string(),
        ]));
    }
    let (before, after) = state
        .guests
        .apply_rsvp(&event_id, &guest_id, &rsvp)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("guest {guest_id}")))?;

    let primary = if rsvp.via_public_link {
        ChangeType::RsvpUpdatedPublic
    } else {
        ChangeType::RsvpUpdated
    };
    let changes = describe_changes(&before, &after, primary);
    notify_guest_changes(&state, &event_id, &changes, guest_summary(&after)).await;
    Ok(Json(after))
}

async fn delete_guest(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let removed = state
        .guests
        .remove(&event_id, &guest_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("guest {guest_id}")))?;

    notify_guest_changes(&state, &event_id, &[ChangeType::GuestDeleted], guest_summary(&removed)).await;
    Ok(StatusCode::NO_CONTENT)
}
