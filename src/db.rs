use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    CanonicalStage, Candidate, Dataset, Disposition, Event, EventType, ReqStatus, Requisition, User,
    UserRole,
};
use crate::stages::{extract_all_stages, validate_mapping_completeness, StageMapping};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn parse_field<T: FromStr<Err = String>>(value: &str, column: &str) -> anyhow::Result<T> {
    value
        .parse::<T>()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("invalid {column}"))
}

pub async fn upsert_user(pool: &PgPool, user: &User) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO recruiting_analytics.users (user_id, name, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE
        SET name = EXCLUDED.name, role = EXCLUDED.role
        "#,
    )
    .bind(&user.user_id)
    .bind(&user.name)
    .bind(user.role.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_requisition(pool: &PgPool, req: &Requisition) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO recruiting_analytics.requisitions
        (req_id, title, status, recruiter_id, hiring_manager_id, opened_at, closed_at, level, job_family, region)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (req_id) DO UPDATE
        SET title = EXCLUDED.title,
            status = EXCLUDED.status,
            recruiter_id = EXCLUDED.recruiter_id,
            hiring_manager_id = EXCLUDED.hiring_manager_id,
            opened_at = EXCLUDED.opened_at,
            closed_at = EXCLUDED.closed_at,
            level = EXCLUDED.level,
            job_family = EXCLUDED.job_family,
            region = EXCLUDED.region
        "#,
    )
    .bind(&req.req_id)
    .bind(&req.title)
    .bind(req.status.as_str())
    .bind(&req.recruiter_id)
    .bind(&req.hiring_manager_id)
    .bind(req.opened_at)
    .bind(req.closed_at)
    .bind(&req.level)
    .bind(&req.job_family)
    .bind(&req.region)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_candidate(pool: &PgPool, candidate: &Candidate) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO recruiting_analytics.candidates
        (candidate_id, req_id, source, disposition, current_stage, current_stage_entered_at, first_contact_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (candidate_id, req_id) DO UPDATE
        SET source = EXCLUDED.source,
            disposition = EXCLUDED.disposition,
            current_stage = EXCLUDED.current_stage,
            current_stage_entered_at = EXCLUDED.current_stage_entered_at,
            first_contact_at = EXCLUDED.first_contact_at
        "#,
    )
    .bind(&candidate.candidate_id)
    .bind(&candidate.req_id)
    .bind(&candidate.source)
    .bind(candidate.disposition.as_str())
    .bind(&candidate.current_stage)
    .bind(candidate.current_stage_entered_at)
    .bind(candidate.first_contact_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Events are append-only; a repeated `source_key` is ignored. Returns whether a row was written.
pub async fn insert_event(pool: &PgPool, event: &Event, source_key: Option<String>) -> anyhow::Result<bool> {
    let source_key = source_key.unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
    let result = sqlx::query(
        r#"
        INSERT INTO recruiting_analytics.events
        (id, source_key, candidate_id, req_id, event_type, from_stage, to_stage, actor_user_id, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(source_key)
    .bind(&event.candidate_id)
    .bind(&event.req_id)
    .bind(event.event_type.as_str())
    .bind(&event.from_stage)
    .bind(&event.to_stage)
    .bind(&event.actor_user_id)
    .bind(event.occurred_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn at(year: i32, month: u32, day: u32, hour: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .context("invalid seed timestamp")
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = [
        ("rec-ava", "Ava Chen", UserRole::Recruiter),
        ("rec-sam", "Sam Ortiz", UserRole::Recruiter),
        ("hm-lee", "Jordan Lee", UserRole::HiringManager),
        ("hm-kim", "Robin Kim", UserRole::HiringManager),
    ];
    for (user_id, name, role) in users {
        upsert_user(
            pool,
            &User {
                user_id: user_id.to_string(),
                name: name.to_string(),
                role,
            },
        )
        .await?;
    }

    let requisitions = [
        (
            "REQ-101",
            "Senior Backend Engineer",
            ReqStatus::Closed,
            "rec-ava",
            "hm-lee",
            at(2026, 1, 5, 9)?,
            Some(at(2026, 2, 20, 17)?),
            "senior",
            "engineering",
            "remote",
        ),
        (
            "REQ-102",
            "Account Executive",
            ReqStatus::Open,
            "rec-sam",
            "hm-kim",
            at(2026, 2, 1, 9)?,
            None,
            "mid",
            "sales",
            "emea",
        ),
        (
            "REQ-103",
            "Staff Data Engineer",
            ReqStatus::Open,
            "rec-ava",
            "hm-lee",
            at(2025, 10, 1, 9)?,
            None,
            "staff",
            "engineering",
            "apac",
        ),
    ];
    for (req_id, title, status, recruiter, hm, opened_at, closed_at, level, family, region) in requisitions {
        upsert_requisition(
            pool,
            &Requisition {
                req_id: req_id.to_string(),
                title: title.to_string(),
                status,
                recruiter_id: recruiter.to_string(),
                hiring_manager_id: hm.to_string(),
                opened_at,
                closed_at,
                level: Some(level.to_string()),
                job_family: Some(family.to_string()),
                region: Some(region.to_string()),
            },
        )
        .await?;
    }

    let candidates = [
        ("C-1", "REQ-101", "referral", Disposition::Hired, "Hired", at(2026, 2, 18, 10)?, at(2026, 1, 8, 10)?),
        ("C-2", "REQ-101", "inbound", Disposition::Rejected, "Rejected", at(2026, 2, 2, 15)?, at(2026, 1, 10, 11)?),
        ("C-3", "REQ-102", "linkedin", Disposition::Active, "Onsite Loop", at(2026, 2, 20, 13)?, at(2026, 2, 3, 9)?),
        ("C-4", "REQ-103", "agency", Disposition::Active, "Phone Screen", at(2025, 11, 1, 12)?, at(2025, 10, 28, 9)?),
    ];
    for (candidate_id, req_id, source, disposition, stage, entered_at, first_contact) in candidates {
        upsert_candidate(
            pool,
            &Candidate {
                candidate_id: candidate_id.to_string(),
                req_id: req_id.to_string(),
                source: source.to_string(),
                disposition,
                current_stage: stage.to_string(),
                current_stage_entered_at: entered_at,
                first_contact_at: Some(first_contact),
            },
        )
        .await?;
    }

    let events = [
        ("seed-001", "C-1", "REQ-101", EventType::StageChange, Some("Applied"), Some("Phone Screen"), Some("rec-ava"), at(2026, 1, 10, 9)?),
        ("seed-002", "C-1", "REQ-101", EventType::StageChange, Some("Phone Screen"), Some("HM Phone Screen"), Some("rec-ava"), at(2026, 1, 15, 9)?),
        ("seed-003", "C-1", "REQ-101", EventType::FeedbackSubmitted, None, None, Some("hm-lee"), at(2026, 1, 17, 14)?),
        ("seed-004", "C-1", "REQ-101", EventType::StageChange, Some("HM Phone Screen"), Some("Onsite Loop"), Some("rec-ava"), at(2026, 1, 22, 9)?),
        ("seed-005", "C-1", "REQ-101", EventType::InterviewCompleted, None, None, Some("hm-lee"), at(2026, 1, 29, 16)?),
        ("seed-006", "C-1", "REQ-101", EventType::StageChange, Some("Onsite Loop"), Some("Offer Extended"), Some("hm-lee"), at(2026, 2, 3, 11)?),
        ("seed-007", "C-1", "REQ-101", EventType::OfferAccepted, None, None, Some("rec-ava"), at(2026, 2, 10, 10)?),
        ("seed-008", "C-1", "REQ-101", EventType::StageChange, Some("Offer Extended"), Some("Hired"), Some("rec-ava"), at(2026, 2, 18, 10)?),
        ("seed-009", "C-2", "REQ-101", EventType::StageChange, Some("Applied"), Some("Phone Screen"), Some("rec-ava"), at(2026, 1, 12, 9)?),
        ("seed-010", "C-2", "REQ-101", EventType::StageChange, Some("Phone Screen"), Some("Rejected"), Some("rec-ava"), at(2026, 2, 2, 15)?),
        ("seed-011", "C-3", "REQ-102", EventType::StageChange, Some("Applied"), Some("Phone Screen"), Some("rec-sam"), at(2026, 2, 5, 10)?),
        ("seed-012", "C-3", "REQ-102", EventType::StageChange, Some("Phone Screen"), Some("HM Phone Screen"), Some("rec-sam"), at(2026, 2, 10, 10)?),
        ("seed-013", "C-3", "REQ-102", EventType::StageChange, Some("HM Phone Screen"), Some("Onsite Loop"), Some("hm-kim"), at(2026, 2, 20, 13)?),
        ("seed-014", "C-4", "REQ-103", EventType::StageChange, Some("Applied"), Some("Phone Screen"), Some("rec-ava"), at(2025, 11, 1, 12)?),
    ];
    for (source_key, candidate_id, req_id, event_type, from, to, actor, occurred_at) in events {
        let event = Event {
            candidate_id: candidate_id.to_string(),
            req_id: req_id.to_string(),
            event_type,
            from_stage: from.map(str::to_string),
            to_stage: to.map(str::to_string),
            actor_user_id: actor.map(str::to_string),
            occurred_at,
        };
        insert_event(pool, &event, Some(source_key.to_string())).await?;
    }

    Ok(())
}

/// Loads the full snapshot. Rows with unparseable enum columns are skipped with a warning.
pub async fn fetch_dataset(pool: &PgPool) -> anyhow::Result<Dataset> {
    let mut dataset = Dataset::default();

    let rows = sqlx::query("SELECT user_id, name, role FROM recruiting_analytics.users ORDER BY user_id")
        .fetch_all(pool)
        .await
        .context("failed to load users")?;
    for row in rows {
        let user_id: String = row.get("user_id");
        let role: String = row.get("role");
        match parse_field::<UserRole>(&role, "role") {
            Ok(role) => dataset.users.push(User {
                user_id,
                name: row.get("name"),
                role,
            }),
            Err(err) => warn!(user_id = %user_id, error = %err, "skipping user"),
        }
    }

    let rows = sqlx::query(
        "SELECT req_id, title, status, recruiter_id, hiring_manager_id, opened_at, closed_at, \
         level, job_family, region \
         FROM recruiting_analytics.requisitions ORDER BY req_id",
    )
    .fetch_all(pool)
    .await
    .context("failed to load requisitions")?;
    for row in rows {
        let req_id: String = row.get("req_id");
        let status: String = row.get("status");
        match parse_field::<ReqStatus>(&status, "status") {
            Ok(status) => dataset.requisitions.push(Requisition {
                req_id,
                title: row.get("title"),
                status,
                recruiter_id: row.get("recruiter_id"),
                hiring_manager_id: row.get("hiring_manager_id"),
                opened_at: row.get("opened_at"),
                closed_at: row.get("closed_at"),
                level: row.get("level"),
                job_family: row.get("job_family"),
                region: row.get("region"),
            }),
            Err(err) => warn!(req_id = %req_id, error = %err, "skipping requisition"),
        }
    }

    let rows = sqlx::query(
        "SELECT candidate_id, req_id, source, disposition, current_stage, current_stage_entered_at, \
         first_contact_at \
         FROM recruiting_analytics.candidates ORDER BY req_id, candidate_id",
    )
    .fetch_all(pool)
    .await
    .context("failed to load candidates")?;
    for row in rows {
        let candidate_id: String = row.get("candidate_id");
        let disposition: String = row.get("disposition");
        match parse_field::<Disposition>(&disposition, "disposition") {
            Ok(disposition) => dataset.candidates.push(Candidate {
                candidate_id,
                req_id: row.get("req_id"),
                source: row.get("source"),
                disposition,
                current_stage: row.get("current_stage"),
                current_stage_entered_at: row.get("current_stage_entered_at"),
                first_contact_at: row.get("first_contact_at"),
            }),
            Err(err) => warn!(candidate_id = %candidate_id, error = %err, "skipping candidate"),
        }
    }

    let rows = sqlx::query(
        "SELECT candidate_id, req_id, event_type, from_stage, to_stage, actor_user_id, occurred_at \
         FROM recruiting_analytics.events ORDER BY occurred_at, source_key",
    )
    .fetch_all(pool)
    .await
    .context("failed to load events")?;
    for row in rows {
        let event_type: String = row.get("event_type");
        dataset.events.push(Event {
            candidate_id: row.get("candidate_id"),
            req_id: row.get("req_id"),
            event_type: EventType::parse_lenient(&event_type),
            from_stage: row.get("from_stage"),
            to_stage: row.get("to_stage"),
            actor_user_id: row.get("actor_user_id"),
            occurred_at: row.get("occurred_at"),
        });
    }

    debug!(
        requisitions = dataset.requisitions.len(),
        candidates = dataset.candidates.len(),
        events = dataset.events.len(),
        users = dataset.users.len(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Stored mapping with `observed` and completeness refreshed against `dataset`.
pub async fn load_stage_mapping(pool: &PgPool, dataset: &Dataset) -> anyhow::Result<StageMapping> {
    let rows = sqlx::query("SELECT raw_stage, canonical_stage FROM recruiting_analytics.stage_mappings")
        .fetch_all(pool)
        .await
        .context("failed to load stage mappings")?;
    let mut mappings = BTreeMap::new();
    for row in rows {
        let raw: String = row.get("raw_stage");
        let stage: String = row.get("canonical_stage");
        match parse_field::<CanonicalStage>(&stage, "canonical_stage") {
            Ok(stage) => {
                mappings.insert(raw, stage);
            }
            Err(err) => warn!(raw_stage = %raw, error = %err, "ignoring stored stage mapping"),
        }
    }

    let mut mapping = StageMapping {
        mappings,
        observed: extract_all_stages(&dataset.candidates, &dataset.events),
        is_complete: false,
    };
    mapping.is_complete = validate_mapping_completeness(&mapping, &dataset.events).is_complete;
    Ok(mapping)
}

/// Replaces the stored mapping with `mapping` in one transaction.
pub async fn save_stage_mapping(pool: &PgPool, mapping: &StageMapping) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM recruiting_analytics.stage_mappings")
        .execute(&mut *tx)
        .await?;
    for (raw, stage) in &mapping.mappings {
        sqlx::query(
            "INSERT INTO recruiting_analytics.stage_mappings (raw_stage, canonical_stage) VALUES ($1, $2)",
        )
        .bind(raw)
        .bind(stage.as_str())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await.context("failed to save stage mappings")?;
    Ok(mapping.mappings.len())
}

pub async fn load_exclusions(pool: &PgPool) -> anyhow::Result<BTreeSet<String>> {
    let rows = sqlx::query("SELECT req_id FROM recruiting_analytics.ttf_exclusions")
        .fetch_all(pool)
        .await
        .context("failed to load exclusions")?;
    Ok(rows
        .into_iter()
        .map(|row| row.get::<String, _>("req_id"))
        .collect())
}

pub async fn add_exclusion(pool: &PgPool, req_id: &str) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO recruiting_analytics.ttf_exclusions (req_id) VALUES ($1) ON CONFLICT (req_id) DO NOTHING",
    )
    .bind(req_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_exclusion(pool: &PgPool, req_id: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM recruiting_analytics.ttf_exclusions WHERE req_id = $1")
        .bind(req_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(serde::Deserialize)]
struct RequisitionRow {
    req_id: String,
    title: String,
    status: String,
    recruiter_id: String,
    hiring_manager_id: String,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    level: Option<String>,
    job_family: Option<String>,
    region: Option<String>,
}

#[derive(serde::Deserialize)]
struct CandidateRow {
    candidate_id: String,
    req_id: String,
    source: String,
    disposition: String,
    current_stage: String,
    current_stage_entered_at: DateTime<Utc>,
    first_contact_at: Option<DateTime<Utc>>,
}

#[derive(serde::Deserialize)]
struct EventRow {
    candidate_id: String,
    req_id: String,
    event_type: String,
    from_stage: Option<String>,
    to_stage: Option<String>,
    actor_user_id: Option<String>,
    occurred_at: DateTime<Utc>,
    source_key: Option<String>,
}

#[derive(serde::Deserialize)]
struct UserRow {
    user_id: String,
    name: String,
    role: String,
}

fn row_context(line: usize) -> String {
    format!("CSV row {line}")
}

pub async fn import_requisitions(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut written = 0usize;
    for (index, result) in reader.deserialize::<RequisitionRow>().enumerate() {
        let row = result.with_context(|| row_context(index + 2))?;
        let req = Requisition {
            status: parse_field(&row.status, "status").with_context(|| row_context(index + 2))?,
            req_id: row.req_id,
            title: row.title,
            recruiter_id: row.recruiter_id,
            hiring_manager_id: row.hiring_manager_id,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
            level: row.level,
            job_family: row.job_family,
            region: row.region,
        };
        upsert_requisition(pool, &req).await?;
        written += 1;
    }
    Ok(written)
}

pub async fn import_candidates(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut written = 0usize;
    for (index, result) in reader.deserialize::<CandidateRow>().enumerate() {
        let row = result.with_context(|| row_context(index + 2))?;
        let candidate = Candidate {
            disposition: parse_field(&row.disposition, "disposition")
                .with_context(|| row_context(index + 2))?,
            candidate_id: row.candidate_id,
            req_id: row.req_id,
            source: row.source,
            current_stage: row.current_stage,
            current_stage_entered_at: row.current_stage_entered_at,
            first_contact_at: row.first_contact_at,
        };
        upsert_candidate(pool, &candidate).await?;
        written += 1;
    }
    Ok(written)
}

pub async fn import_events(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;
    for (index, result) in reader.deserialize::<EventRow>().enumerate() {
        let row = result.with_context(|| row_context(index + 2))?;
        let event_type = EventType::parse_lenient(&row.event_type);
        if event_type == EventType::Other {
            debug!(line = index + 2, event_type = %row.event_type, "unrecognised event type");
        }
        let event = Event {
            candidate_id: row.candidate_id,
            req_id: row.req_id,
            event_type,
            from_stage: row.from_stage,
            to_stage: row.to_stage,
            actor_user_id: row.actor_user_id,
            occurred_at: row.occurred_at,
        };
        if insert_event(pool, &event, row.source_key).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

pub async fn import_users(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut written = 0usize;
    for (index, result) in reader.deserialize::<UserRow>().enumerate() {
        let row = result.with_context(|| row_context(index + 2))?;
        let user = User {
            role: parse_field(&row.role, "role").with_context(|| row_context(index + 2))?,
            user_id: row.user_id,
            name: row.name,
        };
        upsert_user(pool, &user).await?;
        written += 1;
    }
    Ok(written)
}
