//! Replica persistence
//!
//! The whole replica is rewritten inside one transaction, so a crash mid-save
//! leaves the previous copy intact. Only what the in-memory invariants need
//! is stored: order (as `local_priority`), tier levels, flags, tags,
//! comments, the tag palette and the last sync time.

use crate::error::{Error, Result};
use crate::replica::{Replica, TierLevels, EMPTY_LEVEL};
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use tracing::{debug, info};
use triage_common::{Attachment, Comment, Record, RecordId, TagColor, TagPalette, Tier};

const LAST_UPDATE_KEY: &str = "last_update";
const PALETTE_SEEDED_KEY: &str = "palette_seeded";

fn level_key(tier: Tier) -> String {
    format!("{}_level", tier)
}

/// Persist the full replica
pub async fn save_replica(pool: &SqlitePool, replica: &Replica) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM record_comments").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM record_tags").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM tag_palette").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM replica_state").execute(&mut *tx).await?;

    for record in replica.store().iter() {
        insert_record(&mut tx, record).await?;
    }

    for (seq, tag) in replica.palette().iter().enumerate() {
        sqlx::query("INSERT INTO tag_palette (name, seq, r, g, b) VALUES (?, ?, ?, ?, ?)")
            .bind(&tag.name)
            .bind(seq as i64)
            .bind(tag.color.r as i64)
            .bind(tag.color.g as i64)
            .bind(tag.color.b as i64)
            .execute(&mut *tx)
            .await?;
    }

    let levels = replica.levels().to_signed();
    for tier in Tier::ALL {
        set_state(&mut tx, &level_key(tier), Some(levels[tier.index()].to_string())).await?;
    }
    set_state(
        &mut tx,
        LAST_UPDATE_KEY,
        replica.last_update().map(|t| t.to_rfc3339()),
    )
    .await?;
    set_state(&mut tx, PALETTE_SEEDED_KEY, Some("1".to_string())).await?;

    tx.commit().await?;

    debug!(
        "Saved replica: {} records, levels {:?}",
        replica.len(),
        levels
    );
    Ok(())
}

async fn insert_record(tx: &mut Transaction<'_, Sqlite>, record: &Record) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO records (
            id, summary, assignee, status, severity, target_milestone,
            component, operating_system, created_at, local_priority,
            is_new, requires_refresh
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.0)
    .bind(&record.summary)
    .bind(&record.assignee)
    .bind(&record.status)
    .bind(&record.severity)
    .bind(&record.target_milestone)
    .bind(&record.component)
    .bind(&record.operating_system)
    .bind(record.created_at)
    .bind(record.local_priority as i64)
    .bind(record.is_new)
    .bind(record.requires_refresh)
    .execute(&mut **tx)
    .await?;

    for (seq, tag) in record.tags().iter().enumerate() {
        sqlx::query("INSERT INTO record_tags (record_id, seq, tag) VALUES (?, ?, ?)")
            .bind(record.id.0)
            .bind(seq as i64)
            .bind(tag)
            .execute(&mut **tx)
            .await?;
    }

    for (seq, comment) in record.comments.iter().enumerate() {
        let attachment = comment
            .attachment
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to encode attachment: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO record_comments (record_id, seq, author, text, time, is_private, attachment)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.0)
        .bind(seq as i64)
        .bind(&comment.author)
        .bind(&comment.text)
        .bind(comment.time)
        .bind(comment.is_private)
        .bind(attachment)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn set_state(tx: &mut Transaction<'_, Sqlite>, key: &str, value: Option<String>) -> Result<()> {
    sqlx::query("INSERT INTO replica_state (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Load the persisted replica
///
/// An empty database yields an empty replica with the default palette.
pub async fn load_replica(pool: &SqlitePool) -> Result<Replica> {
    let state = load_state(pool).await?;

    let mut tags = load_tags(pool).await?;
    let mut comments = load_comments(pool).await?;

    let rows = sqlx::query(
        r#"
        SELECT id, summary, assignee, status, severity, target_milestone,
               component, operating_system, created_at, local_priority,
               is_new, requires_refresh
        FROM records
        ORDER BY local_priority, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let id = RecordId(row.try_get("id")?);
        let mut record = Record::new(id);
        record.summary = row.try_get("summary")?;
        record.assignee = row.try_get("assignee")?;
        record.status = row.try_get("status")?;
        record.severity = row.try_get("severity")?;
        record.target_milestone = row.try_get("target_milestone")?;
        record.component = row.try_get("component")?;
        record.operating_system = row.try_get("operating_system")?;
        record.created_at = row.try_get("created_at")?;
        record.local_priority = row.try_get::<i64, _>("local_priority")?.max(0) as usize;
        record.is_new = row.try_get("is_new")?;
        record.requires_refresh = row.try_get("requires_refresh")?;

        for tag in tags.remove(&id).unwrap_or_default() {
            record.add_tag(&tag);
        }
        record.comments = comments.remove(&id).unwrap_or_default();
        records.push(record);
    }

    let levels = TierLevels::from_signed(Tier::ALL.map(|tier| {
        state
            .get(&level_key(tier))
            .and_then(|v| v.as_deref())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(EMPTY_LEVEL)
    }));

    let last_update = match state.get(LAST_UPDATE_KEY).and_then(|v| v.as_deref()) {
        Some(text) => Some(
            DateTime::parse_from_rfc3339(text)
                .map_err(|e| Error::Internal(format!("Invalid last_update '{}': {}", text, e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    let palette = if state.contains_key(PALETTE_SEEDED_KEY) {
        load_palette(pool).await?
    } else {
        TagPalette::default()
    };

    let replica = Replica::from_parts(records, levels, palette, last_update)?;
    replica.verify_invariants()?;

    info!(
        "Loaded replica: {} records, levels {:?}",
        replica.len(),
        replica.levels().to_signed()
    );
    Ok(replica)
}

async fn load_state(pool: &SqlitePool) -> Result<HashMap<String, Option<String>>> {
    let rows = sqlx::query("SELECT key, value FROM replica_state")
        .fetch_all(pool)
        .await?;

    let mut state = HashMap::new();
    for row in rows {
        state.insert(row.try_get("key")?, row.try_get("value")?);
    }
    Ok(state)
}

async fn load_tags(pool: &SqlitePool) -> Result<HashMap<RecordId, Vec<String>>> {
    let rows = sqlx::query("SELECT record_id, tag FROM record_tags ORDER BY record_id, seq")
        .fetch_all(pool)
        .await?;

    let mut tags: HashMap<RecordId, Vec<String>> = HashMap::new();
    for row in rows {
        let id = RecordId(row.try_get("record_id")?);
        tags.entry(id).or_default().push(row.try_get("tag")?);
    }
    Ok(tags)
}

async fn load_comments(pool: &SqlitePool) -> Result<HashMap<RecordId, Vec<Comment>>> {
    let rows = sqlx::query(
        r#"
        SELECT record_id, author, text, time, is_private, attachment
        FROM record_comments
        ORDER BY record_id, seq
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut comments: HashMap<RecordId, Vec<Comment>> = HashMap::new();
    for row in rows {
        let id = RecordId(row.try_get("record_id")?);
        let attachment = row
            .try_get::<Option<String>, _>("attachment")?
            .map(|json| serde_json::from_str::<Attachment>(&json))
            .transpose()
            .map_err(|e| Error::Internal(format!("Invalid attachment for record {}: {}", id, e)))?;

        comments.entry(id).or_default().push(Comment {
            author: row.try_get("author")?,
            text: row.try_get("text")?,
            time: row.try_get("time")?,
            is_private: row.try_get("is_private")?,
            attachment,
        });
    }
    Ok(comments)
}

async fn load_palette(pool: &SqlitePool) -> Result<TagPalette> {
    let rows = sqlx::query("SELECT name, r, g, b FROM tag_palette ORDER BY seq")
        .fetch_all(pool)
        .await?;

    let mut palette = TagPalette::empty();
    for row in rows {
        let name: String = row.try_get("name")?;
        let channel = |column: &str| -> Result<u8> {
            let value: i64 = row.try_get(column)?;
            u8::try_from(value)
                .map_err(|_| Error::Internal(format!("Tag {} has invalid {} channel {}", name, column, value)))
        };
        let color = TagColor::new(channel("r")?, channel("g")?, channel("b")?);
        palette.define(&name, color);
    }
    Ok(palette)
}
