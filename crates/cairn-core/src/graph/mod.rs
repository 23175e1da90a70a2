//! Extracted entity graph: entities, relations, and memory-entity mention
//! links (spec.md §3 Extracted entity graph).

use chrono::Utc;
use rusqlite::{OptionalExtension, Transaction, params};

use crate::util::normalize_content;

/// Upserts an entity by canonical name, incrementing `mentions`, and
/// returns its id.
pub fn upsert_entity(tx: &Transaction, name: &str, entity_type: Option<&str>) -> rusqlite::Result<String> {
    let canonical = normalize_content(name);
    let now = Utc::now().to_rfc3339();

    if let Some(id) = tx
        .query_row("SELECT id FROM entities WHERE canonical_name = ?1", params![canonical], |r| r.get(0))
        .optional()?
    {
        tx.execute(
            "UPDATE entities SET mentions = mentions + 1, updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        let id: String = id;
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO entities (id, name, canonical_name, entity_type, mentions, created_at, updated_at)
         VALUES (?1,?2,?3,?4,1,?5,?5)",
        params![id, name, canonical, entity_type, now],
    )?;
    Ok(id)
}

/// Upserts a relation keyed by (source, target, type), updating strength
/// and confidence as a running mean (spec.md §3).
pub fn upsert_relation(
    tx: &Transaction,
    source_entity: &str,
    target_entity: &str,
    relation_type: &str,
    confidence: f32,
) -> rusqlite::Result<()> {
    let now = Utc::now().to_rfc3339();
    let existing: Option<(String, i64, f32)> = tx
        .query_row(
            "SELECT id, mentions, confidence FROM relations
             WHERE source_entity = ?1 AND target_entity = ?2 AND relation_type = ?3",
            params![source_entity, target_entity, relation_type],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;

    match existing {
        Some((id, mentions, running_confidence)) => {
            let new_mentions = mentions + 1;
            let new_confidence = (running_confidence * mentions as f32 + confidence) / new_mentions as f32;
            tx.execute(
                "UPDATE relations SET mentions = ?1, confidence = ?2, updated_at = ?3 WHERE id = ?4",
                params![new_mentions, new_confidence, now, id],
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO relations (id, source_entity, target_entity, relation_type, strength, mentions, confidence, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,0.5,1,?5,?6,?6)",
                params![uuid::Uuid::new_v4().to_string(), source_entity, target_entity, relation_type, confidence, now],
            )?;
        }
    }
    Ok(())
}

/// Links a memory to an entity it mentions, idempotently.
pub fn link_mention(tx: &Transaction, memory_id: &str, entity_id: &str) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO memory_entity_mentions (id, memory_id, entity_id, created_at)
         VALUES (?1,?2,?3,?4)",
        params![uuid::Uuid::new_v4().to_string(), memory_id, entity_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Decrements mentions for an entity, deleting it (and cascading its
/// relations) once mentions reach 0. Used by the retention sweeper after
/// purging mention rows for expired tombstones (spec.md §4.2 step 1).
pub fn decrement_entity_mentions(tx: &Transaction, entity_id: &str) -> rusqlite::Result<()> {
    tx.execute("UPDATE entities SET mentions = mentions - 1 WHERE id = ?1 AND mentions > 0", params![entity_id])?;
    let mentions: i64 =
        tx.query_row("SELECT mentions FROM entities WHERE id = ?1", params![entity_id], |r| r.get(0)).unwrap_or(0);
    if mentions <= 0 {
        tx.execute(
            "DELETE FROM relations WHERE source_entity = ?1 OR target_entity = ?1",
            params![entity_id],
        )?;
        tx.execute("DELETE FROM entities WHERE id = ?1", params![entity_id])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn upsert_entity_increments_mentions_on_repeat() {
        let storage = Storage::open(None).unwrap();
        storage
            .write_txn(|tx| {
                let id1 = upsert_entity(tx, "PostgreSQL", Some("technology"))?;
                let id2 = upsert_entity(tx, "postgresql", Some("technology"))?;
                assert_eq!(id1, id2);
                let mentions: i64 = tx.query_row("SELECT mentions FROM entities WHERE id = ?1", params![id1], |r| r.get(0))?;
                assert_eq!(mentions, 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn entity_deleted_when_mentions_reach_zero() {
        let storage = Storage::open(None).unwrap();
        storage
            .write_txn(|tx| {
                let id = upsert_entity(tx, "Temp", None)?;
                upsert_relation(tx, &id, &id, "self", 0.5)?;
                decrement_entity_mentions(tx, &id)?;
                let count: i64 = tx.query_row("SELECT COUNT(*) FROM entities WHERE id = ?1", params![id], |r| r.get(0))?;
                assert_eq!(count, 0);
                let relations: i64 = tx.query_row("SELECT COUNT(*) FROM relations", [], |r| r.get(0))?;
                assert_eq!(relations, 0);
                Ok(())
            })
            .unwrap();
    }
}
