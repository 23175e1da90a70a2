//! Five-domain health composite (spec.md §4.7).

use chrono::Utc;

use crate::error::Result;
use crate::storage::Storage;

use super::stats::ProviderStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy)]
pub struct DomainHealth {
    pub status: HealthStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsReport {
    pub queue: DomainHealth,
    pub storage: DomainHealth,
    pub index: DomainHealth,
    pub provider: DomainHealth,
    pub mutation: DomainHealth,
    pub overall: HealthStatus,
}

fn worst(statuses: &[HealthStatus]) -> HealthStatus {
    if statuses.iter().any(|s| *s == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if statuses.iter().any(|s| *s == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn queue_health(storage: &Storage) -> Result<DomainHealth> {
    let (pending, completed, dead): (i64, i64, i64) = storage.read(|conn| {
        let pending: i64 = conn.query_row("SELECT COUNT(*) FROM memory_jobs WHERE status = 'pending'", [], |r| r.get(0))?;
        let completed: i64 = conn.query_row("SELECT COUNT(*) FROM memory_jobs WHERE status = 'completed'", [], |r| r.get(0))?;
        let dead: i64 = conn.query_row("SELECT COUNT(*) FROM memory_jobs WHERE status = 'dead'", [], |r| r.get(0))?;
        Ok((pending, completed, dead))
    })?;

    let dead_rate = if completed + dead > 0 { dead as f64 / (completed + dead) as f64 } else { 0.0 };
    let status = if pending > 1000 || dead_rate > 0.2 {
        HealthStatus::Unhealthy
    } else if pending > 200 || dead_rate > 0.05 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    Ok(DomainHealth { status })
}

fn storage_health(storage: &Storage) -> Result<DomainHealth> {
    let (total, deleted): (i64, i64) = storage.read(|conn| {
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
        let deleted: i64 = conn.query_row("SELECT COUNT(*) FROM memories WHERE is_deleted = 1", [], |r| r.get(0))?;
        Ok((total, deleted))
    })?;

    let tombstone_ratio = if total > 0 { deleted as f64 / total as f64 } else { 0.0 };
    let status = if tombstone_ratio > 0.5 {
        HealthStatus::Unhealthy
    } else if tombstone_ratio > 0.25 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    Ok(DomainHealth { status })
}

fn index_health(storage: &Storage) -> Result<DomainHealth> {
    let (fts_rows, active, embedded): (i64, i64, i64) = storage.read(|conn| {
        let fts_rows: i64 = conn.query_row("SELECT COUNT(*) FROM memories_fts", [], |r| r.get(0))?;
        let active: i64 = conn.query_row("SELECT COUNT(*) FROM memories WHERE is_deleted = 0", [], |r| r.get(0))?;
        let embedded: i64 =
            conn.query_row("SELECT COUNT(*) FROM memories WHERE is_deleted = 0 AND embedding_model IS NOT NULL", [], |r| r.get(0))?;
        Ok((fts_rows, active, embedded))
    })?;

    let ratio = if active > 0 { fts_rows as f64 / active as f64 } else { 1.0 };
    let coverage = if active > 0 { embedded as f64 / active as f64 } else { 1.0 };

    let status = if ratio > 1.1 || ratio < 0.9 {
        HealthStatus::Unhealthy
    } else if coverage < 0.5 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    Ok(DomainHealth { status })
}

fn provider_health(stats: ProviderStats) -> DomainHealth {
    let total = stats.success + stats.failure + stats.timeout;
    if total == 0 {
        return DomainHealth { status: HealthStatus::Healthy };
    }
    let availability = stats.success as f64 / total as f64;
    let status = if availability < 0.5 {
        HealthStatus::Unhealthy
    } else if availability < 0.9 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    DomainHealth { status }
}

fn mutation_health(storage: &Storage) -> Result<DomainHealth> {
    let cutoff = (Utc::now() - chrono::Duration::days(7)).to_rfc3339();
    let (recoveries, deletes): (i64, i64) = storage.read(|conn| {
        let recoveries: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_history WHERE event = 'RECOVER' AND created_at >= ?1",
            rusqlite::params![cutoff],
            |r| r.get(0),
        )?;
        let deletes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_history WHERE event = 'DELETE' AND created_at >= ?1",
            rusqlite::params![cutoff],
            |r| r.get(0),
        )?;
        Ok((recoveries, deletes))
    })?;

    let status = if recoveries > 50 || deletes > 200 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    Ok(DomainHealth { status })
}

pub fn compose(storage: &Storage, provider_stats: ProviderStats) -> Result<DiagnosticsReport> {
    let queue = queue_health(storage)?;
    let storage_domain = storage_health(storage)?;
    let index = index_health(storage)?;
    let provider = provider_health(provider_stats);
    let mutation = mutation_health(storage)?;
    let overall = worst(&[queue.status, storage_domain.status, index.status, provider.status, mutation.status]);

    Ok(DiagnosticsReport { queue, storage: storage_domain, index, provider, mutation, overall })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_is_healthy() {
        let storage = Storage::open(None).unwrap();
        let report = compose(&storage, ProviderStats::default()).unwrap();
        assert_eq!(report.overall, HealthStatus::Healthy);
    }

    #[test]
    fn low_provider_availability_is_unhealthy() {
        let stats = ProviderStats { success: 1, failure: 9, timeout: 0 };
        assert_eq!(provider_health(stats).status, HealthStatus::Unhealthy);
    }
}
