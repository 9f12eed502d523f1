use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{AuditEntry, AuditFilter};

/// In-process audit trail for tests and database-less runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: AuditEntry) {
        self.lock().push(entry);
    }

    /// Append several entries at once; nothing else observes a partial batch.
    pub fn append_all(&self, entries: impl IntoIterator<Item = AuditEntry>) {
        self.lock().extend(entries);
    }

    /// Newest-first entries for one tenant.
    pub fn list(&self, tenant_id: Uuid, filter: &AuditFilter) -> Vec<AuditEntry> {
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        self.lock()
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id && filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actions, targets, ActorType};

    #[test]
    fn test_list_is_tenant_scoped_and_newest_first() {
        let log = MemoryAuditLog::new();
        let farm_a = Uuid::new_v4();
        let farm_b = Uuid::new_v4();

        for action in [actions::RULE_PROPOSED, actions::RULE_APPROVED] {
            log.append(AuditEntry::new(
                farm_a,
                ActorType::User,
                action,
                targets::RULE_PROPOSAL,
                "p1",
            ));
        }
        log.append(AuditEntry::new(
            farm_b,
            ActorType::Ai,
            actions::RULE_PROPOSED,
            targets::RULE_PROPOSAL,
            "p2",
        ));

        let entries = log.list(farm_a, &AuditFilter::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, actions::RULE_APPROVED);
        assert!(entries.iter().all(|e| e.tenant_id == farm_a));
        assert_eq!(log.len(), 3);
    }
}
