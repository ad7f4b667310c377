use std::collections::HashMap;

use mint::{Amount, Session};

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub session_id: String,
    pub quantity: u32,
}

/// Amount → open session map, rebuilt from the store at the start of every
/// observer cycle. Keys are integer base-unit amounts; the engine's
/// unique-amount invariant rules out collisions.
#[derive(Debug, Default)]
pub struct PendingIndex {
    by_amount: HashMap<u64, PendingEntry>,
}

impl PendingIndex {
    pub fn build(sessions: &[Session]) -> Self {
        let by_amount = sessions
            .iter()
            .filter(|s| s.is_open())
            .map(|s| {
                (
                    s.amount_due.base_units(),
                    PendingEntry {
                        session_id: s.session_id.clone(),
                        quantity: s.quantity,
                    },
                )
            })
            .collect();

        Self { by_amount }
    }

    pub fn is_empty(&self) -> bool {
        self.by_amount.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_amount.len()
    }

    /// Consume the entry matching `amount`, if any. An entry is only good
    /// for one match per cycle; the store re-checks under a transaction
    /// anyway.
    pub fn take(&mut self, amount: Amount) -> Option<PendingEntry> {
        self.by_amount.remove(&amount.base_units())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mint::{SessionStatus, Session};

    fn session(id: &str, units: u64, status: SessionStatus) -> Session {
        Session {
            session_id: id.to_string(),
            quantity: 1,
            amount_due: Amount::from_base_units(units),
            status,
            txid: None,
            assigned_refs: Vec::new(),
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn indexes_only_open_sessions() {
        let sessions = vec![
            session("a", 500_001, SessionStatus::Pending),
            session("b", 500_002, SessionStatus::PaymentPending),
            session("c", 500_003, SessionStatus::Complete),
        ];

        let mut index = PendingIndex::build(&sessions);
        assert_eq!(index.len(), 2);
        assert!(index.take(Amount::from_base_units(500_003)).is_none());

        let hit = index.take(Amount::from_base_units(500_001)).unwrap();
        assert_eq!(hit.session_id, "a");
        assert!(index.take(Amount::from_base_units(500_001)).is_none());
    }
}
