//! Alert triage state machine

use std::sync::Arc;

use chrono::Utc;

use crate::models::{AccountRef, AlertStatus, SecurityAlert};
use crate::persistence::{SecurityStore, StatusChange};

use super::LifecycleError;

/// Moves alerts between open, investigating and the terminal statuses
pub struct AlertLifecycle {
    store: Arc<dyn SecurityStore>,
}

impl AlertLifecycle {
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        AlertLifecycle { store }
    }

    /// Change an alert's status on behalf of `actor`
    ///
    /// Terminal statuses record the actor and time in the same write.
    /// `notes`, when given, replaces any earlier notes. The write only
    /// lands if the status is still the one read here, so two admins
    /// racing on the same alert cannot both close it.
    pub fn transition(
        &self,
        alert_id: i64,
        new_status: AlertStatus,
        actor: &AccountRef,
        notes: Option<String>,
    ) -> Result<SecurityAlert, LifecycleError> {
        let alert = self
            .store
            .get_alert(alert_id)?
            .ok_or(LifecycleError::NotFound(alert_id))?;

        if !alert.status.can_transition_to(new_status) {
            return Err(LifecycleError::InvalidTransition {
                from: alert.status,
                to: new_status,
            });
        }

        let now = Utc::now();
        let (resolved_by, resolved_at) = if new_status.is_terminal() {
            (Some(actor.clone()), Some(now))
        } else {
            (None, None)
        };

        let change = StatusChange {
            status: new_status,
            resolved_by,
            resolved_at,
            notes: notes.or_else(|| alert.notes.clone()),
            updated_at: now,
        };

        if !self.store.update_alert_status(alert_id, alert.status, &change)? {
            // Someone else moved it first; report against what is stored now
            let current = self
                .store
                .get_alert(alert_id)?
                .ok_or(LifecycleError::NotFound(alert_id))?;
            return Err(LifecycleError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        log::info!(
            "Alert {} moved {} -> {} by {}",
            alert_id,
            alert.status,
            new_status,
            actor
        );

        Ok(SecurityAlert {
            status: change.status,
            resolved_by: change.resolved_by,
            resolved_at: change.resolved_at,
            notes: change.notes,
            updated_at: change.updated_at,
            ..alert
        })
    }
}
