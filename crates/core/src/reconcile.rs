//! Startup consistency check between the maps and the backing store.
//!
//! Partial failures leave the maps and the backing store out of step. This
//! pass finds the drift and reports it; it never repairs anything.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::controller::LifecycleController;
use crate::credentials::CredentialIssuer;
use crate::provisioner::{RawState, ResourceProvisioner};
use broker_storage::SnapshotStore;

/// Drift found by [`LifecycleController::reconcile`]. All lists hold public ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Instances checked against the provisioner.
    pub checked: usize,
    /// Instances whose backing resource reports neither pending nor running.
    pub missing_resources: Vec<String>,
    /// Instances whose state could not be read at all.
    pub unreachable: Vec<String>,
    /// Instances with no recorded credential.
    pub missing_credentials: Vec<String>,
    /// Credentials keyed by an instance that no longer exists.
    pub orphan_credentials: Vec<String>,
    /// Bindings that reference an instance that no longer exists.
    pub orphan_bindings: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.missing_resources.is_empty()
            && self.unreachable.is_empty()
            && self.missing_credentials.is_empty()
            && self.orphan_credentials.is_empty()
            && self.orphan_bindings.is_empty()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} instances checked: {} missing resources, {} unreachable, {} missing credentials, {} orphan credentials, {} orphan bindings",
            self.checked,
            self.missing_resources.len(),
            self.unreachable.len(),
            self.missing_credentials.len(),
            self.orphan_credentials.len(),
            self.orphan_bindings.len(),
        )
    }
}

impl<P, C, S> LifecycleController<P, C, S>
where
    P: ResourceProvisioner,
    C: CredentialIssuer,
    S: SnapshotStore,
{
    /// Compare every recorded entity against the provisioner and the other
    /// maps. Read-only; nothing is changed or persisted.
    pub async fn reconcile(&self) -> ReconcileReport {
        let instances = self.instances.read().await;
        let credentials = self.credentials.read().await;
        let bindings = self.bindings.read().await;

        let mut report = ReconcileReport::default();

        for (id, instance) in instances.iter() {
            report.checked += 1;
            let state = tokio::time::timeout(
                self.settings.call_timeout,
                self.provisioner.get_state(&instance.internal_id),
            )
            .await;
            match state {
                Ok(Ok(RawState::Pending | RawState::Running)) => {}
                Ok(Ok(RawState::Other(word))) => {
                    warn!(instance_id = %id, internal_id = %instance.internal_id, state = %word, "backing resource not found");
                    report.missing_resources.push(id.clone());
                }
                Ok(Err(e)) => {
                    warn!(instance_id = %id, internal_id = %instance.internal_id, error = %e, "backing resource state unreadable");
                    report.unreachable.push(id.clone());
                }
                Err(_) => {
                    warn!(instance_id = %id, internal_id = %instance.internal_id, "backing resource state poll timed out");
                    report.unreachable.push(id.clone());
                }
            }

            if !credentials.contains_key(id) {
                warn!(instance_id = %id, internal_id = %instance.internal_id, "instance has no credential");
                report.missing_credentials.push(id.clone());
            }
        }

        for id in credentials.keys().filter(|id| !instances.contains_key(*id)) {
            warn!(instance_id = %id, "credential for unknown instance");
            report.orphan_credentials.push(id.clone());
        }

        for (id, binding) in bindings
            .iter()
            .filter(|(_, b)| !instances.contains_key(&b.instance_id))
        {
            warn!(binding_id = %id, instance_id = %binding.instance_id, "binding references unknown instance");
            report.orphan_bindings.push(id.clone());
        }

        if report.is_clean() {
            info!(checked = report.checked, "reconcile found no drift");
        } else {
            warn!(%report, "reconcile found drift");
        }
        report
    }
}
