//! Audit events emitted on every cost-mutating operation.
//!
//! The engine does not own audit persistence. Events are pushed over a
//! bounded channel to a collaborator sink; a failed push is logged and
//! counted but never rolls back the cost mutation that produced it. Cost
//! correctness is the primary transaction, audit is best-effort-durable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::CostingError;
use crate::models::{AllocationMethod, PeriodId, StageCostRecord};

/// JSON snapshot of a record for the old/new value pair carried by audit
/// events. Serialization of these models cannot fail in practice; a failure
/// degrades to a null snapshot rather than aborting the cost operation.
pub fn snapshot(record: &StageCostRecord) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuditEvent {
    LaborApplied {
        mo_id: Uuid,
        stage_id: Uuid,
        period: PeriodId,
        amount: Decimal,
        entry_ids: Vec<Uuid>,
        timestamp: DateTime<Utc>,
    },
    OverheadApplied {
        mo_id: Uuid,
        stage_id: Uuid,
        period: PeriodId,
        allocation_id: Uuid,
        method: AllocationMethod,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    StageCostUpserted {
        mo_id: Uuid,
        stage_id: Uuid,
        period: PeriodId,
        old_values: Value,
        new_values: Value,
        timestamp: DateTime<Utc>,
    },
    StageClosed {
        mo_id: Uuid,
        stage_id: Uuid,
        period: PeriodId,
        transferred_out: Decimal,
        old_values: Value,
        new_values: Value,
        timestamp: DateTime<Utc>,
    },
    PeriodClosed {
        period: PeriodId,
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn operation(&self) -> &'static str {
        match self {
            AuditEvent::LaborApplied { .. } => "labor_applied",
            AuditEvent::OverheadApplied { .. } => "overhead_applied",
            AuditEvent::StageCostUpserted { .. } => "stage_cost_upserted",
            AuditEvent::StageClosed { .. } => "stage_closed",
            AuditEvent::PeriodClosed { .. } => "period_closed",
        }
    }
}

/// Sending half of the audit channel, cloned into every service.
#[derive(Debug, Clone)]
pub struct AuditSender {
    sender: mpsc::Sender<AuditEvent>,
}

impl AuditSender {
    pub fn new(sender: mpsc::Sender<AuditEvent>) -> Self {
        Self { sender }
    }

    /// Bounded-capacity channel pair for wiring an engine to a sink loop.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn send(&self, event: AuditEvent) -> Result<(), CostingError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| CostingError::AuditError(format!("Failed to send audit event: {}", e)))
    }

    /// Sends an event, logging instead of propagating on failure. Cost
    /// mutations call this so a dead audit channel cannot fail them.
    pub async fn send_or_log(&self, event: AuditEvent) {
        let operation = event.operation();
        if let Err(e) = self.send(event).await {
            counter!("costing.audit.send_failures", 1);
            error!(operation, "audit event dropped: {}", e);
        }
    }
}

/// Collaborator that records audit events durably.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn deliver(&self, event: AuditEvent) -> Result<(), CostingError>;
}

/// Default sink: structured log lines only, for environments without an
/// audit store wired up.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn deliver(&self, event: AuditEvent) -> Result<(), CostingError> {
        info!(operation = event.operation(), event = ?event, "audit");
        Ok(())
    }
}

/// Drains the audit channel into a sink. Delivery failures are logged and
/// counted; the loop keeps running until the sending side is dropped.
pub async fn process_audit_events(
    mut rx: mpsc::Receiver<AuditEvent>,
    sink: std::sync::Arc<dyn AuditSink>,
) {
    info!("Starting audit event loop");
    while let Some(event) = rx.recv().await {
        let operation = event.operation();
        if let Err(e) = sink.deliver(event).await {
            counter!("costing.audit.delivery_failures", 1);
            error!(operation, "Failed to deliver audit event: {}", e);
        }
    }
    info!("Audit event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct CollectingSink(Mutex<Vec<String>>);

    #[async_trait]
    impl AuditSink for CollectingSink {
        async fn deliver(&self, event: AuditEvent) -> Result<(), CostingError> {
            self.0.lock().await.push(event.operation().to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_flow_through_the_loop_in_order() {
        let (sender, rx) = AuditSender::channel(8);
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let handle = tokio::spawn(process_audit_events(rx, sink.clone()));

        sender
            .send(AuditEvent::PeriodClosed {
                period: PeriodId::from("2026-08"),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        drop(sender);
        handle.await.unwrap();

        assert_eq!(*sink.0.lock().await, vec!["period_closed".to_string()]);
    }

    #[tokio::test]
    async fn send_or_log_swallows_a_closed_channel() {
        let (sender, rx) = AuditSender::channel(1);
        drop(rx);
        // must not panic or return an error to the caller
        sender
            .send_or_log(AuditEvent::PeriodClosed {
                period: PeriodId::from("2026-08"),
                timestamp: Utc::now(),
            })
            .await;
    }
}
