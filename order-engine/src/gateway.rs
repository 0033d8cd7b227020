//! Mutation Gateway
//!
//! Sends one status write to the order store. Business rules are checked
//! by the caller beforehand; the gateway never touches the local view and
//! never triggers a re-fetch (the change feed closes the loop).

use crate::audit_log;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::reconcile::Clock;
use crate::store::OrderStore;
use shared::order::{OrderStatus, StatusUpdate};
use std::sync::Arc;
use std::time::Duration;

pub struct MutationGateway {
    store: Arc<dyn OrderStore>,
    tenant_id: String,
    timeout: Duration,
    clock: Clock,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn OrderStore>, config: &EngineConfig, clock: Clock) -> Self {
        Self {
            store,
            tenant_id: config.tenant_id.clone(),
            timeout: config.mutation_timeout,
            clock,
        }
    }

    /// Write `requested` for `order_id`.
    ///
    /// A transition into `delivered` carries its completion instant in the
    /// same write. `expected` makes the write conditional on the current
    /// status (conflict otherwise).
    pub async fn submit(
        &self,
        order_id: &str,
        requested: OrderStatus,
        expected: Option<OrderStatus>,
    ) -> EngineResult<()> {
        let mut update = StatusUpdate::new(requested, (self.clock)());
        if let Some(expected) = expected {
            update = update.expecting(expected);
        }

        let result = match tokio::time::timeout(
            self.timeout,
            self.store.update_order_status(order_id, update),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::timeout(format!(
                "Status update exceeded {}ms",
                self.timeout.as_millis()
            ))),
        };

        let resource = format!("order:{}", order_id);
        match &result {
            Ok(()) => {
                audit_log!(
                    self.tenant_id.as_str(),
                    "status_update",
                    resource.as_str(),
                    format!("-> {}", requested).as_str()
                );
            }
            Err(e) => {
                tracing::warn!(order_id = %order_id, requested = %requested, error = %e, "Status update failed");
                audit_log!(
                    self.tenant_id.as_str(),
                    "status_update_failed",
                    resource.as_str(),
                    format!("-> {}: {}", requested, e).as_str()
                );
            }
        }

        result
    }
}
