//! Tenant-access context and capability checks.
//!
//! Every external entry point receives a resolved [`AccessContext`] from the
//! surrounding API. Non-platform callers only reach tickets of their own
//! customer; approve/discard additionally require the manage capability.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AccessError;

/// Caller tier within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    /// Customer end user — may raise tickets and read their own tenant.
    EndUser,
    /// Operator within a tenant — may manage suggestions for that tenant.
    Operator,
    /// Platform operator — crosses tenant boundaries.
    PlatformOperator,
}

/// Resolved caller identity: who, at what tier, for which customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessContext {
    pub user_id: Uuid,
    pub role: AccessRole,
    pub customer_id: Uuid,
}

impl AccessContext {
    pub fn new(user_id: Uuid, role: AccessRole, customer_id: Uuid) -> Self {
        Self {
            user_id,
            role,
            customer_id,
        }
    }

    /// Whether this caller may touch data belonging to `customer_id`.
    pub fn can_access(&self, customer_id: Uuid) -> bool {
        self.role == AccessRole::PlatformOperator || self.customer_id == customer_id
    }

    /// Whether this caller holds the manage capability for `customer_id`:
    /// operator tier within the tenant, or platform operator anywhere.
    pub fn can_manage(&self, customer_id: Uuid) -> bool {
        match self.role {
            AccessRole::PlatformOperator => true,
            AccessRole::Operator => self.customer_id == customer_id,
            AccessRole::EndUser => false,
        }
    }

    /// Fail with a tenant-boundary error unless the caller may access
    /// `customer_id`.
    pub fn ensure_access(&self, customer_id: Uuid) -> Result<(), AccessError> {
        if self.can_access(customer_id) {
            Ok(())
        } else {
            Err(AccessError::TenantBoundary {
                user_id: self.user_id,
                customer_id,
            })
        }
    }

    /// Fail unless the caller holds the manage capability for `customer_id`.
    pub fn ensure_manage(
        &self,
        customer_id: Uuid,
        action: &'static str,
    ) -> Result<(), AccessError> {
        if self.can_manage(customer_id) {
            Ok(())
        } else {
            Err(AccessError::ManageRequired {
                action,
                customer_id,
            })
        }
    }
}
