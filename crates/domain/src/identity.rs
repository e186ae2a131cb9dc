//! Roles and request principals.

use common::Cid;
use serde::{Deserialize, Serialize};
use store::{IdentityStore, StoreError, UserRecord};
use thiserror::Error;

use crate::order::{BuyerSnapshot, ChangedBy, TransporterSnapshot};

/// Account role as recorded in the identity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Household buyer.
    Consumer,

    /// Grower who lists produce.
    Farmer,

    /// Carrier who moves shipped orders to buyers.
    #[serde(alias = "transported")]
    Transporter,

    /// Intermediary collection agent.
    Tshogpa,

    /// Bulk buyer.
    Restaurant,

    /// Platform administrator.
    SuperAdmin,
}

/// The stored role string is not one of the known roles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0:?}")]
pub struct UnknownRole(pub String);

impl Role {
    /// Returns the canonical role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Consumer => "consumer",
            Role::Farmer => "farmer",
            Role::Transporter => "transporter",
            Role::Tshogpa => "tshogpa",
            Role::Restaurant => "restaurant",
            Role::SuperAdmin => "superadmin",
        }
    }

    /// Returns true if the role may accept shipped orders for transport.
    pub fn is_transporter(&self) -> bool {
        matches!(self, Role::Transporter)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consumer" => Ok(Role::Consumer),
            "farmer" => Ok(Role::Farmer),
            // Older accounts were created with this spelling.
            "transporter" | "transported" => Ok(Role::Transporter),
            "tshogpa" => Ok(Role::Tshogpa),
            "restaurant" => Ok(Role::Restaurant),
            "superadmin" => Ok(Role::SuperAdmin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// The acting identity of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub cid: Cid,
    pub role: Role,
    pub name: String,
    pub phone_number: String,
    pub location: String,
    pub dzongkhag: String,
}

impl Principal {
    /// Builds a principal from a stored profile, parsing its role.
    pub fn from_record(record: UserRecord) -> Result<Self, UnknownRole> {
        let role = record.role.parse()?;
        Ok(Self {
            cid: record.cid,
            role,
            name: record.name,
            phone_number: record.phone_number,
            location: record.location,
            dzongkhag: record.dzongkhag,
        })
    }

    /// Snapshot of this principal as the buyer of an order.
    pub fn buyer_snapshot(&self) -> BuyerSnapshot {
        BuyerSnapshot {
            cid: self.cid.clone(),
            name: self.name.clone(),
            phone_number: self.phone_number.clone(),
            location: self.location.clone(),
        }
    }

    /// Snapshot of this principal as the transporter of an order.
    ///
    /// Non-blank overrides replace the profile name and phone number.
    pub fn transporter_snapshot(
        &self,
        name: Option<&str>,
        phone_number: Option<&str>,
    ) -> TransporterSnapshot {
        let pick = |candidate: Option<&str>, fallback: &str| {
            candidate
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        TransporterSnapshot {
            cid: self.cid.clone(),
            name: pick(name, &self.name),
            phone_number: pick(phone_number, &self.phone_number),
        }
    }

    /// Attribution for a status history entry.
    pub fn changed_by(&self) -> ChangedBy {
        ChangedBy {
            cid: self.cid.clone(),
            role: self.role,
            name: self.name.clone(),
        }
    }
}

/// Errors resolving the acting identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No account exists for the CID.
    #[error("Unknown identity: {0}")]
    UnknownIdentity(Cid),

    /// The account's role is not recognised.
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),

    /// The identity store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Resolves CIDs into principals.
#[derive(Clone)]
pub struct IdentityResolver<S: IdentityStore> {
    store: S,
}

impl<S: IdentityStore> IdentityResolver<S> {
    /// Creates a resolver over an identity store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Looks up the account for a CID and types its role.
    #[tracing::instrument(skip(self), fields(cid = %cid))]
    pub async fn resolve(&self, cid: &Cid) -> Result<Principal, IdentityError> {
        let record = self
            .store
            .get_user(cid)
            .await?
            .ok_or_else(|| IdentityError::UnknownIdentity(cid.clone()))?;
        Ok(Principal::from_record(record)?)
    }
}
