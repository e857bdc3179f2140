use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use capstan_types::{ContractId, ObjectEntry, ObjectHash, ResourceId, StorageAddress};

use crate::error::LedgerResult;

/// Application-level id of the chain-state subscription event stream.
pub const EV_CHAIN_STATE: &str = "ev_chain_state";

/// One deployed contract, as reported by the node's manager view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub cid: ContractId,
}

/// One trackable resource, as reported by the contract's listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    #[serde(rename = "resource_id")]
    pub id: ResourceId,
}

/// Ledger query interface for one tracked contract.
///
/// Implementations are expected to be cheap to share (`Arc`) and safe to
/// call concurrently; every method is one remote round-trip.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// All contracts deployed on the node. Used at startup to verify the
    /// tracked contract exists; a missing contract is an unrecoverable
    /// precondition.
    async fn view_contracts(&self) -> LedgerResult<Vec<ContractInfo>>;

    /// The contract's full resource listing.
    async fn list_resources(&self) -> LedgerResult<Vec<ResourceInfo>>;

    /// One resource's append-only object listing.
    async fn resource_objects(&self, id: ResourceId) -> LedgerResult<Vec<ObjectEntry>>;

    /// Fetch one object's payload and decode it into a storage address.
    async fn fetch_object(
        &self,
        id: ResourceId,
        hash: &ObjectHash,
    ) -> LedgerResult<StorageAddress>;

    /// Ask the storage network to retain and serve the object. Success or
    /// failure only; there is no payload.
    async fn pin(&self, address: &StorageAddress) -> LedgerResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_info_wire_name() {
        let info: ResourceInfo = serde_json::from_str(r#"{"resource_id":7}"#).unwrap();
        assert_eq!(info.id, ResourceId(7));
    }

    #[test]
    fn contract_info_decodes() {
        let info: ContractInfo = serde_json::from_str(r#"{"cid":"ab12"}"#).unwrap();
        assert_eq!(info.cid.as_str(), "ab12");
    }
}
