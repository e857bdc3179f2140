use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use capstan_link::CallTransport;
use capstan_types::{ContractId, ObjectEntry, ObjectHash, ResourceId, StorageAddress};

use crate::api::{ContractInfo, LedgerApi, ResourceInfo};
use crate::error::{LedgerError, LedgerResult};

#[derive(Deserialize)]
struct ContractListing {
    contracts: Vec<ContractInfo>,
}

#[derive(Deserialize)]
struct ResourceListing {
    #[serde(default)]
    resources: Vec<ResourceInfo>,
}

#[derive(Deserialize)]
struct ObjectListing {
    #[serde(default)]
    objects: Vec<ObjectEntry>,
}

#[derive(Deserialize)]
struct DataResponse {
    object_data: String,
}

/// [`LedgerApi`] implementation over the link.
///
/// One client per tracked contract. Contract reads are `invoke_contract`
/// calls with `create_tx: false`, the contract's argument string, and —
/// when configured — the contract binary loaded at startup.
pub struct LedgerClient {
    transport: Arc<dyn CallTransport>,
    cid: ContractId,
    contract_bytes: Option<Vec<u8>>,
}

impl LedgerClient {
    pub fn new(
        transport: Arc<dyn CallTransport>,
        cid: ContractId,
        contract_bytes: Option<Vec<u8>>,
    ) -> Self {
        Self {
            transport,
            cid,
            contract_bytes,
        }
    }

    pub fn contract(&self) -> &ContractId {
        &self.cid
    }

    /// Invoke a contract read and decode the (double-enveloped) result.
    async fn invoke(&self, args: String) -> LedgerResult<Value> {
        tracing::debug!(contract = %self.cid, args, "contract read");
        let mut params = json!({ "create_tx": false, "args": args });
        if let Some(bytes) = &self.contract_bytes {
            params["contract"] = json!(bytes);
        }
        Ok(self.transport.call("invoke_contract", params).await?)
    }

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> LedgerResult<T> {
        serde_json::from_value(value).map_err(|e| LedgerError::Shape(e.to_string()))
    }
}

#[async_trait]
impl LedgerApi for LedgerClient {
    async fn view_contracts(&self) -> LedgerResult<Vec<ContractInfo>> {
        let result = self.invoke("role=manager,action=view_contracts".into()).await?;
        let listing: ContractListing = Self::decode(result)?;
        Ok(listing.contracts)
    }

    async fn list_resources(&self) -> LedgerResult<Vec<ResourceInfo>> {
        let result = self
            .invoke(format!("cid={},role=user,action=all_resources", self.cid))
            .await?;
        let listing: ResourceListing = Self::decode(result)?;
        Ok(listing.resources)
    }

    async fn resource_objects(&self, id: ResourceId) -> LedgerResult<Vec<ObjectEntry>> {
        let result = self
            .invoke(format!(
                "cid={},role=user,action=resource_meta,resource_id={id}",
                self.cid
            ))
            .await?;
        let listing: ObjectListing = Self::decode(result)?;
        Ok(listing.objects)
    }

    async fn fetch_object(
        &self,
        id: ResourceId,
        hash: &ObjectHash,
    ) -> LedgerResult<StorageAddress> {
        let result = self
            .invoke(format!(
                "cid={},role=user,action=resource_data,resource_id={id},obj_id={hash}",
                self.cid
            ))
            .await?;
        let data: DataResponse = Self::decode(result)?;
        Ok(StorageAddress::from_payload_hex(&data.object_data)?)
    }

    async fn pin(&self, address: &StorageAddress) -> LedgerResult<()> {
        self.transport
            .call("ipfs_pin", json!({ "hash": address.as_str() }))
            .await?;
        Ok(())
    }
}
