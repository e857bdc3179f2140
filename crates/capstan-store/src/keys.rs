use capstan_types::{ContractId, ObjectHash, ResourceId};

/// Key builder for one tracked contract.
///
/// Keys are concatenations of a namespace prefix, the contract id, and the
/// resource id (plus the object hash for dead letters), separated by `/`.
/// Resource ids are zero-padded to 20 digits so lexicographic key order
/// matches numeric resource order and prefix scans stay contiguous.
#[derive(Clone, Debug)]
pub struct Keyspace {
    cid: ContractId,
}

const CURSOR: &str = "cursor";
const PENDING: &str = "pending";
const FAILED: &str = "failed";

impl Keyspace {
    pub fn new(cid: ContractId) -> Self {
        Self { cid }
    }

    pub fn contract(&self) -> &ContractId {
        &self.cid
    }

    fn resource_key(&self, namespace: &str, id: ResourceId) -> String {
        format!("{namespace}/{}/{:020}", self.cid, id.get())
    }

    /// Key of the resource's cursor record (last fully-synced count).
    pub fn cursor(&self, id: ResourceId) -> String {
        self.resource_key(CURSOR, id)
    }

    /// Key of the resource's pending record (drain in progress).
    pub fn pending(&self, id: ResourceId) -> String {
        self.resource_key(PENDING, id)
    }

    /// Key of one dead-lettered object.
    pub fn failed(&self, id: ResourceId, hash: &ObjectHash) -> String {
        format!("{FAILED}/{}/{:020}/{hash}", self.cid, id.get())
    }

    /// Scan prefix covering every pending record of this contract.
    pub fn pending_prefix(&self) -> String {
        format!("{PENDING}/{}/", self.cid)
    }

    /// Scan prefix covering every cursor record of this contract.
    pub fn cursor_prefix(&self) -> String {
        format!("{CURSOR}/{}/", self.cid)
    }

    /// Scan prefix covering every dead letter of this contract.
    pub fn failed_prefix(&self) -> String {
        format!("{FAILED}/{}/", self.cid)
    }
}
