//! Common utilities for Kubernetes resource generation
//!
//! Naming, ownership marker and owner references shared by everything the
//! operator writes.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use sha2::{Digest, Sha256};

/// API version of the owning workload
pub const API_VERSION: &str = "apps/v1";

/// Kind of the owning workload
pub const KIND: &str = "Deployment";

/// Value of the managed-by label on every PDB the operator owns
pub const OPERATOR_NAME: &str = "availability-operator";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label naming the workload a PDB protects
pub const WORKLOAD_LABEL: &str = "availability.example.com/workload";

/// Longest object name the API server accepts
const MAX_NAME_LEN: usize = 253;

/// Longest label value the API server accepts
const MAX_LABEL_VALUE_LEN: usize = 63;

const PDB_SUFFIX: &str = "-pdb";

/// Deterministic PDB name for a workload
///
/// `<workload>-pdb`, or a truncated name with a short hash suffix when that
/// would exceed the API server's limit.
pub fn pdb_name(workload: &str) -> String {
    let name = format!("{}{}", workload, PDB_SUFFIX);
    if name.len() <= MAX_NAME_LEN {
        return name;
    }

    let hash = short_hash(workload);
    // prefix + "-" + hash + "-pdb"
    let mut keep = MAX_NAME_LEN - hash.len() - 1 - PDB_SUFFIX.len();
    while !workload.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}-{}{}", &workload[..keep], hash, PDB_SUFFIX)
}

fn short_hash(value: &str) -> String {
    let hash = format!("{:x}", Sha256::digest(value.as_bytes()));
    hash[..8].to_string()
}

/// Workload name as a label value
///
/// Names too long for a label value keep a prefix and gain a hash suffix.
/// Label values must end alphanumeric, so the prefix is trimmed of any
/// trailing `-`, `_` or `.`.
pub fn workload_label_value(workload: &str) -> String {
    if workload.len() <= MAX_LABEL_VALUE_LEN {
        return workload.to_string();
    }

    let hash = short_hash(workload);
    let mut keep = MAX_LABEL_VALUE_LEN - hash.len() - 1;
    while !workload.is_char_boundary(keep) {
        keep -= 1;
    }
    let prefix = workload[..keep].trim_end_matches(['-', '_', '.']);
    format!("{}-{}", prefix, hash)
}

/// Generate an owner reference for a workload
///
/// The PDB is garbage collected together with its workload.
pub fn owner_reference(workload: &Deployment) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: workload.name_any(),
        uid: workload.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels carried by every operator-owned PDB
pub fn standard_labels(workload_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string()),
        (WORKLOAD_LABEL.to_string(), workload_label_value(workload_name)),
    ])
}

/// Whether an object bears the operator's ownership marker
pub fn is_owned<K: ResourceExt>(resource: &K) -> bool {
    resource
        .labels()
        .get(MANAGED_BY_LABEL)
        .is_some_and(|v| v == OPERATOR_NAME)
}
