pub mod common;
pub mod pdb;

pub use common::{
    MANAGED_BY_LABEL, OPERATOR_NAME, WORKLOAD_LABEL, is_owned, owner_reference, pdb_name,
    standard_labels, workload_label_value,
};
pub use pdb::{desired_pdb, merge_update, needs_update};
