mod availability_policy;

pub use availability_policy::*;
