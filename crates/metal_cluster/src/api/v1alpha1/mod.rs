//! `infrastructure.cluster.x-k8s.io/v1alpha1` kinds owned by this controller.

pub mod conditions;
pub mod metalcluster;
pub mod metalmachine;

pub use conditions::{Condition, ConditionStatus, HasConditions};
pub use metalcluster::{MetalCluster, MetalClusterSpec, MetalClusterStatus, METAL_CLUSTER_FINALIZER};
pub use metalmachine::{MetalMachine, MetalMachineSpec, MetalMachineStatus};

pub const GROUP: &str = "infrastructure.cluster.x-k8s.io";
pub const API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1alpha1";
