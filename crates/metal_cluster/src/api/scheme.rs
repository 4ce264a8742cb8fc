//! Explicit registry of the kinds the controller works with.
//!
//! The scheme is built once by the binary and handed to whatever needs to know
//! the kinds: the controller checks at startup that each one is served, and
//! `crdgen` prints the definitions of the kinds we own.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, DynamicObject, ListParams},
    discovery::ApiResource,
    Client, CustomResourceExt, Resource,
};
use tracing::*;

use crate::api::capi::Cluster;
use crate::api::v1alpha1::{MetalCluster, MetalMachine};
use crate::util::errors::{Result, StdError};

pub struct RegisteredKind {
    pub resource: ApiResource,
    /// Definition of the kind when it is owned by this controller.
    pub crd: Option<CustomResourceDefinition>,
}

#[derive(Default)]
pub struct Scheme {
    kinds: Vec<RegisteredKind>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind whose definition this controller ships.
    pub fn register<K>(mut self) -> Self
    where
        K: Resource<DynamicType = ()> + CustomResourceExt,
    {
        self.kinds.push(RegisteredKind {
            resource: ApiResource::erase::<K>(&()),
            crd: Some(K::crd()),
        });
        self
    }

    /// Register a kind defined and installed by another component.
    pub fn register_external<K>(mut self) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        self.kinds.push(RegisteredKind {
            resource: ApiResource::erase::<K>(&()),
            crd: None,
        });
        self
    }

    pub fn kinds(&self) -> &[RegisteredKind] {
        &self.kinds
    }

    pub fn is_registered(&self, group: &str, kind: &str) -> bool {
        self.kinds
            .iter()
            .any(|k| k.resource.group == group && k.resource.kind == kind)
    }

    /// Definitions of the owned kinds, in registration order.
    pub fn crds(&self) -> impl Iterator<Item = &CustomResourceDefinition> {
        self.kinds.iter().filter_map(|k| k.crd.as_ref())
    }

    /// Render the owned definitions as a multi-document YAML stream.
    pub fn crds_yaml(&self) -> Result<String> {
        let mut documents = Vec::new();
        for crd in self.crds() {
            let doc = serde_yaml::to_string(crd)
                .map_err(|e| StdError::InvalidArgument(format!("failed to render CRD: {e}")))?;
            documents.push(doc);
        }
        Ok(documents.join("---\n"))
    }

    /// Check that every registered kind can be listed.
    pub async fn verify_installed(&self, client: &Client) -> Result<()> {
        for kind in &self.kinds {
            let api: Api<DynamicObject> = Api::all_with(client.clone(), &kind.resource);
            if let Err(e) = api.list(&ListParams::default().limit(1)).await {
                error!("{} is not queryable; {e:?}", kind.resource.kind);
                return Err(StdError::KubeError(e).into());
            }
            debug!("{}/{} is served", kind.resource.api_version, kind.resource.kind);
        }
        Ok(())
    }
}

/// The kinds the MetalCluster controller reads and writes.
pub fn scheme() -> Scheme {
    Scheme::new()
        .register::<MetalCluster>()
        .register::<MetalMachine>()
        .register_external::<Cluster>()
}
