//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use node_drainer::cache::{CredentialCache, MemoryCache};
use node_drainer::cluster::{ClusterApi, ClusterConnector, ClusterError, PodRef};
use node_drainer::drain::{DrainOrchestrator, DrainSettings};
use node_drainer::kubeconfig::{ConnectionDescriptor, ConnectionMaterializer};
use node_drainer::lifecycle::LifecycleCompleter;
use node_drainer::providers::aws::{
    AwsCredentials, CertificateAuthority, CompleteLifecycleActionRequest, Ec2Instance, EksCluster,
    ItemSet, Tag,
};
use node_drainer::providers::{AwsError, ClusterDescriber, InstanceDescriber, LifecycleActions};
use node_drainer::resolver::ClusterResolver;
use node_drainer::token::{BearerToken, TokenMinter};
use node_drainer::{LifecycleEvent, Pipeline};
use tokio::time::Instant;

pub const INSTANCE_ID: &str = "i-abc123";
pub const NODE_NAME: &str = "ip-10-0-1-23.ec2.internal";
pub const CLUSTER_NAME: &str = "prod-a";
pub const ENDPOINT: &str = "https://ABCDEF.gr7.us-east-1.eks.amazonaws.com";

pub fn event() -> LifecycleEvent {
    LifecycleEvent {
        instance_id: INSTANCE_ID.to_string(),
        hook_name: "drain-hook".to_string(),
        auto_scaling_group_name: "workers".to_string(),
        action_token: "3d5f6c1e-token".to_string(),
    }
}

pub fn api_error(message: &str) -> ClusterError {
    ClusterError::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

/// Calls observed by [`FakeCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    NodeExists(String),
    Cordon(String),
    ListPods(String),
    Evict(PodRef, Option<u32>),
}

/// In-memory cluster recording every call with the (tokio) time it happened.
#[derive(Default)]
pub struct FakeCluster {
    pub nodes: Vec<String>,
    pub pods: Vec<PodRef>,
    pub fail_node_lookup: bool,
    pub fail_cordon: bool,
    pub fail_list: bool,
    pub fail_evict: HashSet<String>,
    pub calls: Mutex<Vec<(ClusterCall, Instant)>>,
}

impl FakeCluster {
    pub fn with_node(pods: &[(&str, &str)]) -> Self {
        Self {
            nodes: vec![NODE_NAME.to_string()],
            pods: pods.iter().map(|(ns, name)| PodRef::new(*ns, *name)).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(ClusterCall, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn evictions(&self) -> Vec<PodRef> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::Evict(pod, _) => Some(pod),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ClusterCall) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn node_exists(&self, node_name: &str) -> Result<bool, ClusterError> {
        self.record(ClusterCall::NodeExists(node_name.to_string()));
        if self.fail_node_lookup {
            return Err(api_error("nodes is forbidden"));
        }
        Ok(self.nodes.iter().any(|n| n == node_name))
    }

    async fn cordon(&self, node_name: &str) -> Result<(), ClusterError> {
        self.record(ClusterCall::Cordon(node_name.to_string()));
        if self.fail_cordon {
            return Err(api_error("cordon rejected"));
        }
        Ok(())
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<PodRef>, ClusterError> {
        self.record(ClusterCall::ListPods(node_name.to_string()));
        if self.fail_list {
            return Err(api_error("pods is forbidden"));
        }
        Ok(self.pods.clone())
    }

    async fn evict(&self, pod: &PodRef, grace_period: Option<u32>) -> Result<(), ClusterError> {
        self.record(ClusterCall::Evict(pod.clone(), grace_period));
        if self.fail_evict.contains(&pod.name) {
            return Err(api_error("Cannot evict pod as it would violate the pod's disruption budget"));
        }
        Ok(())
    }
}

/// Shares one [`FakeCluster`] with every connection.
struct SharedCluster(Arc<FakeCluster>);

#[async_trait]
impl ClusterApi for SharedCluster {
    async fn node_exists(&self, node_name: &str) -> Result<bool, ClusterError> {
        self.0.node_exists(node_name).await
    }

    async fn cordon(&self, node_name: &str) -> Result<(), ClusterError> {
        self.0.cordon(node_name).await
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<PodRef>, ClusterError> {
        self.0.list_pods_on_node(node_name).await
    }

    async fn evict(&self, pod: &PodRef, grace_period: Option<u32>) -> Result<(), ClusterError> {
        self.0.evict(pod, grace_period).await
    }
}

/// Connector handing out the shared fake and remembering what it was given.
pub struct FakeConnector {
    pub cluster: Arc<FakeCluster>,
    pub fail: bool,
    pub connections: Mutex<Vec<(String, ConnectionDescriptor, String)>>,
}

impl FakeConnector {
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self {
            cluster,
            fail: false,
            connections: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(
        &self,
        cluster_name: &str,
        descriptor: &ConnectionDescriptor,
        token: &BearerToken,
    ) -> Result<Box<dyn ClusterApi>, ClusterError> {
        self.connections.lock().unwrap().push((
            cluster_name.to_string(),
            descriptor.clone(),
            token.expose().to_string(),
        ));
        if self.fail {
            return Err(api_error("connection refused"));
        }
        Ok(Box::new(SharedCluster(self.cluster.clone())))
    }
}

/// EC2 returning a fixed instance, or failing.
pub struct FakeEc2 {
    pub instance: Option<Ec2Instance>,
    pub fail: bool,
}

impl FakeEc2 {
    pub fn tagged(cluster_name: &str) -> Self {
        Self {
            instance: Some(instance(&[("Name", "worker"), ("KubernetesCluster", cluster_name)])),
            fail: false,
        }
    }

    pub fn untagged() -> Self {
        Self {
            instance: Some(instance(&[("Name", "worker")])),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            instance: None,
            fail: true,
        }
    }
}

pub fn instance(tags: &[(&str, &str)]) -> Ec2Instance {
    Ec2Instance {
        instance_id: INSTANCE_ID.to_string(),
        private_dns_name: Some(NODE_NAME.to_string()),
        tag_set: ItemSet {
            items: tags
                .iter()
                .map(|(k, v)| Tag {
                    key: (*k).to_string(),
                    value: (*v).to_string(),
                })
                .collect(),
        },
    }
}

#[async_trait]
impl InstanceDescriber for FakeEc2 {
    async fn describe_instance(&self, _instance_id: &str) -> Result<Option<Ec2Instance>, AwsError> {
        if self.fail {
            return Err(AwsError::Api {
                status: 503,
                code: "Unavailable".to_string(),
                message: "The service is unavailable".to_string(),
            });
        }
        Ok(self.instance.clone())
    }
}

/// EKS counting `DescribeCluster` calls.
#[derive(Default)]
pub struct FakeEks {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeEks {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterDescriber for FakeEks {
    async fn describe_cluster(&self, name: &str) -> Result<EksCluster, AwsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AwsError::NotFound(format!("cluster {name}")));
        }
        Ok(EksCluster {
            name: name.to_string(),
            arn: None,
            status: Some("ACTIVE".to_string()),
            endpoint: Some(ENDPOINT.to_string()),
            certificate_authority: Some(CertificateAuthority {
                data: Some("LS0tLS1CRUdJTg==".to_string()),
            }),
        })
    }
}

/// Auto Scaling recording completion requests.
#[derive(Default)]
pub struct FakeAutoscaling {
    pub requests: Mutex<Vec<(CompleteLifecycleActionRequest, Instant)>>,
}

impl FakeAutoscaling {
    pub fn requests(&self) -> Vec<CompleteLifecycleActionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    pub fn completed_at(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl LifecycleActions for FakeAutoscaling {
    async fn complete_lifecycle_action(
        &self,
        req: &CompleteLifecycleActionRequest,
    ) -> Result<(), AwsError> {
        self.requests.lock().unwrap().push((req.clone(), Instant::now()));
        Ok(())
    }
}

/// A pipeline wired to fakes, with handles to inspect them.
pub struct Harness {
    pub eks: Arc<FakeEks>,
    pub asg: Arc<FakeAutoscaling>,
    pub cluster: Arc<FakeCluster>,
    pub connector: Arc<FakeConnector>,
    pub cache: Arc<dyn CredentialCache>,
    pub pipeline: Pipeline,
}

pub const SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const COMPLETION_DELAY: Duration = Duration::from_secs(10);

pub struct HarnessBuilder {
    ec2: FakeEc2,
    eks: FakeEks,
    cluster: FakeCluster,
    cache: Arc<dyn CredentialCache>,
    fail_connect: bool,
    complete_on_missing_tag: bool,
    grace_period: Option<u32>,
}

impl HarnessBuilder {
    pub fn new(ec2: FakeEc2, cluster: FakeCluster) -> Self {
        Self {
            ec2,
            eks: FakeEks::default(),
            cluster,
            cache: Arc::new(MemoryCache::new()),
            fail_connect: false,
            complete_on_missing_tag: false,
            grace_period: None,
        }
    }

    pub fn cache(mut self, cache: Arc<dyn CredentialCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn failing_eks(mut self) -> Self {
        self.eks.fail = true;
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn complete_on_missing_tag(mut self) -> Self {
        self.complete_on_missing_tag = true;
        self
    }

    pub fn grace_period(mut self, secs: u32) -> Self {
        self.grace_period = Some(secs);
        self
    }

    pub fn build(self) -> Harness {
        let eks = Arc::new(self.eks);
        let asg = Arc::new(FakeAutoscaling::default());
        let cluster = Arc::new(self.cluster);
        let mut connector = FakeConnector::new(cluster.clone());
        connector.fail = self.fail_connect;
        let connector = Arc::new(connector);

        let pipeline = Pipeline::new(
            ClusterResolver::new(Arc::new(self.ec2), "KubernetesCluster"),
            self.cache.clone(),
            ConnectionMaterializer::new(eks.clone()),
            TokenMinter::new(
                AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", None),
                "us-east-1",
            ),
            connector.clone(),
            DrainOrchestrator::new(DrainSettings {
                settle_delay: SETTLE_DELAY,
                grace_period: self.grace_period,
            }),
            LifecycleCompleter::new(asg.clone(), Some(COMPLETION_DELAY)),
        )
        .with_complete_on_missing_tag(self.complete_on_missing_tag);

        Harness {
            eks,
            asg,
            cluster,
            connector,
            cache: self.cache,
            pipeline,
        }
    }
}
