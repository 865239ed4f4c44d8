//! AWS API request and response models.
//!
//! EC2 and Auto Scaling speak the Query protocol and answer in XML; EKS
//! answers in JSON.

use serde::Deserialize;

// ============================================================================
// EC2 (Instance) types
// ============================================================================

/// Wrapper for the `<item>` lists used throughout EC2 XML responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSet<T> {
    /// Items in the set.
    #[serde(rename = "item", default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

/// `DescribeInstances` response.
#[derive(Debug, Deserialize)]
pub struct DescribeInstancesResponse {
    /// Reservations.
    #[serde(rename = "reservationSet", default)]
    pub reservation_set: ItemSet<Reservation>,
}

impl DescribeInstancesResponse {
    /// First instance of the first reservation, if any.
    #[must_use]
    pub fn into_first_instance(self) -> Option<Ec2Instance> {
        self.reservation_set
            .items
            .into_iter()
            .flat_map(|r| r.instances_set.items)
            .next()
    }
}

/// Reservation.
#[derive(Debug, Deserialize)]
pub struct Reservation {
    /// Instances.
    #[serde(rename = "instancesSet", default)]
    pub instances_set: ItemSet<Ec2Instance>,
}

/// EC2 instance information.
#[derive(Debug, Clone, Deserialize)]
pub struct Ec2Instance {
    /// Instance ID.
    #[serde(rename = "instanceId")]
    pub instance_id: String,
    /// Private DNS name; this is the Kubernetes node name on EKS.
    #[serde(rename = "privateDnsName", default)]
    pub private_dns_name: Option<String>,
    /// Tags.
    #[serde(rename = "tagSet", default)]
    pub tag_set: ItemSet<Tag>,
}

impl Ec2Instance {
    /// Value of the tag with the given key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tag_set
            .items
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

/// Tag.
#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    #[serde(default)]
    pub value: String,
}

// ============================================================================
// EKS (Kubernetes) types
// ============================================================================

/// `DescribeCluster` response.
#[derive(Debug, Deserialize)]
pub struct DescribeClusterResponse {
    /// The cluster.
    pub cluster: EksCluster,
}

/// EKS cluster information.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksCluster {
    /// Cluster name.
    pub name: String,
    /// Cluster ARN.
    #[serde(default)]
    pub arn: Option<String>,
    /// Cluster status.
    #[serde(default)]
    pub status: Option<String>,
    /// API server endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Cluster CA bundle.
    #[serde(default)]
    pub certificate_authority: Option<CertificateAuthority>,
}

/// Cluster certificate authority.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateAuthority {
    /// Base64-encoded PEM bundle.
    #[serde(default)]
    pub data: Option<String>,
}

/// JSON error body returned by EKS.
#[derive(Debug, Deserialize)]
pub struct EksErrorResponse {
    /// Human-readable message.
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
}

// ============================================================================
// Auto Scaling types
// ============================================================================

/// Lifecycle action result that lets termination continue without further
/// waiting on the hook.
pub const LIFECYCLE_ACTION_RESULT_ABANDON: &str = "ABANDON";

/// `CompleteLifecycleAction` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteLifecycleActionRequest {
    /// Lifecycle hook name.
    pub lifecycle_hook_name: String,
    /// Auto Scaling group name.
    pub auto_scaling_group_name: String,
    /// Token identifying the pending action.
    pub lifecycle_action_token: String,
    /// `CONTINUE` or `ABANDON`.
    pub lifecycle_action_result: String,
    /// Instance being terminated.
    pub instance_id: String,
}

impl CompleteLifecycleActionRequest {
    /// Query-protocol form parameters.
    #[must_use]
    pub fn form_params(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("Action", "CompleteLifecycleAction"),
            ("Version", "2011-01-01"),
            ("LifecycleHookName", &self.lifecycle_hook_name),
            ("AutoScalingGroupName", &self.auto_scaling_group_name),
            ("LifecycleActionToken", &self.lifecycle_action_token),
            ("LifecycleActionResult", &self.lifecycle_action_result),
            ("InstanceId", &self.instance_id),
        ]
    }
}

// ============================================================================
// Query protocol errors
// ============================================================================

/// Error detail shared by EC2 and Auto Scaling.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryErrorDetail {
    /// Error code, e.g. `ValidationError`.
    #[serde(rename = "Code")]
    pub code: String,
    /// Error message.
    #[serde(rename = "Message", default)]
    pub message: String,
}

/// Auto Scaling style `<ErrorResponse><Error>..</Error></ErrorResponse>`.
#[derive(Debug, Deserialize)]
pub struct QueryErrorResponse {
    /// The error.
    #[serde(rename = "Error")]
    pub error: QueryErrorDetail,
}

/// EC2 style `<Response><Errors><Error>..</Error></Errors></Response>`.
#[derive(Debug, Deserialize)]
pub struct Ec2ErrorResponse {
    /// The errors.
    #[serde(rename = "Errors")]
    pub errors: Ec2Errors,
}

/// EC2 error list.
#[derive(Debug, Deserialize)]
pub struct Ec2Errors {
    /// Individual errors.
    #[serde(rename = "Error", default)]
    pub error: Vec<QueryErrorDetail>,
}

/// Parse a Query-protocol error body in either the EC2 or the Auto Scaling
/// shape.
#[must_use]
pub fn parse_query_error(body: &str) -> Option<QueryErrorDetail> {
    if let Ok(resp) = quick_xml::de::from_str::<QueryErrorResponse>(body) {
        return Some(resp.error);
    }
    quick_xml::de::from_str::<Ec2ErrorResponse>(body)
        .ok()
        .and_then(|resp| resp.errors.error.into_iter().next())
}
