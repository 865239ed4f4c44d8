//! AWS API client implementation.
//!
//! Requests go straight over `reqwest` and are signed with SigV4.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::models::{
    parse_query_error, CompleteLifecycleActionRequest, DescribeClusterResponse,
    DescribeInstancesResponse, Ec2Instance, EksCluster, EksErrorResponse,
};
use super::sigv4::{self, SigningParams};
use super::AwsCredentials;
use crate::providers::traits::{
    AwsError, ClusterDescriber, InstanceDescriber, LifecycleActions,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// EC2 API version.
const EC2_API_VERSION: &str = "2016-11-15";

/// Service endpoints, overridable for local testing.
#[derive(Debug, Clone)]
pub struct AwsEndpoints {
    /// EC2 endpoint.
    pub ec2: String,
    /// EKS endpoint.
    pub eks: String,
    /// Auto Scaling endpoint.
    pub autoscaling: String,
}

impl AwsEndpoints {
    /// Regional public endpoints.
    #[must_use]
    pub fn for_region(region: &str) -> Self {
        Self {
            ec2: format!("https://ec2.{region}.amazonaws.com"),
            eks: format!("https://eks.{region}.amazonaws.com"),
            autoscaling: format!("https://autoscaling.{region}.amazonaws.com"),
        }
    }

    /// Route every service to one base URL.
    #[must_use]
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            ec2: base.clone(),
            eks: base.clone(),
            autoscaling: base,
        }
    }
}

/// AWS provider.
#[derive(Clone)]
pub struct Aws {
    /// HTTP client.
    client: Client,
    /// Signing credentials.
    credentials: AwsCredentials,
    /// AWS region.
    region: String,
    /// Service endpoints.
    endpoints: AwsEndpoints,
}

impl Aws {
    /// Create a new AWS provider for the given region.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(credentials: AwsCredentials, region: impl Into<String>) -> Result<Self, AwsError> {
        let region = region.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(AwsError::Http)?;

        Ok(Self {
            client,
            credentials,
            endpoints: AwsEndpoints::for_region(&region),
            region,
        })
    }

    /// Override service endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: AwsEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Region this client signs for.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Credentials this client signs with.
    #[must_use]
    pub fn credentials(&self) -> &AwsCredentials {
        &self.credentials
    }

    /// Sign and send a request, returning status and body text.
    async fn aws_request(
        &self,
        service: &str,
        method: Method,
        url: &Url,
        form: Option<String>,
    ) -> Result<(StatusCode, String), AwsError> {
        debug!(url = %url, method = %method, service, "AWS request");

        let body = form.unwrap_or_default();
        let mut extra_headers: Vec<(&str, &str)> = Vec::new();
        if !body.is_empty() {
            extra_headers.push((
                "content-type",
                "application/x-www-form-urlencoded; charset=utf-8",
            ));
        }

        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service,
            time: chrono::Utc::now(),
        };
        let signed = sigv4::sign_headers(
            method.as_str(),
            url,
            &extra_headers,
            body.as_bytes(),
            &params,
        );

        let mut request = self.client.request(method, url.clone());
        for (name, value) in extra_headers {
            request = request.header(name, value);
        }
        for (name, value) in signed {
            request = request.header(name, value);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// Map a non-success Query protocol response to an error.
    fn query_error(status: StatusCode, text: String) -> AwsError {
        let detail = parse_query_error(&text);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return AwsError::Auth(detail.map_or(text, |d| format!("{}: {}", d.code, d.message)));
        }
        match detail {
            Some(d) => AwsError::Api {
                status: status.as_u16(),
                code: d.code,
                message: d.message,
            },
            None => AwsError::Api {
                status: status.as_u16(),
                code: "Unknown".to_string(),
                message: text,
            },
        }
    }

    /// Map a non-success EKS (JSON) response to an error.
    fn eks_error(status: StatusCode, text: String) -> AwsError {
        let message = serde_json::from_str::<EksErrorResponse>(&text)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(text);
        match status {
            StatusCode::NOT_FOUND => AwsError::NotFound(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AwsError::Auth(message),
            _ => AwsError::Api {
                status: status.as_u16(),
                code: "Unknown".to_string(),
                message,
            },
        }
    }
}

#[async_trait]
impl InstanceDescriber for Aws {
    async fn describe_instance(&self, instance_id: &str) -> Result<Option<Ec2Instance>, AwsError> {
        let mut url = Url::parse(&format!("{}/", self.endpoints.ec2))?;
        url.query_pairs_mut()
            .append_pair("Action", "DescribeInstances")
            .append_pair("Version", EC2_API_VERSION)
            .append_pair("InstanceId.1", instance_id);

        let (status, text) = self.aws_request("ec2", Method::GET, &url, None).await?;
        if !status.is_success() {
            return Err(Self::query_error(status, text));
        }

        let response: DescribeInstancesResponse = quick_xml::de::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Failed to parse DescribeInstances response");
            AwsError::Xml(e)
        })?;
        Ok(response.into_first_instance())
    }
}

#[async_trait]
impl ClusterDescriber for Aws {
    async fn describe_cluster(&self, name: &str) -> Result<EksCluster, AwsError> {
        let mut url = Url::parse(&self.endpoints.eks)?;
        url.path_segments_mut()
            .map_err(|()| AwsError::Config("EKS endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push("clusters")
            .push(name);

        let (status, text) = self.aws_request("eks", Method::GET, &url, None).await?;
        if !status.is_success() {
            return Err(Self::eks_error(status, text));
        }

        let response: DescribeClusterResponse = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, "Failed to parse DescribeCluster response");
            AwsError::Serialization(e)
        })?;
        Ok(response.cluster)
    }
}

#[async_trait]
impl LifecycleActions for Aws {
    async fn complete_lifecycle_action(
        &self,
        req: &CompleteLifecycleActionRequest,
    ) -> Result<(), AwsError> {
        let url = Url::parse(&format!("{}/", self.endpoints.autoscaling))?;
        let form = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(req.form_params())
            .finish();

        let (status, text) = self
            .aws_request("autoscaling", Method::POST, &url, Some(form))
            .await?;
        if !status.is_success() {
            return Err(Self::query_error(status, text));
        }
        Ok(())
    }
}
