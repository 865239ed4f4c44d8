//! Inbound Auto Scaling lifecycle events.

use serde::{Deserialize, Serialize};

/// Terminate lifecycle notification for a single instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Instance that is about to terminate.
    #[serde(rename = "EC2InstanceId")]
    pub instance_id: String,
    /// Hook holding the instance in `Terminating:Wait`.
    #[serde(rename = "LifecycleHookName")]
    pub hook_name: String,
    /// Group the instance belongs to.
    #[serde(rename = "AutoScalingGroupName")]
    pub auto_scaling_group_name: String,
    /// Token identifying this pending action.
    #[serde(rename = "LifecycleActionToken")]
    pub action_token: String,
}

/// EventBridge envelope carrying a [`LifecycleEvent`] in `detail`.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleEnvelope {
    /// Event payload.
    pub detail: LifecycleEvent,
    /// EventBridge detail type, e.g. `EC2 Instance-terminate Lifecycle Action`.
    #[serde(rename = "detail-type", default)]
    pub detail_type: Option<String>,
}

impl LifecycleEnvelope {
    /// Parse an envelope from raw JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_eventbridge_envelope() {
        let raw = r#"{
            "version": "0",
            "id": "12345678-1234-1234-1234-123456789012",
            "detail-type": "EC2 Instance-terminate Lifecycle Action",
            "source": "aws.autoscaling",
            "region": "us-east-1",
            "detail": {
                "LifecycleActionToken": "87654321-4321-4321-4321-210987654321",
                "AutoScalingGroupName": "workers",
                "LifecycleHookName": "drain-hook",
                "EC2InstanceId": "i-abc123",
                "LifecycleTransition": "autoscaling:EC2_INSTANCE_TERMINATING"
            }
        }"#;

        let envelope = LifecycleEnvelope::from_json(raw).unwrap();
        assert_eq!(
            envelope.detail_type.as_deref(),
            Some("EC2 Instance-terminate Lifecycle Action")
        );
        assert_eq!(envelope.detail.instance_id, "i-abc123");
        assert_eq!(envelope.detail.hook_name, "drain-hook");
        assert_eq!(envelope.detail.auto_scaling_group_name, "workers");
        assert_eq!(
            envelope.detail.action_token,
            "87654321-4321-4321-4321-210987654321"
        );
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let raw = r#"{"detail": {"EC2InstanceId": "i-abc123"}}"#;
        assert!(LifecycleEnvelope::from_json(raw).is_err());
    }
}
