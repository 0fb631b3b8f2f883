//! alert configuration model.

use crate::secret::Secret;
use serde::{Deserialize, Serialize};

/// comparison applied by a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatcherOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Regex,
    NotRegex,
}

/// restricts which targets an alert applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Matcher {
    pub field_name: String,
    pub operator: MatcherOperator,
    pub value: String,
}

/// notification channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Email,
    Sms,
    Slack,
    PagerDuty,
    OpsGenie,
    VictorOps,
    Webhook,
    MicrosoftTeams,
    Datadog,
    User,
    Group,
}

impl NotificationType {
    pub const ALL: [NotificationType; 11] = [
        NotificationType::Email,
        NotificationType::Sms,
        NotificationType::Slack,
        NotificationType::PagerDuty,
        NotificationType::OpsGenie,
        NotificationType::VictorOps,
        NotificationType::Webhook,
        NotificationType::MicrosoftTeams,
        NotificationType::Datadog,
        NotificationType::User,
        NotificationType::Group,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "EMAIL",
            NotificationType::Sms => "SMS",
            NotificationType::Slack => "SLACK",
            NotificationType::PagerDuty => "PAGER_DUTY",
            NotificationType::OpsGenie => "OPS_GENIE",
            NotificationType::VictorOps => "VICTOR_OPS",
            NotificationType::Webhook => "WEBHOOK",
            NotificationType::MicrosoftTeams => "MICROSOFT_TEAMS",
            NotificationType::Datadog => "DATADOG",
            NotificationType::User => "USER",
            NotificationType::Group => "GROUP",
        }
    }

    /// manifest fields that must be present for this channel.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            NotificationType::Email => &["emailAddress"],
            NotificationType::Sms => &["mobileNumber"],
            NotificationType::Slack => &["apiToken", "channelName"],
            NotificationType::PagerDuty => &["serviceKey"],
            NotificationType::OpsGenie => &["apiKey"],
            NotificationType::VictorOps => &["apiKey", "routingKey"],
            NotificationType::Webhook => &["webhookUrl"],
            NotificationType::MicrosoftTeams => &["microsoftTeamsWebhookUrl"],
            NotificationType::Datadog => &["apiKey"],
            NotificationType::User => &["username"],
            NotificationType::Group => &["roles"],
        }
    }
}

/// one notification channel of an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Notification {
    pub type_name: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_key: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microsoft_teams_webhook_url: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_enabled: Option<bool>,
}

impl Notification {
    /// a notification of the given type with every optional field empty.
    pub fn new(type_name: NotificationType) -> Self {
        Self {
            type_name,
            delay_min: None,
            interval_min: None,
            email_address: None,
            mobile_number: None,
            channel_name: None,
            api_token: None,
            service_key: None,
            api_key: None,
            routing_key: None,
            region: None,
            webhook_url: None,
            webhook_secret: None,
            microsoft_teams_webhook_url: None,
            username: None,
            roles: Vec::new(),
            email_enabled: None,
            sms_enabled: None,
        }
    }

    /// required fields of this channel that are missing or empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.type_name
            .required_fields()
            .iter()
            .copied()
            .filter(|field| !self.has_field(field))
            .collect()
    }

    fn has_field(&self, field: &str) -> bool {
        fn text(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }
        fn secret(value: &Option<Secret>) -> bool {
            value
                .as_ref()
                .is_some_and(|s| s.expose().map_or(true, |v| !v.trim().is_empty()))
        }
        match field {
            "emailAddress" => text(&self.email_address),
            "mobileNumber" => text(&self.mobile_number),
            "channelName" => text(&self.channel_name),
            "apiToken" => secret(&self.api_token),
            "serviceKey" => secret(&self.service_key),
            "apiKey" => secret(&self.api_key),
            "routingKey" => text(&self.routing_key),
            "webhookUrl" => text(&self.webhook_url),
            "microsoftTeamsWebhookUrl" => secret(&self.microsoft_teams_webhook_url),
            "username" => text(&self.username),
            "roles" => !self.roles.is_empty(),
            _ => false,
        }
    }

    pub(crate) fn secrets_mut(&mut self) -> impl Iterator<Item = &mut Secret> {
        [
            self.api_token.as_mut(),
            self.service_key.as_mut(),
            self.api_key.as_mut(),
            self.webhook_secret.as_mut(),
            self.microsoft_teams_webhook_url.as_mut(),
        ]
        .into_iter()
        .flatten()
    }
}

/// threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdOperator {
    GreaterThan,
    LessThan,
}

/// aggregation mode for metric thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdMode {
    Average,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetricThreshold {
    pub metric_name: String,
    pub operator: ThresholdOperator,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ThresholdMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneralThreshold {
    pub operator: ThresholdOperator,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// attributes for `AlertConfiguration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AlertConfigurationSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub event_type_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,
    pub notifications: Vec<Notification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_threshold: Option<MetricThreshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<GeneralThreshold>,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eleven_channel_kinds() {
        assert_eq!(NotificationType::ALL.len(), 11);
        for kind in NotificationType::ALL {
            let value = serde_json::to_value(kind).unwrap();
            assert_eq!(value, json!(kind.as_str()));
        }
    }

    #[test]
    fn slack_requires_token_and_channel() {
        let mut notification = Notification::new(NotificationType::Slack);
        assert_eq!(notification.missing_fields(), vec!["apiToken", "channelName"]);
        notification.api_token = Some(Secret::new("xoxb"));
        notification.channel_name = Some("#ops".to_string());
        assert!(notification.missing_fields().is_empty());
    }

    #[test]
    fn masked_secret_counts_as_present() {
        let mut notification = Notification::new(NotificationType::PagerDuty);
        notification.service_key = Some(Secret::Masked);
        assert!(notification.missing_fields().is_empty());
    }

    #[test]
    fn alert_enabled_defaults_true() {
        let spec: AlertConfigurationSpec = serde_json::from_value(json!({
            "eventTypeName": "HOST_DOWN",
            "notifications": [{ "typeName": "GROUP", "roles": ["GROUP_OWNER"] }]
        }))
        .unwrap();
        assert!(spec.enabled);
        assert_eq!(spec.notifications[0].type_name, NotificationType::Group);
    }
}
