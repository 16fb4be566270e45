//! Publish and subscribe parameters handed through to hardware untouched.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishType {
    #[default]
    Unsolicited,
    Solicited,
    UnsolicitedSolicited,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeType {
    #[default]
    Passive,
    Active,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStyle {
    #[default]
    All,
    FirstOnly,
}

/// Parameters of a publish (advertise a service).
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    pub service_name: String,
    #[serde(default)]
    pub service_specific_info: Vec<u8>,
    #[serde(default)]
    pub match_filter: Vec<u8>,
    #[serde(default)]
    pub publish_type: PublishType,
    /// Number of transmissions; 0 means until stopped.
    #[serde(default)]
    pub publish_count: u32,
    /// Lifetime in seconds; 0 means until stopped.
    #[serde(default)]
    pub ttl_secs: u32,
}

impl PublishConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn with_service_specific_info(mut self, info: impl Into<Vec<u8>>) -> Self {
        self.service_specific_info = info.into();
        self
    }

    pub fn with_match_filter(mut self, filter: impl Into<Vec<u8>>) -> Self {
        self.match_filter = filter.into();
        self
    }

    pub fn with_publish_type(mut self, publish_type: PublishType) -> Self {
        self.publish_type = publish_type;
        self
    }

    pub fn with_publish_count(mut self, count: u32) -> Self {
        self.publish_count = count;
        self
    }

    pub fn with_ttl_secs(mut self, ttl: u32) -> Self {
        self.ttl_secs = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        Ok(())
    }
}

/// Parameters of a subscribe (look for a service).
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct SubscribeConfig {
    pub service_name: String,
    #[serde(default)]
    pub service_specific_info: Vec<u8>,
    #[serde(default)]
    pub match_filter: Vec<u8>,
    #[serde(default)]
    pub subscribe_type: SubscribeType,
    #[serde(default)]
    pub subscribe_count: u32,
    #[serde(default)]
    pub ttl_secs: u32,
    #[serde(default)]
    pub match_style: MatchStyle,
}

impl SubscribeConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn with_service_specific_info(mut self, info: impl Into<Vec<u8>>) -> Self {
        self.service_specific_info = info.into();
        self
    }

    pub fn with_match_filter(mut self, filter: impl Into<Vec<u8>>) -> Self {
        self.match_filter = filter.into();
        self
    }

    pub fn with_subscribe_type(mut self, subscribe_type: SubscribeType) -> Self {
        self.subscribe_type = subscribe_type;
        self
    }

    pub fn with_subscribe_count(mut self, count: u32) -> Self {
        self.subscribe_count = count;
        self
    }

    pub fn with_ttl_secs(mut self, ttl: u32) -> Self {
        self.ttl_secs = ttl;
        self
    }

    pub fn with_match_style(mut self, style: MatchStyle) -> Self {
        self.match_style = style;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_builder() {
        let p = PublishConfig::new("some-service-name")
            .with_service_specific_info(b"ssi".to_vec())
            .with_publish_type(PublishType::Unsolicited)
            .with_publish_count(7);
        assert_eq!(p.service_name, "some-service-name");
        assert_eq!(p.service_specific_info, b"ssi");
        assert_eq!(p.publish_count, 7);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn empty_service_name_rejected() {
        assert_eq!(
            SubscribeConfig::default().validate(),
            Err(ConfigError::EmptyServiceName)
        );
        assert_eq!(
            PublishConfig::new("").validate(),
            Err(ConfigError::EmptyServiceName)
        );
    }

    #[test]
    fn subscribe_builder() {
        let s = SubscribeConfig::new("svc")
            .with_subscribe_type(SubscribeType::Active)
            .with_match_style(MatchStyle::FirstOnly)
            .with_ttl_secs(30);
        assert_eq!(s.subscribe_type, SubscribeType::Active);
        assert_eq!(s.match_style, MatchStyle::FirstOnly);
        assert_eq!(s.ttl_secs, 30);
    }
}
