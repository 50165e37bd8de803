//! Validated configuration for layout, styling and the operation coordinator.
//!
//! Every structure rejects unknown keys on deserialization and checks value
//! ranges in [`Validate::validate`].

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;

pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Parse a JSON configuration object and validate it.
pub fn parse_config<T>(json: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    let config: T = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

fn check_range(
    key: &'static str,
    value: f64,
    range: RangeInclusive<f64>,
) -> Result<(), ConfigError> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutAlgorithm {
    #[default]
    Layered,
    Tree,
    Force,
    Stress,
    Radial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDirection {
    #[default]
    Down,
    Up,
    Left,
    Right,
}

impl LayoutDirection {
    /// Layers stack along the y axis.
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Down | Self::Up)
    }

    pub fn is_reversed(self) -> bool {
        matches!(self, Self::Up | Self::Left)
    }
}

/// Engine-specific option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomOption {
    Flag(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub algorithm: LayoutAlgorithm,
    pub direction: LayoutDirection,
    pub node_spacing: f32,
    pub layer_spacing: f32,
    pub edge_spacing: f32,
    pub custom: BTreeMap<String, CustomOption>,
}

impl LayoutConfig {
    pub const NODE_SPACING_RANGE: RangeInclusive<f64> = 1.0..=1000.0;
    pub const LAYER_SPACING_RANGE: RangeInclusive<f64> = 1.0..=2000.0;
    pub const EDGE_SPACING_RANGE: RangeInclusive<f64> = 0.0..=500.0;

    fn is_valid_custom_key(key: &str) -> bool {
        !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            algorithm: LayoutAlgorithm::Layered,
            direction: LayoutDirection::Down,
            node_spacing: 40.0,
            layer_spacing: 80.0,
            edge_spacing: 10.0,
            custom: BTreeMap::new(),
        }
    }
}

impl Validate for LayoutConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "node_spacing",
            f64::from(self.node_spacing),
            Self::NODE_SPACING_RANGE,
        )?;
        check_range(
            "layer_spacing",
            f64::from(self.layer_spacing),
            Self::LAYER_SPACING_RANGE,
        )?;
        check_range(
            "edge_spacing",
            f64::from(self.edge_spacing),
            Self::EDGE_SPACING_RANGE,
        )?;
        if let Some(key) = self.custom.keys().find(|k| !Self::is_valid_custom_key(k)) {
            return Err(ConfigError::InvalidKey(key.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStyleKind {
    #[default]
    Straight,
    Orthogonal,
    Curved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Palette {
    #[default]
    Default,
    Muted,
    HighContrast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleConfig {
    pub edge_style: EdgeStyleKind,
    pub palette: Palette,
    pub line_width: f32,
    pub dashed_aggregates: bool,
    pub show_multiplicity: bool,
}

impl StyleConfig {
    pub const LINE_WIDTH_RANGE: RangeInclusive<f64> = 0.5..=10.0;
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            edge_style: EdgeStyleKind::Straight,
            palette: Palette::Default,
            line_width: 1.5,
            dashed_aggregates: true,
            show_multiplicity: true,
        }
    }
}

impl Validate for StyleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "line_width",
            f64::from(self.line_width),
            Self::LINE_WIDTH_RANGE,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// How long to wait for the renderer to confirm a frame before moving on.
    pub render_ack_timeout_ms: u64,
    pub error_log_capacity: usize,
    pub max_batch_size: usize,
    /// Run the invariant audit after every applied mutation.
    pub audit_invariants: bool,
}

impl CoordinatorConfig {
    pub const RENDER_ACK_TIMEOUT_RANGE: RangeInclusive<f64> = 1.0..=60_000.0;

    pub fn render_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.render_ack_timeout_ms)
    }

    pub fn with_render_ack_timeout(mut self, timeout: Duration) -> Self {
        self.render_ack_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            render_ack_timeout_ms: 2_000,
            error_log_capacity: 256,
            max_batch_size: 10_000,
            audit_invariants: false,
        }
    }
}

impl Validate for CoordinatorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "render_ack_timeout_ms",
            self.render_ack_timeout_ms as f64,
            Self::RENDER_ACK_TIMEOUT_RANGE,
        )?;
        check_range(
            "error_log_capacity",
            self.error_log_capacity as f64,
            1.0..=1_000_000.0,
        )?;
        check_range(
            "max_batch_size",
            self.max_batch_size as f64,
            1.0..=10_000_000.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_config_defaults_are_valid() {
        assert!(LayoutConfig::default().validate().is_ok());
        assert!(StyleConfig::default().validate().is_ok());
        assert!(CoordinatorConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_recognized_keys() {
        let config: LayoutConfig = parse_config(
            r#"{"algorithm":"radial","direction":"left","node_spacing":25,"custom":{"elk.seed":3}}"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, LayoutAlgorithm::Radial);
        assert_eq!(config.direction, LayoutDirection::Left);
        assert_eq!(config.node_spacing, 25.0);
        assert_eq!(config.layer_spacing, 80.0);
        assert_eq!(
            config.custom.get("elk.seed"),
            Some(&CustomOption::Number(3.0))
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_config::<LayoutConfig>(r#"{"nodeSpacing":25}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(msg) if msg.contains("unknown field")));
    }

    #[test]
    fn rejects_unknown_enum_values() {
        let err = parse_config::<LayoutConfig>(r#"{"algorithm":"spiral"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = parse_config::<LayoutConfig>(r#"{"layer_spacing":0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                key: "layer_spacing",
                ..
            }
        ));

        let err = parse_config::<StyleConfig>(r#"{"line_width":25}"#).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "line_width", .. }));
    }

    #[test]
    fn rejects_malformed_custom_keys() {
        let err = parse_config::<LayoutConfig>(r#"{"custom":{"Bad Key":true}}"#).unwrap_err();
        assert_eq!(err, ConfigError::InvalidKey("Bad Key".to_string()));
    }

    #[test]
    fn direction_axes() {
        assert!(LayoutDirection::Down.is_vertical());
        assert!(LayoutDirection::Up.is_reversed());
        assert!(!LayoutDirection::Right.is_vertical());
    }
}
