//! Configuration values consulted by the rendering core.

use serde::Deserialize;

/// Tunable rendering parameters, normally filled in from the host
/// library's configuration system.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum acceptable sub-pixel positioning error for stamp caches,
    /// as a fraction of one device pixel. Values below 1/16 disable
    /// stamping entirely.
    pub simplify_threshold: f64,
    /// Window size for stroking long codeless polylines; 0 disables
    /// chunking.
    pub chunk_size: usize,
    /// Default hatch color specification.
    pub hatch_color: String,
    /// Default hatch line width in points.
    pub hatch_linewidth: f64,
    /// Default pixel-snapping flag for new contexts.
    pub snap: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            simplify_threshold: 1.0 / 9.0,
            chunk_size: 0,
            hatch_color: "black".to_string(),
            hatch_linewidth: 1.0,
            snap: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert!(config.simplify_threshold > 1.0 / 16.0);
        assert_eq!(config.chunk_size, 0);
        assert_eq!(config.hatch_color, "black");
        assert_eq!(config.hatch_linewidth, 1.0);
        assert!(config.snap);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RenderConfig = serde_json::from_str(r#"{"chunk_size": 20000}"#).unwrap();
        assert_eq!(config.chunk_size, 20000);
        // Unspecified fields keep their defaults.
        assert!(config.snap);
        assert_eq!(config.hatch_color, "black");
    }
}
