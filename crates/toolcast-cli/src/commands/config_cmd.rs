//! `toolcast config` -- display resolved configuration.
//!
//! # Examples
//!
//! ```text
//! toolcast config
//! toolcast --config ./dev.json config
//! ```

use toolcast_types::ToolcastConfig;

/// Render the configuration as pretty JSON.
pub fn render(config: &ToolcastConfig) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

/// Print the resolved configuration as formatted JSON.
pub fn config_show(config: &ToolcastConfig) -> anyhow::Result<()> {
    println!("{}", render(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_section() {
        let json: serde_json::Value = serde_json::from_str(&render(&ToolcastConfig::default()).unwrap()).unwrap();
        for section in ["fallback", "orchestrator", "feedback", "session"] {
            assert!(json.get(section).is_some(), "missing {section}");
        }
        assert_eq!(json["fallback"]["base_url"], "http://localhost:3000");
        assert_eq!(json["feedback"]["locale"], "it");
    }
}
