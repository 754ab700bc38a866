//! Text summary builder for `--check` output.
//!
//! This module formats human-readable lines describing a validated configuration.

use crate::config::ValidatedConfig;
use std::path::Path;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary of a configuration that passed validation.
pub(crate) fn build_text_summary(path: &Path, config: &ValidatedConfig) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Config OK: {}", path.display()));
    lines.push(format!("Account:   {}", config.email()));

    let positions = config.positions();
    lines.push(format!(
        "Positions: {} ({})",
        positions.len(),
        positions.join(", ")
    ));

    let locations = config.locations();
    lines.push(format!(
        "Locations: {} ({})",
        locations.len(),
        locations.join(", ")
    ));

    if config.distance() == 0 {
        lines.push("Distance:  exact location only".to_string());
    } else {
        lines.push(format!("Distance:  within {} mi", config.distance()));
    }

    let ai = if config.ai_assist_enabled() {
        "enabled"
    } else {
        "disabled (no API key)"
    };
    lines.push(format!("AI-assisted answers: {ai}"));

    TextSummary { lines }
}
