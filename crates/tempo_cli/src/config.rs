//! Optional `tempo.toml` defaults.
//!
//! A trace directory may carry a `tempo.toml` with analysis defaults, so a
//! team can pin the iteration annotation and data-loader patterns next to
//! the traces themselves. Command-line flags always win. This is also the
//! only layer allowed to consult configuration outside the process — the
//! core only ever sees the resolved [`CriticalPathConfig`].

use std::path::Path;

use serde::Deserialize;
use tempo_graph::{CriticalPathConfig, IterationSelector};

use crate::AnalyzeArgs;

/// Name of the per-trace-directory configuration file.
const CONFIG_FILE: &str = "tempo.toml";

/// Parsed `tempo.toml` contents.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Analysis defaults.
    #[serde(default)]
    pub analysis: AnalysisDefaults,
}

/// The `[analysis]` table of `tempo.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisDefaults {
    /// Default iteration annotation.
    pub annotation: Option<String>,
    /// Default annotation instance.
    pub instance: Option<u64>,
    /// Default for the zero-weight launch edge toggle.
    pub add_zero_weight_launch_edge: Option<bool>,
    /// Default data-loader patterns.
    pub data_load_events: Option<Vec<String>>,
}

/// Loads `tempo.toml` from the trace directory; a missing file yields
/// defaults.
pub fn load_file_config(trace_dir: &Path) -> Result<FileConfig, Box<dyn std::error::Error>> {
    let path = trace_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(&path)?;
    let config: FileConfig = toml::from_str(&content)
        .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
    Ok(config)
}

/// Merges CLI flags over file defaults into the core's configuration.
pub fn resolve_config(args: &AnalyzeArgs, file: &FileConfig) -> CriticalPathConfig {
    let annotation = args
        .annotation
        .clone()
        .or_else(|| file.analysis.annotation.clone())
        .unwrap_or_default();
    let instance = args.instance.or(file.analysis.instance).unwrap_or(0);

    let add_zero_weight_launch_edge = args.zero_weight_launch_edges
        || file.analysis.add_zero_weight_launch_edge.unwrap_or(false);

    let data_load_events = if args.data_load_events.is_empty() {
        file.analysis.data_load_events.clone().unwrap_or_default()
    } else {
        args.data_load_events.clone()
    };

    CriticalPathConfig {
        add_zero_weight_launch_edge,
        selector: IterationSelector {
            annotation,
            instance,
        },
        data_load_events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse_args(argv: &[&str]) -> AnalyzeArgs {
        let mut full = vec!["tempo", "analyze"];
        full.extend_from_slice(argv);
        match crate::Cli::parse_from(full).command {
            crate::Command::Analyze(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_file_config(dir.path()).unwrap();
        assert!(config.analysis.annotation.is_none());
    }

    #[test]
    fn file_parsed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[analysis]
annotation = "ProfilerStep"
instance = 2
add_zero_weight_launch_edge = true
data_load_events = ["DataLoader"]
"#,
        )
        .unwrap();
        let config = load_file_config(dir.path()).unwrap();
        assert_eq!(config.analysis.annotation.as_deref(), Some("ProfilerStep"));
        assert_eq!(config.analysis.instance, Some(2));
        assert_eq!(config.analysis.add_zero_weight_launch_edge, Some(true));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not [valid toml").unwrap();
        assert!(load_file_config(dir.path()).is_err());
    }

    #[test]
    fn cli_flags_win_over_file_defaults() {
        let file = FileConfig {
            analysis: AnalysisDefaults {
                annotation: Some("file_step".to_string()),
                instance: Some(7),
                add_zero_weight_launch_edge: Some(false),
                data_load_events: Some(vec!["file_loader".to_string()]),
            },
        };
        let args = parse_args(&[
            "--trace-dir",
            "t",
            "--annotation",
            "cli_step",
            "--data-load-event",
            "cli_loader",
        ]);
        let config = resolve_config(&args, &file);
        assert_eq!(config.selector.annotation, "cli_step");
        // Instance falls back to the file default.
        assert_eq!(config.selector.instance, 7);
        assert_eq!(config.data_load_events, vec!["cli_loader".to_string()]);
    }

    #[test]
    fn file_defaults_apply_without_flags() {
        let file = FileConfig {
            analysis: AnalysisDefaults {
                annotation: Some("ProfilerStep".to_string()),
                instance: None,
                add_zero_weight_launch_edge: Some(true),
                data_load_events: None,
            },
        };
        let args = parse_args(&["--trace-dir", "t"]);
        let config = resolve_config(&args, &file);
        assert_eq!(config.selector.annotation, "ProfilerStep");
        assert_eq!(config.selector.instance, 0);
        assert!(config.add_zero_weight_launch_edge);
        assert!(config.data_load_events.is_empty());
    }
}
