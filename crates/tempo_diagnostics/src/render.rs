//! Plain-text rendering of diagnostics for terminal output.

use crate::diagnostic::Diagnostic;

/// Renders a diagnostic as a single-line header plus indented notes.
///
/// Produces output like:
/// ```text
/// warning[G002]: negative kernel-kernel gap clamped to zero (event 1067)
///   = note: device timestamps are not monotonic on stream 7
/// ```
pub fn render_text(diag: &Diagnostic) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}[{}]: {}", diag.severity, diag.code, diag.message));
    if let Some(event) = diag.event {
        out.push_str(&format!(" (event {event})"));
    }
    out.push('\n');
    for note in &diag.notes {
        out.push_str(&format!("  = note: {note}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{Category, DiagnosticCode};

    #[test]
    fn renders_header() {
        let diag = Diagnostic::warning(
            DiagnosticCode::new(Category::Graph, 2),
            "negative gap clamped to zero",
        );
        let text = render_text(&diag);
        assert!(text.starts_with("warning[G002]: negative gap clamped to zero"));
    }

    #[test]
    fn renders_event_anchor() {
        let diag = Diagnostic::warning(
            DiagnosticCode::new(Category::Sync, 3),
            "wait references unknown device event",
        )
        .with_event(88);
        assert!(render_text(&diag).contains("(event 88)"));
    }

    #[test]
    fn renders_notes_indented() {
        let diag = Diagnostic::note(DiagnosticCode::new(Category::Trace, 1), "dup correlation")
            .with_note("keeping latest start");
        let text = render_text(&diag);
        assert!(text.contains("  = note: keeping latest start\n"));
    }
}
