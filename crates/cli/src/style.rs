//! Terminal styling for conflux output.

use comfy_table::Color;
use console::Style;

use conflux_core::conflict::{ConflictKind, ResolutionState};

/// Green check mark followed by `msg`.
pub fn success(msg: &str) -> String {
    format!("{} {}", Style::new().green().apply_to("✓"), msg)
}

/// Red cross followed by `msg`.
pub fn error(msg: &str) -> String {
    format!("{} {}", Style::new().red().apply_to("✗"), msg)
}

/// Yellow warning sign followed by `msg`.
pub fn warn(msg: &str) -> String {
    format!("{} {}", Style::new().yellow().apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Table colour of a conflict's short code: content conflicts stand out,
/// deletions are red, one-sided additions are cyan.
pub fn kind_color(kind: ConflictKind) -> Color {
    match kind {
        ConflictKind::BothModified | ConflictKind::BothAdded => Color::Yellow,
        ConflictKind::DeletedByThem | ConflictKind::DeletedByUs | ConflictKind::BothDeleted => {
            Color::Red
        }
        ConflictKind::AddedByUs | ConflictKind::AddedByThem => Color::Cyan,
    }
}

pub fn state_color(state: ResolutionState) -> Color {
    match state {
        ResolutionState::Unresolved => Color::Red,
        ResolutionState::InProgress => Color::Yellow,
        ResolutionState::Resolved => Color::Green,
        ResolutionState::Skipped => Color::DarkGrey,
    }
}

/// `UU conflict.txt`, with the code coloured like the status table.
pub fn conflict_label(kind: ConflictKind, path: &str) -> String {
    let style = match kind_color(kind) {
        Color::Red => Style::new().red(),
        Color::Cyan => Style::new().cyan(),
        _ => Style::new().yellow(),
    };
    format!("{} {}", style.apply_to(kind.short_code()), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_label_keeps_code_and_path() {
        let label = console::strip_ansi_codes(&conflict_label(ConflictKind::DeletedByUs, "a.txt"))
            .into_owned();
        assert_eq!(label, "DU a.txt");
        assert_eq!(kind_color(ConflictKind::BothAdded), Color::Yellow);
        assert_eq!(state_color(ResolutionState::Skipped), Color::DarkGrey);
    }
}
