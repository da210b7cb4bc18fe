//! Command template rendering.
//!
//! Templates are split into words with POSIX shell rules (via `shlex`), then
//! each word has its placeholders replaced. Substitution happens after
//! splitting, so a path containing spaces stays a single argument.

use std::path::Path;

use crate::errors::ToolError;

use super::StageFiles;

/// Placeholder names understood in templates.
pub const PLACEHOLDERS: [&str; 4] = ["LOCAL", "REMOTE", "BASE", "MERGED"];

/// A command ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Render `template` for `tool` with the concrete stage file paths.
pub fn render(tool: &str, template: &str, files: &StageFiles) -> Result<RenderedCommand, ToolError> {
    let words = shlex::split(template).ok_or_else(|| ToolError::Template {
        tool: tool.to_string(),
        detail: format!("cannot split '{}'", template),
    })?;

    let mut words = words.into_iter().map(|w| substitute(&w, files));
    let program = words.next().ok_or_else(|| ToolError::Template {
        tool: tool.to_string(),
        detail: "command is empty".into(),
    })?;

    Ok(RenderedCommand {
        program,
        args: words.collect(),
    })
}

/// `true` if the template references `$MERGED`, i.e. the tool writes the
/// result in place. Merge tools without it are rejected by config
/// validation.
pub fn writes_merged(template: &str) -> bool {
    template.contains("$MERGED") || template.contains("${MERGED}")
}

fn substitute(word: &str, files: &StageFiles) -> String {
    let mut out = word.to_string();
    for name in PLACEHOLDERS {
        let value = display(match name {
            "LOCAL" => &files.local,
            "REMOTE" => &files.remote,
            "BASE" => &files.base,
            _ => &files.merged,
        });
        out = out
            .replace(&format!("${{{}}}", name), &value)
            .replace(&format!("${}", name), &value);
    }
    out
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn files() -> StageFiles {
        StageFiles::new(
            PathBuf::from("/tmp/x/a.LOCAL.png"),
            PathBuf::from("/tmp/x/a.REMOTE.png"),
            PathBuf::from("/tmp/x/a.BASE.png"),
            PathBuf::from("/repo/my dir/a.png"),
        )
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let cmd = render(
            "kdiff3",
            "kdiff3 $BASE $LOCAL ${REMOTE} -o $MERGED",
            &files(),
        )
        .unwrap();
        assert_eq!(cmd.program, "kdiff3");
        assert_eq!(
            cmd.args,
            vec![
                "/tmp/x/a.BASE.png",
                "/tmp/x/a.LOCAL.png",
                "/tmp/x/a.REMOTE.png",
                "-o",
                "/repo/my dir/a.png",
            ]
        );
    }

    #[test]
    fn test_placeholder_inside_word() {
        let cmd = render("t", "tool --out=$MERGED", &files()).unwrap();
        assert_eq!(cmd.args, vec!["--out=/repo/my dir/a.png"]);
    }

    #[test]
    fn test_quoted_words_are_kept_together() {
        let cmd = render("t", "\"/opt/My Tool/bin\" '$LOCAL'", &files()).unwrap();
        assert_eq!(cmd.program, "/opt/My Tool/bin");
        assert_eq!(cmd.args, vec!["/tmp/x/a.LOCAL.png"]);
    }

    #[test]
    fn test_empty_and_malformed_templates() {
        assert!(matches!(render("t", "   ", &files()), Err(ToolError::Template { .. })));
        assert!(matches!(render("t", "tool 'open", &files()), Err(ToolError::Template { .. })));
    }

    #[test]
    fn test_writes_merged() {
        assert!(writes_merged("meld $LOCAL $REMOTE --output ${MERGED}"));
        assert!(!writes_merged("meld $LOCAL $REMOTE"));
    }
}
