use crate::domain::models::IdeKind;
use std::collections::BTreeMap;
use std::path::Path;

pub const IDE_OVERRIDE_ENV: &str = "POMOSYNC_IDE";

/// Process signals the editor leaves behind when it spawns the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdeSignals {
    pub env: BTreeMap<String, String>,
    pub args: Vec<String>,
}

impl IdeSignals {
    pub fn new<E, K, V, A, S>(env: E, args: A) -> Self
    where
        E: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            env: env
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_process() -> Self {
        Self::new(std::env::vars(), std::env::args())
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.env
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn has_var_prefix(&self, prefix: &str) -> bool {
        self.env.keys().any(|key| key.starts_with(prefix))
    }

    fn var_contains(&self, key: &str, needle: &str) -> bool {
        self.var(key)
            .map(|value| value.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    }

    /// Matches executable names only, so directories such as `~/code/` or `ideas/` in a path
    /// never count. `idea64` and `code-insiders` match `idea` and `code`.
    fn args_launch(&self, names: &[&str]) -> bool {
        self.args.iter().any(|arg| {
            let stem = executable_stem(arg);
            names.iter().any(|name| {
                stem.strip_prefix(name)
                    .is_some_and(|rest| !rest.starts_with(|ch: char| ch.is_ascii_alphabetic()))
            })
        })
    }
}

fn executable_stem(arg: &str) -> String {
    let file_name = arg.rsplit(['/', '\\']).next().unwrap_or(arg);
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Classifies the spawning editor. Forks of VS Code export `VSCODE_*` too, so they are checked
/// before it.
pub fn detect_ide(signals: &IdeSignals) -> IdeKind {
    if let Some(explicit) = signals.var(IDE_OVERRIDE_ENV) {
        return IdeKind::parse_lenient(explicit);
    }

    if signals.has_var_prefix("CURSOR_")
        || signals.var_contains("TERM_PROGRAM", "cursor")
        || signals.args_launch(&["cursor"])
    {
        return IdeKind::Cursor;
    }

    if signals.has_var_prefix("WINDSURF_")
        || signals.var_contains("TERM_PROGRAM", "windsurf")
        || signals.var_contains("TERM_PROGRAM", "codeium")
        || signals.args_launch(&["windsurf"])
    {
        return IdeKind::Windsurf;
    }

    if signals.has_var_prefix("IDEA_")
        || signals.has_var_prefix("JETBRAINS_")
        || signals.var_contains("TERMINAL_EMULATOR", "jetbrains")
        || signals.args_launch(&["idea", "intellij", "jetbrains"])
    {
        return IdeKind::Intellij;
    }

    if signals.var("VSCODE_PID").is_some()
        || signals.has_var_prefix("VSCODE_IPC_HOOK")
        || signals.var_contains("TERM_PROGRAM", "vscode")
        || signals.args_launch(&["code", "vscode"])
    {
        return IdeKind::Vscode;
    }

    IdeKind::Unknown
}
