//! Routing of input lines to commands.
//!
//! A line is either a command token followed by its argument, or implicit
//! content. Tokens select a command by suffix: the first table entry whose
//! name ends with the token wins, so `notify` and `js` reach `api_notify`
//! and `api_js`.

/// Operations a line can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RenderContent,
    Notify,
    InsertStylesheet,
    RemoveStylesheet,
    RemoveElement,
    ShowElement,
    HideElement,
    ExecScript,
}

/// A named entry in the command table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub name: String,
    pub command: Command,
}

impl CommandEntry {
    pub fn new(name: impl Into<String>, command: Command) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }
}

/// Ordered command table. Declaration order decides suffix collisions.
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn new(entries: Vec<CommandEntry>) -> Self {
        Self { entries }
    }

    /// The commands understood by the host plugin API.
    pub fn builtin() -> Self {
        Self::new(vec![
            CommandEntry::new("api_content", Command::RenderContent),
            CommandEntry::new("api_notify", Command::Notify),
            CommandEntry::new("api_insertCSS", Command::InsertStylesheet),
            CommandEntry::new("api_removeCSS", Command::RemoveStylesheet),
            CommandEntry::new("api_remove", Command::RemoveElement),
            CommandEntry::new("api_show", Command::ShowElement),
            CommandEntry::new("api_hide", Command::HideElement),
            CommandEntry::new("api_js", Command::ExecScript),
            // Older names, last so they never take a token from the above.
            CommandEntry::new("api_processContent", Command::RenderContent),
            CommandEntry::new("api_delElem", Command::RemoveElement),
            CommandEntry::new("api_showElem", Command::ShowElement),
            CommandEntry::new("api_hideElem", Command::HideElement),
        ])
    }

    /// First entry whose name ends with `token`. An empty token matches nothing.
    pub fn resolve(&self, token: &str) -> Option<&CommandEntry> {
        if token.is_empty() {
            return None;
        }
        self.entries.iter().find(|entry| entry.name.ends_with(token))
    }

    /// Pairs `(shadowing, shadowed)` where the later entry's full name also
    /// resolves to the earlier one, making the later entry unreachable by
    /// its own name.
    pub fn ambiguities(&self) -> Vec<(&str, &str)> {
        let mut found = Vec::new();
        for (i, later) in self.entries.iter().enumerate() {
            if let Some(earlier) = self.entries[..i]
                .iter()
                .find(|earlier| earlier.name.ends_with(&later.name))
            {
                found.push((earlier.name.as_str(), later.name.as_str()));
            }
        }
        found
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Routing decision for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    /// Render the text as content.
    Content(&'a str),
    /// Run `command` with the rest of the line.
    Command { command: Command, argument: &'a str },
}

/// Decide what a line means.
///
/// Lines without whitespace are content. Otherwise the line is split at its
/// first whitespace character; if no command matches the leading token, the
/// whole line is content.
pub fn route<'a>(table: &CommandTable, line: &'a str) -> Route<'a> {
    let Some((index, separator)) = line.char_indices().find(|(_, c)| c.is_whitespace()) else {
        return Route::Content(line);
    };

    let token = &line[..index];
    let argument = &line[index + separator.len_utf8()..];
    match table.resolve(token) {
        Some(entry) => Route::Command {
            command: entry.command,
            argument,
        },
        None => Route::Content(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_whitespace_is_content() {
        let table = CommandTable::builtin();
        assert_eq!(route(&table, "notify"), Route::Content("notify"));
        assert_eq!(route(&table, ""), Route::Content(""));
    }

    #[test]
    fn test_suffix_match() {
        let table = CommandTable::builtin();
        assert_eq!(
            route(&table, "notify hello there"),
            Route::Command {
                command: Command::Notify,
                argument: "hello there"
            }
        );
        assert_eq!(
            route(&table, "js view-0 document.title = 'x'"),
            Route::Command {
                command: Command::ExecScript,
                argument: "view-0 document.title = 'x'"
            }
        );
        assert_eq!(
            route(&table, "api_remove basic-0"),
            Route::Command {
                command: Command::RemoveElement,
                argument: "basic-0"
            }
        );
    }

    #[test]
    fn test_shared_suffix_takes_first_declared() {
        let table = CommandTable::builtin();
        assert_eq!(
            route(&table, "CSS a|b"),
            Route::Command {
                command: Command::InsertStylesheet,
                argument: "a|b"
            }
        );
    }

    #[test]
    fn test_first_match_only() {
        let table = CommandTable::new(vec![
            CommandEntry::new("notify", Command::Notify),
            CommandEntry::new("api_notify", Command::ExecScript),
        ]);
        assert_eq!(table.resolve("notify").unwrap().name, "notify");
        assert!(table.ambiguities().is_empty());

        let table = CommandTable::new(vec![
            CommandEntry::new("api_notify", Command::Notify),
            CommandEntry::new("notify", Command::ExecScript),
        ]);
        assert_eq!(table.resolve("notify").unwrap().name, "api_notify");
        assert_eq!(table.ambiguities(), vec![("api_notify", "notify")]);
    }

    #[test]
    fn test_element_aliases() {
        let table = CommandTable::builtin();
        assert_eq!(
            route(&table, "delElem basic-0"),
            Route::Command {
                command: Command::RemoveElement,
                argument: "basic-0"
            }
        );
        assert_eq!(
            route(&table, "showElem view-1"),
            Route::Command {
                command: Command::ShowElement,
                argument: "view-1"
            }
        );
        assert_eq!(
            route(&table, "hideElem view-1"),
            Route::Command {
                command: Command::HideElement,
                argument: "view-1"
            }
        );
        assert_eq!(
            route(&table, "processContent hi"),
            Route::Command {
                command: Command::RenderContent,
                argument: "hi"
            }
        );
        // Aliases do not take over the shorter names.
        assert_eq!(table.resolve("remove").unwrap().name, "api_remove");
        assert_eq!(table.resolve("content").unwrap().name, "api_content");
    }

    #[test]
    fn test_builtin_has_no_ambiguities() {
        assert!(CommandTable::builtin().ambiguities().is_empty());
    }

    #[test]
    fn test_unknown_token_keeps_full_line() {
        let table = CommandTable::builtin();
        assert_eq!(
            route(&table, "xyz hello there"),
            Route::Content("xyz hello there")
        );
    }

    #[test]
    fn test_leading_whitespace_is_content() {
        let table = CommandTable::builtin();
        assert_eq!(route(&table, " notify x"), Route::Content(" notify x"));
    }

    #[test]
    fn test_splits_on_any_whitespace() {
        let table = CommandTable::builtin();
        assert_eq!(
            route(&table, "hide\tview-2"),
            Route::Command {
                command: Command::HideElement,
                argument: "view-2"
            }
        );
    }
}
