//! Command-line normalization for git subcommands.
//!
//! Splits a planner-proposed command into argv, injects flags that keep
//! editor-opening subcommands non-interactive, and classifies read-only probes.

use std::fmt;

/// Message used when a commit is proposed without one.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update via gitagent";

/// Tokenization failure (unbalanced quotes, dangling escape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeError {
    pub message: String,
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TokenizeError {}

/// Strip an optional leading `git` tool name.
pub fn strip_tool_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed == "git" {
        return "";
    }
    match trimmed.strip_prefix("git") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => trimmed,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split a command line into arguments, honoring single quotes, double quotes
/// and backslash escapes.
pub fn tokenize(input: &str) -> Result<Vec<String>, TokenizeError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote = Quote::None;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match quote {
            Quote::None => match ch {
                c if c.is_whitespace() => {
                    if in_token {
                        args.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                '\'' => {
                    quote = Quote::Single;
                    in_token = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_token = true;
                }
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| TokenizeError {
                        message: "trailing backslash".to_string(),
                    })?;
                    current.push(escaped);
                    in_token = true;
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
            Quote::Single => {
                if ch == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(ch);
                }
            }
            Quote::Double => match ch {
                '"' => quote = Quote::None,
                '\\' => match chars.peek() {
                    Some(&next) if matches!(next, '"' | '\\' | '$' | '`') => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                },
                c => current.push(c),
            },
        }
    }

    if quote != Quote::None {
        return Err(TokenizeError {
            message: "unterminated quote".to_string(),
        });
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}

/// Whitespace split, used when [`tokenize`] rejects the input.
pub fn naive_split(input: &str) -> Vec<String> {
    input.split_whitespace().map(str::to_string).collect()
}

/// Strip the tool prefix and tokenize, falling back to whitespace splitting.
pub fn split_args(raw: &str) -> Vec<String> {
    let stripped = strip_tool_prefix(raw);
    tokenize(stripped).unwrap_or_else(|_| naive_split(stripped))
}

/// Index of the git subcommand, skipping global options such as `-c key=value`.
pub fn subcommand_index(args: &[String]) -> Option<usize> {
    let mut idx = 0;
    while idx < args.len() {
        let arg = args[idx].as_str();
        if arg == "-c" || arg == "-C" {
            idx += 2;
            continue;
        }
        if arg.starts_with('-') {
            idx += 1;
            continue;
        }
        return Some(idx);
    }
    None
}

/// The git subcommand (`commit`, `branch`, ...), if any.
pub fn subcommand(args: &[String]) -> Option<&str> {
    subcommand_index(args).map(|idx| args[idx].as_str())
}

/// Arguments after the subcommand.
pub fn subcommand_args(args: &[String]) -> &[String] {
    match subcommand_index(args) {
        Some(idx) => &args[idx + 1..],
        None => &[],
    }
}

/// Add flags that stop `commit`, `merge` and `rebase` from waiting on an editor.
///
/// - `commit` without a message gets `-m <default>` (`--no-edit` when amending).
/// - `merge` gets `--no-edit` unless it is `--abort`/`--quit`/`--continue`.
/// - `rebase` loses `-i`/`--interactive` and runs with no-op editors.
pub fn inject_safety_flags(mut args: Vec<String>) -> Vec<String> {
    let Some(idx) = subcommand_index(&args) else {
        return args;
    };
    let rest: Vec<&str> = args[idx + 1..].iter().map(String::as_str).collect();

    match args[idx].as_str() {
        "commit" => {
            if !commit_has_message(&rest) {
                if rest.contains(&"--amend") {
                    args.push("--no-edit".to_string());
                } else {
                    args.push("-m".to_string());
                    args.push(DEFAULT_COMMIT_MESSAGE.to_string());
                }
            }
        }
        "merge" => {
            let skip = rest.iter().any(|arg| {
                matches!(
                    *arg,
                    "--no-edit" | "--edit" | "-e" | "--abort" | "--quit" | "--continue"
                )
            });
            if !skip {
                args.insert(idx + 1, "--no-edit".to_string());
            }
        }
        "rebase" => {
            let mut kept: Vec<String> = args[..=idx].to_vec();
            kept.extend(
                args[idx + 1..]
                    .iter()
                    .filter(|arg| arg.as_str() != "-i" && arg.as_str() != "--interactive")
                    .cloned(),
            );
            args = kept;
            for setting in ["core.editor=true", "sequence.editor=true"] {
                if !args.iter().any(|arg| arg == setting) {
                    args.insert(0, setting.to_string());
                    args.insert(0, "-c".to_string());
                }
            }
        }
        _ => {}
    }
    args
}

fn commit_has_message(rest: &[&str]) -> bool {
    rest.iter().any(|arg| {
        matches!(
            *arg,
            "-m" | "--message" | "-F" | "--file" | "-C" | "--reuse-message" | "--no-edit" | "--fixup"
        ) || arg.starts_with("--message=")
            || arg.starts_with("--file=")
            || arg.starts_with("--fixup=")
            || arg.starts_with("--reuse-message=")
            || (arg.starts_with('-') && !arg.starts_with("--") && arg.contains('m'))
    })
}

/// Render argv back to a single display string, quoting arguments with spaces.
pub fn render(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// True if `args` is a git invocation that cannot change repository state.
///
/// Verification probes must pass this check before they run.
pub fn is_read_only(args: &[String]) -> bool {
    let Some(sub) = subcommand(args) else {
        return false;
    };
    let rest: Vec<&str> = subcommand_args(args).iter().map(String::as_str).collect();
    match sub {
        "status" | "log" | "diff" | "show" | "rev-parse" | "ls-files" | "describe"
        | "shortlog" | "blame" | "cat-file" | "ls-remote" | "cherry" | "whatchanged"
        | "count-objects" | "grep" | "show-ref" | "merge-base" | "rev-list" => true,
        "reflog" => !rest.iter().any(|arg| matches!(*arg, "expire" | "delete")),
        "branch" => branch_is_listing(&rest),
        "tag" => {
            rest.is_empty()
                || (rest.iter().any(|arg| matches!(*arg, "-l" | "--list" | "-n"))
                    && !rest
                        .iter()
                        .any(|arg| matches!(*arg, "-d" | "--delete" | "-a" | "-s" | "-f")))
        }
        "remote" => match rest.first() {
            None => true,
            Some(first) => matches!(*first, "-v" | "--verbose" | "show" | "get-url"),
        },
        "stash" => matches!(rest.first(), Some(&"list") | Some(&"show")),
        _ => false,
    }
}

fn branch_is_listing(rest: &[&str]) -> bool {
    const MUTATING: &[&str] = &[
        "-d",
        "-D",
        "--delete",
        "-m",
        "-M",
        "--move",
        "-c",
        "-C",
        "--copy",
        "-f",
        "--force",
        "-u",
        "--unset-upstream",
        "--edit-description",
        "-t",
        "--track",
        "--no-track",
    ];
    const TAKES_PATTERN: &[&str] = &[
        "--list",
        "-l",
        "--merged",
        "--no-merged",
        "--contains",
        "--no-contains",
        "--points-at",
    ];
    if rest
        .iter()
        .any(|arg| MUTATING.contains(arg) || arg.starts_with("--set-upstream-to"))
    {
        return false;
    }
    let has_positional = rest.iter().any(|arg| !arg.starts_with('-'));
    !has_positional || rest.iter().any(|arg| TAKES_PATTERN.contains(arg))
}
