//! Command-line argument parsing.
//!
//! Usage:
//!   osun [-p<port>] [-e<envfile>]... [-c<code>] [-sndw] [<file.os>]

use std::path::PathBuf;

pub const USAGE: &str = "Usage: osun [-p<port>] [-e<envfile>]... [-c<code>] [-sndw] [<file.os>]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Script file to run.
    pub script: Option<PathBuf>,
    /// Inline code (`-c<code>`), run after the file.
    pub command: Option<String>,
    /// Listening port override (`-p<port>`).
    pub port: Option<u16>,
    /// Extra `.env` files (`-e<file>`), highest priority first.
    pub env_files: Vec<PathBuf>,
    /// Unknown bare words are errors (`-s`).
    pub strict: bool,
    /// Never start the HTTP server (`-n`).
    pub no_serve: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Re-run the script when a `.os` file changes (`-w`).
    pub watch: bool,
}

impl CliArgs {
    /// Nothing to run.
    pub fn is_empty(&self) -> bool {
        self.script.is_none() && self.command.is_none()
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            positional.extend(argv[i + 1..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                's' => args.strict = true,
                'n' => args.no_serve = true,
                'd' => args.debug = true,
                'w' => args.watch = true,

                // Options taking a value: embedded (`-p80`) or separate (`-p 80`).
                c @ ('p' | 'e' | 'c') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{c} requires an argument"));
                    };
                    match c {
                        'p' => {
                            let port = value
                                .parse()
                                .map_err(|_| format!("invalid port number: {value}"))?;
                            args.port = Some(port);
                        }
                        'e' => args.env_files.push(PathBuf::from(value)),
                        _ => args.command = Some(value),
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => args.script = Some(PathBuf::from(positional.remove(0))),
        n => return Err(format!("too many arguments ({n})")),
    }
    if args.watch && args.script.is_none() {
        return Err("-w requires a script file".into());
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(a.is_empty());
        assert!(!a.strict && !a.no_serve && !a.debug && !a.watch);
        assert_eq!(a.port, None);
    }

    #[test]
    fn script_positional() {
        let a = parse_argv(&argv(&["app.os"])).unwrap();
        assert_eq!(a.script, Some(PathBuf::from("app.os")));
        assert!(!a.is_empty());
    }

    #[test]
    fn bool_flags() {
        let a = parse_argv(&argv(&["-s", "-n", "-d"])).unwrap();
        assert!(a.strict && a.no_serve && a.debug);
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-snd"])).unwrap();
        assert!(a.strict && a.no_serve && a.debug);
    }

    #[test]
    fn port_embedded_and_separate() {
        assert_eq!(parse_argv(&argv(&["-p3000"])).unwrap().port, Some(3000));
        assert_eq!(parse_argv(&argv(&["-p", "3000"])).unwrap().port, Some(3000));
    }

    #[test]
    fn bad_port() {
        assert!(parse_argv(&argv(&["-p", "http"])).is_err());
        assert!(parse_argv(&argv(&["-p70000"])).is_err());
    }

    #[test]
    fn env_files_accumulate() {
        let a = parse_argv(&argv(&["-e", "a.env", "-eb.env"])).unwrap();
        assert_eq!(a.env_files, vec![PathBuf::from("a.env"), PathBuf::from("b.env")]);
    }

    #[test]
    fn command_embedded() {
        let a = parse_argv(&argv(&["-cprint(\"hi\")"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("print(\"hi\")"));
    }

    #[test]
    fn flags_then_value_option() {
        let a = parse_argv(&argv(&["-nc", "print(1)", "app.os"])).unwrap();
        assert!(a.no_serve);
        assert_eq!(a.command.as_deref(), Some("print(1)"));
        assert_eq!(a.script, Some(PathBuf::from("app.os")));
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-weird.os"])).unwrap();
        assert_eq!(a.script, Some(PathBuf::from("-weird.os")));
    }

    #[test]
    fn missing_option_value() {
        assert!(parse_argv(&argv(&["-c"])).is_err());
    }

    #[test]
    fn too_many_positional() {
        assert!(parse_argv(&argv(&["a.os", "b.os"])).is_err());
    }

    #[test]
    fn watch_needs_a_script() {
        let a = parse_argv(&argv(&["-w", "app.os"])).unwrap();
        assert!(a.watch);
        assert!(parse_argv(&argv(&["-w", "-c", "print(1)"])).is_err());
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }
}
