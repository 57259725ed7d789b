//! Route patterns for the HTTP host.
//!
//! | Form | Mode | Matches |
//! |------|------|---------|
//! | `/users` | [`RouteMode::Exact`] | exactly `/users` |
//! | `/static/*` | [`RouteMode::Glob`] | `*` is any run of characters, `?` one character |
//! | `~^/items/[0-9]+$` | [`RouteMode::Regexp`] | the regex after `~` |
//!
//! Matching is case-sensitive; the query string is not part of the path.

use std::sync::Arc;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    Exact,
    Glob,
    Regexp,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("empty route path")]
    Empty,
    #[error("route regex error: {0}")]
    InvalidRegex(#[from] regex::Error),
}

#[derive(Clone)]
enum Compiled {
    Exact,
    Glob,
    Regex(Arc<Regex>),
}

/// A compiled route pattern.
#[derive(Clone)]
pub struct RoutePattern {
    src: String,
    compiled: Compiled,
}

impl std::fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePattern")
            .field("src", &self.src)
            .field("mode", &self.mode())
            .finish()
    }
}

impl RoutePattern {
    pub fn parse(src: &str) -> Result<Self, RouteError> {
        let src = src.trim();
        if src.is_empty() {
            return Err(RouteError::Empty);
        }
        let compiled = if let Some(re) = src.strip_prefix('~') {
            Compiled::Regex(Arc::new(Regex::new(re)?))
        } else if src.contains(['*', '?']) {
            Compiled::Glob
        } else {
            Compiled::Exact
        };
        Ok(Self {
            src: src.to_owned(),
            compiled,
        })
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn mode(&self) -> RouteMode {
        match self.compiled {
            Compiled::Exact => RouteMode::Exact,
            Compiled::Glob => RouteMode::Glob,
            Compiled::Regex(_) => RouteMode::Regexp,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.compiled {
            Compiled::Exact => self.src == path,
            Compiled::Glob => glob_match(&self.src, path),
            Compiled::Regex(re) => re.is_match(path),
        }
    }
}

// ── Glob matching ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq)]
enum GlobTok {
    Lit(char),
    One,
    Star,
}

fn glob_tokens(pat: &str) -> Vec<GlobTok> {
    let mut out = Vec::with_capacity(pat.len());
    let mut chars = pat.chars();
    while let Some(c) = chars.next() {
        out.push(match c {
            '\\' => match chars.next() {
                Some(escaped) => GlobTok::Lit(escaped),
                None => GlobTok::Lit('\\'),
            },
            '?' => GlobTok::One,
            '*' => GlobTok::Star,
            c => GlobTok::Lit(c),
        });
    }
    out
}

/// Wildcard match over characters with single-star backtracking; linear in
/// practice and never worse than `O(pattern * text)`.
pub fn glob_match(pat: &str, text: &str) -> bool {
    let pat = glob_tokens(pat);
    let s: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < s.len() {
        match pat.get(p) {
            Some(GlobTok::Star) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(GlobTok::One) => {
                p += 1;
                t += 1;
            }
            Some(GlobTok::Lit(c)) if *c == s[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    backtrack = Some((star_p, star_t + 1));
                    p = star_p + 1;
                    t = star_t + 1;
                }
                None => return false,
            },
        }
    }
    pat[p..].iter().all(|tok| *tok == GlobTok::Star)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> RoutePattern {
        RoutePattern::parse(s).expect("pattern compiles")
    }

    #[test]
    fn exact_route() {
        let p = pat("/hello");
        assert_eq!(p.mode(), RouteMode::Exact);
        assert!(p.matches("/hello"));
        assert!(!p.matches("/hello/"));
        assert!(!p.matches("/Hello"));
    }

    #[test]
    fn glob_route() {
        let p = pat("/static/*");
        assert_eq!(p.mode(), RouteMode::Glob);
        assert!(p.matches("/static/"));
        assert!(p.matches("/static/css/site.css"));
        assert!(!p.matches("/stat"));
    }

    #[test]
    fn glob_question_and_escape() {
        assert!(glob_match("/v?/users", "/v1/users"));
        assert!(!glob_match("/v?/users", "/v10/users"));
        assert!(glob_match("/what\\?", "/what?"));
        assert!(!glob_match("/what\\?", "/whatx"));
    }

    #[test]
    fn glob_question_matches_one_character() {
        assert!(glob_match("/caf?", "/café"));
        assert!(glob_match("/?/menu", "/é/menu"));
        assert!(!glob_match("/caf?", "/cafés"));
        assert!(glob_match("/päth/*", "/päth/ünï"));
    }

    #[test]
    fn glob_pathological_pattern_terminates() {
        let text = "a".repeat(200);
        assert!(!glob_match("*a*a*a*a*a*a*a*a*b", &text));
    }

    #[test]
    fn regex_route() {
        let p = pat("~^/items/[0-9]+$");
        assert_eq!(p.mode(), RouteMode::Regexp);
        assert!(p.matches("/items/42"));
        assert!(!p.matches("/items/abc"));
    }

    #[test]
    fn invalid_routes() {
        assert!(matches!(RoutePattern::parse("~(unclosed"), Err(RouteError::InvalidRegex(_))));
        assert!(matches!(RoutePattern::parse("  "), Err(RouteError::Empty)));
    }
}
