//! Helm version constraints
//!
//! Helm accepts Masterminds-style constraints: `1.2.3`, `v1.2.3`, `~1.2`,
//! `^1.0`, `>= 1.0, < 2.0`, `1.2 - 1.4`, `1.x`, `!= 1.3.0` and `||`
//! alternatives. They are translated to `semver::VersionReq` groups. A bare
//! version is an exact match, unlike Cargo where it is a caret requirement.

use semver::{Version, VersionReq};

use crate::error::{RepoError, Result};

/// A parsed constraint: any group may match
#[derive(Debug, Clone)]
pub struct Constraint {
    groups: Vec<Group>,
}

#[derive(Debug, Clone)]
struct Group {
    req: VersionReq,
    excluded: Vec<Version>,
}

impl Constraint {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || RepoError::InvalidConstraint {
            constraint: input.to_string(),
        };

        let mut groups = Vec::new();
        for alternative in input.split("||") {
            let mut comparators = Vec::new();
            let mut excluded = Vec::new();

            for token in tokenize(alternative) {
                if let Some(version) = token.strip_prefix("!=") {
                    excluded.push(parse_version(version).ok_or_else(invalid)?);
                    continue;
                }
                comparators.push(normalize_comparator(&token));
            }

            let req = if comparators.is_empty() {
                VersionReq::STAR
            } else {
                VersionReq::parse(&comparators.join(", ")).map_err(|_| invalid())?
            };
            groups.push(Group { req, excluded });
        }

        Ok(Self { groups })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.groups
            .iter()
            .any(|g| g.req.matches(version) && !g.excluded.contains(version))
    }
}

/// Lenient version parse: a leading `v` and missing minor/patch are allowed
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let (core, rest) = match trimmed.find(['-', '+']) {
        Some(i) => trimmed.split_at(i),
        None => (trimmed, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

/// Split one `||` alternative into comparators, joining operators with the
/// version that follows them and expanding hyphen ranges
fn tokenize(alternative: &str) -> Vec<String> {
    let words: Vec<&str> = alternative
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect();

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let word = words[i];
        if is_operator(word) && i + 1 < words.len() {
            tokens.push(format!("{}{}", word, words[i + 1]));
            i += 2;
            continue;
        }
        if i + 2 < words.len() && words[i + 1] == "-" {
            tokens.push(format!(">={}", word));
            tokens.push(format!("<={}", words[i + 2]));
            i += 3;
            continue;
        }
        tokens.push(word.to_string());
        i += 1;
    }
    tokens
}

fn is_operator(word: &str) -> bool {
    matches!(word, "=" | "!=" | ">" | "<" | ">=" | "=>" | "<=" | "=<" | "~" | "~>" | "^")
}

fn normalize_comparator(token: &str) -> String {
    let split = token
        .find(|c: char| c.is_ascii_alphanumeric() || c == '*')
        .unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let op = match op {
        "" => "=",
        "=>" => ">=",
        "=<" => "<=",
        "~>" => "~",
        other => other,
    };
    let parts: Vec<&str> = version
        .trim_start_matches('v')
        .split('.')
        .map(|p| if matches!(p, "x" | "X" | "*") { "*" } else { p })
        .collect();

    if !parts.contains(&"*") {
        return format!("{}{}", op, parts.join("."));
    }

    // `>=1.x` means `>=1`; only an exact wildcard keeps its stars
    let prefix: Vec<&str> = parts.iter().take_while(|p| **p != "*").copied().collect();
    if prefix.is_empty() {
        "*".to_string()
    } else if op == "=" {
        format!("{}.*", prefix.join("."))
    } else {
        format!("{}{}", op, prefix.join("."))
    }
}
