//! Allow/deny policy for proposed shell commands.
//!
//! The policy is an explicit rule table: deny rules are checked first and any
//! match rejects, then the command is tokenized with shell-word rules and its
//! first word must be an allowed verb. Validation is a pure predicate.

use std::fmt;

use crate::core::types::START_SERVER_SENTINEL;

/// Why a deny rule exists. Reported back to the user on rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyCategory {
    Destructive,
    PrivilegeEscalation,
    RemoteExecution,
    ProjectConvention,
}

impl DenyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyCategory::Destructive => "destructive",
            DenyCategory::PrivilegeEscalation => "privilege escalation",
            DenyCategory::RemoteExecution => "remote execution",
            DenyCategory::ProjectConvention => "project convention",
        }
    }
}

/// How a deny pattern is compared against the lower-cased command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Plain substring match.
    Contains,
    /// `from|into`: `from` appears before a pipe whose first downstream word is `into`.
    PipedInto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenyRule {
    pub pattern: String,
    pub mode: MatchMode,
    pub category: DenyCategory,
}

impl DenyRule {
    fn new(pattern: &str, mode: MatchMode, category: DenyCategory) -> Self {
        Self {
            pattern: pattern.to_string(),
            mode,
            category,
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        match self.mode {
            MatchMode::Contains => lowered.contains(&self.pattern),
            MatchMode::PipedInto => match self.pattern.split_once('|') {
                Some((from, into)) => pipes_into(lowered, from, into),
                None => lowered.contains(&self.pattern),
            },
        }
    }
}

fn pipes_into(lowered: &str, from: &str, into: &str) -> bool {
    lowered.match_indices('|').any(|(idx, _)| {
        let (upstream, rest) = lowered.split_at(idx);
        let downstream = rest.trim_start_matches('|').trim_start();
        let program = downstream
            .split_whitespace()
            .next()
            .and_then(|word| word.rsplit('/').next())
            .unwrap_or("");
        upstream.contains(from) && program == into
    })
}

/// Reason a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Denied {
        pattern: String,
        category: DenyCategory,
    },
    Unparseable,
    Empty,
    VerbNotAllowed {
        verb: String,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Denied { pattern, category } => {
                write!(f, "matches blocked pattern `{pattern}` ({})", category.as_str())
            }
            Rejection::Unparseable => write!(f, "cannot be split into shell words"),
            Rejection::Empty => write!(f, "is empty"),
            Rejection::VerbNotAllowed { verb } => {
                write!(f, "starts with `{verb}`, which is not an allowed command")
            }
        }
    }
}

/// Result of validating a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Rejected(Rejection),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Ordered policy table: deny rules, then allowed command verbs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    deny: Vec<DenyRule>,
    allow: Vec<String>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::project_default()
    }
}

impl PolicyTable {
    pub fn new(deny: Vec<DenyRule>, allow: Vec<String>) -> Self {
        Self { deny, allow }
    }

    /// Policy for a `make`-driven Python web project.
    pub fn project_default() -> Self {
        use DenyCategory::{Destructive, PrivilegeEscalation, ProjectConvention, RemoteExecution};
        use MatchMode::{Contains, PipedInto};

        let deny = vec![
            DenyRule::new("sudo", Contains, PrivilegeEscalation),
            DenyRule::new("rm", Contains, Destructive),
            DenyRule::new("shutdown", Contains, Destructive),
            DenyRule::new("reboot", Contains, Destructive),
            DenyRule::new("killall", Contains, Destructive),
            DenyRule::new("mkfs", Contains, Destructive),
            DenyRule::new("dd", Contains, Destructive),
            DenyRule::new(">:", Contains, Destructive),
            DenyRule::new("curl|bash", PipedInto, RemoteExecution),
            DenyRule::new("wget|bash", PipedInto, RemoteExecution),
            DenyRule::new("curl|sh", PipedInto, RemoteExecution),
            DenyRule::new("wget|sh", PipedInto, RemoteExecution),
            DenyRule::new("lsof", Contains, ProjectConvention),
            DenyRule::new("flask run", Contains, ProjectConvention),
            DenyRule::new("python3 -m flask", Contains, ProjectConvention),
            DenyRule::new("unittest", Contains, ProjectConvention),
        ];
        let allow = [
            "ls", "pwd", "cat", "sed", "grep", "find", "head", "tail", "python3", "pip3", "make",
            "echo", "curl",
        ]
        .iter()
        .map(|verb| verb.to_string())
        .collect();
        Self { deny, allow }
    }

    pub fn allowed_verbs(&self) -> &[String] {
        &self.allow
    }

    /// Validate a proposed command. Deny always wins over allow.
    pub fn validate(&self, command: &str) -> Decision {
        let lowered = command.to_lowercase();
        if let Some(rule) = self.deny.iter().find(|rule| rule.matches(&lowered)) {
            return Decision::Rejected(Rejection::Denied {
                pattern: rule.pattern.clone(),
                category: rule.category,
            });
        }

        if command.trim() == START_SERVER_SENTINEL {
            return Decision::Allowed;
        }

        let Some(words) = shlex::split(command) else {
            return Decision::Rejected(Rejection::Unparseable);
        };
        let Some(verb) = words.first() else {
            return Decision::Rejected(Rejection::Empty);
        };
        if self.allow.iter().any(|allowed| allowed == verb) {
            Decision::Allowed
        } else {
            Decision::Rejected(Rejection::VerbNotAllowed { verb: verb.clone() })
        }
    }
}
