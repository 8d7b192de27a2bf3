//! Policy statements: access-vector rules and type-transition rules.
//!
//! Rules carry their own textual form so a module can be written out
//! line by line, and parse back from that form so hand-written extra rules
//! can join generated ones.

pub mod build;

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{CompileError, Result};

// ---------------------------------------------------------------------------
// Access-vector rules
// ---------------------------------------------------------------------------

/// Statement keyword of an access-vector rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvcKind {
    /// `allow`
    Allow,
    /// `dontaudit`
    DontAudit,
    /// `auditallow`
    AuditAllow,
    /// `neverallow`
    NeverAllow,
}

impl AvcKind {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "allow" => Some(Self::Allow),
            "dontaudit" => Some(Self::DontAudit),
            "auditallow" => Some(Self::AuditAllow),
            "neverallow" => Some(Self::NeverAllow),
            _ => None,
        }
    }

    /// The keyword as written in policy source.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::DontAudit => "dontaudit",
            Self::AuditAllow => "auditallow",
            Self::NeverAllow => "neverallow",
        }
    }
}

/// `allow subject object : class { perms };` and its audit variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcRule {
    /// Statement keyword.
    pub kind: AvcKind,
    /// Source type or attribute.
    pub subject: String,
    /// Target type or attribute.
    pub object: String,
    /// Object class.
    pub class: String,
    /// Permission set. `*` stands for every permission and is never mixed
    /// with named permissions.
    pub actions: BTreeSet<String>,
}

impl AvcRule {
    /// Build a rule, collapsing the action set to `*` if it contains one.
    pub fn new<I, S>(kind: AvcKind, subject: &str, object: &str, class: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: BTreeSet<String> = actions.into_iter().map(Into::into).collect();
        if set.contains("*") {
            set = BTreeSet::from(["*".to_owned()]);
        }
        Self {
            kind,
            subject: subject.to_owned(),
            object: object.to_owned(),
            class: class.to_owned(),
            actions: set,
        }
    }

    /// Shorthand for an `allow` rule.
    pub fn allow<I, S>(subject: &str, object: &str, class: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(AvcKind::Allow, subject, object, class, actions)
    }

    /// Whether this rule grants every permission of its class.
    pub fn is_wildcard(&self) -> bool {
        self.actions.contains("*")
    }

    /// Whether two rules share kind, subject, object and class.
    pub fn same_target(&self, other: &AvcRule) -> bool {
        self.kind == other.kind
            && self.subject == other.subject
            && self.object == other.object
            && self.class == other.class
    }

    /// Union `other`'s permissions into this rule if both address the same
    /// target. Returns whether the merge happened.
    pub fn merge(&mut self, other: &AvcRule) -> bool {
        if !self.same_target(other) {
            return false;
        }
        if self.is_wildcard() || other.is_wildcard() {
            self.actions = BTreeSet::from(["*".to_owned()]);
        } else {
            self.actions.extend(other.actions.iter().cloned());
        }
        true
    }

    fn parse(line: &str) -> Result<Self> {
        let invalid = || CompileError::InvalidRule {
            rule: line.trim().to_owned(),
            reason: "malformed access vector rule".to_owned(),
        };
        let (head, tail) = split_statement(line).ok_or_else(invalid)?;

        let [kind, subject, object] = head[..] else {
            return Err(invalid());
        };
        let kind = AvcKind::parse(kind).ok_or_else(invalid)?;

        let mut fields = tail.into_iter();
        let class = fields.next().ok_or_else(invalid)?;
        let actions: Vec<&str> = fields
            .map(|f| f.trim_start_matches('{').trim_end_matches('}'))
            .filter(|f| !f.is_empty())
            .collect();
        if actions.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(kind, subject, object, class, actions))
    }
}

impl fmt::Display for AvcRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = format!(
            "{} {} {} : {}",
            self.kind.keyword(),
            self.subject,
            self.object,
            self.class
        );
        if self.is_wildcard() {
            return writeln!(f, "{head} *;");
        }
        let perms: Vec<&str> = self.actions.iter().map(String::as_str).collect();
        writeln!(f, "{head} {{ {} }};", perms.join(" "))
    }
}

// ---------------------------------------------------------------------------
// Type rules
// ---------------------------------------------------------------------------

/// `type_transition subject object : class target ["name"];`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRule {
    /// Source type or attribute.
    pub subject: String,
    /// Target type of the parent object.
    pub object: String,
    /// Object class.
    pub class: String,
    /// Type the new object or process receives.
    pub target: String,
    /// Optional object name restricting the transition.
    pub name: Option<String>,
}

impl TypeRule {
    /// Build a transition rule.
    pub fn transition(
        subject: &str,
        object: &str,
        class: &str,
        target: &str,
        name: Option<&str>,
    ) -> Self {
        Self {
            subject: subject.to_owned(),
            object: object.to_owned(),
            class: class.to_owned(),
            target: target.to_owned(),
            name: name.filter(|n| !n.is_empty()).map(str::to_owned),
        }
    }

    /// Two transitions conflict when they agree on everything but the target.
    pub fn conflicts_with(&self, other: &TypeRule) -> bool {
        self.subject == other.subject
            && self.object == other.object
            && self.class == other.class
            && self.name == other.name
            && self.target != other.target
    }

    fn parse(line: &str) -> Result<Self> {
        let invalid = || CompileError::InvalidRule {
            rule: line.trim().to_owned(),
            reason: "malformed type rule".to_owned(),
        };
        let (head, tail) = split_statement(line).ok_or_else(invalid)?;

        let ["type_transition", subject, object] = head[..] else {
            return Err(invalid());
        };
        let (class, target, name) = match tail[..] {
            [class, target] => (class, target, None),
            [class, target, name, ..] => (class, target, Some(name.trim_matches('"'))),
            _ => return Err(invalid()),
        };
        Ok(Self::transition(subject, object, class, target, name))
    }
}

impl fmt::Display for TypeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type_transition {} {} : {} {}",
            self.subject, self.object, self.class, self.target
        )?;
        match &self.name {
            Some(name) => writeln!(f, " \"{name}\";"),
            None => writeln!(f, ";"),
        }
    }
}

// ---------------------------------------------------------------------------
// Either kind
// ---------------------------------------------------------------------------

/// Any rule the compiler emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Access-vector rule.
    Avc(AvcRule),
    /// Type-transition rule.
    Type(TypeRule),
}

impl Rule {
    /// Parse one policy statement, dispatching on its leading keyword.
    pub fn parse(line: &str) -> Result<Self> {
        match line.split_whitespace().next() {
            Some(word) if AvcKind::parse(word).is_some() => AvcRule::parse(line).map(Rule::Avc),
            Some("type_transition") => TypeRule::parse(line).map(Rule::Type),
            _ => Err(CompileError::InvalidRule {
                rule: line.trim().to_owned(),
                reason: "unknown rule keyword".to_owned(),
            }),
        }
    }

    /// Object class the rule applies to.
    pub fn class(&self) -> &str {
        match self {
            Rule::Avc(r) => &r.class,
            Rule::Type(r) => &r.class,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Avc(r) => r.fmt(f),
            Rule::Type(r) => r.fmt(f),
        }
    }
}

impl From<AvcRule> for Rule {
    fn from(rule: AvcRule) -> Self {
        Rule::Avc(rule)
    }
}

impl From<TypeRule> for Rule {
    fn from(rule: TypeRule) -> Self {
        Rule::Type(rule)
    }
}

/// Split `head : tail;` into whitespace-separated fields on each side.
fn split_statement(line: &str) -> Option<(Vec<&str>, Vec<&str>)> {
    let body = line.trim();
    let body = body.strip_suffix(';').unwrap_or(body);
    let mut parts = body.split(':');
    let (head, tail) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some((
        head.split_whitespace().collect(),
        tail.split_whitespace().collect(),
    ))
}
