//! Rule expression grammar
//!
//! The closed set of predicates a collection rule may use:
//!
//! | Expression | Meaning |
//! |---|---|
//! | `true` / `false` | always allow / always deny |
//! | `auth != null` | principal must be authenticated |
//! | `auth == null` | principal must be unauthenticated |
//! | `resource.owner == auth.uid` | principal owns the resource |
//! | `resource.id == auth.uid` | principal matches the resource id |
//! | `auth.uid == '<literal>'` | principal equals a fixed name |
//!
//! Anything else fails to parse. Unparseable text is rejected at
//! load/update time rather than stored, so a rule table can never
//! contain a predicate that silently denies everything.

use std::fmt;

use crate::store::Document;
use crate::types::{Result, StorehouseError};

/// Resource field a rule may compare against the principal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceField {
    Owner,
    Id,
}

/// The resource side of an ownership comparison
#[derive(Debug, Clone, Copy)]
pub struct Resource<'a> {
    pub id: &'a str,
    pub owner: &'a str,
}

impl<'a> From<&'a Document> for Resource<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            id: &doc.id,
            owner: &doc.owner,
        }
    }
}

/// A parsed rule predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleExpr {
    /// `true` or `false`
    Literal(bool),
    /// `auth != null` (expected = true) or `auth == null` (expected = false)
    AuthPresence { expected: bool },
    /// `resource.owner == auth.uid` / `resource.id == auth.uid`
    ResourceFieldEquals(ResourceField),
    /// `auth.uid == '<literal>'`
    PrincipalEquals(String),
}

impl RuleExpr {
    /// Parse an expression from its source text. Unmatched text is an
    /// error: the grammar is closed.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        match text {
            "true" => return Ok(Self::Literal(true)),
            "false" => return Ok(Self::Literal(false)),
            "auth != null" => return Ok(Self::AuthPresence { expected: true }),
            "auth == null" => return Ok(Self::AuthPresence { expected: false }),
            "resource.owner == auth.uid" => {
                return Ok(Self::ResourceFieldEquals(ResourceField::Owner))
            }
            "resource.id == auth.uid" => {
                return Ok(Self::ResourceFieldEquals(ResourceField::Id))
            }
            _ => {}
        }

        // auth.uid == '<literal>' (single- or double-quoted)
        if let Some(rest) = text.strip_prefix("auth.uid ==") {
            let rest = rest.trim();
            let unquoted = rest
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .or_else(|| rest.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
            if let Some(literal) = unquoted {
                if !literal.is_empty() {
                    return Ok(Self::PrincipalEquals(literal.to_string()));
                }
            }
        }

        Err(StorehouseError::InvalidRule(format!(
            "unrecognized rule expression: {text}"
        )))
    }

    /// Evaluate the predicate. Pure: no rule state is touched.
    pub fn evaluate(&self, principal: Option<&str>, resource: Option<Resource<'_>>) -> bool {
        match self {
            Self::Literal(allow) => *allow,
            Self::AuthPresence { expected } => principal.is_some() == *expected,
            Self::ResourceFieldEquals(field) => {
                let (Some(principal), Some(resource)) = (principal, resource) else {
                    return false;
                };
                match field {
                    ResourceField::Owner => resource.owner == principal,
                    ResourceField::Id => resource.id == principal,
                }
            }
            Self::PrincipalEquals(name) => principal == Some(name.as_str()),
        }
    }
}

impl fmt::Display for RuleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(true) => write!(f, "true"),
            Self::Literal(false) => write!(f, "false"),
            Self::AuthPresence { expected: true } => write!(f, "auth != null"),
            Self::AuthPresence { expected: false } => write!(f, "auth == null"),
            Self::ResourceFieldEquals(ResourceField::Owner) => {
                write!(f, "resource.owner == auth.uid")
            }
            Self::ResourceFieldEquals(ResourceField::Id) => {
                write!(f, "resource.id == auth.uid")
            }
            Self::PrincipalEquals(name) => write!(f, "auth.uid == '{name}'"),
        }
    }
}
