//! Typed form of a mangled export name.
//!
//! Grammar: `ns1.ns2.Item`, where `Item` is either a plain member name or
//! `Class#member`. A member prefixed with `get:` or `set:` is one half of a
//! property; `constructor` on a class is the constructor.

/// What a single export contributes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Member {
    Constructor,
    /// Instance method (class) or free function / value (namespace).
    Method(String),
    Getter(String),
    Setter(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExportName {
    pub namespace: Vec<String>,
    pub class: Option<String>,
    pub member: Member,
}

const GETTER_PREFIX: &str = "get:";
const SETTER_PREFIX: &str = "set:";

impl ExportName {
    pub fn parse(raw: &str) -> Self {
        let mut parts: Vec<&str> = raw.split('.').collect();
        let last = parts.pop().unwrap_or_default();
        let namespace = parts.into_iter().map(str::to_string).collect();

        let (class, member) = match last.split_once('#') {
            Some((class, member)) => (Some(class.to_string()), member),
            None => (None, last),
        };

        let member = if let Some(name) = member.strip_prefix(GETTER_PREFIX) {
            Member::Getter(name.to_string())
        } else if let Some(name) = member.strip_prefix(SETTER_PREFIX) {
            Member::Setter(name.to_string())
        } else if class.is_some() && member == "constructor" {
            Member::Constructor
        } else {
            Member::Method(member.to_string())
        };

        Self {
            namespace,
            class,
            member,
        }
    }

    /// Raw name of the other half of an accessor pair.
    pub fn counterpart(raw: &str) -> Option<String> {
        if raw.contains(GETTER_PREFIX) {
            Some(raw.replacen(GETTER_PREFIX, SETTER_PREFIX, 1))
        } else if raw.contains(SETTER_PREFIX) {
            Some(raw.replacen(SETTER_PREFIX, GETTER_PREFIX, 1))
        } else {
            None
        }
    }
}
