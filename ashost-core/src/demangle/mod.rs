//! Export demangling.
//!
//! The guest exports a flat list such as
//!
//! ```text
//! main
//! util.math.add
//! Foo#constructor
//! Foo#bar
//! Foo#get:x / Foo#set:x
//! ```
//!
//! Each name is parsed once into an [`ExportName`] and assembled into a tree of
//! [`Namespace`]s and [`Class`]es. Calling through the tree goes via
//! [`Bridge`](crate::Bridge), which owns the store.

pub mod schema;

use std::collections::{BTreeMap, HashMap};

use wasmtime::{Extern, Func};

pub use schema::{ExportName, Member};

/// A getter/setter pair. Either half may be missing.
#[derive(Clone, Debug, Default)]
pub struct Property {
    pub getter: Option<Func>,
    pub setter: Option<Func>,
}

/// A class reconstructed from `Class#member` exports.
#[derive(Clone, Debug, Default)]
pub struct Class {
    /// Dotted path of the class, e.g. `geo.Circle`.
    pub path: String,
    /// Raw constructor; takes `this` (0 to allocate) plus the declared arguments.
    pub constructor: Option<Func>,
    /// Instance methods; each takes `this` as the first argument.
    pub methods: BTreeMap<String, Func>,
    pub properties: BTreeMap<String, Property>,
    /// `Class.member` exports.
    pub statics: Namespace,
}

#[derive(Clone, Debug, Default)]
pub struct Namespace {
    pub functions: BTreeMap<String, Func>,
    /// Non-function exports: globals, memories, tables.
    pub values: BTreeMap<String, Extern>,
    pub properties: BTreeMap<String, Property>,
    pub classes: BTreeMap<String, Class>,
    pub namespaces: BTreeMap<String, Namespace>,
}

/// Something reachable by a dotted path.
#[derive(Clone, Copy, Debug)]
pub enum Entry<'a> {
    Function(&'a Func),
    Value(&'a Extern),
    Property(&'a Property),
    Class(&'a Class),
    Namespace(&'a Namespace),
}

impl Namespace {
    /// Child namespace `name`; a class of that name exposes its statics.
    fn child_mut(&mut self, name: &str) -> &mut Namespace {
        if let Some(class) = self.classes.get_mut(name) {
            return &mut class.statics;
        }
        self.namespaces.entry(name.to_string()).or_default()
    }

    fn child(&self, name: &str) -> Option<&Namespace> {
        match self.classes.get(name) {
            Some(class) => Some(&class.statics),
            None => self.namespaces.get(name),
        }
    }

    /// Class `name`, created on first sighting. A namespace already holding
    /// `name`'s static members moves into the class.
    fn class_mut(&mut self, name: &str, path: String) -> &mut Class {
        if !self.classes.contains_key(name) {
            let statics = self.namespaces.remove(name).unwrap_or_default();
            self.classes.insert(
                name.to_string(),
                Class {
                    path,
                    statics,
                    ..Class::default()
                },
            );
        }
        self.classes.entry(name.to_string()).or_default()
    }

    /// Look up a dotted path below this namespace.
    pub fn resolve(&self, path: &str) -> Option<Entry<'_>> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop()?;
        let mut curr = self;
        for segment in segments {
            curr = curr.child(segment)?;
        }
        if let Some(f) = curr.functions.get(last) {
            return Some(Entry::Function(f));
        }
        if let Some(v) = curr.values.get(last) {
            return Some(Entry::Value(v));
        }
        if let Some(p) = curr.properties.get(last) {
            return Some(Entry::Property(p));
        }
        if let Some(c) = curr.classes.get(last) {
            return Some(Entry::Class(c));
        }
        curr.namespaces.get(last).map(Entry::Namespace)
    }

    pub fn class(&self, path: &str) -> Option<&Class> {
        match self.resolve(path)? {
            Entry::Class(c) => Some(c),
            _ => None,
        }
    }
}

/// The demangled export tree.
#[derive(Clone, Debug, Default)]
pub struct Exports {
    pub root: Namespace,
}

impl Exports {
    /// Build the tree from `(name, export)` pairs in export order.
    ///
    /// `skip` names functions that are bridge plumbing (the arity setter) and
    /// must not be wrapped.
    pub fn assemble(exports: &[(String, Extern)], skip: &[&str]) -> Self {
        let by_name: HashMap<&str, &Extern> = exports
            .iter()
            .map(|(name, ext)| (name.as_str(), ext))
            .collect();
        let func_named = |raw: &str| by_name.get(raw).and_then(|e| (*e).clone().into_func());

        let mut root = Namespace::default();
        for (raw, ext) in exports {
            let name = ExportName::parse(raw);
            let mut curr = &mut root;
            let mut path = Vec::with_capacity(name.namespace.len() + 1);
            for segment in &name.namespace {
                path.push(segment.as_str());
                curr = curr.child_mut(segment);
            }

            match &name.class {
                Some(class_name) => {
                    path.push(class_name.as_str());
                    let class = curr.class_mut(class_name, path.join("."));
                    match &name.member {
                        Member::Constructor => class.constructor = ext.clone().into_func(),
                        Member::Method(m) => {
                            if let Some(f) = ext.clone().into_func() {
                                class.methods.insert(m.clone(), f);
                            }
                        }
                        Member::Getter(p) | Member::Setter(p) => {
                            if !class.properties.contains_key(p) {
                                class
                                    .properties
                                    .insert(p.clone(), accessor_pair(raw, &name.member, &func_named));
                            }
                        }
                    }
                }
                None => match &name.member {
                    Member::Getter(p) | Member::Setter(p) => {
                        if !curr.properties.contains_key(p) {
                            curr.properties
                                .insert(p.clone(), accessor_pair(raw, &name.member, &func_named));
                        }
                    }
                    Member::Method(_) if skip.contains(&raw.as_str()) => {
                        log::debug!("not wrapping bridge export `{raw}`");
                    }
                    Member::Method(m) => match ext {
                        Extern::Func(f) => {
                            curr.functions.insert(m.clone(), f.clone());
                        }
                        other => {
                            curr.values.insert(m.clone(), other.clone());
                        }
                    },
                    Member::Constructor => {}
                },
            }
        }
        Exports { root }
    }

    pub fn resolve(&self, path: &str) -> Option<Entry<'_>> {
        self.root.resolve(path)
    }

    pub fn class(&self, path: &str) -> Option<&Class> {
        self.root.class(path)
    }
}

/// Install both halves of a property at once, whichever is seen first.
fn accessor_pair(
    raw: &str,
    member: &Member,
    func_named: &impl Fn(&str) -> Option<Func>,
) -> Property {
    let this = func_named(raw);
    let other = ExportName::counterpart(raw).and_then(|n| func_named(&n));
    match member {
        Member::Getter(_) => Property {
            getter: this,
            setter: other,
        },
        _ => Property {
            getter: other,
            setter: this,
        },
    }
}
