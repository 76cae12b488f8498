//! Format catalog: named decoder recipes, groups and dependency resolution.
//!
//! Formats are registered once at program start; [`Registry::seal`] validates
//! every declared dependency and freezes the catalog. A sealed registry is
//! read-only and safe to share across concurrent decode runs without locks.

use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Decode entry point of a format plugin.
pub type DecodeFn = Box<dyn for<'r> Fn(&mut Decoder<'r>, &Value) -> Result<()> + Send + Sync>;

/// Ordered candidate list tried by a dispatch; the first success wins.
pub type FormatGroup = Vec<Arc<Format>>;

/// Shape of the implicit root compound a format decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootVariant {
    #[default]
    Single,
    /// The decode function loops until end of input inside an implicit array
    /// named by the format's `root_name`.
    Array,
}

/// A named dependency slot: every name in `names` must resolve at seal time.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub names: Vec<String>,
}

/// A named decoder recipe for one binary syntax.
pub struct Format {
    pub name: String,
    pub description: String,
    pub decode_fn: DecodeFn,
    pub root_variant: RootVariant,
    pub root_name: String,
    pub dependencies: Vec<Dependency>,
    /// Input argument used when a dispatch passes none.
    pub default_in_arg: Value,
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Format")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("root_variant", &self.root_variant)
            .finish_non_exhaustive()
    }
}

impl Format {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        decode_fn: impl for<'r> Fn(&mut Decoder<'r>, &Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Format {
            name: name.into(),
            description: description.into(),
            decode_fn: Box::new(decode_fn),
            root_variant: RootVariant::Single,
            root_name: String::new(),
            dependencies: Vec::new(),
            default_in_arg: Value::Null,
        }
    }

    /// Declares the format's top-level decode as an implicit array loop.
    pub fn root_array(mut self, root_name: impl Into<String>) -> Self {
        self.root_variant = RootVariant::Array;
        self.root_name = root_name.into();
        self
    }

    pub fn dependency(mut self, names: &[&str]) -> Self {
        self.dependencies.push(Dependency {
            names: names.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn default_in_arg(mut self, v: Value) -> Self {
        self.default_in_arg = v;
        self
    }
}

/// Name-indexed catalog of formats and format groups.
#[derive(Debug, Default)]
pub struct Registry {
    formats: HashMap<String, Arc<Format>>,
    groups: HashMap<String, Vec<String>>,
    sealed: bool,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&mut self, format: Format) -> Result<()> {
        if self.sealed {
            return Err(Error::Sealed);
        }
        let name = format.name.clone();
        if self.formats.contains_key(&name) || self.groups.contains_key(&name) {
            return Err(Error::DuplicateFormat(name));
        }
        self.formats.insert(name, Arc::new(format));
        Ok(())
    }

    /// Registers a group name resolving to several member formats, tried in
    /// the given order. Members are validated at seal time.
    pub fn register_group(&mut self, name: impl Into<String>, members: &[&str]) -> Result<()> {
        if self.sealed {
            return Err(Error::Sealed);
        }
        let name = name.into();
        if self.formats.contains_key(&name) || self.groups.contains_key(&name) {
            return Err(Error::DuplicateFormat(name));
        }
        self.groups
            .insert(name, members.iter().map(|s| s.to_string()).collect());
        Ok(())
    }

    /// Validates every group member and every declared format dependency, then
    /// freezes the catalog. A format referencing an unregistered name fails
    /// here, before any decode can run.
    pub fn seal(&mut self) -> Result<()> {
        for (group, members) in &self.groups {
            for m in members {
                if !self.formats.contains_key(m) {
                    return Err(Error::UnresolvedDependency {
                        format: group.clone(),
                        dependency: m.clone(),
                    });
                }
            }
        }
        for format in self.formats.values() {
            for dep in &format.dependencies {
                for name in &dep.names {
                    if !self.formats.contains_key(name) && !self.groups.contains_key(name) {
                        return Err(Error::UnresolvedDependency {
                            format: format.name.clone(),
                            dependency: name.clone(),
                        });
                    }
                }
            }
        }
        self.sealed = true;
        tracing::debug!(formats = self.formats.len(), groups = self.groups.len(), "registry sealed");
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn format(&self, name: &str) -> Option<Arc<Format>> {
        self.formats.get(name).cloned()
    }

    /// Ordered candidate list for a format or group name.
    pub fn group(&self, name: &str) -> Result<FormatGroup> {
        if let Some(f) = self.formats.get(name) {
            return Ok(vec![Arc::clone(f)]);
        }
        if let Some(members) = self.groups.get(name) {
            let mut out = Vec::with_capacity(members.len());
            for m in members {
                out.push(
                    self.formats
                        .get(m)
                        .cloned()
                        .ok_or_else(|| Error::UnknownFormat(m.clone()))?,
                );
            }
            return Ok(out);
        }
        Err(Error::UnknownFormat(name.to_string()))
    }
}
