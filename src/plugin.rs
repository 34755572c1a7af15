//! Plugin loading.
//!
//! A plugin is a bundle of host functions, constants and value types. It
//! describes itself by calling into a [`Registrar`]; everything registered
//! is recorded in a [`PluginRecord`] so that uninstalling removes exactly
//! what was added.
//!
//! ```
//! use mathscript::plugin::{Plugin, Registrar};
//! use mathscript::resolver::Signature;
//! use mathscript::{Evaluator, Value};
//!
//! struct Greeting;
//!
//! impl Plugin for Greeting {
//!     fn name(&self) -> &str {
//!         "greeting"
//!     }
//!
//!     fn register(&self, registrar: &mut Registrar<'_>) {
//!         registrar.function("HelloFunction", Signature::new(["String"]), |args| {
//!             Ok(Value::String(format!("hello {}", args[0])))
//!         });
//!     }
//! }
//!
//! let mut engine = Evaluator::new();
//! let record = engine.install(&Greeting).unwrap();
//! assert_eq!(engine.eval_str(r#"hello("you")"#).unwrap(), Value::from("hello you"));
//! engine.uninstall(&record).unwrap();
//! assert!(engine.eval_str(r#"hello("you")"#).is_err());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use tracing::debug;

use crate::resolver::{Callable, Overload, Signature, TypeRegistry};
use crate::scope::{Declaration, ScopeArena, ScopeId};
use crate::value::{Value, ValueError};

pub trait Plugin {
    fn name(&self) -> &str;

    fn register(&self, registrar: &mut Registrar<'_>);
}

/// Everything one plugin added, for symmetric removal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginRecord {
    pub name: String,
    pub functions: Vec<(String, Signature)>,
    pub constants: BTreeSet<String>,
    pub value_types: BTreeSet<String>,
    pub conversions: Vec<(String, String)>,
}

impl PluginRecord {
    /// Distinct function names, sorted.
    pub fn function_names(&self) -> BTreeSet<&str> {
        self.functions.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin '{0}' is already installed")]
    AlreadyInstalled(String),

    #[error("plugin '{0}' is not installed")]
    NotInstalled(String),
}

/// Registration handle passed to [`Plugin::register`].
pub struct Registrar<'a> {
    scopes: &'a mut ScopeArena,
    target: ScopeId,
    types: &'a mut TypeRegistry,
    record: PluginRecord,
    natives: Vec<(String, Callable)>,
}

impl Registrar<'_> {
    /// Adds an overload under the normalized `name`.
    pub fn function(
        &mut self,
        name: &str,
        signature: Signature,
        f: impl Fn(&[Value]) -> Result<Value, ValueError> + 'static,
    ) -> &mut Self {
        let name = normalize_name(name);
        let overload = Overload::native(signature, f);
        self.record
            .functions
            .push((name.clone(), overload.signature.clone()));
        self.natives.push((name.clone(), overload.callable.clone()));
        self.scopes
            .declare(self.target, &name, Declaration::Function(overload));
        self
    }

    pub fn constant(&mut self, name: &str, value: Value) -> &mut Self {
        let name = normalize_name(name);
        self.scopes
            .declare(self.target, &name, Declaration::Constant(value));
        self.record.constants.insert(name);
        self
    }

    /// Makes a custom value type known to overload resolution.
    pub fn value_type(&mut self, name: &str) -> &mut Self {
        if self.types.register(name) {
            self.record.value_types.insert(name.to_string());
        }
        self
    }

    pub fn conversion(
        &mut self,
        from: &str,
        to: &str,
        convert: impl Fn(&Value) -> Option<Value> + 'static,
    ) -> &mut Self {
        self.types.add_conversion(from, to, Rc::new(convert));
        self.record
            .conversions
            .push((from.to_string(), to.to_string()));
        self
    }
}

/// Host-side name of a plugin item: a trailing `Function` or `Constant` is
/// dropped and the rest lower-cased.
///
/// ```
/// use mathscript::plugin::normalize_name;
///
/// assert_eq!(normalize_name("SinFunction"), "sin");
/// assert_eq!(normalize_name("PiConstant"), "pi");
/// assert_eq!(normalize_name("Function"), "function");
/// ```
pub fn normalize_name(name: &str) -> String {
    let stem = ["Function", "Constant"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix).filter(|stem| !stem.is_empty()))
        .unwrap_or(name);
    stem.to_lowercase()
}

/// Installed plugins, in installation order.
#[derive(Debug, Default)]
pub struct PluginLoader {
    records: Vec<PluginRecord>,
    /// The host functions each plugin declared, by plugin name. Uninstalling
    /// removes only these, so a later plugin's overload with the same
    /// signature survives.
    natives: HashMap<String, Vec<(String, Callable)>>,
}

impl PluginLoader {
    pub fn records(&self) -> &[PluginRecord] {
        &self.records
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.records.iter().any(|record| record.name == name)
    }

    pub fn install(
        &mut self,
        plugin: &dyn Plugin,
        scopes: &mut ScopeArena,
        types: &mut TypeRegistry,
    ) -> Result<PluginRecord, PluginError> {
        let name = plugin.name();
        if self.is_installed(name) {
            return Err(PluginError::AlreadyInstalled(name.to_string()));
        }

        let target = scopes.root();
        let mut registrar = Registrar {
            scopes,
            target,
            types,
            record: PluginRecord {
                name: name.to_string(),
                ..PluginRecord::default()
            },
            natives: Vec::new(),
        };
        plugin.register(&mut registrar);
        let Registrar { record, natives, .. } = registrar;

        debug!(
            plugin = name,
            functions = record.functions.len(),
            constants = record.constants.len(),
            value_types = record.value_types.len(),
            "installed plugin"
        );
        self.natives.insert(record.name.clone(), natives);
        self.records.push(record.clone());
        Ok(record)
    }

    /// Removes what `record` added. Variables holding values of a removed
    /// type are dropped from every live scope.
    pub fn uninstall(
        &mut self,
        record: &PluginRecord,
        scopes: &mut ScopeArena,
        types: &mut TypeRegistry,
    ) -> Result<(), PluginError> {
        let Some(index) = self.records.iter().position(|r| r.name == record.name) else {
            return Err(PluginError::NotInstalled(record.name.clone()));
        };
        let record = self.records.remove(index);
        let natives = self.natives.remove(&record.name).unwrap_or_default();
        let root = scopes.root();

        let mut removed = 0;
        for (name, callable) in &natives {
            removed += scopes.remove_overloads(root, name, |overload| {
                overload.callable.ptr_eq(callable)
            });
        }
        for name in &record.constants {
            // a constant some remaining plugin also declares stays
            if !self.records.iter().any(|other| other.constants.contains(name)) {
                scopes.remove_constant(root, name);
            }
        }
        for (from, to) in &record.conversions {
            types.remove_conversion(from, to);
        }

        let mut purged = 0;
        if !record.value_types.is_empty() {
            let ids: Vec<ScopeId> = scopes.ids().collect();
            for id in ids {
                purged += scopes.purge_variables(id, |value| {
                    record.value_types.contains(value.type_name())
                });
            }
        }
        for name in &record.value_types {
            types.unregister(name);
        }

        debug!(plugin = %record.name, removed, purged, "uninstalled plugin");
        Ok(())
    }
}
