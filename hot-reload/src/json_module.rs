//! JSON modules.
//!
//! A module is a JSON object. The reserved key `$require` maps aliases to
//! paths of child modules, relative to the requiring file. Any value of the
//! form `{"$ref": "alias.key"}` is replaced by a copy of that export taken at
//! compile time (`{"$ref": "alias"}` copies the whole module). Every other
//! key is exported as written.
//!
//! ```json
//! {
//!   "$require": { "db": "./db.json" },
//!   "name": "api",
//!   "database_url": { "$ref": "db.url" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::binding::Exports;
use crate::error::{HotReloadError, Result};
use crate::runtime::{Compile, PendingModule, RequireContext};

const REQUIRE_KEY: &str = "$require";
const REF_KEY: &str = "$ref";

/// Compiler for JSON modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModuleCompiler;

impl Compile for JsonModuleCompiler {
    fn compile(
        &self,
        module: &mut PendingModule,
        source: &str,
        require: &mut RequireContext<'_>,
    ) -> Result<()> {
        let path = module.filename().to_path_buf();
        let value: Value = serde_json::from_str(source)
            .map_err(|e| HotReloadError::compile(&path, e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(HotReloadError::compile(&path, "module must be a JSON object"));
        };

        let mut imports = HashMap::new();
        if let Some(requires) = object.remove(REQUIRE_KEY) {
            let Value::Object(requires) = requires else {
                return Err(HotReloadError::compile(
                    &path,
                    "`$require` must map aliases to module paths",
                ));
            };
            for (alias, specifier) in requires {
                let Value::String(specifier) = specifier else {
                    return Err(HotReloadError::compile(
                        &path,
                        format!("`$require.{alias}` must be a string"),
                    ));
                };
                imports.insert(alias, require.require(&specifier)?);
            }
        }

        let exports = object
            .into_iter()
            .map(|(key, value)| Ok((key, resolve_refs(value, &imports, &path)?)))
            .collect::<Result<Map<String, Value>>>()?;
        module.set_exports(Value::Object(exports));
        Ok(())
    }
}

fn resolve_refs(value: Value, imports: &HashMap<String, Exports>, path: &Path) -> Result<Value> {
    match value {
        Value::Object(object) if object.len() == 1 && object.contains_key(REF_KEY) => {
            let Some(Value::String(reference)) = object.get(REF_KEY) else {
                return Err(HotReloadError::compile(path, "`$ref` must be a string"));
            };
            let (alias, key) = match reference.split_once('.') {
                Some((alias, key)) => (alias, Some(key)),
                None => (reference.as_str(), None),
            };
            let exports = imports.get(alias).ok_or_else(|| {
                HotReloadError::compile(path, format!("unknown import `{alias}`"))
            })?;
            match key {
                Some(key) => Ok(exports.get(key)?.unwrap_or(Value::Null)),
                None => Ok(exports.snapshot()?.as_ref().clone()),
            }
        }
        Value::Object(object) => Ok(Value::Object(
            object
                .into_iter()
                .map(|(key, value)| Ok((key, resolve_refs(value, imports, path)?)))
                .collect::<Result<Map<String, Value>>>()?,
        )),
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(|item| resolve_refs(item, imports, path))
                .collect::<Result<Vec<_>>>()?,
        )),
        other => Ok(other),
    }
}
