//! Server-wide string variables such as the cookie signing key.

use std::collections::BTreeMap;

use crate::app::{NanorssError, Result};
use crate::store::keys;
use crate::store::Database;

impl Database {
    pub fn get_config_variable(&self, name: &str) -> Result<Option<String>> {
        self.kv
            .get(&keys::config_key(name))?
            .map(decode_value)
            .transpose()
    }

    /// Returns the stored value of `name`, creating it with `generate` if it
    /// does not exist yet.
    ///
    /// Concurrent callers all observe the first value that was stored; an
    /// existing value is never overwritten.
    pub fn get_or_create_config_variable<F>(&self, name: &str, generate: F) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        if let Some(value) = self.get_config_variable(name)? {
            return Ok(value);
        }

        let value = generate()?;
        if self.kv.put_if_absent(&keys::config_key(name), value.as_bytes())? {
            tracing::info!("Created server config variable {}", name);
            return Ok(value);
        }

        self.get_config_variable(name)?.ok_or_else(|| {
            NanorssError::Store(format!("config variable {} vanished after insert", name))
        })
    }

    pub fn set_config_variable(&self, name: &str, value: &str) -> Result<()> {
        let key = keys::config_key(name);
        self.in_transaction(&[key.clone()], |tx| {
            tx.put(key.clone(), value.as_bytes().to_vec());
            Ok(())
        })
    }

    pub fn get_all_config_variables(&self) -> Result<BTreeMap<String, String>> {
        let mut variables = BTreeMap::new();
        for (key, value) in self
            .kv
            .scan_prefix(&keys::namespace(keys::SERVER_CONFIG))?
        {
            variables.insert(keys::decode_config_key(&key)?, decode_value(value)?);
        }
        Ok(variables)
    }
}

fn decode_value(raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw).map_err(|e| NanorssError::Invalid(e.to_string()))
}
