//! Typed operations over the store.
//!
//! Every read comes back as the empty value of its shape when there is nothing stored: `""` for
//! strings and hash fields, an empty map for hashes, an empty vector for lists and sets, `0` for
//! lengths and `-2` for the TTL of a missing key. Only transport failures and error replies from
//! the store are errors, except for `exist_hash_key` and `exist_set_member` which report a failed
//! check as "absent".
//!
//! Operations touching several keys or values run one command each with no atomicity across them.
//! Increments use the store's own atomic commands.

use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::cmd::{Cmd, CommandName, ToArg};
use crate::config::Config;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::increment::Increment;
use crate::reply;
use crate::transport::Transport;
use crate::Result;

/// The persistence interface of the application. Cloning is cheap and every clone shares the
/// same connection, so one instance can be handed to every component that needs it.
#[derive(Clone)]
pub struct KeyValueStore {
    transport: Arc<dyn Transport>,
}

impl KeyValueStore {
    pub fn new(transport: impl Transport + 'static) -> KeyValueStore {
        KeyValueStore {
            transport: Arc::new(transport),
        }
    }

    /// Connects to the store described by `config`.
    ///
    /// Doesn't wait for the connection: the handshake happens in the background and is logged
    /// once done. If it fails, the failure shows up as the error of the commands issued on this
    /// store. Must be called from within a Tokio runtime.
    pub fn connect(config: &Config) -> KeyValueStore {
        KeyValueStore::new(Connection::open(config))
    }

    async fn call(&self, cmd: Cmd) -> Result<Frame> {
        self.transport.call(cmd).await
    }

    async fn run(&self, cmd: Cmd) -> Result<()> {
        self.call(cmd).await.map(drop)
    }

    /// Sets or refreshes the expiry of a key. Nothing happens if the key doesn't exist.
    pub async fn set_timeout(&self, key: &str, seconds: u64) -> Result<()> {
        self.run(Cmd::new(CommandName::Expire).arg(key).arg(seconds))
            .await
    }

    /// Deletes keys, one command per key. Missing keys are ignored. Every deletion is attempted
    /// even if some fail, the first failure is returned.
    pub async fn delete_key<K: ToArg>(&self, keys: impl IntoIterator<Item = K>) -> Result<()> {
        let deletions = keys
            .into_iter()
            .map(|key| self.run(Cmd::new(CommandName::Del).arg(key)));

        join_all(deletions).await.into_iter().collect()
    }

    /// All keys starting with `prefix`.
    ///
    /// This scans the whole keyspace, fine for the small store the application uses.
    pub async fn get_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let reply = self.call(Cmd::new(CommandName::Keys).arg(pattern)).await?;
        reply::strings(reply)
    }

    /// Writes every field of `fields` into the hash at `key`, keeping other fields.
    pub async fn set_hash<F, V>(
        &self,
        key: &str,
        fields: impl IntoIterator<Item = (F, V)>,
    ) -> Result<()>
    where
        F: ToArg,
        V: ToArg,
    {
        let pairs: Vec<Bytes> = fields
            .into_iter()
            .flat_map(|(field, value)| [field.to_arg(), value.to_arg()])
            .collect();

        // The store rejects a field-less write, there's nothing to do anyway.
        if pairs.is_empty() {
            return Ok(());
        }

        self.run(Cmd::new(CommandName::Hset).arg(key).args(pairs))
            .await
    }

    pub async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>> {
        let reply = self.call(Cmd::new(CommandName::Hgetall).arg(key)).await?;
        reply::map(reply)
    }

    pub async fn set_hash_field(&self, key: &str, field: &str, value: impl ToArg) -> Result<()> {
        self.run(Cmd::new(CommandName::Hset).arg(key).arg(field).arg(value))
            .await
    }

    pub async fn get_hash_field(&self, key: &str, field: &str) -> Result<String> {
        let reply = self
            .call(Cmd::new(CommandName::Hget).arg(key).arg(field))
            .await?;
        reply::string(reply)
    }

    pub async fn del_hash<F: ToArg>(
        &self,
        key: &str,
        fields: impl IntoIterator<Item = F>,
    ) -> Result<()> {
        let fields = to_args(fields);
        if fields.is_empty() {
            return Ok(());
        }

        self.run(Cmd::new(CommandName::Hdel).arg(key).args(fields))
            .await
    }

    /// Atomically adds `amount` to a hash field, integer or float increment depending on the
    /// amount (see `Increment`).
    pub async fn inc_hash(
        &self,
        key: &str,
        field: &str,
        amount: impl Into<Increment>,
    ) -> Result<()> {
        let cmd = match amount.into() {
            Increment::Integer(amount) => {
                Cmd::new(CommandName::Hincrby).arg(key).arg(field).arg(amount)
            }
            Increment::Float(amount) => Cmd::new(CommandName::Hincrbyfloat)
                .arg(key)
                .arg(field)
                .arg(amount),
        };

        self.run(cmd).await
    }

    /// Atomically adds `amount` to a string key, integer or float increment depending on the
    /// amount (see `Increment`).
    pub async fn inc_key(&self, key: &str, amount: impl Into<Increment>) -> Result<()> {
        let cmd = match amount.into() {
            Increment::Integer(amount) => Cmd::new(CommandName::Incrby).arg(key).arg(amount),
            Increment::Float(amount) => Cmd::new(CommandName::Incrbyfloat).arg(key).arg(amount),
        };

        self.run(cmd).await
    }

    /// Whether the hash at `key` has `field`. A failed check reads as `false`.
    pub async fn exist_hash_key(&self, key: &str, field: &str) -> bool {
        let cmd = Cmd::new(CommandName::Hexists).arg(key).arg(field);

        match self.call(cmd).await.and_then(reply::flag) {
            Ok(exists) => exists,
            Err(err) => {
                warn!(key, field, "hash field check failed, reporting it absent: {}", err);
                false
            }
        }
    }

    /// Writes a string value. With a timeout the value and its expiry are set by a single
    /// command, so the key is never visible without its TTL.
    pub async fn set_string(
        &self,
        key: &str,
        value: impl ToArg,
        timeout: Option<u64>,
    ) -> Result<()> {
        let cmd = match timeout {
            Some(seconds) => Cmd::new(CommandName::Setex).arg(key).arg(seconds).arg(value),
            None => Cmd::new(CommandName::Set).arg(key).arg(value),
        };

        self.run(cmd).await
    }

    pub async fn get_string(&self, key: &str) -> Result<String> {
        let reply = self.call(Cmd::new(CommandName::Get).arg(key)).await?;
        reply::string(reply)
    }

    /// Remaining time to live in seconds. The store answers `-1` for a key without expiry and
    /// `-2` for a missing key; a null reply is read as `-2` as well.
    pub async fn get_timeout(&self, key: &str) -> Result<i64> {
        match self.call(Cmd::new(CommandName::Ttl).arg(key)).await? {
            Frame::Null => Ok(-2),
            reply => reply::integer(reply),
        }
    }

    pub async fn get_list(&self, key: &str) -> Result<Vec<String>> {
        let reply = self
            .call(Cmd::new(CommandName::Lrange).arg(key).arg(0).arg(-1))
            .await?;
        reply::strings(reply)
    }

    pub async fn get_list_length(&self, key: &str) -> Result<usize> {
        let reply = self.call(Cmd::new(CommandName::Llen).arg(key)).await?;
        reply::count(reply)
    }

    /// Element at `index`, negative indexes count from the tail. `""` when out of range.
    pub async fn get_list_by_index(&self, key: &str, index: i64) -> Result<String> {
        let reply = self
            .call(Cmd::new(CommandName::Lindex).arg(key).arg(index))
            .await?;
        reply::string(reply)
    }

    /// Appends `values` to the list in the given order.
    pub async fn add_list_element<V: ToArg>(
        &self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        let values = to_args(values);
        if values.is_empty() {
            return Ok(());
        }

        self.run(Cmd::new(CommandName::Rpush).arg(key).args(values))
            .await
    }

    /// Removes every occurrence of each of `values`, one command per value.
    pub async fn del_list_element<V: ToArg>(
        &self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        for value in to_args(values) {
            self.run(Cmd::new(CommandName::Lrem).arg(key).arg(0).arg(value))
                .await?;
        }

        Ok(())
    }

    /// Reads the whole list and looks for the string form of `value`. Linear in the list length.
    pub async fn exist_list_element(&self, key: &str, value: impl ToArg) -> Result<bool> {
        let needle = String::from_utf8_lossy(&value.to_arg()).into_owned();
        let list = self.get_list(key).await?;
        Ok(list.contains(&needle))
    }

    pub async fn get_set(&self, key: &str) -> Result<Vec<String>> {
        let reply = self.call(Cmd::new(CommandName::Smembers).arg(key)).await?;
        reply::strings(reply)
    }

    pub async fn get_set_member_num(&self, key: &str) -> Result<usize> {
        let reply = self.call(Cmd::new(CommandName::Scard).arg(key)).await?;
        reply::count(reply)
    }

    pub async fn add_set_member<V: ToArg>(
        &self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        let values = to_args(values);
        if values.is_empty() {
            return Ok(());
        }

        self.run(Cmd::new(CommandName::Sadd).arg(key).args(values))
            .await
    }

    pub async fn del_set_member<V: ToArg>(
        &self,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        let values = to_args(values);
        if values.is_empty() {
            return Ok(());
        }

        self.run(Cmd::new(CommandName::Srem).arg(key).args(values))
            .await
    }

    /// Whether `value` is in the set at `key`. A failed check reads as `false`.
    pub async fn exist_set_member(&self, key: &str, value: impl ToArg) -> bool {
        let cmd = Cmd::new(CommandName::Sismember).arg(key).arg(value);

        match self.call(cmd).await.and_then(reply::flag) {
            Ok(exists) => exists,
            Err(err) => {
                warn!(key, "set member check failed, reporting it absent: {}", err);
                false
            }
        }
    }
}

fn to_args<V: ToArg>(values: impl IntoIterator<Item = V>) -> Vec<Bytes> {
    values.into_iter().map(|value| value.to_arg()).collect()
}

// Prefixes are literal, only the trailing `*` of the pattern is a wildcard.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
