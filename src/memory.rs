use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::str::{self, FromStr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::vec;
use tokio::time::{Duration, Instant};

use crate::cmd::{Cmd, CommandName};
use crate::frame::Frame;
use crate::transport::Transport;
use crate::{Error, Result};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";
const NOT_A_FLOAT: &str = "ERR value is not a valid float";

/// In-process stand-in for the store, implementing the commands the data layer issues with the
/// same replies a Redis server gives.
///
/// Meant for tests and for running components without a store: keys expire lazily, every command
/// runs under a single lock, and `set_unavailable` turns every call into a transport failure.
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    journal: Mutex<Vec<Cmd>>,
    unavailable: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> MemoryTransport {
        MemoryTransport::default()
    }

    /// While set, every call fails as if the connection had dropped.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every command received so far, in arrival order, failed ones included.
    pub fn commands(&self) -> Vec<Cmd> {
        lock(&self.inner.journal).clone()
    }

    pub fn clear_commands(&self) {
        lock(&self.inner.journal).clear();
    }

    /// Runs a command right away.
    pub fn exec(&self, cmd: Cmd) -> Result<Frame> {
        lock(&self.inner.journal).push(cmd.clone());

        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Connection("store unavailable".to_string()));
        }

        let mut state = lock(&self.inner.state);
        state.remove_expired_keys(Instant::now());
        state.exec(cmd).map_err(Error::Server)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(&self, cmd: Cmd) -> Result<Frame> {
        self.exec(cmd)
    }
}

// A panic while holding the lock can't leave the maps half updated in a way that matters here.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Key = String;

enum Value {
    String(Bytes),
    Hash(HashMap<Bytes, Bytes>),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::Hash(hash) => hash.is_empty(),
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
        }
    }

    fn string(&self) -> Option<&Bytes> {
        match self {
            Value::String(data) => Some(data),
            _ => None,
        }
    }

    fn hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    fn hash_mut(&mut self) -> Option<&mut HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    fn list(&self) -> Option<&VecDeque<Bytes>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    fn list_mut(&mut self) -> Option<&mut VecDeque<Bytes>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    fn set(&self) -> Option<&HashSet<Bytes>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    fn set_mut(&mut self) -> Option<&mut HashSet<Bytes>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    entries: HashMap<Key, Entry>,
    // Sorted by deadline so expired keys are found without a full scan. Tuples whose deadline no
    // longer matches the entry (overwritten or re-expired keys) are skipped.
    ttls: BTreeSet<(Instant, Key)>,
}

type Reply = std::result::Result<Frame, String>;

impl State {
    fn exec(&mut self, cmd: Cmd) -> Reply {
        let (name, args) = cmd.into_parts();
        let mut args = ArgParser {
            command: name,
            parts: args.into_iter(),
        };

        let reply = match name {
            CommandName::Auth => {
                args.next_bytes()?;
                Frame::Simple("OK".to_string())
            }
            CommandName::Ping => Frame::Simple("PONG".to_string()),

            CommandName::Del => {
                let keys = args.rest(1)?;
                let removed = keys
                    .iter()
                    .filter(|key| self.entries.remove(&key_string(key)).is_some())
                    .count();
                integer(removed)
            }
            CommandName::Expire => {
                let key = args.next_string()?;
                let seconds = args.next_integer()?;
                args.finish()?;
                // Checked before the key lookup, like the server.
                let expires_at = deadline(seconds, "expire")?;
                if !self.entries.contains_key(&key) {
                    Frame::Integer(0)
                } else if seconds <= 0 {
                    self.entries.remove(&key);
                    Frame::Integer(1)
                } else {
                    self.expire(&key, expires_at);
                    Frame::Integer(1)
                }
            }
            CommandName::Keys => {
                let pattern = args.next_string()?;
                args.finish()?;
                // A pattern the matcher can't express matches nothing.
                let matcher = pattern_regex(&pattern).ok();
                let keys = self
                    .entries
                    .keys()
                    .filter(|key| matcher.as_ref().is_some_and(|re| re.is_match(key)))
                    .map(|key| Frame::Bulk(Bytes::from(key.clone())))
                    .collect();
                Frame::Array(keys)
            }
            CommandName::Ttl => {
                let key = args.next_string()?;
                args.finish()?;
                match self.entries.get(&key) {
                    None => Frame::Integer(-2),
                    Some(Entry {
                        expires_at: None, ..
                    }) => Frame::Integer(-1),
                    Some(Entry {
                        expires_at: Some(expires_at),
                        ..
                    }) => {
                        let remaining = expires_at.saturating_duration_since(Instant::now());
                        // Rounded like the server does.
                        Frame::Integer(((remaining.as_millis() + 500) / 1000) as i64)
                    }
                }
            }

            CommandName::Get => {
                let key = args.next_string()?;
                args.finish()?;
                match self.read(&key, Value::string)? {
                    Some(data) => Frame::Bulk(data.clone()),
                    None => Frame::Null,
                }
            }
            CommandName::Set => {
                let key = args.next_string()?;
                let data = args.next_bytes()?;
                args.finish()?;
                self.set(key, data, None);
                Frame::Simple("OK".to_string())
            }
            CommandName::Setex => {
                let key = args.next_string()?;
                let seconds = args.next_integer()?;
                let data = args.next_bytes()?;
                args.finish()?;
                if seconds <= 0 {
                    return Err("ERR invalid expire time in 'setex' command".to_string());
                }
                let expires_at = deadline(seconds, "setex")?;
                self.set(key, data, Some(expires_at));
                Frame::Simple("OK".to_string())
            }
            CommandName::Incrby => {
                let key = args.next_string()?;
                let increment = args.next_integer()?;
                args.finish()?;
                let current = self.read(&key, Value::string)?;
                let value = incr_by(current, increment, NOT_AN_INTEGER)?;
                self.replace_string(key, Bytes::from(value.to_string()));
                Frame::Integer(value)
            }
            CommandName::Incrbyfloat => {
                let key = args.next_string()?;
                let increment = args.next_float()?;
                args.finish()?;
                let current = self.read(&key, Value::string)?;
                let value = incr_by(current, increment, NOT_A_FLOAT)?;
                let value = Bytes::from(format_float(value));
                self.replace_string(key, value.clone());
                Frame::Bulk(value)
            }

            CommandName::Hset => {
                let key = args.next_string()?;
                let pairs = args.rest(2)?;
                if pairs.len() % 2 != 0 {
                    return Err(args.arity_error());
                }
                let hash = self.write(&key, Value::hash_mut, || Value::Hash(HashMap::new()))?;
                let added = pairs
                    .chunks(2)
                    .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                    .count();
                integer(added)
            }
            CommandName::Hget => {
                let key = args.next_string()?;
                let field = args.next_bytes()?;
                args.finish()?;
                match self.read(&key, Value::hash)?.and_then(|hash| hash.get(&field)) {
                    Some(data) => Frame::Bulk(data.clone()),
                    None => Frame::Null,
                }
            }
            CommandName::Hgetall => {
                let key = args.next_string()?;
                args.finish()?;
                let pairs = self
                    .read(&key, Value::hash)?
                    .into_iter()
                    .flatten()
                    .flat_map(|(field, value)| {
                        [Frame::Bulk(field.clone()), Frame::Bulk(value.clone())]
                    })
                    .collect();
                Frame::Array(pairs)
            }
            CommandName::Hdel => {
                let key = args.next_string()?;
                let fields = args.rest(1)?;
                let removed = match self.modify(&key, Value::hash_mut)? {
                    Some(hash) => fields
                        .iter()
                        .filter(|field| hash.remove(*field).is_some())
                        .count(),
                    None => 0,
                };
                self.remove_if_empty(&key);
                integer(removed)
            }
            CommandName::Hexists => {
                let key = args.next_string()?;
                let field = args.next_bytes()?;
                args.finish()?;
                let exists = self
                    .read(&key, Value::hash)?
                    .is_some_and(|hash| hash.contains_key(&field));
                Frame::Integer(exists.into())
            }
            CommandName::Hincrby => {
                let key = args.next_string()?;
                let field = args.next_bytes()?;
                let increment = args.next_integer()?;
                args.finish()?;
                let hash = self.write(&key, Value::hash_mut, || Value::Hash(HashMap::new()))?;
                let current = hash.get(&field);
                let value = incr_by(current, increment, "ERR hash value is not an integer")?;
                hash.insert(field, Bytes::from(value.to_string()));
                Frame::Integer(value)
            }
            CommandName::Hincrbyfloat => {
                let key = args.next_string()?;
                let field = args.next_bytes()?;
                let increment = args.next_float()?;
                args.finish()?;
                let hash = self.write(&key, Value::hash_mut, || Value::Hash(HashMap::new()))?;
                let value = incr_by(hash.get(&field), increment, "ERR hash value is not a float")?;
                let value = Bytes::from(format_float(value));
                hash.insert(field, value.clone());
                Frame::Bulk(value)
            }

            CommandName::Lrange => {
                let key = args.next_string()?;
                let start = args.next_integer()?;
                let stop = args.next_integer()?;
                args.finish()?;
                let list = self.read(&key, Value::list)?;
                let items = match list.and_then(|list| range(list.len(), start, stop)) {
                    Some((start, stop)) => list
                        .into_iter()
                        .flatten()
                        .skip(start)
                        .take(stop - start + 1)
                        .map(|item| Frame::Bulk(item.clone()))
                        .collect(),
                    None => vec![],
                };
                Frame::Array(items)
            }
            CommandName::Llen => {
                let key = args.next_string()?;
                args.finish()?;
                integer(self.read(&key, Value::list)?.map_or(0, |list| list.len()))
            }
            CommandName::Lindex => {
                let key = args.next_string()?;
                let index = args.next_integer()?;
                args.finish()?;
                let item = self.read(&key, Value::list)?.and_then(|list| {
                    let index = if index < 0 {
                        list.len() as i64 + index
                    } else {
                        index
                    };
                    usize::try_from(index).ok().and_then(|index| list.get(index))
                });
                match item {
                    Some(item) => Frame::Bulk(item.clone()),
                    None => Frame::Null,
                }
            }
            CommandName::Rpush => {
                let key = args.next_string()?;
                let items = args.rest(1)?;
                let list = self.write(&key, Value::list_mut, || Value::List(VecDeque::new()))?;
                list.extend(items);
                integer(list.len())
            }
            CommandName::Lrem => {
                let key = args.next_string()?;
                let count = args.next_integer()?;
                let item = args.next_bytes()?;
                args.finish()?;
                let removed = match self.modify(&key, Value::list_mut)? {
                    Some(list) => remove_occurrences(list, &item, count),
                    None => 0,
                };
                self.remove_if_empty(&key);
                integer(removed)
            }

            CommandName::Smembers => {
                let key = args.next_string()?;
                args.finish()?;
                let members = self
                    .read(&key, Value::set)?
                    .into_iter()
                    .flatten()
                    .map(|member| Frame::Bulk(member.clone()))
                    .collect();
                Frame::Array(members)
            }
            CommandName::Scard => {
                let key = args.next_string()?;
                args.finish()?;
                integer(self.read(&key, Value::set)?.map_or(0, |set| set.len()))
            }
            CommandName::Sadd => {
                let key = args.next_string()?;
                let members = args.rest(1)?;
                let set = self.write(&key, Value::set_mut, || Value::Set(HashSet::new()))?;
                integer(members.into_iter().filter(|member| set.insert(member.clone())).count())
            }
            CommandName::Srem => {
                let key = args.next_string()?;
                let members = args.rest(1)?;
                let removed = match self.modify(&key, Value::set_mut)? {
                    Some(set) => members.iter().filter(|member| set.remove(*member)).count(),
                    None => 0,
                };
                self.remove_if_empty(&key);
                integer(removed)
            }
            CommandName::Sismember => {
                let key = args.next_string()?;
                let member = args.next_bytes()?;
                args.finish()?;
                let exists = self
                    .read(&key, Value::set)?
                    .is_some_and(|set| set.contains(&member));
                Frame::Integer(exists.into())
            }
        };

        Ok(reply)
    }

    /// Looks a key up, `None` if absent and an error if it holds another shape.
    fn read<T>(
        &self,
        key: &str,
        shape: fn(&Value) -> Option<&T>,
    ) -> std::result::Result<Option<&T>, String> {
        match self.entries.get(key) {
            Some(entry) => shape(&entry.value)
                .map(Some)
                .ok_or_else(|| WRONG_TYPE.to_string()),
            None => Ok(None),
        }
    }

    /// Mutable lookup that leaves absent keys absent.
    fn modify<T>(
        &mut self,
        key: &str,
        shape: fn(&mut Value) -> Option<&mut T>,
    ) -> std::result::Result<Option<&mut T>, String> {
        match self.entries.get_mut(key) {
            Some(entry) => shape(&mut entry.value)
                .map(Some)
                .ok_or_else(|| WRONG_TYPE.to_string()),
            None => Ok(None),
        }
    }

    /// Mutable lookup creating an empty value of the shape when the key is absent.
    fn write<T>(
        &mut self,
        key: &str,
        shape: fn(&mut Value) -> Option<&mut T>,
        empty: fn() -> Value,
    ) -> std::result::Result<&mut T, String> {
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: empty(),
            expires_at: None,
        });
        shape(&mut entry.value).ok_or_else(|| WRONG_TYPE.to_string())
    }

    // Containers never stay around empty, an empty hash/list/set is an absent key.
    fn remove_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|entry| entry.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    fn set(&mut self, key: Key, data: Bytes, expires_at: Option<Instant>) {
        if let Some(expires_at) = expires_at {
            self.ttls.insert((expires_at, key.clone()));
        }

        let value = Value::String(data);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Replaces a string value keeping its expiry, like the increment commands do.
    fn replace_string(&mut self, key: Key, data: Bytes) {
        match self.entries.get_mut(&key) {
            Some(entry) => entry.value = Value::String(data),
            None => self.set(key, data, None),
        }
    }

    fn expire(&mut self, key: &str, expires_at: Instant) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(expires_at);
            self.ttls.insert((expires_at, key.to_string()));
        }
    }

    fn remove_expired_keys(&mut self, now: Instant) {
        let expired: Vec<(Instant, Key)> = self
            .ttls
            .iter()
            .take_while(|(expires_at, _)| expires_at <= &now)
            .cloned()
            .collect();

        for (when, key) in expired {
            self.ttls.remove(&(when, key.clone()));
            let still_due = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.expires_at == Some(when));
            if still_due {
                self.entries.remove(&key);
            }
        }
    }
}

/// Deadline `seconds` from now. The server keeps deadlines as milliseconds in an `i64` and
/// refuses the ones that don't fit.
fn deadline(seconds: i64, command: &str) -> std::result::Result<Instant, String> {
    let invalid = || format!("ERR invalid expire time in '{}' command", command);
    if seconds > i64::MAX / 1000 {
        return Err(invalid());
    }

    Instant::now()
        .checked_add(Duration::from_secs(seconds.max(0) as u64))
        .ok_or_else(invalid)
}

/// Translates a KEYS pattern into an anchored regex. Unlike file globs, `*` and `?` match any
/// character, `/` included.
fn pattern_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let mut regex = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    push_literal(&mut regex, escaped);
                }
            }
            '[' => {
                regex.push('[');
                if chars.next_if_eq(&'^').is_some() {
                    regex.push('^');
                }
                // An unterminated class runs to the end of the pattern.
                while let Some(c) = chars.next() {
                    match c {
                        ']' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                push_literal(&mut regex, escaped);
                            }
                        }
                        start if chars.peek() == Some(&'-') => {
                            chars.next();
                            match chars.next_if(|end| *end != ']') {
                                Some(end) => {
                                    let (low, high) = if start <= end {
                                        (start, end)
                                    } else {
                                        (end, start)
                                    };
                                    push_literal(&mut regex, low);
                                    regex.push('-');
                                    push_literal(&mut regex, high);
                                }
                                None => {
                                    push_literal(&mut regex, start);
                                    push_literal(&mut regex, '-');
                                }
                            }
                        }
                        c => push_literal(&mut regex, c),
                    }
                }
                regex.push(']');
            }
            c => push_literal(&mut regex, c),
        }
    }

    regex.push('$');
    Regex::new(&regex)
}

fn push_literal(regex: &mut String, c: char) {
    regex.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
}

/// Text form of an INCRBYFLOAT result. The server computes with long doubles and prints them
/// with trailing zeros trimmed, so the noise of binary fractions never shows (`0.1 + 0.2` reads
/// `0.3`). Rounding to 15 significant digits hides the same noise for an `f64`.
fn format_float(value: f64) -> String {
    let rounded: f64 = format!("{:.14e}", value).parse().unwrap_or(value);
    rounded.to_string()
}

fn integer(n: usize) -> Frame {
    Frame::Integer(n as i64)
}

fn key_string(key: &Bytes) -> String {
    String::from_utf8_lossy(key).into_owned()
}

fn incr_by<T>(current: Option<&Bytes>, increment: T, err: &str) -> std::result::Result<T, String>
where
    T: FromStr + Default + Checked,
{
    let value = match current {
        Some(data) => str::from_utf8(data)
            .ok()
            .and_then(|s| s.parse::<T>().ok())
            .ok_or_else(|| err.to_string())?,
        None => T::default(),
    };

    value.checked_add(increment)
}

/// Addition with the overflow rules of the matching increment command.
trait Checked: Sized {
    fn checked_add(self, increment: Self) -> std::result::Result<Self, String>;
}

impl Checked for i64 {
    fn checked_add(self, increment: Self) -> std::result::Result<Self, String> {
        i64::checked_add(self, increment)
            .ok_or_else(|| "ERR increment or decrement would overflow".to_string())
    }
}

impl Checked for f64 {
    fn checked_add(mut self, increment: Self) -> std::result::Result<Self, String> {
        self += increment;
        if self.is_finite() {
            Ok(self)
        } else {
            Err("ERR increment would produce NaN or Infinity".to_string())
        }
    }
}

/// Resolves an inclusive LRANGE window against a list length, `None` when it's empty.
fn range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return None;
    }

    Some((start as usize, stop as usize))
}

/// LREM semantics: `count > 0` removes from the head, `count < 0` from the tail, `0` removes all.
fn remove_occurrences(list: &mut VecDeque<Bytes>, item: &Bytes, count: i64) -> usize {
    let limit = if count == 0 {
        usize::MAX
    } else {
        count.unsigned_abs() as usize
    };

    let mut removed = 0;
    if count >= 0 {
        list.retain(|entry| {
            if removed < limit && entry == item {
                removed += 1;
                false
            } else {
                true
            }
        });
    } else {
        let mut kept: VecDeque<Bytes> = VecDeque::with_capacity(list.len());
        while let Some(entry) = list.pop_back() {
            if removed < limit && &entry == item {
                removed += 1;
            } else {
                kept.push_front(entry);
            }
        }
        *list = kept;
    }

    removed
}

struct ArgParser {
    command: CommandName,
    parts: vec::IntoIter<Bytes>,
}

impl ArgParser {
    fn arity_error(&self) -> String {
        format!(
            "ERR wrong number of arguments for '{}' command",
            self.command.to_string().to_lowercase()
        )
    }

    fn next_bytes(&mut self) -> std::result::Result<Bytes, String> {
        match self.parts.next() {
            Some(bytes) => Ok(bytes),
            None => Err(self.arity_error()),
        }
    }

    fn next_string(&mut self) -> std::result::Result<String, String> {
        self.next_bytes().map(|bytes| key_string(&bytes))
    }

    fn next_integer(&mut self) -> std::result::Result<i64, String> {
        let bytes = self.next_bytes()?;
        str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| NOT_AN_INTEGER.to_string())
    }

    fn next_float(&mut self) -> std::result::Result<f64, String> {
        let bytes = self.next_bytes()?;
        str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|f| f.is_finite())
            .ok_or_else(|| NOT_A_FLOAT.to_string())
    }

    /// Remaining arguments, at least `min` of them.
    fn rest(&mut self, min: usize) -> std::result::Result<Vec<Bytes>, String> {
        let rest: Vec<Bytes> = self.parts.by_ref().collect();
        if rest.len() < min {
            return Err(self.arity_error());
        }
        Ok(rest)
    }

    fn finish(&mut self) -> std::result::Result<(), String> {
        match self.parts.next() {
            Some(_) => Err("ERR syntax error".to_string()),
            None => Ok(()),
        }
    }
}
