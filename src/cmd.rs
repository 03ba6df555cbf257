use bytes::Bytes;
use std::str::{self, FromStr};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};

use crate::frame::Frame;
use crate::Error;

/// Commands issued by the data layer.
///
/// Ref: <https://redis.io/docs/latest/commands/>
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum CommandName {
    Auth,
    Ping,

    // Keys
    Del,
    Expire,
    Keys,
    Ttl,

    // Strings
    Get,
    Incrby,
    Incrbyfloat,
    Set,
    Setex,

    // Hashes
    Hdel,
    Hexists,
    Hget,
    Hgetall,
    Hincrby,
    Hincrbyfloat,
    Hset,

    // Lists
    Lindex,
    Llen,
    Lrange,
    Lrem,
    Rpush,

    // Sets
    Sadd,
    Scard,
    Sismember,
    Smembers,
    Srem,
}

/// Conversion of caller values into command arguments. Every value ends up as its string form on
/// the wire, the store has no other scalar type.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

macro_rules! display_arg {
    ($($ty:ty),*) => {
        $(
            impl ToArg for $ty {
                fn to_arg(&self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

display_arg!(i32, i64, isize, u32, u64, usize, f32, f64, bool);

/// A single command ready to be sent: the name plus binary safe arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    name: CommandName,
    args: Vec<Bytes>,
}

impl Cmd {
    pub fn new(name: CommandName) -> Cmd {
        Cmd { name, args: vec![] }
    }

    pub fn arg(mut self, arg: impl ToArg) -> Cmd {
        self.args.push(arg.to_arg());
        self
    }

    pub fn args<I>(mut self, args: I) -> Cmd
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.args.extend(args.into_iter().map(|arg| arg.to_arg()));
        self
    }

    pub fn name(&self) -> CommandName {
        self.name
    }

    pub fn arguments(&self) -> &[Bytes] {
        &self.args
    }

    pub fn into_parts(self) -> (CommandName, Vec<Bytes>) {
        (self.name, self.args)
    }
}

impl From<Cmd> for Frame {
    fn from(cmd: Cmd) -> Frame {
        // Clients send commands to the Redis server as RESP arrays of bulk strings.
        let mut frames = Vec::with_capacity(cmd.args.len() + 1);
        let name: &'static str = cmd.name.into();
        frames.push(Frame::Bulk(Bytes::from_static(name.as_bytes())));
        frames.extend(cmd.args.into_iter().map(Frame::Bulk));
        Frame::Array(frames)
    }
}

impl TryFrom<Frame> for Cmd {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(Error::UnexpectedReply {
                    expected: "array",
                    actual: frame,
                })
            }
        };

        let mut parts = frames.into_iter().map(|frame| match frame {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(Error::UnexpectedReply {
                expected: "simple or bulk string",
                actual: frame,
            }),
        });

        let name = parts.next().ok_or(Error::UnexpectedReply {
            expected: "command name",
            actual: Frame::Array(vec![]),
        })??;
        let name = str::from_utf8(&name)
            .ok()
            .and_then(|name| CommandName::from_str(name).ok())
            .ok_or_else(|| {
                Error::Server(format!(
                    "ERR unknown command '{}'",
                    String::from_utf8_lossy(&name)
                ))
            })?;

        let args = parts.collect::<Result<Vec<_>, _>>()?;

        Ok(Cmd { name, args })
    }
}
