//! Reply values and command arguments.

use bytes::Bytes;
use std::fmt;

use crate::error::{Error, Result};

/// A reply returned by the log service.
///
/// This maps to the RESP2 reply types used by the stream commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A bulk string value.
    String(Bytes),

    /// An integer value.
    Integer(i64),

    /// An array of values.
    Array(Vec<Value>),

    /// A null bulk string or null array.
    Nil,

    /// A status reply such as `+OK`.
    Status(String),
}

impl Value {
    /// Returns the value as a string, if it is one.
    ///
    /// # Examples
    /// ```
    /// # use ferrite_pubsub::types::Value;
    /// let val = Value::String(bytes::Bytes::from("1700000000000-0"));
    /// assert_eq!(val.as_str(), Some("1700000000000-0"));
    /// ```
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(b) => std::str::from_utf8(b).ok(),
            Value::Status(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Converts the value into a `String`.
    ///
    /// Returns an error if the value is not a string type.
    pub fn into_string(self) -> Result<String> {
        match self {
            Value::String(b) => String::from_utf8(b.to_vec()).map_err(|e| {
                Error::Protocol(format!("invalid UTF-8 in string value: {}", e))
            }),
            Value::Status(s) => Ok(s),
            other => Err(other.unexpected("string")),
        }
    }

    /// Converts the value into raw bytes.
    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            Value::String(b) => Ok(b),
            Value::Status(s) => Ok(Bytes::from(s)),
            other => Err(other.unexpected("string")),
        }
    }

    /// Converts the value into an `i64`.
    pub fn into_integer(self) -> Result<i64> {
        match self {
            Value::Integer(n) => Ok(n),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Converts the value into a `Vec<Value>`. Nil converts to an empty vector.
    pub fn into_array(self) -> Result<Vec<Value>> {
        match self {
            Value::Array(arr) => Ok(arr),
            Value::Nil => Ok(vec![]),
            other => Err(other.unexpected("array")),
        }
    }

    /// Returns a human-readable type name for this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Array(_) => "array",
            Value::Nil => "nil",
            Value::Status(_) => "status",
        }
    }

    fn unexpected(&self, expected: &'static str) -> Error {
        Error::UnexpectedResponse {
            expected,
            actual: self.type_name().to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "<binary {} bytes>", b.len()),
            },
            Value::Integer(n) => write!(f, "(integer) {}", n),
            Value::Array(arr) => {
                for (i, val) in arr.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, val)?;
                }
                Ok(())
            }
            Value::Nil => write!(f, "(nil)"),
            Value::Status(s) => write!(f, "{}", s),
        }
    }
}

/// Trait for types that can be converted into command arguments.
pub trait ToArg {
    /// Encode this value as a RESP bulk string argument.
    fn to_arg(&self) -> Bytes;
}

impl ToArg for &str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for &String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for &[u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for u64 {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for usize {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}
