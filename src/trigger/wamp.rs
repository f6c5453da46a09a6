//! The slice of the WAMP v2 JSON protocol a subscriber needs.

use super::NotifyError;
use serde_json::{json, Value};

/// WebSocket subprotocol for JSON-serialized WAMP
pub const SUBPROTOCOL: &str = "wamp.2.json";

const HELLO: u64 = 1;
const WELCOME: u64 = 2;
const ABORT: u64 = 3;
const GOODBYE: u64 = 6;
const ERROR: u64 = 8;
const SUBSCRIBE: u64 = 32;
const SUBSCRIBED: u64 = 33;
const EVENT: u64 = 36;

/// Close reason sent when the daemon is shutting down
pub const CLOSE_SYSTEM_SHUTDOWN: &str = "wamp.close.system_shutdown";

/// Close reason sent in reply to a router GOODBYE
pub const CLOSE_GOODBYE_AND_OUT: &str = "wamp.close.goodbye_and_out";

/// A message received from the router
#[derive(Debug, Clone, PartialEq)]
pub enum WampMessage {
    Welcome { session: u64 },
    Abort { reason: String },
    Goodbye { reason: String },
    Error { request_type: u64, request: u64, error: String },
    Subscribed { request: u64, subscription: u64 },
    Event { subscription: u64, publication: u64, args: Vec<Value> },
    Other { code: u64 },
}

impl WampMessage {
    /// Positional string arguments of an event's first argument list.
    ///
    /// Upload notifications carry one argument: the list of map names.
    pub fn event_filenames(&self) -> Vec<String> {
        match self {
            WampMessage::Event { args, .. } => args
                .first()
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

pub fn hello(realm: &str) -> String {
    json!([HELLO, realm, { "roles": { "subscriber": {} } }]).to_string()
}

pub fn subscribe(request: u64, topic: &str) -> String {
    json!([SUBSCRIBE, request, {}, topic]).to_string()
}

pub fn goodbye(reason: &str) -> String {
    json!([GOODBYE, {}, reason]).to_string()
}

fn field<'a>(items: &'a [Value], index: usize) -> Result<&'a Value, NotifyError> {
    items
        .get(index)
        .ok_or_else(|| NotifyError::Protocol(format!("message is missing field {}", index)))
}

fn id_field(items: &[Value], index: usize) -> Result<u64, NotifyError> {
    field(items, index)?
        .as_u64()
        .ok_or_else(|| NotifyError::Protocol(format!("field {} is not an ID", index)))
}

fn str_field(items: &[Value], index: usize) -> Result<String, NotifyError> {
    field(items, index)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| NotifyError::Protocol(format!("field {} is not a string", index)))
}

/// Parse one text frame from the router
pub fn parse(text: &str) -> Result<WampMessage, NotifyError> {
    let value: Value = serde_json::from_str(text)?;
    let items = value
        .as_array()
        .ok_or_else(|| NotifyError::Protocol("message is not a list".to_string()))?;
    let code = id_field(items, 0)?;

    let message = match code {
        WELCOME => WampMessage::Welcome {
            session: id_field(items, 1)?,
        },
        ABORT => WampMessage::Abort {
            reason: str_field(items, 2)?,
        },
        GOODBYE => WampMessage::Goodbye {
            reason: str_field(items, 2)?,
        },
        ERROR => WampMessage::Error {
            request_type: id_field(items, 1)?,
            request: id_field(items, 2)?,
            error: str_field(items, 4)?,
        },
        SUBSCRIBED => WampMessage::Subscribed {
            request: id_field(items, 1)?,
            subscription: id_field(items, 2)?,
        },
        EVENT => WampMessage::Event {
            subscription: id_field(items, 1)?,
            publication: id_field(items, 2)?,
            args: items
                .get(4)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        },
        code => WampMessage::Other { code },
    };

    Ok(message)
}
