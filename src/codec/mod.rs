//! CBOR wire codec for handshake messages.
//!
//! # Wire Format
//!
//! Every message is a CBOR array whose first element is the
//! [`MessageTag`]:
//!
//! | Message | Encoding                          |
//! |---------|-----------------------------------|
//! | PROPOSE | `[0, { * version => params }]`    |
//! | ACCEPT  | `[1, version, params]`            |
//! | REFUSE  | `[2, reason]`                     |
//!
//! A REFUSE reason is itself tagged with a [`RejectionTag`]:
//!
//! | Reason          | Encoding                  |
//! |-----------------|---------------------------|
//! | VersionMismatch | `[0, [ * version ]]`      |
//! | DecodeError     | `[1, version, text]`      |
//! | Refused         | `[2, version, text]`      |
//!
//! Parameters are a bare integer (scalar) or `[int, bool]` (pair). The
//! expected shape comes from the version number; for versions outside the
//! local catalog it is read off the encoding.
//!
//! Map keys are written in ascending order with shortest-form integers, so
//! encoding is deterministic: encode, decode and encode again gives the
//! same bytes. Non-canonical input is accepted and comes back canonical.
//!
//! # Decode errors
//!
//! Once a version number has been read, any failure in the data that
//! follows it (wrong shape, truncation, invalid CBOR) is a
//! [`Rejection::DecodeError`] naming that version. Failures before a
//! version is known are [`HandshakeError::Codec`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_cbor::Value;

use crate::error::{HandshakeError, Result};
use crate::protocol::{
    Message, MessageTag, ParamShape, ParamValue, Rejection, RejectionTag, VersionNumber,
    VersionTable,
};

/// Encode a message to CBOR bytes.
///
/// Fails with [`HandshakeError::Codec`] if a catalog version carries
/// parameters of the wrong shape, since no peer could decode them.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    serde_cbor::to_vec(&message_to_value(message)?)
        .map_err(|e| HandshakeError::Codec(format!("CBOR encode error: {e}")))
}

/// Decode a message from CBOR bytes.
///
/// Structural problems (invalid CBOR, unknown tag, wrong arity) are
/// reported as [`HandshakeError::Codec`]. Bad data for a version,
/// including a repeated version key, is reported as
/// [`HandshakeError::Rejected`] carrying [`Rejection::DecodeError`] for that
/// version.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let state = DecodeState::default();
    let mut de = serde_cbor::Deserializer::from_slice(bytes);

    let result = MessageSeed(&state)
        .deserialize(&mut de)
        .and_then(|message| de.end().map(|()| message));

    result.map_err(|e| state.into_error(e))
}

fn int(n: impl Into<i128>) -> Value {
    Value::Integer(n.into())
}

fn message_to_value(message: &Message) -> Result<Value> {
    let tag = int(message.tag().as_u8());
    let value = match message {
        Message::Propose(versions) => {
            let table = versions
                .iter()
                .map(|(version, params)| Ok((int(*version), params_to_value(*version, params)?)))
                .collect::<Result<BTreeMap<Value, Value>>>()?;
            Value::Array(vec![tag, Value::Map(table)])
        },
        Message::Accept { version, params } => {
            Value::Array(vec![tag, int(*version), params_to_value(*version, params)?])
        },
        Message::Refuse(rejection) => Value::Array(vec![tag, rejection_to_value(rejection)]),
    };
    Ok(value)
}

fn params_to_value(version: VersionNumber, params: &ParamValue) -> Result<Value> {
    match ParamShape::for_version(version) {
        Some(shape) if shape != params.shape() => Err(HandshakeError::Codec(format!(
            "version {version} takes {shape} parameters, got {}",
            params.shape()
        ))),
        _ => Ok(params.to_cbor()),
    }
}

fn rejection_to_value(rejection: &Rejection) -> Value {
    let tag = int(rejection.tag().as_u8());
    match rejection {
        Rejection::VersionMismatch { valid_versions } => Value::Array(vec![
            tag,
            Value::Array(valid_versions.iter().map(|v| int(*v)).collect()),
        ]),
        Rejection::DecodeError { version, reason } | Rejection::Refused { version, reason } => {
            Value::Array(vec![tag, int(*version), Value::Text(reason.clone())])
        },
    }
}

/// What the decoder knew when it stopped
#[derive(Default)]
struct DecodeState {
    /// Version whose data is being read
    version: Cell<Option<VersionNumber>>,
    /// Typed failure raised by a visitor
    failure: RefCell<Option<HandshakeError>>,
}

impl DecodeState {
    /// Record a typed failure and hand serde an error to unwind with
    fn fail<E: de::Error>(&self, err: HandshakeError) -> E {
        let unwind = E::custom(&err);
        *self.failure.borrow_mut() = Some(err);
        unwind
    }

    fn missing<E: de::Error>(&self, tag: MessageTag) -> E {
        self.fail(HandshakeError::Codec(format!(
            "malformed {tag:?} message: missing field"
        )))
    }

    fn into_error(self, err: serde_cbor::Error) -> HandshakeError {
        if let Some(failure) = self.failure.into_inner() {
            return failure;
        }
        match self.version.get() {
            Some(version) => Rejection::decode_error(version, err.to_string()).into(),
            None => HandshakeError::Codec(format!("CBOR decode error: {err}")),
        }
    }
}

/// Reads one `[tag, ...]` message array
struct MessageSeed<'a>(&'a DecodeState);

impl<'de> DeserializeSeed<'de> for MessageSeed<'_> {
    type Value = Message;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Message, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for MessageSeed<'_> {
    type Value = Message;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a handshake message array")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Message, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let state = self.0;

        let tag: Value = match seq.next_element()? {
            Some(tag) => tag,
            None => {
                return Err(state.fail(HandshakeError::Codec("empty message array".to_string())))
            },
        };
        let tag = match expect_tag(&tag).and_then(MessageTag::from_u8) {
            Some(tag) => tag,
            None => {
                return Err(state.fail(HandshakeError::Codec(format!(
                    "unknown message tag: {tag:?}"
                ))))
            },
        };

        let message = match tag {
            MessageTag::Propose => {
                let table = seq.next_element_seed(TableSeed(state))?;
                Message::Propose(table.ok_or_else(|| state.missing::<A::Error>(tag))?)
            },
            MessageTag::Accept => {
                let version: Value = seq
                    .next_element()?
                    .ok_or_else(|| state.missing::<A::Error>(tag))?;
                let version = expect_version(&version).map_err(|e| state.fail::<A::Error>(e))?;

                state.version.set(Some(version));
                let params: Value = seq
                    .next_element()?
                    .ok_or_else(|| state.missing::<A::Error>(tag))?;
                let params = ParamValue::from_cbor(version, &params)
                    .map_err(|r| state.fail::<A::Error>(r.into()))?;
                state.version.set(None);

                Message::Accept { version, params }
            },
            MessageTag::Refuse => {
                let reason: Value = seq
                    .next_element()?
                    .ok_or_else(|| state.missing::<A::Error>(tag))?;
                let rejection =
                    rejection_from_value(&reason).map_err(|e| state.fail::<A::Error>(e))?;
                Message::Refuse(rejection)
            },
        };

        if seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(state.fail(HandshakeError::Codec(format!(
                "malformed {tag:?} message: too many fields"
            ))));
        }

        Ok(message)
    }
}

/// Reads the `{ * version => params }` map of a PROPOSE
struct TableSeed<'a>(&'a DecodeState);

impl<'de> DeserializeSeed<'de> for TableSeed<'_> {
    type Value = VersionTable;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<VersionTable, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for TableSeed<'_> {
    type Value = VersionTable;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a version table map")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<VersionTable, A::Error>
    where
        A: MapAccess<'de>,
    {
        let state = self.0;
        let mut versions = VersionTable::new();

        while let Some(key) = map.next_key::<Value>()? {
            let version = expect_version(&key).map_err(|e| state.fail::<A::Error>(e))?;
            if versions.contains(version) {
                return Err(state.fail(
                    Rejection::decode_error(version, "version listed more than once").into(),
                ));
            }

            state.version.set(Some(version));
            let params: Value = map.next_value()?;
            let params = ParamValue::from_cbor(version, &params)
                .map_err(|r| state.fail::<A::Error>(r.into()))?;
            state.version.set(None);

            versions.insert(version, params);
        }

        Ok(versions)
    }
}

fn rejection_from_value(value: &Value) -> Result<Rejection> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        other => {
            return Err(HandshakeError::Codec(format!(
                "expected rejection array, got {other:?}"
            )))
        },
    };
    let (tag, rest) = items
        .split_first()
        .ok_or_else(|| HandshakeError::Codec("empty rejection array".to_string()))?;
    let tag = expect_tag(tag)
        .and_then(RejectionTag::from_u8)
        .ok_or_else(|| HandshakeError::Codec(format!("unknown rejection tag: {tag:?}")))?;

    match (tag, rest) {
        (RejectionTag::VersionMismatch, [Value::Array(versions)]) => {
            let valid_versions = versions
                .iter()
                .map(expect_version)
                .collect::<Result<Vec<_>>>()?;
            Ok(Rejection::VersionMismatch { valid_versions })
        },
        (RejectionTag::DecodeError, [version, Value::Text(reason)]) => {
            Ok(Rejection::decode_error(expect_version(version)?, reason.clone()))
        },
        (RejectionTag::Refused, [version, Value::Text(reason)]) => {
            Ok(Rejection::refused(expect_version(version)?, reason.clone()))
        },
        (tag, rest) => Err(HandshakeError::Codec(format!(
            "malformed {tag:?} rejection with {} field(s)",
            rest.len()
        ))),
    }
}

fn expect_tag(value: &Value) -> Option<u8> {
    match value {
        Value::Integer(n) => u8::try_from(*n).ok(),
        _ => None,
    }
}

fn expect_version(value: &Value) -> Result<VersionNumber> {
    match value {
        Value::Integer(n) => VersionNumber::try_from(*n)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| HandshakeError::Codec(format!("invalid version number: {n}"))),
        other => Err(HandshakeError::Codec(format!(
            "expected version number, got {other:?}"
        ))),
    }
}

impl ParamValue {
    /// CBOR form of these parameters
    pub fn to_cbor(&self) -> Value {
        match self {
            Self::Scalar(magic) => int(*magic),
            Self::Pair(magic, flag) => Value::Array(vec![int(*magic), Value::Bool(*flag)]),
        }
    }

    /// Interpret a CBOR item as the parameters of `version`.
    pub fn from_cbor(
        version: VersionNumber,
        value: &Value,
    ) -> std::result::Result<Self, Rejection> {
        let shape = match ParamShape::for_version(version) {
            Some(shape) => shape,
            None => match value {
                Value::Array(_) => ParamShape::Pair,
                _ => ParamShape::Scalar,
            },
        };

        let magic = |value: &Value| match value {
            Value::Integer(n) => i64::try_from(*n)
                .map_err(|_| Rejection::decode_error(version, format!("magic out of range: {n}"))),
            other => Err(Rejection::decode_error(
                version,
                format!("expected integer magic, got {other:?}"),
            )),
        };

        match (shape, value) {
            (ParamShape::Scalar, value) => Ok(Self::Scalar(magic(value)?)),
            (ParamShape::Pair, Value::Array(items)) => match items.as_slice() {
                [m, Value::Bool(flag)] => Ok(Self::Pair(magic(m)?, *flag)),
                _ => Err(Rejection::decode_error(
                    version,
                    format!("expected [magic, bool], got {} item(s)", items.len()),
                )),
            },
            (ParamShape::Pair, other) => Err(Rejection::decode_error(
                version,
                format!("expected [magic, bool], got {other:?}"),
            )),
        }
    }
}
