//! Cycle-safe rendering of call arguments
//!
//! [`safe_to_value`] drives any `Serialize` value into a `serde_json::Value`
//! through a bounded serializer. serde cannot see pointer identity, so a
//! shared graph that points back at itself (an `Rc<RefCell<_>>` cycle, say) is
//! cut in two ways: any branch nested deeper than [`MAX_DEPTH`] containers, and
//! every container opened after [`MAX_CONTAINERS`] have been opened in one
//! call. Both cuts are replaced with [`CIRCULAR_MARKER`]. The second bound keeps
//! a node with several back-edges linear instead of exponential in the depth.
//! A value whose `Serialize` impl fails becomes [`UNSERIALIZABLE_MARKER`].
//! Neither path returns an error.
//!
//! Object keys keep serialization order, so struct fields print as declared.
//! [`render_plain`] and [`render_beautified`] turn the result into log text.
//! Highlighting runs on the already-serialized pretty form, so both renderings
//! succeed on exactly the same inputs.

use colored::Colorize;
use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};
use std::cell::Cell;

/// Nested containers kept before a branch is replaced with [`CIRCULAR_MARKER`]
pub const MAX_DEPTH: usize = 24;

/// Containers serialized per [`safe_to_value`] call before every further one
/// is replaced with [`CIRCULAR_MARKER`]
pub const MAX_CONTAINERS: usize = 10_000;

/// Substituted for a branch cut by [`MAX_DEPTH`] or [`MAX_CONTAINERS`]
pub const CIRCULAR_MARKER: &str = "[Circular]";

/// Substituted for a value whose `Serialize` impl reported an error
pub const UNSERIALIZABLE_MARKER: &str = "[Unserializable]";

/// Render any serializable value without ever failing
pub fn safe_to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    let budget = Cell::new(MAX_CONTAINERS);
    value
        .serialize(SafeSerializer::root(&budget))
        .unwrap_or_else(|_| Value::String(UNSERIALIZABLE_MARKER.to_string()))
}

/// One-line JSON text
pub fn render_plain<T: Serialize + ?Sized>(value: &T) -> String {
    let value = safe_to_value(value);
    serde_json::to_string(&value).unwrap_or_else(|_| UNSERIALIZABLE_MARKER.to_string())
}

/// Indented JSON text with ANSI syntax highlighting
pub fn render_beautified<T: Serialize + ?Sized>(value: &T) -> String {
    let value = safe_to_value(value);
    match serde_json::to_string_pretty(&value) {
        Ok(pretty) => highlight_json(&pretty),
        Err(_) => UNSERIALIZABLE_MARKER.to_string(),
    }
}

/// Colorize well-formed JSON text: keys cyan, strings green, numbers yellow,
/// `true`/`false`/`null` magenta. Punctuation and whitespace pass through.
pub fn highlight_json(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let start = i;
                i += 1;
                while i < chars.len() {
                    match chars[i] {
                        '\\' => i += 2,
                        '"' => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                let end = i.min(chars.len());
                let token: String = chars[start..end].iter().collect();
                let is_key = chars[end..]
                    .iter()
                    .find(|c| !c.is_whitespace())
                    .is_some_and(|c| *c == ':');
                if is_key {
                    out.push_str(&token.cyan().to_string());
                } else {
                    out.push_str(&token.green().to_string());
                }
            }
            '-' | '0'..='9' => {
                let start = i;
                while i < chars.len() && matches!(chars[i], '-' | '+' | '.' | 'e' | 'E' | '0'..='9')
                {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                out.push_str(&token.yellow().to_string());
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                out.push_str(&token.magenta().to_string());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Internal failure raised by a `Serialize` impl; never leaves this module
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SafeSerializeError(String);

impl ser::Error for SafeSerializeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

type SafeResult = Result<Value, SafeSerializeError>;

#[derive(Debug, Clone, Copy)]
struct SafeSerializer<'a> {
    depth: usize,
    /// Containers still allowed, shared by the whole value
    budget: &'a Cell<usize>,
}

impl<'a> SafeSerializer<'a> {
    fn root(budget: &'a Cell<usize>) -> Self {
        Self { depth: 0, budget }
    }

    /// Serializer for the children of a container opened at this depth, or
    /// `None` when the container must be cut. Spends one unit of budget.
    fn descend(self) -> Option<Self> {
        let remaining = self.budget.get();
        if self.depth >= MAX_DEPTH || remaining == 0 {
            return None;
        }
        self.budget.set(remaining - 1);
        Some(Self {
            depth: self.depth + 1,
            budget: self.budget,
        })
    }
}

fn circular() -> Value {
    Value::String(CIRCULAR_MARKER.to_string())
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn key_text(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

impl<'a> ser::Serializer for SafeSerializer<'a> {
    type Ok = Value;
    type Error = SafeSerializeError;
    type SerializeSeq = SeqState<'a>;
    type SerializeTuple = SeqState<'a>;
    type SerializeTupleStruct = SeqState<'a>;
    type SerializeTupleVariant = VariantState<SeqState<'a>>;
    type SerializeMap = MapState<'a>;
    type SerializeStruct = MapState<'a>;
    type SerializeStructVariant = VariantState<MapState<'a>>;

    fn serialize_bool(self, v: bool) -> SafeResult {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> SafeResult {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> SafeResult {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> SafeResult {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> SafeResult {
        Ok(Value::from(v))
    }

    fn serialize_i128(self, v: i128) -> SafeResult {
        Ok(i64::try_from(v)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(v.to_string())))
    }

    fn serialize_u8(self, v: u8) -> SafeResult {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> SafeResult {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> SafeResult {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> SafeResult {
        Ok(Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> SafeResult {
        Ok(u64::try_from(v)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(v.to_string())))
    }

    fn serialize_f32(self, v: f32) -> SafeResult {
        Ok(float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> SafeResult {
        Ok(float(v))
    }

    fn serialize_char(self, v: char) -> SafeResult {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> SafeResult {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> SafeResult {
        Ok(Value::Array(v.iter().map(|b| Value::from(*b)).collect()))
    }

    fn serialize_none(self) -> SafeResult {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> SafeResult {
        value.serialize(self)
    }

    fn serialize_unit(self) -> SafeResult {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> SafeResult {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> SafeResult {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> SafeResult {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> SafeResult {
        let inner = match self.descend() {
            Some(child) => value.serialize(child)?,
            None => circular(),
        };
        let mut map = Map::new();
        map.insert(variant.to_string(), inner);
        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqState<'a>, SafeSerializeError> {
        Ok(SeqState::new(self.descend(), len))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqState<'a>, SafeSerializeError> {
        Ok(SeqState::new(self.descend(), Some(len)))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqState<'a>, SafeSerializeError> {
        Ok(SeqState::new(self.descend(), Some(len)))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantState<SeqState<'a>>, SafeSerializeError> {
        Ok(VariantState {
            variant,
            inner: SeqState::new(self.descend(), Some(len)),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapState<'a>, SafeSerializeError> {
        Ok(MapState::new(self.descend()))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<MapState<'a>, SafeSerializeError> {
        Ok(MapState::new(self.descend()))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantState<MapState<'a>>, SafeSerializeError> {
        Ok(VariantState {
            variant,
            inner: MapState::new(self.descend()),
        })
    }
}

/// Sequence under construction; `child == None` means the sequence was cut
struct SeqState<'a> {
    child: Option<SafeSerializer<'a>>,
    items: Vec<Value>,
}

impl<'a> SeqState<'a> {
    fn new(child: Option<SafeSerializer<'a>>, len: Option<usize>) -> Self {
        let capacity = if child.is_some() { len.unwrap_or(0) } else { 0 };
        Self {
            child,
            items: Vec::with_capacity(capacity),
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SafeSerializeError> {
        if let Some(child) = self.child {
            self.items.push(value.serialize(child)?);
        }
        Ok(())
    }

    fn finish(self) -> SafeResult {
        match self.child {
            Some(_) => Ok(Value::Array(self.items)),
            None => Ok(circular()),
        }
    }
}

impl ser::SerializeSeq for SeqState<'_> {
    type Ok = Value;
    type Error = SafeSerializeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.push(value)
    }

    fn end(self) -> SafeResult {
        self.finish()
    }
}

impl ser::SerializeTuple for SeqState<'_> {
    type Ok = Value;
    type Error = SafeSerializeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.push(value)
    }

    fn end(self) -> SafeResult {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for SeqState<'_> {
    type Ok = Value;
    type Error = SafeSerializeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.push(value)
    }

    fn end(self) -> SafeResult {
        self.finish()
    }
}

/// Map or struct under construction; `child == None` means it was cut
struct MapState<'a> {
    child: Option<SafeSerializer<'a>>,
    map: Map<String, Value>,
    pending_key: Option<String>,
}

impl<'a> MapState<'a> {
    fn new(child: Option<SafeSerializer<'a>>) -> Self {
        Self {
            child,
            map: Map::new(),
            pending_key: None,
        }
    }

    fn insert<T: Serialize + ?Sized>(
        &mut self,
        key: String,
        value: &T,
    ) -> Result<(), SafeSerializeError> {
        if let Some(child) = self.child {
            self.map.insert(key, value.serialize(child)?);
        }
        Ok(())
    }

    fn finish(self) -> SafeResult {
        match self.child {
            Some(_) => Ok(Value::Object(self.map)),
            None => Ok(circular()),
        }
    }
}

impl ser::SerializeMap for MapState<'_> {
    type Ok = Value;
    type Error = SafeSerializeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        if let Some(child) = self.child {
            self.pending_key = Some(key_text(key.serialize(child)?));
        }
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        match self.pending_key.take() {
            Some(key) => self.insert(key, value),
            None if self.child.is_none() => Ok(()),
            None => Err(SafeSerializeError("map value without a key".to_string())),
        }
    }

    fn end(self) -> SafeResult {
        self.finish()
    }
}

impl ser::SerializeStruct for MapState<'_> {
    type Ok = Value;
    type Error = SafeSerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> SafeResult {
        self.finish()
    }
}

/// Externally tagged enum variant: `{ "<variant>": <inner> }`
struct VariantState<S> {
    variant: &'static str,
    inner: S,
}

impl<S> VariantState<S> {
    fn wrap(variant: &'static str, inner: Value) -> SafeResult {
        let mut map = Map::new();
        map.insert(variant.to_string(), inner);
        Ok(Value::Object(map))
    }
}

impl ser::SerializeTupleVariant for VariantState<SeqState<'_>> {
    type Ok = Value;
    type Error = SafeSerializeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.inner.push(value)
    }

    fn end(self) -> SafeResult {
        Self::wrap(self.variant, self.inner.finish()?)
    }
}

impl ser::SerializeStructVariant for VariantState<MapState<'_>> {
    type Ok = Value;
    type Error = SafeSerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.inner.insert(key.to_string(), value)
    }

    fn end(self) -> SafeResult {
        Self::wrap(self.variant, self.inner.finish()?)
    }
}
