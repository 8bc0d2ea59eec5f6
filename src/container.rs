//! The polymorphic `Container` value store: a string-keyed bundle of typed
//! values attached to actors, events, clips, and cuts for runtime
//! parameters.
//!
//! Every value, including the container itself, starts with the same
//! 16-byte header (`type`, `pad`, `num_items`, reserved `u32`, DIC pointer).
//! Unlike every other string in the format, container strings are written
//! inline rather than through the shared string pool — an asymmetry the
//! engine itself exhibits and that this module preserves exactly.

use indexmap::IndexMap;

use crate::common::{ActorIdentifier, Argument};
use crate::dic::{DicReader, DicWriter};
use crate::error::{Error, Result};
use crate::primitives::encode_pascal_string;
use crate::stream::{BinaryRead, BinaryWrite, ReadStream, WriteStream};

const K_ARGUMENT: u8 = 0;
const K_CONTAINER: u8 = 1;
const K_INT: u8 = 2;
const K_BOOL: u8 = 3;
const K_FLOAT: u8 = 4;
const K_STRING: u8 = 5;
const K_WSTRING: u8 = 6;
const K_INT_ARRAY: u8 = 7;
const K_BOOL_ARRAY: u8 = 8;
const K_FLOAT_ARRAY: u8 = 9;
const K_STRING_ARRAY: u8 = 10;
const K_WSTRING_ARRAY: u8 = 11;
const K_ACTOR_IDENTIFIER: u8 = 12;

/// One value held by a [`Container`]. The `WString`/`WStringArray` tags
/// exist on disk but have no variant here: reading one is a hard error.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub enum Value {
    Int(i32),
    Bool(bool),
    Float(f32),
    String(String),
    Argument(Argument),
    ActorIdentifier(ActorIdentifier),
    IntArray(Vec<i32>),
    BoolArray(Vec<bool>),
    FloatArray(Vec<f32>),
    StringArray(Vec<String>),
    Container(Box<Container>),
}

/// A map from string key to [`Value`]. Key order is insertion order and
/// must be preserved across a round trip, so the backing store is an
/// [`IndexMap`] rather than a `HashMap`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Container {
    pub data: IndexMap<String, Value>,
}

impl Container {
    pub fn new() -> Self {
        Container {
            data: IndexMap::new(),
        }
    }
}

impl BinaryRead for Container {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let data_type = stream.read_u8()?;
        if data_type != K_CONTAINER {
            return Err(Error::InvariantViolated(format!(
                "expected kContainer (1), got container data type {data_type}"
            )));
        }
        stream.skip(1);
        let num_items = stream.read_u16()?;
        let reserved = stream.read_u32()?;
        if reserved != 0 {
            return Err(Error::InvariantViolated(format!(
                "container header reserved field must be 0, got {reserved}"
            )));
        }
        let dic = stream
            .read_ptr_object::<DicReader>()?
            .ok_or_else(|| Error::InvariantViolated("container is missing its DIC".into()))?;
        if dic.items.len() != num_items as usize {
            return Err(Error::InvariantViolated(format!(
                "container DIC has {} keys but header declares {num_items} items",
                dic.items.len()
            )));
        }

        let mut data = IndexMap::with_capacity(dic.items.len());
        for name in dic.items {
            let item_offset = stream.read_u64()? as usize;
            let value = stream.with_seek(item_offset, read_value)?;
            data.insert(name, value);
        }
        Ok(Container { data })
    }
}

fn read_value(stream: &mut ReadStream) -> Result<Value> {
    let data_type = stream.read_u8()?;
    stream.skip(1);
    let num_items = stream.read_u16()? as usize;
    let reserved = stream.read_u32()?;
    if reserved != 0 {
        return Err(Error::InvariantViolated(format!(
            "container value header reserved field must be 0, got {reserved}"
        )));
    }
    let dic_offset = stream.read_u64()?;
    if dic_offset != 0 {
        return Err(Error::InvariantViolated(
            "non-container container value unexpectedly has a DIC pointer".into(),
        ));
    }

    match data_type {
        K_INT => Ok(Value::Int(stream.read_s32()?)),
        K_INT_ARRAY => Ok(Value::IntArray(
            (0..num_items).map(|_| stream.read_s32()).collect::<Result<_>>()?,
        )),

        K_BOOL => Ok(Value::Bool(stream.read_s32()? != 0)),
        K_BOOL_ARRAY => Ok(Value::BoolArray(
            (0..num_items)
                .map(|_| stream.read_s32().map(|v| v != 0))
                .collect::<Result<_>>()?,
        )),

        K_FLOAT => Ok(Value::Float(stream.read_f32()?)),
        K_FLOAT_ARRAY => Ok(Value::FloatArray(
            (0..num_items).map(|_| stream.read_f32()).collect::<Result<_>>()?,
        )),

        K_STRING => Ok(Value::String(read_inline_string_ref(stream)?)),
        K_STRING_ARRAY => {
            let mut out = Vec::with_capacity(num_items);
            for _ in 0..num_items {
                out.push(read_inline_string_ref(stream)?);
            }
            Ok(Value::StringArray(out))
        }

        K_ARGUMENT => Ok(Value::Argument(Argument(read_inline_string_ref(stream)?))),

        K_ACTOR_IDENTIFIER => {
            if num_items != 2 {
                return Err(Error::InvariantViolated(format!(
                    "actor identifier container value must have num_items == 2, got {num_items}"
                )));
            }
            let name = read_inline_string_ref(stream)?;
            let sub_name = read_inline_string_ref(stream)?;
            Ok(Value::ActorIdentifier(ActorIdentifier { name, sub_name }))
        }

        K_CONTAINER => Err(Error::InvariantViolated(
            "nested kContainer found where a leaf container value was expected".into(),
        )),

        K_WSTRING | K_WSTRING_ARRAY => Err(Error::UnknownTag(format!(
            "wide string container values are not supported (tag {data_type})"
        ))),

        other => Err(Error::UnknownTag(format!(
            "unknown container data type {other}"
        ))),
    }
}

/// A container string value is itself a `u64` pointer to an inline Pascal
/// string, parallel to [`ReadStream::read_string_ref`] but never resolved
/// against the shared string pool (there is nothing special about the
/// target: it's just bytes sitting wherever the writer put them).
fn read_inline_string_ref(stream: &mut ReadStream) -> Result<String> {
    stream.read_string_ref()
}

impl BinaryWrite for Container {
    fn write_to(&self, stream: &mut WriteStream) -> Result<()> {
        stream.write_u8(K_CONTAINER);
        stream.write_u8(0);
        stream.write_u16(self.data.len() as u16);
        stream.write_u32(0);

        let mut dic = DicWriter::new();
        for key in self.data.keys() {
            dic.insert(key);
        }
        let dic_ph = dic.write_placeholder_offset(stream);

        let item_phs: Vec<_> = (0..self.data.len())
            .map(|_| stream.write_placeholder_ptr())
            .collect();

        dic_ph.patch_current_offset(stream);
        dic.write(stream);

        for (ph, value) in item_phs.iter().zip(self.data.values()) {
            stream.align(8);
            ph.patch_current_offset(stream);
            write_value(stream, value)?;
        }
        Ok(())
    }
}

fn write_value_common_header(stream: &mut WriteStream, data_type: u8, num_items: u16) {
    stream.write_u8(data_type);
    stream.write_u8(0);
    stream.write_u16(num_items);
    stream.write_u32(0);
    stream.write_u64(0);
}

/// Writes `s` as an inline, non-pooled Pascal string at the stream's
/// current position, patching `ph` (a placeholder written just before the
/// header's trailing field that points here) with that position.
fn write_inline_string(stream: &mut WriteStream, ph: &crate::stream::Placeholder, s: &str) {
    ph.patch_current_offset(stream);
    stream.write_bytes(&encode_pascal_string(s));
}

fn write_value(stream: &mut WriteStream, value: &Value) -> Result<()> {
    match value {
        Value::Bool(b) => {
            write_value_common_header(stream, K_BOOL, 1);
            stream.write_u32(if *b { 0x8000_0001 } else { 0 });
        }
        Value::Int(n) => {
            write_value_common_header(stream, K_INT, 1);
            stream.write_s32(*n);
        }
        Value::Float(f) => {
            write_value_common_header(stream, K_FLOAT, 1);
            stream.write_f32(*f);
        }

        Value::String(s) => {
            write_value_common_header(stream, K_STRING, 1);
            let ph = stream.write_placeholder_ptr();
            write_inline_string(stream, &ph, s);
        }
        Value::Argument(a) => {
            write_value_common_header(stream, K_ARGUMENT, 1);
            let ph = stream.write_placeholder_ptr();
            write_inline_string(stream, &ph, &a.0);
        }

        Value::ActorIdentifier(id) => {
            write_value_common_header(stream, K_ACTOR_IDENTIFIER, 2);
            let ph_name = stream.write_placeholder_ptr();
            let ph_sub = stream.write_placeholder_ptr();
            write_inline_string(stream, &ph_name, &id.name);
            // Unlike every other inline string in the format, the gap
            // between an actor identifier's two strings is 2-byte, not
            // 8-byte, aligned.
            stream.align(2);
            write_inline_string(stream, &ph_sub, &id.sub_name);
        }

        Value::IntArray(items) => {
            write_value_common_header(stream, K_INT_ARRAY, items.len() as u16);
            for v in items {
                stream.write_s32(*v);
            }
        }
        Value::BoolArray(items) => {
            write_value_common_header(stream, K_BOOL_ARRAY, items.len() as u16);
            for v in items {
                stream.write_u32(if *v { 1 } else { 0 });
            }
        }
        Value::FloatArray(items) => {
            write_value_common_header(stream, K_FLOAT_ARRAY, items.len() as u16);
            for v in items {
                stream.write_f32(*v);
            }
        }
        Value::StringArray(items) => {
            write_value_common_header(stream, K_STRING_ARRAY, items.len() as u16);
            let phs: Vec<_> = items.iter().map(|_| stream.write_placeholder_ptr()).collect();
            for (ph, s) in phs.iter().zip(items) {
                stream.align(8);
                write_inline_string(stream, ph, s);
            }
        }

        Value::Container(inner) => {
            inner.write_to(stream)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(container: &Container) -> Container {
        let mut stream = WriteStream::new();
        container.write_to(&mut stream).unwrap();
        stream.finalise();
        let bytes = stream.into_bytes();
        let mut reader = ReadStream::new(&bytes);
        Container::read_from(&mut reader).unwrap()
    }

    #[test]
    fn round_trips_scalars() {
        let mut c = Container::new();
        c.data.insert("hp".into(), Value::Int(100));
        c.data.insert("alive".into(), Value::Bool(true));
        c.data.insert("dead".into(), Value::Bool(false));
        c.data.insert("scale".into(), Value::Float(1.5));
        c.data.insert("name".into(), Value::String("Link".into()));
        c.data
            .insert("arg".into(), Value::Argument(Argument::from("Target")));
        let round = round_trip(&c);
        assert_eq!(round, c);
    }

    #[test]
    fn round_trips_actor_identifier() {
        let mut c = Container::new();
        c.data.insert(
            "target".into(),
            Value::ActorIdentifier(ActorIdentifier::new("Npc_Tag", "Sub")),
        );
        let round = round_trip(&c);
        assert_eq!(round, c);
    }

    #[test]
    fn round_trips_arrays() {
        let mut c = Container::new();
        c.data.insert("ints".into(), Value::IntArray(vec![1, 2, 3]));
        c.data
            .insert("bools".into(), Value::BoolArray(vec![true, false, true]));
        c.data
            .insert("floats".into(), Value::FloatArray(vec![0.0, -1.0, 2.5]));
        c.data.insert(
            "strings".into(),
            Value::StringArray(vec!["a".into(), "longer string".into(), "到着".into()]),
        );
        let round = round_trip(&c);
        assert_eq!(round, c);
    }

    #[test]
    fn round_trips_nested_container() {
        let mut inner = Container::new();
        inner.data.insert("x".into(), Value::Int(1));
        let mut outer = Container::new();
        outer.data.insert("inner".into(), Value::Container(Box::new(inner)));
        outer.data.insert("y".into(), Value::Int(2));
        let round = round_trip(&outer);
        assert_eq!(round, outer);
    }

    #[test]
    fn preserves_key_insertion_order() {
        let mut c = Container::new();
        for key in ["z", "a", "m", "b"] {
            c.data.insert(key.to_string(), Value::Int(0));
        }
        let round = round_trip(&c);
        let keys: Vec<_> = round.data.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m", "b"]);
    }

    #[test]
    fn rejects_unknown_container_header() {
        let mut stream = WriteStream::new();
        stream.write_u8(K_STRING); // not kContainer
        stream.write_u8(0);
        stream.write_u16(0);
        stream.write_u32(0);
        stream.write_u64(0);
        stream.finalise();
        let bytes = stream.into_bytes();
        let mut reader = ReadStream::new(&bytes);
        assert!(Container::read_from(&mut reader).is_err());
    }
}
