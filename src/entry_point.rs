//! Flowchart entry points: named starting vertices of the event graph,
//! each with a required main event and a derived (not authored) list of
//! reachable sub-flow events, plus an optional small typed-variable
//! dictionary.

use indexmap::IndexMap;

use crate::common::Handle;
use crate::dic::{DicReader, DicWriter};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::stream::{BinaryRead, Placeholder, ReadStream, WriteStream};

const K_INTEGER: u16 = 0;
const K_FLOAT: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub enum VariableValue {
    Integer(i32),
    Float(f32),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Variable {
    pub slot: u16,
    pub value: VariableValue,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct EntryPoint {
    pub name: String,
    pub main_event: Handle<Event>,
    /// Computed at flowchart write time by BFS from `main_event`; never
    /// authored directly.
    pub sub_flow_event_indices: Vec<u16>,
    pub variables: IndexMap<String, Variable>,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>) -> Self {
        EntryPoint {
            name: name.into(),
            main_event: Handle::from_index(crate::common::NONE_INDEX),
            sub_flow_event_indices: Vec::new(),
            variables: IndexMap::new(),
        }
    }
}

/// Reads one 32-byte entry-point record. The caller supplies `name`
/// (recovered from the owning flowchart's entry-point DIC, which is read
/// separately since entry points are not self-naming on disk).
pub fn read_entry_point(stream: &mut ReadStream, name: String) -> Result<EntryPoint> {
    let sub_flow_event_indices_offset = stream.read_u64()? as usize;
    let vars_dic_offset = stream.read_u64()? as usize;
    let vars_value_offset = stream.read_u64()? as usize;
    let num_sub_flow = stream.read_u16()? as usize;
    let num_vars = stream.read_u16()? as usize;
    let main_event = Handle::from_index(stream.read_u16()?);
    let reserved = stream.read_u16()?;
    if reserved != 0 {
        return Err(Error::InvariantViolated(
            "entry point trailing reserved field must be 0".into(),
        ));
    }

    let sub_flow_event_indices = if num_sub_flow > 0 {
        if sub_flow_event_indices_offset == 0 {
            return Err(Error::InvariantViolated(
                "entry point declares sub-flow events but has a null pointer".into(),
            ));
        }
        stream.with_seek(sub_flow_event_indices_offset, |s| {
            (0..num_sub_flow).map(|_| s.read_u16()).collect::<Result<Vec<_>>>()
        })?
    } else {
        Vec::new()
    };

    let mut variables = IndexMap::with_capacity(num_vars);
    if num_vars > 0 {
        let names = stream.with_seek(vars_dic_offset, DicReader::read_from)?.items;
        if names.len() != num_vars {
            return Err(Error::InvariantViolated(format!(
                "entry point variable DIC has {} keys but header declares {num_vars} variables",
                names.len()
            )));
        }
        stream.with_seek(vars_value_offset, |s| {
            for item_name in names {
                let variable = read_variable(s)?;
                variables.insert(item_name, variable);
            }
            Ok(())
        })?;
    }

    Ok(EntryPoint {
        name,
        main_event,
        sub_flow_event_indices,
        variables,
    })
}

/// A variable's 16-byte record stores its type tag *after* its value, so
/// the value can't be decoded until the type has been peeked further
/// along in the same record.
fn read_variable(stream: &mut ReadStream) -> Result<Variable> {
    let start = stream.tell();
    stream.skip(8);
    let slot = stream.read_u16()?;
    let type_tag = stream.read_u16()?;
    stream.seek(start);
    let value = match type_tag {
        K_INTEGER => VariableValue::Integer(stream.read_s32()?),
        K_FLOAT => VariableValue::Float(stream.read_f32()?),
        other => return Err(Error::UnknownTag(format!("unknown variable type: {other}"))),
    };
    stream.skip(12);
    Ok(Variable { slot, value })
}

fn write_variable(stream: &mut WriteStream, variable: &Variable) {
    match variable.value {
        VariableValue::Integer(v) => stream.write_s32(v),
        VariableValue::Float(v) => stream.write_f32(v),
    }
    stream.write_u32(0);
    stream.write_u16(variable.slot);
    stream.write_u16(match variable.value {
        VariableValue::Integer(_) => K_INTEGER,
        VariableValue::Float(_) => K_FLOAT,
    });
    stream.write_u32(0);
}

pub struct EntryPointPlaceholders {
    sub_flow_event_indices: Option<Placeholder>,
    vars_dic: Option<Placeholder>,
    vars_value: Option<Placeholder>,
}

impl EntryPoint {
    pub fn write_record(&self, stream: &mut WriteStream) -> EntryPointPlaceholders {
        let sub_flow_event_indices =
            stream.write_placeholder_ptr_if(!self.sub_flow_event_indices.is_empty(), true);
        let vars_dic = stream.write_placeholder_ptr_if(!self.variables.is_empty(), false);
        let vars_value = stream.write_placeholder_ptr_if(!self.variables.is_empty(), true);
        stream.write_u16(self.sub_flow_event_indices.len() as u16);
        stream.write_u16(self.variables.len() as u16);
        stream.write_u16(self.main_event.index());
        stream.write_u16(0);
        EntryPointPlaceholders {
            sub_flow_event_indices,
            vars_dic,
            vars_value,
        }
    }

    pub fn write_extra_data(&self, stream: &mut WriteStream, phs: &EntryPointPlaceholders) {
        if let Some(ph) = &phs.sub_flow_event_indices {
            stream.align(8);
            ph.patch_current_offset(stream);
            for idx in &self.sub_flow_event_indices {
                stream.write_u16(*idx);
            }
        }
        if !self.variables.is_empty() {
            stream.align(8);
            if let Some(ph) = &phs.vars_dic {
                ph.patch_current_offset(stream);
            }
            let mut dic = DicWriter::new();
            for key in self.variables.keys() {
                dic.insert(key);
            }
            dic.write(stream);

            stream.align(8);
            if let Some(ph) = &phs.vars_value {
                ph.patch_current_offset(stream);
            }
            for variable in self.variables.values() {
                write_variable(stream, variable);
            }
        }
        stream.skip(0x18);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(entry_point: &EntryPoint) -> EntryPoint {
        let mut stream = WriteStream::new();
        let phs = entry_point.write_record(&mut stream);
        stream.align(8);
        entry_point.write_extra_data(&mut stream, &phs);
        stream.finalise();
        let bytes = stream.into_bytes();
        let mut reader = ReadStream::new(&bytes);
        read_entry_point(&mut reader, entry_point.name.clone()).unwrap()
    }

    #[test]
    fn round_trips_minimal_entry_point() {
        let mut ep = EntryPoint::new("Start");
        ep.main_event = Handle::from_index(0);
        assert_eq!(round_trip(&ep), ep);
    }

    #[test]
    fn round_trips_sub_flow_event_indices() {
        let mut ep = EntryPoint::new("Start");
        ep.main_event = Handle::from_index(2);
        ep.sub_flow_event_indices = vec![1, 4, 7];
        assert_eq!(round_trip(&ep), ep);
    }

    #[test]
    fn round_trips_variables() {
        let mut ep = EntryPoint::new("Start");
        ep.main_event = Handle::from_index(0);
        ep.variables.insert(
            "CreateMode".into(),
            Variable {
                slot: 0,
                value: VariableValue::Integer(3),
            },
        );
        ep.variables.insert(
            "PosX".into(),
            Variable {
                slot: 1,
                value: VariableValue::Float(12.5),
            },
        );
        assert_eq!(round_trip(&ep), ep);
    }
}
