//! Flowchart events: action/switch/fork/join/sub-flow nodes in the
//! scripted-behavior graph, each a 40-byte record (name + 1-byte tag +
//! 1-byte pad + 30 bytes of variant payload) with variant-specific extra
//! data trailing the event table.

use indexmap::IndexMap;

use crate::actor::Actor;
use crate::common::{Handle, OptionalHandle};
use crate::container::Container;
use crate::error::{Error, Result};
use crate::stream::{BinaryRead, BinaryWrite, Placeholder, ReadStream, WriteStream};

const K_ACTION: u8 = 0;
const K_SWITCH: u8 = 1;
const K_FORK: u8 = 2;
const K_JOIN: u8 = 3;
const K_SUB_FLOW: u8 = 4;

fn has_params(params: &Option<Container>) -> bool {
    params.as_ref().is_some_and(|c| !c.data.is_empty())
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ActionEvent {
    pub next: OptionalHandle<Event>,
    pub actor: Handle<Actor>,
    pub actor_action: Handle<String>,
    pub params: Option<Container>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SwitchEvent {
    pub actor: Handle<Actor>,
    pub actor_query: Handle<String>,
    pub params: Option<Container>,
    /// Case value → target event, insertion-ordered (may be empty).
    pub cases: IndexMap<u32, Handle<Event>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ForkEvent {
    pub join: Handle<Event>,
    pub forks: Vec<Handle<Event>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct JoinEvent {
    pub next: OptionalHandle<Event>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SubFlowEvent {
    pub next: OptionalHandle<Event>,
    pub params: Option<Container>,
    pub res_flowchart_name: String,
    pub entry_point_name: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub enum EventData {
    Action(ActionEvent),
    Switch(SwitchEvent),
    Fork(ForkEvent),
    Join(JoinEvent),
    SubFlow(SubFlowEvent),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Event {
    pub name: String,
    pub data: EventData,
}

impl BinaryRead for Event {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let name = stream.read_string_ref()?;
        let type_tag = stream.read_u8()?;
        stream.skip(1);
        let data = match type_tag {
            K_ACTION => EventData::Action(read_action(stream)?),
            K_SWITCH => EventData::Switch(read_switch(stream)?),
            K_FORK => EventData::Fork(read_fork(stream)?),
            K_JOIN => EventData::Join(read_join(stream)?),
            K_SUB_FLOW => EventData::SubFlow(read_sub_flow(stream)?),
            other => return Err(Error::UnknownTag(format!("unknown event type: {other}"))),
        };
        Ok(Event { name, data })
    }
}

fn read_action(stream: &mut ReadStream) -> Result<ActionEvent> {
    let next = OptionalHandle::from_index(stream.read_u16()?);
    let actor = Handle::from_index(stream.read_u16()?);
    let actor_action = Handle::from_index(stream.read_u16()?);
    let params = stream.read_ptr_object::<Container>()?;
    let unused1 = stream.read_u64()?;
    let unused2 = stream.read_u64()?;
    if unused1 != 0 || unused2 != 0 {
        return Err(Error::InvariantViolated(
            "action event trailing reserved fields must be 0".into(),
        ));
    }
    Ok(ActionEvent {
        next,
        actor,
        actor_action,
        params,
    })
}

fn read_switch(stream: &mut ReadStream) -> Result<SwitchEvent> {
    let num_cases = stream.read_u16()? as usize;
    let actor = Handle::from_index(stream.read_u16()?);
    let actor_query = Handle::from_index(stream.read_u16()?);
    let params = stream.read_ptr_object::<Container>()?;
    let cases_offset = stream.read_u64()? as usize;
    let mut cases = IndexMap::with_capacity(num_cases);
    if num_cases > 0 {
        stream.with_seek(cases_offset, |s| {
            for _ in 0..num_cases {
                let value = s.read_u32()?;
                let event_idx = s.read_u16()?;
                cases.insert(value, Handle::from_index(event_idx));
                s.align(8);
            }
            Ok(())
        })?;
    }
    let unused = stream.read_u64()?;
    if unused != 0 {
        return Err(Error::InvariantViolated(
            "switch event trailing reserved field must be 0".into(),
        ));
    }
    Ok(SwitchEvent {
        actor,
        actor_query,
        params,
        cases,
    })
}

fn read_fork(stream: &mut ReadStream) -> Result<ForkEvent> {
    let num_forks = stream.read_u16()? as usize;
    let join = Handle::from_index(stream.read_u16()?);
    let unused = stream.read_u16()?;
    if unused != 0 {
        return Err(Error::InvariantViolated(
            "fork event padding field must be 0".into(),
        ));
    }
    let forks_offset = stream.read_u64()? as usize;
    if num_forks == 0 || forks_offset == 0 {
        return Err(Error::Corrupt("fork event must have at least one branch".into()));
    }
    let forks = stream.with_seek(forks_offset, |s| {
        (0..num_forks)
            .map(|_| Ok(Handle::from_index(s.read_u16()?)))
            .collect::<Result<Vec<_>>>()
    })?;
    let unused1 = stream.read_u64()?;
    let unused2 = stream.read_u64()?;
    if unused1 != 0 || unused2 != 0 {
        return Err(Error::InvariantViolated(
            "fork event trailing reserved fields must be 0".into(),
        ));
    }
    Ok(ForkEvent { join, forks })
}

fn read_join(stream: &mut ReadStream) -> Result<JoinEvent> {
    let next = OptionalHandle::from_index(stream.read_u16()?);
    let xc = stream.read_u16()?;
    let xe = stream.read_u16()?;
    let params = stream.read_u64()?;
    let unused1 = stream.read_u64()?;
    let unused2 = stream.read_u64()?;
    if xc != 0 || xe != 0 || params != 0 || unused1 != 0 || unused2 != 0 {
        return Err(Error::InvariantViolated(
            "join event reserved fields must be 0".into(),
        ));
    }
    Ok(JoinEvent { next })
}

fn read_sub_flow(stream: &mut ReadStream) -> Result<SubFlowEvent> {
    let next = OptionalHandle::from_index(stream.read_u16()?);
    let xc = stream.read_u16()?;
    let xe = stream.read_u16()?;
    if xc != 0 || xe != 0 {
        return Err(Error::InvariantViolated(
            "sub-flow event padding fields must be 0".into(),
        ));
    }
    let params = stream.read_ptr_object::<Container>()?;
    let res_flowchart_name = stream.read_string_ref()?;
    let entry_point_name = stream.read_string_ref()?;
    if entry_point_name.is_empty() {
        return Err(Error::Corrupt(
            "sub-flow event must name a non-empty entry point".into(),
        ));
    }
    Ok(SubFlowEvent {
        next,
        params,
        res_flowchart_name,
        entry_point_name,
    })
}

/// Placeholders left behind by [`Event::write_record`] for
/// [`Event::write_extra_data`] to patch; `None` for variants (or slots)
/// that never need one.
pub enum EventPlaceholders {
    Action { params: Option<Placeholder> },
    Switch { params: Option<Placeholder>, cases: Option<Placeholder> },
    Fork { forks: Placeholder },
    Join,
    SubFlow { params: Option<Placeholder> },
}

impl Event {
    pub fn write_record(&self, stream: &mut WriteStream) -> Result<EventPlaceholders> {
        stream.write_string_ref(&self.name, false);
        let tag = match &self.data {
            EventData::Action(_) => K_ACTION,
            EventData::Switch(_) => K_SWITCH,
            EventData::Fork(_) => K_FORK,
            EventData::Join(_) => K_JOIN,
            EventData::SubFlow(_) => K_SUB_FLOW,
        };
        stream.write_u8(tag);
        stream.write_u8(0);
        match &self.data {
            EventData::Action(e) => Ok(EventPlaceholders::Action {
                params: write_action(stream, e),
            }),
            EventData::Switch(e) => {
                let (params, cases) = write_switch(stream, e);
                Ok(EventPlaceholders::Switch { params, cases })
            }
            EventData::Fork(e) => Ok(EventPlaceholders::Fork {
                forks: write_fork(stream, e)?,
            }),
            EventData::Join(e) => {
                write_join(stream, e);
                Ok(EventPlaceholders::Join)
            }
            EventData::SubFlow(e) => Ok(EventPlaceholders::SubFlow {
                params: write_sub_flow(stream, e)?,
            }),
        }
    }

    pub fn write_extra_data(&self, stream: &mut WriteStream, phs: &EventPlaceholders) -> Result<()> {
        match (&self.data, phs) {
            (EventData::Action(e), EventPlaceholders::Action { params }) => {
                write_params_extra(stream, params, &e.params)
            }
            (EventData::Switch(e), EventPlaceholders::Switch { params, cases }) => {
                // Nintendo's software writes the switch case struct first.
                if let Some(ph) = cases {
                    stream.align(8);
                    ph.patch_current_offset(stream);
                    for (value, target) in &e.cases {
                        stream.write_u32(*value);
                        stream.write_u16(target.index());
                        stream.align(8);
                    }
                }
                write_params_extra(stream, params, &e.params)
            }
            (EventData::Fork(e), EventPlaceholders::Fork { forks }) => {
                forks.patch_current_offset(stream);
                for fork in &e.forks {
                    stream.write_u16(fork.index());
                }
                stream.align(8);
                Ok(())
            }
            (EventData::Join(_), EventPlaceholders::Join) => Ok(()),
            (EventData::SubFlow(e), EventPlaceholders::SubFlow { params }) => {
                write_params_extra(stream, params, &e.params)
            }
            _ => unreachable!("event data/placeholder variant mismatch"),
        }
    }
}

fn write_params_extra(
    stream: &mut WriteStream,
    ph: &Option<Placeholder>,
    params: &Option<Container>,
) -> Result<()> {
    if let (Some(ph), Some(params)) = (ph, params) {
        ph.patch_current_offset(stream);
        params.write_to(stream)?;
    }
    Ok(())
}

fn write_action(stream: &mut WriteStream, e: &ActionEvent) -> Option<Placeholder> {
    stream.write_u16(e.next.index().unwrap_or(crate::common::NONE_INDEX));
    stream.write_u16(e.actor.index());
    stream.write_u16(e.actor_action.index());
    let params = stream.write_placeholder_ptr_if(has_params(&e.params), false);
    stream.write_u64(0);
    stream.write_u64(0);
    params
}

fn write_switch(stream: &mut WriteStream, e: &SwitchEvent) -> (Option<Placeholder>, Option<Placeholder>) {
    stream.write_u16(e.cases.len() as u16);
    stream.write_u16(e.actor.index());
    stream.write_u16(e.actor_query.index());
    let params = stream.write_placeholder_ptr_if(has_params(&e.params), false);
    let cases = stream.write_placeholder_ptr_if(!e.cases.is_empty(), true);
    stream.write_u64(0);
    (params, cases)
}

fn write_fork(stream: &mut WriteStream, e: &ForkEvent) -> Result<Placeholder> {
    if e.forks.is_empty() {
        return Err(Error::Corrupt("fork event must have at least one branch".into()));
    }
    stream.write_u16(e.forks.len() as u16);
    stream.write_u16(e.join.index());
    stream.write_u16(0);
    let forks = stream.write_placeholder_ptr();
    stream.write_u64(0);
    stream.write_u64(0);
    Ok(forks)
}

fn write_join(stream: &mut WriteStream, e: &JoinEvent) {
    stream.write_u16(e.next.index().unwrap_or(crate::common::NONE_INDEX));
    stream.write_u16(0);
    stream.write_u16(0);
    stream.write_u64(0);
    stream.write_u64(0);
    stream.write_u64(0);
}

fn write_sub_flow(stream: &mut WriteStream, e: &SubFlowEvent) -> Result<Option<Placeholder>> {
    if e.entry_point_name.is_empty() {
        return Err(Error::Corrupt(
            "sub-flow event must name a non-empty entry point".into(),
        ));
    }
    stream.write_u16(e.next.index().unwrap_or(crate::common::NONE_INDEX));
    stream.write_u16(0);
    stream.write_u16(0);
    let params = stream.write_placeholder_ptr_if(has_params(&e.params), false);
    stream.write_string_ref(&e.res_flowchart_name, false);
    stream.write_string_ref(&e.entry_point_name, false);
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Value;

    fn round_trip(event: &Event) -> Event {
        let mut stream = WriteStream::new();
        let phs = event.write_record(&mut stream).unwrap();
        stream.align(8);
        event.write_extra_data(&mut stream, &phs).unwrap();
        stream.finalise();
        let bytes = stream.into_bytes();
        let mut reader = ReadStream::new(&bytes);
        Event::read_from(&mut reader).unwrap()
    }

    #[test]
    fn round_trips_action_event() {
        let event = Event {
            name: "Action0".into(),
            data: EventData::Action(ActionEvent {
                next: OptionalHandle::from_index(2),
                actor: Handle::from_index(0),
                actor_action: Handle::from_index(1),
                params: None,
            }),
        };
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn round_trips_action_event_with_params() {
        let mut params = Container::new();
        params.data.insert("key".into(), Value::Int(42));
        let event = Event {
            name: "Action1".into(),
            data: EventData::Action(ActionEvent {
                next: OptionalHandle::none(),
                actor: Handle::from_index(0),
                actor_action: Handle::from_index(0),
                params: Some(params),
            }),
        };
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn round_trips_switch_event_with_zero_cases() {
        let event = Event {
            name: "Switch0".into(),
            data: EventData::Switch(SwitchEvent {
                actor: Handle::from_index(0),
                actor_query: Handle::from_index(0),
                params: None,
                cases: IndexMap::new(),
            }),
        };
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn round_trips_switch_event_with_cases() {
        let mut cases = IndexMap::new();
        cases.insert(0, Handle::from_index(5));
        cases.insert(1, Handle::from_index(6));
        let event = Event {
            name: "Switch1".into(),
            data: EventData::Switch(SwitchEvent {
                actor: Handle::from_index(2),
                actor_query: Handle::from_index(3),
                params: None,
                cases,
            }),
        };
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn round_trips_fork_event() {
        let event = Event {
            name: "Fork0".into(),
            data: EventData::Fork(ForkEvent {
                join: Handle::from_index(9),
                forks: vec![Handle::from_index(1), Handle::from_index(2), Handle::from_index(3)],
            }),
        };
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn fork_event_with_no_branches_is_rejected() {
        let event = Event {
            name: "Fork1".into(),
            data: EventData::Fork(ForkEvent {
                join: Handle::from_index(0),
                forks: vec![],
            }),
        };
        let mut stream = WriteStream::new();
        assert!(event.write_record(&mut stream).is_err());
    }

    #[test]
    fn round_trips_join_event() {
        let event = Event {
            name: "Join0".into(),
            data: EventData::Join(JoinEvent {
                next: OptionalHandle::from_index(4),
            }),
        };
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn round_trips_sub_flow_event() {
        let event = Event {
            name: "SubFlow0".into(),
            data: EventData::SubFlow(SubFlowEvent {
                next: OptionalHandle::none(),
                params: None,
                res_flowchart_name: "OtherFlow".into(),
                entry_point_name: "Start".into(),
            }),
        };
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn sub_flow_event_with_empty_entry_point_name_is_rejected() {
        let event = Event {
            name: "SubFlow1".into(),
            data: EventData::SubFlow(SubFlowEvent {
                next: OptionalHandle::none(),
                params: None,
                res_flowchart_name: String::new(),
                entry_point_name: String::new(),
            }),
        };
        let mut stream = WriteStream::new();
        assert!(event.write_record(&mut stream).is_err());
    }
}
