//! Flowchart actors: typed endpoints exposing named actions and queries,
//! optionally bound to an entry point via a named identifier argument.

use crate::common::{ActorIdentifier, OptionalHandle};
use crate::container::Container;
use crate::entry_point::EntryPoint;
use crate::error::Result;
use crate::stream::{BinaryRead, BinaryWrite, Placeholder, ReadStream, WriteStream};

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Actor {
    pub identifier: ActorIdentifier,
    /// If non-empty, actor-identifier arguments passed under this name bind
    /// to this actor.
    pub argument_name: String,
    pub argument_entry_point: OptionalHandle<EntryPoint>,
    pub actions: Vec<String>,
    pub queries: Vec<String>,
    pub params: Option<Container>,
    /// Unexplained field; observed as 1 on flowchart actors and other
    /// values on timeline actors. Preserved verbatim.
    pub x36: u16,
}

impl Actor {
    pub fn new(identifier: ActorIdentifier) -> Self {
        Actor {
            identifier,
            argument_name: String::new(),
            argument_entry_point: OptionalHandle::none(),
            actions: Vec::new(),
            queries: Vec::new(),
            params: None,
            x36: 0xffff,
        }
    }
}

impl BinaryRead for Actor {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let identifier = ActorIdentifier::read_from(stream)?;
        let argument_name = stream.read_string_ref()?;
        let actions_offset = stream.read_u64()? as usize;
        let queries_offset = stream.read_u64()? as usize;
        let params = stream.read_ptr_object::<Container>()?;
        let num_actions = stream.read_u16()? as usize;
        let num_queries = stream.read_u16()? as usize;
        let argument_entry_point = OptionalHandle::from_index(stream.read_u16()?);
        let x36 = stream.read_u16()?;

        let actions = if num_actions > 0 {
            stream.with_seek(actions_offset, |s| {
                (0..num_actions)
                    .map(|_| s.read_string_ref())
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            Vec::new()
        };
        let queries = if num_queries > 0 {
            stream.with_seek(queries_offset, |s| {
                (0..num_queries)
                    .map(|_| s.read_string_ref())
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            Vec::new()
        };

        Ok(Actor {
            identifier,
            argument_name,
            argument_entry_point,
            actions,
            queries,
            params,
            x36,
        })
    }
}

/// The placeholders an [`Actor`]'s fixed record leaves behind for
/// [`Actor::write_extra_data`] to patch.
pub struct ActorPlaceholders {
    actions: Option<Placeholder>,
    queries: Option<Placeholder>,
    params: Option<Placeholder>,
}

impl Actor {
    /// Writes the actor's fixed-size record, returning the placeholders
    /// needed to later write its extra data (params container and the
    /// action/query string-ref arrays).
    pub fn write_record(&self, stream: &mut WriteStream) -> Result<ActorPlaceholders> {
        self.identifier.write_to(stream)?;
        stream.write_string_ref(&self.argument_name, false);
        let actions = stream.write_placeholder_ptr_if(!self.actions.is_empty(), true);
        let queries = stream.write_placeholder_ptr_if(!self.queries.is_empty(), true);
        let params = stream.write_placeholder_ptr_if(has_params(&self.params), false);
        stream.write_u16(self.actions.len() as u16);
        stream.write_u16(self.queries.len() as u16);
        stream.write_u16(self.argument_entry_point.index().unwrap_or(crate::common::NONE_INDEX));
        stream.write_u16(self.x36);
        Ok(ActorPlaceholders {
            actions,
            queries,
            params,
        })
    }

    pub fn write_extra_data(
        &self,
        stream: &mut WriteStream,
        phs: &ActorPlaceholders,
    ) -> Result<()> {
        if let (Some(ph), Some(params)) = (&phs.params, &self.params) {
            stream.align(8);
            ph.patch_current_offset(stream);
            params.write_to(stream)?;
        }
        if let Some(ph) = &phs.actions {
            if !self.actions.is_empty() {
                stream.align(8);
                ph.patch_current_offset(stream);
                for s in &self.actions {
                    stream.write_string_ref(s, false);
                }
            }
        }
        if let Some(ph) = &phs.queries {
            if !self.queries.is_empty() {
                stream.align(8);
                ph.patch_current_offset(stream);
                for s in &self.queries {
                    stream.write_string_ref(s, false);
                }
            }
        }
        Ok(())
    }
}

fn has_params(params: &Option<Container>) -> bool {
    params.as_ref().is_some_and(|c| !c.data.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Value;

    fn round_trip(actor: &Actor) -> Actor {
        let mut stream = WriteStream::new();
        let phs = actor.write_record(&mut stream).unwrap();
        stream.align(8);
        actor.write_extra_data(&mut stream, &phs).unwrap();
        stream.finalise();
        let bytes = stream.into_bytes();
        let mut reader = ReadStream::new(&bytes);
        Actor::read_from(&mut reader).unwrap()
    }

    #[test]
    fn round_trips_minimal_actor() {
        let actor = Actor::new(ActorIdentifier::new("Npc_Tag", ""));
        let round = round_trip(&actor);
        assert_eq!(round, actor);
    }

    #[test]
    fn round_trips_actions_queries_and_params() {
        let mut actor = Actor::new(ActorIdentifier::new("Player", "Sub"));
        actor.argument_name = "Target".into();
        actor.actions = vec!["Wait".into(), "Talk".into()];
        actor.queries = vec!["IsAlive".into()];
        actor.argument_entry_point = OptionalHandle::from_index(3);
        actor.x36 = 1;
        let mut params = Container::new();
        params.data.insert("hp".into(), Value::Int(100));
        actor.params = Some(params);

        let round = round_trip(&actor);
        assert_eq!(round, actor);
    }

    #[test]
    fn empty_params_container_produces_no_pointer() {
        let mut actor = Actor::new(ActorIdentifier::new("Npc_Tag", ""));
        actor.params = Some(Container::new());
        let round = round_trip(&actor);
        assert_eq!(round.params, None);
    }
}
