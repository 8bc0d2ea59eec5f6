//! The flowchart graph: actors, events, and entry points, plus the
//! index-resolution and sub-flow-reachability passes that run at write
//! time.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use crate::actor::{Actor, ActorPlaceholders};
use crate::common::ActorIdentifier;
use crate::dic::{DicReader, DicWriter};
use crate::entry_point::{read_entry_point, EntryPoint, EntryPointPlaceholders};
use crate::error::{Error, Result};
use crate::event::{Event, EventData, EventPlaceholders};
use crate::stream::{BinaryRead, BinaryWrite, ReadStream, WriteStream};

const MAGIC: &[u8; 4] = b"EVFL";

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Flowchart {
    pub name: String,
    pub actors: IndexMap<ActorIdentifier, Actor>,
    pub events: IndexMap<String, Event>,
    pub entry_points: IndexMap<String, EntryPoint>,
}

impl Flowchart {
    pub fn new(name: impl Into<String>) -> Self {
        Flowchart {
            name: name.into(),
            actors: IndexMap::new(),
            events: IndexMap::new(),
            entry_points: IndexMap::new(),
        }
    }

    fn action_count(&self) -> usize {
        self.actors.values().map(|a| a.actions.len()).sum()
    }

    fn query_count(&self) -> usize {
        self.actors.values().map(|a| a.queries.len()).sum()
    }

    /// BFS from `main_event`, collecting `SubFlow` events in first-visit
    /// order, recursing through switch cases and fork branches. Cycle-safe:
    /// the scripted graph may contain back-edges (loops).
    fn sub_flow_reachability(&self, main_event: u16) -> Vec<u16> {
        let mut visited: HashSet<u16> = HashSet::new();
        let mut queue: VecDeque<u16> = VecDeque::new();
        let mut result = Vec::new();

        if (main_event as usize) >= self.events.len() {
            return result;
        }
        queue.push_back(main_event);
        visited.insert(main_event);

        while let Some(idx) = queue.pop_front() {
            let Some((_, event)) = self.events.get_index(idx as usize) else {
                continue;
            };
            let mut next_indices: Vec<u16> = Vec::new();
            match &event.data {
                EventData::Action(e) => {
                    if let Some(n) = e.next.index() {
                        next_indices.push(n);
                    }
                }
                EventData::Switch(e) => {
                    for target in e.cases.values() {
                        next_indices.push(target.index());
                    }
                }
                EventData::Fork(e) => {
                    next_indices.push(e.join.index());
                    for fork in &e.forks {
                        next_indices.push(fork.index());
                    }
                }
                EventData::Join(e) => {
                    if let Some(n) = e.next.index() {
                        next_indices.push(n);
                    }
                }
                EventData::SubFlow(e) => {
                    result.push(idx);
                    if let Some(n) = e.next.index() {
                        next_indices.push(n);
                    }
                }
            }
            for next in next_indices {
                if (next as usize) < self.events.len() && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        result
    }
}

impl BinaryRead for Flowchart {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let magic = stream.read_bytes(4)?;
        if magic != MAGIC {
            return Err(Error::InvariantViolated(format!(
                "bad flowchart magic: {magic:?}"
            )));
        }
        let _string_pool_offset = stream.read_u32()?;
        let x8 = stream.read_u32()?;
        let xc = stream.read_u32()?;
        if x8 != 0 || xc != 0 {
            return Err(Error::InvariantViolated(
                "flowchart header reserved u32 fields must be 0".into(),
            ));
        }
        let num_actors = stream.read_u16()? as usize;
        let _num_actions = stream.read_u16()?;
        let _num_queries = stream.read_u16()?;
        let num_events = stream.read_u16()? as usize;
        let num_entry_points = stream.read_u16()? as usize;
        let x1a = stream.read_u16()?;
        let x1c = stream.read_u16()?;
        let x1e = stream.read_u16()?;
        if x1a != 0 || x1c != 0 || x1e != 0 {
            return Err(Error::InvariantViolated(
                "flowchart header reserved u16 fields must be 0".into(),
            ));
        }
        let name = stream.read_string_ref()?;

        let actors_offset = stream.read_u64()? as usize;
        let mut actors = IndexMap::with_capacity(num_actors);
        if num_actors > 0 {
            stream.with_seek(actors_offset, |s| {
                for _ in 0..num_actors {
                    let actor = Actor::read_from(s)?;
                    actors.insert(actor.identifier.clone(), actor);
                }
                Ok(())
            })?;
        }

        let events_offset = stream.read_u64()? as usize;
        let mut events = IndexMap::with_capacity(num_events);
        if num_events > 0 {
            stream.with_seek(events_offset, |s| {
                for _ in 0..num_events {
                    let event = Event::read_from(s)?;
                    events.insert(event.name.clone(), event);
                }
                Ok(())
            })?;
        }

        let entry_point_dic = stream
            .read_ptr_object::<DicReader>()?
            .ok_or_else(|| Error::InvariantViolated("flowchart is missing its entry-point DIC".into()))?;
        if entry_point_dic.items.len() != num_entry_points {
            return Err(Error::InvariantViolated(format!(
                "flowchart entry-point DIC has {} keys but header declares {num_entry_points}",
                entry_point_dic.items.len()
            )));
        }

        let entry_points_offset = stream.read_u64()? as usize;
        let mut entry_points = IndexMap::with_capacity(num_entry_points);
        if num_entry_points > 0 {
            stream.with_seek(entry_points_offset, |s| {
                for name in entry_point_dic.items {
                    let entry_point = read_entry_point(s, name.clone())?;
                    entry_points.insert(name, entry_point);
                }
                Ok(())
            })?;
        }

        Ok(Flowchart {
            name,
            actors,
            events,
            entry_points,
        })
    }
}

impl BinaryWrite for Flowchart {
    fn write_to(&self, stream: &mut WriteStream) -> Result<()> {
        let self_offset = stream.tell();
        stream.write_bytes(MAGIC);
        let string_pool_rel_offset = stream.write_placeholder_u32();
        stream.write_u32(0);
        stream.write_u32(0);
        stream.write_u16(self.actors.len() as u16);
        stream.write_u16(self.action_count() as u16);
        stream.write_u16(self.query_count() as u16);
        stream.write_u16(self.events.len() as u16);
        stream.write_u16(self.entry_points.len() as u16);
        stream.write_u16(0);
        stream.write_u16(0);
        stream.write_u16(0);
        stream.write_string_ref(&self.name, false);

        let actors_ph = stream.write_placeholder_ptr_if(!self.actors.is_empty(), true);
        let events_ph = stream.write_placeholder_ptr_if(!self.events.is_empty(), true);
        let mut entry_points_dic = DicWriter::new();
        let entry_points_dic_ph = entry_points_dic.write_placeholder_offset(stream);
        let entry_points_ph = stream.write_placeholder_ptr_if(!self.entry_points.is_empty(), true);

        let mut actor_phs = Vec::with_capacity(self.actors.len());
        if let Some(ph) = &actors_ph {
            ph.patch_current_offset(stream);
            for actor in self.actors.values() {
                actor_phs.push(actor.write_record(stream)?);
            }
        }

        let mut event_phs = Vec::with_capacity(self.events.len());
        if let Some(ph) = &events_ph {
            ph.patch_current_offset(stream);
            for event in self.events.values() {
                event_phs.push(event.write_record(stream)?);
            }
        }

        for key in self.entry_points.keys() {
            entry_points_dic.insert(key);
        }
        entry_points_dic_ph.patch_current_offset(stream);
        entry_points_dic.write(stream);
        stream.align(8);

        let mut entry_point_phs = Vec::with_capacity(self.entry_points.len());
        if let Some(ph) = &entry_points_ph {
            ph.patch_current_offset(stream);
            for entry_point in self.entry_points.values() {
                entry_point_phs.push(entry_point.write_record(stream));
            }
        }

        for (event, phs) in self.events.values().zip(&event_phs) {
            stream.align(8);
            event.write_extra_data(stream, phs)?;
        }
        for (actor, phs) in self.actors.values().zip(&actor_phs) {
            stream.align(8);
            actor.write_extra_data(stream, phs)?;
        }
        for (entry_point, phs) in self.entry_points.values().zip(&entry_point_phs) {
            stream.align(8);
            entry_point.write_extra_data(stream, phs);
        }

        stream.align(8);
        let rel_offset = (stream.tell() - self_offset) as u32;
        string_pool_rel_offset.patch_u32(stream, rel_offset);
        Ok(())
    }
}

impl Flowchart {
    /// Recomputes every entry point's `sub_flow_event_indices` from the
    /// current event graph. Called automatically before writing; exposed
    /// so callers can inspect the derived reachability set without a
    /// round trip.
    pub fn recompute_sub_flow_reachability(&mut self) {
        let main_events: Vec<(String, u16)> = self
            .entry_points
            .iter()
            .map(|(name, ep)| (name.clone(), ep.main_event.index()))
            .collect();
        for (name, main_event) in main_events {
            let indices = self.sub_flow_reachability(main_event);
            if let Some(ep) = self.entry_points.get_mut(&name) {
                ep.sub_flow_event_indices = indices;
            }
        }
    }

    /// Serializes the flowchart, first recomputing derived fields
    /// (sub-flow reachability) as spec'd for the write path.
    pub fn serialize_to(&self, stream: &mut WriteStream) -> Result<()> {
        let mut owned = self.clone();
        owned.recompute_sub_flow_reachability();
        owned.write_to(stream)
    }
}
