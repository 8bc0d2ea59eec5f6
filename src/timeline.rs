//! Timelines: a fixed-length sequence of actor clips/oneshots/cuts, driven
//! by an attached subtimeline or flowchart. Reads follow the reference
//! implementation; writes (never implemented there) follow the same
//! placeholder/extra-data discipline used by [`crate::flowchart::Flowchart`].

use crate::actor::{Actor, ActorPlaceholders};
use crate::common::Handle;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::stream::{BinaryRead, BinaryWrite, Placeholder, ReadStream, WriteStream};

const MAGIC: u32 = u32::from_le_bytes(*b"TLIN");

fn has_params(params: &Option<Container>) -> bool {
    params.as_ref().is_some_and(|c| !c.data.is_empty())
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Clip {
    pub start_time: f32,
    pub duration: f32,
    pub actor: Handle<Actor>,
    pub actor_action: Handle<String>,
    /// Unexplained field, observed as 0xff on every sample. Preserved verbatim.
    pub xc: u8,
    pub params: Option<Container>,
}

impl Default for Clip {
    fn default() -> Self {
        Clip {
            start_time: -1.0,
            duration: -1.0,
            actor: Handle::from_index(0),
            actor_action: Handle::from_index(0),
            xc: 0xff,
            params: None,
        }
    }
}

impl BinaryRead for Clip {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let start_time = stream.read_f32()?;
        let duration = stream.read_f32()?;
        let actor = Handle::from_index(stream.read_u16()?);
        let actor_action = Handle::from_index(stream.read_u16()?);
        let xc = stream.read_u8()?;
        stream.skip(3);
        let params = stream.read_ptr_object::<Container>()?;
        Ok(Clip {
            start_time,
            duration,
            actor,
            actor_action,
            xc,
            params,
        })
    }
}

impl Clip {
    pub fn write_record(&self, stream: &mut WriteStream) -> Option<Placeholder> {
        stream.write_f32(self.start_time);
        stream.write_f32(self.duration);
        stream.write_u16(self.actor.index());
        stream.write_u16(self.actor_action.index());
        stream.write_u8(self.xc);
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_placeholder_ptr_if(has_params(&self.params), false)
    }

    pub fn write_extra_data(&self, stream: &mut WriteStream, ph: &Option<Placeholder>) -> Result<()> {
        if let (Some(ph), Some(params)) = (ph, &self.params) {
            ph.patch_current_offset(stream);
            params.write_to(stream)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Oneshot {
    pub time: f32,
    pub actor: Handle<Actor>,
    pub actor_action: Handle<String>,
    pub params: Option<Container>,
}

impl Default for Oneshot {
    fn default() -> Self {
        Oneshot {
            time: -1.0,
            actor: Handle::from_index(0),
            actor_action: Handle::from_index(0),
            params: None,
        }
    }
}

impl BinaryRead for Oneshot {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let time = stream.read_f32()?;
        let actor = Handle::from_index(stream.read_u16()?);
        let actor_action = Handle::from_index(stream.read_u16()?);
        stream.skip(8);
        let params = stream.read_ptr_object::<Container>()?;
        Ok(Oneshot {
            time,
            actor,
            actor_action,
            params,
        })
    }
}

impl Oneshot {
    pub fn write_record(&self, stream: &mut WriteStream) -> Option<Placeholder> {
        stream.write_f32(self.time);
        stream.write_u16(self.actor.index());
        stream.write_u16(self.actor_action.index());
        stream.write_u64(0);
        stream.write_placeholder_ptr_if(has_params(&self.params), false)
    }

    pub fn write_extra_data(&self, stream: &mut WriteStream, ph: &Option<Placeholder>) -> Result<()> {
        if let (Some(ph), Some(params)) = (ph, &self.params) {
            ph.patch_current_offset(stream);
            params.write_to(stream)?;
        }
        Ok(())
    }
}

/// A `u8` enum of trigger kinds would be natural, but the reference
/// implementation never names the values it reads, so the tag is kept as a
/// raw byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize)]
pub struct Trigger {
    pub clip: Handle<Clip>,
    pub kind: u8,
}

impl BinaryRead for Trigger {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let clip = Handle::from_index(stream.read_u16()?);
        let kind = stream.read_u8()?;
        stream.skip(1);
        Ok(Trigger { clip, kind })
    }
}

impl Trigger {
    pub fn write_to(&self, stream: &mut WriteStream) {
        stream.write_u16(self.clip.index());
        stream.write_u8(self.kind);
        stream.write_u8(0);
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Subtimeline {
    pub name: String,
}

impl BinaryRead for Subtimeline {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        Ok(Subtimeline {
            name: stream.read_string_ref()?,
        })
    }
}

impl Subtimeline {
    pub fn write_to(&self, stream: &mut WriteStream) {
        stream.write_string_ref(&self.name, false);
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Cut {
    pub start_time: f32,
    /// Unexplained field, observed as 0xffffffff on every sample. Preserved verbatim.
    pub x4: u32,
    pub name: String,
    pub params: Option<Container>,
}

impl Default for Cut {
    fn default() -> Self {
        Cut {
            start_time: -1.0,
            x4: 0xffffffff,
            name: String::new(),
            params: None,
        }
    }
}

impl BinaryRead for Cut {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let start_time = stream.read_f32()?;
        let x4 = stream.read_u32()?;
        let name = stream.read_string_ref()?;
        let params = stream.read_ptr_object::<Container>()?;
        Ok(Cut {
            start_time,
            x4,
            name,
            params,
        })
    }
}

impl Cut {
    pub fn write_record(&self, stream: &mut WriteStream) -> Option<Placeholder> {
        stream.write_f32(self.start_time);
        stream.write_u32(self.x4);
        stream.write_string_ref(&self.name, false);
        stream.write_placeholder_ptr_if(has_params(&self.params), false)
    }

    pub fn write_extra_data(&self, stream: &mut WriteStream, ph: &Option<Placeholder>) -> Result<()> {
        if let (Some(ph), Some(params)) = (ph, &self.params) {
            ph.patch_current_offset(stream);
            params.write_to(stream)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Timeline {
    pub name: String,
    pub duration: f32,
    pub actors: Vec<Actor>,
    pub clips: Vec<Clip>,
    pub oneshots: Vec<Oneshot>,
    /// Always `2 * clips.len()` entries: index `2*i`/`2*i+1` are clip `i`'s
    /// start/end trigger.
    pub triggers: Vec<Trigger>,
    pub subtimelines: Vec<Subtimeline>,
    pub cuts: Vec<Cut>,
    pub params: Option<Container>,
}

impl Timeline {
    pub fn new(name: impl Into<String>) -> Self {
        Timeline {
            name: name.into(),
            duration: -1.0,
            actors: Vec::new(),
            clips: Vec::new(),
            oneshots: Vec::new(),
            triggers: Vec::new(),
            subtimelines: Vec::new(),
            cuts: Vec::new(),
            params: None,
        }
    }

    fn action_count(&self) -> usize {
        self.actors.iter().map(|a| a.actions.len()).sum()
    }
}

impl BinaryRead for Timeline {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let magic = stream.read_u32()?;
        if magic != MAGIC {
            return Err(Error::InvariantViolated(format!(
                "bad timeline magic: {magic:#x}"
            )));
        }
        let _string_pool_offset = stream.read_u32()?;
        let x8 = stream.read_u32()?;
        let xc = stream.read_u32()?;
        if x8 != 0 || xc != 0 {
            return Err(Error::InvariantViolated(
                "timeline header reserved u32 fields must be 0".into(),
            ));
        }
        let duration = stream.read_f32()?;
        let num_actors = stream.read_u16()? as usize;
        let _num_actions = stream.read_u16()?;
        let num_clips = stream.read_u16()? as usize;
        let num_oneshots = stream.read_u16()? as usize;
        let num_subtimelines = stream.read_u16()? as usize;
        let num_cuts = stream.read_u16()? as usize;
        let name = stream.read_string_ref()?;

        let actors = stream.read_ptr_objects::<Actor>(num_actors)?;
        let clips = stream.read_ptr_objects::<Clip>(num_clips)?;
        let oneshots = stream.read_ptr_objects::<Oneshot>(num_oneshots)?;
        let triggers = stream.read_ptr_objects::<Trigger>(2 * num_clips)?;
        stream.align(8);
        let subtimelines = stream.read_ptr_objects::<Subtimeline>(num_subtimelines)?;
        let cuts = stream.read_ptr_objects::<Cut>(num_cuts)?;
        let params = stream.read_ptr_object::<Container>()?;

        Ok(Timeline {
            name,
            duration,
            actors,
            clips,
            oneshots,
            triggers,
            subtimelines,
            cuts,
            params,
        })
    }
}

impl BinaryWrite for Timeline {
    fn write_to(&self, stream: &mut WriteStream) -> Result<()> {
        if self.triggers.len() != 2 * self.clips.len() {
            return Err(Error::InvariantViolated(format!(
                "timeline has {} clips but {} triggers (expected {})",
                self.clips.len(),
                self.triggers.len(),
                2 * self.clips.len()
            )));
        }

        let self_offset = stream.tell();
        stream.write_u32(MAGIC);
        let string_pool_rel_offset = stream.write_placeholder_u32();
        stream.write_u32(0);
        stream.write_u32(0);
        stream.write_f32(self.duration);
        stream.write_u16(self.actors.len() as u16);
        stream.write_u16(self.action_count() as u16);
        stream.write_u16(self.clips.len() as u16);
        stream.write_u16(self.oneshots.len() as u16);
        stream.write_u16(self.subtimelines.len() as u16);
        stream.write_u16(self.cuts.len() as u16);
        stream.write_string_ref(&self.name, false);

        let actors_ph = stream.write_placeholder_ptr_if(!self.actors.is_empty(), true);
        let clips_ph = stream.write_placeholder_ptr_if(!self.clips.is_empty(), true);
        let oneshots_ph = stream.write_placeholder_ptr_if(!self.oneshots.is_empty(), true);
        let triggers_ph = stream.write_placeholder_ptr_if(!self.triggers.is_empty(), true);
        let subtimelines_ph = stream.write_placeholder_ptr_if(!self.subtimelines.is_empty(), true);
        let cuts_ph = stream.write_placeholder_ptr_if(!self.cuts.is_empty(), true);
        let params_ph = stream.write_placeholder_ptr_if(has_params(&self.params), false);

        let mut actor_phs: Vec<ActorPlaceholders> = Vec::with_capacity(self.actors.len());
        if let Some(ph) = &actors_ph {
            ph.patch_current_offset(stream);
            for actor in &self.actors {
                actor_phs.push(actor.write_record(stream)?);
            }
        }

        let mut clip_phs: Vec<Option<Placeholder>> = Vec::with_capacity(self.clips.len());
        if let Some(ph) = &clips_ph {
            ph.patch_current_offset(stream);
            for clip in &self.clips {
                clip_phs.push(clip.write_record(stream));
            }
        }

        if let Some(ph) = &oneshots_ph {
            ph.patch_current_offset(stream);
        }
        let mut oneshot_phs: Vec<Option<Placeholder>> = Vec::with_capacity(self.oneshots.len());
        if oneshots_ph.is_some() {
            for oneshot in &self.oneshots {
                oneshot_phs.push(oneshot.write_record(stream));
            }
        }

        if let Some(ph) = &triggers_ph {
            ph.patch_current_offset(stream);
            for trigger in &self.triggers {
                trigger.write_to(stream);
            }
        }
        stream.align(8);

        if let Some(ph) = &subtimelines_ph {
            ph.patch_current_offset(stream);
            for subtimeline in &self.subtimelines {
                subtimeline.write_to(stream);
            }
        }

        let mut cut_phs: Vec<Option<Placeholder>> = Vec::with_capacity(self.cuts.len());
        if let Some(ph) = &cuts_ph {
            ph.patch_current_offset(stream);
            for cut in &self.cuts {
                cut_phs.push(cut.write_record(stream));
            }
        }

        for (clip, ph) in self.clips.iter().zip(&clip_phs) {
            stream.align(8);
            clip.write_extra_data(stream, ph)?;
        }
        for (oneshot, ph) in self.oneshots.iter().zip(&oneshot_phs) {
            stream.align(8);
            oneshot.write_extra_data(stream, ph)?;
        }
        for (cut, ph) in self.cuts.iter().zip(&cut_phs) {
            stream.align(8);
            cut.write_extra_data(stream, ph)?;
        }
        for (actor, ph) in self.actors.iter().zip(&actor_phs) {
            stream.align(8);
            actor.write_extra_data(stream, ph)?;
        }
        if let (Some(ph), Some(params)) = (&params_ph, &self.params) {
            stream.align(8);
            ph.patch_current_offset(stream);
            params.write_to(stream)?;
        }

        stream.align(8);
        let rel_offset = (stream.tell() - self_offset) as u32;
        string_pool_rel_offset.patch_u32(stream, rel_offset);
        Ok(())
    }
}
