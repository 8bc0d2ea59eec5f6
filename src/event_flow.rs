//! The `BFEVFL` root container: a 40-byte header plus four placeholder
//! pointers to a single-slot flowchart array/DIC and a single-slot timeline
//! array/DIC, owning exactly one of {flowchart, timeline}.

use crate::dic::DicWriter;
use crate::error::{Error, Result};
use crate::flowchart::Flowchart;
use crate::primitives::read_cstring;
use crate::stream::{BinaryRead, BinaryWrite, ReadStream, WriteStream};
use crate::timeline::Timeline;

const MAGIC: &[u8; 8] = b"BFEVFL\0\0";
const VERSION: u16 = 0x0300;
const BOM: u16 = 0xfeff;
const ALIGNMENT_SHIFTED: u8 = 3;

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct EventFlow {
    pub name: String,
    pub flowchart: Option<Flowchart>,
    pub timeline: Option<Timeline>,
}

impl EventFlow {
    pub fn new(name: impl Into<String>) -> Self {
        EventFlow {
            name: name.into(),
            flowchart: None,
            timeline: None,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut stream = ReadStream::new(data);
        Self::read_from(&mut stream)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut stream = WriteStream::new();
        self.write_to(&mut stream)?;
        Ok(stream.into_bytes())
    }
}

impl BinaryRead for EventFlow {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let magic = stream.read_bytes(8)?;
        if magic != MAGIC {
            return Err(Error::MagicMismatch(magic.to_vec()));
        }
        let version = stream.read_u16()?;
        if version != VERSION {
            return Err(Error::VersionUnsupported(version));
        }
        let xa = stream.read_u8()?;
        let _xb = stream.read_u8()?;
        if xa != 0 {
            return Err(Error::InvariantViolated(format!(
                "event flow header byte 10 must be 0, found {xa}"
            )));
        }
        let bom = stream.read_u16()?;
        if bom != BOM {
            return Err(Error::EndianUnsupported(bom));
        }
        let _alignment_shifted = stream.read_u8()?;
        let _xf = stream.read_u8()?;
        let name_offset = stream.read_u32()? as usize;
        let name = read_cstring(stream.data, name_offset)?;
        let _is_relocated = stream.read_u16()?;
        let _first_block_offset = stream.read_u16()?;
        let _relocation_table_offset = stream.read_u32()?;
        let _file_size = stream.read_u32()?;

        let num_flowcharts = stream.read_u16()?;
        let num_timelines = stream.read_u16()?;
        if num_flowcharts > 1 || num_timelines > 1 {
            return Err(Error::InvariantViolated(
                "event flow must have at most one flowchart and one timeline".into(),
            ));
        }
        let reserved = stream.read_u32()?;
        if reserved != 0 {
            return Err(Error::InvariantViolated(
                "event flow header reserved field must be 0".into(),
            ));
        }

        let flowchart_ptr_offset = stream.read_u64()? as usize;
        let _flowchart_dic_offset = stream.read_u64()?;
        let flowchart = if num_flowcharts == 1 {
            stream.with_seek(flowchart_ptr_offset, |s| s.read_ptr_object::<Flowchart>())?
        } else {
            None
        };

        let timeline_ptr_offset = stream.read_u64()? as usize;
        let _timeline_dic_offset = stream.read_u64()?;
        let timeline = if num_timelines == 1 {
            stream.with_seek(timeline_ptr_offset, |s| s.read_ptr_object::<Timeline>())?
        } else {
            None
        };

        if flowchart.is_none() && timeline.is_none() {
            return Err(Error::EmptyContent {
                found: "neither",
            });
        }

        Ok(EventFlow {
            name,
            flowchart,
            timeline,
        })
    }
}

impl BinaryWrite for EventFlow {
    fn write_to(&self, stream: &mut WriteStream) -> Result<()> {
        if self.flowchart.is_some() == self.timeline.is_some() {
            return Err(Error::EmptyContent {
                found: if self.flowchart.is_some() { "both" } else { "neither" },
            });
        }

        stream.write_bytes(MAGIC);
        stream.write_u16(VERSION);
        stream.write_u8(0);
        stream.write_u8(0);
        stream.write_u16(BOM);
        stream.write_u8(ALIGNMENT_SHIFTED);
        stream.write_u8(0);
        stream.write_string_ref(&self.name, true);
        stream.write_u16(0); // is_relocated
        let first_block_offset_ph = stream.write_placeholder_u16();
        let relocation_table_offset_ph = stream.write_placeholder_u32();
        let file_size_ph = stream.write_placeholder_u32();
        stream.write_u16(if self.flowchart.is_some() { 1 } else { 0 });
        stream.write_u16(if self.timeline.is_some() { 1 } else { 0 });
        stream.write_u32(0);

        let flowchart_array_ph =
            stream.write_placeholder_ptr_if(self.flowchart.is_some(), true);
        let mut flowchart_dic = DicWriter::new();
        if let Some(flowchart) = &self.flowchart {
            flowchart_dic.insert(&flowchart.name);
        }
        let flowchart_dic_ph = flowchart_dic.write_placeholder_offset(stream);

        let timeline_array_ph = stream.write_placeholder_ptr_if(self.timeline.is_some(), true);
        let mut timeline_dic = DicWriter::new();
        if let Some(timeline) = &self.timeline {
            timeline_dic.insert(&timeline.name);
        }
        let timeline_dic_ph = timeline_dic.write_placeholder_offset(stream);

        if let Some(ph) = &flowchart_array_ph {
            ph.patch_current_offset(stream);
        }
        let flowchart_slot_ph = self.flowchart.as_ref().map(|_| stream.write_placeholder_ptr());
        flowchart_dic_ph.patch_current_offset(stream);
        flowchart_dic.write(stream);

        if let Some(ph) = &timeline_array_ph {
            ph.patch_current_offset(stream);
        }
        let timeline_slot_ph = self.timeline.as_ref().map(|_| stream.write_placeholder_ptr());
        timeline_dic_ph.patch_current_offset(stream);
        timeline_dic.write(stream);

        if let (Some(flowchart), Some(slot_ph)) = (&self.flowchart, flowchart_slot_ph) {
            stream.align(8);
            first_block_offset_ph.patch_u16(stream, stream.tell() as u16);
            slot_ph.patch_current_offset(stream);
            flowchart.serialize_to(stream)?;
        }

        if let (Some(timeline), Some(slot_ph)) = (&self.timeline, timeline_slot_ph) {
            stream.align(8);
            let timeline_self_offset = stream.tell();
            slot_ph.patch_current_offset(stream);
            timeline.write_to(stream)?;
            first_block_offset_ph.patch_u16(stream, timeline_self_offset as u16);
        }

        stream.finalise();
        file_size_ph.patch_u32(stream, stream.tell() as u32);
        relocation_table_offset_ph.patch_u32(stream, stream.get_relocation_table_offset() as u32);
        Ok(())
    }
}
