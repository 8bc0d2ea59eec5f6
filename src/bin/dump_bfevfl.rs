use std::env;
use std::fs::File;
use std::io::Read;

use bfevfl::EventFlow;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <file.bfevfl>", args[0]);
        eprintln!("Summarizes a BFEVFL file's flowchart or timeline contents.");
        std::process::exit(1);
    }

    let path = &args[1];
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let event_flow = EventFlow::parse(&buf)?;
    println!("name: {}", event_flow.name);

    if let Some(flowchart) = &event_flow.flowchart {
        println!("flowchart:");
        println!("  actors: {}", flowchart.actors.len());
        println!("  events: {}", flowchart.events.len());
        println!("  entry points: {}", flowchart.entry_points.len());
        for (name, ep) in &flowchart.entry_points {
            println!(
                "    {name} -> event #{} ({} sub-flow event(s), {} variable(s))",
                ep.main_event.index(),
                ep.sub_flow_event_indices.len(),
                ep.variables.len()
            );
        }
    }

    if let Some(timeline) = &event_flow.timeline {
        println!("timeline:");
        println!("  duration: {}", timeline.duration);
        println!("  actors: {}", timeline.actors.len());
        println!("  clips: {}", timeline.clips.len());
        println!("  oneshots: {}", timeline.oneshots.len());
        println!("  subtimelines: {}", timeline.subtimelines.len());
        println!("  cuts: {}", timeline.cuts.len());
    }

    Ok(())
}
