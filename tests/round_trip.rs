//! End-to-end `parse(serialize(x)) == x` coverage across the scenarios a
//! real `.bfevfl` corpus exercises: multiple entry points, actor-identifier
//! heavy actors, a zero-case switch, UTF-8 names, `Argument` container
//! values, and a timeline file.

use bfevfl::common::{ActorIdentifier, Handle, OptionalHandle};
use bfevfl::container::{Container, Value};
use bfevfl::entry_point::EntryPoint;
use bfevfl::event::{ActionEvent, Event, EventData, ForkEvent, JoinEvent, SubFlowEvent, SwitchEvent};
use bfevfl::flowchart::Flowchart;
use bfevfl::timeline::{Clip, Timeline};
use bfevfl::EventFlow;
use indexmap::IndexMap;

fn round_trip(event_flow: &EventFlow) -> EventFlow {
    let bytes = event_flow.serialize().expect("serialize");
    EventFlow::parse(&bytes).expect("parse")
}

#[test]
fn multiple_entry_points_round_trip() {
    let mut fc = Flowchart::new("MultiEntry");
    fc.events.insert(
        "Done".into(),
        Event {
            name: "Done".into(),
            data: EventData::Join(JoinEvent { next: OptionalHandle::none() }),
        },
    );
    fc.events.insert(
        "Done2".into(),
        Event {
            name: "Done2".into(),
            data: EventData::Join(JoinEvent { next: OptionalHandle::none() }),
        },
    );

    let mut start = EntryPoint::new("Start");
    start.main_event = Handle::from_index(0);
    fc.entry_points.insert("Start".into(), start);

    let mut alt = EntryPoint::new("Alternate");
    alt.main_event = Handle::from_index(1);
    fc.entry_points.insert("Alternate".into(), alt);

    let event_flow = EventFlow {
        name: "MultiEntry".into(),
        flowchart: Some(fc),
        timeline: None,
    };
    let round = round_trip(&event_flow);
    let fc = round.flowchart.unwrap();
    assert_eq!(fc.entry_points.len(), 2);
    assert_eq!(fc.entry_points["Start"].main_event.index(), 0);
    assert_eq!(fc.entry_points["Alternate"].main_event.index(), 1);
}

#[test]
fn actor_identifier_heavy_flowchart_round_trips() {
    let mut fc = Flowchart::new("ActorHeavy");

    let ids = [
        ActorIdentifier::new("Npc_Tag", ""),
        ActorIdentifier::new("Player", "Sub0"),
        ActorIdentifier::new("Player", "Sub1"),
        ActorIdentifier::new("EventTag", "到着"),
    ];
    for id in &ids {
        let mut actor = bfevfl::actor::Actor::new(id.clone());
        actor.actions = vec!["Wait".into(), "Talk".into()];
        actor.queries = vec!["IsAlive".into()];
        let mut params = Container::new();
        params
            .data
            .insert("identity".into(), Value::ActorIdentifier(id.clone()));
        actor.params = Some(params);
        fc.actors.insert(id.clone(), actor);
    }

    fc.events.insert(
        "Act0".into(),
        Event {
            name: "Act0".into(),
            data: EventData::Action(ActionEvent {
                next: OptionalHandle::none(),
                actor: Handle::from_index(0),
                actor_action: Handle::from_index(0),
                params: None,
            }),
        },
    );
    let mut ep = EntryPoint::new("Start");
    ep.main_event = Handle::from_index(0);
    fc.entry_points.insert("Start".into(), ep);

    let event_flow = EventFlow {
        name: "ActorHeavy".into(),
        flowchart: Some(fc),
        timeline: None,
    };
    let round = round_trip(&event_flow);
    let fc = round.flowchart.unwrap();
    assert_eq!(fc.actors.len(), 4);
    for id in &ids {
        let actor = &fc.actors[id];
        assert_eq!(actor.actions, vec!["Wait".to_string(), "Talk".to_string()]);
        assert_eq!(
            actor.params.as_ref().unwrap().data["identity"],
            Value::ActorIdentifier(id.clone())
        );
    }
}

#[test]
fn switch_with_zero_cases_round_trips() {
    let mut fc = Flowchart::new("ZeroCaseSwitch");
    let identifier = ActorIdentifier::new("Npc_Tag", "");
    let mut actor = bfevfl::actor::Actor::new(identifier.clone());
    actor.queries = vec!["IsAlive".into()];
    fc.actors.insert(identifier, actor);

    fc.events.insert(
        "Switch0".into(),
        Event {
            name: "Switch0".into(),
            data: EventData::Switch(SwitchEvent {
                actor: Handle::from_index(0),
                actor_query: Handle::from_index(0),
                params: None,
                cases: IndexMap::new(),
            }),
        },
    );
    let mut ep = EntryPoint::new("Start");
    ep.main_event = Handle::from_index(0);
    fc.entry_points.insert("Start".into(), ep);

    let event_flow = EventFlow {
        name: "ZeroCaseSwitch".into(),
        flowchart: Some(fc),
        timeline: None,
    };
    let round = round_trip(&event_flow);
    let fc = round.flowchart.unwrap();
    match &fc.events["Switch0"].data {
        EventData::Switch(s) => assert!(s.cases.is_empty()),
        _ => panic!("expected a switch event"),
    }
}

#[test]
fn sub_flow_reachability_survives_fork_and_switch_round_trip() {
    let mut fc = Flowchart::new("Reach");
    fc.events.insert(
        "Fork0".into(),
        Event {
            name: "Fork0".into(),
            data: EventData::Fork(ForkEvent {
                join: Handle::from_index(3),
                forks: vec![Handle::from_index(1), Handle::from_index(2)],
            }),
        },
    );
    fc.events.insert(
        "Switch0".into(),
        Event {
            name: "Switch0".into(),
            data: EventData::Switch(SwitchEvent {
                actor: Handle::from_index(0),
                actor_query: Handle::from_index(0),
                params: None,
                cases: {
                    let mut cases = IndexMap::new();
                    cases.insert(0, Handle::from_index(4));
                    cases
                },
            }),
        },
    );
    fc.events.insert(
        "SubFlowA".into(),
        Event {
            name: "SubFlowA".into(),
            data: EventData::SubFlow(SubFlowEvent {
                next: OptionalHandle::none(),
                params: None,
                res_flowchart_name: String::new(),
                entry_point_name: "A".into(),
            }),
        },
    );
    fc.events.insert(
        "Join0".into(),
        Event {
            name: "Join0".into(),
            data: EventData::Join(JoinEvent { next: OptionalHandle::none() }),
        },
    );
    fc.events.insert(
        "SubFlowB".into(),
        Event {
            name: "SubFlowB".into(),
            data: EventData::SubFlow(SubFlowEvent {
                next: OptionalHandle::none(),
                params: None,
                res_flowchart_name: String::new(),
                entry_point_name: "B".into(),
            }),
        },
    );
    let identifier = ActorIdentifier::new("Npc_Tag", "");
    let mut actor = bfevfl::actor::Actor::new(identifier.clone());
    actor.queries = vec!["IsAlive".into()];
    fc.actors.insert(identifier, actor);

    let mut ep = EntryPoint::new("Start");
    ep.main_event = Handle::from_index(0);
    fc.entry_points.insert("Start".into(), ep);

    let event_flow = EventFlow {
        name: "Reach".into(),
        flowchart: Some(fc),
        timeline: None,
    };
    let round = round_trip(&event_flow);
    let fc = round.flowchart.unwrap();
    assert_eq!(fc.entry_points["Start"].sub_flow_event_indices, vec![2, 4]);
}

#[test]
fn utf8_names_round_trip() {
    let mut fc = Flowchart::new("Root/Timeline/Sleep/到着");
    fc.events.insert(
        "到着".into(),
        Event {
            name: "到着".into(),
            data: EventData::Join(JoinEvent { next: OptionalHandle::none() }),
        },
    );
    let mut ep = EntryPoint::new("Start");
    ep.main_event = Handle::from_index(0);
    fc.entry_points.insert("Start".into(), ep);

    let event_flow = EventFlow {
        name: "Root/Timeline/Sleep/到着".into(),
        flowchart: Some(fc),
        timeline: None,
    };
    let round = round_trip(&event_flow);
    assert_eq!(round.name, "Root/Timeline/Sleep/到着");
    let fc = round.flowchart.unwrap();
    assert!(fc.events.contains_key("到着"));
}

#[test]
fn container_with_argument_value_round_trips() {
    let mut fc = Flowchart::new("ArgContainer");
    let identifier = ActorIdentifier::new("Npc_Tag", "");
    let mut actor = bfevfl::actor::Actor::new(identifier.clone());
    actor.actions = vec!["Talk".into()];
    fc.actors.insert(identifier, actor);

    let mut params = Container::new();
    params
        .data
        .insert("Target".into(), Value::Argument("PlayerArg".into()));
    params.data.insert("Count".into(), Value::Int(3));

    fc.events.insert(
        "Act0".into(),
        Event {
            name: "Act0".into(),
            data: EventData::Action(ActionEvent {
                next: OptionalHandle::none(),
                actor: Handle::from_index(0),
                actor_action: Handle::from_index(0),
                params: Some(params),
            }),
        },
    );
    let mut ep = EntryPoint::new("Start");
    ep.main_event = Handle::from_index(0);
    fc.entry_points.insert("Start".into(), ep);

    let event_flow = EventFlow {
        name: "ArgContainer".into(),
        flowchart: Some(fc),
        timeline: None,
    };
    let round = round_trip(&event_flow);
    let fc = round.flowchart.unwrap();
    let params = fc.events["Act0"]
        .data
        .clone();
    match params {
        EventData::Action(a) => {
            let params = a.params.unwrap();
            assert_eq!(params.data["Target"], Value::Argument("PlayerArg".into()));
            assert_eq!(params.data["Count"], Value::Int(3));
            assert_eq!(
                params.data.keys().cloned().collect::<Vec<_>>(),
                vec!["Target".to_string(), "Count".to_string()]
            );
        }
        _ => panic!("expected an action event"),
    }
}

#[test]
fn timeline_file_round_trips() {
    let mut timeline = Timeline::new("Scene0");
    timeline.duration = 12.5;
    let identifier = ActorIdentifier::new("Player", "");
    let mut actor = bfevfl::actor::Actor::new(identifier);
    actor.x36 = 2;
    actor.actions = vec!["Wait".into()];
    timeline.actors.push(actor);

    let mut clip = Clip::default();
    clip.start_time = 0.0;
    clip.duration = 3.0;
    clip.actor = Handle::from_index(0);
    clip.actor_action = Handle::from_index(0);
    timeline.clips.push(clip);
    timeline.triggers = vec![
        bfevfl::timeline::Trigger { clip: Handle::from_index(0), kind: 0 },
        bfevfl::timeline::Trigger { clip: Handle::from_index(0), kind: 1 },
    ];

    let event_flow = EventFlow {
        name: "Scene0".into(),
        flowchart: None,
        timeline: Some(timeline),
    };
    let round = round_trip(&event_flow);
    let timeline = round.timeline.unwrap();
    assert_eq!(timeline.duration, 12.5);
    assert_eq!(timeline.actors.len(), 1);
    assert_eq!(timeline.clips.len(), 1);
    assert_eq!(timeline.triggers.len(), 2);
    assert_eq!(timeline.clips[0].start_time, 0.0);
    assert_eq!(timeline.clips[0].duration, 3.0);
}
