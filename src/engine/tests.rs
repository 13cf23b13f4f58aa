use super::*;

const MAX_CYCLES: usize = 1000;

struct Recorder {
    engine: EventScheduler<Recorder>,
    log: Vec<(Time, EventId, u32)>,
}

impl Simulation for Recorder {
    type Payload = u32;

    fn engine(&mut self) -> &mut EventScheduler<Self> {
        &mut self.engine
    }

    fn engine_ref(&self) -> &EventScheduler<Self> {
        &self.engine
    }
}

fn recorder_with(config: EngineConfig) -> Recorder {
    Recorder {
        engine: EventScheduler::new(config),
        log: Vec::new(),
    }
}

fn recorder() -> Recorder {
    recorder_with(EngineConfig::default())
}

fn record(sim: &mut Recorder, id: EventId, payload: u32) {
    let now = sim.engine.time();
    sim.log.push((now, id, payload));
}

fn reschedule(sim: &mut Recorder, id: EventId, payload: u32) {
    record(sim, id, payload);
    sim.engine.schedule(id, payload + 1, 1);
}

fn run_until_idle(sim: &mut Recorder) {
    for _ in 0..MAX_CYCLES {
        if sim.engine.event_count() == 0 {
            return;
        }
        EventScheduler::process_events(sim, true);
    }
    panic!("events still pending after {} cycles", MAX_CYCLES);
}

#[test]
fn registered_ids_follow_the_sentinels() {
    let mut sim = recorder();
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let a = sim.engine.register_event("a", d, record);
    let b = sim.engine.register_event("b", d, record);
    assert_eq!(2, a);
    assert_eq!(3, b);
    assert_eq!("Invalid", sim.engine.event_name(EV_INVALID));
    assert_eq!("None", sim.engine.event_name(EV_NONE));
    assert_eq!("b", sim.engine.event_name(b));
}

#[test]
fn fastest_domain_sets_base_cycle() {
    let mut sim = recorder();
    sim.engine.new_domain("slow", 250).unwrap();
    sim.engine.new_domain("fast", 1000).unwrap();
    sim.engine.new_domain("mid", 500).unwrap();
    assert_eq!(1000, sim.engine.cycle_time());
    assert_eq!(1000, sim.engine.frequency());
    assert_eq!(3, sim.engine.domain_count());
}

#[test]
fn equal_time_events_fire_in_schedule_order() {
    let mut sim = recorder();
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let a = sim.engine.register_event("a", d, record);
    let b = sim.engine.register_event("b", d, record);
    sim.engine.schedule(b, 1, 2);
    sim.engine.schedule(a, 2, 1);
    sim.engine.schedule(a, 3, 2);
    sim.engine.schedule(b, 4, 1);
    run_until_idle(&mut sim);

    let payloads: Vec<_> = sim.log.iter().map(|&(_, _, p)| p).collect();
    assert_eq!(vec![2, 4, 1, 3], payloads);
    assert!(sim.log.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[test]
fn schedule_aligns_to_the_event_domain() {
    let mut sim = recorder();
    let fast = sim.engine.new_domain("fast", 1000).unwrap();
    let slow = sim.engine.new_domain("slow", 250).unwrap();
    let tick = sim.engine.register_event("tick", slow, record);
    let _ = fast;

    // move to t = 1000 ps, which is inside the first slow cycle
    EventScheduler::process_events(&mut sim, true);
    assert_eq!(1000, sim.engine.time());
    assert_eq!(1, sim.engine.domain_cycle(slow));

    sim.engine.schedule(tick, 0, 1);
    run_until_idle(&mut sim);
    assert_eq!(vec![(4000, tick, 0)], sim.log);
}

#[test]
fn zero_cycle_delay_fires_at_current_aligned_time() {
    let mut sim = recorder();
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let ev = sim.engine.register_event("ev", d, record);
    sim.engine.schedule(ev, 9, 0);
    EventScheduler::process_events(&mut sim, false);
    assert_eq!(vec![(0, ev, 9)], sim.log);
    assert_eq!(1000, sim.engine.time());
}

#[test]
fn domain_cycles_never_decrease() {
    let mut sim = recorder();
    let a = sim.engine.new_domain("a", 1000).unwrap();
    let b = sim.engine.new_domain("b", 300).unwrap();
    let mut last = (0, 0, 0);
    for _ in 0..50 {
        EventScheduler::process_events(&mut sim, true);
        let now = (
            sim.engine.cycle(),
            sim.engine.domain_cycle(a),
            sim.engine.domain_cycle(b),
        );
        assert!(now.0 >= last.0 && now.1 >= last.1 && now.2 >= last.2);
        last = now;
    }
    assert_eq!(51, last.0);
}

#[test]
fn idle_loop_without_forward_keeps_time() {
    let mut sim = recorder();
    sim.engine.new_domain("core", 1000).unwrap();
    EventScheduler::process_events(&mut sim, false);
    EventScheduler::process_events(&mut sim, false);
    assert_eq!(0, sim.engine.time());
    assert_eq!(2, sim.engine.no_forward_cycles());
    EventScheduler::process_events(&mut sim, true);
    assert_eq!(1000, sim.engine.time());
}

#[test]
fn scheduling_the_none_event_is_a_no_op() {
    let mut sim = recorder();
    sim.engine.new_domain("core", 1000).unwrap();
    sim.engine.schedule(EV_NONE, 0, 3);
    sim.engine.schedule_end_event(EV_NONE, 0);
    assert_eq!(0, sim.engine.event_count());
    assert_eq!(0, sim.engine.end_event_count());
}

#[test]
#[should_panic(expected = "forgot to register")]
fn scheduling_the_invalid_event_is_fatal() {
    let mut sim = recorder();
    sim.engine.new_domain("core", 1000).unwrap();
    sim.engine.schedule(EV_INVALID, 0, 1);
}

#[test]
#[should_panic(expected = "unknown event id")]
fn scheduling_an_unregistered_id_is_fatal() {
    let mut sim = recorder();
    sim.engine.new_domain("core", 1000).unwrap();
    sim.engine.schedule(42, 0, 1);
}

#[test]
#[should_panic(expected = "invalid frequency domain")]
fn registering_with_unknown_domain_is_fatal() {
    let mut sim = recorder();
    sim.engine.register_event("orphan", 3, record);
}

#[test]
#[should_panic(expected = "after simulation start")]
fn registering_after_start_is_fatal() {
    let mut sim = recorder();
    let d = sim.engine.new_domain("core", 1000).unwrap();
    EventScheduler::process_events(&mut sim, true);
    sim.engine.register_event("late", d, record);
}

#[test]
fn out_of_range_domain_is_an_error() {
    let mut sim = recorder();
    assert!(sim.engine.new_domain("zero", 0).is_err());
    assert_eq!(0, sim.engine.domain_count());
}

#[test]
fn execute_event_runs_immediately() {
    let mut sim = recorder();
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let ev = sim.engine.register_event("ev", d, record);
    EventScheduler::execute_event(&mut sim, ev, 5);
    assert_eq!(vec![(0, ev, 5)], sim.log);
    assert_eq!(0, sim.engine.event_count());
    assert_eq!(1, sim.engine.processed_events());
}

#[test]
fn teardown_runs_end_events_between_two_drains() {
    let mut sim = recorder();
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let ev = sim.engine.register_event("ev", d, record);
    let end = sim.engine.register_event("end", d, move |sim: &mut Recorder, id, payload| {
        record(sim, id, payload);
        sim.engine.schedule(ev, payload + 100, 3);
    });
    sim.engine.schedule(ev, 1, 5);
    sim.engine.schedule_end_event(end, 2);
    EventScheduler::process_all_events(&mut sim);

    let order: Vec<_> = sim.log.iter().map(|&(_, id, p)| (id, p)).collect();
    assert_eq!(vec![(ev, 1), (end, 2), (ev, 102)], order);
    assert_eq!(8000, sim.engine.time());
    assert_eq!(0, sim.engine.event_count());
    assert_eq!(0, sim.engine.end_event_count());
}

#[test]
#[should_panic(expected = "finalization events")]
fn endless_rescheduling_breaches_the_drain_ceiling() {
    let mut sim = recorder_with(EngineConfig {
        max_finalization_events: 50,
        ..EngineConfig::default()
    });
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let ev = sim.engine.register_event("loop", d, reschedule);
    sim.engine.schedule(ev, 0, 1);
    EventScheduler::process_all_events(&mut sim);
}

#[test]
fn drain_at_the_ceiling_is_accepted() {
    let mut sim = recorder_with(EngineConfig {
        max_finalization_events: 3,
        ..EngineConfig::default()
    });
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let ev = sim.engine.register_event("ev", d, record);
    for i in 0..3 {
        sim.engine.schedule(ev, i, 1);
    }
    EventScheduler::process_all_events(&mut sim);
    assert_eq!(3, sim.log.len());
}

#[test]
fn empty_discards_work_scheduled_while_draining() {
    let mut sim = recorder();
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let ev = sim.engine.register_event("loop", d, reschedule);
    sim.engine.schedule(ev, 0, 1);
    sim.engine.schedule(ev, 10, 2);
    EventScheduler::empty(&mut sim);

    assert_eq!(2, sim.log.len());
    assert_eq!(0, sim.engine.event_count());
    assert!(!sim.engine.is_locked());

    // scheduling works again afterwards
    sim.engine.schedule(ev, 20, 1);
    assert_eq!(1, sim.engine.event_count());
}

#[test]
fn overload_warning_does_not_change_behavior() {
    let mut sim = recorder_with(EngineConfig {
        overload_events: 2,
        ..EngineConfig::default()
    });
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let ev = sim.engine.register_event("ev", d, record);
    for i in 0..5 {
        sim.engine.schedule(ev, i, 1);
    }
    run_until_idle(&mut sim);
    assert_eq!(5, sim.log.len());
}

#[test]
fn dump_lists_pending_events_earliest_first() {
    let mut sim = recorder();
    let d = sim.engine.new_domain("core", 1000).unwrap();
    let late = sim.engine.register_event("late", d, record);
    let early = sim.engine.register_event("early", d, record);
    sim.engine.schedule(late, 0, 9);
    sim.engine.schedule(early, 0, 2);
    sim.engine.schedule(early, 0, 3);

    let full = sim.engine.dump(0);
    let first = full.find("'early'").unwrap();
    let last = full.find("'late'").unwrap();
    assert!(first < last);
    assert!(full.contains("total: 3 event(s)"));

    let short = sim.engine.dump(1);
    assert!(short.contains("+ 2 more"));
    assert!(!short.contains("'late'"));
}

#[test]
fn identical_runs_are_identical() {
    let run = || {
        let mut sim = recorder();
        let a = sim.engine.new_domain("a", 1000).unwrap();
        let b = sim.engine.new_domain("b", 700).unwrap();
        let ea = sim.engine.register_event("ea", a, reschedule);
        let eb = sim.engine.register_event("eb", b, record);
        sim.engine.schedule(ea, 0, 0);
        for i in 0..10 {
            sim.engine.schedule(eb, i, (i % 3) as u64);
        }
        for _ in 0..20 {
            EventScheduler::process_events(&mut sim, false);
        }
        sim.log
    };
    assert_eq!(run(), run());
}
