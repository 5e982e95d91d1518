//! End-to-end circuit tests driving the full pipeline: topology analysis,
//! row simplification, factorization, and time stepping.

use approx::{assert_abs_diff_eq, assert_relative_eq};

use mna_core::elements::{
    Capacitor, CurrentSource, Diode, Element, Ground, Inductor, Rail, Resistor, VoltageSource, Wire,
};
use mna_core::{Point, SimError, Simulator};

fn p(x: i32, y: i32) -> Point {
    Point::new(x, y)
}

#[test]
fn voltage_divider() {
    // 10 V source, 1k over 2k: midpoint sits at 10 * 2k / 3k.
    let pa = p(0, 0);
    let pb = p(0, 1);
    let pc = p(1, 1);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(VoltageSource::dc(pa, pb, 10.0)),
        Box::new(Resistor::new(pb, pc, 1000.0)),
        Box::new(Resistor::new(pc, pa, 2000.0)),
    ];

    let mut sim = Simulator::new(5e-6);
    sim.rebuild_topology(elements).unwrap();
    sim.step_time().unwrap();

    let v_mid = sim.element(2).voltage(0);
    assert_relative_eq!(v_mid, 20.0 / 3.0, max_relative = 1e-9);
    // same current through both resistors
    assert_relative_eq!(sim.element(1).current(), 10.0 / 3000.0, max_relative = 1e-9);
    assert_relative_eq!(sim.element(2).current(), 10.0 / 3000.0, max_relative = 1e-9);
    // a linear circuit solves in one pass
    assert_eq!(sim.sub_iterations(), 1);
}

#[test]
fn rc_charging_follows_the_exponential() {
    // 5 V rail through 1k into 1uF: tau = 1 ms.
    let p0 = p(0, 0);
    let p1 = p(1, 0);
    let p2 = p(2, 0);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(Rail::dc(p0, 5.0)),
        Box::new(Resistor::new(p0, p1, 1000.0)),
        Box::new(Capacitor::new(p1, p2, 1e-6)),
        Box::new(Ground::new(p2)),
    ];

    let dt = 1e-6;
    let mut sim = Simulator::new(dt);
    sim.rebuild_topology(elements).unwrap();

    let mut last_v = 0.0;
    for _ in 0..1000 {
        sim.step_time().unwrap();
        let v = sim.element(2).voltage(0);
        // charging is monotonic
        assert!(v >= last_v - 1e-12);
        last_v = v;
    }

    // after one time constant: V (1 - 1/e)
    let expected = 5.0 * (1.0 - (-1.0f64).exp());
    assert_relative_eq!(last_v, expected, max_relative = 1e-4);
}

#[test]
fn shorted_capacitor_is_reset_not_fatal() {
    let p0 = p(0, 0);
    let p1 = p(1, 0);
    let p2 = p(2, 0);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(Rail::dc(p0, 5.0)),
        Box::new(Resistor::new(p0, p1, 1000.0)),
        Box::new(Capacitor::new(p1, p2, 1e-6)),
        Box::new(Wire::new(p1, p2)),
        Box::new(Ground::new(p2)),
    ];

    let mut sim = Simulator::new(1e-6);
    sim.rebuild_topology(elements).unwrap();
    for _ in 0..10 {
        sim.step_time().unwrap();
    }

    // the wire pins both capacitor terminals together
    let v_diff = sim.element(2).voltage(0) - sim.element(2).voltage(1);
    assert_abs_diff_eq!(v_diff, 0.0, epsilon = 1e-9);
}

#[test]
fn capacitor_source_loop_is_fatal() {
    let p1 = p(0, 0);
    let p2 = p(1, 0);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(VoltageSource::dc(p1, p2, 5.0)),
        Box::new(Capacitor::new(p1, p2, 1e-6)),
    ];

    let mut sim = Simulator::new(1e-6);
    assert_eq!(sim.rebuild_topology(elements), Err(SimError::CapacitorLoop));
}

#[test]
fn voltage_source_wire_loop_is_fatal_and_sticky() {
    let p1 = p(0, 0);
    let p2 = p(1, 0);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(VoltageSource::dc(p1, p2, 5.0)),
        Box::new(Wire::new(p1, p2)),
    ];

    let mut sim = Simulator::new(1e-6);
    assert_eq!(
        sim.rebuild_topology(elements),
        Err(SimError::VoltageSourceLoop)
    );
    assert_eq!(sim.step_time(), Err(SimError::VoltageSourceLoop));
    assert_eq!(sim.step_time(), Err(SimError::VoltageSourceLoop));
}

#[test]
fn dangling_inductor_is_reset() {
    let mut ind = Inductor::new(p(0, 0), p(1, 0), 1e-3);
    ind.current = 1.0; // stale state from a previous topology
    let elements: Vec<Box<dyn Element>> = vec![Box::new(ind)];

    let mut sim = Simulator::new(1e-6);
    sim.rebuild_topology(elements).unwrap();
    assert_eq!(sim.element(0).current(), 0.0);

    // the leak resistors keep the system solvable
    sim.step_time().unwrap();
    assert_abs_diff_eq!(sim.element(0).current(), 0.0, epsilon = 1e-12);
}

#[test]
fn current_source_without_return_path_is_fatal() {
    let elements: Vec<Box<dyn Element>> =
        vec![Box::new(CurrentSource::new(p(0, 0), p(1, 0), 1e-3))];

    let mut sim = Simulator::new(1e-6);
    assert_eq!(sim.rebuild_topology(elements), Err(SimError::NoCurrentPath));
}

#[test]
fn current_source_drives_a_resistor() {
    // 1 mA into 1k: 1 V across the resistor.
    let p1 = p(0, 0);
    let p2 = p(1, 0);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(CurrentSource::new(p1, p2, 1e-3)),
        Box::new(Resistor::new(p1, p2, 1000.0)),
        Box::new(Ground::new(p1)),
    ];

    let mut sim = Simulator::new(1e-6);
    sim.rebuild_topology(elements).unwrap();
    sim.step_time().unwrap();

    let v = sim.element(1).voltage(1) - sim.element(1).voltage(0);
    assert_relative_eq!(v, 1.0, max_relative = 1e-9);
}

#[test]
fn diode_resistor_circuit_converges() {
    // 5 V rail, 1k series resistor, diode to ground.
    let p0 = p(0, 0);
    let p1 = p(1, 0);
    let p2 = p(2, 0);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(Rail::dc(p0, 5.0)),
        Box::new(Resistor::new(p0, p1, 1000.0)),
        Box::new(Diode::new(p1, p2)),
        Box::new(Ground::new(p2)),
    ];

    let mut sim = Simulator::new(1e-6);
    sim.rebuild_topology(elements).unwrap();
    sim.step_time().unwrap();

    // Newton iteration takes more than one pass
    assert!(sim.sub_iterations() > 1);

    // forward drop in the plausible silicon-ish range
    let vd = sim.element(2).voltage(0);
    assert!(vd > 0.4 && vd < 0.9, "diode drop out of range: {}", vd);

    // KCL at the middle node: resistor and diode currents agree
    let i_r = sim.element(1).current();
    let i_d = sim.element(2).current();
    assert_relative_eq!(i_r, (5.0 - vd) / 1000.0, max_relative = 1e-9);
    assert_abs_diff_eq!(i_r, i_d, epsilon = 5e-4);
}

#[test]
fn sine_rail_tracks_its_waveform() {
    let p0 = p(0, 0);
    let p1 = p(1, 0);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(Rail::new(
            p0,
            mna_core::elements::Waveform::Sine {
                amplitude: 3.0,
                frequency: 1000.0,
                offset: 0.0,
                phase: 0.0,
            },
        )),
        Box::new(Resistor::new(p0, p1, 1000.0)),
        Box::new(Ground::new(p1)),
    ];

    let mut sim = Simulator::new(1e-6);
    sim.rebuild_topology(elements).unwrap();

    // one full period; the rail voltage must reach the amplitude
    let mut peak = 0.0f64;
    for _ in 0..1000 {
        sim.step_time().unwrap();
        peak = peak.max(sim.element(0).voltage(0));
    }
    assert_relative_eq!(peak, 3.0, max_relative = 1e-3);
}

#[test]
fn wires_merge_into_one_electrical_node() {
    // source -> wire -> wire -> resistor -> back: the full source voltage
    // appears across the resistor despite the intervening wires.
    let pts: Vec<Point> = (0..4).map(|x| p(x, 0)).collect();
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(VoltageSource::dc(pts[0], pts[1], 2.0)),
        Box::new(Wire::new(pts[1], pts[2])),
        Box::new(Wire::new(pts[2], pts[3])),
        Box::new(Resistor::new(pts[3], pts[0], 500.0)),
    ];

    let mut sim = Simulator::new(1e-6);
    sim.rebuild_topology(elements).unwrap();
    sim.step_time().unwrap();

    let v = sim.element(3).voltage(0) - sim.element(3).voltage(1);
    assert_relative_eq!(v, 2.0, max_relative = 1e-9);
    assert_relative_eq!(sim.element(3).current(), 2.0 / 500.0, max_relative = 1e-9);
}

#[test]
fn rl_current_rises_toward_steady_state() {
    // 5 V rail, 1k, 100 mH: tau = 0.1 ms, steady state 5 mA.
    let p0 = p(0, 0);
    let p1 = p(1, 0);
    let p2 = p(2, 0);
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(Rail::dc(p0, 5.0)),
        Box::new(Resistor::new(p0, p1, 1000.0)),
        Box::new(Inductor::new(p1, p2, 0.1)),
        Box::new(Ground::new(p2)),
    ];

    let dt = 1e-7;
    let mut sim = Simulator::new(dt);
    sim.rebuild_topology(elements).unwrap();

    // step to one time constant
    for _ in 0..1000 {
        sim.step_time().unwrap();
    }
    let expected = 5.0e-3 * (1.0 - (-1.0f64).exp());
    assert_relative_eq!(sim.element(2).current(), expected, max_relative = 1e-4);
}
