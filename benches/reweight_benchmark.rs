use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ffrw::{
    reweight::{configure, reweight, FitVariables},
    DecayParticle, Engine, PdgId, ReweightOptions, Role, TruthEvent, TruthTable, Vec3, Vec4,
};
use indexmap::IndexMap;

fn make_event(event_number: u64) -> TruthEvent {
    let dst_pz = 100.0 + (event_number % 1500) as f64;
    let particles: IndexMap<Role, DecayParticle> = [
        (Role::B, 511, Vec4::new(0.0, 0.0, 0.0, 5279.65)),
        (Role::Dst, 413, Vec3::new(0.0, 0.0, dst_pz).with_mass(2010.26)),
        (Role::SlowPi, 211, Vec4::new(0.0, 0.0, 40.0, 150.0)),
        (Role::D0, 421, Vec4::new(0.0, 0.0, 300.0, 1890.0)),
        (Role::K, -321, Vec4::new(0.0, 0.0, 150.0, 520.0)),
        (Role::Pi, 211, Vec4::new(0.0, 0.0, 150.0, 200.0)),
        (Role::Mu, 13, Vec4::new(100.0, 0.0, 0.0, 150.0)),
        (Role::Tau, 15, Vec4::new(0.0, 0.0, -dst_pz, 1850.0)),
        (Role::AntiNuMu, -14, Vec4::new(0.0, 100.0, 0.0, 100.0)),
        (Role::AntiNuTau, -16, Vec4::new(0.0, 0.0, -100.0, 100.0)),
        (Role::NuTau, 16, Vec4::new(0.0, -100.0, 0.0, 100.0)),
    ]
    .into_iter()
    .map(|(role, id, p4)| (role, DecayParticle::new(p4, PdgId(id))))
    .collect();
    TruthEvent::new(event_number, 1, particles)
}

fn reweight_benchmark(c: &mut Criterion) {
    let options = ReweightOptions::default();
    let events: Vec<TruthEvent> = (0..1000).map(make_event).collect();
    let table = TruthTable::from_events(&events, options.template.particles).unwrap();
    let mut engine = Engine::new();
    configure(&mut engine, &options).unwrap();
    c.bench_function("reweight 1000 events", |b| {
        b.iter(|| black_box(reweight(&mut engine, &table, &options).unwrap()));
    });
}

fn fit_variables_benchmark(c: &mut Criterion) {
    let options = ReweightOptions::default();
    let variables = FitVariables::new(&options.template, options.units);
    let event = make_event(1);
    c.bench_function("fit variables", |b| {
        b.iter(|| black_box(variables.evaluate(black_box(&event)).unwrap()));
    });
}

criterion_group!(benches, reweight_benchmark, fit_variables_benchmark);
criterion_main!(benches);
