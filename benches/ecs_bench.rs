//! Benchmarks for core runtime operations
//!
//! Run with: cargo bench
//!
//! Measures entity creation, structural churn, serial chunk iteration and
//! scheduled parallel execution. This is an example host; the library core
//! carries no timing code of its own.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice::{
    ComponentDesc, ComponentId, Query, QueryDesc, Schedule, ScheduleEntry, World, WorldConfig,
};

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

fn movement_world(entity_count: u32) -> (World, ComponentId, ComponentId) {
    let mut world = World::new(WorldConfig {
        initial_entity_capacity: entity_count,
        ..Default::default()
    })
    .unwrap();
    let position = world
        .register_component(&ComponentDesc::for_type::<Position>("Position"))
        .unwrap();
    let velocity = world
        .register_component(&ComponentDesc::for_type::<Velocity>("Velocity"))
        .unwrap();

    for i in 0..entity_count {
        let entity = world.create_entity().unwrap();
        let p = Position {
            x: i as f32,
            y: 0.0,
            z: 0.0,
        };
        let v = Velocity {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        };
        world
            .add_component(entity, position, Some(bytemuck::bytes_of(&p)))
            .unwrap();
        world
            .add_component(entity, velocity, Some(bytemuck::bytes_of(&v)))
            .unwrap();
    }
    (world, position, velocity)
}

fn bench_entity_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_churn");

    group.bench_function("create_1k", |b| {
        b.iter(|| {
            let mut world = World::with_defaults().unwrap();
            for _ in 0..1_000 {
                black_box(world.create_entity().unwrap());
            }
        });
    });

    group.bench_function("create_destroy_recreate_1k", |b| {
        b.iter(|| {
            let mut world = World::with_defaults().unwrap();
            let entities: Vec<_> = (0..1_000)
                .map(|_| world.create_entity().unwrap())
                .collect();
            for entity in &entities {
                world.destroy_entity(*entity).unwrap();
            }
            for _ in 0..1_000 {
                black_box(world.create_entity().unwrap());
            }
        });
    });

    group.finish();
}

fn bench_structural(c: &mut Criterion) {
    let mut group = c.benchmark_group("structural");

    group.bench_function("add_remove_1k", |b| {
        let (mut world, position, _) = movement_world(1_000);
        let extra = world
            .register_component(&ComponentDesc::for_type::<u64>("Extra"))
            .unwrap();
        let entities = world.live_entities();
        b.iter(|| {
            for &entity in &entities {
                world
                    .add_component(entity, extra, Some(&7u64.to_ne_bytes()))
                    .unwrap();
            }
            for &entity in &entities {
                world.remove_component(entity, extra).unwrap();
            }
        });
        black_box(position);
    });

    group.bench_function("deferred_add_remove_1k", |b| {
        let (mut world, _, _) = movement_world(1_000);
        let extra = world
            .register_component(&ComponentDesc::for_type::<u64>("Extra"))
            .unwrap();
        let entities = world.live_entities();
        b.iter(|| {
            world.begin_defer().unwrap();
            for &entity in &entities {
                world
                    .add_component(entity, extra, Some(&7u64.to_ne_bytes()))
                    .unwrap();
            }
            world.end_defer().unwrap();
            world.flush().unwrap();
            world.begin_defer().unwrap();
            for &entity in &entities {
                world.remove_component(entity, extra).unwrap();
            }
            world.end_defer().unwrap();
            world.flush().unwrap();
        });
    });

    group.finish();
}

fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("iteration");

    for &entity_count in &[1_000u32, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("serial_integrate", entity_count),
            &entity_count,
            |b, &entity_count| {
                let (mut world, position, velocity) = movement_world(entity_count);
                let mut query = Query::new(
                    &world,
                    &QueryDesc::new().with_write(position).with_read(velocity),
                )
                .unwrap();
                b.iter(|| {
                    let mut iter = query.iter(&mut world).unwrap();
                    while let Some(mut view) = iter.next() {
                        let mut columns = view.columns_mut().into_iter();
                        let positions: &mut [Position] =
                            bytemuck::cast_slice_mut(columns.next().unwrap().into_bytes_mut());
                        let velocities: &[Velocity] =
                            bytemuck::cast_slice(columns.next().unwrap().into_bytes());
                        for row in 0..positions.len() {
                            positions[row].x += velocities[row].x * (1.0 / 60.0);
                            positions[row].y += velocities[row].y * (1.0 / 60.0);
                            positions[row].z += velocities[row].z * (1.0 / 60.0);
                        }
                    }
                });
            },
        );

        for &workers in &[2u32, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("parallel_integrate_w{workers}"), entity_count),
                &entity_count,
                |b, &entity_count| {
                    let (mut world, position, velocity) = movement_world(entity_count);
                    let mut query = Query::new(
                        &world,
                        &QueryDesc::new().with_write(position).with_read(velocity),
                    )
                    .unwrap();
                    b.iter(|| {
                        query
                            .for_each_chunk_parallel(&mut world, workers, |view, _| {
                                let mut columns = view.columns_mut().into_iter();
                                let positions: &mut [Position] = bytemuck::cast_slice_mut(
                                    columns.next().unwrap().into_bytes_mut(),
                                );
                                let velocities: &[Velocity] =
                                    bytemuck::cast_slice(columns.next().unwrap().into_bytes());
                                for row in 0..positions.len() {
                                    positions[row].x += velocities[row].x * (1.0 / 60.0);
                                    positions[row].y += velocities[row].y * (1.0 / 60.0);
                                    positions[row].z += velocities[row].z * (1.0 / 60.0);
                                }
                            })
                            .unwrap();
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");

    group.bench_function("motion_health_damp_10k_w4", |b| {
        let (mut world, position, velocity) = movement_world(10_000);
        let health = world
            .register_component(&ComponentDesc::for_type::<f32>("Health"))
            .unwrap();
        for entity in world.live_entities() {
            world
                .add_component(entity, health, Some(&100.0f32.to_ne_bytes()))
                .unwrap();
        }

        let mut motion_query = Query::new(
            &world,
            &QueryDesc::new().with_write(position).with_read(velocity),
        )
        .unwrap();
        let mut health_query =
            Query::new(&world, &QueryDesc::new().with_write(health)).unwrap();
        let mut damp_query =
            Query::new(&world, &QueryDesc::new().with_write(velocity)).unwrap();

        let mut schedule = Schedule::new(vec![
            ScheduleEntry::new(&mut motion_query, |view, _| {
                let mut columns = view.columns_mut().into_iter();
                let positions: &mut [Position] =
                    bytemuck::cast_slice_mut(columns.next().unwrap().into_bytes_mut());
                let velocities: &[Velocity] =
                    bytemuck::cast_slice(columns.next().unwrap().into_bytes());
                for row in 0..positions.len() {
                    positions[row].x += velocities[row].x * (1.0 / 60.0);
                }
            }),
            ScheduleEntry::new(&mut health_query, |view, _| {
                let mut columns = view.columns_mut().into_iter();
                let healths: &mut [f32] =
                    bytemuck::cast_slice_mut(columns.next().unwrap().into_bytes_mut());
                for value in healths {
                    *value -= 0.05;
                }
            }),
            ScheduleEntry::new(&mut damp_query, |view, _| {
                let mut columns = view.columns_mut().into_iter();
                let velocities: &mut [Velocity] =
                    bytemuck::cast_slice_mut(columns.next().unwrap().into_bytes_mut());
                for value in velocities {
                    value.x *= 0.999;
                    value.y *= 0.999;
                    value.z *= 0.999;
                }
            }),
        ])
        .unwrap();

        b.iter(|| {
            black_box(schedule.execute(&mut world, 4).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_entity_churn,
    bench_structural,
    bench_iteration,
    bench_schedule
);
criterion_main!(benches);
