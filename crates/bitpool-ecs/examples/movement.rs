//! Small simulation: a handful of entities move, some are cloned and some
//! despawn when they leave the arena.
//!
//! Run with `RUST_LOG=bitpool_ecs=debug cargo run --example movement` to see
//! pool and entity lifecycle events.

use bitpool_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct Name(String);

const ARENA: i32 = 20;
const TICKS: usize = 8;

fn spawn(registry: &mut Registry, name: &str, pos: Position, vel: Option<Velocity>) -> anyhow::Result<EntityId> {
    let e = registry.create();
    let mut handle = registry.entity_mut(e)?.with(Name(name.to_owned()))?.with(pos)?;
    if let Some(vel) = vel {
        handle.add(vel)?;
    }
    Ok(e)
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = RegistryConfig::from_json(r#"{ "max_components_per_type": 16 }"#)?;
    let mut registry = Registry::with_config(config);

    let runner = spawn(&mut registry, "runner", Position { x: 5, y: 3 }, Some(Velocity { x: 1, y: 6 }))?;
    spawn(&mut registry, "drifter", Position { x: 0, y: 0 }, Some(Velocity { x: 3, y: 1 }))?;
    spawn(&mut registry, "tower", Position { x: 10, y: 10 }, None)?;

    let twin = registry.clone_entity(runner)?;
    registry.get_component_mut::<Name>(twin)?.0 = "runner-twin".to_owned();
    registry.get_component_mut::<Velocity>(twin)?.x = -2;

    for tick in 0..TICKS {
        registry
            .view_mut::<(&mut Position, &Velocity)>()
            .each(|(pos, vel)| {
                pos.x += vel.x;
                pos.y += vel.y;
            });

        let escaped: Vec<EntityId> = registry
            .view::<(&Position,)>()
            .iter_with_entity()
            .filter(|(_, (pos,))| pos.x.abs() > ARENA || pos.y.abs() > ARENA)
            .map(|(e, _)| e)
            .collect();

        for e in escaped {
            let name = registry.get_component::<Name>(e)?.0.clone();
            println!("tick {tick}: {name} left the arena");
            registry.remove(e);
        }
    }

    println!("{} entities remain:", registry.count());
    for (e, (name, pos)) in registry.view::<(&Name, &Position)>().iter_with_entity() {
        println!("  {e} {:<12} at ({}, {})", name.0, pos.x, pos.y);
    }
    let positions = registry.pool::<Position>()?;
    println!(
        "position pool: {}/{} slots used, next free {}",
        positions.count(),
        positions.capacity(),
        positions.next_free()
    );
    Ok(())
}
