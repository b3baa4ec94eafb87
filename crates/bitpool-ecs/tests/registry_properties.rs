//! Property tests for registry operations.
//!
//! These tests generate random sequences of entity and component operations
//! and verify that the registry agrees with a simple model after each one:
//! the roster, per-entity components, pool counts and view results.

use std::collections::HashMap;

use bitpool_ecs::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Pos(i64);

#[derive(Debug, Clone, PartialEq)]
struct Vel(i64);

#[derive(Debug, Clone, PartialEq)]
struct Label(String);

const CAPACITY: usize = 24;

/// Operations we can perform on the registry.
#[derive(Debug, Clone)]
enum RegistryOp {
    Create,
    Remove(usize),
    AddPos(usize, i64),
    AddVel(usize, i64),
    AddLabel(usize, String),
    RemovePos(usize),
    RemoveVel(usize),
    CloneEntity(usize),
    Retain(usize),
    Release(usize),
    Step,
}

fn registry_op_strategy() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        3 => Just(RegistryOp::Create),
        1 => (0..40usize).prop_map(RegistryOp::Remove),
        2 => (0..40usize, -100i64..100).prop_map(|(i, v)| RegistryOp::AddPos(i, v)),
        2 => (0..40usize, -10i64..10).prop_map(|(i, v)| RegistryOp::AddVel(i, v)),
        1 => (0..40usize, "[a-z]{1,6}").prop_map(|(i, s)| RegistryOp::AddLabel(i, s)),
        1 => (0..40usize).prop_map(RegistryOp::RemovePos),
        1 => (0..40usize).prop_map(RegistryOp::RemoveVel),
        1 => (0..40usize).prop_map(RegistryOp::CloneEntity),
        1 => (0..40usize).prop_map(RegistryOp::Retain),
        1 => (0..40usize).prop_map(RegistryOp::Release),
        1 => Just(RegistryOp::Step),
    ]
}

#[derive(Debug, Clone, Default)]
struct ModelEntity {
    pos: Option<i64>,
    vel: Option<i64>,
    label: Option<String>,
    holders: u32,
}

#[derive(Debug, Default)]
struct Model {
    roster: Vec<EntityId>,
    entities: HashMap<EntityId, ModelEntity>,
    /// Every id ever handed out, so ops can target dead entities too.
    history: Vec<EntityId>,
}

impl Model {
    fn pick(&self, i: usize) -> Option<EntityId> {
        if self.history.is_empty() {
            None
        } else {
            Some(self.history[i % self.history.len()])
        }
    }

    fn count_of(&self, f: impl Fn(&ModelEntity) -> bool) -> usize {
        self.entities.values().filter(|m| f(m)).count()
    }

    fn destroy(&mut self, e: EntityId) {
        self.entities.remove(&e);
        self.roster.retain(|&r| r != e);
    }
}

/// Every live entity's `T` sits in an occupied slot that no other entity
/// claims, and the pool holds nothing else.
fn slots_are_exclusive<T: Component>(reg: &Registry, roster: &[EntityId]) -> bool {
    let mut owned: Vec<usize> = roster
        .iter()
        .filter_map(|&e| reg.slot_of::<T>(e).ok().flatten())
        .collect();
    let Ok(pool) = reg.pool::<T>() else {
        return owned.is_empty();
    };
    owned.sort_unstable();
    let claimed = owned.len();
    owned.dedup();
    owned.len() == claimed
        && owned.iter().all(|&slot| pool.is_occupied(slot))
        && pool.occupied_slots().eq(owned.iter().copied())
}

fn check(reg: &Registry, model: &Model) -> Result<(), TestCaseError> {
    prop_assert_eq!(reg.entities(), model.roster.as_slice());
    prop_assert_eq!(reg.count(), model.entities.len());

    for &e in &model.history {
        match model.entities.get(&e) {
            Some(m) => {
                prop_assert!(reg.is_alive(e));
                prop_assert_eq!(reg.get_component::<Pos>(e).ok().map(|p| p.0), m.pos);
                prop_assert_eq!(reg.get_component::<Vel>(e).ok().map(|v| v.0), m.vel);
                prop_assert_eq!(
                    reg.get_component::<Label>(e).ok().map(|l| l.0.clone()),
                    m.label.clone()
                );
                prop_assert_eq!(reg.holders(e), Some(m.holders));
            }
            None => prop_assert!(!reg.is_alive(e)),
        }
    }

    prop_assert!(slots_are_exclusive::<Pos>(reg, &model.roster));
    prop_assert!(slots_are_exclusive::<Vel>(reg, &model.roster));
    prop_assert!(slots_are_exclusive::<Label>(reg, &model.roster));

    if let Ok(pool) = reg.pool::<Pos>() {
        prop_assert_eq!(pool.count(), model.count_of(|m| m.pos.is_some()));
    }
    if let Ok(pool) = reg.pool::<Vel>() {
        prop_assert_eq!(pool.count(), model.count_of(|m| m.vel.is_some()));
    }

    let expected: Vec<EntityId> = model
        .roster
        .iter()
        .copied()
        .filter(|e| {
            let m = &model.entities[e];
            m.pos.is_some() && m.vel.is_some()
        })
        .collect();
    prop_assert_eq!(reg.view::<(&Pos, &Vel)>().entities(), expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn registry_random_ops_match_model(ops in prop::collection::vec(registry_op_strategy(), 1..80)) {
        let mut reg = Registry::with_max_components(CAPACITY);
        let mut model = Model::default();

        for op in ops {
            match op {
                RegistryOp::Create => {
                    let e = reg.create();
                    model.roster.push(e);
                    model.history.push(e);
                    model.entities.insert(e, ModelEntity { holders: 1, ..Default::default() });
                }
                RegistryOp::Remove(i) => {
                    if let Some(e) = model.pick(i) {
                        let was_alive = model.entities.contains_key(&e);
                        prop_assert_eq!(reg.remove(e), was_alive);
                        model.destroy(e);
                    }
                }
                RegistryOp::AddPos(i, v) => {
                    if let Some(e) = model.pick(i) {
                        let result = reg.add_component(e, Pos(v)).map(|p| p.0);
                        match model.entities.get_mut(&e) {
                            None => prop_assert!(matches!(result, Err(EcsError::UseAfterFree { .. })), "got {result:?}"),
                            Some(m) if m.pos.is_some() => {
                                prop_assert!(matches!(result, Err(EcsError::DuplicateComponent { .. })), "got {result:?}");
                            }
                            Some(m) => match result {
                                Ok(stored) => {
                                    prop_assert_eq!(stored, v);
                                    m.pos = Some(v);
                                }
                                Err(err) => prop_assert!(matches!(err, EcsError::CapacityExceeded { .. }), "got {err}"),
                            },
                        }
                    }
                }
                RegistryOp::AddVel(i, v) => {
                    if let Some(e) = model.pick(i) {
                        let result = reg.add_component(e, Vel(v)).map(|_| ());
                        if let Some(m) = model.entities.get_mut(&e) {
                            if m.vel.is_none() && result.is_ok() {
                                m.vel = Some(v);
                            }
                        }
                    }
                }
                RegistryOp::AddLabel(i, s) => {
                    if let Some(e) = model.pick(i) {
                        let result = reg.add_component(e, Label(s.clone())).map(|_| ());
                        if let Some(m) = model.entities.get_mut(&e) {
                            if m.label.is_none() && result.is_ok() {
                                m.label = Some(s);
                            }
                        }
                    }
                }
                RegistryOp::RemovePos(i) => {
                    if let Some(e) = model.pick(i) {
                        let result = reg.remove_component::<Pos>(e).map(|p| p.0);
                        match model.entities.get_mut(&e) {
                            None => prop_assert!(matches!(result, Err(EcsError::UseAfterFree { .. })), "got {result:?}"),
                            Some(m) => match m.pos.take() {
                                Some(v) => prop_assert_eq!(result.ok(), Some(v)),
                                None => prop_assert!(matches!(result, Err(EcsError::MissingComponent { .. })), "got {result:?}"),
                            },
                        }
                    }
                }
                RegistryOp::RemoveVel(i) => {
                    if let Some(e) = model.pick(i) {
                        let result = reg.remove_component::<Vel>(e).map(|v| v.0);
                        if let Some(m) = model.entities.get_mut(&e) {
                            prop_assert_eq!(result.ok(), m.vel.take());
                        }
                    }
                }
                RegistryOp::CloneEntity(i) => {
                    if let Some(e) = model.pick(i) {
                        let before = reg.count();
                        match (reg.clone_entity(e), model.entities.get(&e).cloned()) {
                            (Ok(copy), Some(source)) => {
                                model.roster.push(copy);
                                model.history.push(copy);
                                model.entities.insert(copy, ModelEntity { holders: 1, ..source });
                            }
                            (Err(EcsError::CapacityExceeded { .. }), Some(_)) => {
                                prop_assert_eq!(reg.count(), before);
                            }
                            (Err(EcsError::UseAfterFree { .. }), None) => {}
                            (result, source) => {
                                prop_assert!(false, "clone gave {result:?} for {source:?}");
                            }
                        }
                    }
                }
                RegistryOp::Retain(i) => {
                    if let Some(e) = model.pick(i) {
                        let result = reg.retain(e);
                        match model.entities.get_mut(&e) {
                            Some(m) => {
                                prop_assert!(result.is_ok());
                                m.holders += 1;
                            }
                            None => prop_assert!(result.is_err()),
                        }
                    }
                }
                RegistryOp::Release(i) => {
                    if let Some(e) = model.pick(i) {
                        let destroyed = reg.release(e);
                        let expect_destroyed = match model.entities.get_mut(&e) {
                            Some(m) => {
                                m.holders -= 1;
                                m.holders == 0
                            }
                            None => false,
                        };
                        prop_assert_eq!(destroyed, expect_destroyed);
                        if expect_destroyed {
                            model.destroy(e);
                        }
                    }
                }
                RegistryOp::Step => {
                    reg.view_mut::<(&mut Pos, &Vel)>().each(|(p, v)| p.0 += v.0);
                    for m in model.entities.values_mut() {
                        if let (Some(p), Some(v)) = (m.pos.as_mut(), m.vel) {
                            *p += v;
                        }
                    }
                }
            }
            check(&reg, &model)?;
        }
    }
}
