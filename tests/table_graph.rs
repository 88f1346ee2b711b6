use archetable::engine::attribute::{AttributeRegistry, Bundle};
use archetable::engine::entity::EntityIndex;
use archetable::engine::error::ECSError;
use archetable::engine::graph::TableRegistry;
use archetable::engine::types::Type;

mod common;
use common::{Health, Position, Velocity};

fn registry() -> (AttributeRegistry, u32, u32, u32) {
    common::init_logging();
    let mut attributes = AttributeRegistry::new();
    let position = attributes.register::<Position>("Position");
    let velocity = attributes.register::<Velocity>("Velocity");
    let frozen = attributes.register_tag("Frozen");
    (attributes, position, velocity, frozen)
}

#[test]
fn root_table_exists_from_the_start() {
    let (attributes, ..) = registry();
    let tables = TableRegistry::new(&attributes);
    assert_eq!(tables.count(), 1);
    assert_eq!(tables.find(&Type::new()), Some(tables.root()));
    assert!(tables.get(tables.root()).unwrap().ty().is_empty());
}

#[test]
fn each_type_maps_to_one_table() {
    let (attributes, position, velocity, _) = registry();
    let mut tables = TableRegistry::new(&attributes);

    let a = tables.find_or_create(&Type::from([velocity, position]), &attributes).unwrap();
    let b = tables.find_or_create(&Type::from([position, velocity, position]), &attributes).unwrap();
    assert_eq!(a, b);
    assert_eq!(tables.count(), 2);
    assert_eq!(tables.generation(), 1);
}

#[test]
fn unknown_attribute_leaves_registry_untouched() {
    let (attributes, position, ..) = registry();
    let mut tables = TableRegistry::new(&attributes);

    let err = tables.find_or_create(&Type::from([position, 77]), &attributes).unwrap_err();
    assert!(matches!(err, ECSError::UnknownAttribute(e) if e.attribute == 77));
    assert_eq!(tables.count(), 1);
    assert_eq!(tables.generation(), 0);
}

#[test]
fn transitions_are_memoized_with_backlinks() {
    let (attributes, position, velocity, _) = registry();
    let mut tables = TableRegistry::new(&attributes);
    let root = tables.root();

    let p = tables.traverse_add(root, &[position], &attributes).unwrap();
    let pv = tables.traverse_add(p, &[velocity], &attributes).unwrap();
    let generation = tables.generation();

    assert_eq!(tables.traverse_add(root, &[position], &attributes).unwrap(), p);
    assert_eq!(tables.traverse_add(root, &[position, velocity], &attributes).unwrap(), pv);
    assert_eq!(tables.generation(), generation);

    let edge = tables.get(root).unwrap().edge(position).unwrap();
    assert_eq!(edge.add, Some(p));
    let back = tables.get(p).unwrap().edge(position).unwrap();
    assert_eq!(back.remove, Some(root));
    assert!(tables.get(pv).unwrap().incoming().contains(&(p, velocity)));

    assert_eq!(tables.traverse_remove(pv, &[velocity], &attributes).unwrap(), p);
}

#[test]
fn adding_a_present_attribute_is_a_self_edge() {
    let (attributes, position, _, frozen) = registry();
    let mut tables = TableRegistry::new(&attributes);
    let p = tables.find_or_create(&Type::from([position]), &attributes).unwrap();

    assert_eq!(tables.traverse_add(p, &[position], &attributes).unwrap(), p);
    assert_eq!(tables.get(p).unwrap().edge(position).unwrap().add, Some(p));
    assert_eq!(tables.traverse_remove(p, &[frozen], &attributes).unwrap(), p);
}

#[test]
fn traverse_removes_before_adding() {
    let (attributes, position, velocity, frozen) = registry();
    let mut tables = TableRegistry::new(&attributes);
    let pf = tables.find_or_create(&Type::from([position, frozen]), &attributes).unwrap();

    let to = tables.traverse(pf, &[velocity], &[frozen], &attributes).unwrap();
    assert_eq!(tables.get(to).unwrap().ty(), &Type::from([position, velocity]));
}

#[test]
fn merge_moves_rows_and_repoints_records() {
    let (attributes, position, velocity, _) = registry();
    let mut tables = TableRegistry::new(&attributes);
    let mut entities = EntityIndex::new();

    let p = tables.find_or_create(&Type::from([position]), &attributes).unwrap();
    let pv = tables.find_or_create(&Type::from([position, velocity]), &attributes).unwrap();

    let mut moved = Vec::new();
    for i in 0..3 {
        let table = tables.get_mut(p).unwrap();
        let e = entities.create(p, table.count() as u32);
        let row = table.push_entity(e);
        table.set_dyn(row, position, Box::new(Position { x: i as f32, y: 0.0 })).unwrap();
        moved.push(e);
    }
    let resident = entities.create(pv, 0);
    tables.get_mut(pv).unwrap().push_entity(resident);

    assert_eq!(tables.merge(pv, p, &mut entities).unwrap(), 3);
    assert!(tables.get(p).unwrap().is_empty());

    let destination = tables.get(pv).unwrap();
    assert_eq!(destination.count(), 4);
    for (i, e) in moved.iter().enumerate() {
        let record = entities.get(*e).unwrap();
        assert_eq!(record.table, pv);
        assert_eq!(record.row, i as u32 + 1);
        let column = destination.column::<Position>(position).unwrap();
        assert_eq!(column.get(record.row as usize).unwrap().x, i as f32);
        let filled = destination.column::<Velocity>(velocity).unwrap();
        assert_eq!(filled.get(record.row as usize), Some(&Velocity::default()));
    }
}

#[test]
fn merge_into_root_drops_column_data() {
    let (attributes, position, ..) = registry();
    let mut tables = TableRegistry::new(&attributes);
    let mut entities = EntityIndex::new();
    let p = tables.find_or_create(&Type::from([position]), &attributes).unwrap();

    let e = entities.create(p, 0);
    tables.get_mut(p).unwrap().push_entity(e);

    let root = tables.root();
    assert_eq!(tables.merge(root, p, &mut entities).unwrap(), 1);
    assert_eq!(tables.get(p).unwrap().column::<Position>(position).unwrap().len(), 0);
    assert_eq!(entities.get(e).unwrap().table, root);
}

#[test]
fn invalidate_removes_table_and_edges() {
    let (attributes, position, velocity, _) = registry();
    let mut tables = TableRegistry::new(&attributes);
    let root = tables.root();

    let p = tables.traverse_add(root, &[position], &attributes).unwrap();
    let pv = tables.traverse_add(p, &[velocity], &attributes).unwrap();
    let generation = tables.generation();

    assert!(!tables.invalidate(root));
    assert!(tables.invalidate(pv));
    assert_eq!(tables.generation(), generation + 1);
    assert!(tables.get(pv).is_none());
    assert_eq!(tables.find(&Type::from([position, velocity])), None);
    assert!(tables.get(p).unwrap().edge(velocity).unwrap().add.is_none());
    assert!(tables.get(p).unwrap().incoming().iter().all(|(t, _)| *t != pv));

    let again = tables.traverse_add(p, &[velocity], &attributes).unwrap();
    assert_eq!(tables.get(again).unwrap().ty(), &Type::from([position, velocity]));
}

#[test]
fn invalidate_refuses_populated_tables() {
    let (attributes, position, ..) = registry();
    let mut tables = TableRegistry::new(&attributes);
    let mut entities = EntityIndex::new();
    let p = tables.find_or_create(&Type::from([position]), &attributes).unwrap();

    let e = entities.create(p, 0);
    tables.get_mut(p).unwrap().push_entity(e);
    assert!(!tables.invalidate(p));
    assert!(!tables.invalidate(999));

    tables.clear_table(p).unwrap();
    assert!(tables.invalidate(p));
}

#[test]
fn single_entity_moves_keep_other_rows_addressable() {
    let (mut world, ids) = common::setup_world();
    let movers = common::spawn_movers(&mut world, &ids, 3).unwrap();

    world.add(movers[0], ids.frozen).unwrap();
    assert!(world.has(movers[0], ids.frozen));
    assert_eq!(world.get::<Position>(movers[0], ids.position).unwrap().x, 0.0);

    for (i, e) in movers.iter().enumerate().skip(1) {
        assert_eq!(world.get::<Position>(*e, ids.position).unwrap().x, i as f32);
    }

    world.remove(movers[0], ids.velocity).unwrap();
    assert_eq!(world.type_of(movers[0]).unwrap(), &Type::from([ids.position, ids.frozen]));

    world.delete(movers[2]).unwrap();
    assert!(!world.is_alive(movers[2]));
    assert_eq!(world.get::<Position>(movers[1], ids.position).unwrap().x, 1.0);
    assert_eq!(world.entity_count(), 2);
}

#[test]
fn set_checks_the_value_type() {
    let (mut world, ids) = common::setup_world();
    let e = world.spawn(Bundle::new().tag(ids.frozen)).unwrap();

    world.set(e, ids.health, Health(9)).unwrap();
    assert_eq!(world.get::<Health>(e, ids.health), Some(&Health(9)));

    let err = world.set(e, ids.health, 9_i64).unwrap_err();
    assert!(matches!(err, ECSError::TypeMismatch(_)));

    world.delete(e).unwrap();
    let stale = world.set(e, ids.health, Health(1)).unwrap_err();
    assert!(matches!(stale, ECSError::StaleEntity(_)));
}

#[test]
fn refused_spawn_creates_no_table() {
    let (mut world, ids) = common::setup_world();
    let tables = world.tables().count();
    let generation = world.tables().generation();

    let err = world
        .spawn(Bundle::new().with(ids.position, Health(3)).with(ids.velocity, Velocity::default()))
        .unwrap_err();
    assert!(matches!(err, ECSError::TypeMismatch(_)));

    let err = world.spawn(Bundle::new().with(ids.position, Position::default()).tag(777)).unwrap_err();
    assert!(matches!(err, ECSError::UnknownAttribute(_)));

    assert_eq!(world.tables().count(), tables);
    assert_eq!(world.tables().generation(), generation);
    assert_eq!(world.entity_count(), 0);
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Armor(u32);

#[test]
fn attributes_can_be_registered_under_chosen_ids() {
    let (mut world, ids) = common::setup_world();
    let registry = world.attributes_mut();

    assert_eq!(registry.register_with_id::<Armor>(500, "Armor").unwrap(), 500);
    assert_eq!(registry.register_with_id::<Armor>(500, "Armor").unwrap(), 500);
    assert_eq!(registry.register_tag_with_id(600, "Marked"), 600);

    assert_eq!(registry.id_of::<Armor>(), Some(500));
    assert_eq!(registry.lookup("Armor"), Some(500));
    assert_eq!(registry.lookup("Marked"), Some(600));
    assert!(!registry.contains(550));

    let err = registry.register_with_id::<Health>(500, "Armor").unwrap_err();
    assert!(matches!(err, ECSError::TypeMismatch(_)));
    let err = registry.register_with_id::<Armor>(600, "Marked").unwrap_err();
    assert!(matches!(err, ECSError::TypeMismatch(_)));

    let next = world.register_tag("Later");
    assert!(next != 500 && next != 600);
    assert!(next != ids.frozen);

    let knight = world
        .spawn(Bundle::new().with(ids.position, Position::default()).with(500, Armor(3)).tag(600))
        .unwrap();
    assert_eq!(world.get::<Armor>(knight, 500), Some(&Armor(3)));
    assert!(world.has(knight, 600));
}
