use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use schema_plan::{plan_migration, Column, DiffOptions, Schema, Table};

const TYPES: [&str; 4] = ["int", "bigint", "varchar(16)", "datetime"];

/// The `FIRST` / `AFTER` clause closing a column statement
enum Placement {
    First,
    After(String),
}

fn quoted(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('`')?;
    let end = rest.find('`')?;
    Some((&rest[..end], &rest[end + 1..]))
}

fn placement(statement: &str) -> Option<Placement> {
    if statement.ends_with(" FIRST;") {
        return Some(Placement::First);
    }
    let at = statement.rfind(" AFTER `")?;
    let (name, _) = quoted(&statement[at + " AFTER ".len()..])?;
    Some(Placement::After(name.to_string()))
}

fn place(order: &mut Vec<String>, name: String, placement: Placement) {
    let at = match placement {
        Placement::First => 0,
        Placement::After(prev) => order.iter().position(|c| *c == prev).expect("AFTER target exists") + 1,
    };
    order.insert(at, name);
}

/// Apply the column statements of `script` for table `t` to a column order
fn replay(order: &[String], script: &str) -> Vec<String> {
    let mut order = order.to_vec();
    for statement in script.lines() {
        let body = statement
            .strip_prefix("ALTER TABLE `t` ")
            .unwrap_or_else(|| panic!("unexpected statement: {}", statement));

        if let Some(rest) = body.strip_prefix("ADD COLUMN ") {
            let (name, _) = quoted(rest).unwrap();
            assert!(!order.iter().any(|c| c == name), "{} added twice", name);
            place(&mut order, name.to_string(), placement(statement).expect("ADD is placed"));
        } else if let Some(rest) = body.strip_prefix("DROP COLUMN ") {
            let (name, _) = quoted(rest).unwrap();
            order.retain(|c| c != name);
        } else if let Some(rest) = body.strip_prefix("CHANGE ") {
            let (from, rest) = quoted(rest).unwrap();
            let (to, _) = quoted(rest.trim_start()).unwrap();
            let at = order.iter().position(|c| c == from).expect("renamed column exists");
            order.remove(at);
            place(&mut order, to.to_string(), placement(statement).expect("CHANGE is placed"));
        } else if let Some(rest) = body.strip_prefix("MODIFY COLUMN ") {
            let (name, _) = quoted(rest).unwrap();
            assert!(order.iter().any(|c| c == name), "{} modified before it exists", name);
            if let Some(placement) = placement(statement) {
                order.retain(|c| c != name);
                place(&mut order, name.to_string(), placement);
            }
        } else {
            panic!("unexpected statement: {}", statement);
        }
    }
    order
}

fn table(columns: &[(String, &str)]) -> Schema {
    let mut table = Table::new("t");
    for (name, data_type) in columns {
        table.add_column(Column::new(name, data_type));
    }
    Schema::resolve(vec![table]).unwrap()
}

/// A random table and a random edit of it: drops, renames, adds, type changes
/// and a shuffle
fn random_pair(rng: &mut StdRng) -> (Vec<(String, &'static str)>, Vec<(String, &'static str)>) {
    let old: Vec<(String, &str)> = (0..rng.gen_range(1..9))
        .map(|i| (format!("c{}", i), *TYPES.choose(rng).unwrap()))
        .collect();

    let mut new = Vec::new();
    for (i, (name, data_type)) in old.iter().enumerate() {
        match rng.gen_range(0..10) {
            0 | 1 => {}
            2 => new.push((format!("r{}", i), *data_type)),
            3 => new.push((name.clone(), *TYPES.choose(rng).unwrap())),
            _ => new.push((name.clone(), *data_type)),
        }
    }
    for i in 0..rng.gen_range(0..3) {
        new.push((format!("n{}", i), *TYPES.choose(rng).unwrap()));
    }
    if new.is_empty() {
        new.push(("n_only".to_string(), "int"));
    }
    if rng.gen_bool(0.7) {
        new.shuffle(rng);
    }
    (old, new)
}

fn names(columns: &[(String, &str)]) -> Vec<String> {
    columns.iter().map(|(name, _)| name.clone()).collect()
}

#[test]
fn alter_then_revert_restores_column_order() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for case in 0..2000 {
        let (old_columns, new_columns) = random_pair(&mut rng);
        let (old, new) = (table(&old_columns), table(&new_columns));

        let script = plan_migration(&old, &new, &DiffOptions::default()).unwrap();

        let forward = replay(&names(&old_columns), &script.alter);
        assert_eq!(forward, names(&new_columns), "case {}: alter\n{}", case, script.alter);

        let back = replay(&forward, &script.revert);
        assert_eq!(back, names(&old_columns), "case {}: revert\n{}", case, script.revert);
    }
}

#[test]
fn reorder_statements_stay_within_column_count() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..200 {
        let original: Vec<(String, &str)> = (0..rng.gen_range(2..40)).map(|i| (format!("c{}", i), "int")).collect();
        let old = table(&original);
        let mut columns = original.clone();
        columns.shuffle(&mut rng);
        let new = table(&columns);

        let script = plan_migration(&old, &new, &DiffOptions::default()).unwrap();
        assert!(script.alter.lines().count() <= columns.len());
        assert!(script.revert.lines().count() <= columns.len());
        assert_eq!(replay(&names(&original), &script.alter), names(&columns));
    }
}
