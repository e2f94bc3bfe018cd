//! Ingredient aggregation across cart recipes

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// One ingredient amount as used by one recipe in the cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientUsage {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Total amount of one ingredient across the whole cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedLine {
    pub ingredient_id: i32,
    pub name: String,
    pub total_amount: i64,
    pub measurement_unit: String,
}

/// Upper-case the first character and lower-case the rest
pub fn capitalize(name: &str) -> String {
    let mut chars = name.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Merge usages by ingredient id, summing amounts.
///
/// Lines come back ordered by name (case-insensitive), ties broken by
/// ingredient id, so identical carts always produce identical output.
/// A negative or overflowing total is reported as a data integrity error.
pub fn aggregate_usages<I>(usages: I) -> Result<Vec<AggregatedLine>>
where
    I: IntoIterator<Item = IngredientUsage>,
{
    let mut totals: HashMap<i32, AggregatedLine> = HashMap::new();

    for usage in usages {
        match totals.entry(usage.ingredient_id) {
            Entry::Occupied(mut entry) => {
                let line = entry.get_mut();
                line.total_amount = line
                    .total_amount
                    .checked_add(i64::from(usage.amount))
                    .ok_or_else(|| AppError::DataIntegrity {
                        message: format!(
                            "Total amount of ingredient {} overflows",
                            usage.ingredient_id
                        ),
                    })?;
            }
            Entry::Vacant(entry) => {
                entry.insert(AggregatedLine {
                    ingredient_id: usage.ingredient_id,
                    name: capitalize(&usage.name),
                    total_amount: i64::from(usage.amount),
                    measurement_unit: usage.measurement_unit,
                });
            }
        }
    }

    if let Some(line) = totals.values().find(|line| line.total_amount < 0) {
        return Err(AppError::DataIntegrity {
            message: format!(
                "Ingredient {} ({}) has negative total amount {}",
                line.ingredient_id, line.name, line.total_amount
            ),
        });
    }

    let mut lines: Vec<AggregatedLine> = totals.into_values().collect();
    lines.sort_by_cached_key(|line| (line.name.to_lowercase(), line.ingredient_id));

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn usage(recipe_id: i32, ingredient_id: i32, name: &str, unit: &str, amount: i32) -> IngredientUsage {
        IngredientUsage {
            recipe_id,
            ingredient_id,
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    fn two_recipe_cart() -> Vec<IngredientUsage> {
        vec![
            usage(1, 10, "flour", "g", 200),
            usage(1, 11, "sugar", "g", 100),
            usage(2, 10, "flour", "g", 150),
            usage(2, 12, "egg", "pcs", 2),
        ]
    }

    fn totals(lines: &[AggregatedLine]) -> Vec<(&str, i64, &str)> {
        lines
            .iter()
            .map(|l| (l.name.as_str(), l.total_amount, l.measurement_unit.as_str()))
            .collect()
    }

    #[test]
    fn test_two_recipes_merge_flour() {
        let lines = aggregate_usages(two_recipe_cart()).unwrap();
        assert_eq!(
            totals(&lines),
            vec![("Egg", 2, "pcs"), ("Flour", 350, "g"), ("Sugar", 100, "g")]
        );
    }

    fn total_of(lines: &[AggregatedLine], ingredient_id: i32) -> Option<i64> {
        lines
            .iter()
            .find(|l| l.ingredient_id == ingredient_id)
            .map(|l| l.total_amount)
    }

    #[test]
    fn test_adding_a_recipe_never_decreases_totals() {
        let before = aggregate_usages(two_recipe_cart()).unwrap();

        let mut cart = two_recipe_cart();
        cart.push(usage(3, 10, "flour", "g", 50));
        cart.push(usage(3, 13, "butter", "g", 80));
        let after = aggregate_usages(cart).unwrap();

        for line in &before {
            let grown = total_of(&after, line.ingredient_id).unwrap();
            assert!(grown >= line.total_amount, "{} shrank", line.name);
        }
        assert_eq!(total_of(&after, 10), Some(400));
        assert_eq!(total_of(&after, 13), Some(80));
        assert_eq!(after.len(), before.len() + 1);
    }

    #[test]
    fn test_removing_last_recipe_using_ingredient_drops_line() {
        // Recipe 2 is the only one with eggs
        let cart: Vec<IngredientUsage> = two_recipe_cart()
            .into_iter()
            .filter(|u| u.recipe_id != 2)
            .collect();
        let lines = aggregate_usages(cart).unwrap();

        assert_eq!(total_of(&lines, 12), None);
        assert_eq!(total_of(&lines, 10), Some(200));
        assert_eq!(totals(&lines), vec![("Flour", 200, "g"), ("Sugar", 100, "g")]);
    }

    #[test]
    fn test_empty_cart_yields_no_lines() {
        let lines = aggregate_usages(Vec::new()).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_amounts_add_never_overwrite() {
        let lines = aggregate_usages(vec![
            usage(1, 5, "tomato", "g", 100),
            usage(2, 5, "tomato", "g", 200),
            usage(3, 5, "tomato", "g", 150),
        ])
        .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].total_amount, 450);
    }

    #[test]
    fn test_order_independent() {
        let expected = aggregate_usages(two_recipe_cart()).unwrap();
        let mut rng = rand::thread_rng();

        for _ in 0..20 {
            let mut shuffled = two_recipe_cart();
            shuffled.shuffle(&mut rng);
            assert_eq!(aggregate_usages(shuffled).unwrap(), expected);
        }
    }

    #[test]
    fn test_idempotent() {
        let first = aggregate_usages(two_recipe_cart()).unwrap();
        let second = aggregate_usages(two_recipe_cart()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_groups_by_id_not_name() {
        // Same display name, different units: two catalog entries
        let lines = aggregate_usages(vec![
            usage(1, 20, "milk", "ml", 250),
            usage(2, 21, "milk", "l", 1),
        ])
        .unwrap();
        assert_eq!(totals(&lines), vec![("Milk", 250, "ml"), ("Milk", 1, "l")]);
    }

    #[test]
    fn test_negative_total_is_integrity_error() {
        let err = aggregate_usages(vec![
            usage(1, 30, "salt", "g", 5),
            usage(2, 30, "salt", "g", -10),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::DataIntegrity { .. }));
    }

    #[test]
    fn test_large_totals_do_not_wrap() {
        let lines = aggregate_usages(vec![
            usage(1, 40, "water", "ml", i32::MAX),
            usage(2, 40, "water", "ml", i32::MAX),
        ])
        .unwrap();
        assert_eq!(lines[0].total_amount, 2 * i64::from(i32::MAX));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("flour"), "Flour");
        assert_eq!(capitalize("BROWN sugar"), "Brown sugar");
        assert_eq!(capitalize("  яйцо "), "Яйцо");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_order_is_case_insensitive() {
        let lines = aggregate_usages(vec![
            usage(1, 3, "Zucchini", "g", 1),
            usage(1, 2, "apple", "pcs", 1),
            usage(1, 1, "Banana", "pcs", 1),
        ])
        .unwrap();
        let names: Vec<&str> = lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "Banana", "Zucchini"]);
    }
}
