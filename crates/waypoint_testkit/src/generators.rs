//! Property-based test generators using proptest.
//!
//! Mutations address a small pool of record slots per table so that random
//! sequences hit the same records repeatedly and exercise queue merging.

use proptest::prelude::*;
use serde_json::{json, Value};
use waypoint_core::{CoreError, CoreResult, LocalStore, MutationEnqueuer, RecordId};

/// Tables used by generated mutations.
pub const MUTATION_TABLES: [&str; 2] = ["notes", "expenses"];

/// Number of record slots per table.
pub const SLOTS: u8 = 4;

/// One local mutation.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Create a record in a slot.
    Create {
        /// Target table.
        table: &'static str,
        /// Record slot.
        slot: u8,
        /// Initial fields.
        fields: Value,
    },
    /// Change some fields of a slot's record.
    Update {
        /// Target table.
        table: &'static str,
        /// Record slot.
        slot: u8,
        /// Changed fields.
        changes: Value,
    },
    /// Delete a slot's record.
    Delete {
        /// Target table.
        table: &'static str,
        /// Record slot.
        slot: u8,
    },
}

/// Record id for a table slot.
pub fn slot_id(table: &str, slot: u8) -> RecordId {
    RecordId::from(format!("{table}-{slot}"))
}

/// Strategy for table names.
pub fn table_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(MUTATION_TABLES.to_vec())
}

/// Strategy for record fields, including a nested structure.
pub fn fields_strategy() -> impl Strategy<Value = Value> {
    (
        prop::string::string_regex("[a-z ]{0,16}").expect("Invalid regex"),
        any::<i32>(),
        prop::option::of((-90.0f64..90.0, -180.0f64..180.0)),
    )
        .prop_map(|(text, amount, location)| {
            let location = location.map_or(Value::Null, |(lat, lng)| json!({ "lat": lat, "lng": lng }));
            json!({
                "trip_id": "t1",
                "content": text,
                "amount_cents": amount,
                "location": location,
            })
        })
}

/// Strategy for a single mutation.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        2 => (table_strategy(), 0..SLOTS, fields_strategy())
            .prop_map(|(table, slot, fields)| Mutation::Create { table, slot, fields }),
        3 => (table_strategy(), 0..SLOTS, any::<i32>())
            .prop_map(|(table, slot, amount)| Mutation::Update {
                table,
                slot,
                changes: json!({ "amount_cents": amount }),
            }),
        1 => (table_strategy(), 0..SLOTS)
            .prop_map(|(table, slot)| Mutation::Delete { table, slot }),
    ]
}

/// Strategy for a sequence of mutations.
pub fn mutation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation_strategy(), min_ops..max_ops)
}

/// Applies a mutation. Creating an existing record or touching a missing
/// one is a no-op, as it would be rejected in the app too.
pub fn apply_mutation(
    enqueuer: &MutationEnqueuer<LocalStore>,
    mutation: &Mutation,
) -> CoreResult<()> {
    let result = match mutation {
        Mutation::Create {
            table,
            slot,
            fields,
        } => enqueuer
            .create_with_id(table, slot_id(table, *slot), fields.clone())
            .map(drop),
        Mutation::Update {
            table,
            slot,
            changes,
        } => enqueuer
            .update(table, &slot_id(table, *slot), changes.clone())
            .map(drop),
        Mutation::Delete { table, slot } => {
            enqueuer.delete(table, &slot_id(table, *slot)).map(drop)
        }
    };
    match result {
        Err(CoreError::RecordNotFound { .. } | CoreError::RecordExists { .. }) => Ok(()),
        other => other,
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn fields_are_objects_with_trip(fields in fields_strategy()) {
            prop_assert!(fields.is_object());
            prop_assert_eq!(&fields["trip_id"], &json!("t1"));
        }

        #[test]
        fn mutations_stay_in_slot_pool(mutation in mutation_strategy()) {
            let (table, slot) = match &mutation {
                Mutation::Create { table, slot, .. }
                | Mutation::Update { table, slot, .. }
                | Mutation::Delete { table, slot } => (*table, *slot),
            };
            prop_assert!(MUTATION_TABLES.contains(&table));
            prop_assert!(slot < SLOTS);
        }
    }

    #[test]
    fn slot_ids_are_stable() {
        assert_eq!(slot_id("notes", 2), RecordId::from("notes-2"));
    }
}
